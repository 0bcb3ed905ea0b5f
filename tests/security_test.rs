//! Security Tests
//!
//! 信頼できない入力パッケージに対する防御を検証します。
//! パッケージの検査はセル値の読み取りより前に行われるため、違反は常に
//! `SecurityViolation` として報告されます。

use std::io::{Cursor, Write};
use xlsxrag::{ConverterBuilder, XlsxRagError};
use zip::write::{FileOptions, ZipWriter};
use zip::CompressionMethod;

/// 指定したエントリを持つZIPアーカイブを作成
fn build_zip(entries: &[(&str, &[u8])]) -> Vec<u8> {
    let mut zip_data = Vec::new();
    {
        let mut zip = ZipWriter::new(Cursor::new(&mut zip_data));
        let options = FileOptions::default().compression_method(CompressionMethod::Stored);
        for (name, data) in entries {
            zip.start_file(*name, options).unwrap();
            zip.write_all(data).unwrap();
        }
        zip.finish().unwrap();
    }
    zip_data
}

fn convert(zip_data: Vec<u8>) -> Result<xlsxrag::Metadata, XlsxRagError> {
    let converter = ConverterBuilder::new().build().unwrap();
    converter.convert(Cursor::new(zip_data), &mut Vec::new())
}

/// ZIP bomb攻撃のテスト: 大量のファイルを含むZIPアーカイブ
#[test]
fn test_zip_bomb_too_many_files() {
    // 10,001個のファイル（上限: 10,000）
    let names: Vec<String> = (0..10_001).map(|i| format!("xl/file{}.xml", i)).collect();
    let entries: Vec<(&str, &[u8])> = names.iter().map(|n| (n.as_str(), &b"test"[..])).collect();

    match convert(build_zip(&entries)) {
        Err(XlsxRagError::SecurityViolation(msg)) => assert!(msg.contains("too many files")),
        e => panic!("Unexpected result: {:?}", e.map(|_| ())),
    }
}

/// ZIP bomb攻撃のテスト: 展開後のサイズが大きすぎるエントリ
#[test]
#[ignore] // 大きなファイルを作成するため、通常のテストではスキップ
fn test_zip_bomb_large_entry() {
    // 100MB + 1バイト（単一エントリの上限: 100MB）
    let large_data = vec![0u8; 104_857_601];

    match convert(build_zip(&[("xl/large_file.xml", &large_data)])) {
        Err(XlsxRagError::SecurityViolation(msg)) => assert!(msg.contains("exceeds maximum size")),
        e => panic!("Expected SecurityViolation error, got {:?}", e.map(|_| ())),
    }
}

/// パストラバーサル攻撃のテスト: `..`を含むパス
#[test]
fn test_path_traversal_dotdot() {
    let zip_data = build_zip(&[
        ("xl/workbook.xml", &b"<workbook/>"[..]),
        ("xl/../../etc/passwd", &b"root:x:0:0"[..]),
    ]);

    match convert(zip_data) {
        Err(XlsxRagError::SecurityViolation(msg)) => {
            assert!(msg.contains("Invalid ZIP path"));
            assert!(msg.contains("Path traversal"));
        }
        e => panic!("Expected SecurityViolation error, got {:?}", e.map(|_| ())),
    }
}

/// パストラバーサル攻撃のテスト: 絶対パス
#[test]
fn test_path_traversal_absolute_path() {
    let zip_data = build_zip(&[("/etc/passwd", &b"root:x:0:0"[..])]);

    match convert(zip_data) {
        Err(XlsxRagError::SecurityViolation(msg)) => assert!(msg.contains("Absolute path")),
        e => panic!("Expected SecurityViolation error, got {:?}", e.map(|_| ())),
    }
}

/// パストラバーサル攻撃のテスト: Windows形式のパス
#[test]
fn test_path_traversal_windows_path() {
    let zip_data = build_zip(&[("xl\\..\\evil.xml", &b"<x/>"[..])]);

    match convert(zip_data) {
        Err(XlsxRagError::SecurityViolation(msg)) => {
            assert!(msg.contains("Invalid ZIP path"));
        }
        e => panic!("Expected SecurityViolation error, got {:?}", e.map(|_| ())),
    }
}

/// ファイルサイズ制限のテスト: 入力ファイルが大きすぎる場合
#[test]
#[ignore] // 大きなファイルを作成するため、通常のテストではスキップ
fn test_input_file_size_limit() {
    // 2GB + 1バイト
    let large_data = vec![0u8; 2_147_483_649];

    match convert(large_data) {
        Err(XlsxRagError::SecurityViolation(msg)) => assert!(msg.contains("Input file size")),
        e => panic!("Expected SecurityViolation error, got {:?}", e.map(|_| ())),
    }
}

/// 構造が不完全でも安全なパッケージはセキュリティ違反にならない
#[test]
fn test_incomplete_package_is_not_a_security_violation() {
    let zip_data = build_zip(&[
        ("xl/workbook.xml", &b"<?xml version=\"1.0\"?><workbook/>"[..]),
        ("xl/worksheets/sheet1.xml", &b"<?xml version=\"1.0\"?><worksheet/>"[..]),
    ]);

    match convert(zip_data) {
        Err(XlsxRagError::SecurityViolation(msg)) => {
            panic!("Should not trigger security violation: {}", msg)
        }
        Err(e) => assert!(e.is_input_error(), "unexpected error kind: {:?}", e),
        Ok(_) => panic!("an incomplete package should not convert"),
    }
}
