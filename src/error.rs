//! Error Types Module
//!
//! クレート全体で使用する構造化エラー型を定義するモジュール。
//! `thiserror`を使用して、エラーの自動変換とメッセージフォーマットを実現する。
//!
//! 未解決のシート参照や最小サイズ未満の表候補はエラーではなく、
//! 出力とメタデータに記録されるデータ上の状態として扱う。

use thiserror::Error;

/// xlsxragクレート全体で使用するエラー型
///
/// # エラーの種類
///
/// - 入力エラー: `InvalidInput`, `Parse`, `Zip`, `Xml`, `Io`, `Utf8`, `ParseInt`
/// - 設定エラー: `Config`（パイプライン開始前に検出）
/// - セキュリティ: `SecurityViolation`
/// - 出力: `Serialization`
///
/// # 使用例
///
/// ```rust,no_run
/// use xlsxrag::XlsxRagError;
/// use std::fs::File;
///
/// fn open_workbook(path: &str) -> Result<File, XlsxRagError> {
///     let file = File::open(path)?;  // Ioエラーが自動的に変換される
///     Ok(file)
/// }
/// ```
#[derive(Error, Debug)]
pub enum XlsxRagError {
    /// I/O操作中に発生したエラー
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Excelファイルの解析中に発生したエラー（calamine由来）
    #[error("Failed to parse Excel file: {0}")]
    Parse(#[from] calamine::Error),

    /// UTF-8文字列の変換エラー
    #[error("UTF-8 conversion error: {0}")]
    Utf8(#[from] std::str::Utf8Error),

    /// ZIPアーカイブの解析エラー
    #[error("ZIP archive error: {0}")]
    Zip(String),

    /// パッケージ内XMLの解析エラー
    #[error("XML parse error: {0}")]
    Xml(String),

    /// 数値の解析エラー
    #[error("Number parse error: {0}")]
    ParseInt(#[from] std::num::ParseIntError),

    /// 空のワークブックなど、変換対象として成立しない入力
    ///
    /// 変換全体を中断し、部分的な出力は生成しません。
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// 設定の検証に失敗したエラー
    ///
    /// `ConverterBuilder::build()`または`ConversionConfig::validate()`で検出されます。
    ///
    /// # 例
    ///
    /// ```rust,no_run
    /// use xlsxrag::{ConverterBuilder, XlsxRagError};
    ///
    /// let result = ConverterBuilder::new()
    ///     .with_chunk_size(100)
    ///     .with_chunk_overlap(100)
    ///     .build();
    ///
    /// match result {
    ///     Err(XlsxRagError::Config(msg)) => {
    ///         println!("設定エラー: {}", msg);
    ///     }
    ///     _ => {}
    /// }
    /// ```
    #[error("Configuration error: {0}")]
    Config(String),

    /// セキュリティ制限に違反したエラー
    ///
    /// ZIP bomb、パストラバーサル、ファイルサイズ制限などに違反した場合に発生します。
    #[error("Security violation: {0}")]
    SecurityViolation(String),

    /// メタデータのシリアライズに失敗したエラー
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl XlsxRagError {
    /// 入力起因のエラーかどうか
    ///
    /// 再アップロードなど、呼び出し側での回復手段を選ぶために使用します。
    pub fn is_input_error(&self) -> bool {
        matches!(
            self,
            XlsxRagError::InvalidInput(_)
                | XlsxRagError::Parse(_)
                | XlsxRagError::Zip(_)
                | XlsxRagError::Xml(_)
                | XlsxRagError::Utf8(_)
                | XlsxRagError::ParseInt(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io;

    #[test]
    fn test_io_error() {
        let io_err = io::Error::new(io::ErrorKind::NotFound, "File not found");
        let error: XlsxRagError = io_err.into();

        match error {
            XlsxRagError::Io(e) => {
                assert_eq!(e.kind(), io::ErrorKind::NotFound);
                assert_eq!(e.to_string(), "File not found");
            }
            _ => panic!("Expected Io error"),
        }
    }

    #[test]
    fn test_parse_error_display() {
        let parse_err = calamine::Error::Msg("Corrupted file");
        let error: XlsxRagError = parse_err.into();

        let error_msg = error.to_string();
        assert!(error_msg.contains("Failed to parse Excel file"));
        assert!(error_msg.contains("Corrupted file"));
        assert!(error.is_input_error());
    }

    #[test]
    fn test_config_error_display() {
        let error = XlsxRagError::Config("chunk_overlap (800) must be smaller than chunk_size (800)".to_string());
        let error_msg = error.to_string();

        assert!(error_msg.starts_with("Configuration error"));
        assert!(error_msg.contains("chunk_overlap"));
        assert!(!error.is_input_error());
    }

    #[test]
    fn test_invalid_input_is_input_error() {
        let error = XlsxRagError::InvalidInput("workbook contains no sheets".to_string());
        assert!(error.is_input_error());
        assert!(error.to_string().starts_with("Invalid input"));
    }

    #[test]
    fn test_serialization_error_conversion() {
        let json_err = serde_json::from_str::<serde_json::Value>("{").unwrap_err();
        let error: XlsxRagError = json_err.into();
        assert!(matches!(error, XlsxRagError::Serialization(_)));
    }

    // ?演算子による変換の確認
    #[test]
    fn test_error_conversion_with_question_mark() {
        fn io_operation() -> Result<(), XlsxRagError> {
            let _file = std::fs::File::open("nonexistent_file.xlsx")?;
            Ok(())
        }

        match io_operation() {
            Err(XlsxRagError::Io(_)) => {}
            _ => panic!("Expected Io error from ? operator"),
        }
    }
}
