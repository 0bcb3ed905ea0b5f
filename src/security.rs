//! Security Module
//!
//! 信頼できない入力パッケージに対する防御（ZIP bomb、パストラバーサル、過大入力）を提供する。

use std::io::{Read, Seek};

use zip::ZipArchive;

use crate::error::XlsxRagError;

/// パッケージ処理時の上限値
#[derive(Debug, Clone)]
pub(crate) struct SecurityConfig {
    /// 展開後の合計サイズの上限（既定: 1GB）
    pub max_decompressed_size: u64,
    /// アーカイブ内のエントリ数の上限（既定: 10,000）
    pub max_file_count: usize,
    /// 単一エントリの展開後サイズの上限（既定: 100MB）
    pub max_file_size: u64,
    /// 入力ファイルサイズの上限（既定: 2GB）
    pub max_input_file_size: u64,
}

impl Default for SecurityConfig {
    fn default() -> Self {
        Self {
            max_decompressed_size: 1_073_741_824,
            max_file_count: 10_000,
            max_file_size: 104_857_600,
            max_input_file_size: 2_147_483_648,
        }
    }
}

impl SecurityConfig {
    /// 入力サイズの検証
    pub fn check_input_size(&self, size: u64) -> Result<(), XlsxRagError> {
        if size > self.max_input_file_size {
            return Err(XlsxRagError::SecurityViolation(format!(
                "Input file size exceeds maximum: {} bytes (max: {} bytes)",
                size, self.max_input_file_size
            )));
        }
        Ok(())
    }

    /// アーカイブ全体の検証
    ///
    /// エントリ数、各エントリのパスと展開後サイズ、展開後の合計サイズを検査します。
    /// サイズはセントラルディレクトリの申告値で判定するため、展開は行いません。
    pub fn check_archive<R: Read + Seek>(&self, archive: &mut ZipArchive<R>) -> Result<(), XlsxRagError> {
        if archive.len() > self.max_file_count {
            return Err(XlsxRagError::SecurityViolation(format!(
                "ZIP archive contains too many files: {} (max: {})",
                archive.len(),
                self.max_file_count
            )));
        }

        let mut total = 0u64;
        for i in 0..archive.len() {
            let file = archive
                .by_index(i)
                .map_err(|e| XlsxRagError::Zip(e.to_string()))?;

            let name = file.name();
            validate_zip_path(name)
                .map_err(|e| XlsxRagError::SecurityViolation(format!("Invalid ZIP path: {}", e)))?;

            let size = file.size();
            if size > self.max_file_size {
                return Err(XlsxRagError::SecurityViolation(format!(
                    "File '{}' exceeds maximum size: {} bytes (max: {} bytes)",
                    name, size, self.max_file_size
                )));
            }

            total = total.checked_add(size).ok_or_else(|| {
                XlsxRagError::SecurityViolation("Total decompressed size calculation overflow".to_string())
            })?;
            if total > self.max_decompressed_size {
                return Err(XlsxRagError::SecurityViolation(format!(
                    "Total decompressed size exceeds maximum: {} bytes (max: {} bytes)",
                    total, self.max_decompressed_size
                )));
            }
        }
        Ok(())
    }
}

/// アーカイブ内パスの検証
///
/// # 戻り値
///
/// * `Ok(())` - パスが安全な場合
/// * `Err(String)` - 空、絶対パス、`..`、バックスラッシュを含む場合
pub(crate) fn validate_zip_path(path: &str) -> Result<(), String> {
    if path.is_empty() {
        return Err("Empty path is not allowed".to_string());
    }

    let bytes = path.as_bytes();
    let has_drive = bytes.len() >= 2 && bytes[0].is_ascii_alphabetic() && bytes[1] == b':';
    if path.starts_with('/') || has_drive {
        return Err(format!("Absolute path is not allowed: {}", path));
    }

    if path.split('/').any(|segment| segment == "..") {
        return Err(format!("Path traversal detected: {}", path));
    }

    if path.contains('\\') {
        return Err(format!("Backslash in path is not allowed: {}", path));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Cursor, Write};
    use zip::write::FileOptions;

    fn archive_with(entries: &[(&str, &[u8])]) -> ZipArchive<Cursor<Vec<u8>>> {
        let mut writer = zip::ZipWriter::new(Cursor::new(Vec::new()));
        for (name, data) in entries {
            writer.start_file(*name, FileOptions::default()).unwrap();
            writer.write_all(data).unwrap();
        }
        let cursor = writer.finish().unwrap();
        ZipArchive::new(Cursor::new(cursor.into_inner())).unwrap()
    }

    #[test]
    fn test_validate_zip_path_valid() {
        assert!(validate_zip_path("xl/workbook.xml").is_ok());
        assert!(validate_zip_path("xl/media/image1..png").is_ok());
    }

    #[test]
    fn test_validate_zip_path_rejected() {
        assert!(validate_zip_path("").is_err());
        assert!(validate_zip_path("/etc/passwd").is_err());
        assert!(validate_zip_path("C:\\Windows\\system32").is_err());
        assert!(validate_zip_path("d:/xl/workbook.xml").is_err());
        assert!(validate_zip_path("../etc/passwd").is_err());
        assert!(validate_zip_path("xl/../../etc/passwd").is_err());
        assert!(validate_zip_path("xl\\workbook.xml").is_err());
    }

    #[test]
    fn test_check_input_size() {
        let config = SecurityConfig {
            max_input_file_size: 10,
            ..Default::default()
        };
        assert!(config.check_input_size(10).is_ok());
        assert!(matches!(
            config.check_input_size(11),
            Err(XlsxRagError::SecurityViolation(_))
        ));
    }

    #[test]
    fn test_check_archive_limits() {
        let mut archive = archive_with(&[("a.xml", &b"12345"[..]), ("b.xml", &b"67890"[..])]);
        assert!(SecurityConfig::default().check_archive(&mut archive).is_ok());

        let few_files = SecurityConfig {
            max_file_count: 1,
            ..Default::default()
        };
        assert!(few_files.check_archive(&mut archive).is_err());

        let small_entries = SecurityConfig {
            max_file_size: 4,
            ..Default::default()
        };
        assert!(small_entries.check_archive(&mut archive).is_err());

        let small_total = SecurityConfig {
            max_decompressed_size: 8,
            ..Default::default()
        };
        assert!(small_total.check_archive(&mut archive).is_err());
    }
}
