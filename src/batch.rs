//! Batch Conversion Module
//!
//! 複数のExcelファイルを1つの出力ディレクトリへ並列に変換する。
//! 1ファイルの失敗は他のファイルの変換に影響しません。

use std::collections::HashMap;
use std::fs::{self, File};
use std::io::BufReader;
use std::path::{Path, PathBuf};

use rayon::prelude::*;

use crate::builder::{ConversionConfig, Converter};
use crate::error::XlsxRagError;
use crate::metadata::Metadata;

/// 変換対象とみなす拡張子
const EXCEL_EXTENSIONS: [&str; 2] = ["xlsx", "xlsm"];

/// 1ファイル分の変換結果
#[derive(Debug)]
pub struct BatchResult {
    /// 入力ファイル
    pub input: PathBuf,

    /// 出力するMarkdownファイル
    pub output: PathBuf,

    /// 変換結果（成功時はメタデータ）
    pub outcome: Result<Metadata, XlsxRagError>,
}

impl BatchResult {
    /// 変換に成功したか
    pub fn is_success(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// バッチ変換の集計
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BatchSummary {
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub total_sheets: usize,
    pub total_chunks: usize,
}

impl BatchSummary {
    /// 結果の一覧から集計を作成
    pub fn from_results(results: &[BatchResult]) -> Self {
        let mut summary = BatchSummary {
            total: results.len(),
            ..Default::default()
        };
        for result in results {
            match &result.outcome {
                Ok(metadata) => {
                    summary.succeeded += 1;
                    summary.total_sheets += metadata.sheets.len();
                    summary.total_chunks += metadata.rag_optimization.estimated_chunks;
                }
                Err(_) => summary.failed += 1,
            }
        }
        summary
    }
}

/// 複数ファイルの変換器
///
/// 各ファイルの画像は`<image_dir>/<stem>/`に出力され、ファイル間で衝突しません。
///
/// # 使用例
///
/// ```rust,no_run
/// use std::path::{Path, PathBuf};
/// use xlsxrag::{BatchConverter, BatchSummary, ConverterBuilder};
///
/// # fn main() -> Result<(), xlsxrag::XlsxRagError> {
/// let config = ConverterBuilder::new().with_chunk_size(600).build_config()?;
/// let batch = BatchConverter::new(config);
/// let results = batch.convert_files(
///     &[PathBuf::from("q1.xlsx"), PathBuf::from("q2.xlsx")],
///     Path::new("out"),
/// );
/// let summary = BatchSummary::from_results(&results);
/// println!("{} / {} succeeded", summary.succeeded, summary.total);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct BatchConverter {
    config: ConversionConfig,
}

impl BatchConverter {
    /// 共通の設定から変換器を生成
    pub fn new(config: ConversionConfig) -> Self {
        Self { config }
    }

    /// ファイルの一覧を変換する
    ///
    /// 出力名は入力ファイル名の拡張子を除いた部分です。同名の入力が複数ある場合、
    /// 2件目以降には`-2`、`-3`…を付けます。
    ///
    /// # 戻り値
    ///
    /// 入力と同じ順序の結果一覧
    pub fn convert_files(&self, inputs: &[PathBuf], output_dir: &Path) -> Vec<BatchResult> {
        let stems = unique_stems(inputs);
        inputs
            .par_iter()
            .zip(stems.par_iter())
            .map(|(input, stem)| self.convert_one(input, output_dir, stem))
            .collect()
    }

    /// ディレクトリ内のExcelファイルを変換する
    ///
    /// # 引数
    ///
    /// * `input_dir` - 入力ディレクトリ
    /// * `output_dir` - 出力ディレクトリ
    /// * `recursive` - サブディレクトリも対象にするか
    ///
    /// # 戻り値
    ///
    /// * `Ok(Vec<BatchResult>)` - パス順の結果一覧
    /// * `Err(XlsxRagError::Io)` - 入力ディレクトリを読み取れない場合
    pub fn convert_directory(
        &self,
        input_dir: &Path,
        output_dir: &Path,
        recursive: bool,
    ) -> Result<Vec<BatchResult>, XlsxRagError> {
        let mut inputs = Vec::new();
        find_excel_files(input_dir, recursive, &mut inputs)?;
        inputs.sort();
        tracing::debug!(dir = %input_dir.display(), files = inputs.len(), "found workbooks");
        Ok(self.convert_files(&inputs, output_dir))
    }

    fn convert_one(&self, input: &Path, output_dir: &Path, stem: &str) -> BatchResult {
        let mut config = self.config.clone();
        config.image_dir = format!("{}/{}", config.image_dir.trim_end_matches('/'), stem);
        let output = output_dir.join(format!("{}.md", stem));

        let outcome = Self::run(config, input, output_dir, stem);

        if let Err(e) = &outcome {
            tracing::warn!(input = %input.display(), error = %e, "conversion failed");
        }

        BatchResult {
            input: input.to_path_buf(),
            output,
            outcome,
        }
    }

    fn run(
        config: ConversionConfig,
        input: &Path,
        output_dir: &Path,
        stem: &str,
    ) -> Result<Metadata, XlsxRagError> {
        let file = File::open(input)?;
        let file_name = input.file_name().map(|n| n.to_string_lossy().into_owned());
        let conversion =
            Converter::new(config).convert_document(BufReader::new(file), file_name.as_deref())?;
        conversion.write_to_dir(output_dir, stem)?;
        Ok(conversion.metadata)
    }
}

fn unique_stems(inputs: &[PathBuf]) -> Vec<String> {
    let mut seen: HashMap<String, usize> = HashMap::new();
    inputs
        .iter()
        .map(|path| {
            let stem = path
                .file_stem()
                .map(|s| s.to_string_lossy().into_owned())
                .filter(|s| !s.is_empty())
                .unwrap_or_else(|| "workbook".to_string());
            let count = seen.entry(stem.clone()).or_insert(0);
            *count += 1;
            if *count == 1 {
                stem
            } else {
                format!("{}-{}", stem, count)
            }
        })
        .collect()
}

fn find_excel_files(dir: &Path, recursive: bool, found: &mut Vec<PathBuf>) -> Result<(), XlsxRagError> {
    for entry in fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            if recursive {
                find_excel_files(&path, recursive, found)?;
            }
            continue;
        }
        let is_excel = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| EXCEL_EXTENSIONS.contains(&e.to_ascii_lowercase().as_str()))
            .unwrap_or(false);
        // Excelの一時ファイル（~$で始まる）は除外
        let is_lock_file = path
            .file_name()
            .map(|n| n.to_string_lossy().starts_with("~$"))
            .unwrap_or(false);
        if is_excel && !is_lock_file {
            found.push(path);
        }
    }
    Ok(())
}
