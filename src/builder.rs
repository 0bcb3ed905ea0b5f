//! Builder Module
//!
//! Fluent Builder APIを提供し、`Converter`インスタンスを段階的に構築する。

use std::fs;
use std::io::{Read, Seek, Write};
use std::path::{Path, PathBuf};

use chrono::format::{Item, StrftimeItems};

use crate::api::{ConversionPreset, DateFormat, FormulaMode, SheetSelector, TableFormat};
use crate::assembler::{assemble, Document};
use crate::error::XlsxRagError;
use crate::metadata::Metadata;
use crate::parser::WorkbookParser;
use crate::security::SecurityConfig;

/// 変換処理の設定
///
/// `ConverterBuilder::build_config()`で検証済みの値を取得するか、
/// `Default`で既定値を使用します。生成後は変更できません。
#[derive(Debug, Clone, PartialEq)]
pub struct ConversionConfig {
    /// シート選択方式
    pub(crate) sheet_selector: SheetSelector,

    /// 日付形式
    pub(crate) date_format: DateFormat,

    /// 数式出力モード
    pub(crate) formula_mode: FormulaMode,

    /// 非表示シートを含めるか
    pub(crate) include_hidden: bool,

    /// 表の出力形式
    pub(crate) table_format: TableFormat,

    /// 目次を生成するか
    pub(crate) create_toc: bool,

    /// 画像を抽出するか
    pub(crate) extract_images: bool,

    /// 表ごとの要約行を出力するか
    pub(crate) table_summary: bool,

    /// チャンクのトークン予算
    pub(crate) chunk_size: usize,

    /// チャンク間で重複させるトークン数
    pub(crate) chunk_overlap: usize,

    /// 表の列数の上限
    pub(crate) max_columns: usize,

    /// チャンク・シートごとのキーワード数
    pub(crate) keyword_top_k: usize,

    /// チャンク境界をHTMLコメントで注記するか
    pub(crate) annotate_chunks: bool,

    /// 画像の出力ディレクトリ（文書からの相対パス）
    pub(crate) image_dir: String,
}

impl Default for ConversionConfig {
    fn default() -> Self {
        Self {
            sheet_selector: SheetSelector::All,
            date_format: DateFormat::Iso8601,
            formula_mode: FormulaMode::CachedValue,
            include_hidden: false,
            table_format: TableFormat::Markdown,
            create_toc: true,
            extract_images: true,
            table_summary: false,
            chunk_size: 800,
            chunk_overlap: 100,
            max_columns: 50,
            keyword_top_k: 10,
            annotate_chunks: true,
            image_dir: "images".to_string(),
        }
    }
}

impl ConversionConfig {
    /// チャンクのトークン予算
    pub fn chunk_size(&self) -> usize {
        self.chunk_size
    }

    /// チャンク間の重複トークン数
    pub fn chunk_overlap(&self) -> usize {
        self.chunk_overlap
    }

    /// 画像の出力ディレクトリ
    pub fn image_dir(&self) -> &str {
        &self.image_dir
    }

    /// 設定値を検証する
    ///
    /// # 戻り値
    ///
    /// * `Ok(())` - 設定が有効な場合
    /// * `Err(XlsxRagError::Config)` - 次のいずれかに該当する場合
    ///   * `chunk_size` が0
    ///   * `chunk_overlap` が `chunk_size` 以上
    ///   * `max_columns` が2未満
    ///   * カスタム日付形式が空、または不正な書式指定子を含む
    ///   * 画像ディレクトリが空
    pub fn validate(&self) -> Result<(), XlsxRagError> {
        if self.chunk_size == 0 {
            return Err(XlsxRagError::Config(
                "chunk_size must be greater than 0".to_string(),
            ));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(XlsxRagError::Config(format!(
                "chunk_overlap ({}) must be less than chunk_size ({})",
                self.chunk_overlap, self.chunk_size
            )));
        }

        if self.max_columns < 2 {
            return Err(XlsxRagError::Config(format!(
                "max_columns must be at least 2 (got {})",
                self.max_columns
            )));
        }

        if let DateFormat::Custom(ref format_str) = self.date_format {
            let malformed = StrftimeItems::new(format_str).any(|item| matches!(item, Item::Error));
            if format_str.is_empty() || malformed {
                return Err(XlsxRagError::Config(format!(
                    "Invalid date format string: '{}'",
                    format_str
                )));
            }
        }

        if self.image_dir.trim().is_empty() {
            return Err(XlsxRagError::Config(
                "Image directory must not be empty".to_string(),
            ));
        }

        Ok(())
    }
}

/// Fluent Builder APIを提供する構造体
///
/// すべての設定項目にデフォルト値が設定されており、必要な設定のみをオーバーライドできます。
///
/// # 使用例
///
/// ```rust
/// use xlsxrag::{ConverterBuilder, SheetSelector, TableFormat};
///
/// # fn main() -> Result<(), xlsxrag::XlsxRagError> {
/// let converter = ConverterBuilder::new()
///     .with_sheet_selector(SheetSelector::Index(0))
///     .with_table_format(TableFormat::Html)
///     .with_chunk_size(600)
///     .build()?;
/// assert_eq!(converter.config().chunk_size(), 600);
/// # Ok(())
/// # }
/// ```
#[derive(Debug)]
pub struct ConverterBuilder {
    /// 内部設定（構築中）
    config: ConversionConfig,
}

impl Default for ConverterBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl ConverterBuilder {
    /// デフォルト設定を持つビルダーインスタンスを生成する
    ///
    /// # デフォルト設定
    ///
    /// - シート選択: すべてのシート（非表示シートを除く）
    /// - 日付形式: ISO 8601 (YYYY-MM-DD)
    /// - 数式モード: キャッシュ値を出力
    /// - 表形式: Markdown
    /// - 目次・画像抽出: 有効
    /// - チャンク: 800トークン、重複100トークン
    pub fn new() -> Self {
        Self {
            config: ConversionConfig::default(),
        }
    }

    /// プリセットから設定を生成する
    ///
    /// # 使用例
    ///
    /// ```rust
    /// use xlsxrag::{ConversionPreset, ConverterBuilder};
    ///
    /// let converter = ConverterBuilder::from_preset(ConversionPreset::RagOptimized)
    ///     .build()
    ///     .unwrap();
    /// assert_eq!(converter.config().chunk_size(), 600);
    /// ```
    pub fn from_preset(preset: ConversionPreset) -> Self {
        let builder = Self::new();
        match preset {
            ConversionPreset::Standard => builder
                .with_chunk_size(800)
                .with_toc(true)
                .with_images(true)
                .with_formula_mode(FormulaMode::Formula),
            ConversionPreset::RagOptimized => builder
                .with_chunk_size(600)
                .with_toc(true)
                .with_images(false)
                .with_table_summary(true)
                .with_formula_mode(FormulaMode::CachedValue),
            ConversionPreset::Complete => builder
                .with_chunk_size(1200)
                .with_toc(true)
                .with_images(true)
                .with_table_summary(true)
                .with_formula_mode(FormulaMode::Formula),
            ConversionPreset::Lightweight => builder
                .with_chunk_size(1000)
                .with_toc(false)
                .with_images(false),
        }
    }

    /// 変換対象のシートを選択する
    ///
    /// # 使用例
    ///
    /// ```rust
    /// use xlsxrag::{ConverterBuilder, SheetSelector};
    ///
    /// let builder = ConverterBuilder::new()
    ///     .with_sheet_selector(SheetSelector::Names(vec!["Summary".to_string()]));
    /// ```
    pub fn with_sheet_selector(mut self, selector: SheetSelector) -> Self {
        self.config.sheet_selector = selector;
        self
    }

    /// 日付の出力形式を指定する
    pub fn with_date_format(mut self, format: DateFormat) -> Self {
        self.config.date_format = format;
        self
    }

    /// 数式セルの出力モードを指定する
    pub fn with_formula_mode(mut self, mode: FormulaMode) -> Self {
        self.config.formula_mode = mode;
        self
    }

    /// 非表示シートを出力に含めるかを指定する
    ///
    /// `SheetSelector::All` の場合のみ効果があります。名前やインデックスで
    /// 明示的に選択したシートは非表示でも変換されます。
    pub fn include_hidden(mut self, include: bool) -> Self {
        self.config.include_hidden = include;
        self
    }

    /// 表の出力形式を指定する
    pub fn with_table_format(mut self, format: TableFormat) -> Self {
        self.config.table_format = format;
        self
    }

    /// 目次を生成するかを指定する
    pub fn with_toc(mut self, create_toc: bool) -> Self {
        self.config.create_toc = create_toc;
        self
    }

    /// 画像を抽出するかを指定する
    pub fn with_images(mut self, extract_images: bool) -> Self {
        self.config.extract_images = extract_images;
        self
    }

    /// 表の要約行を出力するかを指定する
    pub fn with_table_summary(mut self, table_summary: bool) -> Self {
        self.config.table_summary = table_summary;
        self
    }

    /// チャンクのトークン予算を指定する
    ///
    /// # 引数
    ///
    /// * `chunk_size` - 1チャンクあたりの推定トークン数の上限（1以上）
    pub fn with_chunk_size(mut self, chunk_size: usize) -> Self {
        self.config.chunk_size = chunk_size;
        self
    }

    /// チャンク間の重複トークン数を指定する
    ///
    /// # 引数
    ///
    /// * `chunk_overlap` - 直前のチャンク末尾から繰り返すトークン数（`chunk_size`未満）
    pub fn with_chunk_overlap(mut self, chunk_overlap: usize) -> Self {
        self.config.chunk_overlap = chunk_overlap;
        self
    }

    /// 表の列数の上限を指定する
    pub fn with_max_columns(mut self, max_columns: usize) -> Self {
        self.config.max_columns = max_columns;
        self
    }

    /// キーワード数を指定する
    pub fn with_keyword_top_k(mut self, top_k: usize) -> Self {
        self.config.keyword_top_k = top_k;
        self
    }

    /// チャンク境界の注記を出力するかを指定する
    pub fn with_chunk_annotations(mut self, annotate: bool) -> Self {
        self.config.annotate_chunks = annotate;
        self
    }

    /// 画像の出力ディレクトリを指定する
    pub fn with_image_dir(mut self, image_dir: impl Into<String>) -> Self {
        self.config.image_dir = image_dir.into();
        self
    }

    /// 設定を検証し、`ConversionConfig`を取得する
    ///
    /// `assemble()` を直接呼び出す場合に使用します。
    pub fn build_config(self) -> Result<ConversionConfig, XlsxRagError> {
        self.config.validate()?;
        Ok(self.config)
    }

    /// 設定を検証し、`Converter`インスタンスを生成する
    ///
    /// # 戻り値
    ///
    /// * `Ok(Converter)`: 設定が有効な場合
    /// * `Err(XlsxRagError::Config)`: 設定が無効な場合（`ConversionConfig::validate`を参照）
    pub fn build(self) -> Result<Converter, XlsxRagError> {
        Ok(Converter::new(self.build_config()?))
    }
}

/// 変換結果（文書とメタデータ）
#[derive(Debug, Clone, PartialEq)]
pub struct Conversion {
    /// 組み立て済みの文書
    pub document: Document,

    /// メタデータ
    pub metadata: Metadata,
}

impl Conversion {
    /// 変換結果をディレクトリに書き出す
    ///
    /// `<stem>.md`、`<stem>_metadata.json`、および画像ファイル（文書内の相対パス）を出力します。
    /// すべての内容を生成してから書き出すため、シリアライズに失敗した場合はファイルを作成しません。
    ///
    /// # 戻り値
    ///
    /// * `Ok(PathBuf)` - 出力したMarkdownファイルのパス
    pub fn write_to_dir(&self, dir: &Path, stem: &str) -> Result<PathBuf, XlsxRagError> {
        let json = self.metadata.to_json()?;

        fs::create_dir_all(dir)?;
        let markdown_path = dir.join(format!("{}.md", stem));
        fs::write(&markdown_path, &self.document.text)?;
        fs::write(dir.join(format!("{}_metadata.json", stem)), json)?;

        for image in &self.document.images {
            let path = dir.join(&image.path);
            if let Some(parent) = path.parent() {
                fs::create_dir_all(parent)?;
            }
            fs::write(&path, image.data.as_slice())?;
        }

        tracing::debug!(
            path = %markdown_path.display(),
            images = self.document.images.len(),
            "wrote conversion output"
        );
        Ok(markdown_path)
    }
}

/// 変換処理のファサード
///
/// Excelファイルを読み取り、RAG向けのMarkdown文書とメタデータを生成します。
///
/// # 使用例
///
/// ```rust,no_run
/// use std::fs::File;
/// use xlsxrag::ConverterBuilder;
///
/// # fn main() -> Result<(), xlsxrag::XlsxRagError> {
/// let converter = ConverterBuilder::new().build()?;
/// let input = File::open("report.xlsx")?;
/// let output = File::create("report.md")?;
/// let metadata = converter.convert(input, output)?;
/// println!("{}", metadata.to_json()?);
/// # Ok(())
/// # }
/// ```
#[derive(Debug, Clone)]
pub struct Converter {
    /// 変換設定
    config: ConversionConfig,
}

impl Converter {
    pub(crate) fn new(config: ConversionConfig) -> Self {
        Self { config }
    }

    /// 変換設定
    pub fn config(&self) -> &ConversionConfig {
        &self.config
    }

    /// ExcelファイルをMarkdown形式に変換し、メタデータを返す
    ///
    /// 画像ファイルは書き出しません。画像も必要な場合は`convert_document`を使用してください。
    ///
    /// # 引数
    ///
    /// * `input` - Excelファイルを読み込むためのリーダー
    /// * `output` - Markdown出力先のライター
    pub fn convert<R: Read + Seek, W: Write>(
        &self,
        input: R,
        mut output: W,
    ) -> Result<Metadata, XlsxRagError> {
        let conversion = self.convert_document(input, None)?;
        output.write_all(conversion.document.text.as_bytes())?;
        output.flush()?;
        Ok(conversion.metadata)
    }

    /// ExcelファイルをMarkdown形式の文字列に変換
    ///
    /// # 使用例
    ///
    /// ```rust,no_run
    /// use std::fs::File;
    /// use xlsxrag::ConverterBuilder;
    ///
    /// # fn main() -> Result<(), xlsxrag::XlsxRagError> {
    /// let converter = ConverterBuilder::new().build()?;
    /// let markdown = converter.convert_to_string(File::open("report.xlsx")?)?;
    /// println!("{}", markdown);
    /// # Ok(())
    /// # }
    /// ```
    pub fn convert_to_string<R: Read + Seek>(&self, input: R) -> Result<String, XlsxRagError> {
        Ok(self.convert_document(input, None)?.document.text)
    }

    /// Excelファイルを変換し、文書・画像・メタデータをまとめて返す
    ///
    /// # 引数
    ///
    /// * `input` - Excelファイルを読み込むためのリーダー
    /// * `file_name` - メタデータに記録する入力ファイル名
    ///
    /// # 戻り値
    ///
    /// * `Ok(Conversion)` - 変換に成功した場合
    /// * `Err(XlsxRagError)` - 入力の読み取り、シート選択、または組み立てに失敗した場合
    pub fn convert_document<R: Read + Seek>(
        &self,
        input: R,
        file_name: Option<&str>,
    ) -> Result<Conversion, XlsxRagError> {
        // 1. 入力データをメモリに読み込む（上限を超えた時点で打ち切る）
        let security = SecurityConfig::default();
        let mut buffer = Vec::new();
        input
            .take(security.max_input_file_size + 1)
            .read_to_end(&mut buffer)?;

        // 2. ワークブックの読み取り
        let parser = WorkbookParser::open(buffer)?;
        let workbook = parser.read_workbook(
            &self.config.sheet_selector,
            self.config.include_hidden,
            file_name.map(str::to_string),
        )?;
        tracing::debug!(
            sheets = workbook.sheets.len(),
            file = file_name.unwrap_or("<memory>"),
            "workbook decoded"
        );

        // 3. 文書の組み立て
        let (document, metadata) = assemble(&workbook, &self.config)?;
        Ok(Conversion { document, metadata })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_converter_builder_new() {
        let builder = ConverterBuilder::new();
        assert_eq!(builder.config, ConversionConfig::default());
        assert_eq!(builder.config.sheet_selector, SheetSelector::All);
        assert_eq!(builder.config.date_format, DateFormat::Iso8601);
        assert_eq!(builder.config.formula_mode, FormulaMode::CachedValue);
        assert_eq!(builder.config.chunk_size, 800);
        assert_eq!(builder.config.chunk_overlap, 100);
        assert!(!builder.config.include_hidden);
        assert!(builder.config.create_toc);
    }

    #[test]
    fn test_with_sheet_selector() {
        let builder =
            ConverterBuilder::new().with_sheet_selector(SheetSelector::Name("Sheet1".to_string()));
        assert!(matches!(
            builder.config.sheet_selector,
            SheetSelector::Name(ref name) if name == "Sheet1"
        ));
    }

    #[test]
    fn test_builder_method_chaining() {
        let builder = ConverterBuilder::new()
            .with_sheet_selector(SheetSelector::Index(0))
            .with_date_format(DateFormat::Custom("%Y/%m/%d".to_string()))
            .with_formula_mode(FormulaMode::Formula)
            .include_hidden(true)
            .with_table_format(TableFormat::Html)
            .with_toc(false)
            .with_images(false)
            .with_table_summary(true)
            .with_chunk_size(500)
            .with_chunk_overlap(50)
            .with_max_columns(20)
            .with_keyword_top_k(5)
            .with_chunk_annotations(false)
            .with_image_dir("media");

        let config = builder.build_config().unwrap();
        assert_eq!(config.table_format, TableFormat::Html);
        assert_eq!(config.formula_mode, FormulaMode::Formula);
        assert!(config.include_hidden);
        assert!(!config.create_toc);
        assert!(!config.extract_images);
        assert!(config.table_summary);
        assert_eq!(config.chunk_size(), 500);
        assert_eq!(config.chunk_overlap(), 50);
        assert_eq!(config.max_columns, 20);
        assert_eq!(config.keyword_top_k, 5);
        assert!(!config.annotate_chunks);
        assert_eq!(config.image_dir(), "media");
    }

    #[test]
    fn test_presets() {
        let rag = ConverterBuilder::from_preset(ConversionPreset::RagOptimized)
            .build_config()
            .unwrap();
        assert_eq!(rag.chunk_size, 600);
        assert!(!rag.extract_images);
        assert!(rag.table_summary);

        let light = ConverterBuilder::from_preset(ConversionPreset::Lightweight)
            .build_config()
            .unwrap();
        assert_eq!(light.chunk_size, 1000);
        assert!(!light.create_toc);

        for preset in ConversionPreset::ALL {
            assert!(ConverterBuilder::from_preset(preset).build().is_ok());
        }
    }

    #[test]
    fn test_build_rejects_zero_chunk_size() {
        let result = ConverterBuilder::new().with_chunk_size(0).build();
        assert!(matches!(result, Err(XlsxRagError::Config(msg)) if msg.contains("chunk_size")));
    }

    #[test]
    fn test_build_rejects_overlap_not_below_chunk_size() {
        let result = ConverterBuilder::new()
            .with_chunk_size(100)
            .with_chunk_overlap(100)
            .build();
        assert!(matches!(result, Err(XlsxRagError::Config(msg)) if msg.contains("chunk_overlap")));

        assert!(ConverterBuilder::new()
            .with_chunk_size(100)
            .with_chunk_overlap(99)
            .build()
            .is_ok());
    }

    #[test]
    fn test_build_rejects_small_max_columns() {
        let result = ConverterBuilder::new().with_max_columns(1).build();
        assert!(matches!(result, Err(XlsxRagError::Config(_))));
    }

    #[test]
    fn test_build_with_invalid_custom_date_format() {
        for format in ["", "%Q"] {
            let result = ConverterBuilder::new()
                .with_date_format(DateFormat::Custom(format.to_string()))
                .build();
            match result {
                Err(XlsxRagError::Config(msg)) => assert!(msg.contains("Invalid date format")),
                _ => panic!("Expected Config error for {:?}", format),
            }
        }
    }

    #[test]
    fn test_build_rejects_empty_image_dir() {
        let result = ConverterBuilder::new().with_image_dir("  ").build();
        assert!(matches!(result, Err(XlsxRagError::Config(_))));
    }

    #[test]
    fn test_converter_convert_to_string_with_invalid_input() {
        let converter = ConverterBuilder::new().build().unwrap();
        let result = converter.convert_to_string(std::io::Cursor::new(Vec::<u8>::new()));
        assert!(result.is_err());
    }
}
