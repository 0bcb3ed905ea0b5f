//! Public API Types
//!
//! 公開APIで使用する列挙型を定義するモジュール。

/// 日付の出力形式
///
/// 日付書式が設定された数値セルを変換する際の出力形式を指定します。
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum DateFormat {
    /// ISO 8601形式（YYYY-MM-DD）
    Iso8601,

    /// カスタム形式（chrono互換フォーマット文字列）
    ///
    /// # 使用例
    ///
    /// ```rust,no_run
    /// use xlsxrag::{ConverterBuilder, DateFormat};
    ///
    /// # fn main() -> Result<(), xlsxrag::XlsxRagError> {
    /// let converter = ConverterBuilder::new()
    ///     .with_date_format(DateFormat::Custom("%Y年%m月%d日".to_string()))
    ///     .build()?;
    /// # Ok(())
    /// # }
    /// ```
    Custom(String),
}

/// 数式セルの出力モード
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum FormulaMode {
    /// キャッシュされた結果値を出力（デフォルト）
    ///
    /// 例: `=SUM(A1:A10)` → `100`
    CachedValue,

    /// 数式文字列を出力
    ///
    /// 例: `=SUM(A1:A10)` → `=SUM(A1:A10)`
    Formula,
}

/// シート選択方式
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum SheetSelector {
    /// すべてのシートを変換（デフォルト）
    All,

    /// インデックス指定（0始まり）
    Index(usize),

    /// シート名指定
    Name(String),

    /// 複数のインデックス指定
    Indices(Vec<usize>),

    /// 複数のシート名指定
    Names(Vec<String>),
}

/// 表の出力構文
///
/// レンダラーのみに影響し、表領域の検出やチャンク分割の構造は変わりません。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum TableFormat {
    /// Markdownテーブル（デフォルト）
    ///
    /// ```markdown
    /// | Name  | Qty |
    /// | ----- | --- |
    /// | Apple | 3   |
    /// ```
    Markdown,

    /// HTMLテーブル（結合セルは`rowspan`/`colspan`で表現）
    Html,
}

/// 変換プリセット
///
/// よく使う設定の組み合わせです。`ConverterBuilder::from_preset`で使用します。
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConversionPreset {
    /// 標準的な変換設定（チャンク800、目次あり、画像あり、数式表示）
    Standard,

    /// RAG向けの最適化（チャンク600、目次あり、画像なし、表要約あり）
    RagOptimized,

    /// すべての情報を含む変換（チャンク1200、目次・画像・表要約・数式表示）
    Complete,

    /// 軽量版（チャンク1000、目次なし、画像なし）
    Lightweight,
}

impl ConversionPreset {
    /// すべてのプリセット
    pub const ALL: [ConversionPreset; 4] = [
        ConversionPreset::Standard,
        ConversionPreset::RagOptimized,
        ConversionPreset::Complete,
        ConversionPreset::Lightweight,
    ];

    /// プリセットの説明
    pub fn description(&self) -> &'static str {
        match self {
            ConversionPreset::Standard => "標準的な変換設定",
            ConversionPreset::RagOptimized => "RAGシステム向けの最適化設定（画像なし、要約あり）",
            ConversionPreset::Complete => "すべての情報を含む完全変換",
            ConversionPreset::Lightweight => "最小限の変換（目次なし、画像なし）",
        }
    }
}
