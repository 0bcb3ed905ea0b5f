//! Section Module
//!
//! シートごとのレンダリング単位（セクション）と、その中の順序付きサブブロックを定義する。
//! ここで決めるのは構造と順序のみで、具体的なマークアップはレンダラーが担当します。

use crate::builder::ConversionConfig;
use crate::detector::TableRegion;
use crate::error::XlsxRagError;
use crate::formatter::CellFormatter;
use crate::types::CellCoord;
use crate::workbook::SheetGrid;

/// セクション（シート1枚、または目次）
#[derive(Debug, Clone, PartialEq)]
pub struct Section {
    /// シート名（目次セクションは`None`）
    pub sheet_id: Option<String>,

    /// 見出し
    pub title: String,

    /// 文書内アンカー
    pub anchor: String,

    /// 順序付きサブブロック
    pub blocks: Vec<Block>,
}

/// セクション内のサブブロック
#[derive(Debug, Clone, PartialEq)]
pub enum Block {
    /// 目次
    Contents(Vec<ContentsEntry>),

    /// 表
    Table(TableBlock),

    /// 画像プレースホルダー
    Image(ImagePlaceholder),

    /// 表以外の自由テキスト
    Narrative(NarrativeBlock),

    /// 関連シートの注記
    RelatedSheets(Vec<RelatedSheet>),
}

impl Block {
    /// トークン推定に使う正規化テキスト
    pub fn plain_text(&self) -> String {
        match self {
            Block::Contents(entries) => entries
                .iter()
                .map(|e| format!("{}. {}", e.number, e.name))
                .collect::<Vec<_>>()
                .join("\n"),
            Block::Table(table) => table.plain_text(),
            Block::Image(image) => format!("![{}]({})", image.caption, image.path),
            Block::Narrative(narrative) => narrative.text.clone(),
            Block::RelatedSheets(related) => related
                .iter()
                .map(|r| format!("{} {} {}", r.direction.label(), r.sheet, r.cell))
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }

    /// キーワード抽出の対象テキスト（表ヘッダーと自由テキストのみ）
    pub fn keyword_sources(&self) -> Vec<&str> {
        match self {
            Block::Table(table) => table.header.iter().map(String::as_str).collect(),
            Block::Narrative(narrative) => vec![narrative.text.as_str()],
            Block::Contents(_) | Block::Image(_) | Block::RelatedSheets(_) => Vec::new(),
        }
    }
}

/// 表ブロック
#[derive(Debug, Clone, PartialEq)]
pub struct TableBlock {
    /// 元の表領域
    pub region: TableRegion,

    /// ヘッダー行の表示文字列
    pub header: Vec<String>,

    /// データ行の表示文字列（結合範囲の非アンカーセルは空文字列）
    pub rows: Vec<Vec<String>>,

    /// 領域内の結合範囲（領域内の相対座標）
    pub spans: Vec<CellSpan>,

    /// 統計的な要約行（`table_summary`が有効な場合）
    pub summary: Option<String>,
}

impl TableBlock {
    fn plain_text(&self) -> String {
        let mut lines = Vec::with_capacity(self.rows.len() + 2);
        if let Some(summary) = &self.summary {
            lines.push(summary.clone());
        }
        lines.push(self.header.join(" | "));
        for row in &self.rows {
            lines.push(row.join(" | "));
        }
        lines.join("\n")
    }

    /// 相対座標 (row, col) を含む結合範囲
    ///
    /// `row` はヘッダー行を0とする領域内の行番号です。
    pub fn span_covering(&self, row: usize, col: usize) -> Option<&CellSpan> {
        self.spans.iter().find(|s| {
            row >= s.row && row < s.row + s.rowspan && col >= s.col && col < s.col + s.colspan
        })
    }

    /// 領域内の相対座標のセル文字列（0行目はヘッダー）
    pub fn cell_text(&self, row: usize, col: usize) -> &str {
        let line = if row == 0 {
            Some(&self.header)
        } else {
            self.rows.get(row - 1)
        };
        line.and_then(|l| l.get(col)).map(String::as_str).unwrap_or("")
    }
}

/// 表領域内の結合範囲（相対座標、領域境界でクリップ済み）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CellSpan {
    pub row: usize,
    pub col: usize,
    pub rowspan: usize,
    pub colspan: usize,
}

/// 画像プレースホルダー
#[derive(Debug, Clone, PartialEq)]
pub struct ImagePlaceholder {
    /// キャプション
    pub caption: String,

    /// 文書からの相対出力パス（例: `images/chart_001.png`）
    pub path: String,

    /// アンカーセル
    pub anchor: CellCoord,
}

/// 自由テキストの段落
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NarrativeBlock {
    /// 段落テキスト（行ごとに改行区切り）
    pub text: String,

    /// 段落の先頭座標
    pub anchor: CellCoord,
}

/// 目次の1項目
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentsEntry {
    /// 1始まりの番号
    pub number: usize,
    /// シート名
    pub name: String,
    /// 見出しアンカー
    pub anchor: String,
    /// 表の数
    pub tables: usize,
    /// 画像の数
    pub images: usize,
}

/// 参照の方向
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum Direction {
    /// このシートから他シートへの参照
    Outgoing,
    /// 他シートからこのシートへの参照
    Incoming,
}

impl Direction {
    /// 表示ラベル
    pub fn label(&self) -> &'static str {
        match self {
            Direction::Outgoing => "参照先",
            Direction::Incoming => "参照元",
        }
    }
}

/// 関連シートの注記1件
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RelatedSheet {
    /// 参照の方向
    pub direction: Direction,
    /// 相手シート名
    pub sheet: String,
    /// 相手側のセルまたは範囲
    pub cell: String,
    /// 相手シートの見出しアンカー（文書内にない場合は`None`）
    pub anchor: Option<String>,
}

/// シート名から文書内アンカーを生成
///
/// 空白と`_`をハイフンに置き換えて小文字化し、英数字（日本語を含む）と
/// ハイフン以外を取り除きます。
pub fn create_anchor(sheet_name: &str) -> String {
    sheet_name
        .replace([' ', '_'], "-")
        .to_lowercase()
        .chars()
        .filter(|c| c.is_alphanumeric() || *c == '-')
        .collect()
}

/// シート1枚分のセクションを組み立てる
#[derive(Debug)]
pub(crate) struct SectionBuilder<'a> {
    config: &'a ConversionConfig,
    formatter: CellFormatter,
    is_1904: bool,
}

impl<'a> SectionBuilder<'a> {
    pub fn new(config: &'a ConversionConfig, is_1904: bool) -> Self {
        Self {
            config,
            formatter: CellFormatter::new(),
            is_1904,
        }
    }

    /// シートのセクションを組み立てる
    ///
    /// # 引数
    ///
    /// * `sheet` - 入力シート
    /// * `anchor` - 見出しアンカー（重複解消済み）
    /// * `regions` - 検出済みの表領域
    /// * `first_image_number` - このシート最初の画像の通し番号（1始まり）
    ///
    /// # 戻り値
    ///
    /// 左上座標の行優先順に並んだサブブロックを持つセクション
    pub fn build(
        &self,
        sheet: &SheetGrid,
        anchor: String,
        regions: &[TableRegion],
        first_image_number: usize,
    ) -> Result<Section, XlsxRagError> {
        let mut anchored: Vec<(CellCoord, Block)> = Vec::new();

        // 1. 表ブロック
        for region in regions {
            anchored.push((region.range.start, Block::Table(self.table_block(sheet, region)?)));
        }

        // 2. 表領域外の自由テキスト
        for narrative in self.narrative_blocks(sheet, regions)? {
            anchored.push((narrative.anchor, Block::Narrative(narrative)));
        }

        // 3. 画像プレースホルダー
        if self.config.extract_images {
            for (offset, image) in sheet.images.iter().enumerate() {
                let number = first_image_number + offset;
                let placeholder = ImagePlaceholder {
                    caption: image.caption(number),
                    path: image_path(&self.config.image_dir, number, &image.extension),
                    anchor: image.anchor,
                };
                anchored.push((image.anchor, Block::Image(placeholder)));
            }
        }

        // 4. アンカー座標で安定ソート
        anchored.sort_by_key(|(coord, _)| *coord);

        Ok(Section {
            sheet_id: Some(sheet.name.clone()),
            title: sheet.name.clone(),
            anchor,
            blocks: anchored.into_iter().map(|(_, block)| block).collect(),
        })
    }

    fn table_block(&self, sheet: &SheetGrid, region: &TableRegion) -> Result<TableBlock, XlsxRagError> {
        let grid = &sheet.grid;
        let range = region.range;
        let mut lines: Vec<Vec<String>> = Vec::with_capacity(region.row_count as usize);

        for row in range.start.row..=range.end.row {
            let mut line = Vec::with_capacity(region.column_count as usize);
            for col in range.start.col..=range.end.col {
                let text = match grid.get(row as usize, col as usize) {
                    Some(cell) => self.formatter.format_cell(cell, self.config, self.is_1904)?,
                    None => String::new(),
                };
                line.push(text);
            }
            lines.push(line);
        }

        let spans = grid
            .merged_regions()
            .iter()
            .filter(|m| range.contains(m.parent))
            .map(|m| CellSpan {
                row: (m.parent.row - range.start.row) as usize,
                col: (m.parent.col - range.start.col) as usize,
                rowspan: (m.range.end.row.min(range.end.row) - m.parent.row + 1) as usize,
                colspan: (m.range.end.col.min(range.end.col) - m.parent.col + 1) as usize,
            })
            .filter(|s| s.rowspan > 1 || s.colspan > 1)
            .collect();

        let mut lines = lines.into_iter();
        let header = lines.next().unwrap_or_default();
        let rows: Vec<Vec<String>> = lines.collect();
        let summary = if self.config.table_summary {
            Some(table_summary(&header, &rows))
        } else {
            None
        };

        Ok(TableBlock {
            region: region.clone(),
            header,
            rows,
            spans,
            summary,
        })
    }

    /// 表領域外の占有セルを段落にまとめる
    ///
    /// 連続する行は1段落になり、同じ行のセルは空白1つで連結します。
    fn narrative_blocks(
        &self,
        sheet: &SheetGrid,
        regions: &[TableRegion],
    ) -> Result<Vec<NarrativeBlock>, XlsxRagError> {
        let grid = &sheet.grid;
        let mut blocks = Vec::new();
        let mut current: Option<(CellCoord, Vec<String>)> = None;

        for row in 0..grid.rows() {
            let mut parts = Vec::new();
            let mut first_col = None;
            for col in 0..grid.cols() {
                let coord = CellCoord::new(row as u32, col as u32);
                if !grid.is_occupied(row, col) || regions.iter().any(|r| r.range.contains(coord)) {
                    continue;
                }
                if let Some(cell) = grid.get(row, col) {
                    let text = self.formatter.format_cell(cell, self.config, self.is_1904)?;
                    if !text.is_empty() {
                        if first_col.is_none() {
                            first_col = Some(col as u32);
                        }
                        parts.push(text);
                    }
                }
            }

            let Some(col) = first_col else {
                // 空行で段落を閉じる
                if let Some((anchor, lines)) = current.take() {
                    blocks.push(NarrativeBlock {
                        text: lines.join("\n"),
                        anchor,
                    });
                }
                continue;
            };

            match current.as_mut() {
                Some((anchor, lines)) => {
                    anchor.col = anchor.col.min(col);
                    lines.push(parts.join(" "));
                }
                None => {
                    current = Some((CellCoord::new(row as u32, col), vec![parts.join(" ")]));
                }
            }
        }

        if let Some((anchor, lines)) = current.take() {
            blocks.push(NarrativeBlock {
                text: lines.join("\n"),
                anchor,
            });
        }
        Ok(blocks)
    }
}

/// 画像の出力パス（`images/chart_001.png`）
pub(crate) fn image_path(image_dir: &str, number: usize, extension: &str) -> String {
    let dir = image_dir.trim_end_matches('/');
    format!("{}/chart_{:03}.{}", dir, number, extension)
}

/// 表の統計的な要約（行数と数値列）
fn table_summary(header: &[String], rows: &[Vec<String>]) -> String {
    let mut parts = vec![format!("データ行数: {}行", rows.len())];

    let numeric: Vec<&str> = header
        .iter()
        .enumerate()
        .filter(|(col, _)| {
            let mut values = rows
                .iter()
                .filter_map(|r| r.get(*col))
                .filter(|v| !v.is_empty())
                .peekable();
            values.peek().is_some() && values.all(|v| v.replace(',', "").parse::<f64>().is_ok())
        })
        .map(|(_, name)| name.as_str())
        .filter(|name| !name.is_empty())
        .collect();
    if !numeric.is_empty() {
        parts.push(format!("数値列: {}", numeric.join(", ")));
    }

    format!("【テーブル要約】 {}", parts.join("、"))
}
