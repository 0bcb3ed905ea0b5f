//! Table Detector Module
//!
//! グリッドを上から下へ走査し、表領域（ヘッダー行を持つ連続した矩形ブロック）を検出する。
//!
//! 走査は3状態の有限状態機械として表現します。
//!
//! - `Seeking`: 2つ以上の隣接した占有セルを含む行を探す。見つかった最左の
//!   連続区間がヘッダー行の列範囲となり、以降この列範囲は固定される。
//! - `InHeader`: 次の行が列範囲内に占有セルを持てば `InBody` へ。
//!   持たなければ候補を破棄（1行のみの候補は自由テキスト扱い）。
//! - `InBody`: 列範囲内で空の行、またはシート末尾で領域を確定する。
//!
//! 結合セルは1つの論理セルとして数えるため、横長の見出しバナーは
//! 1列扱いとなり表として誤検出されません。ヘッダー行の結合セルは
//! 列範囲を結合範囲の右端まで広げます。

use crate::grid::GridModel;
use crate::types::{CellCoord, CellRange};

/// 検出された表領域
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableRegion {
    /// 所属シート名
    pub sheet_id: String,

    /// 外接矩形（ヘッダー行を含む）
    pub range: CellRange,

    /// 領域内でのヘッダー行の位置（0 = 先頭行）
    pub header_row_index: u32,

    /// 列数
    pub column_count: u32,

    /// 行数（ヘッダー行を含む）
    pub row_count: u32,

    /// `max_columns` により切り捨てられた列数
    pub truncated_columns: u32,
}

impl TableRegion {
    /// ヘッダー行の絶対行番号
    pub fn header_row(&self) -> u32 {
        self.range.start.row + self.header_row_index
    }
}

/// 走査状態
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ScanState {
    /// 表の開始行を探している
    Seeking,

    /// ヘッダー行を確定し、最初のデータ行を待っている
    InHeader { header_row: usize, span: ColumnSpan },

    /// データ行を読み進めている
    InBody {
        header_row: usize,
        last_row: usize,
        span: ColumnSpan,
    },
}

/// 固定された列範囲（両端を含む）
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct ColumnSpan {
    start: usize,
    end: usize,
    truncated: usize,
}

/// 表領域検出器
#[derive(Debug, Clone)]
pub struct TableDetector {
    /// 1つの表が持てる最大列数
    max_columns: usize,
}

impl TableDetector {
    /// 新しい検出器を生成
    ///
    /// # 引数
    ///
    /// * `max_columns` - 列数の上限（超過分は切り捨ててwarnログを出力）
    pub fn new(max_columns: usize) -> Self {
        Self {
            max_columns: max_columns.max(2),
        }
    }

    /// グリッドから表領域を検出する
    ///
    /// # 引数
    ///
    /// * `sheet_id` - シート名（結果の`TableRegion`に記録）
    /// * `grid` - 走査対象のグリッド
    ///
    /// # 戻り値
    ///
    /// 左上座標の行優先順に並んだ、互いに重ならない表領域のリスト
    pub fn detect(&self, sheet_id: &str, grid: &GridModel) -> Vec<TableRegion> {
        let mut regions = Vec::new();
        let mut state = ScanState::Seeking;
        let mut row = 0;

        while row < grid.rows() {
            state = match state {
                ScanState::Seeking => {
                    let next = match self.header_span(sheet_id, grid, row) {
                        Some(span) => ScanState::InHeader {
                            header_row: row,
                            span,
                        },
                        None => ScanState::Seeking,
                    };
                    row += 1;
                    next
                }
                ScanState::InHeader { header_row, span } => {
                    if grid.row_is_blank(row, span.start, span.end) {
                        // データ行のない1行候補は破棄し、この行から再走査する
                        ScanState::Seeking
                    } else {
                        row += 1;
                        ScanState::InBody {
                            header_row,
                            last_row: row - 1,
                            span,
                        }
                    }
                }
                ScanState::InBody {
                    header_row,
                    last_row,
                    span,
                } => {
                    if grid.row_is_blank(row, span.start, span.end) {
                        regions.push(Self::region(sheet_id, header_row, last_row, span));
                        ScanState::Seeking
                    } else {
                        row += 1;
                        ScanState::InBody {
                            header_row,
                            last_row: row - 1,
                            span,
                        }
                    }
                }
            };
        }

        // シート末尾で領域を確定
        if let ScanState::InBody {
            header_row,
            last_row,
            span,
        } = state
        {
            regions.push(Self::region(sheet_id, header_row, last_row, span));
        }

        regions
    }

    /// ヘッダー候補となる最左の連続占有区間を探す（論理セル2つ以上）
    ///
    /// 結合セルは1つの論理セルとして数え、区間は結合範囲の右端まで広げます。
    fn header_span(&self, sheet_id: &str, grid: &GridModel, row: usize) -> Option<ColumnSpan> {
        let last_col = grid.cols().checked_sub(1)?;
        let reach = |col: usize| {
            let (_, colspan) = grid.merge_span_at(CellCoord::new(row as u32, col as u32));
            (col + colspan.max(1) as usize - 1).min(last_col)
        };

        let mut col = 0;
        while col <= last_col {
            if !grid.is_occupied(row, col) {
                col += 1;
                continue;
            }
            let start = col;
            let mut end = reach(col);
            let mut logical_cells = 1;
            while end < last_col && grid.is_occupied(row, end + 1) {
                end = reach(end + 1);
                logical_cells += 1;
            }
            if logical_cells >= 2 {
                return Some(self.cap_span(sheet_id, row, start, end));
            }
            col = end + 1;
        }
        None
    }

    /// 列数の上限を適用
    fn cap_span(&self, sheet_id: &str, row: usize, start: usize, end: usize) -> ColumnSpan {
        let width = end - start + 1;
        if width <= self.max_columns {
            return ColumnSpan {
                start,
                end,
                truncated: 0,
            };
        }

        let truncated = width - self.max_columns;
        tracing::warn!(
            sheet = %sheet_id,
            row = row + 1,
            columns = width,
            max_columns = self.max_columns,
            "table header exceeds max_columns; truncating span"
        );
        ColumnSpan {
            start,
            end: start + self.max_columns - 1,
            truncated,
        }
    }

    fn region(sheet_id: &str, header_row: usize, last_row: usize, span: ColumnSpan) -> TableRegion {
        let range = CellRange::new(
            CellCoord::new(header_row as u32, span.start as u32),
            CellCoord::new(last_row as u32, span.end as u32),
        );
        let (row_count, column_count) = range.size();
        TableRegion {
            sheet_id: sheet_id.to_string(),
            range,
            header_row_index: 0,
            column_count,
            row_count,
            truncated_columns: span.truncated as u32,
        }
    }
}
