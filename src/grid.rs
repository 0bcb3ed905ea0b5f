//! Grid Module
//!
//! スパースなセルデータから稠密なグリッド構造への変換を提供するモジュール。
//! 結合セルは親セル（アンカー）にのみ値を持たせ、範囲内の他のセルは
//! アンカー座標を参照する空セルとして保持します。

use crate::types::{CellCoord, CellRange, CellValue, MergedRegion, RawCell};

/// グリッド上の1セル
#[derive(Debug, Clone, PartialEq)]
pub struct Cell {
    /// セルの値（結合範囲の非アンカーセルは常に`Empty`）
    pub value: CellValue,

    /// 日付書式の数値かどうか
    pub is_date: bool,

    /// 所属する結合範囲のアンカー座標（アンカー自身も含む）
    pub merge_anchor: Option<CellCoord>,
}

impl Cell {
    /// 新しい通常セルを生成
    pub fn new(value: CellValue) -> Self {
        Self {
            value,
            is_date: false,
            merge_anchor: None,
        }
    }

    /// 空セルを生成
    pub fn empty() -> Self {
        Self::new(CellValue::Empty)
    }
}

/// 1シート分の正規化されたセルグリッド
///
/// 不変条件: 結合範囲内のすべての座標は同じアンカーを指し、
/// アンカーのみが値を保持します。
#[derive(Debug, Clone, PartialEq)]
pub struct GridModel {
    /// グリッドデータ（行 × 列）
    cells: Vec<Vec<Cell>>,

    /// 行数
    rows: usize,

    /// 列数
    cols: usize,

    /// 結合セル範囲
    merged_regions: Vec<MergedRegion>,
}

impl GridModel {
    /// スパースなセルデータと結合範囲から稠密なグリッドを構築
    ///
    /// # 引数
    ///
    /// * `cells` - 生のセルデータ
    /// * `merged_regions` - 結合セル範囲のリスト
    ///
    /// # 戻り値
    ///
    /// 構築されたグリッド。結合範囲がセル範囲外に及ぶ場合はグリッドを拡張します。
    pub fn build(cells: Vec<RawCell>, merged_regions: Vec<MergedRegion>) -> Self {
        // 1. グリッドサイズの決定
        let (rows, cols) = Self::determine_grid_size(&cells, &merged_regions);

        // 2. 空のグリッドを初期化してセルを配置
        let mut grid_cells = vec![vec![Cell::empty(); cols]; rows];
        for raw in cells {
            let target = &mut grid_cells[raw.coord.row as usize][raw.coord.col as usize];
            target.value = raw.value;
            target.is_date = raw.is_date;
        }

        // 3. 結合範囲の正規化（アンカー以外の値を消去）
        for region in &merged_regions {
            for row in region.range.start.row..=region.range.end.row {
                for col in region.range.start.col..=region.range.end.col {
                    let cell = &mut grid_cells[row as usize][col as usize];
                    cell.merge_anchor = Some(region.parent);
                    if row != region.parent.row || col != region.parent.col {
                        cell.value = CellValue::Empty;
                        cell.is_date = false;
                    }
                }
            }
        }

        Self {
            cells: grid_cells,
            rows,
            cols,
            merged_regions,
        }
    }

    /// 行ごとの値リストからグリッドを構築（結合なし）
    pub fn from_rows(rows: Vec<Vec<CellValue>>) -> Self {
        let cells = rows
            .into_iter()
            .enumerate()
            .flat_map(|(r, row)| {
                row.into_iter()
                    .enumerate()
                    .filter(|(_, v)| !matches!(v, CellValue::Empty))
                    .map(move |(c, v)| RawCell::new(CellCoord::new(r as u32, c as u32), v))
            })
            .collect();
        Self::build(cells, Vec::new())
    }

    /// グリッドサイズを決定（内部ヘルパー）
    fn determine_grid_size(cells: &[RawCell], merged: &[MergedRegion]) -> (usize, usize) {
        let cell_ends = cells.iter().map(|c| c.coord);
        let merge_ends = merged.iter().map(|m| m.range.end);
        let mut bounds: Option<(u32, u32)> = None;
        for coord in cell_ends.chain(merge_ends) {
            let (r, c) = bounds.unwrap_or((0, 0));
            bounds = Some((r.max(coord.row), c.max(coord.col)));
        }
        match bounds {
            Some((r, c)) => ((r + 1) as usize, (c + 1) as usize),
            None => (0, 0),
        }
    }

    /// 行数を取得
    pub fn rows(&self) -> usize {
        self.rows
    }

    /// 列数を取得
    pub fn cols(&self) -> usize {
        self.cols
    }

    /// 指定座標のセルを取得
    pub fn get(&self, row: usize, col: usize) -> Option<&Cell> {
        self.cells.get(row).and_then(|r| r.get(col))
    }

    /// 指定された行を取得
    pub fn row(&self, row_idx: usize) -> &[Cell] {
        self.cells.get(row_idx).map(|r| r.as_slice()).unwrap_or(&[])
    }

    /// 結合セル範囲を取得
    pub fn merged_regions(&self) -> &[MergedRegion] {
        &self.merged_regions
    }

    /// 指定座標をアンカーとする結合範囲の (rowspan, colspan)
    pub fn merge_span_at(&self, coord: CellCoord) -> (u32, u32) {
        self.merged_regions
            .iter()
            .find(|m| m.parent == coord)
            .map(|m| (m.row_span(), m.col_span()))
            .unwrap_or((1, 1))
    }

    /// 空判定用にセルが占有されているか
    ///
    /// 結合範囲はアンカー座標のみを占有とみなします（非アンカーは値を持たないため）。
    pub fn is_occupied(&self, row: usize, col: usize) -> bool {
        self.get(row, col)
            .map(|cell| !cell.value.is_empty())
            .unwrap_or(false)
    }

    /// 指定列範囲内で行が空かどうか（両端を含む）
    pub fn row_is_blank(&self, row: usize, col_start: usize, col_end: usize) -> bool {
        (col_start..=col_end).all(|c| !self.is_occupied(row, c))
    }

    /// すべての数式セルを行優先順で列挙
    pub fn formula_cells(&self) -> impl Iterator<Item = (CellCoord, &str)> + '_ {
        self.cells.iter().enumerate().flat_map(|(r, row)| {
            row.iter().enumerate().filter_map(move |(c, cell)| {
                cell.value
                    .formula_text()
                    .map(|text| (CellCoord::new(r as u32, c as u32), text))
            })
        })
    }

    /// 値を持つセルの外接範囲（空シートの場合は`None`）
    pub fn used_range(&self) -> Option<CellRange> {
        let mut bounds: Option<(u32, u32, u32, u32)> = None;
        for r in 0..self.rows {
            for c in 0..self.cols {
                if self.is_occupied(r, c) {
                    let (r, c) = (r as u32, c as u32);
                    bounds = Some(match bounds {
                        None => (r, c, r, c),
                        Some((r0, c0, r1, c1)) => (r0.min(r), c0.min(c), r1.max(r), c1.max(c)),
                    });
                }
            }
        }
        bounds.map(|(r0, c0, r1, c1)| {
            CellRange::new(CellCoord::new(r0, c0), CellCoord::new(r1, c1))
        })
    }
}
