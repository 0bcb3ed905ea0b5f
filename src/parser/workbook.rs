//! Workbook Parser Module
//!
//! calamineでセル値・数式・結合範囲を読み取り、パッケージ情報と合わせて
//! 変換用の`Workbook`を組み立てる。

use std::collections::HashMap;
use std::io::Cursor;

use calamine::{open_workbook_auto_from_rs, Data, Reader, Sheets, Xlsx};

use crate::api::SheetSelector;
use crate::error::XlsxRagError;
use crate::grid::GridModel;
use crate::parser::PackageInfo;
use crate::security::SecurityConfig;
use crate::types::{CellCoord, CellRange, CellValue, MergedRegion, RawCell};
use crate::workbook::{SheetGrid, Workbook};

/// ワークブックパーサー
///
/// 入力全体をメモリ上に保持し、calamineとパッケージリーダーの両方から参照します。
pub(crate) struct WorkbookParser {
    /// calamineのワークブック（XLSX形式のみサポート）
    workbook: Xlsx<Cursor<Vec<u8>>>,
    /// パッケージから直接読んだ情報
    package: PackageInfo,
}

impl WorkbookParser {
    /// バイト列からワークブックを開く
    ///
    /// # 戻り値
    ///
    /// * `Ok(WorkbookParser)` - 読み込みに成功した場合
    /// * `Err(XlsxRagError::SecurityViolation)` - 入力やパッケージが上限を超える場合
    /// * `Err(XlsxRagError::InvalidInput)` - XLSX形式でない場合
    pub fn open(bytes: Vec<u8>) -> Result<Self, XlsxRagError> {
        let security = SecurityConfig::default();
        security.check_input_size(bytes.len() as u64)?;

        // 1. パッケージ情報（セキュリティ検査を含む）
        let package = PackageInfo::read(&bytes, &security)?;

        // 2. calamineでワークブックを開く
        let sheets = open_workbook_auto_from_rs(Cursor::new(bytes))?;
        let workbook = match sheets {
            Sheets::Xlsx(workbook) => workbook,
            _ => {
                return Err(XlsxRagError::InvalidInput(
                    "Only XLSX format is supported".to_string(),
                ))
            }
        };

        Ok(Self { workbook, package })
    }

    /// すべてのシート名（ワークブック順）
    pub fn sheet_names(&self) -> Vec<String> {
        self.workbook.sheet_names().to_vec()
    }

    /// シート選択方式に基づいてシートを選択
    ///
    /// `SheetSelector::All` では非表示シートを`include_hidden`に従って除外します。
    /// 名前やインデックスで明示されたシートは非表示でも対象にします。
    ///
    /// # 戻り値
    ///
    /// * `Ok(Vec<String>)` - 選択されたシート名（重複なし、指定順）
    /// * `Err(XlsxRagError::Config)` - シートが見つからない、またはインデックスが範囲外の場合
    pub fn select_sheets(
        &self,
        selector: &SheetSelector,
        include_hidden: bool,
    ) -> Result<Vec<String>, XlsxRagError> {
        let all = self.sheet_names();
        let by_index = |index: usize| {
            all.get(index).cloned().ok_or_else(|| {
                XlsxRagError::Config(format!(
                    "Sheet index {} is out of range (total: {})",
                    index,
                    all.len()
                ))
            })
        };
        let by_name = |name: &String| {
            if all.contains(name) {
                Ok(name.clone())
            } else {
                Err(XlsxRagError::Config(format!("Sheet '{}' not found", name)))
            }
        };

        let selected: Vec<String> = match selector {
            SheetSelector::All => all
                .iter()
                .filter(|name| {
                    let keep = include_hidden || !self.package.is_hidden(name);
                    if !keep {
                        tracing::debug!(sheet = %name, "skipping hidden sheet");
                    }
                    keep
                })
                .cloned()
                .collect(),
            SheetSelector::Index(index) => vec![by_index(*index)?],
            SheetSelector::Name(name) => vec![by_name(name)?],
            SheetSelector::Indices(indices) => indices
                .iter()
                .map(|&i| by_index(i))
                .collect::<Result<_, _>>()?,
            SheetSelector::Names(names) => names.iter().map(by_name).collect::<Result<_, _>>()?,
        };

        let mut unique = Vec::with_capacity(selected.len());
        for name in selected {
            if !unique.contains(&name) {
                unique.push(name);
            }
        }
        Ok(unique)
    }

    /// シートを読み取ってグリッドを構築
    ///
    /// calamineの`Range`は使用範囲の左上を原点とする相対座標のため、
    /// 開始位置を加えてシート上の絶対座標に戻します。
    pub fn parse_sheet(&mut self, sheet_name: &str) -> Result<GridModel, XlsxRagError> {
        // 1. 値の範囲
        let range = self
            .workbook
            .worksheet_range(sheet_name)
            .map_err(|e| XlsxRagError::Parse(e.into()))?;
        let (row_offset, col_offset) = range.start().unwrap_or((0, 0));

        // 2. 数式（1回だけ取得して全セルで再利用）
        let mut formulas: HashMap<CellCoord, String> = HashMap::new();
        if let Ok(formula_range) = self.workbook.worksheet_formula(sheet_name) {
            let (fr, fc) = formula_range.start().unwrap_or((0, 0));
            for (row, col, formula) in formula_range.used_cells() {
                if !formula.trim().is_empty() {
                    formulas.insert(CellCoord::new(fr + row as u32, fc + col as u32), formula.clone());
                }
            }
        }

        // 3. セルの抽出
        let mut cells = Vec::new();
        for (row, col, data) in range.used_cells() {
            let coord = CellCoord::new(row_offset + row as u32, col_offset + col as u32);
            let (value, is_date) = convert_data(data);
            let value = match formulas.remove(&coord) {
                Some(text) => CellValue::Formula {
                    text,
                    cached: Box::new(value),
                },
                None => value,
            };
            if matches!(value, CellValue::Empty) {
                continue;
            }
            cells.push(RawCell { coord, value, is_date });
        }

        // キャッシュ値を持たない数式セル
        let mut orphaned: Vec<(CellCoord, String)> = formulas.into_iter().collect();
        orphaned.sort_by_key(|(coord, _)| *coord);
        for (coord, text) in orphaned {
            cells.push(RawCell::new(
                coord,
                CellValue::Formula {
                    text,
                    cached: Box::new(CellValue::Empty),
                },
            ));
        }

        // 4. 結合範囲
        self.workbook
            .load_merged_regions()
            .map_err(|e| XlsxRagError::Parse(e.into()))?;
        let merged_regions = match self.workbook.worksheet_merge_cells(sheet_name) {
            Some(Ok(regions)) => regions
                .iter()
                .map(|dims| {
                    let start = CellCoord::new(dims.start.0, dims.start.1);
                    let end = CellCoord::new(dims.end.0, dims.end.1);
                    MergedRegion::new(CellRange::new(start, end))
                })
                .collect(),
            Some(Err(e)) => {
                tracing::warn!(sheet = %sheet_name, error = %e, "failed to read merged regions");
                Vec::new()
            }
            None => Vec::new(),
        };

        Ok(GridModel::build(cells, merged_regions))
    }

    /// 選択されたシートを読み取って`Workbook`を組み立てる
    ///
    /// # 引数
    ///
    /// * `selector` - シート選択方式
    /// * `include_hidden` - 非表示シートを含めるか
    /// * `file_name` - 入力ファイル名（メタデータ用）
    pub fn read_workbook(
        mut self,
        selector: &SheetSelector,
        include_hidden: bool,
        file_name: Option<String>,
    ) -> Result<Workbook, XlsxRagError> {
        let all_names = self.sheet_names();
        let selected = self.select_sheets(selector, include_hidden)?;

        let mut sheets = Vec::with_capacity(selected.len());
        for name in &selected {
            let grid = self.parse_sheet(name)?;
            let index = all_names.iter().position(|n| n == name).unwrap_or(0);
            let mut sheet = SheetGrid::new(name.clone(), index, grid);
            sheet.hidden = self.package.is_hidden(name);
            sheet.images = self.package.images.remove(name).unwrap_or_default();
            sheets.push(sheet);
        }

        let mut properties = std::mem::take(&mut self.package.properties);
        properties.file_name = file_name;

        Ok(Workbook {
            sheets,
            sheet_names: all_names,
            properties,
            is_1904: self.package.is_1904,
        })
    }
}

/// calamineのセル値を変換（日付書式の数値は`is_date`を立てる）
fn convert_data(data: &Data) -> (CellValue, bool) {
    match data {
        Data::Int(i) => (CellValue::Number(*i as f64), false),
        Data::Float(f) => (CellValue::Number(*f), false),
        Data::String(s) => (CellValue::Text(s.clone()), false),
        Data::Bool(b) => (CellValue::Bool(*b), false),
        Data::DateTime(dt) => (CellValue::Number(dt.as_f64()), true),
        Data::DateTimeIso(s) | Data::DurationIso(s) => (CellValue::Text(s.clone()), false),
        Data::Error(e) => (CellValue::Text(e.to_string()), false),
        Data::Empty => (CellValue::Empty, false),
    }
}
