//! Workbook Module
//!
//! デコーダーからアセンブラーへ渡すワークブック表現。
//! 変換中は不変のスナップショットとして扱われます。

use std::sync::Arc;

use crate::grid::GridModel;
use crate::types::CellCoord;

/// シートに埋め込まれたラスター画像
#[derive(Debug, Clone, PartialEq)]
pub struct SheetImage {
    /// 配置先のアンカーセル（左上）
    pub anchor: CellCoord,

    /// 描画オブジェクト名（`xdr:cNvPr@name`）
    pub name: Option<String>,

    /// 代替テキスト（`xdr:cNvPr@descr`）
    pub description: Option<String>,

    /// 拡張子（`png`、`jpeg` など）
    pub extension: String,

    /// 画像のバイト列
    pub data: Arc<Vec<u8>>,
}

impl SheetImage {
    /// 画像のキャプション（代替テキスト、名前、連番の順に採用）
    pub fn caption(&self, number: usize) -> String {
        let non_blank = |s: &Option<String>| {
            s.as_deref()
                .map(str::trim)
                .filter(|t| !t.is_empty())
                .map(str::to_string)
        };
        non_blank(&self.description)
            .or_else(|| non_blank(&self.name))
            .unwrap_or_else(|| format!("Image {}", number))
    }
}

/// 1シート分の入力
#[derive(Debug, Clone, PartialEq)]
pub struct SheetGrid {
    /// シート名
    pub name: String,

    /// ワークブック内でのインデックス（0始まり）
    pub index: usize,

    /// 非表示シートかどうか
    pub hidden: bool,

    /// セルグリッド
    pub grid: GridModel,

    /// 埋め込み画像（アンカー順）
    pub images: Vec<SheetImage>,
}

impl SheetGrid {
    /// 画像なしのシートを生成
    pub fn new(name: impl Into<String>, index: usize, grid: GridModel) -> Self {
        Self {
            name: name.into(),
            index,
            hidden: false,
            grid,
            images: Vec::new(),
        }
    }
}

/// 文書プロパティ（`docProps/core.xml`）
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DocumentProperties {
    /// 入力ファイル名
    pub file_name: Option<String>,

    /// タイトル
    pub title: Option<String>,

    /// 作成者
    pub creator: Option<String>,
}

/// 変換対象のワークブック
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Workbook {
    /// 変換対象のシート（シート順）
    pub sheets: Vec<SheetGrid>,

    /// ワークブック内のすべてのシート名（参照解決に使用）
    pub sheet_names: Vec<String>,

    /// 文書プロパティ
    pub properties: DocumentProperties,

    /// 1904年エポックを使用するか
    pub is_1904: bool,
}

impl Workbook {
    /// (シート名, グリッド) の列からワークブックを生成
    ///
    /// # 使用例
    ///
    /// ```rust
    /// use xlsxrag::{CellValue, GridModel, Workbook};
    ///
    /// let grid = GridModel::from_rows(vec![vec![
    ///     CellValue::Text("Name".to_string()),
    ///     CellValue::Text("Qty".to_string()),
    /// ]]);
    /// let workbook = Workbook::from_grids(vec![("Sheet1", grid)]);
    /// assert_eq!(workbook.sheet_names, vec!["Sheet1".to_string()]);
    /// ```
    pub fn from_grids<S: Into<String>>(grids: Vec<(S, GridModel)>) -> Self {
        let sheets: Vec<SheetGrid> = grids
            .into_iter()
            .enumerate()
            .map(|(index, (name, grid))| SheetGrid::new(name, index, grid))
            .collect();
        let sheet_names = sheets.iter().map(|s| s.name.clone()).collect();
        Self {
            sheets,
            sheet_names,
            properties: DocumentProperties::default(),
            is_1904: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn image(name: Option<&str>, descr: Option<&str>) -> SheetImage {
        SheetImage {
            anchor: CellCoord::new(0, 0),
            name: name.map(str::to_string),
            description: descr.map(str::to_string),
            extension: "png".to_string(),
            data: Arc::new(vec![]),
        }
    }

    #[test]
    fn test_caption_priority() {
        assert_eq!(image(Some("Picture 1"), Some("Sales chart")).caption(1), "Sales chart");
        assert_eq!(image(Some("Picture 1"), Some("  ")).caption(1), "Picture 1");
        assert_eq!(image(None, None).caption(3), "Image 3");
    }

    #[test]
    fn test_from_grids_assigns_indices() {
        let workbook = Workbook::from_grids(vec![
            ("A", GridModel::from_rows(vec![])),
            ("B", GridModel::from_rows(vec![])),
        ]);
        assert_eq!(workbook.sheets[1].index, 1);
        assert_eq!(workbook.sheet_names, vec!["A".to_string(), "B".to_string()]);
    }
}
