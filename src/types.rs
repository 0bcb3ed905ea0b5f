//! Types Module
//!
//! クレート全体で使用する共通データ型を定義するモジュール。

use std::fmt;

/// セルの値を表す閉じたタグ付き列挙型
///
/// 検出・抽出ロジックは実行時の型判定ではなく、この列挙型への
/// 網羅的なパターンマッチで分岐します。
#[derive(Debug, Clone, PartialEq)]
pub enum CellValue {
    /// 空セル
    Empty,

    /// 文字列（エラー値 `#DIV/0!` なども文字列として保持）
    Text(String),

    /// 数値
    Number(f64),

    /// 論理値
    Bool(bool),

    /// 数式とキャッシュされた計算結果
    Formula {
        /// 数式文字列（先頭の `=` は任意）
        text: String,
        /// キャッシュ値（未計算の場合は `Empty`）
        cached: Box<CellValue>,
    },
}

impl CellValue {
    /// 値が空かどうかを判定
    ///
    /// 数式セルは数式文字列を持つため、キャッシュ値が空でも空とはみなしません。
    pub fn is_empty(&self) -> bool {
        match self {
            CellValue::Empty => true,
            CellValue::Text(s) => s.trim().is_empty(),
            CellValue::Number(_) | CellValue::Bool(_) => false,
            CellValue::Formula { text, .. } => text.trim().is_empty(),
        }
    }

    /// 数式文字列を取得（数式セルでない場合は`None`）
    pub fn formula_text(&self) -> Option<&str> {
        match self {
            CellValue::Formula { text, .. } => Some(text.as_str()),
            _ => None,
        }
    }

    /// 値を文字列として取得（書式適用前）
    pub fn as_raw_string(&self) -> String {
        match self {
            CellValue::Empty => String::new(),
            CellValue::Text(s) => s.clone(),
            CellValue::Number(n) => n.to_string(),
            CellValue::Bool(b) => if *b { "TRUE" } else { "FALSE" }.to_string(),
            CellValue::Formula { cached, .. } => cached.as_raw_string(),
        }
    }
}

/// セル座標（0始まり）
///
/// 順序は行優先（row, col）です。
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct CellCoord {
    pub row: u32,
    pub col: u32,
}

impl CellCoord {
    /// 新しい座標を生成
    pub fn new(row: u32, col: u32) -> Self {
        Self { row, col }
    }

    /// A1形式の文字列に変換（例: (0, 0) -> "A1"）
    #[allow(clippy::wrong_self_convention)]
    pub fn to_a1_notation(&self) -> String {
        format!("{}{}", col_index_to_letters(self.col), self.row + 1)
    }

    /// A1形式の文字列から座標を生成
    ///
    /// 絶対参照記号 `$` は無視します。大文字小文字は区別しません。
    ///
    /// # 戻り値
    ///
    /// * `Some(CellCoord)` - 解析に成功した場合
    /// * `None` - 列文字または行番号が欠けている、行番号が0の場合
    pub fn from_a1(s: &str) -> Option<Self> {
        let cleaned: String = s.chars().filter(|c| *c != '$').collect();
        let split = cleaned.find(|c: char| c.is_ascii_digit())?;
        let (letters, digits) = cleaned.split_at(split);
        let col = letters_to_col_index(letters)?;
        if !digits.chars().all(|c| c.is_ascii_digit()) {
            return None;
        }
        let row: u32 = digits.parse().ok()?;
        if row == 0 {
            return None;
        }
        Some(Self::new(row - 1, col))
    }
}

impl fmt::Display for CellCoord {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1_notation())
    }
}

/// 列インデックスを文字列に変換（0 -> "A", 25 -> "Z", 26 -> "AA"）
pub(crate) fn col_index_to_letters(mut col: u32) -> String {
    let mut result = String::new();
    loop {
        let remainder = col % 26;
        result.insert(0, (b'A' + remainder as u8) as char);
        if col < 26 {
            break;
        }
        col = col / 26 - 1;
    }
    result
}

/// 列文字を列インデックスに変換（"A" -> 0, "AA" -> 26）
pub(crate) fn letters_to_col_index(letters: &str) -> Option<u32> {
    if letters.is_empty() || letters.len() > 3 {
        return None;
    }
    let mut col: u32 = 0;
    for ch in letters.chars() {
        if !ch.is_ascii_alphabetic() {
            return None;
        }
        col = col * 26 + (ch.to_ascii_uppercase() as u32 - 'A' as u32 + 1);
    }
    Some(col - 1)
}

/// セル範囲（両端を含む）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CellRange {
    pub start: CellCoord,
    pub end: CellCoord,
}

impl CellRange {
    /// 新しい範囲を生成
    pub fn new(start: CellCoord, end: CellCoord) -> Self {
        Self { start, end }
    }

    /// 指定された座標が範囲内にあるかを判定
    pub fn contains(&self, coord: CellCoord) -> bool {
        coord.row >= self.start.row
            && coord.row <= self.end.row
            && coord.col >= self.start.col
            && coord.col <= self.end.col
    }

    /// 2つの範囲が重なるかを判定
    pub fn intersects(&self, other: &CellRange) -> bool {
        self.start.row <= other.end.row
            && other.start.row <= self.end.row
            && self.start.col <= other.end.col
            && other.start.col <= self.end.col
    }

    /// 範囲のサイズ（行数, 列数）
    pub fn size(&self) -> (u32, u32) {
        let rows = self.end.row - self.start.row + 1;
        let cols = self.end.col - self.start.col + 1;
        (rows, cols)
    }

    /// A1形式の文字列に変換（例: "B1:B10"、単一セルは "B1"）
    #[allow(clippy::wrong_self_convention)]
    pub fn to_a1_notation(&self) -> String {
        if self.start == self.end {
            self.start.to_a1_notation()
        } else {
            format!(
                "{}:{}",
                self.start.to_a1_notation(),
                self.end.to_a1_notation()
            )
        }
    }
}

impl fmt::Display for CellRange {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.to_a1_notation())
    }
}

/// セル結合範囲の情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MergedRegion {
    /// 結合範囲
    pub range: CellRange,

    /// 親セル（左上セル）の座標
    pub parent: CellCoord,
}

impl MergedRegion {
    /// 新しい結合範囲を生成
    pub fn new(range: CellRange) -> Self {
        Self {
            parent: range.start,
            range,
        }
    }

    /// 指定された座標が結合範囲内にあるかを判定
    pub fn contains(&self, coord: CellCoord) -> bool {
        self.range.contains(coord)
    }

    /// 結合セルの行数
    pub fn row_span(&self) -> u32 {
        self.range.end.row - self.range.start.row + 1
    }

    /// 結合セルの列数
    pub fn col_span(&self) -> u32 {
        self.range.end.col - self.range.start.col + 1
    }
}

/// パーサーから抽出された生のセルデータ
#[derive(Debug, Clone, PartialEq)]
pub struct RawCell {
    /// セル座標
    pub coord: CellCoord,

    /// セルの値
    pub value: CellValue,

    /// 日付として書式設定された数値かどうか
    pub is_date: bool,
}

impl RawCell {
    /// 新しい生セルを生成
    pub fn new(coord: CellCoord, value: CellValue) -> Self {
        Self {
            coord,
            value,
            is_date: false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_cell_value_is_empty() {
        assert!(CellValue::Empty.is_empty());
        assert!(CellValue::Text("   ".to_string()).is_empty());
        assert!(!CellValue::Number(0.0).is_empty());
        assert!(!CellValue::Text("x".to_string()).is_empty());
        assert!(!CellValue::Bool(false).is_empty());

        // キャッシュ値が空でも数式は空ではない
        let formula = CellValue::Formula {
            text: "=Sheet2!A1".to_string(),
            cached: Box::new(CellValue::Empty),
        };
        assert!(!formula.is_empty());
        assert_eq!(formula.formula_text(), Some("=Sheet2!A1"));
    }

    #[test]
    fn test_cell_value_as_raw_string() {
        assert_eq!(CellValue::Empty.as_raw_string(), "");
        assert_eq!(CellValue::Number(42.5).as_raw_string(), "42.5");
        assert_eq!(CellValue::Bool(true).as_raw_string(), "TRUE");
        let formula = CellValue::Formula {
            text: "=A1*2".to_string(),
            cached: Box::new(CellValue::Number(4.0)),
        };
        assert_eq!(formula.as_raw_string(), "4");
    }

    #[test]
    fn test_cell_coord_to_a1_notation() {
        assert_eq!(CellCoord::new(0, 0).to_a1_notation(), "A1");
        assert_eq!(CellCoord::new(0, 25).to_a1_notation(), "Z1");
        assert_eq!(CellCoord::new(0, 26).to_a1_notation(), "AA1");
        assert_eq!(CellCoord::new(99, 701).to_a1_notation(), "ZZ100");
        assert_eq!(CellCoord::new(0, 702).to_a1_notation(), "AAA1");
    }

    #[test]
    fn test_cell_coord_from_a1() {
        assert_eq!(CellCoord::from_a1("A1"), Some(CellCoord::new(0, 0)));
        assert_eq!(CellCoord::from_a1("$B$10"), Some(CellCoord::new(9, 1)));
        assert_eq!(CellCoord::from_a1("aa3"), Some(CellCoord::new(2, 26)));
        assert_eq!(CellCoord::from_a1("A0"), None);
        assert_eq!(CellCoord::from_a1("12"), None);
        assert_eq!(CellCoord::from_a1("A"), None);
        assert_eq!(CellCoord::from_a1("A1B"), None);
    }

    #[test]
    fn test_cell_coord_ordering_is_row_major() {
        let mut coords = vec![
            CellCoord::new(1, 0),
            CellCoord::new(0, 5),
            CellCoord::new(0, 1),
        ];
        coords.sort();
        assert_eq!(
            coords,
            vec![
                CellCoord::new(0, 1),
                CellCoord::new(0, 5),
                CellCoord::new(1, 0)
            ]
        );
    }

    #[test]
    fn test_cell_range_contains_and_size() {
        let range = CellRange::new(CellCoord::new(0, 0), CellCoord::new(10, 5));
        assert!(range.contains(CellCoord::new(5, 3)));
        assert!(!range.contains(CellCoord::new(11, 5)));
        assert_eq!(range.size(), (11, 6));
    }

    #[test]
    fn test_cell_range_intersects() {
        let a = CellRange::new(CellCoord::new(0, 0), CellCoord::new(3, 1));
        let b = CellRange::new(CellCoord::new(3, 1), CellCoord::new(5, 2));
        let c = CellRange::new(CellCoord::new(4, 0), CellCoord::new(5, 1));
        assert!(a.intersects(&b));
        assert!(!a.intersects(&c));
    }

    #[test]
    fn test_cell_range_to_a1_notation() {
        let range = CellRange::new(CellCoord::new(0, 1), CellCoord::new(9, 1));
        assert_eq!(range.to_a1_notation(), "B1:B10");
        let single = CellRange::new(CellCoord::new(2, 2), CellCoord::new(2, 2));
        assert_eq!(single.to_a1_notation(), "C3");
    }

    #[test]
    fn test_merged_region_spans() {
        let range = CellRange::new(CellCoord::new(0, 0), CellCoord::new(2, 3));
        let merged = MergedRegion::new(range);
        assert_eq!(merged.parent, CellCoord::new(0, 0));
        assert_eq!(merged.row_span(), 3);
        assert_eq!(merged.col_span(), 4);
        assert!(merged.contains(CellCoord::new(1, 2)));
        assert!(!merged.contains(CellCoord::new(3, 3)));
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // A1記法への変換と解析が往復で一致すること
            #[test]
            fn test_a1_notation_round_trip(row in 0u32..100_000, col in 0u32..16_384) {
                let coord = CellCoord::new(row, col);
                let a1 = coord.to_a1_notation();
                prop_assert_eq!(CellCoord::from_a1(&a1), Some(coord));
            }
        }
    }
}
