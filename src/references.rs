//! Reference Extractor Module
//!
//! すべてのシートの数式を走査し、シート修飾参照（`Sheet2!B1:B10`、
//! `'My Sheet'!A1`）からシート間参照のグラフを構築する。
//!
//! 数式の評価や循環参照の解決は行わず、構造の抽出のみを行います。
//! 参照先シートが存在しない場合もエラーにはせず、未解決参照として記録します。

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;
use serde::Serialize;

use crate::grid::GridModel;
use crate::types::CellCoord;

/// 参照の種類
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum ReferenceKind {
    /// 単一セルへの直接参照
    DirectCell,

    /// 範囲参照
    Range,

    /// 集計関数（SUM / AVERAGE / COUNT 系）の引数
    AggregateFunction,

    /// 検索関数（VLOOKUP / INDEX / MATCH 系）の引数
    LookupFunction,
}

/// 参照先シート
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize)]
#[serde(tag = "status", content = "name", rename_all = "snake_case")]
pub enum TargetSheet {
    /// ワークブック内のシート（正規のシート名）
    Resolved(String),

    /// 存在しないシート、または外部ブック（数式に書かれた名前のまま）
    Unresolved(String),
}

impl TargetSheet {
    /// シート名（解決済みなら正規名）
    pub fn name(&self) -> &str {
        match self {
            TargetSheet::Resolved(name) | TargetSheet::Unresolved(name) => name,
        }
    }

    /// 解決済みかどうか
    pub fn is_resolved(&self) -> bool {
        matches!(self, TargetSheet::Resolved(_))
    }
}

/// シート間参照
///
/// 抽出時に一度だけ生成され、以後変更されません。
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CrossReference {
    /// 参照元シート名
    pub source_sheet: String,

    /// 参照元セル（A1形式）
    pub source_cell: String,

    /// 参照先シート
    pub target_sheet: TargetSheet,

    /// 参照先セルまたは範囲（A1形式、`$`は除去済み）
    pub target_cell_or_range: String,

    /// 参照の種類
    pub reference_kind: ReferenceKind,

    /// 参照元の数式
    pub formula: String,
}

/// 集計関数ファミリー
const AGGREGATE_FUNCTIONS: &[&str] = &[
    "SUM", "SUMIF", "SUMIFS", "SUMPRODUCT", "AVERAGE", "AVERAGEA", "AVERAGEIF", "AVERAGEIFS",
    "COUNT", "COUNTA", "COUNTIF", "COUNTIFS", "COUNTBLANK", "MIN", "MINA", "MINIFS", "MAX",
    "MAXA", "MAXIFS", "PRODUCT", "MEDIAN", "SUBTOTAL", "AGGREGATE",
];

/// 検索関数ファミリー
const LOOKUP_FUNCTIONS: &[&str] = &[
    "VLOOKUP", "HLOOKUP", "XLOOKUP", "LOOKUP", "INDEX", "MATCH", "XMATCH", "OFFSET",
];

/// シート間参照の抽出器
#[derive(Debug, Clone)]
pub struct ReferenceExtractor {
    /// 小文字化したシート名 -> 正規のシート名
    sheet_lookup: HashMap<String, String>,
}

impl ReferenceExtractor {
    /// 新しい抽出器を生成
    ///
    /// # 引数
    ///
    /// * `sheet_names` - ワークブック内のすべてのシート名（非表示シートを含む）
    pub fn new<S: AsRef<str>>(sheet_names: &[S]) -> Self {
        let sheet_lookup = sheet_names
            .iter()
            .map(|name| (name.as_ref().to_lowercase(), name.as_ref().to_string()))
            .collect();
        Self { sheet_lookup }
    }

    /// すべてのグリッドからシート間参照を抽出する
    ///
    /// # 引数
    ///
    /// * `grids` - (シート名, グリッド) のリスト
    ///
    /// # 戻り値
    ///
    /// (参照元シート名, 参照元セルの行優先順, 数式内の出現順) で整列された参照リスト
    pub fn extract(&self, grids: &[(&str, &GridModel)]) -> Vec<CrossReference> {
        let mut found: Vec<(String, CellCoord, CrossReference)> = Vec::new();

        for (sheet_id, grid) in grids {
            for (coord, formula) in grid.formula_cells() {
                for reference in self.extract_from_formula(sheet_id, coord, formula) {
                    found.push((sheet_id.to_string(), coord, reference));
                }
            }
        }

        // 安定ソートにより数式内の出現順を保つ
        found.sort_by(|a, b| a.0.cmp(&b.0).then(a.1.cmp(&b.1)));
        found.into_iter().map(|(_, _, r)| r).collect()
    }

    /// 1つの数式から参照を抽出する
    pub fn extract_from_formula(
        &self,
        source_sheet: &str,
        source_cell: CellCoord,
        formula: &str,
    ) -> Vec<CrossReference> {
        let body = strip_string_literals(formula.trim().trim_start_matches('='));
        let kind_override = outermost_function(&body).and_then(classify_function);

        let mut references: Vec<CrossReference> = Vec::new();
        for caps in qualified_ref_re().captures_iter(&body) {
            let raw_name = match (caps.get(1), caps.get(2)) {
                (Some(quoted), _) => quoted.as_str().replace("''", "'"),
                (None, Some(bare)) => bare.as_str().to_string(),
                (None, None) => continue,
            };
            let target = caps[3].replace('$', "").to_uppercase();

            if raw_name.to_lowercase() == source_sheet.to_lowercase() {
                continue;
            }

            let target_sheet = self.resolve(&raw_name);
            let reference_kind = kind_override.unwrap_or_else(|| shape_kind(&target));

            let reference = CrossReference {
                source_sheet: source_sheet.to_string(),
                source_cell: source_cell.to_a1_notation(),
                target_sheet,
                target_cell_or_range: target,
                reference_kind,
                formula: formula.to_string(),
            };
            let duplicate = references.iter().any(|r| {
                r.target_sheet == reference.target_sheet
                    && r.target_cell_or_range == reference.target_cell_or_range
            });
            if !duplicate {
                references.push(reference);
            }
        }
        references
    }

    /// シート名を解決する（大文字小文字を区別しない）
    fn resolve(&self, raw_name: &str) -> TargetSheet {
        // 外部ブック参照（[1]Sheet1 / [Book.xlsx]Sheet1）は解決しない
        if raw_name.starts_with('[') {
            tracing::debug!(name = %raw_name, "external workbook reference left unresolved");
            return TargetSheet::Unresolved(raw_name.to_string());
        }
        match self.sheet_lookup.get(&raw_name.to_lowercase()) {
            Some(canonical) => TargetSheet::Resolved(canonical.clone()),
            None => {
                tracing::debug!(name = %raw_name, "reference to unknown sheet");
                TargetSheet::Unresolved(raw_name.to_string())
            }
        }
    }
}

/// シート修飾参照の正規表現
///
/// 1: 引用符付きシート名、2: 裸のシート名、3: セル / 範囲 / 列範囲 / 行範囲
fn qualified_ref_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(
            r"(?:'((?:[^']|'')+)'|((?:\[[^\]]+\])?[\w.]+))!(\$?[A-Za-z]{1,3}\$?[0-9]+(?::\$?[A-Za-z]{1,3}\$?[0-9]+)?|\$?[A-Za-z]{1,3}:\$?[A-Za-z]{1,3}|\$?[0-9]+:\$?[0-9]+)\b",
        )
        .expect("qualified reference regex must compile")
    })
}

/// 関数呼び出しの正規表現
fn function_call_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([A-Za-z_][A-Za-z0-9_.]*)\s*\(").expect("function call regex must compile")
    })
}

/// 括弧の深さ0にある最初の関数名（`_xlfn.` などの接頭辞は除去）
fn outermost_function(body: &str) -> Option<String> {
    for caps in function_call_re().captures_iter(body) {
        let name = caps.get(1)?;
        let depth = body[..name.start()]
            .chars()
            .fold(0i32, |depth, ch| match ch {
                '(' => depth + 1,
                ')' => depth - 1,
                _ => depth,
            });
        if depth == 0 {
            let upper = name.as_str().to_uppercase();
            let stripped = upper
                .trim_start_matches("_XLFN.")
                .trim_start_matches("_XLWS.")
                .to_string();
            return Some(stripped);
        }
    }
    None
}

/// 関数名から参照の種類を決定
fn classify_function(name: String) -> Option<ReferenceKind> {
    if AGGREGATE_FUNCTIONS.contains(&name.as_str()) {
        Some(ReferenceKind::AggregateFunction)
    } else if LOOKUP_FUNCTIONS.contains(&name.as_str()) {
        Some(ReferenceKind::LookupFunction)
    } else {
        None
    }
}

/// 参照先の形状から種類を決定
fn shape_kind(target: &str) -> ReferenceKind {
    if target.contains(':') {
        ReferenceKind::Range
    } else {
        ReferenceKind::DirectCell
    }
}

/// 文字列リテラルの中身を空白に置き換える（位置は保持）
///
/// Excelの数式では `""` が引用符のエスケープになるため、
/// 引用符ごとに状態を反転するだけで正しく扱えます。
fn strip_string_literals(formula: &str) -> String {
    let mut out = String::with_capacity(formula.len());
    let mut in_string = false;

    for ch in formula.chars() {
        if ch == '"' {
            in_string = !in_string;
            out.push('"');
        } else if in_string {
            out.push(' ');
        } else {
            out.push(ch);
        }
    }

    out
}
