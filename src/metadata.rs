//! Metadata Module
//!
//! 変換結果に付随する機械可読なメタデータ（JSON）を定義するモジュール。
//! すべての値は入力と設定のみから導出され、時刻などの実行時情報は含みません。

use serde::Serialize;

use crate::references::CrossReference;

/// 変換メタデータ
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Metadata {
    /// 入力ファイルの情報
    pub source: SourceInfo,

    /// シートごとの情報（文書順）
    pub sheets: Vec<SheetInfo>,

    /// シート間参照
    pub cross_references: Vec<CrossReference>,

    /// 解決できなかった参照の数
    pub unresolved_references: usize,

    /// 集計値
    pub statistics: Statistics,

    /// チャンク分割の情報
    pub rag_optimization: RagOptimization,
}

impl Metadata {
    /// 整形済みJSON文字列に変換
    pub fn to_json(&self) -> Result<String, crate::error::XlsxRagError> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}

/// 入力ファイルの情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceInfo {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    /// 変換対象シート数
    pub total_sheets: usize,
}

/// シートの情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SheetInfo {
    pub name: String,
    /// ワークブック内のインデックス（0始まり）
    pub index: usize,
    /// 使用範囲（A1形式、空シートは`None`）
    pub cell_range: Option<String>,
    pub tables_count: usize,
    pub images_count: usize,
    pub section_anchor: String,
    pub keywords: Vec<String>,
}

/// 集計値
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Statistics {
    pub total_tables: usize,
    pub total_images: usize,
    pub total_estimated_tokens: usize,
}

/// チャンク分割の情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RagOptimization {
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub estimated_chunks: usize,
    pub chunks: Vec<ChunkInfo>,
}

/// チャンク1件の情報
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ChunkInfo {
    pub chunk_id: usize,
    pub estimated_token_count: usize,
    pub keywords: Vec<String>,
    pub oversized: bool,
}
