//! Output Module
//!
//! セクションとチャンクからMarkdown文書を組み立てるレンダラーを提供するモジュール。
//! 構造（順序、チャンク境界）はアセンブラーが決め、ここでは構文のみを扱います。

mod table;

use std::collections::HashMap;
use std::io::Write;

use crate::api::TableFormat;
use crate::builder::ConversionConfig;
use crate::error::XlsxRagError;
use crate::section::{Block, ContentsEntry, RelatedSheet, Section};
use crate::segmenter::{BlockRef, Chunk};

/// 表示可能なコンテンツがないシートの注記
const EMPTY_SHEET_NOTE: &str = "*このシートには表示可能なコンテンツがありません*";

/// 文書ヘッダーの情報
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentHeader {
    /// 文書タイトル
    pub title: String,

    /// 作成者
    pub creator: Option<String>,

    /// 変換対象シート数
    pub sheet_count: usize,
}

/// Markdown文書のレンダラー
#[derive(Debug)]
pub struct DocumentRenderer<'a> {
    config: &'a ConversionConfig,
}

impl<'a> DocumentRenderer<'a> {
    /// 新しいレンダラーを生成
    pub fn new(config: &'a ConversionConfig) -> Self {
        Self { config }
    }

    /// 文書全体を出力
    ///
    /// # 引数
    ///
    /// * `header` - 文書ヘッダー
    /// * `sections` - 文書順のセクション
    /// * `chunks` - チャンク（`annotate_chunks`が有効な場合に境界を注記）
    /// * `writer` - 出力先のライター
    pub fn render<W: Write>(
        &self,
        header: &DocumentHeader,
        sections: &[Section],
        chunks: &[Chunk],
        writer: &mut W,
    ) -> Result<(), XlsxRagError> {
        self.render_header(header, writer)?;

        // チャンクの最初の新規ブロック -> チャンク
        let boundaries: HashMap<BlockRef, &Chunk> = if self.config.annotate_chunks {
            chunks
                .iter()
                .filter_map(|c| c.fresh_refs().first().map(|r| (*r, c)))
                .collect()
        } else {
            HashMap::new()
        };

        let mut sheet_number = 0;
        for (section_idx, section) in sections.iter().enumerate() {
            writeln!(writer, "---")?;
            writeln!(writer)?;

            match &section.sheet_id {
                None => writeln!(writer, "## {}", section.title)?,
                Some(_) => {
                    sheet_number += 1;
                    writeln!(writer, "<a name=\"{}\"></a>", section.anchor)?;
                    writeln!(writer, "# {}. {}", sheet_number, section.title)?;
                }
            }
            writeln!(writer)?;

            for (block_idx, block) in section.blocks.iter().enumerate() {
                let block_ref = BlockRef {
                    section: section_idx,
                    block: block_idx,
                };
                if let Some(chunk) = boundaries.get(&block_ref) {
                    writeln!(writer, "{}", chunk_annotation(chunk))?;
                    writeln!(writer)?;
                }
                self.render_block(block, writer)?;
                writeln!(writer)?;
            }

            let has_content = section
                .blocks
                .iter()
                .any(|b| !matches!(b, Block::RelatedSheets(_)));
            if section.sheet_id.is_some() && !has_content {
                writeln!(writer, "{}", EMPTY_SHEET_NOTE)?;
                writeln!(writer)?;
            }
        }

        writer.flush()?;
        Ok(())
    }

    fn render_header<W: Write>(&self, header: &DocumentHeader, writer: &mut W) -> Result<(), XlsxRagError> {
        writeln!(writer, "# {}", header.title)?;
        writeln!(writer)?;
        writeln!(writer, "**ファイル情報**")?;
        writeln!(writer, "- シート数: {}", header.sheet_count)?;
        if let Some(creator) = &header.creator {
            writeln!(writer, "- 作成者: {}", creator)?;
        }
        writeln!(writer)?;
        Ok(())
    }

    fn render_block<W: Write>(&self, block: &Block, writer: &mut W) -> Result<(), XlsxRagError> {
        match block {
            Block::Contents(entries) => render_contents(entries, writer),
            Block::Table(t) => {
                if let Some(summary) = &t.summary {
                    writeln!(writer, "*{}*", summary)?;
                    writeln!(writer)?;
                }
                match self.config.table_format {
                    TableFormat::Html => table::render_html(t, writer),
                    TableFormat::Markdown => table::render_markdown(t, writer),
                }
            }
            Block::Image(image) => {
                writeln!(writer, "![{}](./{})", escape_link_text(&image.caption), image.path)?;
                Ok(())
            }
            Block::Narrative(n) => {
                writeln!(writer, "{}", n.text)?;
                Ok(())
            }
            Block::RelatedSheets(related) => render_related(related, writer),
        }
    }
}

fn render_contents<W: Write>(entries: &[ContentsEntry], writer: &mut W) -> Result<(), XlsxRagError> {
    for entry in entries {
        writeln!(
            writer,
            "{}. [{}](#{}) ({}表, {}画像)",
            entry.number,
            escape_link_text(&entry.name),
            entry.anchor,
            entry.tables,
            entry.images
        )?;
    }
    Ok(())
}

fn render_related<W: Write>(related: &[RelatedSheet], writer: &mut W) -> Result<(), XlsxRagError> {
    writeln!(writer, "> **関連シート:**")?;
    for r in related {
        let name = escape_link_text(&r.sheet);
        match &r.anchor {
            Some(anchor) => write!(writer, "> - [{}](#{})", name, anchor)?,
            None => write!(writer, "> - {}", name)?,
        }
        writeln!(writer, " ({}: セル {})", r.direction.label(), r.cell)?;
    }
    Ok(())
}

/// チャンク境界の注記（HTMLコメント）
fn chunk_annotation(chunk: &Chunk) -> String {
    let mut parts = vec![format!("chunk {}: ~{} tokens", chunk.chunk_id, chunk.estimated_token_count)];
    if !chunk.keywords.is_empty() {
        parts.push(format!("keywords: {}", chunk.keywords.join(", ")));
    }
    if chunk.oversized {
        parts.push("oversized".to_string());
    }
    format!("<!-- {} -->", parts.join("; ").replace("--", "- -"))
}

/// リンクテキスト内の角括弧をエスケープ
fn escape_link_text(s: &str) -> String {
    s.replace('[', "\\[").replace(']', "\\]")
}
