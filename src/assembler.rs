//! Document Assembler
//!
//! 検出、参照抽出、セクション構築、チャンク分割、レンダリングを束ねて
//! 1つの文書とメタデータを生成する。
//!
//! シート単位の処理（表検出とセクション構築）はrayonで並列に実行し、
//! 参照抽出とチャンク分割はすべてのシートが揃ってから逐次に行います。
//! 結果はシート順に並ぶため、スケジューリングに関わらず出力は同一です。

use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use rayon::prelude::*;

use crate::builder::ConversionConfig;
use crate::detector::{TableDetector, TableRegion};
use crate::error::XlsxRagError;
use crate::grid::GridModel;
use crate::keywords::KeywordExtractor;
use crate::metadata::{
    ChunkInfo, Metadata, RagOptimization, SheetInfo, SourceInfo, Statistics,
};
use crate::output::{DocumentHeader, DocumentRenderer};
use crate::references::{CrossReference, ReferenceExtractor};
use crate::section::{
    create_anchor, image_path, Block, ContentsEntry, Direction, RelatedSheet, Section,
    SectionBuilder,
};
use crate::segmenter::{BlockRef, CharRatioEstimator, Chunk, Segmenter, TokenEstimator};
use crate::workbook::Workbook;

/// 既定の文書タイトル
const DEFAULT_TITLE: &str = "Excel Document";

/// 目次セクションのアンカー
const TOC_ANCHOR: &str = "toc";

/// 組み立て済みの文書
#[derive(Debug, Clone, PartialEq)]
pub struct Document {
    /// 文書タイトル
    pub title: String,

    /// 文書順のセクション（目次があれば先頭）
    pub sections: Vec<Section>,

    /// チャンク
    pub chunks: Vec<Chunk>,

    /// レンダリング済みのMarkdown
    pub text: String,

    /// 出力する画像（文書からの相対パスとバイト列）
    pub images: Vec<ImageAsset>,
}

/// 出力対象の画像ファイル
#[derive(Debug, Clone, PartialEq)]
pub struct ImageAsset {
    /// 文書からの相対パス（例: `images/chart_001.png`）
    pub path: String,

    /// 画像のバイト列
    pub data: Arc<Vec<u8>>,
}

/// ワークブックから文書とメタデータを組み立てる（既定のトークン推定器を使用）
///
/// # 使用例
///
/// ```rust
/// use xlsxrag::{assemble, CellValue, ConversionConfig, GridModel, Workbook};
///
/// # fn main() -> Result<(), xlsxrag::XlsxRagError> {
/// let grid = GridModel::from_rows(vec![
///     vec![CellValue::Text("Item".into()), CellValue::Text("Cost".into())],
///     vec![CellValue::Text("Rent".into()), CellValue::Number(1200.0)],
/// ]);
/// let workbook = Workbook::from_grids(vec![("Budget", grid)]);
/// let (document, metadata) = assemble(&workbook, &ConversionConfig::default())?;
/// assert!(document.text.contains("| Rent | 1200 |"));
/// assert_eq!(metadata.statistics.total_tables, 1);
/// # Ok(())
/// # }
/// ```
pub fn assemble(
    workbook: &Workbook,
    config: &ConversionConfig,
) -> Result<(Document, Metadata), XlsxRagError> {
    assemble_with_estimator(workbook, config, CharRatioEstimator::default())
}

/// トークン推定器を指定して文書とメタデータを組み立てる
///
/// # 戻り値
///
/// * `Ok((Document, Metadata))` - 組み立てに成功した場合
/// * `Err(XlsxRagError::Config)` - 設定が不正な場合
/// * `Err(XlsxRagError::InvalidInput)` - 変換対象のシートがない場合
pub fn assemble_with_estimator<E: TokenEstimator>(
    workbook: &Workbook,
    config: &ConversionConfig,
    estimator: E,
) -> Result<(Document, Metadata), XlsxRagError> {
    // 1. 入力検証
    config.validate()?;
    if workbook.sheets.is_empty() {
        return Err(XlsxRagError::InvalidInput(
            "Workbook contains no sheets to convert".to_string(),
        ));
    }

    // 2. アンカーと画像番号の事前割り当て（並列処理の前に確定させる）
    let anchors = unique_anchors(workbook);
    let mut first_image_numbers = Vec::with_capacity(workbook.sheets.len());
    let mut next_image = 1;
    for sheet in &workbook.sheets {
        first_image_numbers.push(next_image);
        next_image += sheet.images.len();
    }

    // 3. シート単位の処理（並列、順序保持）
    let detector = TableDetector::new(config.max_columns);
    let builder = SectionBuilder::new(config, workbook.is_1904);
    let per_sheet: Vec<(Section, Vec<TableRegion>)> = workbook
        .sheets
        .par_iter()
        .enumerate()
        .map(|(i, sheet)| -> Result<(Section, Vec<TableRegion>), XlsxRagError> {
            let regions = detector.detect(&sheet.name, &sheet.grid);
            let section = builder.build(sheet, anchors[i].clone(), &regions, first_image_numbers[i])?;
            Ok((section, regions))
        })
        .collect::<Result<Vec<_>, _>>()?;
    let (mut sections, regions): (Vec<Section>, Vec<Vec<TableRegion>>) = per_sheet.into_iter().unzip();

    // 4. シート間参照（全シート確定後）
    let grids: Vec<(&str, &GridModel)> = workbook
        .sheets
        .iter()
        .map(|s| (s.name.as_str(), &s.grid))
        .collect();
    let references = ReferenceExtractor::new(&workbook.sheet_names).extract(&grids);
    attach_related_sheets(&mut sections, &references);

    // 5. 目次
    let image_counts: Vec<usize> = sections
        .iter()
        .map(|s| s.blocks.iter().filter(|b| matches!(b, Block::Image(_))).count())
        .collect();
    if config.create_toc {
        let entries = sections
            .iter()
            .enumerate()
            .map(|(i, s)| ContentsEntry {
                number: i + 1,
                name: s.title.clone(),
                anchor: s.anchor.clone(),
                tables: regions[i].len(),
                images: image_counts[i],
            })
            .collect();
        sections.insert(
            0,
            Section {
                sheet_id: None,
                title: "目次".to_string(),
                anchor: TOC_ANCHOR.to_string(),
                blocks: vec![Block::Contents(entries)],
            },
        );
    }

    // 6. チャンク分割
    let segmenter = Segmenter::new(config, estimator);
    let chunks = segmenter.segment(&sections);

    // 7. レンダリング
    let title = workbook
        .properties
        .title
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .unwrap_or(DEFAULT_TITLE)
        .to_string();
    let header = DocumentHeader {
        title: title.clone(),
        creator: workbook.properties.creator.clone(),
        sheet_count: workbook.sheets.len(),
    };
    let mut buffer = Vec::new();
    DocumentRenderer::new(config).render(&header, &sections, &chunks, &mut buffer)?;
    let text = String::from_utf8(buffer).map_err(|e| XlsxRagError::Utf8(e.utf8_error()))?;

    // 8. 画像ファイル
    let images = if config.extract_images {
        workbook
            .sheets
            .iter()
            .zip(&first_image_numbers)
            .flat_map(|(sheet, &first)| {
                sheet.images.iter().enumerate().map(move |(offset, image)| ImageAsset {
                    path: image_path(&config.image_dir, first + offset, &image.extension),
                    data: Arc::clone(&image.data),
                })
            })
            .collect()
    } else {
        Vec::new()
    };

    // 9. メタデータ
    let total_estimated_tokens = sections
        .iter()
        .enumerate()
        .flat_map(|(s, section)| {
            (0..section.blocks.len()).map(move |b| BlockRef { section: s, block: b })
        })
        .map(|r| segmenter.estimate(&sections, r))
        .sum();

    let keyword_extractor = KeywordExtractor::new(config.keyword_top_k);
    let section_offset = usize::from(config.create_toc);
    let sheets = workbook
        .sheets
        .iter()
        .enumerate()
        .map(|(i, sheet)| {
            let section = &sections[i + section_offset];
            SheetInfo {
                name: sheet.name.clone(),
                index: sheet.index,
                cell_range: sheet.grid.used_range().map(|r| r.to_a1_notation()),
                tables_count: regions[i].len(),
                images_count: image_counts[i],
                section_anchor: section.anchor.clone(),
                keywords: keyword_extractor
                    .extract(section.blocks.iter().flat_map(|b| b.keyword_sources())),
            }
        })
        .collect();

    let metadata = Metadata {
        source: SourceInfo {
            file_name: workbook.properties.file_name.clone(),
            title: workbook.properties.title.clone(),
            creator: workbook.properties.creator.clone(),
            total_sheets: workbook.sheets.len(),
        },
        sheets,
        unresolved_references: references.iter().filter(|r| !r.target_sheet.is_resolved()).count(),
        cross_references: references,
        statistics: Statistics {
            total_tables: regions.iter().map(Vec::len).sum(),
            total_images: image_counts.iter().sum(),
            total_estimated_tokens,
        },
        rag_optimization: RagOptimization {
            chunk_size: config.chunk_size,
            chunk_overlap: config.chunk_overlap,
            estimated_chunks: chunks.len(),
            chunks: chunks
                .iter()
                .map(|c| ChunkInfo {
                    chunk_id: c.chunk_id,
                    estimated_token_count: c.estimated_token_count,
                    keywords: c.keywords.clone(),
                    oversized: c.oversized,
                })
                .collect(),
        },
    };

    let document = Document {
        title,
        sections,
        chunks,
        text,
        images,
    };
    Ok((document, metadata))
}

/// シートごとに重複のないアンカーを割り当てる
///
/// 同じアンカーになるシート名には`-2`、`-3`…を付け、空になる場合は
/// `sheet-{番号}`を使います。
fn unique_anchors(workbook: &Workbook) -> Vec<String> {
    let mut used: HashSet<String> = HashSet::new();
    used.insert(TOC_ANCHOR.to_string());

    workbook
        .sheets
        .iter()
        .enumerate()
        .map(|(i, sheet)| {
            let mut base = create_anchor(&sheet.name);
            if base.is_empty() {
                base = format!("sheet-{}", i + 1);
            }
            let mut anchor = base.clone();
            let mut suffix = 2;
            while !used.insert(anchor.clone()) {
                anchor = format!("{}-{}", base, suffix);
                suffix += 1;
            }
            anchor
        })
        .collect()
}

/// 参照グラフから各セクションに関連シートの注記を付ける
///
/// 注記はセクションの先頭に置き、参照先（このシートから）、参照元（他シートから）の順に並べます。
fn attach_related_sheets(sections: &mut [Section], references: &[CrossReference]) {
    let anchors: HashMap<String, String> = sections
        .iter()
        .filter_map(|s| s.sheet_id.as_ref().map(|id| (id.clone(), s.anchor.clone())))
        .collect();

    for section in sections.iter_mut() {
        let Some(sheet) = section.sheet_id.clone() else {
            continue;
        };

        let mut related: Vec<RelatedSheet> = Vec::new();
        let mut push = |entry: RelatedSheet| {
            if !related.contains(&entry) {
                related.push(entry);
            }
        };

        for r in references.iter().filter(|r| r.source_sheet == sheet) {
            push(RelatedSheet {
                direction: Direction::Outgoing,
                sheet: r.target_sheet.name().to_string(),
                cell: r.target_cell_or_range.clone(),
                anchor: if r.target_sheet.is_resolved() {
                    anchors.get(r.target_sheet.name()).cloned()
                } else {
                    None
                },
            });
        }
        for r in references
            .iter()
            .filter(|r| r.target_sheet.is_resolved() && r.target_sheet.name() == sheet)
        {
            push(RelatedSheet {
                direction: Direction::Incoming,
                sheet: r.source_sheet.clone(),
                cell: r.source_cell.clone(),
                anchor: anchors.get(&r.source_sheet).cloned(),
            });
        }

        if !related.is_empty() {
            related.sort_by_key(|r| r.direction);
            section.blocks.insert(0, Block::RelatedSheets(related));
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{CellCoord, CellValue};
    use crate::workbook::{SheetGrid, SheetImage};

    fn t(s: &str) -> CellValue {
        CellValue::Text(s.to_string())
    }

    fn f(text: &str, cached: f64) -> CellValue {
        CellValue::Formula {
            text: text.to_string(),
            cached: Box::new(CellValue::Number(cached)),
        }
    }

    fn sample_workbook() -> Workbook {
        let data = GridModel::from_rows(vec![
            vec![t("Month"), t("Sales")],
            vec![t("Jan"), CellValue::Number(10.0)],
            vec![t("Feb"), CellValue::Number(20.0)],
        ]);
        let summary = GridModel::from_rows(vec![
            vec![t("Total"), f("=SUM(Data!B2:B3)", 30.0)],
            vec![t("Ghost"), f("=Missing!A1", 0.0)],
        ]);
        Workbook::from_grids(vec![("Data", data), ("Summary", summary)])
    }

    #[test]
    fn test_assemble_sections_and_toc() {
        let (document, metadata) = assemble(&sample_workbook(), &ConversionConfig::default()).unwrap();

        assert_eq!(document.sections.len(), 3);
        assert!(document.sections[0].sheet_id.is_none());
        match &document.sections[0].blocks[0] {
            Block::Contents(entries) => {
                assert_eq!(entries.len(), 2);
                assert_eq!(entries[0].tables, 1);
                assert_eq!(entries[1].anchor, "summary");
            }
            other => panic!("unexpected block {:?}", other),
        }
        assert!(document.text.starts_with("# Excel Document\n"));
        assert!(document.text.contains("## 目次"));
        assert_eq!(metadata.source.total_sheets, 2);
        assert_eq!(metadata.statistics.total_tables, 2);
    }

    #[test]
    fn test_related_sheets_both_directions() {
        let (document, metadata) = assemble(&sample_workbook(), &ConversionConfig::default()).unwrap();

        assert_eq!(metadata.cross_references.len(), 2);
        assert_eq!(metadata.unresolved_references, 1);

        let data_related = match &document.sections[1].blocks[0] {
            Block::RelatedSheets(r) => r.clone(),
            other => panic!("unexpected block {:?}", other),
        };
        assert_eq!(
            data_related,
            vec![RelatedSheet {
                direction: Direction::Incoming,
                sheet: "Summary".to_string(),
                cell: "B1".to_string(),
                anchor: Some("summary".to_string()),
            }]
        );

        let summary_related = match &document.sections[2].blocks[0] {
            Block::RelatedSheets(r) => r.clone(),
            other => panic!("unexpected block {:?}", other),
        };
        assert_eq!(summary_related.len(), 2);
        assert_eq!(summary_related[0].anchor, Some("data".to_string()));
        assert_eq!(summary_related[1].sheet, "Missing");
        assert_eq!(summary_related[1].anchor, None);
    }

    #[test]
    fn test_without_toc() {
        let config = ConversionConfig {
            create_toc: false,
            ..Default::default()
        };
        let (document, metadata) = assemble(&sample_workbook(), &config).unwrap();
        assert_eq!(document.sections.len(), 2);
        assert!(!document.text.contains("## 目次"));
        assert_eq!(metadata.sheets[1].section_anchor, "summary");
    }

    #[test]
    fn test_empty_workbook_is_input_error() {
        let result = assemble(&Workbook::default(), &ConversionConfig::default());
        assert!(matches!(result, Err(XlsxRagError::InvalidInput(_))));
    }

    #[test]
    fn test_invalid_config_rejected_before_input() {
        let config = ConversionConfig {
            chunk_overlap: 900,
            ..Default::default()
        };
        let result = assemble(&Workbook::default(), &config);
        assert!(matches!(result, Err(XlsxRagError::Config(_))));
    }

    #[test]
    fn test_unique_anchors() {
        let workbook = Workbook::from_grids(vec![
            ("Sales Data", GridModel::from_rows(vec![])),
            ("sales_data", GridModel::from_rows(vec![])),
            ("!!!", GridModel::from_rows(vec![])),
            ("TOC", GridModel::from_rows(vec![])),
        ]);
        assert_eq!(
            unique_anchors(&workbook),
            vec!["sales-data", "sales-data-2", "sheet-3", "toc-2"]
        );
    }

    #[test]
    fn test_image_numbering_across_sheets() {
        let image = |n: &str| SheetImage {
            anchor: CellCoord::new(0, 0),
            name: Some(n.to_string()),
            description: None,
            extension: "png".to_string(),
            data: Arc::new(vec![0x89, 0x50]),
        };
        let mut first = SheetGrid::new("A", 0, GridModel::from_rows(vec![vec![t("x")]]));
        first.images = vec![image("one"), image("two")];
        let mut second = SheetGrid::new("B", 1, GridModel::from_rows(vec![vec![t("y")]]));
        second.images = vec![image("three")];
        let workbook = Workbook {
            sheet_names: vec!["A".to_string(), "B".to_string()],
            sheets: vec![first, second],
            ..Default::default()
        };

        let (document, metadata) = assemble(&workbook, &ConversionConfig::default()).unwrap();
        let paths: Vec<&str> = document.images.iter().map(|i| i.path.as_str()).collect();
        assert_eq!(
            paths,
            vec!["images/chart_001.png", "images/chart_002.png", "images/chart_003.png"]
        );
        assert!(document.text.contains("![three](./images/chart_003.png)"));
        assert_eq!(metadata.statistics.total_images, 3);

        let config = ConversionConfig {
            extract_images: false,
            ..Default::default()
        };
        let (document, metadata) = assemble(&workbook, &config).unwrap();
        assert!(document.images.is_empty());
        assert!(!document.text.contains("!["));
        assert_eq!(metadata.statistics.total_images, 0);
    }

    #[test]
    fn test_assemble_is_deterministic() {
        let workbook = sample_workbook();
        let config = ConversionConfig::default();
        let (a, ma) = assemble(&workbook, &config).unwrap();
        let (b, mb) = assemble(&workbook, &config).unwrap();
        assert_eq!(a, b);
        assert_eq!(ma.to_json().unwrap(), mb.to_json().unwrap());
    }
}
