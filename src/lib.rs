//! xlsxrag - Excel workbook to RAG-ready Markdown converter
//!
//! This crate converts Excel workbooks (XLSX) into a single structured Markdown
//! document plus a JSON metadata record, optimized for RAG (Retrieval-Augmented
//! Generation) pipelines. Each sheet becomes an anchored section; tables are
//! detected inside sheets, cross-sheet formula references become navigable
//! "related sheets" links, and the document is segmented into token-budgeted
//! chunks with keyword tags.
//!
//! # Quick Start
//!
//! ```rust,no_run
//! use std::fs::File;
//! use xlsxrag::ConverterBuilder;
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     // Create a converter with default settings
//!     let converter = ConverterBuilder::new().build()?;
//!
//!     // Convert Excel to Markdown and receive the metadata record
//!     let input = File::open("report.xlsx")?;
//!     let output = File::create("report.md")?;
//!     let metadata = converter.convert(input, output)?;
//!     println!("{} chunks", metadata.rag_optimization.estimated_chunks);
//!
//!     Ok(())
//! }
//! ```
//!
//! # Markdown, Metadata and Images
//!
//! ```rust,no_run
//! use std::fs::File;
//! use std::path::Path;
//! use xlsxrag::{ConversionPreset, ConverterBuilder};
//!
//! fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let converter = ConverterBuilder::from_preset(ConversionPreset::Complete).build()?;
//!     let conversion = converter.convert_document(File::open("report.xlsx")?, Some("report.xlsx"))?;
//!
//!     // out/report.md, out/report_metadata.json, out/images/chart_001.png ...
//!     conversion.write_to_dir(Path::new("out"), "report")?;
//!     Ok(())
//! }
//! ```
//!
//! # In-memory Workbooks
//!
//! The pipeline can run without any file: build a [`Workbook`] from grids and
//! call [`assemble`].
//!
//! ```rust
//! use xlsxrag::{assemble, CellValue, ConverterBuilder, GridModel, Workbook};
//!
//! # fn main() -> Result<(), xlsxrag::XlsxRagError> {
//! let grid = GridModel::from_rows(vec![
//!     vec![CellValue::Text("Month".into()), CellValue::Text("Sales".into())],
//!     vec![CellValue::Text("Jan".into()), CellValue::Number(100.0)],
//! ]);
//! let workbook = Workbook::from_grids(vec![("Sales", grid)]);
//! let config = ConverterBuilder::new().with_toc(false).build_config()?;
//!
//! let (document, metadata) = assemble(&workbook, &config)?;
//! assert!(document.text.contains("| Jan   | 100   |"));
//! assert_eq!(metadata.sheets[0].section_anchor, "sales");
//! # Ok(())
//! # }
//! ```

mod api;
mod assembler;
mod batch;
mod builder;
mod detector;
mod error;
mod formatter;
mod grid;
mod keywords;
mod metadata;
mod output;
mod parser;
mod references;
mod section;
mod security;
mod segmenter;
mod types;
mod workbook;

// 公開API
pub use api::{ConversionPreset, DateFormat, FormulaMode, SheetSelector, TableFormat};
pub use assembler::{assemble, assemble_with_estimator, Document, ImageAsset};
pub use batch::{BatchConverter, BatchResult, BatchSummary};
pub use builder::{Conversion, ConversionConfig, Converter, ConverterBuilder};
pub use error::XlsxRagError;

// パイプラインの構成要素
pub use detector::{TableDetector, TableRegion};
pub use grid::{Cell, GridModel};
pub use keywords::KeywordExtractor;
pub use metadata::{ChunkInfo, Metadata, RagOptimization, SheetInfo, SourceInfo, Statistics};
pub use output::{DocumentHeader, DocumentRenderer};
pub use references::{CrossReference, ReferenceExtractor, ReferenceKind, TargetSheet};
pub use section::{
    create_anchor, Block, CellSpan, ContentsEntry, Direction, ImagePlaceholder, NarrativeBlock,
    RelatedSheet, Section, TableBlock,
};
pub use segmenter::{BlockRef, CharRatioEstimator, Chunk, Segmenter, TokenEstimator};
pub use types::{CellCoord, CellRange, CellValue, MergedRegion, RawCell};
pub use workbook::{DocumentProperties, SheetGrid, SheetImage, Workbook};
