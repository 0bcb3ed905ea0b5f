//! Segmenter Module
//!
//! セクション列をトークン予算内のチャンクに分割するモジュール。
//! 分割はサブブロック単位で行い、表や段落を途中で切ることはありません。

use crate::builder::ConversionConfig;
use crate::keywords::KeywordExtractor;
use crate::section::Section;

/// トークン数の推定器
///
/// 実際のトークナイザーを差し替えられるようにトレイトとして定義しています。
pub trait TokenEstimator: Send + Sync {
    /// テキストの推定トークン数
    fn estimate(&self, text: &str) -> usize;
}

/// 文字数比率によるトークン推定（既定: 1文字あたり0.3トークン、切り上げ）
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CharRatioEstimator {
    ratio: f64,
}

impl CharRatioEstimator {
    /// 比率を指定して生成
    pub fn new(ratio: f64) -> Self {
        Self { ratio }
    }
}

impl Default for CharRatioEstimator {
    fn default() -> Self {
        Self::new(0.3)
    }
}

impl TokenEstimator for CharRatioEstimator {
    fn estimate(&self, text: &str) -> usize {
        (text.chars().count() as f64 * self.ratio).ceil() as usize
    }
}

/// サブブロックへの参照（セクション番号, ブロック番号）
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BlockRef {
    pub section: usize,
    pub block: usize,
}

/// 検索単位となるチャンク
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Chunk {
    /// 1始まりの連番
    pub chunk_id: usize,

    /// 含まれるサブブロック（先頭`overlap_blocks`件は前チャンクとの重複）
    pub section_refs: Vec<BlockRef>,

    /// 先頭の重複ブロック数
    pub overlap_blocks: usize,

    /// 推定トークン数（重複ブロックを含む）
    pub estimated_token_count: usize,

    /// キーワード（順位順、重複なし）
    pub keywords: Vec<String>,

    /// 単独でトークン予算を超えるブロックのみを含むか
    pub oversized: bool,
}

impl Chunk {
    /// 重複を除いた新規ブロック
    pub fn fresh_refs(&self) -> &[BlockRef] {
        &self.section_refs[self.overlap_blocks..]
    }
}

/// チャンク分割器
#[derive(Debug)]
pub struct Segmenter<E = CharRatioEstimator> {
    max_tokens: usize,
    overlap_tokens: usize,
    keywords: KeywordExtractor,
    estimator: E,
}

impl<E: TokenEstimator> Segmenter<E> {
    /// 変換設定と推定器から分割器を生成
    pub fn new(config: &ConversionConfig, estimator: E) -> Self {
        Self {
            max_tokens: config.chunk_size,
            overlap_tokens: config.chunk_overlap,
            keywords: KeywordExtractor::new(config.keyword_top_k),
            estimator,
        }
    }

    /// ブロック1件の推定トークン数
    pub fn estimate(&self, sections: &[Section], block: BlockRef) -> usize {
        sections
            .get(block.section)
            .and_then(|s| s.blocks.get(block.block))
            .map(|b| self.estimator.estimate(&b.plain_text()))
            .unwrap_or(0)
    }

    /// セクション列をチャンクに分割
    ///
    /// # 戻り値
    ///
    /// 文書順のチャンク列。すべてのブロックはちょうど1つのチャンクに
    /// 新規ブロックとして含まれます。
    pub fn segment(&self, sections: &[Section]) -> Vec<Chunk> {
        let items: Vec<(BlockRef, usize)> = sections
            .iter()
            .enumerate()
            .flat_map(|(s, section)| {
                section.blocks.iter().enumerate().map(move |(b, block)| {
                    let block_ref = BlockRef { section: s, block: b };
                    (block_ref, self.estimator.estimate(&block.plain_text()))
                })
            })
            .collect();

        let mut chunks = Vec::new();
        let mut current = Pending::default();

        for (block_ref, tokens) in items {
            if tokens > self.max_tokens {
                if current.has_fresh() {
                    chunks.push(self.finish(sections, current, chunks.len() + 1, false));
                }
                let oversized = Pending {
                    blocks: vec![(block_ref, tokens)],
                    overlap: 0,
                };
                chunks.push(self.finish(sections, oversized, chunks.len() + 1, true));
                current = Pending::default();
                continue;
            }

            if current.total() + tokens > self.max_tokens {
                if current.has_fresh() {
                    let seed = current.trailing(self.overlap_tokens);
                    chunks.push(self.finish(sections, current, chunks.len() + 1, false));
                    current = seed;
                }
                while current.overlap > 0 && current.total() + tokens > self.max_tokens {
                    current.blocks.remove(0);
                    current.overlap -= 1;
                }
            }
            current.blocks.push((block_ref, tokens));
        }

        if current.has_fresh() {
            chunks.push(self.finish(sections, current, chunks.len() + 1, false));
        }
        chunks
    }

    fn finish(&self, sections: &[Section], pending: Pending, chunk_id: usize, oversized: bool) -> Chunk {
        let estimated_token_count = pending.total();
        let sources: Vec<&str> = pending
            .blocks
            .iter()
            .filter_map(|(r, _)| sections.get(r.section).and_then(|s| s.blocks.get(r.block)))
            .flat_map(|b| b.keyword_sources())
            .collect();

        Chunk {
            chunk_id,
            section_refs: pending.blocks.iter().map(|(r, _)| *r).collect(),
            overlap_blocks: pending.overlap,
            estimated_token_count,
            keywords: self.keywords.extract(sources),
            oversized,
        }
    }
}

/// 組み立て中のチャンク
#[derive(Debug, Default)]
struct Pending {
    blocks: Vec<(BlockRef, usize)>,
    overlap: usize,
}

impl Pending {
    fn total(&self) -> usize {
        self.blocks.iter().map(|(_, t)| t).sum()
    }

    fn has_fresh(&self) -> bool {
        self.blocks.len() > self.overlap
    }

    /// 末尾から合計が`budget`以下に収まるブロックを次チャンクの重複として取り出す
    fn trailing(&self, budget: usize) -> Pending {
        let mut taken = 0;
        let mut sum = 0;
        for (_, tokens) in self.blocks.iter().rev() {
            if sum + tokens > budget {
                break;
            }
            sum += tokens;
            taken += 1;
        }
        Pending {
            blocks: self.blocks[self.blocks.len() - taken..].to_vec(),
            overlap: taken,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::section::{Block, NarrativeBlock};
    use crate::types::CellCoord;

    /// 空白区切りの語数をトークン数とみなす推定器
    struct WordCount;

    impl TokenEstimator for WordCount {
        fn estimate(&self, text: &str) -> usize {
            text.split_whitespace().count()
        }
    }

    fn narrative(words: usize) -> Block {
        Block::Narrative(NarrativeBlock {
            text: vec!["w"; words].join(" "),
            anchor: CellCoord::new(0, 0),
        })
    }

    fn section(name: &str, sizes: &[usize]) -> Section {
        Section {
            sheet_id: Some(name.to_string()),
            title: name.to_string(),
            anchor: name.to_lowercase(),
            blocks: sizes.iter().map(|&n| narrative(n)).collect(),
        }
    }

    fn config(chunk_size: usize, chunk_overlap: usize) -> ConversionConfig {
        ConversionConfig {
            chunk_size,
            chunk_overlap,
            ..Default::default()
        }
    }

    #[test]
    fn test_char_ratio_estimator_rounds_up() {
        let estimator = CharRatioEstimator::default();
        assert_eq!(estimator.estimate(""), 0);
        assert_eq!(estimator.estimate("abc"), 1);
        assert_eq!(estimator.estimate("abcd"), 2);
        assert_eq!(estimator.estimate("売上高"), 1);
    }

    #[test]
    fn test_three_sheets_with_overlap() {
        let sections = vec![
            section("S1", &[300, 200, 200, 100]),
            section("S2", &[300, 100, 200, 100]),
            section("S3", &[300, 200, 200]),
        ];
        let chunks = Segmenter::new(&config(800, 200), WordCount).segment(&sections);

        assert_eq!(chunks.len(), 3);
        assert_eq!(
            chunks.iter().map(|c| c.estimated_token_count).collect::<Vec<_>>(),
            vec![800, 800, 800]
        );
        assert_eq!(chunks[0].overlap_blocks, 0);
        for chunk in &chunks[1..] {
            assert_eq!(chunk.overlap_blocks, 1);
            assert_eq!(Segmenter::new(&config(800, 200), WordCount).estimate(&sections, chunk.section_refs[0]), 100);
        }
        // 2つ目のチャンクは1つ目の末尾ブロックから始まる
        assert_eq!(chunks[1].section_refs[0], BlockRef { section: 0, block: 3 });
        assert_eq!(chunks[2].section_refs[0], BlockRef { section: 1, block: 3 });
        assert_eq!(chunks.iter().map(|c| c.chunk_id).collect::<Vec<_>>(), vec![1, 2, 3]);
    }

    #[test]
    fn test_uniform_blocks_overlap_counts_toward_budget() {
        let sections = vec![
            section("S1", &[100; 8]),
            section("S2", &[100; 7]),
            section("S3", &[100; 7]),
        ];
        let chunks = Segmenter::new(&config(800, 200), WordCount).segment(&sections);

        // 重複ブロックも予算に含まれるため、2,200トークンが4チャンクになる
        assert_eq!(
            chunks.iter().map(|c| c.estimated_token_count).collect::<Vec<_>>(),
            vec![800, 800, 800, 400]
        );
        assert_eq!(
            chunks.iter().map(|c| c.overlap_blocks).collect::<Vec<_>>(),
            vec![0, 2, 2, 2]
        );
        let fresh: usize = chunks.iter().map(|c| c.fresh_refs().len()).sum();
        assert_eq!(fresh, 22);
        assert!(chunks.iter().all(|c| c.estimated_token_count <= 800));
    }

    #[test]
    fn test_oversized_block_isolated_without_overlap() {
        let sections = vec![section("S", &[100, 900, 100])];
        let chunks = Segmenter::new(&config(800, 200), WordCount).segment(&sections);

        assert_eq!(chunks.len(), 3);
        assert!(!chunks[0].oversized);
        assert!(chunks[1].oversized);
        assert_eq!(chunks[1].section_refs, vec![BlockRef { section: 0, block: 1 }]);
        assert_eq!(chunks[1].overlap_blocks, 0);
        assert_eq!(chunks[2].overlap_blocks, 0);
        assert_eq!(chunks[2].section_refs, vec![BlockRef { section: 0, block: 2 }]);
    }

    #[test]
    fn test_overlap_dropped_when_next_block_does_not_fit() {
        let sections = vec![section("S", &[500, 200, 700])];
        let chunks = Segmenter::new(&config(800, 200), WordCount).segment(&sections);

        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[1].overlap_blocks, 0);
        assert_eq!(chunks[1].estimated_token_count, 700);
    }

    #[test]
    fn test_empty_sections_produce_no_chunks() {
        let sections = vec![section("S", &[])];
        assert!(Segmenter::new(&config(800, 100), WordCount).segment(&sections).is_empty());
    }

    #[test]
    fn test_chunk_keywords_from_narrative() {
        let sections = vec![Section {
            sheet_id: Some("S".to_string()),
            title: "S".to_string(),
            anchor: "s".to_string(),
            blocks: vec![Block::Narrative(NarrativeBlock {
                text: "Revenue forecast revenue".to_string(),
                anchor: CellCoord::new(0, 0),
            })],
        }];
        let chunks = Segmenter::new(&config(800, 100), WordCount).segment(&sections);
        assert_eq!(chunks[0].keywords, vec!["revenue", "forecast"]);
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            // 予算超過はoversizedチャンクのみで、各ブロックは新規としてちょうど1回現れること
            #[test]
            fn test_budget_and_coverage(
                sizes in proptest::collection::vec(0usize..1200, 0..40),
                max in 50usize..1000,
                overlap_ratio in 0usize..100,
            ) {
                let overlap = max * overlap_ratio / 100;
                let sections = vec![section("S", &sizes)];
                let chunks = Segmenter::new(&config(max, overlap), WordCount).segment(&sections);

                let mut fresh = Vec::new();
                for chunk in &chunks {
                    if chunk.oversized {
                        prop_assert_eq!(chunk.section_refs.len(), 1);
                        prop_assert!(chunk.estimated_token_count > max);
                    } else {
                        prop_assert!(chunk.estimated_token_count <= max);
                    }
                    prop_assert!(chunk.fresh_refs().len() >= 1);
                    fresh.extend(chunk.fresh_refs().iter().map(|r| r.block));
                }
                prop_assert_eq!(fresh, (0..sizes.len()).collect::<Vec<_>>());
            }
        }
    }
}
