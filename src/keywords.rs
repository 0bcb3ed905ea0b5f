//! Keyword Extraction Module
//!
//! 表のヘッダーセルと自由テキストから、出現頻度に基づいてキーワードを抽出する。
//! 学習済みモデルではなく、局所的な頻度ヒューリスティックです。

use std::collections::HashMap;
use std::sync::OnceLock;

use regex::Regex;

/// 既定のストップワード（英語の機能語と日本語の指示語・助動詞）
const STOPWORDS: &[&str] = &[
    "the", "and", "of", "to", "in", "for", "is", "on", "with", "by", "at", "from", "as", "an",
    "or", "be", "are", "was", "were", "this", "that", "it", "its", "not", "no", "yes", "if",
    "per", "all", "any", "into", "than", "then", "there", "these", "those", "true", "false",
    "これ", "それ", "あれ", "この", "その", "あの", "こと", "もの", "ため", "です", "ます",
    "する", "して", "した", "ある", "いる", "なる", "など", "および", "または",
];

/// キーワード抽出器
#[derive(Debug, Clone)]
pub struct KeywordExtractor {
    /// 保持する上位キーワード数
    top_k: usize,
}

impl KeywordExtractor {
    /// 新しい抽出器を生成
    pub fn new(top_k: usize) -> Self {
        Self { top_k }
    }

    /// テキスト列からキーワードを抽出
    ///
    /// 英字語は小文字に正規化します。2文字未満の語とストップワードは除外し、
    /// 出現回数の降順（同数なら初出順）で上位K件を返します。
    pub fn extract<'a, I>(&self, texts: I) -> Vec<String>
    where
        I: IntoIterator<Item = &'a str>,
    {
        if self.top_k == 0 {
            return Vec::new();
        }

        // 語 -> (出現回数, 初出位置)
        let mut counts: HashMap<String, (usize, usize)> = HashMap::new();
        let mut position = 0usize;

        for text in texts {
            for m in token_re().find_iter(text) {
                let word = m.as_str().to_lowercase();
                if word.chars().count() < 2 || STOPWORDS.contains(&word.as_str()) {
                    continue;
                }
                let entry = counts.entry(word).or_insert((0, position));
                entry.0 += 1;
                position += 1;
            }
        }

        let mut ranked: Vec<(String, (usize, usize))> = counts.into_iter().collect();
        ranked.sort_by(|a, b| b.1 .0.cmp(&a.1 .0).then(a.1 .1.cmp(&b.1 .1)));
        ranked
            .into_iter()
            .take(self.top_k)
            .map(|(word, _)| word)
            .collect()
    }
}

/// 語の正規表現（英字の連続、またはひらがな・カタカナ・漢字の連続）
fn token_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"[A-Za-z]+|[ぁ-んァ-ヶー一-龠々]+").expect("keyword token regex must compile")
    })
}
