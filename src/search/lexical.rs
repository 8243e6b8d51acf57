//! BM25 + coverage lexical scoring over a candidate set

use crate::documents::DocumentSet;
use crate::text;
use ahash::{HashMap, HashMapExt, HashSet, HashSetExt};

const BM25_K1: f32 = 1.2;
const BM25_B: f32 = 0.75;
const BM25_SHARE: f32 = 0.6;
const COVERAGE_SHARE: f32 = 0.4;
/// Tags count as this many occurrences of their tokens
const TAG_BOOST: u32 = 2;

struct DocStats {
    term_counts: HashMap<String, u32>,
    length: usize,
}

/// Lexical relevance scorer
///
/// Builds term statistics for the given candidates only, so IDF reflects the
/// filtered set the caller is ranking. Scores are in [0,1]:
/// `0.6 · bm25 / max_bm25 + 0.4 · coverage`, where coverage is the fraction
/// of distinct query terms present in the document.
pub struct LexicalScorer {
    docs: HashMap<String, DocStats>,
    document_frequency: HashMap<String, u32>,
    avg_length: f32,
}

impl LexicalScorer {
    pub fn new(documents: &DocumentSet) -> Self {
        let mut docs = HashMap::with_capacity(documents.len());
        let mut document_frequency: HashMap<String, u32> = HashMap::new();
        let mut total_length = 0usize;

        for (id, doc) in documents {
            let mut term_counts: HashMap<String, u32> = HashMap::new();
            let mut length = 0usize;

            for token in text::stemmed_tokens(&doc.content) {
                *term_counts.entry(token).or_insert(0) += 1;
                length += 1;
            }
            for tag in &doc.tags {
                for token in text::stemmed_tokens(&tag.replace(['_', '-'], " ")) {
                    *term_counts.entry(token).or_insert(0) += TAG_BOOST;
                    length += TAG_BOOST as usize;
                }
            }

            for term in term_counts.keys() {
                *document_frequency.entry(term.clone()).or_insert(0) += 1;
            }

            total_length += length;
            docs.insert(id.clone(), DocStats { term_counts, length });
        }

        let avg_length = if docs.is_empty() {
            0.0
        } else {
            total_length as f32 / docs.len() as f32
        };

        Self {
            docs,
            document_frequency,
            avg_length,
        }
    }

    /// Score every candidate against the query, keyed by document id
    pub fn score_all(&self, query_text: &str) -> HashMap<String, f32> {
        let query_terms = unique_terms(query_text);
        let mut raw: HashMap<String, (f32, f32)> = HashMap::with_capacity(self.docs.len());
        let mut max_bm25 = 0.0f32;

        for (id, stats) in &self.docs {
            let (bm25, coverage) = self.score_doc(&query_terms, stats);
            max_bm25 = max_bm25.max(bm25);
            raw.insert(id.clone(), (bm25, coverage));
        }

        raw.into_iter()
            .map(|(id, (bm25, coverage))| {
                let normalised = if max_bm25 > 0.0 { bm25 / max_bm25 } else { 0.0 };
                let score = BM25_SHARE * normalised + COVERAGE_SHARE * coverage;
                (id, score.clamp(0.0, 1.0))
            })
            .collect()
    }

    fn score_doc(&self, query_terms: &[String], stats: &DocStats) -> (f32, f32) {
        if query_terms.is_empty() || stats.length == 0 {
            return (0.0, 0.0);
        }

        let n = self.docs.len() as f32;
        let mut bm25 = 0.0;
        let mut matched = 0usize;

        for term in query_terms {
            let Some(&tf) = stats.term_counts.get(term) else {
                continue;
            };
            matched += 1;

            let df = self.document_frequency.get(term).copied().unwrap_or(0) as f32;
            let idf = (1.0 + (n - df + 0.5) / (df + 0.5)).ln();
            let tf = tf as f32;
            let norm = 1.0 - BM25_B + BM25_B * (stats.length as f32 / self.avg_length.max(1.0));
            bm25 += idf * (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * norm);
        }

        (bm25, matched as f32 / query_terms.len() as f32)
    }
}

/// Distinct stemmed query terms in first-seen order
pub(crate) fn unique_terms(query_text: &str) -> Vec<String> {
    let mut seen = HashSet::new();
    text::stemmed_tokens(query_text)
        .into_iter()
        .filter(|t| seen.insert(t.clone()))
        .collect()
}
