//! Hybrid search combining lexical and vector scoring

use crate::config::SearchConfig;
use crate::documents::DocumentSet;
use crate::embedding::cosine_similarity;
use crate::search::{
    deduplicate_by_content, extract_excerpt, lexical::unique_terms, rank_results,
    reciprocal_rank_fusion, FusionConfig, LexicalScorer, RankingStrategy, ScoreBreakdown,
    SearchError, SearchMode, SearchQuery, SearchResult,
};
use crate::text;
use serde::Serialize;
use std::collections::HashMap;
use tracing::debug;

/// Document id → chunk embeddings
pub type EmbeddingMap = HashMap<String, Vec<Vec<f32>>>;

const SHORT_QUERY_TOKENS: usize = 3;
const LONG_QUERY_TOKENS: usize = 12;
const SHORT_QUERY_ALPHA: f32 = 0.7;
const LONG_QUERY_ALPHA: f32 = 0.35;
const CODE_QUERY_BONUS: f32 = 0.1;

/// What the engine actually did for one search
#[derive(Debug, Clone, Serialize)]
pub struct SearchStats {
    pub requested_mode: SearchMode,
    /// Mode after hybrid downgrade / missing-embedding fallback
    pub effective_mode: SearchMode,
    pub ranking_strategy: RankingStrategy,
    /// α used for weighted fusion
    pub lexical_weight: f32,
    pub vector_available: bool,
    pub candidates: usize,
    pub duplicates_removed: usize,
    pub below_threshold: usize,
    pub returned: usize,
}

#[derive(Debug, Clone)]
pub struct SearchOutcome {
    pub results: Vec<SearchResult>,
    pub stats: SearchStats,
}

/// Hybrid searcher combining BM25 lexical scoring and embedding similarity
pub struct HybridSearchEngine {
    config: SearchConfig,
}

impl HybridSearchEngine {
    /// Create a new hybrid search engine
    pub fn new(config: SearchConfig) -> Result<Self, SearchError> {
        // Validates rrf_k up front so a bad value fails at construction
        FusionConfig::new(config.rrf_k, 0.5, 0.5)?;

        if config.excerpt_chars < 16 {
            return Err(SearchError::InvalidExcerptLength(config.excerpt_chars));
        }

        Ok(Self { config })
    }

    pub fn config(&self) -> &SearchConfig {
        &self.config
    }

    /// Score, fuse and rank the candidate documents
    ///
    /// `documents` is already filtered by the caller. An empty `query_embedding`
    /// degrades vector and hybrid modes to lexical-only scoring.
    pub fn search(
        &self,
        query: &SearchQuery,
        documents: &DocumentSet,
        embeddings: &EmbeddingMap,
        query_embedding: &[f32],
        mode: SearchMode,
        strategy: RankingStrategy,
    ) -> Result<SearchOutcome, SearchError> {
        let vector_available = !query_embedding.is_empty();
        let effective_mode = match mode {
            SearchMode::Hybrid if !query.use_hybrid_search => SearchMode::Lexical,
            SearchMode::Hybrid | SearchMode::Vector if !vector_available => SearchMode::Lexical,
            other => other,
        };
        let alpha = match strategy {
            RankingStrategy::Adaptive => adaptive_alpha(&query.query_text, self.config.lexical_weight),
            _ => self.config.lexical_weight,
        };

        let lexical_scores = LexicalScorer::new(documents).score_all(&query.query_text);
        let vector_scores: HashMap<&str, f32> = if effective_mode == SearchMode::Lexical {
            HashMap::new()
        } else {
            documents
                .keys()
                .map(|id| (id.as_str(), vector_score(query_embedding, embeddings.get(id))))
                .collect()
        };

        let rrf_scores = if effective_mode == SearchMode::Hybrid
            && strategy == RankingStrategy::ReciprocalRankFusion
        {
            let fusion = FusionConfig::new(self.config.rrf_k, alpha, 1.0 - alpha)?;
            let lexical_list = ranked_list(
                documents
                    .keys()
                    .map(|id| (id.as_str(), lexical_scores.get(id).copied().unwrap_or(0.0))),
            );
            let vector_list = ranked_list(
                documents
                    .keys()
                    .map(|id| (id.as_str(), vector_scores.get(id.as_str()).copied().unwrap_or(0.0))),
            );
            Some(reciprocal_rank_fusion(&lexical_list, &vector_list, &fusion))
        } else {
            None
        };

        let mut results: Vec<SearchResult> = documents
            .iter()
            .map(|(id, doc)| {
                let lexical = lexical_scores.get(id).copied().unwrap_or(0.0);
                let vector = vector_scores.get(id.as_str()).copied();

                let fused = match (effective_mode, vector) {
                    (SearchMode::Lexical, _) | (_, None) => lexical,
                    (SearchMode::Vector, Some(v)) => v,
                    (SearchMode::Hybrid, Some(v)) => match strategy {
                        RankingStrategy::WeightedSum | RankingStrategy::Adaptive => {
                            alpha * lexical + (1.0 - alpha) * v
                        }
                        RankingStrategy::MaxScore => lexical.max(v),
                        RankingStrategy::ReciprocalRankFusion => rrf_scores
                            .as_ref()
                            .and_then(|scores| scores.get(id))
                            .copied()
                            .unwrap_or(0.0),
                    },
                };
                let fused = fused.clamp(0.0, 1.0);

                SearchResult {
                    document: doc.clone(),
                    excerpt: String::new(),
                    scores: ScoreBreakdown {
                        lexical,
                        vector,
                        hybrid: fused,
                        feature: None,
                        contextual: None,
                    },
                    final_score: fused,
                    rank: 0,
                }
            })
            .collect();

        let candidates = results.len();
        rank_results(&mut results);

        let mut results = deduplicate_by_content(results);
        let duplicates_removed = candidates - results.len();

        let before_threshold = results.len();
        results.retain(|r| r.final_score >= query.similarity_threshold);
        let below_threshold = before_threshold - results.len();

        results.truncate(query.top_k);

        let query_terms = unique_terms(&query.query_text);
        for (i, result) in results.iter_mut().enumerate() {
            result.excerpt =
                extract_excerpt(&result.document.content, &query_terms, self.config.excerpt_chars);
            result.rank = i + 1;
        }

        debug!(
            mode = %effective_mode,
            strategy = %strategy,
            candidates,
            returned = results.len(),
            "Hybrid search complete"
        );

        let stats = SearchStats {
            requested_mode: mode,
            effective_mode,
            ranking_strategy: strategy,
            lexical_weight: alpha,
            vector_available,
            candidates,
            duplicates_removed,
            below_threshold,
            returned: results.len(),
        };

        Ok(SearchOutcome { results, stats })
    }
}

/// Max cosine similarity over a document's chunks, clamped to [0,1]
fn vector_score(query_embedding: &[f32], chunks: Option<&Vec<Vec<f32>>>) -> f32 {
    chunks
        .map(|chunks| {
            chunks
                .iter()
                .map(|chunk| cosine_similarity(query_embedding, chunk))
                .fold(0.0f32, f32::max)
        })
        .unwrap_or(0.0)
        .clamp(0.0, 1.0)
}

/// Positive scores only, best first, ties in input order
fn ranked_list<'a>(scores: impl Iterator<Item = (&'a str, f32)>) -> Vec<(String, f32)> {
    let mut list: Vec<(String, f32)> = scores
        .filter(|(_, s)| *s > 0.0)
        .map(|(id, s)| (id.to_string(), s))
        .collect();
    list.sort_by(|a, b| b.1.total_cmp(&a.1));
    list
}

/// Short keyword queries lean lexical, long natural-language queries lean vector
///
/// Code-looking tokens (`snake_case`, `camelCase`, dotted paths) push back toward lexical.
fn adaptive_alpha(query_text: &str, base: f32) -> f32 {
    let tokens = text::content_tokens(query_text);
    let mut alpha = if tokens.len() <= SHORT_QUERY_TOKENS {
        SHORT_QUERY_ALPHA
    } else if tokens.len() >= LONG_QUERY_TOKENS {
        LONG_QUERY_ALPHA
    } else {
        base
    };

    let looks_like_code = query_text.split_whitespace().any(|w| {
        w.contains('_')
            || w.contains("::")
            || w.contains('(')
            || (w.chars().skip(1).any(|c| c.is_uppercase()) && w.chars().any(|c| c.is_lowercase()))
    });
    if looks_like_code {
        alpha += CODE_QUERY_BONUS;
    }

    alpha.clamp(0.0, 1.0)
}
