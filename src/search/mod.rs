//! Hybrid retrieval
//!
//! Scores a pre-filtered document set lexically (BM25 + term coverage) and by
//! embedding similarity, fuses the two signals with a ranking strategy, and
//! returns a ranked `SearchResult` list.

mod deduplication;
mod excerpt;
mod fusion;
mod hybrid;
mod lexical;

pub use deduplication::deduplicate_by_content;
pub use excerpt::extract_excerpt;
pub use fusion::{reciprocal_rank_fusion, FusionConfig, FusionError};
pub use hybrid::{EmbeddingMap, HybridSearchEngine, SearchOutcome, SearchStats};
pub use lexical::LexicalScorer;

use crate::documents::{ContentType, MultiModalDocument};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;

pub const DEFAULT_TOP_K: usize = 10;
pub const DEFAULT_SIMILARITY_THRESHOLD: f32 = 0.1;

#[derive(Error, Debug)]
pub enum SearchError {
    #[error("Fusion configuration invalid: {0}")]
    Fusion(#[from] FusionError),

    #[error("Invalid excerpt length: {0}")]
    InvalidExcerptLength(usize),
}

/// Which signals contribute to the final score
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SearchMode {
    Lexical,
    Vector,
    Hybrid,
}

impl fmt::Display for SearchMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            SearchMode::Lexical => "lexical",
            SearchMode::Vector => "vector",
            SearchMode::Hybrid => "hybrid",
        };
        f.write_str(s)
    }
}

impl FromStr for SearchMode {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "lexical" | "keyword" => Ok(SearchMode::Lexical),
            "vector" | "semantic" => Ok(SearchMode::Vector),
            "hybrid" => Ok(SearchMode::Hybrid),
            other => Err(format!("unknown search mode '{}'", other)),
        }
    }
}

/// How lexical and vector scores are fused in hybrid mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankingStrategy {
    /// `α·lexical + (1−α)·vector`
    WeightedSum,
    /// Rank-based fusion, normalised so first place in both lists scores 1.0
    ReciprocalRankFusion,
    /// Best of the two signals
    MaxScore,
    /// Weighted sum with α chosen from the query's shape
    Adaptive,
}

impl fmt::Display for RankingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            RankingStrategy::WeightedSum => "weighted_sum",
            RankingStrategy::ReciprocalRankFusion => "reciprocal_rank_fusion",
            RankingStrategy::MaxScore => "max_score",
            RankingStrategy::Adaptive => "adaptive",
        };
        f.write_str(s)
    }
}

impl FromStr for RankingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "weighted_sum" | "weighted" => Ok(RankingStrategy::WeightedSum),
            "reciprocal_rank_fusion" | "rrf" => Ok(RankingStrategy::ReciprocalRankFusion),
            "max_score" | "max" => Ok(RankingStrategy::MaxScore),
            "adaptive" => Ok(RankingStrategy::Adaptive),
            other => Err(format!("unknown ranking strategy '{}'", other)),
        }
    }
}

/// A retrieval request
///
/// `query_text` is rewritten in place when query expansion runs.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SearchQuery {
    pub query_text: String,
    pub content_types: Option<BTreeSet<ContentType>>,
    pub project_context: Option<String>,
    pub top_k: usize,
    /// Minimum final score for a hit to be returned
    pub similarity_threshold: f32,
    pub use_hybrid_search: bool,
    pub enable_reranking: bool,
    pub expand_query: bool,
}

impl SearchQuery {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            content_types: None,
            project_context: None,
            top_k: DEFAULT_TOP_K,
            similarity_threshold: DEFAULT_SIMILARITY_THRESHOLD,
            use_hybrid_search: true,
            enable_reranking: true,
            expand_query: true,
        }
    }

    pub fn with_content_types(mut self, types: impl IntoIterator<Item = ContentType>) -> Self {
        let set: BTreeSet<ContentType> = types.into_iter().collect();
        self.content_types = if set.is_empty() { None } else { Some(set) };
        self
    }

    pub fn with_project_context(mut self, project_context: impl Into<String>) -> Self {
        self.project_context = Some(project_context.into());
        self
    }

    pub fn with_top_k(mut self, top_k: usize) -> Self {
        self.top_k = top_k;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }
}

/// Per-signal scores behind a result's `final_score`
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub lexical: f32,
    /// None when no query embedding was available
    pub vector: Option<f32>,
    /// Fused search score before re-ranking
    pub hybrid: f32,
    pub feature: Option<f32>,
    pub contextual: Option<f32>,
}

/// One scored retrieval hit
#[derive(Debug, Clone, Serialize)]
pub struct SearchResult {
    pub document: Arc<MultiModalDocument>,
    /// Window of the document most relevant to the query
    pub excerpt: String,
    pub scores: ScoreBreakdown,
    pub final_score: f32,
    /// 1-based position after sorting
    pub rank: usize,
}

impl SearchResult {
    pub fn document_id(&self) -> &str {
        &self.document.id
    }
}

/// Stable sort by descending `final_score`, then assign 1-based ranks
///
/// Equal scores keep their input order.
pub fn rank_results(results: &mut [SearchResult]) {
    results.sort_by(|a, b| b.final_score.total_cmp(&a.final_score));
    for (i, result) in results.iter_mut().enumerate() {
        result.rank = i + 1;
    }
}
