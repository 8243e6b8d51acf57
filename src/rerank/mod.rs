//! Secondary scoring over hybrid search results
//!
//! Each [`ReRanker`] turns the ranked list into one signal per result; the
//! [`EnsembleReRanker`] fuses those signals with the hybrid score, re-sorts
//! and reassigns ranks. A failing signal never fails the request: the
//! ensemble keeps the pre-rerank ordering and records the failure.

mod contextual;
mod ensemble;
mod feature;

pub use contextual::ContextualReRanker;
pub use ensemble::EnsembleReRanker;
pub use feature::FeatureBasedReRanker;

use crate::documents::ContentType;
use crate::search::SearchQuery;
use crate::session::SessionContext;
use crate::text;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use thiserror::Error;

#[derive(Error, Debug, Clone)]
pub enum RerankError {
    #[error("{name} returned {got} signals for {expected} results")]
    SignalCount {
        name: String,
        expected: usize,
        got: usize,
    },

    #[error("{name} produced a non-finite signal at position {index}")]
    InvalidSignal { name: String, index: usize },

    #[error("{name} failed: {message}")]
    Failed { name: String, message: String },
}

/// What a re-ranker may look at
pub struct RerankContext<'a> {
    pub query_text: &'a str,
    /// Stemmed content tokens of the query
    pub query_terms: HashSet<String>,
    pub content_types: Option<&'a BTreeSet<ContentType>>,
    pub project_context: Option<&'a str>,
    /// Read-only session snapshot
    pub session: Option<&'a SessionContext>,
}

impl<'a> RerankContext<'a> {
    pub fn new(query: &'a SearchQuery, session: Option<&'a SessionContext>) -> Self {
        Self {
            query_text: &query.query_text,
            query_terms: text::stemmed_tokens(&query.query_text).into_iter().collect(),
            content_types: query.content_types.as_ref(),
            project_context: query.project_context.as_deref(),
            session,
        }
    }
}

/// One re-ranking signal
pub trait ReRanker: Send + Sync {
    fn name(&self) -> &'static str;

    /// One score in [0,1] per result, in input order
    fn signals(
        &self,
        ctx: &RerankContext<'_>,
        results: &[crate::search::SearchResult],
    ) -> Result<Vec<f32>, RerankError>;
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalStats {
    pub weight: f32,
    pub avg_signal: f32,
    /// Average share of the fused score coming from this signal
    pub avg_contribution: f32,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RerankMetadata {
    pub applied: bool,
    /// True when a signal failed and the input ordering was kept
    pub fallback: bool,
    pub base_weight: f32,
    pub base_contribution: f32,
    pub signals: BTreeMap<String, SignalStats>,
    /// Results whose rank changed
    pub rank_changes: usize,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub errors: Vec<String>,
}
