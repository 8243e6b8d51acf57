//! Query expansion
//!
//! Runs the requested expansion strategies over a query, merges their terms
//! (dedup by lowercased text, keeping the strongest), ranks them by
//! confidence × weight and appends the survivors to the original text.
//!
//! Sub-expander failures are recorded per strategy and never fail the whole
//! expansion.

mod contextual;
mod domain;
mod synonym;

pub use contextual::{ContextualExpander, ContextualState};
pub use domain::{detect_concepts, DomainExpander};
pub use synonym::SynonymExpander;

use crate::documents::ContentType;
use crate::search::SearchQuery;
use crate::text;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap, HashSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, warn};

pub const DEFAULT_MAX_TERMS: usize = 10;

#[derive(Error, Debug, Clone)]
pub enum ExpansionError {
    #[error("Query has {words} words, more than the {max} allowed for expansion")]
    QueryTooLong { words: usize, max: usize },

    #[error("Invalid expansion term '{term}': {reason}")]
    InvalidTerm { term: String, reason: String },

    #[error("{strategy} expansion failed: {message}")]
    Failed { strategy: String, message: String },
}

/// Where an expansion term came from
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExpansionStrategy {
    Domain,
    Synonym,
    Contextual,
    Semantic,
    Historical,
}

impl ExpansionStrategy {
    /// Strategies run when none are requested explicitly
    pub const DEFAULT: [ExpansionStrategy; 3] = [
        ExpansionStrategy::Domain,
        ExpansionStrategy::Synonym,
        ExpansionStrategy::Contextual,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ExpansionStrategy::Domain => "domain",
            ExpansionStrategy::Synonym => "synonym",
            ExpansionStrategy::Contextual => "contextual",
            ExpansionStrategy::Semantic => "semantic",
            ExpansionStrategy::Historical => "historical",
        }
    }

    /// Parse a list of names, dropping unknown names and repeats
    pub fn parse_list(names: &[String]) -> Vec<ExpansionStrategy> {
        let mut parsed = Vec::new();
        for name in names {
            match name.parse::<ExpansionStrategy>() {
                Ok(strategy) if !parsed.contains(&strategy) => parsed.push(strategy),
                Ok(_) => {}
                Err(e) => debug!("Ignoring expansion strategy: {}", e),
            }
        }
        parsed
    }
}

impl fmt::Display for ExpansionStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ExpansionStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "domain" => Ok(ExpansionStrategy::Domain),
            "synonym" | "synonyms" => Ok(ExpansionStrategy::Synonym),
            "contextual" | "context" => Ok(ExpansionStrategy::Contextual),
            "semantic" => Ok(ExpansionStrategy::Semantic),
            "historical" | "history" => Ok(ExpansionStrategy::Historical),
            other => Err(format!("unknown expansion strategy '{}'", other)),
        }
    }
}

/// A candidate term to append to the query
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpansionTerm {
    pub term: String,
    pub strategy: ExpansionStrategy,
    /// In [0,1]
    pub confidence: f32,
    /// Free-form provenance, e.g. `concept:blocks`
    pub source: String,
    /// In [0,1]
    pub weight: f32,
}

impl ExpansionTerm {
    /// Build a term, clamping confidence and weight into [0,1]
    pub fn new(
        term: impl Into<String>,
        strategy: ExpansionStrategy,
        confidence: f32,
        weight: f32,
        source: impl Into<String>,
    ) -> Result<Self, ExpansionError> {
        let term = term.into().trim().to_string();
        if term.is_empty() {
            return Err(ExpansionError::InvalidTerm {
                term,
                reason: "empty term".to_string(),
            });
        }
        if !confidence.is_finite() || !weight.is_finite() {
            return Err(ExpansionError::InvalidTerm {
                term,
                reason: "confidence and weight must be finite".to_string(),
            });
        }

        Ok(Self {
            term,
            strategy,
            confidence: confidence.clamp(0.0, 1.0),
            source: source.into(),
            weight: weight.clamp(0.0, 1.0),
        })
    }

    /// Ranking key
    pub fn score(&self) -> f32 {
        self.confidence * self.weight
    }
}

/// Session and project hints available to the expanders
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpansionContext {
    pub session_id: String,
    pub minecraft_version: Option<String>,
    pub mod_loader: Option<String>,
    pub edition: Option<String>,
    pub favorite_topics: Vec<String>,
}

impl ExpansionContext {
    pub fn new(session_id: impl Into<String>) -> Self {
        Self {
            session_id: session_id.into(),
            ..Default::default()
        }
    }
}

/// What a sub-expander gets to look at
pub struct ExpansionRequest<'a> {
    pub query_text: &'a str,
    pub query_lower: String,
    /// Content tokens of the query, in order
    pub tokens: Vec<String>,
    pub content_types: Option<&'a BTreeSet<ContentType>>,
    pub project_context: Option<&'a str>,
    pub context: Option<&'a ExpansionContext>,
}

impl<'a> ExpansionRequest<'a> {
    pub fn new(query: &'a SearchQuery, context: Option<&'a ExpansionContext>) -> Self {
        Self {
            query_text: &query.query_text,
            query_lower: query.query_text.to_lowercase(),
            tokens: text::content_tokens(&query.query_text),
            content_types: query.content_types.as_ref(),
            project_context: query.project_context.as_deref(),
            context,
        }
    }

    /// Whether `term` already appears in the query text
    pub fn mentions(&self, term: &str) -> bool {
        self.query_lower.contains(&term.to_lowercase())
    }

    pub fn word_count(&self) -> usize {
        self.query_text.split_whitespace().count()
    }
}

/// One expansion strategy
pub trait QueryExpander: Send + Sync {
    fn strategy(&self) -> ExpansionStrategy;

    fn expand(&self, req: &ExpansionRequest<'_>) -> Result<Vec<ExpansionTerm>, ExpansionError>;
}

/// Per-strategy outcome
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StrategyStats {
    /// Terms the strategy produced before dedup and truncation
    pub produced: usize,
    /// Terms that made it into the expanded query
    pub kept: usize,
    pub avg_confidence: f32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ExpansionMetadata {
    pub original_tokens: usize,
    pub expanded_tokens: usize,
    /// expanded / original token count (1.0 for an empty original)
    pub expansion_ratio: f32,
    pub strategies: BTreeMap<ExpansionStrategy, StrategyStats>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,
}

impl ExpansionMetadata {
    pub fn errors(&self) -> Vec<(ExpansionStrategy, &str)> {
        self.strategies
            .iter()
            .filter_map(|(s, stats)| stats.error.as_deref().map(|e| (*s, e)))
            .collect()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExpandedQuery {
    pub original_query: String,
    pub expanded_query: String,
    /// Kept terms, best first
    pub terms: Vec<ExpansionTerm>,
    /// Weight-normalised mean confidence of the kept terms, 0.0 when none
    pub expansion_confidence: f32,
    pub metadata: ExpansionMetadata,
}

/// Multi-strategy query expansion engine
pub struct QueryExpansionEngine {
    expanders: Vec<Arc<dyn QueryExpander>>,
    contextual: Arc<ContextualExpander>,
}

impl QueryExpansionEngine {
    /// Engine with the built-in domain, synonym and contextual expanders
    pub fn new(max_query_words: usize) -> Self {
        let contextual = Arc::new(ContextualExpander::new());
        let expanders: Vec<Arc<dyn QueryExpander>> = vec![
            Arc::new(DomainExpander::new(max_query_words)),
            Arc::new(SynonymExpander::new()),
            contextual.clone(),
        ];

        Self {
            expanders,
            contextual,
        }
    }

    /// Register an expander, replacing any existing one for the same strategy
    pub fn with_expander(mut self, expander: Arc<dyn QueryExpander>) -> Self {
        let strategy = expander.strategy();
        self.expanders.retain(|e| e.strategy() != strategy);
        self.expanders.push(expander);
        self
    }

    /// Drop the rolling contextual state for a session
    pub fn forget_session(&self, session_id: &str) -> bool {
        self.contextual.forget(session_id)
    }

    pub fn contextual_state(&self, session_id: &str) -> Option<ContextualState> {
        self.contextual.state(session_id)
    }

    pub fn tracked_sessions(&self) -> usize {
        self.contextual.len()
    }

    /// Expand `query` with the given strategies
    ///
    /// Never fails: expander errors are recorded in the metadata and that
    /// strategy contributes nothing.
    pub fn expand(
        &self,
        query: &SearchQuery,
        strategies: &[ExpansionStrategy],
        max_terms: usize,
        context: Option<&ExpansionContext>,
    ) -> ExpandedQuery {
        let req = ExpansionRequest::new(query, context);
        let mut metadata = ExpansionMetadata {
            session_id: context.map(|c| c.session_id.clone()),
            ..Default::default()
        };
        let mut candidates: Vec<ExpansionTerm> = Vec::new();

        let mut seen = HashSet::new();
        for strategy in strategies.iter().filter(|s| seen.insert(**s)) {
            let stats = metadata.strategies.entry(*strategy).or_default();
            let Some(expander) = self.expanders.iter().find(|e| e.strategy() == *strategy) else {
                continue;
            };

            match expander.expand(&req) {
                Ok(terms) => {
                    stats.produced = terms.len();
                    stats.avg_confidence = mean_confidence(&terms);
                    candidates.extend(terms);
                }
                Err(e) => {
                    let failure = ExpansionError::Failed {
                        strategy: strategy.to_string(),
                        message: e.to_string(),
                    };
                    warn!("{}", failure);
                    stats.error = Some(failure.to_string());
                }
            }
        }

        let mut terms = deduplicate(candidates);
        terms.sort_by(|a, b| b.score().total_cmp(&a.score()));
        terms.truncate(max_terms);

        for term in &terms {
            if let Some(stats) = metadata.strategies.get_mut(&term.strategy) {
                stats.kept += 1;
            }
        }

        let expanded_query = if terms.is_empty() {
            query.query_text.clone()
        } else {
            let appended: Vec<&str> = terms.iter().map(|t| t.term.as_str()).collect();
            format!("{} {}", query.query_text, appended.join(" "))
        };

        metadata.original_tokens = query.query_text.split_whitespace().count();
        metadata.expanded_tokens = expanded_query.split_whitespace().count();
        metadata.expansion_ratio = if metadata.original_tokens == 0 {
            1.0
        } else {
            metadata.expanded_tokens as f32 / metadata.original_tokens as f32
        };

        debug!(
            terms = terms.len(),
            original_tokens = metadata.original_tokens,
            expanded_tokens = metadata.expanded_tokens,
            "Query expanded"
        );

        ExpandedQuery {
            original_query: query.query_text.clone(),
            expanded_query,
            expansion_confidence: weighted_confidence(&terms),
            terms,
            metadata,
        }
    }
}

impl Default for QueryExpansionEngine {
    fn default() -> Self {
        Self::new(crate::config::ExpansionConfig::default().max_query_words)
    }
}

/// Keep the highest-scoring term per lowercased text, in first-seen order
fn deduplicate(candidates: Vec<ExpansionTerm>) -> Vec<ExpansionTerm> {
    let mut index: HashMap<String, usize> = HashMap::new();
    let mut kept: Vec<ExpansionTerm> = Vec::new();

    for term in candidates {
        let key = term.term.to_lowercase();
        match index.get(&key) {
            Some(&i) => {
                if term.score() > kept[i].score() {
                    kept[i] = term;
                }
            }
            None => {
                index.insert(key, kept.len());
                kept.push(term);
            }
        }
    }

    kept
}

fn mean_confidence(terms: &[ExpansionTerm]) -> f32 {
    if terms.is_empty() {
        return 0.0;
    }
    terms.iter().map(|t| t.confidence).sum::<f32>() / terms.len() as f32
}

/// Σ(confidence·weight) / Σ weight, 0.0 when there is nothing to average
fn weighted_confidence(terms: &[ExpansionTerm]) -> f32 {
    let total_weight: f32 = terms.iter().map(|t| t.weight).sum();
    if total_weight <= 0.0 {
        return 0.0;
    }
    let weighted: f32 = terms.iter().map(|t| t.confidence * t.weight).sum();
    (weighted / total_weight).clamp(0.0, 1.0)
}
