//! Session-aware expansion from recent queries and recurring topics

use crate::expansion::{
    detect_concepts, ExpansionError, ExpansionRequest, ExpansionStrategy, ExpansionTerm,
    QueryExpander,
};
use crate::session::ComplexityLevel;
use crate::text;
use dashmap::DashMap;
use serde::Serialize;
use std::collections::{BTreeMap, HashSet, VecDeque};

const RECENT_QUERY_CAP: usize = 10;
const TOPIC_MIN_FREQUENCY: u32 = 2;
const TOPIC_WEIGHT: f32 = 0.5;
const SIMILARITY_THRESHOLD: f32 = 0.6;
const SIMILAR_QUERY_WEIGHT: f32 = 0.4;
const TERMS_PER_SIMILAR_QUERY: usize = 3;
const COMPLEXITY_CONFIDENCE: f32 = 0.6;
const COMPLEXITY_WEIGHT: f32 = 0.3;
const FAVORITE_CONFIDENCE: f32 = 0.7;
const FAVORITE_WEIGHT: f32 = 0.6;

/// Rolling per-session state owned by the contextual expander
#[derive(Debug, Clone, Default, Serialize)]
pub struct ContextualState {
    pub recent_queries: VecDeque<String>,
    pub topic_counts: BTreeMap<String, u32>,
    pub content_type_counts: BTreeMap<String, u32>,
    pub complexity: ComplexityLevel,
}

impl ContextualState {
    fn observe(&mut self, req: &ExpansionRequest<'_>) {
        for topic in detect_concepts(req.query_text) {
            *self.topic_counts.entry(topic.to_string()).or_insert(0) += 1;
        }
        if let Some(types) = req.content_types {
            for content_type in types {
                *self
                    .content_type_counts
                    .entry(content_type.as_str().to_string())
                    .or_insert(0) += 1;
            }
        }
        if let Some(level) = ComplexityLevel::detect(req.query_text) {
            self.complexity = level;
        }

        self.recent_queries.push_back(req.query_text.to_string());
        while self.recent_queries.len() > RECENT_QUERY_CAP {
            self.recent_queries.pop_front();
        }
    }
}

/// Topic confidence grows with frequency and saturates at 0.9
fn topic_confidence(frequency: u32) -> f32 {
    (0.5 + 0.1 * frequency as f32).min(0.9)
}

/// Expands from the session's rolling window
///
/// Needs an [`ExpansionContext`](crate::expansion::ExpansionContext) with a
/// session id; without one it adds nothing and keeps no state.
pub struct ContextualExpander {
    states: DashMap<String, ContextualState>,
}

impl ContextualExpander {
    pub fn new() -> Self {
        Self {
            states: DashMap::new(),
        }
    }

    pub fn state(&self, session_id: &str) -> Option<ContextualState> {
        self.states.get(session_id).map(|r| r.clone())
    }

    pub fn forget(&self, session_id: &str) -> bool {
        self.states.remove(session_id).is_some()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl Default for ContextualExpander {
    fn default() -> Self {
        Self::new()
    }
}

impl QueryExpander for ContextualExpander {
    fn strategy(&self) -> ExpansionStrategy {
        ExpansionStrategy::Contextual
    }

    fn expand(&self, req: &ExpansionRequest<'_>) -> Result<Vec<ExpansionTerm>, ExpansionError> {
        let Some(ctx) = req.context.filter(|c| !c.session_id.is_empty()) else {
            return Ok(Vec::new());
        };

        let mut entry = self.states.entry(ctx.session_id.clone()).or_default();
        let previous: Vec<String> = entry.recent_queries.iter().cloned().collect();
        entry.observe(req);
        let state = entry.clone();
        drop(entry);

        let mut terms = Vec::new();

        for (topic, &frequency) in &state.topic_counts {
            if frequency < TOPIC_MIN_FREQUENCY {
                continue;
            }
            let term = topic.replace('_', " ");
            if !req.mentions(&term) {
                terms.push(ExpansionTerm::new(
                    term,
                    ExpansionStrategy::Contextual,
                    topic_confidence(frequency),
                    TOPIC_WEIGHT,
                    format!("topic:{}x{}", topic, frequency),
                )?);
            }
        }

        let current: HashSet<String> = req.tokens.iter().cloned().collect();
        for prior in &previous {
            let prior_tokens = text::content_tokens(prior);
            let prior_set: HashSet<String> = prior_tokens.iter().cloned().collect();
            let similarity = text::jaccard(&current, &prior_set);
            if similarity <= SIMILARITY_THRESHOLD {
                continue;
            }

            let mut seen = HashSet::new();
            let carried = prior_tokens
                .into_iter()
                .filter(|t| !current.contains(t) && seen.insert(t.clone()))
                .take(TERMS_PER_SIMILAR_QUERY);
            for term in carried {
                terms.push(ExpansionTerm::new(
                    term,
                    ExpansionStrategy::Contextual,
                    similarity,
                    SIMILAR_QUERY_WEIGHT,
                    "similar_query",
                )?);
            }
        }

        for &term in state.complexity.vocabulary() {
            if !req.mentions(term) {
                terms.push(ExpansionTerm::new(
                    term,
                    ExpansionStrategy::Contextual,
                    COMPLEXITY_CONFIDENCE,
                    COMPLEXITY_WEIGHT,
                    format!("complexity:{}", state.complexity.as_str()),
                )?);
            }
        }

        for topic in &ctx.favorite_topics {
            let term = topic.replace('_', " ");
            if !req.mentions(&term) {
                terms.push(ExpansionTerm::new(
                    term,
                    ExpansionStrategy::Contextual,
                    FAVORITE_CONFIDENCE,
                    FAVORITE_WEIGHT,
                    "favorite_topic",
                )?);
            }
        }

        Ok(terms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expansion::ExpansionContext;
    use crate::search::SearchQuery;

    fn run(expander: &ContextualExpander, query: &str, ctx: Option<&ExpansionContext>) -> Vec<ExpansionTerm> {
        let query = SearchQuery::new(query);
        let req = ExpansionRequest::new(&query, ctx);
        expander.expand(&req).unwrap()
    }

    #[test]
    fn test_no_session_no_terms() {
        let expander = ContextualExpander::new();
        assert!(run(&expander, "blocks", None).is_empty());
        assert!(expander.is_empty());
    }

    #[test]
    fn test_topic_carries_over() {
        let expander = ContextualExpander::new();
        let ctx = ExpansionContext::new("s1");

        let first = run(&expander, "blocks", Some(&ctx));
        assert!(!first.iter().any(|t| t.source.starts_with("topic:")));

        let second = run(&expander, "block properties", Some(&ctx));
        let topic = second.iter().find(|t| t.term == "blocks").unwrap();
        assert!((topic.confidence - 0.7).abs() < 1e-6);
        assert_eq!(topic.weight, TOPIC_WEIGHT);
    }

    #[test]
    fn test_similar_query_terms() {
        let expander = ContextualExpander::new();
        let ctx = ExpansionContext::new("s1");

        run(&expander, "register custom block hardness value", Some(&ctx));
        let terms = run(&expander, "register custom block hardness", Some(&ctx));

        let carried = terms.iter().find(|t| t.term == "value").unwrap();
        assert!((carried.confidence - 0.8).abs() < 1e-6);
        assert_eq!(carried.weight, SIMILAR_QUERY_WEIGHT);
    }

    #[test]
    fn test_complexity_and_favorites() {
        let expander = ContextualExpander::new();
        let ctx = ExpansionContext {
            favorite_topics: vec!["redstone".to_string()],
            ..ExpansionContext::new("s1")
        };

        let terms = run(&expander, "a simple door", Some(&ctx));
        let basics = terms.iter().find(|t| t.term == "basics").unwrap();
        assert_eq!(basics.confidence, COMPLEXITY_CONFIDENCE);
        assert_eq!(basics.weight, COMPLEXITY_WEIGHT);

        let favorite = terms.iter().find(|t| t.term == "redstone").unwrap();
        assert_eq!(favorite.confidence, FAVORITE_CONFIDENCE);

        // Level persists without a new cue
        let terms = run(&expander, "door hinge", Some(&ctx));
        assert!(terms.iter().any(|t| t.term == "beginner"));
    }

    #[test]
    fn test_recent_queries_capped_and_forgotten() {
        let expander = ContextualExpander::new();
        let ctx = ExpansionContext::new("s1");
        for i in 0..15 {
            run(&expander, &format!("query {}", i), Some(&ctx));
        }
        assert_eq!(expander.state("s1").unwrap().recent_queries.len(), RECENT_QUERY_CAP);
        assert!(expander.forget("s1"));
        assert!(expander.state("s1").is_none());
    }

    #[test]
    fn test_topic_confidence_saturates() {
        assert!((topic_confidence(2) - 0.7).abs() < 1e-6);
        assert!((topic_confidence(10) - 0.9).abs() < 1e-6);
    }
}
