use crate::documents::{ContentType, MultiModalDocument};
use crate::expansion::detect_concepts;
use crate::rerank::{RerankContext, RerankError, ReRanker};
use crate::search::SearchResult;
use crate::session::{ComplexityLevel, SessionContext};

const TYPE_WEIGHT: f32 = 0.4;
const TOPIC_WEIGHT: f32 = 0.4;
const COMPLEXITY_WEIGHT: f32 = 0.2;
const NEUTRAL: f32 = 0.5;

/// Boosts what the session has favoured so far
///
/// Reads the session snapshot in the context and never mutates it. Sessions
/// without history get a neutral 0.5 for every result.
#[derive(Debug, Default)]
pub struct ContextualReRanker;

impl ContextualReRanker {
    pub fn new() -> Self {
        Self
    }

    fn score(&self, session: &SessionContext, doc: &MultiModalDocument) -> f32 {
        let type_preference = session.content_type_share(doc.content_type);
        let topic = topic_overlap(session, doc);
        let alignment = complexity_alignment(session.complexity_level, document_level(doc));

        TYPE_WEIGHT * type_preference + TOPIC_WEIGHT * topic + COMPLEXITY_WEIGHT * alignment
    }
}

/// Share of the session's topic interest that this document covers
fn topic_overlap(session: &SessionContext, doc: &MultiModalDocument) -> f32 {
    let total: u32 = session.topic_interests.values().sum();
    if total == 0 {
        return 0.0;
    }

    let tags: Vec<&str> = doc.tags.iter().map(String::as_str).collect();
    let doc_topics = detect_concepts(&format!("{} {}", doc.content, tags.join(" ")));
    let covered: u32 = doc_topics
        .iter()
        .filter_map(|topic| session.topic_interests.get(*topic))
        .sum();

    covered as f32 / total as f32
}

fn document_level(doc: &MultiModalDocument) -> ComplexityLevel {
    if doc.has_tag("beginner") || doc.has_tag("tutorial") {
        ComplexityLevel::Simple
    } else if doc.has_tag("advanced") {
        ComplexityLevel::Advanced
    } else if matches!(doc.content_type, ContentType::Code | ContentType::Schema) {
        ComplexityLevel::Technical
    } else {
        ComplexityLevel::Medium
    }
}

fn level_index(level: ComplexityLevel) -> i32 {
    match level {
        ComplexityLevel::Simple => 0,
        ComplexityLevel::Medium => 1,
        ComplexityLevel::Advanced => 2,
        ComplexityLevel::Technical => 3,
    }
}

fn complexity_alignment(session: ComplexityLevel, doc: ComplexityLevel) -> f32 {
    let distance = (level_index(session) - level_index(doc)).abs();
    1.0 - distance as f32 / 3.0
}

impl ReRanker for ContextualReRanker {
    fn name(&self) -> &'static str {
        "contextual"
    }

    fn signals(
        &self,
        ctx: &RerankContext<'_>,
        results: &[SearchResult],
    ) -> Result<Vec<f32>, RerankError> {
        let session = match ctx.session {
            Some(session) if !session.queries.is_empty() => session,
            _ => return Ok(vec![NEUTRAL; results.len()]),
        };

        Ok(results
            .iter()
            .map(|r| self.score(session, &r.document).clamp(0.0, 1.0))
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::search::{ScoreBreakdown, SearchQuery};
    use crate::session::QueryRecord;
    use std::sync::Arc;

    fn result(doc: MultiModalDocument) -> SearchResult {
        SearchResult {
            document: Arc::new(doc),
            excerpt: String::new(),
            scores: ScoreBreakdown::default(),
            final_score: 0.5,
            rank: 1,
        }
    }

    fn results() -> Vec<SearchResult> {
        vec![
            result(MultiModalDocument::new(
                "recipes",
                "recipes.json",
                ContentType::Code,
                "A shaped recipe with crafting ingredients.",
            )),
            result(
                MultiModalDocument::new(
                    "blocks",
                    "blocks.md",
                    ContentType::Documentation,
                    "Every block has a hardness.",
                )
                .with_tags(["tutorial"]),
            ),
        ]
    }

    #[test]
    fn test_neutral_without_history() {
        let query = SearchQuery::new("anything");
        let ctx = RerankContext::new(&query, None);
        let signals = ContextualReRanker::new().signals(&ctx, &results()).unwrap();
        assert_eq!(signals, vec![NEUTRAL, NEUTRAL]);
    }

    #[test]
    fn test_prefers_session_topics_and_types() {
        let mut session = SessionContext::new("s1");
        for _ in 0..3 {
            session.record(
                QueryRecord {
                    content_types: vec![ContentType::Documentation],
                    topics: vec!["blocks".to_string()],
                    ..QueryRecord::new("simple block question", 0.8)
                },
                true,
                20,
                10,
            );
        }

        let query = SearchQuery::new("anything");
        let ctx = RerankContext::new(&query, Some(&session));
        let signals = ContextualReRanker::new().signals(&ctx, &results()).unwrap();

        assert!(signals[1] > signals[0]);
        assert!((signals[1] - 1.0).abs() < 1e-6);
    }

    #[test]
    fn test_complexity_alignment() {
        assert_eq!(
            complexity_alignment(ComplexityLevel::Simple, ComplexityLevel::Simple),
            1.0
        );
        assert_eq!(
            complexity_alignment(ComplexityLevel::Simple, ComplexityLevel::Technical),
            0.0
        );
    }
}
