//! Answer synthesis
//!
//! The query is classified once into a [`QueryType`]; a [`ComposerTable`]
//! maps each type to the [`AnswerComposer`] that formats the sources.

use crate::documents::ContentType;
use crate::search::SearchResult;
use crate::text;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap, HashSet};
use std::fmt;

const MAX_STEPS: usize = 5;
const MAX_CONTEXT_SOURCES: usize = 3;
const SNIPPET_CHARS: usize = 240;
const CONFIDENCE_TOP_N: usize = 3;
const TYPE_DIVERSITY_BONUS: f32 = 0.1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueryType {
    HowTo,
    Explanation,
    Example,
    General,
}

impl fmt::Display for QueryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            QueryType::HowTo => "how_to",
            QueryType::Explanation => "explanation",
            QueryType::Example => "example",
            QueryType::General => "general",
        };
        f.write_str(s)
    }
}

/// Classify by trigger words; earlier rules win
pub fn classify_query(query_text: &str) -> QueryType {
    let tokens: HashSet<String> = text::tokenize(query_text).into_iter().collect();
    let lower = query_text.to_lowercase();
    let has = |words: &[&str]| words.iter().any(|w| tokens.contains(*w));

    if has(&["how"]) {
        QueryType::HowTo
    } else if has(&["what", "why", "explain"]) {
        QueryType::Explanation
    } else if has(&["example", "examples", "sample"]) || lower.contains("show me") {
        QueryType::Example
    } else {
        QueryType::General
    }
}

/// `min(avg(top-3 final_score) × (1 + 0.1 × distinct content types in top 3), 1.0)`
pub fn answer_confidence(sources: &[SearchResult]) -> f32 {
    let top = &sources[..sources.len().min(CONFIDENCE_TOP_N)];
    if top.is_empty() {
        return 0.0;
    }

    let avg = top.iter().map(|r| r.final_score).sum::<f32>() / top.len() as f32;
    let distinct: BTreeSet<ContentType> = top.iter().map(|r| r.document.content_type).collect();
    let boosted = avg * (1.0 + TYPE_DIVERSITY_BONUS * distinct.len() as f32);

    boosted.clamp(0.0, 1.0)
}

/// Answer for a query with no usable sources
pub fn no_results_answer(query_text: &str) -> String {
    format!(
        "I couldn't find relevant information about \"{}\" in the knowledge base. \
         Try rephrasing the question or widening the content-type filter.",
        query_text.trim()
    )
}

/// Formats sources into an answer for one query type
pub trait AnswerComposer: Send + Sync {
    fn compose(&self, query_text: &str, sources: &[SearchResult]) -> String;
}

/// Numbered steps drawn from the top sources
pub struct HowToComposer;

impl AnswerComposer for HowToComposer {
    fn compose(&self, query_text: &str, sources: &[SearchResult]) -> String {
        let subject = query_text.trim().trim_end_matches('?');
        let mut answer = format!("Here's how to approach \"{}\":\n", subject);

        let mut seen = HashSet::new();
        let steps: Vec<String> = sources
            .iter()
            .take(MAX_CONTEXT_SOURCES)
            .flat_map(|r| text::split_sentences(&r.document.content))
            .filter(|s| s.split_whitespace().count() >= 3)
            .filter(|s| seen.insert(s.to_lowercase()))
            .take(MAX_STEPS)
            .collect();

        for (i, step) in steps.iter().enumerate() {
            answer.push_str(&format!("\n{}. {}", i + 1, step));
        }
        answer.push_str(&sources_footer(sources));
        answer
    }
}

/// Leading paragraph of the best source plus supporting excerpts
pub struct ExplanationComposer;

impl AnswerComposer for ExplanationComposer {
    fn compose(&self, _query_text: &str, sources: &[SearchResult]) -> String {
        let Some(best) = sources.first() else {
            return String::new();
        };
        let lead = text::split_paragraphs(&best.document.content)
            .into_iter()
            .next()
            .unwrap_or_else(|| best.excerpt.clone());
        let mut answer = text::truncate_chars(&lead, SNIPPET_CHARS * 2);

        let supporting: Vec<&SearchResult> = sources
            .iter()
            .skip(1)
            .take(MAX_CONTEXT_SOURCES - 1)
            .filter(|r| !r.excerpt.is_empty())
            .collect();
        if !supporting.is_empty() {
            answer.push_str("\n\nAdditional context:");
            for r in supporting {
                answer.push_str(&format!(
                    "\n- {}",
                    text::truncate_chars(&r.excerpt, SNIPPET_CHARS)
                ));
            }
        }
        answer.push_str(&sources_footer(sources));
        answer
    }
}

/// Code-looking paragraph from the sources, fenced
pub struct ExampleComposer;

impl ExampleComposer {
    fn looks_like_code(paragraph: &str) -> bool {
        ["{", "}", "();", "=>", "::", "\": "]
            .iter()
            .any(|marker| paragraph.contains(marker))
    }
}

impl AnswerComposer for ExampleComposer {
    fn compose(&self, _query_text: &str, sources: &[SearchResult]) -> String {
        let example = sources.iter().find_map(|r| {
            let code_type = matches!(
                r.document.content_type,
                ContentType::Code | ContentType::Configuration | ContentType::Schema
            );
            text::split_paragraphs(&r.document.content)
                .into_iter()
                .find(|p| code_type || Self::looks_like_code(p))
                .map(|p| (r, p))
        });

        let mut answer = match example {
            Some((r, code)) => format!(
                "Here's an example from {}:\n\n```\n{}\n```",
                r.document.source_path, code
            ),
            None => match sources.first() {
                Some(r) => format!(
                    "No code sample matched directly; the closest reference is {}:\n\n{}",
                    r.document.source_path, r.excerpt
                ),
                None => String::new(),
            },
        };
        answer.push_str(&sources_footer(sources));
        answer
    }
}

/// Bulleted excerpts
pub struct GeneralComposer;

impl AnswerComposer for GeneralComposer {
    fn compose(&self, _query_text: &str, sources: &[SearchResult]) -> String {
        let mut answer = String::from("Based on the available documentation:\n");
        for r in sources.iter().take(MAX_CONTEXT_SOURCES) {
            answer.push_str(&format!(
                "\n- {} ({})",
                text::truncate_chars(&r.excerpt, SNIPPET_CHARS),
                r.document.source_path
            ));
        }
        answer.push_str(&sources_footer(sources));
        answer
    }
}

fn sources_footer(sources: &[SearchResult]) -> String {
    if sources.is_empty() {
        return String::new();
    }
    let paths: Vec<&str> = sources
        .iter()
        .map(|r| r.document.source_path.as_str())
        .collect();
    format!("\n\nSources: {}", paths.join(", "))
}

/// Query type → composer
pub struct ComposerTable {
    composers: HashMap<QueryType, Box<dyn AnswerComposer>>,
}

impl ComposerTable {
    pub fn new() -> Self {
        let mut composers: HashMap<QueryType, Box<dyn AnswerComposer>> = HashMap::new();
        composers.insert(QueryType::HowTo, Box::new(HowToComposer));
        composers.insert(QueryType::Explanation, Box::new(ExplanationComposer));
        composers.insert(QueryType::Example, Box::new(ExampleComposer));
        composers.insert(QueryType::General, Box::new(GeneralComposer));
        Self { composers }
    }

    /// Replace the composer for one query type
    pub fn with(mut self, query_type: QueryType, composer: Box<dyn AnswerComposer>) -> Self {
        self.composers.insert(query_type, composer);
        self
    }

    pub fn compose(&self, query_type: QueryType, query_text: &str, sources: &[SearchResult]) -> String {
        match self
            .composers
            .get(&query_type)
            .or_else(|| self.composers.get(&QueryType::General))
        {
            Some(composer) => composer.compose(query_text, sources),
            None => GeneralComposer.compose(query_text, sources),
        }
    }
}

impl Default for ComposerTable {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::MultiModalDocument;
    use crate::search::ScoreBreakdown;
    use std::sync::Arc;

    fn source(id: &str, content_type: ContentType, content: &str, score: f32) -> SearchResult {
        SearchResult {
            document: Arc::new(MultiModalDocument::new(
                id,
                format!("docs/{}.md", id),
                content_type,
                content,
            )),
            excerpt: text::truncate_chars(content, 80),
            scores: ScoreBreakdown::default(),
            final_score: score,
            rank: 1,
        }
    }

    #[test]
    fn test_classify_query() {
        assert_eq!(
            classify_query("How to create a custom block in Minecraft Java Edition"),
            QueryType::HowTo
        );
        assert_eq!(classify_query("What is a block entity?"), QueryType::Explanation);
        assert_eq!(classify_query("Explain tick order"), QueryType::Explanation);
        assert_eq!(classify_query("show me a recipe"), QueryType::Example);
        assert_eq!(classify_query("recipe example"), QueryType::Example);
        assert_eq!(classify_query("redstone dust"), QueryType::General);
        // "show" must not count as "how"
        assert_eq!(classify_query("show blocks"), QueryType::General);
    }

    #[test]
    fn test_confidence_formula() {
        let sources = vec![
            source("a", ContentType::Documentation, "a", 0.8),
            source("b", ContentType::Code, "b", 0.6),
            source("c", ContentType::Documentation, "c", 0.4),
            source("d", ContentType::Texture, "d", 0.1),
        ];
        let expected = 0.6 * 1.2;
        assert!((answer_confidence(&sources) - expected).abs() < 1e-5);

        let high = vec![
            source("a", ContentType::Documentation, "a", 1.0),
            source("b", ContentType::Code, "b", 1.0),
        ];
        assert_eq!(answer_confidence(&high), 1.0);
        assert_eq!(answer_confidence(&[]), 0.0);
    }

    #[test]
    fn test_how_to_is_numbered() {
        let sources = vec![source(
            "java_blocks",
            ContentType::Documentation,
            "Create a class extending Block. Register it with a DeferredRegister. Add a blockstate file.",
            0.9,
        )];
        let answer = ComposerTable::default().compose(QueryType::HowTo, "How to create a block?", &sources);

        assert!(answer.contains("\n1. Create a class extending Block."));
        assert!(answer.contains("\n2. Register it with a DeferredRegister."));
        assert!(answer.contains("Sources: docs/java_blocks.md"));
    }

    #[test]
    fn test_example_prefers_code() {
        let sources = vec![
            source("prose", ContentType::Documentation, "Recipes are data driven.", 0.9),
            source(
                "recipe_json",
                ContentType::Configuration,
                "{\"type\": \"minecraft:crafting_shaped\"}",
                0.5,
            ),
        ];
        let answer = ExampleComposer.compose("recipe example", &sources);
        assert!(answer.contains("```\n{\"type\": \"minecraft:crafting_shaped\"}\n```"));
        assert!(answer.contains("docs/recipe_json.md"));
    }

    #[test]
    fn test_explanation_and_general() {
        let sources = vec![
            source("a", ContentType::Documentation, "Block entities store extra data.\n\nMore.", 0.9),
            source("b", ContentType::Documentation, "They tick every game tick.", 0.5),
        ];
        let explanation = ExplanationComposer.compose("what is a block entity", &sources);
        assert!(explanation.starts_with("Block entities store extra data."));
        assert!(explanation.contains("Additional context:\n- They tick every game tick."));

        let general = GeneralComposer.compose("block entity", &sources);
        assert!(general.starts_with("Based on the available documentation:"));
        assert!(general.contains("(docs/b.md)"));
    }
}
