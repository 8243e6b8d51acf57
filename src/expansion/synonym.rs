use crate::expansion::{
    ExpansionError, ExpansionRequest, ExpansionStrategy, ExpansionTerm, QueryExpander,
};
use crate::text;

const GENERAL_CONFIDENCE: f32 = 0.8;
const GENERAL_WEIGHT: f32 = 0.7;
const PROGRAMMING_CONFIDENCE: f32 = 0.9;
const PROGRAMMING_WEIGHT: f32 = 0.8;
const PATTERN_CONFIDENCE: f32 = 0.7;
const PATTERN_WEIGHT: f32 = 0.6;

const GENERAL_SYNONYMS: &[(&str, &[&str])] = &[
    ("create", &["make", "build", "add"]),
    ("make", &["create", "build"]),
    ("build", &["create", "compile"]),
    ("custom", &["new", "own"]),
    ("add", &["register", "create"]),
    ("remove", &["delete", "disable"]),
    ("change", &["modify", "update"]),
    ("update", &["upgrade", "migrate"]),
    ("error", &["issue", "problem"]),
    ("fix", &["solve", "resolve"]),
    ("fast", &["quick", "performant"]),
    ("show", &["display", "render"]),
];

const PROGRAMMING_SYNONYMS: &[(&str, &[&str])] = &[
    ("class", &["type", "object"]),
    ("function", &["method"]),
    ("method", &["function"]),
    ("register", &["registry", "registration"]),
    ("event", &["listener", "handler"]),
    ("texture", &["sprite", "image"]),
    ("model", &["mesh", "geometry"]),
    ("json", &["data file"]),
    ("config", &["configuration", "settings"]),
    ("convert", &["port", "migrate"]),
    ("port", &["convert", "migrate"]),
    ("variable", &["field", "property"]),
    ("script", &["scripting api"]),
];

struct TriggerPattern {
    name: &'static str,
    triggers: &'static [&'static str],
    vocabulary: &'static [&'static str],
}

const PATTERNS: &[TriggerPattern] = &[
    TriggerPattern {
        name: "how_to",
        triggers: &["how to", "how do", "how can", "steps to"],
        vocabulary: &["tutorial", "guide", "steps"],
    },
    TriggerPattern {
        name: "what_is",
        triggers: &["what is", "what are", "what does", "define"],
        vocabulary: &["definition", "overview", "explanation"],
    },
    TriggerPattern {
        name: "example",
        triggers: &["example", "sample", "show me"],
        vocabulary: &["code example", "snippet", "usage"],
    },
    TriggerPattern {
        name: "troubleshooting",
        triggers: &["error", "crash", "not working", "fix", "issue", "bug"],
        vocabulary: &["troubleshooting", "solution", "debug"],
    },
];

/// Per-word synonym lookup plus trigger-phrase vocabulary
pub struct SynonymExpander;

impl SynonymExpander {
    pub fn new() -> Self {
        Self
    }
}

impl Default for SynonymExpander {
    fn default() -> Self {
        Self::new()
    }
}

fn lookup<'t>(table: &'t [(&str, &'t [&'t str])], word: &str) -> &'t [&'t str] {
    let stemmed = text::stem(word);
    table
        .iter()
        .find(|(key, _)| *key == word || *key == stemmed)
        .map(|(_, synonyms)| *synonyms)
        .unwrap_or(&[])
}

impl QueryExpander for SynonymExpander {
    fn strategy(&self) -> ExpansionStrategy {
        ExpansionStrategy::Synonym
    }

    fn expand(&self, req: &ExpansionRequest<'_>) -> Result<Vec<ExpansionTerm>, ExpansionError> {
        let mut terms = Vec::new();
        let in_query = |term: &str| req.tokens.iter().any(|t| t == term);

        for word in &req.tokens {
            for &synonym in lookup(GENERAL_SYNONYMS, word) {
                if !in_query(synonym) {
                    terms.push(ExpansionTerm::new(
                        synonym,
                        ExpansionStrategy::Synonym,
                        GENERAL_CONFIDENCE,
                        GENERAL_WEIGHT,
                        format!("general:{}", word),
                    )?);
                }
            }
            for &synonym in lookup(PROGRAMMING_SYNONYMS, word) {
                if !in_query(synonym) {
                    terms.push(ExpansionTerm::new(
                        synonym,
                        ExpansionStrategy::Synonym,
                        PROGRAMMING_CONFIDENCE,
                        PROGRAMMING_WEIGHT,
                        format!("programming:{}", word),
                    )?);
                }
            }
        }

        for pattern in PATTERNS {
            if !pattern.triggers.iter().any(|t| req.query_lower.contains(t)) {
                continue;
            }
            for &term in pattern.vocabulary {
                if !req.mentions(term) {
                    terms.push(ExpansionTerm::new(
                        term,
                        ExpansionStrategy::Synonym,
                        PATTERN_CONFIDENCE,
                        PATTERN_WEIGHT,
                        format!("pattern:{}", pattern.name),
                    )?);
                }
            }
        }

        Ok(terms)
    }
}
