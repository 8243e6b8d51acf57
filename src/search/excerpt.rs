use crate::text;
use std::collections::HashSet;

const WINDOW_SENTENCES: usize = 3;

/// Pick the window of up to three consecutive sentences with the most query-term hits
///
/// `query_terms` are expected to be stemmed (see [`text::stemmed_tokens`]).
/// Ties go to the earliest window; with no hits at all the opening window is used.
pub fn extract_excerpt(content: &str, query_terms: &[String], max_chars: usize) -> String {
    let sentences = text::split_sentences(content);
    if sentences.is_empty() {
        return String::new();
    }

    let terms: HashSet<&str> = query_terms.iter().map(String::as_str).collect();
    let hits: Vec<usize> = sentences
        .iter()
        .map(|s| {
            text::stemmed_tokens(s)
                .iter()
                .filter(|t| terms.contains(t.as_str()))
                .count()
        })
        .collect();

    let window = WINDOW_SENTENCES.min(sentences.len());
    let mut best_start = 0;
    let mut best_hits = 0;
    for start in 0..=(sentences.len() - window) {
        let total: usize = hits[start..start + window].iter().sum();
        if total > best_hits {
            best_hits = total;
            best_start = start;
        }
    }

    let joined = sentences[best_start..best_start + window].join(" ");
    text::truncate_chars(&joined, max_chars)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn terms(query: &str) -> Vec<String> {
        text::stemmed_tokens(query)
    }

    #[test]
    fn test_picks_relevant_window() {
        let content = "Intro one. Intro two. Intro three. Intro four. \
                       Blocks need a hardness value. Register blocks on startup.";
        let excerpt = extract_excerpt(content, &terms("block hardness"), 500);
        assert!(excerpt.contains("Blocks need a hardness value."));
        assert!(excerpt.contains("Register blocks on startup."));
        assert!(!excerpt.contains("Intro one"));
    }

    #[test]
    fn test_no_hits_uses_opening() {
        let excerpt = extract_excerpt("First. Second. Third. Fourth.", &terms("redstone"), 500);
        assert_eq!(excerpt, "First. Second. Third.");
    }

    #[test]
    fn test_respects_max_chars() {
        let content = "a very long sentence about blocks ".repeat(20);
        let excerpt = extract_excerpt(&content, &terms("blocks"), 40);
        assert!(excerpt.chars().count() <= 40);
        assert!(excerpt.ends_with("..."));
    }

    #[test]
    fn test_empty_content() {
        assert_eq!(extract_excerpt("   ", &terms("blocks"), 100), "");
    }
}
