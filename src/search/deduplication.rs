//! Result deduplication by content hash

use crate::search::SearchResult;
use std::collections::HashSet;

/// Collapse results whose documents share a content hash, keeping the first
///
/// # Arguments
/// * `results` - Results already sorted best first
///
/// # Returns
/// Deduplicated results, maintaining score order
pub fn deduplicate_by_content(results: Vec<SearchResult>) -> Vec<SearchResult> {
    let mut seen: HashSet<String> = HashSet::new();

    results
        .into_iter()
        .filter(|result| seen.insert(result.document.content_hash.clone()))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{ContentType, MultiModalDocument};
    use crate::search::ScoreBreakdown;
    use std::sync::Arc;

    fn result(id: &str, content: &str, score: f32) -> SearchResult {
        SearchResult {
            document: Arc::new(MultiModalDocument::new(
                id,
                format!("docs/{}.md", id),
                ContentType::Documentation,
                content,
            )),
            excerpt: String::new(),
            scores: ScoreBreakdown::default(),
            final_score: score,
            rank: 0,
        }
    }

    #[test]
    fn test_deduplication() {
        let results = vec![
            result("a", "same text", 0.9),
            result("b", "other text", 0.8),
            result("c", "same text", 0.7), // Duplicate content
        ];

        let deduped = deduplicate_by_content(results);

        assert_eq!(deduped.len(), 2);
        assert_eq!(deduped[0].document_id(), "a");
        assert_eq!(deduped[0].final_score, 0.9); // Keeps first (highest score)
        assert_eq!(deduped[1].document_id(), "b");
    }
}
