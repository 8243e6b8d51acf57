// Text utilities shared by expansion, scoring and answer composition
use std::collections::HashSet;

const STOPWORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "but", "by", "can", "do", "does", "for", "from",
    "how", "i", "if", "in", "into", "is", "it", "its", "me", "my", "of", "on", "or", "so", "that",
    "the", "their", "then", "there", "this", "to", "was", "what", "when", "where", "which", "who",
    "why", "will", "with", "you", "your",
];

/// Lowercased word tokens with surrounding punctuation stripped
///
/// Keeps `_`, `-` and `.` inside tokens so identifiers like `world_generation`
/// and versions like `1.20.1` survive intact.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|w| {
            w.trim_matches(|c: char| !c.is_alphanumeric())
                .to_lowercase()
        })
        .filter(|w| !w.is_empty())
        .collect()
}

/// Tokens minus stopwords and single characters
pub fn content_tokens(text: &str) -> Vec<String> {
    tokenize(text)
        .into_iter()
        .filter(|t| t.chars().count() > 1 && !is_stopword(t))
        .collect()
}

pub fn is_stopword(token: &str) -> bool {
    STOPWORDS.contains(&token)
}

/// Fold simple English plurals so `blocks` matches `block`
pub fn stem(token: &str) -> String {
    let len = token.chars().count();
    if len > 4 && token.ends_with("ies") {
        format!("{}y", &token[..token.len() - 3])
    } else if len > 3 && token.ends_with('s') && !token.ends_with("ss") && !token.ends_with("us")
    {
        token[..token.len() - 1].to_string()
    } else {
        token.to_string()
    }
}

/// Content tokens folded through `stem`
pub fn stemmed_tokens(text: &str) -> Vec<String> {
    content_tokens(text).iter().map(|t| stem(t)).collect()
}

/// Jaccard similarity of two word sets
/// Returns 0.0 when both sets are empty
pub fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f32 {
    let union = a.union(b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(b).count() as f32 / union as f32
}

/// Split text into sentences on `.`, `!`, `?` and line breaks
pub fn split_sentences(text: &str) -> Vec<String> {
    let mut sentences = Vec::new();
    let mut current = String::new();

    let chars: Vec<char> = text.chars().collect();
    for (i, &c) in chars.iter().enumerate() {
        if c == '\n' {
            push_sentence(&mut sentences, &mut current);
            continue;
        }
        current.push(c);
        let at_boundary = matches!(c, '.' | '!' | '?')
            && chars.get(i + 1).map_or(true, |next| next.is_whitespace());
        if at_boundary {
            push_sentence(&mut sentences, &mut current);
        }
    }
    push_sentence(&mut sentences, &mut current);

    sentences
}

fn push_sentence(sentences: &mut Vec<String>, current: &mut String) {
    let trimmed = current.trim();
    if !trimmed.is_empty() {
        sentences.push(trimmed.to_string());
    }
    current.clear();
}

/// Split text into paragraphs separated by blank lines
pub fn split_paragraphs(text: &str) -> Vec<String> {
    text.split("\n\n")
        .map(str::trim)
        .filter(|p| !p.is_empty())
        .map(str::to_string)
        .collect()
}

/// Truncate to at most `max_chars` characters on a char boundary, adding an ellipsis
pub fn truncate_chars(text: &str, max_chars: usize) -> String {
    if text.chars().count() <= max_chars {
        return text.to_string();
    }
    let cut: String = text.chars().take(max_chars.saturating_sub(3)).collect();
    format!("{}...", cut.trim_end())
}
