//! Document model and the document store collaborator
//!
//! The retrieval core treats documents as read-only input. Stores hand out
//! `Arc<MultiModalDocument>` so search results can reference a document
//! without owning it.

mod store;

pub use store::{InMemoryDocumentStore, StoreError};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

/// Kind of content a document carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentType {
    Documentation,
    Code,
    Configuration,
    Texture,
    Model,
    Schema,
    Conversation,
}

impl ContentType {
    pub const ALL: [ContentType; 7] = [
        ContentType::Documentation,
        ContentType::Code,
        ContentType::Configuration,
        ContentType::Texture,
        ContentType::Model,
        ContentType::Schema,
        ContentType::Conversation,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            ContentType::Documentation => "documentation",
            ContentType::Code => "code",
            ContentType::Configuration => "configuration",
            ContentType::Texture => "texture",
            ContentType::Model => "model",
            ContentType::Schema => "schema",
            ContentType::Conversation => "conversation",
        }
    }
}

impl fmt::Display for ContentType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ContentType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let lower = s.trim().to_lowercase();
        ContentType::ALL
            .into_iter()
            .find(|ct| ct.as_str() == lower)
            .ok_or_else(|| format!("unknown content type '{}'", s))
    }
}

/// A retrievable unit of knowledge
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MultiModalDocument {
    /// Unique document identifier
    pub id: String,

    /// BLAKE3 hex digest of `content`
    pub content_hash: String,

    /// Where the document came from (file path or URL)
    pub source_path: String,

    pub content_type: ContentType,

    /// Raw text
    pub content: String,

    #[serde(default)]
    pub tags: BTreeSet<String>,

    #[serde(default)]
    pub project_context: Option<String>,
}

impl MultiModalDocument {
    /// Create a document, hashing its content
    pub fn new(
        id: impl Into<String>,
        source_path: impl Into<String>,
        content_type: ContentType,
        content: impl Into<String>,
    ) -> Self {
        let content = content.into();
        Self {
            id: id.into(),
            content_hash: content_hash(&content),
            source_path: source_path.into(),
            content_type,
            content,
            tags: BTreeSet::new(),
            project_context: None,
        }
    }

    pub fn with_tags<I, S>(mut self, tags: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.tags = tags.into_iter().map(|t| t.into().to_lowercase()).collect();
        self
    }

    pub fn with_project_context(mut self, project_context: impl Into<String>) -> Self {
        self.project_context = Some(project_context.into());
        self
    }

    pub fn has_tag(&self, tag: &str) -> bool {
        self.tags.contains(&tag.to_lowercase())
    }
}

/// BLAKE3 hex digest used as the document content hash
pub fn content_hash(content: &str) -> String {
    blake3::hash(content.as_bytes()).to_hex().to_string()
}

/// Candidate documents keyed by id
///
/// A `BTreeMap` so iteration order (and therefore tie-breaking during
/// ranking) is deterministic.
pub type DocumentSet = BTreeMap<String, Arc<MultiModalDocument>>;

/// Filter applied by the store before documents reach the search engine
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DocumentFilter {
    pub content_types: Option<BTreeSet<ContentType>>,
    pub project_context: Option<String>,
    pub tags: Option<BTreeSet<String>>,
}

impl DocumentFilter {
    /// Whether a document passes every populated criterion
    ///
    /// Project context compares case-insensitively; tags pass when any tag matches.
    pub fn matches(&self, doc: &MultiModalDocument) -> bool {
        if let Some(types) = &self.content_types {
            if !types.is_empty() && !types.contains(&doc.content_type) {
                return false;
            }
        }

        if let Some(project) = &self.project_context {
            let wanted = project.trim().to_lowercase();
            let matches = doc
                .project_context
                .as_ref()
                .is_some_and(|p| p.trim().to_lowercase() == wanted);
            if !wanted.is_empty() && !matches {
                return false;
            }
        }

        if let Some(tags) = &self.tags {
            if !tags.is_empty() && !tags.iter().any(|t| doc.has_tag(t)) {
                return false;
            }
        }

        true
    }
}

/// Source of candidate documents
#[async_trait]
pub trait DocumentStore: Send + Sync {
    /// Fetch every document passing the filter
    async fn get_documents(&self, filter: &DocumentFilter) -> Result<DocumentSet, StoreError>;

    /// Number of documents held, if known
    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn doc() -> MultiModalDocument {
        MultiModalDocument::new(
            "java_blocks",
            "docs/java/blocks.md",
            ContentType::Documentation,
            "Blocks are registered with a DeferredRegister.",
        )
        .with_tags(["Java", "blocks"])
        .with_project_context("Forge 1.20.1")
    }

    #[test]
    fn test_content_hash_is_stable() {
        let a = doc();
        let b = doc();
        assert_eq!(a.content_hash, b.content_hash);
        assert_eq!(a.content_hash.len(), 64);
    }

    #[test]
    fn test_tags_are_lowercased() {
        assert!(doc().has_tag("java"));
        assert!(doc().has_tag("JAVA"));
    }

    #[test]
    fn test_content_type_parse() {
        assert_eq!("Code".parse::<ContentType>().unwrap(), ContentType::Code);
        assert!("video".parse::<ContentType>().is_err());
    }

    #[test]
    fn test_filter_matches() {
        let d = doc();
        assert!(DocumentFilter::default().matches(&d));

        let by_type = DocumentFilter {
            content_types: Some([ContentType::Code].into_iter().collect()),
            ..Default::default()
        };
        assert!(!by_type.matches(&d));

        let by_project = DocumentFilter {
            project_context: Some("forge 1.20.1".to_string()),
            ..Default::default()
        };
        assert!(by_project.matches(&d));

        let by_tags = DocumentFilter {
            tags: Some(["recipes".to_string(), "blocks".to_string()].into_iter().collect()),
            ..Default::default()
        };
        assert!(by_tags.matches(&d));
    }
}
