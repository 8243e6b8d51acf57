/// In-memory document store, optionally seeded from a TOML corpus file
use super::{ContentType, DocumentFilter, DocumentSet, DocumentStore, MultiModalDocument};
use crate::error::{CraftRagError, Result};
use async_trait::async_trait;
use serde::Deserialize;
use std::collections::BTreeSet;
use std::path::Path;
use std::sync::{Arc, RwLock};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum StoreError {
    #[error("Document store unavailable: {0}")]
    Unavailable(String),

    #[error("Document store lock poisoned")]
    Poisoned,
}

/// One `[[document]]` table in a corpus file
#[derive(Debug, Deserialize)]
struct CorpusEntry {
    id: String,
    source_path: String,
    content_type: ContentType,
    content: String,
    #[serde(default)]
    tags: Vec<String>,
    #[serde(default)]
    project_context: Option<String>,
}

#[derive(Debug, Deserialize)]
struct CorpusFile {
    #[serde(default)]
    document: Vec<CorpusEntry>,
}

/// Process-local document store
pub struct InMemoryDocumentStore {
    documents: RwLock<DocumentSet>,
}

impl InMemoryDocumentStore {
    pub fn new() -> Self {
        Self {
            documents: RwLock::new(DocumentSet::new()),
        }
    }

    pub fn from_documents(documents: impl IntoIterator<Item = MultiModalDocument>) -> Self {
        let set = documents
            .into_iter()
            .map(|d| (d.id.clone(), Arc::new(d)))
            .collect();
        Self {
            documents: RwLock::new(set),
        }
    }

    /// Load documents from a TOML corpus file
    ///
    /// ```toml
    /// [[document]]
    /// id = "java_blocks"
    /// source_path = "docs/java/blocks.md"
    /// content_type = "documentation"
    /// tags = ["java", "blocks"]
    /// content = "..."
    /// ```
    pub fn from_corpus_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| CraftRagError::Io {
            source: e,
            context: format!("Failed to read corpus file: {:?}", path),
        })?;
        Self::from_corpus_str(&content).map_err(|e| match e {
            CraftRagError::Toml(inner) => CraftRagError::Corpus {
                path: path.to_path_buf(),
                message: inner.to_string(),
            },
            other => other,
        })
    }

    pub fn from_corpus_str(content: &str) -> Result<Self> {
        let corpus: CorpusFile = toml::from_str(content)?;

        let mut seen = BTreeSet::new();
        let mut documents = Vec::with_capacity(corpus.document.len());
        for entry in corpus.document {
            if !seen.insert(entry.id.clone()) {
                return Err(CraftRagError::InvalidConfigValue {
                    path: format!("document.{}", entry.id),
                    message: "duplicate document id".to_string(),
                });
            }
            let mut doc = MultiModalDocument::new(
                entry.id,
                entry.source_path,
                entry.content_type,
                entry.content,
            )
            .with_tags(entry.tags);
            doc.project_context = entry.project_context;
            documents.push(doc);
        }

        tracing::debug!("Loaded {} documents from corpus", documents.len());
        Ok(Self::from_documents(documents))
    }

    /// Insert or replace a document
    pub fn insert(&self, document: MultiModalDocument) -> std::result::Result<(), StoreError> {
        let mut docs = self.documents.write().map_err(|_| StoreError::Poisoned)?;
        docs.insert(document.id.clone(), Arc::new(document));
        Ok(())
    }

    pub fn remove(&self, id: &str) -> std::result::Result<bool, StoreError> {
        let mut docs = self.documents.write().map_err(|_| StoreError::Poisoned)?;
        Ok(docs.remove(id).is_some())
    }
}

impl Default for InMemoryDocumentStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl DocumentStore for InMemoryDocumentStore {
    async fn get_documents(
        &self,
        filter: &DocumentFilter,
    ) -> std::result::Result<DocumentSet, StoreError> {
        let docs = self.documents.read().map_err(|_| StoreError::Poisoned)?;
        Ok(docs
            .iter()
            .filter(|(_, d)| filter.matches(d))
            .map(|(id, d)| (id.clone(), Arc::clone(d)))
            .collect())
    }

    fn len(&self) -> usize {
        self.documents.read().map(|d| d.len()).unwrap_or(0)
    }
}
