// Process-wide state shared by every request the agent serves

use crate::config::SessionConfig;
use crate::documents::{DocumentSet, MultiModalDocument};
use crate::session::SessionStore;
use dashmap::DashMap;
use std::sync::Arc;

/// Embedded chunks of one document at a given content hash
#[derive(Debug, Clone)]
pub struct CachedEmbedding {
    pub content_hash: String,
    pub chunks: Vec<Vec<f32>>,
}

/// Documents seen by past retrievals, keyed by id
#[derive(Debug, Default)]
pub struct DocumentCache {
    entries: DashMap<String, Arc<MultiModalDocument>>,
}

impl DocumentCache {
    /// Swap fetched documents for the cached copies with the same content hash
    ///
    /// Documents that are new or whose content changed replace the cached
    /// entry. The returned set holds only cached `Arc`s, so every retrieval
    /// shares one allocation per document version.
    pub fn intern(&self, documents: DocumentSet) -> DocumentSet {
        documents
            .into_iter()
            .map(|(id, doc)| {
                let cached = self
                    .entries
                    .entry(id.clone())
                    .and_modify(|cached| {
                        if cached.content_hash != doc.content_hash {
                            *cached = Arc::clone(&doc);
                        }
                    })
                    .or_insert_with(|| Arc::clone(&doc));
                let shared = Arc::clone(cached.value());
                drop(cached);
                (id, shared)
            })
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<Arc<MultiModalDocument>> {
        self.entries.get(id).map(|d| Arc::clone(d.value()))
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Chunk embeddings keyed by document id, valid only for the stored hash
#[derive(Debug, Default)]
pub struct EmbeddingCache {
    entries: DashMap<String, CachedEmbedding>,
}

impl EmbeddingCache {
    /// Cached chunks if they were computed from `content_hash`
    pub fn get(&self, id: &str, content_hash: &str) -> Option<Vec<Vec<f32>>> {
        self.entries
            .get(id)
            .filter(|e| e.content_hash == content_hash)
            .map(|e| e.chunks.clone())
    }

    pub fn insert(&self, id: impl Into<String>, content_hash: impl Into<String>, chunks: Vec<Vec<f32>>) {
        self.entries.insert(
            id.into(),
            CachedEmbedding {
                content_hash: content_hash.into(),
                chunks,
            },
        );
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Sessions plus the document and embedding caches
///
/// Owned by the caller and handed to the agent at construction.
pub struct AgentState {
    pub sessions: Arc<SessionStore>,
    pub documents: DocumentCache,
    pub embeddings: EmbeddingCache,
}

impl AgentState {
    pub fn new(session_config: SessionConfig) -> Self {
        Self {
            sessions: Arc::new(SessionStore::new(session_config)),
            documents: DocumentCache::default(),
            embeddings: EmbeddingCache::default(),
        }
    }
}

impl Default for AgentState {
    fn default() -> Self {
        Self::new(SessionConfig::default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::ContentType;

    #[test]
    fn test_embedding_cache_checks_hash() {
        let cache = EmbeddingCache::default();
        cache.insert("doc", "hash-1", vec![vec![1.0, 0.0]]);

        assert_eq!(cache.get("doc", "hash-1"), Some(vec![vec![1.0, 0.0]]));
        assert_eq!(cache.get("doc", "hash-2"), None);
        assert_eq!(cache.get("other", "hash-1"), None);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_document_cache_shares_unchanged_documents() {
        let cache = DocumentCache::default();
        let fetch = |content: &str| {
            let mut set = DocumentSet::new();
            set.insert(
                "a".to_string(),
                Arc::new(MultiModalDocument::new("a", "a.md", ContentType::Documentation, content)),
            );
            set
        };

        let first = cache.intern(fetch("old"));
        let again = cache.intern(fetch("old"));
        assert!(Arc::ptr_eq(&first["a"], &again["a"]));

        let changed = cache.intern(fetch("new"));
        assert!(!Arc::ptr_eq(&first["a"], &changed["a"]));
        assert_eq!(changed["a"].content, "new");
        assert_eq!(cache.len(), 1);
        assert!(Arc::ptr_eq(&cache.get("a").unwrap(), &changed["a"]));
    }
}
