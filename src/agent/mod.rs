//! Retrieval-augmented answering
//!
//! `AdvancedRagAgent` runs one query through
//! `START → EXPAND → RETRIEVE → RERANK → SYNTHESIZE → DONE` and always returns
//! a well-formed [`RagResponse`]. Failures that stop the pipeline become a
//! degraded response with confidence 0.0 and the error in the metadata.

mod state;
mod synthesis;

pub use state::{AgentState, CachedEmbedding, DocumentCache, EmbeddingCache};
pub use synthesis::{
    answer_confidence, classify_query, AnswerComposer, ComposerTable, ExampleComposer,
    ExplanationComposer, GeneralComposer, HowToComposer, QueryType,
};

use crate::config::{Config, ConfigValidator};
use crate::documents::{ContentType, DocumentFilter, DocumentSet, DocumentStore, StoreError};
use crate::embedding::{EmbeddingGenerator, EmbeddingStrategy};
use crate::error::CraftRagError;
use crate::expansion::{
    detect_concepts, ExpandedQuery, ExpansionContext, QueryExpander, QueryExpansionEngine,
};
use crate::rerank::{EnsembleReRanker, RerankMetadata, ReRanker};
use crate::search::{
    EmbeddingMap, HybridSearchEngine, SearchError, SearchMode, SearchQuery, SearchResult,
    SearchStats,
};
use crate::session::{QueryRecord, SessionContext};
use crate::text;
use chrono::{DateTime, Utc};
use regex::Regex;
use serde::Serialize;
use std::collections::BTreeSet;
use std::fmt;
use std::sync::Arc;
use std::time::Instant;
use thiserror::Error;
use tracing::{debug, info, warn};

/// Hard cap on sources in a response
pub const MAX_SOURCES: usize = 5;
const FAVORITE_TOPICS: usize = 3;
const VERSION_PATTERN: &str = r"\b1\.\d{1,2}(\.\d+)?\b";
const LOADERS: &[&str] = &["neoforge", "forge", "fabric", "quilt", "bukkit", "spigot", "paper"];
const EDITIONS: &[&str] = &["java", "bedrock"];

/// Errors that stop the pipeline
#[derive(Error, Debug)]
pub enum AgentError {
    #[error("document store failed: {0}")]
    Store(#[from] StoreError),

    #[error("search failed: {0}")]
    Search(#[from] SearchError),
}

impl AgentError {
    /// Stage that was running when the error occurred
    pub fn stage(&self) -> PipelineStage {
        match self {
            AgentError::Store(_) | AgentError::Search(_) => PipelineStage::Retrieve,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStage {
    Start,
    Expand,
    Retrieve,
    Rerank,
    Synthesize,
    Done,
}

impl fmt::Display for PipelineStage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PipelineStage::Start => "start",
            PipelineStage::Expand => "expand",
            PipelineStage::Retrieve => "retrieve",
            PipelineStage::Rerank => "rerank",
            PipelineStage::Synthesize => "synthesize",
            PipelineStage::Done => "done",
        };
        f.write_str(s)
    }
}

/// One question to the agent
#[derive(Debug, Clone)]
pub struct RagQuery {
    pub query_text: String,
    pub content_types: Option<BTreeSet<ContentType>>,
    pub project_context: Option<String>,
    pub session_id: String,
}

impl RagQuery {
    pub fn new(query_text: impl Into<String>) -> Self {
        Self {
            query_text: query_text.into(),
            content_types: None,
            project_context: None,
            session_id: "default".to_string(),
        }
    }

    /// Restrict retrieval to these content types; an empty list means no filter
    pub fn with_content_types(mut self, types: impl IntoIterator<Item = ContentType>) -> Self {
        let types: BTreeSet<ContentType> = types.into_iter().collect();
        self.content_types = (!types.is_empty()).then_some(types);
        self
    }

    pub fn with_project_context(mut self, project_context: impl Into<String>) -> Self {
        self.project_context = Some(project_context.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = session_id.into();
        self
    }
}

/// Version, loader and edition picked out of the project context and query
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProjectHints {
    pub minecraft_version: Option<String>,
    pub mod_loader: Option<String>,
    pub edition: Option<String>,
}

struct HintDetector {
    version: Regex,
}

impl HintDetector {
    fn new() -> crate::Result<Self> {
        let version = Regex::new(VERSION_PATTERN)
            .map_err(|e| CraftRagError::Config(format!("invalid version pattern: {}", e)))?;
        Ok(Self { version })
    }

    /// The project context wins over the query text
    fn detect(&self, query_text: &str, project_context: Option<&str>) -> ProjectHints {
        let sources: Vec<&str> = project_context.into_iter().chain([query_text]).collect();

        let minecraft_version = sources
            .iter()
            .find_map(|s| self.version.find(s).map(|m| m.as_str().to_string()));
        let pick = |vocabulary: &[&str]| {
            sources.iter().find_map(|s| {
                let tokens = text::tokenize(s);
                vocabulary
                    .iter()
                    .find(|v| tokens.iter().any(|t| t.as_str() == **v))
                    .map(|v| v.to_string())
            })
        };

        ProjectHints {
            minecraft_version,
            mod_loader: pick(LOADERS),
            edition: pick(EDITIONS),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RetrievalMetadata {
    pub documents_fetched: usize,
    pub query_embedding: bool,
    pub embedding_cache_hits: usize,
    pub embeddings_computed: usize,
    pub embedding_failures: usize,
    pub hints: ProjectHints,
    pub search: SearchStats,
}

#[derive(Debug, Clone, Serialize)]
pub struct GenerationMetadata {
    pub query_type: QueryType,
    pub sources_used: usize,
    pub distinct_content_types: usize,
    pub top_score: f32,
}

#[derive(Debug, Clone, Serialize)]
pub struct ResponseMetadata {
    pub session_id: String,
    pub timestamp: DateTime<Utc>,
    pub query_type: Option<QueryType>,
    /// Stages that completed, in order
    pub stages: Vec<PipelineStage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expansion: Option<ExpandedQuery>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub retrieval: Option<RetrievalMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rerank: Option<RerankMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub generation: Option<GenerationMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub failed_stage: Option<PipelineStage>,
}

impl ResponseMetadata {
    fn new(session_id: &str) -> Self {
        Self {
            session_id: session_id.to_string(),
            timestamp: Utc::now(),
            query_type: None,
            stages: vec![PipelineStage::Start],
            expansion: None,
            retrieval: None,
            rerank: None,
            generation: None,
            error: None,
            failed_stage: None,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RagResponse {
    pub answer: String,
    pub sources: Vec<SearchResult>,
    /// Always within [0, 1]; 0.0 for failed queries
    pub confidence: f32,
    pub processing_time_ms: u64,
    pub metadata: ResponseMetadata,
}

/// Read-only snapshot of configuration, caches and capabilities
#[derive(Debug, Clone, Serialize)]
pub struct AgentStatus {
    pub version: String,
    pub search_mode: SearchMode,
    pub ranking_strategy: String,
    pub expansion_enabled: bool,
    pub expansion_strategies: Vec<String>,
    pub reranking_enabled: bool,
    pub rerankers: Vec<String>,
    pub embedding_model: String,
    pub embedding_dimension: usize,
    pub documents_in_store: usize,
    pub cached_documents: usize,
    pub cached_embeddings: usize,
    pub active_sessions: usize,
    pub tracked_expansion_sessions: usize,
    pub capabilities: Vec<String>,
}

struct Synthesis {
    answer: String,
    sources: Vec<SearchResult>,
    confidence: f32,
}

/// Expansion, hybrid search, re-ranking and synthesis over one document store
pub struct AdvancedRagAgent {
    config: Config,
    state: Arc<AgentState>,
    store: Arc<dyn DocumentStore>,
    embedder: Arc<dyn EmbeddingGenerator>,
    expansion: QueryExpansionEngine,
    search: HybridSearchEngine,
    reranker: EnsembleReRanker,
    composers: ComposerTable,
    hints: HintDetector,
}

impl AdvancedRagAgent {
    pub fn new(
        config: Config,
        state: Arc<AgentState>,
        store: Arc<dyn DocumentStore>,
        embedder: Arc<dyn EmbeddingGenerator>,
    ) -> crate::Result<Self> {
        ConfigValidator::validate(&config)?;

        let expansion = QueryExpansionEngine::new(config.expansion.max_query_words);
        let search = HybridSearchEngine::new(config.search.clone())
            .map_err(|e| CraftRagError::Config(format!("search engine: {}", e)))?;
        let reranker = EnsembleReRanker::new(&config.reranking, Arc::clone(&state.sessions));

        info!(
            mode = %config.search.mode,
            strategy = %config.search.ranking_strategy,
            model = embedder.model_name(),
            "RAG agent initialized"
        );

        Ok(Self {
            config,
            state,
            store,
            embedder,
            expansion,
            search,
            reranker,
            composers: ComposerTable::default(),
            hints: HintDetector::new()?,
        })
    }

    pub fn with_expander(mut self, expander: Arc<dyn QueryExpander>) -> Self {
        self.expansion = self.expansion.with_expander(expander);
        self
    }

    pub fn with_reranker(mut self, reranker: Arc<dyn ReRanker>, weight: f32) -> Self {
        self.reranker = self.reranker.with_reranker(reranker, weight);
        self
    }

    pub fn with_composer(mut self, query_type: QueryType, composer: Box<dyn AnswerComposer>) -> Self {
        self.composers = self.composers.with(query_type, composer);
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Answer one query
    ///
    /// Never fails. The session is only updated when the pipeline reaches DONE.
    pub async fn query(&self, request: RagQuery) -> RagResponse {
        let started = Instant::now();
        let mut metadata = ResponseMetadata::new(&request.session_id);

        info!(session_id = %request.session_id, "Processing query");

        match self.run_pipeline(&request, &mut metadata).await {
            Ok(synthesis) => {
                metadata.stages.push(PipelineStage::Done);
                self.record_session(&request, &synthesis);

                let processing_time_ms = started.elapsed().as_millis() as u64;
                info!(
                    session_id = %request.session_id,
                    sources = synthesis.sources.len(),
                    confidence = synthesis.confidence,
                    elapsed_ms = processing_time_ms,
                    "Query answered"
                );

                RagResponse {
                    answer: synthesis.answer,
                    sources: synthesis.sources,
                    confidence: synthesis.confidence,
                    processing_time_ms,
                    metadata,
                }
            }
            Err(e) => {
                warn!(
                    session_id = %request.session_id,
                    stage = %e.stage(),
                    "Query failed: {}",
                    e
                );
                metadata.error = Some(e.to_string());
                metadata.failed_stage = Some(e.stage());

                RagResponse {
                    answer: format!(
                        "I'm sorry, I ran into a problem while answering your question ({}). Please try again.",
                        e
                    ),
                    sources: Vec::new(),
                    confidence: 0.0,
                    processing_time_ms: started.elapsed().as_millis() as u64,
                    metadata,
                }
            }
        }
    }

    async fn run_pipeline(
        &self,
        request: &RagQuery,
        metadata: &mut ResponseMetadata,
    ) -> Result<Synthesis, AgentError> {
        let session = self.state.sessions.get(&request.session_id);
        let hints = self
            .hints
            .detect(&request.query_text, request.project_context.as_deref());

        let mut search_query = SearchQuery::new(request.query_text.clone())
            .with_top_k(self.config.search.top_k)
            .with_similarity_threshold(self.config.search.similarity_threshold);
        search_query.content_types = request.content_types.clone();
        search_query.project_context = request.project_context.clone();
        search_query.use_hybrid_search = self.config.search.use_hybrid;
        search_query.enable_reranking = self.config.reranking.enabled;
        search_query.expand_query = self.config.expansion.enabled;

        // EXPAND
        if search_query.expand_query {
            let context = ExpansionContext {
                session_id: request.session_id.clone(),
                minecraft_version: hints.minecraft_version.clone(),
                mod_loader: hints.mod_loader.clone(),
                edition: hints.edition.clone(),
                favorite_topics: session
                    .as_ref()
                    .map(|s| s.favorite_topics(FAVORITE_TOPICS))
                    .unwrap_or_default(),
            };
            let expanded = self.expansion.expand(
                &search_query,
                &self.config.expansion.parsed_strategies(),
                self.config.expansion.max_terms,
                Some(&context),
            );
            search_query.query_text = expanded.expanded_query.clone();
            metadata.expansion = Some(expanded);
            metadata.stages.push(PipelineStage::Expand);
        }

        // RETRIEVE
        let filter = DocumentFilter {
            content_types: search_query.content_types.clone(),
            ..Default::default()
        };
        let fetched = self.store.get_documents(&filter).await?;
        let documents = self.state.documents.intern(fetched);

        let query_embedding = if self.config.search.mode == SearchMode::Lexical {
            Vec::new()
        } else {
            self.query_embedding(&search_query.query_text).await
        };
        let mut cache_stats = CacheStats::default();
        let embeddings = if query_embedding.is_empty() {
            EmbeddingMap::new()
        } else {
            self.document_embeddings(&documents, &mut cache_stats).await
        };

        let outcome = self.search.search(
            &search_query,
            &documents,
            &embeddings,
            &query_embedding,
            self.config.search.mode,
            self.config.search.ranking_strategy,
        )?;
        metadata.retrieval = Some(RetrievalMetadata {
            documents_fetched: documents.len(),
            query_embedding: !query_embedding.is_empty(),
            embedding_cache_hits: cache_stats.hits,
            embeddings_computed: cache_stats.computed,
            embedding_failures: cache_stats.failures,
            hints,
            search: outcome.stats,
        });
        metadata.stages.push(PipelineStage::Retrieve);

        // RERANK
        let mut results = outcome.results;
        if search_query.enable_reranking && !results.is_empty() {
            let (reranked, rerank) =
                self.reranker
                    .ensemble_rerank(&search_query, results, &request.session_id);
            results = reranked;
            metadata.rerank = Some(rerank);
            metadata.stages.push(PipelineStage::Rerank);
        }

        // SYNTHESIZE
        let query_type = classify_query(&request.query_text);
        metadata.query_type = Some(query_type);
        results.truncate(self.config.generation.max_sources.min(MAX_SOURCES));

        let synthesis = if results.is_empty() {
            Synthesis {
                answer: synthesis::no_results_answer(&request.query_text),
                sources: results,
                confidence: 0.0,
            }
        } else {
            let answer = self
                .composers
                .compose(query_type, &request.query_text, &results);
            let confidence = answer_confidence(&results);
            Synthesis {
                answer,
                sources: results,
                confidence,
            }
        };

        let distinct: BTreeSet<ContentType> = synthesis
            .sources
            .iter()
            .take(3)
            .map(|r| r.document.content_type)
            .collect();
        metadata.generation = Some(GenerationMetadata {
            query_type,
            sources_used: synthesis.sources.len(),
            distinct_content_types: distinct.len(),
            top_score: synthesis.sources.first().map_or(0.0, |r| r.final_score),
        });
        metadata.stages.push(PipelineStage::Synthesize);

        Ok(synthesis)
    }

    /// Empty when the generator is unavailable
    async fn query_embedding(&self, query_text: &str) -> Vec<f32> {
        match self
            .embedder
            .generate_embedding(query_text, EmbeddingStrategy::Query)
            .await
        {
            Some(output) => output.embedding,
            None => {
                warn!("Query embedding unavailable, falling back to lexical search");
                Vec::new()
            }
        }
    }

    /// Chunk embeddings for every document, served from the cache when the
    /// content hash still matches
    async fn document_embeddings(&self, documents: &DocumentSet, stats: &mut CacheStats) -> EmbeddingMap {
        let max_chunks = self.config.embedding.max_chunks_per_document.max(1);
        let mut map = EmbeddingMap::new();

        for (id, doc) in documents {
            if let Some(chunks) = self.state.embeddings.get(id, &doc.content_hash) {
                stats.hits += 1;
                map.insert(id.clone(), chunks);
                continue;
            }

            let strategy = match doc.content_type {
                ContentType::Code | ContentType::Configuration | ContentType::Schema => {
                    EmbeddingStrategy::Code
                }
                _ => EmbeddingStrategy::Text,
            };
            let mut chunks = Vec::new();
            for chunk in document_chunks(&doc.content, max_chunks) {
                if let Some(output) = self.embedder.generate_embedding(&chunk, strategy).await {
                    chunks.push(output.embedding);
                }
            }

            if chunks.is_empty() {
                stats.failures += 1;
                continue;
            }
            stats.computed += 1;
            self.state
                .embeddings
                .insert(id.clone(), doc.content_hash.clone(), chunks.clone());
            map.insert(id.clone(), chunks);
        }

        if stats.failures > 0 {
            warn!(failures = stats.failures, "Some documents could not be embedded");
        }
        map
    }

    fn record_session(&self, request: &RagQuery, synthesis: &Synthesis) {
        let mut content_types: Vec<ContentType> = Vec::new();
        for r in &synthesis.sources {
            if !content_types.contains(&r.document.content_type) {
                content_types.push(r.document.content_type);
            }
        }
        let record = QueryRecord {
            result_count: synthesis.sources.len(),
            content_types,
            topics: detect_concepts(&request.query_text)
                .into_iter()
                .map(str::to_string)
                .collect(),
            ..QueryRecord::new(request.query_text.clone(), synthesis.confidence)
        };
        let successful = synthesis.confidence > self.config.generation.success_threshold;
        let evicted = self
            .state
            .sessions
            .record(&request.session_id, record, successful);
        for session_id in &evicted {
            self.expansion.forget_session(session_id);
        }
        if !evicted.is_empty() {
            debug!(
                evicted = evicted.len(),
                tracked = self.expansion.tracked_sessions(),
                "Dropped contextual state for evicted sessions"
            );
        }
    }

    pub fn get_session_context(&self, session_id: &str) -> Option<SessionContext> {
        self.state.sessions.get(session_id)
    }

    /// Drop the session and its contextual expansion state
    pub fn clear_session_context(&self, session_id: &str) -> bool {
        let cleared = self.state.sessions.clear(session_id);
        let forgotten = self.expansion.forget_session(session_id);
        if cleared || forgotten {
            info!(session_id, "Session context cleared");
        }
        cleared || forgotten
    }

    pub fn get_agent_status(&self) -> AgentStatus {
        let expansion_strategies = self
            .config
            .expansion
            .parsed_strategies()
            .iter()
            .map(|s| s.as_str().to_string())
            .collect();

        AgentStatus {
            version: env!("CARGO_PKG_VERSION").to_string(),
            search_mode: self.config.search.mode,
            ranking_strategy: self.config.search.ranking_strategy.to_string(),
            expansion_enabled: self.config.expansion.enabled,
            expansion_strategies,
            reranking_enabled: self.config.reranking.enabled,
            rerankers: self
                .reranker
                .reranker_names()
                .into_iter()
                .map(str::to_string)
                .collect(),
            embedding_model: self.embedder.model_name().to_string(),
            embedding_dimension: self.embedder.dimension(),
            documents_in_store: self.store.len(),
            cached_documents: self.state.documents.len(),
            cached_embeddings: self.state.embeddings.len(),
            active_sessions: self.state.sessions.len(),
            tracked_expansion_sessions: self.expansion.tracked_sessions(),
            capabilities: [
                "query_expansion",
                "hybrid_search",
                "ensemble_reranking",
                "session_context",
                "embedding_cache",
                "version_hints",
            ]
            .iter()
            .map(|c| c.to_string())
            .collect(),
        }
    }
}

#[derive(Debug, Default)]
struct CacheStats {
    hits: usize,
    computed: usize,
    failures: usize,
}

/// Paragraph chunks, or the whole text when it has no blank-line breaks
fn document_chunks(content: &str, max_chunks: usize) -> Vec<String> {
    let mut chunks = text::split_paragraphs(content);
    if chunks.is_empty() && !content.trim().is_empty() {
        chunks.push(content.trim().to_string());
    }
    chunks.truncate(max_chunks);
    chunks
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::documents::{InMemoryDocumentStore, MultiModalDocument};
    use crate::embedding::HashingEmbedder;

    fn agent(documents: Vec<MultiModalDocument>) -> AdvancedRagAgent {
        AdvancedRagAgent::new(
            Config::default(),
            Arc::new(AgentState::default()),
            Arc::new(InMemoryDocumentStore::from_documents(documents)),
            Arc::new(HashingEmbedder::new(64)),
        )
        .unwrap()
    }

    fn blocks_doc() -> MultiModalDocument {
        MultiModalDocument::new(
            "java_blocks",
            "docs/java/blocks.md",
            ContentType::Documentation,
            "Create a class that extends Block to add a custom block.\n\n\
             Register the block with a DeferredRegister during mod construction.",
        )
        .with_tags(["java", "blocks", "modding", "tutorial"])
    }

    #[test]
    fn test_hint_detection() {
        let detector = HintDetector::new().unwrap();
        let hints = detector.detect("register a block in fabric", Some("Forge 1.20.1"));
        assert_eq!(hints.minecraft_version.as_deref(), Some("1.20.1"));
        assert_eq!(hints.mod_loader.as_deref(), Some("forge"));
        assert_eq!(hints.edition, None);

        let hints = detector.detect("bedrock behaviour packs for 1.19", None);
        assert_eq!(hints.minecraft_version.as_deref(), Some("1.19"));
        assert_eq!(hints.edition.as_deref(), Some("bedrock"));
        assert_eq!(hints.mod_loader, None);
    }

    #[test]
    fn test_document_chunks() {
        assert_eq!(document_chunks("a\n\nb\n\nc", 2), vec!["a", "b"]);
        assert_eq!(document_chunks("single", 4), vec!["single"]);
        assert!(document_chunks("   ", 4).is_empty());
    }

    #[tokio::test]
    async fn test_stages_recorded_in_order() {
        let agent = agent(vec![blocks_doc()]);
        let response = agent
            .query(RagQuery::new("How to create a custom block"))
            .await;

        assert_eq!(
            response.metadata.stages,
            vec![
                PipelineStage::Start,
                PipelineStage::Expand,
                PipelineStage::Retrieve,
                PipelineStage::Rerank,
                PipelineStage::Synthesize,
                PipelineStage::Done,
            ]
        );
        assert_eq!(response.metadata.query_type, Some(QueryType::HowTo));
        assert!(response.metadata.error.is_none());
    }

    #[tokio::test]
    async fn test_embedding_cache_reused() {
        let agent = agent(vec![blocks_doc()]);
        agent.query(RagQuery::new("custom block")).await;
        let second = agent.query(RagQuery::new("register block")).await;

        let retrieval = second.metadata.retrieval.unwrap();
        assert_eq!(retrieval.embedding_cache_hits, 1);
        assert_eq!(retrieval.embeddings_computed, 0);
    }

    #[tokio::test]
    async fn test_clear_session_context() {
        let agent = agent(vec![blocks_doc()]);
        agent
            .query(RagQuery::new("custom block").with_session("s1"))
            .await;

        assert!(agent.get_session_context("s1").is_some());
        assert!(agent.clear_session_context("s1"));
        assert!(agent.get_session_context("s1").is_none());
        assert!(!agent.clear_session_context("s1"));
    }

    #[tokio::test]
    async fn test_status_reports_caches() {
        let agent = agent(vec![blocks_doc()]);
        agent.query(RagQuery::new("custom block")).await;
        let status = agent.get_agent_status();

        assert_eq!(status.documents_in_store, 1);
        assert_eq!(status.cached_documents, 1);
        assert_eq!(status.cached_embeddings, 1);
        assert_eq!(status.active_sessions, 1);
        assert_eq!(status.rerankers, vec!["feature", "contextual"]);
        assert!(status.capabilities.contains(&"hybrid_search".to_string()));
    }
}
