//! Integration test: end-to-end agent pipeline
//!
//! Drives `AdvancedRagAgent` over an in-memory corpus with the hashing
//! embedder, plus failing collaborators for the degraded paths.

use async_trait::async_trait;
use craftrag::agent::{AdvancedRagAgent, AgentState, PipelineStage, QueryType, RagQuery};
use craftrag::config::Config;
use craftrag::documents::{
    ContentType, DocumentFilter, DocumentSet, DocumentStore, InMemoryDocumentStore,
    MultiModalDocument, StoreError,
};
use craftrag::embedding::{EmbeddingGenerator, EmbeddingOutput, EmbeddingStrategy, HashingEmbedder};
use craftrag::expansion::ExpansionStrategy;
use craftrag::search::SearchMode;
use std::sync::Arc;

struct UnreachableStore;

#[async_trait]
impl DocumentStore for UnreachableStore {
    async fn get_documents(&self, _filter: &DocumentFilter) -> Result<DocumentSet, StoreError> {
        Err(StoreError::Unavailable("connection refused".to_string()))
    }

    fn len(&self) -> usize {
        0
    }
}

/// Hands out newly allocated documents on every fetch
struct FreshCopyStore(Vec<MultiModalDocument>);

#[async_trait]
impl DocumentStore for FreshCopyStore {
    async fn get_documents(&self, _filter: &DocumentFilter) -> Result<DocumentSet, StoreError> {
        Ok(self
            .0
            .iter()
            .map(|d| (d.id.clone(), Arc::new(d.clone())))
            .collect())
    }

    fn len(&self) -> usize {
        self.0.len()
    }
}

struct OfflineEmbedder;

#[async_trait]
impl EmbeddingGenerator for OfflineEmbedder {
    async fn generate_embedding(
        &self,
        _text: &str,
        _strategy: EmbeddingStrategy,
    ) -> Option<EmbeddingOutput> {
        None
    }

    fn dimension(&self) -> usize {
        0
    }

    fn model_name(&self) -> &str {
        "offline"
    }
}

fn documents() -> Vec<MultiModalDocument> {
    vec![
        MultiModalDocument::new(
            "java_blocks",
            "docs/java/blocks.md",
            ContentType::Documentation,
            "Create a class that extends Block to add a custom block. \
             Pass block properties with the material and hardness.\n\n\
             Register the custom block with a DeferredRegister during mod construction. \
             Add a blockstate file and a model so the block renders.",
        )
        .with_tags(["java", "blocks", "modding", "tutorial"]),
        MultiModalDocument::new(
            "recipe_system",
            "docs/shared/recipes.md",
            ContentType::Documentation,
            "Shaped recipes define a pattern and a key of ingredients. \
             Shapeless recipes only list the ingredients.",
        )
        .with_tags(["recipes", "crafting"]),
    ]
}

fn agent_with(config: Config, documents: Vec<MultiModalDocument>) -> AdvancedRagAgent {
    AdvancedRagAgent::new(
        config,
        Arc::new(AgentState::default()),
        Arc::new(InMemoryDocumentStore::from_documents(documents)),
        Arc::new(HashingEmbedder::new(128)),
    )
    .unwrap()
}

fn agent() -> AdvancedRagAgent {
    agent_with(Config::default(), documents())
}

#[tokio::test]
async fn test_java_blocks_scenario() {
    let agent = agent();
    let response = agent
        .query(RagQuery::new(
            "How to create a custom block in Minecraft Java Edition",
        ))
        .await;

    println!("✓ Answer:\n{}", response.answer);

    let expansion = response.metadata.expansion.as_ref().unwrap();
    let terms: Vec<&str> = expansion.terms.iter().map(|t| t.term.as_str()).collect();
    assert!(
        ["material", "hardness", "placement"]
            .iter()
            .any(|t| terms.contains(t)),
        "expected block vocabulary in {:?}",
        terms
    );

    assert_eq!(response.sources[0].document_id(), "java_blocks");
    assert_eq!(response.metadata.query_type, Some(QueryType::HowTo));
    assert!(response.answer.contains("\n1. "));
    assert!(response.answer.contains("docs/java/blocks.md"));
    assert!(response.confidence > 0.0 && response.confidence <= 1.0);
    assert!(response.sources.len() <= 5);
}

#[tokio::test]
async fn test_unreachable_store_degrades() {
    let agent = AdvancedRagAgent::new(
        Config::default(),
        Arc::new(AgentState::default()),
        Arc::new(UnreachableStore),
        Arc::new(HashingEmbedder::new(64)),
    )
    .unwrap();

    let response = agent
        .query(RagQuery::new("How to create a custom block").with_session("s1"))
        .await;

    assert_eq!(response.confidence, 0.0);
    assert!(response.sources.is_empty());
    assert!(response
        .metadata
        .error
        .as_deref()
        .unwrap()
        .contains("connection refused"));
    assert_eq!(response.metadata.failed_stage, Some(PipelineStage::Retrieve));
    assert!(!response.metadata.stages.contains(&PipelineStage::Done));
    // Failed queries leave the session untouched
    assert!(agent.get_session_context("s1").is_none());
}

#[tokio::test]
async fn test_empty_corpus_fallback() {
    let agent = agent_with(Config::default(), Vec::new());
    let response = agent.query(RagQuery::new("how do I add a custom biome")).await;

    assert!(response.sources.is_empty());
    assert!(response.confidence <= 0.1);
    assert!(response.answer.contains("couldn't find relevant information"));
    assert!(response.metadata.error.is_none());
    assert!(response.metadata.rerank.is_none());
    assert_eq!(response.metadata.stages.last(), Some(&PipelineStage::Done));
}

#[tokio::test]
async fn test_content_type_filter_with_no_matches() {
    let agent = agent();
    let response = agent
        .query(RagQuery::new("custom block").with_content_types([ContentType::Texture]))
        .await;

    assert!(response.sources.is_empty());
    assert_eq!(response.confidence, 0.0);
    assert_eq!(
        response.metadata.retrieval.as_ref().unwrap().documents_fetched,
        0
    );
}

#[tokio::test]
async fn test_session_trimming() {
    let agent = agent();
    for i in 0..25 {
        agent
            .query(RagQuery::new(format!("custom block hardness question {}", i)).with_session("long"))
            .await;
    }

    let session = agent.get_session_context("long").unwrap();
    assert_eq!(session.total_queries, 25);
    assert!(session.queries.len() <= 20);
    assert!(session.successful_queries.len() <= 10);
    assert_eq!(session.queries.last().unwrap().query, "custom block hardness question 24");
}

#[tokio::test]
async fn test_topic_carryover_between_queries() {
    let mut config = Config::default();
    config.expansion.max_terms = 50;
    let agent = agent_with(config, documents());

    let first = agent.query(RagQuery::new("blocks").with_session("s1")).await;
    let first_terms = &first.metadata.expansion.as_ref().unwrap().terms;
    assert!(!first_terms.iter().any(|t| t.source.starts_with("topic:")));

    let second = agent
        .query(RagQuery::new("block properties").with_session("s1"))
        .await;
    let second_terms = &second.metadata.expansion.as_ref().unwrap().terms;
    assert!(second_terms
        .iter()
        .any(|t| t.term == "blocks" && t.strategy == ExpansionStrategy::Contextual));

    let session = agent.get_session_context("s1").unwrap();
    assert_eq!(session.topic_interests.get("blocks"), Some(&2));
}

#[tokio::test]
async fn test_evicted_sessions_lose_contextual_state() {
    let mut config = Config::default();
    config.session.max_sessions = 1;
    config.expansion.max_terms = 50;
    let agent = agent_with(config, documents());

    for i in 0..10 {
        agent
            .query(RagQuery::new("blocks").with_session(format!("s{}", i)))
            .await;
    }

    let status = agent.get_agent_status();
    assert_eq!(status.active_sessions, 1);
    assert!(status.tracked_expansion_sessions <= status.active_sessions);
    assert!(agent.get_session_context("s0").is_none());

    // s0 starts over instead of resuming its old topic counts
    let response = agent
        .query(RagQuery::new("block properties").with_session("s0"))
        .await;
    let terms = &response.metadata.expansion.as_ref().unwrap().terms;
    assert!(
        !terms.iter().any(|t| t.source.starts_with("topic:")),
        "stale topics in {:?}",
        terms
    );
    assert!(agent.get_agent_status().tracked_expansion_sessions <= 1);
}

#[tokio::test]
async fn test_retrieval_reuses_cached_documents() {
    let agent = AdvancedRagAgent::new(
        Config::default(),
        Arc::new(AgentState::default()),
        Arc::new(FreshCopyStore(documents())),
        Arc::new(HashingEmbedder::new(128)),
    )
    .unwrap();

    let first = agent.query(RagQuery::new("custom block hardness")).await;
    let second = agent.query(RagQuery::new("custom block hardness")).await;

    assert_eq!(first.sources[0].document_id(), "java_blocks");
    assert!(Arc::ptr_eq(
        &first.sources[0].document,
        &second.sources[0].document
    ));
    assert_eq!(agent.get_agent_status().cached_documents, 2);
}

#[tokio::test]
async fn test_rank_monotonicity_and_bounds() {
    let agent = agent();
    for query in [
        "custom block",
        "what are shaped recipes",
        "show me a recipe example",
        "register blocks and recipes",
    ] {
        let response = agent.query(RagQuery::new(query)).await;

        assert!((0.0..=1.0).contains(&response.confidence));
        for (i, source) in response.sources.iter().enumerate() {
            assert_eq!(source.rank, i + 1);
        }
        for pair in response.sources.windows(2) {
            assert!(pair[0].final_score >= pair[1].final_score);
        }
    }
}

#[tokio::test]
async fn test_offline_embedder_uses_lexical() {
    let agent = AdvancedRagAgent::new(
        Config::default(),
        Arc::new(AgentState::default()),
        Arc::new(InMemoryDocumentStore::from_documents(documents())),
        Arc::new(OfflineEmbedder),
    )
    .unwrap();

    let response = agent.query(RagQuery::new("custom block hardness")).await;
    let retrieval = response.metadata.retrieval.as_ref().unwrap();

    assert!(!retrieval.query_embedding);
    assert_eq!(retrieval.search.effective_mode, SearchMode::Lexical);
    assert_eq!(response.sources[0].document_id(), "java_blocks");
}

#[tokio::test]
async fn test_disabled_stages_are_skipped() {
    let mut config = Config::default();
    config.expansion.enabled = false;
    config.reranking.enabled = false;
    let agent = agent_with(config, documents());

    let response = agent.query(RagQuery::new("custom block")).await;

    assert_eq!(
        response.metadata.stages,
        vec![
            PipelineStage::Start,
            PipelineStage::Retrieve,
            PipelineStage::Synthesize,
            PipelineStage::Done,
        ]
    );
    assert!(response.metadata.expansion.is_none());
    assert!(response.metadata.rerank.is_none());
}

#[tokio::test]
async fn test_concurrent_sessions() {
    let agent = Arc::new(agent());
    let mut handles = Vec::new();
    for i in 0..8 {
        let agent = Arc::clone(&agent);
        handles.push(tokio::spawn(async move {
            agent
                .query(RagQuery::new("custom block").with_session(format!("user-{}", i)))
                .await
        }));
    }
    for handle in handles {
        let response = handle.await.unwrap();
        assert!(response.metadata.error.is_none());
    }

    assert_eq!(agent.get_agent_status().active_sessions, 8);
}

#[tokio::test]
async fn test_invalid_config_rejected() {
    let mut config = Config::default();
    config.search.top_k = 0;

    let result = AdvancedRagAgent::new(
        config,
        Arc::new(AgentState::default()),
        Arc::new(InMemoryDocumentStore::new()),
        Arc::new(HashingEmbedder::new(64)),
    );
    assert!(result.is_err());
}
