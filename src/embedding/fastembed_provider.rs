/// FastEmbed backend for local ONNX embedding generation
use super::{EmbeddingError, EmbeddingGenerator, EmbeddingOutput, EmbeddingStrategy};
use async_trait::async_trait;
use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};
use std::sync::Arc;

/// FastEmbed provider
///
/// Models are downloaded on demand to `~/.cache/huggingface/` on first use.
/// - all-MiniLM-L6-v2: 90MB (384 dims)
/// - bge-small-en-v1.5: 130MB (384 dims)
/// - bge-base-en-v1.5: 440MB (768 dims)
pub struct FastEmbedProvider {
    model: Arc<TextEmbedding>,
    model_name: String,
    dimension: usize,
}

impl FastEmbedProvider {
    pub fn new(model_name: &str) -> Result<Self, EmbeddingError> {
        let (embedding_model, dimension) = match model_name {
            "all-MiniLM-L6-v2" | "all-minilm-l6-v2" => (EmbeddingModel::AllMiniLML6V2, 384),
            "bge-small-en-v1.5" => (EmbeddingModel::BGESmallENV15, 384),
            "bge-base-en-v1.5" => (EmbeddingModel::BGEBaseENV15, 768),
            _ => {
                return Err(EmbeddingError::InitializationError(format!(
                    "Unsupported model: {}. Supported: all-MiniLM-L6-v2, bge-small-en-v1.5, bge-base-en-v1.5",
                    model_name
                )));
            }
        };

        tracing::info!(
            "Initializing embedding model: {} ({}D)",
            model_name,
            dimension
        );

        let init_options = InitOptions::new(embedding_model).with_show_download_progress(true);
        let model = TextEmbedding::try_new(init_options)
            .map_err(|e| EmbeddingError::InitializationError(e.to_string()))?;

        Ok(Self {
            model: Arc::new(model),
            model_name: model_name.to_string(),
            dimension,
        })
    }

    fn embed_blocking(
        model: &TextEmbedding,
        text: String,
        dimension: usize,
    ) -> Result<Vec<f32>, EmbeddingError> {
        if text.trim().is_empty() {
            return Err(EmbeddingError::InvalidInput("Empty text".to_string()));
        }

        let embeddings = model
            .embed(vec![text], None)
            .map_err(|e| EmbeddingError::GenerationError(e.to_string()))?;

        let embedding = embeddings
            .into_iter()
            .next()
            .ok_or_else(|| EmbeddingError::GenerationError("No embeddings generated".to_string()))?;

        if embedding.len() != dimension {
            return Err(EmbeddingError::DimensionMismatch {
                expected: dimension,
                actual: embedding.len(),
            });
        }

        Ok(embedding)
    }
}

#[async_trait]
impl EmbeddingGenerator for FastEmbedProvider {
    async fn generate_embedding(
        &self,
        text: &str,
        strategy: EmbeddingStrategy,
    ) -> Option<EmbeddingOutput> {
        let model = Arc::clone(&self.model);
        let text = text.to_string();
        let dimension = self.dimension;

        let result =
            tokio::task::spawn_blocking(move || Self::embed_blocking(&model, text, dimension))
                .await;

        match result {
            Ok(Ok(embedding)) => Some(EmbeddingOutput {
                embedding,
                strategy,
            }),
            Ok(Err(e)) => {
                tracing::warn!("Embedding generation failed: {}", e);
                None
            }
            Err(e) => {
                tracing::warn!("Embedding task panicked: {}", e);
                None
            }
        }
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    #[ignore] // Requires model download (~90MB) - run with: cargo test --features fastembed -- --ignored
    fn test_provider_creation() {
        let provider = FastEmbedProvider::new("all-MiniLM-L6-v2").unwrap();
        assert_eq!(provider.dimension(), 384);
    }

    #[tokio::test]
    #[ignore] // Requires model download (~90MB)
    async fn test_generate_embedding() {
        let provider = FastEmbedProvider::new("all-MiniLM-L6-v2").unwrap();
        let out = provider
            .generate_embedding("How to create a custom block", EmbeddingStrategy::Query)
            .await
            .unwrap();
        assert_eq!(out.embedding.len(), 384);
        assert!(provider
            .generate_embedding("", EmbeddingStrategy::Query)
            .await
            .is_none());
    }

    #[test]
    fn test_unsupported_model() {
        assert!(FastEmbedProvider::new("not-a-model").is_err());
    }
}
