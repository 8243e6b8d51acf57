/// Deterministic feature-hashing embedder
use super::{EmbeddingError, EmbeddingGenerator, EmbeddingOutput, EmbeddingStrategy};
use crate::text;
use async_trait::async_trait;

const BIGRAM_WEIGHT: f32 = 0.5;
const SUBWORD_WEIGHT: f32 = 0.5;

/// Feature-hashed unigram + bigram embedder
///
/// Each token is hashed with BLAKE3 into one of `dimension` buckets with a
/// hash-derived sign, then the vector is L2-normalised. Texts sharing
/// vocabulary land close together, which is enough for offline use and
/// keeps tests reproducible.
pub struct HashingEmbedder {
    dimension: usize,
    model_name: String,
}

impl HashingEmbedder {
    pub fn new(dimension: usize) -> Self {
        Self {
            dimension,
            model_name: format!("feature-hash-{}", dimension),
        }
    }

    /// Embed synchronously
    pub fn embed(&self, text: &str, strategy: EmbeddingStrategy) -> Result<Vec<f32>, EmbeddingError> {
        if self.dimension == 0 {
            return Err(EmbeddingError::InitializationError(
                "Dimension must be greater than 0".to_string(),
            ));
        }

        let tokens = text::content_tokens(text);
        if tokens.is_empty() {
            return Err(EmbeddingError::InvalidInput(
                "Text has no indexable tokens".to_string(),
            ));
        }

        let mut vector = vec![0.0f32; self.dimension];

        for token in &tokens {
            self.accumulate(&mut vector, token, 1.0);
        }

        for pair in tokens.windows(2) {
            let bigram = format!("{} {}", pair[0], pair[1]);
            self.accumulate(&mut vector, &bigram, BIGRAM_WEIGHT);
        }

        if matches!(strategy, EmbeddingStrategy::Code | EmbeddingStrategy::Hybrid) {
            for word in text.split(|c: char| !c.is_alphanumeric() && c != '_') {
                let parts = identifier_parts(word);
                if parts.len() > 1 {
                    for part in parts {
                        self.accumulate(&mut vector, &part, SUBWORD_WEIGHT);
                    }
                }
            }
        }

        let norm: f32 = vector.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm == 0.0 {
            return Err(EmbeddingError::GenerationError(
                "Embedding collapsed to zero vector".to_string(),
            ));
        }
        for x in vector.iter_mut() {
            *x /= norm;
        }

        Ok(vector)
    }

    fn accumulate(&self, vector: &mut [f32], feature: &str, weight: f32) {
        let hash = blake3::hash(feature.as_bytes());
        let bytes = hash.as_bytes();
        let mut index_bytes = [0u8; 8];
        index_bytes.copy_from_slice(&bytes[..8]);
        let index = (u64::from_le_bytes(index_bytes) % self.dimension as u64) as usize;
        let sign = if bytes[8] & 1 == 0 { 1.0 } else { -1.0 };
        vector[index] += sign * weight;
    }
}

#[async_trait]
impl EmbeddingGenerator for HashingEmbedder {
    async fn generate_embedding(
        &self,
        text: &str,
        strategy: EmbeddingStrategy,
    ) -> Option<EmbeddingOutput> {
        match self.embed(text, strategy) {
            Ok(embedding) => Some(EmbeddingOutput {
                embedding,
                strategy,
            }),
            Err(e) => {
                tracing::debug!("Hashing embedder produced no embedding: {}", e);
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

/// Split `registerBlockItem` / `register_block_item` into lowercase parts
fn identifier_parts(word: &str) -> Vec<String> {
    let mut parts = Vec::new();
    for segment in word.split('_').filter(|s| !s.is_empty()) {
        let mut current = String::new();
        let mut prev_lower = false;
        for c in segment.chars() {
            if c.is_uppercase() && prev_lower && !current.is_empty() {
                parts.push(current.to_lowercase());
                current.clear();
            }
            prev_lower = c.is_lowercase() || c.is_ascii_digit();
            current.push(c);
        }
        if !current.is_empty() {
            parts.push(current.to_lowercase());
        }
    }
    parts
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedding::cosine_similarity;

    #[test]
    fn test_embedding_is_normalised_and_deterministic() {
        let embedder = HashingEmbedder::new(128);
        let a = embedder
            .embed("custom block hardness", EmbeddingStrategy::Text)
            .unwrap();
        let b = embedder
            .embed("custom block hardness", EmbeddingStrategy::Text)
            .unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 128);
        let norm: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 1e-4);
    }

    #[test]
    fn test_shared_vocabulary_is_closer() {
        let embedder = HashingEmbedder::new(256);
        let query = embedder
            .embed("custom block hardness", EmbeddingStrategy::Query)
            .unwrap();
        let blocks = embedder
            .embed(
                "Each custom block defines hardness and blast resistance",
                EmbeddingStrategy::Text,
            )
            .unwrap();
        let recipes = embedder
            .embed(
                "Shaped crafting recipes use a pattern and key",
                EmbeddingStrategy::Text,
            )
            .unwrap();
        assert!(cosine_similarity(&query, &blocks) > cosine_similarity(&query, &recipes));
    }

    #[test]
    fn test_empty_text_fails() {
        let embedder = HashingEmbedder::new(64);
        assert!(embedder.embed("   ", EmbeddingStrategy::Text).is_err());
        assert!(embedder.embed("the of a", EmbeddingStrategy::Text).is_err());
    }

    #[tokio::test]
    async fn test_generator_returns_none_on_failure() {
        let embedder = HashingEmbedder::new(64);
        assert!(embedder
            .generate_embedding("", EmbeddingStrategy::Query)
            .await
            .is_none());
        let out = embedder
            .generate_embedding("block", EmbeddingStrategy::Query)
            .await
            .unwrap();
        assert_eq!(out.embedding.len(), 64);
    }

    #[test]
    fn test_identifier_parts() {
        assert_eq!(
            identifier_parts("registerBlockItem"),
            vec!["register", "block", "item"]
        );
        assert_eq!(identifier_parts("block_entity"), vec!["block", "entity"]);
        assert_eq!(identifier_parts("JSON"), vec!["json"]);
    }
}
