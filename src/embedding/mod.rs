//! Embedding generation
//!
//! The retrieval core consumes embeddings through the `EmbeddingGenerator`
//! trait. Generators never fail across this boundary: a failed generation
//! yields `None` and the search engine degrades to lexical-only scoring.
//!
//! Backends:
//! - `HashingEmbedder`: deterministic feature-hashed bag of words, no model download
//! - `FastEmbedProvider`: local ONNX models (requires the `fastembed` feature)

#[cfg(feature = "fastembed")]
mod fastembed_provider;
mod hashing;

#[cfg(feature = "fastembed")]
pub use fastembed_provider::FastEmbedProvider;
pub use hashing::HashingEmbedder;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitializationError(String),

    #[error("Embedding generation failed: {0}")]
    GenerationError(String),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Dimension mismatch: expected {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },
}

/// How a piece of text should be embedded
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingStrategy {
    /// Prose and documentation
    Text,
    /// Source code; identifiers are split into sub-words
    Code,
    /// Search queries
    Query,
    /// Mixed prose and code
    Hybrid,
}

/// Output of a successful generation
#[derive(Debug, Clone)]
pub struct EmbeddingOutput {
    pub embedding: Vec<f32>,
    pub strategy: EmbeddingStrategy,
}

/// Produces query and document embeddings
#[async_trait]
pub trait EmbeddingGenerator: Send + Sync {
    /// Embed `text`, returning `None` on any failure
    async fn generate_embedding(
        &self,
        text: &str,
        strategy: EmbeddingStrategy,
    ) -> Option<EmbeddingOutput>;

    /// Get the embedding dimension
    fn dimension(&self) -> usize;

    /// Get the model name
    fn model_name(&self) -> &str;
}

/// Cosine similarity of two vectors
///
/// Returns 0.0 for mismatched lengths or zero-magnitude inputs.
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.len() != b.len() || a.is_empty() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b.iter()).map(|(x, y)| x * y).sum();
    let mag_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let mag_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if mag_a == 0.0 || mag_b == 0.0 {
        return 0.0;
    }
    dot / (mag_a * mag_b)
}
