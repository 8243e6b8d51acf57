//! Reciprocal Rank Fusion for combining the lexical and vector rankings

use std::collections::HashMap;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum FusionError {
    #[error("Invalid weight configuration: weights must be non-negative and not both zero")]
    InvalidWeights,

    #[error("Invalid RRF constant: {0}")]
    InvalidK(f32),
}

/// Configuration for fusion algorithm
#[derive(Debug, Clone)]
pub struct FusionConfig {
    /// RRF K constant (typically 60)
    pub rrf_k: f32,

    /// Weight for lexical results
    pub lexical_weight: f32,

    /// Weight for vector results
    pub vector_weight: f32,
}

impl FusionConfig {
    pub fn new(rrf_k: f32, lexical_weight: f32, vector_weight: f32) -> Result<Self, FusionError> {
        if !(rrf_k > 0.0 && rrf_k.is_finite()) {
            return Err(FusionError::InvalidK(rrf_k));
        }
        if lexical_weight < 0.0 || vector_weight < 0.0 || lexical_weight + vector_weight <= 0.0 {
            return Err(FusionError::InvalidWeights);
        }

        Ok(Self {
            rrf_k,
            lexical_weight,
            vector_weight,
        })
    }

    /// Best achievable raw score: first place in both lists
    fn max_score(&self) -> f32 {
        (self.lexical_weight + self.vector_weight) / (self.rrf_k + 1.0)
    }
}

/// Apply Reciprocal Rank Fusion to combine two ranked lists
///
/// RRF formula: score(id) = sum over all rankings of: weight / (k + rank)
///
/// Scores are divided by the best achievable score, so a document ranked first
/// in both lists gets 1.0. Ids present in only one list still receive that
/// list's contribution.
///
/// # Arguments
/// * `lexical_results` - (id, score) pairs already sorted best first
/// * `vector_results` - (id, score) pairs already sorted best first
/// * `config` - Fusion configuration
pub fn reciprocal_rank_fusion(
    lexical_results: &[(String, f32)],
    vector_results: &[(String, f32)],
    config: &FusionConfig,
) -> HashMap<String, f32> {
    let mut scores: HashMap<String, f32> = HashMap::new();

    for (rank, (id, _score)) in lexical_results.iter().enumerate() {
        let rrf_score = config.lexical_weight / (config.rrf_k + (rank as f32) + 1.0);
        *scores.entry(id.clone()).or_insert(0.0) += rrf_score;
    }

    for (rank, (id, _score)) in vector_results.iter().enumerate() {
        let rrf_score = config.vector_weight / (config.rrf_k + (rank as f32) + 1.0);
        *scores.entry(id.clone()).or_insert(0.0) += rrf_score;
    }

    let max = config.max_score();
    for score in scores.values_mut() {
        *score = (*score / max).clamp(0.0, 1.0);
    }

    scores
}
