use crate::config::RerankingConfig;
use crate::rerank::{
    ContextualReRanker, FeatureBasedReRanker, RerankContext, RerankError, RerankMetadata,
    ReRanker, SignalStats,
};
use crate::search::{rank_results, SearchQuery, SearchResult};
use crate::session::SessionStore;
use std::sync::Arc;
use tracing::{debug, warn};

/// Fuses the hybrid score with every registered re-ranker signal
///
/// `fused = (w_base·hybrid + Σ w_i·signal_i) / (w_base + Σ w_i)`
pub struct EnsembleReRanker {
    rerankers: Vec<(Arc<dyn ReRanker>, f32)>,
    base_weight: f32,
    sessions: Arc<SessionStore>,
}

impl EnsembleReRanker {
    /// Ensemble over the feature and contextual re-rankers
    pub fn new(config: &RerankingConfig, sessions: Arc<SessionStore>) -> Self {
        let feature: Arc<dyn ReRanker> = Arc::new(FeatureBasedReRanker::new());
        let contextual: Arc<dyn ReRanker> = Arc::new(ContextualReRanker::new());

        Self {
            rerankers: vec![
                (feature, config.feature_weight),
                (contextual, config.contextual_weight),
            ],
            base_weight: config.base_weight,
            sessions,
        }
    }

    /// Register a re-ranker, replacing one with the same name
    pub fn with_reranker(mut self, reranker: Arc<dyn ReRanker>, weight: f32) -> Self {
        let name = reranker.name();
        self.rerankers.retain(|(r, _)| r.name() != name);
        self.rerankers.push((reranker, weight));
        self
    }

    pub fn reranker_names(&self) -> Vec<&'static str> {
        self.rerankers.iter().map(|(r, _)| r.name()).collect()
    }

    /// Re-rank `results` for `session_id`
    ///
    /// On any signal failure the input ordering is returned unchanged and the
    /// failure is listed in the metadata.
    pub fn ensemble_rerank(
        &self,
        query: &SearchQuery,
        results: Vec<SearchResult>,
        session_id: &str,
    ) -> (Vec<SearchResult>, RerankMetadata) {
        let mut metadata = RerankMetadata {
            base_weight: self.base_weight,
            ..Default::default()
        };
        if results.is_empty() {
            return (results, metadata);
        }

        let session = self.sessions.get(session_id);
        let ctx = RerankContext::new(query, session.as_ref());

        let mut signals: Vec<(&'static str, f32, Vec<f32>)> = Vec::new();
        for (reranker, weight) in &self.rerankers {
            match collect_signals(reranker.as_ref(), &ctx, &results) {
                Ok(values) => signals.push((reranker.name(), *weight, values)),
                Err(e) => {
                    warn!(reranker = reranker.name(), "Re-ranker failed: {}", e);
                    metadata.errors.push(e.to_string());
                }
            }
        }

        if !metadata.errors.is_empty() {
            metadata.fallback = true;
            return (results, metadata);
        }

        let total_weight: f32 = self.base_weight + signals.iter().map(|(_, w, _)| *w).sum::<f32>();
        if total_weight <= 0.0 {
            metadata.fallback = true;
            metadata
                .errors
                .push("re-ranking weights sum to zero".to_string());
            return (results, metadata);
        }

        let n = results.len() as f32;
        let original_order: Vec<String> = results.iter().map(|r| r.document.id.clone()).collect();

        let mut results = results;
        for (i, result) in results.iter_mut().enumerate() {
            let mut fused = self.base_weight * result.scores.hybrid;
            for (name, weight, values) in &signals {
                let value = values[i];
                fused += weight * value;
                match *name {
                    "feature" => result.scores.feature = Some(value),
                    "contextual" => result.scores.contextual = Some(value),
                    _ => {}
                }
            }
            result.final_score = (fused / total_weight).clamp(0.0, 1.0);
        }

        metadata.base_contribution = self.base_weight
            * results.iter().map(|r| r.scores.hybrid).sum::<f32>()
            / n
            / total_weight;
        for (name, weight, values) in &signals {
            let avg_signal = values.iter().sum::<f32>() / n;
            metadata.signals.insert(
                name.to_string(),
                SignalStats {
                    weight: *weight,
                    avg_signal,
                    avg_contribution: weight * avg_signal / total_weight,
                },
            );
        }

        rank_results(&mut results);

        metadata.rank_changes = results
            .iter()
            .zip(original_order.iter())
            .filter(|(r, id)| r.document.id != **id)
            .count();
        metadata.applied = true;

        debug!(
            results = results.len(),
            rank_changes = metadata.rank_changes,
            "Ensemble re-ranking complete"
        );

        (results, metadata)
    }
}

/// Run one re-ranker and check its output shape
fn collect_signals(
    reranker: &dyn ReRanker,
    ctx: &RerankContext<'_>,
    results: &[SearchResult],
) -> Result<Vec<f32>, RerankError> {
    let values = reranker.signals(ctx, results)?;
    if values.len() != results.len() {
        return Err(RerankError::SignalCount {
            name: reranker.name().to_string(),
            expected: results.len(),
            got: values.len(),
        });
    }
    if let Some(index) = values.iter().position(|v| !v.is_finite()) {
        return Err(RerankError::InvalidSignal {
            name: reranker.name().to_string(),
            index,
        });
    }
    Ok(values.into_iter().map(|v| v.clamp(0.0, 1.0)).collect())
}
