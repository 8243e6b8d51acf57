use crate::config::{Config, SCHEMA_VERSION};
use crate::error::{CraftRagError, Result, ValidationError};

const VALID_PROVIDERS: [&str; 2] = ["hashing", "fastembed"];
const MAX_SOURCES_CAP: usize = 5;

/// Configuration validator
pub struct ConfigValidator;

impl ConfigValidator {
    /// Validate the configuration
    pub fn validate(config: &Config) -> Result<()> {
        let mut errors = Vec::new();

        Self::validate_schema_version(config, &mut errors);
        Self::validate_expansion(config, &mut errors);
        Self::validate_search(config, &mut errors);
        Self::validate_reranking(config, &mut errors);
        Self::validate_generation(config, &mut errors);
        Self::validate_session(config, &mut errors);
        Self::validate_embedding(config, &mut errors);

        if errors.is_empty() {
            Ok(())
        } else {
            Err(CraftRagError::ConfigValidation { errors })
        }
    }

    fn validate_schema_version(config: &Config, errors: &mut Vec<ValidationError>) {
        let version = &config.meta.schema_version;
        if version != SCHEMA_VERSION {
            errors.push(ValidationError::new(
                "_meta.schema_version",
                format!("Unsupported schema version: {}", version),
            ));
        }
    }

    fn validate_expansion(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.expansion.max_terms == 0 {
            errors.push(ValidationError::new(
                "expansion.max_terms",
                "Max terms must be greater than 0",
            ));
        }

        if config.expansion.max_query_words == 0 {
            errors.push(ValidationError::new(
                "expansion.max_query_words",
                "Max query words must be greater than 0",
            ));
        }
    }

    fn validate_search(config: &Config, errors: &mut Vec<ValidationError>) {
        let search = &config.search;

        if !is_unit_interval(search.lexical_weight) {
            errors.push(ValidationError::new(
                "search.lexical_weight",
                format!(
                    "Lexical weight must be between 0.0 and 1.0, got {}",
                    search.lexical_weight
                ),
            ));
        }

        if !is_unit_interval(search.similarity_threshold) {
            errors.push(ValidationError::new(
                "search.similarity_threshold",
                format!(
                    "Similarity threshold must be between 0.0 and 1.0, got {}",
                    search.similarity_threshold
                ),
            ));
        }

        if search.rrf_k <= 0.0 || !search.rrf_k.is_finite() {
            errors.push(ValidationError::new(
                "search.rrf_k",
                "RRF k must be a positive number",
            ));
        }

        if search.top_k == 0 {
            errors.push(ValidationError::new(
                "search.top_k",
                "top_k must be greater than 0",
            ));
        }

        if search.excerpt_chars < 16 {
            errors.push(ValidationError::new(
                "search.excerpt_chars",
                "Excerpt length must be at least 16 characters",
            ));
        }
    }

    fn validate_reranking(config: &Config, errors: &mut Vec<ValidationError>) {
        let r = &config.reranking;
        let weights = [
            ("reranking.base_weight", r.base_weight),
            ("reranking.feature_weight", r.feature_weight),
            ("reranking.contextual_weight", r.contextual_weight),
        ];

        for (path, weight) in weights {
            if weight < 0.0 || !weight.is_finite() {
                errors.push(ValidationError::new(
                    path,
                    format!("Weight must be non-negative, got {}", weight),
                ));
            }
        }

        if r.base_weight + r.feature_weight + r.contextual_weight <= 0.0 {
            errors.push(ValidationError::new(
                "reranking",
                "Re-ranking weights must sum to a positive value",
            ));
        }
    }

    fn validate_generation(config: &Config, errors: &mut Vec<ValidationError>) {
        let max_sources = config.generation.max_sources;
        if max_sources == 0 || max_sources > MAX_SOURCES_CAP {
            errors.push(ValidationError::new(
                "generation.max_sources",
                format!(
                    "Max sources must be between 1 and {}, got {}",
                    MAX_SOURCES_CAP, max_sources
                ),
            ));
        }

        if !is_unit_interval(config.generation.success_threshold) {
            errors.push(ValidationError::new(
                "generation.success_threshold",
                "Success threshold must be between 0.0 and 1.0",
            ));
        }
    }

    fn validate_session(config: &Config, errors: &mut Vec<ValidationError>) {
        if config.session.max_history == 0 {
            errors.push(ValidationError::new(
                "session.max_history",
                "History cap must be greater than 0",
            ));
        }

        if config.session.max_successful == 0 {
            errors.push(ValidationError::new(
                "session.max_successful",
                "Successful query cap must be greater than 0",
            ));
        }

        if config.session.max_sessions == 0 {
            errors.push(ValidationError::new(
                "session.max_sessions",
                "Session cap must be greater than 0",
            ));
        }
    }

    fn validate_embedding(config: &Config, errors: &mut Vec<ValidationError>) {
        let provider = &config.embedding.provider;
        if !VALID_PROVIDERS.contains(&provider.as_str()) {
            errors.push(ValidationError::new(
                "embedding.provider",
                format!(
                    "Provider must be one of {:?}, got '{}'",
                    VALID_PROVIDERS, provider
                ),
            ));
        }

        if config.embedding.dimension == 0 {
            errors.push(ValidationError::new(
                "embedding.dimension",
                "Dimension must be greater than 0",
            ));
        }

        if config.embedding.max_chunks_per_document == 0 {
            errors.push(ValidationError::new(
                "embedding.max_chunks_per_document",
                "Chunk cap must be greater than 0",
            ));
        }

        if config.embedding.model.is_empty() {
            errors.push(ValidationError::new(
                "embedding.model",
                "Model name cannot be empty",
            ));
        }
    }
}

fn is_unit_interval(value: f32) -> bool {
    (0.0..=1.0).contains(&value)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_valid_config() {
        let config = Config::default();
        assert!(ConfigValidator::validate(&config).is_ok());
    }

    #[test]
    fn test_invalid_weights_are_collected() {
        let mut config = Config::default();
        config.search.lexical_weight = 1.5;
        config.reranking.feature_weight = -0.1;
        config.generation.max_sources = 9;

        match ConfigValidator::validate(&config) {
            Err(CraftRagError::ConfigValidation { errors }) => {
                let paths: Vec<&str> = errors.iter().map(|e| e.path.as_str()).collect();
                assert!(paths.contains(&"search.lexical_weight"));
                assert!(paths.contains(&"reranking.feature_weight"));
                assert!(paths.contains(&"generation.max_sources"));
            }
            other => panic!("expected validation failure, got {:?}", other),
        }
    }

    #[test]
    fn test_invalid_provider() {
        let mut config = Config::default();
        config.embedding.provider = "cloud".to_string();
        assert!(ConfigValidator::validate(&config).is_err());
    }

    #[test]
    fn test_zero_weights_rejected() {
        let mut config = Config::default();
        config.reranking.base_weight = 0.0;
        config.reranking.feature_weight = 0.0;
        config.reranking.contextual_weight = 0.0;
        assert!(ConfigValidator::validate(&config).is_err());
    }
}
