//! Configuration management for craftrag
//!
//! Handles loading, validation, profile overrides and environment overrides
//! of the retrieval pipeline settings.

use crate::error::{CraftRagError, Result};
use crate::expansion::ExpansionStrategy;
use crate::search::{RankingStrategy, SearchMode};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

mod validator;

pub use validator::ConfigValidator;

pub const SCHEMA_VERSION: &str = "1.0.0";

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    #[serde(rename = "_meta")]
    pub meta: MetaConfig,
    #[serde(default)]
    pub expansion: ExpansionConfig,
    #[serde(default)]
    pub search: SearchConfig,
    #[serde(default)]
    pub reranking: RerankingConfig,
    #[serde(default)]
    pub generation: GenerationConfig,
    #[serde(default)]
    pub session: SessionConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub documents: DocumentsConfig,
    #[serde(default)]
    pub profiles: HashMap<String, ProfileOverrides>,
}

/// Metadata about the configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetaConfig {
    pub schema_version: String,
    #[serde(default = "current_timestamp")]
    pub created_at: String,
    #[serde(default = "current_timestamp")]
    pub last_modified: String,
}

fn current_timestamp() -> String {
    chrono::Utc::now().to_rfc3339()
}

/// Query expansion configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ExpansionConfig {
    pub enabled: bool,
    /// Strategy names; unknown names are ignored
    pub strategies: Vec<String>,
    pub max_terms: usize,
    /// Queries longer than this are not domain-expanded
    pub max_query_words: usize,
}

impl ExpansionConfig {
    /// Parsed strategies, ignoring names that do not map to a strategy
    pub fn parsed_strategies(&self) -> Vec<ExpansionStrategy> {
        ExpansionStrategy::parse_list(&self.strategies)
    }
}

impl Default for ExpansionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            strategies: ExpansionStrategy::DEFAULT
                .iter()
                .map(|s| s.as_str().to_string())
                .collect(),
            max_terms: 10,
            max_query_words: 64,
        }
    }
}

/// Hybrid search configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    pub mode: SearchMode,
    pub ranking_strategy: RankingStrategy,
    /// α in `α·lexical + (1−α)·vector`
    pub lexical_weight: f32,
    /// RRF K constant (typically 60)
    pub rrf_k: f32,
    pub top_k: usize,
    /// Hard cutoff on the final score
    pub similarity_threshold: f32,
    /// Maximum excerpt length in characters
    pub excerpt_chars: usize,
    pub use_hybrid: bool,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            mode: SearchMode::Hybrid,
            ranking_strategy: RankingStrategy::WeightedSum,
            lexical_weight: 0.5,
            rrf_k: 60.0,
            top_k: 10,
            similarity_threshold: 0.1,
            excerpt_chars: 320,
            use_hybrid: true,
        }
    }
}

/// Ensemble re-ranking configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RerankingConfig {
    pub enabled: bool,
    /// Weight of the hybrid search score in the fused score
    pub base_weight: f32,
    pub feature_weight: f32,
    pub contextual_weight: f32,
}

impl Default for RerankingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            base_weight: 0.5,
            feature_weight: 0.3,
            contextual_weight: 0.2,
        }
    }
}

/// Answer synthesis configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    /// Sources kept in the response (at most 5)
    pub max_sources: usize,
    /// Responses above this confidence count as successful queries
    pub success_threshold: f32,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_sources: 5,
            success_threshold: 0.5,
        }
    }
}

/// Session context configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub max_history: usize,
    pub max_successful: usize,
    /// Sessions idle longer than this are evicted; 0 disables expiry
    pub idle_ttl_secs: u64,
    /// Least recently active sessions are evicted above this count
    pub max_sessions: usize,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            max_history: 20,
            max_successful: 10,
            idle_ttl_secs: 24 * 60 * 60,
            max_sessions: 10_000,
        }
    }
}

/// Embedding configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    /// "hashing" or "fastembed"
    pub provider: String,
    /// Model name for the fastembed provider
    pub model: String,
    /// Dimension for the hashing provider
    pub dimension: usize,
    pub max_chunks_per_document: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: "hashing".to_string(),
            model: "all-MiniLM-L6-v2".to_string(),
            dimension: 256,
            max_chunks_per_document: 4,
        }
    }
}

/// Document source configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentsConfig {
    /// TOML corpus loaded by the CLI
    pub corpus_path: Option<PathBuf>,
}

/// Profile-specific configuration overrides
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ProfileOverrides {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub search_mode: Option<SearchMode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ranking_strategy: Option<RankingStrategy>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expansion_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reranking_enabled: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding_provider: Option<String>,
}

impl Config {
    /// Load configuration from a file
    pub fn load(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(CraftRagError::ConfigNotFound {
                path: path.to_path_buf(),
            });
        }

        let content = std::fs::read_to_string(path).map_err(|e| CraftRagError::Io {
            source: e,
            context: format!("Failed to read config file: {:?}", path),
        })?;
        let mut config: Config = toml::from_str(&content)?;

        config.apply_env_overrides();

        ConfigValidator::validate(&config)?;

        Ok(config)
    }

    /// Save configuration to a file
    pub fn save(&self, path: &Path) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content).map_err(|e| CraftRagError::Io {
            source: e,
            context: format!("Failed to write config file: {:?}", path),
        })?;
        Ok(())
    }

    /// Load configuration with a specific profile applied
    pub fn load_with_profile(path: &Path, profile: &str) -> Result<Self> {
        let mut config = Self::load(path)?;
        config.apply_profile(profile)?;
        ConfigValidator::validate(&config)?;
        Ok(config)
    }

    /// Apply a profile's overrides to the configuration
    pub fn apply_profile(&mut self, profile: &str) -> Result<()> {
        let overrides = self
            .profiles
            .get(profile)
            .cloned()
            .ok_or_else(|| CraftRagError::Config(format!("Unknown profile: {}", profile)))?;

        if let Some(mode) = overrides.search_mode {
            self.search.mode = mode;
        }
        if let Some(strategy) = overrides.ranking_strategy {
            self.search.ranking_strategy = strategy;
        }
        if let Some(enabled) = overrides.expansion_enabled {
            self.expansion.enabled = enabled;
        }
        if let Some(enabled) = overrides.reranking_enabled {
            self.reranking.enabled = enabled;
        }
        if let Some(provider) = overrides.embedding_provider {
            self.embedding.provider = provider;
        }
        Ok(())
    }

    /// Apply environment variable overrides
    /// Environment variables in format: CRAFTRAG_SECTION__KEY=value
    pub fn apply_env_overrides(&mut self) {
        self.apply_overrides(std::env::vars());
    }

    /// Apply `CRAFTRAG_`-prefixed overrides from any key/value source
    pub fn apply_overrides<I>(&mut self, vars: I)
    where
        I: IntoIterator<Item = (String, String)>,
    {
        for (key, value) in vars {
            if let Some(config_key) = key.strip_prefix("CRAFTRAG_") {
                if let Err(e) = self.set_value_from_env(config_key, &value) {
                    tracing::warn!("Failed to apply env override {}: {}", key, e);
                }
            }
        }
    }

    fn set_value_from_env(&mut self, path: &str, value: &str) -> Result<()> {
        match path {
            "EXPANSION__ENABLED" => self.expansion.enabled = parse_value(path, value)?,
            "EXPANSION__MAX_TERMS" => self.expansion.max_terms = parse_value(path, value)?,
            "EXPANSION__STRATEGIES" => {
                self.expansion.strategies = value
                    .split(',')
                    .map(|s| s.trim().to_string())
                    .filter(|s| !s.is_empty())
                    .collect();
            }
            "SEARCH__MODE" => self.search.mode = parse_value(path, value)?,
            "SEARCH__RANKING_STRATEGY" => self.search.ranking_strategy = parse_value(path, value)?,
            "SEARCH__LEXICAL_WEIGHT" => self.search.lexical_weight = parse_value(path, value)?,
            "SEARCH__TOP_K" => self.search.top_k = parse_value(path, value)?,
            "SEARCH__SIMILARITY_THRESHOLD" => {
                self.search.similarity_threshold = parse_value(path, value)?
            }
            "RERANKING__ENABLED" => self.reranking.enabled = parse_value(path, value)?,
            "EMBEDDING__PROVIDER" => self.embedding.provider = value.to_string(),
            "EMBEDDING__MODEL" => self.embedding.model = value.to_string(),
            "DOCUMENTS__CORPUS_PATH" => self.documents.corpus_path = Some(PathBuf::from(value)),
            _ => {
                tracing::debug!("Unknown env config key: {}", path);
            }
        }
        Ok(())
    }

    /// Get the default configuration file path
    pub fn default_path() -> Result<PathBuf> {
        let config_dir = dirs::config_dir()
            .ok_or_else(|| CraftRagError::Config("Cannot determine config directory".to_string()))?;

        Ok(config_dir.join("craftrag").join("config.toml"))
    }
}

fn parse_value<T>(path: &str, value: &str) -> Result<T>
where
    T: std::str::FromStr,
{
    value
        .trim()
        .parse()
        .map_err(|_| CraftRagError::InvalidConfigValue {
            path: path.to_string(),
            message: format!("Cannot parse '{}'", value),
        })
}

fn default_profiles() -> HashMap<String, ProfileOverrides> {
    let mut profiles = HashMap::new();
    profiles.insert(
        "keyword".to_string(),
        ProfileOverrides {
            search_mode: Some(SearchMode::Lexical),
            ..Default::default()
        },
    );
    profiles.insert(
        "fast".to_string(),
        ProfileOverrides {
            expansion_enabled: Some(false),
            reranking_enabled: Some(false),
            ..Default::default()
        },
    );
    profiles.insert(
        "rrf".to_string(),
        ProfileOverrides {
            ranking_strategy: Some(RankingStrategy::ReciprocalRankFusion),
            ..Default::default()
        },
    );
    profiles
}

impl Default for Config {
    fn default() -> Self {
        Self {
            meta: MetaConfig {
                schema_version: SCHEMA_VERSION.to_string(),
                created_at: current_timestamp(),
                last_modified: current_timestamp(),
            },
            expansion: ExpansionConfig::default(),
            search: SearchConfig::default(),
            reranking: RerankingConfig::default(),
            generation: GenerationConfig::default(),
            session: SessionConfig::default(),
            embedding: EmbeddingConfig::default(),
            documents: DocumentsConfig::default(),
            profiles: default_profiles(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_roundtrips_through_toml() {
        let config = Config::default();
        let text = toml::to_string_pretty(&config).unwrap();
        let parsed: Config = toml::from_str(&text).unwrap();
        assert_eq!(parsed.search.top_k, config.search.top_k);
        assert_eq!(parsed.search.mode, SearchMode::Hybrid);
    }

    #[test]
    fn test_partial_file_uses_section_defaults() {
        let text = r#"
[_meta]
schema_version = "1.0.0"

[search]
top_k = 3
"#;
        let config: Config = toml::from_str(text).unwrap();
        assert_eq!(config.search.top_k, 3);
        assert_eq!(config.search.lexical_weight, 0.5);
        assert_eq!(config.expansion.max_terms, 10);
    }

    #[test]
    fn test_env_overrides() {
        let mut config = Config::default();
        config.apply_overrides(vec![
            ("CRAFTRAG_SEARCH__TOP_K".to_string(), "7".to_string()),
            ("CRAFTRAG_SEARCH__MODE".to_string(), "lexical".to_string()),
            ("CRAFTRAG_RERANKING__ENABLED".to_string(), "false".to_string()),
            ("CRAFTRAG_EXPANSION__STRATEGIES".to_string(), "domain, bogus".to_string()),
            ("CRAFTRAG_SEARCH__LEXICAL_WEIGHT".to_string(), "not-a-number".to_string()),
            ("OTHER_VAR".to_string(), "ignored".to_string()),
        ]);
        assert_eq!(config.search.top_k, 7);
        assert_eq!(config.search.mode, SearchMode::Lexical);
        assert!(!config.reranking.enabled);
        assert_eq!(
            config.expansion.parsed_strategies(),
            vec![ExpansionStrategy::Domain]
        );
        assert_eq!(config.search.lexical_weight, 0.5);
    }

    #[test]
    fn test_apply_profile() {
        let mut config = Config::default();
        config.profiles.insert(
            "fast".to_string(),
            ProfileOverrides {
                search_mode: Some(SearchMode::Lexical),
                reranking_enabled: Some(false),
                ..Default::default()
            },
        );
        config.apply_profile("fast").unwrap();
        assert_eq!(config.search.mode, SearchMode::Lexical);
        assert!(!config.reranking.enabled);
        assert!(config.apply_profile("missing").is_err());
    }
}
