use std::env;
use std::sync::OnceLock;
use thiserror::Error;

/// Errors encountered while loading configuration from environment variables.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Required environment variable was not provided.
    #[error("Missing environment variable: {0}")]
    MissingVariable(String),
    /// Environment variable contained a value that could not be parsed.
    #[error("Invalid value for environment variable: {0}")]
    InvalidValue(String),
}

/// Runtime configuration for the policy QA service.
///
/// Defaults are declared once here; the environment overrides them field by
/// field. The struct is immutable after load and shared through [`CONFIG`].
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the Qdrant instance that stores chunk vectors.
    pub qdrant_url: String,
    /// Name of the Qdrant collection holding policy chunks.
    pub qdrant_collection_name: String,
    /// Optional API key required to access Qdrant.
    pub qdrant_api_key: Option<String>,
    /// Credential for the OpenAI-compatible embedding and chat endpoints.
    pub openai_api_key: String,
    /// Base URL of the OpenAI-compatible API.
    pub openai_base_url: String,
    /// Chat model identifier used to answer questions.
    pub openai_model: String,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Partitioning strategy identifier applied to source PDFs.
    pub partition_strategy: PartitionStrategy,
    /// Directory holding cached partition artifacts.
    pub partition_cache_dir: String,
    /// Whether partition results are persisted to the cache.
    pub partition_cache_enabled: bool,
    /// Chunking parameters for the title-anchored chunker.
    pub chunking: ChunkingPolicy,
    /// Number of chunks fetched per similarity search.
    pub retrieval_top_k: usize,
    /// Whether query traces are appended to the trace file.
    pub tracing_enabled: bool,
    /// Path of the newline-delimited JSON trace file.
    pub trace_path: String,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
}

/// Supported document partitioning strategies.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PartitionStrategy {
    /// High-fidelity layout analysis.
    HiRes,
    /// Faster text-only extraction.
    Fast,
}

impl PartitionStrategy {
    /// Stable identifier used in logs and cache artifacts.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::HiRes => "hi_res",
            Self::Fast => "fast",
        }
    }
}

impl std::str::FromStr for PartitionStrategy {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "hi_res" => Ok(Self::HiRes),
            "fast" => Ok(Self::Fast),
            _ => Err(()),
        }
    }
}

/// Parameters controlling title-anchored chunking.
#[derive(Debug, Clone)]
pub struct ChunkingPolicy {
    /// Chunking strategy identifier; only `by_title` is implemented.
    pub strategy: String,
    /// Hard ceiling on characters per chunk.
    pub max_characters: usize,
    /// Trailing sections shorter than this are merged into a neighbor.
    pub combine_text_under_n_chars: usize,
    /// Whether a section may continue across page boundaries.
    pub multipage_sections: bool,
    /// Characters of the previous chunk carried into the next one.
    pub overlap: usize,
}

impl Default for ChunkingPolicy {
    fn default() -> Self {
        Self {
            strategy: "by_title".to_string(),
            max_characters: 1000,
            combine_text_under_n_chars: 500,
            multipage_sections: true,
            overlap: 200,
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    pub fn from_env() -> Result<Self, ConfigError> {
        let chunking = ChunkingPolicy {
            strategy: load_env_optional("CHUNK_STRATEGY")
                .unwrap_or_else(|| "by_title".to_string()),
            max_characters: load_env_parsed("CHUNK_MAX_CHARACTERS", 1000)?,
            combine_text_under_n_chars: load_env_parsed("CHUNK_COMBINE_UNDER", 500)?,
            multipage_sections: load_env_bool("CHUNK_MULTIPAGE_SECTIONS", true)?,
            overlap: load_env_parsed("CHUNK_OVERLAP", 200)?,
        };

        Ok(Self {
            qdrant_url: load_env("QDRANT_URL")?,
            qdrant_collection_name: load_env("QDRANT_COLLECTION_NAME")?,
            qdrant_api_key: load_env_optional("QDRANT_API_KEY"),
            openai_api_key: load_env("OPENAI_API_KEY")?,
            openai_base_url: load_env_optional("OPENAI_BASE_URL")
                .unwrap_or_else(|| "https://api.openai.com/v1".to_string()),
            openai_model: load_env_optional("OPENAI_MODEL")
                .unwrap_or_else(|| "gpt-4o-mini".to_string()),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or_else(|| "text-embedding-3-large".to_string()),
            embedding_dimension: load_env("EMBEDDING_DIMENSION")?
                .parse()
                .map_err(|_| ConfigError::InvalidValue("EMBEDDING_DIMENSION".to_string()))?,
            partition_strategy: load_env_optional("PARTITION_STRATEGY")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|()| ConfigError::InvalidValue("PARTITION_STRATEGY".to_string()))
                })
                .transpose()?
                .unwrap_or(PartitionStrategy::HiRes),
            partition_cache_dir: load_env_optional("PARTITION_CACHE_DIR")
                .unwrap_or_else(|| "cache/partitioned_elements".to_string()),
            partition_cache_enabled: load_env_bool("PARTITION_CACHE_ENABLED", true)?,
            chunking,
            retrieval_top_k: load_env_parsed("RETRIEVAL_TOP_K", 4)?,
            tracing_enabled: load_env_bool("TRACING_ENABLED", true)?,
            trace_path: load_env_optional("TRACE_PATH")
                .unwrap_or_else(|| "local/traces/query_traces.jsonl".to_string()),
            server_port: load_env_optional("SERVER_PORT")
                .map(|value| {
                    value
                        .parse()
                        .map_err(|_| ConfigError::InvalidValue("SERVER_PORT".into()))
                })
                .transpose()?,
        })
    }
}

fn load_env(key: &str) -> Result<String, ConfigError> {
    env::var(key).map_err(|_| ConfigError::MissingVariable(key.to_string()))
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.trim().is_empty())
}

fn load_env_parsed(key: &str, default: usize) -> Result<usize, ConfigError> {
    match load_env_optional(key) {
        Some(value) => value
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

fn load_env_bool(key: &str, default: bool) -> Result<bool, ConfigError> {
    match load_env_optional(key) {
        Some(value) => match value.to_lowercase().as_str() {
            "1" | "true" | "yes" => Ok(true),
            "0" | "false" | "no" => Ok(false),
            _ => Err(ConfigError::InvalidValue(key.to_string())),
        },
        None => Ok(default),
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Load configuration from the environment and install it in the global cache.
///
/// Missing credentials are fatal here, before any network or filesystem I/O
/// is attempted.
pub fn init_config() {
    dotenvy::dotenv().ok();
    let config = Config::from_env().expect("Failed to load config from environment");
    tracing::debug!(
        qdrant_url = %config.qdrant_url,
        collection = %config.qdrant_collection_name,
        chat_model = %config.openai_model,
        embedding_model = %config.embedding_model,
        top_k = config.retrieval_top_k,
        "Loaded configuration"
    );
    CONFIG.set(config).expect("Failed to set config");
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn partition_strategy_parses_known_values() {
        assert_eq!("hi_res".parse(), Ok(PartitionStrategy::HiRes));
        assert_eq!("FAST".parse(), Ok(PartitionStrategy::Fast));
        assert!("ocr_only".parse::<PartitionStrategy>().is_err());
    }

    #[test]
    fn chunking_policy_defaults_match_documented_values() {
        let policy = ChunkingPolicy::default();
        assert_eq!(policy.strategy, "by_title");
        assert_eq!(policy.max_characters, 1000);
        assert_eq!(policy.combine_text_under_n_chars, 500);
        assert!(policy.multipage_sections);
        assert_eq!(policy.overlap, 200);
    }
}
