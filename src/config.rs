use serde::Deserialize;
use std::env;
use std::path::PathBuf;
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
    /// Individually valid settings that cannot be used together.
    #[error("Inconsistent configuration: {0}")]
    Inconsistent(String),
}

/// Runtime configuration for the PDF query server.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    /// Directory holding uploaded documents.
    pub document_dir: PathBuf,
    /// Location of the persisted embedding index.
    pub vector_store_path: PathBuf,
    /// Maximum chunk length, measured in `text_splitter_unit`.
    pub text_splitter_chunk_size: usize,
    /// Overlap carried from the tail of the previous chunk.
    pub text_splitter_chunk_overlap: usize,
    /// Unit used to measure chunk length.
    pub text_splitter_unit: LengthUnit,
    /// Embedding provider used to generate vector representations.
    pub embedding_provider: EmbeddingProvider,
    /// Embedding model identifier passed to the provider.
    pub embedding_model: String,
    /// Dimensionality of the produced vectors.
    pub embedding_dimension: usize,
    /// Number of texts sent per embedding request.
    pub embedding_batch_size: usize,
    /// Upper bound for a single embedding call, in seconds.
    pub embedding_timeout_secs: u64,
    /// Base URL of the Ollama runtime.
    pub ollama_url: String,
    /// Base URL of the OpenAI-compatible embeddings API.
    pub openai_base_url: String,
    /// API key for the OpenAI-compatible embeddings API.
    pub openai_api_key: Option<String>,
    /// Completion provider used to answer questions.
    pub llm_provider: LlmProvider,
    /// Completion model identifier.
    pub llm_model: String,
    /// Optional override for the completion base URL.
    pub llm_base_url: Option<String>,
    /// API key for the completion provider.
    pub llm_api_key: Option<String>,
    /// Upper bound for a single completion call, in seconds.
    pub llm_timeout_secs: u64,
    /// Number of chunks retrieved per question.
    pub retrieval_top_k: usize,
    /// Largest accepted upload request body, in bytes.
    pub max_upload_bytes: usize,
    /// Host the HTTP listener binds to.
    pub server_host: String,
    /// Optional override for the HTTP server port.
    pub server_port: Option<u16>,
    /// Browser origins allowed to call the API (`*` allows any).
    pub cors_allowed_origins: Vec<String>,
    /// File receiving the non-blocking log layer.
    pub log_file: PathBuf,
}

/// Supported embedding backends for the ingestion pipeline.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    /// Local Ollama runtime.
    Ollama,
    /// Any OpenAI-compatible `/embeddings` endpoint.
    OpenAI,
    /// Deterministic in-process hashing embedder.
    Hash,
}

/// Supported completion backends for the query service.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LlmProvider {
    /// Groq's OpenAI-compatible API.
    Groq,
    /// OpenAI or another OpenAI-compatible API.
    OpenAI,
    /// Local Ollama runtime.
    Ollama,
}

/// How chunk sizes and overlaps are measured.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LengthUnit {
    /// Unicode scalar values.
    Chars,
    /// `cl100k_base` tokens.
    Tokens,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            document_dir: PathBuf::from("./data"),
            vector_store_path: PathBuf::from("vector_store.json"),
            text_splitter_chunk_size: 1000,
            text_splitter_chunk_overlap: 200,
            text_splitter_unit: LengthUnit::Chars,
            embedding_provider: EmbeddingProvider::Ollama,
            embedding_model: "all-minilm".into(),
            embedding_dimension: 384,
            embedding_batch_size: 32,
            embedding_timeout_secs: 120,
            ollama_url: "http://127.0.0.1:11434".into(),
            openai_base_url: "https://api.openai.com/v1".into(),
            openai_api_key: None,
            llm_provider: LlmProvider::Groq,
            llm_model: "llama3-8b-8192".into(),
            llm_base_url: None,
            llm_api_key: None,
            llm_timeout_secs: 60,
            retrieval_top_k: 4,
            max_upload_bytes: 50 * 1024 * 1024,
            server_host: "127.0.0.1".into(),
            server_port: None,
            cors_allowed_origins: vec!["http://localhost:3000".into()],
            log_file: PathBuf::from("logs/pdf-query.log"),
        }
    }
}

impl Config {
    /// Load configuration from environment variables, performing validation along the way.
    ///
    /// Every variable is optional; unset or blank values keep the defaults.
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();
        let llm_api_key =
            load_env_optional("LLM_API_KEY").or_else(|| load_env_optional("GROQ_API_KEY"));

        let config = Self {
            document_dir: load_env_optional("DOCUMENT_DIR")
                .map_or(defaults.document_dir, PathBuf::from),
            vector_store_path: load_env_optional("VECTOR_STORE_PATH")
                .map_or(defaults.vector_store_path, PathBuf::from),
            text_splitter_chunk_size: parse_env("TEXT_SPLITTER_CHUNK_SIZE")?
                .unwrap_or(defaults.text_splitter_chunk_size),
            text_splitter_chunk_overlap: parse_env("TEXT_SPLITTER_CHUNK_OVERLAP")?
                .unwrap_or(defaults.text_splitter_chunk_overlap),
            text_splitter_unit: parse_env("TEXT_SPLITTER_UNIT")?
                .unwrap_or(defaults.text_splitter_unit),
            embedding_provider: parse_env("EMBEDDING_PROVIDER")?
                .unwrap_or(defaults.embedding_provider),
            embedding_model: load_env_optional("EMBEDDING_MODEL")
                .unwrap_or(defaults.embedding_model),
            embedding_dimension: parse_env("EMBEDDING_DIMENSION")?
                .unwrap_or(defaults.embedding_dimension),
            embedding_batch_size: parse_env("EMBEDDING_BATCH_SIZE")?
                .unwrap_or(defaults.embedding_batch_size),
            embedding_timeout_secs: parse_env("EMBEDDING_TIMEOUT_SECS")?
                .unwrap_or(defaults.embedding_timeout_secs),
            ollama_url: load_env_optional("OLLAMA_URL").unwrap_or(defaults.ollama_url),
            openai_base_url: load_env_optional("OPENAI_BASE_URL")
                .unwrap_or(defaults.openai_base_url),
            openai_api_key: load_env_optional("OPENAI_API_KEY"),
            llm_provider: parse_env("LLM_PROVIDER")?.unwrap_or(defaults.llm_provider),
            llm_model: load_env_optional("LLM_MODEL").unwrap_or(defaults.llm_model),
            llm_base_url: load_env_optional("LLM_BASE_URL"),
            llm_api_key,
            llm_timeout_secs: parse_env("LLM_TIMEOUT_SECS")?.unwrap_or(defaults.llm_timeout_secs),
            retrieval_top_k: parse_env("RETRIEVAL_TOP_K")?.unwrap_or(defaults.retrieval_top_k),
            max_upload_bytes: parse_env("MAX_UPLOAD_BYTES")?.unwrap_or(defaults.max_upload_bytes),
            server_host: load_env_optional("SERVER_HOST").unwrap_or(defaults.server_host),
            server_port: parse_env("SERVER_PORT")?,
            cors_allowed_origins: load_env_optional("CORS_ALLOWED_ORIGINS")
                .map_or(defaults.cors_allowed_origins, |raw| parse_origin_list(&raw)),
            log_file: load_env_optional("PDF_QUERY_LOG_FILE")
                .map_or(defaults.log_file, PathBuf::from),
        };
        config.validate()?;
        Ok(config)
    }

    /// Reject settings that would make ingestion or retrieval impossible.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.text_splitter_chunk_size == 0 {
            return Err(ConfigError::InvalidValue("TEXT_SPLITTER_CHUNK_SIZE".into()));
        }
        if self.text_splitter_chunk_overlap >= self.text_splitter_chunk_size {
            return Err(ConfigError::Inconsistent(format!(
                "TEXT_SPLITTER_CHUNK_OVERLAP ({}) must be smaller than TEXT_SPLITTER_CHUNK_SIZE ({})",
                self.text_splitter_chunk_overlap, self.text_splitter_chunk_size
            )));
        }
        if self.embedding_dimension == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_DIMENSION".into()));
        }
        if self.embedding_batch_size == 0 {
            return Err(ConfigError::InvalidValue("EMBEDDING_BATCH_SIZE".into()));
        }
        if self.retrieval_top_k == 0 {
            return Err(ConfigError::InvalidValue("RETRIEVAL_TOP_K".into()));
        }
        if self.embedding_provider == EmbeddingProvider::OpenAI && self.openai_api_key.is_none() {
            return Err(ConfigError::MissingVariable("OPENAI_API_KEY".into()));
        }
        if self.llm_provider != LlmProvider::Ollama && self.llm_api_key.is_none() {
            return Err(ConfigError::MissingVariable("GROQ_API_KEY".into()));
        }
        Ok(())
    }

    /// Base URL for the completion provider, honoring `LLM_BASE_URL`.
    pub fn llm_base_url(&self) -> String {
        if let Some(url) = &self.llm_base_url {
            return url.clone();
        }
        match self.llm_provider {
            LlmProvider::Groq => "https://api.groq.com/openai/v1".into(),
            LlmProvider::OpenAI => "https://api.openai.com/v1".into(),
            LlmProvider::Ollama => self.ollama_url.clone(),
        }
    }
}

fn load_env_optional(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

/// Split a comma-separated origin list, dropping blanks and trailing slashes.
fn parse_origin_list(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|origin| origin.trim().trim_end_matches('/'))
        .filter(|origin| !origin.is_empty())
        .map(str::to_string)
        .collect()
}

fn parse_env<T: std::str::FromStr>(key: &str) -> Result<Option<T>, ConfigError> {
    load_env_optional(key)
        .map(|value| {
            value
                .parse()
                .map_err(|_| ConfigError::InvalidValue(key.to_string()))
        })
        .transpose()
}

impl std::str::FromStr for EmbeddingProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "ollama" => Ok(Self::Ollama),
            "openai" => Ok(Self::OpenAI),
            "hash" => Ok(Self::Hash),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for LlmProvider {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "groq" => Ok(Self::Groq),
            "openai" => Ok(Self::OpenAI),
            "ollama" => Ok(Self::Ollama),
            _ => Err(()),
        }
    }
}

impl std::str::FromStr for LengthUnit {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "chars" | "characters" => Ok(Self::Chars),
            "tokens" => Ok(Self::Tokens),
            _ => Err(()),
        }
    }
}

/// Global configuration cache populated during process start.
pub static CONFIG: OnceLock<Config> = OnceLock::new();

/// Retrieve the loaded configuration, panicking if initialization has not occurred.
pub fn get_config() -> &'static Config {
    CONFIG.get().expect("Config not initialized")
}

/// Install an already-built configuration in the global cache.
pub fn install_config(config: Config) -> Result<(), ConfigError> {
    tracing::debug!(
        document_dir = %config.document_dir.display(),
        vector_store = %config.vector_store_path.display(),
        embedding_provider = ?config.embedding_provider,
        embedding_model = %config.embedding_model,
        llm_provider = ?config.llm_provider,
        llm_model = %config.llm_model,
        server_port = ?config.server_port,
        "Loaded configuration"
    );
    CONFIG
        .set(config)
        .map_err(|_| ConfigError::Inconsistent("configuration already initialized".into()))
}

/// Load configuration from the environment (and `.env`) without installing it.
pub fn load_config() -> Result<Config, ConfigError> {
    dotenvy::dotenv().ok();
    Config::from_env()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_reference_deployment() {
        let config = Config::default();
        assert_eq!(config.text_splitter_chunk_size, 1000);
        assert_eq!(config.text_splitter_chunk_overlap, 200);
        assert_eq!(config.retrieval_top_k, 4);
        assert_eq!(config.llm_model, "llama3-8b-8192");
        assert_eq!(config.document_dir, PathBuf::from("./data"));
    }

    #[test]
    fn validate_rejects_overlap_not_smaller_than_chunk() {
        let config = Config {
            text_splitter_chunk_size: 100,
            text_splitter_chunk_overlap: 100,
            llm_provider: LlmProvider::Ollama,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::Inconsistent(_))
        ));
    }

    #[test]
    fn validate_requires_completion_key_for_hosted_providers() {
        let config = Config {
            llm_api_key: None,
            ..Config::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::MissingVariable(name)) if name == "GROQ_API_KEY"
        ));

        let local = Config {
            llm_provider: LlmProvider::Ollama,
            ..Config::default()
        };
        assert!(local.validate().is_ok());
    }

    #[test]
    fn provider_names_parse_case_insensitively() {
        assert_eq!(
            "Ollama".parse::<EmbeddingProvider>(),
            Ok(EmbeddingProvider::Ollama)
        );
        assert_eq!("HASH".parse::<EmbeddingProvider>(), Ok(EmbeddingProvider::Hash));
        assert_eq!("groq".parse::<LlmProvider>(), Ok(LlmProvider::Groq));
        assert_eq!("tokens".parse::<LengthUnit>(), Ok(LengthUnit::Tokens));
        assert!("bogus".parse::<LlmProvider>().is_err());
    }

    #[test]
    fn origin_list_is_trimmed_and_split() {
        assert_eq!(
            parse_origin_list(" http://localhost:3000/ , https://app.example.com,,"),
            vec!["http://localhost:3000", "https://app.example.com"]
        );
        assert_eq!(
            Config::default().cors_allowed_origins,
            vec!["http://localhost:3000"]
        );
    }

    #[test]
    fn llm_base_url_prefers_override() {
        let mut config = Config::default();
        assert_eq!(config.llm_base_url(), "https://api.groq.com/openai/v1");
        config.llm_base_url = Some("http://localhost:9000/v1".into());
        assert_eq!(config.llm_base_url(), "http://localhost:9000/v1");
    }
}
