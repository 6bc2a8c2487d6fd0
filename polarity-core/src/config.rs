use crate::provider::{RetryPolicy, SamplingParams};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const API_KEY_VAR: &str = "CLOVA_API_KEY";
pub const CHAT_URL_VAR: &str = "CLOVA_API_URL";
pub const EMBEDDING_URL_VAR: &str = "CLOVA_EMBEDDING_URL";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    FileRead(#[from] std::io::Error),

    #[error("Failed to parse config: {0}")]
    Parse(#[from] serde_yaml::Error),

    #[error("Invalid config: {0}")]
    Invalid(String),

    #[error("CLOVA_API_KEY is not set; export it or add it to .env")]
    MissingApiKey,
}

pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration for an experiment run.
///
/// Every section has defaults, so a config file only needs the fields it
/// changes. Credentials are kept out of the file and read separately
/// through [`Credentials`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub clova: ClovaConfig,
    #[serde(default)]
    pub sampling: SamplingParams,
    #[serde(default)]
    pub rag: RagConfig,
    #[serde(default)]
    pub dialogue: DialogueConfig,
    #[serde(default)]
    pub retry: RetryConfig,
}

/// Endpoints and transport settings for the CLOVA Studio API.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClovaConfig {
    pub chat_url: String,
    pub embedding_url: String,
    /// Per-request timeout in seconds
    pub timeout_secs: u64,
}

impl ClovaConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

impl Default for ClovaConfig {
    fn default() -> Self {
        Self {
            chat_url: "https://clovastudio.stream.ntruss.com/testapp/v1/chat-completions/HCX-003"
                .to_string(),
            embedding_url: "https://clovastudio.stream.ntruss.com/testapp/v1/api-tools/embedding/v2"
                .to_string(),
            timeout_secs: 30,
        }
    }
}

/// Which encoder turns text into vectors.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum EncoderMode {
    /// Remote embedding endpoint (default)
    Clova { model_id: String, dimension: usize },
    /// Offline feature-hashing encoder
    Hashing { dimension: usize },
}

impl EncoderMode {
    pub fn dimension(&self) -> usize {
        match self {
            Self::Clova { dimension, .. } | Self::Hashing { dimension } => *dimension,
        }
    }

    /// The id an index built with this encoder is stamped with.
    pub fn model_id(&self) -> String {
        match self {
            Self::Clova { model_id, .. } => model_id.clone(),
            Self::Hashing { dimension } => format!("hashing-sha256-{}", dimension),
        }
    }
}

impl Default for EncoderMode {
    fn default() -> Self {
        Self::Clova {
            model_id: "clova-embedding-v2".to_string(),
            dimension: 1024,
        }
    }
}

/// Configuration for retrieval.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RagConfig {
    #[serde(default)]
    pub encoder: EncoderMode,
    /// Number of snippets retrieved per turn
    pub top_k: usize,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
}

impl Default for RagConfig {
    fn default() -> Self {
        Self {
            encoder: EncoderMode::default(),
            top_k: 3,
            chunk_size: 512,
            chunk_overlap: 50,
        }
    }
}

/// Configuration for the two-agent dialogue loop.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DialogueConfig {
    pub n_turns: usize,
    /// Pause after each speaker, in milliseconds
    pub turn_delay_ms: u64,
    /// How many past messages an agent sends along with a new turn
    pub history_window: usize,
    #[serde(default)]
    pub max_reply_lines: Option<usize>,
    #[serde(default)]
    pub max_reply_chars: Option<usize>,
    /// Seed for picking fallback responses; random when absent
    #[serde(default)]
    pub seed: Option<u64>,
    pub output_dir: String,
}

impl DialogueConfig {
    pub fn turn_delay(&self) -> Duration {
        Duration::from_millis(self.turn_delay_ms)
    }
}

impl Default for DialogueConfig {
    fn default() -> Self {
        Self {
            n_turns: 5,
            turn_delay_ms: 1000,
            history_window: 3,
            max_reply_lines: None,
            max_reply_chars: None,
            seed: None,
            output_dir: "./logs".to_string(),
        }
    }
}

/// Caller-side retry settings for transport failures.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryConfig {
    pub max_retries: u32,
    pub initial_backoff_ms: u64,
}

impl RetryConfig {
    pub fn policy(&self) -> RetryPolicy {
        RetryPolicy::new(self.max_retries, Duration::from_millis(self.initial_backoff_ms))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 2,
            initial_backoff_ms: 500,
        }
    }
}

impl Config {
    /// Load configuration from a YAML file.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let contents = fs::read_to_string(path)?;
        let config: Config = serde_yaml::from_str(&contents)?;
        config.validate()?;
        Ok(config)
    }

    /// Reject values that parse but cannot run.
    pub fn validate(&self) -> Result<()> {
        if self.rag.encoder.dimension() == 0 {
            return Err(ConfigError::Invalid(
                "rag.encoder.dimension must be positive".to_string(),
            ));
        }
        if self.rag.chunk_size == 0 {
            return Err(ConfigError::Invalid(
                "rag.chunk_size must be positive".to_string(),
            ));
        }
        Ok(())
    }

    /// Load configuration from `polarity.yaml` if it exists, otherwise use defaults.
    pub fn load_or_default() -> Self {
        Self::load("polarity.yaml").unwrap_or_default()
    }

    /// Apply endpoint overrides from the process environment.
    pub fn with_env_overrides(self) -> Self {
        self.with_overrides_from(|name| std::env::var(name).ok())
    }

    /// Apply endpoint overrides from an arbitrary variable lookup.
    pub fn with_overrides_from<F>(mut self, lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(CHAT_URL_VAR).filter(|v| !v.is_empty()) {
            self.clova.chat_url = url;
        }
        if let Some(url) = lookup(EMBEDDING_URL_VAR).filter(|v| !v.is_empty()) {
            self.clova.embedding_url = url;
        }
        self
    }
}

/// Load a `.env` file from the working directory if one exists.
pub fn load_dotenv() {
    match dotenvy::dotenv() {
        Ok(path) => tracing::debug!(path = %path.display(), "Loaded environment from .env"),
        Err(e) if e.not_found() => {}
        Err(e) => tracing::warn!(error = %e, "Failed to load .env file"),
    }
}

/// API credentials, read once at startup.
#[derive(Clone)]
pub struct Credentials {
    api_key: String,
}

impl Credentials {
    pub fn new(api_key: impl Into<String>) -> Self {
        Self {
            api_key: api_key.into(),
        }
    }

    /// Read the API key from the process environment.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Read the API key through an arbitrary variable lookup.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        lookup(API_KEY_VAR)
            .map(|key| key.trim().to_string())
            .filter(|key| !key.is_empty())
            .map(Self::new)
            .ok_or(ConfigError::MissingApiKey)
    }

    pub fn api_key(&self) -> &str {
        &self.api_key
    }
}

impl fmt::Debug for Credentials {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credentials")
            .field("api_key", &"<redacted>")
            .finish()
    }
}
