use serde::Deserialize;

use crate::error::{ApiError, Result};

/// How model output is turned into a `DishList`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StructuringMode {
    /// Native function-calling bound to the dish schema.
    Tools,
    /// Plain text generation followed by local JSON extraction.
    Extraction,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AssistantMode {
    /// Fixed retrieve-then-structure chain.
    Pipeline,
    /// Tool-using agent with per-session memory.
    Agent,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MemoryBackend {
    Memory,
    Redis,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum VectorBackend {
    Pinecone,
    Memory,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub port: u16,
    pub log_level: String,
    pub http_timeout_secs: u64,

    pub firebase_url: String,
    pub firebase_auth: Option<String>,
    pub dishes_path: String,

    pub pinecone_api_key: Option<String>,
    pub pinecone_index_host: Option<String>,
    pub pinecone_namespace: Option<String>,
    pub embedding_model: String,
    pub vector_backend: VectorBackend,

    pub openai_api_key: Option<String>,
    pub openai_base_url: String,
    pub chat_model: String,
    pub temperature: f32,

    pub retrieval_top_k: usize,
    pub retrieval_min_score: Option<f32>,
    pub include_history: bool,
    pub structuring_mode: StructuringMode,
    pub assistant_mode: AssistantMode,
    pub agent_max_steps: usize,

    pub memory_backend: MemoryBackend,
    pub redis_url: String,
    pub memory_ttl_secs: u64,
    pub session_idle_secs: u64,
}

impl Config {
    /// Defaults for every key; environment variables override them in `from_env`.
    pub fn builder() -> Result<config::ConfigBuilder<config::builder::DefaultState>> {
        let builder = config::Config::builder()
            .set_default("port", 8080)?
            .set_default("log_level", "info")?
            .set_default("http_timeout_secs", 60)?
            .set_default("firebase_url", "")?
            .set_default("dishes_path", "dishes")?
            .set_default("embedding_model", "multilingual-e5-large")?
            .set_default("vector_backend", "pinecone")?
            .set_default("openai_base_url", "https://api.openai.com/v1")?
            .set_default("chat_model", "gpt-3.5-turbo")?
            .set_default("temperature", 0.7)?
            .set_default("retrieval_top_k", 4)?
            .set_default("include_history", false)?
            .set_default("structuring_mode", "tools")?
            .set_default("assistant_mode", "pipeline")?
            .set_default("agent_max_steps", 6)?
            .set_default("memory_backend", "memory")?
            .set_default("redis_url", "redis://localhost:6379")?
            .set_default("memory_ttl_secs", 86_400)?
            .set_default("session_idle_secs", 3_600)?;
        Ok(builder)
    }

    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        let config: Config = Self::builder()?
            .add_source(config::Environment::default().try_parsing(true))
            .build()?
            .try_deserialize()?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.firebase_url.trim().is_empty() {
            return Err(ApiError::ConfigError("FIREBASE_URL must be set".into()));
        }
        if self.retrieval_top_k == 0 {
            return Err(ApiError::ConfigError(
                "RETRIEVAL_TOP_K must be at least 1".into(),
            ));
        }
        if self.agent_max_steps == 0 {
            return Err(ApiError::ConfigError(
                "AGENT_MAX_STEPS must be at least 1".into(),
            ));
        }
        if self.pinecone_api_key.is_none() {
            return Err(ApiError::ConfigError(
                "PINECONE_API_KEY must be set for embeddings".into(),
            ));
        }
        if self.vector_backend == VectorBackend::Pinecone && self.pinecone_index_host.is_none() {
            return Err(ApiError::ConfigError(
                "PINECONE_INDEX_HOST must be set when VECTOR_BACKEND=pinecone".into(),
            ));
        }
        if self.session_idle_secs == 0 {
            return Err(ApiError::ConfigError(
                "SESSION_IDLE_SECS must be at least 1".into(),
            ));
        }
        if self.openai_api_key.is_none() {
            return Err(ApiError::ConfigError("OPENAI_API_KEY must be set".into()));
        }
        Ok(())
    }
}
