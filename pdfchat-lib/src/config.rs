//! Pipeline settings
//!
//! [`Settings::default`] is the reference configuration: all-MiniLM-L6-v2
//! embeddings (384 dims) from the HuggingFace Inference API, 1000/200
//! character windows, top-10 search with a 0.01 similarity threshold, and
//! Llama 3.3 70B on Groq for generation. Front ends fill these structs from
//! wherever they read configuration and hand them to
//! [`Pipeline::from_settings`](crate::Pipeline::from_settings).

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::{Error, Result};

pub const DEFAULT_EMBEDDING_MODEL: &str = "sentence-transformers/all-MiniLM-L6-v2";
pub const DEFAULT_EMBEDDING_DIMENSION: usize = 384;
pub const DEFAULT_HF_BASE_URL: &str = "https://router.huggingface.co/hf-inference";
pub const DEFAULT_GENERATION_MODEL: &str = "llama-3.3-70b-versatile";
pub const DEFAULT_GROQ_BASE_URL: &str = "https://api.groq.com/openai/v1";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub chunking: ChunkingConfig,
    pub embedding: EmbeddingConfig,
    pub store: StoreConfig,
    pub generation: GenerationConfig,
    pub retrieval: RetrievalConfig,
    pub request: RequestConfig,
    /// Attach the full error chain to failure responses.
    pub dev_mode: bool,
}

impl Settings {
    /// Check every section, reporting the first problem found.
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        self.embedding.validate()?;
        self.store.validate()?;
        self.retrieval.validate()?;
        self.request.validate()?;
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingConfig {
    /// Window length in characters
    pub chunk_size: usize,
    /// Characters shared by adjacent windows
    pub overlap: usize,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            chunk_size: 1000,
            overlap: 200,
        }
    }
}

impl ChunkingConfig {
    pub fn validate(&self) -> Result<()> {
        crate::chunk::FixedSizeChunker::from_config(self).map(|_| ())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EmbeddingProviderKind {
    #[default]
    #[serde(rename = "huggingface")]
    HuggingFace,
    /// Offline feature hashing, for development and tests
    Hashing,
    /// Local ONNX inference, requires the `local-embed` feature
    #[serde(rename = "fastembed")]
    FastEmbed,
}

impl std::str::FromStr for EmbeddingProviderKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "huggingface" | "hf" => Ok(Self::HuggingFace),
            "hashing" | "hash" => Ok(Self::Hashing),
            "fastembed" | "local" => Ok(Self::FastEmbed),
            other => Err(Error::Configuration(format!(
                "unknown embedding provider '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingConfig {
    pub provider: EmbeddingProviderKind,
    pub model: String,
    pub dimension: usize,
    pub api_key: Option<String>,
    pub base_url: String,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            provider: EmbeddingProviderKind::HuggingFace,
            model: DEFAULT_EMBEDDING_MODEL.to_string(),
            dimension: DEFAULT_EMBEDDING_DIMENSION,
            api_key: None,
            base_url: DEFAULT_HF_BASE_URL.to_string(),
        }
    }
}

impl EmbeddingConfig {
    pub fn validate(&self) -> Result<()> {
        if self.dimension == 0 {
            return Err(Error::Configuration(
                "embedding dimension must be greater than zero".to_string(),
            ));
        }
        if self.model.trim().is_empty() {
            return Err(Error::Configuration("missing embedding model name".to_string()));
        }
        if self.provider == EmbeddingProviderKind::HuggingFace {
            require(&self.api_key, "HuggingFace API key")?;
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StoreKind {
    #[default]
    Memory,
    Supabase,
}

impl std::str::FromStr for StoreKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "memory" | "mem" => Ok(Self::Memory),
            "supabase" | "pgvector" => Ok(Self::Supabase),
            other => Err(Error::Configuration(format!("unknown vector store '{other}'"))),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StoreConfig {
    pub kind: StoreKind,
    pub url: Option<String>,
    pub api_key: Option<String>,
    /// Table holding the chunks, counted for diagnostics
    pub table: String,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            kind: StoreKind::Memory,
            url: None,
            api_key: None,
            table: "documents".to_string(),
        }
    }
}

impl StoreConfig {
    pub fn validate(&self) -> Result<()> {
        if self.kind == StoreKind::Supabase {
            require(&self.url, "Supabase URL")?;
            require(&self.api_key, "Supabase key")?;
            if self.table.trim().is_empty() {
                return Err(Error::Configuration("missing Supabase table name".to_string()));
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GenerationConfig {
    pub model: String,
    pub api_key: Option<String>,
    pub base_url: String,
    pub temperature: f32,
    pub max_tokens: usize,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            model: DEFAULT_GENERATION_MODEL.to_string(),
            api_key: None,
            base_url: DEFAULT_GROQ_BASE_URL.to_string(),
            temperature: 0.7,
            max_tokens: 1024,
        }
    }
}

impl GenerationConfig {
    /// Only checked when a generator is actually built, so ingestion-only
    /// front ends can run without a generation key.
    pub fn validate(&self) -> Result<()> {
        require(&self.api_key, "Groq API key")?;
        if self.model.trim().is_empty() {
            return Err(Error::Configuration("missing generation model name".to_string()));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrievalConfig {
    /// Results requested from the index per query
    pub match_count: usize,
    /// Results must score strictly above this to enter the context
    pub threshold: f32,
    /// Characters of the top result quoted by the fallback answer
    pub fallback_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            match_count: 10,
            threshold: 0.01,
            fallback_chars: 500,
        }
    }
}

impl RetrievalConfig {
    pub fn validate(&self) -> Result<()> {
        if self.match_count == 0 {
            return Err(Error::Configuration(
                "match count must be greater than zero".to_string(),
            ));
        }
        if !self.threshold.is_finite() {
            return Err(Error::Configuration(
                "similarity threshold must be a finite number".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RequestConfig {
    /// Per-attempt timeout for every external call
    pub timeout_secs: u64,
    /// Attempts per external call, including the first
    pub max_retries: usize,
    /// Chunks embedded and inserted concurrently during ingestion
    pub ingest_concurrency: usize,
}

impl Default for RequestConfig {
    fn default() -> Self {
        Self {
            timeout_secs: 30,
            max_retries: 3,
            ingest_concurrency: 4,
        }
    }
}

impl RequestConfig {
    pub fn validate(&self) -> Result<()> {
        if self.timeout_secs == 0 {
            return Err(Error::Configuration("timeout must be at least one second".to_string()));
        }
        if self.max_retries == 0 {
            return Err(Error::Configuration("max retries must be at least 1".to_string()));
        }
        if self.ingest_concurrency == 0 {
            return Err(Error::Configuration(
                "ingest concurrency must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }
}

fn require(value: &Option<String>, what: &str) -> Result<()> {
    match value {
        Some(v) if !v.trim().is_empty() => Ok(()),
        _ => Err(Error::Configuration(format!("missing {what}"))),
    }
}
