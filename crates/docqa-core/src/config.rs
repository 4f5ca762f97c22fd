//! Configuration loader, typed settings and path helpers.
//!
//! Uses Figment to merge built-in defaults, `config.toml`, `config.<env>.toml`
//! (selected by `RUST_ENV`) and `DOCQA_*` env vars (`__` separates sections).
//! `OPENAI_API_KEY` is mapped onto `openai.api_key`. The resulting
//! [`Settings`] is extracted once at start-up and treated as immutable.

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};
use serde::{Deserialize, Serialize};
use std::env;
use std::path::{Path, PathBuf};

use crate::error::{Error, Result};
use crate::types::SimilarityMetric;

pub struct Config {
    figment: Figment,
}

impl Config {
    pub fn load() -> Result<Self> {
        Self::load_with(None)
    }

    /// Like [`Config::load`], with an extra file merged on top of the env-specific one.
    pub fn load_with(extra_file: Option<&Path>) -> Result<Self> {
        let env_name = env::var("RUST_ENV").unwrap_or_else(|_| "dev".to_string());

        let mut figment = Figment::from(Serialized::defaults(Settings::default())).merge(Toml::file("config.toml"));
        match env_name.as_str() {
            "dev" | "development" => figment = figment.merge(Toml::file("config.dev.toml")),
            "prod" | "production" => figment = figment.merge(Toml::file("config.prod.toml")),
            "test" | "testing" => figment = figment.merge(Toml::file("config.test.toml")),
            _ => {}
        }
        if let Some(path) = extra_file {
            if !path.exists() {
                return Err(Error::Config(format!("config file {} does not exist", path.display())));
            }
            figment = figment.merge(Toml::file(path));
        }
        figment = figment
            .merge(Env::prefixed("DOCQA_").split("__"))
            .merge(Env::raw().only(&["OPENAI_API_KEY"]).map(|_| "openai.api_key".into()));

        Ok(Self { figment })
    }

    /// Defaults overlaid with an inline TOML document; no files or env vars are read.
    pub fn from_toml_str(toml: &str) -> Self {
        Self { figment: Figment::from(Serialized::defaults(Settings::default())).merge(Toml::string(toml)) }
    }

    pub fn get<T>(&self, key: &str) -> Result<T>
    where
        T: serde::de::DeserializeOwned,
    {
        self.figment
            .extract_inner(key)
            .map_err(|e| Error::Config(format!("failed to get '{}': {}", key, e)))
    }

    /// Extract and validate the full settings tree.
    pub fn settings(&self) -> Result<Settings> {
        let settings: Settings = self.figment.extract().map_err(|e| Error::Config(e.to_string()))?;
        settings.validate()?;
        Ok(settings)
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub documents: DocumentSettings,
    pub index: IndexSettings,
    pub chunking: ChunkingSettings,
    pub cost: CostSettings,
    pub embedding: EmbeddingSettings,
    pub completion: CompletionSettings,
    pub openai: OpenAiSettings,
    pub retry: RetrySettings,
    pub qa: QaSettings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DocumentSettings {
    pub dir: String,
    /// Extensions without the leading dot, matched case-insensitively.
    pub extensions: Vec<String>,
}

impl Default for DocumentSettings {
    fn default() -> Self {
        Self { dir: "./documents".to_string(), extensions: vec!["txt".to_string()] }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct IndexSettings {
    pub path: String,
    pub k: usize,
    pub metric: SimilarityMetric,
}

impl Default for IndexSettings {
    fn default() -> Self {
        Self { path: "Documents.index".to_string(), k: 4, metric: SimilarityMetric::Cosine }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ChunkingSettings {
    /// Maximum chunk length in characters.
    pub chunk_size: usize,
    /// Characters shared by adjacent chunks; must be smaller than `chunk_size`.
    pub overlap: usize,
}

impl Default for ChunkingSettings {
    fn default() -> Self {
        Self { chunk_size: 1000, overlap: 200 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CostSettings {
    /// Largest projected cost (currency units) allowed to proceed.
    pub budget: f64,
    pub rate_per_thousand_tokens: f64,
    /// Directory holding `<family>.json` tokenizer files.
    pub tokenizer_dir: String,
    /// Explicit tokenizer file; bypasses the model-to-family lookup.
    pub tokenizer_file: Option<String>,
}

impl Default for CostSettings {
    fn default() -> Self {
        Self {
            budget: 1.0,
            rate_per_thousand_tokens: 0.0004,
            tokenizer_dir: "tokenizers".to_string(),
            tokenizer_file: None,
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProvider {
    #[default]
    OpenAi,
    Local,
    Hash,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EmbeddingSettings {
    pub provider: EmbeddingProvider,
    pub model: String,
    /// Inputs per embedding request.
    pub batch_size: usize,
    /// Embedding requests in flight at once during a build.
    pub concurrency: usize,
    pub timeout_secs: u64,
    /// Requested output dimensionality, for models that support shortening.
    pub dimensions: Option<usize>,
    /// Local model directory (`config.json`, `tokenizer.json`, weights).
    pub model_dir: Option<String>,
    /// Width of the hashing embedder.
    pub hash_dim: usize,
}

impl Default for EmbeddingSettings {
    fn default() -> Self {
        Self {
            provider: EmbeddingProvider::OpenAi,
            model: "text-embedding-ada-002".to_string(),
            batch_size: 512,
            concurrency: 4,
            timeout_secs: 60,
            dimensions: None,
            model_dir: None,
            hash_dim: 384,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CompletionSettings {
    pub model: String,
    pub temperature: f32,
    pub max_tokens: usize,
    pub timeout_secs: u64,
}

impl Default for CompletionSettings {
    fn default() -> Self {
        Self { model: "gpt-3.5-turbo".to_string(), temperature: 0.7, max_tokens: 256, timeout_secs: 120 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OpenAiSettings {
    pub base_url: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
}

impl Default for OpenAiSettings {
    fn default() -> Self {
        Self { base_url: "https://api.openai.com/v1".to_string(), api_key: None }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub base_delay_ms: u64,
    pub max_delay_ms: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self { max_attempts: 3, base_delay_ms: 500, max_delay_ms: 8_000 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct QaSettings {
    pub question: String,
}

impl Default for QaSettings {
    fn default() -> Self {
        Self { question: "Who is the main character?".to_string() }
    }
}

impl ChunkingSettings {
    pub fn validate(&self) -> Result<()> {
        if self.chunk_size == 0 {
            return Err(Error::Config("chunk_size must be greater than zero".into()));
        }
        if self.overlap >= self.chunk_size {
            return Err(Error::Config(format!(
                "chunk overlap ({}) must be smaller than chunk_size ({})",
                self.overlap, self.chunk_size
            )));
        }
        Ok(())
    }
}

impl Settings {
    pub fn validate(&self) -> Result<()> {
        self.chunking.validate()?;
        if self.documents.extensions.iter().all(|e| e.trim().trim_start_matches('.').is_empty()) {
            return Err(Error::Config("documents.extensions must name at least one extension".into()));
        }
        if self.index.k == 0 {
            return Err(Error::Config("index.k must be at least 1".into()));
        }
        if !(self.cost.budget >= 0.0) || !(self.cost.rate_per_thousand_tokens >= 0.0) {
            return Err(Error::Config("cost.budget and cost.rate_per_thousand_tokens must be non-negative".into()));
        }
        if self.embedding.batch_size == 0 || self.embedding.concurrency == 0 {
            return Err(Error::Config("embedding.batch_size and embedding.concurrency must be at least 1".into()));
        }
        if self.embedding.provider == EmbeddingProvider::Hash && self.embedding.hash_dim == 0 {
            return Err(Error::Config("embedding.hash_dim must be at least 1".into()));
        }
        Ok(())
    }

    /// API key for OpenAI-backed services; a missing key is a configuration error.
    pub fn require_api_key(&self) -> Result<&str> {
        match self.openai.api_key.as_deref().map(str::trim) {
            Some(key) if !key.is_empty() => Ok(key),
            _ => Err(Error::Config("OPENAI_API_KEY is not set".into())),
        }
    }

    pub fn documents_dir(&self) -> PathBuf {
        expand_path(&self.documents.dir)
    }

    pub fn index_path(&self) -> PathBuf {
        expand_path(&self.index.path)
    }
}

/// Expand a user-provided path string:
/// - Expands leading '~' to the user's home directory
/// - Expands ${VAR} and $VAR environment variables
/// - Returns a PathBuf without attempting to canonicalize
pub fn expand_path<S: AsRef<str>>(input: S) -> PathBuf {
    let s = input.as_ref();
    let expanded_env = shellexpand::env(s).unwrap_or(std::borrow::Cow::Borrowed(s));
    let expanded = shellexpand::tilde(&expanded_env);
    PathBuf::from(expanded.as_ref())
}
