use std::path::PathBuf;

use thiserror::Error;

/// Failure taxonomy shared by every stage of the pipeline.
///
/// An over-budget cost estimate is not represented here: it is a normal
/// terminal outcome of the pipeline, not an error.
#[derive(Debug, Error)]
pub enum Error {
    #[error("cannot ingest documents from {path}: {reason}")]
    Ingest { path: PathBuf, reason: String },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("tokenization failed: {0}")]
    Tokenization(String),

    #[error("embedding service failed after {attempts} attempt(s): {message}")]
    EmbeddingService { attempts: u32, message: String },

    #[error("index persistence failed at {path}: {reason}")]
    Persistence { path: PathBuf, reason: String },

    #[error("embedding dimension mismatch: index expects {expected}, got {actual}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("language model failed after {attempts} attempt(s): {message}")]
    LanguageModel { attempts: u32, message: String },
}

impl Error {
    pub fn ingest(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Ingest { path: path.into(), reason: reason.to_string() }
    }

    pub fn persistence(path: impl Into<PathBuf>, reason: impl ToString) -> Self {
        Self::Persistence { path: path.into(), reason: reason.to_string() }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
