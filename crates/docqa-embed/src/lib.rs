//! Embedding service implementations and the tokenizer used by the cost gate.

use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use docqa_core::config::{EmbeddingProvider, Settings};
use docqa_core::traits::Embedder;
use docqa_core::Result;

mod device;
mod hash;
mod local;
mod openai;
mod pool;
pub mod tokenize;

pub use device::select_device;
pub use hash::HashEmbedder;
pub use local::{resolve_model_dir, LocalEmbedder};
pub use openai::OpenAiEmbedder;
pub use pool::masked_mean_l2;
pub use tokenize::HfTokenCounter;

/// Build the embedder selected by `embedding.provider`.
pub fn embedder_from_settings(settings: &Settings) -> Result<Arc<dyn Embedder>> {
    let cfg = &settings.embedding;
    let embedder: Arc<dyn Embedder> = match cfg.provider {
        EmbeddingProvider::OpenAi => Arc::new(OpenAiEmbedder::new(
            settings.require_api_key()?,
            &settings.openai.base_url,
            &cfg.model,
            cfg.dimensions,
            Duration::from_secs(cfg.timeout_secs),
        )?),
        EmbeddingProvider::Local => {
            let dir = resolve_model_dir(cfg.model_dir.as_deref(), &cfg.model)?;
            Arc::new(LocalEmbedder::load(&cfg.model, &dir)?)
        }
        EmbeddingProvider::Hash => Arc::new(HashEmbedder::new(cfg.hash_dim)),
    };
    info!(provider = ?cfg.provider, model = embedder.model_id(), "embedder ready");
    Ok(embedder)
}
