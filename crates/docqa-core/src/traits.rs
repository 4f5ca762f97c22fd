//! Seams to the external services the pipeline talks to.

use async_trait::async_trait;

use crate::error::Result;
use crate::retry::ServiceFailure;

/// Text-in, vector-out embedding service.
///
/// `embed_batch` returns one vector per input, in input order. The same
/// `model_id` must be used to build an index and to query it.
#[async_trait]
pub trait Embedder: Send + Sync {
    fn model_id(&self) -> &str;

    async fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ServiceFailure>;

    async fn embed(&self, text: &str) -> std::result::Result<Vec<f32>, ServiceFailure> {
        let mut vectors = self.embed_batch(&[text.to_string()]).await?;
        match vectors.pop() {
            Some(v) if vectors.is_empty() => Ok(v),
            _ => Err(ServiceFailure::permanent("embedding service returned a malformed batch for a single input")),
        }
    }
}

/// Prompt-in, text-out completion service.
#[async_trait]
pub trait LanguageModel: Send + Sync {
    fn model_id(&self) -> &str;

    async fn complete(&self, prompt: &str) -> std::result::Result<String, ServiceFailure>;
}

/// Tokenizer used only for cost estimation.
pub trait TokenCounter: Send + Sync {
    /// Identifier of the tokenizer family, e.g. `cl100k_base`.
    fn family(&self) -> &str;

    fn count_tokens(&self, text: &str) -> Result<usize>;
}
