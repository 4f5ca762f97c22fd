use std::hash::{Hash, Hasher};

use async_trait::async_trait;
use twox_hash::XxHash64;

use docqa_core::retry::ServiceFailure;
use docqa_core::traits::Embedder;

/// Deterministic bag-of-words embedder: each lowercase word is hashed into one
/// bucket and the result is L2-normalized. No model, no network; texts that
/// share words land close together, which is enough for tests and dry runs.
pub struct HashEmbedder {
    model_id: String,
    dim: usize,
}

impl HashEmbedder {
    pub fn new(dim: usize) -> Self {
        Self { model_id: format!("hash:d{dim}"), dim }
    }

    pub fn embed_text(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dim];
        for token in text.split(|c: char| !c.is_alphanumeric()).filter(|t| !t.is_empty()) {
            let mut hasher = XxHash64::with_seed(0);
            token.to_lowercase().hash(&mut hasher);
            let h = hasher.finish();
            let idx = (h % self.dim as u64) as usize;
            v[idx] += 1.0 + ((h >> 32) as u32 as f32 / u32::MAX as f32) * 0.01;
        }
        let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            for x in &mut v {
                *x /= norm;
            }
        }
        v
    }
}

#[async_trait]
impl Embedder for HashEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, ServiceFailure> {
        Ok(texts.iter().map(|t| self.embed_text(t)).collect())
    }
}
