//! Offline embedding with an XLM-RoBERTa family model (e.g. BGE-M3) on candle.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Instant;

use async_trait::async_trait;
use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::xlm_roberta::{Config as XLMRobertaConfig, XLMRobertaModel};
use tokenizers::Tokenizer;
use tracing::{debug, info};

use docqa_core::retry::ServiceFailure;
use docqa_core::traits::Embedder;
use docqa_core::{Error, Result};

use crate::device::select_device;
use crate::pool::masked_mean_l2;
use crate::tokenize::tokenize_batch_on_device;

const MAX_LEN: usize = 256;
const PAD_ID: u32 = 1;

pub struct LocalEmbedder {
    model_id: String,
    model: XLMRobertaModel,
    tokenizer: Tokenizer,
    device: Device,
}

impl LocalEmbedder {
    /// Load `tokenizer.json`, `config.json` and `pytorch_model.bin` from `model_dir`.
    pub fn load(model_id: &str, model_dir: &Path) -> Result<Self> {
        let device = select_device();
        let model_err = |what: &str, e: &dyn std::fmt::Display| {
            Error::Config(format!("cannot load {} from {}: {}", what, model_dir.display(), e))
        };

        let tokenizer_path = model_dir.join("tokenizer.json");
        let tokenizer = Tokenizer::from_file(&tokenizer_path).map_err(|e| model_err("tokenizer", &e))?;

        let config_raw = std::fs::read_to_string(model_dir.join("config.json")).map_err(|e| model_err("config.json", &e))?;
        let config: XLMRobertaConfig = serde_json::from_str(&config_raw).map_err(|e| model_err("config.json", &e))?;

        let weights = candle_core::pickle::read_all(model_dir.join("pytorch_model.bin"))
            .map_err(|e| model_err("model weights", &e))?;
        let weights: HashMap<String, Tensor> = weights.into_iter().collect();
        let vb = VarBuilder::from_tensors(weights, DType::F32, &device);
        let model = XLMRobertaModel::new(&config, vb).map_err(|e| model_err("model", &e))?;

        info!(model = model_id, dir = %model_dir.display(), "local embedding model loaded");
        Ok(Self { model_id: model_id.to_string(), model, tokenizer, device })
    }

    fn forward(&self, texts: &[String]) -> candle_core::Result<Vec<Vec<f32>>> {
        let (input_ids, attention_mask) = tokenize_batch_on_device(&self.tokenizer, texts, MAX_LEN, PAD_ID, &self.device)?;
        let token_type_ids = input_ids.zeros_like()?;
        let hidden = self.model.forward(&input_ids, &attention_mask, &token_type_ids, None, None, None)?;
        masked_mean_l2(&hidden, &attention_mask)?.to_device(&Device::Cpu)?.to_vec2::<f32>()
    }
}

#[async_trait]
impl Embedder for LocalEmbedder {
    fn model_id(&self) -> &str {
        &self.model_id
    }

    async fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ServiceFailure> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let start = Instant::now();
        let vectors = self.forward(texts).map_err(|e| ServiceFailure::permanent(format!("local inference failed: {e}")))?;
        debug!(batch = texts.len(), elapsed_ms = start.elapsed().as_millis() as u64, "local batch embedded");
        Ok(vectors)
    }
}

/// Find the model directory: `embedding.model_dir` if set, else `models/<name>`.
pub fn resolve_model_dir(configured: Option<&str>, model_id: &str) -> Result<PathBuf> {
    if let Some(dir) = configured {
        let p = docqa_core::config::expand_path(dir);
        if p.exists() {
            return Ok(p);
        }
        return Err(Error::Config(format!("embedding.model_dir {} does not exist", p.display())));
    }
    let name = model_id.rsplit('/').next().unwrap_or(model_id);
    let fallback = Path::new("models").join(name);
    if fallback.exists() {
        return Ok(fallback);
    }
    Err(Error::Config(format!("could not locate a model directory for {model_id}")))
}
