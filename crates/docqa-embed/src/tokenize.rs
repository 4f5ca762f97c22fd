//! Tokenizer loading, shared by the cost gate and the local embedding model.

use std::path::{Path, PathBuf};

use candle_core::{Device, Tensor};
use tokenizers::Tokenizer;
use tracing::{info, warn};

use docqa_core::config::{expand_path, EmbeddingProvider, Settings};
use docqa_core::traits::TokenCounter;
use docqa_core::{Error, Result};

/// Tokenizer family used by OpenAI embedding models that bill per token.
pub const CL100K_BASE: &str = "cl100k_base";

/// Tokenizer family for a hosted embedding model, if known.
pub fn tokenizer_family(model: &str) -> Option<&'static str> {
    match model {
        "text-embedding-ada-002" | "text-embedding-3-small" | "text-embedding-3-large" => Some(CL100K_BASE),
        _ => None,
    }
}

/// Counts tokens with a Hugging Face `tokenizer.json`.
pub struct HfTokenCounter {
    family: String,
    tokenizer: Tokenizer,
}

impl HfTokenCounter {
    pub fn from_file(family: impl Into<String>, path: &Path) -> Result<Self> {
        let mut tokenizer = Tokenizer::from_file(path)
            .map_err(|e| Error::Tokenization(format!("cannot load tokenizer {}: {}", path.display(), e)))?;
        // Model files often ship a max_length cap; costing must see every token.
        tokenizer
            .with_truncation(None)
            .map_err(|e| Error::Tokenization(format!("cannot disable truncation for {}: {}", path.display(), e)))?;
        tokenizer.with_padding(None);
        Ok(Self { family: family.into(), tokenizer })
    }

    /// Pick the tokenizer matching the configured embedding model.
    ///
    /// `cost.tokenizer_file` wins when set. A local model is measured with its
    /// own `tokenizer.json`. Hosted models map to `<cost.tokenizer_dir>/<family>.json`;
    /// an unknown model falls back to `cl100k_base` with a warning because the
    /// estimate may then be off.
    pub fn for_settings(settings: &Settings) -> Result<Self> {
        let (family, path) = resolve_tokenizer(settings);
        info!(family = %family, path = %path.display(), model = %settings.embedding.model, "loading tokenizer for cost estimate");
        Self::from_file(family, &path)
    }
}

fn resolve_tokenizer(settings: &Settings) -> (String, PathBuf) {
    if let Some(file) = &settings.cost.tokenizer_file {
        let path = expand_path(file);
        let family = path.file_stem().map(|s| s.to_string_lossy().into_owned()).unwrap_or_else(|| "custom".to_string());
        return (family, path);
    }
    if settings.embedding.provider == EmbeddingProvider::Local {
        if let Some(dir) = &settings.embedding.model_dir {
            return (settings.embedding.model.clone(), expand_path(dir).join("tokenizer.json"));
        }
    }
    let family = match tokenizer_family(&settings.embedding.model) {
        Some(family) => family,
        None => {
            warn!(
                model = %settings.embedding.model,
                "no tokenizer known for embedding model, estimating with {CL100K_BASE}; the cost estimate may be inaccurate"
            );
            CL100K_BASE
        }
    };
    (family.to_string(), expand_path(&settings.cost.tokenizer_dir).join(format!("{family}.json")))
}

impl TokenCounter for HfTokenCounter {
    fn family(&self) -> &str {
        &self.family
    }

    fn count_tokens(&self, text: &str) -> Result<usize> {
        let enc = self.tokenizer.encode(text, false).map_err(|e| Error::Tokenization(e.to_string()))?;
        Ok(enc.get_ids().len())
    }
}

/// Encode `texts` as `[B, T]` id and mask tensors, truncated to `max_len` and
/// right-padded with `pad_id` to the longest sequence in the batch.
pub fn tokenize_batch_on_device(
    tokenizer: &Tokenizer,
    texts: &[String],
    max_len: usize,
    pad_id: u32,
    device: &Device,
) -> candle_core::Result<(Tensor, Tensor)> {
    let mut rows = Vec::with_capacity(texts.len());
    for text in texts {
        let enc = tokenizer
            .encode(text.as_str(), true)
            .map_err(|e| candle_core::Error::Msg(format!("tokenization failed: {e}")))?;
        let mut ids = enc.get_ids().to_vec();
        let mut mask = enc.get_attention_mask().to_vec();
        ids.truncate(max_len);
        mask.truncate(max_len);
        rows.push((ids, mask));
    }
    let width = rows.iter().map(|(ids, _)| ids.len()).max().unwrap_or(0).max(1);

    let mut all_ids = Vec::with_capacity(rows.len() * width);
    let mut all_mask = Vec::with_capacity(rows.len() * width);
    for (mut ids, mut mask) in rows {
        ids.resize(width, pad_id);
        mask.resize(width, 0);
        all_ids.extend(ids);
        all_mask.extend(mask);
    }
    let input_ids = Tensor::from_vec(all_ids, (texts.len(), width), device)?;
    let attention_mask = Tensor::from_vec(all_mask, (texts.len(), width), device)?;
    Ok((input_ids, attention_mask))
}
