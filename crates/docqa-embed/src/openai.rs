//! OpenAI-compatible `/embeddings` client.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use docqa_core::retry::ServiceFailure;
use docqa_core::traits::Embedder;
use docqa_core::{Error, Result};

/// One request per `embed_batch` call; retries are left to the caller.
#[derive(Clone)]
pub struct OpenAiEmbedder {
    client: Client,
    endpoint: String,
    model: String,
    dimensions: Option<usize>,
}

impl OpenAiEmbedder {
    pub fn new(api_key: &str, base_url: &str, model: &str, dimensions: Option<usize>, timeout: Duration) -> Result<Self> {
        if model.trim().is_empty() {
            return Err(Error::Config("embedding.model is empty".into()));
        }
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|_| Error::Config("invalid OpenAI API key".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(timeout)
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to build embeddings HTTP client: {e}")))?;
        let endpoint = format!("{}/embeddings", base_url.trim_end_matches('/'));
        Ok(Self { client, endpoint, model: model.to_string(), dimensions })
    }
}

#[async_trait]
impl Embedder for OpenAiEmbedder {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn embed_batch(&self, texts: &[String]) -> std::result::Result<Vec<Vec<f32>>, ServiceFailure> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        let request = EmbeddingRequest { model: &self.model, input: texts, dimensions: self.dimensions };
        let resp = self.client.post(&self.endpoint).json(&request).send().await.map_err(|e| classify_transport(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let body = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
            let message = format!("embeddings request failed ({status}): {body}");
            return Err(ServiceFailure::for_status(status.as_u16(), message));
        }
        let parsed: EmbeddingResponse = resp
            .json()
            .await
            .map_err(|e| ServiceFailure::transient(format!("failed to parse embeddings response: {e}")))?;
        debug!(batch = texts.len(), model = %self.model, "embeddings received");
        into_ordered_vectors(parsed, texts.len())
    }
}

/// Timeouts, refused connections and broken bodies are transient.
pub(crate) fn classify_transport(err: &reqwest::Error) -> ServiceFailure {
    let message = format!("request failed: {err}");
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        ServiceFailure::transient(message)
    } else {
        ServiceFailure::permanent(message)
    }
}

/// Entries are matched to inputs by the `index` the service echoes back, not by arrival order.
fn into_ordered_vectors(response: EmbeddingResponse, expected: usize) -> std::result::Result<Vec<Vec<f32>>, ServiceFailure> {
    let mut slots: Vec<Option<Vec<f32>>> = vec![None; expected];
    for entry in response.data {
        let Some(slot) = slots.get_mut(entry.index) else {
            return Err(ServiceFailure::permanent(format!(
                "embedding index {} out of range for {} inputs",
                entry.index, expected
            )));
        };
        if slot.is_some() {
            return Err(ServiceFailure::permanent(format!("duplicate embedding for input {}", entry.index)));
        }
        *slot = Some(entry.embedding);
    }
    slots
        .into_iter()
        .enumerate()
        .map(|(i, slot)| slot.ok_or_else(|| ServiceFailure::permanent(format!("no embedding returned for input {i}"))))
        .collect()
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
    index: usize,
}
