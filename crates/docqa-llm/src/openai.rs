use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use docqa_core::config::CompletionSettings;
use docqa_core::retry::ServiceFailure;
use docqa_core::traits::LanguageModel;
use docqa_core::{Error, Result};

/// Chat-completions client for OpenAI-compatible endpoints.
pub struct OpenAiCompletion {
    client: Client,
    endpoint: String,
    model: String,
    temperature: f32,
    max_tokens: usize,
}

impl OpenAiCompletion {
    pub fn new(api_key: &str, base_url: &str, settings: &CompletionSettings) -> Result<Self> {
        if settings.model.trim().is_empty() {
            return Err(Error::Config("completion.model is empty".into()));
        }
        let mut headers = HeaderMap::new();
        let auth = format!("Bearer {}", api_key.trim());
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&auth).map_err(|_| Error::Config("invalid OpenAI API key".into()))?,
        );
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        let client = Client::builder()
            .timeout(Duration::from_secs(settings.timeout_secs))
            .default_headers(headers)
            .build()
            .map_err(|e| Error::Config(format!("failed to build completion HTTP client: {e}")))?;
        Ok(Self {
            client,
            endpoint: format!("{}/chat/completions", base_url.trim_end_matches('/')),
            model: settings.model.clone(),
            temperature: settings.temperature,
            max_tokens: settings.max_tokens,
        })
    }
}

#[async_trait]
impl LanguageModel for OpenAiCompletion {
    fn model_id(&self) -> &str {
        &self.model
    }

    async fn complete(&self, prompt: &str) -> std::result::Result<String, ServiceFailure> {
        let body = ChatRequest {
            model: &self.model,
            temperature: self.temperature,
            max_tokens: self.max_tokens,
            messages: vec![ChatMessage { role: "user", content: prompt }],
        };
        let resp = self.client.post(&self.endpoint).json(&body).send().await.map_err(|e| classify_transport(&e))?;

        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_else(|_| "<body unavailable>".to_string());
            let message = format!("completion service returned {status}: {text}");
            return Err(ServiceFailure::for_status(status.as_u16(), message));
        }
        let parsed: ChatResponse = resp
            .json()
            .await
            .map_err(|e| ServiceFailure::transient(format!("failed to parse completion response: {e}")))?;
        debug!(model = %self.model, "completion received");
        first_answer(parsed)
    }
}

/// Same transient set as the embeddings client: timeouts, refused connections, broken bodies.
fn classify_transport(err: &reqwest::Error) -> ServiceFailure {
    let message = format!("completion request failed: {err}");
    if err.is_timeout() || err.is_connect() || err.is_request() || err.is_body() {
        ServiceFailure::transient(message)
    } else {
        ServiceFailure::permanent(message)
    }
}

fn first_answer(response: ChatResponse) -> std::result::Result<String, ServiceFailure> {
    response
        .choices
        .into_iter()
        .find_map(|choice| {
            let text = choice.message.content?.trim().to_string();
            (!text.is_empty()).then_some(text)
        })
        .ok_or_else(|| ServiceFailure::permanent("completion response has no text content"))
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    temperature: f32,
    max_tokens: usize,
    messages: Vec<ChatMessage<'a>>,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: AssistantMessage,
}

#[derive(Debug, Deserialize)]
struct AssistantMessage {
    content: Option<String>,
}
