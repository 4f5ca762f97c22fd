//! Bounded retry with capped exponential backoff for network-bound service calls.
//!
//! Only failures flagged as transient (rate limiting, 5xx, connection drops,
//! per-attempt timeouts) are retried. Ingestion, tokenization and persistence
//! never go through here.

use std::future::Future;
use std::time::Duration;

use thiserror::Error;
use tracing::warn;

use crate::config::RetrySettings;
use crate::error::Error;

/// Failure reported by a service adapter before any retry decision.
#[derive(Debug, Clone, Error)]
#[error("{message}")]
pub struct ServiceFailure {
    pub transient: bool,
    pub message: String,
}

impl ServiceFailure {
    pub fn transient(message: impl Into<String>) -> Self {
        Self { transient: true, message: message.into() }
    }

    pub fn permanent(message: impl Into<String>) -> Self {
        Self { transient: false, message: message.into() }
    }

    /// Classify a non-success HTTP response by its status code.
    pub fn for_status(status: u16, message: impl Into<String>) -> Self {
        Self { transient: is_retryable_status(status), message: message.into() }
    }
}

/// Rate limiting (429), request timeout (408) and server errors are worth retrying.
pub fn is_retryable_status(status: u16) -> bool {
    status == 429 || status == 408 || (500..600).contains(&status)
}

/// Last failure once retries are used up (or a permanent failure was seen).
#[derive(Debug, Clone)]
pub struct RetryExhausted {
    pub attempts: u32,
    pub failure: ServiceFailure,
}

impl RetryExhausted {
    pub fn into_embedding_error(self) -> Error {
        Error::EmbeddingService { attempts: self.attempts, message: self.failure.message }
    }

    pub fn into_language_model_error(self) -> Error {
        Error::LanguageModel { attempts: self.attempts, message: self.failure.message }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    /// Upper bound on a single attempt; elapsing counts as a transient failure.
    pub attempt_timeout: Option<Duration>,
}

impl RetryPolicy {
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: Duration::from_millis(settings.base_delay_ms),
            max_delay: Duration::from_millis(settings.max_delay_ms),
            attempt_timeout: None,
        }
    }

    pub fn with_attempt_timeout(mut self, timeout: Duration) -> Self {
        self.attempt_timeout = Some(timeout);
        self
    }

    /// Delay before retry number `attempt` (1-based): base * 2^(attempt-1), capped.
    pub fn backoff(&self, attempt: u32) -> Duration {
        let shift = attempt.saturating_sub(1).min(16);
        self.base_delay.saturating_mul(1u32 << shift).min(self.max_delay)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

/// Run `op` until it succeeds, fails permanently, or the attempt budget is spent.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, RetryExhausted>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, ServiceFailure>>,
{
    let max_attempts = policy.max_attempts.max(1);
    let mut attempt = 0u32;
    loop {
        attempt += 1;
        let outcome = match policy.attempt_timeout {
            Some(limit) => match tokio::time::timeout(limit, op()).await {
                Ok(result) => result,
                Err(_) => Err(ServiceFailure::transient(format!("{label} timed out after {limit:?}"))),
            },
            None => op().await,
        };
        match outcome {
            Ok(value) => return Ok(value),
            Err(failure) if failure.transient && attempt < max_attempts => {
                let delay = policy.backoff(attempt);
                warn!(call = label, attempt, ?delay, error = %failure, "transient service failure, retrying");
                tokio::time::sleep(delay).await;
            }
            Err(failure) => return Err(RetryExhausted { attempts: attempt, failure }),
        }
    }
}
