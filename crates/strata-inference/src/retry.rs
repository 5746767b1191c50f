//! Batch-level retry for embedding requests.
//!
//! A failed batch is retried with exponential backoff plus random jitter.
//! Once retries are exhausted the error surfaces as `Error::Embedding`, which
//! aborts a cleanup run.

use std::time::Duration;

use rand::Rng;
use tracing::{debug, warn};

use strata_core::defaults::{EMBED_MAX_RETRIES, EMBED_RETRY_BASE_MS};
use strata_core::{EmbeddingBackend, Error, Result, Vector};

/// How often and how patiently a batch is retried.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries after the first attempt.
    pub max_retries: u32,
    /// Delay before the first retry; doubled for each further retry.
    pub base_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: EMBED_MAX_RETRIES,
            base_delay: Duration::from_millis(EMBED_RETRY_BASE_MS),
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay: Duration) -> Self {
        Self {
            max_retries,
            base_delay,
        }
    }

    /// Never retry.
    pub fn none() -> Self {
        Self::new(0, Duration::ZERO)
    }

    /// Backoff before retry number `attempt` (1-based), jitter included.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let exponent = attempt.saturating_sub(1).min(16);
        let backoff = self.base_delay.saturating_mul(1u32 << exponent);
        let jitter_cap = self.base_delay.as_millis() as u64 / 2;
        let jitter = if jitter_cap == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..=jitter_cap)
        };
        backoff + Duration::from_millis(jitter)
    }
}

/// Embed one batch, retrying external failures per `policy`.
///
/// Non-external errors (store, caller) are returned immediately.
pub async fn embed_with_retry(
    backend: &dyn EmbeddingBackend,
    texts: &[String],
    policy: &RetryPolicy,
) -> Result<Vec<Vector>> {
    let mut attempt = 0;
    loop {
        let outcome = backend.embed_texts(texts).await.and_then(|vectors| {
            if vectors.len() == texts.len() {
                Ok(vectors)
            } else {
                Err(Error::Embedding(format!(
                    "Expected {} embeddings, got {}",
                    texts.len(),
                    vectors.len()
                )))
            }
        });

        match outcome {
            Ok(vectors) => {
                if attempt > 0 {
                    debug!(
                        subsystem = "inference",
                        component = "retry",
                        attempt,
                        input_count = texts.len(),
                        "Embedding batch succeeded after retry"
                    );
                }
                return Ok(vectors);
            }
            Err(e) if !e.is_external() => return Err(e),
            Err(e) if attempt >= policy.max_retries => {
                return Err(Error::Embedding(format!(
                    "Embedding batch failed after {} attempt(s): {}",
                    attempt + 1,
                    e
                )));
            }
            Err(e) => {
                attempt += 1;
                let delay = policy.delay_for(attempt);
                warn!(
                    subsystem = "inference",
                    component = "retry",
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "Embedding batch failed, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}
