//! Transient-error classification and bounded retry with exponential backoff.
//!
//! Every external call site (page fetch, send, note sync, contact patch)
//! goes through [`with_retry`] with its own action name for log attribution.

use std::future::Future;
use std::time::Duration;

use rand::Rng;
use tracing::warn;

use courier_shared::{CourierError, Result};

/// HTTP statuses expected to resolve on retry.
const TRANSIENT_STATUS_CODES: &[u16] = &[408, 409, 425, 429, 500, 502, 503, 504];

/// Short error codes treated as transient, compared case-insensitively.
/// Covers the conventional socket-level spellings alongside our own.
const TRANSIENT_CODES: &[&str] = &[
    "etimedout",
    "econnreset",
    "econnaborted",
    "eai_again",
    "timeout",
    "connect",
];

/// Ceiling on a single backoff delay.
const MAX_DELAY_MS: u64 = 30_000;

/// Jitter added to each delay, sampled uniformly from `[0, JITTER_MS)`.
const JITTER_MS: u64 = 200;

/// Decide whether an error is worth retrying.
///
/// Status and code are checked first; the message substring match is a last
/// resort for upstreams that report transport failures as bare text.
pub fn is_transient(error: &CourierError) -> bool {
    if let Some(status) = error.status() {
        if TRANSIENT_STATUS_CODES.contains(&status) {
            return true;
        }
    }

    if let Some(code) = error.code() {
        let code = code.to_ascii_lowercase();
        if TRANSIENT_CODES.iter().any(|c| *c == code) {
            return true;
        }
    }

    let message = error.to_string().to_ascii_lowercase();
    message.contains("timeout") || message.contains("network") || message.contains("temporar")
}

/// Retry ceiling and backoff base for one call site.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Maximum retries after the initial attempt.
    pub max_retries: u32,
    /// Base delay in ms, doubled per attempt.
    pub base_delay_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_retries: 4,
            base_delay_ms: 500,
        }
    }
}

impl RetryPolicy {
    pub fn new(max_retries: u32, base_delay_ms: u64) -> Self {
        Self {
            max_retries,
            base_delay_ms,
        }
    }
}

/// Backoff delay before retrying attempt `attempt` (0-indexed):
/// `min(30000, base * 2^attempt + jitter)`.
pub fn backoff_delay(attempt: u32, base_delay_ms: u64, jitter_ms: u64) -> Duration {
    let exponential = base_delay_ms.saturating_mul(1u64 << attempt.min(20));
    Duration::from_millis(exponential.saturating_add(jitter_ms).min(MAX_DELAY_MS))
}

/// Run `op`, retrying transient failures up to the policy's ceiling.
///
/// Non-retryable errors and exhausted retries re-raise with `action`
/// prefixed onto the message, preserving the original status and code.
pub async fn with_retry<T, F, Fut>(action: &str, policy: &RetryPolicy, mut op: F) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T>>,
{
    let mut attempt: u32 = 0;

    loop {
        match op().await {
            Ok(value) => return Ok(value),
            Err(error) => {
                if !is_transient(&error) || attempt >= policy.max_retries {
                    return Err(error.with_action(action));
                }

                let jitter = rand::thread_rng().gen_range(0..JITTER_MS);
                let delay = backoff_delay(attempt, policy.base_delay_ms, jitter);
                attempt += 1;

                warn!(
                    action,
                    attempt,
                    max_retries = policy.max_retries,
                    delay_ms = delay.as_millis() as u64,
                    status = error.status(),
                    code = error.code(),
                    error = %error,
                    "transient failure, retrying"
                );

                tokio::time::sleep(delay).await;
            }
        }
    }
}
