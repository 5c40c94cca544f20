// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Retry logic with exponential backoff and jitter.
//!
//! Transient backend failures (throttling, timeouts) are absorbed here
//! without caller involvement; permanent errors bypass retry entirely and
//! surface on the first attempt. Classification comes from
//! [`GatewayError::is_retryable`].
//!
//! # Example
//!
//! ```
//! use datastore_gateway::RetryConfig;
//! use std::time::Duration;
//!
//! let config = RetryConfig::default();
//! assert_eq!(config.max_attempts, 3);
//! assert_eq!(config.base_delay, Duration::from_millis(500));
//!
//! // Backoff doubles per attempt, capped
//! assert_eq!(config.backoff_delay(1), Duration::from_millis(500));
//! assert_eq!(config.backoff_delay(2), Duration::from_secs(1));
//! ```

use std::future::Future;
use std::time::{Duration, Instant};

use rand::Rng;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::error::GatewayError;

/// Configuration for remote-call retry behavior.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Total attempts, including the first (not just re-tries).
    pub max_attempts: u32,
    /// Delay before the second attempt; doubles each attempt after.
    pub base_delay: Duration,
    /// Backoff ceiling.
    pub max_delay: Duration,
    /// Fractional uniform jitter applied to each delay (0.2 = ±20%).
    pub jitter: f64,
}

impl RetryConfig {
    /// ±20% keeps concurrent callers from retrying in lockstep.
    pub const DEFAULT_JITTER: f64 = 0.2;

    /// Fast retry for tests (minimal delays)
    #[cfg(test)]
    pub fn test() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(1),
            max_delay: Duration::from_millis(10),
            jitter: 0.0,
        }
    }

    /// Deterministic backoff before attempt `failed_attempts + 1`, prior to
    /// jitter: `base_delay * 2^(failed_attempts - 1)`, capped at `max_delay`.
    #[must_use]
    pub fn backoff_delay(&self, failed_attempts: u32) -> Duration {
        let exp = failed_attempts.saturating_sub(1).min(31);
        let factor = 2u64.saturating_pow(exp);
        self.base_delay
            .saturating_mul(factor.min(u32::MAX as u64) as u32)
            .min(self.max_delay)
    }

    fn jittered(&self, delay: Duration) -> Duration {
        if self.jitter <= 0.0 {
            return delay;
        }
        let spread = rand::thread_rng().gen_range(-self.jitter..=self.jitter);
        delay.mul_f64(1.0 + spread)
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(5),
            jitter: Self::DEFAULT_JITTER,
        }
    }
}

/// Result of a retried operation, with the attempt count for metrics.
/// `attempts` is accurate on both paths: a success after two transient
/// failures reports 3.
#[derive(Debug)]
pub struct RetryOutcome<T> {
    pub result: Result<T, GatewayError>,
    pub attempts: u32,
}

/// Run `operation` under the retry policy.
///
/// - Retryable errors back off exponentially (with jitter) and re-attempt,
///   up to `config.max_attempts` total; exhaustion yields
///   [`GatewayError::RetryExhausted`] wrapping the last error.
/// - Non-retryable errors return immediately, unwrapped.
/// - `cancel` and `deadline` are honored before every attempt and during
///   every backoff sleep; either yields [`GatewayError::Cancelled`].
pub async fn run_with_retry<F, Fut, T>(
    operation_name: &str,
    config: &RetryConfig,
    cancel: Option<&CancellationToken>,
    deadline: Option<Instant>,
    mut operation: F,
) -> RetryOutcome<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, GatewayError>>,
{
    let mut attempts = 0u32;

    loop {
        if is_cancelled(cancel) || past_deadline(deadline) {
            return RetryOutcome {
                result: Err(GatewayError::Cancelled),
                attempts,
            };
        }

        attempts += 1;
        match operation().await {
            Ok(value) => {
                if attempts > 1 {
                    info!(
                        op = operation_name,
                        attempts, "Operation succeeded after retries"
                    );
                }
                return RetryOutcome {
                    result: Ok(value),
                    attempts,
                };
            }
            Err(err) if !err.is_retryable() => {
                debug!(op = operation_name, error = %err, "Permanent failure, not retrying");
                return RetryOutcome {
                    result: Err(err),
                    attempts,
                };
            }
            Err(err) => {
                if attempts >= config.max_attempts {
                    warn!(
                        op = operation_name,
                        attempts,
                        error = %err,
                        "Retries exhausted"
                    );
                    return RetryOutcome {
                        result: Err(GatewayError::RetryExhausted {
                            attempts,
                            source: Box::new(err),
                        }),
                        attempts,
                    };
                }

                let delay = config.jittered(config.backoff_delay(attempts));
                warn!(
                    op = operation_name,
                    attempt = attempts,
                    max = config.max_attempts,
                    error = %err,
                    ?delay,
                    "Transient failure, retrying"
                );

                if !backoff_sleep(delay, cancel, deadline).await {
                    return RetryOutcome {
                        result: Err(GatewayError::Cancelled),
                        attempts,
                    };
                }
            }
        }
    }
}

fn is_cancelled(cancel: Option<&CancellationToken>) -> bool {
    cancel.is_some_and(CancellationToken::is_cancelled)
}

fn past_deadline(deadline: Option<Instant>) -> bool {
    deadline.is_some_and(|d| Instant::now() >= d)
}

/// Sleep for `delay`, abandoning early on cancellation. Returns `false` when
/// the sleep was cut short (or the deadline would pass during it).
async fn backoff_sleep(
    delay: Duration,
    cancel: Option<&CancellationToken>,
    deadline: Option<Instant>,
) -> bool {
    if let Some(d) = deadline {
        // No point sleeping through the caller's deadline
        if Instant::now() + delay >= d {
            return false;
        }
    }

    match cancel {
        Some(token) => {
            tokio::select! {
                _ = tokio::time::sleep(delay) => true,
                _ = token.cancelled() => false,
            }
        }
        None => {
            tokio::time::sleep(delay).await;
            true
        }
    }
}
