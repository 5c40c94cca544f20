// Copyright (c) 2025-2026 Adrian Robinson. Licensed under the AGPL-3.0.
// See LICENSE file in the project root for full license text.

//! Error taxonomy for the gateway.
//!
//! Every expected failure mode is a typed variant returned through `Result` —
//! budget exhaustion, throttling, and cancellation are normal runtime
//! conditions, not panics. [`GatewayError::is_retryable`] is the single
//! classification point the retry policy consults.

use std::time::Duration;
use thiserror::Error;

use crate::budget::OpClass;

/// Hard ceiling on a serialized value, enforced by the backend and checked
/// locally before a write consumes budget.
pub const MAX_VALUE_BYTES: usize = 4_000_000;

#[derive(Error, Debug)]
pub enum GatewayError {
    /// Request budget exhausted for this operation class. Recoverable by
    /// caller backoff; never retried internally (an immediate retry would
    /// trivially fail again).
    #[error("request budget exhausted for {class} operations, resets in {retry_after:?}")]
    BudgetExceeded {
        class: OpClass,
        retry_after: Duration,
    },

    /// The backend signaled rate-limiting on this specific call.
    #[error("backend throttled the request: {0}")]
    Throttled(String),

    /// Timeout, connection reset, or other transient backend failure.
    #[error("transient backend failure: {0}")]
    Transient(String),

    /// Serialized payload exceeds the backend's size ceiling.
    #[error("serialized payload is {size} bytes, limit is {MAX_VALUE_BYTES}")]
    PayloadTooLarge { size: usize },

    /// Key failed validation (empty component, too long, control characters).
    #[error("invalid key: {0}")]
    InvalidKey(String),

    /// The backend rejected the caller's credentials or permissions.
    #[error("unauthorized: {0}")]
    Unauthorized(String),

    /// All retry attempts were consumed; wraps the last underlying error.
    #[error("retries exhausted after {attempts} attempts: {source}")]
    RetryExhausted {
        attempts: u32,
        #[source]
        source: Box<GatewayError>,
    },

    /// The caller's cancellation token fired or the call deadline passed.
    #[error("operation cancelled")]
    Cancelled,

    /// Unclassified backend failure. Treated as permanent: a backend that
    /// wants a retry must return `Throttled` or `Transient` explicitly.
    #[error("backend error: {0}")]
    Backend(String),
}

impl GatewayError {
    /// Whether the retry policy may re-attempt after this error.
    ///
    /// Only backend-signaled throttling and transient faults qualify.
    /// `BudgetExceeded` is deliberately not retryable: the window has to
    /// roll before another attempt can succeed, and that is the caller's
    /// backoff decision.
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Throttled(_) | Self::Transient(_))
    }

    /// Short label for metrics/logging.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::Throttled(_) => "throttled",
            Self::Transient(_) => "transient",
            Self::PayloadTooLarge { .. } => "payload_too_large",
            Self::InvalidKey(_) => "invalid_key",
            Self::Unauthorized(_) => "unauthorized",
            Self::RetryExhausted { .. } => "retry_exhausted",
            Self::Cancelled => "cancelled",
            Self::Backend(_) => "backend",
        }
    }
}
