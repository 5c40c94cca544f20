//! Resilience primitives around the remote-call boundary.
//!
//! - [`retry`]: exponential backoff with jitter, classification-aware,
//!   cancellation-safe. Every remote call the gateway makes goes through
//!   [`retry::run_with_retry`].

pub mod retry;
