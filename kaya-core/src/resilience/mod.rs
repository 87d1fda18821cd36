//! Resilience kit — circuit breakers, retry policy, failure classification,
//! and graceful degradation, shared by every worker and the Router.
//!
//! ```text
//! worker call fails
//!   │
//!   ▼
//! error_classify::FailureCategory::classify(..)
//!   │
//!   ▼
//! retry::RetryPolicy::should_retry(category, attempt) ──▶ retry with backoff
//!   │
//!   ▼ (exhausted or non-retryable)
//! circuit_breaker::CircuitBreaker::record_failure(dependency)
//!   │
//!   ▼ (threshold tripped)
//! fallback::FallbackChain / DegradedResponse / escalate to HITL
//! ```

pub mod circuit_breaker;
pub mod error_classify;
pub mod fallback;
pub mod retry;

pub use circuit_breaker::{CircuitBreaker, CircuitState};
pub use error_classify::FailureCategory;
pub use fallback::{DegradationLevel, DegradedResponse, FallbackChain, FallbackTier, ToolHealth};
pub use retry::{retry, RetryOutcome, RetryPolicy};
