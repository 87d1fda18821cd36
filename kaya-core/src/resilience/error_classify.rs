//! Failure classification for the retry policy and resilience kit.
//!
//! Every error surfaced by a worker, vendor API call, or subprocess is
//! reduced to one [`FailureCategory`] before the retry policy decides
//! whether and how to retry it.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::LazyLock;

static RATE_LIMIT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(rate.?limit|429|too many requests|quota)").unwrap());

static TIMEOUT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(timed out|timeout|deadline exceeded)").unwrap());

static NETWORK_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(connection reset|connection refused|dns|network|broken pipe|econnrefused)")
        .unwrap()
});

static SERVICE_ERROR_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(5\d\d|internal server error|service unavailable|bad gateway)").unwrap()
});

static AUTH_PATTERN: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(401|403|unauthorized|forbidden|invalid api key|authentication)").unwrap()
});

static INVALID_INPUT_PATTERN: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?i)(400|invalid request|validation error|bad request)").unwrap());

/// Category a failure is reduced to before the retry policy consults it.
///
/// `auth`, `invalid_input`, and `permanent` are never retried — see
/// [`FailureCategory::is_retryable`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    /// A generic, likely-transient failure with no more specific signal.
    Transient,
    /// Vendor API rate limiting (HTTP 429 or equivalent).
    RateLimit,
    /// Request exceeded its deadline.
    Timeout,
    /// Connection-level failure (DNS, refused, reset).
    Network,
    /// Vendor reported a 5xx / internal error.
    ServiceError,
    /// Credential or permission failure. Never retried.
    Auth,
    /// Malformed request the caller sent. Never retried.
    InvalidInput,
    /// Non-recoverable failure the caller has flagged as permanent.
    Permanent,
    /// A spawned subprocess (Runner/Gemini CLI) exceeded its wall-clock budget.
    SubprocessTimeout,
    /// Could not be classified against any known pattern.
    Unknown,
}

impl FailureCategory {
    /// Whether the retry policy should ever retry a failure of this category.
    pub fn is_retryable(self) -> bool {
        !matches!(self, Self::Auth | Self::InvalidInput | Self::Permanent)
    }

    /// Classify a free-text error message (vendor API bodies, subprocess
    /// stderr) into a category.
    pub fn classify(message: &str) -> Self {
        if AUTH_PATTERN.is_match(message) {
            Self::Auth
        } else if INVALID_INPUT_PATTERN.is_match(message) {
            Self::InvalidInput
        } else if RATE_LIMIT_PATTERN.is_match(message) {
            Self::RateLimit
        } else if TIMEOUT_PATTERN.is_match(message) {
            Self::Timeout
        } else if NETWORK_PATTERN.is_match(message) {
            Self::Network
        } else if SERVICE_ERROR_PATTERN.is_match(message) {
            Self::ServiceError
        } else {
            Self::Unknown
        }
    }

    /// Classify an HTTP status code, falling back to message classification
    /// when the status alone is ambiguous.
    pub fn classify_http(status: u16, message: &str) -> Self {
        match status {
            401 | 403 => Self::Auth,
            400 | 422 => Self::InvalidInput,
            429 => Self::RateLimit,
            408 => Self::Timeout,
            500..=599 => Self::ServiceError,
            _ => Self::classify(message),
        }
    }
}

impl std::fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Transient => "transient",
            Self::RateLimit => "rate_limit",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::ServiceError => "service_error",
            Self::Auth => "auth",
            Self::InvalidInput => "invalid_input",
            Self::Permanent => "permanent",
            Self::SubprocessTimeout => "subprocess_timeout",
            Self::Unknown => "unknown",
        };
        write!(f, "{s}")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_rate_limit() {
        assert_eq!(
            FailureCategory::classify("HTTP 429: Too Many Requests"),
            FailureCategory::RateLimit
        );
    }

    #[test]
    fn classifies_auth_as_non_retryable() {
        let cat = FailureCategory::classify("401 Unauthorized: invalid api key");
        assert_eq!(cat, FailureCategory::Auth);
        assert!(!cat.is_retryable());
    }

    #[test]
    fn classifies_network_failure() {
        assert_eq!(
            FailureCategory::classify("connection reset by peer"),
            FailureCategory::Network
        );
    }

    #[test]
    fn http_status_takes_priority_over_message() {
        assert_eq!(
            FailureCategory::classify_http(500, "ok"),
            FailureCategory::ServiceError
        );
    }

    #[test]
    fn unknown_is_retryable() {
        assert!(FailureCategory::Unknown.is_retryable());
    }
}
