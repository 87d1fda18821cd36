//! Startup configuration — a TOML policy document containing the Router
//! rules, cost targets/overrides, per-worker retry policies,
//! circuit-breaker thresholds, rate limits, and concurrency knobs.
//! Missing keys fall back to the defaults stated throughout this crate
//! (spec.md §6).

use crate::router::RoutingPolicy;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub cooldown_secs: u64,
    /// Consecutive half-open successes needed to close the circuit again.
    #[serde(default = "CircuitBreakerConfig::default_success_threshold")]
    pub success_threshold: u32,
    /// Probe calls let through per half-open window before the circuit
    /// decides whether to close or reopen.
    #[serde(default = "CircuitBreakerConfig::default_half_open_max_calls")]
    pub half_open_max_calls: u32,
}

impl CircuitBreakerConfig {
    fn default_success_threshold() -> u32 {
        2
    }

    fn default_half_open_max_calls() -> u32 {
        3
    }
}

impl Default for CircuitBreakerConfig {
    fn default() -> Self {
        Self {
            failure_threshold: 5,
            cooldown_secs: 60,
            success_threshold: Self::default_success_threshold(),
            half_open_max_calls: Self::default_half_open_max_calls(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RateLimitConfig {
    pub default_rps: u32,
    #[serde(default)]
    pub per_vendor_rps: HashMap<String, u32>,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            default_rps: 10,
            per_vendor_rps: HashMap::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConcurrencyConfig {
    /// Max concurrently in-flight pipelines (spec.md §5).
    pub max_concurrent_tasks: usize,
    /// Subprocess pool size for Runner/Gemini (spec.md §5).
    pub process_pool_size: usize,
    /// Per-worker-type instance pool size (spec.md §5).
    pub worker_pool_size: usize,
}

impl Default for ConcurrencyConfig {
    fn default() -> Self {
        Self {
            max_concurrent_tasks: 10,
            process_pool_size: 5,
            worker_pool_size: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostConfig {
    pub max_cost_per_feature_usd: f64,
    pub session_cost_cap_usd: f64,
    pub session_cost_warn_usd: f64,
}

impl Default for CostConfig {
    fn default() -> Self {
        Self {
            max_cost_per_feature_usd: 0.50,
            session_cost_cap_usd: 5.00,
            session_cost_warn_usd: 4.00,
        }
    }
}

/// The full startup policy document.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct KayaConfig {
    #[serde(default)]
    pub routing: RoutingPolicy,
    #[serde(default)]
    pub cost: CostConfig,
    #[serde(default)]
    pub circuit_breaker: CircuitBreakerConfig,
    #[serde(default)]
    pub rate_limit: RateLimitConfig,
    #[serde(default)]
    pub concurrency: ConcurrencyConfig,
}

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config file {path}: {source}")]
    Parse {
        path: String,
        #[source]
        source: toml::de::Error,
    },
}

impl KayaConfig {
    /// Loads and parses a TOML policy document. Any key absent from the
    /// file keeps its default — only present keys override.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let text = std::fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_ref.display().to_string(),
            source,
        })?;
        toml::from_str(&text).map_err(|source| ConfigError::Parse {
            path: path_ref.display().to_string(),
            source,
        })
    }

    /// The built-in policy used when no config file is supplied.
    pub fn builtin() -> Self {
        Self {
            routing: RoutingPolicy::builtin(),
            ..Default::default()
        }
    }
}
