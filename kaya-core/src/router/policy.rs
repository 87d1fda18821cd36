//! The routing policy document loaded at startup (spec.md §4.1).

use crate::complexity::ComplexityMatch;
use serde::{Deserialize, Serialize};

/// One ordered rule: first rule whose `task_type` and `complexity` both
/// match wins.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteRule {
    pub task_type: String,
    pub complexity: ComplexityMatch,
    pub worker: String,
    pub model: String,
    pub reason: String,
}

/// A path-glob cost override: when a task's path matches `path_glob`, its
/// per-feature cost cap becomes `max_cost_usd` instead of the $0.50 default.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CostOverride {
    pub path_glob: String,
    pub max_cost_usd: f64,
}

/// The routing policy: an ordered rule list plus a cost-override list.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RoutingPolicy {
    #[serde(default)]
    pub rules: Vec<RouteRule>,
    #[serde(default)]
    pub cost_overrides: Vec<CostOverride>,
}

impl RoutingPolicy {
    /// A reasonable built-in policy covering the five specialists, used
    /// when no policy file is configured.
    pub fn builtin() -> Self {
        Self {
            rules: vec![
                RouteRule {
                    task_type: "write_test".to_string(),
                    complexity: ComplexityMatch::Easy,
                    worker: "scribe".to_string(),
                    model: "gemini-flash".to_string(),
                    reason: "simple test generation uses the cheap model".to_string(),
                },
                RouteRule {
                    task_type: "write_test".to_string(),
                    complexity: ComplexityMatch::Hard,
                    worker: "scribe".to_string(),
                    model: "gemini-pro".to_string(),
                    reason: "complex scenarios (auth/payment/realtime) need the stronger model"
                        .to_string(),
                },
                RouteRule {
                    task_type: "pre_validate".to_string(),
                    complexity: ComplexityMatch::Any,
                    worker: "critic".to_string(),
                    model: "gemini-flash".to_string(),
                    reason: "static analysis does not need a strong model".to_string(),
                },
                RouteRule {
                    task_type: "execute_test".to_string(),
                    complexity: ComplexityMatch::Any,
                    worker: "runner".to_string(),
                    model: "none".to_string(),
                    reason: "execution is a subprocess, not a model call".to_string(),
                },
                RouteRule {
                    task_type: "fix_bug".to_string(),
                    complexity: ComplexityMatch::Easy,
                    worker: "medic".to_string(),
                    model: "gemini-flash".to_string(),
                    reason: "simple failures get a fast, cheap repair attempt".to_string(),
                },
                RouteRule {
                    task_type: "fix_bug".to_string(),
                    complexity: ComplexityMatch::Hard,
                    worker: "medic".to_string(),
                    model: "gemini-pro".to_string(),
                    reason: "hard failures need the stronger diagnostic model".to_string(),
                },
                RouteRule {
                    task_type: "validate".to_string(),
                    complexity: ComplexityMatch::Any,
                    worker: "gemini".to_string(),
                    model: "none".to_string(),
                    reason: "browser validation does not need a text model".to_string(),
                },
            ],
            cost_overrides: vec![CostOverride {
                path_glob: "tests/critical/*".to_string(),
                max_cost_usd: 2.00,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn builtin_policy_covers_every_task_type() {
        let policy = RoutingPolicy::builtin();
        let task_types: std::collections::HashSet<&str> =
            policy.rules.iter().map(|r| r.task_type.as_str()).collect();
        for expected in [
            "write_test",
            "pre_validate",
            "execute_test",
            "fix_bug",
            "validate",
        ] {
            assert!(task_types.contains(expected), "missing rule for {expected}");
        }
    }
}
