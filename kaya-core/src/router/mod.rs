//! Router — decides which worker and model handle a task.
//!
//! Reads an ordered `RoutingPolicy` at startup (rule list + cost-override
//! glob list), never returns an error, and falls back to routing the task
//! to the orchestrator itself with the cheapest model when nothing
//! matches — spec.md's "the Router never fails, it falls back" guarantee.
//! Generalized from the grounding repo's `ModelRouter`/`PreRoutingClassifier`
//! fixed model-tier ladder into this rule-list + override-list design.
//!
//! ```ignore
//! use kaya_core::router::{Router, RoutingPolicy};
//!
//! let router = Router::new(RoutingPolicy::default(), event_bus);
//! let decision = router.decide("error_fix", "fix the flaky login test", None, None);
//! ```

mod policy;

pub use policy::{CostOverride, RouteRule, RoutingPolicy};

use crate::complexity::{self, Complexity, ComplexityMatch};
use crate::events::{KayaEvent, SharedEventBus};
use chrono::Utc;
use lru::LruCache;
use serde::{Deserialize, Serialize};
use std::num::NonZeroUsize;
use std::sync::Mutex;

const DECISION_CACHE_SIZE: usize = 1000;
const DEFAULT_MAX_COST_USD: f64 = 0.50;
const CHEAPEST_MODEL: &str = "gemini-flash";
const ORCHESTRATOR_WORKER: &str = "orchestrator";

/// The outcome of [`Router::decide`]: which worker/model handle the task,
/// the per-feature cost cap that applies, and why this decision was made.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RouteDecision {
    pub worker: String,
    pub model: String,
    pub reason: String,
    pub max_cost_usd: f64,
    pub complexity: Complexity,
}

/// Hit/miss/size counters for the decision cache, exposed for metrics.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub size: usize,
}

type CacheKey = (String, String, Option<String>);

/// Routes tasks to a worker/model pair. Construction never fails; `decide`
/// never fails.
pub struct Router {
    policy: RoutingPolicy,
    cache: Mutex<LruCache<CacheKey, RouteDecision>>,
    stats: Mutex<CacheStats>,
    events: Option<SharedEventBus>,
}

impl Router {
    pub fn new(policy: RoutingPolicy, events: Option<SharedEventBus>) -> Self {
        Self {
            policy,
            cache: Mutex::new(LruCache::new(NonZeroUsize::new(DECISION_CACHE_SIZE).unwrap())),
            stats: Mutex::new(CacheStats::default()),
            events,
        }
    }

    /// Decide a worker/model for `task_type`/`description`, optionally
    /// scoped to a file `path`. Never returns an error: an unmatched task
    /// falls back to `(orchestrator, cheapest_model, default_cap)`.
    pub fn decide(
        &self,
        task_type: &str,
        description: &str,
        path: Option<&str>,
        estimated_steps: Option<u32>,
    ) -> RouteDecision {
        let normalized_description = normalize(description);
        let cache_key: CacheKey = (
            task_type.to_string(),
            normalized_description,
            path.map(|p| p.to_string()),
        );

        if let Some(cached) = self.cache.lock().unwrap().get(&cache_key) {
            self.stats.lock().unwrap().hits += 1;
            return cached.clone();
        }
        self.stats.lock().unwrap().misses += 1;

        let score = complexity::estimate(description, estimated_steps);
        let decision = self.resolve(task_type, score.verdict, path);

        {
            let mut cache = self.cache.lock().unwrap();
            cache.put(cache_key, decision.clone());
            self.stats.lock().unwrap().size = cache.len();
        }

        self.emit_routing_decision(task_type, &decision);
        decision
    }

    fn resolve(&self, task_type: &str, verdict: Complexity, path: Option<&str>) -> RouteDecision {
        let max_cost_usd = self.cost_cap_for(path);

        for rule in &self.policy.rules {
            if rule.task_type == task_type && rule.complexity.matches(verdict) {
                return RouteDecision {
                    worker: rule.worker.clone(),
                    model: rule.model.clone(),
                    reason: rule.reason.clone(),
                    max_cost_usd,
                    complexity: verdict,
                };
            }
        }

        RouteDecision {
            worker: ORCHESTRATOR_WORKER.to_string(),
            model: CHEAPEST_MODEL.to_string(),
            reason: "no routing rule matched, falling back to orchestrator".to_string(),
            max_cost_usd,
            complexity: verdict,
        }
    }

    fn cost_cap_for(&self, path: Option<&str>) -> f64 {
        let Some(path) = path else {
            return DEFAULT_MAX_COST_USD;
        };
        for override_rule in &self.policy.cost_overrides {
            if glob_match(&override_rule.path_glob, path) {
                return override_rule.max_cost_usd;
            }
        }
        DEFAULT_MAX_COST_USD
    }

    fn emit_routing_decision(&self, task_type: &str, decision: &RouteDecision) {
        let Some(events) = &self.events else {
            return;
        };
        let _ = events.publish(KayaEvent::RoutingDecision {
            task_type: task_type.to_string(),
            worker: decision.worker.clone(),
            model: decision.model.clone(),
            reason: decision.reason.clone(),
            timestamp: Utc::now(),
        });
    }

    pub fn cache_stats(&self) -> CacheStats {
        *self.stats.lock().unwrap()
    }
}

fn normalize(description: &str) -> String {
    description.trim().to_lowercase()
}

/// Minimal glob matcher supporting a single trailing `*` wildcard, which is
/// all `path_glob` entries in the routing policy need (`tests/e2e/*`).
fn glob_match(glob: &str, path: &str) -> bool {
    match glob.strip_suffix('*') {
        Some(prefix) => path.starts_with(prefix),
        None => glob == path,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_policy() -> RoutingPolicy {
        RoutingPolicy {
            rules: vec![
                RouteRule {
                    task_type: "error_fix".to_string(),
                    complexity: ComplexityMatch::Easy,
                    worker: "medic".to_string(),
                    model: "gemini-flash".to_string(),
                    reason: "cheap model handles simple fixes".to_string(),
                },
                RouteRule {
                    task_type: "error_fix".to_string(),
                    complexity: ComplexityMatch::Hard,
                    worker: "medic".to_string(),
                    model: "gemini-pro".to_string(),
                    reason: "complex fixes need the stronger model".to_string(),
                },
            ],
            cost_overrides: vec![CostOverride {
                path_glob: "tests/critical/*".to_string(),
                max_cost_usd: 2.00,
            }],
        }
    }

    #[test]
    fn easy_task_routes_to_cheap_model() {
        let router = Router::new(test_policy(), None);
        let decision = router.decide("error_fix", "fix a typo in the button label", None, None);
        assert_eq!(decision.model, "gemini-flash");
        assert_eq!(decision.worker, "medic");
    }

    #[test]
    fn hard_task_routes_to_strong_model() {
        let router = Router::new(test_policy(), None);
        let decision = router.decide("error_fix", "fix the stripe checkout payment oauth login flow", None, None);
        assert_eq!(decision.model, "gemini-pro");
    }

    #[test]
    fn unmatched_task_type_falls_back_to_orchestrator() {
        let router = Router::new(test_policy(), None);
        let decision = router.decide("architecture_review", "evaluate the module layout", None, None);
        assert_eq!(decision.worker, ORCHESTRATOR_WORKER);
        assert_eq!(decision.model, CHEAPEST_MODEL);
        assert_eq!(decision.max_cost_usd, DEFAULT_MAX_COST_USD);
    }

    #[test]
    fn cost_override_applies_on_glob_match() {
        let router = Router::new(test_policy(), None);
        let decision = router.decide(
            "error_fix",
            "fix a typo",
            Some("tests/critical/checkout_spec.rs"),
            None,
        );
        assert_eq!(decision.max_cost_usd, 2.00);
    }

    #[test]
    fn decision_cache_hits_on_repeat_query() {
        let router = Router::new(test_policy(), None);
        router.decide("error_fix", "fix a typo", None, None);
        router.decide("error_fix", "fix a typo", None, None);
        let stats = router.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
    }

    #[test]
    fn glob_matcher_handles_trailing_wildcard() {
        assert!(glob_match("tests/critical/*", "tests/critical/a.rs"));
        assert!(!glob_match("tests/critical/*", "tests/other/a.rs"));
        assert!(glob_match("exact/path.rs", "exact/path.rs"));
    }
}
