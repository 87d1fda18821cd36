//! Kaya Core — the shared state and resilience layer behind the Kaya
//! voice/text orchestrator.
//!
//! This crate owns everything the orchestrator and its specialist workers
//! (Scribe, Critic, Runner, Medic, Gemini — implemented in `kaya-agents`)
//! depend on but never mutate directly:
//!
//! - [`hot_store`] — transient, TTL-expiring session/task/HITL/metrics state.
//! - [`cold_store`] — permanent, embedding-indexed pattern store.
//! - [`resilience`] — error classification, retries, circuit breakers, fallback.
//! - [`router`] + [`complexity`] — task-to-worker/model routing.
//! - [`worker`] — the uniform `WorkerRequest`/`WorkerResult` contract.
//! - [`rubric`] — the deterministic browser-validation pass/fail gate.
//! - [`hitl`] — the human escalation priority queue.
//! - [`metrics`] + [`cost_ledger`] — windowed observability over cost and outcomes.
//! - [`rate_limiter`] — per-vendor token buckets.
//! - [`events`] — the typed pub/sub event bus every subsystem emits onto.
//! - [`config`] — the startup policy document tying all of the above together.
//! - [`clock`] — shared time/ID primitives used throughout.

#![allow(clippy::uninlined_format_args)]

pub mod clock;
pub mod cold_store;
pub mod complexity;
pub mod config;
pub mod cost_ledger;
pub mod events;
pub mod hitl;
pub mod hot_store;
pub mod metrics;
pub mod rate_limiter;
pub mod resilience;
pub mod router;
pub mod rubric;
pub mod worker;

pub use clock::{day_bucket, hour_bucket, now, SessionId, TaskId};

pub use cold_store::{ColdStore, ColdStoreError, Collection, SearchHit, SharedColdStore};

pub use complexity::{estimate as estimate_complexity, Complexity, ComplexityMatch, ComplexityScore};

pub use config::{ConcurrencyConfig, ConfigError, CostConfig, KayaConfig, RateLimitConfig};

pub use cost_ledger::{CostEntry, CostLedger, SpendBy};

pub use events::{AgentOutcome, EventBus, EventHistory, KayaEvent, SharedEventBus};

pub use hitl::{Annotation, EscalationReason, HITLTask, HitlError, HitlQueue, Severity};

pub use hot_store::{HotStore, SessionRecord, SharedHotStore, StoreError, TaskRecord, TaskStatus};

pub use metrics::{DailyPoint, FeatureCompletion, MetricsAggregator, MetricsSummary};

pub use rate_limiter::RateLimiter;

pub use resilience::{
    retry, CircuitBreaker, CircuitState, DegradationLevel, DegradedResponse, FailureCategory,
    FallbackChain, FallbackTier, RetryOutcome, RetryPolicy, ToolHealth,
};

pub use router::{CostOverride, RouteDecision, RouteRule, Router, RoutingPolicy};

pub use rubric::{is_pass, RubricReason, ValidatorRecord};

pub use worker::{WorkerKind, WorkerRequest, WorkerResult};
