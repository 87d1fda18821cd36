//! `RuntimeContext` — every shared dependency the CLI, pipelines, and
//! workers need, bundled once at startup and passed down explicitly
//! (spec.md §9's "no global singletons" redesign flag: nothing here is a
//! `static`/`lazy_static`, everything is constructed in `main` and threaded
//! through function arguments).

use kaya_core::config::KayaConfig;
use kaya_core::cost_ledger::CostLedger;
use kaya_core::events::SharedEventBus;
use kaya_core::hitl::HitlQueue;
use kaya_core::hot_store::{HotStore, SharedHotStore};
use kaya_core::metrics::MetricsAggregator;
use kaya_core::rate_limiter::RateLimiter;
use kaya_core::resilience::CircuitBreaker;
use kaya_core::router::Router;
use kaya_core::{ColdStore, SharedColdStore};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

use crate::process_pool::{ProcessPool, RealProcessLauncher};
use crate::workers::SharedCircuitBreaker;

/// Bundles the Hot Store, Cold Store, Router, Cost Ledger, Rate Limiter,
/// Event Bus, HITL Queue, Metrics Aggregator, the worker circuit breaker
/// registry, and the subprocess pool. Constructed once in `main`, cloned
/// cheaply (every field is an `Arc`) into each pipeline invocation.
#[derive(Clone)]
pub struct RuntimeContext {
    pub config: Arc<KayaConfig>,
    pub hot_store: SharedHotStore,
    pub cold_store: SharedColdStore,
    pub router: Arc<Router>,
    pub cost_ledger: Arc<CostLedger>,
    pub rate_limiter: Arc<RateLimiter>,
    pub events: SharedEventBus,
    pub hitl_queue: Arc<HitlQueue>,
    pub metrics: Arc<MetricsAggregator>,
    pub circuit_breaker: Arc<SharedCircuitBreaker>,
    pub process_pool: Arc<ProcessPool>,
    pub cancel: CancellationToken,
}

impl RuntimeContext {
    /// Builds every dependency fresh from `config`, wiring the event bus's
    /// console + NDJSON sinks per spec.md §6. Used by `main` at startup
    /// and by integration tests that want the real wiring end to end.
    pub fn new(config: KayaConfig, events: SharedEventBus) -> Self {
        let hot_store = HotStore::new().shared();
        let cold_store = ColdStore::in_memory().shared();
        let router = Arc::new(Router::new(config.routing.clone(), Some(events.clone())));
        let cost_ledger = CostLedger::new(hot_store.clone());
        let rate_limiter = Arc::new(RateLimiter::new(
            config.rate_limit.default_rps,
            config.rate_limit.per_vendor_rps.clone(),
        ));
        let hitl_queue = HitlQueue::new(hot_store.clone(), cold_store.clone()).shared();
        let metrics = Arc::new(MetricsAggregator::new(hot_store.clone(), cost_ledger.clone()));
        let circuit_breaker = Arc::new(SharedCircuitBreaker::new(CircuitBreaker::with_half_open_policy(
            config.circuit_breaker.failure_threshold,
            config.circuit_breaker.cooldown_secs,
            config.circuit_breaker.success_threshold,
            config.circuit_breaker.half_open_max_calls,
        )));
        let process_pool = Arc::new(ProcessPool::new(
            Arc::new(RealProcessLauncher),
            config.concurrency.process_pool_size,
        ));

        Self {
            config: Arc::new(config),
            hot_store,
            cold_store,
            router,
            cost_ledger,
            rate_limiter,
            events,
            hitl_queue,
            metrics,
            circuit_breaker,
            process_pool,
            cancel: CancellationToken::new(),
        }
    }

    pub fn shutdown_requested(&self) -> bool {
        self.cancel.is_cancelled()
    }
}
