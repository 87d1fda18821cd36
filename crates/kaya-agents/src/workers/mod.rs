//! The five specialists (Scribe, Critic, Runner, Medic, Gemini) behind one
//! `Worker` trait, plus `call_with_policy`, which composes the trait's raw
//! `execute` with retry + circuit breaker explicitly at the call site
//! rather than through a decorator macro (spec.md §9's "call-with-policy"
//! redesign flag). Grounded on the grounding repo's `agents::{coder,
//! reviewer, manager}` shape — each specialist owns its own prompt/process
//! logic behind the same trait the orchestrator calls through.

pub mod critic;
pub mod gemini;
pub mod medic;
pub mod rubric_check;
pub mod runner;
pub mod scribe;

pub use critic::CriticWorker;
pub use gemini::GeminiWorker;
pub use medic::MedicWorker;
pub use runner::RunnerWorker;
pub use scribe::ScribeWorker;

use async_trait::async_trait;
use kaya_core::events::{AgentOutcome, KayaEvent, SharedEventBus};
use kaya_core::resilience::{retry, CircuitBreaker, FailureCategory, RetryPolicy};
use kaya_core::worker::{WorkerRequest, WorkerResult};
use std::sync::Mutex;
use std::time::Instant;

/// Circuit breaker state is mutated on every call (`record_success`/
/// `record_failure` take `&mut self`), but it's shared across every
/// concurrent pipeline invocation — a `Mutex` rather than a per-call clone
/// keeps the consecutive-failure count meaningful across callers.
pub type SharedCircuitBreaker = Mutex<CircuitBreaker>;

/// A single specialist's raw execution, one attempt, never throwing across
/// the boundary (spec.md §4.3): a failure becomes `ok=false` with a
/// [`FailureCategory`], not a propagated error.
#[async_trait]
pub trait Worker: Send + Sync {
    /// Lowercase worker name used in events, metrics, and circuit breaker
    /// keys (`"scribe"`, `"critic"`, `"runner"`, `"medic"`, `"gemini"`).
    fn name(&self) -> &'static str;

    async fn execute(&self, request: &WorkerRequest) -> WorkerResult;
}

/// Runs `worker` against `request` through its retry policy and circuit
/// breaker, emitting `agent_started`/`agent_completed` around the whole
/// attempt sequence. `model` is the model name the Router already chose
/// for this call, recorded on `agent_started` only (workers don't pick
/// their own model).
pub async fn call_with_policy(
    worker: &dyn Worker,
    request: WorkerRequest,
    model: &str,
    retry_policy: &RetryPolicy,
    circuit_breaker: &SharedCircuitBreaker,
    events: Option<&SharedEventBus>,
) -> WorkerResult {
    let dependency = worker.name();

    if !circuit_breaker.lock().unwrap().is_available(dependency) {
        return WorkerResult::failure(
            format!("circuit breaker open for {dependency}"),
            FailureCategory::Unknown,
            0.0,
            0,
        );
    }

    emit(events, KayaEvent::AgentStarted {
        task_id: request.task_id,
        worker: dependency.to_string(),
        model: model.to_string(),
        timestamp: kaya_core::clock::now(),
    });

    let started = Instant::now();

    let outcome = retry(
        retry_policy,
        |failed: &WorkerResult| failed.category.unwrap_or(FailureCategory::Unknown),
        |attempt| {
            let request = request.clone();
            async move {
                if attempt > 1 {
                    emit(events, KayaEvent::RetryAttempted {
                        task_id: Some(request.task_id),
                        worker: dependency.to_string(),
                        attempt,
                        delay_s: 0.0,
                        category: FailureCategory::Transient,
                        timestamp: kaya_core::clock::now(),
                    });
                }
                let result = worker.execute(&request).await;
                if result.ok {
                    Ok(result)
                } else {
                    Err(result)
                }
            }
        },
    )
    .await;

    let result = match outcome {
        Ok(ok) => {
            circuit_breaker.lock().unwrap().record_success(dependency);
            ok.result
        }
        Err(failed) => {
            circuit_breaker.lock().unwrap().record_failure(dependency);
            failed
        }
    };

    let duration_ms = started.elapsed().as_millis() as u64;
    emit(events, KayaEvent::AgentCompleted {
        task_id: request.task_id,
        worker: dependency.to_string(),
        status: if result.ok { AgentOutcome::Success } else { AgentOutcome::Failed },
        cost_usd: result.cost_usd,
        duration_ms,
        timestamp: kaya_core::clock::now(),
    });

    result
}

fn emit(events: Option<&SharedEventBus>, event: KayaEvent) {
    if let Some(bus) = events {
        let _ = bus.publish(event);
    }
}
