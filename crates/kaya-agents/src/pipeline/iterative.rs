//! Iterative Fix Pipeline — `iterative_fix` intent (spec.md §4.4.2): a
//! bounded fast-fail Runner/Medic loop over a single path, with no Critic
//! or Gemini gate (it's fixing existing tests, not producing new ones).

use super::{check_budget, load_or_create_session, record_cost, save_session, PipelineOutcome, PipelineStatus, WorkerSet};
use crate::runtime::RuntimeContext;
use crate::workers::call_with_policy;
use kaya_core::clock::{SessionId, TaskId};
use kaya_core::resilience::RetryPolicy;
use kaya_core::worker::{
    FailureRecord, MedicOutcome, MedicRequest, MedicResponse, RunnerRequest, RunnerResponse, WorkerKind, WorkerRequest,
};
use serde_json::{json, Value};

const MAX_ITERATIONS: u32 = 5;
const ITERATIVE_TIMEOUT_SECS: u64 = 180;
const DEFAULT_DEADLINE_SECS: i64 = 200;

pub async fn run_iterative_fix_pipeline(
    ctx: &RuntimeContext,
    workers: &WorkerSet,
    session_id: SessionId,
    feature: String,
    path: String,
    critical_path: bool,
) -> PipelineOutcome {
    let task_id = TaskId::new();
    let mut session = load_or_create_session(ctx, session_id);
    let mut iterations = Vec::new();

    let _ = ctx.events.publish(kaya_core::events::KayaEvent::TaskQueued {
        task_id,
        session_id,
        feature: feature.clone(),
        timestamp: kaya_core::clock::now(),
    });

    for iteration in 1..=MAX_ITERATIONS {
        let r3 = ctx.router.decide("execute_test", &feature, Some(&path), None);
        if let Err(outcome) = check_budget(ctx, &mut session, r3.max_cost_usd, critical_path) {
            save_session(ctx, &session);
            return PipelineOutcome { task_id, ..outcome };
        }

        let runner_request = match WorkerRequest::new(
            task_id,
            session_id,
            WorkerKind::Runner,
            RunnerRequest { test_path: path.clone(), timeout_secs: ITERATIVE_TIMEOUT_SECS, fast_fail: true },
            r3.max_cost_usd,
            kaya_core::clock::now() + chrono::Duration::seconds(DEFAULT_DEADLINE_SECS),
        ) {
            Ok(request) => request,
            Err(err) => return failed(task_id, iterations, format!("could not build runner request: {err}")),
        };

        let runner_result = call_with_policy(
            workers.runner.as_ref(),
            runner_request,
            &r3.model,
            &RetryPolicy::for_worker("runner"),
            &ctx.circuit_breaker,
            Some(&ctx.events),
        )
        .await;
        record_cost(ctx, &mut session, task_id, "runner", &r3.model, runner_result.cost_usd);
        save_session(ctx, &session);

        if !runner_result.ok {
            return failed(task_id, iterations, runner_result.error.unwrap_or_else(|| "runner failed".to_string()));
        }
        let runner_out: RunnerResponse = match serde_json::from_value(runner_result.data) {
            Ok(response) => response,
            Err(err) => return failed(task_id, iterations, format!("malformed runner response: {err}")),
        };

        if runner_out.failed_count == 0 {
            iterations.push(json!({
                "iteration": iteration,
                "status": "pass",
                "passed_count": runner_out.passed_count,
            }));
            return PipelineOutcome {
                task_id,
                status: PipelineStatus::Succeeded,
                reason: None,
                detail: json!({ "iterations": iterations }),
            };
        }

        // fast_fail guarantees exactly one failure is returned per spec.md §4.4.2.
        let failure = runner_out.failures.into_iter().next().unwrap_or(FailureRecord {
            category: kaya_core::resilience::FailureCategory::Unknown,
            message: "runner reported failure without a FailureRecord".to_string(),
            log_excerpt: runner_out.stdout_excerpt.clone(),
            fix_hint: None,
        });

        let r4 = ctx.router.decide("fix_bug", &feature, Some(&path), None);
        if let Err(outcome) = check_budget(ctx, &mut session, r4.max_cost_usd, critical_path) {
            save_session(ctx, &session);
            return PipelineOutcome { task_id, ..outcome };
        }

        let medic_request = match WorkerRequest::new(
            task_id,
            session_id,
            WorkerKind::Medic,
            MedicRequest { test_path: path.clone(), failure, task_id, feature: feature.clone() },
            r4.max_cost_usd,
            kaya_core::clock::now() + chrono::Duration::seconds(DEFAULT_DEADLINE_SECS),
        ) {
            Ok(request) => request,
            Err(err) => return failed(task_id, iterations, format!("could not build medic request: {err}")),
        };

        let medic_result = call_with_policy(
            workers.medic.as_ref(),
            medic_request,
            &r4.model,
            &RetryPolicy::for_worker("medic"),
            &ctx.circuit_breaker,
            Some(&ctx.events),
        )
        .await;
        record_cost(ctx, &mut session, task_id, "medic", &r4.model, medic_result.cost_usd);
        save_session(ctx, &session);

        if !medic_result.ok {
            return failed(task_id, iterations, medic_result.error.unwrap_or_else(|| "medic failed".to_string()));
        }
        let medic_out: MedicResponse = match serde_json::from_value(medic_result.data) {
            Ok(response) => response,
            Err(err) => return failed(task_id, iterations, format!("malformed medic response: {err}")),
        };

        iterations.push(json!({
            "iteration": iteration,
            "status": "fail",
            "failed_count": runner_out.failed_count,
            "medic_outcome": medic_out.outcome,
        }));

        if medic_out.outcome != MedicOutcome::Patched {
            return PipelineOutcome {
                task_id,
                status: PipelineStatus::Escalated,
                reason: medic_out.escalation_reason,
                detail: json!({ "iterations": iterations }),
            };
        }
    }

    PipelineOutcome {
        task_id,
        status: PipelineStatus::MaxIterationsReached,
        reason: Some("max_iterations_reached".to_string()),
        detail: json!({ "iterations": iterations }),
    }
}

fn failed(task_id: TaskId, iterations: Vec<Value>, reason: String) -> PipelineOutcome {
    PipelineOutcome {
        task_id,
        status: PipelineStatus::Failed,
        reason: Some(reason),
        detail: json!({ "iterations": iterations }),
    }
}
