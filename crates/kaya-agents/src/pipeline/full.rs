//! Full Pipeline — `create_test` intent (spec.md §4.4.1): Scribe writes a
//! test, Critic gates it with up to 3 rewrite loops, Runner/Medic cycle
//! with a 3-Medic budget, Gemini validates with one retry counted against
//! that same budget, and a success writes the pattern to the Cold Store.

use super::{check_budget, load_or_create_session, record_cost, save_session, PipelineOutcome, PipelineStatus, WorkerSet};
use crate::runtime::RuntimeContext;
use crate::workers::call_with_policy;
use kaya_core::clock::{SessionId, TaskId};
use kaya_core::cold_store::Collection;
use kaya_core::hitl::{EscalationReason, HITLTask, Severity};
use kaya_core::resilience::RetryPolicy;
use kaya_core::worker::{
    CriticDecision, CriticRequest, CriticResponse, FailureRecord, GeminiRequest, GeminiResponse, MedicOutcome,
    MedicRequest, MedicResponse, RunnerRequest, RunnerResponse, RunnerStatus, ScribeRequest, ScribeResponse,
    WorkerKind, WorkerRequest,
};
use serde_json::{json, Value};

const MAX_REWRITE_ATTEMPTS: u32 = 3;
const MAX_MEDIC_INVOCATIONS: u32 = 3;
const DEFAULT_DEADLINE_SECS: i64 = 180;

pub async fn run_full_pipeline(
    ctx: &RuntimeContext,
    workers: &WorkerSet,
    session_id: SessionId,
    feature: String,
    mut description: String,
    output_path: String,
    critical_path: bool,
) -> PipelineOutcome {
    let task_id = TaskId::new();
    let mut session = load_or_create_session(ctx, session_id);

    let _ = ctx.events.publish(kaya_core::events::KayaEvent::TaskQueued {
        task_id,
        session_id,
        feature: feature.clone(),
        timestamp: kaya_core::clock::now(),
    });

    // Step 1-2: Scribe, with up to MAX_REWRITE_ATTEMPTS critic-rejection loops.
    let mut scribe_response: Option<ScribeResponse> = None;
    for rewrite_attempt in 0..=MAX_REWRITE_ATTEMPTS {
        let r1 = ctx.router.decide("write_test", &description, None, None);
        if let Err(outcome) = check_budget(ctx, &mut session, r1.max_cost_usd, critical_path) {
            save_session(ctx, &session);
            return PipelineOutcome { task_id, ..outcome };
        }

        let request = match WorkerRequest::new(
            task_id,
            session_id,
            WorkerKind::Scribe,
            ScribeRequest {
                description: description.clone(),
                feature: feature.clone(),
                output_path: output_path.clone(),
                complexity: Some(r1.complexity.to_string()),
            },
            r1.max_cost_usd,
            kaya_core::clock::now() + chrono::Duration::seconds(DEFAULT_DEADLINE_SECS),
        ) {
            Ok(request) => request,
            Err(err) => return failed(task_id, format!("could not build scribe request: {err}")),
        };

        let result = call_with_policy(
            workers.scribe.as_ref(),
            request,
            &r1.model,
            &RetryPolicy::for_worker("scribe"),
            &ctx.circuit_breaker,
            Some(&ctx.events),
        )
        .await;
        record_cost(ctx, &mut session, task_id, "scribe", &r1.model, result.cost_usd);
        save_session(ctx, &session);

        if !result.ok {
            return failed(task_id, result.error.unwrap_or_else(|| "scribe failed".to_string()));
        }
        let scribe_out: ScribeResponse = match serde_json::from_value(result.data) {
            Ok(response) => response,
            Err(err) => return failed(task_id, format!("malformed scribe response: {err}")),
        };

        // Step 3: Critic gate.
        let r2 = ctx.router.decide("pre_validate", &description, Some(&scribe_out.test_path), None);
        if let Err(outcome) = check_budget(ctx, &mut session, r2.max_cost_usd, critical_path) {
            save_session(ctx, &session);
            return PipelineOutcome { task_id, ..outcome };
        }

        let critic_request = match WorkerRequest::new(
            task_id,
            session_id,
            WorkerKind::Critic,
            CriticRequest { test_path: scribe_out.test_path.clone() },
            r2.max_cost_usd,
            kaya_core::clock::now() + chrono::Duration::seconds(DEFAULT_DEADLINE_SECS),
        ) {
            Ok(request) => request,
            Err(err) => return failed(task_id, format!("could not build critic request: {err}")),
        };

        let critic_result = call_with_policy(
            workers.critic.as_ref(),
            critic_request,
            &r2.model,
            &RetryPolicy::for_worker("critic"),
            &ctx.circuit_breaker,
            Some(&ctx.events),
        )
        .await;
        record_cost(ctx, &mut session, task_id, "critic", &r2.model, critic_result.cost_usd);
        save_session(ctx, &session);

        if !critic_result.ok {
            return failed(task_id, critic_result.error.unwrap_or_else(|| "critic failed".to_string()));
        }
        let critic_out: CriticResponse = match serde_json::from_value(critic_result.data) {
            Ok(response) => response,
            Err(err) => return failed(task_id, format!("malformed critic response: {err}")),
        };

        if critic_out.decision == CriticDecision::Approved {
            scribe_response = Some(scribe_out);
            break;
        }

        if rewrite_attempt == MAX_REWRITE_ATTEMPTS {
            return PipelineOutcome {
                task_id,
                status: PipelineStatus::CriticRejectedMaxRetries,
                reason: Some("critic_rejected_max_retries".to_string()),
                detail: json!({ "issues": critic_out.issues }),
            };
        }

        description.push_str("\n\nPrevious attempt was rejected for:\n");
        for issue in &critic_out.issues {
            description.push_str(&format!("- {issue}\n"));
        }
    }

    let Some(scribe_out) = scribe_response else {
        return PipelineOutcome {
            task_id,
            status: PipelineStatus::CriticRejectedMaxRetries,
            reason: Some("critic_rejected_max_retries".to_string()),
            detail: Value::Null,
        };
    };

    let test_path = scribe_out.test_path.clone();
    let mut medic_invocations = 0u32;

    // Steps 4-6: Runner/Medic cycle, then Gemini validation. A failed Gemini
    // validation is "one retry through step 5" (spec.md §4.4.1): it invokes
    // Medic against a synthetic failure and loops back to re-run Runner,
    // counting against the same 3-Medic budget as a Runner failure would.
    loop {
        let r3 = ctx.router.decide("execute_test", &description, Some(&test_path), None);
        if let Err(outcome) = check_budget(ctx, &mut session, r3.max_cost_usd, critical_path) {
            save_session(ctx, &session);
            return PipelineOutcome { task_id, ..outcome };
        }

        let runner_request = match WorkerRequest::new(
            task_id,
            session_id,
            WorkerKind::Runner,
            RunnerRequest { test_path: test_path.clone(), timeout_secs: 120, fast_fail: false },
            r3.max_cost_usd,
            kaya_core::clock::now() + chrono::Duration::seconds(DEFAULT_DEADLINE_SECS),
        ) {
            Ok(request) => request,
            Err(err) => return failed(task_id, format!("could not build runner request: {err}")),
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
            return failed(task_id, runner_result.error.unwrap_or_else(|| "runner failed".to_string()));
        }
        let runner_out: RunnerResponse = match serde_json::from_value(runner_result.data) {
            Ok(response) => response,
            Err(err) => return failed(task_id, format!("malformed runner response: {err}")),
        };

        if runner_out.status != RunnerStatus::Pass {
            let failure = runner_out.failures.into_iter().next().unwrap_or(FailureRecord {
                category: kaya_core::resilience::FailureCategory::Unknown,
                message: "runner reported failure without a FailureRecord".to_string(),
                log_excerpt: runner_out.stdout_excerpt.clone(),
                fix_hint: None,
            });
            match invoke_medic(
                ctx,
                workers,
                &mut session,
                task_id,
                session_id,
                &feature,
                &description,
                &test_path,
                failure,
                &mut medic_invocations,
                critical_path,
            )
            .await
            {
                Ok(()) => continue,
                Err(outcome) => return outcome,
            }
        }

        // Step 6: Gemini validation.
        let r5 = ctx.router.decide("validate", &description, Some(&test_path), None);
        if let Err(outcome) = check_budget(ctx, &mut session, r5.max_cost_usd, critical_path) {
            save_session(ctx, &session);
            return PipelineOutcome { task_id, ..outcome };
        }

        let gemini_request = match WorkerRequest::new(
            task_id,
            session_id,
            WorkerKind::Gemini,
            GeminiRequest { test_path: test_path.clone(), enable_ai_analysis: true },
            r5.max_cost_usd,
            kaya_core::clock::now() + chrono::Duration::seconds(DEFAULT_DEADLINE_SECS),
        ) {
            Ok(request) => request,
            Err(err) => return failed(task_id, format!("could not build gemini request: {err}")),
        };

        let gemini_result = call_with_policy(
            workers.gemini.as_ref(),
            gemini_request,
            &r5.model,
            &RetryPolicy::for_worker("gemini"),
            &ctx.circuit_breaker,
            Some(&ctx.events),
        )
        .await;
        record_cost(ctx, &mut session, task_id, "gemini", &r5.model, gemini_result.cost_usd);
        save_session(ctx, &session);

        if !gemini_result.ok {
            return failed(task_id, gemini_result.error.unwrap_or_else(|| "gemini failed".to_string()));
        }
        let gemini_out: GeminiResponse = match serde_json::from_value(gemini_result.data) {
            Ok(response) => response,
            Err(err) => return failed(task_id, format!("malformed gemini response: {err}")),
        };

        let validator_record = validator_record_from_gemini(&gemini_out);
        let (rubric_passed, rubric_reasons) = kaya_core::rubric::is_pass(&validator_record);

        let _ = ctx.events.publish(kaya_core::events::KayaEvent::ValidationComplete {
            task_id,
            passed: rubric_passed,
            reasons: rubric_reasons.iter().map(|r| r.to_string()).collect(),
            timestamp: kaya_core::clock::now(),
        });

        if rubric_passed {
            ctx.cold_store.store(
                Collection::TestSuccess,
                &test_path,
                &description,
                json!({ "feature": feature, "test_path": test_path, "task_id": task_id.to_string() }),
            );
            return PipelineOutcome {
                task_id,
                status: PipelineStatus::Succeeded,
                reason: None,
                detail: json!({ "test_path": test_path, "scribe": scribe_out, "gemini": gemini_out }),
            };
        }

        let failure = FailureRecord {
            category: kaya_core::resilience::FailureCategory::Unknown,
            message: format!("rubric rejected validation: {}", rubric_reasons.iter().map(|r| r.to_string()).collect::<Vec<_>>().join(", ")),
            log_excerpt: gemini_out.console_errors.join("\n"),
            fix_hint: None,
        };
        match invoke_medic(
            ctx,
            workers,
            &mut session,
            task_id,
            session_id,
            &feature,
            &description,
            &test_path,
            failure,
            &mut medic_invocations,
            critical_path,
        )
        .await
        {
            Ok(()) => continue,
            Err(outcome) => return outcome,
        }
    }
}

/// Invokes Medic against `failure`, bounded by the 3-invocation budget
/// shared across Runner and Gemini failures. `Ok(())` means the patch
/// applied and the caller should loop back to Runner; `Err` is terminal
/// (escalated, rolled back, or a hard failure).
#[allow(clippy::too_many_arguments)]
async fn invoke_medic(
    ctx: &RuntimeContext,
    workers: &WorkerSet,
    session: &mut kaya_core::hot_store::SessionRecord,
    task_id: TaskId,
    session_id: SessionId,
    feature: &str,
    description: &str,
    test_path: &str,
    failure: FailureRecord,
    medic_invocations: &mut u32,
    critical_path: bool,
) -> Result<(), PipelineOutcome> {
    if *medic_invocations >= MAX_MEDIC_INVOCATIONS {
        return Err(escalate(ctx, task_id, feature, test_path, *medic_invocations, "max_retries_exceeded".to_string()));
    }

    let r4 = ctx.router.decide("fix_bug", description, Some(test_path), None);
    if let Err(outcome) = check_budget(ctx, session, r4.max_cost_usd, critical_path) {
        save_session(ctx, session);
        return Err(PipelineOutcome { task_id, ..outcome });
    }

    let medic_request = WorkerRequest::new(
        task_id,
        session_id,
        WorkerKind::Medic,
        MedicRequest { test_path: test_path.to_string(), failure, task_id, feature: feature.to_string() },
        r4.max_cost_usd,
        kaya_core::clock::now() + chrono::Duration::seconds(DEFAULT_DEADLINE_SECS),
    )
    .map_err(|err| failed(task_id, format!("could not build medic request: {err}")))?;

    *medic_invocations += 1;
    let medic_result = call_with_policy(
        workers.medic.as_ref(),
        medic_request,
        &r4.model,
        &RetryPolicy::for_worker("medic"),
        &ctx.circuit_breaker,
        Some(&ctx.events),
    )
    .await;
    record_cost(ctx, session, task_id, "medic", &r4.model, medic_result.cost_usd);
    save_session(ctx, session);

    if !medic_result.ok {
        return Err(failed(task_id, medic_result.error.unwrap_or_else(|| "medic failed".to_string())));
    }
    let medic_out: MedicResponse =
        serde_json::from_value(medic_result.data).map_err(|err| failed(task_id, format!("malformed medic response: {err}")))?;

    match medic_out.outcome {
        MedicOutcome::Patched => Ok(()),
        MedicOutcome::Escalated | MedicOutcome::RolledBack => Err(escalate(
            ctx,
            task_id,
            feature,
            test_path,
            *medic_invocations,
            medic_out.escalation_reason.unwrap_or_else(|| "escalated".to_string()),
        )),
    }
}

fn failed(task_id: TaskId, reason: String) -> PipelineOutcome {
    PipelineOutcome { task_id, status: PipelineStatus::Failed, reason: Some(reason), detail: Value::Null }
}

/// Builds the rubric's input record from Gemini's raw response (spec.md
/// §4.10): `ai_analysis` never gates the rubric, so a malformed payload
/// just becomes `None` rather than failing the conversion.
fn validator_record_from_gemini(out: &GeminiResponse) -> kaya_core::rubric::ValidatorRecord {
    kaya_core::rubric::ValidatorRecord {
        browser_launched: out.browser_launched,
        test_executed: out.test_executed,
        test_passed: out.test_passed,
        screenshots: out.screenshots.clone(),
        console_errors: out.console_errors.clone(),
        network_failures: out.network_failures.clone(),
        execution_time_ms: out.execution_time_ms as i64,
        ai_analysis: out.ai_analysis.as_ref().and_then(|v| serde_json::from_value(v.clone()).ok()),
    }
}

fn escalate(
    ctx: &RuntimeContext,
    task_id: TaskId,
    feature: &str,
    test_path: &str,
    attempts: u32,
    reason: String,
) -> PipelineOutcome {
    let escalation_reason = match reason.as_str() {
        "max_retries_exceeded" => EscalationReason::MaxRetriesExceeded,
        "regression_detected" => EscalationReason::RegressionDetected,
        "low_confidence" => EscalationReason::LowConfidence,
        _ => EscalationReason::Other,
    };
    let severity = if attempts >= MAX_MEDIC_INVOCATIONS { Severity::High } else { Severity::Medium };
    let hitl_task = HITLTask::new(
        task_id,
        feature.to_string(),
        vec![test_path.to_string()],
        attempts,
        reason.clone(),
        severity,
        escalation_reason,
    );
    let priority = hitl_task.priority;
    ctx.hitl_queue.enqueue(hitl_task);
    let _ = ctx.events.publish(kaya_core::events::KayaEvent::HitlEscalated {
        task_id,
        hitl_task_id: task_id.to_string(),
        priority,
        reason: reason.clone(),
        timestamp: kaya_core::clock::now(),
    });
    PipelineOutcome {
        task_id,
        status: PipelineStatus::Escalated,
        reason: Some(reason),
        detail: json!({ "test_path": test_path, "medic_invocations": attempts }),
    }
}
