//! The two pipelines the orchestrator drives an intent through: the Full
//! Pipeline (`create_test`) and the Iterative Fix Pipeline
//! (`iterative_fix`) — spec.md §4.4. Both are plain async functions over a
//! [`RuntimeContext`] and a [`WorkerSet`], not a state machine type: each
//! step is a Router decision plus one `call_with_policy` call, exactly the
//! shape spec.md lays the steps out in.

pub mod full;
pub mod iterative;

use crate::runtime::RuntimeContext;
use crate::workers::{CriticWorker, GeminiWorker, MedicWorker, RunnerWorker, ScribeWorker};
use kaya_core::clock::{SessionId, TaskId};
use kaya_core::events::KayaEvent;
use kaya_core::hot_store::{schema, SessionRecord};
use serde_json::Value;
use std::sync::Arc;

pub use full::run_full_pipeline;
pub use iterative::run_iterative_fix_pipeline;

/// The five specialist instances a pipeline drives through, already built
/// with their model clients/sandbox roots at startup.
pub struct WorkerSet {
    pub scribe: Arc<ScribeWorker>,
    pub critic: Arc<CriticWorker>,
    pub runner: Arc<RunnerWorker>,
    pub medic: Arc<MedicWorker>,
    pub gemini: Arc<GeminiWorker>,
}

/// Terminal status of a pipeline run (spec.md §4.4.1/§4.4.2's named
/// failure reasons plus `succeeded`).
#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PipelineStatus {
    Succeeded,
    Failed,
    Escalated,
    BudgetExceeded,
    CriticRejectedMaxRetries,
    MaxIterationsReached,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct PipelineOutcome {
    pub task_id: TaskId,
    pub status: PipelineStatus,
    pub reason: Option<String>,
    pub detail: Value,
}

/// Whether `session.cost_used + next_cost` is still inside budget.
/// Returns `Ok(())` to proceed, `Ok(())` with a `budget_warning` event
/// emitted if in the warn band, or `Err(())` if the call must be refused.
pub(crate) fn check_budget(
    ctx: &RuntimeContext,
    session: &mut SessionRecord,
    next_cost: f64,
    critical_path: bool,
) -> Result<(), PipelineOutcome> {
    let projected = session.cost_used + next_cost;
    if projected >= session.cost_cap_total && !critical_path {
        let _ = ctx.events.publish(KayaEvent::BudgetExceeded {
            session_id: session.session_id,
            task_id: None,
            cost_used: session.cost_used,
            cost_cap_total: session.cost_cap_total,
            timestamp: kaya_core::clock::now(),
        });
        return Err(PipelineOutcome {
            task_id: TaskId::new(),
            status: PipelineStatus::BudgetExceeded,
            reason: Some("budget_exceeded".to_string()),
            detail: Value::Null,
        });
    }
    if session.warning_threshold_hit() {
        let _ = ctx.events.publish(KayaEvent::BudgetWarning {
            session_id: session.session_id,
            cost_used: session.cost_used,
            cost_cap_total: session.cost_cap_total,
            timestamp: kaya_core::clock::now(),
        });
    }
    Ok(())
}

pub(crate) fn load_or_create_session(ctx: &RuntimeContext, session_id: SessionId) -> SessionRecord {
    let key = schema::session(session_id);
    match ctx.hot_store.get::<SessionRecord>(&key) {
        Ok(Some(record)) => record,
        _ => SessionRecord::new(session_id, ctx.config.cost.session_cost_cap_usd),
    }
}

pub(crate) fn save_session(ctx: &RuntimeContext, session: &SessionRecord) {
    let key = schema::session(session.session_id);
    let _ = ctx.hot_store.put(&key, session, Some(schema::ttl::session()));
}

pub(crate) fn record_cost(ctx: &RuntimeContext, session: &mut SessionRecord, task_id: TaskId, worker: &str, model: &str, cost_usd: f64) {
    session.cost_used += cost_usd;
    ctx.cost_ledger.record(kaya_core::CostEntry {
        timestamp: kaya_core::clock::now(),
        session_id: session.session_id,
        task_id,
        worker: worker.to_string(),
        model: model.to_string(),
        input_tokens: 0,
        output_tokens: 0,
        cost_usd,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaya_core::config::KayaConfig;
    use kaya_core::events::EventBus;

    fn ctx() -> RuntimeContext {
        RuntimeContext::new(KayaConfig::builtin(), EventBus::new().shared())
    }

    #[test]
    fn budget_check_refuses_once_the_cap_is_projected_to_be_exceeded() {
        let ctx = ctx();
        let mut session = SessionRecord::new(SessionId::new(), 1.00);
        assert!(check_budget(&ctx, &mut session, 0.40, false).is_ok());
        session.cost_used += 0.40;
        let outcome = check_budget(&ctx, &mut session, 0.70, false);
        assert!(outcome.is_err());
        assert_eq!(outcome.unwrap_err().status, PipelineStatus::BudgetExceeded);
    }

    #[test]
    fn critical_path_overrides_the_session_cap() {
        // spec.md scenario F: a critical task keeps spending past the
        // session's normal cap until its own override cap is consumed.
        let ctx = ctx();
        let mut session = SessionRecord::new(SessionId::new(), 1.00);
        session.cost_used = 0.95;
        assert!(check_budget(&ctx, &mut session, 2.00, true).is_ok());
    }

    #[test]
    fn save_then_load_round_trips_the_session_record() {
        let ctx = ctx();
        let session_id = SessionId::new();
        let mut session = load_or_create_session(&ctx, session_id);
        assert_eq!(session.cost_used, 0.0);

        record_cost(&ctx, &mut session, TaskId::new(), "scribe", "gpt-4.1-mini", 0.12);
        save_session(&ctx, &session);

        let reloaded = load_or_create_session(&ctx, session_id);
        assert_eq!(reloaded.cost_used, 0.12);
    }

    #[test]
    fn record_cost_is_monotonically_non_decreasing_across_workers() {
        let ctx = ctx();
        let mut session = SessionRecord::new(SessionId::new(), 5.00);
        let task_id = TaskId::new();
        let mut running_total = 0.0;
        for (worker, cost) in [("scribe", 0.05), ("critic", 0.0), ("runner", 0.0), ("medic", 0.20)] {
            record_cost(&ctx, &mut session, task_id, worker, "gpt-4.1-mini", cost);
            running_total += cost;
            assert_eq!(session.cost_used, running_total);
        }
        assert_eq!(ctx.cost_ledger.spend_by(kaya_core::cost_ledger::SpendBy::Session(session.session_id)), running_total);
    }
}
