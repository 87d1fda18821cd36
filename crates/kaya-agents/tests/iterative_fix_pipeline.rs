//! Exercises `run_iterative_fix_pipeline` against a real `RuntimeContext`
//! and a real `WorkerSet`, with the subprocess-driven workers wired to a
//! fake launcher so nothing shells out. Only the budget-refusal path is
//! covered here: it is the one branch in the Iterative Fix Pipeline that
//! never needs a model call, so it can run end to end without a network
//! dependency (spec.md §4.4.4, scenario F's budget-enforcement shape).

use async_trait::async_trait;
use kaya_agents::pipeline::{run_iterative_fix_pipeline, PipelineStatus, WorkerSet};
use kaya_agents::process_pool::{LaunchRequest, LaunchResult, ProcessLauncher, ProcessPool};
use kaya_agents::runtime::RuntimeContext;
use kaya_agents::workers::{CriticWorker, GeminiWorker, MedicWorker, RunnerWorker, ScribeWorker};
use kaya_core::clock::SessionId;
use kaya_core::config::{CostConfig, KayaConfig};
use kaya_core::events::EventBus;
use rig::providers::openai;
use std::process::Output;
use std::sync::Arc;

/// Never actually invoked in this test — the budget check short-circuits
/// before the pipeline calls Runner, so a launch here would indicate the
/// budget gate was bypassed.
struct UnreachableLauncher;

#[async_trait]
impl ProcessLauncher for UnreachableLauncher {
    async fn launch(&self, _request: LaunchRequest) -> LaunchResult<Output> {
        panic!("the budget gate should have refused before any subprocess launch");
    }
}

fn test_client() -> openai::CompletionsClient {
    openai::CompletionsClient::builder()
        .api_key("test")
        .base_url("http://127.0.0.1:0/v1")
        .build()
        .expect("building a client performs no network I/O")
}

fn worker_set(ctx: &RuntimeContext) -> WorkerSet {
    let tests_dir = std::env::temp_dir();
    let pool = Arc::new(ProcessPool::new(Arc::new(UnreachableLauncher), 1));
    let runner = Arc::new(RunnerWorker::new(pool.clone(), tests_dir.clone(), None, None, "playwright".to_string()));
    WorkerSet {
        scribe: Arc::new(ScribeWorker::new(test_client(), "gpt-4.1-mini", tests_dir.clone(), Some(ctx.cold_store.clone()))),
        critic: Arc::new(CriticWorker::new(tests_dir.clone(), false)),
        medic: Arc::new(MedicWorker::new(
            test_client(),
            "gpt-4.1-mini",
            tests_dir.clone(),
            ctx.hot_store.clone(),
            runner.clone(),
            Vec::new(),
        )),
        runner,
        gemini: Arc::new(GeminiWorker::new(pool, tests_dir, None)),
    }
}

#[tokio::test]
async fn a_zero_cap_session_is_refused_before_any_worker_runs() {
    let config = KayaConfig { cost: CostConfig { session_cost_cap_usd: 0.0, ..CostConfig::default() }, ..KayaConfig::builtin() };
    let ctx = RuntimeContext::new(config, EventBus::new().shared());
    let workers = worker_set(&ctx);

    let outcome = run_iterative_fix_pipeline(
        &ctx,
        &workers,
        SessionId::new(),
        "checkout flow".to_string(),
        "checkout.spec.ts".to_string(),
        false,
    )
    .await;

    assert_eq!(outcome.status, PipelineStatus::BudgetExceeded);
}

#[tokio::test]
async fn a_critical_path_session_is_not_refused_by_the_same_zero_remaining_cap() {
    // spec.md §4.4.4 / scenario F: the critical-path override keeps a
    // task spending past the normal session cap, so this same zero-room
    // session must NOT short-circuit before Runner gets to run.
    let config = KayaConfig { cost: CostConfig { session_cost_cap_usd: 0.0, ..CostConfig::default() }, ..KayaConfig::builtin() };
    let ctx = RuntimeContext::new(config, EventBus::new().shared());

    // Runner is allowed to run here, so give it a real launcher that
    // reports a pass rather than the panic-on-launch fake.
    struct PassLauncher;
    #[async_trait::async_trait]
    impl ProcessLauncher for PassLauncher {
        async fn launch(&self, _request: LaunchRequest) -> LaunchResult<Output> {
            use std::os::unix::process::ExitStatusExt;
            Ok(Output { status: std::process::ExitStatus::from_raw(0), stdout: b"1 passed\n".to_vec(), stderr: Vec::new() })
        }
    }

    let tests_dir = std::env::temp_dir();
    let pool = Arc::new(ProcessPool::new(Arc::new(PassLauncher), 1));
    let runner = Arc::new(RunnerWorker::new(pool.clone(), tests_dir.clone(), None, None, "playwright".to_string()));
    let workers = WorkerSet {
        scribe: Arc::new(ScribeWorker::new(test_client(), "gpt-4.1-mini", tests_dir.clone(), Some(ctx.cold_store.clone()))),
        critic: Arc::new(CriticWorker::new(tests_dir.clone(), false)),
        medic: Arc::new(MedicWorker::new(test_client(), "gpt-4.1-mini", tests_dir.clone(), ctx.hot_store.clone(), runner.clone(), Vec::new())),
        runner,
        gemini: Arc::new(GeminiWorker::new(pool, tests_dir, None)),
    };

    let outcome = run_iterative_fix_pipeline(
        &ctx,
        &workers,
        SessionId::new(),
        "checkout flow".to_string(),
        "checkout.spec.ts".to_string(),
        true,
    )
    .await;

    assert_eq!(outcome.status, PipelineStatus::Succeeded);
}
