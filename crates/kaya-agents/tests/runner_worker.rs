//! Runner integration tests driven through a fake `ProcessLauncher`, the
//! same substitution point `process_pool.rs`'s own unit tests use, so the
//! report-parsing and timeout self-diagnostic run without a real
//! `playwright` binary.

use async_trait::async_trait;
use kaya_agents::process_pool::{LaunchError, LaunchRequest, LaunchResult, ProcessLauncher, ProcessPool};
use kaya_agents::workers::{RunnerWorker, Worker};
use kaya_core::clock::{SessionId, TaskId};
use kaya_core::worker::{RunnerRequest, RunnerResponse, RunnerStatus, WorkerKind, WorkerRequest};
use std::os::unix::process::ExitStatusExt;
use std::path::PathBuf;
use std::process::Output;
use std::sync::Arc;

struct ScriptedLauncher {
    stdout: &'static str,
    exit_success: bool,
}

#[async_trait]
impl ProcessLauncher for ScriptedLauncher {
    async fn launch(&self, _request: LaunchRequest) -> LaunchResult<Output> {
        Ok(Output {
            status: std::process::ExitStatus::from_raw(if self.exit_success { 0 } else { 256 }),
            stdout: self.stdout.as_bytes().to_vec(),
            stderr: Vec::new(),
        })
    }
}

struct TimeoutLauncher;

#[async_trait]
impl ProcessLauncher for TimeoutLauncher {
    async fn launch(&self, _request: LaunchRequest) -> LaunchResult<Output> {
        Err(LaunchError::Timeout { seconds: 1 })
    }
}

fn runner_request(path: &str, fast_fail: bool) -> WorkerRequest {
    WorkerRequest::new(
        TaskId::new(),
        SessionId::new(),
        WorkerKind::Runner,
        RunnerRequest { test_path: path.to_string(), timeout_secs: 30, fast_fail },
        0.0,
        chrono::Utc::now() + chrono::Duration::seconds(60),
    )
    .unwrap()
}

#[tokio::test]
async fn reports_a_clean_pass() {
    let pool = Arc::new(ProcessPool::new(
        Arc::new(ScriptedLauncher { stdout: "  3 passed (2.1s)\n", exit_success: true }),
        1,
    ));
    let runner = RunnerWorker::new(pool, PathBuf::from("."), None, None, "playwright".to_string());

    let result = runner.execute(&runner_request("login.spec.ts", false)).await;
    assert!(result.ok);
    let response: RunnerResponse = serde_json::from_value(result.data).unwrap();
    assert_eq!(response.status, RunnerStatus::Pass);
    assert_eq!(response.passed_count, 3);
    assert_eq!(response.failed_count, 0);
    assert!(response.failures.is_empty());
}

#[tokio::test]
async fn fast_fail_surfaces_exactly_one_failure_record() {
    let pool = Arc::new(ProcessPool::new(
        Arc::new(ScriptedLauncher { stdout: "  1 failed (0.8s)\n", exit_success: false }),
        1,
    ));
    let runner = RunnerWorker::new(pool, PathBuf::from("."), None, None, "playwright".to_string());

    let result = runner.execute(&runner_request("checkout.spec.ts", true)).await;
    assert!(result.ok);
    let response: RunnerResponse = serde_json::from_value(result.data).unwrap();
    assert_eq!(response.status, RunnerStatus::Fail);
    assert_eq!(response.failed_count, 1);
    assert_eq!(response.failures.len(), 1);
}

#[tokio::test]
async fn timeout_runs_self_diagnostic_instead_of_failing_hard() {
    let pool = Arc::new(ProcessPool::new(Arc::new(TimeoutLauncher), 1));
    let runner = RunnerWorker::new(pool, PathBuf::from("."), Some(1), None, "playwright".to_string());

    let result = runner.execute(&runner_request("slow.spec.ts", false)).await;
    assert!(result.ok, "a subprocess timeout is a structured RunnerResponse, not a worker failure");
    let response: RunnerResponse = serde_json::from_value(result.data).unwrap();
    assert_eq!(response.status, RunnerStatus::Timeout);
    assert!(response.failures.iter().any(|f| f.message.contains("port 1")));
}

#[tokio::test]
async fn pool_capacity_bounds_concurrent_runs() {
    let pool = Arc::new(ProcessPool::new(Arc::new(ScriptedLauncher { stdout: "1 passed\n", exit_success: true }), 3));
    assert_eq!(pool.available_permits(), 3);
}
