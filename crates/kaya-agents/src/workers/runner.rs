//! Runner — launches the external test process with a fast-fail flag
//! through the bounded subprocess pool, parses its structured report, and
//! runs a self-diagnostic on timeout (spec.md §4.3).

use super::Worker;
use crate::process_pool::{LaunchError, LaunchRequest, ProcessPool};
use async_trait::async_trait;
use kaya_core::resilience::FailureCategory;
use kaya_core::worker::{FailureRecord, RunnerRequest, RunnerResponse, RunnerStatus, WorkerRequest, WorkerResult};
use std::net::TcpStream;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

const STDOUT_EXCERPT_CHARS: usize = 2_000;

pub struct RunnerWorker {
    pool: Arc<ProcessPool>,
    sandbox_root: PathBuf,
    backend_port: Option<u16>,
    frontend_port: Option<u16>,
    browser_tool: String,
}

impl RunnerWorker {
    pub fn new(
        pool: Arc<ProcessPool>,
        sandbox_root: PathBuf,
        backend_port: Option<u16>,
        frontend_port: Option<u16>,
        browser_tool: impl Into<String>,
    ) -> Self {
        Self { pool, sandbox_root, backend_port, frontend_port, browser_tool: browser_tool.into() }
    }

    fn self_diagnostic(&self) -> Vec<FailureRecord> {
        let mut findings = Vec::new();
        if let Some(port) = self.backend_port {
            if !port_reachable(port) {
                findings.push(FailureRecord {
                    category: FailureCategory::Network,
                    message: format!("backend port {port} is not reachable"),
                    log_excerpt: String::new(),
                    fix_hint: Some(format!("start the backend service on port {port}")),
                });
            }
        }
        if let Some(port) = self.frontend_port {
            if !port_reachable(port) {
                findings.push(FailureRecord {
                    category: FailureCategory::Network,
                    message: format!("frontend port {port} is not reachable"),
                    log_excerpt: String::new(),
                    fix_hint: Some(format!("start the frontend dev server on port {port}")),
                });
            }
        }
        if !tool_installed(&self.browser_tool) {
            findings.push(FailureRecord {
                category: FailureCategory::Permanent,
                message: format!("browser tool `{}` is not installed", self.browser_tool),
                log_excerpt: String::new(),
                fix_hint: Some(format!("install `{}` before re-running", self.browser_tool)),
            });
        }
        findings
    }
}

#[async_trait]
impl Worker for RunnerWorker {
    fn name(&self) -> &'static str {
        "runner"
    }

    async fn execute(&self, request: &WorkerRequest) -> WorkerResult {
        let started = Instant::now();
        let payload: RunnerRequest = match request.typed_payload() {
            Ok(payload) => payload,
            Err(err) => {
                return WorkerResult::failure(
                    format!("invalid runner payload: {err}"),
                    FailureCategory::InvalidInput,
                    0.0,
                    started.elapsed().as_millis() as u64,
                );
            }
        };

        let mut args = vec![payload.test_path.clone(), "--reporter=line".to_string()];
        if payload.fast_fail {
            args.push("--max-failures=1".to_string());
        }

        let launch = LaunchRequest {
            program: "npx".to_string(),
            args: std::iter::once("playwright".to_string()).chain(std::iter::once("test".to_string())).chain(args).collect(),
            working_dir: self.sandbox_root.clone(),
            timeout: Duration::from_secs(payload.timeout_secs),
        };

        match self.pool.run(launch).await {
            Ok(output) => {
                let stdout = String::from_utf8_lossy(&output.stdout).to_string();
                let stderr = String::from_utf8_lossy(&output.stderr).to_string();
                let response = parse_report(&stdout, &stderr, output.status.success());
                let duration_ms = started.elapsed().as_millis() as u64;
                WorkerResult::success(response, 0.0, duration_ms)
                    .unwrap_or_else(|_| WorkerResult::failure("serialization failed", FailureCategory::Unknown, 0.0, 0))
            }
            Err(LaunchError::Timeout { seconds }) => {
                let findings = self.self_diagnostic();
                let response = RunnerResponse {
                    status: RunnerStatus::Timeout,
                    passed_count: 0,
                    failed_count: 0,
                    failures: findings,
                    execution_time_ms: seconds * 1_000,
                    stdout_excerpt: String::new(),
                    stderr_excerpt: String::new(),
                };
                WorkerResult::success(response, 0.0, started.elapsed().as_millis() as u64)
                    .unwrap_or_else(|_| WorkerResult::failure("serialization failed", FailureCategory::Unknown, 0.0, 0))
            }
            Err(err) => WorkerResult::failure(
                format!("runner launch failed: {err}"),
                FailureCategory::classify(&err.to_string()),
                0.0,
                started.elapsed().as_millis() as u64,
            ),
        }
    }
}

fn parse_report(stdout: &str, stderr: &str, exit_success: bool) -> RunnerResponse {
    let passed_count = count_matches(stdout, "passed");
    let failed_count = count_matches(stdout, "failed");

    let status = if failed_count > 0 {
        RunnerStatus::Fail
    } else if exit_success {
        RunnerStatus::Pass
    } else {
        RunnerStatus::Error
    };

    let failures = if failed_count > 0 {
        vec![FailureRecord {
            category: FailureCategory::classify(stdout),
            message: "one or more tests failed".to_string(),
            log_excerpt: excerpt(stdout, STDOUT_EXCERPT_CHARS),
            fix_hint: None,
        }]
    } else {
        Vec::new()
    };

    RunnerResponse {
        status,
        passed_count,
        failed_count,
        failures,
        execution_time_ms: 0,
        stdout_excerpt: excerpt(stdout, STDOUT_EXCERPT_CHARS),
        stderr_excerpt: excerpt(stderr, STDOUT_EXCERPT_CHARS),
    }
}

/// Counts leading-digit occurrences of `<n> <word>` (playwright's `line`
/// reporter emits `"3 passed"`/`"1 failed"` summary lines).
fn count_matches(text: &str, word: &str) -> u32 {
    text.lines()
        .filter_map(|line| {
            let line = line.trim();
            if !line.contains(word) {
                return None;
            }
            line.split_whitespace().next()?.parse::<u32>().ok()
        })
        .sum()
}

fn excerpt(text: &str, max_chars: usize) -> String {
    text.chars().take(max_chars).collect()
}

fn port_reachable(port: u16) -> bool {
    TcpStream::connect_timeout(&format!("127.0.0.1:{port}").parse().unwrap(), Duration::from_millis(500)).is_ok()
}

fn tool_installed(tool: &str) -> bool {
    std::process::Command::new("which")
        .arg(tool)
        .output()
        .map(|output| output.status.success())
        .unwrap_or(false)
}
