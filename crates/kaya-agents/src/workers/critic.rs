//! Critic — pure static analysis pre-validator. No model call, no
//! suspension, no retry (spec.md §4.3): it reads the generated test file
//! once and either approves or rejects it.

use super::rubric_check;
use super::Worker;
use crate::fs_guard;
use async_trait::async_trait;
use kaya_core::resilience::FailureCategory;
use kaya_core::worker::{CriticDecision, CriticRequest, CriticResponse, WorkerRequest, WorkerResult};
use std::path::PathBuf;
use std::time::Instant;

const MAX_DURATION_MS: u64 = 60_000;
const MAX_COST_USD: f64 = 0.50;
/// Rough per-line cost/duration estimate used in lieu of an actual test
/// run — Critic never executes anything (that's Runner's job).
const ESTIMATED_MS_PER_LINE: u64 = 40;
const ESTIMATED_USD_PER_LINE: f64 = 0.0005;

pub struct CriticWorker {
    sandbox_root: PathBuf,
    critical_path_override: bool,
}

impl CriticWorker {
    pub fn new(sandbox_root: PathBuf, critical_path_override: bool) -> Self {
        Self { sandbox_root, critical_path_override }
    }
}

#[async_trait]
impl Worker for CriticWorker {
    fn name(&self) -> &'static str {
        "critic"
    }

    async fn execute(&self, request: &WorkerRequest) -> WorkerResult {
        let started = Instant::now();
        let payload: CriticRequest = match request.typed_payload() {
            Ok(payload) => payload,
            Err(err) => {
                return WorkerResult::failure(
                    format!("invalid critic payload: {err}"),
                    FailureCategory::InvalidInput,
                    0.0,
                    started.elapsed().as_millis() as u64,
                );
            }
        };

        let resolved = match fs_guard::sandbox_check(&self.sandbox_root, &payload.test_path) {
            Ok(path) => path,
            Err(err) => {
                return WorkerResult::failure(
                    format!("critic could not resolve test path: {err}"),
                    FailureCategory::InvalidInput,
                    0.0,
                    started.elapsed().as_millis() as u64,
                );
            }
        };

        let content = match std::fs::read_to_string(&resolved) {
            Ok(content) => content,
            Err(err) => {
                return WorkerResult::failure(
                    format!("critic could not read test file: {err}"),
                    FailureCategory::InvalidInput,
                    0.0,
                    started.elapsed().as_millis() as u64,
                );
            }
        };

        let line_count = content.lines().count() as u64;
        let estimated_duration_ms = line_count * ESTIMATED_MS_PER_LINE;
        let estimated_cost_usd = line_count as f64 * ESTIMATED_USD_PER_LINE;

        let validation = rubric_check::validate(&content);
        let mut issues = validation.issues;

        let too_expensive = !self.critical_path_override
            && (estimated_duration_ms > MAX_DURATION_MS || estimated_cost_usd > MAX_COST_USD);
        if too_expensive {
            issues.push("too expensive".to_string());
        }

        let decision = if issues.is_empty() { CriticDecision::Approved } else { CriticDecision::Rejected };

        let response = CriticResponse {
            decision,
            issues,
            estimated_cost_usd,
            estimated_duration_ms,
        };

        WorkerResult::success(response, 0.0, started.elapsed().as_millis() as u64)
            .unwrap_or_else(|_| WorkerResult::failure("serialization failed", FailureCategory::Unknown, 0.0, 0))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use kaya_core::clock::{SessionId, TaskId};
    use kaya_core::worker::WorkerKind;

    fn request_for(tmp: &std::path::Path, path: &str) -> WorkerRequest {
        WorkerRequest::new(
            TaskId::new(),
            SessionId::new(),
            WorkerKind::Critic,
            CriticRequest { test_path: path.to_string() },
            0.5,
            chrono::Utc::now() + chrono::Duration::seconds(30),
        )
        .unwrap()
    }

    #[tokio::test]
    async fn approves_a_clean_test() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join("good.spec.ts"),
            "test('x', async () => { await expect(page.locator('[data-testid=a]')).toBeVisible(); await page.screenshot(); });",
        )
        .unwrap();
        let worker = CriticWorker::new(dir.path().to_path_buf(), false);
        let result = worker.execute(&request_for(dir.path(), "good.spec.ts")).await;
        assert!(result.ok);
        let response: CriticResponse = serde_json::from_value(result.data).unwrap();
        assert_eq!(response.decision, CriticDecision::Approved);
    }

    #[tokio::test]
    async fn rejects_index_selector() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("bad.spec.ts"), "page.click('li:nth-child(2)');").unwrap();
        let worker = CriticWorker::new(dir.path().to_path_buf(), false);
        let result = worker.execute(&request_for(dir.path(), "bad.spec.ts")).await;
        let response: CriticResponse = serde_json::from_value(result.data).unwrap();
        assert_eq!(response.decision, CriticDecision::Rejected);
    }
}
