//! Medic — repairs a failing test, honoring the Hippocratic invariant
//! that it must never leave the tree with more failing tests than it
//! found (spec.md §4.3). Diagnosis/patch/confidence come from the model;
//! baseline capture and regression re-runs go through the same
//! [`RunnerWorker`] the orchestrator calls directly.

use super::runner::RunnerWorker;
use super::Worker;
use crate::fs_guard;
use async_trait::async_trait;
use kaya_core::hot_store::{schema, SharedHotStore};
use kaya_core::resilience::FailureCategory;
use kaya_core::worker::{
    MedicOutcome, MedicRequest, MedicResponse, RunnerRequest, WorkerKind, WorkerRequest, WorkerResult,
};
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Instant;

const MAX_RETRIES: i64 = 3;
const CONFIDENCE_THRESHOLD: f64 = 0.7;

#[derive(Deserialize)]
struct DiagnosisResponse {
    diagnosis: String,
    patch: String,
    confidence: f64,
}

pub struct MedicWorker {
    client: openai::CompletionsClient,
    model: String,
    sandbox_root: PathBuf,
    hot_store: SharedHotStore,
    runner: std::sync::Arc<RunnerWorker>,
    regression_targets: Vec<String>,
}

impl MedicWorker {
    pub fn new(
        client: openai::CompletionsClient,
        model: impl Into<String>,
        sandbox_root: PathBuf,
        hot_store: SharedHotStore,
        runner: std::sync::Arc<RunnerWorker>,
        regression_targets: Vec<String>,
    ) -> Self {
        Self { client, model: model.into(), sandbox_root, hot_store, runner, regression_targets }
    }

    fn agent(&self) -> rig::agent::Agent<openai::completion::CompletionModel> {
        self.client
            .agent(&self.model)
            .name("medic")
            .preamble(crate::prompts::MEDIC_PREAMBLE)
            .temperature(0.0)
            .build()
    }

    async fn diagnose(&self, payload: &MedicRequest) -> anyhow::Result<DiagnosisResponse> {
        let prompt = format!(
            "Test: {}\nFailure category: {:?}\nFailure message: {}\nLog excerpt:\n{}",
            payload.test_path, payload.failure.category, payload.failure.message, payload.failure.log_excerpt,
        );
        let raw = self.agent().prompt(prompt).await?;
        let json_slice = extract_json_block(&raw);
        Ok(serde_json::from_str(&json_slice)?)
    }

    async fn run_regression(&self, test_path: &str) -> (u32, u32) {
        let mut targets = vec![test_path.to_string()];
        targets.extend(self.regression_targets.clone());
        let mut failed_total = 0u32;
        let mut passed_total = 0u32;
        for target in targets {
            let request = WorkerRequest::new(
                kaya_core::clock::TaskId::new(),
                kaya_core::clock::SessionId::new(),
                WorkerKind::Runner,
                RunnerRequest { test_path: target, timeout_secs: 120, fast_fail: false },
                0.0,
                kaya_core::clock::now() + chrono::Duration::seconds(150),
            );
            let Ok(request) = request else { continue };
            let result = self.runner.execute(&request).await;
            if let Ok(response) = serde_json::from_value::<kaya_core::worker::RunnerResponse>(result.data) {
                failed_total += response.failed_count;
                passed_total += response.passed_count;
            }
        }
        (passed_total, failed_total)
    }
}

#[async_trait]
impl Worker for MedicWorker {
    fn name(&self) -> &'static str {
        "medic"
    }

    async fn execute(&self, request: &WorkerRequest) -> WorkerResult {
        let started = Instant::now();
        let payload: MedicRequest = match request.typed_payload() {
            Ok(payload) => payload,
            Err(err) => {
                return WorkerResult::failure(
                    format!("invalid medic payload: {err}"),
                    FailureCategory::InvalidInput,
                    0.0,
                    started.elapsed().as_millis() as u64,
                );
            }
        };

        let attempts_key = schema::medic_attempts(payload.task_id);
        let attempts = self.hot_store.incr(&attempts_key);
        if attempts > MAX_RETRIES {
            return escalate(started, "max_retries_exceeded".to_string(), None, None);
        }

        let diagnosis = match self.diagnose(&payload).await {
            Ok(diagnosis) => diagnosis,
            Err(err) => {
                return WorkerResult::failure(
                    format!("medic diagnosis failed: {err}"),
                    FailureCategory::Unknown,
                    0.0,
                    started.elapsed().as_millis() as u64,
                );
            }
        };

        if !(0.0..=1.0).contains(&diagnosis.confidence) {
            return WorkerResult::failure(
                format!("diagnosis confidence {} outside [0, 1]", diagnosis.confidence),
                FailureCategory::InvalidInput,
                0.0,
                started.elapsed().as_millis() as u64,
            );
        }

        if diagnosis.confidence < CONFIDENCE_THRESHOLD {
            return escalate(
                started,
                "low_confidence".to_string(),
                Some(diagnosis.diagnosis),
                Some(diagnosis.confidence),
            );
        }

        let (baseline_passed, baseline_failed) = self.run_regression(&payload.test_path).await;

        let resolved = match fs_guard::sandbox_check(&self.sandbox_root, &payload.test_path) {
            Ok(path) => path,
            Err(err) => {
                return WorkerResult::failure(
                    format!("medic could not resolve test path: {err}"),
                    FailureCategory::InvalidInput,
                    0.0,
                    started.elapsed().as_millis() as u64,
                );
            }
        };

        let original = match std::fs::read_to_string(&resolved) {
            Ok(content) => content,
            Err(err) => {
                return WorkerResult::failure(
                    format!("medic could not read test file: {err}"),
                    FailureCategory::InvalidInput,
                    0.0,
                    started.elapsed().as_millis() as u64,
                );
            }
        };

        if std::fs::write(&resolved, &diagnosis.patch).is_err() {
            return WorkerResult::failure(
                "medic could not apply patch",
                FailureCategory::Permanent,
                0.0,
                started.elapsed().as_millis() as u64,
            );
        }

        let (_post_passed, post_failed) = self.run_regression(&payload.test_path).await;
        let _ = baseline_passed;
        let regression_delta = post_failed as i64 - baseline_failed as i64;

        if regression_delta > 0 {
            // Hippocratic invariant: never leave more failures than found.
            let _ = std::fs::write(&resolved, &original);
            return escalate_with(
                started,
                MedicOutcome::RolledBack,
                "regression_detected".to_string(),
                Some(diagnosis.diagnosis),
                Some(diagnosis.confidence),
                regression_delta,
            );
        }

        let response = MedicResponse {
            outcome: MedicOutcome::Patched,
            diagnosis: Some(diagnosis.diagnosis),
            confidence: Some(diagnosis.confidence),
            escalation_reason: None,
            regression_delta,
        };
        WorkerResult::success(response, 0.02, started.elapsed().as_millis() as u64)
            .unwrap_or_else(|_| WorkerResult::failure("serialization failed", FailureCategory::Unknown, 0.0, 0))
    }
}

fn escalate(started: Instant, reason: String, diagnosis: Option<String>, confidence: Option<f64>) -> WorkerResult {
    escalate_with(started, MedicOutcome::Escalated, reason, diagnosis, confidence, 0)
}

fn escalate_with(
    started: Instant,
    outcome: MedicOutcome,
    reason: String,
    diagnosis: Option<String>,
    confidence: Option<f64>,
    regression_delta: i64,
) -> WorkerResult {
    let response = MedicResponse {
        outcome,
        diagnosis,
        confidence,
        escalation_reason: Some(reason),
        regression_delta,
    };
    WorkerResult::success(response, 0.0, started.elapsed().as_millis() as u64)
        .unwrap_or_else(|_| WorkerResult::failure("serialization failed", FailureCategory::Unknown, 0.0, 0))
}

/// Pulls the JSON object out of a model response that may wrap it in a
/// fenced code block or surrounding prose — the grounding repo's
/// `contracts::extract_json_block` shape.
fn extract_json_block(text: &str) -> String {
    if let Some(start) = text.find("```json") {
        let after = &text[start + 7..];
        if let Some(end) = after.find("```") {
            return after[..end].trim().to_string();
        }
    }
    if let (Some(start), Some(end)) = (text.find('{'), text.rfind('}')) {
        if end > start {
            return text[start..=end].to_string();
        }
    }
    text.trim().to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn extract_json_block_prefers_fenced_block() {
        let text = "Here you go:\n```json\n{\"a\":1}\n```\ndone";
        assert_eq!(extract_json_block(text), "{\"a\":1}");
    }

    #[test]
    fn extract_json_block_falls_back_to_braces() {
        let text = "sure, {\"a\":1} there";
        assert_eq!(extract_json_block(text), "{\"a\":1}");
    }
}
