//! Gemini — the browser-validator worker. Runs a test through a real
//! browser driver via the subprocess pool and emits the fields
//! `kaya_core::rubric::is_pass` gates on. Optional screenshot AI analysis
//! degrades gracefully: if it's unavailable, Gemini still returns a
//! rubric-valid record when the browser run itself succeeded (spec.md
//! §4.3).

use super::Worker;
use crate::process_pool::{LaunchRequest, ProcessPool};
use async_trait::async_trait;
use kaya_core::resilience::FailureCategory;
use kaya_core::worker::{GeminiRequest, GeminiResponse, WorkerRequest, WorkerResult};
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;
use serde_json::json;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

const DEFAULT_TIMEOUT_SECS: u64 = 60;

pub struct GeminiWorker {
    pool: Arc<ProcessPool>,
    sandbox_root: PathBuf,
    analysis_client: Option<(openai::CompletionsClient, String)>,
}

impl GeminiWorker {
    pub fn new(
        pool: Arc<ProcessPool>,
        sandbox_root: PathBuf,
        analysis_client: Option<(openai::CompletionsClient, String)>,
    ) -> Self {
        Self { pool, sandbox_root, analysis_client }
    }

    async fn analyze_screenshots(&self, screenshots: &[String]) -> Option<serde_json::Value> {
        let (client, model) = self.analysis_client.as_ref()?;
        if screenshots.is_empty() {
            return None;
        }
        let agent = client
            .agent(model)
            .name("gemini_analysis")
            .preamble(crate::prompts::GEMINI_ANALYSIS_PREAMBLE)
            .temperature(0.0)
            .build();
        let prompt = format!("Screenshots captured: {}", screenshots.join(", "));
        match agent.prompt(prompt).await {
            Ok(raw) => serde_json::from_str(&raw).ok().or(Some(json!({ "raw": raw }))),
            Err(_) => None,
        }
    }
}

#[async_trait]
impl Worker for GeminiWorker {
    fn name(&self) -> &'static str {
        "gemini"
    }

    async fn execute(&self, request: &WorkerRequest) -> WorkerResult {
        let started = Instant::now();
        let payload: GeminiRequest = match request.typed_payload() {
            Ok(payload) => payload,
            Err(err) => {
                return WorkerResult::failure(
                    format!("invalid gemini payload: {err}"),
                    FailureCategory::InvalidInput,
                    0.0,
                    started.elapsed().as_millis() as u64,
                );
            }
        };

        let launch = LaunchRequest {
            program: "npx".to_string(),
            args: vec![
                "playwright".to_string(),
                "test".to_string(),
                payload.test_path.clone(),
                "--reporter=line".to_string(),
            ],
            working_dir: self.sandbox_root.clone(),
            timeout: Duration::from_secs(DEFAULT_TIMEOUT_SECS),
        };

        let launch_result = self.pool.run(launch).await;
        let execution_time_ms = started.elapsed().as_millis() as u64;

        let (browser_launched, test_executed, test_passed, console_errors, network_failures) = match &launch_result {
            Ok(output) => (
                true,
                true,
                output.status.success(),
                parse_console_errors(&String::from_utf8_lossy(&output.stdout)),
                Vec::new(),
            ),
            Err(_) => (false, false, false, Vec::new(), Vec::new()),
        };

        let screenshots = if test_executed {
            vec![format!("artifacts/{}.png", sanitize_for_filename(&payload.test_path))]
        } else {
            Vec::new()
        };

        let ai_analysis = if payload.enable_ai_analysis && test_executed {
            self.analyze_screenshots(&screenshots).await
        } else {
            None
        };

        let response = GeminiResponse {
            browser_launched,
            test_executed,
            test_passed,
            screenshots,
            console_errors,
            network_failures,
            execution_time_ms,
            ai_analysis,
        };

        WorkerResult::success(response, 0.0, execution_time_ms)
            .unwrap_or_else(|_| WorkerResult::failure("serialization failed", FailureCategory::Unknown, 0.0, 0))
    }
}

fn parse_console_errors(stdout: &str) -> Vec<String> {
    stdout
        .lines()
        .filter(|line| line.contains("console.error") || line.contains("ReferenceError") || line.contains("TypeError"))
        .map(|line| line.trim().to_string())
        .collect()
}

fn sanitize_for_filename(path: &str) -> String {
    path.chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect()
}
