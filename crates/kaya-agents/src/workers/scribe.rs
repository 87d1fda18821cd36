//! Scribe — writes a browser test from a feature description, self-
//! validating against the static rubric and feeding issues back into its
//! own next attempt (spec.md §4.3). Best-effort pattern retrieval from the
//! Cold Store: a store outage degrades to writing from scratch rather than
//! failing the worker.
//!
//! Grounded on the grounding repo's `agents::coder` builder shape: a
//! preamble-configured `rig::agent::Agent` over an OpenAI-compatible
//! client, invoked with `rig::completion::Prompt::prompt`.

use super::rubric_check;
use crate::fs_guard;
use async_trait::async_trait;
use kaya_core::cold_store::SharedColdStore;
use kaya_core::worker::{ScribeRequest, ScribeResponse, WorkerRequest, WorkerResult};
use kaya_core::resilience::FailureCategory;
use rig::client::CompletionClient;
use rig::completion::Prompt;
use rig::providers::openai;
use std::path::PathBuf;
use std::time::Instant;

use super::Worker;

const MAX_SELF_VALIDATION_ATTEMPTS: u32 = 3;
const COLD_STORE_TOP_K: usize = 5;
const COLD_STORE_MIN_SIMILARITY: f64 = 0.7;

pub struct ScribeWorker {
    client: openai::CompletionsClient,
    model: String,
    sandbox_root: PathBuf,
    cold_store: Option<SharedColdStore>,
}

impl ScribeWorker {
    pub fn new(
        client: openai::CompletionsClient,
        model: impl Into<String>,
        sandbox_root: PathBuf,
        cold_store: Option<SharedColdStore>,
    ) -> Self {
        Self { client, model: model.into(), sandbox_root, cold_store }
    }

    fn agent(&self) -> rig::agent::Agent<openai::completion::CompletionModel> {
        self.client
            .agent(&self.model)
            .name("scribe")
            .preamble(crate::prompts::SCRIBE_PREAMBLE)
            .temperature(0.05)
            .build()
    }

    /// Best-effort retrieval of up to 5 prior patterns with similarity
    /// >= 0.7. Returns an empty vec (never an error) if the Cold Store is
    /// unavailable — spec.md §4.3's "proceeds without" guarantee.
    async fn retrieve_patterns(&self, description: &str) -> Vec<String> {
        let Some(cold_store) = &self.cold_store else {
            return Vec::new();
        };
        cold_store
            .search(
                kaya_core::cold_store::Collection::TestSuccess,
                description,
                COLD_STORE_TOP_K,
                COLD_STORE_MIN_SIMILARITY,
            )
            .into_iter()
            .map(|hit| hit.text)
            .collect()
    }

    async fn generate(&self, request: &ScribeRequest, patterns: &[String], feedback: &[String]) -> anyhow::Result<String> {
        let mut prompt = format!(
            "Feature: {}\nDescription: {}\nOutput path: {}\n",
            request.feature, request.description, request.output_path
        );
        if let Some(complexity) = &request.complexity {
            prompt.push_str(&format!("Complexity: {complexity}\n"));
        }
        if !patterns.is_empty() {
            prompt.push_str("\nSimilar past patterns:\n");
            for pattern in patterns {
                prompt.push_str(&format!("---\n{pattern}\n"));
            }
        }
        if !feedback.is_empty() {
            prompt.push_str("\nPrevious attempt was rejected for:\n");
            for issue in feedback {
                prompt.push_str(&format!("- {issue}\n"));
            }
        }
        Ok(self.agent().prompt(prompt).await?)
    }
}

#[async_trait]
impl Worker for ScribeWorker {
    fn name(&self) -> &'static str {
        "scribe"
    }

    async fn execute(&self, request: &WorkerRequest) -> WorkerResult {
        let started = Instant::now();
        let payload: ScribeRequest = match request.typed_payload() {
            Ok(payload) => payload,
            Err(err) => {
                return WorkerResult::failure(
                    format!("invalid scribe payload: {err}"),
                    FailureCategory::InvalidInput,
                    0.0,
                    started.elapsed().as_millis() as u64,
                );
            }
        };

        let patterns = self.retrieve_patterns(&payload.description).await;
        let used_rag = !patterns.is_empty();

        let mut feedback: Vec<String> = Vec::new();
        let mut retries_used = 0u32;

        for attempt in 1..=MAX_SELF_VALIDATION_ATTEMPTS {
            let content = match self.generate(&payload, &patterns, &feedback).await {
                Ok(content) => content,
                Err(err) => {
                    return WorkerResult::failure(
                        format!("scribe generation failed: {err}"),
                        FailureCategory::Unknown,
                        0.0,
                        started.elapsed().as_millis() as u64,
                    );
                }
            };

            let validation = rubric_check::validate(&content);
            if validation.issues.is_empty() {
                if let Err(err) = write_test(&self.sandbox_root, &payload.output_path, &content) {
                    return WorkerResult::failure(
                        format!("scribe could not write test file: {err}"),
                        FailureCategory::Permanent,
                        0.0,
                        started.elapsed().as_millis() as u64,
                    );
                }
                let response = ScribeResponse {
                    test_path: payload.output_path.clone(),
                    retries_used,
                    validation,
                    rag_patterns_used: patterns.clone(),
                    used_rag,
                };
                return WorkerResult::success(response, 0.01, started.elapsed().as_millis() as u64)
                    .unwrap_or_else(|_| WorkerResult::failure("serialization failed", FailureCategory::Unknown, 0.0, 0));
            }

            feedback = validation.issues.clone();
            retries_used = attempt;
        }

        WorkerResult::failure(
            format!("scribe exhausted {MAX_SELF_VALIDATION_ATTEMPTS} self-validation attempts: {feedback:?}"),
            FailureCategory::Permanent,
            0.0,
            started.elapsed().as_millis() as u64,
        )
    }
}

fn write_test(root: &std::path::Path, relative_path: &str, content: &str) -> anyhow::Result<()> {
    let resolved = match fs_guard::sandbox_check(root, relative_path) {
        Ok(path) => path,
        Err(_) => {
            if let Some(parent) = root.join(relative_path).parent() {
                std::fs::create_dir_all(parent)?;
            }
            root.join(relative_path)
        }
    };
    if let Some(parent) = resolved.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(resolved, content)?;
    Ok(())
}
