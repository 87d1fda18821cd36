//! Worker Contract — the uniform envelope every specialist (Scribe, Critic,
//! Runner, Medic, Gemini) is called through.
//!
//! `data`/`metadata` stay open `serde_json::Value` maps for forward
//! compatibility, but each worker's request/response payload is a real,
//! strongly-typed struct rather than a bag of strings — the "typed payload
//! inside an open envelope" shape the grounding repo's `harness` request/
//! response structs use for each of its own tools.

use crate::clock::{SessionId, TaskId};
use crate::resilience::FailureCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// The five specialists the orchestrator calls through a common `Worker`
/// trait (spec.md §4.3, §4.14).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WorkerKind {
    Scribe,
    Critic,
    Runner,
    Medic,
    Gemini,
}

impl std::fmt::Display for WorkerKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scribe => write!(f, "scribe"),
            Self::Critic => write!(f, "critic"),
            Self::Runner => write!(f, "runner"),
            Self::Medic => write!(f, "medic"),
            Self::Gemini => write!(f, "gemini"),
        }
    }
}

/// Uniform input to any worker. `payload` carries the worker-specific
/// typed request (see below), already serialized to `Value` at the call
/// boundary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerRequest {
    pub task_id: TaskId,
    pub session_id: SessionId,
    pub kind: WorkerKind,
    pub payload: Value,
    pub budget_usd: f64,
    pub deadline: DateTime<Utc>,
}

impl WorkerRequest {
    pub fn new(
        task_id: TaskId,
        session_id: SessionId,
        kind: WorkerKind,
        payload: impl Serialize,
        budget_usd: f64,
        deadline: DateTime<Utc>,
    ) -> serde_json::Result<Self> {
        Ok(Self {
            task_id,
            session_id,
            kind,
            payload: serde_json::to_value(payload)?,
            budget_usd,
            deadline,
        })
    }

    /// Deserializes `payload` into a worker-specific typed request.
    pub fn typed_payload<T: for<'de> Deserialize<'de>>(&self) -> serde_json::Result<T> {
        serde_json::from_value(self.payload.clone())
    }
}

/// Uniform output from any worker. Workers never propagate an `Err` across
/// this boundary — a raised condition becomes `ok=false` with an `error`
/// message and a [`FailureCategory`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WorkerResult {
    pub ok: bool,
    pub data: Value,
    pub error: Option<String>,
    pub category: Option<FailureCategory>,
    pub cost_usd: f64,
    pub duration_ms: u64,
    pub metadata: Value,
}

impl WorkerResult {
    pub fn success(data: impl Serialize, cost_usd: f64, duration_ms: u64) -> serde_json::Result<Self> {
        Ok(Self {
            ok: true,
            data: serde_json::to_value(data)?,
            error: None,
            category: None,
            cost_usd,
            duration_ms,
            metadata: Value::Object(Default::default()),
        })
    }

    pub fn failure(
        error: impl Into<String>,
        category: FailureCategory,
        cost_usd: f64,
        duration_ms: u64,
    ) -> Self {
        Self {
            ok: false,
            data: Value::Null,
            error: Some(error.into()),
            category: Some(category),
            cost_usd,
            duration_ms,
            metadata: Value::Object(Default::default()),
        }
    }

    pub fn with_metadata(mut self, metadata: impl Serialize) -> serde_json::Result<Self> {
        self.metadata = serde_json::to_value(metadata)?;
        Ok(self)
    }
}

/// Scribe's validation self-report, embedded in [`ScribeResponse`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScribeValidation {
    pub assertion_count: u32,
    pub screenshot_count: u32,
    pub uses_testid: bool,
    pub syntax_valid: bool,
    pub issues: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScribeRequest {
    pub description: String,
    pub feature: String,
    pub output_path: String,
    pub complexity: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScribeResponse {
    pub test_path: String,
    pub retries_used: u32,
    pub validation: ScribeValidation,
    pub rag_patterns_used: Vec<String>,
    pub used_rag: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CriticDecision {
    Approved,
    Rejected,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticRequest {
    pub test_path: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CriticResponse {
    pub decision: CriticDecision,
    pub issues: Vec<String>,
    pub estimated_cost_usd: f64,
    pub estimated_duration_ms: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunnerStatus {
    Pass,
    Fail,
    Timeout,
    Error,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailureRecord {
    pub category: FailureCategory,
    pub message: String,
    pub log_excerpt: String,
    pub fix_hint: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerRequest {
    pub test_path: String,
    pub timeout_secs: u64,
    pub fast_fail: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RunnerResponse {
    pub status: RunnerStatus,
    pub passed_count: u32,
    pub failed_count: u32,
    pub failures: Vec<FailureRecord>,
    pub execution_time_ms: u64,
    pub stdout_excerpt: String,
    pub stderr_excerpt: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicRequest {
    pub test_path: String,
    pub failure: FailureRecord,
    pub task_id: TaskId,
    pub feature: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MedicOutcome {
    Patched,
    Escalated,
    RolledBack,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicResponse {
    pub outcome: MedicOutcome,
    pub diagnosis: Option<String>,
    pub confidence: Option<f64>,
    pub escalation_reason: Option<String>,
    pub regression_delta: i64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiRequest {
    pub test_path: String,
    pub enable_ai_analysis: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeminiResponse {
    pub browser_launched: bool,
    pub test_executed: bool,
    pub test_passed: bool,
    pub screenshots: Vec<String>,
    pub console_errors: Vec<String>,
    pub network_failures: Vec<String>,
    pub execution_time_ms: u64,
    pub ai_analysis: Option<Value>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    #[test]
    fn request_roundtrips_typed_payload() {
        let payload = ScribeRequest {
            description: "test the checkout flow".to_string(),
            feature: "checkout".to_string(),
            output_path: "tests/checkout.spec.ts".to_string(),
            complexity: None,
        };
        let request = WorkerRequest::new(
            TaskId::new(),
            SessionId::new(),
            WorkerKind::Scribe,
            payload,
            0.5,
            Utc::now() + Duration::seconds(30),
        )
        .unwrap();
        let decoded: ScribeRequest = request.typed_payload().unwrap();
        assert_eq!(decoded.feature, "checkout");
    }

    #[test]
    fn failure_result_carries_category_and_no_data() {
        let result = WorkerResult::failure("timed out", FailureCategory::Timeout, 0.0, 500);
        assert!(!result.ok);
        assert_eq!(result.category, Some(FailureCategory::Timeout));
        assert_eq!(result.data, Value::Null);
    }

    #[test]
    fn success_result_serializes_typed_data() {
        let response = CriticResponse {
            decision: CriticDecision::Approved,
            issues: vec![],
            estimated_cost_usd: 0.01,
            estimated_duration_ms: 200,
        };
        let result = WorkerResult::success(response, 0.01, 120).unwrap();
        assert!(result.ok);
        assert_eq!(result.data["decision"], "approved");
    }
}
