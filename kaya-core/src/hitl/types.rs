//! Types for the HITL (human-in-the-loop) escalation queue.

use crate::clock::TaskId;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Severity {
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    /// Base priority contribution per spec.md §4.8.
    pub fn base(self) -> f64 {
        match self {
            Self::Low => 0.1,
            Self::Medium => 0.3,
            Self::High => 0.5,
            Self::Critical => 0.7,
        }
    }
}

impl std::fmt::Display for Severity {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Low => write!(f, "low"),
            Self::Medium => write!(f, "medium"),
            Self::High => write!(f, "high"),
            Self::Critical => write!(f, "critical"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EscalationReason {
    MaxRetriesExceeded,
    RegressionDetected,
    LowConfidence,
    Other,
}

/// What a human records when closing out a [`HITLTask`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Annotation {
    pub root_cause_category: String,
    pub fix_strategy: String,
    pub severity: Severity,
    pub human_notes: String,
    pub patch_diff: Option<String>,
    pub time_to_resolve_minutes: u32,
}

/// A task awaiting human attention (spec.md §3).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HITLTask {
    pub task_id: TaskId,
    pub feature: String,
    pub paths: Vec<String>,
    pub attempts: u32,
    pub last_error: String,
    pub severity: Severity,
    pub reason: EscalationReason,
    pub priority: f64,
    pub attempt_history: Vec<Value>,
    pub ai_diagnosis: Option<String>,
    pub ai_confidence: Option<f64>,
    pub artifacts: Value,
    pub created_at: DateTime<Utc>,
    pub resolution: Option<Annotation>,
}

impl HITLTask {
    /// `min(severity_base + min(attempts/10, 0.3), 1.0)` per spec.md §4.8.
    pub fn compute_priority(severity: Severity, attempts: u32) -> f64 {
        let attempt_term = (attempts as f64 / 10.0).min(0.3);
        (severity.base() + attempt_term).min(1.0)
    }

    pub fn new(
        task_id: TaskId,
        feature: String,
        paths: Vec<String>,
        attempts: u32,
        last_error: String,
        severity: Severity,
        reason: EscalationReason,
    ) -> Self {
        let priority = Self::compute_priority(severity, attempts);
        Self {
            task_id,
            feature,
            paths,
            attempts,
            last_error,
            severity,
            reason,
            priority,
            attempt_history: Vec::new(),
            ai_diagnosis: None,
            ai_confidence: None,
            artifacts: Value::Object(Default::default()),
            created_at: Utc::now(),
            resolution: None,
        }
    }
}

/// Aggregate queue health (spec.md §4.8 `stats()`).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HitlStats {
    pub queue_depth: usize,
    pub avg_priority: f64,
    pub by_severity: std::collections::HashMap<String, usize>,
}
