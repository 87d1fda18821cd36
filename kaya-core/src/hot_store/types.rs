//! Entity types stored in the Hot Store.

use crate::clock::{SessionId, TaskId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Lifecycle state of a task as it moves through the pipeline.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Queued,
    Routing,
    InProgress,
    Validating,
    AwaitingHitl,
    Completed,
    Failed,
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Queued => "queued",
            Self::Routing => "routing",
            Self::InProgress => "in_progress",
            Self::Validating => "validating",
            Self::AwaitingHitl => "awaiting_hitl",
            Self::Completed => "completed",
            Self::Failed => "failed",
        };
        write!(f, "{s}")
    }
}

/// A task record tracked across the pipeline's lifetime.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub task_id: TaskId,
    pub session_id: SessionId,
    pub feature: String,
    pub status: TaskStatus,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    pub cost_so_far: f64,
    pub attempts: u32,
}

impl TaskRecord {
    pub fn new(task_id: TaskId, session_id: SessionId, feature: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            task_id,
            session_id,
            feature: feature.into(),
            status: TaskStatus::Queued,
            created_at: now,
            updated_at: now,
            cost_so_far: 0.0,
            attempts: 0,
        }
    }
}

/// A session record tracking budget across potentially many tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: SessionId,
    pub created_at: DateTime<Utc>,
    pub cost_cap_total: f64,
    pub cost_used: f64,
}

impl SessionRecord {
    pub fn new(session_id: SessionId, cost_cap_total: f64) -> Self {
        Self {
            session_id,
            created_at: Utc::now(),
            cost_cap_total,
            cost_used: 0.0,
        }
    }

    pub fn remaining(&self) -> f64 {
        (self.cost_cap_total - self.cost_used).max(0.0)
    }

    pub fn warning_threshold_hit(&self) -> bool {
        self.cost_cap_total > 0.0 && self.cost_used / self.cost_cap_total >= 0.8
    }

    pub fn exceeded(&self) -> bool {
        self.cost_used > self.cost_cap_total
    }
}

/// One Medic repair attempt, bounded to the last 10 per task in the
/// `medic:history:{task_id}` list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MedicAttempt {
    pub attempt: u32,
    pub description: String,
    pub timestamp: DateTime<Utc>,
}
