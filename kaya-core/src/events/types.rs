//! Event types for the Kaya orchestrator.
//!
//! These are the typed, in-process events that drive the Event Bus. Every
//! sink ultimately renders an event through [`KayaEvent::to_envelope`] into
//! the wire format `{event_type, timestamp, payload}` used by the NDJSON
//! file sink and the WebSocket broadcast sink.

use crate::clock::{SessionId, TaskId};
use crate::resilience::error_classify::FailureCategory;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Unique identifier for an event instance.
pub type EventId = String;

/// The wire-format envelope every event is rendered into before it leaves
/// the process (file sink, WebSocket sink).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EventEnvelope {
    pub event_type: String,
    /// Epoch seconds, as a float, per the NDJSON log format.
    pub timestamp: f64,
    pub payload: Value,
}

/// All event kinds the orchestrator, router, and resilience kit emit.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum KayaEvent {
    TaskQueued {
        task_id: TaskId,
        session_id: SessionId,
        feature: String,
        timestamp: DateTime<Utc>,
    },
    AgentStarted {
        task_id: TaskId,
        worker: String,
        model: String,
        timestamp: DateTime<Utc>,
    },
    AgentCompleted {
        task_id: TaskId,
        worker: String,
        status: AgentOutcome,
        cost_usd: f64,
        duration_ms: u64,
        timestamp: DateTime<Utc>,
    },
    ValidationComplete {
        task_id: TaskId,
        passed: bool,
        reasons: Vec<String>,
        timestamp: DateTime<Utc>,
    },
    HitlEscalated {
        task_id: TaskId,
        hitl_task_id: String,
        priority: f64,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    BudgetWarning {
        session_id: SessionId,
        cost_used: f64,
        cost_cap_total: f64,
        timestamp: DateTime<Utc>,
    },
    BudgetExceeded {
        session_id: SessionId,
        task_id: Option<TaskId>,
        cost_used: f64,
        cost_cap_total: f64,
        timestamp: DateTime<Utc>,
    },
    ErrorOccurred {
        task_id: Option<TaskId>,
        worker: Option<String>,
        category: FailureCategory,
        message: String,
        timestamp: DateTime<Utc>,
    },
    RetryAttempted {
        task_id: Option<TaskId>,
        worker: String,
        attempt: u32,
        delay_s: f64,
        category: FailureCategory,
        timestamp: DateTime<Utc>,
    },
    CircuitBreakerOpened {
        dependency: String,
        failure_count: u32,
        timestamp: DateTime<Utc>,
    },
    CircuitBreakerClosed {
        dependency: String,
        timestamp: DateTime<Utc>,
    },
    RoutingDecision {
        task_type: String,
        worker: String,
        model: String,
        reason: String,
        timestamp: DateTime<Utc>,
    },
    MetricsSnapshot {
        window_hours: u32,
        payload: Value,
        timestamp: DateTime<Utc>,
    },
}

/// Terminal status recorded on `agent_completed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentOutcome {
    Success,
    Failed,
}

impl std::fmt::Display for AgentOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "success"),
            Self::Failed => write!(f, "failed"),
        }
    }
}

impl KayaEvent {
    pub fn timestamp(&self) -> DateTime<Utc> {
        match self {
            Self::TaskQueued { timestamp, .. }
            | Self::AgentStarted { timestamp, .. }
            | Self::AgentCompleted { timestamp, .. }
            | Self::ValidationComplete { timestamp, .. }
            | Self::HitlEscalated { timestamp, .. }
            | Self::BudgetWarning { timestamp, .. }
            | Self::BudgetExceeded { timestamp, .. }
            | Self::ErrorOccurred { timestamp, .. }
            | Self::RetryAttempted { timestamp, .. }
            | Self::CircuitBreakerOpened { timestamp, .. }
            | Self::CircuitBreakerClosed { timestamp, .. }
            | Self::RoutingDecision { timestamp, .. }
            | Self::MetricsSnapshot { timestamp, .. } => *timestamp,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            Self::TaskQueued { .. } => "task_queued",
            Self::AgentStarted { .. } => "agent_started",
            Self::AgentCompleted { .. } => "agent_completed",
            Self::ValidationComplete { .. } => "validation_complete",
            Self::HitlEscalated { .. } => "hitl_escalated",
            Self::BudgetWarning { .. } => "budget_warning",
            Self::BudgetExceeded { .. } => "budget_exceeded",
            Self::ErrorOccurred { .. } => "error_occurred",
            Self::RetryAttempted { .. } => "retry_attempted",
            Self::CircuitBreakerOpened { .. } => "circuit_breaker_opened",
            Self::CircuitBreakerClosed { .. } => "circuit_breaker_closed",
            Self::RoutingDecision { .. } => "routing_decision",
            Self::MetricsSnapshot { .. } => "metrics_snapshot",
        }
    }

    /// The session this event is scoped to, if any.
    pub fn session_id(&self) -> Option<SessionId> {
        match self {
            Self::TaskQueued { session_id, .. } => Some(*session_id),
            Self::BudgetWarning { session_id, .. } => Some(*session_id),
            Self::BudgetExceeded { session_id, .. } => Some(*session_id),
            _ => None,
        }
    }

    /// The task this event is scoped to, if any.
    pub fn task_id(&self) -> Option<TaskId> {
        match self {
            Self::TaskQueued { task_id, .. } => Some(*task_id),
            Self::AgentStarted { task_id, .. } => Some(*task_id),
            Self::AgentCompleted { task_id, .. } => Some(*task_id),
            Self::ValidationComplete { task_id, .. } => Some(*task_id),
            Self::HitlEscalated { task_id, .. } => Some(*task_id),
            Self::BudgetExceeded { task_id, .. } => *task_id,
            Self::ErrorOccurred { task_id, .. } => *task_id,
            Self::RetryAttempted { task_id, .. } => *task_id,
            _ => None,
        }
    }

    /// Render the wire-format envelope used by the file and WebSocket sinks.
    pub fn to_envelope(&self) -> EventEnvelope {
        let timestamp = self.timestamp();
        let payload = serde_json::to_value(self).unwrap_or_else(|_| json!({}));
        EventEnvelope {
            event_type: self.event_type().to_string(),
            timestamp: timestamp.timestamp() as f64
                + timestamp.timestamp_subsec_nanos() as f64 / 1e9,
            payload,
        }
    }

    pub fn new_id() -> EventId {
        uuid::Uuid::new_v4().to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn envelope_carries_event_type_and_timestamp() {
        let event = KayaEvent::TaskQueued {
            task_id: TaskId::new(),
            session_id: SessionId::new(),
            feature: "login".to_string(),
            timestamp: Utc::now(),
        };
        let envelope = event.to_envelope();
        assert_eq!(envelope.event_type, "task_queued");
        assert!(envelope.timestamp > 0.0);
    }

    #[test]
    fn accessors_scope_correctly() {
        let task_id = TaskId::new();
        let event = KayaEvent::AgentStarted {
            task_id,
            worker: "scribe".to_string(),
            model: "cheap-tier".to_string(),
            timestamp: Utc::now(),
        };
        assert_eq!(event.task_id(), Some(task_id));
        assert_eq!(event.session_id(), None);
        assert_eq!(event.event_type(), "agent_started");
    }

    #[test]
    fn serde_roundtrip() {
        let event = KayaEvent::CircuitBreakerOpened {
            dependency: "anthropic_api".to_string(),
            failure_count: 5,
            timestamp: Utc::now(),
        };
        let json = serde_json::to_string(&event).unwrap();
        let parsed: KayaEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.event_type(), "circuit_breaker_opened");
    }
}
