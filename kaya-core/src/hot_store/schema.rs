//! Hot Store keyspace — builds the exact key strings spec.md §4.5 names.

use crate::clock::{SessionId, TaskId};

pub fn session(id: SessionId) -> String {
    format!("session:{id}")
}

pub fn task(id: TaskId) -> String {
    format!("task:{id}")
}

pub fn task_status(id: TaskId) -> String {
    format!("task:{id}:status")
}

pub const QUEUE_TASKS: &str = "queue:tasks";

pub fn medic_attempts(task_id: TaskId) -> String {
    format!("medic:attempts:{task_id}")
}

pub fn medic_history(task_id: TaskId) -> String {
    format!("medic:history:{task_id}")
}

pub const HITL_QUEUE: &str = "hitl:queue";

pub fn hitl_task(task_id: &str) -> String {
    format!("hitl:task:{task_id}")
}

pub fn metrics(metric: &str, dimension: &str, hour_bucket: &str) -> String {
    format!("metrics:{metric}:{dimension}:{hour_bucket}")
}

pub fn budget_session(id: SessionId) -> String {
    format!("budget:session:{id}")
}

pub fn circuit_breaker(name: &str) -> String {
    format!("cb:{name}")
}

/// TTLs, in seconds, per spec.md §4.5.
pub mod ttl {
    pub const SESSION_SECS: u64 = 3600;
    pub const TASK_SECS: u64 = 24 * 3600;
    pub const HITL_TASK_SECS: u64 = 24 * 3600;
    pub const METRICS_SECS: u64 = 30 * 24 * 3600;

    pub fn session() -> std::time::Duration {
        std::time::Duration::from_secs(SESSION_SECS)
    }

    pub fn task() -> std::time::Duration {
        std::time::Duration::from_secs(TASK_SECS)
    }

    pub fn hitl_task() -> std::time::Duration {
        std::time::Duration::from_secs(HITL_TASK_SECS)
    }

    pub fn metrics() -> std::time::Duration {
        std::time::Duration::from_secs(METRICS_SECS)
    }
}

/// Bounded length of the `medic:history:{task_id}` list per spec.md §4.5.
pub const MEDIC_HISTORY_LIMIT: usize = 10;
