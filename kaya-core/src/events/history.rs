//! Event history and replay, backed by the NDJSON event log file.
//!
//! Unlike the live event bus, history queries read the append-only log
//! written by the file sink, so they work even after the process that
//! produced the events has exited.

use super::types::{EventEnvelope, KayaEvent};
use chrono::{DateTime, Duration, Utc};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

#[derive(Debug, thiserror::Error)]
pub enum HistoryError {
    #[error("failed to read event log: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse event log line: {0}")]
    Parse(#[from] serde_json::Error),
}

pub type HistoryResult<T> = Result<T, HistoryError>;

/// Reads and queries the NDJSON event log written by the file sink.
pub struct EventHistory {
    log_path: PathBuf,
}

impl EventHistory {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        Self {
            log_path: log_path.into(),
        }
    }

    fn read_all(&self) -> HistoryResult<Vec<EventEnvelope>> {
        if !Path::new(&self.log_path).exists() {
            return Ok(Vec::new());
        }
        let contents = std::fs::read_to_string(&self.log_path)?;
        let mut events = Vec::new();
        for line in contents.lines() {
            if line.trim().is_empty() {
                continue;
            }
            events.push(serde_json::from_str::<EventEnvelope>(line)?);
        }
        Ok(events)
    }

    /// All envelopes whose timestamp falls within `[start, end]`.
    pub fn get_events(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    ) -> HistoryResult<Vec<EventEnvelope>> {
        let start_secs = start.timestamp() as f64;
        let end_secs = end.timestamp() as f64;
        let events: Vec<EventEnvelope> = self
            .read_all()?
            .into_iter()
            .filter(|e| e.timestamp >= start_secs && e.timestamp <= end_secs)
            .collect();
        debug!(count = events.len(), "retrieved events from history");
        Ok(events)
    }

    pub fn get_recent_events(&self, minutes: i64) -> HistoryResult<Vec<EventEnvelope>> {
        let end = Utc::now();
        let start = end - Duration::minutes(minutes);
        self.get_events(start, end)
    }

    pub fn get_session_events(&self, session_id: &str) -> HistoryResult<Vec<EventEnvelope>> {
        let all = self.get_recent_events(60 * 24)?;
        Ok(all
            .into_iter()
            .filter(|e| {
                e.payload
                    .get("session_id")
                    .and_then(|v| v.as_str())
                    .is_some_and(|s| s == session_id)
            })
            .collect())
    }

    pub fn get_task_events(&self, task_id: &str) -> HistoryResult<Vec<EventEnvelope>> {
        let all = self.get_recent_events(60 * 24)?;
        Ok(all
            .into_iter()
            .filter(|e| {
                e.payload
                    .get("task_id")
                    .and_then(|v| v.as_str())
                    .is_some_and(|s| s == task_id)
            })
            .collect())
    }

    /// Replay events in `[start, end]` through `callback`, in log order.
    pub async fn replay<F, Fut>(
        &self,
        start: DateTime<Utc>,
        end: DateTime<Utc>,
        mut callback: F,
    ) -> HistoryResult<ReplayStats>
    where
        F: FnMut(EventEnvelope) -> Fut,
        Fut: std::future::Future<Output = ()>,
    {
        let events = self.get_events(start, end)?;
        let total = events.len();
        info!(total, "starting event replay");

        let mut stats = ReplayStats::new();
        for event in events {
            stats.record_event(&event);
            callback(event).await;
        }

        info!(
            total = stats.total_events,
            sessions = stats.sessions_seen,
            tasks = stats.tasks_seen,
            "event replay complete"
        );
        Ok(stats)
    }

    pub fn get_stats(&self, start: DateTime<Utc>, end: DateTime<Utc>) -> HistoryResult<EventStats> {
        let events = self.get_events(start, end)?;
        Ok(EventStats::from_envelopes(&events))
    }
}

#[derive(Debug, Default)]
pub struct ReplayStats {
    pub total_events: usize,
    pub sessions_seen: usize,
    pub tasks_seen: usize,
    pub errors_seen: usize,
    sessions: HashSet<String>,
    tasks: HashSet<String>,
}

impl ReplayStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event(&mut self, envelope: &EventEnvelope) {
        self.total_events += 1;
        if let Some(sid) = envelope.payload.get("session_id").and_then(|v| v.as_str()) {
            if self.sessions.insert(sid.to_string()) {
                self.sessions_seen += 1;
            }
        }
        if let Some(tid) = envelope.payload.get("task_id").and_then(|v| v.as_str()) {
            if self.tasks.insert(tid.to_string()) {
                self.tasks_seen += 1;
            }
        }
        if envelope.event_type == "error_occurred" {
            self.errors_seen += 1;
        }
    }
}

#[derive(Debug, Default, serde::Serialize)]
pub struct EventStats {
    pub total_events: usize,
    pub events_by_type: std::collections::HashMap<String, usize>,
    pub unique_sessions: usize,
    pub unique_tasks: usize,
    pub hitl_escalations: usize,
    pub validation_failures: usize,
    pub circuit_breaker_trips: usize,
}

impl EventStats {
    pub fn from_envelopes(events: &[EventEnvelope]) -> Self {
        let mut stats = Self::default();
        let mut sessions = HashSet::new();
        let mut tasks = HashSet::new();

        for event in events {
            stats.total_events += 1;
            *stats
                .events_by_type
                .entry(event.event_type.clone())
                .or_insert(0) += 1;

            if let Some(sid) = event.payload.get("session_id").and_then(|v| v.as_str()) {
                sessions.insert(sid.to_string());
            }
            if let Some(tid) = event.payload.get("task_id").and_then(|v| v.as_str()) {
                tasks.insert(tid.to_string());
            }

            match event.event_type.as_str() {
                "hitl_escalated" => stats.hitl_escalations += 1,
                "validation_complete"
                    if event.payload.get("passed").and_then(|v| v.as_bool()) == Some(false) =>
                {
                    stats.validation_failures += 1
                }
                "circuit_breaker_opened" => stats.circuit_breaker_trips += 1,
                _ => {}
            }
        }

        stats.unique_sessions = sessions.len();
        stats.unique_tasks = tasks.len();
        stats
    }
}

/// Builder for replaying events with filters applied.
pub struct ReplayBuilder {
    log_path: PathBuf,
    start: DateTime<Utc>,
    end: DateTime<Utc>,
    filter_session: Option<String>,
    filter_task: Option<String>,
    filter_types: Option<Vec<String>>,
}

impl ReplayBuilder {
    pub fn new(log_path: impl Into<PathBuf>) -> Self {
        let now = Utc::now();
        Self {
            log_path: log_path.into(),
            start: now - Duration::hours(24),
            end: now,
            filter_session: None,
            filter_task: None,
            filter_types: None,
        }
    }

    pub fn time_range(mut self, start: DateTime<Utc>, end: DateTime<Utc>) -> Self {
        self.start = start;
        self.end = end;
        self
    }

    pub fn session(mut self, session_id: &str) -> Self {
        self.filter_session = Some(session_id.to_string());
        self
    }

    pub fn task(mut self, task_id: &str) -> Self {
        self.filter_task = Some(task_id.to_string());
        self
    }

    pub fn event_types(mut self, types: Vec<&str>) -> Self {
        self.filter_types = Some(types.into_iter().map(String::from).collect());
        self
    }

    pub fn collect(self) -> HistoryResult<Vec<EventEnvelope>> {
        let history = EventHistory::new(self.log_path);
        let mut events = history.get_events(self.start, self.end)?;

        if let Some(ref session_id) = self.filter_session {
            events.retain(|e| {
                e.payload
                    .get("session_id")
                    .and_then(|v| v.as_str())
                    .is_some_and(|s| s == session_id)
            });
        }
        if let Some(ref task_id) = self.filter_task {
            events.retain(|e| {
                e.payload
                    .get("task_id")
                    .and_then(|v| v.as_str())
                    .is_some_and(|s| s == task_id)
            });
        }
        if let Some(ref types) = self.filter_types {
            events.retain(|e| types.contains(&e.event_type));
        }

        Ok(events)
    }
}

/// Parse the raw `KayaEvent` out of an envelope, for callers that need the
/// strongly-typed form rather than the JSON payload.
pub fn decode(envelope: &EventEnvelope) -> HistoryResult<KayaEvent> {
    Ok(serde_json::from_value(envelope.payload.clone())?)
}
