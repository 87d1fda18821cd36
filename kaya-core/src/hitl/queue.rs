//! HITL Queue — backed by the Hot Store's `hitl:queue` sorted set, with
//! resolved tasks archived into the Cold Store's `hitl_annotations`
//! collection.
//!
//! Grounded on the escalation-engine shape of a deterministic decision
//! engine over a bounded history, even though that shape originally
//! targeted model-tier routing rather than a human queue — the
//! "state machine with no LLM calls" texture transfers directly.

use super::types::{Annotation, HITLTask, HitlStats, Severity};
use crate::clock::TaskId;
use crate::cold_store::{Collection, SharedColdStore};
use crate::hot_store::{schema, SharedHotStore};
use std::sync::Arc;

#[derive(Debug, thiserror::Error)]
pub enum HitlError {
    #[error("hitl task not found")]
    NotFound,
    #[error("hitl task already resolved")]
    Conflict,
}

pub type HitlResult<T> = Result<T, HitlError>;

pub struct HitlQueue {
    hot_store: SharedHotStore,
    cold_store: SharedColdStore,
}

impl HitlQueue {
    pub fn new(hot_store: SharedHotStore, cold_store: SharedColdStore) -> Self {
        Self { hot_store, cold_store }
    }

    pub fn shared(self) -> Arc<Self> {
        Arc::new(self)
    }

    /// Adds `task` to the priority-ordered queue.
    pub fn enqueue(&self, task: HITLTask) {
        let key = schema::hitl_task(&task.task_id.to_string());
        self.hot_store.put(&key, &task, Some(schema::ttl::hitl_task())).ok();
        self.hot_store.zadd(
            schema::HITL_QUEUE,
            task.priority,
            &task.task_id.to_string(),
            Some(schema::ttl::hitl_task()),
        );
    }

    /// Highest-priority-first page of up to `limit` tasks, optionally
    /// restricted to priorities below `after_priority` for pagination.
    pub fn list(&self, limit: usize, after_priority: Option<f64>) -> Vec<HITLTask> {
        let entries = self.hot_store.zrevrange(schema::HITL_QUEUE, limit.max(1) * 4);
        let mut tasks = Vec::new();
        for (priority, task_id) in entries {
            if let Some(cutoff) = after_priority {
                if priority >= cutoff {
                    continue;
                }
            }
            let key = schema::hitl_task(&task_id);
            if let Ok(Some(task)) = self.hot_store.get::<HITLTask>(&key) {
                tasks.push(task);
            }
            if tasks.len() >= limit {
                break;
            }
        }
        tasks
    }

    pub fn get(&self, task_id: TaskId) -> Option<HITLTask> {
        let key = schema::hitl_task(&task_id.to_string());
        self.hot_store.get::<HITLTask>(&key).ok().flatten()
    }

    /// Resolves `task_id` with `annotation`: archives the task into the
    /// Cold Store's `hitl_annotations` collection and removes it from the
    /// priority queue.
    pub fn resolve(&self, task_id: TaskId, annotation: Annotation) -> HitlResult<()> {
        let key = schema::hitl_task(&task_id.to_string());
        let mut task = self
            .hot_store
            .get::<HITLTask>(&key)
            .ok()
            .flatten()
            .ok_or(HitlError::NotFound)?;

        if task.resolution.is_some() {
            return Err(HitlError::Conflict);
        }

        task.resolution = Some(annotation);
        self.hot_store.put(&key, &task, Some(schema::ttl::hitl_task())).ok();
        self.hot_store.zrem(schema::HITL_QUEUE, &task_id.to_string());

        let text = format!("{}: {}", task.feature, task.last_error);
        let metadata = serde_json::to_value(&task).unwrap_or(serde_json::Value::Null);
        self.cold_store
            .store(Collection::HitlAnnotations, &task_id.to_string(), &text, metadata);

        Ok(())
    }

    /// Queue depth, mean priority, and per-severity counts.
    pub fn stats(&self) -> HitlStats {
        let entries = self.hot_store.zrevrange(schema::HITL_QUEUE, usize::MAX);
        let queue_depth = entries.len();
        let avg_priority = if queue_depth == 0 {
            0.0
        } else {
            entries.iter().map(|(priority, _)| priority).sum::<f64>() / queue_depth as f64
        };

        let mut by_severity = std::collections::HashMap::new();
        for (_, task_id) in &entries {
            let key = schema::hitl_task(task_id);
            if let Ok(Some(task)) = self.hot_store.get::<HITLTask>(&key) {
                *by_severity.entry(severity_label(task.severity)).or_insert(0) += 1;
            }
        }

        HitlStats {
            queue_depth,
            avg_priority,
            by_severity,
        }
    }
}

fn severity_label(severity: Severity) -> String {
    severity.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cold_store::ColdStore;
    use crate::hitl::types::EscalationReason;
    use crate::hot_store::HotStore;

    fn queue() -> HitlQueue {
        HitlQueue::new(HotStore::new().shared(), ColdStore::in_memory().shared())
    }

    fn sample_task(severity: Severity) -> HITLTask {
        HITLTask::new(
            TaskId::new(),
            "checkout".to_string(),
            vec!["tests/checkout.spec.ts".to_string()],
            2,
            "assertion failed".to_string(),
            severity,
            EscalationReason::MaxRetriesExceeded,
        )
    }

    #[test]
    fn enqueue_then_list_orders_by_priority_descending() {
        let queue = queue();
        queue.enqueue(sample_task(Severity::Low));
        queue.enqueue(sample_task(Severity::Critical));
        let listed = queue.list(10, None);
        assert_eq!(listed.len(), 2);
        assert!(listed[0].priority >= listed[1].priority);
    }

    #[test]
    fn get_returns_none_for_unknown_task() {
        let queue = queue();
        assert!(queue.get(TaskId::new()).is_none());
    }

    #[test]
    fn resolve_unknown_task_returns_not_found() {
        let queue = queue();
        let annotation = Annotation {
            root_cause_category: "flaky_selector".to_string(),
            fix_strategy: "use data-testid".to_string(),
            severity: Severity::Low,
            human_notes: String::new(),
            patch_diff: None,
            time_to_resolve_minutes: 5,
        };
        let result = queue.resolve(TaskId::new(), annotation);
        assert!(matches!(result, Err(HitlError::NotFound)));
    }

    #[test]
    fn resolve_removes_from_queue_and_archives() {
        let queue = queue();
        let task = sample_task(Severity::High);
        let task_id = task.task_id;
        queue.enqueue(task);

        let annotation = Annotation {
            root_cause_category: "flaky_selector".to_string(),
            fix_strategy: "use data-testid".to_string(),
            severity: Severity::High,
            human_notes: "confirmed flaky".to_string(),
            patch_diff: None,
            time_to_resolve_minutes: 12,
        };
        queue.resolve(task_id, annotation).unwrap();
        assert!(queue.list(10, None).is_empty());
    }

    #[test]
    fn resolve_twice_returns_conflict() {
        let queue = queue();
        let task = sample_task(Severity::Medium);
        let task_id = task.task_id;
        queue.enqueue(task);

        let annotation = Annotation {
            root_cause_category: "flaky_selector".to_string(),
            fix_strategy: "use data-testid".to_string(),
            severity: Severity::Medium,
            human_notes: String::new(),
            patch_diff: None,
            time_to_resolve_minutes: 3,
        };
        queue.resolve(task_id, annotation.clone()).unwrap();
        let result = queue.resolve(task_id, annotation);
        assert!(matches!(result, Err(HitlError::Conflict)));
    }

    #[test]
    fn stats_reports_depth_and_severity_breakdown() {
        let queue = queue();
        queue.enqueue(sample_task(Severity::Low));
        queue.enqueue(sample_task(Severity::High));
        let stats = queue.stats();
        assert_eq!(stats.queue_depth, 2);
        assert_eq!(stats.by_severity.get("low"), Some(&1));
        assert_eq!(stats.by_severity.get("high"), Some(&1));
    }
}
