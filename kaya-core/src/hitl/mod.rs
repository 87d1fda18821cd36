//! HITL Queue — what is queued for a human when a pipeline escalates.
//!
//! ```ignore
//! use kaya_core::hitl::{HitlQueue, HITLTask, Severity, EscalationReason};
//!
//! let queue = HitlQueue::new(hot_store, cold_store).shared();
//! queue.enqueue(HITLTask::new(task_id, "checkout".into(), paths, 3, last_error, Severity::High, EscalationReason::MaxRetriesExceeded));
//! ```

pub mod queue;
pub mod types;

pub use queue::{HitlError, HitlQueue, HitlResult};
pub use types::{Annotation, EscalationReason, HITLTask, HitlStats, Severity};
