//! Hot Store — transient, in-process state for sessions, tasks, the HITL
//! queue, and metrics buckets.
//!
//! Unlike the Cold Store, nothing written here is expected to survive a
//! restart: every key carries a TTL (spec'd per keyspace in `schema.rs`)
//! and the whole store can flip into degraded no-op mode without taking
//! the orchestrator down with it.
//!
//! ```ignore
//! use kaya_core::hot_store::{HotStore, schema, types::SessionRecord};
//!
//! let store = HotStore::new().shared();
//! let session = SessionRecord::new(session_id, 25.0);
//! store.put(&schema::session(session_id), &session, Some(schema::ttl::session()))?;
//! ```

pub mod schema;
pub mod store;
pub mod types;

pub use store::{HotStore, SharedHotStore, StoreError, StoreResult};
pub use types::{MedicAttempt, SessionRecord, TaskRecord, TaskStatus};
