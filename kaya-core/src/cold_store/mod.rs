//! Cold Store — permanent, embedding-indexed pattern store over three
//! collections: `test_success`, `bug_fixes`, `hitl_annotations`.
//!
//! ```ignore
//! use kaya_core::cold_store::{ColdStore, Collection};
//!
//! let store = ColdStore::in_memory().shared();
//! store.store(Collection::BugFixes, "fix-1", "flaky login timeout", metadata);
//! let hits = store.search(Collection::BugFixes, "login timed out", 5, 0.7);
//! ```

pub mod embedding;
pub mod store;
pub mod types;

pub use embedding::{cosine_similarity, embed, Embedder};
pub use store::{ColdStore, ColdStoreError, ColdStoreResult, SharedColdStore};
pub use types::{ColdRecord, Collection, SearchHit};
