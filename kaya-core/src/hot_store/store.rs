//! In-memory, TTL-backed Hot Store.
//!
//! Transient by design — every write accepts an optional TTL, and the store
//! degrades to no-ops on writes and empty results on reads once
//! [`HotStore::set_degraded`] is flipped, so the orchestrator keeps running
//! one-shot pipelines even when the store can't be trusted.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::{Arc, RwLock};
use std::time::{Duration, Instant};

use serde::{de::DeserializeOwned, Serialize};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
    #[error("lock poisoned")]
    LockPoisoned,
    #[error("compare-and-set conflict on {0} after {1} attempts")]
    CasConflict(String, u32),
}

pub type StoreResult<T> = Result<T, StoreError>;
pub type SharedHotStore = Arc<HotStore>;

struct Entry {
    value: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Entry {
    fn is_expired(&self) -> bool {
        self.expires_at.is_some_and(|t| Instant::now() >= t)
    }
}

struct SortedSet {
    members: Vec<(f64, String)>,
    expires_at: Option<Instant>,
}

const CAS_MAX_ATTEMPTS: u32 = 3;

/// In-process KV + sorted-set + counter store for hot, short-lived
/// orchestrator state (sessions, tasks, the HITL queue, metrics buckets).
pub struct HotStore {
    kv: RwLock<HashMap<String, Entry>>,
    sorted_sets: RwLock<HashMap<String, SortedSet>>,
    counters: RwLock<HashMap<String, Arc<AtomicI64>>>,
    degraded: AtomicBool,
}

impl HotStore {
    pub fn new() -> Self {
        Self {
            kv: RwLock::new(HashMap::new()),
            sorted_sets: RwLock::new(HashMap::new()),
            counters: RwLock::new(HashMap::new()),
            degraded: AtomicBool::new(false),
        }
    }

    pub fn shared(self) -> SharedHotStore {
        Arc::new(self)
    }

    /// Whether the store is in degraded mode. Surfaced in CLI health output.
    pub fn degraded(&self) -> bool {
        self.degraded.load(Ordering::Relaxed)
    }

    /// Flip degraded mode. While degraded, writes are logged no-ops and
    /// reads return empty/`None`.
    pub fn set_degraded(&self, degraded: bool) {
        self.degraded.store(degraded, Ordering::Relaxed);
    }

    pub fn put<T: Serialize>(&self, key: &str, value: &T, ttl: Option<Duration>) -> StoreResult<()> {
        if self.degraded() {
            warn!(key, "hot store degraded, dropping write");
            return Ok(());
        }
        let bytes = serde_json::to_vec(value)?;
        let entry = Entry {
            value: bytes,
            expires_at: ttl.map(|d| Instant::now() + d),
        };
        let mut kv = self.kv.write().map_err(|_| StoreError::LockPoisoned)?;
        kv.insert(key.to_string(), entry);
        Ok(())
    }

    pub fn get<T: DeserializeOwned>(&self, key: &str) -> StoreResult<Option<T>> {
        if self.degraded() {
            return Ok(None);
        }
        let mut kv = self.kv.write().map_err(|_| StoreError::LockPoisoned)?;
        match kv.get(key) {
            Some(entry) if entry.is_expired() => {
                kv.remove(key);
                Ok(None)
            }
            Some(entry) => Ok(Some(serde_json::from_slice(&entry.value)?)),
            None => Ok(None),
        }
    }

    pub fn delete(&self, key: &str) -> StoreResult<()> {
        let mut kv = self.kv.write().map_err(|_| StoreError::LockPoisoned)?;
        kv.remove(key);
        Ok(())
    }

    /// Atomically replace `key`'s value with `next` if its current value
    /// equals `expected`, retrying up to [`CAS_MAX_ATTEMPTS`] times on
    /// concurrent conflict.
    pub fn compare_and_set<T>(&self, key: &str, expected: &T, next: &T) -> StoreResult<bool>
    where
        T: Serialize + DeserializeOwned + PartialEq,
    {
        for _ in 0..CAS_MAX_ATTEMPTS {
            let current: Option<T> = self.get(key)?;
            if current.as_ref() != Some(expected) {
                return Ok(false);
            }
            self.put(key, next, None)?;
            let confirm: Option<T> = self.get(key)?;
            if confirm.as_ref() == Some(next) {
                return Ok(true);
            }
        }
        Err(StoreError::CasConflict(key.to_string(), CAS_MAX_ATTEMPTS))
    }

    /// Lock-free increment of an integer counter at `key`.
    pub fn incr(&self, key: &str) -> i64 {
        if self.degraded() {
            return 0;
        }
        let counter = {
            let mut counters = self.counters.write().unwrap();
            counters
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(AtomicI64::new(0)))
                .clone()
        };
        counter.fetch_add(1, Ordering::SeqCst) + 1
    }

    pub fn counter(&self, key: &str) -> i64 {
        self.counters
            .read()
            .unwrap()
            .get(key)
            .map(|c| c.load(Ordering::SeqCst))
            .unwrap_or(0)
    }

    pub fn zadd(&self, key: &str, score: f64, member: &str, ttl: Option<Duration>) {
        if self.degraded() {
            warn!(key, "hot store degraded, dropping zadd");
            return;
        }
        let mut sets = self.sorted_sets.write().unwrap();
        let set = sets.entry(key.to_string()).or_insert_with(|| SortedSet {
            members: Vec::new(),
            expires_at: None,
        });
        set.members.retain(|(_, m)| m != member);
        set.members.push((score, member.to_string()));
        set.members
            .sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
        set.expires_at = ttl.map(|d| Instant::now() + d);
    }

    pub fn zrem(&self, key: &str, member: &str) {
        let mut sets = self.sorted_sets.write().unwrap();
        if let Some(set) = sets.get_mut(key) {
            set.members.retain(|(_, m)| m != member);
        }
    }

    /// Members with score in `[min, max]`, ascending by score.
    pub fn zrange_by_score(&self, key: &str, min: f64, max: f64) -> Vec<(f64, String)> {
        if self.degraded() {
            return Vec::new();
        }
        let mut sets = self.sorted_sets.write().unwrap();
        if let Some(set) = sets.get(key) {
            if set.expires_at.is_some_and(|t| Instant::now() >= t) {
                sets.remove(key);
                return Vec::new();
            }
        }
        sets.get(key)
            .map(|set| {
                set.members
                    .iter()
                    .filter(|(score, _)| *score >= min && *score <= max)
                    .cloned()
                    .collect()
            })
            .unwrap_or_default()
    }

    /// All members, highest score first — used by the HITL priority queue.
    pub fn zrevrange(&self, key: &str, limit: usize) -> Vec<(f64, String)> {
        let all = self.zrange_by_score(key, f64::MIN, f64::MAX);
        let mut all = all;
        all.reverse();
        all.truncate(limit);
        all
    }
}

impl Default for HotStore {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn put_and_get_roundtrip() {
        let store = HotStore::new();
        store.put("task:1", &"queued", None).unwrap();
        let value: Option<String> = store.get("task:1").unwrap();
        assert_eq!(value.as_deref(), Some("queued"));
    }

    #[test]
    fn ttl_expiry_removes_entry() {
        let store = HotStore::new();
        store
            .put("task:1", &"queued", Some(Duration::from_millis(1)))
            .unwrap();
        std::thread::sleep(Duration::from_millis(20));
        let value: Option<String> = store.get("task:1").unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn degraded_mode_drops_writes_and_empties_reads() {
        let store = HotStore::new();
        store.put("task:1", &"queued", None).unwrap();
        store.set_degraded(true);
        store.put("task:2", &"queued", None).unwrap();
        let value: Option<String> = store.get("task:1").unwrap();
        assert_eq!(value, None);
    }

    #[test]
    fn compare_and_set_succeeds_on_matching_expected() {
        let store = HotStore::new();
        store.put("task:1:status", &"queued", None).unwrap();
        let ok = store
            .compare_and_set("task:1:status", &"queued".to_string(), &"in_progress".to_string())
            .unwrap();
        assert!(ok);
        let value: Option<String> = store.get("task:1:status").unwrap();
        assert_eq!(value.as_deref(), Some("in_progress"));
    }

    #[test]
    fn compare_and_set_fails_on_mismatched_expected() {
        let store = HotStore::new();
        store.put("task:1:status", &"queued", None).unwrap();
        let ok = store
            .compare_and_set("task:1:status", &"in_progress".to_string(), &"failed".to_string())
            .unwrap();
        assert!(!ok);
    }

    #[test]
    fn incr_is_monotonic() {
        let store = HotStore::new();
        assert_eq!(store.incr("medic:attempts:1"), 1);
        assert_eq!(store.incr("medic:attempts:1"), 2);
        assert_eq!(store.counter("medic:attempts:1"), 2);
    }

    #[test]
    fn zadd_and_zrange_order_by_score() {
        let store = HotStore::new();
        store.zadd("hitl:queue", 0.3, "task-a", None);
        store.zadd("hitl:queue", 0.9, "task-b", None);
        store.zadd("hitl:queue", 0.5, "task-c", None);
        let members = store.zrange_by_score("hitl:queue", 0.0, 1.0);
        let order: Vec<&str> = members.iter().map(|(_, m)| m.as_str()).collect();
        assert_eq!(order, vec!["task-a", "task-c", "task-b"]);
    }

    #[test]
    fn zrevrange_returns_highest_scores_first() {
        let store = HotStore::new();
        store.zadd("hitl:queue", 0.3, "task-a", None);
        store.zadd("hitl:queue", 0.9, "task-b", None);
        let top = store.zrevrange("hitl:queue", 1);
        assert_eq!(top, vec![(0.9, "task-b".to_string())]);
    }

    #[test]
    fn zadd_replaces_existing_member_score() {
        let store = HotStore::new();
        store.zadd("hitl:queue", 0.3, "task-a", None);
        store.zadd("hitl:queue", 0.8, "task-a", None);
        let members = store.zrange_by_score("hitl:queue", 0.0, 1.0);
        assert_eq!(members, vec![(0.8, "task-a".to_string())]);
    }
}
