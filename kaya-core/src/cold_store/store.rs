//! Cold Store — permanent, embedding-indexed pattern store.
//!
//! Backed by RocksDB column families (one per [`Collection`]) when the
//! `heavy-state` feature is enabled, following the grounding repo's
//! `StateStore` column-family layout. Without that feature — or if RocksDB
//! fails to open — falls back to an in-memory `Vec`-backed collection so a
//! missing durable store degrades to empty search results rather than
//! blocking the pipeline (spec.md §4.7).

use super::embedding::{cosine_similarity, Embedder};
use super::types::{Collection, ColdRecord, SearchHit};
use serde_json::Value;
use std::sync::{Arc, RwLock};
use tracing::warn;

#[derive(Debug, thiserror::Error)]
pub enum ColdStoreError {
    #[error("serialization error: {0}")]
    Serialization(String),
    #[cfg(feature = "heavy-state")]
    #[error("rocksdb error: {0}")]
    RocksDb(#[from] rocksdb::Error),
}

pub type ColdStoreResult<T> = Result<T, ColdStoreError>;
pub type SharedColdStore = Arc<ColdStore>;

const ALL_COLLECTIONS: [Collection; 3] = [
    Collection::TestSuccess,
    Collection::BugFixes,
    Collection::HitlAnnotations,
];

trait ColdBackend: Send + Sync {
    fn store(&self, collection: Collection, record: ColdRecord) -> ColdStoreResult<()>;
    fn all(&self, collection: Collection) -> ColdStoreResult<Vec<ColdRecord>>;
}

struct MemoryBackend {
    records: RwLock<std::collections::HashMap<&'static str, Vec<ColdRecord>>>,
}

impl MemoryBackend {
    fn new() -> Self {
        Self {
            records: RwLock::new(std::collections::HashMap::new()),
        }
    }
}

impl ColdBackend for MemoryBackend {
    fn store(&self, collection: Collection, record: ColdRecord) -> ColdStoreResult<()> {
        let mut records = self.records.write().unwrap();
        records.entry(collection.as_str()).or_default().push(record);
        Ok(())
    }

    fn all(&self, collection: Collection) -> ColdStoreResult<Vec<ColdRecord>> {
        Ok(self
            .records
            .read()
            .unwrap()
            .get(collection.as_str())
            .cloned()
            .unwrap_or_default())
    }
}

#[cfg(feature = "heavy-state")]
mod rocks {
    use super::*;
    use rocksdb::{ColumnFamilyDescriptor, Options, DB};

    pub struct RocksBackend {
        db: RwLock<DB>,
    }

    impl RocksBackend {
        pub fn open(path: &std::path::Path) -> ColdStoreResult<Self> {
            let mut opts = Options::default();
            opts.create_if_missing(true);
            opts.create_missing_column_families(true);

            let cf_descriptors: Vec<ColumnFamilyDescriptor> = ALL_COLLECTIONS
                .iter()
                .map(|c| ColumnFamilyDescriptor::new(c.as_str(), Options::default()))
                .collect();

            let db = DB::open_cf_descriptors(&opts, path, cf_descriptors)?;
            Ok(Self { db: RwLock::new(db) })
        }
    }

    impl ColdBackend for RocksBackend {
        fn store(&self, collection: Collection, record: ColdRecord) -> ColdStoreResult<()> {
            let db = self.db.read().unwrap();
            let cf = db
                .cf_handle(collection.as_str())
                .ok_or_else(|| ColdStoreError::Serialization("missing column family".into()))?;
            let bytes = bincode::serde::encode_to_vec(&record, bincode::config::standard())
                .map_err(|e| ColdStoreError::Serialization(e.to_string()))?;
            db.put_cf(cf, record.id.as_bytes(), bytes)?;
            Ok(())
        }

        fn all(&self, collection: Collection) -> ColdStoreResult<Vec<ColdRecord>> {
            let db = self.db.read().unwrap();
            let cf = match db.cf_handle(collection.as_str()) {
                Some(cf) => cf,
                None => return Ok(Vec::new()),
            };
            let mut records = Vec::new();
            let iter = db.iterator_cf(cf, rocksdb::IteratorMode::Start);
            for item in iter {
                let (_, value) = item?;
                if let Ok((record, _)) = bincode::serde::decode_from_slice::<ColdRecord, _>(
                    &value,
                    bincode::config::standard(),
                ) {
                    records.push(record);
                }
            }
            Ok(records)
        }
    }
}

/// Facade over whichever backend is active. Construction never fails the
/// caller: a RocksDB open error falls back to the in-memory backend with a
/// warning rather than propagating.
pub struct ColdStore {
    backend: Box<dyn ColdBackend>,
    embedder: Embedder,
}

impl ColdStore {
    /// In-memory collections only. Used when `heavy-state` is off or no
    /// path is configured.
    pub fn in_memory() -> Self {
        Self {
            backend: Box::new(MemoryBackend::new()),
            embedder: Embedder::new(),
        }
    }

    #[cfg(feature = "heavy-state")]
    pub fn open(path: impl AsRef<std::path::Path>) -> Self {
        match rocks::RocksBackend::open(path.as_ref()) {
            Ok(backend) => Self {
                backend: Box::new(backend),
                embedder: Embedder::new(),
            },
            Err(e) => {
                warn!(error = %e, "failed to open cold store, falling back to in-memory");
                Self::in_memory()
            }
        }
    }

    #[cfg(not(feature = "heavy-state"))]
    pub fn open(_path: impl AsRef<std::path::Path>) -> Self {
        Self::in_memory()
    }

    pub fn shared(self) -> SharedColdStore {
        Arc::new(self)
    }

    /// Append-only store of one record into `collection`.
    pub fn store(&self, collection: Collection, id: &str, text: &str, metadata: Value) {
        let embedding = self.embedder.embed(text);
        let record = ColdRecord {
            id: id.to_string(),
            text: text.to_string(),
            metadata,
            embedding,
        };
        if let Err(e) = self.backend.store(collection, record) {
            warn!(error = %e, collection = %collection, "cold store write failed");
        }
    }

    /// Top-`k` records in `collection` whose cosine similarity to
    /// `query_text` is at least `min_similarity`. Never errors to the
    /// caller — a backend failure yields an empty list.
    pub fn search(
        &self,
        collection: Collection,
        query_text: &str,
        k: usize,
        min_similarity: f64,
    ) -> Vec<SearchHit> {
        let query_embedding = self.embedder.embed(query_text);
        let records = match self.backend.all(collection) {
            Ok(records) => records,
            Err(e) => {
                warn!(error = %e, collection = %collection, "cold store search failed");
                return Vec::new();
            }
        };

        let mut hits: Vec<SearchHit> = records
            .into_iter()
            .map(|r| {
                let similarity = cosine_similarity(&query_embedding, &r.embedding);
                SearchHit {
                    text: r.text,
                    metadata: r.metadata,
                    similarity,
                }
            })
            .filter(|hit| hit.similarity >= min_similarity)
            .collect();

        hits.sort_by(|a, b| b.similarity.partial_cmp(&a.similarity).unwrap_or(std::cmp::Ordering::Equal));
        hits.truncate(k);
        hits
    }
}

impl Default for ColdStore {
    fn default() -> Self {
        Self::in_memory()
    }
}
