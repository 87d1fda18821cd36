//! Rate Limiter — per-vendor token bucket with a blocking async `acquire`.
//!
//! Grounded on the retrieval pack's `governor` usage (declared as a
//! dependency in ProdByBuddha-rust_agency's Cargo.toml); the grounding
//! repo itself has no token-bucket rate limiter of its own, so this is
//! built fresh from `governor`'s primitives rather than adapted from
//! existing code.

use governor::clock::{Clock, DefaultClock};
use governor::{Quota, RateLimiter as GovernorLimiter};
use std::collections::HashMap;
use std::num::NonZeroU32;
use std::sync::RwLock;

type DirectLimiter = GovernorLimiter<
    governor::state::NotKeyed,
    governor::state::InMemoryState,
    governor::clock::DefaultClock,
>;

/// Keyed registry of one token bucket per vendor string (e.g. `"gemini"`,
/// `"anthropic"`).
pub struct RateLimiter {
    default_rps: NonZeroU32,
    per_vendor_rps: HashMap<String, NonZeroU32>,
    buckets: RwLock<HashMap<String, std::sync::Arc<DirectLimiter>>>,
}

impl RateLimiter {
    /// `default_rps` applies to any vendor not named in `per_vendor_rps`.
    pub fn new(default_rps: u32, per_vendor_rps: HashMap<String, u32>) -> Self {
        Self {
            default_rps: NonZeroU32::new(default_rps.max(1)).unwrap(),
            per_vendor_rps: per_vendor_rps
                .into_iter()
                .map(|(k, v)| (k, NonZeroU32::new(v.max(1)).unwrap()))
                .collect(),
            buckets: RwLock::new(HashMap::new()),
        }
    }

    fn bucket_for(&self, vendor: &str) -> std::sync::Arc<DirectLimiter> {
        if let Some(bucket) = self.buckets.read().unwrap().get(vendor) {
            return bucket.clone();
        }
        let rps = self
            .per_vendor_rps
            .get(vendor)
            .copied()
            .unwrap_or(self.default_rps);
        let bucket = std::sync::Arc::new(GovernorLimiter::direct(Quota::per_second(rps)));
        self.buckets
            .write()
            .unwrap()
            .insert(vendor.to_string(), bucket.clone());
        bucket
    }

    /// Blocks (asynchronously) until `vendor`'s bucket has a token
    /// available, then consumes one.
    pub async fn acquire(&self, vendor: &str) {
        let bucket = self.bucket_for(vendor);
        loop {
            match bucket.check() {
                Ok(_) => return,
                Err(not_until) => {
                    let wait = not_until.wait_time_from(DefaultClock::default().now());
                    tokio::time::sleep(wait).await;
                }
            }
        }
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(10, HashMap::new())
    }
}
