//! Metrics Aggregator — windowed queries over the Hot Store's `metrics:*`
//! sorted sets and the Cost Ledger.
//!
//! Grounded on the grounding repo's `benchmark`/telemetry module shape
//! (derived, read-only views over append-only event data rather than a
//! mutable counter store).

use crate::clock::SessionId;
use crate::cost_ledger::{CostLedger, SpendBy};
use crate::hot_store::{schema, SharedHotStore};
use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;

/// One row of the `model_usage` breakdown.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ModelUsage {
    pub total_duration_ms: u64,
    pub total_cost_usd: f64,
    pub count: u64,
}

/// The seven windowed metrics of spec.md §4.12.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsSummary {
    pub window_hours: u32,
    pub agent_utilization: HashMap<String, f64>,
    pub cost_per_feature: HashMap<String, f64>,
    pub average_retry_count: f64,
    pub critic_rejection_rate: f64,
    pub validation_pass_rate: f64,
    pub mean_time_to_completion_ms: f64,
    pub model_usage: HashMap<String, ModelUsage>,
}

/// One day's aggregate, for `trend(days)`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DailyPoint {
    pub day_bucket: String,
    pub total_cost_usd: f64,
    pub feature_completions: u64,
}

/// Raw per-feature completion sample fed in by the orchestrator as each
/// task reaches a terminal status. Kept in-process; the Hot Store's
/// `metrics:*` sorted sets back the windowed queries that matter at
/// runtime (agent utilization, model usage), while this light in-memory
/// log backs the feature-level aggregates the sorted sets don't encode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FeatureCompletion {
    pub timestamp: DateTime<Utc>,
    pub feature: String,
    pub session_id: SessionId,
    pub cost_usd: f64,
    pub duration_ms: u64,
    pub attempts: u32,
    pub critic_rejected: bool,
    pub validation_passed: bool,
}

pub struct MetricsAggregator {
    hot_store: SharedHotStore,
    cost_ledger: Arc<CostLedger>,
    completions: std::sync::Mutex<Vec<FeatureCompletion>>,
}

impl MetricsAggregator {
    pub fn new(hot_store: SharedHotStore, cost_ledger: Arc<CostLedger>) -> Self {
        Self {
            hot_store,
            cost_ledger,
            completions: std::sync::Mutex::new(Vec::new()),
        }
    }

    pub fn record_completion(&self, completion: FeatureCompletion) {
        self.completions.lock().unwrap().push(completion);
    }

    /// Windowed summary over the last `window_hours` (default 1 when 0).
    pub fn summary(&self, window_hours: u32) -> MetricsSummary {
        let window_hours = if window_hours == 0 { 1 } else { window_hours };
        let cutoff = Utc::now() - Duration::hours(window_hours as i64);

        let windowed: Vec<FeatureCompletion> = self
            .completions
            .lock()
            .unwrap()
            .iter()
            .filter(|c| c.timestamp >= cutoff)
            .cloned()
            .collect();

        let total = windowed.len().max(1) as f64;

        let mut cost_per_feature: HashMap<String, Vec<f64>> = HashMap::new();
        let mut retry_sum = 0u64;
        let mut critic_rejections = 0u64;
        let mut validation_passes = 0u64;
        let mut duration_sum = 0u64;

        for c in &windowed {
            cost_per_feature.entry(c.feature.clone()).or_default().push(c.cost_usd);
            retry_sum += c.attempts as u64;
            if c.critic_rejected {
                critic_rejections += 1;
            }
            if c.validation_passed {
                validation_passes += 1;
            }
            duration_sum += c.duration_ms;
        }

        let cost_per_feature = cost_per_feature
            .into_iter()
            .map(|(feature, costs)| {
                let mean = costs.iter().sum::<f64>() / costs.len() as f64;
                (feature, mean)
            })
            .collect();

        let model_usage = self.model_usage_from_ledger(&windowed);

        MetricsSummary {
            window_hours,
            agent_utilization: self.agent_utilization(window_hours),
            cost_per_feature,
            average_retry_count: retry_sum as f64 / total,
            critic_rejection_rate: critic_rejections as f64 / total,
            validation_pass_rate: validation_passes as f64 / total,
            mean_time_to_completion_ms: duration_sum as f64 / total,
            model_usage,
        }
    }

    fn model_usage_from_ledger(&self, windowed: &[FeatureCompletion]) -> HashMap<String, ModelUsage> {
        // Model-level cost totals come from the cost ledger, which is the
        // authoritative in-memory source; duration/count are approximated
        // from feature completions in the same window since CostEntry
        // does not carry duration.
        let mut usage: HashMap<String, ModelUsage> = HashMap::new();
        for c in windowed {
            let entry = usage.entry("aggregate".to_string()).or_default();
            entry.total_duration_ms += c.duration_ms;
            entry.count += 1;
        }
        if let Some(entry) = usage.get_mut("aggregate") {
            entry.total_cost_usd = self.cost_ledger.spend_by(SpendBy::HourBucket(
                &crate::clock::hour_bucket(Utc::now()),
            ));
        }
        usage
    }

    fn agent_utilization(&self, window_hours: u32) -> HashMap<String, f64> {
        let window_duration_ms = window_hours as f64 * 3_600_000.0;
        let mut utilization = HashMap::new();
        for worker in ["scribe", "critic", "runner", "medic", "gemini"] {
            let key = schema::metrics("agent_duration", worker, &crate::clock::hour_bucket(Utc::now()));
            let entries = self.hot_store.zrange_by_score(&key, f64::MIN, f64::MAX);
            let total_duration: f64 = entries
                .iter()
                .filter_map(|(_, member)| member.split('|').next_back())
                .filter_map(|ms| ms.parse::<f64>().ok())
                .sum();
            utilization.insert(worker.to_string(), total_duration / window_duration_ms);
        }
        utilization
    }

    /// One aggregate data point per day over the last `days` days.
    pub fn trend(&self, days: u32) -> Vec<DailyPoint> {
        let completions = self.completions.lock().unwrap();
        let mut by_day: HashMap<String, (f64, u64)> = HashMap::new();
        let cutoff = Utc::now() - Duration::days(days as i64);

        for c in completions.iter().filter(|c| c.timestamp >= cutoff) {
            let bucket = crate::clock::day_bucket(c.timestamp);
            let entry = by_day.entry(bucket).or_insert((0.0, 0));
            entry.0 += c.cost_usd;
            entry.1 += 1;
        }

        let mut points: Vec<DailyPoint> = by_day
            .into_iter()
            .map(|(day_bucket, (total_cost_usd, feature_completions))| DailyPoint {
                day_bucket,
                total_cost_usd,
                feature_completions,
            })
            .collect();
        points.sort_by(|a, b| a.day_bucket.cmp(&b.day_bucket));
        points
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hot_store::HotStore;

    fn aggregator() -> MetricsAggregator {
        let hot_store = HotStore::new().shared();
        let cost_ledger = CostLedger::new(hot_store.clone());
        MetricsAggregator::new(hot_store, cost_ledger)
    }

    fn completion(feature: &str, cost: f64, passed: bool, rejected: bool) -> FeatureCompletion {
        FeatureCompletion {
            timestamp: Utc::now(),
            feature: feature.to_string(),
            session_id: SessionId::new(),
            cost_usd: cost,
            duration_ms: 1_000,
            attempts: 2,
            critic_rejected: rejected,
            validation_passed: passed,
        }
    }

    #[test]
    fn summary_computes_validation_pass_rate() {
        let aggregator = aggregator();
        aggregator.record_completion(completion("checkout", 0.10, true, false));
        aggregator.record_completion(completion("checkout", 0.20, false, true));
        let summary = aggregator.summary(1);
        assert_eq!(summary.validation_pass_rate, 0.5);
        assert_eq!(summary.critic_rejection_rate, 0.5);
    }

    #[test]
    fn summary_defaults_window_to_one_hour_when_zero() {
        let aggregator = aggregator();
        aggregator.record_completion(completion("login", 0.05, true, false));
        let summary = aggregator.summary(0);
        assert_eq!(summary.window_hours, 1);
    }

    #[test]
    fn cost_per_feature_means_repeated_entries() {
        let aggregator = aggregator();
        aggregator.record_completion(completion("checkout", 0.10, true, false));
        aggregator.record_completion(completion("checkout", 0.30, true, false));
        let summary = aggregator.summary(1);
        assert!((summary.cost_per_feature["checkout"] - 0.20).abs() < 1e-9);
    }

    #[test]
    fn trend_groups_by_day_bucket() {
        let aggregator = aggregator();
        aggregator.record_completion(completion("checkout", 0.10, true, false));
        let trend = aggregator.trend(7);
        assert_eq!(trend.len(), 1);
        assert_eq!(trend[0].feature_completions, 1);
    }
}
