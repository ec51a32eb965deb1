//! Metrics: counters, gauges and latency histograms

use serde::{Deserialize, Serialize};
use std::fmt;

/// Prune executions by level.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PrunesByLevel {
    pub soft: u64,
    pub hard: u64,
    pub emergency: u64,
}

impl PrunesByLevel {
    pub fn total(&self) -> u64 {
        self.soft + self.hard + self.emergency
    }
}

/// Monotonic counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Counters {
    pub adds: u64,
    pub accesses: u64,
    /// Accesses (or removals) of ids no longer present
    pub not_found: u64,
    pub prunes_by_level: PrunesByLevel,
    /// Host compactions made unnecessary by a pre-compact prune
    pub compactions_prevented: u64,
    pub compressions: u64,
    pub compressions_skipped: u64,
    pub evictions: u64,
    pub tier_demotions: u64,
    pub tier_promotions: u64,
}

impl Counters {
    /// Share of accesses that found a live entry.
    pub fn hit_rate(&self) -> f64 {
        let total = self.accesses + self.not_found;
        if total == 0 {
            0.0
        } else {
            self.accesses as f64 / total as f64
        }
    }
}

/// Fixed-bucket latency histogram (milliseconds).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LatencyHistogram {
    /// Upper bounds of each bucket; the last bucket is unbounded
    bounds: Vec<f64>,
    counts: Vec<u64>,
    pub count: u64,
    pub sum_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

impl LatencyHistogram {
    pub fn new() -> Self {
        let bounds = vec![1.0, 5.0, 10.0, 25.0, 50.0, 100.0, 250.0];
        let counts = vec![0; bounds.len() + 1];
        Self {
            bounds,
            counts,
            count: 0,
            sum_ms: 0.0,
            min_ms: 0.0,
            max_ms: 0.0,
        }
    }

    pub fn record(&mut self, value_ms: f64) {
        let bucket = self
            .bounds
            .iter()
            .position(|&bound| value_ms <= bound)
            .unwrap_or(self.bounds.len());
        self.counts[bucket] += 1;
        if self.count == 0 || value_ms < self.min_ms {
            self.min_ms = value_ms;
        }
        self.count += 1;
        self.sum_ms += value_ms;
        self.max_ms = self.max_ms.max(value_ms);
    }

    pub fn mean(&self) -> f64 {
        if self.count == 0 {
            0.0
        } else {
            self.sum_ms / self.count as f64
        }
    }

    pub fn bucket_counts(&self) -> &[u64] {
        &self.counts
    }
}

/// Point-in-time metrics view returned by the facade.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineMetrics {
    pub counters: Counters,
    /// Current utilization of the context window
    pub utilization: f64,
    pub entries_total: usize,
    /// Current effective tokens
    pub tokens_total: u64,
    pub scoring_latency_ms: LatencyHistogram,
    pub pruning_latency_ms: LatencyHistogram,
}

impl fmt::Display for EngineMetrics {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "EngineMetrics {{ entries: {}, tokens: {}, utilization: {:.3}, adds: {}, hit_rate: {:.2}, prunes: {}, evictions: {}, compressions: {} }}",
            self.entries_total,
            self.tokens_total,
            self.utilization,
            self.counters.adds,
            self.counters.hit_rate(),
            self.counters.prunes_by_level.total(),
            self.counters.evictions,
            self.counters.compressions,
        )
    }
}

/// Mutable metrics state owned by the engine.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct MetricsRegistry {
    pub counters: Counters,
    pub scoring_latency: LatencyHistogram,
    pub pruning_latency: LatencyHistogram,
}

impl MetricsRegistry {
    pub fn snapshot(&self, utilization: f64, entries_total: usize, tokens_total: u64) -> EngineMetrics {
        EngineMetrics {
            counters: self.counters.clone(),
            utilization,
            entries_total,
            tokens_total,
            scoring_latency_ms: self.scoring_latency.clone(),
            pruning_latency_ms: self.pruning_latency.clone(),
        }
    }
}
