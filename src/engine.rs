//! The hook facade: public surface of the cache engine
//!
//! All operations are synchronous and execute to completion; the engine is
//! an owned handle presenting a serial view of state. It never blocks on
//! network I/O - similarity and vector storage are pluggable boundaries
//! invoked as plain calls.

use std::time::Instant;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::advisor::Advisor;
use crate::compress;
use crate::config::{EngineConfig, ARCHIVED_COMPRESSION_RATIO};
use crate::entry::{CompressionMethod, Entry, EntryId, EntryMetadata, EntryType, Tier};
use crate::error::Result;
use crate::estimator::{HeuristicEstimator, TokenEstimator};
use crate::metrics::{EngineMetrics, MetricsRegistry};
use crate::pruning::{
    self, Cooldown, PruneLevel, PruneRationale, PruneResult, PruningDecision,
};
use crate::scoring::{self, ScoreWeights, ScoringContext};
use crate::semantic::{Similarity, VectorStore};
use crate::snapshot::{config_fingerprint, Snapshot, SNAPSHOT_VERSION};
use crate::store::EntryStore;
use crate::tiering::{self, TierTransitionResult};

/// How many of the newest entries seed the auto-built scoring context.
const RECENT_CONTEXT_ENTRIES: usize = 10;

/// Time source for the engine. `Fixed` makes tiering and scoring fully
/// deterministic for tests and replay.
#[derive(Debug, Clone, Copy)]
pub enum Clock {
    System,
    Fixed(i64),
}

impl Clock {
    fn now_ms(&self) -> i64 {
        match self {
            Clock::System => Utc::now().timestamp_millis(),
            Clock::Fixed(ms) => *ms,
        }
    }
}

/// Result blob handed back to the host hook runtime, with the exact wire
/// field names of the hook contract.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HookResultPayload {
    pub level: PruneLevel,
    pub tokens_freed: u64,
    pub entries_removed: usize,
    pub compactions_prevented_delta: u64,
}

impl HookResultPayload {
    pub fn new(result: &PruneResult, compactions_prevented_delta: u64) -> Self {
        Self {
            level: result.level,
            tokens_freed: result.tokens_freed,
            entries_removed: result.entries_removed,
            compactions_prevented_delta,
        }
    }

    pub fn to_json(&self) -> serde_json::Value {
        serde_json::to_value(self).unwrap_or(serde_json::Value::Null)
    }
}

/// The context cache engine. One handle owns all state; a process may hold
/// several, each parameterized by its own configuration.
pub struct CacheEngine {
    config: EngineConfig,
    weights: ScoreWeights,
    estimator: Box<dyn TokenEstimator>,
    similarity: Option<Box<dyn Similarity>>,
    vector_store: Option<Box<dyn VectorStore>>,
    advisor: Option<Box<dyn Advisor>>,
    store: EntryStore,
    metrics: MetricsRegistry,
    clock: Clock,
    cooldown: Option<Cooldown>,
}

impl CacheEngine {
    /// Create an engine. Refuses to start on an invalid configuration.
    pub fn new(config: EngineConfig) -> Result<Self> {
        config.validate()?;
        info!(
            window = config.context_window_size,
            strategy = %config.strategy,
            "Initializing context cache engine"
        );
        Ok(Self {
            config,
            weights: ScoreWeights::default(),
            estimator: Box::new(HeuristicEstimator),
            similarity: None,
            vector_store: None,
            advisor: None,
            store: EntryStore::new(),
            metrics: MetricsRegistry::default(),
            clock: Clock::System,
            cooldown: None,
        })
    }

    pub fn with_estimator(mut self, estimator: Box<dyn TokenEstimator>) -> Self {
        self.estimator = estimator;
        self
    }

    pub fn with_similarity(mut self, similarity: Box<dyn Similarity>) -> Self {
        self.similarity = Some(similarity);
        self
    }

    pub fn with_vector_store(mut self, store: Box<dyn VectorStore>) -> Self {
        self.vector_store = Some(store);
        self
    }

    pub fn with_advisor(mut self, advisor: Box<dyn Advisor>) -> Self {
        self.advisor = Some(advisor);
        self
    }

    pub fn with_weights(mut self, weights: ScoreWeights) -> Self {
        self.weights = weights;
        self
    }

    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    /// Advance a fixed clock. No effect on the system clock.
    pub fn advance_clock(&mut self, delta_ms: i64) {
        if let Clock::Fixed(ms) = self.clock {
            self.clock = Clock::Fixed(ms + delta_ms);
        }
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    fn now_ms(&self) -> i64 {
        self.clock.now_ms()
    }

    // ---- core operations -------------------------------------------------

    /// Insert new content, sized by the installed estimator. Fresh entries
    /// start hot with a neutral relevance.
    pub fn add(&mut self, content: impl Into<String>, entry_type: EntryType, metadata: EntryMetadata) -> EntryId {
        let content = content.into();
        let now = self.now_ms();
        let tokens = self.estimator.estimate(&content, entry_type);
        let entry = Entry::new(content, entry_type, tokens, metadata, now);
        let id = self.store.insert(entry);
        self.metrics.counters.adds += 1;
        debug!(id = id.as_str(), tokens, kind = %entry_type, "Added entry");
        id
    }

    /// Touch an entry. Returns false (and counts a miss) for an id that a
    /// prior prune already removed - that is a recoverable signal, not an
    /// error.
    pub fn access(&mut self, id: &str) -> bool {
        let now = self.now_ms();
        if self.store.mark_accessed(id, now) {
            self.metrics.counters.accesses += 1;
            true
        } else {
            self.metrics.counters.not_found += 1;
            false
        }
    }

    /// Current utilization of the context window.
    pub fn get_utilization(&self) -> f64 {
        self.store.total_effective_tokens() as f64 / self.config.context_window_size as f64
    }

    /// Read-only view of all entries in insertion order.
    pub fn get_entries(&self) -> Vec<&Entry> {
        self.store.iter().collect()
    }

    /// Read-only view of one entry.
    pub fn get_entry(&self, id: &str) -> Option<&Entry> {
        self.store.get(id)
    }

    /// Point-in-time metrics.
    pub fn get_metrics(&self) -> EngineMetrics {
        self.metrics.snapshot(
            self.get_utilization(),
            self.store.len(),
            self.store.total_effective_tokens(),
        )
    }

    /// Overwrite an entry's relevance, e.g. from an external ranking pass.
    pub fn set_relevance(&mut self, id: &str, relevance: f64) -> bool {
        self.store.set_relevance(id, relevance)
    }

    /// Drop all entries and metric state.
    pub fn reset(&mut self) {
        info!(entries = self.store.len(), "Resetting engine state");
        self.store.clear();
        self.metrics = MetricsRegistry::default();
        self.cooldown = None;
    }

    // ---- scoring ---------------------------------------------------------

    /// Score every in-scope entry under the context, persist the blended
    /// relevance, and return `(id, score)` ranked descending.
    pub fn score_all(&mut self, context: &ScoringContext) -> Vec<(EntryId, f64)> {
        let started = Instant::now();
        let ids = self.scope_ids(context.session_id.as_deref());

        let mut scored: Vec<(EntryId, f64)> = Vec::with_capacity(ids.len());
        for id in &ids {
            let entry = match self.store.get(id) {
                Some(entry) => entry,
                None => continue,
            };
            let signal = self
                .advisor
                .as_ref()
                .and_then(|a| a.advise_score(entry, context))
                .map(|s| s.clamp(0.0, 1.0))
                .unwrap_or_else(|| {
                    scoring::score_signal(
                        entry,
                        context,
                        &self.config,
                        &self.weights,
                        self.similarity.as_deref(),
                    )
                });
            scored.push((id.clone(), scoring::smooth(entry.relevance, signal)));
        }
        for (id, score) in &scored {
            self.store.set_relevance(id, *score);
        }
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));

        self.metrics
            .scoring_latency
            .record(started.elapsed().as_secs_f64() * 1_000.0);
        scored
    }

    // ---- pruning ---------------------------------------------------------

    /// Pick a level from current utilization (with hysteresis) and build an
    /// ordered, preservation-filtered target list.
    pub fn decide(&self, context: &ScoringContext) -> PruningDecision {
        let utilization = self.get_utilization();
        let raw = pruning::level_for(utilization, &self.config.thresholds);
        let level = pruning::effective_level(raw, self.cooldown.as_ref(), utilization);
        self.decide_at_level(level, context)
    }

    /// Build a decision for an explicitly chosen level.
    pub fn decide_at_level(&self, level: PruneLevel, context: &ScoringContext) -> PruningDecision {
        if level == PruneLevel::None {
            return PruningDecision::empty(PruneLevel::None, PruneRationale::BelowThreshold);
        }

        let scope_ids = self.scope_ids(context.session_id.as_deref());
        let scope: Vec<&Entry> = scope_ids.iter().filter_map(|id| self.store.get(id)).collect();
        let candidates =
            pruning::filter_preserved(scope.clone(), &scope, &self.config.thresholds, level);
        let targets = pruning::order_candidates(
            &candidates,
            self.config.strategy,
            context,
            self.similarity.as_deref(),
            self.advisor.as_deref(),
        );

        let rationale = if targets.is_empty() {
            PruneRationale::PressureUnrelieved
        } else {
            match level {
                PruneLevel::Soft => PruneRationale::CompressFirst,
                PruneLevel::Hard => PruneRationale::EvictLowRelevance,
                PruneLevel::Emergency => PruneRationale::EmergencyPressure,
                PruneLevel::None => PruneRationale::BelowThreshold,
            }
        };
        let predicted_tokens_freed = self.predict_freed(level, &targets);

        PruningDecision {
            level,
            targets,
            predicted_tokens_freed,
            rationale,
        }
    }

    /// Carry out a decision. Best-effort: preservation may leave pressure
    /// unrelieved, which is reported, not raised.
    pub fn execute(&mut self, decision: &PruningDecision) -> PruneResult {
        if decision.level == PruneLevel::None {
            return PruneResult::noop(PruneLevel::None, self.get_utilization());
        }

        let started = Instant::now();
        let window = self.config.context_window_size as f64;
        let mut tokens_freed = 0u64;
        let mut entries_removed = 0usize;
        let mut entries_compressed = 0usize;

        match decision.level {
            PruneLevel::None => unreachable!("handled above"),
            PruneLevel::Soft => {
                // Compress every demotable candidate first.
                for id in &decision.targets {
                    let tier = match self.store.get(id) {
                        Some(entry) => entry.tier,
                        None => continue,
                    };
                    let (next_tier, ratio) = match tier {
                        Tier::Hot => (Tier::Warm, self.config.tiers.warm.compression_ratio),
                        Tier::Warm => (Tier::Cold, self.config.tiers.cold.compression_ratio),
                        Tier::Cold | Tier::Archived => continue,
                    };
                    if ratio >= 1.0 {
                        continue;
                    }
                    if let Some(saved) = self.try_compress(id, ratio) {
                        self.store.set_tier(id, next_tier);
                        self.metrics.counters.tier_demotions += 1;
                        tokens_freed += saved;
                        entries_compressed += 1;
                    }
                }
                // Evict only if compression alone did not get under soft.
                let soft_target = (self.config.thresholds.soft * window) as u64;
                if self.store.total_effective_tokens() > soft_target {
                    let (removed, freed) = self.evict_until(&decision.targets, soft_target);
                    entries_removed += removed;
                    tokens_freed += freed;
                }
            }
            PruneLevel::Hard => {
                let target = (self.config.target_utilization * window) as u64;
                let (removed, freed) = self.evict_until(&decision.targets, target);
                entries_removed = removed;
                tokens_freed = freed;
            }
            PruneLevel::Emergency => {
                let target_utilization = (self.config.target_utilization - 0.10).max(0.0);
                let target = (target_utilization * window) as u64;
                let (removed, freed) = self.evict_until(&decision.targets, target);
                entries_removed = removed;
                tokens_freed = freed;

                // Surviving cold entries move to archived.
                let cold_ids: Vec<EntryId> = self
                    .store
                    .in_tier(Tier::Cold)
                    .iter()
                    .map(|e| e.id.clone())
                    .collect();
                for id in cold_ids {
                    if self.is_archive_exempt(&id) {
                        continue;
                    }
                    if let Some(saved) = self.try_compress(&id, ARCHIVED_COMPRESSION_RATIO) {
                        self.store.set_tier(&id, Tier::Archived);
                        self.metrics.counters.tier_demotions += 1;
                        tokens_freed += saved;
                        entries_compressed += 1;
                    }
                }

                // When eviction alone cannot reach target (everything left
                // is preserved), squeeze survivors into the archived tier,
                // lowest relevance first.
                if self.store.total_effective_tokens() > target {
                    let mut survivors: Vec<(f64, EntryId)> = self
                        .store
                        .iter()
                        .filter(|e| e.tier != Tier::Archived)
                        .map(|e| (e.relevance, e.id.clone()))
                        .collect();
                    survivors.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
                    for (_, id) in survivors {
                        if self.store.total_effective_tokens() <= target {
                            break;
                        }
                        if self.is_archive_exempt(&id) {
                            continue;
                        }
                        if let Some(saved) = self.try_compress(&id, ARCHIVED_COMPRESSION_RATIO) {
                            self.store.set_tier(&id, Tier::Archived);
                            self.metrics.counters.tier_demotions += 1;
                            tokens_freed += saved;
                            entries_compressed += 1;
                        }
                    }
                }
            }
        }

        let final_utilization = self.get_utilization();
        let duration_ms = started.elapsed().as_secs_f64() * 1_000.0;
        self.metrics.pruning_latency.record(duration_ms);
        match decision.level {
            PruneLevel::Soft => self.metrics.counters.prunes_by_level.soft += 1,
            PruneLevel::Hard => self.metrics.counters.prunes_by_level.hard += 1,
            PruneLevel::Emergency => self.metrics.counters.prunes_by_level.emergency += 1,
            PruneLevel::None => {}
        }

        let freed_nothing = entries_removed == 0 && entries_compressed == 0;
        let entry_threshold = match decision.level {
            PruneLevel::Soft => self.config.thresholds.soft,
            PruneLevel::Hard => self.config.thresholds.hard,
            PruneLevel::Emergency => self.config.thresholds.emergency,
            PruneLevel::None => f64::INFINITY,
        };
        // Unrelieved when nothing moved, or when preservation kept
        // utilization at or above the line that triggered this level.
        let pressure_unrelieved = freed_nothing || final_utilization >= entry_threshold;
        if pressure_unrelieved {
            warn!(level = %decision.level, final_utilization, "Prune pass left pressure unrelieved");
        } else {
            debug!(
                level = %decision.level,
                entries_removed,
                entries_compressed,
                tokens_freed,
                "Executed prune pass"
            );
        }
        if !freed_nothing {
            self.cooldown = Some(Cooldown {
                executed_level: decision.level,
                utilization_after: final_utilization,
            });
        }

        PruneResult {
            level: decision.level,
            entries_removed,
            tokens_freed,
            entries_compressed,
            duration_ms,
            final_utilization,
            pressure_unrelieved,
        }
    }

    // ---- hook events -----------------------------------------------------

    /// Before a user prompt reaches the model: score everything against the
    /// query, then prune as pressure demands.
    pub fn on_user_prompt_submit(&mut self, query: &str, session_id: &str) -> PruneResult {
        let context = self
            .build_context(Some(query), Some(session_id));
        self.score_all(&context);
        let decision = self.decide(&context);
        self.execute(&decision)
    }

    /// After a tool ran: cache its output, then run a lightweight
    /// (compression-only) pass if utilization has crossed the soft line.
    pub fn on_post_tool_use(&mut self, tool_name: &str, tool_output: &str, session_id: &str) -> EntryId {
        let metadata = EntryMetadata::for_session(session_id)
            .with_tool_name(tool_name)
            .with_source(format!("tool:{}", tool_name));
        let id = self.add(tool_output, EntryType::ToolResult, metadata);

        if self.get_utilization() >= self.config.thresholds.soft {
            let context = self.build_context(None, Some(session_id));
            let decision = self.decide_at_level(PruneLevel::Soft, &context);
            let result = self.execute(&decision);
            debug!(
                tokens_freed = result.tokens_freed,
                "Lightweight prune after tool result"
            );
        }
        id
    }

    /// The host is about to compact its context: force an emergency pass so
    /// the compaction becomes unnecessary.
    pub fn on_pre_compact(&mut self, session_id: &str) -> PruneResult {
        let context = self.build_context(None, Some(session_id));
        self.score_all(&context);
        let decision = self.decide_at_level(PruneLevel::Emergency, &context);
        let result = self.execute(&decision);
        if !result.pressure_unrelieved {
            self.metrics.counters.compactions_prevented += 1;
        }
        result
    }

    // ---- tier transitions ------------------------------------------------

    /// Batch pass assigning every entry its target tier, compressing on
    /// demotion. Idempotent under an unchanged clock.
    pub fn transition_tiers(&mut self) -> TierTransitionResult {
        let now = self.now_ms();
        let mut result = TierTransitionResult::default();
        let ids: Vec<EntryId> = self.store.ids().to_vec();

        for id in ids {
            let (current, target, reaccessed) = match self.store.get(&id) {
                Some(entry) => {
                    // A compressed entry only counts as re-accessed when the
                    // access landed after the compression; otherwise a young
                    // entry demoted under pressure would bounce straight
                    // back to hot.
                    let reaccessed = entry
                        .compressed
                        .as_ref()
                        .map(|c| entry.last_accessed_at > c.compressed_at)
                        .unwrap_or(true);
                    (
                        entry.tier,
                        tiering::target_tier(entry, &self.config, now),
                        reaccessed,
                    )
                }
                None => continue,
            };
            // Archived entries leave only through promote-on-access.
            if current == Tier::Archived && target != Tier::Hot {
                continue;
            }
            if target == current {
                continue;
            }

            if tier_rank(target) > tier_rank(current) {
                let ratio = match target {
                    Tier::Warm => self.config.tiers.warm.compression_ratio,
                    Tier::Cold => self.config.tiers.cold.compression_ratio,
                    Tier::Hot | Tier::Archived => 1.0,
                };
                if ratio < 1.0 {
                    match self.try_compress(&id, ratio) {
                        Some(saved) => {
                            result.compressed += 1;
                            result.tokens_saved += saved;
                        }
                        None => result.compressions_skipped += 1,
                    }
                }
                self.store.set_tier(&id, target);
                self.metrics.counters.tier_demotions += 1;
                match (current, target) {
                    (Tier::Hot, Tier::Warm) => result.hot_to_warm += 1,
                    (_, Tier::Cold) => result.warm_to_cold += 1,
                    (_, Tier::Archived) => result.cold_to_archived += 1,
                    _ => {}
                }
            } else if target == Tier::Hot && reaccessed {
                self.store.clear_compression(&id);
                self.store.set_tier(&id, Tier::Hot);
                self.metrics.counters.tier_promotions += 1;
                result.promoted += 1;
            }
        }

        if !result.is_noop() {
            debug!(
                hot_to_warm = result.hot_to_warm,
                warm_to_cold = result.warm_to_cold,
                promoted = result.promoted,
                tokens_saved = result.tokens_saved,
                "Tier transition pass"
            );
        }
        result
    }

    // ---- snapshots -------------------------------------------------------

    /// Serialize the full engine state to an opaque blob.
    pub fn save_snapshot(&self, name: &str) -> Result<Vec<u8>> {
        let snapshot = Snapshot {
            engine_version: SNAPSHOT_VERSION.to_string(),
            name: name.to_string(),
            created_at: self.now_ms(),
            config_fingerprint: config_fingerprint(&self.config),
            entries: self.store.iter().cloned().collect(),
            next_seq: self.store.next_seq(),
            metrics: self.metrics.clone(),
        };
        snapshot.encode()
    }

    /// Replace current state with a snapshot. Atomic: on any error the
    /// engine keeps its prior state.
    pub fn restore(&mut self, blob: &[u8]) -> Result<()> {
        let snapshot = Snapshot::decode(blob)?;
        if snapshot.config_fingerprint != config_fingerprint(&self.config) {
            warn!(
                name = snapshot.name.as_str(),
                "Restoring a snapshot taken under a different configuration"
            );
        }
        self.store = EntryStore::rebuild(snapshot.entries, snapshot.next_seq);
        self.metrics = snapshot.metrics;
        self.cooldown = None;
        info!(
            name = snapshot.name.as_str(),
            entries = self.store.len(),
            "Restored snapshot"
        );
        Ok(())
    }

    // ---- internals -------------------------------------------------------

    /// Ids visible to an operation. With session isolation on, queries are
    /// scoped to one session; token accounting stays global.
    fn scope_ids(&self, session_id: Option<&str>) -> Vec<EntryId> {
        if !self.config.session_isolation {
            return self.store.ids().to_vec();
        }
        match session_id {
            Some(sid) => self.store.session_ids(sid),
            None => {
                warn!("Session isolation is on but no session id was given; scoping to nothing");
                Vec::new()
            }
        }
    }

    fn build_context(&self, query: Option<&str>, session_id: Option<&str>) -> ScoringContext {
        let scope = self.scope_ids(session_id);
        let recent: Vec<EntryId> = scope
            .iter()
            .rev()
            .take(RECENT_CONTEXT_ENTRIES)
            .rev()
            .cloned()
            .collect();

        let mut active_files = Vec::new();
        let mut active_tools = Vec::new();
        for id in &recent {
            if let Some(entry) = self.store.get(id) {
                if let Some(path) = &entry.metadata.file_path {
                    if !active_files.contains(path) {
                        active_files.push(path.clone());
                    }
                }
                if let Some(tool) = &entry.metadata.tool_name {
                    if !active_tools.contains(tool) {
                        active_tools.push(tool.clone());
                    }
                }
            }
        }

        ScoringContext {
            current_query: query.map(String::from),
            active_files,
            active_tools,
            session_id: session_id.map(String::from),
            timestamp: self.now_ms(),
            recent_entry_ids: recent,
        }
    }

    /// Evict targets in order until the effective total drops to the
    /// target. Ids already gone are skipped silently.
    fn evict_until(&mut self, targets: &[EntryId], target_tokens: u64) -> (usize, u64) {
        let mut removed = 0usize;
        let mut freed = 0u64;
        for id in targets {
            if self.store.total_effective_tokens() <= target_tokens {
                break;
            }
            if let Some(entry) = self.store.remove(id) {
                freed += entry.effective_tokens();
                removed += 1;
                self.metrics.counters.evictions += 1;
                debug!(id = id.as_str(), "Evicted entry");
            }
        }
        (removed, freed)
    }

    /// Compress one entry at the given ratio, without changing its tier.
    /// Returns the effective tokens saved, or `None` when skipped because
    /// it would not reduce the entry's footprint.
    fn try_compress(&mut self, id: &str, ratio: f64) -> Option<u64> {
        let now = self.now_ms();
        let method = self.config.compression_strategy;

        let (before, compressed) = {
            let entry = self.store.get(id)?;
            let vector_ref = match (method, self.vector_store.as_mut()) {
                (CompressionMethod::Embedding | CompressionMethod::Hybrid, Some(vs)) => {
                    Some(vs.put(id, &entry.content))
                }
                _ => None,
            };
            let before = entry.effective_tokens();
            (
                before,
                compress::compress(entry, method, ratio, vector_ref, self.estimator.as_ref(), now),
            )
        };

        match compressed {
            Some(compressed) => {
                let saved = before.saturating_sub(compressed.compressed_tokens);
                self.store.apply_compression(id, compressed);
                self.metrics.counters.compressions += 1;
                Some(saved)
            }
            None => {
                self.metrics.counters.compressions_skipped += 1;
                debug!(id, "Compression skipped: would not reduce effective tokens");
                None
            }
        }
    }

    fn is_archive_exempt(&self, id: &str) -> bool {
        self.store
            .get(id)
            .map(|e| pruning::archive_exempt(e, &self.config.thresholds.preserve_patterns))
            .unwrap_or(true)
    }

    /// Estimate how many tokens a decision would free.
    fn predict_freed(&self, level: PruneLevel, targets: &[EntryId]) -> u64 {
        match level {
            PruneLevel::None => 0,
            PruneLevel::Soft => targets
                .iter()
                .filter_map(|id| self.store.get(id))
                .map(|entry| {
                    let ratio = match entry.tier {
                        Tier::Hot => self.config.tiers.warm.compression_ratio,
                        Tier::Warm => self.config.tiers.cold.compression_ratio,
                        Tier::Cold | Tier::Archived => 1.0,
                    };
                    let projected = ((entry.tokens as f64 * ratio).ceil()) as u64;
                    entry.effective_tokens().saturating_sub(projected)
                })
                .sum(),
            PruneLevel::Hard | PruneLevel::Emergency => {
                let window = self.config.context_window_size as f64;
                let target_utilization = if level == PruneLevel::Hard {
                    self.config.target_utilization
                } else {
                    (self.config.target_utilization - 0.10).max(0.0)
                };
                let target = (target_utilization * window) as u64;
                let mut running = self.store.total_effective_tokens();
                let mut predicted = 0u64;
                for id in targets {
                    if running <= target {
                        break;
                    }
                    if let Some(entry) = self.store.get(id) {
                        let tokens = entry.effective_tokens();
                        predicted += tokens;
                        running = running.saturating_sub(tokens);
                    }
                }
                predicted
            }
        }
    }
}

fn tier_rank(tier: Tier) -> u8 {
    match tier {
        Tier::Hot => 0,
        Tier::Warm => 1,
        Tier::Cold => 2,
        Tier::Archived => 3,
    }
}
