//! Pruning controller policy
//!
//! A threshold state machine picks a level from current utilization;
//! a strategy orders eviction candidates; preservation rules filter them.
//! Execution lives on the engine, which owns the store.

use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt;

use crate::advisor::Advisor;
use crate::config::{PruneStrategy, Thresholds};
use crate::entry::{Entry, EntryId, EntryType};
use crate::scoring::ScoringContext;
use crate::semantic::Similarity;

/// Pressure level of a pruning pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneLevel {
    None,
    Soft,
    Hard,
    Emergency,
}

impl PruneLevel {
    /// The level one step below, used by hysteresis.
    pub fn step_down(self) -> PruneLevel {
        match self {
            PruneLevel::Emergency => PruneLevel::Hard,
            PruneLevel::Hard => PruneLevel::Soft,
            PruneLevel::Soft | PruneLevel::None => PruneLevel::None,
        }
    }
}

impl fmt::Display for PruneLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PruneLevel::None => "none",
            PruneLevel::Soft => "soft",
            PruneLevel::Hard => "hard",
            PruneLevel::Emergency => "emergency",
        };
        write!(f, "{}", s)
    }
}

/// Why a decision selected its targets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneRationale {
    BelowThreshold,
    CompressFirst,
    EvictLowRelevance,
    EmergencyPressure,
    PressureUnrelieved,
}

impl fmt::Display for PruneRationale {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            PruneRationale::BelowThreshold => "below_threshold",
            PruneRationale::CompressFirst => "compress_first",
            PruneRationale::EvictLowRelevance => "evict_low_relevance",
            PruneRationale::EmergencyPressure => "emergency_pressure",
            PruneRationale::PressureUnrelieved => "pressure_unrelieved",
        };
        write!(f, "{}", s)
    }
}

/// Output of `decide`, input to `execute`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruningDecision {
    pub level: PruneLevel,
    /// Candidate ids in eviction order, preservation rules already applied
    pub targets: Vec<EntryId>,
    pub predicted_tokens_freed: u64,
    pub rationale: PruneRationale,
}

impl PruningDecision {
    pub fn empty(level: PruneLevel, rationale: PruneRationale) -> Self {
        Self {
            level,
            targets: Vec::new(),
            predicted_tokens_freed: 0,
            rationale,
        }
    }
}

/// Outcome of an executed pruning pass.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PruneResult {
    pub level: PruneLevel,
    pub entries_removed: usize,
    pub tokens_freed: u64,
    pub entries_compressed: usize,
    pub duration_ms: f64,
    pub final_utilization: f64,
    /// True when preservation rules prevented any relief at a non-none level
    pub pressure_unrelieved: bool,
}

impl PruneResult {
    pub fn noop(level: PruneLevel, final_utilization: f64) -> Self {
        Self {
            level,
            entries_removed: 0,
            tokens_freed: 0,
            entries_compressed: 0,
            duration_ms: 0.0,
            final_utilization,
            pressure_unrelieved: false,
        }
    }
}

/// Hysteresis state: after executing a level, the next decision is capped
/// one step lower until utilization rises by at least 5% of the window.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Cooldown {
    pub executed_level: PruneLevel,
    pub utilization_after: f64,
}

/// Utilization gain that releases a cooldown.
pub const COOLDOWN_RELEASE: f64 = 0.05;

/// Map utilization to a raw pressure level.
pub fn level_for(utilization: f64, thresholds: &Thresholds) -> PruneLevel {
    if utilization >= thresholds.emergency {
        PruneLevel::Emergency
    } else if utilization >= thresholds.hard {
        PruneLevel::Hard
    } else if utilization >= thresholds.soft {
        PruneLevel::Soft
    } else {
        PruneLevel::None
    }
}

/// Apply hysteresis to a raw level.
pub fn effective_level(raw: PruneLevel, cooldown: Option<&Cooldown>, utilization: f64) -> PruneLevel {
    match cooldown {
        Some(cd) if utilization < cd.utilization_after + COOLDOWN_RELEASE => {
            raw.min(cd.executed_level.step_down())
        }
        _ => raw,
    }
}

/// Order candidate entries by the configured strategy, least valuable
/// first. Ties keep insertion order (the sorts are stable).
pub fn order_candidates(
    entries: &[&Entry],
    strategy: PruneStrategy,
    context: &ScoringContext,
    similarity: Option<&dyn Similarity>,
    advisor: Option<&dyn Advisor>,
) -> Vec<EntryId> {
    let mut ordered: Vec<&Entry> = entries.to_vec();

    match strategy {
        PruneStrategy::Fifo => {
            ordered.sort_by_key(|e| e.created_at);
        }
        PruneStrategy::Lru => {
            ordered.sort_by_key(|e| e.last_accessed_at);
        }
        PruneStrategy::Relevance => {
            sort_by_relevance(&mut ordered);
        }
        PruneStrategy::Semantic => match (similarity, &context.current_query) {
            (Some(sim), Some(query)) => {
                // Least query-similar entries go first.
                let mut keyed: Vec<(f64, &Entry)> = ordered
                    .into_iter()
                    .map(|e| {
                        let text = e
                            .compressed
                            .as_ref()
                            .and_then(|c| c.summary.as_deref())
                            .unwrap_or(&e.content);
                        (sim.similarity(query, text), e)
                    })
                    .collect();
                keyed.sort_by(|a, b| a.0.partial_cmp(&b.0).unwrap_or(std::cmp::Ordering::Equal));
                return keyed.into_iter().map(|(_, e)| e.id.clone()).collect();
            }
            _ => sort_by_relevance(&mut ordered),
        },
        PruneStrategy::Adaptive => {
            sort_by_relevance(&mut ordered);
            if let Some(advisor) = advisor {
                let ids: Vec<EntryId> = ordered.iter().map(|e| e.id.clone()).collect();
                if let Some(advised) = advisor.advise_prune(&ids, context) {
                    let known: HashSet<&EntryId> = ids.iter().collect();
                    let mut result: Vec<EntryId> =
                        advised.into_iter().filter(|id| known.contains(id)).collect();
                    // Candidates the advisor skipped keep the fallback order.
                    let advised_set: HashSet<&EntryId> = result.iter().collect();
                    let remaining: Vec<EntryId> = ids
                        .iter()
                        .filter(|id| !advised_set.contains(id))
                        .cloned()
                        .collect();
                    result.extend(remaining);
                    return result;
                }
            }
        }
    }

    ordered.into_iter().map(|e| e.id.clone()).collect()
}

fn sort_by_relevance(entries: &mut [&Entry]) {
    entries.sort_by(|a, b| {
        a.relevance
            .partial_cmp(&b.relevance)
            .unwrap_or(std::cmp::Ordering::Equal)
    });
}

/// Preservation rules, applied in order:
/// 1. system prompts are never pruned,
/// 2. pattern-matched entries are never pruned,
/// 3. the newest `preserve_recent_count` entries (within scope) are kept,
/// 4. entries at or above `min_relevance` are kept outside emergency.
pub fn filter_preserved<'a>(
    candidates: Vec<&'a Entry>,
    scope: &[&Entry],
    thresholds: &Thresholds,
    level: PruneLevel,
) -> Vec<&'a Entry> {
    let recent: HashSet<EntryId> = {
        // Scope arrives in insertion order; reversing first makes the
        // stable sort break created_at ties toward later insertion.
        let mut by_created: Vec<&Entry> = scope.to_vec();
        by_created.reverse();
        by_created.sort_by_key(|e| std::cmp::Reverse(e.created_at));
        by_created
            .into_iter()
            .take(thresholds.preserve_recent_count)
            .map(|e| e.id.clone())
            .collect()
    };

    candidates
        .into_iter()
        .filter(|entry| {
            if entry.entry_type == EntryType::SystemPrompt {
                return false;
            }
            if matches_any_pattern(entry, &thresholds.preserve_patterns) {
                return false;
            }
            if recent.contains(&entry.id) {
                return false;
            }
            if level != PruneLevel::Emergency && entry.relevance >= thresholds.min_relevance {
                return false;
            }
            true
        })
        .collect()
}

/// True when any preservation pattern matches the entry.
pub fn matches_any_pattern(entry: &Entry, patterns: &[String]) -> bool {
    patterns.iter().any(|p| entry.matches_pattern(p))
}

/// True when the entry may never be moved to the archived tier.
pub fn archive_exempt(entry: &Entry, patterns: &[String]) -> bool {
    entry.entry_type == EntryType::SystemPrompt || matches_any_pattern(entry, patterns)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryMetadata;

    fn thresholds() -> Thresholds {
        Thresholds {
            soft: 0.5,
            hard: 0.7,
            emergency: 0.85,
            min_relevance: 0.3,
            preserve_recent_count: 0,
            preserve_patterns: Vec::new(),
        }
    }

    fn entry(id: &str, created_at: i64, relevance: f64) -> Entry {
        let mut e = Entry::new("text".to_string(), EntryType::Other, 10, EntryMetadata::default(), created_at);
        e.id = id.to_string();
        e.relevance = relevance;
        e
    }

    #[test]
    fn test_level_thresholds() {
        let t = thresholds();
        assert_eq!(level_for(0.2, &t), PruneLevel::None);
        assert_eq!(level_for(0.5, &t), PruneLevel::Soft);
        assert_eq!(level_for(0.69, &t), PruneLevel::Soft);
        assert_eq!(level_for(0.7, &t), PruneLevel::Hard);
        assert_eq!(level_for(0.85, &t), PruneLevel::Emergency);
        assert_eq!(level_for(1.5, &t), PruneLevel::Emergency);
    }

    #[test]
    fn test_hysteresis_caps_next_level() {
        let cd = Cooldown {
            executed_level: PruneLevel::Hard,
            utilization_after: 0.6,
        };
        // Utilization has not risen 5 points: capped one step below hard
        assert_eq!(effective_level(PruneLevel::Hard, Some(&cd), 0.62), PruneLevel::Soft);
        // Risen enough: raw level applies again
        assert_eq!(effective_level(PruneLevel::Hard, Some(&cd), 0.66), PruneLevel::Hard);
        // No cooldown
        assert_eq!(effective_level(PruneLevel::Hard, None, 0.62), PruneLevel::Hard);
    }

    #[test]
    fn test_fifo_and_lru_ordering() {
        let mut a = entry("a", 30, 0.5);
        let b = entry("b", 10, 0.5);
        let mut c = entry("c", 20, 0.5);
        a.mark_accessed(100);
        c.mark_accessed(200);

        let entries = vec![&a, &b, &c];
        let context = ScoringContext::new(0);

        let fifo = order_candidates(&entries, PruneStrategy::Fifo, &context, None, None);
        assert_eq!(fifo, vec!["b", "c", "a"]);

        let lru = order_candidates(&entries, PruneStrategy::Lru, &context, None, None);
        assert_eq!(lru, vec!["b", "a", "c"]);
    }

    #[test]
    fn test_relevance_ordering() {
        let a = entry("a", 0, 0.9);
        let b = entry("b", 0, 0.1);
        let c = entry("c", 0, 0.5);
        let order = order_candidates(
            &[&a, &b, &c],
            PruneStrategy::Relevance,
            &ScoringContext::new(0),
            None,
            None,
        );
        assert_eq!(order, vec!["b", "c", "a"]);
    }

    #[test]
    fn test_semantic_falls_back_without_similarity() {
        let a = entry("a", 0, 0.9);
        let b = entry("b", 0, 0.1);
        let order = order_candidates(
            &[&a, &b],
            PruneStrategy::Semantic,
            &ScoringContext::new(0).with_query("q"),
            None,
            None,
        );
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn test_semantic_orders_least_similar_first() {
        use crate::semantic::KeywordSimilarity;

        let mut a = entry("a", 0, 0.5);
        a.content = "parser error in lexer".to_string();
        let mut b = entry("b", 0, 0.5);
        b.content = "unrelated trading notes".to_string();

        let sim = KeywordSimilarity;
        let order = order_candidates(
            &[&a, &b],
            PruneStrategy::Semantic,
            &ScoringContext::new(0).with_query("parser error"),
            Some(&sim),
            None,
        );
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn test_adaptive_without_advisor_uses_relevance() {
        let a = entry("a", 0, 0.9);
        let b = entry("b", 0, 0.1);
        let order = order_candidates(
            &[&a, &b],
            PruneStrategy::Adaptive,
            &ScoringContext::new(0),
            None,
            None,
        );
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn test_adaptive_respects_advisor_order() {
        struct ReverseAdvisor;
        impl Advisor for ReverseAdvisor {
            fn advise_score(&self, _: &Entry, _: &ScoringContext) -> Option<f64> {
                None
            }
            fn advise_prune(&self, candidates: &[EntryId], _: &ScoringContext) -> Option<Vec<EntryId>> {
                let mut reversed = candidates.to_vec();
                reversed.reverse();
                Some(reversed)
            }
        }

        let a = entry("a", 0, 0.1);
        let b = entry("b", 0, 0.9);
        let advisor = ReverseAdvisor;
        let order = order_candidates(
            &[&a, &b],
            PruneStrategy::Adaptive,
            &ScoringContext::new(0),
            None,
            Some(&advisor),
        );
        // Relevance order is [a, b]; the advisor reverses it.
        assert_eq!(order, vec!["b", "a"]);
    }

    #[test]
    fn test_preservation_drops_system_prompts() {
        let mut sys = entry("sys", 0, 0.0);
        sys.entry_type = EntryType::SystemPrompt;
        let plain = entry("plain", 0, 0.0);

        let scope = vec![&sys, &plain];
        let kept = filter_preserved(vec![&sys, &plain], &scope, &thresholds(), PruneLevel::Hard);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "plain");
    }

    #[test]
    fn test_preservation_by_pattern() {
        let mut cfg = entry("cfg", 0, 0.0);
        cfg.metadata.file_path = Some("config/app.yaml".to_string());
        let plain = entry("plain", 0, 0.0);

        let mut t = thresholds();
        t.preserve_patterns = vec!["config/".to_string()];

        let scope = vec![&cfg, &plain];
        let kept = filter_preserved(vec![&cfg, &plain], &scope, &t, PruneLevel::Hard);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "plain");
    }

    #[test]
    fn test_preservation_of_recent_entries() {
        let old = entry("old", 10, 0.0);
        let mid = entry("mid", 20, 0.0);
        let new = entry("new", 30, 0.0);

        let mut t = thresholds();
        t.preserve_recent_count = 2;

        let scope = vec![&old, &mid, &new];
        let kept = filter_preserved(vec![&old, &mid, &new], &scope, &t, PruneLevel::Hard);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].id, "old");
    }

    #[test]
    fn test_min_relevance_protection_lifts_at_emergency() {
        let high = entry("high", 0, 0.8);
        let low = entry("low", 0, 0.1);

        let scope = vec![&high, &low];
        let hard = filter_preserved(vec![&high, &low], &scope, &thresholds(), PruneLevel::Hard);
        assert_eq!(hard.len(), 1);
        assert_eq!(hard[0].id, "low");

        let emergency =
            filter_preserved(vec![&high, &low], &scope, &thresholds(), PruneLevel::Emergency);
        assert_eq!(emergency.len(), 2);
    }
}
