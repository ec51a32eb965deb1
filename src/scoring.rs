//! Relevance scoring
//!
//! Combines recency, type priors, access frequency, active-file and
//! active-tool signals, and query similarity into a bounded score per
//! entry, minus a per-tier decay. Scoring never fails; missing signals
//! contribute zero.

use serde::{Deserialize, Serialize};

use crate::config::EngineConfig;
use crate::entry::{Entry, EntryId, EntryType, Tier};
use crate::semantic::Similarity;

/// Transient input to a scoring pass.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScoringContext {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_query: Option<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active_files: Vec<String>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub active_tools: Vec<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    /// Epoch milliseconds
    pub timestamp: i64,

    /// Most recently inserted entry ids, newest last
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub recent_entry_ids: Vec<EntryId>,
}

impl ScoringContext {
    pub fn new(timestamp: i64) -> Self {
        Self {
            timestamp,
            ..Default::default()
        }
    }

    pub fn with_query(mut self, query: impl Into<String>) -> Self {
        self.current_query = Some(query.into());
        self
    }

    pub fn with_session(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn with_active_files(mut self, files: Vec<String>) -> Self {
        self.active_files = files;
        self
    }

    pub fn with_active_tools(mut self, tools: Vec<String>) -> Self {
        self.active_tools = tools;
        self
    }
}

/// Weights of the scoring signals. Must sum to at most 1 so the combined
/// base stays bounded before decay subtraction.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreWeights {
    pub recency: f64,
    pub type_prior: f64,
    pub access: f64,
    pub active_file: f64,
    pub active_tool: f64,
    pub query: f64,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            recency: 0.30,
            type_prior: 0.20,
            access: 0.10,
            active_file: 0.15,
            active_tool: 0.10,
            query: 0.15,
        }
    }
}

impl ScoreWeights {
    pub fn sum(&self) -> f64 {
        self.recency + self.type_prior + self.access + self.active_file + self.active_tool + self.query
    }
}

/// Fixed prior by entry type.
pub fn type_prior(entry_type: EntryType) -> f64 {
    match entry_type {
        EntryType::SystemPrompt => 1.0,
        EntryType::UserMessage => 0.8,
        EntryType::AssistantMessage => 0.6,
        EntryType::FileRead | EntryType::FileWrite => 0.6,
        EntryType::ToolResult | EntryType::BashOutput => 0.4,
        EntryType::Other => 0.3,
    }
}

/// Exponential recency on time since last access, with time constant tau.
pub fn recency_factor(entry: &Entry, now: i64, tau_ms: f64) -> f64 {
    let idle = entry.idle_ms(now) as f64;
    (-idle / tau_ms.max(1.0)).exp()
}

/// Saturating access-frequency factor in [0, 1).
pub fn access_factor(access_count: u64) -> f64 {
    let n = access_count as f64;
    n / (n + 4.0)
}

/// Additive relevance decay by tier.
pub fn tier_decay(tier: Tier, decay_rate: f64) -> f64 {
    match tier {
        Tier::Hot => 0.0,
        Tier::Warm => decay_rate,
        Tier::Cold => 2.0 * decay_rate,
        Tier::Archived => 3.0 * decay_rate,
    }
}

/// Compute the raw weighted signal for one entry under a context.
pub fn score_signal(
    entry: &Entry,
    context: &ScoringContext,
    config: &EngineConfig,
    weights: &ScoreWeights,
    similarity: Option<&dyn Similarity>,
) -> f64 {
    let tau = config.tiers.hot.max_age_ms as f64;

    let mut base = weights.recency * recency_factor(entry, context.timestamp, tau)
        + weights.type_prior * type_prior(entry.entry_type)
        + weights.access * access_factor(entry.access_count);

    if let Some(path) = &entry.metadata.file_path {
        if context.active_files.iter().any(|f| f == path) {
            base += weights.active_file;
        }
    }
    if let Some(tool) = &entry.metadata.tool_name {
        if context.active_tools.iter().any(|t| t == tool) {
            base += weights.active_tool;
        }
    }
    if let (Some(query), Some(sim)) = (&context.current_query, similarity) {
        let text = entry
            .compressed
            .as_ref()
            .and_then(|c| c.summary.as_deref())
            .unwrap_or(&entry.content);
        base += weights.query * sim.similarity(query, text).clamp(0.0, 1.0);
    }

    (base - tier_decay(entry.tier, config.decay_rate)).clamp(0.0, 1.0)
}

/// Blend a freshly computed signal with the previous relevance so
/// externally seeded or advisor-set scores stay meaningful across
/// scoring passes.
pub fn smooth(previous: f64, signal: f64) -> f64 {
    ((previous + signal) / 2.0).clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::EntryMetadata;
    use crate::semantic::KeywordSimilarity;

    fn make_entry(entry_type: EntryType, now: i64) -> Entry {
        Entry::new("fix the parser error".to_string(), entry_type, 50, EntryMetadata::default(), now)
    }

    #[test]
    fn test_weights_sum_to_at_most_one() {
        assert!(ScoreWeights::default().sum() <= 1.0 + f64::EPSILON);
    }

    #[test]
    fn test_type_prior_table() {
        assert_eq!(type_prior(EntryType::SystemPrompt), 1.0);
        assert_eq!(type_prior(EntryType::UserMessage), 0.8);
        assert_eq!(type_prior(EntryType::FileRead), 0.6);
        assert_eq!(type_prior(EntryType::BashOutput), 0.4);
        assert_eq!(type_prior(EntryType::Other), 0.3);
    }

    #[test]
    fn test_recency_decays_with_idle_time() {
        let entry = make_entry(EntryType::Other, 0);
        let fresh = recency_factor(&entry, 0, 1_000.0);
        let stale = recency_factor(&entry, 5_000, 1_000.0);
        assert!((fresh - 1.0).abs() < 1e-9);
        assert!(stale < 0.01);
    }

    #[test]
    fn test_access_factor_saturates() {
        assert_eq!(access_factor(0), 0.0);
        assert!(access_factor(4) > 0.49 && access_factor(4) < 0.51);
        assert!(access_factor(1_000) < 1.0);
        assert!(access_factor(10) > access_factor(2));
    }

    #[test]
    fn test_tier_decay_steps() {
        assert_eq!(tier_decay(Tier::Hot, 0.1), 0.0);
        assert_eq!(tier_decay(Tier::Warm, 0.1), 0.1);
        assert_eq!(tier_decay(Tier::Cold, 0.1), 0.2);
        assert!((tier_decay(Tier::Archived, 0.1) - 0.3).abs() < 1e-12);
    }

    #[test]
    fn test_score_is_bounded() {
        let config = EngineConfig::default();
        let weights = ScoreWeights::default();
        let context = ScoringContext::new(0);
        let entry = make_entry(EntryType::SystemPrompt, 0);

        let score = score_signal(&entry, &context, &config, &weights, None);
        assert!((0.0..=1.0).contains(&score));
    }

    #[test]
    fn test_active_file_signal() {
        let config = EngineConfig::default();
        let weights = ScoreWeights::default();
        let mut entry = make_entry(EntryType::FileRead, 0);
        entry.metadata.file_path = Some("src/parser.rs".to_string());

        let without = score_signal(&entry, &ScoringContext::new(0), &config, &weights, None);
        let with = score_signal(
            &entry,
            &ScoringContext::new(0).with_active_files(vec!["src/parser.rs".to_string()]),
            &config,
            &weights,
            None,
        );
        assert!((with - without - weights.active_file).abs() < 1e-9);
    }

    #[test]
    fn test_active_tool_signal() {
        let config = EngineConfig::default();
        let weights = ScoreWeights::default();
        let mut entry = make_entry(EntryType::ToolResult, 0);
        entry.metadata.tool_name = Some("bash".to_string());

        let context = ScoringContext::new(0).with_active_tools(vec!["bash".to_string()]);
        let without = score_signal(&entry, &ScoringContext::new(0), &config, &weights, None);
        let with = score_signal(&entry, &context, &config, &weights, None);
        assert!(with > without);
    }

    #[test]
    fn test_query_similarity_contributes_only_when_configured() {
        let config = EngineConfig::default();
        let weights = ScoreWeights::default();
        let entry = make_entry(EntryType::UserMessage, 0);
        let context = ScoringContext::new(0).with_query("parser error");

        let without_sim = score_signal(&entry, &context, &config, &weights, None);
        let sim = KeywordSimilarity;
        let with_sim = score_signal(&entry, &context, &config, &weights, Some(&sim));
        assert!(with_sim > without_sim);
    }

    #[test]
    fn test_decay_lowers_cold_entries() {
        let config = EngineConfig::default();
        let weights = ScoreWeights::default();
        let hot = make_entry(EntryType::Other, 0);
        let mut cold = make_entry(EntryType::Other, 0);
        cold.tier = Tier::Cold;

        let context = ScoringContext::new(0);
        let hot_score = score_signal(&hot, &context, &config, &weights, None);
        let cold_score = score_signal(&cold, &context, &config, &weights, None);
        assert!(hot_score > cold_score);
    }

    #[test]
    fn test_smooth_blends_equally() {
        assert!((smooth(0.9, 0.5) - 0.7).abs() < 1e-12);
        assert!((smooth(0.1, 0.5) - 0.3).abs() < 1e-12);
    }
}
