//! Engine configuration
//!
//! A single immutable configuration struct bound at construction, with a
//! fluent builder, a partial-config merge step for host-supplied key-value
//! maps, and preset profiles for common deployments.

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::entry::CompressionMethod;
use crate::error::{EngineError, Result};

/// Compression ratio applied to entries forced into the archived tier.
pub const ARCHIVED_COMPRESSION_RATIO: f64 = 0.03;

/// Candidate ordering used by the pruning controller.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PruneStrategy {
    /// Ascending creation time
    Fifo,
    /// Ascending last-access time
    Lru,
    /// Ascending relevance score
    Relevance,
    /// Ascending query similarity (falls back to relevance without a
    /// similarity function)
    Semantic,
    /// Advisor-driven ordering, falling back to relevance
    Adaptive,
}

impl std::fmt::Display for PruneStrategy {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            PruneStrategy::Fifo => "fifo",
            PruneStrategy::Lru => "lru",
            PruneStrategy::Relevance => "relevance",
            PruneStrategy::Semantic => "semantic",
            PruneStrategy::Adaptive => "adaptive",
        };
        write!(f, "{}", s)
    }
}

/// Per-tier aging and compression policy.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierConfig {
    /// Upper age bound for residency in this tier (ms)
    pub max_age_ms: i64,

    /// Compression ratio applied to entries demoted into this tier,
    /// in (0, 1]. 1.0 means no compression.
    pub compression_ratio: f64,
}

/// Aging policy across the hot/warm/cold tiers. The archived tier is
/// reached only under emergency pressure and compresses at
/// [`ARCHIVED_COMPRESSION_RATIO`].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct TierPolicy {
    pub hot: TierConfig,
    pub warm: TierConfig,
    pub cold: TierConfig,
}

/// Utilization thresholds and preservation rules for the pruning
/// controller.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Thresholds {
    /// Utilization at which proactive compression starts
    pub soft: f64,

    /// Utilization at which low-relevance eviction starts
    pub hard: f64,

    /// Utilization at which aggressive eviction + archival starts
    pub emergency: f64,

    /// Entries scoring at or above this are protected outside emergency
    pub min_relevance: f64,

    /// The newest N entries by creation time are never pruned
    pub preserve_recent_count: usize,

    /// Substring/glob patterns matched against file path, source and tags;
    /// matching entries are never evicted and never archived
    pub preserve_patterns: Vec<String>,
}

/// Static engine configuration, immutable after construction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Maximum tokens the host LLM accepts in one request
    pub context_window_size: u64,

    /// Utilization the pruning controller steers toward, in (0, 1]
    pub target_utilization: f64,

    pub thresholds: Thresholds,

    pub strategy: PruneStrategy,

    pub tiers: TierPolicy,

    pub compression_strategy: CompressionMethod,

    /// Recently accessed entries are pulled back to hot on the next
    /// tier transition pass
    pub promote_on_access: bool,

    /// Additive relevance decay per tier step, in [0, 1)
    pub decay_rate: f64,

    /// Scope scoring and pruning candidates to a single session
    pub session_isolation: bool,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            context_window_size: 200_000,
            target_utilization: 0.75,
            thresholds: Thresholds {
                soft: 0.70,
                hard: 0.85,
                emergency: 0.95,
                min_relevance: 0.3,
                preserve_recent_count: 10,
                preserve_patterns: Vec::new(),
            },
            strategy: PruneStrategy::Relevance,
            tiers: TierPolicy {
                hot: TierConfig {
                    max_age_ms: 5 * 60 * 1_000,
                    compression_ratio: 1.0,
                },
                warm: TierConfig {
                    max_age_ms: 30 * 60 * 1_000,
                    compression_ratio: 0.5,
                },
                cold: TierConfig {
                    max_age_ms: 2 * 60 * 60 * 1_000,
                    compression_ratio: 0.15,
                },
            },
            compression_strategy: CompressionMethod::Summary,
            promote_on_access: true,
            decay_rate: 0.1,
            session_isolation: false,
        }
    }
}

impl EngineConfig {
    /// Create a new builder
    pub fn builder() -> EngineConfigBuilder {
        EngineConfigBuilder::default()
    }

    /// Validate the configuration. The engine refuses to start on error.
    pub fn validate(&self) -> Result<()> {
        if self.context_window_size == 0 {
            return Err(EngineError::InvalidConfig(
                "context_window_size must be greater than 0".to_string(),
            ));
        }
        if self.target_utilization <= 0.0 || self.target_utilization > 1.0 {
            return Err(EngineError::InvalidConfig(
                "target_utilization must be in (0, 1]".to_string(),
            ));
        }
        let t = &self.thresholds;
        if t.soft <= 0.0 || t.soft > t.hard || t.hard > t.emergency {
            return Err(EngineError::InvalidConfig(
                "thresholds must satisfy 0 < soft <= hard <= emergency".to_string(),
            ));
        }
        if !(0.0..=1.0).contains(&t.min_relevance) {
            return Err(EngineError::InvalidConfig(
                "min_relevance must be in [0, 1]".to_string(),
            ));
        }
        for (name, tier) in [
            ("hot", &self.tiers.hot),
            ("warm", &self.tiers.warm),
            ("cold", &self.tiers.cold),
        ] {
            if tier.max_age_ms < 0 {
                return Err(EngineError::InvalidConfig(format!(
                    "tiers.{}.max_age_ms must be non-negative",
                    name
                )));
            }
            if tier.compression_ratio <= 0.0 || tier.compression_ratio > 1.0 {
                return Err(EngineError::InvalidConfig(format!(
                    "tiers.{}.compression_ratio must be in (0, 1]",
                    name
                )));
            }
        }
        if self.tiers.hot.max_age_ms > self.tiers.warm.max_age_ms {
            return Err(EngineError::InvalidConfig(
                "tiers.hot.max_age_ms must not exceed tiers.warm.max_age_ms".to_string(),
            ));
        }
        if !(0.0..1.0).contains(&self.decay_rate) {
            return Err(EngineError::InvalidConfig(
                "decay_rate must be in [0, 1)".to_string(),
            ));
        }
        Ok(())
    }

    /// Merge a partial key-value config over the defaults.
    ///
    /// Unknown keys are ignored with a warning; out-of-range numeric values
    /// are clamped with a warning; type mismatches fail fast.
    pub fn merge_with_defaults(partial: &serde_json::Value) -> Result<Self> {
        let mut config = Self::default();

        let map = match partial {
            serde_json::Value::Object(map) => map,
            serde_json::Value::Null => return Ok(config),
            other => {
                return Err(EngineError::InvalidConfig(format!(
                    "config source must be an object, got {}",
                    json_type_name(other)
                )))
            }
        };

        for (key, value) in map {
            match key.as_str() {
                "context_window_size" => {
                    config.context_window_size = require_u64(key, value)?.max(1);
                }
                "target_utilization" => {
                    config.target_utilization = clamped_f64(key, value, 0.01, 1.0)?;
                }
                "soft_threshold" => {
                    config.thresholds.soft = clamped_f64(key, value, 0.01, 2.0)?;
                }
                "hard_threshold" => {
                    config.thresholds.hard = clamped_f64(key, value, 0.01, 2.0)?;
                }
                "emergency_threshold" => {
                    config.thresholds.emergency = clamped_f64(key, value, 0.01, 2.0)?;
                }
                "min_relevance" => {
                    config.thresholds.min_relevance = clamped_f64(key, value, 0.0, 1.0)?;
                }
                "preserve_recent_count" => {
                    config.thresholds.preserve_recent_count = require_u64(key, value)? as usize;
                }
                "preserve_patterns" => {
                    let arr = value.as_array().ok_or_else(|| {
                        EngineError::InvalidConfig(format!("{} must be an array of strings", key))
                    })?;
                    let mut patterns = Vec::with_capacity(arr.len());
                    for item in arr {
                        let s = item.as_str().ok_or_else(|| {
                            EngineError::InvalidConfig(format!(
                                "{} must be an array of strings",
                                key
                            ))
                        })?;
                        patterns.push(s.to_string());
                    }
                    config.thresholds.preserve_patterns = patterns;
                }
                "strategy" => {
                    config.strategy = parse_enum(key, value)?;
                }
                "compression_strategy" => {
                    config.compression_strategy = parse_enum(key, value)?;
                }
                "promote_on_access" => {
                    config.promote_on_access = require_bool(key, value)?;
                }
                "decay_rate" => {
                    config.decay_rate = clamped_f64(key, value, 0.0, 0.99)?;
                }
                "session_isolation" => {
                    config.session_isolation = require_bool(key, value)?;
                }
                "tiers" => {
                    merge_tiers(&mut config.tiers, value)?;
                }
                unknown => {
                    warn!(key = unknown, "Ignoring unknown config key");
                }
            }
        }

        config.validate()?;
        Ok(config)
    }
}

/// Preset configurations for common deployments
impl EngineConfig {
    /// Longer residency and gentler compression; prune late.
    pub fn conservative() -> Self {
        Self {
            target_utilization: 0.85,
            thresholds: Thresholds {
                soft: 0.80,
                hard: 0.90,
                emergency: 0.97,
                min_relevance: 0.2,
                preserve_recent_count: 20,
                preserve_patterns: Vec::new(),
            },
            tiers: TierPolicy {
                hot: TierConfig {
                    max_age_ms: 15 * 60 * 1_000,
                    compression_ratio: 1.0,
                },
                warm: TierConfig {
                    max_age_ms: 60 * 60 * 1_000,
                    compression_ratio: 0.6,
                },
                cold: TierConfig {
                    max_age_ms: 4 * 60 * 60 * 1_000,
                    compression_ratio: 0.25,
                },
            },
            decay_rate: 0.05,
            ..Default::default()
        }
    }

    /// Short residency and strong compression; prune early.
    pub fn aggressive() -> Self {
        Self {
            target_utilization: 0.6,
            thresholds: Thresholds {
                soft: 0.5,
                hard: 0.7,
                emergency: 0.85,
                min_relevance: 0.4,
                preserve_recent_count: 5,
                preserve_patterns: Vec::new(),
            },
            tiers: TierPolicy {
                hot: TierConfig {
                    max_age_ms: 2 * 60 * 1_000,
                    compression_ratio: 1.0,
                },
                warm: TierConfig {
                    max_age_ms: 10 * 60 * 1_000,
                    compression_ratio: 0.3,
                },
                cold: TierConfig {
                    max_age_ms: 30 * 60 * 1_000,
                    compression_ratio: 0.1,
                },
            },
            decay_rate: 0.15,
            ..Default::default()
        }
    }

    /// Profile for small-context hosts.
    pub fn small_window() -> Self {
        Self {
            context_window_size: 8_192,
            target_utilization: 0.6,
            thresholds: Thresholds {
                soft: 0.5,
                hard: 0.7,
                emergency: 0.85,
                min_relevance: 0.3,
                preserve_recent_count: 3,
                preserve_patterns: Vec::new(),
            },
            ..Default::default()
        }
    }
}

fn json_type_name(value: &serde_json::Value) -> &'static str {
    match value {
        serde_json::Value::Null => "null",
        serde_json::Value::Bool(_) => "bool",
        serde_json::Value::Number(_) => "number",
        serde_json::Value::String(_) => "string",
        serde_json::Value::Array(_) => "array",
        serde_json::Value::Object(_) => "object",
    }
}

fn require_u64(key: &str, value: &serde_json::Value) -> Result<u64> {
    value
        .as_u64()
        .ok_or_else(|| EngineError::InvalidConfig(format!("{} must be a non-negative integer", key)))
}

fn require_bool(key: &str, value: &serde_json::Value) -> Result<bool> {
    value
        .as_bool()
        .ok_or_else(|| EngineError::InvalidConfig(format!("{} must be a boolean", key)))
}

fn clamped_f64(key: &str, value: &serde_json::Value, min: f64, max: f64) -> Result<f64> {
    let raw = value
        .as_f64()
        .ok_or_else(|| EngineError::InvalidConfig(format!("{} must be a number", key)))?;
    let clamped = raw.clamp(min, max);
    if (clamped - raw).abs() > f64::EPSILON {
        warn!(key, raw, clamped, "Clamped out-of-range config value");
    }
    Ok(clamped)
}

fn parse_enum<T: serde::de::DeserializeOwned>(key: &str, value: &serde_json::Value) -> Result<T> {
    serde_json::from_value(value.clone())
        .map_err(|_| EngineError::InvalidConfig(format!("{} has an unrecognized value: {}", key, value)))
}

fn merge_tiers(tiers: &mut TierPolicy, value: &serde_json::Value) -> Result<()> {
    let map = value
        .as_object()
        .ok_or_else(|| EngineError::InvalidConfig("tiers must be an object".to_string()))?;

    for (name, tier_value) in map {
        let target = match name.as_str() {
            "hot" => &mut tiers.hot,
            "warm" => &mut tiers.warm,
            "cold" => &mut tiers.cold,
            unknown => {
                warn!(tier = unknown, "Ignoring unknown tier in config");
                continue;
            }
        };
        let tier_map = tier_value.as_object().ok_or_else(|| {
            EngineError::InvalidConfig(format!("tiers.{} must be an object", name))
        })?;
        for (field, field_value) in tier_map {
            match field.as_str() {
                "max_age_ms" => {
                    target.max_age_ms = require_u64(&format!("tiers.{}.max_age_ms", name), field_value)? as i64;
                }
                "compression_ratio" => {
                    target.compression_ratio = clamped_f64(
                        &format!("tiers.{}.compression_ratio", name),
                        field_value,
                        0.01,
                        1.0,
                    )?;
                }
                unknown => {
                    warn!(tier = name.as_str(), key = unknown, "Ignoring unknown tier config key");
                }
            }
        }
    }
    Ok(())
}

/// Builder for engine configuration
#[derive(Debug, Default)]
pub struct EngineConfigBuilder {
    context_window_size: Option<u64>,
    target_utilization: Option<f64>,
    soft_threshold: Option<f64>,
    hard_threshold: Option<f64>,
    emergency_threshold: Option<f64>,
    min_relevance: Option<f64>,
    preserve_recent_count: Option<usize>,
    preserve_patterns: Option<Vec<String>>,
    strategy: Option<PruneStrategy>,
    tiers: Option<TierPolicy>,
    compression_strategy: Option<CompressionMethod>,
    promote_on_access: Option<bool>,
    decay_rate: Option<f64>,
    session_isolation: Option<bool>,
}

impl EngineConfigBuilder {
    pub fn context_window_size(mut self, tokens: u64) -> Self {
        self.context_window_size = Some(tokens);
        self
    }

    pub fn target_utilization(mut self, target: f64) -> Self {
        self.target_utilization = Some(target);
        self
    }

    pub fn soft_threshold(mut self, threshold: f64) -> Self {
        self.soft_threshold = Some(threshold);
        self
    }

    pub fn hard_threshold(mut self, threshold: f64) -> Self {
        self.hard_threshold = Some(threshold);
        self
    }

    pub fn emergency_threshold(mut self, threshold: f64) -> Self {
        self.emergency_threshold = Some(threshold);
        self
    }

    pub fn min_relevance(mut self, min: f64) -> Self {
        self.min_relevance = Some(min);
        self
    }

    pub fn preserve_recent_count(mut self, count: usize) -> Self {
        self.preserve_recent_count = Some(count);
        self
    }

    pub fn preserve_patterns(mut self, patterns: Vec<String>) -> Self {
        self.preserve_patterns = Some(patterns);
        self
    }

    pub fn strategy(mut self, strategy: PruneStrategy) -> Self {
        self.strategy = Some(strategy);
        self
    }

    pub fn tiers(mut self, tiers: TierPolicy) -> Self {
        self.tiers = Some(tiers);
        self
    }

    pub fn hot_tier(mut self, max_age_ms: i64, compression_ratio: f64) -> Self {
        let mut tiers = self.tiers.unwrap_or(EngineConfig::default().tiers);
        tiers.hot = TierConfig { max_age_ms, compression_ratio };
        self.tiers = Some(tiers);
        self
    }

    pub fn warm_tier(mut self, max_age_ms: i64, compression_ratio: f64) -> Self {
        let mut tiers = self.tiers.unwrap_or(EngineConfig::default().tiers);
        tiers.warm = TierConfig { max_age_ms, compression_ratio };
        self.tiers = Some(tiers);
        self
    }

    pub fn cold_tier(mut self, max_age_ms: i64, compression_ratio: f64) -> Self {
        let mut tiers = self.tiers.unwrap_or(EngineConfig::default().tiers);
        tiers.cold = TierConfig { max_age_ms, compression_ratio };
        self.tiers = Some(tiers);
        self
    }

    pub fn compression_strategy(mut self, strategy: CompressionMethod) -> Self {
        self.compression_strategy = Some(strategy);
        self
    }

    pub fn promote_on_access(mut self, enable: bool) -> Self {
        self.promote_on_access = Some(enable);
        self
    }

    pub fn decay_rate(mut self, rate: f64) -> Self {
        self.decay_rate = Some(rate);
        self
    }

    pub fn session_isolation(mut self, enable: bool) -> Self {
        self.session_isolation = Some(enable);
        self
    }

    /// Build the configuration, filling unset fields from defaults.
    /// Validation happens at engine construction.
    pub fn build(self) -> EngineConfig {
        let defaults = EngineConfig::default();

        EngineConfig {
            context_window_size: self.context_window_size.unwrap_or(defaults.context_window_size),
            target_utilization: self.target_utilization.unwrap_or(defaults.target_utilization),
            thresholds: Thresholds {
                soft: self.soft_threshold.unwrap_or(defaults.thresholds.soft),
                hard: self.hard_threshold.unwrap_or(defaults.thresholds.hard),
                emergency: self
                    .emergency_threshold
                    .unwrap_or(defaults.thresholds.emergency),
                min_relevance: self.min_relevance.unwrap_or(defaults.thresholds.min_relevance),
                preserve_recent_count: self
                    .preserve_recent_count
                    .unwrap_or(defaults.thresholds.preserve_recent_count),
                preserve_patterns: self
                    .preserve_patterns
                    .unwrap_or(defaults.thresholds.preserve_patterns),
            },
            strategy: self.strategy.unwrap_or(defaults.strategy),
            tiers: self.tiers.unwrap_or(defaults.tiers),
            compression_strategy: self
                .compression_strategy
                .unwrap_or(defaults.compression_strategy),
            promote_on_access: self.promote_on_access.unwrap_or(defaults.promote_on_access),
            decay_rate: self.decay_rate.unwrap_or(defaults.decay_rate),
            session_isolation: self.session_isolation.unwrap_or(defaults.session_isolation),
        }
    }
}
