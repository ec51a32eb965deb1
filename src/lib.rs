//! # Palimpsest
//!
//! An in-process context cache optimizer for interactive LLM sessions.
//! Keeps the context window below a configured utilization target by
//! proactively compressing and pruning cached entries instead of letting
//! the host destructively compact the whole conversation.
//!
//! ## Features
//!
//! - Temporal tiering (hot/warm/cold/archived) with lossy, type-aware
//!   extractive compression on demotion
//! - Relevance scoring from recency, type priors, access frequency,
//!   active-file/tool signals and query similarity
//! - A threshold-driven pruning controller (soft/hard/emergency) with
//!   preservation rules and hysteresis
//! - Hook facade for host runtimes: user-prompt, post-tool and pre-compact
//!   events
//! - Metrics, latency histograms and opt-in snapshot/restore
//! - Optional plugins: similarity function, vector store, learned advisor
//!
//! ## Example
//!
//! ```rust
//! use palimpsest::{CacheEngine, EngineConfig, EntryMetadata, EntryType};
//!
//! # fn main() -> palimpsest::Result<()> {
//! let config = EngineConfig::builder()
//!     .context_window_size(100_000)
//!     .target_utilization(0.7)
//!     .build();
//! let mut engine = CacheEngine::new(config)?;
//!
//! let id = engine.add(
//!     "fn main() { println!(\"hello\"); }",
//!     EntryType::FileRead,
//!     EntryMetadata::for_session("session-1").with_file_path("src/main.rs"),
//! );
//! engine.access(&id);
//!
//! let result = engine.on_user_prompt_submit("what does main do?", "session-1");
//! println!("freed {} tokens at level {}", result.tokens_freed, result.level);
//! # Ok(())
//! # }
//! ```

pub mod advisor;
pub mod compress;
pub mod config;
pub mod engine;
pub mod entry;
pub mod error;
pub mod estimator;
pub mod metrics;
pub mod pruning;
pub mod scoring;
pub mod semantic;
pub mod snapshot;
pub mod store;
pub mod tiering;

// Re-export main types for convenience
pub use advisor::Advisor;
pub use config::{
    EngineConfig, EngineConfigBuilder, PruneStrategy, Thresholds, TierConfig, TierPolicy,
    ARCHIVED_COMPRESSION_RATIO,
};
pub use engine::{CacheEngine, Clock, HookResultPayload};
pub use entry::{
    CompressedContent, CompressionMethod, Entry, EntryId, EntryMetadata, EntryType, Tier,
};
pub use error::{EngineError, Result};
pub use estimator::{HeuristicEstimator, TokenEstimator};
pub use metrics::{Counters, EngineMetrics, LatencyHistogram, PrunesByLevel};
pub use pruning::{PruneLevel, PruneRationale, PruneResult, PruningDecision};
pub use scoring::{ScoreWeights, ScoringContext};
pub use semantic::{KeywordSimilarity, Similarity, VectorStore};
pub use snapshot::{Snapshot, SNAPSHOT_VERSION};
pub use store::EntryStore;
pub use tiering::TierTransitionResult;
