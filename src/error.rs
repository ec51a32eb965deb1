//! Error types for the cache engine
//!
//! Only construction and snapshot restore surface hard failures; everything
//! else is recovered internally or downgraded to counters.

use thiserror::Error;

/// Main error type for engine operations
#[derive(Error, Debug)]
pub enum EngineError {
    /// Invalid configuration - rejected at construction time
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// Snapshot blob was produced by an incompatible engine version
    #[error("Snapshot version mismatch: blob has {found}, engine expects major version {expected}")]
    SnapshotVersionMismatch { found: String, expected: String },

    /// Snapshot blob could not be decoded
    #[error("Snapshot decode error: {0}")]
    SnapshotDecode(#[from] serde_json::Error),
}

/// Result type alias for engine operations
pub type Result<T> = std::result::Result<T, EngineError>;
