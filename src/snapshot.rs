//! Opt-in persistence: versioned snapshot blobs
//!
//! A snapshot captures the ordered entry list, the id sequence and all
//! metric state. Restore is atomic from the engine's viewpoint: the blob is
//! fully decoded and validated before any state is replaced, so a failed
//! restore leaves the engine untouched.

use serde::{Deserialize, Serialize};
use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

use crate::config::EngineConfig;
use crate::entry::Entry;
use crate::error::{EngineError, Result};
use crate::metrics::MetricsRegistry;

/// Engine snapshot format version. Loaders reject a different major.
pub const SNAPSHOT_VERSION: &str = "1.0";

/// Serialized engine state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Snapshot {
    /// Format version tag, checked on restore
    pub engine_version: String,

    /// Caller-supplied snapshot name
    pub name: String,

    /// When the snapshot was taken (epoch ms)
    pub created_at: i64,

    /// Stable hash of the configuration the snapshot was taken under
    pub config_fingerprint: u64,

    /// Entries in insertion order
    pub entries: Vec<Entry>,

    /// Id sequence counter, carried so ids are never reused after restore
    pub next_seq: u64,

    pub metrics: MetricsRegistry,
}

impl Snapshot {
    /// Serialize to an opaque blob.
    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decode and version-check a blob. The engine's own state is not
    /// touched here.
    pub fn decode(blob: &[u8]) -> Result<Self> {
        let snapshot: Snapshot = serde_json::from_slice(blob)?;

        let found_major = major_version(&snapshot.engine_version);
        let expected_major = major_version(SNAPSHOT_VERSION);
        if found_major != expected_major {
            return Err(EngineError::SnapshotVersionMismatch {
                found: snapshot.engine_version,
                expected: expected_major.to_string(),
            });
        }
        Ok(snapshot)
    }
}

fn major_version(version: &str) -> &str {
    version.split('.').next().unwrap_or(version)
}

/// Stable fingerprint of a configuration, embedded in snapshots so a
/// restore under different settings can be flagged.
pub fn config_fingerprint(config: &EngineConfig) -> u64 {
    let rendered = serde_json::to_string(config).unwrap_or_default();
    let mut hasher = DefaultHasher::new();
    rendered.hash(&mut hasher);
    hasher.finish()
}
