//! Cache entry model: tiers, types, compression metadata

use serde::{Deserialize, Serialize};
use std::fmt;

/// Entry identifier - generated from source + sequence on insert,
/// never reused within a process lifetime.
pub type EntryId = String;

/// Kind of cached content. Governs token estimation, extractive
/// summarization and the type prior used by the relevance scorer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntryType {
    SystemPrompt,
    FileRead,
    FileWrite,
    ToolResult,
    BashOutput,
    UserMessage,
    AssistantMessage,
    Other,
}

impl fmt::Display for EntryType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EntryType::SystemPrompt => "system_prompt",
            EntryType::FileRead => "file_read",
            EntryType::FileWrite => "file_write",
            EntryType::ToolResult => "tool_result",
            EntryType::BashOutput => "bash_output",
            EntryType::UserMessage => "user_message",
            EntryType::AssistantMessage => "assistant_message",
            EntryType::Other => "other",
        };
        write!(f, "{}", s)
    }
}

/// Quality-of-service class for a cached entry. Governs compression
/// ratio and relevance decay.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Tier {
    Hot,
    Warm,
    Cold,
    Archived,
}

impl fmt::Display for Tier {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Tier::Hot => "hot",
            Tier::Warm => "warm",
            Tier::Cold => "cold",
            Tier::Archived => "archived",
        };
        write!(f, "{}", s)
    }
}

/// How a compressed surrogate was produced.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CompressionMethod {
    Summary,
    Embedding,
    Hybrid,
}

impl fmt::Display for CompressionMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            CompressionMethod::Summary => "summary",
            CompressionMethod::Embedding => "embedding",
            CompressionMethod::Hybrid => "hybrid",
        };
        write!(f, "{}", s)
    }
}

/// Lossy compression record attached to a demoted entry.
///
/// Only token accounting switches to the surrogate; the original text
/// stays on the entry so a later promotion back to hot is lossless.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CompressedContent {
    pub method: CompressionMethod,

    /// Extractive summary, present for summary/hybrid methods
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,

    /// Handle into an external vector store, when one is attached
    #[serde(skip_serializing_if = "Option::is_none")]
    pub vector_ref: Option<String>,

    /// Tokens the surrogate counts toward utilization
    pub compressed_tokens: u64,

    /// compressed_tokens / original_tokens
    pub ratio: f64,

    /// Token count of the entry at insertion
    pub original_tokens: u64,

    /// When the compression was performed (epoch ms)
    pub compressed_at: i64,
}

/// Metadata associated with a cache entry
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EntryMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub file_path: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_name: Option<String>,

    /// Tags for categorization and preservation matching
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

impl EntryMetadata {
    pub fn for_session(session_id: impl Into<String>) -> Self {
        Self {
            session_id: Some(session_id.into()),
            ..Default::default()
        }
    }

    pub fn with_file_path(mut self, path: impl Into<String>) -> Self {
        self.file_path = Some(path.into());
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_tool_name(mut self, tool: impl Into<String>) -> Self {
        self.tool_name = Some(tool.into());
        self
    }
}

/// The unit of caching.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entry {
    pub id: EntryId,

    /// Original text. Kept even while a compressed surrogate is active.
    pub content: String,

    pub entry_type: EntryType,

    /// Token count as sized at insertion. Immutable.
    pub tokens: u64,

    pub tier: Tier,

    /// Epoch milliseconds
    pub created_at: i64,

    /// Epoch milliseconds
    pub last_accessed_at: i64,

    pub access_count: u64,

    /// Last-computed relevance score in [0, 1]
    pub relevance: f64,

    pub metadata: EntryMetadata,

    /// Present iff tier != hot and the tier's compression ratio < 1.0
    #[serde(skip_serializing_if = "Option::is_none")]
    pub compressed: Option<CompressedContent>,
}

impl Entry {
    /// Create a fresh hot entry. The id is assigned by the store on insert.
    pub fn new(content: String, entry_type: EntryType, tokens: u64, metadata: EntryMetadata, now: i64) -> Self {
        Self {
            id: EntryId::new(),
            content,
            entry_type,
            tokens,
            tier: Tier::Hot,
            created_at: now,
            last_accessed_at: now,
            access_count: 0,
            relevance: 0.5,
            metadata,
            compressed: None,
        }
    }

    /// Tokens this entry currently counts toward utilization
    pub fn effective_tokens(&self) -> u64 {
        self.compressed
            .as_ref()
            .map(|c| c.compressed_tokens)
            .unwrap_or(self.tokens)
    }

    /// Age since creation, saturating at zero for non-monotonic clocks
    pub fn age_ms(&self, now: i64) -> i64 {
        (now - self.created_at).max(0)
    }

    /// Time since last access, saturating at zero
    pub fn idle_ms(&self, now: i64) -> i64 {
        (now - self.last_accessed_at).max(0)
    }

    /// Update access stamp and count
    pub fn mark_accessed(&mut self, now: i64) {
        self.last_accessed_at = now;
        self.access_count += 1;
    }

    /// Add a tag if not already present
    pub fn add_tag(&mut self, tag: String) {
        if !self.metadata.tags.contains(&tag) {
            self.metadata.tags.push(tag);
        }
    }

    /// Check if entry has a specific tag
    pub fn has_tag(&self, tag: &str) -> bool {
        self.metadata.tags.iter().any(|t| t == tag)
    }

    /// Check whether a preservation pattern matches this entry.
    ///
    /// A pattern matches by substring against `file_path`, `source`, or any
    /// tag. A single `*` wildcard is honored as prefix/suffix glob.
    pub fn matches_pattern(&self, pattern: &str) -> bool {
        let matches = |text: &str| -> bool {
            if let Some(stripped) = pattern.strip_prefix('*') {
                text.ends_with(stripped)
            } else if let Some(stripped) = pattern.strip_suffix('*') {
                text.starts_with(stripped)
            } else {
                text.contains(pattern)
            }
        };

        self.metadata.file_path.as_deref().map(matches).unwrap_or(false)
            || self.metadata.source.as_deref().map(matches).unwrap_or(false)
            || self.metadata.tags.iter().any(|t| matches(t))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn make_entry(tokens: u64) -> Entry {
        Entry::new(
            "let x = 1;".to_string(),
            EntryType::FileRead,
            tokens,
            EntryMetadata::default().with_file_path("src/main.rs"),
            1_000,
        )
    }

    #[test]
    fn test_new_entry_is_hot_and_uncompressed() {
        let entry = make_entry(100);
        assert_eq!(entry.tier, Tier::Hot);
        assert!(entry.compressed.is_none());
        assert_eq!(entry.effective_tokens(), 100);
        assert_eq!(entry.relevance, 0.5);
    }

    #[test]
    fn test_effective_tokens_uses_surrogate() {
        let mut entry = make_entry(100);
        entry.compressed = Some(CompressedContent {
            method: CompressionMethod::Summary,
            summary: Some("let x = 1;".to_string()),
            vector_ref: None,
            compressed_tokens: 25,
            ratio: 0.25,
            original_tokens: 100,
            compressed_at: 2_000,
        });
        assert_eq!(entry.effective_tokens(), 25);
        assert_eq!(entry.tokens, 100);
    }

    #[test]
    fn test_age_saturates_on_clock_regression() {
        let entry = make_entry(10);
        assert_eq!(entry.age_ms(500), 0);
        assert_eq!(entry.idle_ms(500), 0);
        assert_eq!(entry.age_ms(1_250), 250);
    }

    #[test]
    fn test_mark_accessed() {
        let mut entry = make_entry(10);
        entry.mark_accessed(5_000);
        entry.mark_accessed(6_000);
        assert_eq!(entry.access_count, 2);
        assert_eq!(entry.last_accessed_at, 6_000);
    }

    #[test]
    fn test_tags() {
        let mut entry = make_entry(10);
        entry.add_tag("pinned".to_string());
        entry.add_tag("pinned".to_string());
        assert_eq!(entry.metadata.tags.len(), 1);
        assert!(entry.has_tag("pinned"));
        assert!(!entry.has_tag("other"));
    }

    #[test]
    fn test_pattern_matching() {
        let entry = make_entry(10);
        assert!(entry.matches_pattern("src/"));
        assert!(entry.matches_pattern("main.rs"));
        assert!(entry.matches_pattern("*.rs"));
        assert!(entry.matches_pattern("src*"));
        assert!(!entry.matches_pattern("config/"));

        let mut tagged = make_entry(10);
        tagged.add_tag("keep:always".to_string());
        assert!(tagged.matches_pattern("keep:"));
    }

    #[test]
    fn test_type_display() {
        assert_eq!(EntryType::SystemPrompt.to_string(), "system_prompt");
        assert_eq!(Tier::Archived.to_string(), "archived");
        assert_eq!(CompressionMethod::Hybrid.to_string(), "hybrid");
    }
}
