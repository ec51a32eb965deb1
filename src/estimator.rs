//! Token estimation
//!
//! The engine never depends on a specific tokenizer; a single installed
//! estimator sizes every piece of content. Implementations must be
//! deterministic for identical inputs.

use crate::entry::EntryType;

/// Maps content to an integer token count.
pub trait TokenEstimator: Send {
    fn estimate(&self, content: &str, entry_type: EntryType) -> u64;
}

/// Characters-per-token heuristic by content type.
///
/// Code reads denser than prose; structured tool output denser still.
#[derive(Debug, Clone, Copy, Default)]
pub struct HeuristicEstimator;

impl HeuristicEstimator {
    /// Chars-per-token factor for a given entry type
    pub fn chars_per_token(entry_type: EntryType) -> f64 {
        match entry_type {
            EntryType::FileRead | EntryType::FileWrite => 3.5,
            EntryType::ToolResult | EntryType::BashOutput => 3.0,
            EntryType::SystemPrompt
            | EntryType::UserMessage
            | EntryType::AssistantMessage
            | EntryType::Other => 4.0,
        }
    }
}

impl TokenEstimator for HeuristicEstimator {
    fn estimate(&self, content: &str, entry_type: EntryType) -> u64 {
        if content.is_empty() {
            return 0;
        }
        let ratio = Self::chars_per_token(entry_type);
        (content.len() as f64 / ratio).ceil() as u64
    }
}
