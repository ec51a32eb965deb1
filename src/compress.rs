//! Lossy compression of demoted entries
//!
//! Methods are tagged variants dispatched by a single match; each variant is
//! a free function. A compressor may never increase an entry's effective
//! token count - when it would, the step is skipped and the entry keeps its
//! previous state.

use serde_json::Value;

use crate::entry::{CompressedContent, CompressionMethod, Entry, EntryType};
use crate::estimator::{HeuristicEstimator, TokenEstimator};

/// Amortized token footprint of a bare embedding reference.
pub const EMBEDDING_REF_TOKENS: u64 = 10;

/// Extra tokens a hybrid surrogate carries for its embedding marker.
const HYBRID_REF_TOKENS: u64 = 5;

/// Sentences containing any of these survive dialogue summarization.
const DIALOGUE_KEYWORDS: &[&str] = &[
    "must", "should", "important", "error", "fix", "implement", "create", "update", "delete",
];

/// Line prefixes kept by the code summarizer.
const DECLARATION_PREFIXES: &[&str] = &[
    "import ", "export ", "function ", "class ", "interface ", "type ", "fn ", "pub ", "struct ",
    "enum ", "trait ", "impl ", "const ", "mod ", "def ", "use ", "async ",
];

/// Per-field value budget when summarizing structured tool output.
const STRUCTURED_FIELD_CHARS: usize = 80;

/// Compress an entry toward `ceil(tokens * ratio)` tokens.
///
/// `vector_ref` carries a handle minted by an attached vector store, used
/// by the embedding and hybrid methods. Returns `None` when compression
/// would not reduce the entry's effective tokens.
pub fn compress(
    entry: &Entry,
    method: CompressionMethod,
    ratio: f64,
    vector_ref: Option<String>,
    estimator: &dyn TokenEstimator,
    now: i64,
) -> Option<CompressedContent> {
    if entry.tokens == 0 {
        return None;
    }
    let target_tokens = ((entry.tokens as f64 * ratio).ceil() as u64).max(1);
    let current_effective = entry.effective_tokens();

    let (summary, compressed_tokens) = match method {
        CompressionMethod::Summary => {
            let summary = summarize(entry, target_tokens, estimator);
            let tokens = estimator.estimate(&summary, entry.entry_type);
            (Some(summary), tokens)
        }
        CompressionMethod::Embedding => (None, EMBEDDING_REF_TOKENS.min(entry.tokens)),
        CompressionMethod::Hybrid => {
            let summary_budget = ((target_tokens as f64 * 0.7).ceil() as u64).max(1);
            let body = summarize(entry, summary_budget, estimator);
            let marker = match &vector_ref {
                Some(handle) => format!("[vec:{}] ", handle),
                None => "[vec] ".to_string(),
            };
            let summary = format!("{}{}", marker, body);
            let tokens = estimator.estimate(&body, entry.entry_type) + HYBRID_REF_TOKENS;
            (Some(summary), tokens)
        }
    };

    if compressed_tokens >= current_effective || compressed_tokens > entry.tokens {
        return None;
    }

    Some(CompressedContent {
        method,
        summary,
        vector_ref,
        compressed_tokens,
        ratio: compressed_tokens as f64 / entry.tokens as f64,
        original_tokens: entry.tokens,
        compressed_at: now,
    })
}

/// Produce an extractive summary sized to roughly `target_tokens`.
fn summarize(entry: &Entry, target_tokens: u64, estimator: &dyn TokenEstimator) -> String {
    let chars_per_token = HeuristicEstimator::chars_per_token(entry.entry_type);
    let char_budget = ((target_tokens as f64 * chars_per_token) as usize).max(8);

    let mut summary = match entry.entry_type {
        EntryType::FileRead | EntryType::FileWrite => summarize_code(&entry.content, char_budget),
        EntryType::ToolResult | EntryType::BashOutput => {
            summarize_structured(&entry.content, char_budget)
        }
        EntryType::UserMessage | EntryType::AssistantMessage => {
            summarize_dialogue(&entry.content, char_budget)
        }
        EntryType::SystemPrompt | EntryType::Other => head(&entry.content, char_budget).to_string(),
    };

    // Trim further if the installed estimator disagrees with the sizing
    // heuristic; a few proportional cuts converge.
    for _ in 0..3 {
        let tokens = estimator.estimate(&summary, entry.entry_type);
        if tokens <= target_tokens || summary.is_empty() {
            break;
        }
        let keep = (summary.len() as u64 * target_tokens / tokens.max(1)) as usize;
        summary = head(&summary, keep.max(4)).to_string();
    }

    summary
}

/// Keep import/export and top-level declaration lines, head-truncated.
fn summarize_code(content: &str, char_budget: usize) -> String {
    let declarations: Vec<&str> = content
        .lines()
        .filter(|line| {
            let trimmed = line.trim_start();
            !trimmed.is_empty()
                && (DECLARATION_PREFIXES.iter().any(|p| trimmed.starts_with(p))
                    || (!line.starts_with(char::is_whitespace) && trimmed.ends_with('{')))
        })
        .collect();

    if declarations.is_empty() {
        return head(content, char_budget).to_string();
    }
    head(&declarations.join("\n"), char_budget).to_string()
}

/// Keep top-level keys of structured output with truncated values;
/// fall back to a head+tail slice for free-form text.
fn summarize_structured(content: &str, char_budget: usize) -> String {
    if let Ok(Value::Object(map)) = serde_json::from_str::<Value>(content) {
        let lines: Vec<String> = map
            .iter()
            .map(|(key, value)| {
                let rendered = match value {
                    Value::String(s) => s.clone(),
                    other => other.to_string(),
                };
                format!("{}: {}", key, head(&rendered, STRUCTURED_FIELD_CHARS))
            })
            .collect();
        return head(&lines.join("\n"), char_budget).to_string();
    }

    // Head + tail slice keeps the command preamble and the final status.
    let head_budget = char_budget * 6 / 10;
    let tail_budget = char_budget.saturating_sub(head_budget);
    if content.len() <= char_budget {
        return content.to_string();
    }
    let head_part = head(content, head_budget);
    let tail_part = tail(content, tail_budget);
    format!("{}\n...\n{}", head_part, tail_part)
}

/// Keep sentences carrying directive keywords; pad with a head slice when
/// too little survives.
fn summarize_dialogue(content: &str, char_budget: usize) -> String {
    let mut kept = Vec::new();
    let mut kept_chars = 0usize;

    for sentence in split_sentences(content) {
        let lower = sentence.to_lowercase();
        if DIALOGUE_KEYWORDS.iter().any(|k| lower.contains(k)) {
            kept_chars += sentence.len();
            kept.push(sentence);
            if kept_chars >= char_budget {
                break;
            }
        }
    }

    let mut summary = kept.join(" ");
    if summary.len() < char_budget / 2 {
        let head_slice = head(content, char_budget - summary.len());
        if summary.is_empty() {
            summary = head_slice.to_string();
        } else {
            summary = format!("{} {}", head_slice, summary);
        }
    }
    head(&summary, char_budget).to_string()
}

fn split_sentences(content: &str) -> impl Iterator<Item = &str> {
    content
        .split_inclusive(['.', '!', '?', '\n'])
        .map(str::trim)
        .filter(|s| !s.is_empty())
}

/// Byte-budget head slice, respecting char boundaries.
fn head(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut end = max_bytes;
    while end > 0 && !s.is_char_boundary(end) {
        end -= 1;
    }
    &s[..end]
}

/// Byte-budget tail slice, respecting char boundaries.
fn tail(s: &str, max_bytes: usize) -> &str {
    if s.len() <= max_bytes {
        return s;
    }
    let mut start = s.len() - max_bytes;
    while start < s.len() && !s.is_char_boundary(start) {
        start += 1;
    }
    &s[start..]
}
