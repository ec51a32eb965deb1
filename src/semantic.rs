//! Semantic boundary contracts
//!
//! The engine never performs network I/O itself; text similarity and vector
//! storage are pluggable. Without an installed similarity function, query
//! similarity contributes zero and the `semantic` strategy degrades to
//! `relevance`.

use std::collections::HashSet;

/// Pure text similarity in [0, 1]. Must not mutate.
pub trait Similarity: Send {
    fn similarity(&self, query: &str, text: &str) -> f64;
}

/// External vector index used by the embedding and hybrid compression
/// methods. Retrieval of discarded text goes through `get`.
pub trait VectorStore: Send {
    /// Store content under an id, returning an opaque handle.
    fn put(&mut self, id: &str, content: &str) -> String;

    /// Fetch content by handle, if still present.
    fn get(&self, handle: &str) -> Option<String>;

    /// Top-k ids with similarity scores for a query.
    fn search(&self, query: &str, k: usize) -> Vec<(String, f64)>;
}

/// Dependency-free token-overlap similarity (Jaccard over lowercased
/// alphanumeric words). A coarse stand-in for an embedding-based function.
#[derive(Debug, Clone, Copy, Default)]
pub struct KeywordSimilarity;

impl KeywordSimilarity {
    fn tokens(text: &str) -> HashSet<String> {
        text.split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
            .map(|w| w.to_lowercase())
            .collect()
    }
}

impl Similarity for KeywordSimilarity {
    fn similarity(&self, query: &str, text: &str) -> f64 {
        let query_tokens = Self::tokens(query);
        let text_tokens = Self::tokens(text);
        if query_tokens.is_empty() || text_tokens.is_empty() {
            return 0.0;
        }
        let intersection = query_tokens.intersection(&text_tokens).count() as f64;
        let union = query_tokens.union(&text_tokens).count() as f64;
        intersection / union
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identical_texts_score_one() {
        let sim = KeywordSimilarity;
        assert_eq!(sim.similarity("fix the bug", "fix the bug"), 1.0);
    }

    #[test]
    fn test_disjoint_texts_score_zero() {
        let sim = KeywordSimilarity;
        assert_eq!(sim.similarity("alpha beta", "gamma delta"), 0.0);
    }

    #[test]
    fn test_partial_overlap() {
        let sim = KeywordSimilarity;
        let score = sim.similarity("parser error", "the parser works");
        assert!(score > 0.0 && score < 1.0);
    }

    #[test]
    fn test_case_and_punctuation_insensitive() {
        let sim = KeywordSimilarity;
        assert_eq!(sim.similarity("Parser!", "parser"), 1.0);
    }

    #[test]
    fn test_empty_inputs_score_zero() {
        let sim = KeywordSimilarity;
        assert_eq!(sim.similarity("", "anything"), 0.0);
        assert_eq!(sim.similarity("anything", ""), 0.0);
    }
}
