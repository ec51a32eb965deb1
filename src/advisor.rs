//! Optional learned advisor plugin
//!
//! An advisor may override the deterministic scorer or reorder pruning
//! candidates. A `None` result means "no opinion, use the deterministic
//! path"; the engine is fully functional and deterministic without one.

use crate::entry::{Entry, EntryId};
use crate::scoring::ScoringContext;

pub trait Advisor: Send {
    /// Propose a relevance score for an entry, or decline.
    fn advise_score(&self, entry: &Entry, context: &ScoringContext) -> Option<f64>;

    /// Propose a pruning order over the candidate ids, or decline.
    /// Returned ids not present in `candidates` are ignored by the engine.
    fn advise_prune(&self, candidates: &[EntryId], context: &ScoringContext) -> Option<Vec<EntryId>>;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{EntryMetadata, EntryType};

    struct PinningAdvisor;

    impl Advisor for PinningAdvisor {
        fn advise_score(&self, entry: &Entry, _context: &ScoringContext) -> Option<f64> {
            entry.has_tag("pinned").then_some(1.0)
        }

        fn advise_prune(&self, _candidates: &[EntryId], _context: &ScoringContext) -> Option<Vec<EntryId>> {
            None
        }
    }

    #[test]
    fn test_advisor_can_decline() {
        let advisor = PinningAdvisor;
        let entry = Entry::new("text".to_string(), EntryType::Other, 5, EntryMetadata::default(), 0);
        let context = ScoringContext::new(0);

        assert_eq!(advisor.advise_score(&entry, &context), None);
        assert_eq!(advisor.advise_prune(&[], &context), None);
    }

    #[test]
    fn test_advisor_can_override() {
        let advisor = PinningAdvisor;
        let mut entry = Entry::new("text".to_string(), EntryType::Other, 5, EntryMetadata::default(), 0);
        entry.add_tag("pinned".to_string());

        assert_eq!(advisor.advise_score(&entry, &ScoringContext::new(0)), Some(1.0));
    }
}
