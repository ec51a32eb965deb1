//! Owning entry store with secondary indices and incremental accounting
//!
//! The store exclusively owns all entries. Other components borrow
//! read-only views during a single operation; every mutation of tier or
//! compression state flows through the store so the running effective-token
//! total stays accurate.

use std::collections::HashMap;
use tracing::debug;

use crate::entry::{CompressedContent, Entry, EntryId, Tier};

/// Owning collection of cache entries.
#[derive(Debug, Default)]
pub struct EntryStore {
    /// Main storage: id -> entry
    entries: HashMap<EntryId, Entry>,

    /// Insertion order, also the iteration order of every lookup
    order: Vec<EntryId>,

    /// Secondary indices
    by_source: HashMap<String, Vec<EntryId>>,
    by_file_path: HashMap<String, Vec<EntryId>>,
    by_session: HashMap<String, Vec<EntryId>>,
    by_tier: HashMap<Tier, Vec<EntryId>>,

    /// Running sum of effective tokens across all entries
    effective_total: u64,

    /// Monotonic sequence for id generation; never reused
    next_seq: u64,
}

impl EntryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert an entry, assigning its id from source + sequence.
    pub fn insert(&mut self, mut entry: Entry) -> EntryId {
        let seq = self.next_seq;
        self.next_seq += 1;

        let source_part = entry
            .metadata
            .source
            .clone()
            .unwrap_or_else(|| entry.entry_type.to_string());
        entry.id = format!("{}-{:06}", source_part, seq);
        let id = entry.id.clone();

        if let Some(source) = &entry.metadata.source {
            self.by_source.entry(source.clone()).or_default().push(id.clone());
        }
        if let Some(path) = &entry.metadata.file_path {
            self.by_file_path.entry(path.clone()).or_default().push(id.clone());
        }
        if let Some(session) = &entry.metadata.session_id {
            self.by_session.entry(session.clone()).or_default().push(id.clone());
        }
        self.by_tier.entry(entry.tier).or_default().push(id.clone());

        self.effective_total += entry.effective_tokens();
        self.order.push(id.clone());
        self.entries.insert(id.clone(), entry);

        debug!(id = id.as_str(), "Inserted entry");
        id
    }

    /// Get a read-only view. An unknown id is a recoverable signal, not
    /// an error - a concurrent prune may have removed it.
    pub fn get(&self, id: &str) -> Option<&Entry> {
        self.entries.get(id)
    }

    /// Remove an entry, returning it.
    pub fn remove(&mut self, id: &str) -> Option<Entry> {
        let entry = self.entries.remove(id)?;

        self.order.retain(|e| e != id);
        if let Some(source) = &entry.metadata.source {
            if let Some(ids) = self.by_source.get_mut(source) {
                ids.retain(|e| e != id);
            }
        }
        if let Some(path) = &entry.metadata.file_path {
            if let Some(ids) = self.by_file_path.get_mut(path) {
                ids.retain(|e| e != id);
            }
        }
        if let Some(session) = &entry.metadata.session_id {
            if let Some(ids) = self.by_session.get_mut(session) {
                ids.retain(|e| e != id);
            }
        }
        if let Some(ids) = self.by_tier.get_mut(&entry.tier) {
            ids.retain(|e| e != id);
        }

        self.effective_total = self.effective_total.saturating_sub(entry.effective_tokens());
        debug!(id, "Removed entry");
        Some(entry)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterate entries in insertion order
    pub fn iter(&self) -> impl Iterator<Item = &Entry> {
        self.order.iter().filter_map(|id| self.entries.get(id))
    }

    /// Entry ids in insertion order
    pub fn ids(&self) -> &[EntryId] {
        &self.order
    }

    /// Lookup by source, in insertion order
    pub fn by_source(&self, source: &str) -> Vec<&Entry> {
        self.index_lookup(self.by_source.get(source))
    }

    /// Lookup by file path, in insertion order
    pub fn by_file_path(&self, path: &str) -> Vec<&Entry> {
        self.index_lookup(self.by_file_path.get(path))
    }

    /// Lookup by session id, in insertion order
    pub fn by_session(&self, session_id: &str) -> Vec<&Entry> {
        self.index_lookup(self.by_session.get(session_id))
    }

    /// Entry ids belonging to a session, in insertion order
    pub fn session_ids(&self, session_id: &str) -> Vec<EntryId> {
        self.by_session.get(session_id).cloned().unwrap_or_default()
    }

    /// Lookup by tier, in insertion order
    pub fn in_tier(&self, tier: Tier) -> Vec<&Entry> {
        self.index_lookup(self.by_tier.get(&tier))
    }

    fn index_lookup(&self, ids: Option<&Vec<EntryId>>) -> Vec<&Entry> {
        ids.map(|ids| ids.iter().filter_map(|id| self.entries.get(id)).collect())
            .unwrap_or_default()
    }

    /// Running total of effective tokens, maintained incrementally.
    pub fn total_effective_tokens(&self) -> u64 {
        self.effective_total
    }

    /// Update access stamp and count. Returns false for an unknown id.
    pub fn mark_accessed(&mut self, id: &str, now: i64) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.mark_accessed(now);
                true
            }
            None => false,
        }
    }

    /// Move an entry to a tier, keeping the tier index consistent.
    pub fn set_tier(&mut self, id: &str, tier: Tier) -> bool {
        let old_tier = match self.entries.get(id) {
            Some(entry) if entry.tier != tier => entry.tier,
            Some(_) => return true,
            None => return false,
        };
        if let Some(ids) = self.by_tier.get_mut(&old_tier) {
            ids.retain(|e| e != id);
        }
        self.by_tier.entry(tier).or_default().push(id.to_string());
        if let Some(entry) = self.entries.get_mut(id) {
            entry.tier = tier;
        }
        true
    }

    /// Attach a compression record, adjusting the running total.
    pub fn apply_compression(&mut self, id: &str, compressed: CompressedContent) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                let before = entry.effective_tokens();
                entry.compressed = Some(compressed);
                let after = entry.effective_tokens();
                self.effective_total = self.effective_total.saturating_sub(before) + after;
                true
            }
            None => false,
        }
    }

    /// Drop a compression record (promotion back to hot), adjusting the
    /// running total.
    pub fn clear_compression(&mut self, id: &str) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                if let Some(compressed) = entry.compressed.take() {
                    self.effective_total = self
                        .effective_total
                        .saturating_sub(compressed.compressed_tokens)
                        + entry.tokens;
                }
                true
            }
            None => false,
        }
    }

    /// Overwrite the stored relevance score.
    pub fn set_relevance(&mut self, id: &str, relevance: f64) -> bool {
        match self.entries.get_mut(id) {
            Some(entry) => {
                entry.relevance = relevance.clamp(0.0, 1.0);
                true
            }
            None => false,
        }
    }

    /// Remove everything.
    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
        self.by_source.clear();
        self.by_file_path.clear();
        self.by_session.clear();
        self.by_tier.clear();
        self.effective_total = 0;
    }

    /// Rebuild the store from an ordered entry list (snapshot restore).
    /// The sequence counter continues from `next_seq` so ids are never
    /// reused.
    pub fn rebuild(entries: Vec<Entry>, next_seq: u64) -> Self {
        let mut store = Self {
            next_seq,
            ..Default::default()
        };
        for entry in entries {
            let id = entry.id.clone();
            if let Some(source) = &entry.metadata.source {
                store.by_source.entry(source.clone()).or_default().push(id.clone());
            }
            if let Some(path) = &entry.metadata.file_path {
                store.by_file_path.entry(path.clone()).or_default().push(id.clone());
            }
            if let Some(session) = &entry.metadata.session_id {
                store.by_session.entry(session.clone()).or_default().push(id.clone());
            }
            store.by_tier.entry(entry.tier).or_default().push(id.clone());
            store.effective_total += entry.effective_tokens();
            store.order.push(id.clone());
            store.entries.insert(id, entry);
        }
        store
    }

    /// Sequence counter, persisted in snapshots.
    pub fn next_seq(&self) -> u64 {
        self.next_seq
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entry::{CompressionMethod, EntryMetadata, EntryType};

    fn make_entry(tokens: u64, session: &str, path: Option<&str>) -> Entry {
        let mut metadata = EntryMetadata::for_session(session);
        metadata.file_path = path.map(String::from);
        Entry::new("content".to_string(), EntryType::FileRead, tokens, metadata, 1_000)
    }

    fn compressed(tokens: u64, original: u64) -> CompressedContent {
        CompressedContent {
            method: CompressionMethod::Summary,
            summary: Some("s".to_string()),
            vector_ref: None,
            compressed_tokens: tokens,
            ratio: tokens as f64 / original as f64,
            original_tokens: original,
            compressed_at: 2_000,
        }
    }

    #[test]
    fn test_insert_assigns_sequential_ids() {
        let mut store = EntryStore::new();
        let a = store.insert(make_entry(10, "s1", None));
        let b = store.insert(make_entry(10, "s1", None));
        assert_ne!(a, b);
        assert_eq!(store.len(), 2);
        assert_eq!(store.total_effective_tokens(), 20);
    }

    #[test]
    fn test_ids_not_reused_after_remove() {
        let mut store = EntryStore::new();
        let a = store.insert(make_entry(10, "s1", None));
        store.remove(&a);
        let b = store.insert(make_entry(10, "s1", None));
        assert_ne!(a, b);
    }

    #[test]
    fn test_get_unknown_id_is_none() {
        let store = EntryStore::new();
        assert!(store.get("missing-000000").is_none());
    }

    #[test]
    fn test_remove_updates_total_and_indices() {
        let mut store = EntryStore::new();
        let a = store.insert(make_entry(10, "s1", Some("src/a.rs")));
        let _b = store.insert(make_entry(20, "s1", Some("src/b.rs")));

        store.remove(&a).unwrap();
        assert_eq!(store.total_effective_tokens(), 20);
        assert!(store.by_file_path("src/a.rs").is_empty());
        assert_eq!(store.by_session("s1").len(), 1);
    }

    #[test]
    fn test_insertion_order_preserved() {
        let mut store = EntryStore::new();
        let ids: Vec<_> = (0..5)
            .map(|_| store.insert(make_entry(1, "s1", None)))
            .collect();
        let iterated: Vec<_> = store.iter().map(|e| e.id.clone()).collect();
        assert_eq!(ids, iterated);
    }

    #[test]
    fn test_session_lookup_is_scoped() {
        let mut store = EntryStore::new();
        store.insert(make_entry(10, "a", None));
        store.insert(make_entry(10, "b", None));
        store.insert(make_entry(10, "a", None));

        assert_eq!(store.by_session("a").len(), 2);
        assert_eq!(store.by_session("b").len(), 1);
        assert!(store.by_session("c").is_empty());
    }

    #[test]
    fn test_tier_index_follows_set_tier() {
        let mut store = EntryStore::new();
        let id = store.insert(make_entry(10, "s1", None));
        assert_eq!(store.in_tier(Tier::Hot).len(), 1);

        store.set_tier(&id, Tier::Warm);
        assert!(store.in_tier(Tier::Hot).is_empty());
        assert_eq!(store.in_tier(Tier::Warm).len(), 1);
        assert_eq!(store.get(&id).unwrap().tier, Tier::Warm);
    }

    #[test]
    fn test_compression_adjusts_running_total() {
        let mut store = EntryStore::new();
        let id = store.insert(make_entry(100, "s1", None));
        assert_eq!(store.total_effective_tokens(), 100);

        store.apply_compression(&id, compressed(25, 100));
        assert_eq!(store.total_effective_tokens(), 25);

        store.clear_compression(&id);
        assert_eq!(store.total_effective_tokens(), 100);
    }

    #[test]
    fn test_total_matches_sum_after_mixed_mutations() {
        let mut store = EntryStore::new();
        let a = store.insert(make_entry(100, "s1", None));
        let b = store.insert(make_entry(50, "s1", None));
        let _c = store.insert(make_entry(30, "s2", None));

        store.apply_compression(&a, compressed(10, 100));
        store.remove(&b);

        let expected: u64 = store.iter().map(|e| e.effective_tokens()).sum();
        assert_eq!(store.total_effective_tokens(), expected);
    }

    #[test]
    fn test_rebuild_preserves_order_and_total() {
        let mut store = EntryStore::new();
        store.insert(make_entry(10, "s1", Some("a.rs")));
        store.insert(make_entry(20, "s1", None));

        let entries: Vec<Entry> = store.iter().cloned().collect();
        let rebuilt = EntryStore::rebuild(entries, store.next_seq());

        assert_eq!(rebuilt.len(), 2);
        assert_eq!(rebuilt.total_effective_tokens(), 30);
        assert_eq!(
            rebuilt.iter().map(|e| e.id.clone()).collect::<Vec<_>>(),
            store.iter().map(|e| e.id.clone()).collect::<Vec<_>>()
        );
        assert_eq!(rebuilt.by_file_path("a.rs").len(), 1);
    }

    #[test]
    fn test_clear() {
        let mut store = EntryStore::new();
        store.insert(make_entry(10, "s1", None));
        store.clear();
        assert!(store.is_empty());
        assert_eq!(store.total_effective_tokens(), 0);
    }
}
