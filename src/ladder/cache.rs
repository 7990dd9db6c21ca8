use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::types::LadderEntry;

/// Entries gathered by earlier scans of the current league, ordered by global rank.
///
/// Only ever grows while the league and target stay the same. A newer scan
/// replaces the rank range it covered; anything outside that range is kept as
/// stale context for neighbor lookups.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ScanCache {
    entries: Vec<LadderEntry>,
}

impl ScanCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Merge one scan's contiguous output into the cache.
    pub fn absorb(&mut self, scanned: &[LadderEntry]) {
        let (Some(first), Some(last)) = (scanned.first(), scanned.last()) else {
            return;
        };
        let (lo, hi) = (first.global_rank, last.global_rank);
        let fresh: HashSet<&str> = scanned.iter().map(|e| e.name.as_str()).collect();

        let mut merged: Vec<LadderEntry> = Vec::with_capacity(self.entries.len() + scanned.len());
        let (before, after): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .filter(|e| (e.global_rank < lo || e.global_rank > hi) && !fresh.contains(e.name.as_str()))
            .partition(|e| e.global_rank < lo);

        merged.extend(before);
        merged.extend_from_slice(scanned);
        merged.extend(after);
        self.entries = merged;
    }

    pub fn entries(&self) -> &[LadderEntry] {
        &self.entries
    }

    pub fn find(&self, name: &str) -> Option<&LadderEntry> {
        self.entries.iter().find(|e| e.is_named(name))
    }

    pub fn in_category(&self, category: &str) -> Vec<LadderEntry> {
        self.entries.iter().filter(|e| e.category == category).cloned().collect()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }
}

impl From<Vec<LadderEntry>> for ScanCache {
    fn from(mut entries: Vec<LadderEntry>) -> Self {
        entries.sort_by_key(|e| e.global_rank);
        Self { entries }
    }
}
