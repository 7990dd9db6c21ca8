use std::collections::HashMap;

use crate::types::{LadderEntry, RawLadderEntry};

/// Stamps global and per-category ranks onto entries in scan order.
///
/// One assigner lives for one logical scan. Its category counters carry over
/// from chunk to chunk, so it must be handed every chunk of that scan in order
/// and never rebuilt between chunks.
#[derive(Debug, Clone, Default)]
pub struct RankAssigner {
    counts: HashMap<String, u32>,
}

impl RankAssigner {
    pub fn new() -> Self {
        Self::default()
    }

    /// `global_rank = offset + index + 1`; `category_rank` continues each category's running count.
    pub fn stamp(&mut self, offset: usize, batch: Vec<RawLadderEntry>) -> Vec<LadderEntry> {
        batch
            .into_iter()
            .enumerate()
            .map(|(i, raw)| {
                let category_rank = self.bump(&raw.character.class);
                LadderEntry {
                    name: raw.character.name,
                    category: raw.character.class,
                    level: raw.character.level,
                    experience: raw.character.experience,
                    global_rank: (offset + i + 1) as u32,
                    category_rank,
                    deceased: raw.dead,
                    retired: raw.retired,
                    account_name: raw.account.map(|a| a.name),
                }
            })
            .collect()
    }

    /// Re-derive category ranks for entries already in global rank order.
    /// Entries without a global rank get their 1-based position.
    pub fn restamp(entries: &mut [LadderEntry]) {
        let mut assigner = Self::new();
        for (i, entry) in entries.iter_mut().enumerate() {
            if entry.global_rank == 0 {
                entry.global_rank = (i + 1) as u32;
            }
            entry.category_rank = assigner.bump(&entry.category);
        }
    }

    /// Entries of `category` stamped so far in this scan.
    pub fn count(&self, category: &str) -> u32 {
        self.counts.get(category).copied().unwrap_or(0)
    }

    fn bump(&mut self, category: &str) -> u32 {
        let slot = self.counts.entry(category.to_string()).or_insert(0);
        *slot += 1;
        *slot
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(classes: &[&str], start: usize) -> Vec<RawLadderEntry> {
        classes
            .iter()
            .enumerate()
            .map(|(i, c)| RawLadderEntry::sample(&format!("char{}", start + i), c, 90, 1_000))
            .collect()
    }

    #[test]
    fn global_ranks_are_gapless_across_chunks() {
        let mut ranks = RankAssigner::new();
        let mut all = ranks.stamp(0, chunk(&["A", "B", "A"], 0));
        all.extend(ranks.stamp(3, chunk(&["B", "B"], 3)));

        let global: Vec<u32> = all.iter().map(|e| e.global_rank).collect();
        assert_eq!(global, vec![1, 2, 3, 4, 5]);
    }

    #[test]
    fn category_counter_carries_over_chunk_boundary() {
        let mut ranks = RankAssigner::new();
        let first = ranks.stamp(0, chunk(&["A", "B", "A"], 0));
        let second = ranks.stamp(3, chunk(&["A", "B"], 3));

        assert_eq!(first[2].category_rank, 2);
        assert_eq!(second[0].category_rank, 3);
        assert_eq!(second[1].category_rank, 2);
        assert_eq!(ranks.count("A"), 3);
        assert_eq!(ranks.count("C"), 0);
    }

    #[test]
    fn honours_non_zero_start_offset() {
        let mut ranks = RankAssigner::new();
        let stamped = ranks.stamp(400, chunk(&["A", "A"], 0));
        assert_eq!(stamped[0].global_rank, 401);
        assert_eq!(stamped[1].global_rank, 402);
        assert_eq!(stamped[1].category_rank, 2);
    }

    #[test]
    fn carries_flags_and_account() {
        let mut raw = RawLadderEntry::sample("Ghost", "Slayer", 97, 5);
        raw.dead = true;
        raw.account = Some(crate::types::RawAccount { name: "acct#1".to_string() });
        let stamped = RankAssigner::new().stamp(0, vec![raw]);
        assert!(stamped[0].deceased);
        assert!(stamped[0].suppresses_rate());
        assert_eq!(stamped[0].account_name.as_deref(), Some("acct#1"));
    }

    #[test]
    fn restamp_assigns_category_ranks_in_order() {
        let mut entries = RankAssigner::new().stamp(0, chunk(&["A", "B", "A", "A"], 0));
        for e in &mut entries {
            e.category_rank = 0;
        }
        RankAssigner::restamp(&mut entries);
        let ranks: Vec<u32> = entries.iter().map(|e| e.category_rank).collect();
        assert_eq!(ranks, vec![1, 1, 2, 3]);
    }
}
