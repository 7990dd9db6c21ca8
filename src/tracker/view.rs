use std::collections::HashMap;

use crate::types::{LadderEntry, RaceRow, RaceTable, RankDimension};

/// Ahead/self/behind for one dimension as found by the neighbor resolver.
pub struct Trio<'a> {
    pub ahead: Option<&'a LadderEntry>,
    pub me: &'a LadderEntry,
    pub behind: Option<&'a LadderEntry>,
}

/// Build a race table. `my_rank` is the rank shown for self in this dimension;
/// neighbors are shown one place either side of it, since ranks stitched from the
/// live window and the cache are not comparable.
pub fn race_table(
    dimension: RankDimension,
    trio: Trio<'_>,
    my_rank: u32,
    rates: &HashMap<String, f64>,
) -> RaceTable {
    let me = trio.me;
    let row = |entry: &LadderEntry, rank: u32| RaceRow {
        name: entry.name.clone(),
        level: entry.level,
        category: entry.category.clone(),
        global_rank: entry.global_rank,
        rank,
        experience: entry.experience,
        experience_gap: entry.experience as i64 - me.experience as i64,
        rate_per_hour: if entry.suppresses_rate() {
            None
        } else {
            rates.get(&entry.name).copied()
        },
        deceased: entry.deceased,
        retired: entry.retired,
    };

    RaceTable {
        dimension,
        ahead: trio.ahead.map(|e| row(e, my_rank.saturating_sub(1).max(1))),
        me: row(me, my_rank),
        behind: trio.behind.map(|e| row(e, my_rank + 1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ladder::RankAssigner;
    use crate::types::RawLadderEntry;

    #[test]
    fn rows_carry_gap_rank_and_suppressed_rates() {
        let mut raw = vec![
            RawLadderEntry::sample("Lead", "Witch", 96, 5_000),
            RawLadderEntry::sample("Me", "Witch", 95, 4_000),
            RawLadderEntry::sample("Chaser", "Witch", 95, 3_500),
        ];
        raw[2].dead = true;
        let entries = RankAssigner::new().stamp(0, raw);
        let rates = HashMap::from([("Lead".to_string(), 1_200.0), ("Me".to_string(), 900.0)]);

        let table = race_table(
            RankDimension::Category,
            Trio { ahead: Some(&entries[0]), me: &entries[1], behind: Some(&entries[2]) },
            7,
            &rates,
        );

        let ahead = table.ahead.unwrap();
        assert_eq!(ahead.experience_gap, 1_000);
        assert_eq!(ahead.rank, 6);
        assert_eq!(ahead.rate_per_hour, Some(1_200.0));
        assert_eq!(table.me.experience_gap, 0);
        assert_eq!(table.me.rank, 7);
        let behind = table.behind.unwrap();
        assert_eq!(behind.experience_gap, -500);
        assert_eq!(behind.rank, 8);
        assert_eq!(behind.rate_per_hour, None);
    }

    #[test]
    fn neighbor_without_rate_shows_none() {
        let entries = RankAssigner::new().stamp(
            0,
            vec![
                RawLadderEntry::sample("Old", "Witch", 96, 9_000),
                RawLadderEntry::sample("Me", "Witch", 95, 4_000),
            ],
        );
        let rates = HashMap::from([("Me".to_string(), 300.0)]);
        let table = race_table(
            RankDimension::Category,
            Trio { ahead: Some(&entries[0]), me: &entries[1], behind: None },
            2,
            &rates,
        );
        assert_eq!(table.ahead.unwrap().rate_per_hour, None);
        assert_eq!(table.me.rate_per_hour, Some(300.0));
    }

    #[test]
    fn missing_neighbors_stay_empty() {
        let entries = RankAssigner::new().stamp(0, vec![RawLadderEntry::sample("Solo", "Witch", 90, 10)]);
        let table = race_table(
            RankDimension::Global,
            Trio { ahead: None, me: &entries[0], behind: None },
            1,
            &HashMap::from([("Solo".to_string(), 0.0)]),
        );
        assert!(table.ahead.is_none() && table.behind.is_none());
        assert_eq!(table.me.rate_per_hour, Some(0.0));
    }
}
