use std::collections::HashMap;

use crate::categories::CategoryTable;
use crate::ladder::RankAssigner;
use crate::types::LadderEntry;

/// Bucket a scanned set by category, keep the first `per_category_limit` of each
/// in rank order, and return them ordered by `(category, category_rank)`.
///
/// With `filter` set only that category is materialized. Without it, `known`
/// (when given) drops categories outside the table, such as unascended base classes.
pub fn group(
    entries: &[LadderEntry],
    filter: Option<&str>,
    per_category_limit: usize,
    known: Option<&CategoryTable>,
) -> Vec<LadderEntry> {
    let mut ordered: Vec<LadderEntry> = entries.to_vec();
    ordered.sort_by_key(|e| e.global_rank);
    if ordered.iter().any(|e| !e.is_ranked()) {
        RankAssigner::restamp(&mut ordered);
    }

    let mut taken: HashMap<String, usize> = HashMap::new();
    let mut grouped: Vec<LadderEntry> = Vec::new();

    for entry in ordered {
        let wanted = match filter {
            Some(category) => entry.category == category,
            None => known.map_or(true, |table| table.contains(&entry.category)),
        };
        if !wanted {
            continue;
        }
        let count = taken.entry(entry.category.clone()).or_insert(0);
        if *count < per_category_limit {
            *count += 1;
            grouped.push(entry);
        }
    }

    grouped.sort_by(|a, b| {
        a.category
            .cmp(&b.category)
            .then(a.category_rank.cmp(&b.category_rank))
    });
    grouped
}

/// True once every category in `categories` holds at least `quota` entries.
pub fn quota_met<'a>(
    counts: impl Fn(&str) -> u32,
    categories: impl IntoIterator<Item = &'a String>,
    quota: usize,
) -> bool {
    categories
        .into_iter()
        .all(|category| counts(category) as usize >= quota)
}
