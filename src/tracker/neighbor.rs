use crate::types::{Direction, LadderEntry};

enum Lookup<'a> {
    Absent,
    /// Self is present but has nothing on that side.
    Edge,
    Adjacent(&'a LadderEntry),
}

fn adjacent<'a>(list: &'a [LadderEntry], name: &str, direction: Direction) -> Lookup<'a> {
    let Some(pos) = list.iter().position(|e| e.is_named(name)) else {
        return Lookup::Absent;
    };
    let next = match direction {
        Direction::Ahead => pos.checked_sub(1).and_then(|i| list.get(i)),
        Direction::Behind => list.get(pos + 1),
    };
    next.map_or(Lookup::Edge, Lookup::Adjacent)
}

/// The entry one rank ahead of or behind `me`, within whatever dimension the
/// caller filtered `live` and `cache` to.
///
/// The live window wins when it has an answer. When self sits on the window's
/// edge, or the window lost it, the cached scan is consulted instead. `None`
/// means neither source has a neighbor on that side.
pub fn neighbor(
    live: &[LadderEntry],
    me: &LadderEntry,
    direction: Direction,
    cache: &[LadderEntry],
) -> Option<LadderEntry> {
    if let Lookup::Adjacent(entry) = adjacent(live, &me.name, direction) {
        return Some(entry.clone());
    }
    match adjacent(cache, &me.name, direction) {
        Lookup::Adjacent(entry) => Some(entry.clone()),
        Lookup::Edge | Lookup::Absent => None,
    }
}

/// Rank of `me` within its category, read off the live ordering.
///
/// `live_category` is the window filtered to self's category, so its stamped
/// ranks count from the window's top. The nearest entry ahead of self whose
/// full-scan rank `known_rank` knows anchors the count instead. When nothing in
/// the window is ahead, the resolved `ahead` neighbor (usually from the cache)
/// does. `None` means no anchor was found.
pub fn anchored_category_rank(
    live_category: &[LadderEntry],
    me: &LadderEntry,
    ahead: Option<&LadderEntry>,
    known_rank: impl Fn(&str) -> Option<u32>,
) -> Option<u32> {
    let pos = live_category.iter().position(|e| e.is_named(&me.name))?;
    live_category[..pos]
        .iter()
        .rev()
        .zip(1u32..)
        .find_map(|(entry, distance)| known_rank(&entry.name).map(|rank| rank + distance))
        .or_else(|| ahead.and_then(|a| known_rank(&a.name)).map(|rank| rank + 1))
}
