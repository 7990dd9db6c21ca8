use std::collections::BTreeMap;

use crate::error::{AppError, Result};
use crate::ladder::ScanCache;
use crate::tracker::rate::RateTable;
use crate::types::LadderEntry;

const KEY_LEAGUE: &str = "league";
const KEY_TRACKED: &str = "tracked";
const KEY_SCAN_CACHE: &str = "scan_cache";
const KEY_RATE_RECORDS: &str = "rate_records";

/// Everything another view needs to pick up tracking where this session left off.
#[derive(Debug, Clone, PartialEq)]
pub struct Handoff {
    pub league: String,
    pub tracked: LadderEntry,
    pub cache: ScanCache,
    pub rates: RateTable,
}

impl Handoff {
    /// Flat string map, one JSON value per key.
    pub fn to_flat(&self) -> Result<BTreeMap<String, String>> {
        let mut flat = BTreeMap::new();
        flat.insert(KEY_LEAGUE.to_string(), self.league.clone());
        flat.insert(KEY_TRACKED.to_string(), serde_json::to_string(&self.tracked)?);
        flat.insert(KEY_SCAN_CACHE.to_string(), serde_json::to_string(&self.cache)?);
        flat.insert(KEY_RATE_RECORDS.to_string(), serde_json::to_string(&self.rates)?);
        Ok(flat)
    }

    /// Rebuild from a flat map. Cache and rate records are optional; league and
    /// tracked entry are not.
    pub fn from_flat(flat: &BTreeMap<String, String>) -> Result<Self> {
        let league = flat
            .get(KEY_LEAGUE)
            .filter(|l| !l.trim().is_empty())
            .cloned()
            .ok_or_else(|| AppError::Snapshot(format!("missing key '{KEY_LEAGUE}'")))?;
        let tracked = flat
            .get(KEY_TRACKED)
            .ok_or_else(|| AppError::Snapshot(format!("missing key '{KEY_TRACKED}'")))?;
        let tracked: LadderEntry = parse(KEY_TRACKED, tracked)?;

        let cache = match flat.get(KEY_SCAN_CACHE) {
            Some(raw) => ScanCache::from(parse::<Vec<LadderEntry>>(KEY_SCAN_CACHE, raw)?),
            None => ScanCache::new(),
        };
        let rates = match flat.get(KEY_RATE_RECORDS) {
            Some(raw) => parse(KEY_RATE_RECORDS, raw)?,
            None => RateTable::new(),
        };

        Ok(Self { league, tracked, cache, rates })
    }
}

fn parse<T: serde::de::DeserializeOwned>(key: &str, raw: &str) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| AppError::Snapshot(format!("bad value for '{key}': {e}")))
}
