use std::collections::HashMap;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::types::LadderEntry;

/// Last observation of one character plus the rate it produced.
/// Times are unix seconds.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct RateRecord {
    pub experience: u64,
    pub observed_at: f64,
    /// Experience per hour.
    pub last_rate: f64,
    pub last_rate_update: f64,
}

/// Per-name progression state for a session. Records are never removed.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RateTable {
    records: HashMap<String, RateRecord>,
}

impl RateTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fold one refresh cycle's observations in and return each one's hourly rate.
    pub fn update_rates(
        &mut self,
        observations: &[LadderEntry],
        now: f64,
        idle_timeout: Duration,
    ) -> HashMap<String, f64> {
        observations
            .iter()
            .map(|e| (e.name.clone(), self.observe(&e.name, e.experience, now, idle_timeout)))
            .collect()
    }

    pub fn observe(&mut self, name: &str, experience: u64, now: f64, idle_timeout: Duration) -> f64 {
        let Some(record) = self.records.get_mut(name) else {
            self.records.insert(
                name.to_string(),
                RateRecord { experience, observed_at: now, last_rate: 0.0, last_rate_update: now },
            );
            return 0.0;
        };

        if experience > record.experience {
            let elapsed = now - record.observed_at;
            if elapsed <= 0.0 {
                // Same instant or a clock step back; nothing to divide by.
                return record.last_rate;
            }
            let rate = (experience - record.experience) as f64 / elapsed * 3600.0;
            *record = RateRecord { experience, observed_at: now, last_rate: rate, last_rate_update: now };
            return rate;
        }

        // Unchanged or went down. Never report a negative rate.
        record.experience = experience;
        record.observed_at = now;
        if now - record.last_rate_update > idle_timeout.as_secs_f64() {
            if record.last_rate != 0.0 {
                record.last_rate = 0.0;
                record.last_rate_update = now;
            }
            0.0
        } else {
            record.last_rate
        }
    }

    /// Rate from the character's last live sighting, if it was ever seen.
    pub fn last_rate(&self, name: &str) -> Option<f64> {
        self.records.get(name).map(|r| r.last_rate)
    }

    /// Characters observed so far this session.
    pub fn len(&self) -> usize {
        self.records.len()
    }
}

#[cfg(test)]
impl RateTable {
    pub fn get(&self, name: &str) -> Option<&RateRecord> {
        self.records.get(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const IDLE: Duration = Duration::from_secs(300);
    const T0: f64 = 1_700_000_000.0;

    /// First sighting at T0 - 60, gain of 1000 at T0: 60_000/h, last updated at T0.
    fn gaining() -> RateTable {
        let mut rates = RateTable::new();
        rates.observe("a", 1_000, T0 - 60.0, IDLE);
        assert_eq!(rates.observe("a", 2_000, T0, IDLE), 60_000.0);
        rates
    }

    #[test]
    fn first_sighting_is_zero() {
        let mut rates = RateTable::new();
        assert_eq!(rates.observe("a", 5_000, T0, IDLE), 0.0);
        let record = rates.get("a").unwrap();
        assert_eq!(record.experience, 5_000);
        assert_eq!(record.last_rate_update, T0);
    }

    #[test]
    fn unchanged_keeps_rate_until_idle() {
        let mut rates = gaining();
        assert_eq!(rates.observe("a", 2_000, T0 + 60.0, IDLE), 60_000.0);
        assert_eq!(rates.observe("a", 2_000, T0 + 299.0, IDLE), 60_000.0);
        assert_eq!(rates.get("a").unwrap().last_rate_update, T0);
    }

    #[test]
    fn goes_idle_after_timeout() {
        let mut rates = gaining();
        assert_eq!(rates.observe("a", 2_000, T0 + 301.0, IDLE), 0.0);
        let record = rates.get("a").unwrap();
        assert_eq!(record.last_rate, 0.0);
        assert_eq!(record.last_rate_update, T0 + 301.0);
    }

    #[test]
    fn repeated_observation_is_idempotent() {
        let mut rates = gaining();
        let first = rates.observe("a", 2_000, T0 + 100.0, IDLE);
        let second = rates.observe("a", 2_000, T0 + 100.0, IDLE);
        assert_eq!(first, second);
    }

    #[test]
    fn experience_loss_never_goes_negative() {
        let mut rates = gaining();
        assert_eq!(rates.observe("a", 1_500, T0 + 30.0, IDLE), 60_000.0);
        assert_eq!(rates.get("a").unwrap().experience, 1_500);
    }

    #[test]
    fn gain_without_elapsed_time_reports_previous_rate() {
        let mut rates = gaining();
        assert_eq!(rates.observe("a", 9_000, T0, IDLE), 60_000.0);
        assert_eq!(rates.get("a").unwrap().experience, 2_000);
    }

    #[test]
    fn update_rates_covers_every_observation() {
        use crate::ladder::RankAssigner;
        use crate::types::RawLadderEntry;

        let batch = RankAssigner::new().stamp(
            0,
            vec![
                RawLadderEntry::sample("a", "Witch", 90, 100),
                RawLadderEntry::sample("b", "Witch", 90, 50),
            ],
        );
        let mut rates = RateTable::new();
        let out = rates.update_rates(&batch, T0, IDLE);
        assert_eq!(out.len(), 2);
        assert_eq!(out["a"], 0.0);
        assert_eq!(rates.len(), 2);
    }
}
