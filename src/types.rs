use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// Ladder entries
// ---------------------------------------------------------------------------

/// One character's ladder snapshot, rank-stamped by the scan that produced it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LadderEntry {
    pub name: String,
    pub category: String,
    pub level: u32,
    pub experience: u64,
    pub global_rank: u32,
    pub category_rank: u32,
    #[serde(default)]
    pub deceased: bool,
    #[serde(default)]
    pub retired: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub account_name: Option<String>,
}

impl LadderEntry {
    /// Both ranks are 1-based, so zero marks an entry no assigner has touched.
    pub fn is_ranked(&self) -> bool {
        self.global_rank > 0 && self.category_rank > 0
    }

    /// Dead and retired characters never show a progression rate.
    pub fn suppresses_rate(&self) -> bool {
        self.deceased || self.retired
    }

    pub fn is_named(&self, name: &str) -> bool {
        self.name == name
    }
}

/// Wire shape of one ladder row as served by the page source.
#[derive(Debug, Clone, Deserialize)]
pub struct RawLadderEntry {
    #[serde(default)]
    pub dead: bool,
    #[serde(default)]
    pub retired: bool,
    pub character: RawCharacter,
    #[serde(default)]
    pub account: Option<RawAccount>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawCharacter {
    pub name: String,
    pub level: u32,
    pub class: String,
    #[serde(default)]
    pub experience: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RawAccount {
    pub name: String,
}

#[cfg(test)]
impl RawLadderEntry {
    pub fn sample(name: &str, class: &str, level: u32, experience: u64) -> Self {
        Self {
            dead: false,
            retired: false,
            character: RawCharacter {
                name: name.to_string(),
                level,
                class: class.to_string(),
                experience,
            },
            account: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Ranking dimensions
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    /// One rank better.
    Ahead,
    /// One rank worse.
    Behind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RankDimension {
    Global,
    Category,
}

// ---------------------------------------------------------------------------
// Operation state machine
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Operation {
    Ladder,
    Search,
    Refresh,
}

/// Published on the session's watch channel as operations progress.
/// `Idle → Scanning → {Found, QuotaMet, CeilingReached, Exhausted, Cancelled, Failed}`.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum ScanState {
    Idle,
    Scanning { operation: Operation, scanned: usize },
    Found { name: String, global_rank: u32 },
    QuotaMet { scanned: usize },
    CeilingReached { scanned: usize },
    Exhausted { scanned: usize },
    Cancelled { scanned: usize },
    Failed { message: String },
    /// A tracking refresh could not find the tracked character in its window.
    SelfMissing { name: String },
}

// ---------------------------------------------------------------------------
// Views handed to the rendering layer
// ---------------------------------------------------------------------------

/// One row of a race table.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceRow {
    pub name: String,
    pub level: u32,
    pub category: String,
    pub global_rank: u32,
    /// Rank shown in the row's dimension. For neighbors pulled from the cache this is stale.
    pub rank: u32,
    pub experience: u64,
    /// `row.experience - self.experience`; zero for the self row.
    pub experience_gap: i64,
    /// Hourly experience rate. `None` for dead or retired characters, and for neighbors
    /// known only from an earlier scan and never seen in a live window.
    pub rate_per_hour: Option<f64>,
    pub deceased: bool,
    pub retired: bool,
}

/// Ahead/self/behind for one ranking dimension. Missing neighbors render as "N/A".
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RaceTable {
    pub dimension: RankDimension,
    pub ahead: Option<RaceRow>,
    pub me: RaceRow,
    pub behind: Option<RaceRow>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrackingView {
    pub league: String,
    pub global: RaceTable,
    pub category: RaceTable,
    /// Unix seconds of the refresh that produced this view.
    pub refreshed_at: f64,
}
