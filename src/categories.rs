//! Ascendancy tables keyed by league variant.
//!
//! The ladder reports each character's ascendancy as its `class`; unascended
//! characters report a base class instead, which never appears here.

use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::AppError;

const CURRENT: &[&str] = &[
    "Ascendant", "Assassin", "Berserker", "Champion", "Chieftain", "Deadeye", "Elementalist",
    "Gladiator", "Guardian", "Hierophant", "Inquisitor", "Juggernaut", "Necromancer", "Occultist",
    "Pathfinder", "Saboteur", "Slayer", "Trickster", "Warden",
];

/// Leagues started before the Warden replaced the Raider.
const LEGACY: &[&str] = &[
    "Ascendant", "Assassin", "Berserker", "Champion", "Chieftain", "Deadeye", "Elementalist",
    "Gladiator", "Guardian", "Hierophant", "Inquisitor", "Juggernaut", "Necromancer", "Occultist",
    "Pathfinder", "Raider", "Saboteur", "Slayer", "Trickster",
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CategoryVariant {
    Current,
    Legacy,
}

impl std::fmt::Display for CategoryVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            CategoryVariant::Current => "current",
            CategoryVariant::Legacy => "legacy",
        };
        write!(f, "{s}")
    }
}

impl FromStr for CategoryVariant {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "current" => Ok(CategoryVariant::Current),
            "legacy" => Ok(CategoryVariant::Legacy),
            other => Err(AppError::Config(format!(
                "CATEGORY_VARIANT must be 'current' or 'legacy', got '{other}'"
            ))),
        }
    }
}

/// Alphabetically ordered category names for one variant.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CategoryTable {
    names: Vec<String>,
}

impl CategoryTable {
    pub fn for_variant(variant: CategoryVariant) -> Self {
        let source = match variant {
            CategoryVariant::Current => CURRENT,
            CategoryVariant::Legacy => LEGACY,
        };
        Self::from_names(source.iter().map(|s| s.to_string()))
    }

    pub fn from_names(names: impl IntoIterator<Item = String>) -> Self {
        let mut names: Vec<String> = names.into_iter().collect();
        names.sort();
        names.dedup();
        Self { names }
    }

    pub fn contains(&self, category: &str) -> bool {
        self.names.binary_search_by(|n| n.as_str().cmp(category)).is_ok()
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn len(&self) -> usize {
        self.names.len()
    }
}
