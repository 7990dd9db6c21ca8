use std::time::Duration;

use crate::categories::CategoryVariant;
use crate::error::{AppError, Result};

pub const LADDER_API_URL: &str = "https://www.pathofexile.com/api/ladders";
pub const LEAGUES_API_URL: &str = "https://www.pathofexile.com/api/leagues";

/// Entries requested per ladder page.
pub const CHUNK_SIZE: usize = 200;

/// Offset at which a standard (non-deep) scan gives up.
pub const SCAN_CEILING: usize = 15_000;

/// Sleep between consecutive page requests of one scan (milliseconds).
pub const PACING_DELAY_MS: u64 = 500;

/// Size of the extra page fetched when a found target sits at the tail of its chunk.
pub const LOOKAHEAD_SIZE: usize = 10;

/// A found target within this many positions of its chunk's end triggers the lookahead.
pub const LOOKAHEAD_TRIGGER: usize = 2;

/// Entries kept ahead of a found target for neighbor continuity.
pub const PRECEDING_CONTEXT: usize = 10;

/// Entries fetched around the tracked character on each refresh.
pub const TRACKING_WINDOW: usize = 200;

/// No experience gain for this long means the character is presumed idle (seconds).
pub const IDLE_TIMEOUT_SECS: u64 = 300;

/// Auto-refresh period for tracked sessions (seconds).
pub const REFRESH_INTERVAL_SECS: u64 = 60;

/// Per-category cap of the first bulk ladder view.
pub const INITIAL_LIMIT: usize = 10;

/// Cap growth applied by "show more".
pub const SHOW_MORE_STEP: usize = 20;

/// Knobs of the chunked scanner. Split out of `Config` so tests can build one directly.
#[derive(Debug, Clone)]
pub struct ScanSettings {
    pub chunk_size: usize,
    pub ceiling: Option<usize>,
    pub pacing: Duration,
    pub lookahead_size: usize,
    pub lookahead_trigger: usize,
    pub preceding_context: usize,
}

impl Default for ScanSettings {
    fn default() -> Self {
        Self {
            chunk_size: CHUNK_SIZE,
            ceiling: Some(SCAN_CEILING),
            pacing: Duration::from_millis(PACING_DELAY_MS),
            lookahead_size: LOOKAHEAD_SIZE,
            lookahead_trigger: LOOKAHEAD_TRIGGER,
            preceding_context: PRECEDING_CONTEXT,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Config {
    pub ladder_api_url: String,
    pub leagues_api_url: String,
    /// Contact address sent in the User-Agent (CONTACT)
    pub contact: String,
    pub log_level: String,
    pub api_port: u16,
    pub http_timeout_secs: u64,
    pub chunk_size: usize,
    /// Standard scan ceiling (SCAN_CEILING)
    pub scan_ceiling: usize,
    /// Deep scan ceiling; unset means scan until the ladder runs out (DEEP_SCAN_CEILING)
    pub deep_scan_ceiling: Option<usize>,
    pub pacing_delay_ms: u64,
    pub lookahead_size: usize,
    pub preceding_context: usize,
    pub tracking_window: usize,
    pub idle_timeout_secs: u64,
    pub refresh_interval_secs: u64,
    pub initial_limit: usize,
    pub show_more_step: usize,
    /// Which category table applies to the tracked leagues (CATEGORY_VARIANT)
    pub category_variant: CategoryVariant,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            ladder_api_url: std::env::var("LADDER_API_URL")
                .unwrap_or_else(|_| LADDER_API_URL.to_string()),
            leagues_api_url: std::env::var("LEAGUES_API_URL")
                .unwrap_or_else(|_| LEAGUES_API_URL.to_string()),
            contact: std::env::var("CONTACT").unwrap_or_else(|_| "dev@example.com".to_string()),
            log_level: std::env::var("LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            api_port: std::env::var("API_PORT")
                .unwrap_or_else(|_| "5000".to_string())
                .parse::<u16>()
                .map_err(|_| AppError::Config("API_PORT must be a valid port number".to_string()))?,
            http_timeout_secs: env_or("HTTP_TIMEOUT_SECS", 30),
            chunk_size: std::env::var("CHUNK_SIZE")
                .unwrap_or_else(|_| CHUNK_SIZE.to_string())
                .parse::<usize>()
                .ok()
                .filter(|n| *n > 0)
                .ok_or_else(|| AppError::Config("CHUNK_SIZE must be a positive integer".to_string()))?,
            scan_ceiling: env_or("SCAN_CEILING", SCAN_CEILING),
            deep_scan_ceiling: std::env::var("DEEP_SCAN_CEILING")
                .ok()
                .and_then(|s| s.parse::<usize>().ok()),
            pacing_delay_ms: env_or("PACING_DELAY_MS", PACING_DELAY_MS),
            lookahead_size: env_or("LOOKAHEAD_SIZE", LOOKAHEAD_SIZE),
            preceding_context: env_or("PRECEDING_CONTEXT", PRECEDING_CONTEXT),
            tracking_window: env_or("TRACKING_WINDOW", TRACKING_WINDOW),
            idle_timeout_secs: env_or("IDLE_TIMEOUT_SECS", IDLE_TIMEOUT_SECS),
            refresh_interval_secs: env_or("REFRESH_INTERVAL_SECS", REFRESH_INTERVAL_SECS).max(1),
            initial_limit: env_or("INITIAL_LIMIT", INITIAL_LIMIT),
            show_more_step: env_or("SHOW_MORE_STEP", SHOW_MORE_STEP),
            category_variant: std::env::var("CATEGORY_VARIANT")
                .unwrap_or_else(|_| "current".to_string())
                .parse::<CategoryVariant>()?,
        })
    }

    /// Scanner knobs for a session; `deep` lifts the standard ceiling.
    pub fn scan_settings(&self, deep: bool) -> ScanSettings {
        ScanSettings {
            chunk_size: self.chunk_size,
            ceiling: if deep { self.deep_scan_ceiling } else { Some(self.scan_ceiling) },
            pacing: Duration::from_millis(self.pacing_delay_ms),
            lookahead_size: self.lookahead_size,
            lookahead_trigger: LOOKAHEAD_TRIGGER,
            preceding_context: self.preceding_context,
        }
    }

    pub fn user_agent(&self) -> String {
        format!("ladder-tracker/{} (contact: {})", env!("CARGO_PKG_VERSION"), self.contact)
    }
}

fn env_or<T: std::str::FromStr>(key: &str, default: T) -> T {
    std::env::var(key)
        .ok()
        .and_then(|s| s.parse::<T>().ok())
        .unwrap_or(default)
}

#[cfg(test)]
impl Config {
    /// Defaults with no pacing and unroutable endpoints.
    pub fn for_tests() -> Self {
        Self {
            ladder_api_url: "http://127.0.0.1:9/api/ladders".to_string(),
            leagues_api_url: "http://127.0.0.1:9/api/leagues".to_string(),
            contact: "test@example.invalid".to_string(),
            log_level: "info".to_string(),
            api_port: 0,
            http_timeout_secs: 5,
            chunk_size: CHUNK_SIZE,
            scan_ceiling: SCAN_CEILING,
            deep_scan_ceiling: None,
            pacing_delay_ms: 0,
            lookahead_size: LOOKAHEAD_SIZE,
            preceding_context: PRECEDING_CONTEXT,
            tracking_window: TRACKING_WINDOW,
            idle_timeout_secs: IDLE_TIMEOUT_SECS,
            refresh_interval_secs: REFRESH_INTERVAL_SECS,
            initial_limit: INITIAL_LIMIT,
            show_more_step: SHOW_MORE_STEP,
            category_variant: CategoryVariant::Current,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deep_scan_lifts_standard_ceiling() {
        let mut cfg = Config::for_tests();
        assert_eq!(cfg.scan_settings(false).ceiling, Some(SCAN_CEILING));
        assert_eq!(cfg.scan_settings(true).ceiling, None);

        cfg.deep_scan_ceiling = Some(50_000);
        assert_eq!(cfg.scan_settings(true).ceiling, Some(50_000));
    }

    #[test]
    fn user_agent_carries_contact() {
        let cfg = Config::for_tests();
        assert!(cfg.user_agent().contains("test@example.invalid"));
    }
}
