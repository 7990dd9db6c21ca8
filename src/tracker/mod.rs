pub mod handle;
pub mod neighbor;
pub mod rate;
pub mod session;
pub mod snapshot;
pub mod view;

use std::time::{SystemTime, UNIX_EPOCH};

pub use handle::{SessionHandle, SessionStatus};
pub use session::{Engine, LadderReport, RefreshReport, RefreshStatus, SearchReport, Session};
pub use snapshot::Handoff;

/// Wall clock as fractional unix seconds, the time base of rate records.
pub fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs_f64()
}
