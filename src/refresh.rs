use std::sync::Arc;
use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::tracker::{RefreshStatus, SessionHandle};

/// Periodically refreshes one session's tracking view until its token is cancelled.
///
/// Ticks never queue up: a tick that finds another operation holding the
/// session is skipped, and slow refreshes delay the next tick rather than
/// bunching them.
pub struct AutoRefresher {
    handle: Arc<SessionHandle>,
    period: Duration,
    cancel: CancellationToken,
}

impl AutoRefresher {
    pub fn new(handle: Arc<SessionHandle>, period: Duration, cancel: CancellationToken) -> Self {
        Self { handle, period, cancel }
    }

    pub async fn run(self) {
        let mut ticker = interval(self.period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await; // consume immediate first tick; tracking just started

        info!(
            session = self.handle.id(),
            period_secs = self.period.as_secs(),
            "[REFRESH] auto-refresh started",
        );
        loop {
            tokio::select! {
                biased;
                _ = self.cancel.cancelled() => break,
                _ = ticker.tick() => {}
            }
            self.tick().await;
        }
        info!(session = self.handle.id(), "[REFRESH] auto-refresh stopped");
    }

    async fn tick(&self) {
        match self.handle.try_refresh().await {
            None => debug!(session = self.handle.id(), "[REFRESH] operation in flight, tick skipped"),
            Some(Ok(report)) if report.status == RefreshStatus::SelfMissing => {
                warn!(session = self.handle.id(), "[REFRESH] tracked character missing from window")
            }
            Some(Ok(_)) => {}
            Some(Err(e)) => warn!(session = self.handle.id(), "[REFRESH] refresh failed: {e}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories::CategoryTable;
    use crate::config::Config;
    use crate::scanner::tests::{ladder, MockSource};
    use crate::tracker::{Engine, Session};

    #[tokio::test(start_paused = true)]
    async fn refreshes_on_each_tick_until_cancelled() {
        let mut cfg = Config::for_tests();
        cfg.chunk_size = 10;
        cfg.tracking_window = 10;
        let source = Arc::new(MockSource::new(ladder(30, &["Witch"])));
        let engine = Engine::new(source.clone(), cfg)
            .with_categories(CategoryTable::from_names(["Witch".to_string()]));
        let handle = Arc::new(SessionHandle::new(7, Arc::new(engine), Session::new("Standard", false)));
        handle.search("c4").await.unwrap();
        handle.track(false).await.unwrap();
        let before = source.calls().len();

        let cancel = CancellationToken::new();
        let task = tokio::spawn(
            AutoRefresher::new(handle.clone(), Duration::from_secs(60), cancel.clone()).run(),
        );
        tokio::time::sleep(Duration::from_secs(125)).await;
        cancel.cancel();
        task.await.unwrap();

        assert_eq!(source.calls().len() - before, 2);
        assert!(handle.tracking_view().is_some());
    }
}
