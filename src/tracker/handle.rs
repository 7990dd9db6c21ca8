use std::collections::BTreeMap;
use std::sync::{Arc, Mutex as StdMutex, PoisonError};
use std::time::Duration;

use serde::Serialize;
use tokio::sync::{watch, Mutex, MutexGuard};
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::error::{AppError, Result};
use crate::refresh::AutoRefresher;
use crate::tracker::now_secs;
use crate::tracker::session::{Engine, LadderReport, RefreshReport, SearchReport, Session};
use crate::types::{LadderEntry, ScanState, TrackingView};

/// Summary served on the status route.
#[derive(Debug, Clone, Serialize)]
pub struct SessionStatus {
    pub id: u64,
    pub league: String,
    pub deep: bool,
    pub state: ScanState,
    pub tracked: Option<String>,
    pub auto_refresh: bool,
}

/// Shared handle to one session.
///
/// Every operation takes the session lock. Starting one first cancels whatever
/// holds the lock, then waits for it to notice and let go, so at most one
/// operation runs per session.
pub struct SessionHandle {
    id: u64,
    league: String,
    deep: bool,
    engine: Arc<Engine>,
    session: Mutex<Session>,
    current: StdMutex<Current>,
    auto_refresh: StdMutex<Option<CancellationToken>>,
    tracked: StdMutex<Option<String>>,
    last_view: StdMutex<Option<TrackingView>>,
    state: watch::Sender<ScanState>,
}

impl SessionHandle {
    pub fn new(id: u64, engine: Arc<Engine>, session: Session) -> Self {
        let (state, _) = watch::channel(ScanState::Idle);
        Self {
            id,
            league: session.league().to_string(),
            deep: session.deep(),
            tracked: StdMutex::new(session.tracked().map(|t| t.name.clone())),
            last_view: StdMutex::new(session.view().cloned()),
            engine,
            session: Mutex::new(session),
            current: StdMutex::new(Current::default()),
            auto_refresh: StdMutex::new(None),
            state,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn league(&self) -> &str {
        &self.league
    }

    pub fn state(&self) -> ScanState {
        self.state.borrow().clone()
    }

    pub fn status(&self) -> SessionStatus {
        SessionStatus {
            id: self.id,
            league: self.league.clone(),
            deep: self.deep,
            state: self.state(),
            tracked: lock(&self.tracked).clone(),
            auto_refresh: self.auto_refresh_active(),
        }
    }

    /// Most recent race view, without waiting on a running operation.
    pub fn tracking_view(&self) -> Option<TrackingView> {
        lock(&self.last_view).clone()
    }

    pub fn auto_refresh_active(&self) -> bool {
        lock(&self.auto_refresh).as_ref().is_some_and(|t| !t.is_cancelled())
    }

    /// Cancel the in-flight operation and take over the session.
    async fn begin(&self) -> (MutexGuard<'_, Session>, CancellationToken) {
        let token = CancellationToken::new();
        {
            let mut current = lock(&self.current);
            current.token.cancel();
            current.token = token.clone();
            current.waiting += 1;
        }
        let _waiting = Waiting(&self.current);
        (self.session.lock().await, token)
    }

    /// Cancel the in-flight operation, if any.
    pub fn stop(&self) {
        lock(&self.current).token.cancel();
    }

    pub async fn ladder(&self, category: Option<String>) -> Result<LadderReport> {
        let (mut session, cancel) = self.begin().await;
        self.engine.ladder(&mut session, category, &self.state, &cancel).await
    }

    pub async fn show_more(&self) -> Result<LadderReport> {
        let (mut session, cancel) = self.begin().await;
        self.engine.show_more(&mut session, &self.state, &cancel).await
    }

    pub async fn search(&self, name: &str) -> Result<SearchReport> {
        let (mut session, cancel) = self.begin().await;
        self.engine.search(&mut session, name, &self.state, &cancel).await
    }

    /// Manual refresh: preempts whatever is running.
    pub async fn refresh(&self) -> Result<RefreshReport> {
        let (mut session, cancel) = self.begin().await;
        self.run_refresh(&mut session, &cancel).await
    }

    /// Timer refresh: skipped (`None`) when another operation holds the session.
    pub async fn try_refresh(&self) -> Option<Result<RefreshReport>> {
        let (mut session, cancel) = {
            let mut current = lock(&self.current);
            // A queued operation owns the current token; don't cut in ahead of it.
            if current.waiting > 0 {
                return None;
            }
            let session = self.session.try_lock().ok()?;
            current.token = CancellationToken::new();
            (session, current.token.clone())
        };
        Some(self.run_refresh(&mut session, &cancel).await)
    }

    async fn run_refresh(&self, session: &mut Session, cancel: &CancellationToken) -> Result<RefreshReport> {
        let report = self.engine.refresh(session, now_secs(), &self.state, cancel).await?;
        *lock(&self.last_view) = session.view().cloned();
        Ok(report)
    }

    /// Start tracking the last search hit, optionally refreshing it on a timer.
    pub async fn track(self: &Arc<Self>, auto_refresh: bool) -> Result<LadderEntry> {
        let entry = {
            let (mut session, _cancel) = self.begin().await;
            let entry = session.track()?;
            *lock(&self.last_view) = session.view().cloned();
            entry
        };
        *lock(&self.tracked) = Some(entry.name.clone());
        self.stop_auto_refresh();

        if auto_refresh {
            let token = CancellationToken::new();
            *lock(&self.auto_refresh) = Some(token.clone());
            let period = Duration::from_secs(self.engine.config().refresh_interval_secs);
            tokio::spawn(AutoRefresher::new(Arc::clone(self), period, token).run());
        }
        info!(
            event = "TRACK_START",
            session = self.id,
            name = %entry.name,
            auto_refresh,
            "[TRACK] tracking started",
        );
        Ok(entry)
    }

    pub fn stop_auto_refresh(&self) {
        if let Some(token) = lock(&self.auto_refresh).take() {
            token.cancel();
        }
    }

    /// Flat key-value snapshot for handing tracking to another view.
    pub fn snapshot(&self) -> Result<BTreeMap<String, String>> {
        let session = self
            .session
            .try_lock()
            .map_err(|_| AppError::Conflict("an operation is in flight; stop it or retry".to_string()))?;
        session.handoff()?.to_flat()
    }

    /// Cancel everything this session runs. Called when it leaves the registry.
    pub fn shutdown(&self) {
        self.stop();
        self.stop_auto_refresh();
    }
}

/// Token of the operation that holds the session or is queued for it, plus how many
/// `begin` calls are still waiting on the session lock. Swapped only under this lock.
#[derive(Default)]
struct Current {
    token: CancellationToken,
    waiting: usize,
}

/// Counts one `begin` as waiting until the session lock is taken or the wait is dropped.
struct Waiting<'a>(&'a StdMutex<Current>);

impl Drop for Waiting<'_> {
    fn drop(&mut self) {
        lock(self.0).waiting -= 1;
    }
}

fn lock<T>(m: &StdMutex<T>) -> std::sync::MutexGuard<'_, T> {
    m.lock().unwrap_or_else(PoisonError::into_inner)
}
