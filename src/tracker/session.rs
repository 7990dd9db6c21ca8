use std::sync::Arc;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use crate::categories::CategoryTable;
use crate::config::Config;
use crate::error::{AppError, Result};
use crate::fetcher::PageSource;
use crate::ladder::{group, RankAssigner, ScanCache};
use crate::scanner::{ChunkedScanner, ScanCursor, ScanMode, ScanOutcome};
use crate::tracker::neighbor::{anchored_category_rank, neighbor};
use crate::tracker::rate::RateTable;
use crate::tracker::snapshot::Handoff;
use crate::tracker::view::{race_table, Trio};
use crate::types::{Direction, LadderEntry, Operation, RankDimension, ScanState, TrackingView};

const EMPTY_LEAGUE: &str = "league not found or is empty";

// ---------------------------------------------------------------------------
// Session state
// ---------------------------------------------------------------------------

/// A bulk ladder scan that "show more" can keep extending.
#[derive(Debug)]
struct BulkScan {
    cursor: ScanCursor,
    category: Option<String>,
    limit: usize,
}

/// Scan and tracking state for one league. Engine calls take it by `&mut`,
/// so at most one operation touches it at a time.
#[derive(Debug)]
pub struct Session {
    league: String,
    deep: bool,
    cache: ScanCache,
    rates: RateTable,
    /// Last search hit, the candidate for tracking.
    found: Option<LadderEntry>,
    tracked: Option<LadderEntry>,
    bulk: Option<BulkScan>,
    view: Option<TrackingView>,
}

impl Session {
    pub fn new(league: impl Into<String>, deep: bool) -> Self {
        Self {
            league: league.into(),
            deep,
            cache: ScanCache::new(),
            rates: RateTable::new(),
            found: None,
            tracked: None,
            bulk: None,
            view: None,
        }
    }

    /// Resume tracking from another session's snapshot.
    pub fn from_handoff(handoff: Handoff) -> Self {
        let mut session = Self::new(handoff.league, false);
        session.cache = handoff.cache;
        session.rates = handoff.rates;
        session.found = Some(handoff.tracked.clone());
        session.tracked = Some(handoff.tracked);
        session
    }

    pub fn handoff(&self) -> Result<Handoff> {
        let tracked = self
            .tracked
            .clone()
            .ok_or_else(|| AppError::BadRequest("no character is being tracked".to_string()))?;
        Ok(Handoff {
            league: self.league.clone(),
            tracked,
            cache: self.cache.clone(),
            rates: self.rates.clone(),
        })
    }

    /// Promote the last search hit to the tracked character.
    pub fn track(&mut self) -> Result<LadderEntry> {
        let found = self
            .found
            .clone()
            .ok_or_else(|| AppError::BadRequest("search for a character before tracking".to_string()))?;
        if self.tracked.as_ref().map_or(true, |t| !t.is_named(&found.name)) {
            self.view = None;
        }
        self.tracked = Some(found.clone());
        Ok(found)
    }

    pub fn league(&self) -> &str {
        &self.league
    }

    pub fn deep(&self) -> bool {
        self.deep
    }

    pub fn tracked(&self) -> Option<&LadderEntry> {
        self.tracked.as_ref()
    }

    pub fn view(&self) -> Option<&TrackingView> {
        self.view.as_ref()
    }
}

#[cfg(test)]
impl Session {
    pub fn cache(&self) -> &ScanCache {
        &self.cache
    }

    pub fn rates(&self) -> &RateTable {
        &self.rates
    }

    pub fn found(&self) -> Option<&LadderEntry> {
        self.found.as_ref()
    }
}

// ---------------------------------------------------------------------------
// Reports
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize)]
pub struct LadderReport {
    pub state: ScanState,
    pub category: Option<String>,
    pub limit: usize,
    /// Grouped by category, capped at `limit` per category.
    pub entries: Vec<LadderEntry>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SearchReport {
    pub state: ScanState,
    /// True when the hit came from earlier scans rather than a new remote scan.
    pub from_cache: bool,
    pub target: Option<LadderEntry>,
    pub context: Vec<LadderEntry>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RefreshStatus {
    Updated,
    /// The tracked character was not in the live window; the previous view stands.
    SelfMissing,
    Cancelled,
}

#[derive(Debug, Clone, Serialize)]
pub struct RefreshReport {
    pub status: RefreshStatus,
    pub view: Option<TrackingView>,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Runs scans, searches and tracking refreshes against a page source.
/// Holds no per-session state.
pub struct Engine {
    source: Arc<dyn PageSource>,
    cfg: Config,
    categories: CategoryTable,
}

impl Engine {
    pub fn new(source: Arc<dyn PageSource>, cfg: Config) -> Self {
        let categories = CategoryTable::for_variant(cfg.category_variant);
        Self { source, cfg, categories }
    }

    pub fn with_categories(mut self, categories: CategoryTable) -> Self {
        self.categories = categories;
        self
    }

    pub fn config(&self) -> &Config {
        &self.cfg
    }

    pub fn source(&self) -> &dyn PageSource {
        self.source.as_ref()
    }

    /// Fresh bulk scan: the top `INITIAL_LIMIT` of every category, or of one.
    pub async fn ladder(
        &self,
        session: &mut Session,
        category: Option<String>,
        progress: &watch::Sender<ScanState>,
        cancel: &CancellationToken,
    ) -> Result<LadderReport> {
        if let Some(c) = &category {
            if !self.categories.contains(c) {
                return Err(AppError::BadRequest(format!("unknown category '{c}'")));
            }
        }
        session.bulk = Some(BulkScan {
            cursor: ScanCursor::new(),
            category,
            limit: self.cfg.initial_limit,
        });
        self.run_bulk(session, progress, cancel).await
    }

    /// Grow the per-category cap and continue the filtered scan where it stopped.
    pub async fn show_more(
        &self,
        session: &mut Session,
        progress: &watch::Sender<ScanState>,
        cancel: &CancellationToken,
    ) -> Result<LadderReport> {
        let bulk = session
            .bulk
            .as_mut()
            .ok_or_else(|| AppError::BadRequest("no ladder scan to extend".to_string()))?;
        if bulk.category.is_none() {
            return Err(AppError::BadRequest("show more needs a category filter".to_string()));
        }
        bulk.limit += self.cfg.show_more_step;
        self.run_bulk(session, progress, cancel).await
    }

    async fn run_bulk(
        &self,
        session: &mut Session,
        progress: &watch::Sender<ScanState>,
        cancel: &CancellationToken,
    ) -> Result<LadderReport> {
        let settings = self.cfg.scan_settings(session.deep);
        let Session { league, bulk, cache, .. } = session;
        let bulk = bulk
            .as_mut()
            .ok_or_else(|| AppError::BadRequest("no ladder scan to extend".to_string()))?;

        let categories = match &bulk.category {
            Some(c) => vec![c.clone()],
            None => self.categories.names().to_vec(),
        };
        let mode = ScanMode::Quota { categories, quota: bulk.limit };
        let before = bulk.cursor.scanned.len();
        info!(
            event = "LADDER_START",
            league = %league,
            category = ?bulk.category,
            limit = bulk.limit,
            "[LADDER] scan started",
        );

        let outcome = ChunkedScanner::new(self.source.as_ref(), &settings)
            .with_progress(progress, Operation::Ladder)
            .scan(league, &mode, &mut bulk.cursor, cancel)
            .await;
        cache.absorb(&bulk.cursor.scanned[before..]);

        let state = if matches!(outcome, ScanOutcome::Exhausted) && bulk.cursor.scanned.is_empty() {
            ScanState::Failed { message: EMPTY_LEAGUE.to_string() }
        } else {
            outcome.state(bulk.cursor.next_offset)
        };
        progress.send_replace(state.clone());
        info!(
            event = "LADDER_DONE",
            league = %league,
            scanned = bulk.cursor.scanned.len(),
            state = ?state,
            "[LADDER] scan finished",
        );

        Ok(LadderReport {
            state,
            category: bulk.category.clone(),
            limit: bulk.limit,
            entries: group(
                &bulk.cursor.scanned,
                bulk.category.as_deref(),
                bulk.limit,
                Some(&self.categories),
            ),
        })
    }

    /// Look a character up by name, ignoring case. Earlier scans are checked before
    /// going remote.
    pub async fn search(
        &self,
        session: &mut Session,
        name: &str,
        progress: &watch::Sender<ScanState>,
        cancel: &CancellationToken,
    ) -> Result<SearchReport> {
        let name = name.trim();
        if name.is_empty() {
            return Err(AppError::BadRequest("character name is empty".to_string()));
        }

        if let Some(report) = self.search_cache(session, name) {
            progress.send_replace(report.state.clone());
            info!(
                event = "SEARCH_CACHE_HIT",
                league = %session.league,
                name,
                "[SEARCH] found in earlier scans",
            );
            return Ok(report);
        }

        let target_changed = session
            .found
            .as_ref()
            .is_some_and(|f| !f.name.eq_ignore_ascii_case(name));
        if target_changed {
            session.cache.clear();
        }

        info!(
            event = "SEARCH_START",
            league = %session.league,
            name,
            deep = session.deep,
            "[SEARCH] remote scan started",
        );
        let settings = self.cfg.scan_settings(session.deep);
        let mut cursor = ScanCursor::new();
        let outcome = ChunkedScanner::new(self.source.as_ref(), &settings)
            .with_progress(progress, Operation::Search)
            .scan(&session.league, &ScanMode::Find { name: name.to_string() }, &mut cursor, cancel)
            .await;
        session.cache.absorb(&cursor.scanned);

        let report = match outcome {
            ScanOutcome::Found(found) => {
                let state = ScanOutcome::Found(found.clone()).state(cursor.next_offset);
                session.found = Some(found.target.clone());
                SearchReport { state, from_cache: false, target: Some(found.target), context: found.context }
            }
            ScanOutcome::Exhausted if cursor.scanned.is_empty() => SearchReport {
                state: ScanState::Failed { message: EMPTY_LEAGUE.to_string() },
                from_cache: false,
                target: None,
                context: Vec::new(),
            },
            other => SearchReport {
                state: other.state(cursor.next_offset),
                from_cache: false,
                target: None,
                context: Vec::new(),
            },
        };
        progress.send_replace(report.state.clone());
        info!(
            event = "SEARCH_DONE",
            league = %session.league,
            name,
            scanned = cursor.scanned.len(),
            cached = session.cache.len(),
            state = ?report.state,
            "[SEARCH] remote scan finished",
        );
        Ok(report)
    }

    fn search_cache(&self, session: &mut Session, name: &str) -> Option<SearchReport> {
        let entries = session.cache.entries();
        let idx = entries.iter().position(|e| e.name.eq_ignore_ascii_case(name))?;
        let span = self.cfg.preceding_context;
        let start = idx.saturating_sub(span);
        let end = (idx + span + 1).min(entries.len());
        let target = entries[idx].clone();
        let context = entries[start..end].to_vec();

        session.found = Some(target.clone());
        Some(SearchReport {
            state: ScanState::Found { name: target.name.clone(), global_rank: target.global_rank },
            from_cache: true,
            target: Some(target),
            context,
        })
    }

    /// Fetch the live window around the tracked character and rebuild the race view.
    pub async fn refresh(
        &self,
        session: &mut Session,
        now: f64,
        progress: &watch::Sender<ScanState>,
        cancel: &CancellationToken,
    ) -> Result<RefreshReport> {
        let tracked = session
            .tracked
            .clone()
            .ok_or_else(|| AppError::BadRequest("no character is being tracked".to_string()))?;

        let window = self.cfg.tracking_window.max(1);
        let offset = (tracked.global_rank as usize).saturating_sub(window / 2);
        progress.send_replace(ScanState::Scanning { operation: Operation::Refresh, scanned: offset });

        let page = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            page = self.source.fetch_page(&session.league, offset, window) => Some(page),
        };
        let raw = match page {
            None => {
                progress.send_replace(ScanState::Cancelled { scanned: offset });
                return Ok(RefreshReport { status: RefreshStatus::Cancelled, view: session.view.clone() });
            }
            Some(Err(e)) => {
                warn!(
                    event = "TRACK_FAILED",
                    league = %session.league,
                    name = %tracked.name,
                    "[TRACK] window fetch failed: {e}",
                );
                let message = format!("stopped due to network error: {e}");
                progress.send_replace(ScanState::Failed { message });
                return Err(e);
            }
            Some(Ok(raw)) => raw,
        };

        let live = RankAssigner::new().stamp(offset, raw);
        let Some(mut me) = live.iter().find(|e| e.is_named(&tracked.name)).cloned() else {
            warn!(
                event = "TRACK_SELF_MISSING",
                league = %session.league,
                name = %tracked.name,
                offset,
                "[TRACK] tracked character not in live window",
            );
            progress.send_replace(ScanState::SelfMissing { name: tracked.name.clone() });
            return Ok(RefreshReport { status: RefreshStatus::SelfMissing, view: session.view.clone() });
        };

        let cached = session.cache.entries();
        let global_ahead = neighbor(&live, &me, Direction::Ahead, cached);
        let global_behind = neighbor(&live, &me, Direction::Behind, cached);

        let live_category: Vec<LadderEntry> =
            live.iter().filter(|e| e.category == me.category).cloned().collect();
        let cached_category = session.cache.in_category(&me.category);
        let category_ahead = neighbor(&live_category, &me, Direction::Ahead, &cached_category);
        let category_behind = neighbor(&live_category, &me, Direction::Behind, &cached_category);

        // Window stamps count categories from the window's top, not the ladder's.
        let known_rank = |name: &str| session.cache.find(name).map(|e| e.category_rank);
        me.category_rank =
            anchored_category_rank(&live_category, &me, category_ahead.as_ref(), known_rank)
                .or_else(|| known_rank(&me.name))
                .unwrap_or(tracked.category_rank);

        // Only live sightings feed the rate table. Cache-sourced neighbors carry an old
        // experience that must not be timed against `now`.
        let mut observed: Vec<LadderEntry> = vec![me.clone()];
        let mut stale: Vec<&LadderEntry> = Vec::new();
        for entry in [&global_ahead, &global_behind, &category_ahead, &category_behind]
            .into_iter()
            .flatten()
        {
            if !live.iter().any(|l| l.is_named(&entry.name)) {
                stale.push(entry);
            } else if !observed.iter().any(|o| o.is_named(&entry.name)) {
                observed.push(entry.clone());
            }
        }
        let idle_timeout = std::time::Duration::from_secs(self.cfg.idle_timeout_secs);
        let mut rates = session.rates.update_rates(&observed, now, idle_timeout);
        for entry in stale {
            if let Some(rate) = session.rates.last_rate(&entry.name) {
                rates.entry(entry.name.clone()).or_insert(rate);
            }
        }

        let view = TrackingView {
            league: session.league.clone(),
            global: race_table(
                RankDimension::Global,
                Trio { ahead: global_ahead.as_ref(), me: &me, behind: global_behind.as_ref() },
                me.global_rank,
                &rates,
            ),
            category: race_table(
                RankDimension::Category,
                Trio { ahead: category_ahead.as_ref(), me: &me, behind: category_behind.as_ref() },
                me.category_rank,
                &rates,
            ),
            refreshed_at: now,
        };

        info!(
            event = "TRACK_REFRESH",
            league = %session.league,
            name = %me.name,
            global_rank = me.global_rank,
            category_rank = me.category_rank,
            rate_records = session.rates.len(),
            "[TRACK] view refreshed",
        );
        progress.send_replace(ScanState::Found { name: me.name.clone(), global_rank: me.global_rank });
        session.tracked = Some(me);
        session.view = Some(view.clone());
        Ok(RefreshReport { status: RefreshStatus::Updated, view: Some(view) })
    }
}
