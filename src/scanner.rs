use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::ScanSettings;
use crate::error::AppError;
use crate::fetcher::PageSource;
use crate::ladder::grouper::quota_met;
use crate::ladder::RankAssigner;
use crate::types::{LadderEntry, Operation, RawLadderEntry, ScanState};

/// What a scan is after.
#[derive(Debug, Clone)]
pub enum ScanMode {
    /// Stop at the first entry whose name matches, ignoring case.
    Find { name: String },
    /// Stop once each listed category holds `quota` entries.
    Quota { categories: Vec<String>, quota: usize },
}

/// Where a scan stands. Carrying it between calls extends a scan instead of restarting it,
/// keeping the category counters continuous.
#[derive(Debug, Default)]
pub struct ScanCursor {
    pub next_offset: usize,
    pub ranks: RankAssigner,
    /// Every entry stamped so far, in global rank order.
    pub scanned: Vec<LadderEntry>,
}

impl ScanCursor {
    pub fn new() -> Self {
        Self::default()
    }
}

#[derive(Debug, Clone)]
pub struct FoundTarget {
    pub target: LadderEntry,
    /// Up to `preceding_context` entries before the target, the target, then the rest of
    /// its chunk plus any lookahead entries.
    pub context: Vec<LadderEntry>,
}

#[derive(Debug)]
pub enum ScanOutcome {
    Found(Box<FoundTarget>),
    QuotaMet,
    CeilingReached,
    /// The page source ran out of entries.
    Exhausted,
    Cancelled,
    Failed(AppError),
}

impl ScanOutcome {
    /// Terminal state to publish, given how far the cursor got.
    pub fn state(&self, scanned: usize) -> ScanState {
        match self {
            ScanOutcome::Found(found) => ScanState::Found {
                name: found.target.name.clone(),
                global_rank: found.target.global_rank,
            },
            ScanOutcome::QuotaMet => ScanState::QuotaMet { scanned },
            ScanOutcome::CeilingReached => ScanState::CeilingReached { scanned },
            ScanOutcome::Exhausted => ScanState::Exhausted { scanned },
            ScanOutcome::Cancelled => ScanState::Cancelled { scanned },
            ScanOutcome::Failed(e) => ScanState::Failed {
                message: format!("stopped due to network error: {e}"),
            },
        }
    }
}

/// Walks the ladder one chunk at a time, strictly sequentially, pausing between requests.
pub struct ChunkedScanner<'a> {
    source: &'a dyn PageSource,
    settings: &'a ScanSettings,
    progress: Option<(&'a watch::Sender<ScanState>, Operation)>,
}

impl<'a> ChunkedScanner<'a> {
    pub fn new(source: &'a dyn PageSource, settings: &'a ScanSettings) -> Self {
        Self { source, settings, progress: None }
    }

    /// Publish `Scanning` progress on `tx` after every chunk.
    pub fn with_progress(mut self, tx: &'a watch::Sender<ScanState>, operation: Operation) -> Self {
        self.progress = Some((tx, operation));
        self
    }

    pub async fn scan(
        &self,
        league: &str,
        mode: &ScanMode,
        cursor: &mut ScanCursor,
        cancel: &CancellationToken,
    ) -> ScanOutcome {
        let chunk_size = self.settings.chunk_size.max(1);
        let mut first_request = true;

        loop {
            if cancel.is_cancelled() {
                return ScanOutcome::Cancelled;
            }
            if let ScanMode::Quota { categories, quota } = mode {
                if quota_met(|c| cursor.ranks.count(c), categories, *quota) {
                    return ScanOutcome::QuotaMet;
                }
            }
            if self.ceiling_reached(cursor.next_offset) {
                info!(league, offset = cursor.next_offset, "[SCAN] ceiling reached");
                return ScanOutcome::CeilingReached;
            }

            if !first_request && !self.pace(cancel).await {
                return ScanOutcome::Cancelled;
            }
            first_request = false;

            let offset = cursor.next_offset;
            let raw = match self.fetch(league, offset, chunk_size, cancel).await {
                Some(Ok(raw)) => raw,
                Some(Err(e)) => {
                    warn!(league, offset, "[SCAN] page fetch failed: {e}");
                    return ScanOutcome::Failed(e);
                }
                None => return ScanOutcome::Cancelled,
            };
            if raw.is_empty() {
                debug!(league, offset, "[SCAN] empty page, end of ladder");
                return ScanOutcome::Exhausted;
            }

            let chunk_len = raw.len();
            let chunk_start = cursor.scanned.len();
            let stamped = cursor.ranks.stamp(offset, raw);
            cursor.scanned.extend(stamped);
            cursor.next_offset = offset + chunk_len;
            self.report(cursor.next_offset);
            debug!(league, offset, received = chunk_len, "[SCAN] chunk stamped");

            if let ScanMode::Find { name } = mode {
                let hit = cursor.scanned[chunk_start..]
                    .iter()
                    .position(|e| e.name.eq_ignore_ascii_case(name));
                if let Some(pos) = hit {
                    let full_chunk = chunk_len == chunk_size;
                    if full_chunk && pos + self.settings.lookahead_trigger >= chunk_len {
                        if !self.pace(cancel).await {
                            return ScanOutcome::Cancelled;
                        }
                        self.lookahead(league, cursor, cancel).await;
                    }
                    return ScanOutcome::Found(Box::new(self.found(cursor, chunk_start + pos)));
                }
            }

            if chunk_len < chunk_size {
                debug!(league, offset, "[SCAN] short page, end of ladder");
                return ScanOutcome::Exhausted;
            }
        }
    }

    fn ceiling_reached(&self, offset: usize) -> bool {
        self.settings.ceiling.is_some_and(|ceiling| offset >= ceiling)
    }

    /// One page request raced against cancellation. `None` means cancelled.
    async fn fetch(
        &self,
        league: &str,
        offset: usize,
        limit: usize,
        cancel: &CancellationToken,
    ) -> Option<crate::error::Result<Vec<RawLadderEntry>>> {
        tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            page = self.source.fetch_page(league, offset, limit) => Some(page),
        }
    }

    /// Sleep the pacing delay. Returns false when cancelled meanwhile.
    async fn pace(&self, cancel: &CancellationToken) -> bool {
        if self.settings.pacing.is_zero() {
            return !cancel.is_cancelled();
        }
        tokio::select! {
            biased;
            _ = cancel.cancelled() => false,
            _ = tokio::time::sleep(self.settings.pacing) => true,
        }
    }

    /// Extra small page past a target found at the tail of its chunk, so it has someone behind.
    /// Best effort: a failure here still leaves a valid find.
    async fn lookahead(&self, league: &str, cursor: &mut ScanCursor, cancel: &CancellationToken) {
        let offset = cursor.next_offset;
        match self.fetch(league, offset, self.settings.lookahead_size, cancel).await {
            Some(Ok(raw)) if !raw.is_empty() => {
                let received = raw.len();
                let stamped = cursor.ranks.stamp(offset, raw);
                cursor.scanned.extend(stamped);
                cursor.next_offset = offset + received;
                debug!(league, offset, received, "[SCAN] lookahead stamped");
            }
            Some(Ok(_)) | None => {}
            Some(Err(e)) => warn!(league, offset, "[SCAN] lookahead failed: {e}"),
        }
    }

    fn found(&self, cursor: &ScanCursor, idx: usize) -> FoundTarget {
        let start = idx.saturating_sub(self.settings.preceding_context);
        FoundTarget {
            target: cursor.scanned[idx].clone(),
            context: cursor.scanned[start..].to_vec(),
        }
    }

    fn report(&self, scanned: usize) {
        if let Some((tx, operation)) = self.progress {
            tx.send_replace(ScanState::Scanning { operation, scanned });
        }
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::time::Duration;

    use async_trait::async_trait;

    /// In-memory ladder that records every request.
    pub(crate) struct MockSource {
        pub entries: Vec<RawLadderEntry>,
        pub calls: Mutex<Vec<(usize, usize)>>,
        pub fail_at: Option<usize>,
        /// Time each request takes to answer.
        pub delay: Duration,
    }

    impl MockSource {
        pub fn new(entries: Vec<RawLadderEntry>) -> Self {
            Self { entries, calls: Mutex::new(Vec::new()), fail_at: None, delay: Duration::ZERO }
        }

        pub fn calls(&self) -> Vec<(usize, usize)> {
            self.calls.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl PageSource for MockSource {
        async fn fetch_page(
            &self,
            _league: &str,
            offset: usize,
            limit: usize,
        ) -> crate::error::Result<Vec<RawLadderEntry>> {
            self.calls.lock().unwrap().push((offset, limit));
            if !self.delay.is_zero() {
                tokio::time::sleep(self.delay).await;
            }
            if self.fail_at == Some(offset) {
                return Err(AppError::PageSource("connection reset".to_string()));
            }
            let start = offset.min(self.entries.len());
            let end = (offset + limit).min(self.entries.len());
            Ok(self.entries[start..end].to_vec())
        }
    }

    /// `count` entries named `c{i}`, classes cycling through `classes`.
    pub(crate) fn ladder(count: usize, classes: &[&str]) -> Vec<RawLadderEntry> {
        (0..count)
            .map(|i| {
                let class = classes[i % classes.len()];
                RawLadderEntry::sample(&format!("c{i}"), class, 90, 10_000_000 - i as u64)
            })
            .collect()
    }

    pub(crate) fn settings(chunk_size: usize) -> ScanSettings {
        ScanSettings {
            chunk_size,
            ceiling: Some(15_000),
            pacing: Duration::ZERO,
            lookahead_size: 10,
            lookahead_trigger: 2,
            preceding_context: 10,
        }
    }

    fn find(name: &str) -> ScanMode {
        ScanMode::Find { name: name.to_string() }
    }

    fn expect_found(outcome: ScanOutcome) -> FoundTarget {
        match outcome {
            ScanOutcome::Found(found) => *found,
            other => panic!("expected Found, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn finds_target_in_second_chunk_with_consistent_ranks() {
        let mut entries = ladder(600, &["A", "B", "C"]);
        entries[350].character.name = "Target".to_string();
        let source = MockSource::new(entries.clone());
        let settings = settings(200);
        let mut cursor = ScanCursor::new();

        let outcome = ChunkedScanner::new(&source, &settings)
            .scan("Standard", &find("target"), &mut cursor, &CancellationToken::new())
            .await;
        let found = expect_found(outcome);

        assert_eq!(found.target.global_rank, 351);
        let class = &entries[350].character.class;
        let same_class = entries[..=350].iter().filter(|e| &e.character.class == class).count();
        assert_eq!(found.target.category_rank as usize, same_class);

        assert_eq!(source.calls(), vec![(0, 200), (200, 200)]);
        assert_eq!(found.context.first().map(|e| e.global_rank), Some(341));
        assert_eq!(found.context.last().map(|e| e.global_rank), Some(400));
        assert_eq!(cursor.scanned.len(), 400);
    }

    #[tokio::test]
    async fn ranks_gapless_over_every_scanned_chunk() {
        let mut entries = ladder(600, &["A", "B", "C", "D"]);
        entries[599].character.name = "Last".to_string();
        let source = MockSource::new(entries);
        let settings = settings(200);
        let mut cursor = ScanCursor::new();

        ChunkedScanner::new(&source, &settings)
            .scan("Standard", &find("Last"), &mut cursor, &CancellationToken::new())
            .await;

        let global: Vec<u32> = cursor.scanned.iter().map(|e| e.global_rank).collect();
        assert_eq!(global, (1..=600).collect::<Vec<u32>>());
        for class in ["A", "B", "C", "D"] {
            let ranks: Vec<u32> = cursor
                .scanned
                .iter()
                .filter(|e| e.category == class)
                .map(|e| e.category_rank)
                .collect();
            assert_eq!(ranks, (1..=ranks.len() as u32).collect::<Vec<u32>>());
        }
    }

    #[tokio::test]
    async fn target_at_chunk_tail_triggers_lookahead() {
        let mut entries = ladder(600, &["A", "B"]);
        entries[199].character.name = "Edge".to_string();
        let source = MockSource::new(entries);
        let settings = settings(200);
        let mut cursor = ScanCursor::new();

        let found = expect_found(
            ChunkedScanner::new(&source, &settings)
                .scan("Standard", &find("Edge"), &mut cursor, &CancellationToken::new())
                .await,
        );

        assert_eq!(source.calls(), vec![(0, 200), (200, 10)]);
        assert_eq!(found.target.global_rank, 200);
        let behind = &found.context[found.context.len() - 10];
        assert_eq!(behind.global_rank, 201);
        // Lookahead entries continue the category counters.
        assert_eq!(behind.category, "A");
        assert_eq!(behind.category_rank, 101);
        assert_eq!(cursor.next_offset, 210);
    }

    #[tokio::test]
    async fn target_mid_chunk_skips_lookahead() {
        let mut entries = ladder(400, &["A"]);
        entries[197].character.name = "Mid".to_string();
        let source = MockSource::new(entries);
        let settings = settings(200);

        expect_found(
            ChunkedScanner::new(&source, &settings)
                .scan("Standard", &find("Mid"), &mut ScanCursor::new(), &CancellationToken::new())
                .await,
        );
        assert_eq!(source.calls(), vec![(0, 200)]);
    }

    #[tokio::test]
    async fn missing_target_exhausts_ladder() {
        let source = MockSource::new(ladder(25, &["A"]));
        let settings = settings(10);
        let mut cursor = ScanCursor::new();

        let outcome = ChunkedScanner::new(&source, &settings)
            .scan("Standard", &find("nobody"), &mut cursor, &CancellationToken::new())
            .await;

        assert!(matches!(outcome, ScanOutcome::Exhausted));
        assert_eq!(source.calls(), vec![(0, 10), (10, 10), (20, 10)]);
        assert_eq!(cursor.scanned.len(), 25);
    }

    #[tokio::test]
    async fn quota_mode_stops_when_every_category_is_filled() {
        let source = MockSource::new(ladder(100, &["A", "B"]));
        let settings = settings(10);
        let mut cursor = ScanCursor::new();
        let mode = ScanMode::Quota { categories: vec!["A".into(), "B".into()], quota: 12 };

        let outcome = ChunkedScanner::new(&source, &settings)
            .scan("Standard", &mode, &mut cursor, &CancellationToken::new())
            .await;

        assert!(matches!(outcome, ScanOutcome::QuotaMet));
        assert_eq!(source.calls().len(), 3);
        assert_eq!(cursor.next_offset, 30);
    }

    #[tokio::test]
    async fn quota_mode_respects_ceiling() {
        let source = MockSource::new(ladder(100, &["A", "B"]));
        let mut settings = settings(10);
        settings.ceiling = Some(30);
        let mode = ScanMode::Quota { categories: vec!["A".into()], quota: 1_000 };

        let outcome = ChunkedScanner::new(&source, &settings)
            .scan("Standard", &mode, &mut ScanCursor::new(), &CancellationToken::new())
            .await;

        assert!(matches!(outcome, ScanOutcome::CeilingReached));
        assert_eq!(source.calls().len(), 3);
    }

    #[tokio::test]
    async fn extending_a_scan_keeps_ranks_continuous() {
        let source = MockSource::new(ladder(100, &["A", "B", "C"]));
        let settings = settings(10);
        let scanner = ChunkedScanner::new(&source, &settings);
        let mut cursor = ScanCursor::new();
        let cancel = CancellationToken::new();

        let first = ScanMode::Quota { categories: vec!["A".into()], quota: 5 };
        scanner.scan("Standard", &first, &mut cursor, &cancel).await;
        let second = ScanMode::Quota { categories: vec!["A".into()], quota: 12 };
        scanner.scan("Standard", &second, &mut cursor, &cancel).await;

        assert_eq!(source.calls().first(), Some(&(0, 10)));
        let a_ranks: Vec<u32> = cursor
            .scanned
            .iter()
            .filter(|e| e.category == "A")
            .map(|e| e.category_rank)
            .collect();
        assert_eq!(a_ranks, (1..=a_ranks.len() as u32).collect::<Vec<u32>>());
        assert!(a_ranks.len() >= 12);
        let global: Vec<u32> = cursor.scanned.iter().map(|e| e.global_rank).collect();
        assert_eq!(global, (1..=cursor.scanned.len() as u32).collect::<Vec<u32>>());
    }

    #[tokio::test]
    async fn page_failure_aborts_and_keeps_partial_results() {
        let mut source = MockSource::new(ladder(100, &["A"]));
        source.fail_at = Some(10);
        let settings = settings(10);
        let mut cursor = ScanCursor::new();

        let outcome = ChunkedScanner::new(&source, &settings)
            .scan("Standard", &find("nobody"), &mut cursor, &CancellationToken::new())
            .await;

        assert!(matches!(outcome, ScanOutcome::Failed(AppError::PageSource(_))));
        assert_eq!(cursor.scanned.len(), 10);
        assert!(matches!(outcome.state(10), ScanState::Failed { .. }));
    }

    #[tokio::test]
    async fn cancelled_token_stops_before_fetching() {
        let source = MockSource::new(ladder(100, &["A"]));
        let settings = settings(10);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let outcome = ChunkedScanner::new(&source, &settings)
            .scan("Standard", &find("c5"), &mut ScanCursor::new(), &cancel)
            .await;

        assert!(matches!(outcome, ScanOutcome::Cancelled));
        assert!(source.calls().is_empty());
    }

    #[tokio::test]
    async fn publishes_progress() {
        let source = MockSource::new(ladder(30, &["A"]));
        let settings = settings(10);
        let (tx, rx) = watch::channel(ScanState::Idle);

        ChunkedScanner::new(&source, &settings)
            .with_progress(&tx, Operation::Search)
            .scan("Standard", &find("c25"), &mut ScanCursor::new(), &CancellationToken::new())
            .await;

        assert_eq!(
            *rx.borrow(),
            ScanState::Scanning { operation: Operation::Search, scanned: 30 }
        );
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_pacing_stops_before_next_fetch() {
        let source = MockSource::new(ladder(100, &["A"]));
        let mut settings = settings(10);
        settings.pacing = Duration::from_secs(1);
        let mut cursor = ScanCursor::new();
        let cancel = CancellationToken::new();

        let stop = async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            cancel.cancel();
        };
        let scanner = ChunkedScanner::new(&source, &settings);
        let mode = find("nobody");
        let (outcome, ()) = tokio::join!(scanner.scan("Standard", &mode, &mut cursor, &cancel), stop);

        assert!(matches!(outcome, ScanOutcome::Cancelled));
        assert_eq!(source.calls(), vec![(0, 10)]);
        assert_eq!(cursor.scanned.len(), 10);
    }

    #[tokio::test(start_paused = true)]
    async fn cancel_during_fetch_abandons_the_page() {
        let mut source = MockSource::new(ladder(100, &["A"]));
        source.delay = Duration::from_secs(2);
        let settings = settings(10);
        let mut cursor = ScanCursor::new();
        let cancel = CancellationToken::new();

        let stop = async {
            tokio::time::sleep(Duration::from_millis(500)).await;
            cancel.cancel();
        };
        let scanner = ChunkedScanner::new(&source, &settings);
        let mode = find("c5");
        let (outcome, ()) = tokio::join!(scanner.scan("Standard", &mode, &mut cursor, &cancel), stop);

        assert!(matches!(outcome, ScanOutcome::Cancelled));
        assert_eq!(source.calls(), vec![(0, 10)]);
        assert!(cursor.scanned.is_empty());
    }
}
