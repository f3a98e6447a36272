//! Historical backfill: one bounded pass from the stored cursor up to the
//! finalized height captured at the start of the pass.

use super::commit::BlockCommitter;
use super::fetcher::{BlockFetcher, FetchError};
use super::worker_pool::FetchPool;
use crate::runtime::telemetry::Telemetry;
use crate::store::cursor::CursorStore;
use anyhow::{Context, Result};
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Splits `cursor + 1 ..= finalized` into consecutive windows of at most
/// `batch_size` numbers.
pub fn plan_windows(
    cursor: u64,
    finalized: u64,
    batch_size: usize,
) -> impl Iterator<Item = RangeInclusive<u64>> {
    let step = batch_size.max(1) as u64;
    let mut next = cursor.saturating_add(1);
    let mut exhausted = cursor >= finalized;
    std::iter::from_fn(move || {
        if exhausted || next > finalized {
            return None;
        }
        let end = next.saturating_add(step - 1).min(finalized);
        let window = next..=end;
        if end == u64::MAX {
            exhausted = true;
        }
        next = end.saturating_add(1);
        Some(window)
    })
}

/// Summary of one backfill pass.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BackfillReport {
    pub finalized_height: u64,
    pub start_cursor: u64,
    pub windows: usize,
    pub attempted: u64,
    pub ingested: u64,
    pub not_found: u64,
    pub failed: u64,
    pub last_window: Option<(u64, u64)>,
    pub cancelled: bool,
}

pub(crate) struct HistoricalBackfill {
    fetcher: BlockFetcher,
    pool: FetchPool,
    committer: BlockCommitter,
    cursor: CursorStore,
    batch_size: usize,
    telemetry: Arc<Telemetry>,
}

impl HistoricalBackfill {
    pub(crate) fn new(
        fetcher: BlockFetcher,
        committer: BlockCommitter,
        cursor: CursorStore,
        batch_size: usize,
        max_workers: usize,
        telemetry: Arc<Telemetry>,
    ) -> Self {
        Self {
            pool: FetchPool::new(fetcher.clone(), max_workers),
            fetcher,
            committer,
            cursor,
            batch_size: batch_size.max(1),
            telemetry,
        }
    }

    /// Runs one pass. Fails only when the finalized height or the starting
    /// cursor cannot be read; individual block failures are counted and
    /// dropped.
    pub(crate) async fn run(&self, shutdown: &CancellationToken) -> Result<BackfillReport> {
        let finalized_height = match self.fetcher.latest_finalized_height().await {
            Ok(height) => height,
            Err(err) => {
                self.telemetry.record_backfill_abort();
                return Err(anyhow::Error::new(err).context("historical backfill pass aborted"));
            }
        };
        let start_cursor = match self.cursor.latest_block_number().await {
            Ok(cursor) => cursor,
            Err(err) => {
                self.telemetry.record_backfill_abort();
                return Err(err).context("historical backfill pass aborted: cursor unreadable");
            }
        };

        let mut report = BackfillReport {
            finalized_height,
            start_cursor,
            ..BackfillReport::default()
        };

        tracing::info!(
            finalized_height,
            start_cursor,
            batch_size = self.batch_size,
            max_workers = self.pool.max_workers(),
            "starting historical backfill"
        );

        for window in plan_windows(start_cursor, finalized_height, self.batch_size) {
            if shutdown.is_cancelled() {
                report.cancelled = true;
                break;
            }

            let (start, end) = (*window.start(), *window.end());
            tracing::debug!(window_start = start, window_end = end, "dispatching window");
            report.windows += 1;
            report.attempted += end - start + 1;
            report.last_window = Some((start, end));

            if !self.drain_window(window, shutdown, &mut report).await {
                report.cancelled = true;
                break;
            }
        }

        if report.cancelled {
            tracing::info!(?report, "historical backfill interrupted by shutdown");
        } else {
            self.telemetry.record_backfill_pass();
            tracing::info!(
                finalized_height,
                ingested = report.ingested,
                not_found = report.not_found,
                failed = report.failed,
                "historical backfill pass complete"
            );
        }

        Ok(report)
    }

    /// Commits the window's blocks as their fetches complete. Returns `false`
    /// if shutdown interrupted the window; fetches still in flight are then
    /// abandoned, while a commit already in progress is allowed to finish.
    async fn drain_window(
        &self,
        window: RangeInclusive<u64>,
        shutdown: &CancellationToken,
        report: &mut BackfillReport,
    ) -> bool {
        let mut in_flight = self.pool.dispatch(window);

        loop {
            let outcome = tokio::select! {
                biased;
                _ = shutdown.cancelled() => return false,
                outcome = in_flight.next_completed() => outcome,
            };
            let Some(outcome) = outcome else {
                return true;
            };

            match outcome.result {
                Ok(data) => match self.committer.commit(outcome.number, &data).await {
                    Ok(_) => report.ingested += 1,
                    Err(err) => {
                        report.failed += 1;
                        tracing::error!(
                            block_number = outcome.number,
                            error = %format!("{err:#}"),
                            "failed to commit block"
                        );
                    }
                },
                Err(FetchError::NotFound) => report.not_found += 1,
                Err(_) => report.failed += 1,
            }
        }
    }
}
