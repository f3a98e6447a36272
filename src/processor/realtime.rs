//! Real-time follower: ingests `cursor + 1` once per polling interval.

use super::commit::BlockCommitter;
use super::fetcher::{BlockFetcher, FetchError};
use crate::store::cursor::CursorStore;
use std::time::Duration;
use tokio_util::sync::CancellationToken;

/// What a single poll did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PollOutcome {
    Ingested(u64),
    /// The node has not produced this block yet.
    Pending(u64),
    /// Fetch or commit failed; the next poll tries again.
    Failed(u64),
    CursorUnavailable,
    Cancelled,
}

pub(crate) struct RealtimePoller {
    fetcher: BlockFetcher,
    committer: BlockCommitter,
    cursor: CursorStore,
    poll_interval: Duration,
}

impl RealtimePoller {
    pub(crate) fn new(
        fetcher: BlockFetcher,
        committer: BlockCommitter,
        cursor: CursorStore,
        poll_interval: Duration,
    ) -> Self {
        Self {
            fetcher,
            committer,
            cursor,
            poll_interval,
        }
    }

    pub(crate) async fn run(&self, shutdown: CancellationToken) {
        tracing::info!(
            poll_interval_ms = self.poll_interval.as_millis() as u64,
            "starting real-time polling"
        );
        loop {
            if self.poll_once(&shutdown).await == PollOutcome::Cancelled {
                break;
            }
            tokio::select! {
                _ = shutdown.cancelled() => break,
                _ = tokio::time::sleep(self.poll_interval) => {}
            }
        }
        tracing::info!("real-time polling stopped");
    }

    pub(crate) async fn poll_once(&self, shutdown: &CancellationToken) -> PollOutcome {
        let current = match self.cursor.latest_block_number().await {
            Ok(current) => current,
            Err(err) => {
                tracing::warn!(error = %format!("{err:#}"), "failed to read cursor");
                return PollOutcome::CursorUnavailable;
            }
        };
        let Some(next) = current.checked_add(1) else {
            return PollOutcome::Pending(current);
        };

        let outcome = tokio::select! {
            biased;
            _ = shutdown.cancelled() => return PollOutcome::Cancelled,
            outcome = self.fetcher.fetch(next) => outcome,
        };

        match outcome.result {
            Ok(data) => match self.committer.commit(next, &data).await {
                Ok(_) => PollOutcome::Ingested(next),
                Err(err) => {
                    tracing::error!(
                        block_number = next,
                        error = %format!("{err:#}"),
                        "failed to commit block"
                    );
                    PollOutcome::Failed(next)
                }
            },
            Err(FetchError::NotFound) => PollOutcome::Pending(next),
            Err(_) => PollOutcome::Failed(next),
        }
    }
}
