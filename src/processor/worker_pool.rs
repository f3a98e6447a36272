//! Bounded fan-out of block fetches for one backfill window.
//!
//! Every number in the window gets its own task, but tasks must hold a
//! semaphore permit while fetching, so at most `max_workers` fetches are in
//! flight. Outcomes are handed back in completion order.

use super::fetcher::{BlockFetcher, FetchError, FetchOutcome};
use anyhow::anyhow;
use std::any::Any;
use std::ops::RangeInclusive;
use std::sync::Arc;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;

#[derive(Clone)]
pub(crate) struct FetchPool {
    fetcher: BlockFetcher,
    permits: Arc<Semaphore>,
    max_workers: usize,
}

impl FetchPool {
    pub(crate) fn new(fetcher: BlockFetcher, max_workers: usize) -> Self {
        let max_workers = max_workers.max(1);
        Self {
            fetcher,
            permits: Arc::new(Semaphore::new(max_workers)),
            max_workers,
        }
    }

    pub(crate) fn max_workers(&self) -> usize {
        self.max_workers
    }

    pub(crate) fn dispatch(&self, numbers: RangeInclusive<u64>) -> WindowFetch {
        let mut tasks = JoinSet::new();
        for number in numbers {
            let fetcher = self.fetcher.clone();
            let permits = self.permits.clone();
            tasks.spawn(async move {
                let _permit = match permits.acquire_owned().await {
                    Ok(permit) => permit,
                    Err(_) => {
                        return FetchOutcome {
                            number,
                            result: Err(FetchError::Transient(anyhow!("fetch pool closed"))),
                        }
                    }
                };
                fetcher.fetch(number).await
            });
        }
        WindowFetch { tasks }
    }
}

/// In-flight fetches of one window. Dropping it abandons whatever has not
/// completed yet.
pub(crate) struct WindowFetch {
    tasks: JoinSet<FetchOutcome>,
}

impl WindowFetch {
    /// Next finished fetch, or `None` once the window is drained.
    pub(crate) async fn next_completed(&mut self) -> Option<FetchOutcome> {
        while let Some(joined) = self.tasks.join_next().await {
            match joined {
                Ok(outcome) => return Some(outcome),
                Err(err) if err.is_panic() => {
                    let panic_msg = panic_message(err.into_panic().as_ref());
                    tracing::error!(panic = %panic_msg, "fetch task panicked");
                }
                Err(err) => {
                    tracing::debug!(error = %err, "fetch task cancelled");
                }
            }
        }
        None
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "unknown panic payload".to_string()
    }
}
