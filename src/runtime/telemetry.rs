use crate::rpc::client::ChainRpc;
use crate::rpc::metrics::RpcMetricsSnapshot;
use crate::store::cursor::CursorStore;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};
use tokio::{select, time};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

/// Default interval used by the metrics reporter task.
pub const DEFAULT_METRICS_INTERVAL: Duration = Duration::from_secs(5);

static TRACING_INIT: OnceLock<()> = OnceLock::new();

/// Installs a basic tracing subscriber (if one is not already active).
///
/// The subscriber honours `RUST_LOG` if it is present, otherwise it falls back to `info`.
/// Calling this function multiple times is harmless.
pub fn init_tracing() {
    if TRACING_INIT.get().is_some() {
        return;
    }

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(true)
        .try_init();

    let _ = TRACING_INIT.set(());
}

/// Lightweight rolling counters used to derive runtime metrics.
#[derive(Default, Debug)]
pub struct Telemetry {
    ingested_blocks: AtomicU64,
    blocks_not_found: AtomicU64,
    fetch_errors: AtomicU64,
    store_errors: AtomicU64,
    publish_errors: AtomicU64,
    backfill_passes: AtomicU64,
    backfill_aborts: AtomicU64,
}

impl Telemetry {
    pub fn record_ingested_block(&self) {
        self.ingested_blocks.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_not_found(&self) {
        self.blocks_not_found.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_fetch_error(&self) {
        self.fetch_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_store_error(&self) {
        self.store_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_error(&self) {
        self.publish_errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backfill_pass(&self) {
        self.backfill_passes.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_backfill_abort(&self) {
        self.backfill_aborts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> TelemetrySnapshot {
        TelemetrySnapshot {
            ingested_blocks: self.ingested_blocks.load(Ordering::Relaxed),
            blocks_not_found: self.blocks_not_found.load(Ordering::Relaxed),
            fetch_errors: self.fetch_errors.load(Ordering::Relaxed),
            store_errors: self.store_errors.load(Ordering::Relaxed),
            publish_errors: self.publish_errors.load(Ordering::Relaxed),
            backfill_passes: self.backfill_passes.load(Ordering::Relaxed),
            backfill_aborts: self.backfill_aborts.load(Ordering::Relaxed),
        }
    }

    pub fn ingested_blocks(&self) -> u64 {
        self.ingested_blocks.load(Ordering::Relaxed)
    }

    pub fn fetch_errors(&self) -> u64 {
        self.fetch_errors.load(Ordering::Relaxed)
    }
}

#[derive(Debug, Copy, Clone, Default, PartialEq, Eq)]
pub struct TelemetrySnapshot {
    pub ingested_blocks: u64,
    pub blocks_not_found: u64,
    pub fetch_errors: u64,
    pub store_errors: u64,
    pub publish_errors: u64,
    pub backfill_passes: u64,
    pub backfill_aborts: u64,
}

/// Spawns a background task that periodically logs throughput, the stored cursor, error counts,
/// and the RPC client's request statistics when it keeps any.
pub fn spawn_metrics_reporter(
    telemetry: Arc<Telemetry>,
    cursor: CursorStore,
    rpc: Arc<dyn ChainRpc>,
    shutdown: CancellationToken,
    interval: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = time::interval(interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        let mut last_snapshot = telemetry.snapshot();
        let mut last_tick = Instant::now();

        loop {
            select! {
                _ = shutdown.cancelled() => {
                    tracing::info!(target: "substrate_ingest::metrics", "metrics reporter shutting down");
                    break;
                }
                _ = ticker.tick() => {
                    let current_snapshot = telemetry.snapshot();
                    let ingested_delta = current_snapshot
                        .ingested_blocks
                        .saturating_sub(last_snapshot.ingested_blocks);
                    let elapsed = last_tick.elapsed().as_secs_f64();
                    let throughput = if elapsed <= f64::EPSILON {
                        0.0
                    } else {
                        ingested_delta as f64 / elapsed
                    };
                    let latest_block_number = match cursor.latest_block_number().await {
                        Ok(value) => Some(value),
                        Err(err) => {
                            tracing::debug!(target: "substrate_ingest::metrics", error = %err, "failed to read cursor for metrics");
                            None
                        }
                    };

                    tracing::info!(
                        target: "substrate_ingest::metrics",
                        throughput = format!("{throughput:.2}"),
                        ingested = current_snapshot.ingested_blocks,
                        latest_block_number = ?latest_block_number,
                        not_found = current_snapshot.blocks_not_found,
                        fetch_errors = current_snapshot.fetch_errors,
                        store_errors = current_snapshot.store_errors,
                        publish_errors = current_snapshot.publish_errors,
                        "runtime metrics snapshot"
                    );

                    if let Some(rpc_snapshot) = rpc.rpc_metrics() {
                        log_rpc_metrics(&rpc_snapshot);
                    }

                    last_snapshot = current_snapshot;
                    last_tick = Instant::now();
                }
            }
        }
    })
}

fn log_rpc_metrics(snapshot: &RpcMetricsSnapshot) {
    tracing::info!(
        target: "substrate_ingest::metrics",
        rpc_requests = snapshot.total_requests,
        rpc_errors = snapshot.total_errors,
        rpc_timeouts = snapshot.total_timeouts,
        rpc_error_rate = format!("{:.4}", snapshot.error_rate),
        rpc_avg_latency_ms = format!("{:.2}", snapshot.average_latency_ms),
        "rpc metrics snapshot"
    );
    for method in &snapshot.methods {
        tracing::debug!(
            target: "substrate_ingest::metrics",
            method = method.method.name(),
            requests = method.requests,
            errors = method.errors,
            timeouts = method.timeouts,
            empty_results = method.empty_results,
            avg_latency_ms = format!("{:.2}", method.average_latency_ms()),
            "rpc method metrics"
        );
    }
}
