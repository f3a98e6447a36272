//! Ingestion orchestration.
//!
//! `IngestionCoordinator` wires the pieces that live in sibling modules:
//! - `fetcher` turns a block number into a block document.
//! - `commit` stores a block, publishes its event and advances the cursor.
//! - `backfill` walks the gap between the cursor and the finalized head in
//!   bounded windows fanned out through `worker_pool`.
//! - `realtime` follows the chain one block past the cursor.
//! - `lifecycle` owns the run-scoped tasks and their cancellation.
//!
//! Both modes share the cursor without in-process locking. Duplicate commits
//! are harmless, and the store's conditional write keeps the cursor moving
//! forward.

use super::backfill::{BackfillReport, HistoricalBackfill};
use super::commit::BlockCommitter;
use super::fetcher::BlockFetcher;
use super::lifecycle::LifecycleHandles;
use super::realtime::{PollOutcome, RealtimePoller};
use crate::rpc::client::ChainRpc;
use crate::runtime::config::IngestConfig;
use crate::runtime::telemetry::Telemetry;
use crate::store::backend::KeyValueStore;
use crate::store::cursor::CursorStore;
use anyhow::{bail, Context, Result};
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

pub struct IngestionCoordinator {
    config: IngestConfig,
    rpc: Arc<dyn ChainRpc>,
    cursor: CursorStore,
    telemetry: Arc<Telemetry>,
    shutdown_root: CancellationToken,
    lifecycle: Option<LifecycleHandles>,
    running: bool,
}

impl IngestionCoordinator {
    /// Creates a coordinator with its own root cancellation token.
    pub fn new(
        config: IngestConfig,
        rpc: Arc<dyn ChainRpc>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        Self::with_cancellation_token(config, rpc, store, CancellationToken::new())
    }

    /// Creates a coordinator whose runs are children of `shutdown_token`.
    pub fn with_cancellation_token(
        config: IngestConfig,
        rpc: Arc<dyn ChainRpc>,
        store: Arc<dyn KeyValueStore>,
        shutdown_token: CancellationToken,
    ) -> Self {
        Self {
            config,
            rpc,
            cursor: CursorStore::new(store),
            telemetry: Arc::new(Telemetry::default()),
            shutdown_root: shutdown_token,
            lifecycle: None,
            running: false,
        }
    }

    pub fn config(&self) -> &IngestConfig {
        &self.config
    }

    pub fn cursor(&self) -> &CursorStore {
        &self.cursor
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.telemetry.clone()
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Names of the ingestion modes whose tasks are still alive.
    pub fn active_modes(&self) -> Vec<&'static str> {
        self.lifecycle
            .as_ref()
            .map(LifecycleHandles::active_modes)
            .unwrap_or_default()
    }

    /// Replaces the root token runs derive from. Only valid while stopped.
    pub fn replace_shutdown_root(&mut self, shutdown: CancellationToken) {
        debug_assert!(
            !self.running,
            "shutdown token should not change while ingestion is running"
        );
        self.shutdown_root = shutdown;
    }

    /// Runs one historical backfill pass on the caller's task.
    pub async fn run_backfill(&self, shutdown: &CancellationToken) -> Result<BackfillReport> {
        self.backfill().run(shutdown).await
    }

    /// Runs one real-time poll on the caller's task.
    pub async fn poll_realtime_once(&self, shutdown: &CancellationToken) -> PollOutcome {
        self.poller().poll_once(shutdown).await
    }

    /// Spawns the enabled ingestion modes and the metrics reporter.
    pub async fn start(&mut self) -> Result<()> {
        if self.running {
            bail!("ingestion already running");
        }

        debug_assert!(
            self.config.validate().is_ok(),
            "IngestConfig should have been validated at construction time"
        );

        let start_cursor = self
            .cursor
            .latest_block_number()
            .await
            .context("failed to read stored cursor")?;

        tracing::info!(
            start_cursor,
            historical = self.config.historical_enabled(),
            realtime = self.config.realtime_enabled(),
            batch_size = self.config.batch_size(),
            max_workers = self.config.max_workers(),
            "starting ingestion"
        );

        let mut lifecycle = LifecycleHandles::spawn(
            &self.shutdown_root,
            self.telemetry.clone(),
            self.cursor.clone(),
            self.rpc.clone(),
            self.config.metrics_interval(),
        );

        if self.config.historical_enabled() {
            let backfill = self.backfill();
            let token = lifecycle.run_token.clone();
            lifecycle.spawn_mode("historical", async move {
                match backfill.run(&token).await {
                    Ok(report) => tracing::debug!(?report, "historical backfill finished"),
                    Err(err) => tracing::error!(
                        error = %format!("{err:#}"),
                        "historical backfill pass aborted"
                    ),
                }
            });
        }

        if self.config.realtime_enabled() {
            let poller = self.poller();
            let token = lifecycle.run_token.clone();
            lifecycle.spawn_mode("realtime", async move { poller.run(token).await });
        }

        self.lifecycle = Some(lifecycle);
        self.running = true;
        Ok(())
    }

    /// Cancels the current run and waits for its tasks. In-flight fetches are
    /// abandoned; a commit already under way finishes first.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.running {
            return Ok(());
        }

        tracing::info!("stopping ingestion");
        let failure = match self.lifecycle.take() {
            Some(handles) => handles.shutdown().await,
            None => None,
        };
        self.running = false;

        if let Some(err) = failure {
            return Err(err).context("ingestion pipeline aborted");
        }

        let snapshot = self.telemetry.snapshot();
        tracing::info!(
            ingested = snapshot.ingested_blocks,
            fetch_errors = snapshot.fetch_errors,
            "ingestion stopped"
        );
        Ok(())
    }

    fn fetcher(&self) -> BlockFetcher {
        BlockFetcher::new(self.rpc.clone(), self.telemetry.clone())
    }

    fn committer(&self) -> BlockCommitter {
        BlockCommitter::new(self.cursor.clone(), self.telemetry.clone())
    }

    fn backfill(&self) -> HistoricalBackfill {
        HistoricalBackfill::new(
            self.fetcher(),
            self.committer(),
            self.cursor.clone(),
            self.config.batch_size(),
            self.config.max_workers(),
            self.telemetry.clone(),
        )
    }

    fn poller(&self) -> RealtimePoller {
        RealtimePoller::new(
            self.fetcher(),
            self.committer(),
            self.cursor.clone(),
            self.config.poll_interval(),
        )
    }
}
