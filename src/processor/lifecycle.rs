//! Run-scoped tasks owned by `IngestionCoordinator` between `start` and `stop`.

use crate::rpc::client::ChainRpc;
use crate::runtime::telemetry::{self, Telemetry};
use crate::store::cursor::CursorStore;
use anyhow::{anyhow, Error};
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

pub(crate) struct LifecycleHandles {
    pub run_token: CancellationToken,
    metrics_handle: Option<JoinHandle<()>>,
    mode_handles: Vec<(&'static str, JoinHandle<()>)>,
}

impl LifecycleHandles {
    /// Derives a run token from `shutdown_root` and starts the metrics reporter.
    pub(crate) fn spawn(
        shutdown_root: &CancellationToken,
        telemetry: Arc<Telemetry>,
        cursor: CursorStore,
        rpc: Arc<dyn ChainRpc>,
        metrics_interval: Duration,
    ) -> Self {
        let run_token = shutdown_root.child_token();
        let metrics_handle = telemetry::spawn_metrics_reporter(
            telemetry,
            cursor,
            rpc,
            run_token.clone(),
            metrics_interval,
        );
        Self {
            run_token,
            metrics_handle: Some(metrics_handle),
            mode_handles: Vec::new(),
        }
    }

    /// Spawns an ingestion mode under this run.
    pub(crate) fn spawn_mode<F>(&mut self, name: &'static str, task: F)
    where
        F: Future<Output = ()> + Send + 'static,
    {
        self.mode_handles.push((name, tokio::spawn(task)));
    }

    pub(crate) fn active_modes(&self) -> Vec<&'static str> {
        self.mode_handles
            .iter()
            .filter(|(_, handle)| !handle.is_finished())
            .map(|(name, _)| *name)
            .collect()
    }

    /// Cancels the run and joins every task. Returns the first panic seen.
    pub(crate) async fn shutdown(mut self) -> Option<Error> {
        self.run_token.cancel();

        let mut first_error = None;
        for (name, handle) in self.mode_handles.drain(..) {
            if let Err(err) = handle.await {
                tracing::error!(mode = name, error = %err, "ingestion task terminated unexpectedly");
                first_error.get_or_insert_with(|| anyhow!("{name} task failed: {err}"));
            }
        }

        if let Some(handle) = self.metrics_handle.take() {
            if let Err(err) = handle.await {
                tracing::warn!(error = %err, "metrics reporter task panicked");
            }
        }

        first_error
    }
}
