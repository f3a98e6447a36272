use crate::processor::coordinator::IngestionCoordinator;
use crate::rpc::client::{AsyncRpcClient, ChainRpc};
use crate::runtime::config::IngestConfig;
use crate::runtime::telemetry::Telemetry;
use crate::store::{self, KeyValueStore};
use anyhow::{Context, Result};
use std::sync::Arc;
use tokio::signal;
use tokio_util::sync::CancellationToken;

/// Drives the ingestion coordinator and handles OS signals for graceful shutdowns.
pub struct Runner {
    coordinator: IngestionCoordinator,
    shutdown: CancellationToken,
    started: bool,
}

impl Runner {
    /// Creates a new runner and wires a root [`CancellationToken`] that propagates
    /// through both ingestion modes and the metrics reporter.
    pub fn new(
        config: IngestConfig,
        rpc: Arc<dyn ChainRpc>,
        store: Arc<dyn KeyValueStore>,
    ) -> Self {
        let shutdown = CancellationToken::new();
        let coordinator =
            IngestionCoordinator::with_cancellation_token(config, rpc, store, shutdown.clone());
        Self {
            coordinator,
            shutdown,
            started: false,
        }
    }

    /// Builds the JSON-RPC client and opens the store named in `config`.
    pub async fn connect(config: IngestConfig) -> Result<Self> {
        let rpc = AsyncRpcClient::from_config(&config).context("failed to build RPC client")?;
        let store = store::connect(config.store_url())
            .await
            .with_context(|| format!("failed to open store at {}", config.store_url()))?;
        tracing::info!(
            rpc_url = rpc.endpoint(),
            store_url = config.store_url(),
            "connected ingestion backends"
        );
        Ok(Self::new(config, Arc::new(rpc), store))
    }

    /// Returns a clone of the root shutdown token so external callers can integrate
    /// with their own signal handlers or cancellation strategies.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.shutdown.clone()
    }

    pub fn coordinator(&self) -> &IngestionCoordinator {
        &self.coordinator
    }

    pub fn telemetry(&self) -> Arc<Telemetry> {
        self.coordinator.telemetry()
    }

    pub async fn start(&mut self) -> Result<()> {
        if self.started {
            return Ok(());
        }

        self.coordinator.start().await?;
        self.started = true;
        Ok(())
    }

    /// Cancels the root token and waits for the coordinator to wind down.
    pub async fn stop(&mut self) -> Result<()> {
        if !self.started {
            return Ok(());
        }

        self.shutdown.cancel();
        let result = self.coordinator.stop().await;
        self.started = false;
        self.reinitialize_shutdown_token();
        result
    }

    /// Runs until a Ctrl-C (SIGINT) is received or the shutdown token is cancelled elsewhere.
    pub async fn run_until_ctrl_c(&mut self) -> Result<()> {
        self.start().await?;
        tracing::info!("runner started; waiting for Ctrl-C (SIGINT) to initiate shutdown");

        tokio::select! {
            _ = signal::ctrl_c() => {
                tracing::info!("Ctrl-C received; shutting down runner");
            }
            _ = self.shutdown.cancelled() => {
                tracing::info!("runner shutdown token cancelled");
            }
        }

        self.stop().await
    }

    fn reinitialize_shutdown_token(&mut self) {
        self.shutdown = CancellationToken::new();
        self.coordinator.replace_shutdown_root(self.shutdown.clone());
    }
}
