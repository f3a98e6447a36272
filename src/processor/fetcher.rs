//! Block number → block hash → block document, as two sequential RPC calls.
//!
//! `BlockFetcher::fetch` never returns an error past its boundary: every call
//! yields a [`FetchOutcome`] carrying the requested number, so callers can
//! reconcile results that complete out of order.

use crate::block::BlockData;
use crate::rpc::client::ChainRpc;
use crate::runtime::telemetry::Telemetry;
use anyhow::{anyhow, Error as AnyError};
use std::fmt;
use std::sync::Arc;

#[derive(Debug)]
pub enum FetchError {
    /// The node has no block at this number yet.
    NotFound,
    /// Transport, timeout or payload failure for a single block.
    Transient(AnyError),
    /// The finalized head could not be resolved.
    Fatal(AnyError),
}

impl FetchError {
    pub fn is_not_found(&self) -> bool {
        matches!(self, FetchError::NotFound)
    }
}

impl fmt::Display for FetchError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FetchError::NotFound => write!(f, "block not found"),
            FetchError::Transient(err) => write!(f, "transient fetch failure: {err:#}"),
            FetchError::Fatal(err) => write!(f, "fatal fetch failure: {err:#}"),
        }
    }
}

impl std::error::Error for FetchError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            FetchError::NotFound => None,
            FetchError::Transient(err) | FetchError::Fatal(err) => Some(err.as_ref()),
        }
    }
}

/// A block number paired with what happened when it was fetched.
#[derive(Debug)]
pub struct FetchOutcome {
    pub number: u64,
    pub result: Result<BlockData, FetchError>,
}

#[derive(Clone)]
pub struct BlockFetcher {
    rpc: Arc<dyn ChainRpc>,
    telemetry: Arc<Telemetry>,
}

impl BlockFetcher {
    pub fn new(rpc: Arc<dyn ChainRpc>, telemetry: Arc<Telemetry>) -> Self {
        Self { rpc, telemetry }
    }

    pub async fn fetch(&self, number: u64) -> FetchOutcome {
        let result = self.try_fetch(number).await;
        match &result {
            Ok(_) => {}
            Err(FetchError::NotFound) => {
                self.telemetry.record_not_found();
                tracing::debug!(block_number = number, "block not produced yet");
            }
            Err(err) => {
                self.telemetry.record_fetch_error();
                tracing::warn!(block_number = number, error = %err, "error fetching block");
            }
        }
        FetchOutcome { number, result }
    }

    async fn try_fetch(&self, number: u64) -> Result<BlockData, FetchError> {
        let hash = self
            .rpc
            .block_hash(number)
            .await
            .map_err(FetchError::Transient)?
            .ok_or(FetchError::NotFound)?;

        let block = self
            .rpc
            .block(&hash)
            .await
            .map_err(FetchError::Transient)?
            .ok_or_else(|| {
                FetchError::Transient(anyhow!("chain_getBlock returned no block for {hash}"))
            })?;

        Ok(BlockData::new(block))
    }

    /// Height of the chain's latest finalized block. No retries: any failure
    /// is reported as [`FetchError::Fatal`].
    pub async fn latest_finalized_height(&self) -> Result<u64, FetchError> {
        let hash = self.rpc.finalized_head().await.map_err(|err| {
            FetchError::Fatal(err.context("failed to resolve finalized head"))
        })?;

        let block = self
            .rpc
            .block(&hash)
            .await
            .map_err(|err| FetchError::Fatal(err.context("failed to fetch finalized block")))?
            .ok_or_else(|| FetchError::Fatal(anyhow!("finalized block {hash} not found")))?;

        BlockData::new(block)
            .header_number()
            .map_err(|err| FetchError::Fatal(err.context("finalized block has no usable height")))
    }
}
