//! Typed view over the key-value store: the `latest_block_number` cursor,
//! per-block payloads, and the `new_block` notification channel.

use crate::block::{BlockData, IngestionEvent};
use crate::store::backend::KeyValueStore;
use anyhow::{Context, Result};
use std::sync::Arc;

pub const LATEST_BLOCK_KEY: &str = "latest_block_number";
pub const NEW_BLOCK_CHANNEL: &str = "new_block";

pub fn block_key(number: u64) -> String {
    format!("block:{number}")
}

/// Result of [`CursorStore::advance_to`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CursorAdvance {
    Advanced { previous: u64 },
    Unchanged { current: u64 },
}

#[derive(Clone)]
pub struct CursorStore {
    backend: Arc<dyn KeyValueStore>,
}

impl CursorStore {
    pub fn new(backend: Arc<dyn KeyValueStore>) -> Self {
        Self { backend }
    }

    pub fn backend(&self) -> &Arc<dyn KeyValueStore> {
        &self.backend
    }

    /// Last ingested block number, or 0 when nothing has been ingested.
    pub async fn latest_block_number(&self) -> Result<u64> {
        let Some(raw) = self.backend.get(LATEST_BLOCK_KEY).await? else {
            return Ok(0);
        };
        let text = std::str::from_utf8(&raw)
            .with_context(|| format!("{LATEST_BLOCK_KEY} is not valid UTF-8"))?;
        text.trim()
            .parse::<u64>()
            .with_context(|| format!("{LATEST_BLOCK_KEY} holds a non-numeric value '{text}'"))
    }

    /// Unconditionally overwrites the cursor.
    pub async fn set_latest_block_number(&self, number: u64) -> Result<()> {
        self.backend
            .set(LATEST_BLOCK_KEY, number.to_string().into_bytes())
            .await
    }

    /// Moves the cursor to `number` unless it already reads at least that much.
    ///
    /// The comparison happens inside the store, so concurrent callers can never
    /// move the cursor backwards.
    pub async fn advance_to(&self, number: u64) -> Result<CursorAdvance> {
        let previous = self
            .backend
            .set_if_greater(LATEST_BLOCK_KEY, number)
            .await
            .with_context(|| format!("failed to advance {LATEST_BLOCK_KEY} to {number}"))?;
        if number > previous {
            Ok(CursorAdvance::Advanced { previous })
        } else {
            Ok(CursorAdvance::Unchanged { current: previous })
        }
    }

    pub async fn store_block(&self, number: u64, data: &BlockData) -> Result<()> {
        let bytes = data.to_bytes()?;
        self.backend
            .set(&block_key(number), bytes)
            .await
            .with_context(|| format!("failed to store block {number}"))
    }

    pub async fn block(&self, number: u64) -> Result<Option<BlockData>> {
        match self.backend.get(&block_key(number)).await? {
            Some(bytes) => BlockData::from_slice(&bytes).map(Some),
            None => Ok(None),
        }
    }

    pub async fn publish(&self, event: &IngestionEvent) -> Result<()> {
        self.backend
            .publish(NEW_BLOCK_CHANNEL, event.message())
            .await
    }
}
