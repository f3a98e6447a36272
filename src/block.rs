//! Block payload and notification types shared by the fetcher, the store and
//! the coordinator.

use crate::rpc::helpers::header_number;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt;

/// Full `chain_getBlock` result for one block.
///
/// The document is stored and republished as-is; only the header number is
/// ever read back out of it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BlockData(Value);

impl BlockData {
    pub fn new(value: Value) -> Self {
        Self(value)
    }

    pub fn as_value(&self) -> &Value {
        &self.0
    }

    pub fn into_value(self) -> Value {
        self.0
    }

    /// Height declared in `block.header.number`.
    pub fn header_number(&self) -> Result<u64> {
        header_number(&self.0)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        serde_json::to_vec(&self.0).context("failed to serialize block data")
    }

    pub fn from_slice(bytes: &[u8]) -> Result<Self> {
        serde_json::from_slice(bytes)
            .map(Self)
            .context("failed to deserialize block data")
    }
}

/// Published after a block has been written to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IngestionEvent {
    block_number: u64,
}

impl IngestionEvent {
    pub fn new(block_number: u64) -> Self {
        Self { block_number }
    }

    pub fn block_number(&self) -> u64 {
        self.block_number
    }

    /// Wire payload sent on the notification channel.
    pub fn message(&self) -> String {
        self.to_string()
    }
}

impl fmt::Display for IngestionEvent {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Block Number: {}", self.block_number)
    }
}
