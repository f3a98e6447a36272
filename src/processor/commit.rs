//! The per-block commit protocol shared by both ingestion modes:
//! store the block, publish the notification, then advance the cursor.

use crate::block::{BlockData, IngestionEvent};
use crate::runtime::telemetry::Telemetry;
use crate::store::cursor::{CursorAdvance, CursorStore};
use anyhow::Result;
use std::sync::Arc;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Committed {
    pub number: u64,
    pub cursor: CursorAdvance,
}

#[derive(Clone)]
pub struct BlockCommitter {
    cursor: CursorStore,
    telemetry: Arc<Telemetry>,
}

impl BlockCommitter {
    pub fn new(cursor: CursorStore, telemetry: Arc<Telemetry>) -> Self {
        Self { cursor, telemetry }
    }

    /// Runs the commit protocol for one block.
    ///
    /// The cursor is only touched after the block write succeeded. A failed
    /// publish is logged and does not stop the cursor from advancing.
    pub async fn commit(&self, number: u64, data: &BlockData) -> Result<Committed> {
        if let Err(err) = self.cursor.store_block(number, data).await {
            self.telemetry.record_store_error();
            return Err(err);
        }

        let event = IngestionEvent::new(number);
        if let Err(err) = self.cursor.publish(&event).await {
            self.telemetry.record_publish_error();
            tracing::warn!(block_number = number, error = %err, "failed to publish ingestion event");
        }

        let cursor = match self.cursor.advance_to(number).await {
            Ok(advance) => advance,
            Err(err) => {
                self.telemetry.record_store_error();
                return Err(err.context(format!("block {number} stored but cursor not advanced")));
            }
        };

        self.telemetry.record_ingested_block();
        tracing::info!(block_number = number, "ingested block");
        Ok(Committed { number, cursor })
    }
}
