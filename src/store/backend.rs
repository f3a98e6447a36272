//! Narrow key-value/event surface the ingestion pipeline writes through, plus
//! the URL-based backend selection used at startup.

use crate::store::memory::MemoryStore;
use crate::store::redis::RedisStore;
use anyhow::{bail, Result};
use futures::future::BoxFuture;
use std::sync::Arc;

pub const MEMORY_SCHEME: &str = "memory://";

/// Get/set/publish primitives. The only atomic read-modify-write is
/// [`KeyValueStore::set_if_greater`].
pub trait KeyValueStore: Send + Sync {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>>;

    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>) -> BoxFuture<'a, Result<()>>;

    /// Atomically writes `value` as decimal text if it exceeds the number
    /// currently stored under `key` (absent reads as 0). Returns the number
    /// that was stored before the call.
    fn set_if_greater<'a>(&'a self, key: &'a str, value: u64) -> BoxFuture<'a, Result<u64>>;

    /// Fire-and-forget notification; nothing is persisted.
    fn publish<'a>(&'a self, channel: &'a str, message: String) -> BoxFuture<'a, Result<()>>;
}

/// Opens the backend named by `url`.
///
/// `memory://` yields a fresh in-process store, `redis://` and `rediss://`
/// connect to Redis.
pub async fn connect(url: &str) -> Result<Arc<dyn KeyValueStore>> {
    let url = url.trim();
    if url.starts_with(MEMORY_SCHEME) {
        tracing::warn!("using in-memory store; ingested blocks will not survive a restart");
        return Ok(Arc::new(MemoryStore::new()));
    }
    if url.starts_with("redis://") || url.starts_with("rediss://") {
        return Ok(Arc::new(RedisStore::connect(url).await?));
    }
    bail!("unsupported store url '{url}'");
}
