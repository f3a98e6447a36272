use crate::store::backend::KeyValueStore;
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;
use tokio::sync::broadcast;

const EVENT_CAPACITY: usize = 1024;

/// One observable store mutation, in the order it happened.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StoreOp {
    Set { key: String, value: Vec<u8> },
    Publish { channel: String, message: String },
}

/// In-process store. Keeps an operation log so callers can assert write
/// ordering, and fans published messages out to live subscribers.
#[derive(Debug)]
pub struct MemoryStore {
    entries: Mutex<HashMap<String, Vec<u8>>>,
    operations: Mutex<Vec<StoreOp>>,
    failing_keys: Mutex<HashSet<String>>,
    publishes_failing: AtomicBool,
    events: broadcast::Sender<(String, String)>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl MemoryStore {
    pub fn new() -> Self {
        let (events, _) = broadcast::channel(EVENT_CAPACITY);
        Self {
            entries: Mutex::new(HashMap::new()),
            operations: Mutex::new(Vec::new()),
            failing_keys: Mutex::new(HashSet::new()),
            publishes_failing: AtomicBool::new(false),
            events,
        }
    }

    /// Receives `(channel, message)` pairs published after this call.
    pub fn subscribe(&self) -> broadcast::Receiver<(String, String)> {
        self.events.subscribe()
    }

    pub fn operations(&self) -> Vec<StoreOp> {
        self.operations
            .lock()
            .map(|ops| ops.clone())
            .unwrap_or_default()
    }

    pub fn published(&self) -> Vec<(String, String)> {
        self.operations()
            .into_iter()
            .filter_map(|op| match op {
                StoreOp::Publish { channel, message } => Some((channel, message)),
                StoreOp::Set { .. } => None,
            })
            .collect()
    }

    pub fn keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self
            .entries
            .lock()
            .map(|entries| entries.keys().cloned().collect())
            .unwrap_or_default();
        keys.sort();
        keys
    }

    /// Makes every subsequent write of `key` fail.
    pub fn fail_writes_to(&self, key: impl Into<String>) {
        if let Ok(mut failing) = self.failing_keys.lock() {
            failing.insert(key.into());
        }
    }

    /// Makes every subsequent `publish` fail without reaching subscribers.
    pub fn fail_publishes(&self) {
        self.publishes_failing.store(true, Ordering::SeqCst);
    }

    fn ensure_writable(&self, key: &str) -> Result<()> {
        let failing = self
            .failing_keys
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?
            .contains(key);
        if failing {
            return Err(anyhow!("injected write failure for key {key}"));
        }
        Ok(())
    }

    fn record(&self, op: StoreOp) -> Result<()> {
        self.operations
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?
            .push(op);
        Ok(())
    }

    fn get_now(&self, key: &str) -> Result<Option<Vec<u8>>> {
        let entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        Ok(entries.get(key).cloned())
    }

    fn set_now(&self, key: &str, value: Vec<u8>) -> Result<()> {
        self.ensure_writable(key)?;
        self.entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?
            .insert(key.to_owned(), value.clone());
        self.record(StoreOp::Set {
            key: key.to_owned(),
            value,
        })
    }

    fn set_if_greater_now(&self, key: &str, value: u64) -> Result<u64> {
        self.ensure_writable(key)?;
        let mut entries = self
            .entries
            .lock()
            .map_err(|_| anyhow!("memory store lock poisoned"))?;
        let current = match entries.get(key) {
            Some(raw) => std::str::from_utf8(raw)
                .ok()
                .and_then(|text| text.trim().parse::<u64>().ok())
                .ok_or_else(|| anyhow!("{key} does not hold a decimal number"))?,
            None => 0,
        };
        if value > current {
            let encoded = value.to_string().into_bytes();
            entries.insert(key.to_owned(), encoded.clone());
            self.record(StoreOp::Set {
                key: key.to_owned(),
                value: encoded,
            })?;
        }
        Ok(current)
    }

    fn publish_now(&self, channel: &str, message: String) -> Result<()> {
        if self.publishes_failing.load(Ordering::SeqCst) {
            return Err(anyhow!("injected publish failure on {channel}"));
        }
        self.record(StoreOp::Publish {
            channel: channel.to_owned(),
            message: message.clone(),
        })?;
        // No subscribers is not an error.
        let _ = self.events.send((channel.to_owned(), message));
        Ok(())
    }
}

impl KeyValueStore for MemoryStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
        Box::pin(async move { self.get_now(key) })
    }

    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.set_now(key, value) })
    }

    fn set_if_greater<'a>(&'a self, key: &'a str, value: u64) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move { self.set_if_greater_now(key, value) })
    }

    fn publish<'a>(&'a self, channel: &'a str, message: String) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move { self.publish_now(channel, message) })
    }
}
