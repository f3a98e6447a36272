//! In-process `ChainRpc` double used by the processor unit tests.

use crate::rpc::client::ChainRpc;
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use serde_json::{json, Value};
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub(crate) fn hash_for(number: u64) -> String {
    format!("0x{number:064x}")
}

pub(crate) fn block_json(number: u64) -> Value {
    json!({
        "block": {
            "header": {
                "number": format!("0x{number:x}"),
                "parentHash": hash_for(number.saturating_sub(1)),
            },
            "extrinsics": [],
        },
        "justifications": null,
    })
}

/// Blocks `0..length` exist; numbers above the tip answer with a null hash.
pub(crate) struct FakeChain {
    tip: AtomicU64,
    finalized: AtomicU64,
    failing: Mutex<HashSet<u64>>,
    bodiless: Mutex<HashSet<u64>>,
    headers: Mutex<HashMap<u64, Value>>,
    finalized_broken: AtomicBool,
    delay: Mutex<Duration>,
    requested: Mutex<Vec<u64>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeChain {
    pub(crate) fn new(length: u64) -> Self {
        let tip = length.saturating_sub(1);
        Self {
            tip: AtomicU64::new(tip),
            finalized: AtomicU64::new(tip),
            failing: Mutex::new(HashSet::new()),
            bodiless: Mutex::new(HashSet::new()),
            headers: Mutex::new(HashMap::new()),
            finalized_broken: AtomicBool::new(false),
            delay: Mutex::new(Duration::ZERO),
            requested: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub(crate) fn set_finalized(&self, number: u64) {
        self.finalized.store(number, Ordering::SeqCst);
    }

    pub(crate) fn extend_to(&self, tip: u64) {
        self.tip.store(tip, Ordering::SeqCst);
    }

    pub(crate) fn fail_block(&self, number: u64) {
        self.failing.lock().unwrap().insert(number);
    }

    pub(crate) fn drop_body(&self, number: u64) {
        self.bodiless.lock().unwrap().insert(number);
    }

    /// Serves `number` with `block.header.number` replaced by `raw`, or
    /// without the field when `raw` is null.
    pub(crate) fn corrupt_header_number(&self, number: u64, raw: Value) {
        self.headers.lock().unwrap().insert(number, raw);
    }

    pub(crate) fn fail_finalized_head(&self) {
        self.finalized_broken.store(true, Ordering::SeqCst);
    }

    pub(crate) fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    /// Block numbers passed to `block_hash`, in call order.
    pub(crate) fn requested(&self) -> Vec<u64> {
        self.requested.lock().unwrap().clone()
    }

    pub(crate) fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn enter(&self) {
        let current = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(current, Ordering::SeqCst);
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
    }

    fn leave(&self) {
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl ChainRpc for FakeChain {
    fn block_hash(&self, number: u64) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move {
            self.requested.lock().unwrap().push(number);
            self.enter().await;
            let available = number <= self.tip.load(Ordering::SeqCst);
            self.leave();
            Ok(available.then(|| hash_for(number)))
        })
    }

    fn block<'a>(&'a self, hash: &'a str) -> BoxFuture<'a, Result<Option<Value>>> {
        Box::pin(async move {
            self.enter().await;
            self.leave();
            let number = u64::from_str_radix(hash.trim_start_matches("0x"), 16)
                .map_err(|err| anyhow!("bad hash {hash}: {err}"))?;
            if self.failing.lock().unwrap().contains(&number) {
                return Err(anyhow!("connection reset while fetching block {number}"));
            }
            if self.bodiless.lock().unwrap().contains(&number) {
                return Ok(None);
            }
            let mut block = block_json(number);
            if let Some(raw) = self.headers.lock().unwrap().get(&number) {
                let header = &mut block["block"]["header"];
                match (raw, header.as_object_mut()) {
                    (Value::Null, Some(fields)) => {
                        fields.remove("number");
                    }
                    (raw, _) => header["number"] = raw.clone(),
                }
            }
            Ok(Some(block))
        })
    }

    fn finalized_head(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(async move {
            if self.finalized_broken.load(Ordering::SeqCst) {
                return Err(anyhow!("connection refused"));
            }
            Ok(hash_for(self.finalized.load(Ordering::SeqCst)))
        })
    }
}
