//! Per-method counters for the three chain queries. Latency, failures and
//! empty answers are tracked separately for `chain_getBlockHash`,
//! `chain_getBlock` and `chain_getFinalizedHead`, and folded into totals
//! when a snapshot is taken.

use crate::rpc::client::{GET_BLOCK, GET_BLOCK_HASH, GET_FINALIZED_HEAD};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// The JSON-RPC methods the ingestor issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RpcMethod {
    BlockHash,
    Block,
    FinalizedHead,
}

impl RpcMethod {
    pub const ALL: [RpcMethod; 3] = [
        RpcMethod::BlockHash,
        RpcMethod::Block,
        RpcMethod::FinalizedHead,
    ];

    pub fn name(self) -> &'static str {
        match self {
            RpcMethod::BlockHash => GET_BLOCK_HASH,
            RpcMethod::Block => GET_BLOCK,
            RpcMethod::FinalizedHead => GET_FINALIZED_HEAD,
        }
    }

    fn index(self) -> usize {
        self as usize
    }
}

#[derive(Debug, Default)]
struct MethodCounters {
    requests: AtomicU64,
    errors: AtomicU64,
    timeouts: AtomicU64,
    empty_results: AtomicU64,
    latency_ns: AtomicU64,
}

impl MethodCounters {
    fn record_call(&self, latency: Duration) {
        self.requests.fetch_add(1, Ordering::Relaxed);
        self.latency_ns
            .fetch_add(latency.as_nanos() as u64, Ordering::Relaxed);
    }

    fn snapshot(&self, method: RpcMethod) -> MethodSnapshot {
        MethodSnapshot {
            method,
            requests: self.requests.load(Ordering::Relaxed),
            errors: self.errors.load(Ordering::Relaxed),
            timeouts: self.timeouts.load(Ordering::Relaxed),
            empty_results: self.empty_results.load(Ordering::Relaxed),
            latency_ns: self.latency_ns.load(Ordering::Relaxed),
        }
    }
}

#[derive(Debug, Default)]
pub(crate) struct RpcMetrics {
    methods: [MethodCounters; 3],
}

impl RpcMetrics {
    fn counters(&self, method: RpcMethod) -> &MethodCounters {
        &self.methods[method.index()]
    }

    pub(crate) fn record_success(&self, method: RpcMethod, latency: Duration) {
        self.counters(method).record_call(latency);
    }

    pub(crate) fn record_failure(&self, method: RpcMethod, latency: Duration) {
        let counters = self.counters(method);
        counters.record_call(latency);
        counters.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn record_timeout(&self, method: RpcMethod, latency: Duration) {
        self.record_failure(method, latency);
        self.counters(method)
            .timeouts
            .fetch_add(1, Ordering::Relaxed);
    }

    /// A successful call whose result was null: no hash yet for a height, or
    /// no block for a hash.
    pub(crate) fn record_empty_result(&self, method: RpcMethod) {
        self.counters(method)
            .empty_results
            .fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self) -> RpcMetricsSnapshot {
        let methods = RpcMethod::ALL.map(|method| self.counters(method).snapshot(method));

        let total_requests = methods.iter().map(|m| m.requests).sum::<u64>();
        let total_errors = methods.iter().map(|m| m.errors).sum::<u64>();
        let total_latency_ns = methods.iter().map(|m| m.latency_ns).sum::<u64>();

        RpcMetricsSnapshot {
            total_requests,
            total_errors,
            total_timeouts: methods.iter().map(|m| m.timeouts).sum(),
            average_latency_ms: average_ms(total_latency_ns, total_requests),
            error_rate: ratio(total_errors, total_requests),
            methods,
        }
    }
}

fn ratio(part: u64, whole: u64) -> f64 {
    if whole == 0 {
        0.0
    } else {
        part as f64 / whole as f64
    }
}

fn average_ms(total_ns: u64, count: u64) -> f64 {
    ratio(total_ns, count) / 1_000_000.0
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct MethodSnapshot {
    pub method: RpcMethod,
    pub requests: u64,
    pub errors: u64,
    pub timeouts: u64,
    pub empty_results: u64,
    latency_ns: u64,
}

impl MethodSnapshot {
    pub fn average_latency_ms(&self) -> f64 {
        average_ms(self.latency_ns, self.requests)
    }
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub struct RpcMetricsSnapshot {
    pub total_requests: u64,
    pub total_errors: u64,
    pub total_timeouts: u64,
    pub average_latency_ms: f64,
    pub error_rate: f64,
    pub methods: [MethodSnapshot; 3],
}

impl RpcMetricsSnapshot {
    pub fn method(&self, method: RpcMethod) -> &MethodSnapshot {
        &self.methods[method.index()]
    }
}
