//! RPC client implementation and reusable abstractions for fetching Substrate
//! blocks via JSON-RPC. Houses the `AsyncRpcClient`, error types, and the
//! `ChainRpc` trait consumed by the block fetcher.

use crate::rpc::metrics::{RpcMethod, RpcMetrics, RpcMetricsSnapshot};
use crate::rpc::options::RpcClientOptions;
use crate::runtime::config::IngestConfig;
use anyhow::{anyhow, Result};
use futures::future::BoxFuture;
use jsonrpsee::core::{client::ClientT, client::Error as JsonRpcError, http_helpers::HttpError};
use jsonrpsee::core::params::ArrayParams;
use jsonrpsee::http_client::transport::Error as HttpTransportError;
use jsonrpsee::http_client::{HttpClient, HttpClientBuilder};
use jsonrpsee::rpc_params;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::Arc;
use tokio::time::{timeout, Instant};

pub const GET_BLOCK_HASH: &str = "chain_getBlockHash";
pub const GET_BLOCK: &str = "chain_getBlock";
pub const GET_FINALIZED_HEAD: &str = "chain_getFinalizedHead";

#[derive(Debug)]
pub enum RpcError {
    Timeout {
        method: &'static str,
    },
    ResponseTooLarge {
        method: &'static str,
    },
    /// The node answered with a JSON-RPC error object instead of a result.
    Call {
        method: &'static str,
        code: i32,
        message: String,
    },
}

impl std::fmt::Display for RpcError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            RpcError::Timeout { method } => write!(f, "rpc method {method} timed out"),
            RpcError::ResponseTooLarge { method } => {
                write!(f, "rpc {method} response exceeded HTTP size limits")
            }
            RpcError::Call {
                method,
                code,
                message,
            } => write!(f, "rpc {method} returned error (code={code}, message={message})"),
        }
    }
}

impl std::error::Error for RpcError {}

/// The three chain queries the ingestion pipeline depends on.
pub trait ChainRpc: Send + Sync {
    /// Resolves a block number to its hash. `None` means the node has no
    /// block at that height yet.
    fn block_hash(&self, number: u64) -> BoxFuture<'_, Result<Option<String>>>;

    /// Fetches the full block document for a hash.
    fn block<'a>(&'a self, hash: &'a str) -> BoxFuture<'a, Result<Option<Value>>>;

    /// Returns the hash of the latest finalized block.
    fn finalized_head(&self) -> BoxFuture<'_, Result<String>>;

    /// Call counters for implementations that keep them.
    fn rpc_metrics(&self) -> Option<RpcMetricsSnapshot> {
        None
    }
}

#[derive(Debug, Clone)]
pub struct AsyncRpcClient {
    rpc_url: Arc<String>,
    client: HttpClient,
    options: RpcClientOptions,
    metrics: Arc<RpcMetrics>,
}

impl ChainRpc for AsyncRpcClient {
    /// `chain_getBlockHash`. A null result, or an error object in place of a
    /// result, both mean the block is not available yet.
    fn block_hash(&self, number: u64) -> BoxFuture<'_, Result<Option<String>>> {
        Box::pin(async move {
            let hash = match self
                .request::<Option<String>>(RpcMethod::BlockHash, rpc_params![number])
                .await
            {
                Ok(hash) => hash,
                Err(err) => match err.downcast_ref::<RpcError>() {
                    Some(RpcError::Call { code, message, .. }) => {
                        tracing::debug!(
                            block_number = number,
                            code,
                            message = message.as_str(),
                            "chain_getBlockHash returned no result"
                        );
                        None
                    }
                    _ => return Err(err),
                },
            };
            if hash.is_none() {
                self.metrics.record_empty_result(RpcMethod::BlockHash);
            }
            Ok(hash)
        })
    }

    fn block<'a>(&'a self, hash: &'a str) -> BoxFuture<'a, Result<Option<Value>>> {
        Box::pin(async move {
            let block = self
                .request::<Option<Value>>(RpcMethod::Block, rpc_params![hash])
                .await?;
            if block.is_none() {
                self.metrics.record_empty_result(RpcMethod::Block);
            }
            Ok(block)
        })
    }

    fn finalized_head(&self) -> BoxFuture<'_, Result<String>> {
        Box::pin(self.request::<String>(RpcMethod::FinalizedHead, rpc_params![]))
    }

    fn rpc_metrics(&self) -> Option<RpcMetricsSnapshot> {
        Some(self.metrics.snapshot())
    }
}

impl AsyncRpcClient {
    pub fn new(url: impl Into<String>) -> Result<Self> {
        Self::with_options(url, RpcClientOptions::default())
    }

    pub fn with_options(url: impl Into<String>, options: RpcClientOptions) -> Result<Self> {
        options.validate()?;

        let rpc_url = url.into();
        let max_request_body_size = options.max_request_body_bytes.min(u32::MAX as usize) as u32;
        let max_response_body_size = options.max_response_body_bytes.min(u32::MAX as usize) as u32;

        let client = HttpClientBuilder::default()
            .request_timeout(options.request_timeout)
            .max_concurrent_requests(options.max_concurrent_requests)
            .max_request_size(max_request_body_size)
            .max_response_size(max_response_body_size)
            .build(&rpc_url)
            .map_err(|err| anyhow!("failed to build RPC client: {err}"))?;

        Ok(Self {
            rpc_url: Arc::new(rpc_url),
            client,
            options,
            metrics: Arc::new(RpcMetrics::default()),
        })
    }

    pub fn from_config(config: &IngestConfig) -> Result<Self> {
        config.validate()?;
        let options = RpcClientOptions {
            max_concurrent_requests: std::cmp::max(32, config.max_workers().saturating_mul(4)),
            request_timeout: config.rpc_timeout(),
            max_response_body_bytes: config.rpc_max_response_body_bytes(),
            ..RpcClientOptions::default()
        };
        Self::with_options(config.rpc_url().to_owned(), options)
    }

    pub fn endpoint(&self) -> &str {
        &self.rpc_url
    }

    async fn request<R>(&self, rpc_method: RpcMethod, params: ArrayParams) -> Result<R>
    where
        R: DeserializeOwned,
    {
        let method = rpc_method.name();
        let start = Instant::now();
        let outcome = timeout(
            self.options.request_timeout,
            self.client.request::<R, _>(method, params),
        )
        .await;

        match outcome {
            Ok(Ok(value)) => {
                self.metrics.record_success(rpc_method, start.elapsed());
                tracing::trace!(method, "rpc call completed");
                Ok(value)
            }
            Ok(Err(err)) => {
                self.metrics.record_failure(rpc_method, start.elapsed());
                Err(map_rpc_error(method, err))
            }
            Err(_) => {
                self.metrics.record_timeout(rpc_method, start.elapsed());
                Err(RpcError::Timeout { method }.into())
            }
        }
    }
}

fn map_rpc_error(label: &'static str, err: JsonRpcError) -> anyhow::Error {
    if response_too_large(&err) {
        return RpcError::ResponseTooLarge { method: label }.into();
    }
    match err {
        JsonRpcError::Call(object) => RpcError::Call {
            method: label,
            code: object.code(),
            message: object.message().to_owned(),
        }
        .into(),
        JsonRpcError::RequestTimeout => RpcError::Timeout { method: label }.into(),
        other => anyhow!("rpc {label} call failed: {other}"),
    }
}

fn response_too_large(err: &JsonRpcError) -> bool {
    match err {
        JsonRpcError::Transport(inner) => {
            if let Some(transport_err) = inner.downcast_ref::<HttpTransportError>() {
                match transport_err {
                    HttpTransportError::Http(http_err) => matches!(http_err, HttpError::TooLarge),
                    HttpTransportError::RequestTooLarge => true,
                    _ => false,
                }
            } else {
                false
            }
        }
        _ => false,
    }
}
