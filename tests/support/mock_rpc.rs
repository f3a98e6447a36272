use std::{
    collections::HashSet,
    convert::Infallible,
    sync::{
        atomic::{AtomicBool, AtomicU64, Ordering},
        Arc, RwLock,
    },
};

use anyhow::{Context, Result};
use hyper::service::{make_service_fn, service_fn};
use hyper::{body, Body, Method, Request, Response, Server, StatusCode};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;

/// Substrate-shaped chain served over JSON-RPC. Blocks `0..=tip` exist; the
/// finalized head trails the tip until moved explicitly.
#[derive(Clone)]
pub struct MockChain {
    tip: Arc<AtomicU64>,
    finalized: Arc<AtomicU64>,
    finalized_unavailable: Arc<AtomicBool>,
    failing_blocks: Arc<RwLock<HashSet<u64>>>,
    hash_requests: Arc<RwLock<Vec<u64>>>,
}

impl MockChain {
    pub fn new(length: u64) -> Self {
        let tip = length.saturating_sub(1);
        Self {
            tip: Arc::new(AtomicU64::new(tip)),
            finalized: Arc::new(AtomicU64::new(tip)),
            finalized_unavailable: Arc::new(AtomicBool::new(false)),
            failing_blocks: Arc::new(RwLock::new(HashSet::new())),
            hash_requests: Arc::new(RwLock::new(Vec::new())),
        }
    }

    pub fn tip(&self) -> u64 {
        self.tip.load(Ordering::SeqCst)
    }

    pub fn set_tip(&self, tip: u64) {
        self.tip.store(tip, Ordering::SeqCst);
    }

    pub fn set_finalized(&self, height: u64) {
        self.finalized.store(height, Ordering::SeqCst);
    }

    pub fn set_finalized_unavailable(&self, unavailable: bool) {
        self.finalized_unavailable
            .store(unavailable, Ordering::SeqCst);
    }

    /// `chain_getBlock` for this height answers with HTTP 500.
    pub fn fail_block(&self, height: u64) {
        self.failing_blocks
            .write()
            .expect("mock chain poisoned")
            .insert(height);
    }

    pub fn heal_block(&self, height: u64) {
        self.failing_blocks
            .write()
            .expect("mock chain poisoned")
            .remove(&height);
    }

    /// Heights passed to `chain_getBlockHash`, in arrival order.
    pub fn hash_requests(&self) -> Vec<u64> {
        self.hash_requests
            .read()
            .expect("mock chain poisoned")
            .clone()
    }

    fn hash_for_height(&self, height: u64) -> Option<String> {
        self.hash_requests
            .write()
            .expect("mock chain poisoned")
            .push(height);
        (height <= self.tip()).then(|| block_hash(height))
    }

    fn block_failing(&self, height: u64) -> bool {
        self.failing_blocks
            .read()
            .expect("mock chain poisoned")
            .contains(&height)
    }
}

pub fn block_hash(height: u64) -> String {
    format!("0x{height:064x}")
}

pub fn block_document(height: u64) -> Value {
    json!({
        "block": {
            "header": {
                "parentHash": block_hash(height.saturating_sub(1)),
                "number": format!("0x{height:x}"),
                "stateRoot": format!("0x{:064x}", height.wrapping_mul(31)),
                "extrinsicsRoot": format!("0x{:064x}", height.wrapping_mul(17)),
                "digest": { "logs": [] },
            },
            "extrinsics": [format!("0x0402000b{height:016x}")],
        },
        "justifications": null,
    })
}

fn height_from_hash(hash: &str) -> Option<u64> {
    u64::from_str_radix(hash.trim_start_matches("0x"), 16).ok()
}

pub struct MockRpcServer {
    url: String,
    shutdown: Option<oneshot::Sender<()>>,
    handle: Option<JoinHandle<()>>,
}

impl MockRpcServer {
    pub async fn start(chain: MockChain) -> Result<Self> {
        let listener = TcpListener::bind("127.0.0.1:0")
            .await
            .context("failed to bind mock RPC listener")?;
        let addr = listener
            .local_addr()
            .context("failed to read mock listener address")?;
        let std_listener = listener
            .into_std()
            .context("failed to convert mock listener")?;
        std_listener
            .set_nonblocking(true)
            .context("failed to set mock listener non-blocking")?;

        let (shutdown_tx, shutdown_rx) = oneshot::channel();

        let make_service = make_service_fn(move |_| {
            let chain = chain.clone();
            async move { Ok::<_, Infallible>(service_fn(move |req| serve_request(chain.clone(), req))) }
        });

        let server = Server::from_tcp(std_listener)
            .context("failed to build mock HTTP server")?
            .serve(make_service);
        let graceful = server.with_graceful_shutdown(async {
            let _ = shutdown_rx.await;
        });

        let handle = tokio::spawn(async move {
            if let Err(err) = graceful.await {
                eprintln!("mock RPC server stopped: {err}");
            }
        });

        Ok(Self {
            url: format!("http://{}", addr),
            shutdown: Some(shutdown_tx),
            handle: Some(handle),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    pub async fn shutdown(mut self) {
        if let Some(tx) = self.shutdown.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.await;
        }
    }
}

async fn serve_request(chain: MockChain, req: Request<Body>) -> Result<Response<Body>, Infallible> {
    if req.method() != Method::POST {
        return Ok(status(StatusCode::METHOD_NOT_ALLOWED, "Unsupported method"));
    }

    let bytes = match body::to_bytes(req.into_body()).await {
        Ok(bytes) => bytes,
        Err(err) => {
            return Ok(status(
                StatusCode::BAD_REQUEST,
                format!("failed to read body: {err}"),
            ))
        }
    };

    let payload: Value = match serde_json::from_slice(&bytes) {
        Ok(value) => value,
        Err(err) => {
            return Ok(status(
                StatusCode::BAD_REQUEST,
                format!("invalid JSON payload: {err}"),
            ))
        }
    };

    let response_value = match handle_call(&chain, payload) {
        Some(value) => value,
        None => return Ok(status(StatusCode::INTERNAL_SERVER_ERROR, "node overloaded")),
    };

    let mut response = Response::new(Body::from(response_value.to_string()));
    response.headers_mut().insert(
        hyper::header::CONTENT_TYPE,
        hyper::header::HeaderValue::from_static("application/json"),
    );
    Ok(response)
}

fn status(code: StatusCode, message: impl Into<String>) -> Response<Body> {
    let mut response = Response::new(Body::from(message.into()));
    *response.status_mut() = code;
    response
}

/// `None` means the request should fail at the HTTP layer.
fn handle_call(chain: &MockChain, call: Value) -> Option<Value> {
    let id = call.get("id").cloned().unwrap_or(Value::Null);
    let method = call
        .get("method")
        .and_then(Value::as_str)
        .unwrap_or_default()
        .to_string();
    let first_param = call
        .get("params")
        .and_then(Value::as_array)
        .and_then(|params| params.first())
        .cloned();

    let response = match method.as_str() {
        "chain_getBlockHash" => match first_param.as_ref().and_then(Value::as_u64) {
            Some(height) => success(id, json!(chain.hash_for_height(height))),
            None => error(id, -32602, "invalid block number"),
        },
        "chain_getBlock" => {
            let height = first_param
                .as_ref()
                .and_then(Value::as_str)
                .and_then(height_from_hash);
            match height {
                Some(height) if chain.block_failing(height) => return None,
                Some(height) if height <= chain.tip() => success(id, block_document(height)),
                _ => success(id, Value::Null),
            }
        }
        "chain_getFinalizedHead" => {
            if chain.finalized_unavailable.load(Ordering::SeqCst) {
                error(id, -32000, "finality gadget unavailable")
            } else {
                success(id, json!(block_hash(chain.finalized.load(Ordering::SeqCst))))
            }
        }
        _ => error(id, -32601, format!("unknown method {method}")),
    };
    Some(response)
}

fn success(id: Value, result: Value) -> Value {
    json!({
        "jsonrpc": "2.0",
        "result": result,
        "id": id,
    })
}

fn error(id: Value, code: i64, message: impl Into<String>) -> Value {
    json!({
        "jsonrpc": "2.0",
        "error": {
            "code": code,
            "message": message.into(),
        },
        "id": id,
    })
}
