//! JSON-RPC client plumbing: the Substrate chain queries, metrics, options,
//! and payload helpers.

pub mod client;
pub mod helpers;
pub mod metrics;
pub mod options;

pub use client::{AsyncRpcClient, ChainRpc, RpcError};
pub use helpers::{header_number, parse_hex_number};
pub use metrics::{MethodSnapshot, RpcMethod, RpcMetricsSnapshot};
pub use options::RpcClientOptions;
