pub mod block;
pub mod processor;
pub mod rpc;
pub mod runtime;
pub mod store;

pub use block::{BlockData, IngestionEvent};
pub use processor::backfill::{plan_windows, BackfillReport};
pub use processor::commit::{BlockCommitter, Committed};
pub use processor::coordinator::IngestionCoordinator;
pub use processor::fetcher::{BlockFetcher, FetchError, FetchOutcome};
pub use processor::realtime::PollOutcome;
pub use rpc::{AsyncRpcClient, ChainRpc, RpcError, RpcMethod, RpcMetricsSnapshot};
pub use runtime::config::{IngestConfig, IngestConfigBuilder, IngestConfigParams};
pub use runtime::runner::Runner;
pub use runtime::telemetry::{init_tracing, Telemetry, TelemetrySnapshot};
pub use store::{CursorStore, KeyValueStore, MemoryStore, RedisStore};
