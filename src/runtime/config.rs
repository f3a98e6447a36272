use crate::rpc::options::DEFAULT_HTTP_BODY_LIMIT_BYTES;
use crate::runtime::telemetry;
use anyhow::{bail, Context, Result};
use std::str::FromStr;
use std::time::Duration;

pub const DEFAULT_STORE_URL: &str = "redis://127.0.0.1:6379/";
pub const DEFAULT_BATCH_SIZE: usize = 100;
pub const DEFAULT_MAX_WORKERS: usize = 10;
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
const DEFAULT_RPC_TIMEOUT_SECS: u64 = 10;
const BYTES_PER_MEGABYTE: usize = 1024 * 1024;

/// Runtime configuration for the ingestion pipeline.
///
/// All instances must be constructed via [`IngestConfig::builder`],
/// [`IngestConfig::new`] or [`IngestConfig::from_env`] so invariants are
/// validated before any consumer observes the values.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IngestConfig {
    rpc_url: String,
    store_url: String,
    batch_size: usize,
    max_workers: usize,
    poll_interval: Duration,
    rpc_timeout: Duration,
    metrics_interval: Duration,
    rpc_max_response_body_bytes: usize,
    historical_enabled: bool,
    realtime_enabled: bool,
}

pub struct IngestConfigParams {
    pub rpc_url: String,
    pub store_url: String,
    pub batch_size: usize,
    pub max_workers: usize,
    pub poll_interval: Duration,
    pub rpc_timeout: Duration,
    pub metrics_interval: Duration,
    pub rpc_max_response_body_bytes: usize,
    pub historical_enabled: bool,
    pub realtime_enabled: bool,
}

impl IngestConfig {
    /// Returns a builder to incrementally construct and validate a configuration.
    pub fn builder() -> IngestConfigBuilder {
        IngestConfigBuilder::default()
    }

    /// Constructs a configuration directly from the provided values.
    pub fn new(params: IngestConfigParams) -> Result<Self> {
        let IngestConfigParams {
            rpc_url,
            store_url,
            batch_size,
            max_workers,
            poll_interval,
            rpc_timeout,
            metrics_interval,
            rpc_max_response_body_bytes,
            historical_enabled,
            realtime_enabled,
        } = params;

        let config = Self {
            rpc_url: trimmed_string(rpc_url),
            store_url: trimmed_string(store_url),
            batch_size,
            max_workers,
            poll_interval,
            rpc_timeout,
            metrics_interval,
            rpc_max_response_body_bytes,
            historical_enabled,
            realtime_enabled,
        };

        config.validate()?;
        Ok(config)
    }

    /// Reads the `INGEST_*` environment variables. Only `INGEST_RPC_URL` is
    /// required.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`IngestConfig::from_env`] with a caller-supplied variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let read = |key: &str| lookup(key).filter(|value| !value.trim().is_empty());

        let mut builder = Self::builder();
        if let Some(url) = read("INGEST_RPC_URL") {
            builder = builder.rpc_url(url);
        }
        if let Some(url) = read("INGEST_STORE_URL") {
            builder = builder.store_url(url);
        }
        if let Some(size) = parse_var::<usize>(&read, "INGEST_BATCH_SIZE")? {
            builder = builder.batch_size(size);
        }
        if let Some(workers) = parse_var::<usize>(&read, "INGEST_MAX_WORKERS")? {
            builder = builder.max_workers(workers);
        }
        if let Some(millis) = parse_var::<u64>(&read, "INGEST_POLL_INTERVAL_MS")? {
            builder = builder.poll_interval(Duration::from_millis(millis));
        }
        if let Some(secs) = parse_var::<u64>(&read, "INGEST_RPC_TIMEOUT_SECS")? {
            builder = builder.rpc_timeout(Duration::from_secs(secs));
        }
        if let Some(secs) = parse_var::<u64>(&read, "INGEST_METRICS_INTERVAL_SECS")? {
            builder = builder.metrics_interval(Duration::from_secs(secs));
        }
        if let Some(megabytes) = parse_var::<usize>(&read, "INGEST_MAX_RESPONSE_MB")? {
            builder =
                builder.rpc_max_response_body_bytes(megabytes.saturating_mul(BYTES_PER_MEGABYTE));
        }
        if let Some(enabled) = read("INGEST_HISTORICAL") {
            builder = builder.historical_enabled(parse_flag("INGEST_HISTORICAL", &enabled)?);
        }
        if let Some(enabled) = read("INGEST_REALTIME") {
            builder = builder.realtime_enabled(parse_flag("INGEST_REALTIME", &enabled)?);
        }

        builder.build()
    }

    /// JSON-RPC endpoint of the node.
    pub fn rpc_url(&self) -> &str {
        &self.rpc_url
    }

    /// Backend location (`redis://`, `rediss://` or `memory://`).
    pub fn store_url(&self) -> &str {
        &self.store_url
    }

    /// Width of one historical backfill window.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    /// Maximum simultaneous fetches inside a backfill window.
    pub fn max_workers(&self) -> usize {
        self.max_workers
    }

    /// Delay between real-time polling iterations.
    pub fn poll_interval(&self) -> Duration {
        self.poll_interval
    }

    /// Per-RPC timeout applied to the JSON-RPC client.
    pub fn rpc_timeout(&self) -> Duration {
        self.rpc_timeout
    }

    /// Interval used by the telemetry reporter.
    pub fn metrics_interval(&self) -> Duration {
        self.metrics_interval
    }

    /// Maximum allowed HTTP response body bytes for RPC calls.
    pub fn rpc_max_response_body_bytes(&self) -> usize {
        self.rpc_max_response_body_bytes
    }

    pub fn historical_enabled(&self) -> bool {
        self.historical_enabled
    }

    pub fn realtime_enabled(&self) -> bool {
        self.realtime_enabled
    }

    /// Performs validation on an existing configuration instance.
    pub fn validate(&self) -> Result<()> {
        validate_rpc_url(&self.rpc_url)?;
        validate_store_url(&self.store_url)?;

        if self.batch_size == 0 {
            bail!("batch_size must be greater than 0");
        }

        if self.max_workers == 0 {
            bail!("max_workers must be greater than 0");
        }

        if self.poll_interval.is_zero() {
            bail!("poll_interval must be greater than 0");
        }

        if self.rpc_timeout.is_zero() {
            bail!("rpc_timeout must be greater than 0");
        }

        if self.metrics_interval.is_zero() {
            bail!("metrics_interval must be greater than 0");
        }

        if self.rpc_max_response_body_bytes == 0 {
            bail!("rpc_max_response_body_bytes must be greater than 0");
        }

        if !self.historical_enabled && !self.realtime_enabled {
            bail!("at least one of historical_enabled or realtime_enabled must be set");
        }

        Ok(())
    }
}

#[derive(Debug, Default, Clone)]
pub struct IngestConfigBuilder {
    rpc_url: Option<String>,
    store_url: Option<String>,
    batch_size: Option<usize>,
    max_workers: Option<usize>,
    poll_interval: Option<Duration>,
    rpc_timeout: Option<Duration>,
    metrics_interval: Option<Duration>,
    rpc_max_response_body_bytes: Option<usize>,
    historical_enabled: Option<bool>,
    realtime_enabled: Option<bool>,
}

impl IngestConfigBuilder {
    pub fn rpc_url(mut self, url: impl Into<String>) -> Self {
        self.rpc_url = Some(url.into());
        self
    }

    pub fn store_url(mut self, url: impl Into<String>) -> Self {
        self.store_url = Some(url.into());
        self
    }

    pub fn batch_size(mut self, size: usize) -> Self {
        self.batch_size = Some(size);
        self
    }

    pub fn max_workers(mut self, workers: usize) -> Self {
        self.max_workers = Some(workers);
        self
    }

    pub fn poll_interval(mut self, interval: Duration) -> Self {
        self.poll_interval = Some(interval);
        self
    }

    pub fn rpc_timeout(mut self, timeout: Duration) -> Self {
        self.rpc_timeout = Some(timeout);
        self
    }

    pub fn metrics_interval(mut self, interval: Duration) -> Self {
        self.metrics_interval = Some(interval);
        self
    }

    pub fn rpc_max_response_body_bytes(mut self, bytes: usize) -> Self {
        self.rpc_max_response_body_bytes = Some(bytes);
        self
    }

    pub fn historical_enabled(mut self, enabled: bool) -> Self {
        self.historical_enabled = Some(enabled);
        self
    }

    pub fn realtime_enabled(mut self, enabled: bool) -> Self {
        self.realtime_enabled = Some(enabled);
        self
    }

    pub fn build(self) -> Result<IngestConfig> {
        let params = IngestConfigParams {
            rpc_url: self.rpc_url.context("rpc_url is required")?,
            store_url: self
                .store_url
                .unwrap_or_else(|| DEFAULT_STORE_URL.to_owned()),
            batch_size: self.batch_size.unwrap_or(DEFAULT_BATCH_SIZE),
            max_workers: self.max_workers.unwrap_or(DEFAULT_MAX_WORKERS),
            poll_interval: self.poll_interval.unwrap_or(DEFAULT_POLL_INTERVAL),
            rpc_timeout: self
                .rpc_timeout
                .unwrap_or_else(|| Duration::from_secs(DEFAULT_RPC_TIMEOUT_SECS)),
            metrics_interval: self
                .metrics_interval
                .unwrap_or(telemetry::DEFAULT_METRICS_INTERVAL),
            rpc_max_response_body_bytes: self
                .rpc_max_response_body_bytes
                .unwrap_or(DEFAULT_HTTP_BODY_LIMIT_BYTES),
            historical_enabled: self.historical_enabled.unwrap_or(true),
            realtime_enabled: self.realtime_enabled.unwrap_or(true),
        };

        IngestConfig::new(params)
    }
}

fn trimmed_string(value: String) -> String {
    value.trim().to_owned()
}

fn validate_rpc_url(url: &str) -> Result<()> {
    if !(url.starts_with("http://") || url.starts_with("https://")) {
        bail!("rpc_url must start with http:// or https://");
    }
    Ok(())
}

fn validate_store_url(url: &str) -> Result<()> {
    let supported = ["redis://", "rediss://", "memory://"];
    if !supported.iter().any(|scheme| url.starts_with(scheme)) {
        bail!("store_url must start with redis://, rediss:// or memory://");
    }
    Ok(())
}

fn parse_var<T>(read: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    read(key)
        .map(|value| {
            value
                .trim()
                .parse::<T>()
                .with_context(|| format!("failed to parse {key}='{value}'"))
        })
        .transpose()
}

fn parse_flag(key: &str, value: &str) -> Result<bool> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        other => bail!("failed to parse {key}='{other}' as a boolean"),
    }
}
