//! Ingestion pipeline: block fetching, the commit protocol, historical
//! backfill, real-time polling, and the coordinator that runs them.

pub mod backfill;
pub mod commit;
pub mod coordinator;
pub mod fetcher;
pub(crate) mod lifecycle;
pub mod realtime;
pub(crate) mod worker_pool;

#[cfg(test)]
pub(crate) mod testing;
