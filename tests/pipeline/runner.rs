use std::sync::Arc;
use std::time::Duration;

use crate::support::{
    helpers::{init_tracing, test_config, wait_for_cursor},
    mock_rpc::{MockChain, MockRpcServer},
};
use anyhow::{Context, Result};
use substrate_ingest::{AsyncRpcClient, CursorStore, MemoryStore, Runner};
use tokio::time::{sleep, timeout};

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runner_exits_when_token_cancelled() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(12);
    let server = MockRpcServer::start(chain.clone()).await?;
    let mut runner = Runner::connect(test_config(server.url()).build()?).await?;
    let token = runner.cancellation_token();
    let cursor = runner.coordinator().cursor().clone();

    let handle = tokio::spawn(async move { runner.run_until_ctrl_c().await });

    wait_for_cursor(&cursor, 11, Duration::from_secs(10)).await?;
    token.cancel();

    timeout(Duration::from_secs(5), handle)
        .await
        .context("runner did not stop after cancellation")?
        .context("runner task panicked")??;

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn runner_can_restart_after_stop() -> Result<()> {
    init_tracing();
    let chain = MockChain::new(6);
    let server = MockRpcServer::start(chain.clone()).await?;
    let config = test_config(server.url()).build()?;
    let store = Arc::new(MemoryStore::new());
    let mut runner = Runner::new(
        config.clone(),
        Arc::new(AsyncRpcClient::from_config(&config)?),
        store.clone(),
    );
    let cursor = CursorStore::new(store);

    runner.start().await?;
    wait_for_cursor(&cursor, 5, Duration::from_secs(5)).await?;
    let first_token = runner.cancellation_token();
    runner.stop().await?;
    assert!(first_token.is_cancelled());
    assert!(!runner.cancellation_token().is_cancelled());
    assert!(!runner.coordinator().is_running());

    chain.set_tip(9);
    sleep(Duration::from_millis(100)).await;
    assert_eq!(cursor.latest_block_number().await?, 5);

    runner.start().await?;
    wait_for_cursor(&cursor, 9, Duration::from_secs(5)).await?;
    runner.stop().await?;
    assert!(runner.telemetry().ingested_blocks() >= 9);

    server.shutdown().await;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn stop_without_start_is_noop() -> Result<()> {
    init_tracing();
    let config = test_config("http://127.0.0.1:1").build()?;
    let mut runner = Runner::connect(config).await?;
    runner.stop().await?;
    assert!(!runner.cancellation_token().is_cancelled());
    Ok(())
}
