use std::sync::Arc;
use std::time::Duration;

use crate::support::helpers::{init_tracing, redis_test_url, REDIS_GUARD};
use anyhow::{Context, Result};
use futures::StreamExt;
use redis::AsyncCommands;
use serde_json::json;
use substrate_ingest::{BlockData, CursorStore, IngestionEvent, KeyValueStore, RedisStore};
use tokio::time::timeout;

async fn reset_keys(url: &str, keys: &[&str]) -> Result<()> {
    let client = redis::Client::open(url)?;
    let mut connection = client.get_multiplexed_async_connection().await?;
    let _: () = connection.del(keys).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn redis_store_round_trips_blocks_cursor_and_events() -> Result<()> {
    init_tracing();
    let Some(url) = redis_test_url() else {
        tracing::info!(
            "skipping redis_store_round_trips_blocks_cursor_and_events (set INGEST_TEST_REDIS_URL)"
        );
        return Ok(());
    };
    let _guard = REDIS_GUARD.lock().await;
    reset_keys(&url, &["block:41", "block:42", "latest_block_number"]).await?;

    let store = Arc::new(RedisStore::connect(&url).await?);
    let cursor = CursorStore::new(store.clone());

    let mut subscriber = redis::Client::open(url.as_str())?
        .get_async_pubsub()
        .await
        .context("failed to open pubsub connection")?;
    subscriber.subscribe("new_block").await?;

    let block = BlockData::new(json!({
        "block": { "header": { "number": "0x2a" }, "extrinsics": [] },
        "justifications": null,
    }));
    assert!(cursor.block(42).await?.is_none());
    cursor.store_block(42, &block).await?;
    assert_eq!(cursor.block(42).await?, Some(block.clone()));
    assert_eq!(cursor.block(42).await?.map(|b| b.header_number()).transpose()?, Some(42));
    assert!(cursor.block(41).await?.is_none());

    assert_eq!(cursor.latest_block_number().await?, 0);
    cursor.set_latest_block_number(40).await?;
    assert_eq!(store.get("latest_block_number").await?, Some(b"40".to_vec()));
    cursor.advance_to(42).await?;
    cursor.advance_to(39).await?;
    assert_eq!(cursor.latest_block_number().await?, 42);

    let mut messages = Box::pin(subscriber.on_message());
    cursor.publish(&IngestionEvent::new(42)).await?;
    let message = timeout(Duration::from_secs(5), messages.next())
        .await
        .context("no message on new_block")?
        .context("pubsub stream closed")?;
    assert_eq!(message.get_channel_name(), "new_block");
    assert_eq!(message.get_payload::<String>()?, "Block Number: 42");

    reset_keys(&url, &["block:42", "latest_block_number"]).await?;
    Ok(())
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn redis_cursor_survives_concurrent_advances() -> Result<()> {
    init_tracing();
    let Some(url) = redis_test_url() else {
        tracing::info!(
            "skipping redis_cursor_survives_concurrent_advances (set INGEST_TEST_REDIS_URL)"
        );
        return Ok(());
    };
    let _guard = REDIS_GUARD.lock().await;
    reset_keys(&url, &["latest_block_number"]).await?;

    let cursor = CursorStore::new(Arc::new(RedisStore::connect(&url).await?));
    let mut tasks = tokio::task::JoinSet::new();
    for number in (1..=60).rev().chain(1..=60) {
        let cursor = cursor.clone();
        tasks.spawn(async move { cursor.advance_to(number).await });
    }
    while let Some(result) = tasks.join_next().await {
        result??;
    }
    assert_eq!(cursor.latest_block_number().await?, 60);

    reset_keys(&url, &["latest_block_number"]).await?;
    Ok(())
}
