use crate::store::backend::KeyValueStore;
use anyhow::{Context, Result};
use futures::future::BoxFuture;
use ::redis::aio::ConnectionManager;
use ::redis::{AsyncCommands, Script};
use std::fmt;
use std::sync::Arc;

// Compare and write run server-side so concurrent writers cannot interleave.
const SET_IF_GREATER_LUA: &str = r#"
local raw = redis.call('GET', KEYS[1])
local current = 0
if raw then
  current = tonumber(raw)
  if current == nil then
    return redis.error_reply(KEYS[1] .. ' does not hold a decimal number')
  end
end
if tonumber(ARGV[1]) > current then
  redis.call('SET', KEYS[1], ARGV[1])
end
return raw or '0'
"#;

/// Redis-backed store. The connection manager reconnects on its own, so a
/// dropped connection shows up as failed commands rather than a dead store.
#[derive(Clone)]
pub struct RedisStore {
    url: Arc<String>,
    connection: ConnectionManager,
    set_if_greater: Arc<Script>,
}

impl fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RedisStore").field("url", &self.url).finish()
    }
}

impl RedisStore {
    pub async fn connect(url: &str) -> Result<Self> {
        let client =
            ::redis::Client::open(url).with_context(|| format!("invalid redis url '{url}'"))?;
        let connection = ConnectionManager::new(client)
            .await
            .with_context(|| format!("failed to connect to redis at '{url}'"))?;
        tracing::info!(url, "connected to redis");
        Ok(Self {
            url: Arc::new(url.to_owned()),
            connection,
            set_if_greater: Arc::new(Script::new(SET_IF_GREATER_LUA)),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl KeyValueStore for RedisStore {
    fn get<'a>(&'a self, key: &'a str) -> BoxFuture<'a, Result<Option<Vec<u8>>>> {
        Box::pin(async move {
            let mut connection = self.connection.clone();
            let value: Option<Vec<u8>> = connection
                .get(key)
                .await
                .with_context(|| format!("redis GET {key} failed"))?;
            Ok(value)
        })
    }

    fn set<'a>(&'a self, key: &'a str, value: Vec<u8>) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut connection = self.connection.clone();
            let _: () = connection
                .set(key, value)
                .await
                .with_context(|| format!("redis SET {key} failed"))?;
            Ok(())
        })
    }

    fn set_if_greater<'a>(&'a self, key: &'a str, value: u64) -> BoxFuture<'a, Result<u64>> {
        Box::pin(async move {
            let mut connection = self.connection.clone();
            let previous: String = self
                .set_if_greater
                .key(key)
                .arg(value.to_string())
                .invoke_async(&mut connection)
                .await
                .with_context(|| format!("redis conditional SET {key} failed"))?;
            previous
                .trim()
                .parse::<u64>()
                .with_context(|| format!("{key} held a non-numeric value '{previous}'"))
        })
    }

    fn publish<'a>(&'a self, channel: &'a str, message: String) -> BoxFuture<'a, Result<()>> {
        Box::pin(async move {
            let mut connection = self.connection.clone();
            let receivers: i64 = connection
                .publish(channel, message)
                .await
                .with_context(|| format!("redis PUBLISH {channel} failed"))?;
            tracing::trace!(channel, receivers, "published notification");
            Ok(())
        })
    }
}
