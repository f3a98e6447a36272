//! Persistence: the key-value/event backend trait, its Redis and in-memory
//! implementations, and the cursor view the coordinator works through.

pub mod backend;
pub mod cursor;
pub mod memory;
pub mod redis;

pub use backend::{connect, KeyValueStore};
pub use cursor::{block_key, CursorAdvance, CursorStore, LATEST_BLOCK_KEY, NEW_BLOCK_CHANNEL};
pub use memory::{MemoryStore, StoreOp};
pub use self::redis::RedisStore;
