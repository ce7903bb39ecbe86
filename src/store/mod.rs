//! # Shared Store
//!
//! Small key/value store shared by every operator replica. It only holds the
//! hashing salt; see [`crate::controller::hashing`].

pub mod memory;
pub mod redis;

use crate::error::StoreError;
use async_trait::async_trait;

pub use self::memory::MemoryStore;
pub use self::redis::RedisStore;

#[async_trait]
pub trait SharedStore: Send + Sync {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError>;

    /// Unconditional write; concurrent writers resolve as last write wins.
    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError>;

    /// Release the connection. Later calls fail with [`StoreError::Closed`].
    async fn close(&self);
}
