//! Redis-backed [`SharedStore`].
//!
//! The connection is opened on first use, not at construction, so a process that
//! never fingerprints anything never dials Redis.

use super::SharedStore;
use crate::error::StoreError;
use async_trait::async_trait;
use redis::aio::ConnectionManager;
use redis::AsyncCommands;
use tokio::sync::Mutex;
use tracing::{debug, info};

pub struct RedisStore {
    client: redis::Client,
    connection: Mutex<ConnectionState>,
}

enum ConnectionState {
    Idle,
    Open(ConnectionManager),
    Closed,
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore").finish_non_exhaustive()
    }
}

impl RedisStore {
    /// Validate the connection string without connecting.
    pub fn new(connection_string: &str) -> Result<Self, StoreError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self {
            client,
            connection: Mutex::new(ConnectionState::Idle),
        })
    }

    async fn connection(&self) -> Result<ConnectionManager, StoreError> {
        let mut state = self.connection.lock().await;
        match &*state {
            ConnectionState::Open(manager) => Ok(manager.clone()),
            ConnectionState::Closed => Err(StoreError::Closed),
            ConnectionState::Idle => {
                debug!("Opening shared store connection");
                let manager = ConnectionManager::new(self.client.clone()).await?;
                *state = ConnectionState::Open(manager.clone());
                Ok(manager)
            }
        }
    }
}

#[async_trait]
impl SharedStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        let mut conn = self.connection().await?;
        let value: Option<String> = conn.get(key).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        let mut conn = self.connection().await?;
        conn.set::<_, _, ()>(key, value).await?;
        Ok(())
    }

    async fn close(&self) {
        let mut state = self.connection.lock().await;
        if matches!(*state, ConnectionState::Open(_)) {
            info!("Closing shared store connection");
        }
        *state = ConnectionState::Closed;
    }
}
