//! In-process [`SharedStore`] for single-replica runs and tests.

use super::SharedStore;
use crate::error::StoreError;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

#[derive(Debug, Default)]
pub struct MemoryStore {
    values: Mutex<HashMap<String, String>>,
    closed: AtomicBool,
}

impl MemoryStore {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    fn check_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

#[async_trait]
impl SharedStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<String>, StoreError> {
        self.check_open()?;
        let values = self.values.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        Ok(values.get(key).cloned())
    }

    async fn set(&self, key: &str, value: &str) -> Result<(), StoreError> {
        self.check_open()?;
        let mut values = self.values.lock().unwrap_or_else(std::sync::PoisonError::into_inner);
        values.insert(key.to_string(), value.to_string());
        Ok(())
    }

    async fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
