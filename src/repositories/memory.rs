//! Non-durable storage, for ephemeral sessions and tests

use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use super::StateStorage;
use crate::errors::StorageResult;

#[derive(Debug, Clone, Default)]
pub struct MemoryStorage {
    documents: Arc<Mutex<HashMap<String, String>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl StateStorage for MemoryStorage {
    async fn read(&self, key: &str) -> StorageResult<Option<String>> {
        let documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        Ok(documents.get(key).cloned())
    }

    async fn write(&self, key: &str, contents: String) -> StorageResult<()> {
        let mut documents = self.documents.lock().unwrap_or_else(PoisonError::into_inner);
        documents.insert(key.to_string(), contents);
        Ok(())
    }
}
