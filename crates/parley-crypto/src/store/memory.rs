//! In-memory secure store.

use std::collections::HashMap;

use async_trait::async_trait;
use tokio::sync::RwLock;
use zeroize::Zeroizing;

use crate::error::CryptoResult;
use crate::store::SecureStore;

/// Process-lifetime store for hosts without secure storage, and for tests.
///
/// Not persistent: values are lost when the store is dropped. Each instance
/// is independent; nothing is shared through globals.
#[derive(Default)]
pub struct MemoryStore {
    entries: RwLock<HashMap<String, Zeroizing<Vec<u8>>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored entries.
    pub async fn len(&self) -> usize {
        self.entries.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl SecureStore for MemoryStore {
    async fn set(&self, key: &str, value: &[u8]) -> CryptoResult<()> {
        self.entries
            .write()
            .await
            .insert(key.to_string(), Zeroizing::new(value.to_vec()));
        Ok(())
    }

    async fn get(&self, key: &str) -> CryptoResult<Option<Zeroizing<Vec<u8>>>> {
        Ok(self.entries.read().await.get(key).cloned())
    }

    async fn delete(&self, key: &str) -> CryptoResult<()> {
        self.entries.write().await.remove(key);
        Ok(())
    }

    fn is_persistent(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

impl std::fmt::Debug for MemoryStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MemoryStore").finish_non_exhaustive()
    }
}
