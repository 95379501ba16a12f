//! Secure key-value storage for secret material.
//!
//! Backends are injected behind [`SecureStore`] and chosen once by
//! [`open_store`]:
//!
//! - [`KeyringStore`] - OS credential store (Keychain, Credential Manager, keyutils)
//! - [`FileStore`] - passphrase-sealed files for hosts without a keychain
//! - [`MemoryStore`] - process lifetime only; values are lost on restart

mod file;
mod os_keyring;
mod memory;

pub use file::{FileStore, MAGIC_STORE};
pub use os_keyring::KeyringStore;
pub use memory::MemoryStore;

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::config::{CryptoConfig, StoreBackend};
use crate::error::{CryptoError, CryptoResult};
use crate::primitives::PrimitiveProvider;

/// Durable, at-rest-protected storage for secrets.
///
/// Entry keys are short fixed identifiers. Implementations never log values.
#[async_trait]
pub trait SecureStore: Send + Sync {
    /// Store `value` under `key`, replacing any previous value.
    async fn set(&self, key: &str, value: &[u8]) -> CryptoResult<()>;

    /// Retrieve the value under `key`, if any.
    async fn get(&self, key: &str) -> CryptoResult<Option<Zeroizing<Vec<u8>>>>;

    /// Remove the value under `key`.
    ///
    /// Returns `Ok(())` even if the entry didn't exist (idempotent).
    async fn delete(&self, key: &str) -> CryptoResult<()>;

    /// Whether values survive a process restart.
    fn is_persistent(&self) -> bool;

    /// Human-readable name for diagnostics.
    fn name(&self) -> &'static str;
}

/// Open the store selected by `config`.
///
/// `Auto` prefers the OS keyring, then a configured file store, and finally
/// falls back to memory with a warning. A file store draws its salts and
/// nonces from `primitives`.
pub async fn open_store(
    config: &CryptoConfig,
    primitives: Arc<dyn PrimitiveProvider>,
) -> CryptoResult<Arc<dyn SecureStore>> {
    match config.store {
        StoreBackend::Keyring => {
            let store = KeyringStore::new(&config.service_name);
            store.check_available().await?;
            Ok(Arc::new(store))
        }
        StoreBackend::File => Ok(Arc::new(file_store(config, primitives)?)),
        StoreBackend::Memory => {
            warn!(
                subsystem = "crypto",
                component = "store",
                "In-memory secure store configured; device keys will not survive restart"
            );
            Ok(Arc::new(MemoryStore::new()))
        }
        StoreBackend::Auto => {
            let keyring = KeyringStore::new(&config.service_name);
            match keyring.check_available().await {
                Ok(()) => {
                    debug!(subsystem = "crypto", component = "store", "Using OS keyring");
                    return Ok(Arc::new(keyring));
                }
                Err(e) => debug!(
                    subsystem = "crypto",
                    component = "store",
                    error = %e,
                    "OS keyring unavailable"
                ),
            }

            if config.key_dir.is_some() && config.passphrase.is_some() {
                debug!(subsystem = "crypto", component = "store", "Using sealed file store");
                return Ok(Arc::new(file_store(config, primitives)?));
            }

            warn!(
                subsystem = "crypto",
                component = "store",
                "No secure storage available; falling back to in-memory store (keys lost on restart)"
            );
            Ok(Arc::new(MemoryStore::new()))
        }
    }
}

fn file_store(
    config: &CryptoConfig,
    primitives: Arc<dyn PrimitiveProvider>,
) -> CryptoResult<FileStore> {
    let dir = config
        .key_dir
        .as_ref()
        .ok_or_else(|| CryptoError::Config("file store requires key_dir".into()))?;
    let passphrase = config
        .passphrase
        .as_ref()
        .ok_or_else(|| CryptoError::Config("file store requires a passphrase".into()))?;
    Ok(FileStore::new(dir, passphrase.as_str(), config.kdf.clone())?.with_primitives(primitives))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kdf::KdfParams;
    use crate::primitives::{BrokenRng, NativePrimitives};

    fn native() -> Arc<dyn PrimitiveProvider> {
        Arc::new(NativePrimitives::new())
    }

    fn file_config(dir: &std::path::Path, store: StoreBackend) -> CryptoConfig {
        CryptoConfig {
            store,
            key_dir: Some(dir.to_path_buf()),
            passphrase: Some(Zeroizing::new("correct horse battery".to_string())),
            kdf: KdfParams::insecure_fast(),
            ..CryptoConfig::default()
        }
    }

    #[tokio::test]
    async fn test_open_memory_store() {
        let config = CryptoConfig {
            store: StoreBackend::Memory,
            ..CryptoConfig::default()
        };
        let store = open_store(&config, native()).await.unwrap();
        assert_eq!(store.name(), "memory");
        assert!(!store.is_persistent());
    }

    #[tokio::test]
    async fn test_open_file_store() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(dir.path(), StoreBackend::File);
        let store = open_store(&config, native()).await.unwrap();
        assert_eq!(store.name(), "file");
        assert!(store.is_persistent());
    }

    #[tokio::test]
    async fn test_open_file_store_requires_dir() {
        let config = CryptoConfig {
            store: StoreBackend::File,
            passphrase: Some(Zeroizing::new("correct horse battery".to_string())),
            ..CryptoConfig::default()
        };
        let result = open_store(&config, native()).await;
        assert!(matches!(result, Err(CryptoError::Config(_))));
    }

    #[tokio::test]
    async fn test_file_store_uses_given_primitives() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(dir.path(), StoreBackend::File);
        let store = open_store(&config, Arc::new(BrokenRng)).await.unwrap();

        let err = store.set("device-key", b"secret").await.unwrap_err();
        assert!(matches!(err, CryptoError::PrimitiveUnavailable(_)));
        assert!(store.get("device-key").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_auto_with_key_dir_is_persistent() {
        let dir = tempfile::tempdir().unwrap();
        let config = file_config(dir.path(), StoreBackend::Auto);
        let store = open_store(&config, native()).await.unwrap();

        assert!(["os-keyring", "file"].contains(&store.name()));
        assert!(store.is_persistent());
    }

    #[tokio::test]
    async fn test_auto_without_key_dir_never_fails() {
        let config = CryptoConfig {
            store: StoreBackend::Auto,
            ..CryptoConfig::default()
        };
        let store = open_store(&config, native()).await.unwrap();

        assert!(["os-keyring", "memory"].contains(&store.name()));
        assert_eq!(store.is_persistent(), store.name() == "os-keyring");
    }
}
