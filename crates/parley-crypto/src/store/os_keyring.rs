//! OS credential store backend.

use async_trait::async_trait;
use zeroize::Zeroizing;

use crate::error::{CryptoError, CryptoResult};
use crate::format::{base64_decode, base64_encode};
use crate::store::SecureStore;

/// Entry used to check that the credential store answers at all.
const AVAILABILITY_ENTRY: &str = "availability-check";

/// Secrets kept in the platform credential store.
///
/// macOS Keychain, Windows Credential Manager, or the Linux Secret Service
/// (fronted by a kernel keyring cache). Values are stored base64-encoded under `(service, key)`. Calls into the
/// platform API block, so each runs on the blocking thread pool.
#[derive(Debug, Clone)]
pub struct KeyringStore {
    service: String,
}

impl KeyringStore {
    pub fn new(service: &str) -> Self {
        Self {
            service: service.to_string(),
        }
    }

    /// Check that the platform store is reachable.
    pub async fn check_available(&self) -> CryptoResult<()> {
        let service = self.service.clone();
        run_blocking(move || match entry(&service, AVAILABILITY_ENTRY)?.get_password() {
            Ok(_) | Err(::keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CryptoError::PrimitiveUnavailable(format!(
                "OS credential store: {}",
                e
            ))),
        })
        .await
    }
}

fn entry(service: &str, key: &str) -> CryptoResult<::keyring::Entry> {
    ::keyring::Entry::new(service, key)
        .map_err(|e| CryptoError::PrimitiveUnavailable(format!("OS credential store: {}", e)))
}

async fn run_blocking<T, F>(f: F) -> CryptoResult<T>
where
    F: FnOnce() -> CryptoResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CryptoError::Storage(format!("Credential store task failed: {}", e)))?
}

#[async_trait]
impl SecureStore for KeyringStore {
    async fn set(&self, key: &str, value: &[u8]) -> CryptoResult<()> {
        let service = self.service.clone();
        let key = key.to_string();
        let encoded = Zeroizing::new(base64_encode(value));
        run_blocking(move || {
            entry(&service, &key)?
                .set_password(&encoded)
                .map_err(|e| CryptoError::Storage(format!("Failed to store secret: {}", e)))
        })
        .await
    }

    async fn get(&self, key: &str) -> CryptoResult<Option<Zeroizing<Vec<u8>>>> {
        let service = self.service.clone();
        let key = key.to_string();
        run_blocking(move || match entry(&service, &key)?.get_password() {
            Ok(encoded) => {
                let encoded = Zeroizing::new(encoded);
                let bytes = base64_decode(&encoded).map_err(|_| {
                    CryptoError::Storage("Invalid secret encoding in credential store".into())
                })?;
                Ok(Some(Zeroizing::new(bytes)))
            }
            Err(::keyring::Error::NoEntry) => Ok(None),
            Err(e) => Err(CryptoError::Storage(format!("Credential store error: {}", e))),
        })
        .await
    }

    async fn delete(&self, key: &str) -> CryptoResult<()> {
        let service = self.service.clone();
        let key = key.to_string();
        run_blocking(move || match entry(&service, &key)?.delete_credential() {
            Ok(()) | Err(::keyring::Error::NoEntry) => Ok(()),
            Err(e) => Err(CryptoError::Storage(format!("Failed to delete secret: {}", e))),
        })
        .await
    }

    fn is_persistent(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "os-keyring"
    }
}
