//! Device key lifecycle.
//!
//! The device key history lives in a single secure-store entry. The public
//! key is never stored: it is re-derived from the private key on every read.

use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::config::{DEFAULT_KEY_SLOT, DEFAULT_MAX_KEY_HISTORY, MAX_KEY_HISTORY_LIMIT};
use crate::error::{CryptoError, CryptoResult};
use crate::keys::history::{KeyEntry, KeyHistory};
use crate::keys::keypair::{KeyId, PrivateKey, PublicKey};
use crate::primitives::PrimitiveProvider;
use crate::store::SecureStore;

/// Owns generation, lookup and deletion of the device key.
pub struct KeyManager {
    store: Arc<dyn SecureStore>,
    primitives: Arc<dyn PrimitiveProvider>,
    slot: String,
    max_history: usize,
    write_lock: Mutex<()>,
}

impl KeyManager {
    /// Manager using the default slot and history length.
    pub fn new(store: Arc<dyn SecureStore>, primitives: Arc<dyn PrimitiveProvider>) -> Self {
        Self::with_options(store, primitives, DEFAULT_KEY_SLOT, DEFAULT_MAX_KEY_HISTORY)
    }

    /// Manager with an explicit store slot and history length (clamped to 1..=64).
    pub fn with_options(
        store: Arc<dyn SecureStore>,
        primitives: Arc<dyn PrimitiveProvider>,
        slot: &str,
        max_history: usize,
    ) -> Self {
        Self {
            store,
            primitives,
            slot: slot.to_string(),
            max_history: max_history.clamp(1, MAX_KEY_HISTORY_LIMIT),
            write_lock: Mutex::new(()),
        }
    }

    pub fn primitives(&self) -> &Arc<dyn PrimitiveProvider> {
        &self.primitives
    }

    pub fn store(&self) -> &Arc<dyn SecureStore> {
        &self.store
    }

    /// Generate a new device key and make it active.
    ///
    /// Earlier keys stay in the history (up to the configured length) so
    /// envelopes sealed for them can still be opened. Returns only the new
    /// public key. On any failure the stored state is left as it was.
    #[instrument(skip(self), fields(subsystem = "crypto", component = "keys", op = "generate_key_pair"))]
    pub async fn generate_key_pair(&self) -> CryptoResult<PublicKey> {
        let _guard = self.write_lock.lock().await;

        let private = PrivateKey::generate(self.primitives.as_ref())
            .map_err(|e| CryptoError::KeyGeneration(format!("No usable randomness: {}", e)))?;
        let entry = KeyEntry::new(self.primitives.as_ref(), private);
        let public = entry.public.clone();
        let key_id = entry.key_id;

        let existing = match self.store.get(&self.slot).await {
            Ok(Some(bytes)) => match KeyHistory::decode(self.primitives.as_ref(), &bytes) {
                Ok(history) => Some(history),
                Err(e) => {
                    warn!(error = %e, "Existing key history unreadable, replacing it");
                    None
                }
            },
            Ok(None) => None,
            Err(e) => {
                return Err(CryptoError::KeyGeneration(format!(
                    "Secure store unavailable: {}",
                    e
                )))
            }
        };

        let (history, retired) = match existing {
            Some(mut history) => {
                let retired = history.push(entry, self.max_history);
                (history, retired)
            }
            None => (KeyHistory::new(entry), Vec::new()),
        };

        let encoded = history
            .encode()
            .map_err(|e| CryptoError::KeyGeneration(format!("Cannot encode key history: {}", e)))?;
        self.store
            .set(&self.slot, &encoded)
            .await
            .map_err(|e| CryptoError::KeyGeneration(format!("Cannot persist key: {}", e)))?;

        for old in &retired {
            debug!(key_id = %old, "Retired device key");
        }
        if self.primitives.is_degraded() {
            warn!(
                key_id = %key_id,
                "Device key generated with degraded randomness; regenerate once a secure source is available"
            );
        }
        info!(
            key_id = %key_id,
            history_len = history.len(),
            store = self.store.name(),
            "Device key generated"
        );

        Ok(public)
    }

    /// Public key of the active device key, or `None` before first setup.
    #[instrument(skip(self), fields(subsystem = "crypto", component = "keys", op = "get_public_key"))]
    pub async fn get_public_key(&self) -> CryptoResult<Option<PublicKey>> {
        Ok(self
            .load_history()
            .await?
            .map(|history| history.active().public.clone()))
    }

    /// Whether a device key exists. Storage errors read as `false`.
    pub async fn has_key_pair(&self) -> bool {
        match self.load_history().await {
            Ok(history) => history.is_some(),
            Err(e) => {
                debug!(
                    subsystem = "crypto",
                    component = "keys",
                    error = %e,
                    "Key lookup failed, reporting no key"
                );
                false
            }
        }
    }

    /// Remove every device key. Deleting when nothing is stored is not an error.
    #[instrument(skip(self), fields(subsystem = "crypto", component = "keys", op = "delete_key_pair"))]
    pub async fn delete_key_pair(&self) -> CryptoResult<()> {
        let _guard = self.write_lock.lock().await;
        self.store.delete(&self.slot).await?;
        info!("Device keys deleted");
        Ok(())
    }

    /// Ids of all retained keys, oldest first.
    pub async fn key_ids(&self) -> CryptoResult<Vec<KeyId>> {
        Ok(self
            .load_history()
            .await?
            .map(|history| history.key_ids())
            .unwrap_or_default())
    }

    /// Id of the active key.
    pub async fn active_key_id(&self) -> CryptoResult<Option<KeyId>> {
        Ok(self
            .load_history()
            .await?
            .map(|history| history.active().key_id))
    }

    /// Read and verify the stored history.
    pub(crate) async fn load_history(&self) -> CryptoResult<Option<KeyHistory>> {
        match self.store.get(&self.slot).await? {
            Some(bytes) => Ok(Some(KeyHistory::decode(self.primitives.as_ref(), &bytes)?)),
            None => Ok(None),
        }
    }
}

impl std::fmt::Debug for KeyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyManager")
            .field("store", &self.store.name())
            .field("primitives", &self.primitives.name())
            .field("slot", &self.slot)
            .field("max_history", &self.max_history)
            .finish()
    }
}
