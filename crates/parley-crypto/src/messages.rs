//! Message and file encryption for chat clients.
//!
//! Text and file payloads go through the same [`HybridCipher`] path; only the
//! conversion to and from bytes differs. Errors leaving this module are
//! [`MessageError`], the only error type meant to reach end users.

use std::sync::Arc;

use thiserror::Error;
use tracing::{info, instrument, warn};

use crate::config::CryptoConfig;
use crate::envelope::CipherEnvelope;
use crate::error::{CryptoError, CryptoResult};
use crate::hybrid::HybridCipher;
use crate::keys::{KeyManager, PublicKey};
use crate::primitives::select_primitives;
use crate::store::open_store;

/// User-presentable encryption failure.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum MessageError {
    /// Sealing failed (bad recipient key, no randomness).
    #[error("Unable to encrypt: {0}")]
    Encryption(String),

    /// Opening failed. `key_missing` is set when this device has no key yet,
    /// so the caller can prompt for key setup instead of showing an error.
    #[error("Unable to decrypt: {reason}")]
    Decryption { reason: String, key_missing: bool },
}

impl MessageError {
    pub fn is_key_missing(&self) -> bool {
        matches!(
            self,
            MessageError::Decryption {
                key_missing: true,
                ..
            }
        )
    }

    fn encryption(err: CryptoError) -> Self {
        match err {
            CryptoError::Encryption(reason) => MessageError::Encryption(reason),
            other => MessageError::Encryption(other.to_string()),
        }
    }

    fn decryption(err: CryptoError) -> Self {
        let key_missing = matches!(err, CryptoError::NoKey);
        let reason = match err {
            CryptoError::Decryption(reason) => reason,
            other => other.to_string(),
        };
        MessageError::Decryption {
            reason,
            key_missing,
        }
    }
}

/// Encrypts outgoing messages and files and decrypts incoming ones.
#[derive(Debug, Clone)]
pub struct MessageCrypto {
    cipher: HybridCipher,
}

impl MessageCrypto {
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self {
            cipher: HybridCipher::new(keys),
        }
    }

    /// Select primitives and a secure store from `config` and wire the layers.
    pub async fn from_config(config: &CryptoConfig) -> CryptoResult<Self> {
        let primitives = select_primitives(config.allow_degraded_random)?;
        let store = open_store(config, primitives.clone()).await?;
        if !store.is_persistent() {
            warn!(
                subsystem = "crypto",
                component = "messages",
                store = store.name(),
                "Device keys are held in memory only"
            );
        }
        info!(
            subsystem = "crypto",
            component = "messages",
            primitives = primitives.name(),
            degraded = primitives.is_degraded(),
            store = store.name(),
            "Message encryption initialized"
        );

        let keys = KeyManager::with_options(
            store,
            primitives,
            &config.key_slot,
            config.max_key_history,
        );
        Ok(Self::new(Arc::new(keys)))
    }

    /// Key manager for setup flows (generate, publish, delete).
    pub fn keys(&self) -> &KeyManager {
        self.cipher.keys()
    }

    pub fn cipher(&self) -> &HybridCipher {
        &self.cipher
    }

    /// Encrypt chat text for the holder of `recipient_public_key` (base64).
    #[instrument(skip_all, fields(subsystem = "crypto", component = "messages", op = "encrypt_message"))]
    pub async fn encrypt_message(
        &self,
        text: &str,
        recipient_public_key: &str,
    ) -> Result<CipherEnvelope, MessageError> {
        self.seal(text.as_bytes(), recipient_public_key)
    }

    /// Decrypt chat text sealed for this device.
    #[instrument(skip_all, fields(subsystem = "crypto", component = "messages", op = "decrypt_message"))]
    pub async fn decrypt_message(&self, envelope: &CipherEnvelope) -> Result<String, MessageError> {
        let bytes = self.open(envelope).await?;
        String::from_utf8(bytes).map_err(|_| MessageError::Decryption {
            reason: "Decrypted message is not valid UTF-8".into(),
            key_missing: false,
        })
    }

    /// Encrypt file contents for the holder of `recipient_public_key` (base64).
    #[instrument(skip_all, fields(subsystem = "crypto", component = "messages", op = "encrypt_file", file_len = file.len()))]
    pub async fn encrypt_file(
        &self,
        file: &[u8],
        recipient_public_key: &str,
    ) -> Result<CipherEnvelope, MessageError> {
        self.seal(file, recipient_public_key)
    }

    /// Decrypt file contents sealed for this device.
    #[instrument(skip_all, fields(subsystem = "crypto", component = "messages", op = "decrypt_file"))]
    pub async fn decrypt_file(&self, envelope: &CipherEnvelope) -> Result<Vec<u8>, MessageError> {
        self.open(envelope).await
    }

    fn seal(&self, payload: &[u8], recipient_public_key: &str) -> Result<CipherEnvelope, MessageError> {
        let recipient = PublicKey::from_base64(recipient_public_key).map_err(|e| {
            MessageError::Encryption(format!("Recipient public key is invalid: {}", e))
        })?;
        self.cipher
            .seal_payload(payload, &recipient)
            .map_err(MessageError::encryption)
    }

    async fn open(&self, envelope: &CipherEnvelope) -> Result<Vec<u8>, MessageError> {
        self.cipher
            .open_payload(envelope)
            .await
            .map_err(MessageError::decryption)
    }
}
