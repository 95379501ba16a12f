//! Hybrid payload encryption.
//!
//! # Sealing
//!
//! 1. Draw a fresh content key (32 bytes) and IV (16 bytes)
//! 2. Wrap the content key for the recipient ([`crate::wrap`])
//! 3. Encrypt the payload with AES-256-GCM under (key, IV), using the wrapped
//!    key bytes as associated data
//!
//! # Opening
//!
//! 1. Load the device key history
//! 2. Pick the history entry named by the wrapped key's recipient id
//! 3. Unwrap the content key
//! 4. Decrypt and authenticate the payload
//!
//! Binding the wrapped key into the payload tag means neither half of an
//! envelope can be swapped for the half of another envelope.

use std::sync::Arc;

use tracing::{instrument, trace};
use zeroize::Zeroizing;

use crate::cipher::{open_with_iv, seal_with_iv, IV_LEN, KEY_LEN};
use crate::envelope::CipherEnvelope;
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{KeyHistory, KeyManager, PublicKey};
use crate::primitives::random_array;
use crate::wrap::{unwrap_key, wrap_key};

/// Seals payloads for a recipient and opens payloads sealed for this device.
///
/// Holds no per-call state; share it behind an `Arc` and call concurrently.
#[derive(Debug, Clone)]
pub struct HybridCipher {
    keys: Arc<KeyManager>,
}

impl HybridCipher {
    pub fn new(keys: Arc<KeyManager>) -> Self {
        Self { keys }
    }

    /// The key manager supplying the device key on open.
    pub fn keys(&self) -> &Arc<KeyManager> {
        &self.keys
    }

    /// Encrypt `payload` so only the holder of `recipient`'s private key can
    /// read it.
    ///
    /// Every call uses a fresh content key, IV and ephemeral key, so sealing
    /// the same payload twice yields unrelated envelopes.
    pub fn seal_payload(
        &self,
        payload: &[u8],
        recipient: &PublicKey,
    ) -> CryptoResult<CipherEnvelope> {
        let primitives = self.keys.primitives().as_ref();

        let content_key: Zeroizing<[u8; KEY_LEN]> = Zeroizing::new(
            random_array(primitives)
                .map_err(|e| CryptoError::Encryption(format!("No usable randomness: {}", e)))?,
        );
        let iv: [u8; IV_LEN] = random_array(primitives)
            .map_err(|e| CryptoError::Encryption(format!("No usable randomness: {}", e)))?;

        let wrapped = wrap_key(primitives, &content_key, recipient)
            .map_err(|e| match e {
                CryptoError::Encryption(_) => e,
                other => CryptoError::Encryption(other.to_string()),
            })?
            .to_bytes();
        let content = seal_with_iv(&content_key, &iv, &wrapped, payload)?;

        trace!(
            subsystem = "crypto",
            component = "hybrid",
            payload_len = payload.len(),
            sealed_len = content.len(),
            "Payload sealed"
        );

        Ok(CipherEnvelope::from_parts(&content, &wrapped, &iv))
    }

    /// Decrypt an envelope sealed for any key in this device's history.
    ///
    /// Returns `NoKey` when the device has no key. Every other failure,
    /// including malformed fields and envelopes for someone else, is
    /// `Decryption`; no partial plaintext is ever returned.
    #[instrument(skip(self, envelope), fields(subsystem = "crypto", component = "hybrid", op = "open_payload"))]
    pub async fn open_payload(&self, envelope: &CipherEnvelope) -> CryptoResult<Vec<u8>> {
        let history = self
            .keys
            .load_history()
            .await
            .map_err(|e| CryptoError::Decryption(format!("Device key unreadable: {}", e)))?
            .ok_or(CryptoError::NoKey)?;

        let plaintext = open_with_history(&history, envelope)?;
        trace!(payload_len = plaintext.len(), "Payload opened");
        Ok(plaintext)
    }
}

/// Open `envelope` against an already loaded key history.
pub(crate) fn open_with_history(
    history: &KeyHistory,
    envelope: &CipherEnvelope,
) -> CryptoResult<Vec<u8>> {
    let decoded = envelope
        .decode()
        .map_err(|e| CryptoError::Decryption(e.to_string()))?;

    let recipient = decoded.wrapped.recipient();
    let entry = history.find(recipient).ok_or_else(|| {
        CryptoError::Decryption(format!(
            "Envelope was sealed for key {}, which is not held by this device",
            recipient
        ))
    })?;

    let content_key = unwrap_key(&decoded.wrapped, &entry.private)?;
    open_with_iv(
        &content_key,
        &decoded.iv,
        &decoded.wrapped_bytes,
        &decoded.content,
    )
}
