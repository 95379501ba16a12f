//! The three-part ciphertext envelope exchanged between devices.

use serde::{Deserialize, Serialize};

use crate::cipher::IV_LEN;
use crate::error::{CryptoError, CryptoResult};
use crate::format::{base64_decode, base64_decode_array, base64_encode};
use crate::wrap::WrappedKey;

/// One encrypted message or file.
///
/// All three fields are standard base64. On the wire the field names are
/// `encryptedContent`, `encryptedKey` and `iv`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CipherEnvelope {
    /// Payload ciphertext followed by the 16-byte authentication tag.
    pub encrypted_content: String,
    /// One-time content key wrapped for the recipient.
    pub encrypted_key: String,
    /// 16-byte payload IV.
    pub iv: String,
}

impl CipherEnvelope {
    pub(crate) fn from_parts(content: &[u8], wrapped: &[u8], iv: &[u8; IV_LEN]) -> Self {
        Self {
            encrypted_content: base64_encode(content),
            encrypted_key: base64_encode(wrapped),
            iv: base64_encode(iv),
        }
    }

    /// Serialize as JSON for the transport layer.
    pub fn to_json(&self) -> CryptoResult<String> {
        Ok(serde_json::to_string(self)?)
    }

    /// Parse the JSON produced by [`CipherEnvelope::to_json`].
    pub fn from_json(json: &str) -> CryptoResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| CryptoError::InvalidFormat(format!("Invalid envelope: {}", e)))
    }

    pub(crate) fn decode(&self) -> CryptoResult<DecodedEnvelope> {
        let content = base64_decode(&self.encrypted_content)?;
        let wrapped_bytes = base64_decode(&self.encrypted_key)?;
        let wrapped = WrappedKey::from_bytes(&wrapped_bytes)?;
        let iv = base64_decode_array::<IV_LEN>(&self.iv, "IV")?;
        Ok(DecodedEnvelope {
            content,
            wrapped_bytes,
            wrapped,
            iv,
        })
    }
}

/// Envelope fields in binary form.
pub(crate) struct DecodedEnvelope {
    pub content: Vec<u8>,
    pub wrapped_bytes: Vec<u8>,
    pub wrapped: WrappedKey,
    pub iv: [u8; IV_LEN],
}
