//! AES-256-GCM cipher operations.
//!
//! Two nonce widths are in use: payloads are sealed under a 16-byte IV (the
//! envelope's `iv` field), while key wrapping and the file store use the
//! standard 12-byte GCM nonce.

use aes_gcm::{
    aead::{consts::U16, Aead, KeyInit, Payload},
    aes::Aes256,
    Aes256Gcm, AesGcm, Nonce,
};

use crate::error::{CryptoError, CryptoResult};

/// Symmetric key length in bytes.
pub const KEY_LEN: usize = 32;

/// Payload IV length in bytes.
pub const IV_LEN: usize = 16;

/// Standard GCM nonce length in bytes.
pub const NONCE_LEN: usize = 12;

/// Authentication tag length appended to every ciphertext.
pub const TAG_LEN: usize = 16;

/// AES-256-GCM keyed for a 16-byte IV.
type Aes256Gcm16 = AesGcm<Aes256, U16>;

/// Encrypt a payload with AES-256-GCM under a 16-byte IV.
///
/// Returns ciphertext with appended authentication tag (16 bytes).
pub fn seal_with_iv(
    key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher =
        Aes256Gcm16::new_from_slice(key).map_err(|e| CryptoError::Encryption(e.to_string()))?;

    cipher
        .encrypt(
            Nonce::<U16>::from_slice(iv),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Encryption("AES-GCM encryption failed".into()))
}

/// Decrypt a payload sealed by [`seal_with_iv`].
pub fn open_with_iv(
    key: &[u8; KEY_LEN],
    iv: &[u8; IV_LEN],
    aad: &[u8],
    ciphertext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm16::new_from_slice(key)
        .map_err(|_| CryptoError::Decryption("Invalid key".to_string()))?;

    cipher
        .decrypt(
            Nonce::<U16>::from_slice(iv),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Decryption("AES-GCM decryption failed".to_string()))
}

/// Encrypt with AES-256-GCM under a 12-byte nonce.
pub fn aes_gcm_encrypt(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    plaintext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher =
        Aes256Gcm::new_from_slice(key).map_err(|e| CryptoError::Encryption(e.to_string()))?;

    cipher
        .encrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: plaintext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Encryption("AES-GCM encryption failed".into()))
}

/// Decrypt with AES-256-GCM under a 12-byte nonce.
///
/// The ciphertext must include the authentication tag (16 bytes) at the end.
pub fn aes_gcm_decrypt(
    key: &[u8; KEY_LEN],
    nonce: &[u8; NONCE_LEN],
    aad: &[u8],
    ciphertext: &[u8],
) -> CryptoResult<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(key)
        .map_err(|_| CryptoError::Decryption("Invalid key".to_string()))?;

    cipher
        .decrypt(
            Nonce::from_slice(nonce),
            Payload {
                msg: ciphertext,
                aad,
            },
        )
        .map_err(|_| CryptoError::Decryption("AES-GCM decryption failed".to_string()))
}
