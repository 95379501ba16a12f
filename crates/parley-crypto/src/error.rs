//! Error types for key management and envelope encryption.

use thiserror::Error;

/// Errors raised below the message facade.
///
/// Messages carry context but never key bytes, IVs or plaintext.
#[derive(Error, Debug)]
pub enum CryptoError {
    /// A native primitive (RNG, secure storage) is not available on this platform.
    #[error("Primitive unavailable: {0}")]
    PrimitiveUnavailable(String),

    /// Key pair could not be generated or persisted.
    #[error("Key generation failed: {0}")]
    KeyGeneration(String),

    /// No device key exists yet.
    #[error("No device key available - generate a key pair first")]
    NoKey,

    /// Encryption failed.
    #[error("Encryption failed: {0}")]
    Encryption(String),

    /// Decryption failed - wrong key or corrupted data.
    #[error("Decryption failed: {0}")]
    Decryption(String),

    /// Secure store read/write failed.
    #[error("Secure storage error: {0}")]
    Storage(String),

    /// Malformed public or private key.
    #[error("Invalid key: {0}")]
    InvalidKey(String),

    /// Invalid format.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),

    /// Key derivation failed.
    #[error("Key derivation failed: {0}")]
    KeyDerivation(String),

    /// Passphrase too short.
    #[error("Passphrase too short (minimum {0} characters required)")]
    PassphraseTooShort(usize),

    /// Invalid configuration.
    #[error("Configuration error: {0}")]
    Config(String),

    /// I/O error.
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),
}

/// Result type for cryptographic operations.
pub type CryptoResult<T> = Result<T, CryptoError>;
