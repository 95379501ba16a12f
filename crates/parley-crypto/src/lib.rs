//! # parley-crypto
//!
//! End-to-end encryption of chat messages and file attachments.
//!
//! Each device holds an X25519 private key in a secure store and publishes the
//! matching public key. A sender seals a payload under a fresh one-time key and
//! wraps that key for the recipient's public key; only the recipient device can
//! open the resulting [`CipherEnvelope`].
//!
//! ## Layers
//!
//! - **Primitives** ([`primitives`], [`store`]) - randomness, hashing and
//!   secret storage, with fallbacks chosen once at startup
//! - **Keys** ([`keys`]) - device key generation, rotation history and deletion
//! - **Hybrid cipher** ([`hybrid`], [`wrap`], [`cipher`]) - payload sealing and
//!   key wrapping
//! - **Facade** ([`messages`]) - text and file entry points with
//!   user-presentable errors
//!
//! ## Cryptographic Primitives
//!
//! - **Key agreement**: X25519 (Curve25519 ECDH) with ephemeral sender keys
//! - **Key wrap**: HKDF-SHA256 + AES-256-GCM
//! - **Payload cipher**: AES-256-GCM with a 16-byte IV
//! - **Key ids**: first 8 bytes of SHA-256 of the public key
//! - **File store sealing**: Argon2id + AES-256-GCM
//!
//! ## Example
//!
//! ```rust
//! use std::sync::Arc;
//! use parley_crypto::{KeyManager, MemoryStore, MessageCrypto, NativePrimitives};
//!
//! # #[tokio::main(flavor = "current_thread")]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let keys = KeyManager::new(Arc::new(MemoryStore::new()), Arc::new(NativePrimitives::new()));
//! let device = MessageCrypto::new(Arc::new(keys));
//!
//! // First run: create the device key and publish it.
//! let my_key = device.keys().generate_key_pair().await?.to_base64();
//!
//! // A peer encrypts for the published key...
//! let envelope = device.encrypt_message("hello", &my_key).await?;
//!
//! // ...and this device opens it.
//! assert_eq!(device.decrypt_message(&envelope).await?, "hello");
//! # Ok(())
//! # }
//! ```

pub mod cipher;
pub mod config;
pub mod envelope;
pub mod error;
pub mod format;
pub mod hybrid;
pub mod kdf;
pub mod keys;
pub mod messages;
pub mod primitives;
pub mod store;
pub mod wrap;

// Re-export commonly used types
pub use config::{CryptoConfig, StoreBackend};
pub use envelope::CipherEnvelope;
pub use error::{CryptoError, CryptoResult};
pub use format::{base64_decode, base64_encode};
pub use hybrid::HybridCipher;
pub use kdf::{derive_key, validate_passphrase, DerivedKey, KdfParams};
pub use keys::{KeyId, KeyManager, Keypair, PrivateKey, PublicKey};
pub use messages::{MessageCrypto, MessageError};
pub use primitives::{
    select_primitives, FallbackPrimitives, NativePrimitives, PrimitiveProvider,
};
pub use store::{open_store, FileStore, KeyringStore, MemoryStore, SecureStore};

#[cfg(test)]
mod integration_tests {
    use super::*;
    use std::sync::Arc;

    fn device() -> MessageCrypto {
        let keys = KeyManager::new(
            Arc::new(MemoryStore::new()),
            Arc::new(NativePrimitives::new()),
        );
        MessageCrypto::new(Arc::new(keys))
    }

    /// Two devices exchange messages in both directions.
    #[tokio::test]
    async fn test_conversation_both_directions() {
        let alice = device();
        let bob = device();
        let alice_key = alice.keys().generate_key_pair().await.unwrap().to_base64();
        let bob_key = bob.keys().generate_key_pair().await.unwrap().to_base64();

        let to_bob = alice.encrypt_message("hi bob", &bob_key).await.unwrap();
        let to_alice = bob.encrypt_message("hi alice", &alice_key).await.unwrap();

        assert_eq!(bob.decrypt_message(&to_bob).await.unwrap(), "hi bob");
        assert_eq!(alice.decrypt_message(&to_alice).await.unwrap(), "hi alice");

        // Neither can read what was sealed for the other.
        assert!(alice.decrypt_message(&to_bob).await.is_err());
        assert!(bob.decrypt_message(&to_alice).await.is_err());
    }

    /// Envelopes survive a JSON hop through the transport layer.
    #[tokio::test]
    async fn test_envelope_json_transport() {
        let alice = device();
        let bob = device();
        let bob_key = bob.keys().generate_key_pair().await.unwrap().to_base64();

        let wire = alice
            .encrypt_file(b"%PDF-1.7 ...", &bob_key)
            .await
            .unwrap()
            .to_json()
            .unwrap();
        let received = CipherEnvelope::from_json(&wire).unwrap();

        assert_eq!(bob.decrypt_file(&received).await.unwrap(), b"%PDF-1.7 ...");
    }

    /// Deleting the device key makes earlier envelopes unreadable.
    #[tokio::test]
    async fn test_delete_then_decrypt_reports_missing_key() {
        let device = device();
        let public = device.keys().generate_key_pair().await.unwrap().to_base64();
        let envelope = device.encrypt_message("ephemeral", &public).await.unwrap();

        device.keys().delete_key_pair().await.unwrap();

        let err = device.decrypt_message(&envelope).await.unwrap_err();
        assert!(err.is_key_missing());
    }
}
