//! Wrapping one-time content keys under a recipient's public key.
//!
//! # Protocol
//!
//! Wrapping:
//! 1. Generate an ephemeral X25519 keypair
//! 2. shared = ECDH(ephemeral_private, recipient_public)
//! 3. KEK and nonce = HKDF-SHA256(shared, salt = ephemeral_pub || recipient_pub)
//! 4. Seal the content key with AES-256-GCM, authenticating the header
//!
//! Unwrapping repeats steps 2-3 from the recipient side with
//! ECDH(recipient_private, ephemeral_public).
//!
//! # Layout (version 1, 89 bytes)
//!
//! ```text
//! [0]      version (0x01)
//! [1..9]   recipient key id
//! [9..41]  ephemeral public key
//! [41..89] sealed content key || tag
//! ```
//!
//! Each KEK is used for exactly one seal because the ephemeral key is fresh,
//! so the nonce can be derived alongside it.

use hkdf::Hkdf;
use sha2::Sha256;
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::cipher::{aes_gcm_decrypt, aes_gcm_encrypt, KEY_LEN, NONCE_LEN, TAG_LEN};
use crate::error::{CryptoError, CryptoResult};
use crate::keys::{KeyId, Keypair, PrivateKey, PublicKey, KEY_BYTES, KEY_ID_LEN};
use crate::primitives::PrimitiveProvider;

/// Current wrapped-key version byte.
pub const WRAP_VERSION: u8 = 1;

/// Authenticated header length (version, key id, ephemeral key).
pub const WRAP_HEADER_LEN: usize = 1 + KEY_ID_LEN + KEY_BYTES;

/// Total wrapped-key length.
pub const WRAPPED_KEY_LEN: usize = WRAP_HEADER_LEN + KEY_LEN + TAG_LEN;

/// Domain separation context for HKDF.
const HKDF_INFO_KEK: &[u8] = b"parley-envelope-kek-v1";

/// Key-encryption key and nonce derived for one wrap.
#[derive(Zeroize, ZeroizeOnDrop)]
struct Kek {
    key: [u8; KEY_LEN],
    nonce: [u8; NONCE_LEN],
}

impl std::fmt::Debug for Kek {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Kek").field("key", &"[REDACTED]").finish()
    }
}

/// A content key sealed for one recipient.
#[derive(Clone, PartialEq, Eq)]
pub struct WrappedKey {
    recipient: KeyId,
    ephemeral: PublicKey,
    sealed: Vec<u8>,
}

impl WrappedKey {
    /// Id of the recipient key this was sealed for.
    pub fn recipient(&self) -> &KeyId {
        &self.recipient
    }

    pub fn ephemeral(&self) -> &PublicKey {
        &self.ephemeral
    }

    fn header(&self) -> [u8; WRAP_HEADER_LEN] {
        let mut header = [0u8; WRAP_HEADER_LEN];
        header[0] = WRAP_VERSION;
        header[1..1 + KEY_ID_LEN].copy_from_slice(self.recipient.as_bytes());
        header[1 + KEY_ID_LEN..].copy_from_slice(self.ephemeral.as_bytes());
        header
    }

    /// Serialize to the version 1 layout.
    pub fn to_bytes(&self) -> Vec<u8> {
        let mut out = Vec::with_capacity(WRAPPED_KEY_LEN);
        out.extend_from_slice(&self.header());
        out.extend_from_slice(&self.sealed);
        out
    }

    /// Parse the version 1 layout.
    pub fn from_bytes(bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() != WRAPPED_KEY_LEN {
            return Err(CryptoError::InvalidFormat(format!(
                "Wrapped key must be {} bytes, got {}",
                WRAPPED_KEY_LEN,
                bytes.len()
            )));
        }
        if bytes[0] != WRAP_VERSION {
            return Err(CryptoError::InvalidFormat(format!(
                "Unsupported wrapped key version: {}",
                bytes[0]
            )));
        }

        let mut id = [0u8; KEY_ID_LEN];
        id.copy_from_slice(&bytes[1..1 + KEY_ID_LEN]);
        let mut ephemeral = [0u8; KEY_BYTES];
        ephemeral.copy_from_slice(&bytes[1 + KEY_ID_LEN..WRAP_HEADER_LEN]);

        Ok(Self {
            recipient: KeyId::from_bytes(id),
            ephemeral: PublicKey::from_bytes(ephemeral),
            sealed: bytes[WRAP_HEADER_LEN..].to_vec(),
        })
    }
}

impl std::fmt::Debug for WrappedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WrappedKey")
            .field("recipient", &self.recipient)
            .field("ephemeral", &self.ephemeral)
            .finish_non_exhaustive()
    }
}

fn derive_kek(
    shared: &[u8; 32],
    ephemeral: &PublicKey,
    recipient: &PublicKey,
) -> CryptoResult<Kek> {
    let mut salt = [0u8; 2 * KEY_BYTES];
    salt[..KEY_BYTES].copy_from_slice(ephemeral.as_bytes());
    salt[KEY_BYTES..].copy_from_slice(recipient.as_bytes());

    let hkdf = Hkdf::<Sha256>::new(Some(&salt), shared);
    let mut okm = Zeroizing::new([0u8; KEY_LEN + NONCE_LEN]);
    hkdf.expand(HKDF_INFO_KEK, &mut okm[..])
        .map_err(|e| CryptoError::KeyDerivation(format!("HKDF expand failed: {}", e)))?;

    let mut kek = Kek {
        key: [0u8; KEY_LEN],
        nonce: [0u8; NONCE_LEN],
    };
    kek.key.copy_from_slice(&okm[..KEY_LEN]);
    kek.nonce.copy_from_slice(&okm[KEY_LEN..]);
    Ok(kek)
}

/// Seal `content_key` so only the holder of `recipient`'s private key can
/// recover it.
///
/// Fails with `Encryption` when `recipient` is a low-order point that would
/// make the shared secret predictable.
pub fn wrap_key(
    primitives: &dyn PrimitiveProvider,
    content_key: &[u8; KEY_LEN],
    recipient: &PublicKey,
) -> CryptoResult<WrappedKey> {
    let ephemeral = Keypair::generate(primitives)?;
    let shared = ephemeral
        .private
        .to_x25519()
        .diffie_hellman(&recipient.to_x25519());
    if !shared.was_contributory() {
        return Err(CryptoError::Encryption(
            "Recipient public key is not usable for key agreement".into(),
        ));
    }

    let kek = derive_kek(shared.as_bytes(), &ephemeral.public, recipient)?;
    let mut wrapped = WrappedKey {
        recipient: recipient.key_id(primitives),
        ephemeral: ephemeral.public,
        sealed: Vec::new(),
    };
    wrapped.sealed = aes_gcm_encrypt(&kek.key, &kek.nonce, &wrapped.header(), content_key)?;
    Ok(wrapped)
}

/// Recover the content key from `wrapped` with the recipient's private key.
///
/// Every failure, including a key that doesn't match, is `Decryption`.
pub fn unwrap_key(
    wrapped: &WrappedKey,
    private: &PrivateKey,
) -> CryptoResult<Zeroizing<[u8; KEY_LEN]>> {
    let shared = private
        .to_x25519()
        .diffie_hellman(&wrapped.ephemeral.to_x25519());
    if !shared.was_contributory() {
        return Err(CryptoError::Decryption(
            "Wrapped key carries an invalid ephemeral key".into(),
        ));
    }

    let kek = derive_kek(shared.as_bytes(), &wrapped.ephemeral, &private.public_key())?;
    let opened = Zeroizing::new(
        aes_gcm_decrypt(&kek.key, &kek.nonce, &wrapped.header(), &wrapped.sealed)
            .map_err(|_| CryptoError::Decryption("Content key could not be unwrapped".into()))?,
    );

    let mut key = Zeroizing::new([0u8; KEY_LEN]);
    if opened.len() != KEY_LEN {
        return Err(CryptoError::Decryption("Unwrapped key has wrong length".into()));
    }
    key.copy_from_slice(&opened);
    Ok(key)
}
