//! X25519 device keys and key ids.
//!
//! - The private key is 32 random bytes, zeroized on drop.
//! - The public key is the X25519 base-point multiple of the private key, so
//!   it is a pure function of the stored private key.
//! - A [`KeyId`] names a public key inside wrapped envelope keys.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use x25519_dalek::{PublicKey as X25519Public, StaticSecret};
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{CryptoError, CryptoResult};
use crate::format::{base64_decode, base64_encode};
use crate::primitives::{random_array, PrimitiveProvider};

/// Key length in bytes (both halves).
pub const KEY_BYTES: usize = 32;

/// Length of a [`KeyId`] in bytes.
pub const KEY_ID_LEN: usize = 8;

/// X25519 public key (32 bytes).
///
/// Safe to publish. Exchanged with other devices as standard base64 text.
#[derive(Clone, PartialEq, Eq)]
pub struct PublicKey([u8; KEY_BYTES]);

impl PublicKey {
    /// Create a public key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_BYTES]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes of the public key.
    pub fn as_bytes(&self) -> &[u8; KEY_BYTES] {
        &self.0
    }

    /// Parse the base64 form published by the key directory.
    pub fn from_base64(encoded: &str) -> CryptoResult<Self> {
        let bytes = base64_decode(encoded)
            .map_err(|_| CryptoError::InvalidKey("public key is not valid base64".into()))?;
        let arr: [u8; KEY_BYTES] = bytes.as_slice().try_into().map_err(|_| {
            CryptoError::InvalidKey(format!(
                "public key must be {} bytes, got {}",
                KEY_BYTES,
                bytes.len()
            ))
        })?;
        Ok(Self(arr))
    }

    /// Standard base64 encoding of the key.
    pub fn to_base64(&self) -> String {
        base64_encode(&self.0)
    }

    /// Key id of this public key under the provider's hash.
    pub fn key_id(&self, primitives: &dyn PrimitiveProvider) -> KeyId {
        KeyId::derive(primitives, self)
    }

    pub(crate) fn to_x25519(&self) -> X25519Public {
        X25519Public::from(self.0)
    }
}

impl fmt::Debug for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "PublicKey({})", hex::encode(&self.0[..8]))
    }
}

impl fmt::Display for PublicKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.to_base64())
    }
}

impl FromStr for PublicKey {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_base64(s)
    }
}

impl Serialize for PublicKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_base64())
    }
}

impl<'de> Deserialize<'de> for PublicKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Self::from_base64(&s).map_err(serde::de::Error::custom)
    }
}

/// X25519 private key (32 bytes) with automatic zeroization.
///
/// Never leaves the device except through the [`SecureStore`](crate::store::SecureStore).
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct PrivateKey([u8; KEY_BYTES]);

impl PrivateKey {
    /// Create a private key from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_BYTES]) -> Self {
        Self(bytes)
    }

    /// Draw a fresh private key from the provider.
    pub fn generate(primitives: &dyn PrimitiveProvider) -> CryptoResult<Self> {
        Ok(Self(random_array(primitives)?))
    }

    /// Get the raw bytes of the private key.
    pub fn as_bytes(&self) -> &[u8; KEY_BYTES] {
        &self.0
    }

    /// Derive the corresponding public key.
    pub fn public_key(&self) -> PublicKey {
        let public = X25519Public::from(&self.to_x25519());
        PublicKey(*public.as_bytes())
    }

    pub(crate) fn to_x25519(&self) -> StaticSecret {
        StaticSecret::from(self.0)
    }
}

impl Clone for PrivateKey {
    fn clone(&self) -> Self {
        Self(self.0)
    }
}

impl fmt::Debug for PrivateKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PrivateKey")
            .field("key", &"[REDACTED]")
            .finish()
    }
}

/// A private key together with its derived public key.
pub struct Keypair {
    /// The public key (can be shared).
    pub public: PublicKey,
    /// The private key (must be kept secret).
    pub private: PrivateKey,
}

impl Keypair {
    /// Generate a new random keypair from the provider.
    pub fn generate(primitives: &dyn PrimitiveProvider) -> CryptoResult<Self> {
        Ok(Self::from_private(PrivateKey::generate(primitives)?))
    }

    /// Create a keypair from an existing private key.
    pub fn from_private(private: PrivateKey) -> Self {
        let public = private.public_key();
        Self { public, private }
    }
}

impl fmt::Debug for Keypair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Keypair")
            .field("public", &self.public)
            .field("private", &"[REDACTED]")
            .finish()
    }
}

/// Short identifier of a public key: the first 8 bytes of its hash.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct KeyId([u8; KEY_ID_LEN]);

impl KeyId {
    /// Derive the id of a public key.
    pub fn derive(primitives: &dyn PrimitiveProvider, public: &PublicKey) -> Self {
        let digest = primitives.hash(public.as_bytes());
        let mut id = [0u8; KEY_ID_LEN];
        id.copy_from_slice(&digest[..KEY_ID_LEN]);
        Self(id)
    }

    /// Create a key id from raw bytes.
    pub fn from_bytes(bytes: [u8; KEY_ID_LEN]) -> Self {
        Self(bytes)
    }

    /// Get the raw bytes of the key id.
    pub fn as_bytes(&self) -> &[u8; KEY_ID_LEN] {
        &self.0
    }
}

impl fmt::Debug for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyId({})", hex::encode(self.0))
    }
}

impl fmt::Display for KeyId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&hex::encode(self.0))
    }
}

impl FromStr for KeyId {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bytes = hex::decode(s).map_err(|e| CryptoError::InvalidFormat(e.to_string()))?;
        let arr: [u8; KEY_ID_LEN] = bytes
            .as_slice()
            .try_into()
            .map_err(|_| CryptoError::InvalidFormat(format!("key id must be {} bytes", KEY_ID_LEN)))?;
        Ok(Self(arr))
    }
}

impl Serialize for KeyId {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.to_string())
    }
}

impl<'de> Deserialize<'de> for KeyId {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::NativePrimitives;

    #[test]
    fn test_keypair_generation() {
        let p = NativePrimitives::new();
        let kp1 = Keypair::generate(&p).unwrap();
        let kp2 = Keypair::generate(&p).unwrap();

        assert_ne!(kp1.public.as_bytes(), kp2.public.as_bytes());
        assert_ne!(kp1.private.as_bytes(), kp2.private.as_bytes());
    }

    #[test]
    fn test_private_key_derives_public() {
        let kp = Keypair::generate(&NativePrimitives::new()).unwrap();
        assert_eq!(kp.public, kp.private.public_key());
        assert_eq!(kp.private.public_key(), kp.private.public_key());
    }

    #[test]
    fn test_public_key_base64_roundtrip() {
        let kp = Keypair::generate(&NativePrimitives::new()).unwrap();
        let encoded = kp.public.to_base64();
        let parsed: PublicKey = encoded.parse().unwrap();
        assert_eq!(parsed, kp.public);
        assert_eq!(kp.public.to_string(), encoded);
    }

    #[test]
    fn test_public_key_rejects_wrong_length() {
        let encoded = base64_encode(&[1u8; 31]);
        let result = PublicKey::from_base64(&encoded);
        assert!(matches!(result, Err(CryptoError::InvalidKey(_))));
    }

    #[test]
    fn test_public_key_rejects_garbage() {
        let result = PublicKey::from_base64("%%% not a key %%%");
        assert!(matches!(result, Err(CryptoError::InvalidKey(_))));
    }

    #[test]
    fn test_public_key_serialization() {
        let kp = Keypair::generate(&NativePrimitives::new()).unwrap();
        let json = serde_json::to_string(&kp.public).unwrap();
        let parsed: PublicKey = serde_json::from_str(&json).unwrap();
        assert_eq!(kp.public, parsed);
    }

    #[test]
    fn test_key_id_stable_and_distinct() {
        let p = NativePrimitives::new();
        let a = Keypair::generate(&p).unwrap();
        let b = Keypair::generate(&p).unwrap();

        assert_eq!(a.public.key_id(&p), a.public.key_id(&p));
        assert_ne!(a.public.key_id(&p), b.public.key_id(&p));
    }

    #[test]
    fn test_key_id_string_roundtrip() {
        let p = NativePrimitives::new();
        let id = Keypair::generate(&p).unwrap().public.key_id(&p);
        let text = id.to_string();
        assert_eq!(text.len(), KEY_ID_LEN * 2);
        assert_eq!(text.parse::<KeyId>().unwrap(), id);
        assert!("abc".parse::<KeyId>().is_err());
    }

    #[test]
    fn test_private_key_debug_redacted() {
        let kp = Keypair::generate(&NativePrimitives::new()).unwrap();
        let debug = format!("{:?}", kp.private);
        assert!(debug.contains("REDACTED"));

        let debug = format!("{:?}", kp);
        assert!(debug.contains("PublicKey"));
        assert!(debug.contains("REDACTED"));
    }

    #[test]
    fn test_private_key_clone() {
        let kp = Keypair::generate(&NativePrimitives::new()).unwrap();
        let cloned = kp.private.clone();
        assert_eq!(kp.private.as_bytes(), cloned.as_bytes());
    }
}
