//! Append-only history of device keys.
//!
//! The newest entry is the active key: it is the one published and used for
//! new envelopes. Older entries stay available so envelopes sealed before a
//! rotation can still be opened.
//!
//! # Stored form
//!
//! ```json
//! {
//!   "version": 1,
//!   "active": "<key id hex>",
//!   "keys": [
//!     { "key_id": "<hex>", "private_key": "<base64>", "created_at": "<rfc3339>" }
//!   ]
//! }
//! ```
//!
//! A stored value of exactly 32 bytes is a pre-history single key slot and
//! loads as a one-entry history.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use zeroize::{Zeroize, ZeroizeOnDrop, Zeroizing};

use crate::error::{CryptoError, CryptoResult};
use crate::format::{base64_decode_array, base64_encode};
use crate::keys::keypair::{KeyId, PrivateKey, PublicKey, KEY_BYTES};
use crate::primitives::PrimitiveProvider;

/// Current stored history version.
pub const HISTORY_VERSION: u8 = 1;

/// One key in the history.
#[derive(Debug, Clone)]
pub struct KeyEntry {
    pub key_id: KeyId,
    pub private: PrivateKey,
    pub public: PublicKey,
    pub created_at: DateTime<Utc>,
}

impl KeyEntry {
    /// Build an entry for a private key, deriving its public key and id.
    pub fn new(primitives: &dyn PrimitiveProvider, private: PrivateKey) -> Self {
        let public = private.public_key();
        Self {
            key_id: public.key_id(primitives),
            private,
            public,
            created_at: Utc::now(),
        }
    }
}

/// Ordered key history, oldest first. Never empty.
#[derive(Debug, Clone)]
pub struct KeyHistory {
    entries: Vec<KeyEntry>,
}

#[derive(Serialize, Deserialize)]
struct StoredHistory {
    version: u8,
    active: KeyId,
    keys: Vec<StoredKey>,
}

#[derive(Serialize, Deserialize, Zeroize, ZeroizeOnDrop)]
struct StoredKey {
    #[zeroize(skip)]
    key_id: KeyId,
    private_key: String,
    #[zeroize(skip)]
    created_at: DateTime<Utc>,
}

impl KeyHistory {
    /// Start a history with a single key.
    pub fn new(first: KeyEntry) -> Self {
        Self {
            entries: vec![first],
        }
    }

    /// Append a key, make it active, and retire the oldest entries beyond
    /// `max_len`. Returns the ids of retired keys.
    pub fn push(&mut self, entry: KeyEntry, max_len: usize) -> Vec<KeyId> {
        self.entries.retain(|e| e.key_id != entry.key_id);
        self.entries.push(entry);

        let excess = self.entries.len().saturating_sub(max_len.max(1));
        self.entries
            .drain(..excess)
            .map(|retired| retired.key_id)
            .collect()
    }

    /// The active (newest) key.
    pub fn active(&self) -> &KeyEntry {
        // `entries` is never empty: constructed with one entry, and `push`
        // keeps at least the entry it just appended.
        &self.entries[self.entries.len() - 1]
    }

    /// Find a key by id.
    pub fn find(&self, key_id: &KeyId) -> Option<&KeyEntry> {
        self.entries.iter().find(|e| &e.key_id == key_id)
    }

    /// Ids of all keys, oldest first.
    pub fn key_ids(&self) -> Vec<KeyId> {
        self.entries.iter().map(|e| e.key_id).collect()
    }

    /// Number of keys in the history.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Always false; present for API symmetry with `len`.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Serialize for the secure store.
    pub fn encode(&self) -> CryptoResult<Zeroizing<Vec<u8>>> {
        let stored = StoredHistory {
            version: HISTORY_VERSION,
            active: self.active().key_id,
            keys: self
                .entries
                .iter()
                .map(|e| StoredKey {
                    key_id: e.key_id,
                    private_key: base64_encode(e.private.as_bytes()),
                    created_at: e.created_at,
                })
                .collect(),
        };
        Ok(Zeroizing::new(serde_json::to_vec(&stored)?))
    }

    /// Parse a stored history, verifying every key against its recorded id.
    pub fn decode(primitives: &dyn PrimitiveProvider, bytes: &[u8]) -> CryptoResult<Self> {
        if bytes.len() == KEY_BYTES {
            let mut raw = [0u8; KEY_BYTES];
            raw.copy_from_slice(bytes);
            let private = PrivateKey::from_bytes(raw);
            raw.zeroize();
            return Ok(Self::new(KeyEntry::new(primitives, private)));
        }

        let stored: StoredHistory = serde_json::from_slice(bytes)
            .map_err(|e| CryptoError::Storage(format!("Unreadable key history: {}", e)))?;

        if stored.version != HISTORY_VERSION {
            return Err(CryptoError::Storage(format!(
                "Unsupported key history version: {}",
                stored.version
            )));
        }

        let mut entries = Vec::with_capacity(stored.keys.len());
        for key in &stored.keys {
            let raw: Zeroizing<[u8; KEY_BYTES]> =
                Zeroizing::new(base64_decode_array(&key.private_key, "private key").map_err(
                    |_| CryptoError::Storage(format!("Stored key {} is malformed", key.key_id)),
                )?);
            let private = PrivateKey::from_bytes(*raw);
            let public = private.public_key();
            let key_id = public.key_id(primitives);
            if key_id != key.key_id {
                return Err(CryptoError::Storage(format!(
                    "Stored key {} failed integrity check - key material is corrupted",
                    key.key_id
                )));
            }
            entries.push(KeyEntry {
                key_id,
                private,
                public,
                created_at: key.created_at,
            });
        }

        match entries.last() {
            None => Err(CryptoError::Storage("Key history is empty".into())),
            Some(last) if last.key_id != stored.active => Err(CryptoError::Storage(format!(
                "Active key {} is not the newest history entry",
                stored.active
            ))),
            Some(_) => Ok(Self { entries }),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::NativePrimitives;

    fn entry(p: &NativePrimitives) -> KeyEntry {
        KeyEntry::new(p, PrivateKey::generate(p).unwrap())
    }

    #[test]
    fn test_push_makes_newest_active() {
        let p = NativePrimitives::new();
        let first = entry(&p);
        let second = entry(&p);
        let second_id = second.key_id;

        let mut history = KeyHistory::new(first);
        let retired = history.push(second, 8);

        assert!(retired.is_empty());
        assert_eq!(history.len(), 2);
        assert_eq!(history.active().key_id, second_id);
    }

    #[test]
    fn test_push_retires_oldest() {
        let p = NativePrimitives::new();
        let first = entry(&p);
        let first_id = first.key_id;
        let mut history = KeyHistory::new(first);

        history.push(entry(&p), 2);
        let retired = history.push(entry(&p), 2);

        assert_eq!(retired, vec![first_id]);
        assert_eq!(history.len(), 2);
        assert!(history.find(&first_id).is_none());
    }

    #[test]
    fn test_push_never_retires_active() {
        let p = NativePrimitives::new();
        let mut history = KeyHistory::new(entry(&p));
        let newest = entry(&p);
        let newest_id = newest.key_id;

        history.push(newest, 0);

        assert_eq!(history.len(), 1);
        assert_eq!(history.active().key_id, newest_id);
    }

    #[test]
    fn test_encode_decode_preserves_order_and_keys() {
        let p = NativePrimitives::new();
        let mut history = KeyHistory::new(entry(&p));
        history.push(entry(&p), 8);

        let encoded = history.encode().unwrap();
        let decoded = KeyHistory::decode(&p, &encoded).unwrap();

        assert_eq!(decoded.key_ids(), history.key_ids());
        assert_eq!(
            decoded.active().private.as_bytes(),
            history.active().private.as_bytes()
        );
    }

    #[test]
    fn test_decode_legacy_single_slot() {
        let p = NativePrimitives::new();
        let private = PrivateKey::generate(&p).unwrap();
        let expected = private.public_key();

        let history = KeyHistory::decode(&p, private.as_bytes()).unwrap();

        assert_eq!(history.len(), 1);
        assert_eq!(history.active().public, expected);
    }

    #[test]
    fn test_decode_detects_corrupted_key() {
        let p = NativePrimitives::new();
        let history = KeyHistory::new(entry(&p));
        let encoded = history.encode().unwrap();

        let mut value: serde_json::Value = serde_json::from_slice(&encoded).unwrap();
        value["keys"][0]["private_key"] = serde_json::Value::String(base64_encode(&[9u8; 32]));
        let tampered = serde_json::to_vec(&value).unwrap();

        let err = KeyHistory::decode(&p, &tampered).unwrap_err();
        assert!(matches!(err, CryptoError::Storage(_)));
        assert!(err.to_string().contains("corrupted"));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        let p = NativePrimitives::new();
        assert!(KeyHistory::decode(&p, b"{ not json").is_err());
        assert!(KeyHistory::decode(&p, b"").is_err());
    }

    #[test]
    fn test_encoded_history_has_no_raw_key_bytes_in_debug() {
        let p = NativePrimitives::new();
        let history = KeyHistory::new(entry(&p));
        let debug = format!("{:?}", history);
        assert!(debug.contains("REDACTED"));
    }
}
