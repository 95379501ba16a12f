//! Device key material and its lifecycle.
//!
//! - [`keypair`] - X25519 key types and key ids
//! - [`history`] - append-only history of device keys, as stored
//! - [`manager`] - generation, lookup and deletion through a secure store

pub mod history;
pub mod keypair;
pub mod manager;

pub use history::{KeyEntry, KeyHistory, HISTORY_VERSION};
pub use keypair::{KeyId, Keypair, PrivateKey, PublicKey, KEY_BYTES, KEY_ID_LEN};
pub use manager::KeyManager;
