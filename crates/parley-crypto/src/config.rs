//! Runtime configuration for the encryption subsystem.

use std::path::PathBuf;
use std::str::FromStr;

use zeroize::Zeroizing;

use crate::error::CryptoError;
use crate::kdf::KdfParams;

/// Secure-store entry holding the device key history.
pub const DEFAULT_KEY_SLOT: &str = "device-private-key";

/// Credential-store service name.
pub const DEFAULT_SERVICE_NAME: &str = "parley";

/// Keys kept for decrypting envelopes sealed before a rotation.
pub const DEFAULT_MAX_KEY_HISTORY: usize = 8;

/// Upper bound accepted for `max_key_history`.
pub const MAX_KEY_HISTORY_LIMIT: usize = 64;

/// Which secure store backs the device key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum StoreBackend {
    /// OS keyring, then file store (if configured), then memory.
    #[default]
    Auto,
    /// OS keyring only; fail if unavailable.
    Keyring,
    /// Passphrase-sealed files in `key_dir`.
    File,
    /// Process memory; keys are lost on restart.
    Memory,
}

impl FromStr for StoreBackend {
    type Err = CryptoError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "keyring" | "os" => Ok(Self::Keyring),
            "file" => Ok(Self::File),
            "memory" | "mem" => Ok(Self::Memory),
            other => Err(CryptoError::Config(format!("unknown store backend: {}", other))),
        }
    }
}

/// Encryption subsystem configuration.
#[derive(Clone)]
pub struct CryptoConfig {
    /// Secure store selection.
    pub store: StoreBackend,
    /// Service name under which keyring entries are created.
    pub service_name: String,
    /// Secure-store entry key for the device key history.
    pub key_slot: String,
    /// Directory for the file store.
    pub key_dir: Option<PathBuf>,
    /// Passphrase sealing the file store.
    pub passphrase: Option<Zeroizing<String>>,
    /// Number of device keys retained across rotations (1..=64).
    pub max_key_history: usize,
    /// Accept a non-cryptographic RNG when the OS source is unavailable.
    pub allow_degraded_random: bool,
    /// Argon2id parameters for newly sealed file-store entries.
    /// Existing entries keep the parameters recorded in their header.
    pub kdf: KdfParams,
}

impl Default for CryptoConfig {
    fn default() -> Self {
        Self {
            store: StoreBackend::Auto,
            service_name: DEFAULT_SERVICE_NAME.to_string(),
            key_slot: DEFAULT_KEY_SLOT.to_string(),
            key_dir: None,
            passphrase: None,
            max_key_history: DEFAULT_MAX_KEY_HISTORY,
            allow_degraded_random: true,
            kdf: KdfParams::default(),
        }
    }
}

impl std::fmt::Debug for CryptoConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CryptoConfig")
            .field("store", &self.store)
            .field("service_name", &self.service_name)
            .field("key_slot", &self.key_slot)
            .field("key_dir", &self.key_dir)
            .field("passphrase", &self.passphrase.as_ref().map(|_| "[REDACTED]"))
            .field("max_key_history", &self.max_key_history)
            .field("allow_degraded_random", &self.allow_degraded_random)
            .field("kdf", &self.kdf)
            .finish()
    }
}

impl CryptoConfig {
    /// Load configuration from environment variables with fallback to defaults.
    pub fn from_env() -> Self {
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Build configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("PARLEY_CRYPTO_STORE") {
            match val.parse::<StoreBackend>() {
                Ok(store) => config.store = store,
                Err(_) => {
                    tracing::warn!(value = %val, "Invalid PARLEY_CRYPTO_STORE, using default")
                }
            }
        }

        if let Some(val) = lookup("PARLEY_CRYPTO_SERVICE") {
            if !val.trim().is_empty() {
                config.service_name = val.trim().to_string();
            }
        }

        if let Some(val) = lookup("PARLEY_CRYPTO_KEY_SLOT") {
            if !val.trim().is_empty() {
                config.key_slot = val.trim().to_string();
            }
        }

        if let Some(val) = lookup("PARLEY_CRYPTO_KEY_DIR") {
            if !val.trim().is_empty() {
                config.key_dir = Some(PathBuf::from(val.trim()));
            }
        }

        if let Some(val) = lookup("PARLEY_CRYPTO_PASSPHRASE") {
            if !val.is_empty() {
                config.passphrase = Some(Zeroizing::new(val));
            }
        }

        if let Some(val) = lookup("PARLEY_CRYPTO_MAX_KEY_HISTORY") {
            match val.trim().parse::<usize>() {
                Ok(n) => config.max_key_history = n.clamp(1, MAX_KEY_HISTORY_LIMIT),
                Err(_) => tracing::warn!(
                    value = %val,
                    "Invalid PARLEY_CRYPTO_MAX_KEY_HISTORY, using default"
                ),
            }
        }

        if let Some(val) = lookup("PARLEY_CRYPTO_KDF") {
            match val.trim().to_ascii_lowercase().as_str() {
                "default" => config.kdf = KdfParams::default(),
                "low-memory" | "low_memory" => config.kdf = KdfParams::low_memory(),
                _ => tracing::warn!(value = %val, "Invalid PARLEY_CRYPTO_KDF, using default"),
            }
        }

        if let Some(val) = lookup("PARLEY_CRYPTO_ALLOW_DEGRADED_RANDOM") {
            config.allow_degraded_random = val != "false" && val != "0";
        }

        config
    }
}
