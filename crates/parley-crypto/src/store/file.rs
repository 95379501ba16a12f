//! Passphrase-sealed file store.
//!
//! Each entry is one file in the store directory, named by the hex of the
//! entry key, sealed with AES-256-GCM under an Argon2id-derived key.
//!
//! # Format: PCSTORE1
//!
//! ```text
//! +------------------+
//! | Magic: PCSTORE1  | 8 bytes
//! +------------------+
//! | Header Length    | 4 bytes (little-endian)
//! +------------------+
//! | Header (JSON)    | Variable
//! +------------------+
//! | Sealed Value     | value length + 16-byte auth tag
//! +------------------+
//! ```
//!
//! The entry key is bound as associated data, so a sealed file renamed to
//! another entry fails to open.

use std::io::Write;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use zeroize::Zeroizing;

use crate::cipher::{aes_gcm_decrypt, aes_gcm_encrypt, NONCE_LEN, TAG_LEN};
use crate::error::{CryptoError, CryptoResult};
use crate::format::{base64_decode_array, base64_encode};
use crate::kdf::{derive_key, validate_passphrase, KdfParams, SALT_LEN};
use crate::primitives::{random_array, NativePrimitives, PrimitiveProvider};
use crate::store::SecureStore;

/// Magic bytes for sealed store files.
pub const MAGIC_STORE: &[u8; 8] = b"PCSTORE1";

/// Header of a sealed store file.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct SealedHeader {
    /// Format version.
    version: u8,
    /// KDF algorithm (always "argon2id").
    kdf: String,
    /// KDF parameters.
    kdf_params: KdfParams,
    /// Salt for key derivation (base64).
    salt: String,
    /// Nonce for encryption (base64).
    nonce: String,
    /// Creation timestamp.
    created_at: DateTime<Utc>,
}

/// Secrets sealed into files under a directory.
pub struct FileStore {
    dir: PathBuf,
    passphrase: Arc<Zeroizing<String>>,
    kdf: KdfParams,
    primitives: Arc<dyn PrimitiveProvider>,
}

impl FileStore {
    /// Create a store rooted at `dir`. The directory is created on first write.
    pub fn new(dir: impl AsRef<Path>, passphrase: &str, kdf: KdfParams) -> CryptoResult<Self> {
        validate_passphrase(passphrase)?;
        Ok(Self {
            dir: dir.as_ref().to_path_buf(),
            passphrase: Arc::new(Zeroizing::new(passphrase.to_string())),
            kdf,
            primitives: Arc::new(NativePrimitives::new()),
        })
    }

    /// Use a specific randomness provider for salts and nonces.
    pub fn with_primitives(mut self, primitives: Arc<dyn PrimitiveProvider>) -> Self {
        self.primitives = primitives;
        self
    }

    fn entry_path(&self, key: &str) -> PathBuf {
        self.dir.join(format!("{}.sealed", hex::encode(key.as_bytes())))
    }
}

impl std::fmt::Debug for FileStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FileStore")
            .field("dir", &self.dir)
            .field("passphrase", &"[REDACTED]")
            .field("kdf", &self.kdf)
            .finish()
    }
}

/// Seal `value` into PCSTORE1 bytes.
fn seal_value(
    value: &[u8],
    aad: &[u8],
    passphrase: &str,
    params: &KdfParams,
    salt: [u8; SALT_LEN],
    nonce: [u8; NONCE_LEN],
) -> CryptoResult<Vec<u8>> {
    let derived = derive_key(passphrase.as_bytes(), &salt, params)?;
    let ciphertext = aes_gcm_encrypt(derived.as_bytes(), &nonce, aad, value)?;

    let header = SealedHeader {
        version: 1,
        kdf: "argon2id".to_string(),
        kdf_params: params.clone(),
        salt: base64_encode(&salt),
        nonce: base64_encode(&nonce),
        created_at: Utc::now(),
    };

    let header_json = serde_json::to_vec(&header)
        .map_err(|e| CryptoError::Encryption(format!("Header serialization failed: {}", e)))?;
    let header_len = (header_json.len() as u32).to_le_bytes();

    let mut output = Vec::with_capacity(8 + 4 + header_json.len() + ciphertext.len());
    output.extend_from_slice(MAGIC_STORE);
    output.extend_from_slice(&header_len);
    output.extend_from_slice(&header_json);
    output.extend_from_slice(&ciphertext);

    Ok(output)
}

/// Open PCSTORE1 bytes produced by [`seal_value`].
fn open_value(sealed: &[u8], aad: &[u8], passphrase: &str) -> CryptoResult<Zeroizing<Vec<u8>>> {
    if sealed.len() < 12 + TAG_LEN {
        return Err(CryptoError::InvalidFormat("Sealed file too short".to_string()));
    }

    if &sealed[0..8] != MAGIC_STORE {
        return Err(CryptoError::InvalidFormat(
            "Invalid magic bytes - not a sealed store file".to_string(),
        ));
    }

    let header_len = u32::from_le_bytes([sealed[8], sealed[9], sealed[10], sealed[11]]) as usize;

    if sealed.len() < 12 + header_len + TAG_LEN {
        return Err(CryptoError::InvalidFormat("Sealed file truncated".to_string()));
    }

    let header: SealedHeader = serde_json::from_slice(&sealed[12..12 + header_len])
        .map_err(|e| CryptoError::InvalidFormat(format!("Invalid header: {}", e)))?;

    if header.version != 1 || header.kdf != "argon2id" {
        return Err(CryptoError::InvalidFormat(format!(
            "Unsupported sealed file: version {}, kdf {}",
            header.version, header.kdf
        )));
    }

    let salt: [u8; SALT_LEN] = base64_decode_array(&header.salt, "salt")?;
    let nonce: [u8; NONCE_LEN] = base64_decode_array(&header.nonce, "nonce")?;

    let derived = derive_key(passphrase.as_bytes(), &salt, &header.kdf_params)?;
    let value = aes_gcm_decrypt(derived.as_bytes(), &nonce, aad, &sealed[12 + header_len..])
        .map_err(|_| {
            CryptoError::Decryption("Wrong passphrase or corrupted sealed file".to_string())
        })?;

    Ok(Zeroizing::new(value))
}

/// Write `data` to `tmp` (owner-only on unix), then rename it over `path`.
///
/// The temporary file is removed on every failure.
fn write_atomically(tmp: &Path, path: &Path, data: &[u8]) -> std::io::Result<()> {
    let result = write_private(tmp, data).and_then(|()| std::fs::rename(tmp, path));
    if result.is_err() {
        let _ = std::fs::remove_file(tmp);
    }
    result
}

fn write_private(path: &Path, data: &[u8]) -> std::io::Result<()> {
    let mut options = std::fs::OpenOptions::new();
    options.write(true).create_new(true);
    #[cfg(unix)]
    {
        use std::os::unix::fs::OpenOptionsExt;
        options.mode(0o600);
    }
    let mut file = options.open(path)?;
    file.write_all(data)?;
    file.sync_all()
}

async fn run_blocking<T, F>(f: F) -> CryptoResult<T>
where
    F: FnOnce() -> CryptoResult<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| CryptoError::Storage(format!("Sealing task failed: {}", e)))?
}

#[async_trait]
impl SecureStore for FileStore {
    async fn set(&self, key: &str, value: &[u8]) -> CryptoResult<()> {
        let salt: [u8; SALT_LEN] = random_array(self.primitives.as_ref())?;
        let nonce: [u8; NONCE_LEN] = random_array(self.primitives.as_ref())?;
        let suffix: [u8; 8] = random_array(self.primitives.as_ref())?;

        let passphrase = Arc::clone(&self.passphrase);
        let params = self.kdf.clone();
        let aad = key.as_bytes().to_vec();
        let value = Zeroizing::new(value.to_vec());
        let sealed = run_blocking(move || {
            seal_value(&value, &aad, passphrase.as_str(), &params, salt, nonce)
        })
        .await?;

        fs::create_dir_all(&self.dir).await?;

        // Readers see either the previous entry or the new one, never a partial write.
        let path = self.entry_path(key);
        let tmp = path.with_extension(format!("tmp-{}", hex::encode(suffix)));
        run_blocking(move || write_atomically(&tmp, &path, &sealed).map_err(CryptoError::from))
            .await
    }

    async fn get(&self, key: &str) -> CryptoResult<Option<Zeroizing<Vec<u8>>>> {
        let sealed = match fs::read(self.entry_path(key)).await {
            Ok(data) => data,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let passphrase = Arc::clone(&self.passphrase);
        let aad = key.as_bytes().to_vec();
        let value = run_blocking(move || open_value(&sealed, &aad, passphrase.as_str()))
            .await
            .map_err(|e| CryptoError::Storage(format!("Cannot unseal entry: {}", e)))?;
        Ok(Some(value))
    }

    async fn delete(&self, key: &str) -> CryptoResult<()> {
        match fs::remove_file(self.entry_path(key)).await {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    fn is_persistent(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "file"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    const PASSPHRASE: &str = "correct horse battery";

    fn store(dir: &Path) -> FileStore {
        FileStore::new(dir, PASSPHRASE, KdfParams::insecure_fast()).unwrap()
    }

    #[tokio::test]
    async fn test_set_get_roundtrip() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        store.set("device-private-key", &[42u8; 32]).await.unwrap();
        let value = store.get("device-private-key").await.unwrap().unwrap();

        assert_eq!(value.as_slice(), &[42u8; 32]);
    }

    #[tokio::test]
    async fn test_value_survives_new_instance() {
        let dir = tempdir().unwrap();
        store(dir.path()).set("slot", b"persisted").await.unwrap();

        let reopened = store(dir.path());
        let value = reopened.get("slot").await.unwrap().unwrap();
        assert_eq!(value.as_slice(), b"persisted");
    }

    #[tokio::test]
    async fn test_file_is_sealed_at_rest() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.set("slot", b"plaintext-marker").await.unwrap();

        let raw = std::fs::read(store.entry_path("slot")).unwrap();
        assert_eq!(&raw[0..8], MAGIC_STORE);
        assert!(!raw
            .windows(b"plaintext-marker".len())
            .any(|w| w == b"plaintext-marker"));
    }

    #[tokio::test]
    async fn test_wrong_passphrase() {
        let dir = tempdir().unwrap();
        store(dir.path()).set("slot", b"secret").await.unwrap();

        let other =
            FileStore::new(dir.path(), "a different passphrase", KdfParams::insecure_fast())
                .unwrap();
        let result = other.get("slot").await;
        assert!(matches!(result, Err(CryptoError::Storage(_))));
    }

    #[tokio::test]
    async fn test_renamed_file_does_not_open() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.set("slot-a", b"secret").await.unwrap();

        std::fs::rename(store.entry_path("slot-a"), store.entry_path("slot-b")).unwrap();
        assert!(store.get("slot-b").await.is_err());
    }

    #[tokio::test]
    async fn test_tampered_file() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.set("slot", b"secret").await.unwrap();

        let path = store.entry_path("slot");
        let mut raw = std::fs::read(&path).unwrap();
        let last = raw.len() - 1;
        raw[last] ^= 0xFF;
        std::fs::write(&path, raw).unwrap();

        assert!(store.get("slot").await.is_err());
    }

    #[tokio::test]
    async fn test_missing_and_delete_idempotent() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        assert!(store.get("slot").await.unwrap().is_none());
        store.delete("slot").await.unwrap();

        store.set("slot", b"x").await.unwrap();
        store.delete("slot").await.unwrap();
        store.delete("slot").await.unwrap();
        assert!(store.get("slot").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_no_temp_files_left_behind() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.set("slot", b"one").await.unwrap();
        store.set("slot", b"two").await.unwrap();

        let names: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(names.len(), 1);
        assert!(names[0].ends_with(".sealed"));
    }

    #[test]
    fn test_short_passphrase_rejected() {
        let dir = tempdir().unwrap();
        let result = FileStore::new(dir.path(), "short", KdfParams::insecure_fast());
        assert!(matches!(result, Err(CryptoError::PassphraseTooShort(_))));
    }

    #[test]
    fn test_open_value_invalid_magic() {
        let mut data = vec![0u8; 100];
        data[0..8].copy_from_slice(b"INVALID!");
        let result = open_value(&data, b"", PASSPHRASE);
        assert!(matches!(result, Err(CryptoError::InvalidFormat(_))));
    }

    #[tokio::test]
    async fn test_failed_rename_removes_temp_file() {
        let dir = tempdir().unwrap();
        let store = store(dir.path());

        // A directory where the entry file should go makes the rename fail.
        std::fs::create_dir(store.entry_path("slot")).unwrap();
        std::fs::write(store.entry_path("slot").join("occupant"), b"x").unwrap();

        assert!(store.set("slot", b"value").await.is_err());

        let leftovers: Vec<_> = std::fs::read_dir(dir.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .filter(|name| name.contains(".tmp-"))
            .collect();
        assert!(leftovers.is_empty(), "temp files left: {:?}", leftovers);
    }

    #[cfg(unix)]
    #[tokio::test]
    async fn test_entry_is_owner_only() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempdir().unwrap();
        let store = store(dir.path());
        store.set("slot", b"value").await.unwrap();

        let mode = std::fs::metadata(store.entry_path("slot"))
            .unwrap()
            .permissions()
            .mode();
        assert_eq!(mode & 0o777, 0o600);
    }

    #[test]
    fn test_debug_redacts_passphrase() {
        let dir = tempdir().unwrap();
        let debug = format!("{:?}", store(dir.path()));
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains(PASSPHRASE));
    }
}
