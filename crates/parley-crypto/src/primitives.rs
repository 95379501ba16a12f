//! Randomness and hash primitives.
//!
//! A [`PrimitiveProvider`] is chosen once at composition time by
//! [`select_primitives`]. The native provider draws from the OS CSPRNG; the
//! fallback provider is only used when the OS source is unreachable and
//! reports itself as degraded.
//!
//! The hash function is SHA-256 for every provider. Key ids derived from it
//! are computed independently by sender and recipient, so the two sides must
//! agree regardless of which provider each device selected.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{SystemTime, UNIX_EPOCH};

use rand::rngs::{OsRng, SmallRng};
use rand::{RngCore, SeedableRng};
use sha2::{Digest, Sha256};
use tracing::{debug, warn};

use crate::error::{CryptoError, CryptoResult};

/// Digest width of [`PrimitiveProvider::hash`].
pub const HASH_LEN: usize = 32;

/// Source of random bytes and the one-way hash used for key ids.
pub trait PrimitiveProvider: Send + Sync {
    /// Fill `buf` with random bytes suitable for key and IV material.
    fn fill_random(&self, buf: &mut [u8]) -> CryptoResult<()>;

    /// Return `n` random bytes.
    fn random_bytes(&self, n: usize) -> CryptoResult<Vec<u8>> {
        let mut bytes = vec![0u8; n];
        self.fill_random(&mut bytes)?;
        Ok(bytes)
    }

    /// Deterministic one-way hash (SHA-256).
    fn hash(&self, data: &[u8]) -> [u8; HASH_LEN] {
        sha256(data)
    }

    /// True when randomness is not cryptographically strong.
    fn is_degraded(&self) -> bool;

    /// Human-readable name for diagnostics.
    fn name(&self) -> &'static str;
}

/// SHA-256 digest of `data`.
pub fn sha256(data: &[u8]) -> [u8; HASH_LEN] {
    let digest = Sha256::digest(data);
    let mut out = [0u8; HASH_LEN];
    out.copy_from_slice(&digest);
    out
}

/// Draw a fixed-size random array from a provider.
pub fn random_array<const N: usize>(provider: &dyn PrimitiveProvider) -> CryptoResult<[u8; N]> {
    let mut bytes = [0u8; N];
    provider.fill_random(&mut bytes)?;
    Ok(bytes)
}

/// OS-backed CSPRNG (getrandom).
#[derive(Debug, Default, Clone, Copy)]
pub struct NativePrimitives;

impl NativePrimitives {
    pub fn new() -> Self {
        Self
    }
}

impl PrimitiveProvider for NativePrimitives {
    fn fill_random(&self, buf: &mut [u8]) -> CryptoResult<()> {
        OsRng
            .try_fill_bytes(buf)
            .map_err(|e| CryptoError::PrimitiveUnavailable(format!("OS random source: {}", e)))
    }

    fn is_degraded(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "os-csprng"
    }
}

/// Non-cryptographic generator for environments without an OS random source.
///
/// Output is predictable to an attacker who can guess the seed. Keys
/// generated through this provider should be regenerated once a native
/// source becomes available.
pub struct FallbackPrimitives {
    rng: Mutex<SmallRng>,
}

static FALLBACK_SEQ: AtomicU64 = AtomicU64::new(0);

impl FallbackPrimitives {
    pub fn new() -> Self {
        let nanos = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_nanos() as u64)
            .unwrap_or_default();
        let seq = FALLBACK_SEQ.fetch_add(1, Ordering::Relaxed);
        let seed = nanos ^ (u64::from(std::process::id()) << 32) ^ seq.rotate_left(17);

        warn!(
            subsystem = "crypto",
            component = "primitives",
            "OS random source unavailable; using non-cryptographic fallback generator (security degraded)"
        );

        Self {
            rng: Mutex::new(SmallRng::seed_from_u64(seed)),
        }
    }
}

impl Default for FallbackPrimitives {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for FallbackPrimitives {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FallbackPrimitives").finish_non_exhaustive()
    }
}

impl PrimitiveProvider for FallbackPrimitives {
    fn fill_random(&self, buf: &mut [u8]) -> CryptoResult<()> {
        // A panic while holding the lock leaves the generator state intact.
        let mut rng = self.rng.lock().unwrap_or_else(|p| p.into_inner());
        rng.fill_bytes(buf);
        Ok(())
    }

    fn is_degraded(&self) -> bool {
        true
    }

    fn name(&self) -> &'static str {
        "fallback-smallrng"
    }
}

/// Select the best available provider.
///
/// Tests the OS random source once. When it fails, returns the fallback
/// provider if `allow_degraded` is set, otherwise `PrimitiveUnavailable`.
pub fn select_primitives(allow_degraded: bool) -> CryptoResult<Arc<dyn PrimitiveProvider>> {
    select_from(Arc::new(NativePrimitives::new()), allow_degraded)
}

pub(crate) fn select_from(
    candidate: Arc<dyn PrimitiveProvider>,
    allow_degraded: bool,
) -> CryptoResult<Arc<dyn PrimitiveProvider>> {
    let mut sample = [0u8; 32];
    match candidate.fill_random(&mut sample) {
        Ok(()) => {
            debug!(
                subsystem = "crypto",
                component = "primitives",
                provider = candidate.name(),
                "Selected primitive provider"
            );
            Ok(candidate)
        }
        Err(e) if allow_degraded => {
            warn!(
                subsystem = "crypto",
                component = "primitives",
                provider = candidate.name(),
                error = %e,
                "Native primitives unavailable, falling back"
            );
            Ok(Arc::new(FallbackPrimitives::new()))
        }
        Err(e) => Err(e),
    }
}

/// Provider whose random source always fails.
#[cfg(test)]
#[derive(Debug, Default, Clone, Copy)]
pub(crate) struct BrokenRng;

#[cfg(test)]
impl PrimitiveProvider for BrokenRng {
    fn fill_random(&self, _buf: &mut [u8]) -> CryptoResult<()> {
        Err(CryptoError::PrimitiveUnavailable("no entropy".into()))
    }

    fn is_degraded(&self) -> bool {
        false
    }

    fn name(&self) -> &'static str {
        "broken"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_native_random_bytes() {
        let provider = NativePrimitives::new();
        let a = provider.random_bytes(32).unwrap();
        let b = provider.random_bytes(32).unwrap();

        assert_eq!(a.len(), 32);
        assert_ne!(a, b);
        assert!(!provider.is_degraded());
    }

    #[test]
    fn test_random_bytes_zero_length() {
        let provider = NativePrimitives::new();
        assert!(provider.random_bytes(0).unwrap().is_empty());
    }

    #[test]
    fn test_fallback_random_bytes() {
        let provider = FallbackPrimitives::new();
        let a: [u8; 16] = random_array(&provider).unwrap();
        let b: [u8; 16] = random_array(&provider).unwrap();

        assert_ne!(a, b);
        assert!(provider.is_degraded());
    }

    #[test]
    fn test_two_fallback_instances_differ() {
        let p1 = FallbackPrimitives::new();
        let p2 = FallbackPrimitives::new();
        let a: [u8; 32] = random_array(&p1).unwrap();
        let b: [u8; 32] = random_array(&p2).unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_hash_deterministic_and_shared() {
        let native = NativePrimitives::new();
        let fallback = FallbackPrimitives::new();

        let h1 = native.hash(b"device key");
        let h2 = native.hash(b"device key");
        let h3 = fallback.hash(b"device key");

        assert_eq!(h1, h2);
        assert_eq!(h1, h3);
        assert_ne!(h1, native.hash(b"other key"));
    }

    #[test]
    fn test_sha256_known_vector() {
        let digest = sha256(b"abc");
        assert_eq!(
            hex::encode(digest),
            "ba7816bf8f01cfea414140de5dae2223b00361a396177a9cb410ff61f20015ad"
        );
    }

    #[test]
    fn test_select_native() {
        let provider = select_primitives(false).unwrap();
        assert!(!provider.is_degraded());
        assert_eq!(provider.name(), "os-csprng");
    }

    #[test]
    fn test_select_falls_back_when_allowed() {
        let provider = select_from(Arc::new(BrokenRng), true).unwrap();
        assert!(provider.is_degraded());
        assert!(provider.random_bytes(8).is_ok());
    }

    #[test]
    fn test_select_fails_when_degraded_disallowed() {
        let result = select_from(Arc::new(BrokenRng), false);
        assert!(matches!(result, Err(CryptoError::PrimitiveUnavailable(_))));
    }
}
