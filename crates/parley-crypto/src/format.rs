//! Shared encoding utilities.

use base64::Engine;

use crate::error::{CryptoError, CryptoResult};

/// Encode bytes as standard base64.
pub fn base64_encode(data: &[u8]) -> String {
    base64::engine::general_purpose::STANDARD.encode(data)
}

/// Decode a standard base64 string to bytes.
pub fn base64_decode(data: &str) -> CryptoResult<Vec<u8>> {
    base64::engine::general_purpose::STANDARD
        .decode(data.trim())
        .map_err(|e| CryptoError::InvalidFormat(format!("Invalid base64: {}", e)))
}

/// Decode base64 into a fixed-size array, rejecting any other length.
pub fn base64_decode_array<const N: usize>(data: &str, what: &str) -> CryptoResult<[u8; N]> {
    let bytes = base64_decode(data)?;
    if bytes.len() != N {
        return Err(CryptoError::InvalidFormat(format!(
            "Invalid {} length: expected {}, got {}",
            what,
            N,
            bytes.len()
        )));
    }
    let mut arr = [0u8; N];
    arr.copy_from_slice(&bytes);
    Ok(arr)
}
