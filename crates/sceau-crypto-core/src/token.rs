//! Cryptographically secure token and device-id generation.
//!
//! This module provides:
//! - [`generate_token`] — random fixed-alphabet (lowercase hex) bearer token
//! - [`generate_device_id`] — 128-bit random URL-safe device identifier
//! - [`validate_token_format`] / [`validate_device_id_format`] — cheap
//!   format checks used before any storage or crypto work
//!
//! All randomness comes from `OsRng` (CSPRNG) — never a non-cryptographic
//! generator.

use data_encoding::{BASE64URL_NOPAD, HEXLOWER};
use rand::rngs::OsRng;
use rand::RngCore;

use crate::error::CryptoError;

/// Minimum accepted token length in characters.
pub const MIN_TOKEN_LENGTH: usize = 32;

/// Maximum accepted token length in characters.
pub const MAX_TOKEN_LENGTH: usize = 128;

/// Default token length in characters.
pub const DEFAULT_TOKEN_LENGTH: usize = 64;

/// Device-id entropy in bytes (128 bits).
const DEVICE_ID_BYTES: usize = 16;

/// Minimum accepted device-id length in characters.
pub const MIN_DEVICE_ID_LENGTH: usize = 16;

/// Generate a random lowercase-hex token of exactly `length` characters.
///
/// Draws `ceil(length / 2)` bytes from the CSPRNG and hex-encodes them,
/// truncating to `length` so odd lengths are honoured exactly.
///
/// # Errors
///
/// Returns `CryptoError::TokenGeneration` if `length` is outside
/// [`MIN_TOKEN_LENGTH`]..=[`MAX_TOKEN_LENGTH`].
pub fn generate_token(length: usize) -> Result<String, CryptoError> {
    if !(MIN_TOKEN_LENGTH..=MAX_TOKEN_LENGTH).contains(&length) {
        return Err(CryptoError::TokenGeneration(format!(
            "token length {length} outside [{MIN_TOKEN_LENGTH}, {MAX_TOKEN_LENGTH}]"
        )));
    }

    let mut bytes = vec![0u8; length.div_ceil(2)];
    OsRng.fill_bytes(&mut bytes);

    let mut hex = HEXLOWER.encode(&bytes);
    hex.truncate(length);
    Ok(hex)
}

/// Generate a 128-bit random device id, URL-safe base64 without padding.
///
/// The result is 22 characters of `[A-Za-z0-9_-]`.
#[must_use]
pub fn generate_device_id() -> String {
    let mut bytes = [0u8; DEVICE_ID_BYTES];
    OsRng.fill_bytes(&mut bytes);
    BASE64URL_NOPAD.encode(&bytes)
}

/// Check that a token is lowercase hex with length in the accepted range.
#[must_use]
pub fn validate_token_format(token: &str) -> bool {
    (MIN_TOKEN_LENGTH..=MAX_TOKEN_LENGTH).contains(&token.len())
        && token
            .bytes()
            .all(|b| matches!(b, b'0'..=b'9' | b'a'..=b'f'))
}

/// Check that a device id is URL-safe (`[A-Za-z0-9_-]`) and at least
/// [`MIN_DEVICE_ID_LENGTH`] characters.
#[must_use]
pub fn validate_device_id_format(device_id: &str) -> bool {
    device_id.len() >= MIN_DEVICE_ID_LENGTH
        && device_id
            .bytes()
            .all(|b| b.is_ascii_alphanumeric() || b == b'-' || b == b'_')
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn generated_token_has_exact_length_and_hex_alphabet() {
        for length in [MIN_TOKEN_LENGTH, 33, DEFAULT_TOKEN_LENGTH, 127, MAX_TOKEN_LENGTH] {
            let token = generate_token(length).expect("in-range length should succeed");
            assert_eq!(token.len(), length);
            assert!(validate_token_format(&token), "token: {token}");
        }
    }

    #[test]
    fn generate_token_rejects_out_of_range_lengths() {
        assert!(matches!(
            generate_token(MIN_TOKEN_LENGTH - 1),
            Err(CryptoError::TokenGeneration(_))
        ));
        assert!(matches!(
            generate_token(MAX_TOKEN_LENGTH + 1),
            Err(CryptoError::TokenGeneration(_))
        ));
        assert!(matches!(
            generate_token(0),
            Err(CryptoError::TokenGeneration(_))
        ));
    }

    #[test]
    fn tokens_are_unique() {
        let a = generate_token(DEFAULT_TOKEN_LENGTH).expect("generate");
        let b = generate_token(DEFAULT_TOKEN_LENGTH).expect("generate");
        assert_ne!(a, b);
    }

    #[test]
    fn device_id_is_url_safe_and_long_enough() {
        let id = generate_device_id();
        assert_eq!(id.len(), 22, "16 bytes base64url without padding");
        assert!(validate_device_id_format(&id));
        assert!(!id.contains('='), "no padding allowed");
    }

    #[test]
    fn device_ids_are_unique() {
        assert_ne!(generate_device_id(), generate_device_id());
    }

    #[test]
    fn token_format_rejects_uppercase_and_non_hex() {
        let valid = "a".repeat(MIN_TOKEN_LENGTH);
        assert!(validate_token_format(&valid));
        assert!(!validate_token_format(&"A".repeat(MIN_TOKEN_LENGTH)));
        assert!(!validate_token_format(&"g".repeat(MIN_TOKEN_LENGTH)));
        assert!(!validate_token_format(&"a".repeat(MIN_TOKEN_LENGTH - 1)));
        assert!(!validate_token_format(&"a".repeat(MAX_TOKEN_LENGTH + 1)));
        assert!(!validate_token_format(""));
    }

    #[test]
    fn device_id_format_rejects_short_or_unsafe_ids() {
        assert!(validate_device_id_format("abcDEF123456789-_"));
        assert!(!validate_device_id_format("too-short-id"));
        assert!(!validate_device_id_format("has spaces in here!"));
        assert!(!validate_device_id_format(""));
    }
}
