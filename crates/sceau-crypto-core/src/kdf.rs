//! PBKDF2-HMAC-SHA256 key derivation.
//!
//! This module provides:
//! - [`derive`] — derive a 256-bit AES key from a password + salt
//! - [`derive_storage_password`] — deterministic storage password bound to
//!   a device fingerprint and a fixed context string
//! - [`DerivedKey`] — zeroize-on-drop 32-byte key container
//!
//! The storage password is intentionally bound to `(fingerprint, context)`
//! only — never to wall-clock time. A time-influenced password would make a
//! previously encrypted blob undecryptable on the next derivation.

use std::num::NonZeroU32;

use ring::pbkdf2;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::digest::sha256_hex;
use crate::error::CryptoError;

/// Output length of the KDF in bytes (256 bits).
pub const KEY_LEN: usize = 32;

/// PBKDF2 iteration count. The engine's floor is 10,000.
pub const PBKDF2_ITERATIONS: u32 = 10_000;

/// Minimum salt length in bytes.
pub const MIN_SALT_LEN: usize = 16;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// A derived 256-bit key. Zeroized on drop.
#[derive(Zeroize, ZeroizeOnDrop)]
pub struct DerivedKey([u8; KEY_LEN]);

impl DerivedKey {
    /// Borrow the raw key bytes.
    #[must_use]
    pub const fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }
}

impl std::fmt::Debug for DerivedKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("DerivedKey(***)")
    }
}

// ---------------------------------------------------------------------------
// Core KDF
// ---------------------------------------------------------------------------

/// Derive a 256-bit key from a password and salt using PBKDF2-HMAC-SHA256.
///
/// # Errors
///
/// Returns `CryptoError::KeyDerivation` if the salt is shorter than 16 bytes.
pub fn derive(password: &[u8], salt: &[u8]) -> Result<DerivedKey, CryptoError> {
    if salt.len() < MIN_SALT_LEN {
        return Err(CryptoError::KeyDerivation(format!(
            "salt too short: {} bytes (minimum {MIN_SALT_LEN})",
            salt.len()
        )));
    }

    let iterations = NonZeroU32::new(PBKDF2_ITERATIONS)
        .ok_or_else(|| CryptoError::KeyDerivation("iteration count must be non-zero".into()))?;

    let mut output = [0u8; KEY_LEN];
    pbkdf2::derive(
        pbkdf2::PBKDF2_HMAC_SHA256,
        iterations,
        salt,
        password,
        &mut output,
    );

    let key = DerivedKey(output);
    output.zeroize();
    Ok(key)
}

/// Derive the symmetric storage password for a device.
///
/// Deterministic SHA-256 hex over `fingerprint || "|" || context`. The same
/// device with the same context always derives the same password, so a blob
/// encrypted today is decryptable tomorrow — and a different device (whose
/// fingerprint differs) derives a different password and fails decryption,
/// which the store treats as "no token".
#[must_use]
pub fn derive_storage_password(fingerprint: &str, context: &str) -> String {
    let mut input = Vec::with_capacity(
        fingerprint
            .len()
            .saturating_add(1)
            .saturating_add(context.len()),
    );
    input.extend_from_slice(fingerprint.as_bytes());
    input.push(b'|');
    input.extend_from_slice(context.as_bytes());
    sha256_hex(&input)
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const SALT_A: [u8; MIN_SALT_LEN] = [0x11; MIN_SALT_LEN];
    const SALT_B: [u8; MIN_SALT_LEN] = [0x22; MIN_SALT_LEN];

    #[test]
    fn derive_is_deterministic() {
        let a = derive(b"password", &SALT_A).expect("derive should succeed");
        let b = derive(b"password", &SALT_A).expect("derive should succeed");
        assert_eq!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn derive_differs_by_salt() {
        let a = derive(b"password", &SALT_A).expect("derive should succeed");
        let b = derive(b"password", &SALT_B).expect("derive should succeed");
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn derive_differs_by_password() {
        let a = derive(b"password-a", &SALT_A).expect("derive should succeed");
        let b = derive(b"password-b", &SALT_A).expect("derive should succeed");
        assert_ne!(a.as_bytes(), b.as_bytes());
    }

    #[test]
    fn derive_rejects_short_salt() {
        let result = derive(b"password", &[0u8; 15]);
        assert!(matches!(result, Err(CryptoError::KeyDerivation(_))));
    }

    #[test]
    fn storage_password_is_deterministic() {
        let a = derive_storage_password("fp-1234", "token-storage");
        let b = derive_storage_password("fp-1234", "token-storage");
        assert_eq!(a, b, "no wall-clock input may influence the password");
    }

    #[test]
    fn storage_password_differs_by_fingerprint_and_context() {
        let base = derive_storage_password("fp-1234", "token-storage");
        assert_ne!(base, derive_storage_password("fp-5678", "token-storage"));
        assert_ne!(base, derive_storage_password("fp-1234", "other-context"));
    }

    #[test]
    fn derived_key_debug_is_masked() {
        let key = derive(b"password", &SALT_A).expect("derive should succeed");
        assert_eq!(format!("{key:?}"), "DerivedKey(***)");
    }
}
