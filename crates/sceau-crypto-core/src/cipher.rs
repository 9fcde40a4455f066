//! AES-256-GCM authenticated encryption for stored token records.
//!
//! This module provides:
//! - [`encrypt`] — seal plaintext under a password-derived key, returning a
//!   base64 blob `salt (16) || iv (12) || ciphertext || tag (16)`
//! - [`decrypt`] — reverse, re-deriving the key from the embedded salt
//! - [`SealedBlob`] — parsed wire container
//! - [`constant_time_eq`] — timing-safe byte comparison
//!
//! Each call generates a fresh random salt and IV, so the same plaintext
//! never produces the same blob twice. Any integrity-tag mismatch or
//! malformed input surfaces as an error — never as corrupted plaintext.

use data_encoding::BASE64;
use rand::rngs::OsRng;
use rand::RngCore;
use ring::aead;
use zeroize::Zeroize;

use crate::error::CryptoError;
use crate::kdf;

/// Salt length in bytes, prepended to the blob.
pub const SALT_LEN: usize = 16;

/// AES-256-GCM IV length in bytes (96 bits).
pub const IV_LEN: usize = 12;

/// AES-256-GCM authentication tag length in bytes (128 bits).
pub const TAG_LEN: usize = 16;

/// Minimum decoded blob length: salt + iv + empty ciphertext + tag.
const MIN_BLOB_LEN: usize = SALT_LEN + IV_LEN + TAG_LEN;

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Parsed sealed blob — salt, IV, and ciphertext with the tag appended.
///
/// Wire format: `salt (16) || iv (12) || ciphertext (variable) || tag (16)`,
/// base64-encoded for storage.
#[must_use = "encrypted data must be stored or transmitted"]
#[derive(Clone, Debug)]
pub struct SealedBlob {
    /// Random per-encryption KDF salt.
    pub salt: [u8; SALT_LEN],
    /// 96-bit random IV, unique per encryption.
    pub iv: [u8; IV_LEN],
    /// Ciphertext with the 128-bit authentication tag appended.
    pub ciphertext_and_tag: Vec<u8>,
}

impl SealedBlob {
    /// Serialize to wire format: `salt || iv || ciphertext || tag`.
    #[must_use]
    pub fn to_bytes(&self) -> Vec<u8> {
        let capacity = SALT_LEN
            .saturating_add(IV_LEN)
            .saturating_add(self.ciphertext_and_tag.len());
        let mut out = Vec::with_capacity(capacity);
        out.extend_from_slice(&self.salt);
        out.extend_from_slice(&self.iv);
        out.extend_from_slice(&self.ciphertext_and_tag);
        out
    }

    /// Deserialize from wire format.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::Encryption` if the input is shorter than 44
    /// bytes (16-byte salt + 12-byte IV + 0-byte ciphertext + 16-byte tag).
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CryptoError> {
        if bytes.len() < MIN_BLOB_LEN {
            return Err(CryptoError::Encryption(format!(
                "sealed blob too short: {} bytes (minimum {MIN_BLOB_LEN})",
                bytes.len()
            )));
        }

        let mut salt = [0u8; SALT_LEN];
        salt.copy_from_slice(&bytes[..SALT_LEN]);

        let iv_end = SALT_LEN.saturating_add(IV_LEN);
        let mut iv = [0u8; IV_LEN];
        iv.copy_from_slice(&bytes[SALT_LEN..iv_end]);

        Ok(Self {
            salt,
            iv,
            ciphertext_and_tag: bytes[iv_end..].to_vec(),
        })
    }
}

// ---------------------------------------------------------------------------
// Core encryption
// ---------------------------------------------------------------------------

/// Encrypt plaintext under a password-derived AES-256-GCM key.
///
/// Generates a random 16-byte salt and 12-byte IV, derives a 256-bit key via
/// PBKDF2-HMAC-SHA256 over `password` + salt, and seals the plaintext.
/// Returns the base64-encoded blob.
///
/// # Errors
///
/// Returns `CryptoError::KeyDerivation` or `CryptoError::Encryption` if the
/// derivation or the seal operation fails.
pub fn encrypt(plaintext: &[u8], password: &str) -> Result<String, CryptoError> {
    let mut salt = [0u8; SALT_LEN];
    let mut iv = [0u8; IV_LEN];
    OsRng.fill_bytes(&mut salt);
    OsRng.fill_bytes(&mut iv);

    let key = kdf::derive(password.as_bytes(), &salt)?;
    let sealing_key = build_key(key.as_bytes())?;
    let nonce = aead::Nonce::assume_unique_for_key(iv);

    // Encrypt in place — the buffer becomes ciphertext || tag.
    let mut in_out = plaintext.to_vec();
    if sealing_key
        .seal_in_place_append_tag(nonce, aead::Aad::empty(), &mut in_out)
        .is_err()
    {
        in_out.zeroize();
        return Err(CryptoError::Encryption(
            "AES-256-GCM encryption failed".into(),
        ));
    }

    let blob = SealedBlob {
        salt,
        iv,
        ciphertext_and_tag: in_out,
    };
    Ok(BASE64.encode(&blob.to_bytes()))
}

/// Decrypt a base64 blob produced by [`encrypt`].
///
/// Re-derives the key from the embedded salt. The caller is responsible for
/// zeroizing the returned plaintext once done with it.
///
/// # Errors
///
/// Returns `CryptoError::Encryption` for malformed input (bad base64, blob
/// too short) and `CryptoError::Decryption` when the authentication tag does
/// not verify (tampered data or wrong password).
pub fn decrypt(blob: &str, password: &str) -> Result<Vec<u8>, CryptoError> {
    let bytes = BASE64
        .decode(blob.as_bytes())
        .map_err(|e| CryptoError::Encryption(format!("invalid base64 blob: {e}")))?;
    let sealed = SealedBlob::from_bytes(&bytes)?;

    let key = kdf::derive(password.as_bytes(), &sealed.salt)?;
    let opening_key = build_key(key.as_bytes())?;
    let nonce = aead::Nonce::assume_unique_for_key(sealed.iv);

    let mut in_out = sealed.ciphertext_and_tag.clone();
    let plaintext_len = opening_key
        .open_in_place(nonce, aead::Aad::empty(), &mut in_out)
        .map_err(|_| CryptoError::Decryption)?
        .len();

    in_out.truncate(plaintext_len);
    Ok(in_out)
}

/// Timing-safe equality over byte slices.
///
/// A length mismatch returns `false` immediately (length is not secret);
/// content comparison has no data-dependent early exit.
#[must_use]
pub fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    a.len() == b.len() && constant_time_eq::constant_time_eq(a, b)
}

/// Build an AES-256-GCM key from raw bytes.
fn build_key(key: &[u8]) -> Result<aead::LessSafeKey, CryptoError> {
    let unbound = aead::UnboundKey::new(&aead::AES_256_GCM, key)
        .map_err(|_| CryptoError::InvalidKeyMaterial("failed to create AES-256-GCM key".into()))?;
    Ok(aead::LessSafeKey::new(unbound))
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    const PASSWORD: &str = "device-fingerprint-derived-password";

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let plaintext = b"serialized token record";
        let blob = encrypt(plaintext, PASSWORD).expect("encrypt should succeed");
        let decrypted = decrypt(&blob, PASSWORD).expect("decrypt should succeed");
        assert_eq!(decrypted, plaintext);
    }

    #[test]
    fn decrypt_fails_with_wrong_password() {
        let blob = encrypt(b"token record", PASSWORD).expect("encrypt should succeed");
        let result = decrypt(&blob, "a-different-password");
        assert!(
            matches!(result, Err(CryptoError::Decryption)),
            "wrong password should yield CryptoError::Decryption"
        );
    }

    #[test]
    fn decrypt_fails_on_tampered_ciphertext() {
        let blob = encrypt(b"token record", PASSWORD).expect("encrypt should succeed");
        let mut bytes = BASE64.decode(blob.as_bytes()).expect("valid base64");
        let index = SALT_LEN + IV_LEN;
        bytes[index] ^= 0xFF;
        let tampered = BASE64.encode(&bytes);
        let result = decrypt(&tampered, PASSWORD);
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn decrypt_fails_on_tampered_salt() {
        let blob = encrypt(b"token record", PASSWORD).expect("encrypt should succeed");
        let mut bytes = BASE64.decode(blob.as_bytes()).expect("valid base64");
        bytes[0] ^= 0xFF;
        let tampered = BASE64.encode(&bytes);
        // A flipped salt derives a different key, so the tag cannot verify.
        let result = decrypt(&tampered, PASSWORD);
        assert!(matches!(result, Err(CryptoError::Decryption)));
    }

    #[test]
    fn decrypt_rejects_invalid_base64() {
        let result = decrypt("not-valid-base64!!!", PASSWORD);
        assert!(matches!(result, Err(CryptoError::Encryption(_))));
    }

    #[test]
    fn decrypt_rejects_truncated_blob() {
        let short = BASE64.encode(&[0u8; MIN_BLOB_LEN - 1]);
        let result = decrypt(&short, PASSWORD);
        assert!(matches!(result, Err(CryptoError::Encryption(_))));
    }

    #[test]
    fn two_encrypts_produce_different_blobs() {
        let a = encrypt(b"same plaintext", PASSWORD).expect("encrypt should succeed");
        let b = encrypt(b"same plaintext", PASSWORD).expect("encrypt should succeed");
        assert_ne!(a, b, "random salt and IV must differ per call");
    }

    #[test]
    fn empty_plaintext_roundtrip() {
        let blob = encrypt(&[], PASSWORD).expect("encrypt empty should succeed");
        let decrypted = decrypt(&blob, PASSWORD).expect("decrypt empty should succeed");
        assert!(decrypted.is_empty());
    }

    #[test]
    fn sealed_blob_bytes_roundtrip() {
        let blob = encrypt(b"wire test", PASSWORD).expect("encrypt should succeed");
        let bytes = BASE64.decode(blob.as_bytes()).expect("valid base64");
        let sealed = SealedBlob::from_bytes(&bytes).expect("from_bytes should succeed");
        assert_eq!(sealed.to_bytes(), bytes);
    }

    #[test]
    fn constant_time_eq_behaviour() {
        assert!(constant_time_eq(b"abcdef", b"abcdef"));
        assert!(!constant_time_eq(b"abcdef", b"abcdeg"));
        assert!(!constant_time_eq(b"abc", b"abcdef"));
        assert!(constant_time_eq(b"", b""));
    }
}
