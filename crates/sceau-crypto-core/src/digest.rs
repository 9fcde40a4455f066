//! SHA-256 digests used across the engine.
//!
//! This module provides:
//! - [`sha256_hex`] — hex-encoded SHA-256 of arbitrary bytes
//! - [`checksum8`] — truncated 8-hex-char checksum for tamper evidence
//!
//! The truncated checksum is a tamper-evidence measure on small payloads
//! (sync codes), not a security boundary.

use data_encoding::HEXLOWER;
use ring::digest;

/// Length of the truncated checksum in hex characters.
pub const CHECKSUM_LEN: usize = 8;

/// Compute the hex-encoded SHA-256 digest of `input`.
///
/// Always returns a 64-character lowercase hex string.
#[must_use]
pub fn sha256_hex(input: &[u8]) -> String {
    let hash = digest::digest(&digest::SHA256, input);
    HEXLOWER.encode(hash.as_ref())
}

/// Compute a truncated 8-hex-char checksum of `input`.
///
/// First [`CHECKSUM_LEN`] characters of the SHA-256 hex digest.
#[must_use]
pub fn checksum8(input: &[u8]) -> String {
    let mut hex = sha256_hex(input);
    hex.truncate(CHECKSUM_LEN);
    hex
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
