//! `sceau-crypto-core` — Pure cryptographic primitives for SCEAU.
//!
//! This crate is the audit target: zero network, zero async, zero storage
//! dependencies. Token generation, authenticated encryption of token
//! records, key derivation, and digests — nothing else.

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod cipher;
pub mod digest;
pub mod error;
pub mod kdf;
pub mod token;

pub use cipher::{constant_time_eq, decrypt, encrypt, SealedBlob, IV_LEN, SALT_LEN, TAG_LEN};
pub use digest::{checksum8, sha256_hex, CHECKSUM_LEN};
pub use error::CryptoError;
pub use kdf::{derive, derive_storage_password, DerivedKey, KEY_LEN, PBKDF2_ITERATIONS};
pub use token::{
    generate_device_id, generate_token, validate_device_id_format, validate_token_format,
    DEFAULT_TOKEN_LENGTH, MAX_TOKEN_LENGTH, MIN_DEVICE_ID_LENGTH, MIN_TOKEN_LENGTH,
};
