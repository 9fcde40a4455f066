//! Authentication error types for `sceau-auth`.
//!
//! Every failure path in the engine resolves to one of six
//! [`AuthErrorKind`]s plus a human-readable message. Cryptographic and
//! storage failures are normalized at the component boundary — raw errors
//! never cross the store/cipher boundary into the orchestrator.

use sceau_crypto_core::CryptoError;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// The six externally visible error kinds.
///
/// Only the recoverable set {`Network`, `TokenExpired`} should prompt an
/// automatic retry or silent refresh; everything else requires explicit user
/// action (re-login or sync import).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthErrorKind {
    /// Token has passed its expiry and needs rotation.
    TokenExpired,
    /// Token is malformed, unknown, or does not match the stored one.
    TokenInvalid,
    /// Device fingerprint no longer matches the one bound to the token.
    DeviceNotRecognized,
    /// Network failure or attempt timeout during authentication.
    NetworkError,
    /// Encryption or decryption failure.
    EncryptionError,
    /// Anything that does not fit the other five kinds.
    UnknownError,
}

impl AuthErrorKind {
    /// Whether this kind may be retried or silently refreshed.
    #[must_use]
    pub const fn is_recoverable(self) -> bool {
        matches!(self, Self::NetworkError | Self::TokenExpired)
    }
}

/// Errors produced by authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    /// Cryptographic operation failed (delegated from crypto-core).
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Device token has expired.
    #[error("device token has expired")]
    TokenExpired,

    /// Device token is invalid or malformed.
    #[error("device token is invalid: {0}")]
    TokenInvalid(String),

    /// Device is not recognized or has changed.
    #[error("device not recognized")]
    DeviceNotRecognized,

    /// Network-related authentication error (includes attempt timeouts).
    #[error("network error during authentication: {0}")]
    Network(String),

    /// A token refresh is already in flight — single-flight guard held.
    #[error("token refresh already in progress")]
    RefreshInProgress,

    /// No stored token available for the requested operation.
    #[error("no stored token")]
    NoToken,

    /// Key-value store failure (write rejected, batch not applied).
    #[error("storage error: {0}")]
    Storage(String),
}

impl AuthError {
    /// Map this error onto its externally visible kind.
    #[must_use]
    pub const fn kind(&self) -> AuthErrorKind {
        match self {
            Self::Crypto(_) => AuthErrorKind::EncryptionError,
            Self::TokenExpired => AuthErrorKind::TokenExpired,
            Self::TokenInvalid(_) | Self::NoToken => AuthErrorKind::TokenInvalid,
            Self::DeviceNotRecognized => AuthErrorKind::DeviceNotRecognized,
            Self::Network(_) => AuthErrorKind::NetworkError,
            Self::RefreshInProgress | Self::Storage(_) => AuthErrorKind::UnknownError,
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recoverable_set_is_network_and_expired_only() {
        assert!(AuthErrorKind::NetworkError.is_recoverable());
        assert!(AuthErrorKind::TokenExpired.is_recoverable());
        assert!(!AuthErrorKind::TokenInvalid.is_recoverable());
        assert!(!AuthErrorKind::DeviceNotRecognized.is_recoverable());
        assert!(!AuthErrorKind::EncryptionError.is_recoverable());
        assert!(!AuthErrorKind::UnknownError.is_recoverable());
    }

    #[test]
    fn crypto_errors_map_to_encryption_kind() {
        let err = AuthError::from(CryptoError::Decryption);
        assert_eq!(err.kind(), AuthErrorKind::EncryptionError);
    }

    #[test]
    fn kind_serializes_as_screaming_snake_case() {
        let json = serde_json::to_string(&AuthErrorKind::DeviceNotRecognized).unwrap();
        assert_eq!(json, "\"DEVICE_NOT_RECOGNIZED\"");
    }
}
