//! Core data models: device tokens, metadata projections, auth results.

use sceau_crypto_core::{generate_device_id, generate_token, CryptoError, DEFAULT_TOKEN_LENGTH};
use serde::{Deserialize, Serialize};

use crate::config::MILLIS_PER_DAY;
use crate::device::DeviceInfo;
use crate::error::{AuthError, AuthErrorKind};

// ---------------------------------------------------------------------------
// Device token
// ---------------------------------------------------------------------------

/// An opaque bearer token bound to a device.
///
/// Tokens are superseded, never mutated: a refresh mints a new record with
/// the same `device_id`; expiration handling mints a brand-new record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceToken {
    /// The bearer token — lowercase hex, 32 to 128 characters.
    pub token: String,
    /// URL-safe device identifier, stable across rotations.
    pub device_id: String,
    /// Mint time, epoch millis.
    pub created_at: u64,
    /// Expiry time, epoch millis. Always strictly after `created_at`.
    pub expires_at: u64,
    /// Whether the token is still active (revocation flag).
    pub is_active: bool,
    /// Device snapshot taken at mint time.
    pub device_info: DeviceInfo,
}

impl DeviceToken {
    /// Mint a fresh token for `device_info`, expiring after
    /// `expiration_days`.
    ///
    /// # Errors
    ///
    /// Returns `CryptoError::TokenGeneration` if `expiration_days` is zero
    /// (the `expires_at > created_at` invariant would not hold).
    pub fn mint(
        device_info: DeviceInfo,
        expiration_days: u32,
        now: u64,
    ) -> Result<Self, CryptoError> {
        if expiration_days == 0 {
            return Err(CryptoError::TokenGeneration(
                "expiration must be at least one day".into(),
            ));
        }

        Ok(Self {
            token: generate_token(DEFAULT_TOKEN_LENGTH)?,
            device_id: generate_device_id(),
            created_at: now,
            expires_at: now.saturating_add(u64::from(expiration_days).saturating_mul(MILLIS_PER_DAY)),
            is_active: true,
            device_info,
        })
    }

    /// Whether the token is past its expiry.
    #[must_use]
    pub const fn is_expired(&self, now: u64) -> bool {
        now > self.expires_at
    }

    /// Milliseconds until expiry (zero once expired).
    #[must_use]
    pub const fn remaining_millis(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }

    /// Active and not expired.
    #[must_use]
    pub const fn is_valid(&self, now: u64) -> bool {
        self.is_active && !self.is_expired(now)
    }

    /// Remaining lifetime below the threshold, and not yet expired.
    #[must_use]
    pub const fn needs_refresh(&self, now: u64, threshold_millis: u64) -> bool {
        !self.is_expired(now) && self.remaining_millis(now) < threshold_millis
    }

    /// Milliseconds since mint.
    #[must_use]
    pub const fn age_millis(&self, now: u64) -> u64 {
        now.saturating_sub(self.created_at)
    }
}

// ---------------------------------------------------------------------------
// Metadata projection
// ---------------------------------------------------------------------------

/// Plaintext projection of a stored token.
///
/// Kept alongside the encrypted blob so status can be queried without a
/// decrypt + key-derivation cost.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenMetadata {
    /// Device identifier of the stored token.
    pub device_id: String,
    /// Associated user id, if authentication has bound one.
    pub user_id: Option<String>,
    /// Mint time, epoch millis.
    pub created_at: u64,
    /// Expiry time, epoch millis.
    pub expires_at: u64,
    /// Whether the token was expired at read time.
    pub is_expired: bool,
}

impl TokenMetadata {
    /// Milliseconds until expiry (zero once expired).
    #[must_use]
    pub const fn remaining_millis(&self, now: u64) -> u64 {
        self.expires_at.saturating_sub(now)
    }

    /// Remaining lifetime below the threshold, and not yet expired.
    #[must_use]
    pub const fn needs_refresh(&self, now: u64, threshold_millis: u64) -> bool {
        !self.is_expired && self.remaining_millis(now) < threshold_millis
    }
}

// ---------------------------------------------------------------------------
// Authentication results & state
// ---------------------------------------------------------------------------

/// Result of an authentication use case. Transient — never persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthResult {
    /// Whether the operation succeeded.
    pub is_success: bool,
    /// Authenticated user id on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user_id: Option<String>,
    /// Human-readable failure message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_message: Option<String>,
    /// Failure kind, one of the six.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<AuthErrorKind>,
    /// Rotated token handed back alongside a successful authentication.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub new_token: Option<DeviceToken>,
}

impl AuthResult {
    /// Successful authentication for `user_id`, optionally carrying a new
    /// token.
    #[must_use]
    pub fn success(user_id: impl Into<String>, new_token: Option<DeviceToken>) -> Self {
        Self {
            is_success: true,
            user_id: Some(user_id.into()),
            error_message: None,
            error_kind: None,
            new_token,
        }
    }

    /// Failed authentication with a message and kind.
    #[must_use]
    pub fn failure(message: impl Into<String>, kind: AuthErrorKind) -> Self {
        Self {
            is_success: false,
            user_id: None,
            error_message: Some(message.into()),
            error_kind: Some(kind),
            new_token: None,
        }
    }
}

impl From<AuthError> for AuthResult {
    fn from(err: AuthError) -> Self {
        Self::failure(err.to_string(), err.kind())
    }
}

/// Observable authentication state owned by the orchestrator.
///
/// Initial state is `Unknown`; there are no terminal states — the machine
/// is re-entrant for the application's lifetime.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum AuthenticationState {
    /// Not yet determined.
    Unknown,
    /// Reading stored state.
    Checking,
    /// An authentication use case is in flight.
    Authenticating,
    /// A user id and token are bound.
    Authenticated,
    /// No valid binding (expected failures land here).
    NotAuthenticated,
    /// Unexpected failure.
    Error,
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
