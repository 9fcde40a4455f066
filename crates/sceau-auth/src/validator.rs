//! Token validation rules.
//!
//! A validation pass runs every rule and reports all failures, in a fixed
//! precedence order, rather than short-circuiting on the first. Callers that
//! only want one answer take [`ValidationReport::primary_error`].

use std::sync::Arc;

use sceau_crypto_core::validate_token_format;
use thiserror::Error;

use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::device::Fingerprinter;
use crate::model::DeviceToken;

/// A single failed validation rule.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum ValidationError {
    /// Token string is not 32-128 lowercase hex characters.
    #[error("token format is invalid")]
    Format,
    /// Token is past its expiry.
    #[error("token has expired")]
    Expired,
    /// Token was revoked.
    #[error("token is inactive")]
    Inactive,
    /// Device fingerprint no longer matches the token's snapshot.
    ///
    /// Rarely surfaces for tokens read back from the encrypted store: a
    /// fingerprint change also changes the storage password, so the store
    /// self-heals to "no token" before this rule can run. The rule is the
    /// backstop for token records that arrive by any other route.
    #[error("device has changed since the token was issued")]
    DeviceChanged,
    /// Token age exceeds the absolute ceiling, regardless of expiry.
    #[error("token exceeds the maximum age")]
    TooOld,
}

/// Outcome of a full validation pass.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ValidationReport {
    /// No rule failed.
    pub is_valid: bool,
    /// Every failed rule, in precedence order.
    pub errors: Vec<ValidationError>,
    /// Convenience flag: the expiry rule failed.
    pub is_expired: bool,
    /// Convenience flag: the device-change rule failed.
    pub device_changed: bool,
    /// Token is inside the refresh window (independent of validity).
    pub needs_refresh: bool,
}

impl ValidationReport {
    /// The highest-precedence failure, if any.
    #[must_use]
    pub fn primary_error(&self) -> Option<ValidationError> {
        self.errors.first().copied()
    }
}

// ---------------------------------------------------------------------------
// Validator
// ---------------------------------------------------------------------------

/// Applies every validation rule to a [`DeviceToken`].
#[derive(Debug, Clone)]
pub struct TokenValidator {
    fingerprinter: Fingerprinter,
    clock: Arc<dyn Clock>,
    config: AuthConfig,
}

impl TokenValidator {
    /// Create a validator for the current device.
    #[must_use]
    pub fn new(fingerprinter: Fingerprinter, clock: Arc<dyn Clock>, config: AuthConfig) -> Self {
        Self {
            fingerprinter,
            clock,
            config,
        }
    }

    /// Cheap format pre-check, used before any storage or crypto work.
    #[must_use]
    pub fn quick_validate_format(&self, token: &str) -> bool {
        validate_token_format(token)
    }

    /// Run every rule against `token`.
    ///
    /// Errors accumulate in precedence order: format, expiry, activity,
    /// device binding, age ceiling.
    #[must_use]
    pub fn validate(&self, token: &DeviceToken, app_version: &str) -> ValidationReport {
        let now = self.clock.now_millis();
        let mut errors = Vec::new();

        if !validate_token_format(&token.token) {
            errors.push(ValidationError::Format);
        }

        let is_expired = token.is_expired(now);
        if is_expired {
            errors.push(ValidationError::Expired);
        }

        if !token.is_active {
            errors.push(ValidationError::Inactive);
        }

        let device_changed = !self.fingerprinter.matches(&token.device_info, app_version);
        if device_changed {
            errors.push(ValidationError::DeviceChanged);
        }

        // Absolute ceiling on token age, independent of expires_at.
        if token.age_millis(now) > self.config.max_token_age_millis() {
            errors.push(ValidationError::TooOld);
        }

        ValidationReport {
            is_valid: errors.is_empty(),
            is_expired,
            device_changed,
            needs_refresh: token.needs_refresh(now, self.config.refresh_threshold_millis()),
            errors,
        }
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
