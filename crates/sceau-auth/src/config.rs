//! Engine configuration knobs.
//!
//! All durations are carried as integer days or milliseconds so the config
//! serializes cleanly; `Duration` accessors are provided for the async
//! paths.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Milliseconds per day.
pub const MILLIS_PER_DAY: u64 = 86_400_000;

/// Floor for the absolute token age ceiling, in days.
const MAX_TOKEN_AGE_FLOOR_DAYS: u32 = 60;

/// Configuration for the device token engine.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthConfig {
    /// Days until a freshly minted token expires.
    #[serde(default = "default_expiration_days")]
    pub token_expiration_days: u32,

    /// Remaining-lifetime threshold below which a token wants rotation.
    #[serde(default = "default_refresh_threshold_days")]
    pub refresh_threshold_days: u32,

    /// Maximum attempts for `authenticate_with_retry`.
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,

    /// Whether the background auto-refresh loop may run.
    #[serde(default = "default_auto_refresh")]
    pub auto_refresh_enabled: bool,

    /// Hard per-attempt timeout for authentication, in milliseconds.
    #[serde(default = "default_attempt_timeout_millis")]
    pub attempt_timeout_millis: u64,

    /// Base delay between retry attempts, in milliseconds (scaled linearly).
    #[serde(default = "default_retry_delay_millis")]
    pub retry_delay_millis: u64,
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            token_expiration_days: default_expiration_days(),
            refresh_threshold_days: default_refresh_threshold_days(),
            max_retry_attempts: default_max_retry_attempts(),
            auto_refresh_enabled: default_auto_refresh(),
            attempt_timeout_millis: default_attempt_timeout_millis(),
            retry_delay_millis: default_retry_delay_millis(),
        }
    }
}

const fn default_expiration_days() -> u32 {
    30
}
const fn default_refresh_threshold_days() -> u32 {
    7
}
const fn default_max_retry_attempts() -> u32 {
    3
}
const fn default_auto_refresh() -> bool {
    true
}
const fn default_attempt_timeout_millis() -> u64 {
    30_000
}
const fn default_retry_delay_millis() -> u64 {
    1_000
}

impl AuthConfig {
    /// Token lifetime in milliseconds.
    #[must_use]
    pub fn expiration_millis(&self) -> u64 {
        u64::from(self.token_expiration_days).saturating_mul(MILLIS_PER_DAY)
    }

    /// Refresh threshold in milliseconds.
    #[must_use]
    pub fn refresh_threshold_millis(&self) -> u64 {
        u64::from(self.refresh_threshold_days).saturating_mul(MILLIS_PER_DAY)
    }

    /// Absolute token age ceiling in days.
    ///
    /// Independent of `expires_at` — a defense against an improperly
    /// extended expiry. Scales with the configured expiration
    /// (`2 × token_expiration_days`) so a long-lived policy is never dead on
    /// arrival, with a 60-day floor matching the default policy.
    #[must_use]
    pub fn max_token_age_days(&self) -> u32 {
        self.token_expiration_days
            .saturating_mul(2)
            .max(MAX_TOKEN_AGE_FLOOR_DAYS)
    }

    /// Absolute token age ceiling in milliseconds.
    #[must_use]
    pub fn max_token_age_millis(&self) -> u64 {
        u64::from(self.max_token_age_days()).saturating_mul(MILLIS_PER_DAY)
    }

    /// Hard per-attempt authentication timeout.
    #[must_use]
    pub const fn attempt_timeout(&self) -> Duration {
        Duration::from_millis(self.attempt_timeout_millis)
    }

    /// Base retry delay (scaled linearly by attempt number).
    #[must_use]
    pub const fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_millis)
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_values_match_policy() {
        let config = AuthConfig::default();
        assert_eq!(config.token_expiration_days, 30);
        assert_eq!(config.refresh_threshold_days, 7);
        assert_eq!(config.max_retry_attempts, 3);
        assert!(config.auto_refresh_enabled);
        assert_eq!(config.attempt_timeout(), Duration::from_secs(30));
        assert_eq!(config.retry_delay(), Duration::from_secs(1));
    }

    #[test]
    fn age_ceiling_keeps_60_day_floor_for_default_policy() {
        let config = AuthConfig::default();
        assert_eq!(config.max_token_age_days(), 60);
    }

    #[test]
    fn age_ceiling_scales_with_long_expirations() {
        let config = AuthConfig {
            token_expiration_days: 90,
            ..AuthConfig::default()
        };
        // A 90-day expiry must not fail the ceiling before it expires.
        assert_eq!(config.max_token_age_days(), 180);
        assert!(config.max_token_age_millis() > config.expiration_millis());
    }

    #[test]
    fn partial_json_fills_defaults() {
        let config: AuthConfig = serde_json::from_str(r#"{"tokenExpirationDays": 14}"#).unwrap();
        assert_eq!(config.token_expiration_days, 14);
        assert_eq!(config.refresh_threshold_days, 7);
        assert!(config.auto_refresh_enabled);
    }
}
