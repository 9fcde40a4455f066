//! Device fingerprinting.
//!
//! Derives a stable per-device identifier from hardware/OS attributes plus a
//! stable installation identifier. The fingerprint is a KDF binding input,
//! not a secret and not the sole auth factor — stability is best-effort, so
//! a missing attribute substitutes a fixed `"unknown"` sentinel rather than
//! failing.

use std::sync::Arc;

use sceau_crypto_core::sha256_hex;
use serde::{Deserialize, Serialize};

use crate::clock::Clock;

/// Sentinel substituted for any unavailable device attribute.
const UNKNOWN: &str = "unknown";

/// Separator between identifiers before hashing.
const SEPARATOR: &str = "|";

// ---------------------------------------------------------------------------
// Types
// ---------------------------------------------------------------------------

/// Raw device attributes supplied by the host platform.
///
/// All fields are optional; absent or blank values fall back to the
/// `"unknown"` sentinel when the fingerprint is computed.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceAttributes {
    /// Hardware manufacturer (e.g. `"Acme"`).
    pub manufacturer: Option<String>,
    /// Marketing model name.
    pub model: Option<String>,
    /// Board identifier.
    pub board: Option<String>,
    /// Hardware revision identifier.
    pub hardware: Option<String>,
    /// Product identifier.
    pub product: Option<String>,
    /// Stable installation identifier (survives app restarts).
    pub install_id: Option<String>,
    /// OS version string (e.g. `"Android 14 (API 34)"`).
    pub os_version: Option<String>,
}

impl DeviceAttributes {
    fn get(value: &Option<String>) -> &str {
        value
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(UNKNOWN)
    }

    /// Human-readable device model: `"{manufacturer} {model}"`.
    #[must_use]
    pub fn device_model(&self) -> String {
        format!(
            "{} {}",
            Self::get(&self.manufacturer),
            Self::get(&self.model)
        )
        .trim()
        .to_owned()
    }

    /// OS version string, or the sentinel.
    #[must_use]
    pub fn os_version(&self) -> &str {
        Self::get(&self.os_version)
    }
}

/// Immutable device snapshot, created each time fingerprinting is requested
/// and embedded inside a stored token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DeviceInfo {
    /// Human-readable model string.
    pub device_model: String,
    /// OS version string.
    pub os_version: String,
    /// App version at snapshot time.
    pub app_version: String,
    /// Hex SHA-256 fingerprint over the device identifiers.
    pub fingerprint: String,
    /// Snapshot time, epoch millis.
    pub registered_at: u64,
}

// ---------------------------------------------------------------------------
// Fingerprinter
// ---------------------------------------------------------------------------

/// Computes and compares device fingerprints.
#[derive(Debug, Clone)]
pub struct Fingerprinter {
    attributes: DeviceAttributes,
    clock: Arc<dyn Clock>,
}

impl Fingerprinter {
    /// Create a fingerprinter over the host's attributes.
    #[must_use]
    pub fn new(attributes: DeviceAttributes, clock: Arc<dyn Clock>) -> Self {
        Self { attributes, clock }
    }

    /// Compute the device fingerprint: hex SHA-256 over the `|`-joined
    /// identifiers, in a fixed order.
    #[must_use]
    pub fn fingerprint(&self) -> String {
        let attrs = &self.attributes;
        let joined = [
            DeviceAttributes::get(&attrs.manufacturer),
            DeviceAttributes::get(&attrs.model),
            DeviceAttributes::get(&attrs.board),
            DeviceAttributes::get(&attrs.hardware),
            DeviceAttributes::get(&attrs.product),
            DeviceAttributes::get(&attrs.install_id),
        ]
        .join(SEPARATOR);
        sha256_hex(joined.as_bytes())
    }

    /// Take a fresh [`DeviceInfo`] snapshot for the current device.
    #[must_use]
    pub fn collect(&self, app_version: &str) -> DeviceInfo {
        DeviceInfo {
            device_model: self.attributes.device_model(),
            os_version: self.attributes.os_version().to_owned(),
            app_version: app_version.to_owned(),
            fingerprint: self.fingerprint(),
            registered_at: self.clock.now_millis(),
        }
    }

    /// Whether a stored snapshot still matches the current device.
    ///
    /// Recomputes the fingerprint and compares it plus the model string —
    /// used to detect device change.
    #[must_use]
    pub fn matches(&self, stored: &DeviceInfo, app_version: &str) -> bool {
        let current = self.collect(app_version);
        stored.fingerprint == current.fingerprint && stored.device_model == current.device_model
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
