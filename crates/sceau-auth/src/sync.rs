//! Cross-device sync protocol.
//!
//! Lets a signed-in device hand its user identity to a new device without
//! ever transmitting the raw token. Two transient records exist:
//!
//! - [`ExportableTokenData`] — the full export: a one-way hash of the
//!   token, device snapshot and timestamps, for direct device-to-device
//!   transfer.
//! - [`SyncCodeData`] — the compact wire payload behind a sync code:
//!   user id, device model, a 5-minute expiry and a checksum, URL-safe
//!   base64 JSON.
//!
//! Either way the importing device mints its own local token and binds the
//! transferred user id to it.

use std::sync::Arc;

use data_encoding::BASE64URL_NOPAD;
use sceau_crypto_core::{checksum8, sha256_hex, validate_device_id_format};
use serde::{Deserialize, Serialize};
use tracing::{info, warn};

use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::device::{DeviceInfo, Fingerprinter};
use crate::error::AuthError;
use crate::events::{AuthEvent, EventBus};
use crate::model::DeviceToken;
use crate::store::TokenStore;

/// Lifetime of a sync code.
pub const SYNC_CODE_TTL_MILLIS: u64 = 300_000;

/// Full export record for device-to-device transfer.
///
/// Carries a one-way hash of the token, never the token itself.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportableTokenData {
    /// The user identity being transferred.
    pub user_id: String,
    /// Device id of the exporting device.
    pub device_id: String,
    /// SHA-256 hex of the exporting device's token.
    pub token_hash: String,
    /// Token mint time, epoch millis.
    pub created_at: u64,
    /// Token expiry, epoch millis.
    pub expires_at: u64,
    /// Snapshot of the exporting device.
    pub device_info: DeviceInfo,
    /// Export time, epoch millis.
    pub exported_at: u64,
}

/// Compact payload carried inside a sync code.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncCodeData {
    /// The user identity being transferred.
    pub user_id: String,
    /// Human-readable model of the exporting device.
    pub device_model: String,
    /// Code expiry, epoch millis.
    pub expires_at: u64,
    /// Tamper-evidence checksum bound to the exporting device's state.
    pub checksum: String,
}

/// Result of a compatibility check between two installations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompatibilityReport {
    /// Both sides can exchange identities.
    pub is_compatible: bool,
    /// Why not, when incompatible.
    pub reason: Option<String>,
}

/// Outcome of an import attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ImportOutcome {
    /// The identity was imported and bound to a freshly minted local token.
    Imported {
        /// The transferred user id.
        user_id: String,
    },
    /// The transferred data was not usable.
    Rejected {
        /// Human-readable reason.
        reason: String,
    },
}

// ---------------------------------------------------------------------------
// Sync engine
// ---------------------------------------------------------------------------

/// Generates and consumes sync codes and export records.
#[derive(Debug, Clone)]
pub struct DeviceSync {
    store: TokenStore,
    fingerprinter: Fingerprinter,
    clock: Arc<dyn Clock>,
    config: AuthConfig,
    events: EventBus,
    app_version: String,
}

impl DeviceSync {
    /// Create a sync engine over the shared store.
    #[must_use]
    pub fn new(
        store: TokenStore,
        fingerprinter: Fingerprinter,
        clock: Arc<dyn Clock>,
        config: AuthConfig,
        events: EventBus,
        app_version: String,
    ) -> Self {
        Self {
            store,
            fingerprinter,
            clock,
            config,
            events,
            app_version,
        }
    }

    /// Build the full export record for the stored identity.
    ///
    /// # Errors
    ///
    /// [`AuthError::NoToken`] when no token is stored,
    /// [`AuthError::TokenInvalid`] when no user id is bound to it.
    pub fn export_for_sync(&self) -> Result<ExportableTokenData, AuthError> {
        let token = self.store.load()?.ok_or(AuthError::NoToken)?;
        let user_id = self
            .store
            .user_id()
            .ok_or_else(|| AuthError::TokenInvalid("no user bound to the stored token".into()))?;

        Ok(ExportableTokenData {
            user_id,
            device_id: token.device_id.clone(),
            token_hash: sha256_hex(token.token.as_bytes()),
            created_at: token.created_at,
            expires_at: token.expires_at,
            device_info: token.device_info,
            exported_at: self.clock.now_millis(),
        })
    }

    /// Produce a sync code for the currently stored identity.
    ///
    /// # Errors
    ///
    /// Same conditions as [`Self::export_for_sync`].
    pub fn generate_sync_code(&self) -> Result<String, AuthError> {
        let export = self.export_for_sync()?;
        let payload = SyncCodeData {
            checksum: Self::integrity_checksum(&export),
            device_model: export.device_info.device_model,
            expires_at: self.clock.now_millis().saturating_add(SYNC_CODE_TTL_MILLIS),
            user_id: export.user_id,
        };

        let json = serde_json::to_vec(&payload)
            .map_err(|e| AuthError::Storage(format!("sync payload serialization failed: {e}")))?;
        Ok(BASE64URL_NOPAD.encode(&json))
    }

    /// Decode a sync code, rejecting expired ones.
    ///
    /// Returns `None` for undecodable, malformed or expired codes. The
    /// checksum is carried opaquely — only the exporting device holds the
    /// inputs to recompute it.
    #[must_use]
    pub fn parse_sync_code(&self, code: &str) -> Option<SyncCodeData> {
        let bytes = BASE64URL_NOPAD.decode(code.trim().as_bytes()).ok()?;
        let payload: SyncCodeData = serde_json::from_slice(&bytes).ok()?;
        if self.clock.now_millis() >= payload.expires_at {
            return None;
        }
        Some(payload)
    }

    /// Whether this installation can exchange identities with `peer`: same
    /// major app version and same platform family.
    ///
    /// The platform family is the first word of the OS string, compared
    /// case-insensitively, so `"Android 14"` pairs with `"Android 13"` but
    /// not with `"iOS 17"`. A mismatch is a hard failure.
    #[must_use]
    pub fn check_compatibility(&self, peer: &DeviceInfo) -> CompatibilityReport {
        let local = self.fingerprinter.collect(&self.app_version);

        if major_version(&local.app_version) != major_version(&peer.app_version) {
            return CompatibilityReport {
                is_compatible: false,
                reason: Some(format!(
                    "incompatible app versions: {} vs {}",
                    local.app_version, peer.app_version
                )),
            };
        }
        if !platform_family(&local.os_version)
            .eq_ignore_ascii_case(platform_family(&peer.os_version))
        {
            return CompatibilityReport {
                is_compatible: false,
                reason: Some(format!(
                    "incompatible platforms: {} vs {}",
                    local.os_version, peer.os_version
                )),
            };
        }
        CompatibilityReport {
            is_compatible: true,
            reason: None,
        }
    }

    /// Import an identity from another device's full export record.
    ///
    /// Validates the record's shape, re-checks compatibility, then stores
    /// the locally generated `new_token` (never the peer's) and binds the
    /// peer's user id to it.
    ///
    /// # Errors
    ///
    /// Storage and crypto failures while persisting the new local token.
    pub fn import_from_device(
        &self,
        exported: &ExportableTokenData,
        new_token: DeviceToken,
    ) -> Result<ImportOutcome, AuthError> {
        if exported.user_id.is_empty() {
            return Ok(ImportOutcome::Rejected {
                reason: "exported data has a blank user id".into(),
            });
        }
        if !validate_device_id_format(&exported.device_id) {
            return Ok(ImportOutcome::Rejected {
                reason: "exported data has a malformed device id".into(),
            });
        }
        if exported.expires_at <= exported.created_at {
            return Ok(ImportOutcome::Rejected {
                reason: "exported token has an inverted lifetime".into(),
            });
        }
        if self.clock.now_millis() > exported.expires_at {
            return Ok(ImportOutcome::Rejected {
                reason: "exported token has already expired".into(),
            });
        }
        let compat = self.check_compatibility(&exported.device_info);
        if !compat.is_compatible {
            return Ok(ImportOutcome::Rejected {
                reason: compat
                    .reason
                    .unwrap_or_else(|| "devices are incompatible".into()),
            });
        }

        self.adopt_identity(&exported.user_id, new_token)
    }

    /// Import an identity from a sync code, minting the local token here.
    ///
    /// # Errors
    ///
    /// Storage and crypto failures while persisting the new local token.
    pub fn import_from_sync_code(&self, code: &str) -> Result<ImportOutcome, AuthError> {
        let Some(payload) = self.parse_sync_code(code) else {
            warn!("sync code rejected: malformed or expired");
            return Ok(ImportOutcome::Rejected {
                reason: "sync code is malformed or expired".into(),
            });
        };
        if payload.user_id.is_empty() {
            return Ok(ImportOutcome::Rejected {
                reason: "sync code carries no user id".into(),
            });
        }

        let info = self.fingerprinter.collect(&self.app_version);
        let token = DeviceToken::mint(
            info,
            self.config.token_expiration_days,
            self.clock.now_millis(),
        )?;
        self.adopt_identity(&payload.user_id, token)
    }

    /// Persist a freshly minted local token and bind `user_id` to it.
    fn adopt_identity(
        &self,
        user_id: &str,
        token: DeviceToken,
    ) -> Result<ImportOutcome, AuthError> {
        self.store.store(&token)?;
        self.store.set_user_id(user_id)?;

        info!(user_id = %user_id, "identity imported from another device");
        self.events.emit(AuthEvent::TokenGenerated { token });
        self.events.emit(AuthEvent::AuthSuccess {
            user_id: user_id.to_owned(),
        });
        Ok(ImportOutcome::Imported {
            user_id: user_id.to_owned(),
        })
    }

    /// Checksum binding a sync payload to the exporting device's state:
    /// first 8 hex characters of SHA-256 over user id, device id, token
    /// hash and mint time.
    fn integrity_checksum(export: &ExportableTokenData) -> String {
        let input = format!(
            "{}{}{}{}",
            export.user_id, export.device_id, export.token_hash, export.created_at
        );
        checksum8(input.as_bytes())
    }
}

fn major_version(version: &str) -> Option<u32> {
    version.split('.').next()?.trim().parse().ok()
}

fn platform_family(os: &str) -> &str {
    os.split_whitespace().next().unwrap_or("")
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
