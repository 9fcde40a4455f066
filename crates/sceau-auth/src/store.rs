//! Encrypted token persistence.
//!
//! The full [`DeviceToken`] is serialized to JSON and sealed with AES-GCM
//! under a key derived from the device fingerprint, so a blob copied to
//! another device fails authentication on decrypt. A plaintext metadata
//! projection (device id, timestamps, user id) is written alongside the blob
//! in one atomic batch so status queries never pay the KDF cost.
//!
//! Corrupt or undecryptable state self-heals: the store wipes the slots and
//! reports "no token" instead of surfacing a hard error.

use std::sync::Arc;

use sceau_crypto_core::{cipher, kdf};
use tracing::{debug, warn};

use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::device::Fingerprinter;
use crate::error::AuthError;
use crate::kv::{Batch, KeyValueStore};
use crate::model::{DeviceToken, TokenMetadata};

/// Domain-separation context mixed into the storage key derivation.
const STORAGE_CONTEXT: &str = "token-storage";

/// Storage slot names.
mod keys {
    pub const DEVICE_TOKEN: &str = "device_token";
    pub const DEVICE_ID: &str = "device_id";
    pub const USER_ID: &str = "user_id";
    pub const TOKEN_CREATED_AT: &str = "token_created_at";
    pub const TOKEN_EXPIRES_AT: &str = "token_expires_at";
}

// ---------------------------------------------------------------------------
// Token store
// ---------------------------------------------------------------------------

/// Device-bound encrypted token store.
#[derive(Debug, Clone)]
pub struct TokenStore {
    kv: Arc<dyn KeyValueStore>,
    fingerprinter: Fingerprinter,
    clock: Arc<dyn Clock>,
    config: AuthConfig,
}

impl TokenStore {
    /// Create a store over the injected key-value backend.
    #[must_use]
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        fingerprinter: Fingerprinter,
        clock: Arc<dyn Clock>,
        config: AuthConfig,
    ) -> Self {
        Self {
            kv,
            fingerprinter,
            clock,
            config,
        }
    }

    /// The fingerprint-derived encryption password for this device.
    fn storage_password(&self) -> String {
        kdf::derive_storage_password(&self.fingerprinter.fingerprint(), STORAGE_CONTEXT)
    }

    /// Persist `token`, replacing any previous one.
    ///
    /// The blob and its metadata land in one atomic batch. The stored user
    /// id is reset to empty — a token on its own proves nothing about a
    /// user, so the caller re-associates after a successful authentication.
    ///
    /// # Errors
    ///
    /// `AuthError::Crypto` if serialization or encryption fails,
    /// `AuthError::Storage` if the backend rejects the batch.
    pub fn store(&self, token: &DeviceToken) -> Result<(), AuthError> {
        let plaintext = serde_json::to_vec(token)
            .map_err(|e| AuthError::Storage(format!("token serialization failed: {e}")))?;
        let blob = cipher::encrypt(&plaintext, &self.storage_password())?;

        let batch = Batch::new()
            .put_string(keys::DEVICE_TOKEN, blob)
            .put_string(keys::DEVICE_ID, token.device_id.clone())
            .put_string(keys::USER_ID, "")
            .put_u64(keys::TOKEN_CREATED_AT, token.created_at)
            .put_u64(keys::TOKEN_EXPIRES_AT, token.expires_at);

        if !self.kv.apply(batch) {
            return Err(AuthError::Storage("token batch was not applied".into()));
        }
        debug!(device_id = %token.device_id, "device token stored");
        Ok(())
    }

    /// Load and decrypt the stored token.
    ///
    /// Returns `Ok(None)` when no token is stored, and also when stored
    /// state is unusable — undecryptable blob (wrong device or tampering),
    /// malformed JSON, blank fields, or metadata diverging from the blob.
    /// All of those wipe the slots before returning.
    ///
    /// # Errors
    ///
    /// `AuthError::Storage` only if the self-heal wipe itself fails.
    pub fn load(&self) -> Result<Option<DeviceToken>, AuthError> {
        let Some(blob) = self.kv.get_string(keys::DEVICE_TOKEN) else {
            return Ok(None);
        };

        let plaintext = match cipher::decrypt(&blob, &self.storage_password()) {
            Ok(plaintext) => plaintext,
            Err(e) => {
                warn!(error = %e, "stored token blob is undecryptable, clearing");
                self.clear()?;
                return Ok(None);
            }
        };

        let token: DeviceToken = match serde_json::from_slice(&plaintext) {
            Ok(token) => token,
            Err(e) => {
                warn!(error = %e, "stored token blob holds malformed JSON, clearing");
                self.clear()?;
                return Ok(None);
            }
        };

        if token.token.is_empty() || token.device_id.is_empty() {
            warn!("stored token has blank fields, clearing");
            self.clear()?;
            return Ok(None);
        }

        // Plaintext metadata must agree with the decrypted record.
        let metadata_device_id = self.kv.get_string(keys::DEVICE_ID);
        if metadata_device_id.as_deref() != Some(token.device_id.as_str()) {
            warn!("stored metadata diverges from the token blob, clearing");
            self.clear()?;
            return Ok(None);
        }

        Ok(Some(token))
    }

    /// Read the plaintext metadata projection without decrypting.
    ///
    /// Returns `None` when any slot is missing, including when the metadata
    /// exists but the blob does not (divergent state is as good as none).
    #[must_use]
    pub fn load_metadata(&self) -> Option<TokenMetadata> {
        self.kv.get_string(keys::DEVICE_TOKEN)?;
        let device_id = self
            .kv
            .get_string(keys::DEVICE_ID)
            .filter(|id| !id.is_empty())?;
        let created_at = self.kv.get_u64(keys::TOKEN_CREATED_AT)?;
        let expires_at = self.kv.get_u64(keys::TOKEN_EXPIRES_AT)?;

        Some(TokenMetadata {
            device_id,
            user_id: self.user_id(),
            created_at,
            expires_at,
            is_expired: self.clock.now_millis() > expires_at,
        })
    }

    /// Bind `user_id` to the stored token.
    ///
    /// # Errors
    ///
    /// `AuthError::Storage` if the backend rejects the write.
    pub fn set_user_id(&self, user_id: &str) -> Result<(), AuthError> {
        if self.kv.put_string(keys::USER_ID, user_id) {
            Ok(())
        } else {
            Err(AuthError::Storage("user id write was rejected".into()))
        }
    }

    /// The bound user id, if a non-empty one is stored.
    #[must_use]
    pub fn user_id(&self) -> Option<String> {
        self.kv
            .get_string(keys::USER_ID)
            .filter(|id| !id.is_empty())
    }

    /// Wipe every token slot atomically.
    ///
    /// # Errors
    ///
    /// `AuthError::Storage` if the backend rejects the batch.
    pub fn clear(&self) -> Result<(), AuthError> {
        let batch = Batch::new()
            .remove(keys::DEVICE_TOKEN)
            .remove(keys::DEVICE_ID)
            .remove(keys::USER_ID)
            .remove(keys::TOKEN_CREATED_AT)
            .remove(keys::TOKEN_EXPIRES_AT);
        if self.kv.apply(batch) {
            Ok(())
        } else {
            Err(AuthError::Storage("clear batch was not applied".into()))
        }
    }

    /// Whether a stored, unexpired token exists (metadata only, no decrypt).
    #[must_use]
    pub fn has_valid_token(&self) -> bool {
        self.load_metadata().is_some_and(|m| !m.is_expired)
    }

    /// Whether the stored token is inside the refresh window.
    #[must_use]
    pub fn needs_refresh(&self) -> bool {
        self.load_metadata().is_some_and(|m| {
            m.needs_refresh(
                self.clock.now_millis(),
                self.config.refresh_threshold_millis(),
            )
        })
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
