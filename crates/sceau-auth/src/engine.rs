//! Authentication orchestrator.
//!
//! [`AuthEngine`] wires the fingerprinter, store, validator, refresh
//! coordinator and sync engine together behind one facade, and owns the
//! observable [`AuthenticationState`]. Hosts construct one engine per
//! process, subscribe to state and events, and drive it through
//! `bootstrap`, `login`, `seamless_login`, `authenticate` and `logout`.

use std::sync::Arc;

use sceau_crypto_core::{constant_time_eq, generate_device_id};
use tokio::sync::{broadcast, watch};
use tracing::{info, instrument, warn};

use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::device::{DeviceAttributes, Fingerprinter};
use crate::error::{AuthError, AuthErrorKind};
use crate::events::{AuthEvent, EventBus};
use crate::kv::KeyValueStore;
use crate::model::{AuthResult, AuthenticationState, DeviceToken};
use crate::refresh::{RefreshCoordinator, RefreshStatus};
use crate::store::TokenStore;
use crate::sync::{DeviceSync, ExportableTokenData, ImportOutcome};
use crate::validator::{TokenValidator, ValidationError};

/// Aggregate status snapshot for diagnostics and UI.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AuthStatus {
    /// Current state machine position.
    pub state: AuthenticationState,
    /// A stored, unexpired token exists.
    pub has_valid_token: bool,
    /// The bound user id, if any.
    pub user_id: Option<String>,
    /// The stored device id, if any.
    pub device_id: Option<String>,
    /// Refresh coordinator snapshot.
    pub refresh: RefreshStatus,
}

// ---------------------------------------------------------------------------
// Engine
// ---------------------------------------------------------------------------

/// Top-level device authentication engine.
#[derive(Debug)]
pub struct AuthEngine {
    store: TokenStore,
    validator: TokenValidator,
    refresh: Arc<RefreshCoordinator>,
    sync: DeviceSync,
    fingerprinter: Fingerprinter,
    clock: Arc<dyn Clock>,
    config: AuthConfig,
    app_version: String,
    events: EventBus,
    state: watch::Sender<AuthenticationState>,
}

impl AuthEngine {
    /// Assemble an engine over the injected storage backend and device
    /// attributes.
    #[must_use]
    pub fn new(
        kv: Arc<dyn KeyValueStore>,
        attributes: DeviceAttributes,
        clock: Arc<dyn Clock>,
        config: AuthConfig,
        app_version: impl Into<String>,
    ) -> Self {
        let app_version = app_version.into();
        let events = EventBus::new();
        let fingerprinter = Fingerprinter::new(attributes, clock.clone());
        let store = TokenStore::new(kv, fingerprinter.clone(), clock.clone(), config.clone());
        let validator = TokenValidator::new(fingerprinter.clone(), clock.clone(), config.clone());
        let refresh = Arc::new(RefreshCoordinator::new(
            store.clone(),
            fingerprinter.clone(),
            clock.clone(),
            config.clone(),
            events.clone(),
            app_version.clone(),
        ));
        let sync = DeviceSync::new(
            store.clone(),
            fingerprinter.clone(),
            clock.clone(),
            config.clone(),
            events.clone(),
            app_version.clone(),
        );
        let (state, _) = watch::channel(AuthenticationState::Unknown);

        Self {
            store,
            validator,
            refresh,
            sync,
            fingerprinter,
            clock,
            config,
            app_version,
            events,
            state,
        }
    }

    /// Watch state machine transitions.
    #[must_use]
    pub fn subscribe_state(&self) -> watch::Receiver<AuthenticationState> {
        self.state.subscribe()
    }

    /// Subscribe to token lifecycle events.
    #[must_use]
    pub fn subscribe_events(&self) -> broadcast::Receiver<AuthEvent> {
        self.events.subscribe()
    }

    /// The current state machine position.
    #[must_use]
    pub fn current_state(&self) -> AuthenticationState {
        *self.state.borrow()
    }

    fn set_state(&self, next: AuthenticationState) {
        self.state.send_replace(next);
    }

    /// Establish the initial state from stored data, without minting
    /// anything.
    ///
    /// # Errors
    ///
    /// Storage failures while reading or self-healing stored state.
    pub fn bootstrap(&self) -> Result<AuthenticationState, AuthError> {
        self.set_state(AuthenticationState::Checking);

        let next = match self.store.load()? {
            Some(token)
                if self.validator.validate(&token, &self.app_version).is_valid
                    && self.store.user_id().is_some() =>
            {
                AuthenticationState::Authenticated
            }
            _ => AuthenticationState::NotAuthenticated,
        };
        self.set_state(next);
        Ok(next)
    }

    /// Log in with the stored token. Fails when no token is stored; use
    /// [`Self::seamless_login`] to mint one instead.
    #[instrument(skip(self))]
    pub fn login(&self) -> AuthResult {
        self.set_state(AuthenticationState::Authenticating);

        let result = match self.store.load() {
            Ok(Some(stored)) => {
                let token = stored.token.clone();
                self.authenticate_stored(&token)
            }
            Ok(None) => AuthResult::failure(
                "no token stored on this device",
                AuthErrorKind::TokenInvalid,
            ),
            Err(e) => AuthResult::from(e),
        };
        self.finish(&result);
        result
    }

    /// Seamless login: authenticate with the stored token, or mint a new
    /// device-bound identity when none exists or the stored one no longer
    /// authenticates (expired, revoked, too old). The zero-friction
    /// first-run path.
    #[instrument(skip(self))]
    pub fn seamless_login(&self) -> AuthResult {
        self.set_state(AuthenticationState::Authenticating);

        let result = match self.store.load() {
            Ok(Some(stored)) => {
                let token = stored.token.clone();
                let result = self.authenticate_stored(&token);
                if result.is_success {
                    result
                } else {
                    info!(
                        kind = ?result.error_kind,
                        "stored token no longer authenticates, minting a fresh identity"
                    );
                    self.first_run()
                }
            }
            Ok(None) => self.first_run(),
            Err(e) => AuthResult::from(e),
        };
        self.finish(&result);
        result
    }

    /// Validate a supplied token against the stored one.
    #[instrument(skip(self, token))]
    pub fn authenticate(&self, token: &str) -> AuthResult {
        self.set_state(AuthenticationState::Authenticating);
        let result = self.authenticate_stored(token);
        self.finish(&result);
        result
    }

    /// `authenticate` with retries: recoverable failures are retried up to
    /// the configured attempt count with a linearly growing delay, each
    /// attempt capped by the configured timeout.
    ///
    /// Each attempt runs on the blocking pool: authentication does KDF and
    /// storage work, which must not stall the async threads and must stay
    /// interruptible by the timeout.
    pub async fn authenticate_with_retry(self: &Arc<Self>, token: &str) -> AuthResult {
        let mut last = AuthResult::failure("no attempts were made", AuthErrorKind::UnknownError);

        for attempt in 1..=self.config.max_retry_attempts.max(1) {
            let task = {
                let engine = Arc::clone(self);
                let token = token.to_owned();
                tokio::task::spawn_blocking(move || engine.authenticate(&token))
            };

            last = match tokio::time::timeout(self.config.attempt_timeout(), task).await {
                Ok(Ok(result)) => result,
                Ok(Err(e)) => AuthResult::failure(
                    format!("authentication task failed: {e}"),
                    AuthErrorKind::UnknownError,
                ),
                Err(_) => AuthResult::failure(
                    "authentication attempt timed out",
                    AuthErrorKind::NetworkError,
                ),
            };

            if last.is_success {
                return last;
            }
            let recoverable = last.error_kind.is_some_and(AuthErrorKind::is_recoverable);
            if !recoverable || attempt >= self.config.max_retry_attempts {
                return last;
            }

            warn!(attempt, "authentication failed, retrying");
            let delay = self.config.retry_delay().saturating_mul(attempt);
            tokio::time::sleep(delay).await;
        }
        last
    }

    /// Revoke the stored token and drop the session.
    ///
    /// # Errors
    ///
    /// Storage failures while wiping the slots.
    pub fn logout(&self) -> Result<(), AuthError> {
        let revoked = self.store.load()?.map(|t| t.token);
        self.store.clear()?;
        if let Some(token) = revoked {
            self.events.emit(AuthEvent::TokenRevoked { token });
        }
        self.set_state(AuthenticationState::NotAuthenticated);
        info!("logged out, stored token revoked");
        Ok(())
    }

    /// Produce a sync code for pairing another device.
    ///
    /// # Errors
    ///
    /// See [`DeviceSync::generate_sync_code`].
    pub fn generate_sync_code(&self) -> Result<String, AuthError> {
        self.sync.generate_sync_code()
    }

    /// Build the full export record for direct device-to-device transfer.
    ///
    /// # Errors
    ///
    /// See [`DeviceSync::export_for_sync`].
    pub fn export_for_sync(&self) -> Result<ExportableTokenData, AuthError> {
        self.sync.export_for_sync()
    }

    /// Import an identity from another device's sync code.
    ///
    /// # Errors
    ///
    /// Storage and crypto failures while persisting the imported identity.
    pub fn import_from_sync_code(&self, code: &str) -> Result<ImportOutcome, AuthError> {
        let outcome = self.sync.import_from_sync_code(code)?;
        if matches!(outcome, ImportOutcome::Imported { .. }) {
            self.set_state(AuthenticationState::Authenticated);
        }
        Ok(outcome)
    }

    /// Start the background refresh monitor.
    pub fn start_auto_refresh(&self) {
        self.refresh.start_auto_refresh();
    }

    /// Stop the background refresh monitor.
    pub fn stop_auto_refresh(&self) {
        self.refresh.stop_auto_refresh();
    }

    /// Aggregate status snapshot.
    #[must_use]
    pub fn status(&self) -> AuthStatus {
        let metadata = self.store.load_metadata();
        AuthStatus {
            state: self.current_state(),
            has_valid_token: self.store.has_valid_token(),
            user_id: self.store.user_id(),
            device_id: metadata.map(|m| m.device_id),
            refresh: self.refresh.status(),
        }
    }

    // -- internals ----------------------------------------------------------

    /// First run: mint a device-bound identity and a user id for it.
    fn first_run(&self) -> AuthResult {
        let outcome = (|| -> Result<AuthResult, AuthError> {
            let info = self.fingerprinter.collect(&self.app_version);
            let token = DeviceToken::mint(
                info,
                self.config.token_expiration_days,
                self.clock.now_millis(),
            )?;
            self.store.store(&token)?;

            let user_id = format!("user_{}", generate_device_id());
            self.store.set_user_id(&user_id)?;

            info!(device_id = %token.device_id, "new device identity minted");
            self.events.emit(AuthEvent::TokenGenerated {
                token: token.clone(),
            });
            Ok(AuthResult::success(user_id, Some(token)))
        })();
        outcome.unwrap_or_else(AuthResult::from)
    }

    /// Core check: supplied token must match the stored one and pass every
    /// validation rule. Rotates inline when the token is inside the
    /// refresh window.
    fn authenticate_stored(&self, supplied: &str) -> AuthResult {
        if !self.validator.quick_validate_format(supplied) {
            return AuthResult::failure("token format is invalid", AuthErrorKind::TokenInvalid);
        }

        let stored = match self.store.load() {
            Ok(Some(stored)) => stored,
            Ok(None) => {
                return AuthResult::failure("no token stored on this device", AuthErrorKind::TokenInvalid)
            }
            Err(e) => return AuthResult::from(e),
        };

        if !constant_time_eq(supplied.as_bytes(), stored.token.as_bytes()) {
            return AuthResult::failure(
                "token does not match this device",
                AuthErrorKind::TokenInvalid,
            );
        }

        let report = self.validator.validate(&stored, &self.app_version);
        if let Some(primary) = report.primary_error() {
            let kind = match primary {
                ValidationError::Expired => AuthErrorKind::TokenExpired,
                ValidationError::DeviceChanged => AuthErrorKind::DeviceNotRecognized,
                ValidationError::Format | ValidationError::Inactive | ValidationError::TooOld => {
                    AuthErrorKind::TokenInvalid
                }
            };
            return AuthResult::failure(primary.to_string(), kind);
        }

        let user_id = self
            .store
            .user_id()
            .unwrap_or_else(|| stored.device_id.clone());

        let new_token = if report.needs_refresh {
            match self.refresh.force_refresh() {
                Ok(rotated) => Some(rotated),
                // Another refresh is already rotating; this auth still stands.
                Err(AuthError::RefreshInProgress) => None,
                Err(e) => {
                    warn!(error = %e, "inline token refresh failed");
                    None
                }
            }
        } else {
            None
        };

        AuthResult::success(user_id, new_token)
    }

    /// Publish the terminal state and event for a finished use case.
    fn finish(&self, result: &AuthResult) {
        if result.is_success {
            if let Some(user_id) = &result.user_id {
                self.events.emit(AuthEvent::AuthSuccess {
                    user_id: user_id.clone(),
                });
            }
            self.set_state(AuthenticationState::Authenticated);
            return;
        }

        let kind = result.error_kind.unwrap_or(AuthErrorKind::UnknownError);
        self.events.emit(AuthEvent::AuthFailure {
            kind,
            message: result
                .error_message
                .clone()
                .unwrap_or_else(|| "authentication failed".into()),
        });
        let next = match kind {
            AuthErrorKind::EncryptionError | AuthErrorKind::UnknownError => {
                AuthenticationState::Error
            }
            _ => AuthenticationState::NotAuthenticated,
        };
        self.set_state(next);
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------
