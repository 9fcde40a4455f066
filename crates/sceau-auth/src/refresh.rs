//! Token refresh and rotation.
//!
//! A single-flight guard makes sure at most one refresh runs at a time:
//! concurrent periodic checks skip silently, concurrent forced refreshes
//! fail fast with [`AuthError::RefreshInProgress`]. Rotation keeps the
//! device identity and user binding; expiry recovery mints a whole new
//! identity.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::config::AuthConfig;
use crate::device::Fingerprinter;
use crate::error::AuthError;
use crate::events::{AuthEvent, EventBus};
use crate::model::DeviceToken;
use crate::store::TokenStore;

/// Interval between periodic refresh checks.
const CHECK_INTERVAL: Duration = Duration::from_secs(24 * 60 * 60);

/// Backoff after a failed periodic check.
const ERROR_BACKOFF: Duration = Duration::from_secs(60 * 60);

/// Snapshot of the coordinator's state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RefreshStatus {
    /// A refresh is currently executing.
    pub is_refreshing: bool,
    /// The stored token is inside the refresh window.
    pub needs_refresh: bool,
    /// The configuration allows the background monitor to run.
    pub auto_refresh_enabled: bool,
    /// The background monitor task is running.
    pub is_monitoring: bool,
}

/// RAII single-flight permit. Releases the flag on drop, panics included.
#[derive(Debug)]
struct InFlightGuard {
    flag: Arc<AtomicBool>,
}

impl Drop for InFlightGuard {
    fn drop(&mut self) {
        self.flag.store(false, Ordering::Release);
    }
}

// ---------------------------------------------------------------------------
// Coordinator
// ---------------------------------------------------------------------------

/// Coordinates token rotation, expiry recovery and the background monitor.
#[derive(Debug)]
pub struct RefreshCoordinator {
    store: TokenStore,
    fingerprinter: Fingerprinter,
    clock: Arc<dyn Clock>,
    config: AuthConfig,
    events: EventBus,
    app_version: String,
    in_flight: Arc<AtomicBool>,
    monitor: Mutex<Option<JoinHandle<()>>>,
}

impl RefreshCoordinator {
    /// Create a coordinator over the shared store.
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
            in_flight: Arc::new(AtomicBool::new(false)),
            monitor: Mutex::new(None),
        }
    }

    /// Try to take the single-flight permit.
    fn try_begin(&self) -> Option<InFlightGuard> {
        self.in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| InFlightGuard {
                flag: Arc::clone(&self.in_flight),
            })
    }

    /// Periodic check: recover from expiry or rotate inside the refresh
    /// window. Returns whether a new token was minted.
    ///
    /// A check that finds another refresh in flight skips silently — the
    /// next interval will pick it up.
    ///
    /// # Errors
    ///
    /// Propagates storage and crypto failures from the rotation itself.
    pub fn check_and_refresh_if_needed(&self) -> Result<bool, AuthError> {
        let Some(current) = self.store.load()? else {
            return Ok(false);
        };

        let now = self.clock.now_millis();
        if current.is_expired(now) {
            let Some(_guard) = self.try_begin() else {
                return Ok(false);
            };
            self.handle_expiration(&current)?;
            return Ok(true);
        }

        if !current.needs_refresh(now, self.config.refresh_threshold_millis()) {
            return Ok(false);
        }

        let Some(_guard) = self.try_begin() else {
            debug!("refresh already in flight, skipping periodic check");
            return Ok(false);
        };
        self.rotate(&current)?;
        Ok(true)
    }

    /// Rotate the stored token now, regardless of the refresh window.
    ///
    /// # Errors
    ///
    /// [`AuthError::RefreshInProgress`] if another refresh holds the
    /// permit, [`AuthError::NoToken`] if nothing is stored.
    pub fn force_refresh(&self) -> Result<DeviceToken, AuthError> {
        let Some(_guard) = self.try_begin() else {
            return Err(AuthError::RefreshInProgress);
        };
        let current = self.store.load()?.ok_or(AuthError::NoToken)?;
        self.rotate(&current)
    }

    /// Mint a replacement for `current`, keeping its device identity and
    /// user binding.
    fn rotate(&self, current: &DeviceToken) -> Result<DeviceToken, AuthError> {
        // store() wipes the user slot, so capture the binding first.
        let user_id = self.store.user_id();

        let info = self.fingerprinter.collect(&self.app_version);
        let mut replacement = DeviceToken::mint(
            info,
            self.config.token_expiration_days,
            self.clock.now_millis(),
        )?;
        replacement.device_id = current.device_id.clone();

        self.store.store(&replacement)?;
        if let Some(user_id) = user_id {
            self.store.set_user_id(&user_id)?;
        }

        info!(device_id = %replacement.device_id, "device token rotated");
        self.events.emit(AuthEvent::TokenRefreshed {
            old_token: current.token.clone(),
            new_token: replacement.clone(),
        });
        Ok(replacement)
    }

    /// Recover from an expired token: wipe it and mint a brand-new device
    /// identity. The previous user binding is intentionally dropped.
    fn handle_expiration(&self, expired: &DeviceToken) -> Result<DeviceToken, AuthError> {
        warn!(device_id = %expired.device_id, "stored token expired, minting a new identity");
        self.store.clear()?;

        let info = self.fingerprinter.collect(&self.app_version);
        let fresh = DeviceToken::mint(
            info,
            self.config.token_expiration_days,
            self.clock.now_millis(),
        )?;
        self.store.store(&fresh)?;

        self.events.emit(AuthEvent::TokenGenerated {
            token: fresh.clone(),
        });
        Ok(fresh)
    }

    /// Start the background monitor: check once per day, back off an hour
    /// after a failed check. A second call replaces the previous monitor.
    pub fn start_auto_refresh(self: &Arc<Self>) {
        if !self.config.auto_refresh_enabled {
            debug!("auto refresh disabled by configuration");
            return;
        }

        // The monitor holds a weak handle so an armed loop cannot keep the
        // coordinator alive after its owner drops it.
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                let Some(coordinator) = weak.upgrade() else { break };
                let delay = match coordinator.check_and_refresh_if_needed() {
                    Ok(_) => CHECK_INTERVAL,
                    Err(e) => {
                        warn!(error = %e, "periodic refresh check failed");
                        ERROR_BACKOFF
                    }
                };
                drop(coordinator);
                tokio::time::sleep(delay).await;
            }
        });

        if let Ok(mut monitor) = self.monitor.lock() {
            if let Some(previous) = monitor.replace(handle) {
                previous.abort();
            }
        }
    }

    /// Stop the background monitor, if running.
    pub fn stop_auto_refresh(&self) {
        if let Ok(mut monitor) = self.monitor.lock() {
            if let Some(handle) = monitor.take() {
                handle.abort();
            }
        }
    }

    /// Run one refresh check after `delay`.
    pub fn schedule_refresh(self: &Arc<Self>, delay: Duration) -> JoinHandle<()> {
        let weak = Arc::downgrade(self);
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let Some(coordinator) = weak.upgrade() else { return };
            if let Err(e) = coordinator.check_and_refresh_if_needed() {
                warn!(error = %e, "scheduled refresh check failed");
            }
        })
    }

    /// Snapshot the coordinator state.
    #[must_use]
    pub fn status(&self) -> RefreshStatus {
        RefreshStatus {
            is_refreshing: self.in_flight.load(Ordering::Acquire),
            needs_refresh: self.store.needs_refresh(),
            auto_refresh_enabled: self.config.auto_refresh_enabled,
            is_monitoring: self
                .monitor
                .lock()
                .map_or(false, |monitor| monitor.is_some()),
        }
    }
}

impl Drop for RefreshCoordinator {
    fn drop(&mut self) {
        self.stop_auto_refresh();
    }
}

// ---------------------------------------------------------------------------
// Unit tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::MILLIS_PER_DAY;
    use crate::device::DeviceAttributes;
    use crate::kv::{KeyValueStore, MemoryStore};

    const START: u64 = 1_700_000_000_000;

    fn attrs() -> DeviceAttributes {
        DeviceAttributes {
            manufacturer: Some("Acme".into()),
            model: Some("Pixelated 9".into()),
            board: Some("g9".into()),
            hardware: Some("g9-rev2".into()),
            product: Some("pixelated".into()),
            install_id: Some("install-a".into()),
            os_version: Some("Android 14".into()),
        }
    }

    fn setup() -> (Arc<RefreshCoordinator>, TokenStore, Arc<ManualClock>) {
        let clock = Arc::new(ManualClock::new(START));
        let kv: Arc<dyn KeyValueStore> = Arc::new(MemoryStore::new());
        let fingerprinter = Fingerprinter::new(attrs(), clock.clone());
        let store = TokenStore::new(
            kv,
            fingerprinter.clone(),
            clock.clone(),
            AuthConfig::default(),
        );
        let coordinator = Arc::new(RefreshCoordinator::new(
            store.clone(),
            fingerprinter,
            clock.clone(),
            AuthConfig::default(),
            EventBus::new(),
            "1.0.0".into(),
        ));
        (coordinator, store, clock)
    }

    fn seed_token(store: &TokenStore, clock: &ManualClock) -> DeviceToken {
        let fingerprinter = Fingerprinter::new(attrs(), Arc::new(ManualClock::new(START)));
        let token = DeviceToken::mint(fingerprinter.collect("1.0.0"), 30, clock.now_millis())
            .expect("mint should succeed");
        store.store(&token).expect("store should succeed");
        token
    }

    #[test]
    fn fresh_token_is_left_alone() {
        let (coordinator, store, clock) = setup();
        seed_token(&store, &clock);
        assert!(!coordinator.check_and_refresh_if_needed().expect("check"));
    }

    #[test]
    fn no_stored_token_is_a_quiet_noop() {
        let (coordinator, _store, _clock) = setup();
        assert!(!coordinator.check_and_refresh_if_needed().expect("check"));
    }

    #[test]
    fn check_rotates_inside_the_refresh_window() {
        let (coordinator, store, clock) = setup();
        let original = seed_token(&store, &clock);
        store.set_user_id("user_abc").expect("set user id");

        clock.advance(24 * MILLIS_PER_DAY);
        assert!(coordinator.check_and_refresh_if_needed().expect("check"));

        let rotated = store.load().expect("load").expect("token present");
        assert_ne!(rotated.token, original.token);
        assert_eq!(rotated.device_id, original.device_id);
        // User binding survives rotation.
        assert_eq!(store.user_id().as_deref(), Some("user_abc"));
    }

    #[test]
    fn expired_token_gets_a_new_identity() {
        let (coordinator, store, clock) = setup();
        let original = seed_token(&store, &clock);
        store.set_user_id("user_abc").expect("set user id");

        clock.advance(31 * MILLIS_PER_DAY);
        assert!(coordinator.check_and_refresh_if_needed().expect("check"));

        let fresh = store.load().expect("load").expect("token present");
        assert_ne!(fresh.token, original.token);
        assert_ne!(fresh.device_id, original.device_id);
        assert!(!fresh.is_expired(clock.now_millis()));
        // Expiry recovery drops the user binding.
        assert_eq!(store.user_id(), None);
    }

    #[test]
    fn force_refresh_rotates_and_returns_the_new_token() {
        let (coordinator, store, clock) = setup();
        let original = seed_token(&store, &clock);

        let rotated = coordinator.force_refresh().expect("force refresh");
        assert_ne!(rotated.token, original.token);
        assert_eq!(rotated.device_id, original.device_id);
        assert_eq!(store.load().expect("load"), Some(rotated));
    }

    #[test]
    fn force_refresh_without_a_token_fails() {
        let (coordinator, _store, _clock) = setup();
        assert!(matches!(
            coordinator.force_refresh(),
            Err(AuthError::NoToken)
        ));
    }

    #[test]
    fn permit_is_single_flight_and_released_on_drop() {
        let (coordinator, _store, _clock) = setup();

        let guard = coordinator.try_begin().expect("first permit");
        assert!(coordinator.try_begin().is_none());
        assert!(coordinator.status().is_refreshing);

        drop(guard);
        assert!(!coordinator.status().is_refreshing);
        assert!(coordinator.try_begin().is_some());
    }

    #[test]
    fn force_refresh_fails_fast_while_a_permit_is_held() {
        let (coordinator, store, clock) = setup();
        seed_token(&store, &clock);

        let _guard = coordinator.try_begin().expect("permit");
        assert!(matches!(
            coordinator.force_refresh(),
            Err(AuthError::RefreshInProgress)
        ));
    }

    #[test]
    fn periodic_check_skips_while_a_permit_is_held() {
        let (coordinator, store, clock) = setup();
        seed_token(&store, &clock);
        clock.advance(24 * MILLIS_PER_DAY);

        let _guard = coordinator.try_begin().expect("permit");
        assert!(!coordinator.check_and_refresh_if_needed().expect("check"));
    }

    #[test]
    fn rotation_emits_a_refresh_event() {
        let (coordinator, store, clock) = setup();
        let original = seed_token(&store, &clock);
        let mut rx = coordinator.events.subscribe();

        let rotated = coordinator.force_refresh().expect("force refresh");
        assert_eq!(
            rx.try_recv().expect("event emitted"),
            AuthEvent::TokenRefreshed {
                old_token: original.token,
                new_token: rotated,
            }
        );
    }

    #[tokio::test]
    async fn monitor_starts_and_stops() {
        let (coordinator, store, clock) = setup();
        seed_token(&store, &clock);

        assert!(!coordinator.status().is_monitoring);
        coordinator.start_auto_refresh();
        assert!(coordinator.status().is_monitoring);
        coordinator.stop_auto_refresh();
        assert!(!coordinator.status().is_monitoring);
    }

    #[tokio::test]
    async fn armed_monitor_does_not_keep_the_coordinator_alive() {
        let (coordinator, store, clock) = setup();
        seed_token(&store, &clock);

        coordinator.start_auto_refresh();
        assert!(coordinator.status().is_monitoring);

        let weak = Arc::downgrade(&coordinator);
        drop(coordinator);
        // The last external handle was the only strong one.
        assert!(weak.upgrade().is_none());
    }

    #[tokio::test]
    async fn monitor_respects_the_config_switch() {
        let (_, store, clock) = setup();
        seed_token(&store, &clock);
        let fingerprinter = Fingerprinter::new(attrs(), clock.clone());
        let coordinator = Arc::new(RefreshCoordinator::new(
            store,
            fingerprinter,
            clock,
            AuthConfig {
                auto_refresh_enabled: false,
                ..AuthConfig::default()
            },
            EventBus::new(),
            "1.0.0".into(),
        ));

        coordinator.start_auto_refresh();
        assert!(!coordinator.status().is_monitoring);
    }
}
