//! # sceau-auth
//!
//! Device-bound authentication engine: opaque token lifecycle, device
//! fingerprinting, encrypted persistence, single-flight refresh and
//! cross-device identity sync.
//!
//! This crate owns the business logic; all cryptographic primitives live in
//! `sceau-crypto-core`. Persistence and time are injected through the
//! [`KeyValueStore`] and [`Clock`] traits so the engine stays deterministic
//! under test and portable across hosts.
//!
//! ## Layout
//!
//! - [`engine`] — the [`AuthEngine`] orchestrator and state machine
//! - [`store`] — encrypted token persistence over the key-value boundary
//! - [`validator`] — the validation rule set
//! - [`refresh`] — rotation, expiry recovery and the background monitor
//! - [`sync`] — short-lived sync codes for device pairing
//! - [`device`] — fingerprinting
//! - [`events`] — broadcast token lifecycle events

#![cfg_attr(test, allow(clippy::unwrap_used, clippy::arithmetic_side_effects))]

pub mod clock;
pub mod config;
pub mod device;
pub mod engine;
pub mod error;
pub mod events;
pub mod kv;
pub mod model;
pub mod refresh;
pub mod store;
pub mod sync;
pub mod validator;

pub use clock::{Clock, ManualClock, SystemClock};
pub use config::{AuthConfig, MILLIS_PER_DAY};
pub use device::{DeviceAttributes, DeviceInfo, Fingerprinter};
pub use engine::{AuthEngine, AuthStatus};
pub use error::{AuthError, AuthErrorKind};
pub use events::{AuthEvent, EventBus};
pub use kv::{Batch, BatchOp, KeyValueStore, MemoryStore};
pub use model::{AuthResult, AuthenticationState, DeviceToken, TokenMetadata};
pub use refresh::{RefreshCoordinator, RefreshStatus};
pub use store::TokenStore;
pub use sync::{
    CompatibilityReport, DeviceSync, ExportableTokenData, ImportOutcome, SyncCodeData,
    SYNC_CODE_TTL_MILLIS,
};
pub use validator::{TokenValidator, ValidationError, ValidationReport};
