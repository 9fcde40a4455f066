#![allow(clippy::unwrap_used, clippy::arithmetic_side_effects)]

//! Property tests: the sync-code parser must never panic or accept
//! garbage, and the token timing rules must hold for arbitrary clocks.

use std::sync::Arc;

use proptest::prelude::*;
use sceau_auth::{
    AuthConfig, AuthEngine, DeviceAttributes, DeviceInfo, DeviceToken, ManualClock, MemoryStore,
};

const START: u64 = 1_700_000_000_000;

fn engine() -> AuthEngine {
    AuthEngine::new(
        Arc::new(MemoryStore::new()),
        DeviceAttributes {
            manufacturer: Some("Acme".into()),
            model: Some("Pixelated 9".into()),
            board: Some("g9".into()),
            hardware: Some("g9-rev2".into()),
            product: Some("pixelated".into()),
            install_id: Some("install-a".into()),
            os_version: Some("Android 14".into()),
        },
        Arc::new(ManualClock::new(START)),
        AuthConfig::default(),
        "1.0.0",
    )
}

fn info() -> DeviceInfo {
    DeviceInfo {
        device_model: "Acme Pixelated 9".into(),
        os_version: "Android 14".into(),
        app_version: "1.0.0".into(),
        fingerprint: "f".repeat(64),
        registered_at: START,
    }
}

proptest! {
    #[test]
    fn arbitrary_sync_codes_are_rejected_without_panicking(code in ".{0,512}") {
        let e = engine();
        let outcome = e.import_from_sync_code(&code).expect("import never errors on bad input");
        let rejected = matches!(&outcome, sceau_auth::ImportOutcome::Rejected { .. });
        prop_assert!(rejected, "unexpected outcome: {:?}", outcome);
    }

    #[test]
    fn arbitrary_tokens_never_authenticate_on_a_fresh_device(token in "[a-f0-9]{32,128}") {
        let e = engine();
        e.seamless_login();
        // Chance of colliding with the 64-hex stored token is negligible.
        let result = e.authenticate(&token);
        prop_assert!(!result.is_success);
    }

    #[test]
    fn timing_rules_are_consistent(
        expiration_days in 1u32..=365,
        threshold_days in 0u32..=365,
        elapsed in 0u64..=40_000_000_000,
    ) {
        let token = DeviceToken::mint(info(), expiration_days, START)
            .expect("mint should succeed");
        let now = START + elapsed;
        let threshold = u64::from(threshold_days) * 86_400_000;

        // needs_refresh only applies to live tokens.
        if token.needs_refresh(now, threshold) {
            prop_assert!(!token.is_expired(now));
            prop_assert!(token.remaining_millis(now) < threshold);
        }
        // Expired tokens report zero remaining lifetime.
        if token.is_expired(now) {
            prop_assert_eq!(token.remaining_millis(now), 0);
        }
        prop_assert!(token.expires_at > token.created_at);
    }
}
