/*
 * Copyright 2025 Security Union LLC
 *
 * Licensed under either of
 *
 * * Apache License, Version 2.0
 *   (http://www.apache.org/licenses/LICENSE-2.0)
 * * MIT license
 *   (http://opensource.org/licenses/MIT)
 *
 * at your option.
 *
 * Unless you explicitly state otherwise, any contribution intentionally
 * submitted for inclusion in the work by you, as defined in the Apache-2.0
 * license, shall be dual licensed as above, without any additional terms or
 * conditions.
 */

use std::sync::atomic::{AtomicU8, Ordering};
use std::sync::OnceLock;

use crate::error::CallError;
use crate::identity::{encode_peer_id, encode_peer_id_strict, PeerId};

/// Environment variable prefix for feature flags
const ENV_PREFIX: &str = "FEATURE_";

/// Override states for testing
const OVERRIDE_NONE: u8 = 0;
const OVERRIDE_TRUE: u8 = 1;
const OVERRIDE_FALSE: u8 = 2;

static STRICT_IDENTITY_OVERRIDE: AtomicU8 = AtomicU8::new(OVERRIDE_NONE);

/// Feature flags singleton, lazily initialized from environment variables.
#[derive(Debug, Clone)]
pub struct FeatureFlags {
    /// Refuse addresses whose peer identifier would collide with another
    /// address instead of silently dropping characters.
    /// Env: FEATURE_STRICT_IDENTITY=true
    pub strict_identity: bool,
}

impl FeatureFlags {
    fn from_env() -> Self {
        Self {
            strict_identity: read_bool_env("STRICT_IDENTITY"),
        }
    }

    /// Get the global feature flags instance.
    /// Lazily initialized on first call.
    pub fn global() -> &'static Self {
        static FLAGS: OnceLock<FeatureFlags> = OnceLock::new();
        FLAGS.get_or_init(FeatureFlags::from_env)
    }

    #[inline]
    pub fn strict_identity_enabled() -> bool {
        match STRICT_IDENTITY_OVERRIDE.load(Ordering::SeqCst) {
            OVERRIDE_TRUE => true,
            OVERRIDE_FALSE => false,
            _ => Self::global().strict_identity,
        }
    }

    /// Encodes `email` with whichever identity policy is active.
    pub fn peer_id_for(email: &str) -> Result<PeerId, CallError> {
        if Self::strict_identity_enabled() {
            encode_peer_id_strict(email)
        } else {
            Ok(encode_peer_id(email))
        }
    }

    /// Only available with the `testing` feature enabled.
    #[cfg(any(test, feature = "testing"))]
    pub fn set_strict_identity_override(enabled: bool) {
        let value = if enabled { OVERRIDE_TRUE } else { OVERRIDE_FALSE };
        STRICT_IDENTITY_OVERRIDE.store(value, Ordering::SeqCst);
    }

    #[cfg(any(test, feature = "testing"))]
    pub fn clear_strict_identity_override() {
        STRICT_IDENTITY_OVERRIDE.store(OVERRIDE_NONE, Ordering::SeqCst);
    }
}

/// Read a boolean environment variable with the FEATURE_ prefix.
/// Returns false if not set or not a truthy value.
fn read_bool_env(name: &str) -> bool {
    let full_name = format!("{ENV_PREFIX}{name}");
    std::env::var(&full_name)
        .map(|v| matches!(v.to_lowercase().as_str(), "true" | "1" | "yes"))
        .unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_read_bool_env_not_set() {
        std::env::remove_var("FEATURE_PEERCALL_UNSET");
        assert!(!read_bool_env("PEERCALL_UNSET"));
    }

    #[test]
    fn test_read_bool_env_truthy_values() {
        std::env::set_var("FEATURE_PEERCALL_TRUE", "TRUE");
        assert!(read_bool_env("PEERCALL_TRUE"));

        std::env::set_var("FEATURE_PEERCALL_ONE", "1");
        assert!(read_bool_env("PEERCALL_ONE"));

        std::env::set_var("FEATURE_PEERCALL_NO", "no");
        assert!(!read_bool_env("PEERCALL_NO"));

        std::env::remove_var("FEATURE_PEERCALL_TRUE");
        std::env::remove_var("FEATURE_PEERCALL_ONE");
        std::env::remove_var("FEATURE_PEERCALL_NO");
    }

    // The override is process-global, so both policies are checked in one test.
    #[test]
    fn test_peer_id_for_follows_override() {
        FeatureFlags::set_strict_identity_override(true);
        assert!(FeatureFlags::peer_id_for("a+b@x.com").is_err());

        FeatureFlags::set_strict_identity_override(false);
        assert_eq!(
            FeatureFlags::peer_id_for("a+b@x.com").unwrap().as_str(),
            "ab-at-x-dot-com"
        );

        FeatureFlags::clear_strict_identity_override();
    }
}
