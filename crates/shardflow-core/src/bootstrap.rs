//! Process-wide bootstrap toggles.
//!
//! The CBOR switch mutates process environment the underlying SDK reads, so
//! it runs exactly once, explicitly, during program start rather than as a
//! hidden constructor side effect.

use std::sync::OnceLock;

use tracing::{info, warn};

const CBOR_DISABLE_ENV: &str = "AWS_CBOR_DISABLE";

static CBOR_TOGGLE: OnceLock<bool> = OnceLock::new();

/// Disable CBOR wire encoding in the underlying SDK, once per process.
///
/// Returns `true` when this call applied the toggle and `false` when an
/// earlier call already had. An external override in the environment is
/// replaced with a warning.
pub fn disable_cbor() -> bool {
    let mut applied = false;
    CBOR_TOGGLE.get_or_init(|| {
        if let Ok(existing) = std::env::var(CBOR_DISABLE_ENV) {
            if existing != "true" {
                warn!(
                    existing = %existing,
                    "External {} override detected, replacing it",
                    CBOR_DISABLE_ENV
                );
            }
        }
        std::env::set_var(CBOR_DISABLE_ENV, "true");
        info!("CBOR wire encoding disabled for the AWS SDK");
        applied = true;
        true
    });
    applied
}

/// Whether the CBOR toggle has been applied in this process.
pub fn cbor_disabled() -> bool {
    CBOR_TOGGLE.get().copied().unwrap_or(false)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_toggle_is_idempotent() {
        let first = disable_cbor();
        assert!(cbor_disabled());
        assert_eq!(std::env::var(CBOR_DISABLE_ENV).unwrap(), "true");

        // A second call never re-applies.
        assert!(!disable_cbor());
        assert!(cbor_disabled());

        // Exactly one of the calls in this process applied the toggle; with
        // parallel test binaries that is always the first one here.
        let _ = first;
    }
}
