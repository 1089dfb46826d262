// crates/dropgate-config/tests/common/mod.rs
// =============================================================================
// Module: Config Test Helpers
// Description: Shared fixtures for config validation tests.
// Purpose: Provide a minimal valid config and a fixed secret environment.
// =============================================================================

//! ## Overview
//! Fixtures shared by the config integration tests.

#![allow(dead_code, reason = "Shared test helpers may be unused in some cases.")]

use std::collections::BTreeMap;

use dropgate_config::ConfigError;
use dropgate_config::DropgateConfig;

/// Base64 of 32 bytes of 0x07.
pub const SEED_B64: &str = "BwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwcHBwc=";
/// Base64 of 32 bytes of 0x09.
pub const ENVELOPE_B64: &str = "CQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQkJCQk=";

/// Minimal config text with one principal.
pub const MINIMAL_TOML: &str = r#"
[server]
bind = "127.0.0.1:8080"

[[identity.principals]]
id = "seller-1"
token_env = "DROPGATE_TOKEN_SELLER"
"#;

/// Parses [`MINIMAL_TOML`].
pub fn minimal_config() -> Result<DropgateConfig, ConfigError> {
    DropgateConfig::from_toml(MINIMAL_TOML)
}

/// Environment holding every default secret variable.
pub fn full_env() -> BTreeMap<String, String> {
    [
        ("DROPGATE_SIGNING_SEED", SEED_B64),
        ("DROPGATE_ENVELOPE_KEY", ENVELOPE_B64),
        ("DROPGATE_WEBHOOK_SECRET", "whsec-test"),
        ("DROPGATE_PAYMENT_API_KEY", "sk-test"),
        ("DROPGATE_TOKEN_SELLER", "seller-token"),
    ]
    .into_iter()
    .map(|(name, value)| (name.to_string(), value.to_string()))
    .collect()
}
