// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./parlo.toml` > `~/.config/parlo/parlo.toml` > `/etc/parlo/parlo.toml`
//! with environment variable overrides via `PARLO_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::ParloConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/parlo/parlo.toml` (system-wide)
/// 3. `~/.config/parlo/parlo.toml` (user XDG config)
/// 4. `./parlo.toml` (local directory)
/// 5. `PARLO_*` environment variables
pub fn load_config() -> Result<ParloConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ParloConfig::default()))
        .merge(Toml::file("/etc/parlo/parlo.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("parlo/parlo.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("parlo.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup, no env).
///
/// Used for testing and explicit config specification.
pub fn load_config_from_str(toml_content: &str) -> Result<ParloConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ParloConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<ParloConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(ParloConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for section-to-dot mapping.
///
/// CRITICAL: Uses `Env::map()` NOT `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names. For example, `PARLO_TELEGRAM_BOT_TOKEN` must
/// map to `telegram.bot_token`, not `telegram.bot.token`.
fn env_provider() -> Env {
    Env::prefixed("PARLO_").map(|key| {
        // `key` is the lowercased env var name with prefix stripped.
        // Example: PARLO_GATEWAY_ADMIN_TOKEN -> "gateway_admin_token"
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("relay_", "relay.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("gateway_", "gateway.", 1)
            .replacen("assignment_", "assignment.", 1)
            .replacen("notify_", "notify.", 1)
            .replacen("telegram_", "telegram.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_files() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.relay.name, "parlo");
        assert_eq!(config.relay.default_language, "en");
        assert_eq!(config.relay.languages, vec!["en"]);
        assert_eq!(config.assignment.interval_secs, 5);
        assert_eq!(config.notify.timeout_ms, 5000);
        assert!(config.gateway.enabled);
        assert!(config.gateway.admin_token.is_none());
        assert!(config.operators.is_empty());
    }

    #[test]
    fn toml_overrides_defaults() {
        let config = load_config_from_str(
            r#"
[relay]
default_language = "ru"
languages = ["ru", "en"]

[gateway]
port = 9000
admin_token = "secret"

[[operators]]
name = "alice"
languages = ["ru"]
capacity = 3
token = "op-token-alice"
"#,
        )
        .unwrap();
        assert_eq!(config.relay.default_language, "ru");
        assert_eq!(config.gateway.port, 9000);
        assert_eq!(config.gateway.admin_token.as_deref(), Some("secret"));
        assert_eq!(config.operators.len(), 1);
        assert_eq!(config.operators[0].name, "alice");
        assert_eq!(config.operators[0].capacity, 3);
    }

    #[test]
    #[serial_test::serial]
    fn env_var_overrides_use_section_mapping() {
        // SAFETY: test is serialized; no other thread reads the environment.
        unsafe {
            std::env::set_var("PARLO_TELEGRAM_BOT_TOKEN", "123:abc");
            std::env::set_var("PARLO_GATEWAY_BIND_ADDRESS", "0.0.0.0");
        }
        let config = Figment::new()
            .merge(Serialized::defaults(ParloConfig::default()))
            .merge(env_provider())
            .extract::<ParloConfig>()
            .unwrap();
        unsafe {
            std::env::remove_var("PARLO_TELEGRAM_BOT_TOKEN");
            std::env::remove_var("PARLO_GATEWAY_BIND_ADDRESS");
        }
        // bot_token must land at telegram.bot_token, not telegram.bot.token.
        assert_eq!(config.telegram.bot_token.as_deref(), Some("123:abc"));
        assert_eq!(config.gateway.bind_address, "0.0.0.0");
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = load_config_from_str(
            r#"
[relay]
default_languag = "en"
"#,
        );
        assert!(result.is_err());
    }
}
