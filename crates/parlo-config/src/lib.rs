// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration system for the Parlo support relay.
//!
//! Provides TOML configuration parsing with strict validation (`deny_unknown_fields`),
//! XDG file hierarchy lookup, environment variable overrides, and Elm-style diagnostic
//! error rendering with typo suggestions.
//!
//! # Usage
//!
//! ```no_run
//! use parlo_config::load_and_validate;
//!
//! let config = load_and_validate().expect("config errors");
//! println!("Relay name: {}", config.relay.name);
//! ```

pub mod diagnostic;
pub mod loader;
pub mod model;
pub mod validation;

pub use diagnostic::{render_errors, ConfigError};
pub use loader::{load_config, load_config_from_path, load_config_from_str};
pub use model::ParloConfig;

/// Load configuration from the XDG hierarchy and validate it.
///
/// This is the high-level entry point that:
/// 1. Loads config from TOML files + env vars via Figment
/// 2. On success: runs post-deserialization validation
/// 3. On Figment error: converts to rich miette diagnostics with typo suggestions
///
/// Returns either a valid `ParloConfig` or a list of diagnostic errors.
pub fn load_and_validate() -> Result<ParloConfig, Vec<ConfigError>> {
    match loader::load_config() {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            // Read TOML source files for error source span information
            let toml_sources = collect_toml_sources();
            Err(diagnostic::figment_to_config_errors(err, &toml_sources))
        }
    }
}

/// Load configuration from a specific TOML string and validate it.
///
/// Useful for testing and explicit configuration.
pub fn load_and_validate_str(toml_content: &str) -> Result<ParloConfig, Vec<ConfigError>> {
    match loader::load_config_from_str(toml_content) {
        Ok(config) => {
            validation::validate_config(&config)?;
            Ok(config)
        }
        Err(err) => {
            let sources = vec![("<inline>".to_string(), toml_content.to_string())];
            Err(diagnostic::figment_to_config_errors(err, &sources))
        }
    }
}

/// Collect TOML source file contents for error span resolution.
fn collect_toml_sources() -> Vec<(String, String)> {
    let mut sources = Vec::new();

    // Local config
    if let Ok(content) = std::fs::read_to_string("parlo.toml") {
        let path = std::env::current_dir()
            .map(|d| d.join("parlo.toml").display().to_string())
            .unwrap_or_else(|_| "parlo.toml".to_string());
        sources.push((path, content));
    }

    // XDG user config
    if let Some(config_dir) = dirs::config_dir() {
        let path = config_dir.join("parlo/parlo.toml");
        if let Ok(content) = std::fs::read_to_string(&path) {
            sources.push((path.display().to_string(), content));
        }
    }

    // System config
    let system_path = std::path::Path::new("/etc/parlo/parlo.toml");
    if let Ok(content) = std::fs::read_to_string(system_path) {
        sources.push((system_path.display().to_string(), content));
    }

    sources
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validate_str_reports_unknown_key_with_suggestion() {
        let errors = load_and_validate_str(
            r#"
[telegram]
bot_tken = "123:abc"
"#,
        )
        .unwrap_err();
        assert!(errors.iter().any(|e| matches!(
            e,
            ConfigError::UnknownKey { key, suggestion, .. }
                if key == "bot_tken" && suggestion.as_deref() == Some("bot_token")
        )));
    }

    #[test]
    fn validate_str_runs_semantic_checks() {
        let errors = load_and_validate_str(
            r#"
[assignment]
interval_secs = 0
"#,
        )
        .unwrap_err();
        assert!(errors.iter().any(
            |e| matches!(e, ConfigError::Validation { message } if message.contains("interval_secs"))
        ));
    }

    #[test]
    fn validate_str_accepts_full_config() {
        let config = load_and_validate_str(
            r#"
[relay]
default_language = "en"
languages = ["en", "ru"]

[storage]
database_path = "/tmp/parlo-test.db"

[gateway]
bind_address = "127.0.0.1"
port = 8090
admin_token = "admin-secret"

[telegram]
bot_token = "123456:test"

[[operators]]
name = "alice"
languages = ["en"]
capacity = 2
token = "op-alice"
"#,
        )
        .unwrap();
        assert_eq!(config.relay.languages.len(), 2);
        assert_eq!(config.operators.len(), 1);
    }
}
