// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Post-deserialization validation for configuration values.
//!
//! Validates semantic constraints that cannot be expressed via serde attributes,
//! such as valid bind addresses, language consistency, and unique operator tokens.

use std::collections::HashSet;

use crate::diagnostic::ConfigError;
use crate::model::ParloConfig;

/// Validate a deserialized configuration for semantic correctness.
///
/// Returns `Ok(())` if all validations pass, or `Err(Vec<ConfigError>)` with
/// all collected validation errors (does not fail fast).
pub fn validate_config(config: &ParloConfig) -> Result<(), Vec<ConfigError>> {
    let mut errors = Vec::new();

    // Validate the language roster
    if config.relay.languages.is_empty() {
        errors.push(ConfigError::Validation {
            message: "relay.languages must not be empty".to_string(),
        });
    }

    for (i, lang) in config.relay.languages.iter().enumerate() {
        if !is_language_code(lang) {
            errors.push(ConfigError::Validation {
                message: format!(
                    "relay.languages[{i}] `{lang}` is not a language code (expected 2-8 lowercase letters)"
                ),
            });
        }
    }

    if !config.relay.languages.is_empty()
        && !config.relay.languages.contains(&config.relay.default_language)
    {
        errors.push(ConfigError::Validation {
            message: format!(
                "relay.default_language `{}` is not in relay.languages",
                config.relay.default_language
            ),
        });
    }

    if config.relay.inbox_capacity == 0 {
        errors.push(ConfigError::Validation {
            message: "relay.inbox_capacity must be at least 1".to_string(),
        });
    }

    // Validate database_path is not empty
    if config.storage.database_path.trim().is_empty() {
        errors.push(ConfigError::Validation {
            message: "storage.database_path must not be empty".to_string(),
        });
    }

    // Validate bind_address looks like a valid IP or hostname
    let addr = config.gateway.bind_address.trim();
    if addr.is_empty() {
        errors.push(ConfigError::Validation {
            message: "gateway.bind_address must not be empty".to_string(),
        });
    } else {
        let is_valid_ip = addr.parse::<std::net::IpAddr>().is_ok();
        let is_valid_hostname = addr
            .chars()
            .all(|c| c.is_alphanumeric() || c == '.' || c == '-' || c == ':');
        if !is_valid_ip && !is_valid_hostname {
            errors.push(ConfigError::Validation {
                message: format!(
                    "gateway.bind_address `{addr}` is not a valid IP address or hostname"
                ),
            });
        }
    }

    if config.gateway.port == 0 {
        errors.push(ConfigError::Validation {
            message: "gateway.port must not be 0".to_string(),
        });
    }

    // Assignment loop bounds
    if config.assignment.interval_secs == 0 {
        errors.push(ConfigError::Validation {
            message: "assignment.interval_secs must be at least 1".to_string(),
        });
    }

    if config.assignment.default_capacity == 0 {
        errors.push(ConfigError::Validation {
            message: "assignment.default_capacity must be at least 1".to_string(),
        });
    }

    if config.notify.timeout_ms == 0 {
        errors.push(ConfigError::Validation {
            message: "notify.timeout_ms must be at least 1".to_string(),
        });
    }

    // Validate operators: non-empty names and tokens, no duplicates
    let mut seen_names = HashSet::new();
    let mut seen_tokens = HashSet::new();
    for (i, op) in config.operators.iter().enumerate() {
        if op.name.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("operators[{i}].name must not be empty"),
            });
        } else if !seen_names.insert(&op.name) {
            errors.push(ConfigError::Validation {
                message: format!("duplicate operator name `{}` in [[operators]] array", op.name),
            });
        }

        if op.token.trim().is_empty() {
            errors.push(ConfigError::Validation {
                message: format!("operators[{i}].token must not be empty"),
            });
        } else if !seen_tokens.insert(&op.token) {
            errors.push(ConfigError::Validation {
                message: format!("operators[{i}].token duplicates another operator's token"),
            });
        }

        for lang in &op.languages {
            if !is_language_code(lang) {
                errors.push(ConfigError::Validation {
                    message: format!(
                        "operators[{i}] language `{lang}` is not a language code (expected 2-8 lowercase letters)"
                    ),
                });
            }
        }
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

fn is_language_code(s: &str) -> bool {
    (2..=8).contains(&s.len()) && s.chars().all(|c| c.is_ascii_lowercase())
}
