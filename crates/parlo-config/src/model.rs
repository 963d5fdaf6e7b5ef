// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the Parlo support relay.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level Parlo configuration.
///
/// Loaded from TOML files following XDG hierarchy, with environment variable overrides.
/// All sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ParloConfig {
    /// Relay identity and routing settings.
    #[serde(default)]
    pub relay: RelayConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// HTTP gateway settings.
    #[serde(default)]
    pub gateway: GatewayConfig,

    /// Operator assignment loop settings.
    #[serde(default)]
    pub assignment: AssignmentConfig,

    /// Outbound notification settings.
    #[serde(default)]
    pub notify: NotifyConfig,

    /// Telegram bootstrap settings.
    #[serde(default)]
    pub telegram: TelegramConfig,

    /// Provisioned operators, synced into storage at startup.
    #[serde(default)]
    pub operators: Vec<OperatorConfig>,
}

/// Relay identity and routing configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RelayConfig {
    /// Display name of the relay instance.
    #[serde(default = "default_relay_name")]
    pub name: String,

    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,

    /// Language assigned to users who never picked one.
    #[serde(default = "default_language")]
    pub default_language: String,

    /// Languages offered during onboarding.
    #[serde(default = "default_languages")]
    pub languages: Vec<String>,

    /// Capacity of the shared inbound event queue.
    #[serde(default = "default_inbox_capacity")]
    pub inbox_capacity: usize,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            name: default_relay_name(),
            log_level: default_log_level(),
            default_language: default_language(),
            languages: default_languages(),
            inbox_capacity: default_inbox_capacity(),
        }
    }
}

fn default_relay_name() -> String {
    "parlo".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_languages() -> Vec<String> {
    vec!["en".to_string()]
}

fn default_inbox_capacity() -> usize {
    512
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL (Write-Ahead Logging) mode for SQLite.
    #[serde(default = "default_wal_mode")]
    pub wal_mode: bool,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            wal_mode: default_wal_mode(),
        }
    }
}

fn default_database_path() -> String {
    dirs::data_dir()
        .map(|p| p.join("parlo").join("parlo.db"))
        .unwrap_or_else(|| std::path::PathBuf::from("parlo.db"))
        .to_string_lossy()
        .into_owned()
}

fn default_wal_mode() -> bool {
    true
}

/// HTTP gateway configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct GatewayConfig {
    /// Enable the HTTP gateway. When false, only channel adapters run.
    #[serde(default = "default_gateway_enabled")]
    pub enabled: bool,

    /// Address to bind the gateway to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,

    /// Port to bind the gateway to.
    #[serde(default = "default_gateway_port")]
    pub port: u16,

    /// Bearer token for the admin surface (`/bot/*`). `None` disables
    /// admin routes entirely.
    #[serde(default)]
    pub admin_token: Option<String>,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            enabled: default_gateway_enabled(),
            bind_address: default_bind_address(),
            port: default_gateway_port(),
            admin_token: None,
        }
    }
}

fn default_gateway_enabled() -> bool {
    true
}

fn default_bind_address() -> String {
    "127.0.0.1".to_string()
}

fn default_gateway_port() -> u16 {
    8090
}

/// Operator assignment loop configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AssignmentConfig {
    /// Seconds between assignment scans.
    #[serde(default = "default_assignment_interval_secs")]
    pub interval_secs: u64,

    /// Capacity assumed for operators with no explicit capacity.
    #[serde(default = "default_operator_capacity")]
    pub default_capacity: u32,
}

impl Default for AssignmentConfig {
    fn default() -> Self {
        Self {
            interval_secs: default_assignment_interval_secs(),
            default_capacity: default_operator_capacity(),
        }
    }
}

fn default_assignment_interval_secs() -> u64 {
    5
}

fn default_operator_capacity() -> u32 {
    1
}

/// Outbound notification configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct NotifyConfig {
    /// Milliseconds before an outbound channel call is abandoned.
    #[serde(default = "default_notify_timeout_ms")]
    pub timeout_ms: u64,

    /// Milliseconds to wait before the single retry of a failed send.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,
}

impl Default for NotifyConfig {
    fn default() -> Self {
        Self {
            timeout_ms: default_notify_timeout_ms(),
            retry_delay_ms: default_retry_delay_ms(),
        }
    }
}

fn default_notify_timeout_ms() -> u64 {
    5000
}

fn default_retry_delay_ms() -> u64 {
    500
}

/// Telegram bootstrap configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TelegramConfig {
    /// Bot API token registered automatically at first startup.
    /// `None` means bots are registered through the admin API only.
    #[serde(default)]
    pub bot_token: Option<String>,
}

/// One provisioned operator, declared as a `[[operators]]` array entry.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct OperatorConfig {
    /// Unique operator name.
    pub name: String,

    /// Languages this operator serves. Empty means all.
    #[serde(default)]
    pub languages: Vec<String>,

    /// Maximum concurrent BUSY conversations. 0 falls back to
    /// `assignment.default_capacity`.
    #[serde(default)]
    pub capacity: u32,

    /// Bearer token the operator authenticates with.
    pub token: String,
}
