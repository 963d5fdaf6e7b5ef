// SPDX-FileCopyrightText: 2026 Parlo Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `parlo doctor` command implementation.
//!
//! Runs diagnostic checks against the Parlo environment to identify
//! configuration issues, missing provisioning, and storage problems.

use std::time::{Duration, Instant};

use parlo_config::model::ParloConfig;
use parlo_core::error::ParloError;

/// Status of a diagnostic check.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CheckStatus {
    /// Check passed successfully.
    Pass,
    /// Check passed with a warning.
    Warn,
    /// Check failed.
    Fail,
}

/// Result of a single diagnostic check.
#[derive(Debug, Clone)]
pub struct CheckResult {
    /// Name of the check.
    pub name: String,
    /// Check status.
    pub status: CheckStatus,
    /// Human-readable message.
    pub message: String,
    /// Duration the check took.
    pub duration: Duration,
}

/// Run the `parlo doctor` command.
///
/// Runs quick diagnostic checks. With `--deep`, runs additional intensive checks.
pub async fn run_doctor(config: &ParloConfig, deep: bool) -> Result<(), ParloError> {
    let mut results = Vec::new();

    // Quick checks (always run)
    results.push(check_config().await);
    results.push(check_database(&config.storage.database_path).await);
    results.push(check_operators(config).await);
    results.push(check_telegram(config).await);
    results.push(check_gateway(config).await);

    // Deep checks (only with --deep)
    if deep {
        results.push(check_db_integrity(&config.storage.database_path).await);
        results.push(check_disk_space(&config.storage.database_path).await);
        results.push(check_memory_baseline().await);
    }

    println!();
    println!("  parlo doctor");
    println!("  {}", "-".repeat(50));

    let mut fail_count = 0;
    let mut warn_count = 0;

    for result in &results {
        let duration_ms = result.duration.as_millis();
        let tag = match result.status {
            CheckStatus::Pass => "[OK]  ",
            CheckStatus::Warn => {
                warn_count += 1;
                "[WARN]"
            }
            CheckStatus::Fail => {
                fail_count += 1;
                "[FAIL]"
            }
        };
        println!(
            "    {tag} {:<20} {} ({duration_ms}ms)",
            result.name, result.message
        );
    }

    println!();

    if fail_count > 0 || warn_count > 0 {
        let issues = fail_count + warn_count;
        let issue_word = if issues == 1 { "issue" } else { "issues" };
        println!("  {issues} {issue_word} found.");
        if !deep {
            println!("  Run with --deep for detailed diagnostics.");
        }
    } else {
        println!("  All checks passed.");
    }

    println!();

    Ok(())
}

/// Check configuration loads without errors.
async fn check_config() -> CheckResult {
    let start = Instant::now();
    match parlo_config::load_and_validate() {
        Ok(_) => CheckResult {
            name: "Configuration".to_string(),
            status: CheckStatus::Pass,
            message: "valid".to_string(),
            duration: start.elapsed(),
        },
        Err(errors) => CheckResult {
            name: "Configuration".to_string(),
            status: CheckStatus::Fail,
            message: format!("{} error(s)", errors.len()),
            duration: start.elapsed(),
        },
    }
}

/// Check database file exists and can be opened.
async fn check_database(db_path: &str) -> CheckResult {
    let start = Instant::now();
    let path = std::path::Path::new(db_path);

    if !path.exists() {
        return CheckResult {
            name: "Database".to_string(),
            status: CheckStatus::Warn,
            message: format!("not found: {db_path} (will be created on first run)"),
            duration: start.elapsed(),
        };
    }

    match tokio_rusqlite::Connection::open(db_path).await {
        Ok(conn) => {
            let query_result: Result<(), tokio_rusqlite::Error> = conn
                .call(|conn| {
                    conn.execute_batch("SELECT 1")?;
                    Ok(())
                })
                .await;

            match query_result {
                Ok(()) => CheckResult {
                    name: "Database".to_string(),
                    status: CheckStatus::Pass,
                    message: "connected".to_string(),
                    duration: start.elapsed(),
                },
                Err(e) => CheckResult {
                    name: "Database".to_string(),
                    status: CheckStatus::Fail,
                    message: format!("query failed: {e}"),
                    duration: start.elapsed(),
                },
            }
        }
        Err(e) => CheckResult {
            name: "Database".to_string(),
            status: CheckStatus::Fail,
            message: format!("open failed: {e}"),
            duration: start.elapsed(),
        },
    }
}

/// Check operators are provisioned in configuration.
async fn check_operators(config: &ParloConfig) -> CheckResult {
    let start = Instant::now();
    let count = config.operators.len();
    if count == 0 {
        return CheckResult {
            name: "Operators".to_string(),
            status: CheckStatus::Warn,
            message: "none provisioned (conversations will wait unassigned)".to_string(),
            duration: start.elapsed(),
        };
    }
    let blank_tokens = config
        .operators
        .iter()
        .filter(|o| o.token.trim().is_empty())
        .count();
    if blank_tokens > 0 {
        return CheckResult {
            name: "Operators".to_string(),
            status: CheckStatus::Fail,
            message: format!("{blank_tokens} operator(s) with an empty token"),
            duration: start.elapsed(),
        };
    }
    CheckResult {
        name: "Operators".to_string(),
        status: CheckStatus::Pass,
        message: format!("{count} provisioned"),
        duration: start.elapsed(),
    }
}

/// Check the Telegram bootstrap token.
async fn check_telegram(config: &ParloConfig) -> CheckResult {
    let start = Instant::now();
    match config.telegram.bot_token.as_deref() {
        Some(token) if token.trim().is_empty() => CheckResult {
            name: "Telegram".to_string(),
            status: CheckStatus::Fail,
            message: "bot token is empty".to_string(),
            duration: start.elapsed(),
        },
        Some(_) => CheckResult {
            name: "Telegram".to_string(),
            status: CheckStatus::Pass,
            message: "bot token configured".to_string(),
            duration: start.elapsed(),
        },
        None => CheckResult {
            name: "Telegram".to_string(),
            status: CheckStatus::Warn,
            message: "no bot token (bots register via the admin API only)".to_string(),
            duration: start.elapsed(),
        },
    }
}

/// Check the gateway configuration.
async fn check_gateway(config: &ParloConfig) -> CheckResult {
    let start = Instant::now();
    if !config.gateway.enabled {
        return CheckResult {
            name: "Gateway".to_string(),
            status: CheckStatus::Warn,
            message: "disabled (web widget and operator API unavailable)".to_string(),
            duration: start.elapsed(),
        };
    }
    let bind = format!("{}:{}", config.gateway.bind_address, config.gateway.port);
    if config.gateway.admin_token.is_none() {
        return CheckResult {
            name: "Gateway".to_string(),
            status: CheckStatus::Warn,
            message: format!("{bind}, no admin token (admin surface disabled)"),
            duration: start.elapsed(),
        };
    }
    CheckResult {
        name: "Gateway".to_string(),
        status: CheckStatus::Pass,
        message: bind,
        duration: start.elapsed(),
    }
}

/// Deep check: SQLite integrity check.
async fn check_db_integrity(db_path: &str) -> CheckResult {
    let start = Instant::now();
    let path = std::path::Path::new(db_path);

    if !path.exists() {
        return CheckResult {
            name: "DB integrity".to_string(),
            status: CheckStatus::Warn,
            message: "database not found (skipped)".to_string(),
            duration: start.elapsed(),
        };
    }

    match tokio_rusqlite::Connection::open(db_path).await {
        Ok(conn) => {
            let result: Result<Vec<String>, tokio_rusqlite::Error> = conn
                .call(|conn| {
                    let mut stmt = conn.prepare("PRAGMA integrity_check")?;
                    let rows: Vec<String> = stmt
                        .query_map([], |row| row.get(0))?
                        .filter_map(|r| r.ok())
                        .collect();
                    Ok(rows)
                })
                .await;

            match result {
                Ok(rows) if rows.len() == 1 && rows[0] == "ok" => CheckResult {
                    name: "DB integrity".to_string(),
                    status: CheckStatus::Pass,
                    message: "ok".to_string(),
                    duration: start.elapsed(),
                },
                Ok(rows) => CheckResult {
                    name: "DB integrity".to_string(),
                    status: CheckStatus::Fail,
                    message: format!("{} issue(s) found", rows.len()),
                    duration: start.elapsed(),
                },
                Err(e) => CheckResult {
                    name: "DB integrity".to_string(),
                    status: CheckStatus::Fail,
                    message: format!("check failed: {e}"),
                    duration: start.elapsed(),
                },
            }
        }
        Err(e) => CheckResult {
            name: "DB integrity".to_string(),
            status: CheckStatus::Fail,
            message: format!("open failed: {e}"),
            duration: start.elapsed(),
        },
    }
}

/// Deep check: available disk space.
async fn check_disk_space(db_path: &str) -> CheckResult {
    let start = Instant::now();
    let path = std::path::Path::new(db_path);
    let check_path = if path.exists() {
        path.to_path_buf()
    } else {
        path.parent()
            .unwrap_or(std::path::Path::new("."))
            .to_path_buf()
    };

    match std::fs::metadata(&check_path) {
        Ok(_) => {
            // Free space is not portable through std; report the DB file
            // size as a heuristic instead.
            if path.exists() {
                let size = std::fs::metadata(path).map(|m| m.len()).unwrap_or(0);
                let size_mb = size as f64 / (1024.0 * 1024.0);
                CheckResult {
                    name: "Disk space".to_string(),
                    status: CheckStatus::Pass,
                    message: format!("DB size: {size_mb:.1} MB"),
                    duration: start.elapsed(),
                }
            } else {
                CheckResult {
                    name: "Disk space".to_string(),
                    status: CheckStatus::Pass,
                    message: "directory accessible".to_string(),
                    duration: start.elapsed(),
                }
            }
        }
        Err(e) => CheckResult {
            name: "Disk space".to_string(),
            status: CheckStatus::Warn,
            message: format!("cannot access: {e}"),
            duration: start.elapsed(),
        },
    }
}

/// Deep check: memory baseline via jemalloc.
async fn check_memory_baseline() -> CheckResult {
    let start = Instant::now();

    #[cfg(not(target_env = "msvc"))]
    {
        let _ = tikv_jemalloc_ctl::epoch::advance();
        let allocated = tikv_jemalloc_ctl::stats::allocated::read().unwrap_or(0);
        let resident = tikv_jemalloc_ctl::stats::resident::read().unwrap_or(0);
        let allocated_mb = allocated as f64 / (1024.0 * 1024.0);
        let resident_mb = resident as f64 / (1024.0 * 1024.0);

        CheckResult {
            name: "Memory baseline".to_string(),
            status: CheckStatus::Pass,
            message: format!("heap: {allocated_mb:.1} MB, resident: {resident_mb:.1} MB"),
            duration: start.elapsed(),
        }
    }

    #[cfg(target_env = "msvc")]
    {
        CheckResult {
            name: "Memory baseline".to_string(),
            status: CheckStatus::Warn,
            message: "jemalloc not available on MSVC".to_string(),
            duration: start.elapsed(),
        }
    }
}
