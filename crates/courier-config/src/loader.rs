// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration loader using Figment for layered config merging.
//!
//! Supports XDG hierarchy: `./courier.toml` > `~/.config/courier/courier.toml`
//! > `/etc/courier/courier.toml` with environment variable overrides via the
//! `COURIER_` prefix.

#![allow(clippy::result_large_err)] // figment::Error is external and cannot be boxed without wrapper

use std::path::Path;

use figment::{
    providers::{Env, Format, Serialized, Toml},
    Figment,
};

use crate::model::CourierConfig;

/// Load configuration from the standard XDG hierarchy with env var overrides.
///
/// Merge order (later overrides earlier):
/// 1. Compiled defaults
/// 2. `/etc/courier/courier.toml` (system-wide)
/// 3. `~/.config/courier/courier.toml` (user XDG config)
/// 4. `./courier.toml` (local directory)
/// 5. `COURIER_*` environment variables
pub fn load_config() -> Result<CourierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::file("/etc/courier/courier.toml"))
        .merge(Toml::file(
            dirs::config_dir()
                .map(|d| d.join("courier/courier.toml"))
                .unwrap_or_default(),
        ))
        .merge(Toml::file("courier.toml"))
        .merge(env_provider())
        .extract()
}

/// Load configuration from a TOML string only (no XDG lookup).
///
/// Used for testing and explicit inline configuration.
pub fn load_config_from_str(toml_content: &str) -> Result<CourierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::string(toml_content))
        .extract()
}

/// Load configuration from a specific file path with env var overrides.
pub fn load_config_from_path(path: &Path) -> Result<CourierConfig, figment::Error> {
    Figment::new()
        .merge(Serialized::defaults(CourierConfig::default()))
        .merge(Toml::file(path))
        .merge(env_provider())
        .extract()
}

/// Create the environment variable provider using explicit `map()` for
/// section-to-dot mapping.
///
/// Uses `Env::map()` rather than `Env::split("_")` to avoid ambiguity with
/// underscore-containing key names: `COURIER_LIMITS_MAX_CYCLES` must map to
/// `limits.max_cycles`, not `limits.max.cycles`.
fn env_provider() -> Env {
    Env::prefixed("COURIER_").map(|key| {
        let key_str = key.as_str();
        let mapped = key_str
            .replacen("agent_", "agent.", 1)
            .replacen("limits_", "limits.", 1)
            .replacen("timeouts_", "timeouts.", 1)
            .replacen("retry_", "retry.", 1)
            .replacen("proxy_", "proxy.", 1)
            .replacen("supervisor_", "supervisor.", 1)
            .replacen("storage_", "storage.", 1)
            .replacen("driver_", "driver.", 1);
        mapped.into()
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_load_without_any_file() {
        let config = load_config_from_str("").unwrap();
        assert_eq!(config.limits.max_messages_per_hour, 30);
        assert_eq!(config.limits.max_cycles, 1);
        assert_eq!(config.retry.max_attempts_before_block, 3);
        assert_eq!(config.proxy.chat_not_found_threshold, 40.0);
        assert_eq!(config.supervisor.shutdown_grace_seconds, 30);
        assert_eq!(config.storage.database_path, "db/courier.db");
    }

    #[test]
    fn file_values_override_defaults() {
        let config = load_config_from_str(
            r#"
            [limits]
            max_messages_per_hour = 12
            cycle_delay_minutes = 5.5

            [driver]
            command = "/usr/local/bin/tg-driver"
            args = ["--headless"]
            "#,
        )
        .unwrap();
        assert_eq!(config.limits.max_messages_per_hour, 12);
        assert_eq!(config.limits.cycle_delay_minutes, 5.5);
        assert_eq!(config.driver.command, "/usr/local/bin/tg-driver");
        assert_eq!(config.driver.args, vec!["--headless".to_string()]);
        // Untouched sections keep their defaults.
        assert_eq!(config.timeouts.page_load_timeout, 30);
    }

    #[test]
    fn unknown_keys_are_rejected() {
        let result = load_config_from_str(
            r#"
            [limits]
            max_mesages_per_hour = 12
            "#,
        );
        assert!(result.is_err(), "typo'd key should fail extraction");
    }

    #[test]
    fn send_budget_sums_the_three_timeouts() {
        let config = load_config_from_str(
            r#"
            [timeouts]
            search_timeout = 2
            send_timeout = 3
            page_load_timeout = 4
            "#,
        )
        .unwrap();
        assert_eq!(
            config.timeouts.send_budget(),
            std::time::Duration::from_secs(9)
        );
    }
}
