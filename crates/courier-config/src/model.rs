// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Configuration model structs for the courier fleet.
//!
//! All structs use `#[serde(deny_unknown_fields)]` to reject unrecognized
//! config keys at startup, providing actionable error messages.

use serde::{Deserialize, Serialize};

/// Top-level courier configuration.
///
/// Loaded from TOML files, with environment variable overrides. All
/// sections are optional and default to sensible values.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct CourierConfig {
    /// Process identity and logging.
    #[serde(default)]
    pub agent: AgentConfig,

    /// Sending rates and per-chat cycle budgets.
    #[serde(default)]
    pub limits: LimitsConfig,

    /// Driver operation time bounds.
    #[serde(default)]
    pub timeouts: TimeoutsConfig,

    /// Failure budget before a task is blocked.
    #[serde(default)]
    pub retry: RetryConfig,

    /// Proxy health and rotation policy.
    #[serde(default)]
    pub proxy: ProxyConfig,

    /// Worker lifecycle: restarts and shutdown.
    #[serde(default)]
    pub supervisor: SupervisorConfig,

    /// Storage backend settings.
    #[serde(default)]
    pub storage: StorageConfig,

    /// External automation command the driver adapter runs.
    #[serde(default)]
    pub driver: DriverConfig,
}

/// Process identity and logging configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct AgentConfig {
    /// Logging level (trace, debug, info, warn, error).
    #[serde(default = "default_log_level")]
    pub log_level: String,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            log_level: default_log_level(),
        }
    }
}

fn default_log_level() -> String {
    "info".to_string()
}

/// Sending rates and cycle budgets.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct LimitsConfig {
    /// Per-profile cap on sends within a sliding hour.
    #[serde(default = "default_max_messages_per_hour")]
    pub max_messages_per_hour: u32,

    /// Per-session send budget for each chat; also the default
    /// `total_cycles` applied at import time.
    #[serde(default = "default_max_cycles")]
    pub max_cycles: u32,

    /// Uniform jitter factor on the inter-send delay, in `0.0..=1.0`.
    #[serde(default = "default_delay_randomness")]
    pub delay_randomness: f64,

    /// Minimum gap between two sends to the same chat.
    #[serde(default = "default_cycle_delay_minutes")]
    pub cycle_delay_minutes: f64,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            max_messages_per_hour: default_max_messages_per_hour(),
            max_cycles: default_max_cycles(),
            delay_randomness: default_delay_randomness(),
            cycle_delay_minutes: default_cycle_delay_minutes(),
        }
    }
}

fn default_max_messages_per_hour() -> u32 {
    30
}

fn default_max_cycles() -> u32 {
    1
}

fn default_delay_randomness() -> f64 {
    0.2
}

fn default_cycle_delay_minutes() -> f64 {
    20.0
}

/// Driver operation time bounds, in seconds.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TimeoutsConfig {
    #[serde(default = "default_search_timeout")]
    pub search_timeout: u64,

    #[serde(default = "default_send_timeout")]
    pub send_timeout: u64,

    #[serde(default = "default_page_load_timeout")]
    pub page_load_timeout: u64,
}

impl TimeoutsConfig {
    /// The total bound on one send attempt.
    pub fn send_budget(&self) -> std::time::Duration {
        std::time::Duration::from_secs(
            self.page_load_timeout + self.search_timeout + self.send_timeout,
        )
    }
}

impl Default for TimeoutsConfig {
    fn default() -> Self {
        Self {
            search_timeout: default_search_timeout(),
            send_timeout: default_send_timeout(),
            page_load_timeout: default_page_load_timeout(),
        }
    }
}

fn default_search_timeout() -> u64 {
    10
}

fn default_send_timeout() -> u64 {
    5
}

fn default_page_load_timeout() -> u64 {
    30
}

/// Failure budget configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct RetryConfig {
    /// Transport-class failures tolerated before a task is blocked with
    /// reason `too_many_failures`.
    #[serde(default = "default_max_attempts_before_block")]
    pub max_attempts_before_block: u32,

    /// Backoff applied to a task after a non-blocking failure, in seconds.
    #[serde(default = "default_failure_backoff_seconds")]
    pub failure_backoff_seconds: u64,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts_before_block: default_max_attempts_before_block(),
            failure_backoff_seconds: default_failure_backoff_seconds(),
        }
    }
}

fn default_max_attempts_before_block() -> u32 {
    3
}

fn default_failure_backoff_seconds() -> u64 {
    300
}

/// Proxy health and rotation policy.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ProxyConfig {
    /// chat_not_found share (percent) above which the proxy is rotated.
    #[serde(default = "default_chat_not_found_threshold")]
    pub chat_not_found_threshold: f64,

    /// Minimum attempts on a (proxy, profile) pair before the rate is
    /// considered meaningful.
    #[serde(default = "default_min_attempts_for_check")]
    pub min_attempts_for_check: u32,

    /// Reopen tasks blocked with `chat_not_found` after a rotation, giving
    /// those chats another chance through the new egress.
    #[serde(default = "default_unblock_tasks_on_rotate")]
    pub unblock_tasks_on_rotate: bool,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            chat_not_found_threshold: default_chat_not_found_threshold(),
            min_attempts_for_check: default_min_attempts_for_check(),
            unblock_tasks_on_rotate: default_unblock_tasks_on_rotate(),
        }
    }
}

fn default_chat_not_found_threshold() -> f64 {
    40.0
}

fn default_min_attempts_for_check() -> u32 {
    5
}

fn default_unblock_tasks_on_rotate() -> bool {
    true
}

/// Worker lifecycle configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct SupervisorConfig {
    /// Soft-terminate window on shutdown, in seconds.
    #[serde(default = "default_shutdown_grace_seconds")]
    pub shutdown_grace_seconds: u64,

    /// Base restart backoff, doubled per consecutive failure.
    #[serde(default = "default_restart_base_delay_seconds")]
    pub restart_base_delay_seconds: u64,

    /// Cap on the restart backoff.
    #[serde(default = "default_restart_max_delay_seconds")]
    pub restart_max_delay_seconds: u64,

    /// Consecutive failed restarts tolerated before giving up on a profile.
    #[serde(default = "default_max_restart_attempts")]
    pub max_restart_attempts: u32,

    /// Minutes after which an in-progress task with no activity is
    /// considered orphaned by a crashed worker.
    #[serde(default = "default_stale_task_timeout_minutes")]
    pub stale_task_timeout_minutes: u64,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            shutdown_grace_seconds: default_shutdown_grace_seconds(),
            restart_base_delay_seconds: default_restart_base_delay_seconds(),
            restart_max_delay_seconds: default_restart_max_delay_seconds(),
            max_restart_attempts: default_max_restart_attempts(),
            stale_task_timeout_minutes: default_stale_task_timeout_minutes(),
        }
    }
}

fn default_shutdown_grace_seconds() -> u64 {
    30
}

fn default_restart_base_delay_seconds() -> u64 {
    30
}

fn default_restart_max_delay_seconds() -> u64 {
    300
}

fn default_max_restart_attempts() -> u32 {
    5
}

fn default_stale_task_timeout_minutes() -> u64 {
    30
}

/// Storage backend configuration.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct StorageConfig {
    /// Path to the SQLite database file.
    #[serde(default = "default_database_path")]
    pub database_path: String,

    /// Enable WAL journaling.
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
    "db/courier.db".to_string()
}

fn default_wal_mode() -> bool {
    true
}

/// External automation command configuration.
///
/// The driver adapter spawns this command once per worker session and
/// exchanges line-delimited JSON with it; the command owns the browser.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct DriverConfig {
    /// Executable to run. Required for `courier start`.
    #[serde(default)]
    pub command: String,

    /// Extra arguments passed before the per-session ones.
    #[serde(default)]
    pub args: Vec<String>,
}
