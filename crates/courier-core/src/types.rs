// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Domain record types shared across crate boundaries.
//!
//! Timestamps are ISO 8601 UTC strings as persisted by the storage layer;
//! the database does its own interval arithmetic, so these fields are
//! opaque to most consumers.

use serde::{Deserialize, Serialize};

/// Identifier for one supervisor invocation.
///
/// Minted once at startup and stamped on every attempt row, which is what
/// makes the per-task send budget a per-invocation budget rather than a
/// lifetime one.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct RunId(String);

impl RunId {
    /// Mint a fresh run identifier.
    pub fn new() -> Self {
        RunId(uuid::Uuid::new_v4().to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for RunId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for RunId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A browser profile identity registered for delivery work.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProfileRecord {
    /// Opaque profile identifier from the profile store.
    pub profile_id: String,
    /// Human-readable display name.
    pub profile_name: String,
    /// Profile is enabled for work.
    pub is_active: bool,
    /// Profile was terminally rejected by the target application.
    pub is_blocked: bool,
    /// Profile's session on the target application has expired.
    pub is_logged_out: bool,
    /// Messages sent within the current hourly window.
    pub messages_sent_current_hour: i64,
    /// Start of the current hourly window, if one is open.
    pub hour_window_start: Option<String>,
    /// Timestamp of the profile's most recent successful send.
    pub last_message_at: Option<String>,
}

/// Task lifecycle states.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    Pending,
    InProgress,
    Completed,
    Blocked,
}

impl TaskStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::InProgress => "in_progress",
            TaskStatus::Completed => "completed",
            TaskStatus::Blocked => "blocked",
        }
    }

    /// Parse a persisted status string. Unknown values are an error: the
    /// schema constrains the column, so anything else means corruption.
    pub fn parse(s: &str) -> Option<TaskStatus> {
        match s {
            "pending" => Some(TaskStatus::Pending),
            "in_progress" => Some(TaskStatus::InProgress),
            "completed" => Some(TaskStatus::Completed),
            "blocked" => Some(TaskStatus::Blocked),
            _ => None,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One chat destination to be messaged a configured number of times.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskRecord {
    pub id: i64,
    pub group_id: String,
    /// Opaque destination reference in the target application's namespace.
    pub chat_ref: String,
    pub status: TaskStatus,
    pub assigned_profile_id: Option<String>,
    pub total_cycles: i64,
    /// Lifetime count of successful sends (historical counter).
    pub completed_cycles: i64,
    pub success_count: i64,
    /// Audit tally: one per recorded failed attempt, of any kind.
    pub failed_count: i64,
    /// Transport-class faults since the last successful send. Only this
    /// streak feeds the `too_many_failures` budget; restriction failures
    /// never touch it.
    pub transport_failed_count: i64,
    pub is_blocked: bool,
    pub block_reason: Option<String>,
    pub last_attempt_at: Option<String>,
    /// Task is not offered before this instant.
    pub next_available_at: Option<String>,
}

/// Terminal states of one attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum AttemptStatus {
    Success,
    Failed,
}

impl AttemptStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AttemptStatus::Success => "success",
            AttemptStatus::Failed => "failed",
        }
    }
}

/// An egress proxy and its (at most one) profile binding.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyRecord {
    /// Opaque credential string, e.g. `host:port:user:pass`.
    pub proxy_url: String,
    pub profile_id: Option<String>,
    pub is_healthy: bool,
    pub assigned_at: Option<String>,
    pub last_rotation_at: Option<String>,
}

/// Rolling send statistics for one (proxy, profile) pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProxyStatsRecord {
    pub proxy_url: String,
    pub profile_id: String,
    pub total_attempts: i64,
    pub successful_sends: i64,
    pub chat_not_found_count: i64,
    pub other_errors: i64,
    pub period_start: String,
    pub last_attempt_at: Option<String>,
}

impl ProxyStatsRecord {
    /// Share of attempts that failed to resolve the destination, in percent.
    pub fn chat_not_found_rate(&self) -> f64 {
        if self.total_attempts == 0 {
            return 0.0;
        }
        (self.chat_not_found_count as f64 / self.total_attempts as f64) * 100.0
    }
}

/// Aggregate task counts for a group, used by the status command.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct QueueStats {
    pub total: i64,
    pub pending: i64,
    pub in_progress: i64,
    pub completed: i64,
    pub blocked: i64,
    pub total_success: i64,
    pub total_failed: i64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn run_ids_are_unique() {
        assert_ne!(RunId::new(), RunId::new());
    }

    #[test]
    fn task_status_round_trip() {
        for status in [
            TaskStatus::Pending,
            TaskStatus::InProgress,
            TaskStatus::Completed,
            TaskStatus::Blocked,
        ] {
            assert_eq!(TaskStatus::parse(status.as_str()), Some(status));
        }
        assert_eq!(TaskStatus::parse("paused"), None);
    }

    #[test]
    fn chat_not_found_rate_handles_empty_window() {
        let stats = ProxyStatsRecord {
            proxy_url: "h:1:u:p".into(),
            profile_id: "p1".into(),
            total_attempts: 0,
            successful_sends: 0,
            chat_not_found_count: 0,
            other_errors: 0,
            period_start: "2026-01-01T00:00:00.000Z".into(),
            last_attempt_at: None,
        };
        assert_eq!(stats.chat_not_found_rate(), 0.0);
    }

    #[test]
    fn chat_not_found_rate_is_percentage() {
        let stats = ProxyStatsRecord {
            proxy_url: "h:1:u:p".into(),
            profile_id: "p1".into(),
            total_attempts: 10,
            successful_sends: 4,
            chat_not_found_count: 5,
            other_errors: 1,
            period_start: "2026-01-01T00:00:00.000Z".into(),
            last_attempt_at: None,
        };
        assert!((stats.chat_not_found_rate() - 50.0).abs() < f64::EPSILON);
    }
}
