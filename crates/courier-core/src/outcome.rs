// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The tagged result of one send attempt.
//!
//! Drivers classify their own observations into this enum; the scheduler
//! never inspects pages, selectors, or wire payloads. Tags travel over the
//! driver wire as snake_case strings, and anything a newer driver emits
//! that this build does not know decodes to [`Outcome::UnexpectedError`].

use serde::{Deserialize, Serialize};

/// Result of one `send` invocation against the target application.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Outcome {
    /// The message was delivered.
    Success,
    /// The destination did not resolve on this attempt.
    ChatNotFound,
    /// The operating identity is terminally rejected by the target.
    AccountFrozen,
    /// The operating identity's session has expired.
    LoggedOut,
    /// Destination requires joining before posting.
    NeedToJoin,
    /// Destination requires a premium subscription.
    PremiumRequired,
    /// Destination requires paid stars to post.
    StarsRequired,
    /// The destination has blocked this identity.
    UserBlocked,
    /// The message input was not available on the page.
    InputUnavailable,
    /// The destination rate-limits this identity; retry after the delay.
    SlowMode { wait_seconds: u64 },
    /// Transport-level failure reaching the target.
    NetworkError,
    /// The driver could not locate an expected page element.
    SelectorMissing,
    /// The attempt exceeded its configured time budget.
    Timeout,
    /// Anything the driver could not classify.
    UnexpectedError,
}

impl Outcome {
    /// Stable snake_case tag, persisted as `error_kind` on attempt rows.
    pub fn kind(&self) -> &'static str {
        match self {
            Outcome::Success => "success",
            Outcome::ChatNotFound => "chat_not_found",
            Outcome::AccountFrozen => "account_frozen",
            Outcome::LoggedOut => "logged_out",
            Outcome::NeedToJoin => "need_to_join",
            Outcome::PremiumRequired => "premium_required",
            Outcome::StarsRequired => "stars_required",
            Outcome::UserBlocked => "user_blocked",
            Outcome::InputUnavailable => "input_unavailable",
            Outcome::SlowMode { .. } => "slow_mode",
            Outcome::NetworkError => "network_error",
            Outcome::SelectorMissing => "selector_missing",
            Outcome::Timeout => "timeout",
            Outcome::UnexpectedError => "unexpected_error",
        }
    }

    /// Decode a wire tag from a driver.
    ///
    /// `wait_seconds` is only consulted for `slow_mode`; a missing value
    /// falls back to a conservative one-minute wait.
    pub fn from_wire(tag: &str, wait_seconds: Option<u64>) -> Outcome {
        match tag {
            "success" => Outcome::Success,
            "chat_not_found" => Outcome::ChatNotFound,
            "account_frozen" => Outcome::AccountFrozen,
            "logged_out" => Outcome::LoggedOut,
            "need_to_join" => Outcome::NeedToJoin,
            "premium_required" => Outcome::PremiumRequired,
            "stars_required" => Outcome::StarsRequired,
            "user_blocked" => Outcome::UserBlocked,
            "input_unavailable" => Outcome::InputUnavailable,
            "slow_mode" => Outcome::SlowMode {
                wait_seconds: wait_seconds.unwrap_or(60),
            },
            "network_error" => Outcome::NetworkError,
            "selector_missing" => Outcome::SelectorMissing,
            "timeout" => Outcome::Timeout,
            _ => Outcome::UnexpectedError,
        }
    }

    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success)
    }

    /// Transport or driver faults, as opposed to answers from the target
    /// application. Only these feed a task's `too_many_failures` budget.
    pub fn is_transport_fault(&self) -> bool {
        matches!(
            self,
            Outcome::NetworkError
                | Outcome::SelectorMissing
                | Outcome::Timeout
                | Outcome::UnexpectedError
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn wire_tags_round_trip() {
        let all = [
            Outcome::Success,
            Outcome::ChatNotFound,
            Outcome::AccountFrozen,
            Outcome::LoggedOut,
            Outcome::NeedToJoin,
            Outcome::PremiumRequired,
            Outcome::StarsRequired,
            Outcome::UserBlocked,
            Outcome::InputUnavailable,
            Outcome::SlowMode { wait_seconds: 17 },
            Outcome::NetworkError,
            Outcome::SelectorMissing,
            Outcome::Timeout,
            Outcome::UnexpectedError,
        ];
        for outcome in all {
            let decoded = Outcome::from_wire(outcome.kind(), Some(17));
            assert_eq!(decoded, outcome);
        }
    }

    #[test]
    fn unknown_tag_maps_to_unexpected() {
        assert_eq!(
            Outcome::from_wire("captcha_wall", None),
            Outcome::UnexpectedError
        );
    }

    #[test]
    fn slow_mode_defaults_wait_when_missing() {
        assert_eq!(
            Outcome::from_wire("slow_mode", None),
            Outcome::SlowMode { wait_seconds: 60 }
        );
    }

    #[test]
    fn transport_faults_exclude_target_answers() {
        assert!(Outcome::NetworkError.is_transport_fault());
        assert!(Outcome::SelectorMissing.is_transport_fault());
        assert!(Outcome::Timeout.is_transport_fault());
        assert!(Outcome::UnexpectedError.is_transport_fault());

        assert!(!Outcome::Success.is_transport_fault());
        assert!(!Outcome::NeedToJoin.is_transport_fault());
        assert!(!Outcome::ChatNotFound.is_transport_fault());
        assert!(!Outcome::SlowMode { wait_seconds: 5 }.is_transport_fault());
        assert!(!Outcome::AccountFrozen.is_transport_fault());
    }
}
