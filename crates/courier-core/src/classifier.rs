// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Pure classification of send outcomes into state transitions.
//!
//! [`classify`] is a total function from outcome to a [`Disposition`]: what
//! happens to the task, the profile, the proxy statistics, and the worker
//! itself. It performs no I/O; the worker applies the disposition inside
//! its recording transaction.

use crate::outcome::Outcome;

/// What to do with the task row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TaskAction {
    /// Advance the cycle counter and reschedule by the cycle delay.
    AdvanceCycle,
    /// Block the task permanently with the given reason.
    Block { reason: &'static str },
    /// Record a failed attempt and back off before the next try.
    Backoff,
    /// Release the claim without charging a failure, optionally deferring
    /// the task's next availability.
    Release { defer_seconds: Option<u64> },
}

/// What to do with the profile row.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileAction {
    None,
    /// Count the send against the hourly window and daily stats.
    RecordSend,
    /// Terminally reject the profile.
    Block,
    /// Flag the profile's session as expired.
    MarkLoggedOut,
}

/// Which proxy statistics column the attempt lands in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProxyTally {
    None,
    Success,
    ChatNotFound,
    OtherError,
}

/// Whether the worker keeps consuming tasks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerAction {
    Continue,
    /// Stop and signal the supervisor never to restart this profile.
    StopDoNotRestart,
}

/// The full transition set for one outcome.
#[derive(Debug, Clone, PartialEq)]
pub struct Disposition {
    pub task: TaskAction,
    pub profile: ProfileAction,
    pub proxy: ProxyTally,
    pub worker: WorkerAction,
}

/// Classify an outcome.
///
/// `transport_failures` is the task's streak of transport-class faults
/// before this attempt (not its overall failure tally); crossing
/// `max_attempts_before_block` turns the backoff into a permanent block.
/// Restriction outcomes never feed that streak: the destination may accept
/// a different profile or a later cycle.
pub fn classify(
    outcome: &Outcome,
    transport_failures: i64,
    max_attempts_before_block: u32,
) -> Disposition {
    match outcome {
        Outcome::Success => Disposition {
            task: TaskAction::AdvanceCycle,
            profile: ProfileAction::RecordSend,
            proxy: ProxyTally::Success,
            worker: WorkerAction::Continue,
        },
        Outcome::ChatNotFound => Disposition {
            task: TaskAction::Block {
                reason: "chat_not_found",
            },
            profile: ProfileAction::None,
            proxy: ProxyTally::ChatNotFound,
            worker: WorkerAction::Continue,
        },
        Outcome::AccountFrozen => Disposition {
            task: TaskAction::Release {
                defer_seconds: None,
            },
            profile: ProfileAction::Block,
            proxy: ProxyTally::None,
            worker: WorkerAction::StopDoNotRestart,
        },
        Outcome::LoggedOut => Disposition {
            task: TaskAction::Release {
                defer_seconds: None,
            },
            profile: ProfileAction::MarkLoggedOut,
            proxy: ProxyTally::None,
            worker: WorkerAction::StopDoNotRestart,
        },
        Outcome::NeedToJoin
        | Outcome::PremiumRequired
        | Outcome::StarsRequired
        | Outcome::UserBlocked
        | Outcome::InputUnavailable => Disposition {
            task: TaskAction::Backoff,
            profile: ProfileAction::None,
            proxy: ProxyTally::None,
            worker: WorkerAction::Continue,
        },
        Outcome::SlowMode { wait_seconds } => Disposition {
            task: TaskAction::Release {
                defer_seconds: Some(*wait_seconds),
            },
            profile: ProfileAction::None,
            proxy: ProxyTally::None,
            worker: WorkerAction::Continue,
        },
        Outcome::NetworkError
        | Outcome::SelectorMissing
        | Outcome::Timeout
        | Outcome::UnexpectedError => {
            let task = if transport_failures + 1 >= i64::from(max_attempts_before_block) {
                TaskAction::Block {
                    reason: "too_many_failures",
                }
            } else {
                TaskAction::Backoff
            };
            Disposition {
                task,
                profile: ProfileAction::None,
                proxy: ProxyTally::OtherError,
                worker: WorkerAction::Continue,
            }
        }
    }
}
