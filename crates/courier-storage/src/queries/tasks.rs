// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Task claim, release, and recovery operations.
//!
//! Every mutation here runs as a single transaction on the serialized
//! connection, so a claim is atomic against all concurrent claimers and a
//! recording either commits in full or not at all. All timestamps and
//! delays are computed by SQLite itself (`strftime`/`datetime` with
//! parameterised modifiers), never by the client clock.

use courier_core::{CourierError, ProfileAction, ProxyTally, TaskRecord, TaskStatus};
use rusqlite::{params, OptionalExtension};
use tracing::{debug, warn};

use crate::database::{map_tr_err, Database};
use crate::queries::{messages, profiles, proxies};

const TASK_COLUMNS: &str = "id, group_id, chat_ref, status, assigned_profile_id, total_cycles, \
     completed_cycles, success_count, failed_count, transport_failed_count, \
     is_blocked, block_reason, last_attempt_at, next_available_at";

/// Result of one claim attempt.
#[derive(Debug, Clone)]
pub enum ClaimResult {
    /// A task was atomically moved to `in_progress` for this profile.
    Claimed(TaskRecord),
    /// The profile has exhausted its hourly window.
    RateLimited,
    /// Nothing claimable right now.
    Empty,
}

/// Everything recorded for one successful send, in one transaction.
#[derive(Debug, Clone)]
pub struct SuccessUpdate {
    pub task_id: i64,
    pub group_id: String,
    pub profile_id: String,
    pub run_id: String,
    pub message_text: String,
    /// Gap before the same chat may be claimed again, in seconds.
    pub cycle_delay_seconds: u64,
    pub proxy_url: Option<String>,
}

/// Everything recorded for one failed send, in one transaction.
///
/// The fields mirror a classifier disposition flattened into plain data so
/// this module stays policy-free. `failed_count` and the profile's daily
/// failed sends are charged for every failure; only `charge_transport`
/// additionally feeds the streak that backs the `too_many_failures` block.
#[derive(Debug, Clone)]
pub struct FailureUpdate {
    pub task_id: i64,
    pub profile_id: String,
    pub run_id: String,
    pub error_kind: String,
    /// Count this attempt against the transport-fault streak.
    pub charge_transport: bool,
    /// Block the task permanently with this reason.
    pub block_reason: Option<String>,
    /// Keep the task unavailable for this long after release, in seconds.
    pub defer_seconds: Option<u64>,
    pub profile_action: ProfileAction,
    pub proxy_tally: ProxyTally,
    pub proxy_url: Option<String>,
}

fn task_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<TaskRecord> {
    let status_str: String = row.get(3)?;
    let status = TaskStatus::parse(&status_str).ok_or_else(|| {
        rusqlite::Error::FromSqlConversionFailure(
            3,
            rusqlite::types::Type::Text,
            format!("unknown task status `{status_str}`").into(),
        )
    })?;
    Ok(TaskRecord {
        id: row.get(0)?,
        group_id: row.get(1)?,
        chat_ref: row.get(2)?,
        status,
        assigned_profile_id: row.get(4)?,
        total_cycles: row.get(5)?,
        completed_cycles: row.get(6)?,
        success_count: row.get(7)?,
        failed_count: row.get(8)?,
        transport_failed_count: row.get(9)?,
        is_blocked: row.get(10)?,
        block_reason: row.get(11)?,
        last_attempt_at: row.get(12)?,
        next_available_at: row.get(13)?,
    })
}

/// Import chat destinations as tasks. Existing `(group, chat)` rows only
/// have their cycle budget refreshed.
pub async fn import_chats(
    db: &Database,
    group_id: &str,
    chat_refs: &[String],
    total_cycles: u32,
) -> Result<usize, CourierError> {
    let group_id = group_id.to_string();
    let chat_refs = chat_refs.to_vec();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut count = 0usize;
            for chat_ref in &chat_refs {
                tx.execute(
                    "INSERT INTO tasks (group_id, chat_ref, total_cycles)
                     VALUES (?1, ?2, ?3)
                     ON CONFLICT (group_id, chat_ref) DO UPDATE SET
                         total_cycles = excluded.total_cycles,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                    params![group_id, chat_ref, total_cycles],
                )?;
                count += 1;
            }
            tx.commit()?;
            Ok(count)
        })
        .await
        .map_err(map_tr_err)
}

/// Fetch one task by id.
pub async fn get_task(db: &Database, task_id: i64) -> Result<Option<TaskRecord>, CourierError> {
    db.connection()
        .call(move |conn| {
            let task = conn
                .query_row(
                    &format!("SELECT {TASK_COLUMNS} FROM tasks WHERE id = ?1"),
                    params![task_id],
                    task_from_row,
                )
                .optional()?;
            Ok(task)
        })
        .await
        .map_err(map_tr_err)
}

/// Atomically claim the next eligible task for a profile.
///
/// One transaction: refresh the profile's hourly window, gate on the
/// hourly cap, pick the fairest candidate, and mark it `in_progress`. The
/// candidate filter enforces the per-session budget by counting attempt
/// rows under the current run.
pub async fn claim_next(
    db: &Database,
    group_id: &str,
    profile_id: &str,
    run_id: &str,
    max_messages_per_hour: u32,
) -> Result<ClaimResult, CourierError> {
    let group_id = group_id.to_string();
    let profile_id = profile_id.to_string();
    let run_id = run_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            profiles::refresh_hour_window_tx(&tx, &profile_id)?;
            let sent: i64 = tx.query_row(
                "SELECT messages_sent_current_hour FROM profiles WHERE profile_id = ?1",
                params![profile_id],
                |row| row.get(0),
            )?;
            if sent >= i64::from(max_messages_per_hour) {
                tx.commit()?;
                return Ok(ClaimResult::RateLimited);
            }

            let candidate = tx
                .query_row(
                    &format!(
                        "SELECT {TASK_COLUMNS} FROM tasks t
                         WHERE t.group_id = ?1
                           AND t.is_blocked = 0
                           AND t.completed_cycles < t.total_cycles
                           AND (t.next_available_at IS NULL
                                OR t.next_available_at <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
                           AND (t.status = 'pending'
                                OR (t.status = 'in_progress' AND t.assigned_profile_id = ?2))
                           AND (SELECT COUNT(*) FROM task_attempts a
                                WHERE a.task_id = t.id AND a.run_id = ?3) < t.total_cycles
                         ORDER BY t.completed_cycles ASC,
                                  t.last_attempt_at ASC NULLS FIRST,
                                  t.id ASC
                         LIMIT 1"
                    ),
                    params![group_id, profile_id, run_id],
                    task_from_row,
                )
                .optional()?;

            match candidate {
                Some(mut task) => {
                    tx.execute(
                        "UPDATE tasks
                         SET status = 'in_progress',
                             assigned_profile_id = ?1,
                             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE id = ?2",
                        params![profile_id, task.id],
                    )?;
                    tx.commit()?;
                    task.status = TaskStatus::InProgress;
                    task.assigned_profile_id = Some(profile_id.clone());
                    Ok(ClaimResult::Claimed(task))
                }
                None => {
                    tx.commit()?;
                    Ok(ClaimResult::Empty)
                }
            }
        })
        .await
        .map_err(map_tr_err)
}

/// Record a successful send: attempt row, task counters, profile pacing,
/// template usage, and rollup statistics, all in one transaction.
pub async fn record_success(db: &Database, update: SuccessUpdate) -> Result<(), CourierError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let prior_successes: i64 = tx.query_row(
                "SELECT COUNT(*) FROM task_attempts
                 WHERE task_id = ?1 AND run_id = ?2 AND status = 'success'",
                params![update.task_id, update.run_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO task_attempts
                     (task_id, profile_id, run_id, cycle_number, status, message_text)
                 VALUES (?1, ?2, ?3, ?4, 'success', ?5)",
                params![
                    update.task_id,
                    update.profile_id,
                    update.run_id,
                    prior_successes + 1,
                    update.message_text,
                ],
            )?;

            // A delivered message ends any transport-fault streak.
            tx.execute(
                "UPDATE tasks
                 SET completed_cycles = completed_cycles + 1,
                     success_count = success_count + 1,
                     transport_failed_count = 0,
                     last_attempt_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![update.task_id],
            )?;

            let (completed, total): (i64, i64) = tx.query_row(
                "SELECT completed_cycles, total_cycles FROM tasks WHERE id = ?1",
                params![update.task_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )?;
            if completed >= total {
                tx.execute(
                    "UPDATE tasks
                     SET status = 'completed', assigned_profile_id = NULL
                     WHERE id = ?1",
                    params![update.task_id],
                )?;
            } else {
                tx.execute(
                    "UPDATE tasks
                     SET status = 'pending',
                         assigned_profile_id = NULL,
                         next_available_at =
                             strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '+' || ?1 || ' seconds')
                     WHERE id = ?2",
                    params![update.cycle_delay_seconds as i64, update.task_id],
                )?;
            }

            profiles::record_send_tx(&tx, &update.profile_id)?;
            profiles::bump_daily_stats_tx(&tx, &update.profile_id, true)?;
            messages::bump_usage_tx(&tx, &update.group_id, &update.message_text)?;
            if let Some(proxy_url) = &update.proxy_url {
                proxies::tally_attempt_tx(&tx, proxy_url, &update.profile_id, ProxyTally::Success)?;
            }

            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)?;
    debug!("send recorded");
    Ok(())
}

/// Record a failed send and apply the classifier's disposition in one
/// transaction.
pub async fn record_failure(db: &Database, update: FailureUpdate) -> Result<(), CourierError> {
    if update.block_reason.is_some() {
        warn!(
            task_id = update.task_id,
            kind = update.error_kind.as_str(),
            "blocking task"
        );
    }
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;

            let prior_attempts: i64 = tx.query_row(
                "SELECT COUNT(*) FROM task_attempts WHERE task_id = ?1 AND run_id = ?2",
                params![update.task_id, update.run_id],
                |row| row.get(0),
            )?;
            tx.execute(
                "INSERT INTO task_attempts
                     (task_id, profile_id, run_id, cycle_number, status, error_kind)
                 VALUES (?1, ?2, ?3, ?4, 'failed', ?5)",
                params![
                    update.task_id,
                    update.profile_id,
                    update.run_id,
                    prior_attempts + 1,
                    update.error_kind,
                ],
            )?;

            tx.execute(
                "UPDATE tasks
                 SET failed_count = failed_count + 1,
                     last_attempt_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1",
                params![update.task_id],
            )?;
            if update.charge_transport {
                tx.execute(
                    "UPDATE tasks
                     SET transport_failed_count = transport_failed_count + 1
                     WHERE id = ?1",
                    params![update.task_id],
                )?;
            }

            if let Some(reason) = &update.block_reason {
                tx.execute(
                    "UPDATE tasks
                     SET is_blocked = 1,
                         block_reason = ?1,
                         status = 'blocked',
                         assigned_profile_id = NULL
                     WHERE id = ?2",
                    params![reason, update.task_id],
                )?;
            } else if let Some(defer) = update.defer_seconds {
                tx.execute(
                    "UPDATE tasks
                     SET status = 'pending',
                         assigned_profile_id = NULL,
                         next_available_at =
                             strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '+' || ?1 || ' seconds')
                     WHERE id = ?2",
                    params![defer as i64, update.task_id],
                )?;
            } else {
                tx.execute(
                    "UPDATE tasks
                     SET status = 'pending', assigned_profile_id = NULL
                     WHERE id = ?1",
                    params![update.task_id],
                )?;
            }

            profiles::apply_action_tx(&tx, &update.profile_id, update.profile_action)?;
            profiles::bump_daily_stats_tx(&tx, &update.profile_id, false)?;
            if let Some(proxy_url) = &update.proxy_url {
                proxies::tally_attempt_tx(&tx, proxy_url, &update.profile_id, update.proxy_tally)?;
            }

            tx.commit()?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Release a claim without recording an attempt.
///
/// Used by the worker's cancellation path: statistics are only written on
/// terminal outcomes, so this is safe at any point before recording.
pub async fn release_claim(db: &Database, task_id: i64) -> Result<(), CourierError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE tasks
                 SET status = 'pending',
                     assigned_profile_id = NULL,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE id = ?1 AND status = 'in_progress'",
                params![task_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Return orphaned `in_progress` tasks to `pending`.
///
/// A task whose claim has seen no activity for `timeout_minutes` belongs
/// to a worker that vanished mid-task. Statistics are untouched, so
/// running this twice is the same as running it once.
pub async fn reset_stale(
    db: &Database,
    timeout_minutes: u64,
    group_id: Option<String>,
) -> Result<usize, CourierError> {
    let reset = db
        .connection()
        .call(move |conn| {
            let n = match &group_id {
                Some(group) => conn.execute(
                    "UPDATE tasks
                     SET status = 'pending',
                         assigned_profile_id = NULL,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE status = 'in_progress'
                       AND group_id = ?1
                       AND updated_at <=
                           strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '-' || ?2 || ' minutes')",
                    params![group, timeout_minutes as i64],
                )?,
                None => conn.execute(
                    "UPDATE tasks
                     SET status = 'pending',
                         assigned_profile_id = NULL,
                         updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                     WHERE status = 'in_progress'
                       AND updated_at <=
                           strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '-' || ?1 || ' minutes')",
                    params![timeout_minutes as i64],
                )?,
            };
            Ok(n)
        })
        .await
        .map_err(map_tr_err)?;
    if reset > 0 {
        warn!(count = reset, "reset stale in-progress tasks");
    }
    Ok(reset)
}

/// Count tasks that could still be worked this session, ignoring pacing
/// and the hourly gate. Zero means the run is done for this group.
pub async fn remaining_work(
    db: &Database,
    group_id: &str,
    run_id: &str,
) -> Result<i64, CourierError> {
    let group_id = group_id.to_string();
    let run_id = run_id.to_string();
    db.connection()
        .call(move |conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM tasks t
                 WHERE t.group_id = ?1
                   AND t.is_blocked = 0
                   AND t.status IN ('pending', 'in_progress')
                   AND t.completed_cycles < t.total_cycles
                   AND (SELECT COUNT(*) FROM task_attempts a
                        WHERE a.task_id = t.id AND a.run_id = ?2) < t.total_cycles",
                params![group_id, run_id],
                |row| row.get(0),
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)
}

/// Count attempt rows for a task under a run, optionally by status.
pub async fn count_attempts(
    db: &Database,
    task_id: i64,
    run_id: &str,
    status: Option<&str>,
) -> Result<i64, CourierError> {
    let run_id = run_id.to_string();
    let status = status.map(str::to_string);
    db.connection()
        .call(move |conn| {
            let n = match &status {
                Some(status) => conn.query_row(
                    "SELECT COUNT(*) FROM task_attempts
                     WHERE task_id = ?1 AND run_id = ?2 AND status = ?3",
                    params![task_id, run_id, status],
                    |row| row.get(0),
                )?,
                None => conn.query_row(
                    "SELECT COUNT(*) FROM task_attempts
                     WHERE task_id = ?1 AND run_id = ?2",
                    params![task_id, run_id],
                    |row| row.get(0),
                )?,
            };
            Ok(n)
        })
        .await
        .map_err(map_tr_err)
}

/// Backdate a task's claim activity, making it eligible for the stale
/// reaper. Test-support only.
#[doc(hidden)]
pub async fn backdate_claim(
    db: &Database,
    task_id: i64,
    minutes_ago: u64,
) -> Result<(), CourierError> {
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE tasks
                 SET updated_at =
                     strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '-' || ?1 || ' minutes')
                 WHERE id = ?2",
                params![minutes_ago as i64, task_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}
