// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Profile registration, eligibility, pacing counters, and daily stats.
//!
//! The `_tx` helpers take an open transaction so the task-recording path
//! can fold profile updates into its single commit.

use courier_core::{CourierError, ProfileAction, ProfileRecord};
use rusqlite::{params, OptionalExtension, Transaction};

use crate::database::{map_tr_err, Database};

const PROFILE_COLUMNS: &str = "profile_id, profile_name, is_active, is_blocked, is_logged_out, \
     messages_sent_current_hour, hour_window_start, last_message_at";

fn profile_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProfileRecord> {
    Ok(ProfileRecord {
        profile_id: row.get(0)?,
        profile_name: row.get(1)?,
        is_active: row.get(2)?,
        is_blocked: row.get(3)?,
        is_logged_out: row.get(4)?,
        messages_sent_current_hour: row.get(5)?,
        hour_window_start: row.get(6)?,
        last_message_at: row.get(7)?,
    })
}

/// Register a profile, refreshing the display name on re-import.
pub async fn upsert_profile(
    db: &Database,
    profile_id: &str,
    profile_name: &str,
) -> Result<(), CourierError> {
    let profile_id = profile_id.to_string();
    let profile_name = profile_name.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "INSERT INTO profiles (profile_id, profile_name)
                 VALUES (?1, ?2)
                 ON CONFLICT (profile_id) DO UPDATE SET
                     profile_name = excluded.profile_name,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
                params![profile_id, profile_name],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

pub async fn get_profile(
    db: &Database,
    profile_id: &str,
) -> Result<Option<ProfileRecord>, CourierError> {
    let profile_id = profile_id.to_string();
    db.connection()
        .call(move |conn| {
            let profile = conn
                .query_row(
                    &format!("SELECT {PROFILE_COLUMNS} FROM profiles WHERE profile_id = ?1"),
                    params![profile_id],
                    profile_from_row,
                )
                .optional()?;
            Ok(profile)
        })
        .await
        .map_err(map_tr_err)
}

/// Profiles eligible to run a worker: active, not blocked, not logged out.
pub async fn eligible_profiles(db: &Database) -> Result<Vec<ProfileRecord>, CourierError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROFILE_COLUMNS} FROM profiles
                 WHERE is_active = 1 AND is_blocked = 0 AND is_logged_out = 0
                 ORDER BY profile_name"
            ))?;
            let profiles = stmt
                .query_map([], profile_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(profiles)
        })
        .await
        .map_err(map_tr_err)
}

/// All registered profiles, for the status command.
pub async fn all_profiles(db: &Database) -> Result<Vec<ProfileRecord>, CourierError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROFILE_COLUMNS} FROM profiles ORDER BY profile_name"
            ))?;
            let profiles = stmt
                .query_map([], profile_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(profiles)
        })
        .await
        .map_err(map_tr_err)
}

/// Reset the hourly counter when the window has lapsed.
///
/// The comparison runs entirely in SQLite's time domain; both sides use
/// the same text format, so the window survives client clock skew.
pub(crate) fn refresh_hour_window_tx(
    tx: &Transaction<'_>,
    profile_id: &str,
) -> rusqlite::Result<()> {
    tx.execute(
        "UPDATE profiles
         SET messages_sent_current_hour = 0,
             hour_window_start = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE profile_id = ?1
           AND (hour_window_start IS NULL
                OR hour_window_start <= strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '-1 hour'))",
        params![profile_id],
    )?;
    Ok(())
}

/// Count a successful send against the hourly window.
pub(crate) fn record_send_tx(tx: &Transaction<'_>, profile_id: &str) -> rusqlite::Result<()> {
    refresh_hour_window_tx(tx, profile_id)?;
    tx.execute(
        "UPDATE profiles
         SET messages_sent_current_hour = messages_sent_current_hour + 1,
             last_message_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now'),
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
         WHERE profile_id = ?1",
        params![profile_id],
    )?;
    Ok(())
}

/// Apply a classifier profile action inside the recording transaction.
pub(crate) fn apply_action_tx(
    tx: &Transaction<'_>,
    profile_id: &str,
    action: ProfileAction,
) -> rusqlite::Result<()> {
    match action {
        ProfileAction::None | ProfileAction::RecordSend => Ok(()),
        ProfileAction::Block => {
            tx.execute(
                "UPDATE profiles
                 SET is_blocked = 1,
                     is_active = 0,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE profile_id = ?1",
                params![profile_id],
            )?;
            Ok(())
        }
        ProfileAction::MarkLoggedOut => {
            tx.execute(
                "UPDATE profiles
                 SET is_logged_out = 1,
                     is_active = 0,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE profile_id = ?1",
                params![profile_id],
            )?;
            Ok(())
        }
    }
}

/// Upsert the profile's daily send counters.
pub(crate) fn bump_daily_stats_tx(
    tx: &Transaction<'_>,
    profile_id: &str,
    success: bool,
) -> rusqlite::Result<()> {
    let (ok, failed) = if success { (1, 0) } else { (0, 1) };
    tx.execute(
        "INSERT INTO profile_daily_stats
             (profile_id, date, messages_sent, successful_sends, failed_sends)
         VALUES (?1, date('now'), 1, ?2, ?3)
         ON CONFLICT (profile_id, date) DO UPDATE SET
             messages_sent = messages_sent + 1,
             successful_sends = successful_sends + ?2,
             failed_sends = failed_sends + ?3,
             updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
        params![profile_id, ok, failed],
    )?;
    Ok(())
}

/// Today's counters for a profile, if any.
pub async fn daily_stats(
    db: &Database,
    profile_id: &str,
) -> Result<Option<(i64, i64, i64)>, CourierError> {
    let profile_id = profile_id.to_string();
    db.connection()
        .call(move |conn| {
            let row = conn
                .query_row(
                    "SELECT messages_sent, successful_sends, failed_sends
                     FROM profile_daily_stats
                     WHERE profile_id = ?1 AND date = date('now')",
                    params![profile_id],
                    |row| Ok((row.get(0)?, row.get(1)?, row.get(2)?)),
                )
                .optional()?;
            Ok(row)
        })
        .await
        .map_err(map_tr_err)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("profiles.db");
        let db = Database::open(path.to_str().unwrap(), true).await.unwrap();
        (db, dir)
    }

    #[tokio::test]
    async fn upsert_refreshes_name_without_duplicating() {
        let (db, _dir) = setup().await;
        upsert_profile(&db, "p1", "old-name").await.unwrap();
        upsert_profile(&db, "p1", "new-name").await.unwrap();

        let all = all_profiles(&db).await.unwrap();
        assert_eq!(all.len(), 1);
        assert_eq!(all[0].profile_name, "new-name");
    }

    #[tokio::test]
    async fn eligibility_excludes_blocked_and_logged_out() {
        let (db, _dir) = setup().await;
        upsert_profile(&db, "p1", "a").await.unwrap();
        upsert_profile(&db, "p2", "b").await.unwrap();
        upsert_profile(&db, "p3", "c").await.unwrap();

        db.connection()
            .call(|conn| {
                let tx = conn.transaction()?;
                apply_action_tx(&tx, "p2", ProfileAction::Block)?;
                apply_action_tx(&tx, "p3", ProfileAction::MarkLoggedOut)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .unwrap();

        let eligible = eligible_profiles(&db).await.unwrap();
        assert_eq!(eligible.len(), 1);
        assert_eq!(eligible[0].profile_id, "p1");

        let blocked = get_profile(&db, "p2").await.unwrap().unwrap();
        assert!(blocked.is_blocked);
        assert!(!blocked.is_active);
        let logged_out = get_profile(&db, "p3").await.unwrap().unwrap();
        assert!(logged_out.is_logged_out);
        assert!(!logged_out.is_active);
    }

    #[tokio::test]
    async fn record_send_opens_a_window_and_counts() {
        let (db, _dir) = setup().await;
        upsert_profile(&db, "p1", "a").await.unwrap();

        db.connection()
            .call(|conn| {
                let tx = conn.transaction()?;
                record_send_tx(&tx, "p1")?;
                record_send_tx(&tx, "p1")?;
                tx.commit()?;
                Ok(())
            })
            .await
            .unwrap();

        let profile = get_profile(&db, "p1").await.unwrap().unwrap();
        assert_eq!(profile.messages_sent_current_hour, 2);
        assert!(profile.hour_window_start.is_some());
        assert!(profile.last_message_at.is_some());
    }

    #[tokio::test]
    async fn lapsed_window_resets_the_counter() {
        let (db, _dir) = setup().await;
        upsert_profile(&db, "p1", "a").await.unwrap();

        db.connection()
            .call(|conn| {
                let tx = conn.transaction()?;
                record_send_tx(&tx, "p1")?;
                // Backdate the window past the hour boundary.
                tx.execute(
                    "UPDATE profiles
                     SET hour_window_start =
                         strftime('%Y-%m-%dT%H:%M:%fZ', 'now', '-61 minutes')
                     WHERE profile_id = 'p1'",
                    [],
                )?;
                refresh_hour_window_tx(&tx, "p1")?;
                tx.commit()?;
                Ok(())
            })
            .await
            .unwrap();

        let profile = get_profile(&db, "p1").await.unwrap().unwrap();
        assert_eq!(profile.messages_sent_current_hour, 0);
    }

    #[tokio::test]
    async fn daily_stats_accumulate_by_outcome() {
        let (db, _dir) = setup().await;
        upsert_profile(&db, "p1", "a").await.unwrap();

        db.connection()
            .call(|conn| {
                let tx = conn.transaction()?;
                bump_daily_stats_tx(&tx, "p1", true)?;
                bump_daily_stats_tx(&tx, "p1", true)?;
                bump_daily_stats_tx(&tx, "p1", false)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .unwrap();

        let (sent, ok, failed) = daily_stats(&db, "p1").await.unwrap().unwrap();
        assert_eq!(sent, 3);
        assert_eq!(ok, 2);
        assert_eq!(failed, 1);
    }
}
