// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Proxy pool operations: sticky assignment, health flags, and per-pair
//! statistics.
//!
//! Assignment claims run as a select-then-update inside one transaction on
//! the serialized connection, so two profiles can never grab the same
//! proxy. The partial unique index on `profile_id` backs that invariant at
//! the schema level as well.

use courier_core::{CourierError, ProxyRecord, ProxyStatsRecord, ProxyTally};
use rusqlite::{params, OptionalExtension, Transaction};
use tracing::info;

use crate::database::{map_tr_err, Database};

const PROXY_COLUMNS: &str =
    "proxy_url, profile_id, is_healthy, assigned_at, last_rotation_at";

fn proxy_from_row(row: &rusqlite::Row<'_>) -> rusqlite::Result<ProxyRecord> {
    Ok(ProxyRecord {
        proxy_url: row.get(0)?,
        profile_id: row.get(1)?,
        is_healthy: row.get(2)?,
        assigned_at: row.get(3)?,
        last_rotation_at: row.get(4)?,
    })
}

/// Idempotently import proxies. Existing rows are left untouched.
/// Returns how many new proxies were added.
pub async fn sync_proxies(db: &Database, proxy_urls: Vec<String>) -> Result<usize, CourierError> {
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut added = 0usize;
            for url in &proxy_urls {
                added += tx.execute(
                    "INSERT OR IGNORE INTO proxies (proxy_url) VALUES (?1)",
                    params![url],
                )?;
            }
            tx.commit()?;
            Ok(added)
        })
        .await
        .map_err(map_tr_err)
}

/// The proxy currently bound to a profile, if any.
pub async fn assigned_proxy(
    db: &Database,
    profile_id: &str,
) -> Result<Option<ProxyRecord>, CourierError> {
    let profile_id = profile_id.to_string();
    db.connection()
        .call(move |conn| {
            let proxy = conn
                .query_row(
                    &format!("SELECT {PROXY_COLUMNS} FROM proxies WHERE profile_id = ?1"),
                    params![profile_id],
                    proxy_from_row,
                )
                .optional()?;
            Ok(proxy)
        })
        .await
        .map_err(map_tr_err)
}

/// Atomically bind a free healthy proxy to the profile.
///
/// Returns `None` when the pool is exhausted; the caller treats that as
/// fatal for the profile.
pub async fn assign_free(
    db: &Database,
    profile_id: &str,
) -> Result<Option<ProxyRecord>, CourierError> {
    let profile_id = profile_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let candidate: Option<String> = tx
                .query_row(
                    "SELECT proxy_url FROM proxies
                     WHERE profile_id IS NULL AND is_healthy = 1
                     ORDER BY rowid ASC
                     LIMIT 1",
                    [],
                    |row| row.get(0),
                )
                .optional()?;
            let record = match candidate {
                Some(url) => {
                    tx.execute(
                        "UPDATE proxies
                         SET profile_id = ?1,
                             assigned_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                         WHERE proxy_url = ?2",
                        params![profile_id, url],
                    )?;
                    tx.query_row(
                        &format!("SELECT {PROXY_COLUMNS} FROM proxies WHERE proxy_url = ?1"),
                        params![url],
                        proxy_from_row,
                    )
                    .optional()?
                }
                None => None,
            };
            tx.commit()?;
            Ok(record)
        })
        .await
        .map_err(map_tr_err)
}

/// Release the profile's current binding back to the pool.
pub async fn release_assignment(db: &Database, profile_id: &str) -> Result<(), CourierError> {
    let profile_id = profile_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE proxies
                 SET profile_id = NULL, assigned_at = NULL
                 WHERE profile_id = ?1",
                params![profile_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Flag a proxy as unhealthy and clear any binding it holds.
pub async fn mark_unhealthy(db: &Database, proxy_url: &str) -> Result<(), CourierError> {
    let proxy_url = proxy_url.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "UPDATE proxies
                 SET is_healthy = 0,
                     profile_id = NULL,
                     assigned_at = NULL,
                     last_rotation_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE proxy_url = ?1",
                params![proxy_url],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Statistics for one (proxy, profile) pair.
pub async fn get_stats(
    db: &Database,
    proxy_url: &str,
    profile_id: &str,
) -> Result<Option<ProxyStatsRecord>, CourierError> {
    let proxy_url = proxy_url.to_string();
    let profile_id = profile_id.to_string();
    db.connection()
        .call(move |conn| {
            let stats = conn
                .query_row(
                    "SELECT proxy_url, profile_id, total_attempts, successful_sends,
                            chat_not_found_count, other_errors, period_start, last_attempt_at
                     FROM proxy_stats
                     WHERE proxy_url = ?1 AND profile_id = ?2",
                    params![proxy_url, profile_id],
                    |row| {
                        Ok(ProxyStatsRecord {
                            proxy_url: row.get(0)?,
                            profile_id: row.get(1)?,
                            total_attempts: row.get(2)?,
                            successful_sends: row.get(3)?,
                            chat_not_found_count: row.get(4)?,
                            other_errors: row.get(5)?,
                            period_start: row.get(6)?,
                            last_attempt_at: row.get(7)?,
                        })
                    },
                )
                .optional()?;
            Ok(stats)
        })
        .await
        .map_err(map_tr_err)
}

/// Drop the statistics window for a pair, e.g. after rotating away.
pub async fn reset_stats(
    db: &Database,
    proxy_url: &str,
    profile_id: &str,
) -> Result<(), CourierError> {
    let proxy_url = proxy_url.to_string();
    let profile_id = profile_id.to_string();
    db.connection()
        .call(move |conn| {
            conn.execute(
                "DELETE FROM proxy_stats WHERE proxy_url = ?1 AND profile_id = ?2",
                params![proxy_url, profile_id],
            )?;
            Ok(())
        })
        .await
        .map_err(map_tr_err)
}

/// Reopen tasks blocked because their chat did not resolve.
///
/// Called after a rotation when `unblock_tasks_on_rotate` is set: a new
/// egress deserves another look at those destinations.
pub async fn unblock_chat_not_found_tasks(db: &Database) -> Result<usize, CourierError> {
    let unblocked = db
        .connection()
        .call(move |conn| {
            let n = conn.execute(
                "UPDATE tasks
                 SET is_blocked = 0,
                     status = 'pending',
                     block_reason = NULL,
                     updated_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')
                 WHERE is_blocked = 1 AND block_reason = 'chat_not_found'",
                [],
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)?;
    if unblocked > 0 {
        info!(count = unblocked, "reopened chat_not_found tasks after rotation");
    }
    Ok(unblocked)
}

/// Every proxy in the pool, for the status command.
pub async fn all_proxies(db: &Database) -> Result<Vec<ProxyRecord>, CourierError> {
    db.connection()
        .call(move |conn| {
            let mut stmt = conn.prepare(&format!(
                "SELECT {PROXY_COLUMNS} FROM proxies ORDER BY rowid"
            ))?;
            let proxies = stmt
                .query_map([], proxy_from_row)?
                .collect::<Result<Vec<_>, _>>()?;
            Ok(proxies)
        })
        .await
        .map_err(map_tr_err)
}

/// Fold one attempt into the pair's statistics inside an open recording
/// transaction.
pub(crate) fn tally_attempt_tx(
    tx: &Transaction<'_>,
    proxy_url: &str,
    profile_id: &str,
    tally: ProxyTally,
) -> rusqlite::Result<()> {
    let (ok, not_found, other) = match tally {
        ProxyTally::None => return Ok(()),
        ProxyTally::Success => (1, 0, 0),
        ProxyTally::ChatNotFound => (0, 1, 0),
        ProxyTally::OtherError => (0, 0, 1),
    };
    tx.execute(
        "INSERT INTO proxy_stats
             (proxy_url, profile_id, total_attempts, successful_sends,
              chat_not_found_count, other_errors, last_attempt_at)
         VALUES (?1, ?2, 1, ?3, ?4, ?5, strftime('%Y-%m-%dT%H:%M:%fZ', 'now'))
         ON CONFLICT (proxy_url, profile_id) DO UPDATE SET
             total_attempts = total_attempts + 1,
             successful_sends = successful_sends + ?3,
             chat_not_found_count = chat_not_found_count + ?4,
             other_errors = other_errors + ?5,
             last_attempt_at = strftime('%Y-%m-%dT%H:%M:%fZ', 'now')",
        params![proxy_url, profile_id, ok, not_found, other],
    )?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    async fn setup() -> (Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("proxies.db");
        let db = Database::open(path.to_str().unwrap(), true).await.unwrap();
        (db, dir)
    }

    fn pool() -> Vec<String> {
        vec![
            "h1:8080:u:p".to_string(),
            "h2:8080:u:p".to_string(),
            "h3:8080:u:p".to_string(),
        ]
    }

    #[tokio::test]
    async fn sync_is_idempotent() {
        let (db, _dir) = setup().await;
        assert_eq!(sync_proxies(&db, pool()).await.unwrap(), 3);
        assert_eq!(sync_proxies(&db, pool()).await.unwrap(), 0);
        assert_eq!(all_proxies(&db).await.unwrap().len(), 3);
    }

    #[tokio::test]
    async fn a_proxy_serves_at_most_one_profile() {
        let (db, _dir) = setup().await;
        sync_proxies(&db, pool()).await.unwrap();

        let a = assign_free(&db, "prof-a").await.unwrap().unwrap();
        let b = assign_free(&db, "prof-b").await.unwrap().unwrap();
        assert_ne!(a.proxy_url, b.proxy_url);

        // Assignments are sticky: asking again returns the same proxy.
        let again = assigned_proxy(&db, "prof-a").await.unwrap().unwrap();
        assert_eq!(again.proxy_url, a.proxy_url);
    }

    #[tokio::test]
    async fn exhausted_pool_returns_none() {
        let (db, _dir) = setup().await;
        sync_proxies(&db, vec!["only:1:u:p".to_string()]).await.unwrap();
        assert!(assign_free(&db, "prof-a").await.unwrap().is_some());
        assert!(assign_free(&db, "prof-b").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn unhealthy_proxies_are_never_assigned() {
        let (db, _dir) = setup().await;
        sync_proxies(&db, vec!["bad:1:u:p".to_string()]).await.unwrap();
        mark_unhealthy(&db, "bad:1:u:p").await.unwrap();
        assert!(assign_free(&db, "prof-a").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn mark_unhealthy_releases_the_binding() {
        let (db, _dir) = setup().await;
        sync_proxies(&db, pool()).await.unwrap();
        let assigned = assign_free(&db, "prof-a").await.unwrap().unwrap();

        mark_unhealthy(&db, &assigned.proxy_url).await.unwrap();
        assert!(assigned_proxy(&db, "prof-a").await.unwrap().is_none());

        // The next assignment picks a different, healthy proxy.
        let fresh = assign_free(&db, "prof-a").await.unwrap().unwrap();
        assert_ne!(fresh.proxy_url, assigned.proxy_url);
    }

    #[tokio::test]
    async fn tallies_accumulate_per_pair() {
        let (db, _dir) = setup().await;
        sync_proxies(&db, pool()).await.unwrap();

        db.connection()
            .call(|conn| {
                let tx = conn.transaction()?;
                tally_attempt_tx(&tx, "h1:8080:u:p", "prof-a", ProxyTally::Success)?;
                tally_attempt_tx(&tx, "h1:8080:u:p", "prof-a", ProxyTally::ChatNotFound)?;
                tally_attempt_tx(&tx, "h1:8080:u:p", "prof-a", ProxyTally::ChatNotFound)?;
                tally_attempt_tx(&tx, "h1:8080:u:p", "prof-a", ProxyTally::OtherError)?;
                tally_attempt_tx(&tx, "h1:8080:u:p", "prof-a", ProxyTally::None)?;
                tx.commit()?;
                Ok(())
            })
            .await
            .unwrap();

        let stats = get_stats(&db, "h1:8080:u:p", "prof-a").await.unwrap().unwrap();
        assert_eq!(stats.total_attempts, 4);
        assert_eq!(stats.successful_sends, 1);
        assert_eq!(stats.chat_not_found_count, 2);
        assert_eq!(stats.other_errors, 1);
        assert!((stats.chat_not_found_rate() - 50.0).abs() < f64::EPSILON);

        reset_stats(&db, "h1:8080:u:p", "prof-a").await.unwrap();
        assert!(get_stats(&db, "h1:8080:u:p", "prof-a").await.unwrap().is_none());
    }
}
