// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Message template storage.

use courier_core::CourierError;
use rusqlite::{params, OptionalExtension, Transaction};

use crate::database::{map_tr_err, Database};

/// Import message templates for a group.
pub async fn import_messages(
    db: &Database,
    group_id: &str,
    texts: Vec<String>,
) -> Result<usize, CourierError> {
    let group_id = group_id.to_string();
    db.connection()
        .call(move |conn| {
            let tx = conn.transaction()?;
            let mut count = 0usize;
            for text in &texts {
                tx.execute(
                    "INSERT INTO messages (group_id, text) VALUES (?1, ?2)",
                    params![group_id, text],
                )?;
                count += 1;
            }
            tx.commit()?;
            Ok(count)
        })
        .await
        .map_err(map_tr_err)
}

/// Uniformly random active template for a group, or `None` when nothing
/// was imported.
pub async fn random_active(db: &Database, group_id: &str) -> Result<Option<String>, CourierError> {
    let group_id = group_id.to_string();
    db.connection()
        .call(move |conn| {
            let text = conn
                .query_row(
                    "SELECT text FROM messages
                     WHERE group_id = ?1 AND is_active = 1
                     ORDER BY RANDOM()
                     LIMIT 1",
                    params![group_id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(text)
        })
        .await
        .map_err(map_tr_err)
}

/// Number of active templates in a group.
pub async fn active_count(db: &Database, group_id: &str) -> Result<i64, CourierError> {
    let group_id = group_id.to_string();
    db.connection()
        .call(move |conn| {
            let n = conn.query_row(
                "SELECT COUNT(*) FROM messages WHERE group_id = ?1 AND is_active = 1",
                params![group_id],
                |row| row.get(0),
            )?;
            Ok(n)
        })
        .await
        .map_err(map_tr_err)
}

/// Bump the usage counter for the template that was just sent, inside the
/// recording transaction.
pub(crate) fn bump_usage_tx(
    tx: &Transaction<'_>,
    group_id: &str,
    text: &str,
) -> rusqlite::Result<()> {
    tx.execute(
        "UPDATE messages
         SET usage_count = usage_count + 1
         WHERE group_id = ?1 AND text = ?2",
        params![group_id, text],
    )?;
    Ok(())
}
