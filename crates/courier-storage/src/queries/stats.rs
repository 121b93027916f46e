// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Aggregate rollups for the operator status view.

use courier_core::{CourierError, QueueStats};
use rusqlite::params;

use crate::database::{map_tr_err, Database};

/// Task counts by status for one group, plus lifetime success/failure sums.
pub async fn queue_stats(db: &Database, group_id: &str) -> Result<QueueStats, CourierError> {
    let group_id = group_id.to_string();
    db.connection()
        .call(move |conn| {
            let stats = conn.query_row(
                "SELECT
                     COUNT(*),
                     SUM(CASE WHEN status = 'pending' THEN 1 ELSE 0 END),
                     SUM(CASE WHEN status = 'in_progress' THEN 1 ELSE 0 END),
                     SUM(CASE WHEN status = 'completed' THEN 1 ELSE 0 END),
                     SUM(CASE WHEN status = 'blocked' THEN 1 ELSE 0 END),
                     COALESCE(SUM(success_count), 0),
                     COALESCE(SUM(failed_count), 0)
                 FROM tasks
                 WHERE group_id = ?1",
                params![group_id],
                |row| {
                    Ok(QueueStats {
                        total: row.get(0)?,
                        pending: row.get::<_, Option<i64>>(1)?.unwrap_or(0),
                        in_progress: row.get::<_, Option<i64>>(2)?.unwrap_or(0),
                        completed: row.get::<_, Option<i64>>(3)?.unwrap_or(0),
                        blocked: row.get::<_, Option<i64>>(4)?.unwrap_or(0),
                        total_success: row.get(5)?,
                        total_failed: row.get(6)?,
                    })
                },
            )?;
            Ok(stats)
        })
        .await
        .map_err(map_tr_err)
}
