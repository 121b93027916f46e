// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier status` command implementation.

use courier_config::CourierConfig;
use courier_core::CourierError;
use courier_storage::queries::{profiles, proxies, stats};
use courier_storage::Database;

/// Prints a snapshot of task counts, profile health, and the proxy pool.
pub async fn run_status(config: CourierConfig, group_id: &str) -> Result<(), CourierError> {
    let db = Database::open(&config.storage.database_path, config.storage.wal_mode).await?;

    let queue = stats::queue_stats(&db, group_id).await?;
    let pct = |part: i64| {
        if queue.total > 0 {
            (part as f64 / queue.total as f64) * 100.0
        } else {
            0.0
        }
    };

    println!("\ngroup: {group_id}");
    println!("\nTasks:");
    println!("  total:        {}", queue.total);
    println!("  pending:      {} ({:.1}%)", queue.pending, pct(queue.pending));
    println!("  in progress:  {}", queue.in_progress);
    println!(
        "  completed:    {} ({:.1}%)",
        queue.completed,
        pct(queue.completed)
    );
    println!(
        "  blocked:      {} ({:.1}%)",
        queue.blocked,
        pct(queue.blocked)
    );
    println!("\nResults:");
    println!("  successful sends: {}", queue.total_success);
    println!("  failed attempts:  {}", queue.total_failed);

    let all_profiles = profiles::all_profiles(&db).await?;
    println!("\nProfiles ({}):", all_profiles.len());
    for profile in &all_profiles {
        let state = if profile.is_blocked {
            "BLOCKED"
        } else if profile.is_logged_out {
            "LOGGED OUT"
        } else if profile.is_active {
            "active"
        } else {
            "inactive"
        };
        println!(
            "  {:<24} {:<10} sent this hour: {}",
            profile.profile_name, state, profile.messages_sent_current_hour
        );
    }

    let pool = proxies::all_proxies(&db).await?;
    let healthy = pool.iter().filter(|p| p.is_healthy).count();
    let assigned = pool.iter().filter(|p| p.profile_id.is_some()).count();
    println!(
        "\nProxies: {} total, {} healthy, {} assigned\n",
        pool.len(),
        healthy,
        assigned
    );

    db.close().await?;
    Ok(())
}
