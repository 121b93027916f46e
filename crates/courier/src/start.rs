// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! `courier start` command implementation.
//!
//! Wires storage, queue policy, proxy registry, the external automation
//! driver, and the supervisor together, then runs the fleet until the
//! group drains or a termination signal arrives.

use std::sync::Arc;

use courier_agent::{shutdown, Supervisor};
use courier_config::CourierConfig;
use courier_core::{CourierError, SystemClock};
use courier_driver::CommandDriver;
use courier_queue::{ProxyRegistry, TaskQueue};
use courier_storage::queries::messages;
use courier_storage::Database;
use tracing::info;

/// Runs the `courier start` command. Returns the process exit code.
pub async fn run_start(
    config: CourierConfig,
    group_id: &str,
    worker_count: usize,
) -> Result<u8, CourierError> {
    init_tracing(&config.agent.log_level);
    info!(group = group_id, "starting courier");

    let db = Database::open(&config.storage.database_path, config.storage.wal_mode).await?;

    // Fail before spawning anything if the group has nothing to say.
    if messages::active_count(&db, group_id).await? == 0 {
        return Err(CourierError::NoMessages {
            group_id: group_id.to_string(),
        });
    }

    let queue = TaskQueue::new(db.clone(), config.limits.clone(), config.retry.clone());
    let proxies = ProxyRegistry::new(db.clone(), config.proxy.clone());
    let driver = Arc::new(CommandDriver::new(config.driver.clone())?);
    let supervisor = Supervisor::new(
        db.clone(),
        queue.clone(),
        proxies,
        driver,
        Arc::new(SystemClock),
        config.supervisor.clone(),
        config.timeouts.clone(),
    );

    let cancel = shutdown::install_signal_handler();
    let report = supervisor.run(group_id, worker_count, cancel).await?;

    let stats = queue.stats(group_id).await?;
    info!(
        run_id = report.run_id.as_str(),
        completed = stats.completed,
        pending = stats.pending,
        blocked = stats.blocked,
        success = stats.total_success,
        failed = stats.total_failed,
        "run finished"
    );

    db.close().await?;
    Ok(report.exit_code())
}

/// Initializes the tracing subscriber with the given log level.
fn init_tracing(log_level: &str) {
    use tracing_subscriber::EnvFilter;

    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(format!("courier={log_level},warn")));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_names(false)
        .init();
}
