// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Import commands: chats, message templates, proxies, and profiles.
//!
//! These are the narrow funnels through which validated records enter the
//! store; the scheduler itself only ever reads the database.

use std::path::Path;

use courier_config::CourierConfig;
use courier_core::CourierError;
use courier_storage::queries::{messages, profiles, proxies, tasks};
use courier_storage::Database;

async fn open(config: &CourierConfig) -> Result<Database, CourierError> {
    Database::open(&config.storage.database_path, config.storage.wal_mode).await
}

/// Read non-empty, non-comment lines from a text file.
fn read_lines(path: &Path) -> Result<Vec<String>, CourierError> {
    let content = std::fs::read_to_string(path).map_err(|e| {
        CourierError::Config(format!("cannot read {}: {e}", path.display()))
    })?;
    Ok(content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(str::to_string)
        .collect())
}

/// Import chat destinations for a group, one per line.
pub async fn chats(config: CourierConfig, file: &Path, group_id: &str) -> Result<(), CourierError> {
    let chat_refs = read_lines(file)?;
    if chat_refs.is_empty() {
        return Err(CourierError::Config(format!(
            "no chats found in {}",
            file.display()
        )));
    }

    let db = open(&config).await?;
    let count = tasks::import_chats(&db, group_id, &chat_refs, config.limits.max_cycles).await?;
    db.close().await?;
    println!(
        "imported {count} chats into group {group_id} (cycles: {})",
        config.limits.max_cycles
    );
    Ok(())
}

/// Import message templates for a group from a JSON array file.
pub async fn messages(
    config: CourierConfig,
    file: &Path,
    group_id: &str,
) -> Result<(), CourierError> {
    let content = std::fs::read_to_string(file).map_err(|e| {
        CourierError::Config(format!("cannot read {}: {e}", file.display()))
    })?;
    let templates: Vec<String> = serde_json::from_str(&content).map_err(|e| {
        CourierError::Config(format!("{} must be a JSON array of strings: {e}", file.display()))
    })?;
    if templates.is_empty() {
        return Err(CourierError::Config(format!(
            "no messages found in {}",
            file.display()
        )));
    }

    let db = open(&config).await?;
    let count = messages::import_messages(&db, group_id, templates).await?;
    db.close().await?;
    println!("imported {count} messages into group {group_id}");
    Ok(())
}

/// Import proxy credential strings, one per line. Re-imports are no-ops
/// for proxies the pool already knows.
pub async fn proxies(config: CourierConfig, file: &Path) -> Result<(), CourierError> {
    let proxy_urls = read_lines(file)?;
    if proxy_urls.is_empty() {
        return Err(CourierError::Config(format!(
            "no proxies found in {}",
            file.display()
        )));
    }
    let total = proxy_urls.len();

    let db = open(&config).await?;
    let added = proxies::sync_proxies(&db, proxy_urls).await?;
    db.close().await?;
    println!("imported {added} new proxies ({total} in file)");
    Ok(())
}

/// Register (or rename) a profile.
pub async fn profile(config: CourierConfig, id: &str, name: &str) -> Result<(), CourierError> {
    let db = open(&config).await?;
    profiles::upsert_profile(&db, id, name).await?;
    db.close().await?;
    println!("profile registered: {name} ({id})");
    Ok(())
}
