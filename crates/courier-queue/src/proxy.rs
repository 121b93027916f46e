// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Sticky proxy assignment and health-driven rotation.
//!
//! Every profile keeps its proxy across restarts. Rotation triggers when a
//! profile's chat_not_found rate crosses the configured threshold: some
//! egress IPs are silently deranked by the target, and an elevated rate of
//! that specific failure points at the proxy rather than the profile or
//! the chat list.

use courier_config::ProxyConfig;
use courier_core::CourierError;
use courier_storage::queries::proxies;
use courier_storage::Database;
use tracing::{info, warn};

/// Proxy pool policy over the persistent assignment table.
#[derive(Clone)]
pub struct ProxyRegistry {
    db: Database,
    config: ProxyConfig,
}

impl ProxyRegistry {
    pub fn new(db: Database, config: ProxyConfig) -> Self {
        Self { db, config }
    }

    /// Idempotently import a flat list of proxy credential strings.
    pub async fn import(&self, proxy_urls: Vec<String>) -> Result<usize, CourierError> {
        proxies::sync_proxies(&self.db, proxy_urls).await
    }

    /// The proxy a profile should use right now.
    ///
    /// Returns the sticky assignment when it is healthy, otherwise rotates
    /// onto a fresh one. `None` means the pool is exhausted, which the
    /// caller must treat as fatal for this profile.
    pub async fn resolve(&self, profile_id: &str) -> Result<Option<String>, CourierError> {
        match proxies::assigned_proxy(&self.db, profile_id).await? {
            Some(proxy) if proxy.is_healthy => Ok(Some(proxy.proxy_url)),
            Some(_) => self.rotate(profile_id).await,
            None => self.assign(profile_id).await,
        }
    }

    /// Atomically bind a free healthy proxy to the profile.
    pub async fn assign(&self, profile_id: &str) -> Result<Option<String>, CourierError> {
        let assigned = proxies::assign_free(&self.db, profile_id).await?;
        if let Some(proxy) = &assigned {
            info!(profile = profile_id, "proxy assigned");
            return Ok(Some(proxy.proxy_url.clone()));
        }
        warn!(profile = profile_id, "proxy pool exhausted");
        Ok(None)
    }

    /// Retire the profile's current proxy and bind a fresh one.
    pub async fn rotate(&self, profile_id: &str) -> Result<Option<String>, CourierError> {
        if let Some(current) = proxies::assigned_proxy(&self.db, profile_id).await? {
            proxies::mark_unhealthy(&self.db, &current.proxy_url).await?;
            proxies::reset_stats(&self.db, &current.proxy_url, profile_id).await?;
            info!(profile = profile_id, "retiring proxy for rotation");
        }
        let fresh = self.assign(profile_id).await?;
        if fresh.is_some() && self.config.unblock_tasks_on_rotate {
            proxies::unblock_chat_not_found_tasks(&self.db).await?;
        }
        Ok(fresh)
    }

    /// Flag a proxy as unhealthy and release its binding.
    pub async fn mark_unhealthy(&self, proxy_url: &str) -> Result<(), CourierError> {
        proxies::mark_unhealthy(&self.db, proxy_url).await
    }

    /// Check the pair's failure pattern after an attempt was recorded.
    ///
    /// The statistics themselves are written by the recording transaction;
    /// this only reads them and rotates when the chat_not_found rate
    /// crosses the threshold with a meaningful sample. Returns the new
    /// proxy when a rotation happened.
    pub async fn observe_outcome(
        &self,
        profile_id: &str,
        proxy_url: &str,
    ) -> Result<Option<String>, CourierError> {
        let Some(stats) = proxies::get_stats(&self.db, proxy_url, profile_id).await? else {
            return Ok(None);
        };
        if stats.total_attempts < i64::from(self.config.min_attempts_for_check) {
            return Ok(None);
        }
        let rate = stats.chat_not_found_rate();
        if rate > self.config.chat_not_found_threshold {
            warn!(
                profile = profile_id,
                rate = format!("{rate:.1}").as_str(),
                threshold = self.config.chat_not_found_threshold,
                "chat_not_found rate over threshold, rotating proxy"
            );
            return self.rotate(profile_id).await;
        }
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_config::{LimitsConfig, RetryConfig};
    use courier_core::{Outcome, RunId, TaskStatus};
    use courier_storage::queries::{profiles, tasks};
    use tempfile::tempdir;

    use crate::task_queue::{ClaimResult, TaskQueue};

    async fn setup() -> (ProxyRegistry, TaskQueue, Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("proxy.db");
        let db = Database::open(path.to_str().unwrap(), true).await.unwrap();
        profiles::upsert_profile(&db, "p1", "alpha").await.unwrap();
        let config = ProxyConfig {
            chat_not_found_threshold: 40.0,
            min_attempts_for_check: 3,
            unblock_tasks_on_rotate: true,
        };
        let registry = ProxyRegistry::new(db.clone(), config);
        let queue = TaskQueue::new(db.clone(), LimitsConfig::default(), RetryConfig::default());
        (registry, queue, db, dir)
    }

    #[tokio::test]
    async fn resolve_is_sticky_until_the_proxy_degrades() {
        let (registry, _queue, _db, _dir) = setup().await;
        registry
            .import(vec!["h1:1:u:p".to_string(), "h2:1:u:p".to_string()])
            .await
            .unwrap();

        let first = registry.resolve("p1").await.unwrap().unwrap();
        let second = registry.resolve("p1").await.unwrap().unwrap();
        assert_eq!(first, second);

        registry.mark_unhealthy(&first).await.unwrap();
        let third = registry.resolve("p1").await.unwrap().unwrap();
        assert_ne!(third, first);
    }

    #[tokio::test]
    async fn resolve_reports_exhaustion_as_none() {
        let (registry, _queue, _db, _dir) = setup().await;
        assert!(registry.resolve("p1").await.unwrap().is_none());
    }

    #[tokio::test]
    async fn threshold_exceedance_rotates_and_reopens_blocked_chats() {
        let (registry, queue, db, _dir) = setup().await;
        registry
            .import(vec!["h1:1:u:p".to_string(), "h2:1:u:p".to_string()])
            .await
            .unwrap();
        let proxy = registry.resolve("p1").await.unwrap().unwrap();

        tasks::import_chats(
            &db,
            "g",
            &["@a".to_string(), "@b".to_string(), "@c".to_string()],
            1,
        )
        .await
        .unwrap();
        let run = RunId::new();

        // Three chat_not_found failures in a row: 100% rate on 3 attempts.
        let mut rotated = None;
        for _ in 0..3 {
            let task = match queue.claim_next("g", "p1", &run).await.unwrap() {
                ClaimResult::Claimed(task) => task,
                other => panic!("expected claim, got {other:?}"),
            };
            queue
                .record_failure(&task, "p1", &run, &Outcome::ChatNotFound, Some(&proxy))
                .await
                .unwrap();
            rotated = registry.observe_outcome("p1", &proxy).await.unwrap();
        }

        let fresh = rotated.expect("rotation should have triggered on the third attempt");
        assert_ne!(fresh, proxy);

        // Rotation reopened the chat_not_found blocks.
        let reopened = tasks::get_task(&db, 1).await.unwrap().unwrap();
        assert_eq!(reopened.status, TaskStatus::Pending);
        assert!(!reopened.is_blocked);

        // Old pair statistics were dropped with the rotation.
        assert!(courier_storage::queries::proxies::get_stats(&db, &proxy, "p1")
            .await
            .unwrap()
            .is_none());
    }

    #[tokio::test]
    async fn small_samples_never_trigger_rotation() {
        let (registry, queue, db, _dir) = setup().await;
        registry.import(vec!["h1:1:u:p".to_string()]).await.unwrap();
        let proxy = registry.resolve("p1").await.unwrap().unwrap();

        tasks::import_chats(&db, "g", &["@a".to_string()], 1).await.unwrap();
        let run = RunId::new();
        let task = match queue.claim_next("g", "p1", &run).await.unwrap() {
            ClaimResult::Claimed(task) => task,
            other => panic!("expected claim, got {other:?}"),
        };
        queue
            .record_failure(&task, "p1", &run, &Outcome::ChatNotFound, Some(&proxy))
            .await
            .unwrap();

        // One failure is 100% but below min_attempts_for_check.
        assert!(registry.observe_outcome("p1", &proxy).await.unwrap().is_none());
    }
}
