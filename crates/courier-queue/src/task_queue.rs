// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The task queue policy layer.
//!
//! Wraps the storage claim/release primitives with the configured rates,
//! budgets, and the outcome classifier, so workers only ever see "claim,
//! send, hand me the outcome".

use std::time::Duration;

use courier_config::{LimitsConfig, RetryConfig};
use courier_core::{
    classify, CourierError, Disposition, Outcome, QueueStats, RunId, TaskAction, TaskRecord,
};
use courier_storage::queries::{messages, stats, tasks};
use courier_storage::Database;
use tracing::debug;

use crate::pacing;

pub use courier_storage::queries::tasks::ClaimResult;

/// Claim and release policy over the persistent task store.
#[derive(Clone)]
pub struct TaskQueue {
    db: Database,
    limits: LimitsConfig,
    retry: RetryConfig,
}

impl TaskQueue {
    pub fn new(db: Database, limits: LimitsConfig, retry: RetryConfig) -> Self {
        Self { db, limits, retry }
    }

    /// Atomically claim the next task this profile may work on.
    pub async fn claim_next(
        &self,
        group_id: &str,
        profile_id: &str,
        run_id: &RunId,
    ) -> Result<ClaimResult, CourierError> {
        let result = tasks::claim_next(
            &self.db,
            group_id,
            profile_id,
            run_id.as_str(),
            self.limits.max_messages_per_hour,
        )
        .await?;
        if let ClaimResult::Claimed(task) = &result {
            debug!(
                chat = task.chat_ref.as_str(),
                profile = profile_id,
                cycle = task.completed_cycles + 1,
                of = task.total_cycles,
                "task claimed"
            );
        }
        Ok(result)
    }

    /// Record a delivered message: one transaction covering the attempt
    /// row, task counters, profile pacing, template usage, and rollups.
    pub async fn record_success(
        &self,
        task: &TaskRecord,
        profile_id: &str,
        run_id: &RunId,
        message_text: &str,
        proxy_url: Option<&str>,
    ) -> Result<(), CourierError> {
        let cycle_delay_seconds = (self.limits.cycle_delay_minutes * 60.0).round() as u64;
        tasks::record_success(
            &self.db,
            tasks::SuccessUpdate {
                task_id: task.id,
                group_id: task.group_id.clone(),
                profile_id: profile_id.to_string(),
                run_id: run_id.as_str().to_string(),
                message_text: message_text.to_string(),
                cycle_delay_seconds,
                proxy_url: proxy_url.map(str::to_string),
            },
        )
        .await
    }

    /// Classify a non-success outcome and apply its disposition in one
    /// transaction. Returns the disposition so the worker can honour the
    /// proxy and worker actions.
    pub async fn record_failure(
        &self,
        task: &TaskRecord,
        profile_id: &str,
        run_id: &RunId,
        outcome: &Outcome,
        proxy_url: Option<&str>,
    ) -> Result<Disposition, CourierError> {
        if outcome.is_success() {
            return Err(CourierError::Internal(
                "record_failure called with a success outcome".to_string(),
            ));
        }
        // The block budget is fed by the transport-fault streak alone;
        // restriction failures are recorded without touching it.
        let disposition = classify(
            outcome,
            task.transport_failed_count,
            self.retry.max_attempts_before_block,
        );

        let (block_reason, defer_seconds) = match &disposition.task {
            TaskAction::Block { reason } => (Some((*reason).to_string()), None),
            TaskAction::Backoff => (None, Some(self.retry.failure_backoff_seconds)),
            TaskAction::Release { defer_seconds } => {
                (None, defer_seconds.map(pacing::slow_mode_defer))
            }
            // Success is rejected above.
            TaskAction::AdvanceCycle => (None, None),
        };

        tasks::record_failure(
            &self.db,
            tasks::FailureUpdate {
                task_id: task.id,
                profile_id: profile_id.to_string(),
                run_id: run_id.as_str().to_string(),
                error_kind: outcome.kind().to_string(),
                charge_transport: outcome.is_transport_fault(),
                block_reason,
                defer_seconds,
                profile_action: disposition.profile,
                proxy_tally: disposition.proxy,
                proxy_url: proxy_url.map(str::to_string),
            },
        )
        .await?;
        Ok(disposition)
    }

    /// Release a claim without recording anything. Safe at any point
    /// before recording; used on cancellation.
    pub async fn release_claim(&self, task_id: i64) -> Result<(), CourierError> {
        tasks::release_claim(&self.db, task_id).await
    }

    /// Return orphaned claims to `pending`.
    pub async fn reset_stale(
        &self,
        timeout_minutes: u64,
        group_id: Option<&str>,
    ) -> Result<usize, CourierError> {
        tasks::reset_stale(&self.db, timeout_minutes, group_id.map(str::to_string)).await
    }

    /// Whether anything claimable remains for this group and run, ignoring
    /// pacing and the hourly gate.
    pub async fn remaining_work(&self, group_id: &str, run_id: &RunId) -> Result<i64, CourierError> {
        tasks::remaining_work(&self.db, group_id, run_id.as_str()).await
    }

    /// Uniformly random active template for the group.
    pub async fn random_message(&self, group_id: &str) -> Result<String, CourierError> {
        messages::random_active(&self.db, group_id)
            .await?
            .ok_or_else(|| CourierError::NoMessages {
                group_id: group_id.to_string(),
            })
    }

    /// Randomized delay before this profile's next send.
    pub fn send_delay(&self) -> Duration {
        pacing::send_delay(
            self.limits.max_messages_per_hour,
            self.limits.delay_randomness,
        )
    }

    /// Aggregate counts for the status command.
    pub async fn stats(&self, group_id: &str) -> Result<QueueStats, CourierError> {
        stats::queue_stats(&self.db, group_id).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use courier_core::{ProfileAction, TaskStatus, WorkerAction};
    use courier_storage::queries::profiles;
    use tempfile::tempdir;

    async fn setup() -> (TaskQueue, Database, tempfile::TempDir) {
        let dir = tempdir().unwrap();
        let path = dir.path().join("queue.db");
        let db = Database::open(path.to_str().unwrap(), true).await.unwrap();
        profiles::upsert_profile(&db, "p1", "alpha").await.unwrap();
        let queue = TaskQueue::new(db.clone(), LimitsConfig::default(), RetryConfig::default());
        (queue, db, dir)
    }

    async fn claim(queue: &TaskQueue, run: &RunId) -> TaskRecord {
        match queue.claim_next("g", "p1", run).await.unwrap() {
            ClaimResult::Claimed(task) => task,
            other => panic!("expected claim, got {other:?}"),
        }
    }

    async fn clear_backoff(db: &Database) {
        db.connection()
            .call(|conn| {
                conn.execute("UPDATE tasks SET next_available_at = NULL", [])?;
                Ok(())
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn restriction_failures_never_exhaust_the_failure_budget() {
        let (queue, db, _dir) = setup().await;
        tasks::import_chats(&db, "g", &["@a".to_string()], 10).await.unwrap();
        let run = RunId::new();

        // max_attempts_before_block is 3, but restrictions are exempt.
        for _ in 0..5 {
            let task = claim(&queue, &run).await;
            let d = queue
                .record_failure(&task, "p1", &run, &Outcome::NeedToJoin, None)
                .await
                .unwrap();
            assert_eq!(d.worker, WorkerAction::Continue);
            // Clear the backoff so the next claim sees the task.
            clear_backoff(&db).await;
        }

        let task = tasks::get_task(&db, 1).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(!task.is_blocked);
        // The audit tally grows; the transport streak that feeds the block
        // budget stays untouched.
        assert_eq!(task.failed_count, 5);
        assert_eq!(task.transport_failed_count, 0);
    }

    #[tokio::test]
    async fn only_transport_faults_count_toward_the_block_budget() {
        let (queue, db, _dir) = setup().await;
        tasks::import_chats(&db, "g", &["@a".to_string()], 10).await.unwrap();
        let run = RunId::new();

        // Interleave restrictions and transport faults. With
        // max_attempts_before_block = 3 the block must land on the third
        // transport fault, no matter how many restrictions came between.
        let sequence = [
            Outcome::NeedToJoin,
            Outcome::NeedToJoin,
            Outcome::NetworkError,
            Outcome::PremiumRequired,
            Outcome::Timeout,
            Outcome::UserBlocked,
        ];
        for outcome in &sequence {
            let task = claim(&queue, &run).await;
            queue
                .record_failure(&task, "p1", &run, outcome, None)
                .await
                .unwrap();
            clear_backoff(&db).await;
        }

        // Two transport faults so far: still eligible.
        let task = tasks::get_task(&db, 1).await.unwrap().unwrap();
        assert!(!task.is_blocked, "two transport faults must not block");
        assert_eq!(task.transport_failed_count, 2);
        assert_eq!(task.failed_count, 6);

        // The third transport fault trips the budget.
        let task = claim(&queue, &run).await;
        queue
            .record_failure(&task, "p1", &run, &Outcome::SelectorMissing, None)
            .await
            .unwrap();

        let task = tasks::get_task(&db, 1).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Blocked);
        assert_eq!(task.block_reason.as_deref(), Some("too_many_failures"));
        assert_eq!(task.transport_failed_count, 3);
        assert_eq!(task.failed_count, 7);
    }

    #[tokio::test]
    async fn transport_failures_block_after_the_budget() {
        let (queue, db, _dir) = setup().await;
        tasks::import_chats(&db, "g", &["@a".to_string()], 10).await.unwrap();
        let run = RunId::new();

        for i in 0..3 {
            let task = claim(&queue, &run).await;
            queue
                .record_failure(&task, "p1", &run, &Outcome::NetworkError, None)
                .await
                .unwrap();
            if i < 2 {
                clear_backoff(&db).await;
            }
        }

        let task = tasks::get_task(&db, 1).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Blocked);
        assert_eq!(task.block_reason.as_deref(), Some("too_many_failures"));
        assert_eq!(task.transport_failed_count, 3);
    }

    #[tokio::test]
    async fn frozen_account_blocks_the_profile_not_the_task() {
        let (queue, db, _dir) = setup().await;
        tasks::import_chats(&db, "g", &["@a".to_string()], 1).await.unwrap();
        let run = RunId::new();

        let task = claim(&queue, &run).await;
        let d = queue
            .record_failure(&task, "p1", &run, &Outcome::AccountFrozen, None)
            .await
            .unwrap();
        assert_eq!(d.worker, WorkerAction::StopDoNotRestart);
        assert_eq!(d.profile, ProfileAction::Block);

        let task = tasks::get_task(&db, task.id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(!task.is_blocked);
        // The attempt lands in the audit tally, but a frozen account is
        // not a transport fault: the block budget stays untouched.
        assert_eq!(task.failed_count, 1);
        assert_eq!(task.transport_failed_count, 0);

        let profile = profiles::get_profile(&db, "p1").await.unwrap().unwrap();
        assert!(profile.is_blocked);
        assert!(!profile.is_active);
    }

    #[tokio::test]
    async fn slow_mode_defers_past_the_reported_wait() {
        let (queue, db, _dir) = setup().await;
        tasks::import_chats(&db, "g", &["@a".to_string()], 2).await.unwrap();
        let run = RunId::new();

        let task = claim(&queue, &run).await;
        queue
            .record_failure(
                &task,
                "p1",
                &run,
                &Outcome::SlowMode { wait_seconds: 600 },
                None,
            )
            .await
            .unwrap();

        let task = tasks::get_task(&db, task.id).await.unwrap().unwrap();
        assert_eq!(task.status, TaskStatus::Pending);
        assert!(task.next_available_at.is_some());
        // Deferred well into the future, so nothing is claimable now.
        assert!(matches!(
            queue.claim_next("g", "p1", &run).await.unwrap(),
            ClaimResult::Empty
        ));
    }

    #[tokio::test]
    async fn record_failure_rejects_success_outcomes() {
        let (queue, db, _dir) = setup().await;
        tasks::import_chats(&db, "g", &["@a".to_string()], 1).await.unwrap();
        let run = RunId::new();
        let task = claim(&queue, &run).await;
        let result = queue
            .record_failure(&task, "p1", &run, &Outcome::Success, None)
            .await;
        assert!(result.is_err());
    }

    #[tokio::test]
    async fn random_message_requires_an_imported_template() {
        let (queue, db, _dir) = setup().await;
        let err = queue.random_message("g").await.unwrap_err();
        assert!(matches!(err, CourierError::NoMessages { .. }));

        messages::import_messages(&db, "g", vec!["hello".to_string()])
            .await
            .unwrap();
        assert_eq!(queue.random_message("g").await.unwrap(), "hello");
    }
}
