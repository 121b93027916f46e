// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Lifecycle of N workers under one run identity.
//!
//! Each eligible profile gets a monitor task that spawns its worker as an
//! isolated tokio task (a driver panic unwinds only that worker), restarts
//! it with exponential backoff on transient failures, and honours
//! do-not-restart exits permanently. Shutdown broadcasts the cancel token,
//! waits out the grace window, aborts stragglers, and reaps any claims
//! still marked in-progress.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use courier_config::{SupervisorConfig, TimeoutsConfig};
use courier_core::{Clock, CourierError, Driver, RunId};
use courier_queue::{ProxyRegistry, TaskQueue};
use courier_storage::queries::profiles;
use courier_storage::Database;
use tokio::task::JoinSet;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};

use crate::worker::{Worker, WorkerExit};

/// Terminal state of one profile's monitor.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProfileOutcome {
    /// The worker drained its work and exited cleanly.
    Completed,
    /// Shutdown interrupted the worker.
    Cancelled,
    /// The profile was terminally rejected; never respawned.
    DoNotRestart,
    /// A configuration problem (no proxy, no templates) stopped the
    /// profile; restarting cannot help.
    ConfigFatal,
    /// Transient failures exhausted the restart budget.
    GaveUp,
}

/// What one supervisor invocation did.
#[derive(Debug)]
pub struct RunReport {
    pub run_id: RunId,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub outcomes: Vec<(String, ProfileOutcome)>,
}

impl RunReport {
    /// Process exit code for the control surface: 0 normal, 1 transient
    /// failure, 2 configuration error, 3 do-not-restart.
    pub fn exit_code(&self) -> u8 {
        let outcomes = self.outcomes.iter().map(|(_, o)| o);
        if outcomes.clone().any(|o| *o == ProfileOutcome::DoNotRestart) {
            3
        } else if outcomes
            .clone()
            .any(|o| *o == ProfileOutcome::ConfigFatal)
        {
            2
        } else if outcomes.clone().any(|o| *o == ProfileOutcome::GaveUp) {
            1
        } else {
            0
        }
    }
}

/// Restart backoff: `min(base * 2^k, cap)`.
fn restart_delay(base_seconds: u64, cap_seconds: u64, consecutive_failures: u32) -> Duration {
    let exp = consecutive_failures.min(16);
    let delay = base_seconds.saturating_mul(1u64 << exp);
    Duration::from_secs(delay.min(cap_seconds))
}

/// Errors no restart can fix.
fn is_config_fatal(error: &CourierError) -> bool {
    matches!(
        error,
        CourierError::ProxyExhausted { .. }
            | CourierError::NoMessages { .. }
            | CourierError::Config(_)
    )
}

/// Spawns, monitors, restarts, and terminates per-profile workers.
pub struct Supervisor {
    db: Database,
    queue: TaskQueue,
    proxies: ProxyRegistry,
    driver: Arc<dyn Driver>,
    clock: Arc<dyn Clock>,
    config: SupervisorConfig,
    timeouts: TimeoutsConfig,
}

impl Supervisor {
    pub fn new(
        db: Database,
        queue: TaskQueue,
        proxies: ProxyRegistry,
        driver: Arc<dyn Driver>,
        clock: Arc<dyn Clock>,
        config: SupervisorConfig,
        timeouts: TimeoutsConfig,
    ) -> Self {
        Self {
            db,
            queue,
            proxies,
            driver,
            clock,
            config,
            timeouts,
        }
    }

    /// Run the fleet for one group until the work is drained or the cancel
    /// token fires.
    pub async fn run(
        &self,
        group_id: &str,
        worker_count: usize,
        cancel: CancellationToken,
    ) -> Result<RunReport, CourierError> {
        let run_id = RunId::new();
        let started_at = self.clock.now();
        info!(
            run_id = run_id.as_str(),
            group = group_id,
            "supervisor starting"
        );

        // Reap claims orphaned by a previous crash before handing out work.
        self.queue
            .reset_stale(self.config.stale_task_timeout_minutes, Some(group_id))
            .await?;

        let mut eligible = profiles::eligible_profiles(&self.db).await?;
        if worker_count > 0 {
            eligible.truncate(worker_count);
        }
        if eligible.is_empty() {
            return Err(CourierError::Config(
                "no eligible profiles to run workers".to_string(),
            ));
        }
        info!(workers = eligible.len(), "spawning workers");

        let mut set = JoinSet::new();
        let mut abort_handles = Vec::new();
        for profile in eligible {
            let monitor = MonitorTask {
                profile_id: profile.profile_id.clone(),
                profile_name: profile.profile_name.clone(),
                group_id: group_id.to_string(),
                run_id: run_id.clone(),
                db: self.db.clone(),
                queue: self.queue.clone(),
                proxies: self.proxies.clone(),
                driver: self.driver.clone(),
                config: self.config.clone(),
                timeouts: self.timeouts.clone(),
                cancel: cancel.clone(),
            };
            abort_handles.push(set.spawn(monitor.run()));
        }

        // Watchdog: once shutdown is requested, give workers the grace
        // window and then abort whatever is left.
        let watchdog = {
            let cancel = cancel.clone();
            let grace = Duration::from_secs(self.config.shutdown_grace_seconds);
            tokio::spawn(async move {
                cancel.cancelled().await;
                tokio::time::sleep(grace).await;
                warn!("shutdown grace elapsed, aborting remaining workers");
                for handle in abort_handles {
                    handle.abort();
                }
            })
        };

        let mut outcomes = Vec::new();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((profile_id, outcome)) => {
                    info!(
                        profile = profile_id.as_str(),
                        outcome = format!("{outcome:?}").as_str(),
                        "worker monitor finished"
                    );
                    outcomes.push((profile_id, outcome));
                }
                Err(e) if e.is_cancelled() => {
                    warn!("worker monitor force-terminated after shutdown grace");
                }
                Err(e) => {
                    error!(error = %e, "worker monitor panicked");
                }
            }
        }
        watchdog.abort();

        // Nothing may stay in_progress across supervisor invocations.
        self.queue.reset_stale(0, Some(group_id)).await?;

        let finished_at = self.clock.now();
        info!(
            run_id = run_id.as_str(),
            elapsed_seconds = (finished_at - started_at).num_seconds(),
            "supervisor finished"
        );
        Ok(RunReport {
            run_id,
            started_at,
            finished_at,
            outcomes,
        })
    }
}

/// One profile's restart loop.
struct MonitorTask {
    profile_id: String,
    profile_name: String,
    group_id: String,
    run_id: RunId,
    db: Database,
    queue: TaskQueue,
    proxies: ProxyRegistry,
    driver: Arc<dyn Driver>,
    config: SupervisorConfig,
    timeouts: TimeoutsConfig,
    cancel: CancellationToken,
}

impl MonitorTask {
    async fn run(self) -> (String, ProfileOutcome) {
        let progress = Arc::new(AtomicU64::new(0));
        let mut consecutive_failures = 0u32;
        let mut last_progress = 0u64;

        loop {
            if self.cancel.is_cancelled() {
                return (self.profile_id, ProfileOutcome::Cancelled);
            }

            // Re-read the profile each spawn: a frozen flag set by a prior
            // iteration must stop the loop here.
            let profile = match profiles::get_profile(&self.db, &self.profile_id).await {
                Ok(Some(profile)) => profile,
                Ok(None) => {
                    error!(profile = self.profile_id.as_str(), "profile vanished");
                    return (self.profile_id, ProfileOutcome::ConfigFatal);
                }
                Err(e) => {
                    error!(error = %e, "profile lookup failed");
                    return (self.profile_id, ProfileOutcome::GaveUp);
                }
            };
            if profile.is_blocked || profile.is_logged_out || !profile.is_active {
                warn!(
                    profile = self.profile_name.as_str(),
                    "profile no longer eligible, not restarting"
                );
                return (self.profile_id, ProfileOutcome::DoNotRestart);
            }

            let worker = Worker::new(
                profile,
                self.group_id.clone(),
                self.run_id.clone(),
                self.queue.clone(),
                self.proxies.clone(),
                self.driver.clone(),
                self.timeouts.clone(),
                progress.clone(),
                self.cancel.clone(),
            );

            // Isolated task: a panicking driver unwinds the worker, not us.
            let handle = tokio::spawn(worker.run());
            match handle.await {
                Ok(Ok(WorkerExit::Finished)) => {
                    return (self.profile_id, ProfileOutcome::Completed);
                }
                Ok(Ok(WorkerExit::Cancelled)) => {
                    return (self.profile_id, ProfileOutcome::Cancelled);
                }
                Ok(Ok(WorkerExit::DoNotRestart)) => {
                    return (self.profile_id, ProfileOutcome::DoNotRestart);
                }
                Ok(Err(e)) if is_config_fatal(&e) => {
                    error!(
                        error = %e,
                        profile = self.profile_name.as_str(),
                        "configuration failure, not restarting"
                    );
                    return (self.profile_id, ProfileOutcome::ConfigFatal);
                }
                Ok(Err(e)) => {
                    error!(
                        error = %e,
                        profile = self.profile_name.as_str(),
                        "worker failed"
                    );
                }
                Err(e) if e.is_panic() => {
                    error!(
                        profile = self.profile_name.as_str(),
                        "worker panicked"
                    );
                }
                Err(_) => {
                    return (self.profile_id, ProfileOutcome::Cancelled);
                }
            }

            // Transient failure: back off and restart, resetting the
            // streak whenever the worker delivered since the last restart.
            let delivered = progress.load(Ordering::Relaxed);
            if delivered > last_progress {
                consecutive_failures = 0;
                last_progress = delivered;
            }
            if consecutive_failures >= self.config.max_restart_attempts {
                error!(
                    profile = self.profile_name.as_str(),
                    attempts = consecutive_failures,
                    "restart budget exhausted, giving up"
                );
                return (self.profile_id, ProfileOutcome::GaveUp);
            }

            let delay = restart_delay(
                self.config.restart_base_delay_seconds,
                self.config.restart_max_delay_seconds,
                consecutive_failures,
            );
            consecutive_failures += 1;
            info!(
                profile = self.profile_name.as_str(),
                seconds = delay.as_secs(),
                attempt = consecutive_failures,
                "restarting worker after backoff"
            );
            tokio::select! {
                _ = self.cancel.cancelled() => {
                    return (self.profile_id, ProfileOutcome::Cancelled);
                }
                _ = tokio::time::sleep(delay) => {}
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn restart_delay_doubles_up_to_the_cap() {
        assert_eq!(restart_delay(30, 300, 0), Duration::from_secs(30));
        assert_eq!(restart_delay(30, 300, 1), Duration::from_secs(60));
        assert_eq!(restart_delay(30, 300, 2), Duration::from_secs(120));
        assert_eq!(restart_delay(30, 300, 3), Duration::from_secs(240));
        assert_eq!(restart_delay(30, 300, 4), Duration::from_secs(300));
        assert_eq!(restart_delay(30, 300, 10), Duration::from_secs(300));
    }

    #[test]
    fn restart_delay_survives_huge_failure_counts() {
        // The shift is clamped, so no overflow even at absurd counts.
        assert_eq!(restart_delay(30, 300, u32::MAX), Duration::from_secs(300));
    }

    #[test]
    fn config_errors_are_not_restartable() {
        assert!(is_config_fatal(&CourierError::ProxyExhausted {
            profile_id: "p".into()
        }));
        assert!(is_config_fatal(&CourierError::NoMessages {
            group_id: "g".into()
        }));
        assert!(is_config_fatal(&CourierError::Config("bad".into())));
        assert!(!is_config_fatal(&CourierError::Internal("x".into())));
    }

    #[test]
    fn exit_code_prioritises_do_not_restart() {
        let report = RunReport {
            run_id: RunId::new(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            outcomes: vec![
                ("a".into(), ProfileOutcome::Completed),
                ("b".into(), ProfileOutcome::GaveUp),
                ("c".into(), ProfileOutcome::DoNotRestart),
            ],
        };
        assert_eq!(report.exit_code(), 3);

        let report = RunReport {
            run_id: RunId::new(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            outcomes: vec![
                ("a".into(), ProfileOutcome::Completed),
                ("b".into(), ProfileOutcome::GaveUp),
            ],
        };
        assert_eq!(report.exit_code(), 1);

        let report = RunReport {
            run_id: RunId::new(),
            started_at: Utc::now(),
            finished_at: Utc::now(),
            outcomes: vec![
                ("a".into(), ProfileOutcome::Completed),
                ("b".into(), ProfileOutcome::Cancelled),
            ],
        };
        assert_eq!(report.exit_code(), 0);
    }
}
