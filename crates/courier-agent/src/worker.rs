// SPDX-FileCopyrightText: 2026 Courier Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The per-profile worker loop.
//!
//! One worker binds one profile, one run identity, and one driver session:
//! claim a task, drive the send, classify and record the outcome, pace,
//! repeat. The loop is single-threaded and cooperative; the only call that
//! talks to the outside world is the driver send, and it is bounded by the
//! configured timeouts.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use courier_config::TimeoutsConfig;
use courier_core::{
    CourierError, Driver, DriverSession, Outcome, ProfileRecord, ProxyTally, RunId, TaskRecord,
    WorkerAction,
};
use courier_queue::{pacing, ClaimResult, ProxyRegistry, TaskQueue};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// How a worker's run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerExit {
    /// Nothing claimable remains for this group and run.
    Finished,
    /// The shutdown signal interrupted the loop.
    Cancelled,
    /// The profile was terminally rejected; the supervisor must not
    /// respawn it.
    DoNotRestart,
}

/// A single profile's send loop.
pub struct Worker {
    profile: ProfileRecord,
    group_id: String,
    run_id: RunId,
    queue: TaskQueue,
    proxies: ProxyRegistry,
    driver: Arc<dyn Driver>,
    timeouts: TimeoutsConfig,
    /// Successful sends this run; the supervisor resets its restart
    /// backoff whenever this advances.
    progress: Arc<AtomicU64>,
    cancel: CancellationToken,
    current_task: Option<i64>,
}

impl Worker {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        profile: ProfileRecord,
        group_id: String,
        run_id: RunId,
        queue: TaskQueue,
        proxies: ProxyRegistry,
        driver: Arc<dyn Driver>,
        timeouts: TimeoutsConfig,
        progress: Arc<AtomicU64>,
        cancel: CancellationToken,
    ) -> Self {
        Self {
            profile,
            group_id,
            run_id,
            queue,
            proxies,
            driver,
            timeouts,
            progress,
            cancel,
            current_task: None,
        }
    }

    /// Run the loop to completion.
    ///
    /// On any exit path a claimed-but-unrecorded task is released back to
    /// `pending` and the driver session is closed.
    pub async fn run(mut self) -> Result<WorkerExit, CourierError> {
        info!(
            profile = self.profile.profile_name.as_str(),
            group = self.group_id.as_str(),
            "worker starting"
        );

        let Some(proxy_url) = self.proxies.resolve(&self.profile.profile_id).await? else {
            error!(
                profile = self.profile.profile_name.as_str(),
                "no proxy available, worker cannot start"
            );
            return Err(CourierError::ProxyExhausted {
                profile_id: self.profile.profile_id.clone(),
            });
        };

        let mut session = self.launch_driver(&proxy_url).await?;
        let mut proxy_url = proxy_url;

        let result = self.process_loop(&mut session, &mut proxy_url).await;

        if let Some(task_id) = self.current_task.take() {
            info!(task_id, "releasing interrupted claim");
            if let Err(e) = self.queue.release_claim(task_id).await {
                error!(error = %e, task_id, "failed to release claim");
            }
        }
        if let Err(e) = session.close().await {
            warn!(error = %e, "driver session close failed");
        }

        info!(
            profile = self.profile.profile_name.as_str(),
            "worker stopped"
        );
        result
    }

    async fn process_loop(
        &mut self,
        session: &mut Box<dyn DriverSession>,
        proxy_url: &mut String,
    ) -> Result<WorkerExit, CourierError> {
        loop {
            if self.cancel.is_cancelled() {
                return Ok(WorkerExit::Cancelled);
            }

            let claim = self
                .queue
                .claim_next(&self.group_id, &self.profile.profile_id, &self.run_id)
                .await?;

            match claim {
                ClaimResult::Claimed(task) => {
                    self.current_task = Some(task.id);
                    let exit = self.process_task(&task, session, proxy_url).await?;
                    if let Some(exit) = exit {
                        return Ok(exit);
                    }
                }
                ClaimResult::RateLimited => {
                    let delay = self.queue.send_delay();
                    debug!(
                        profile = self.profile.profile_name.as_str(),
                        seconds = delay.as_secs(),
                        "hourly cap reached, pausing"
                    );
                    if self.pause(delay).await {
                        return Ok(WorkerExit::Cancelled);
                    }
                }
                ClaimResult::Empty => {
                    let remaining = self
                        .queue
                        .remaining_work(&self.group_id, &self.run_id)
                        .await?;
                    if remaining == 0 {
                        info!(
                            profile = self.profile.profile_name.as_str(),
                            "no work remains, worker finishing"
                        );
                        return Ok(WorkerExit::Finished);
                    }
                    // Work exists but is deferred or held by peers.
                    if self.pause(self.queue.send_delay()).await {
                        return Ok(WorkerExit::Cancelled);
                    }
                }
            }
        }
    }

    /// Drive one claimed task through send, record, and pacing.
    ///
    /// Returns `Some(exit)` when the worker must stop.
    async fn process_task(
        &mut self,
        task: &TaskRecord,
        session: &mut Box<dyn DriverSession>,
        proxy_url: &mut String,
    ) -> Result<Option<WorkerExit>, CourierError> {
        let message = self.queue.random_message(&self.group_id).await?;

        let budget = self.timeouts.send_budget();
        let outcome = tokio::select! {
            _ = self.cancel.cancelled() => {
                // The claim is released by the cleanup path; nothing was
                // recorded, so releasing is safe.
                return Ok(Some(WorkerExit::Cancelled));
            }
            sent = tokio::time::timeout(budget, session.send(&task.chat_ref, &message)) => {
                match sent {
                    Ok(Ok(outcome)) => outcome,
                    Ok(Err(e)) => {
                        warn!(error = %e, chat = task.chat_ref.as_str(), "driver fault during send");
                        Outcome::UnexpectedError
                    }
                    Err(_) => {
                        warn!(
                            chat = task.chat_ref.as_str(),
                            seconds = budget.as_secs(),
                            "send exceeded its time budget"
                        );
                        Outcome::Timeout
                    }
                }
            }
        };

        if outcome.is_success() {
            self.queue
                .record_success(
                    task,
                    &self.profile.profile_id,
                    &self.run_id,
                    &message,
                    Some(proxy_url.as_str()),
                )
                .await?;
            self.current_task = None;
            self.progress.fetch_add(1, Ordering::Relaxed);
            info!(
                profile = self.profile.profile_name.as_str(),
                chat = task.chat_ref.as_str(),
                "message delivered"
            );

            let delay = self.queue.send_delay();
            debug!(seconds = delay.as_secs(), "pacing before next message");
            if self.pause(delay).await {
                return Ok(Some(WorkerExit::Cancelled));
            }
            return Ok(None);
        }

        let disposition = self
            .queue
            .record_failure(
                task,
                &self.profile.profile_id,
                &self.run_id,
                &outcome,
                Some(proxy_url.as_str()),
            )
            .await?;
        self.current_task = None;
        debug!(
            chat = task.chat_ref.as_str(),
            kind = outcome.kind(),
            "attempt failed"
        );

        if disposition.proxy == ProxyTally::ChatNotFound {
            if let Some(fresh) = self
                .proxies
                .observe_outcome(&self.profile.profile_id, proxy_url)
                .await?
            {
                // New egress: restart the driver session against it.
                info!(
                    profile = self.profile.profile_name.as_str(),
                    "proxy rotated, relaunching driver session"
                );
                if let Err(e) = session.close().await {
                    warn!(error = %e, "old driver session close failed");
                }
                *session = self.launch_driver(&fresh).await?;
                *proxy_url = fresh;
            }
        }

        if disposition.worker == WorkerAction::StopDoNotRestart {
            error!(
                profile = self.profile.profile_name.as_str(),
                kind = outcome.kind(),
                "profile terminally rejected, stopping worker"
            );
            return Ok(Some(WorkerExit::DoNotRestart));
        }

        if self.pause(pacing::FAILURE_PAUSE).await {
            return Ok(Some(WorkerExit::Cancelled));
        }
        Ok(None)
    }

    /// Open a driver session with bounded retries and exponential backoff.
    async fn launch_driver(
        &self,
        proxy_url: &str,
    ) -> Result<Box<dyn DriverSession>, CourierError> {
        const ATTEMPTS: u32 = 3;
        let mut last_err = None;
        for attempt in 0..ATTEMPTS {
            if attempt > 0 {
                let backoff = Duration::from_secs(2u64 << attempt);
                warn!(
                    profile = self.profile.profile_name.as_str(),
                    attempt = attempt + 1,
                    seconds = backoff.as_secs(),
                    "retrying driver launch"
                );
                if self.pause(backoff).await {
                    return Err(CourierError::driver("driver launch cancelled"));
                }
            }
            match self.driver.open(&self.profile, proxy_url).await {
                Ok(session) => {
                    debug!(
                        profile = self.profile.profile_name.as_str(),
                        "driver session open"
                    );
                    return Ok(session);
                }
                Err(e) => {
                    warn!(error = %e, "driver launch failed");
                    last_err = Some(e);
                }
            }
        }
        Err(last_err.unwrap_or_else(|| CourierError::driver("driver launch failed")))
    }

    /// Cancellable sleep. Returns true when the shutdown signal fired.
    async fn pause(&self, duration: Duration) -> bool {
        tokio::select! {
            _ = self.cancel.cancelled() => true,
            _ = tokio::time::sleep(duration) => false,
        }
    }
}
