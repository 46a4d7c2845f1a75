//! Drives the daily reset at the right wall-clock moments.
//!
//! Two strategies, both built on the idempotent [`StreakService::evaluate`]:
//!
//! - **Poll**: sweep the whole roster on a fixed interval. Always safe; a
//!   restart loses nothing because the first sweep runs immediately.
//! - **Precise**: one timer per user, armed for that user's next local
//!   midnight (or nearest reminder) and re-armed after every firing. Early
//!   or late firings are absorbed by idempotence: an early one finds nothing
//!   to do and re-arms for the remainder.
//!
//! Timers are owned here and aborted on [`ResetScheduler::cancel`],
//! [`ResetScheduler::shutdown`] or drop.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::broadcast::error::RecvError;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;

use crate::service::StreakService;

/// Back-off after a failed evaluation before the precise timer tries again.
pub const RETRY_AFTER: Duration = Duration::from_secs(60);

pub struct ResetScheduler {
    service: Arc<StreakService>,
    timers: Mutex<HashMap<String, JoinHandle<()>>>,
    background: Mutex<Vec<JoinHandle<()>>>,
    retry_after: Duration,
}

impl ResetScheduler {
    pub fn new(service: Arc<StreakService>) -> Arc<Self> {
        Self::with_retry(service, RETRY_AFTER)
    }

    pub fn with_retry(service: Arc<StreakService>, retry_after: Duration) -> Arc<Self> {
        Arc::new(Self {
            service,
            timers: Mutex::new(HashMap::new()),
            background: Mutex::new(Vec::new()),
            retry_after,
        })
    }

    /// Sweep every user now and then every `interval`.
    pub fn start_polling(&self, interval: Duration) {
        let service = Arc::clone(&self.service);
        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                let report = service.sweep().await;
                if report.resets > 0 || !report.failures.is_empty() {
                    tracing::info!(
                        evaluated = report.evaluated,
                        resets = report.resets,
                        streaks_broken = report.streaks_broken,
                        failures = report.failures.len(),
                        "sweep finished"
                    );
                } else {
                    tracing::debug!(evaluated = report.evaluated, "sweep finished");
                }
            }
        });
        tracing::info!(interval_secs = interval.as_secs(), "poll scheduler started");
        self.lock_background().push(handle);
    }

    /// Arm precise timers for the whole roster and follow timezone changes.
    pub fn start_precise(self: &Arc<Self>) {
        for user in self.service.roster().to_vec() {
            self.arm(&user);
        }
        self.follow_timezone_changes();
        tracing::info!(users = self.service.roster().len(), "precise scheduler started");
    }

    /// (Re-)arm the precise timer for `user`, replacing any existing one.
    pub fn arm(&self, user: &str) {
        let service = Arc::clone(&self.service);
        let retry_after = self.retry_after;
        let id = user.to_string();
        let handle = tokio::spawn(async move { run_precise(service, id, retry_after).await });

        if let Some(previous) = self.lock_timers().insert(user.to_string(), handle) {
            previous.abort();
        }
    }

    /// Stop the precise timer for `user`, if any.
    pub fn cancel(&self, user: &str) -> bool {
        match self.lock_timers().remove(user) {
            Some(handle) => {
                handle.abort();
                tracing::debug!(user, "precise timer cancelled");
                true
            }
            None => false,
        }
    }

    /// Number of users with a live precise timer.
    pub fn armed_count(&self) -> usize {
        self.lock_timers()
            .values()
            .filter(|h| !h.is_finished())
            .count()
    }

    /// Abort every timer and background loop.
    pub fn shutdown(&self) {
        let mut timers = self.lock_timers();
        for (_, handle) in timers.drain() {
            handle.abort();
        }
        drop(timers);
        for handle in self.lock_background().drain(..) {
            handle.abort();
        }
        tracing::info!("reset scheduler stopped");
    }

    fn follow_timezone_changes(self: &Arc<Self>) {
        let mut changes = self.service.subscribe_timezone_changes();
        let weak = Arc::downgrade(self);
        let handle = tokio::spawn(async move {
            loop {
                match changes.recv().await {
                    Ok(user) => {
                        let Some(scheduler) = weak.upgrade() else { break };
                        tracing::debug!(user = %user, "timezone changed; re-arming");
                        scheduler.arm(&user);
                    }
                    Err(RecvError::Lagged(_)) => {
                        // Missed some; re-arm everyone rather than guess.
                        let Some(scheduler) = weak.upgrade() else { break };
                        for user in scheduler.service.roster().to_vec() {
                            scheduler.arm(&user);
                        }
                    }
                    Err(RecvError::Closed) => break,
                }
            }
        });
        self.lock_background().push(handle);
    }

    fn lock_timers(&self) -> std::sync::MutexGuard<'_, HashMap<String, JoinHandle<()>>> {
        self.timers.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn lock_background(&self) -> std::sync::MutexGuard<'_, Vec<JoinHandle<()>>> {
        self.background.lock().unwrap_or_else(|p| p.into_inner())
    }
}

impl Drop for ResetScheduler {
    fn drop(&mut self) {
        self.shutdown();
    }
}

/// Evaluate, then sleep until the next moment that matters. Evaluating
/// first catches up anything missed while the timer was not armed.
async fn run_precise(service: Arc<StreakService>, user: String, retry_after: Duration) {
    loop {
        if let Err(err) = service.evaluate(&user).await {
            tracing::warn!(user = %user, error = %err, "scheduled evaluation failed; retrying");
            tokio::time::sleep(retry_after).await;
            continue;
        }

        let wait = match service.next_wakeup(&user).await {
            Ok(Some(wait)) => wait,
            Ok(None) => {
                tracing::debug!(user = %user, "no timezone or reminders; timer idle until re-armed");
                return;
            }
            Err(err) => {
                tracing::warn!(user = %user, error = %err, "could not compute next wakeup");
                retry_after
            }
        };

        tracing::debug!(user = %user, wait_ms = wait.as_millis() as u64, "precise timer armed");
        tokio::time::sleep(wait).await;
    }
}
