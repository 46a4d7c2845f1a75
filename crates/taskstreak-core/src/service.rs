//! Serialized access to user records.
//!
//! [`StreakService`] owns the store, the dispatcher and the clock, and is
//! the only thing that performs read-modify-write on a record. Every such
//! cycle for one user runs under that user's async mutex, whoever started
//! it (HTTP handler, CLI command, poll sweep, midnight timer), so a sweep
//! can never interleave with an interactive check for the same user.
//! Different users never contend.
//!
//! Store calls run on the blocking pool under a deadline. A second,
//! per-user blocking lock orders the raw I/O itself, so a write that
//! outlives its deadline still lands before the next read of that user.
//! Such a write is kept in the user's slot together with the events it
//! would have published; the next cycle waits for it and delivers those
//! events only if it landed.

use std::collections::HashMap;
use std::sync::{Arc, Mutex as StdMutex};
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, Mutex};
use tokio::task::{JoinHandle, JoinSet};
use uuid::Uuid;

use crate::clock::{self, Clock};
use crate::dispatcher::NotificationDispatcher;
use crate::error::{CoreError, Result, StoreError};
use crate::events::Event;
use crate::ledger::{self, Transition};
use crate::milestone::{progress_percent, StreakMilestone};
use crate::record::{Task, UserRecord};
use crate::reminder::{self, NewReminder, Reminder};
use crate::storage::{Config, TaskStore};

struct UserSlot {
    /// Serializes whole cycles for the user.
    op: Mutex<Option<InFlightWrite>>,
    io: Arc<StdMutex<()>>,
}

/// A write that missed its deadline but may still complete.
struct InFlightWrite {
    handle: JoinHandle<std::result::Result<(), StoreError>>,
    record: UserRecord,
    events: Vec<Event>,
}

/// What a cycle does when persisting its result fails transiently.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Unsaved {
    /// Surface the storage error.
    Fail,
    /// Serve the evaluated record anyway. Resets are idempotent, so a
    /// later cycle persists it.
    Serve,
}

/// Result of one sweep over the roster.
#[derive(Debug, Default, Clone, Serialize)]
pub struct SweepReport {
    pub evaluated: usize,
    pub resets: usize,
    pub streaks_broken: usize,
    pub failures: Vec<SweepFailure>,
}

#[derive(Debug, Clone, Serialize)]
pub struct SweepFailure {
    pub user: String,
    pub error: String,
}

/// A record plus the derived figures shown next to it.
#[derive(Debug, Clone, Serialize)]
pub struct UserStatus {
    pub user: String,
    pub completed: usize,
    pub total: usize,
    pub milestone: StreakMilestone,
    pub message: &'static str,
    pub progress_percent: u8,
    pub record: UserRecord,
}

pub struct StreakService {
    store: Arc<dyn TaskStore>,
    dispatcher: Arc<dyn NotificationDispatcher>,
    clock: Arc<dyn Clock>,
    roster: Vec<String>,
    default_tasks: Vec<String>,
    slots: HashMap<String, UserSlot>,
    last_good: StdMutex<HashMap<String, UserRecord>>,
    timeout: Duration,
    reminder_lead: chrono::Duration,
    notify: bool,
    timezone_changes: broadcast::Sender<String>,
}

impl StreakService {
    pub fn new(
        store: Arc<dyn TaskStore>,
        dispatcher: Arc<dyn NotificationDispatcher>,
        clock: Arc<dyn Clock>,
        config: &Config,
    ) -> Self {
        let slots = config
            .roster
            .users
            .iter()
            .map(|u| {
                (
                    u.clone(),
                    UserSlot {
                        op: Mutex::new(None),
                        io: Arc::new(StdMutex::new(())),
                    },
                )
            })
            .collect();
        let (timezone_changes, _) = broadcast::channel(16);

        Self {
            store,
            dispatcher,
            clock,
            roster: config.roster.users.clone(),
            default_tasks: config.roster.default_tasks.clone(),
            slots,
            last_good: StdMutex::new(HashMap::new()),
            timeout: config.store_timeout(),
            reminder_lead: config.reminder_lead(),
            notify: config.notifications.enabled,
            timezone_changes,
        }
    }

    pub fn roster(&self) -> &[String] {
        &self.roster
    }

    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Receives the id of every user whose timezone was just set.
    pub fn subscribe_timezone_changes(&self) -> broadcast::Receiver<String> {
        self.timezone_changes.subscribe()
    }

    /// Current record, brought up to the user's local today first.
    ///
    /// If only persisting the reset fails, the evaluated record is still
    /// returned and the write is retried by the next cycle.
    pub async fn get(&self, user: &str) -> Result<UserRecord> {
        let transition = self.mutate(user, Unsaved::Serve, |record, _| Ok(unchanged(record))).await?;
        Ok(transition.record)
    }

    pub async fn status(&self, user: &str) -> Result<UserStatus> {
        let record = self.get(user).await?;
        let milestone = StreakMilestone::for_streak(record.streak);
        Ok(UserStatus {
            user: user.to_string(),
            completed: record.completed_count(),
            total: record.tasks.len(),
            milestone,
            message: milestone.message(),
            progress_percent: progress_percent(record.streak),
            record,
        })
    }

    /// Run the reset and reminder checks for one user.
    pub async fn evaluate(&self, user: &str) -> Result<Transition> {
        self.mutate(user, Unsaved::Fail, |record, _| Ok(unchanged(record)))
            .await
    }

    /// Replace the checklist (task count is fixed) and credit completion.
    pub async fn update_tasks(&self, user: &str, tasks: Vec<Task>) -> Result<Transition> {
        self.mutate(user, Unsaved::Fail, move |record, now| ledger::replace_tasks(record, tasks, now))
            .await
    }

    pub async fn toggle_task(&self, user: &str, index: usize, completed: bool) -> Result<Transition> {
        self.mutate(user, Unsaved::Fail, |record, now| ledger::toggle_task(record, index, completed, now))
            .await
    }

    /// Validate and adopt a timezone. An unknown zone leaves the record untouched.
    pub async fn set_timezone(&self, user: &str, timezone: &str) -> Result<Transition> {
        let tz = clock::parse_timezone(timezone)?;
        let transition = self
            .mutate(user, Unsaved::Fail, |record, now| Ok(ledger::set_timezone(record, tz, now)))
            .await?;
        let _ = self.timezone_changes.send(user.to_string());
        Ok(transition)
    }

    pub async fn add_reminder(&self, user: &str, req: NewReminder) -> Result<Reminder> {
        let (_, added) = self
            .cycle(user, Unsaved::Fail, |record, _| {
                let (record, added) = reminder::add_reminder(record, req)?;
                Ok((
                    Transition {
                        record,
                        events: Vec::new(),
                    },
                    added,
                ))
            })
            .await?;
        Ok(added)
    }

    pub async fn remove_reminder(&self, user: &str, id: Uuid) -> Result<()> {
        self.mutate(user, Unsaved::Fail, |record, _| {
            Ok(Transition {
                record: reminder::remove_reminder(record, id)?,
                events: Vec::new(),
            })
        })
        .await
        .map(|_| ())
    }

    pub async fn reminders(&self, user: &str) -> Result<Vec<Reminder>> {
        Ok(self.get(user).await?.reminders)
    }

    /// How long until this user next needs evaluating: their local midnight
    /// or their nearest reminder, whichever is first. `None` when neither
    /// exists (no timezone, no reminders).
    pub async fn next_wakeup(&self, user: &str) -> Result<Option<Duration>> {
        let slot = self.slot(user)?;
        let mut in_flight = slot.op.lock().await;
        self.settle(user, &mut in_flight).await?;
        let record = self.load(user).await?;
        let now = self.clock.now();

        let midnight = record
            .timezone
            .map(|tz| Duration::from_millis(clock::millis_until_next_midnight(tz, now)));
        let reminder = reminder::next_reminder_at(&record, self.reminder_lead)
            .map(|at| (at - now).to_std().unwrap_or(Duration::ZERO));

        Ok(match (midnight, reminder) {
            (Some(a), Some(b)) => Some(a.min(b)),
            (a, b) => a.or(b),
        })
    }

    /// Evaluate every roster member concurrently. Failures are reported, not raised.
    pub async fn sweep(self: &Arc<Self>) -> SweepReport {
        let mut set = JoinSet::new();
        for user in self.roster.clone() {
            let service = Arc::clone(self);
            set.spawn(async move {
                let result = service.evaluate(&user).await;
                (user, result)
            });
        }

        let mut report = SweepReport::default();
        while let Some(joined) = set.join_next().await {
            match joined {
                Ok((_, Ok(transition))) => {
                    report.evaluated += 1;
                    for event in &transition.events {
                        match event {
                            Event::TasksReset { .. } => report.resets += 1,
                            Event::StreakBroken { .. } => report.streaks_broken += 1,
                            _ => {}
                        }
                    }
                }
                Ok((user, Err(err))) => {
                    if err.is_transient() {
                        tracing::warn!(user = %user, error = %err, "sweep skipped user; retrying next cycle");
                    } else {
                        tracing::error!(user = %user, error = %err, "sweep failed for user");
                    }
                    report.failures.push(SweepFailure {
                        user,
                        error: err.to_string(),
                    });
                }
                Err(join_err) => {
                    tracing::error!(error = %join_err, "sweep task panicked");
                    report.failures.push(SweepFailure {
                        user: String::new(),
                        error: join_err.to_string(),
                    });
                }
            }
        }
        report
    }

    async fn mutate<F>(&self, user: &str, unsaved: Unsaved, apply: F) -> Result<Transition>
    where
        F: FnOnce(&UserRecord, DateTime<Utc>) -> Result<Transition>,
    {
        let (transition, ()) = self
            .cycle(user, unsaved, |record, now| Ok((apply(record, now)?, ())))
            .await?;
        Ok(transition)
    }

    /// One serialized read-modify-write cycle.
    ///
    /// The record is always brought up to date (reset, reminders) before
    /// `apply` sees it, so a mutation made just after local midnight never
    /// lands on yesterday's checklist. Events are published only once the
    /// record carrying them is stored.
    async fn cycle<F, T>(&self, user: &str, unsaved: Unsaved, apply: F) -> Result<(Transition, T)>
    where
        F: FnOnce(&UserRecord, DateTime<Utc>) -> Result<(Transition, T)>,
    {
        let slot = self.slot(user)?;
        let mut in_flight = slot.op.lock().await;
        let mut events = self.settle(user, &mut in_flight).await?;

        let current = self.load(user).await?;
        let now = self.clock.now();

        let reset = ledger::evaluate_reset(&current, now);
        let reminders = reminder::check_reminders(&reset.record, now, self.reminder_lead);
        let (applied, output) = apply(&reminders.record, now)?;
        let changed = applied.modifies(&current);
        let Transition {
            record,
            events: applied_events,
        } = applied;

        let mut fresh = reset.events;
        fresh.extend(reminders.events);
        fresh.extend(applied_events);

        if changed {
            if let Err(err) = self.save(user, &record, &fresh, &mut in_flight).await {
                if unsaved == Unsaved::Serve && err.is_transient() {
                    tracing::warn!(user, error = %err, "could not persist evaluated record; serving it unsaved");
                    return Ok((Transition { record, events }, output));
                }
                return Err(err);
            }
            tracing::debug!(user, events = fresh.len(), "record updated");
        }
        self.publish(user, &fresh);
        events.extend(fresh);

        Ok((Transition { record, events }, output))
    }

    /// Resolve a write left running by an earlier cycle. If it landed, its
    /// events are delivered now and returned. If it failed, the stored
    /// record never changed and the next evaluation derives them again.
    async fn settle(&self, user: &str, in_flight: &mut Option<InFlightWrite>) -> Result<Vec<Event>> {
        let joined = match in_flight.as_mut() {
            None => return Ok(Vec::new()),
            Some(write) => tokio::time::timeout(self.timeout, &mut write.handle).await,
        };
        let Ok(joined) = joined else {
            return Err(self.timed_out(user));
        };
        let Some(write) = in_flight.take() else {
            return Ok(Vec::new());
        };

        match joined {
            Ok(Ok(())) => {
                tracing::info!(user, events = write.events.len(), "late write landed; delivering its events");
                self.remember(user, &write.record);
                self.publish(user, &write.events);
                Ok(write.events)
            }
            Ok(Err(err)) => {
                tracing::warn!(user, error = %err, "late write failed; record left unchanged");
                Ok(Vec::new())
            }
            Err(join_err) => {
                tracing::warn!(user, error = %join_err, "late write aborted; record left unchanged");
                Ok(Vec::new())
            }
        }
    }

    fn slot(&self, user: &str) -> Result<&UserSlot> {
        self.slots
            .get(user)
            .ok_or_else(|| CoreError::UserNotFound(user.to_string()))
    }

    async fn load(&self, user: &str) -> Result<UserRecord> {
        let slot = self.slot(user)?;
        let store = Arc::clone(&self.store);
        let io = Arc::clone(&slot.io);
        let id = user.to_string();
        let read = self
            .blocking(user, move || {
                let _io = io.lock().unwrap_or_else(|p| p.into_inner());
                store.read(&id)
            })
            .await?;

        match read {
            Ok(record) => {
                self.remember(user, &record);
                Ok(record)
            }
            Err(StoreError::NotFound(_)) => {
                tracing::info!(user, "no stored record; starting a fresh one");
                Ok(UserRecord::new(self.default_tasks.iter().cloned()))
            }
            Err(StoreError::Corrupt(message)) => match self.cached(user) {
                Some(record) => {
                    tracing::warn!(user, %message, "stored record is corrupt; using last known-good copy");
                    Ok(record)
                }
                None => {
                    tracing::error!(user, %message, "stored record is corrupt and no good copy is cached");
                    Err(CoreError::InvalidRecord {
                        user: user.to_string(),
                        message,
                    })
                }
            },
            Err(other) => Err(CoreError::from_store(user, other)),
        }
    }

    /// Persist `record`. A write that misses the deadline keeps running
    /// and is parked in `in_flight` with the events it carries.
    async fn save(
        &self,
        user: &str,
        record: &UserRecord,
        events: &[Event],
        in_flight: &mut Option<InFlightWrite>,
    ) -> Result<()> {
        let slot = self.slot(user)?;
        let store = Arc::clone(&self.store);
        let io = Arc::clone(&slot.io);
        let id = user.to_string();
        let owned = record.clone();
        let mut handle = tokio::task::spawn_blocking(move || {
            let _io = io.lock().unwrap_or_else(|p| p.into_inner());
            store.write(&id, &owned)
        });

        match tokio::time::timeout(self.timeout, &mut handle).await {
            Ok(Ok(written)) => {
                written.map_err(|e| CoreError::from_store(user, e))?;
                self.remember(user, record);
                Ok(())
            }
            Ok(Err(join_err)) => Err(unavailable(user, join_err.to_string())),
            Err(_) => {
                *in_flight = Some(InFlightWrite {
                    handle,
                    record: record.clone(),
                    events: events.to_vec(),
                });
                Err(self.timed_out(user))
            }
        }
    }

    /// Run store I/O off the async threads, bounded by the configured timeout.
    async fn blocking<T, F>(&self, user: &str, f: F) -> Result<std::result::Result<T, StoreError>>
    where
        T: Send + 'static,
        F: FnOnce() -> std::result::Result<T, StoreError> + Send + 'static,
    {
        match tokio::time::timeout(self.timeout, tokio::task::spawn_blocking(f)).await {
            Ok(Ok(result)) => Ok(result),
            Ok(Err(join_err)) => Err(unavailable(user, join_err.to_string())),
            Err(_) => Err(self.timed_out(user)),
        }
    }

    fn timed_out(&self, user: &str) -> CoreError {
        CoreError::from_store(
            user,
            StoreError::Timeout {
                timeout_ms: self.timeout.as_millis() as u64,
            },
        )
    }

    fn publish(&self, user: &str, events: &[Event]) {
        for event in events {
            match event {
                Event::TasksReset { date } => tracing::info!(user, %date, "tasks reset"),
                Event::StreakBroken {
                    previous_streak,
                    missed_days,
                    ..
                } => tracing::info!(user, previous_streak, missed_days, "streak broken"),
                Event::StreakIncremented { streak, .. } => tracing::info!(user, streak, "streak incremented"),
                _ => {}
            }
            if self.notify {
                self.dispatcher.dispatch(user, event, &event.describe());
            }
        }
    }

    fn remember(&self, user: &str, record: &UserRecord) {
        self.last_good
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .insert(user.to_string(), record.clone());
    }

    fn cached(&self, user: &str) -> Option<UserRecord> {
        self.last_good
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .get(user)
            .cloned()
    }
}

fn unchanged(record: &UserRecord) -> Transition {
    Transition {
        record: record.clone(),
        events: Vec::new(),
    }
}

fn unavailable(user: &str, message: String) -> CoreError {
    CoreError::StorageUnavailable {
        user: user.to_string(),
        message,
    }
}
