//! The streak ledger: pure state transitions over a [`UserRecord`].
//!
//! Both the interactive path (a request or CLI command touching a user) and
//! the background scheduler (poll sweep or precise midnight timer) call the
//! same [`evaluate_reset`], so the day-boundary rules live in exactly one
//! place.
//!
//! Rules:
//! - a reset clears every task and stamps `last_reset` with the local date,
//!   at most once per local date;
//! - a reset breaks the streak only when the last full completion is more
//!   than one calendar day old (completed yesterday, reset today keeps it);
//! - the streak grows by exactly one the first time in a local day that
//!   every task is checked.
//!
//! None of these functions perform I/O or fail on a well-formed record.

use chrono::{DateTime, Utc};
use chrono_tz::Tz;

use crate::clock;
use crate::error::{CoreError, Result};
use crate::events::Event;
use crate::record::{Task, UserRecord};

/// The outcome of one ledger operation.
#[derive(Debug, Clone, PartialEq)]
pub struct Transition {
    pub record: UserRecord,
    pub events: Vec<Event>,
}

impl Transition {
    fn unchanged(record: &UserRecord) -> Self {
        Self {
            record: record.clone(),
            events: Vec::new(),
        }
    }

    /// Whether the record differs from `before` and needs persisting.
    pub fn modifies(&self, before: &UserRecord) -> bool {
        &self.record != before
    }
}

/// Clear the checklist if the user's local day has rolled over.
pub fn evaluate_reset(record: &UserRecord, now: DateTime<Utc>) -> Transition {
    let Some(tz) = record.timezone else {
        return Transition::unchanged(record);
    };

    let today = clock::today(tz, now);
    if record.last_reset == Some(today) {
        return Transition::unchanged(record);
    }

    let mut next = record.clone();
    let mut events = Vec::new();

    if let Some(last_completed) = record.last_completed {
        let missed_days = clock::calendar_days_between(last_completed, today);
        if missed_days > 1 {
            events.push(Event::StreakBroken {
                previous_streak: record.streak,
                missed_days,
                date: today,
            });
            next.streak = 0;
        }
    }

    for task in &mut next.tasks {
        task.completed = false;
    }
    next.last_reset = Some(today);
    events.push(Event::TasksReset { date: today });

    Transition {
        record: next,
        events,
    }
}

/// Count today's full completion, once.
///
/// A record that was fully completed and is now partially unchecked is not
/// a streak event; only the daily reset decides breakage. Without a
/// timezone there is no local day to credit, so nothing is counted.
pub fn record_completion(record: &UserRecord, now: DateTime<Utc>) -> Transition {
    if !record.all_completed() {
        return Transition::unchanged(record);
    }
    let Some(tz) = record.timezone else {
        return Transition::unchanged(record);
    };

    let today = clock::today(tz, now);
    if record.last_completed == Some(today) {
        return Transition::unchanged(record);
    }

    let mut next = record.clone();
    next.streak = next.streak.saturating_add(1);
    next.last_completed = Some(today);

    Transition {
        events: vec![
            Event::StreakIncremented {
                streak: next.streak,
                date: today,
            },
            Event::AllTasksCompleted { date: today },
        ],
        record: next,
    }
}

/// Check or uncheck the task at `index`, then credit completion.
///
/// # Errors
/// [`CoreError::InvalidRequest`] if `index` is out of range.
pub fn toggle_task(
    record: &UserRecord,
    index: usize,
    completed: bool,
    now: DateTime<Utc>,
) -> Result<Transition> {
    let len = record.tasks.len();
    let mut next = record.clone();
    let task = next.tasks.get_mut(index).ok_or_else(|| {
        CoreError::InvalidRequest(format!("task index {index} out of range (user has {len} tasks)"))
    })?;
    task.completed = completed;
    Ok(record_completion(&next, now))
}

/// Replace the whole checklist, then credit completion.
///
/// Task identity is positional, so once a record has tasks the replacement
/// must keep the same count.
///
/// # Errors
/// [`CoreError::InvalidRequest`] if the task count changes.
pub fn replace_tasks(record: &UserRecord, tasks: Vec<Task>, now: DateTime<Utc>) -> Result<Transition> {
    if !record.tasks.is_empty() && tasks.len() != record.tasks.len() {
        return Err(CoreError::InvalidRequest(format!(
            "expected {} tasks, got {}",
            record.tasks.len(),
            tasks.len()
        )));
    }
    let mut next = record.clone();
    next.tasks = tasks;
    Ok(record_completion(&next, now))
}

/// Adopt `tz` and treat the current local day as already reset, so tasks
/// ticked before choosing a zone survive until the next local midnight.
pub fn set_timezone(record: &UserRecord, tz: Tz, now: DateTime<Utc>) -> Transition {
    let mut next = record.clone();
    next.timezone = Some(tz);
    next.last_reset = Some(clock::today(tz, now));
    Transition {
        record: next,
        events: Vec::new(),
    }
}
