//! Per-task reminders.
//!
//! A reminder fires twice: once as an "upcoming" notice when the lead time
//! before it is reached, and once when it comes due. Daily reminders then
//! move to the same local wall-clock time on the next calendar day.

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::clock;
use crate::error::{CoreError, Result};
use crate::events::{Event, ReminderStage};
use crate::ledger::Transition;
use crate::record::UserRecord;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Reminder {
    pub id: Uuid,
    pub task_index: usize,
    pub title: String,
    #[serde(default)]
    pub body: String,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub repeat_daily: bool,
    #[serde(default)]
    pub processed: bool,
    #[serde(default)]
    pub reminder_shown: bool,
}

/// Request payload for creating a reminder.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct NewReminder {
    pub task_index: usize,
    pub title: String,
    #[serde(default)]
    pub body: Option<String>,
    pub time: DateTime<Utc>,
    #[serde(default)]
    pub repeat_daily: bool,
}

impl Reminder {
    fn from_request(req: NewReminder) -> Self {
        Self {
            id: Uuid::new_v4(),
            task_index: req.task_index,
            body: req
                .body
                .unwrap_or_else(|| "Time to complete your task!".to_string()),
            title: req.title,
            time: req.time,
            repeat_daily: req.repeat_daily,
            processed: false,
            reminder_shown: false,
        }
    }

    /// The next instant at which this reminder has something to say.
    fn next_trigger(&self, lead: Duration) -> Option<DateTime<Utc>> {
        if self.processed {
            None
        } else if self.reminder_shown {
            Some(self.time)
        } else {
            Some(self.time - lead)
        }
    }
}

/// Attach a reminder to one of the user's tasks.
///
/// # Errors
/// [`CoreError::InvalidRequest`] for an unknown task index or blank title.
pub fn add_reminder(record: &UserRecord, req: NewReminder) -> Result<(UserRecord, Reminder)> {
    if req.task_index >= record.tasks.len() {
        return Err(CoreError::InvalidRequest(format!(
            "task index {} out of range (user has {} tasks)",
            req.task_index,
            record.tasks.len()
        )));
    }
    if req.title.trim().is_empty() {
        return Err(CoreError::InvalidRequest("reminder title is empty".into()));
    }
    let reminder = Reminder::from_request(req);
    let mut next = record.clone();
    next.reminders.push(reminder.clone());
    Ok((next, reminder))
}

/// # Errors
/// [`CoreError::InvalidRequest`] if no reminder has that id.
pub fn remove_reminder(record: &UserRecord, id: Uuid) -> Result<UserRecord> {
    let mut next = record.clone();
    let before = next.reminders.len();
    next.reminders.retain(|r| r.id != id);
    if next.reminders.len() == before {
        return Err(CoreError::InvalidRequest(format!("no reminder with id {id}")));
    }
    Ok(next)
}

/// Emit `ReminderDue` for everything that has come up since the last check.
pub fn check_reminders(record: &UserRecord, now: DateTime<Utc>, lead: Duration) -> Transition {
    let mut next = record.clone();
    let mut events = Vec::new();

    for reminder in &mut next.reminders {
        if reminder.processed {
            continue;
        }
        if now >= reminder.time {
            events.push(due_event(reminder, ReminderStage::Due, now));
            reminder.processed = true;
            reminder.reminder_shown = true;
            if reminder.repeat_daily {
                advance_daily(reminder, record, now);
            }
        } else if now >= reminder.time - lead && !reminder.reminder_shown {
            events.push(due_event(reminder, ReminderStage::Upcoming, now));
            reminder.reminder_shown = true;
        }
    }

    Transition {
        record: next,
        events,
    }
}

/// Earliest instant a pending reminder needs attention, if any.
pub fn next_reminder_at(record: &UserRecord, lead: Duration) -> Option<DateTime<Utc>> {
    record
        .reminders
        .iter()
        .filter_map(|r| r.next_trigger(lead))
        .min()
}

fn advance_daily(reminder: &mut Reminder, record: &UserRecord, now: DateTime<Utc>) {
    // Skip occurrences missed while offline rather than replaying them.
    while reminder.time <= now {
        reminder.time = match record.timezone {
            Some(tz) => clock::shift_local_days(tz, reminder.time, 1),
            None => reminder.time + Duration::days(1),
        };
    }
    reminder.processed = false;
    reminder.reminder_shown = false;
}

fn due_event(reminder: &Reminder, stage: ReminderStage, now: DateTime<Utc>) -> Event {
    Event::ReminderDue {
        reminder_id: reminder.id,
        task_index: reminder.task_index,
        title: reminder.title.clone(),
        body: reminder.body.clone(),
        stage,
        at: now,
    }
}
