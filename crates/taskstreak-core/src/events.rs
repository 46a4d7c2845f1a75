use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::milestone::StreakMilestone;

/// Every ledger transition produces zero or more events.
/// The service hands them to the notification dispatcher; nothing in the
/// core consults a dispatcher's outcome.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum Event {
    /// Task flags were cleared for a new local day.
    TasksReset { date: NaiveDate },
    /// At least one full day passed without completing every task.
    StreakBroken {
        previous_streak: u32,
        missed_days: i64,
        date: NaiveDate,
    },
    StreakIncremented { streak: u32, date: NaiveDate },
    AllTasksCompleted { date: NaiveDate },
    /// A task reminder is coming up or has come due.
    ReminderDue {
        reminder_id: Uuid,
        task_index: usize,
        title: String,
        body: String,
        stage: ReminderStage,
        at: DateTime<Utc>,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReminderStage {
    /// Within the configured lead time before the reminder.
    Upcoming,
    /// The reminder time has passed.
    Due,
}

/// Discriminant of [`Event`], for filtering and display.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    TasksReset,
    StreakBroken,
    StreakIncremented,
    AllTasksCompleted,
    ReminderDue,
}

impl Event {
    pub fn kind(&self) -> EventKind {
        match self {
            Event::TasksReset { .. } => EventKind::TasksReset,
            Event::StreakBroken { .. } => EventKind::StreakBroken,
            Event::StreakIncremented { .. } => EventKind::StreakIncremented,
            Event::AllTasksCompleted { .. } => EventKind::AllTasksCompleted,
            Event::ReminderDue { .. } => EventKind::ReminderDue,
        }
    }

    /// Human-readable text handed to the dispatcher.
    pub fn describe(&self) -> String {
        match self {
            Event::TasksReset { date } => format!("New day ({date}): tasks cleared"),
            Event::StreakBroken {
                previous_streak,
                missed_days,
                ..
            } => format!(
                "Streak of {previous_streak} days ended after {missed_days} days without completing every task"
            ),
            Event::StreakIncremented { streak, .. } => format!(
                "All tasks completed! Streak +1 (now {streak} days). {}",
                StreakMilestone::for_streak(*streak).message()
            ),
            Event::AllTasksCompleted { date } => format!("Every task done for {date}"),
            Event::ReminderDue {
                title, body, stage, ..
            } => match stage {
                ReminderStage::Upcoming => format!("Reminder: \"{title}\" is coming up"),
                ReminderStage::Due => format!("{title}: {body}"),
            },
        }
    }
}
