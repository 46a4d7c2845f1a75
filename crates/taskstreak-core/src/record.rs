//! Per-user checklist state as persisted.
//!
//! The JSON shape is shared with every store backend and the HTTP surface:
//!
//! ```json
//! {
//!   "tasks": [{"text": "Stretch", "completed": false}],
//!   "streak": 3,
//!   "lastCompleted": "2024-06-10",
//!   "lastReset": "2024-06-11",
//!   "timezone": "America/New_York"
//! }
//! ```

use chrono::NaiveDate;
use chrono_tz::Tz;
use serde::{Deserialize, Serialize};

use crate::error::{CoreError, Result};
use crate::reminder::Reminder;

/// One checklist entry. Identity is its position in the owning record.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

impl Task {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            completed: false,
        }
    }
}

/// Everything the reset engine knows about one roster member.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserRecord {
    pub tasks: Vec<Task>,
    #[serde(default)]
    pub streak: u32,
    /// Local date on which every task was last completed.
    #[serde(default, rename = "lastCompleted")]
    pub last_completed: Option<NaiveDate>,
    /// Local date of the most recent reset. At most one reset per date.
    #[serde(default, rename = "lastReset")]
    pub last_reset: Option<NaiveDate>,
    /// Unset until the user picks a zone; resets are inert meanwhile.
    #[serde(default)]
    pub timezone: Option<Tz>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub reminders: Vec<Reminder>,
}

impl UserRecord {
    /// A first-run record: every task unchecked, no streak, no dates.
    pub fn new<I, S>(task_texts: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            tasks: task_texts.into_iter().map(Task::new).collect(),
            streak: 0,
            last_completed: None,
            last_reset: None,
            timezone: None,
            reminders: Vec::new(),
        }
    }

    /// True when there is at least one task and every task is checked.
    pub fn all_completed(&self) -> bool {
        !self.tasks.is_empty() && self.tasks.iter().all(|t| t.completed)
    }

    pub fn completed_count(&self) -> usize {
        self.tasks.iter().filter(|t| t.completed).count()
    }

    /// Decode a stored record.
    ///
    /// # Errors
    /// Returns [`CoreError::InvalidRecord`] for anything that is not a
    /// well-formed record (missing `tasks`, negative streak, unknown zone).
    pub fn from_json(user: &str, json: &str) -> Result<Self> {
        serde_json::from_str(json).map_err(|e| CoreError::InvalidRecord {
            user: user.to_string(),
            message: e.to_string(),
        })
    }

    pub fn to_json_pretty(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }
}
