//! # Taskstreak Core Library
//!
//! Business logic for Taskstreak, a per-user daily checklist whose tasks
//! clear at each user's local midnight and whose streak counts consecutive
//! days of full completion. The CLI and the HTTP server are thin layers over
//! this crate.
//!
//! ## Architecture
//!
//! - **Ledger**: pure reset / completion transitions over a [`UserRecord`]
//! - **Service**: serialized per-user read-modify-write with storage deadlines
//! - **Scheduler**: poll sweep or precise per-user midnight timers
//! - **Storage**: JSON file or SQLite records, TOML configuration
//!
//! ## Key Components
//!
//! - [`StreakService`]: the single entry point for reading and mutating records
//! - [`ResetScheduler`]: background driver of the daily reset
//! - [`TaskStore`]: trait implemented by every storage backend
//! - [`Config`]: application configuration management

pub mod clock;
pub mod dispatcher;
pub mod error;
pub mod events;
pub mod ledger;
pub mod milestone;
pub mod record;
pub mod reminder;
pub mod scheduler;
pub mod service;
pub mod storage;

pub use clock::{Clock, FixedClock, SystemClock};
pub use dispatcher::{LogDispatcher, Notification, NotificationDispatcher, RecordingDispatcher};
pub use error::{ConfigError, CoreError, StoreError};
pub use events::{Event, EventKind, ReminderStage};
pub use ledger::Transition;
pub use milestone::StreakMilestone;
pub use record::{Task, UserRecord};
pub use reminder::{NewReminder, Reminder};
pub use scheduler::ResetScheduler;
pub use service::{StreakService, SweepFailure, SweepReport, UserStatus};
pub use storage::{Config, JsonFileStore, MemoryStore, SqliteStore, TaskStore};
