//! Delivery of human-visible notifications.
//!
//! The core only emits intents. Whatever sits behind a dispatcher (a log
//! or a test recorder) is fire-and-forget: nothing it does can fail a
//! ledger operation.

use std::sync::Mutex;

use serde::Serialize;

use crate::events::{Event, EventKind};

/// One delivered intent.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Notification {
    pub user: String,
    pub event: Event,
    pub payload: String,
}

/// Every notification sink implements this trait.
pub trait NotificationDispatcher: Send + Sync {
    /// Hand off one event. Must not block for long and must not panic.
    fn dispatch(&self, user: &str, event: &Event, payload: &str);
}

/// Writes each intent as a structured `tracing` event.
#[derive(Debug, Default, Clone, Copy)]
pub struct LogDispatcher;

impl NotificationDispatcher for LogDispatcher {
    fn dispatch(&self, user: &str, event: &Event, payload: &str) {
        match event.kind() {
            EventKind::StreakBroken => tracing::warn!(user, kind = ?event.kind(), "{payload}"),
            _ => tracing::info!(user, kind = ?event.kind(), "{payload}"),
        }
    }
}

/// Keeps everything it is given.
#[derive(Debug, Default)]
pub struct RecordingDispatcher {
    seen: Mutex<Vec<Notification>>,
}

impl RecordingDispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn notifications(&self) -> Vec<Notification> {
        self.seen.lock().unwrap_or_else(|p| p.into_inner()).clone()
    }

    pub fn count(&self, kind: EventKind) -> usize {
        self.seen
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .iter()
            .filter(|n| n.event.kind() == kind)
            .count()
    }
}

impl NotificationDispatcher for RecordingDispatcher {
    fn dispatch(&self, user: &str, event: &Event, payload: &str) {
        self.seen
            .lock()
            .unwrap_or_else(|p| p.into_inner())
            .push(Notification {
                user: user.to_string(),
                event: event.clone(),
                payload: payload.to_string(),
            });
    }
}
