//! Integration tests for the serialized streak service.
//!
//! These run the full read-modify-write cycle against the in-memory store
//! with a fixed clock and a recording dispatcher.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, NaiveDate, Utc};
use taskstreak_core::reminder::NewReminder;
use taskstreak_core::{
    Config, CoreError, EventKind, FixedClock, MemoryStore, RecordingDispatcher, StreakMilestone,
    StreakService, TaskStore, UserRecord,
};

fn utc(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s).unwrap().with_timezone(&Utc)
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

struct Harness {
    service: Arc<StreakService>,
    store: Arc<MemoryStore>,
    clock: Arc<FixedClock>,
    dispatcher: Arc<RecordingDispatcher>,
}

fn harness(config: Config, now: &str) -> Harness {
    let store = Arc::new(MemoryStore::new());
    let clock = Arc::new(FixedClock::at(now).unwrap());
    let dispatcher = Arc::new(RecordingDispatcher::new());
    let service = Arc::new(StreakService::new(
        store.clone(),
        dispatcher.clone(),
        clock.clone(),
        &config,
    ));
    Harness {
        service,
        store,
        clock,
        dispatcher,
    }
}

fn new_york(last_reset: &str) -> UserRecord {
    let mut record = UserRecord::new(["Stretch", "Read", "Water", "Walk", "Journal"]);
    record.timezone = Some(chrono_tz::America::New_York);
    record.last_reset = Some(date(last_reset));
    record
}

#[tokio::test]
async fn test_five_toggles_credit_one_day() {
    // 11:00 EDT
    let h = harness(Config::default(), "2024-06-11T15:00:00Z");
    h.store.write("kioma", &new_york("2024-06-11")).unwrap();

    for index in 0..5 {
        h.service.toggle_task("kioma", index, true).await.unwrap();
    }

    let record = h.store.read("kioma").unwrap();
    assert_eq!(record.streak, 1);
    assert_eq!(record.last_completed, Some(date("2024-06-11")));
    assert_eq!(h.dispatcher.count(EventKind::StreakIncremented), 1);
    assert_eq!(h.dispatcher.count(EventKind::AllTasksCompleted), 1);

    // Unchecking and re-checking the same day is not a second credit.
    h.service.toggle_task("kioma", 2, false).await.unwrap();
    h.service.toggle_task("kioma", 2, true).await.unwrap();
    assert_eq!(h.dispatcher.count(EventKind::StreakIncremented), 1);
    assert_eq!(h.store.read("kioma").unwrap().streak, 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_concurrent_toggles_are_not_lost() {
    let h = harness(Config::default(), "2024-06-11T15:00:00Z");
    h.store.write("kioma", &new_york("2024-06-11")).unwrap();

    let mut handles = Vec::new();
    for index in 0..5 {
        let service = Arc::clone(&h.service);
        handles.push(tokio::spawn(async move {
            service.toggle_task("kioma", index, true).await
        }));
    }
    for handle in handles {
        handle.await.unwrap().unwrap();
    }

    let record = h.store.read("kioma").unwrap();
    assert!(record.all_completed());
    assert_eq!(record.streak, 1);
    assert_eq!(h.dispatcher.count(EventKind::StreakIncremented), 1);
}

#[tokio::test]
async fn test_get_resets_after_local_midnight() {
    let h = harness(Config::default(), "2024-06-11T05:00:00Z");
    let mut record = new_york("2024-06-10");
    record.last_completed = Some(date("2024-06-10"));
    record.streak = 4;
    for task in &mut record.tasks {
        task.completed = true;
    }
    h.store.write("kioma", &record).unwrap();

    let status = h.service.status("kioma").await.unwrap();
    assert_eq!(status.record.streak, 4);
    assert_eq!(status.completed, 0);
    assert_eq!(status.total, 5);
    assert_eq!(status.milestone, StreakMilestone::for_streak(4));
    assert_eq!(status.record.last_reset, Some(date("2024-06-11")));
    assert_eq!(h.dispatcher.count(EventKind::TasksReset), 1);
    assert_eq!(h.dispatcher.count(EventKind::StreakBroken), 0);

    // Same day again: nothing new.
    h.clock.advance(chrono::Duration::hours(3));
    h.service.get("kioma").await.unwrap();
    assert_eq!(h.dispatcher.count(EventKind::TasksReset), 1);
}

#[tokio::test]
async fn test_reset_breaks_stale_streak() {
    let h = harness(Config::default(), "2024-06-11T05:00:00Z");
    let mut record = new_york("2024-06-10");
    record.last_completed = Some(date("2024-06-09"));
    record.streak = 9;
    h.store.write("kioma", &record).unwrap();

    let transition = h.service.evaluate("kioma").await.unwrap();
    assert_eq!(transition.record.streak, 0);
    assert_eq!(h.dispatcher.count(EventKind::StreakBroken), 1);
    assert_eq!(h.store.read("kioma").unwrap().streak, 0);
}

#[tokio::test]
async fn test_unknown_user_is_not_found() {
    let h = harness(Config::default(), "2024-06-11T15:00:00Z");
    let err = h.service.get("mallory").await.unwrap_err();
    assert!(matches!(err, CoreError::UserNotFound(ref id) if id == "mallory"));
}

#[tokio::test]
async fn test_missing_record_starts_from_default_tasks() {
    let config = Config::default();
    let h = harness(config.clone(), "2024-06-11T15:00:00Z");

    let record = h.service.get("takitsu").await.unwrap();
    assert_eq!(record.tasks.len(), config.roster.default_tasks.len());
    assert_eq!(record.streak, 0);
    assert!(record.timezone.is_none());
    // Reading alone persists nothing.
    assert_eq!(h.store.write_count(), 0);
}

#[tokio::test]
async fn test_invalid_timezone_keeps_record() {
    let h = harness(Config::default(), "2024-06-11T15:00:00Z");
    h.store.write("kioma", &new_york("2024-06-11")).unwrap();
    let writes = h.store.write_count();

    let err = h.service.set_timezone("kioma", "Mars/Olympus_Mons").await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidTimezone(_)));
    assert_eq!(h.store.write_count(), writes);
    assert_eq!(
        h.store.read("kioma").unwrap().timezone,
        Some(chrono_tz::America::New_York)
    );
}

#[tokio::test]
async fn test_set_timezone_keeps_ticked_tasks_and_notifies() {
    let h = harness(Config::default(), "2024-06-11T15:00:00Z");
    let mut record = UserRecord::new(["Stretch", "Read"]);
    record.tasks[0].completed = true;
    h.store.write("kioma", &record).unwrap();
    let mut changes = h.service.subscribe_timezone_changes();

    let transition = h.service.set_timezone("kioma", "Asia/Tokyo").await.unwrap();
    assert_eq!(transition.record.timezone, Some(chrono_tz::Asia::Tokyo));
    // 00:00 on the 12th in Tokyo.
    assert_eq!(transition.record.last_reset, Some(date("2024-06-12")));
    assert!(transition.record.tasks[0].completed);
    assert_eq!(changes.recv().await.unwrap(), "kioma");
}

#[tokio::test]
async fn test_corrupt_record_served_from_last_known_good() {
    let h = harness(Config::default(), "2024-06-11T15:00:00Z");
    let mut record = new_york("2024-06-11");
    record.streak = 12;
    h.store.write("kioma", &record).unwrap();

    h.service.get("kioma").await.unwrap();
    h.store.insert_raw("kioma", r#"{"streak": "twelve"}"#);
    let writes = h.store.write_count();

    let served = h.service.get("kioma").await.unwrap();
    assert_eq!(served.streak, 12);
    assert_eq!(h.store.write_count(), writes);
}

#[tokio::test]
async fn test_corrupt_record_without_cache_is_invalid() {
    let h = harness(Config::default(), "2024-06-11T15:00:00Z");
    h.store.insert_raw("kioma", "not json");

    let err = h.service.get("kioma").await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidRecord { .. }));
    assert_eq!(h.store.write_count(), 0);
}

#[tokio::test]
async fn test_slow_storage_is_unavailable() {
    let mut config = Config::default();
    config.storage.timeout_ms = 50;
    let h = harness(config, "2024-06-11T15:00:00Z");
    h.store.write("kioma", &new_york("2024-06-11")).unwrap();
    h.store.set_delay(Duration::from_millis(300));

    let err = h.service.evaluate("kioma").await.unwrap_err();
    assert!(matches!(err, CoreError::StorageUnavailable { .. }));
    assert!(err.is_transient());

    h.store.set_delay(Duration::ZERO);
    // Let the abandoned read finish and release the user's I/O lock.
    tokio::time::sleep(Duration::from_millis(400)).await;
    assert!(h.service.evaluate("kioma").await.is_ok());
}

fn lapsed_new_york() -> UserRecord {
    let mut record = new_york("2024-06-10");
    record.streak = 7;
    record.last_completed = Some(date("2024-06-09"));
    record
}

#[tokio::test]
async fn test_late_reset_write_delivers_its_events_once() {
    let mut config = Config::default();
    config.storage.timeout_ms = 50;
    // 01:00 EDT
    let h = harness(config, "2024-06-11T05:00:00Z");
    h.store.write("kioma", &lapsed_new_york()).unwrap();
    h.store.set_write_delay(Duration::from_millis(200));

    // The reset is served even though persisting it misses the deadline.
    let served = h.service.get("kioma").await.unwrap();
    assert_eq!(served.streak, 0);
    assert_eq!(served.last_reset, Some(date("2024-06-11")));
    assert_eq!(h.dispatcher.count(EventKind::TasksReset), 0);

    h.store.set_write_delay(Duration::ZERO);
    tokio::time::sleep(Duration::from_millis(300)).await;

    let transition = h.service.evaluate("kioma").await.unwrap();
    assert_eq!(transition.events.len(), 2);
    assert_eq!(h.dispatcher.count(EventKind::TasksReset), 1);
    assert_eq!(h.dispatcher.count(EventKind::StreakBroken), 1);
    assert_eq!(h.store.read("kioma").unwrap().streak, 0);

    let again = h.service.evaluate("kioma").await.unwrap();
    assert!(again.events.is_empty());
    assert_eq!(h.dispatcher.count(EventKind::TasksReset), 1);
    assert_eq!(h.dispatcher.count(EventKind::StreakBroken), 1);
}

#[tokio::test]
async fn test_failed_reset_write_is_rederived_next_cycle() {
    let h = harness(Config::default(), "2024-06-11T05:00:00Z");
    h.store.write("kioma", &lapsed_new_york()).unwrap();
    h.store.set_writes_failing(true);

    let served = h.service.get("kioma").await.unwrap();
    assert_eq!(served.last_reset, Some(date("2024-06-11")));
    assert_eq!(h.store.read("kioma").unwrap().last_reset, Some(date("2024-06-10")));

    // Scheduled evaluation surfaces the failure so it is retried.
    let err = h.service.evaluate("kioma").await.unwrap_err();
    assert!(err.is_transient());
    // Mutations are never acknowledged unsaved.
    assert!(h.service.toggle_task("kioma", 0, true).await.is_err());
    assert_eq!(h.dispatcher.count(EventKind::TasksReset), 0);

    h.store.set_writes_failing(false);
    let transition = h.service.evaluate("kioma").await.unwrap();
    assert_eq!(transition.events.len(), 2);
    assert_eq!(h.dispatcher.count(EventKind::TasksReset), 1);
    assert_eq!(h.dispatcher.count(EventKind::StreakBroken), 1);
    assert_eq!(h.store.read("kioma").unwrap().last_reset, Some(date("2024-06-11")));
}

#[tokio::test]
async fn test_sweep_reports_failures_and_continues() {
    let h = harness(Config::default(), "2024-06-11T05:00:00Z");
    h.store.insert_raw("kioma", "{");
    h.store.write("takitsu", &new_york("2024-06-10")).unwrap();

    let report = h.service.sweep().await;
    assert_eq!(report.evaluated, 1);
    assert_eq!(report.resets, 1);
    assert_eq!(report.failures.len(), 1);
    assert_eq!(report.failures[0].user, "kioma");
}

#[tokio::test]
async fn test_reminder_lifecycle() {
    let h = harness(Config::default(), "2024-06-11T15:00:00Z");
    h.store.write("kioma", &new_york("2024-06-11")).unwrap();

    let reminder = h
        .service
        .add_reminder(
            "kioma",
            NewReminder {
                task_index: 1,
                title: "Read".into(),
                body: None,
                time: utc("2024-06-11T16:00:00Z"),
                repeat_daily: false,
            },
        )
        .await
        .unwrap();
    assert_eq!(h.service.reminders("kioma").await.unwrap(), vec![reminder.clone()]);

    // Next wakeup is the upcoming notice, 30 minutes before.
    let wait = h.service.next_wakeup("kioma").await.unwrap().unwrap();
    assert_eq!(wait, Duration::from_secs(30 * 60));

    h.clock.set(utc("2024-06-11T15:31:00Z"));
    h.service.evaluate("kioma").await.unwrap();
    assert_eq!(h.dispatcher.count(EventKind::ReminderDue), 1);

    h.clock.set(utc("2024-06-11T16:01:00Z"));
    h.service.evaluate("kioma").await.unwrap();
    h.service.evaluate("kioma").await.unwrap();
    assert_eq!(h.dispatcher.count(EventKind::ReminderDue), 2);

    h.service.remove_reminder("kioma", reminder.id).await.unwrap();
    assert!(h.service.reminders("kioma").await.unwrap().is_empty());
    let err = h.service.remove_reminder("kioma", reminder.id).await.unwrap_err();
    assert!(matches!(err, CoreError::InvalidRequest(_)));
}

#[tokio::test]
async fn test_disabled_notifications_are_not_dispatched() {
    let mut config = Config::default();
    config.notifications.enabled = false;
    let h = harness(config, "2024-06-11T05:00:00Z");
    h.store.write("kioma", &new_york("2024-06-10")).unwrap();

    let transition = h.service.evaluate("kioma").await.unwrap();
    assert_eq!(transition.events.len(), 1);
    assert!(h.dispatcher.notifications().is_empty());
}
