//! HTTP handler tests.
//!
//! Requests are driven straight through the router with `oneshot`, on top
//! of an in-memory store and a fixed clock.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use axum::Router;
use chrono::NaiveDate;
use serde_json::{json, Value};
use taskstreak_core::{Config, FixedClock, MemoryStore, RecordingDispatcher, StreakService, TaskStore, UserRecord};
use tower::ServiceExt;

struct TestApp {
    router: Router,
    store: Arc<MemoryStore>,
}

fn app(now: &str) -> TestApp {
    let store = Arc::new(MemoryStore::new());
    let service = Arc::new(StreakService::new(
        store.clone(),
        Arc::new(RecordingDispatcher::new()),
        Arc::new(FixedClock::at(now).unwrap()),
        &Config::default(),
    ));
    TestApp {
        router: taskstreak_server::router(service),
        store,
    }
}

fn date(s: &str) -> NaiveDate {
    NaiveDate::parse_from_str(s, "%Y-%m-%d").unwrap()
}

fn new_york(last_reset: &str) -> UserRecord {
    let mut record = UserRecord::new(["Stretch", "Read", "Water", "Walk", "Journal"]);
    record.timezone = Some(chrono_tz::America::New_York);
    record.last_reset = Some(date(last_reset));
    record
}

async fn send(app: &TestApp, method: &str, uri: &str, body: Option<&str>) -> (StatusCode, Value) {
    let builder = Request::builder().method(method).uri(uri);
    let request = match body {
        Some(json) => builder
            .header("content-type", "application/json")
            .body(Body::from(json.to_string()))
            .unwrap(),
        None => builder.body(Body::empty()).unwrap(),
    };
    let response = app.router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
    let value = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, value)
}

fn all_tasks(completed: bool) -> String {
    let tasks: Vec<Value> = ["Stretch", "Read", "Water", "Walk", "Journal"]
        .iter()
        .map(|t| json!({ "text": t, "completed": completed }))
        .collect();
    json!({ "tasks": tasks }).to_string()
}

#[tokio::test]
async fn test_health() {
    let app = app("2024-06-11T15:00:00Z");
    let (status, body) = send(&app, "GET", "/health", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "ok");
}

#[tokio::test]
async fn test_unknown_user_is_404() {
    let app = app("2024-06-11T15:00:00Z");
    let (status, body) = send(&app, "GET", "/users/mallory", None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("mallory"));
}

#[tokio::test]
async fn test_get_evaluates_reset_first() {
    let app = app("2024-06-11T05:00:00Z");
    let mut record = new_york("2024-06-10");
    record.last_completed = Some(date("2024-06-10"));
    record.streak = 6;
    for task in &mut record.tasks {
        task.completed = true;
    }
    app.store.write("kioma", &record).unwrap();

    let (status, body) = send(&app, "GET", "/users/kioma", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["streak"], 6);
    assert_eq!(body["lastReset"], "2024-06-11");
    assert_eq!(body["lastCompleted"], "2024-06-10");
    assert_eq!(body["timezone"], "America/New_York");
    assert!(body["tasks"].as_array().unwrap().iter().all(|t| t["completed"] == false));
    assert!(body.get("reminders").is_none());
}

#[tokio::test]
async fn test_post_tasks_records_completion() {
    let app = app("2024-06-11T15:00:00Z");
    app.store.write("kioma", &new_york("2024-06-11")).unwrap();

    let (status, body) = send(&app, "POST", "/users/kioma/tasks", Some(&all_tasks(true))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["data"]["streak"], 1);
    assert_eq!(body["data"]["lastCompleted"], "2024-06-11");

    // Posting the same completed list again the same day is a no-op.
    let (_, body) = send(&app, "POST", "/users/kioma/tasks", Some(&all_tasks(true))).await;
    assert_eq!(body["data"]["streak"], 1);
}

#[tokio::test]
async fn test_client_completion_flag_is_ignored() {
    let app = app("2024-06-11T15:00:00Z");
    app.store.write("kioma", &new_york("2024-06-11")).unwrap();

    let mut body: Value = serde_json::from_str(&all_tasks(false)).unwrap();
    body["allCompleted"] = json!(true);
    let (status, body) = send(&app, "POST", "/users/kioma/tasks", Some(&body.to_string())).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["streak"], 0);
}

#[tokio::test]
async fn test_post_tasks_rejects_bad_bodies() {
    let app = app("2024-06-11T15:00:00Z");
    app.store.write("kioma", &new_york("2024-06-11")).unwrap();

    let (status, _) = send(&app, "POST", "/users/kioma/tasks", Some("{not json")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "POST", "/users/kioma/tasks", Some(r#"{"items": []}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let one = json!({ "tasks": [{ "text": "Stretch", "completed": true }] }).to_string();
    let (status, body) = send(&app, "POST", "/users/kioma/tasks", Some(&one)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("expected 5 tasks"));
}

#[tokio::test]
async fn test_toggle_single_task() {
    let app = app("2024-06-11T15:00:00Z");
    app.store.write("kioma", &new_york("2024-06-11")).unwrap();

    let (status, body) = send(&app, "POST", "/users/kioma/tasks/2", Some(r#"{"completed": true}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["tasks"][2]["completed"], true);

    let (status, _) = send(&app, "POST", "/users/kioma/tasks/7", Some(r#"{"completed": true}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "POST", "/users/kioma/tasks/two", Some(r#"{"completed": true}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_set_timezone() {
    let app = app("2024-06-11T15:00:00Z");

    let (status, body) = send(&app, "POST", "/users/takitsu/timezone", Some(r#"{"timezone": "Nowhere/Special"}"#)).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(body["error"].as_str().unwrap().contains("Nowhere/Special"));

    let (status, _) = send(&app, "POST", "/users/takitsu/timezone", Some("{}")).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(&app, "POST", "/users/takitsu/timezone", Some(r#"{"timezone": "Europe/Paris"}"#)).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["success"], true);
    assert_eq!(body["timezone"], "Europe/Paris");
    assert_eq!(body["lastReset"], "2024-06-11");
}

#[tokio::test]
async fn test_reminders_roundtrip() {
    let app = app("2024-06-11T15:00:00Z");
    app.store.write("kioma", &new_york("2024-06-11")).unwrap();

    let request = json!({
        "taskIndex": 0,
        "title": "Stretch",
        "time": "2024-06-11T22:00:00Z",
        "repeatDaily": true,
    })
    .to_string();
    let (status, body) = send(&app, "POST", "/users/kioma/reminders", Some(&request)).await;
    assert_eq!(status, StatusCode::CREATED);
    let id = body["data"]["id"].as_str().unwrap().to_string();

    let (_, body) = send(&app, "GET", "/users/kioma/reminders", None).await;
    assert_eq!(body["data"].as_array().unwrap().len(), 1);
    assert_eq!(body["data"][0]["repeatDaily"], true);

    let uri = format!("/users/kioma/reminders/{id}");
    let (status, _) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    let (status, _) = send(&app, "DELETE", &uri, None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, "DELETE", "/users/kioma/reminders/not-a-uuid", None).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_storage_outage_is_503() {
    let app = app("2024-06-11T15:00:00Z");
    app.store.write("kioma", &new_york("2024-06-11")).unwrap();
    app.store.set_unavailable(true);

    let (status, body) = send(&app, "GET", "/users/kioma", None).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());
}

#[tokio::test]
async fn test_read_only_storage_still_serves_reset_record() {
    // 01:00 EDT, the day after the last reset.
    let app = app("2024-06-11T05:00:00Z");
    let mut record = new_york("2024-06-10");
    record.streak = 7;
    record.last_completed = Some(date("2024-06-09"));
    app.store.write("kioma", &record).unwrap();
    app.store.set_writes_failing(true);

    let (status, body) = send(&app, "GET", "/users/kioma", None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["streak"], 0);
    assert_eq!(body["lastReset"], "2024-06-11");

    let (status, body) = send(&app, "POST", "/users/kioma/tasks/0", Some(r#"{"completed": true}"#)).await;
    assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    assert!(body["error"].is_string());
    assert_eq!(app.store.read("kioma").unwrap().last_reset, Some(date("2024-06-10")));
}

#[tokio::test]
async fn test_corrupt_record_is_500() {
    let app = app("2024-06-11T15:00:00Z");
    app.store.insert_raw("kioma", r#"{"streak": 3}"#);

    let (status, _) = send(&app, "GET", "/users/kioma", None).await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
}
