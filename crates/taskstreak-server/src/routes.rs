use std::sync::Arc;

use axum::extract::rejection::{JsonRejection, PathRejection};
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::{json, Value};
use taskstreak_core::{NewReminder, StreakService, Task, UserRecord};
use uuid::Uuid;

use crate::error::ApiError;

type ApiResult<T> = Result<T, ApiError>;

#[derive(Clone)]
pub struct AppState {
    pub service: Arc<StreakService>,
}

/// Body of `POST /users/{id}/tasks`. Any client-side completion flag is
/// ignored; completion is derived from the tasks themselves.
#[derive(Debug, Deserialize)]
struct TasksBody {
    tasks: Vec<Task>,
}

#[derive(Debug, Deserialize)]
struct ToggleBody {
    completed: bool,
}

#[derive(Debug, Deserialize)]
struct TimezoneBody {
    timezone: String,
}

pub fn router(service: Arc<StreakService>) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/users/{id}", get(get_user))
        .route("/users/{id}/tasks", post(update_tasks))
        .route("/users/{id}/tasks/{index}", post(toggle_task))
        .route("/users/{id}/timezone", post(set_timezone))
        .route("/users/{id}/reminders", get(list_reminders).post(add_reminder))
        .route("/users/{id}/reminders/{reminder_id}", delete(remove_reminder))
        .with_state(AppState { service })
}

async fn health() -> Json<Value> {
    Json(json!({ "status": "ok" }))
}

async fn get_user(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<UserRecord>> {
    Ok(Json(state.service.get(&id).await?))
}

async fn update_tasks(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<TasksBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    let transition = state.service.update_tasks(&id, body.tasks).await?;
    Ok(Json(json!({ "success": true, "data": transition.record })))
}

async fn toggle_task(
    State(state): State<AppState>,
    path: Result<Path<(String, usize)>, PathRejection>,
    body: Result<Json<ToggleBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Path((id, index)) = path?;
    let Json(body) = body?;
    let transition = state.service.toggle_task(&id, index, body.completed).await?;
    Ok(Json(json!({ "success": true, "data": transition.record })))
}

async fn set_timezone(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<TimezoneBody>, JsonRejection>,
) -> ApiResult<Json<Value>> {
    let Json(body) = body?;
    let transition = state.service.set_timezone(&id, &body.timezone).await?;
    Ok(Json(json!({
        "success": true,
        "timezone": transition.record.timezone,
        "lastReset": transition.record.last_reset,
    })))
}

async fn list_reminders(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Json<Value>> {
    let reminders = state.service.reminders(&id).await?;
    Ok(Json(json!({ "data": reminders })))
}

async fn add_reminder(
    State(state): State<AppState>,
    Path(id): Path<String>,
    body: Result<Json<NewReminder>, JsonRejection>,
) -> ApiResult<(StatusCode, Json<Value>)> {
    let Json(body) = body?;
    let reminder = state.service.add_reminder(&id, body).await?;
    Ok((StatusCode::CREATED, Json(json!({ "success": true, "data": reminder }))))
}

async fn remove_reminder(
    State(state): State<AppState>,
    path: Result<Path<(String, Uuid)>, PathRejection>,
) -> ApiResult<StatusCode> {
    let Path((id, reminder_id)) = path?;
    state.service.remove_reminder(&id, reminder_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
