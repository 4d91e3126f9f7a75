//! HTTP admin API.
//!
//! A thin axum surface over [`Admin`]: task submission and status, schedule
//! CRUD, and an optional debug stats route. Everything it does goes through
//! the enumerated facade operations; no queue logic lives here.

use std::net::SocketAddr;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio_util::sync::CancellationToken;
use tower_http::trace::TraceLayer;
use tracing::info;

use crate::admin::{Admin, NewSchedule};
use crate::errors::Error;
use crate::queue::NewTask;
use crate::schema::{Schedule, Task, TaskState};

/// Builds the admin API router.
///
/// `debug` additionally mounts `/debug/stats` with per-state task counts.
pub fn router(admin: Admin, debug: bool) -> Router {
    let mut router = Router::new()
        .route("/health", get(health))
        .route("/api/tasks", get(list_tasks).post(submit_task))
        .route("/api/tasks/{id}", get(get_task))
        .route("/api/tasks/{id}/cancel", axum::routing::post(cancel_task))
        .route("/api/schedules", get(list_schedules).post(create_schedule))
        .route(
            "/api/schedules/{id}",
            get(get_schedule).put(update_schedule).delete(delete_schedule),
        );

    if debug {
        router = router.route("/debug/stats", get(debug_stats));
    }

    router
        .layer(TraceLayer::new_for_http())
        .with_state(admin)
}

/// Binds `addr` and serves the admin API until `shutdown` is cancelled.
pub async fn serve(
    addr: SocketAddr,
    admin: Admin,
    debug: bool,
    shutdown: CancellationToken,
) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(%addr, "Admin API listening");

    axum::serve(listener, router(admin, debug))
        .with_graceful_shutdown(shutdown.cancelled_owned())
        .await
}

struct ApiError(Error);

impl From<Error> for ApiError {
    fn from(error: Error) -> Self {
        Self(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            Error::Validation(_) | Error::InvalidCron { .. } => StatusCode::BAD_REQUEST,
            Error::NotFound(_) => StatusCode::NOT_FOUND,
            Error::Store(_) | Error::Migrate(_) => StatusCode::INTERNAL_SERVER_ERROR,
        };

        (status, Json(json!({ "error": self.0.to_string() }))).into_response()
    }
}

async fn health() -> &'static str {
    "ok"
}

#[derive(Debug, Deserialize)]
struct SubmitTaskRequest {
    #[serde(rename = "type")]
    task_type: String,
    #[serde(default)]
    payload: serde_json::Value,
    priority: Option<i64>,
    max_attempts: Option<i64>,
    idempotency_key: Option<String>,
}

#[derive(Debug, Serialize)]
struct SubmitTaskResponse {
    id: String,
}

async fn submit_task(
    State(admin): State<Admin>,
    Json(req): Json<SubmitTaskRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = admin
        .submit_task(NewTask {
            task_type: req.task_type,
            payload: payload_bytes(&req.payload)?,
            priority: req.priority,
            max_attempts: req.max_attempts,
            visibility_timeout: None,
            idempotency_key: req.idempotency_key,
        })
        .await?;

    Ok((StatusCode::ACCEPTED, Json(SubmitTaskResponse { id })))
}

#[derive(Debug, Serialize)]
struct TaskStatusResponse {
    id: String,
    #[serde(rename = "type")]
    task_type: String,
    state: TaskState,
    attempts: i64,
    max_attempts: i64,
    priority: i64,
    next_run_at: DateTime<Utc>,
}

impl From<Task> for TaskStatusResponse {
    fn from(task: Task) -> Self {
        Self {
            id: task.id,
            task_type: task.task_type,
            state: task.state,
            attempts: task.attempts,
            max_attempts: task.max_attempts,
            priority: task.priority,
            next_run_at: task.next_run_at,
        }
    }
}

async fn get_task(
    State(admin): State<Admin>,
    Path(id): Path<String>,
) -> Result<Json<TaskStatusResponse>, ApiError> {
    Ok(Json(admin.get_task(&id).await?.into()))
}

#[derive(Debug, Deserialize)]
struct ListQuery {
    limit: Option<i64>,
}

async fn list_tasks(
    State(admin): State<Admin>,
    Query(query): Query<ListQuery>,
) -> Result<Json<Vec<TaskStatusResponse>>, ApiError> {
    let tasks = admin.list_recent_tasks(query.limit.unwrap_or(50)).await?;
    Ok(Json(tasks.into_iter().map(Into::into).collect()))
}

async fn cancel_task(
    State(admin): State<Admin>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    admin.cancel_task(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

#[derive(Debug, Deserialize)]
struct ScheduleRequest {
    name: String,
    cron_expr: String,
    task_type: String,
    #[serde(default)]
    payload: serde_json::Value,
    priority: Option<i64>,
    max_attempts: Option<i64>,
    #[serde(default = "default_enabled")]
    enabled: bool,
}

fn default_enabled() -> bool {
    true
}

impl ScheduleRequest {
    fn into_draft(self) -> Result<NewSchedule, ApiError> {
        Ok(NewSchedule {
            name: self.name,
            cron_expr: self.cron_expr,
            task_type: self.task_type,
            payload: payload_bytes(&self.payload)?,
            priority: self.priority,
            max_attempts: self.max_attempts,
            enabled: self.enabled,
        })
    }
}

#[derive(Debug, Serialize)]
struct ScheduleResponse {
    id: String,
    name: String,
    cron_expr: String,
    task_type: String,
    priority: i64,
    max_attempts: i64,
    enabled: bool,
    last_run: Option<DateTime<Utc>>,
    next_run: DateTime<Utc>,
}

impl From<Schedule> for ScheduleResponse {
    fn from(schedule: Schedule) -> Self {
        Self {
            id: schedule.id,
            name: schedule.name,
            cron_expr: schedule.cron_expr,
            task_type: schedule.task_type,
            priority: schedule.priority,
            max_attempts: schedule.max_attempts,
            enabled: schedule.enabled,
            last_run: schedule.last_run,
            next_run: schedule.next_run,
        }
    }
}

async fn create_schedule(
    State(admin): State<Admin>,
    Json(req): Json<ScheduleRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let id = admin.create_schedule(req.into_draft()?).await?;
    Ok((StatusCode::CREATED, Json(json!({ "id": id }))))
}

async fn get_schedule(
    State(admin): State<Admin>,
    Path(id): Path<String>,
) -> Result<Json<ScheduleResponse>, ApiError> {
    Ok(Json(admin.get_schedule(&id).await?.into()))
}

async fn list_schedules(
    State(admin): State<Admin>,
) -> Result<Json<Vec<ScheduleResponse>>, ApiError> {
    let schedules = admin.list_schedules().await?;
    Ok(Json(schedules.into_iter().map(Into::into).collect()))
}

async fn update_schedule(
    State(admin): State<Admin>,
    Path(id): Path<String>,
    Json(req): Json<ScheduleRequest>,
) -> Result<StatusCode, ApiError> {
    admin.update_schedule(&id, req.into_draft()?).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn delete_schedule(
    State(admin): State<Admin>,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    admin.delete_schedule(&id).await?;
    Ok(StatusCode::NO_CONTENT)
}

async fn debug_stats(
    State(admin): State<Admin>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let counts = admin.task_stats().await?;
    let map: serde_json::Map<String, serde_json::Value> = counts
        .into_iter()
        .map(|(state, count)| (state, json!(count)))
        .collect();
    Ok(Json(serde_json::Value::Object(map)))
}

/// Tasks carry opaque bytes; the JSON API transports them as an arbitrary
/// JSON value, serialized verbatim. Absent payloads become empty bytes.
fn payload_bytes(value: &serde_json::Value) -> Result<Vec<u8>, ApiError> {
    if value.is_null() {
        return Ok(Vec::new());
    }

    serde_json::to_vec(value)
        .map_err(|e| ApiError(Error::Validation(format!("unencodable payload: {e}"))))
}
