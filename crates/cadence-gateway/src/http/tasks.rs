//! Task endpoints: catalog listing, scheduling and status lookups.

use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use cadence_scheduler::{
    time::{parse_user_timestamp, to_iso},
    Job, SchedulerError,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info, warn};

use crate::app::AppState;

type ApiError = (StatusCode, Json<Value>);

fn bad_request(msg: &str) -> ApiError {
    (StatusCode::BAD_REQUEST, Json(json!({ "error": msg })))
}

/// GET /list_tasks: task names available on this host, by category.
pub async fn list_tasks(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(json!({ "available_tasks": state.catalog.tasks_for(state.os) }))
}

/// Listing shape of a stored job.
#[derive(Debug, Serialize)]
struct JobView {
    job_id: String,
    task: String,
    command: String,
    status: String,
    scheduled_time: String,
    is_recurring: bool,
    last_run: Option<String>,
    next_time: Option<String>,
    created_at: String,
}

impl From<&Job> for JobView {
    fn from(job: &Job) -> Self {
        Self {
            job_id: job.job_id.clone(),
            task: job.task_name.clone(),
            command: job.command.clone(),
            status: job.status.to_string(),
            scheduled_time: to_iso(job.scheduled_time()),
            is_recurring: job.is_recurring(),
            last_run: job.last_run.map(to_iso),
            next_time: job.next_run.map(to_iso),
            created_at: to_iso(job.created_at),
        }
    }
}

/// GET /tasks: every job ever scheduled, oldest first.
pub async fn scheduled_tasks(State(state): State<Arc<AppState>>) -> Result<Json<Value>, ApiError> {
    let jobs = state.engine.list_jobs().map_err(|e| {
        error!(error = %e, "listing jobs failed");
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(json!({ "error": "failed to list tasks" })),
        )
    })?;
    let views: Vec<JobView> = jobs.iter().map(JobView::from).collect();
    Ok(Json(json!({ "tasks": views })))
}

/// GET /task_status/{job_id}
///
/// Unknown ids are not an error: they come back as `"unknown"`.
pub async fn task_status(
    State(state): State<Arc<AppState>>,
    Path(job_id): Path<String>,
) -> Json<Value> {
    let report = state.engine.status(&job_id);
    Json(json!({
        "job_id": report.job_id,
        "status": report.status_label(),
        "next_time": report.next_run.map(to_iso),
    }))
}

#[derive(Debug, Default, Deserialize)]
pub struct RunTaskRequest {
    #[serde(default)]
    pub task: Option<String>,
    /// ISO-8601; absent means now.
    #[serde(default)]
    pub scheduled_time: Option<String>,
    /// `none`, `hourly`, `daily` or `weekly`; absent means `none`.
    #[serde(default)]
    pub recurrence: Option<String>,
}

/// POST /run_task: schedule a catalog task once or on a recurrence.
pub async fn run_task(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RunTaskRequest>,
) -> Result<Json<Value>, ApiError> {
    let task = req
        .task
        .as_deref()
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| bad_request("No task provided"))?;

    let command = state.catalog.command_for(state.os, task).ok_or_else(|| {
        warn!(%task, os = %state.os, "task not in catalog");
        bad_request("Invalid or unsupported command for this OS")
    })?;

    let start = match req.scheduled_time.as_deref().filter(|s| !s.trim().is_empty()) {
        Some(raw) => parse_user_timestamp(raw).map_err(|_| bad_request("Invalid datetime format"))?,
        None => Utc::now(),
    };

    let recurrence = req.recurrence.unwrap_or_else(|| "none".to_string());
    let job_id = state
        .engine
        .schedule(task, command, start, &recurrence)
        .map_err(|e| match e {
            SchedulerError::InvalidSchedule(msg) => bad_request(&msg),
            other => {
                error!(%task, error = %other, "scheduling failed");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    Json(json!({ "error": "failed to schedule task" })),
                )
            }
        })?;

    info!(%job_id, %task, %recurrence, "task scheduled via HTTP");
    Ok(Json(json!({
        "message": "Task scheduled successfully.",
        "job_id": job_id,
        "recurrence": recurrence,
    })))
}
