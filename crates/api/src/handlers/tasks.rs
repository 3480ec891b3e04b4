//! Task creation and event scheduling.

use axum::extract::rejection::JsonRejection;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use habitquest_core::error::CoreError;
use habitquest_core::models::{CreateTask, Task};
use habitquest_core::types::Timestamp;
use serde::Deserialize;

use crate::error::{AppError, AppResult};
use crate::handlers::parse_id;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ScheduleEvent {
    /// Defaults to now.
    pub scheduled_at: Option<Timestamp>,
}

// ---------------------------------------------------------------------------
// POST /tasks
// ---------------------------------------------------------------------------

/// Validate and create a task owned by the caller.
pub async fn create_task(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Result<Json<CreateTask>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload?;
    let task = Task::create(auth.user_id, input, state.clock.now())?;
    state.store.insert_task(&task).await?;

    tracing::info!(
        user_id = %auth.user_id,
        task_id = %task.id,
        base_xp = task.base_xp,
        base_coins = task.base_coins,
        "Task created"
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: task })))
}

// ---------------------------------------------------------------------------
// GET /tasks
// ---------------------------------------------------------------------------

pub async fn list_tasks(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<DataResponse<Vec<Task>>>> {
    let tasks = state.store.list_tasks_by_owner(auth.user_id).await?;
    tracing::debug!(user_id = %auth.user_id, count = tasks.len(), "Listed tasks");
    Ok(Json(DataResponse { data: tasks }))
}

// ---------------------------------------------------------------------------
// POST /tasks/{id}/events
// ---------------------------------------------------------------------------

/// Schedule a completable event from one of the caller's tasks. An empty
/// body schedules it for now.
pub async fn schedule_event(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(raw_id): Path<String>,
    payload: Result<Json<ScheduleEvent>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let task_id = parse_id("task id", &raw_id)?;
    let input = match payload {
        Ok(Json(input)) => input,
        Err(JsonRejection::MissingJsonContentType(_)) => ScheduleEvent::default(),
        Err(rejection) => return Err(rejection.into()),
    };

    let task = state.store.get_task(task_id).await?.ok_or(CoreError::NotFound {
        entity: "Task",
        id: task_id,
    })?;
    if task.owner_id != auth.user_id {
        return Err(AppError::Core(CoreError::Forbidden(
            "Not allowed to schedule this task".into(),
        )));
    }

    let now = state.clock.now();
    let event = task.schedule(input.scheduled_at.unwrap_or(now), now);
    state.store.insert_event(&event).await?;

    tracing::info!(
        user_id = %auth.user_id,
        task_id = %task.id,
        event_id = %event.id,
        scheduled_at = %event.scheduled_at,
        "Event scheduled"
    );

    Ok((StatusCode::CREATED, Json(DataResponse { data: event })))
}
