//! Read-only views over the caller's events and ledger.

use axum::extract::{Query, State};
use axum::Json;
use habitquest_core::error::CoreError;
use habitquest_core::models::{self, CompletedEvent, Event};
use serde::Deserialize;

use crate::error::AppResult;
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

const DEFAULT_LEDGER_LIMIT: i64 = 50;
const MAX_LEDGER_LIMIT: i64 = 200;

#[derive(Debug, Deserialize)]
pub struct EventListParams {
    /// `today` or `all` (default).
    pub scope: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct LedgerParams {
    pub limit: Option<i64>,
}

/// GET /events -- the caller's events; `scope=today` hides everything not
/// scheduled on the current UTC day.
pub async fn list_events(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<EventListParams>,
) -> AppResult<Json<DataResponse<Vec<Event>>>> {
    let window = match params.scope.as_deref() {
        None | Some("all") => None,
        Some("today") => Some(models::utc_day_bounds(state.clock.now())),
        Some(other) => {
            return Err(CoreError::InvalidInput(format!(
                "scope must be 'today' or 'all', got '{other}'"
            ))
            .into())
        }
    };

    let events = state
        .store
        .list_events_by_owner(auth.user_id, window)
        .await?;
    Ok(Json(DataResponse { data: events }))
}

/// GET /completed-events -- the caller's ledger, newest first.
pub async fn list_completed_events(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(params): Query<LedgerParams>,
) -> AppResult<Json<DataResponse<Vec<CompletedEvent>>>> {
    let limit = params
        .limit
        .unwrap_or(DEFAULT_LEDGER_LIMIT)
        .clamp(1, MAX_LEDGER_LIMIT);
    let entries = state
        .store
        .list_completed_by_owner(auth.user_id, limit)
        .await?;
    Ok(Json(DataResponse { data: entries }))
}
