//! `POST /complete-event`: the single entry point that writes reward state.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::Json;
use habitquest_core::error::CoreError;
use habitquest_core::settlement::{self, SettlementOutcome, SettlementRequest};
use habitquest_core::types::RecordId;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::handlers::parse_id;
use crate::middleware::auth::AuthUser;
use crate::state::AppState;

/// Request body. Fields are optional here so a missing field is reported as
/// `INVALID_INPUT` rather than a generic deserialization failure.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteEventBody {
    pub event_id: Option<String>,
    pub completion_percentage: Option<f64>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CompleteEventResponse {
    pub ok: bool,
    pub completed_event_id: RecordId,
    pub rewards: Rewards,
    pub user: UserTotals,
}

#[derive(Debug, Serialize)]
pub struct Rewards {
    pub xp: i64,
    pub coins: i64,
}

#[derive(Debug, Serialize)]
pub struct UserTotals {
    pub xp: i64,
    pub level: i32,
    pub coins: i64,
    pub weekly_coins: i64,
}

impl From<SettlementOutcome> for CompleteEventResponse {
    fn from(outcome: SettlementOutcome) -> Self {
        Self {
            ok: true,
            completed_event_id: outcome.ledger_id,
            rewards: Rewards {
                xp: outcome.granted_xp,
                coins: outcome.coins,
            },
            user: UserTotals {
                xp: outcome.new_xp_total,
                level: outcome.new_level,
                coins: outcome.new_coins,
                weekly_coins: outcome.new_weekly_coins,
            },
        }
    }
}

impl CompleteEventBody {
    fn into_request(self) -> Result<SettlementRequest, AppError> {
        let event_id = self
            .event_id
            .ok_or_else(|| CoreError::InvalidInput("eventId is required".into()))?;
        let completion_fraction = self
            .completion_percentage
            .ok_or_else(|| CoreError::InvalidInput("completionPercentage is required".into()))?;
        Ok(SettlementRequest {
            event_id: parse_id("eventId", &event_id)?,
            completion_fraction,
        })
    }
}

/// Settle one completion for the authenticated caller.
pub async fn complete_event(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Result<Json<CompleteEventBody>, JsonRejection>,
) -> AppResult<Json<CompleteEventResponse>> {
    let Json(body) = payload?;
    let request = body.into_request()?;

    let outcome = settlement::settle(
        state.store.as_ref(),
        state.clock.as_ref(),
        auth.user_id,
        request,
    )
    .await
    .inspect_err(|err| {
        tracing::info!(
            user_id = %auth.user_id,
            event_id = %request.event_id,
            error = %err,
            "Settlement rejected"
        );
    })?;

    tracing::info!(
        user_id = %auth.user_id,
        event_id = %request.event_id,
        completion = request.completion_fraction,
        granted_xp = outcome.granted_xp,
        coins = outcome.coins,
        level = outcome.new_level,
        retired = outcome.event_retired,
        "Event settled"
    );

    Ok(Json(outcome.into()))
}
