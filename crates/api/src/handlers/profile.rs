//! Profile and leaderboard endpoints.

use axum::extract::rejection::JsonRejection;
use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::Json;
use habitquest_core::error::CoreError;
use habitquest_core::models::UserProfile;
use habitquest_core::reward::{self, LevelProgress};
use habitquest_core::types::RecordId;
use serde::{Deserialize, Serialize};

use crate::error::{AppError, AppResult};
use crate::middleware::auth::AuthUser;
use crate::response::DataResponse;
use crate::state::AppState;

/// Number of entries returned by `GET /leaderboard`.
pub const LEADERBOARD_SIZE: i64 = 50;

const MAX_NAME_LEN: usize = 64;

#[derive(Debug, Deserialize)]
pub struct CreateProfile {
    pub name: String,
}

/// A profile together with where its XP sits on the level curve.
#[derive(Debug, Serialize)]
pub struct ProfileView {
    #[serde(flatten)]
    pub profile: UserProfile,
    pub progress: LevelProgress,
}

impl From<UserProfile> for ProfileView {
    fn from(profile: UserProfile) -> Self {
        let progress = reward::level_progress(profile.xp);
        Self { profile, progress }
    }
}

#[derive(Debug, Serialize)]
pub struct LeaderboardEntry {
    pub rank: usize,
    pub id: RecordId,
    pub name: String,
    pub level: i32,
    pub weekly_coins: i64,
}

// ---------------------------------------------------------------------------
// POST /profile
// ---------------------------------------------------------------------------

/// Create the caller's profile. Repeating the call returns the existing one
/// unchanged with `200` instead of `201`.
pub async fn create_profile(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Result<Json<CreateProfile>, JsonRejection>,
) -> AppResult<impl IntoResponse> {
    let Json(input) = payload?;
    let name = input.name.trim();
    if name.is_empty() || name.chars().count() > MAX_NAME_LEN {
        return Err(AppError::Core(CoreError::InvalidInput(format!(
            "name must be 1-{MAX_NAME_LEN} characters"
        ))));
    }

    let profile = UserProfile::new(auth.user_id, name, state.clock.now());
    let created = state.store.insert_profile(&profile).await?;
    let status = if created {
        tracing::info!(user_id = %auth.user_id, "Profile created");
        StatusCode::CREATED
    } else {
        StatusCode::OK
    };

    let stored = load_profile(&state, auth.user_id).await?;
    Ok((status, Json(DataResponse { data: ProfileView::from(stored) })))
}

// ---------------------------------------------------------------------------
// GET /profile
// ---------------------------------------------------------------------------

pub async fn get_profile(
    State(state): State<AppState>,
    auth: AuthUser,
) -> AppResult<Json<DataResponse<ProfileView>>> {
    let profile = load_profile(&state, auth.user_id).await?;
    Ok(Json(DataResponse {
        data: profile.into(),
    }))
}

// ---------------------------------------------------------------------------
// GET /leaderboard
// ---------------------------------------------------------------------------

/// Top profiles by coins earned this week.
pub async fn leaderboard(
    State(state): State<AppState>,
    _auth: AuthUser,
) -> AppResult<Json<DataResponse<Vec<LeaderboardEntry>>>> {
    let entries = state
        .store
        .leaderboard(LEADERBOARD_SIZE)
        .await?
        .into_iter()
        .enumerate()
        .map(|(i, p)| LeaderboardEntry {
            rank: i + 1,
            id: p.id,
            name: p.name,
            level: p.level,
            weekly_coins: p.weekly_coins,
        })
        .collect();

    Ok(Json(DataResponse { data: entries }))
}

async fn load_profile(state: &AppState, user_id: RecordId) -> AppResult<UserProfile> {
    state.store.get_profile(user_id).await?.ok_or_else(|| {
        AppError::Core(CoreError::NotFound {
            entity: "UserProfile",
            id: user_id,
        })
    })
}
