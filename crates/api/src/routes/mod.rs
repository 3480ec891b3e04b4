pub mod health;

use axum::routing::{get, post};
use axum::Router;

use crate::handlers;
use crate::state::AppState;

/// Routes mounted under `/api/v1`.
///
/// ```text
/// POST   /complete-event
/// GET    /profile
/// POST   /profile
/// GET    /tasks
/// POST   /tasks
/// POST   /tasks/{id}/events
/// GET    /events                ?scope=today|all
/// GET    /completed-events      ?limit=
/// GET    /leaderboard
/// ```
pub fn api_routes() -> Router<AppState> {
    Router::new()
        .route("/complete-event", post(handlers::settlement::complete_event))
        .route(
            "/profile",
            get(handlers::profile::get_profile).post(handlers::profile::create_profile),
        )
        .route(
            "/tasks",
            get(handlers::tasks::list_tasks).post(handlers::tasks::create_task),
        )
        .route("/tasks/{id}/events", post(handlers::tasks::schedule_event))
        .route("/events", get(handlers::events::list_events))
        .route(
            "/completed-events",
            get(handlers::events::list_completed_events),
        )
        .route("/leaderboard", get(handlers::profile::leaderboard))
}
