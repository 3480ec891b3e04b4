use std::sync::Arc;

use habitquest_core::clock::Clock;
use habitquest_core::store::RewardStore;

use crate::config::ServerConfig;

/// Shared application state available to all Axum handlers via `State<AppState>`.
///
/// Cheap to clone; everything sits behind an `Arc`.
#[derive(Clone)]
pub struct AppState {
    /// Row store for profiles, tasks, events and the ledger.
    pub store: Arc<dyn RewardStore>,
    /// Source of "now" for settlement and the "today" window.
    pub clock: Arc<dyn Clock>,
    pub config: Arc<ServerConfig>,
}
