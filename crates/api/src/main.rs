use std::net::SocketAddr;
use std::sync::Arc;

use habitquest_core::clock::SystemClock;
use habitquest_core::store::{MemoryRewardStore, RewardStore};
use habitquest_db::PgRewardStore;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use habitquest_api::config::{ServerConfig, StoreBackend};
use habitquest_api::router::build_app_router;
use habitquest_api::state::AppState;

#[tokio::main]
async fn main() {
    dotenvy::dotenv().ok();

    // --- Tracing ---
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "habitquest_api=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    // --- Configuration ---
    let config = ServerConfig::from_env();
    tracing::info!(
        host = %config.host,
        port = %config.port,
        store = ?config.store_backend,
        "Loaded server configuration"
    );

    // --- Store ---
    let store: Arc<dyn RewardStore> = match config.store_backend {
        StoreBackend::Postgres => Arc::new(connect_postgres().await),
        StoreBackend::Memory => {
            tracing::warn!("Using the in-memory store; all data is lost on shutdown");
            Arc::new(MemoryRewardStore::new())
        }
    };

    // --- App state ---
    let state = AppState {
        store,
        clock: Arc::new(SystemClock),
        config: Arc::new(config.clone()),
    };

    let app = build_app_router(state, &config);

    // --- Start server ---
    let addr = SocketAddr::new(
        config.host.parse().expect("Invalid HOST address"),
        config.port,
    );
    tracing::info!(%addr, "Starting server");

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .expect("Failed to bind to address");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .expect("Server error");

    tracing::info!("Graceful shutdown complete");
}

/// Connect, verify and migrate the Postgres store. Any failure aborts startup.
async fn connect_postgres() -> PgRewardStore {
    let database_url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set");

    let pool = habitquest_db::create_pool(&database_url)
        .await
        .expect("Failed to connect to database");
    tracing::info!("Database connection pool created");

    habitquest_db::health_check(&pool)
        .await
        .expect("Database health check failed");
    tracing::info!("Database health check passed");

    habitquest_db::run_migrations(&pool)
        .await
        .expect("Failed to run database migrations");
    tracing::info!("Database migrations applied");

    PgRewardStore::new(pool)
}

/// Wait for SIGINT or SIGTERM to initiate graceful shutdown.
async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("Failed to install Ctrl-C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("Failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {
            tracing::info!("Received SIGINT (Ctrl-C), starting graceful shutdown");
        }
        () = terminate => {
            tracing::info!("Received SIGTERM, starting graceful shutdown");
        }
    }
}
