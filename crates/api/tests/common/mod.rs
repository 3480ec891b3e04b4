#![allow(dead_code)]

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Method, Request};
use axum::response::Response;
use axum::Router;
use chrono::{TimeZone, Utc};
use http_body_util::BodyExt;
use tower::ServiceExt;
use uuid::Uuid;

use habitquest_api::auth::jwt::{generate_access_token, JwtConfig};
use habitquest_api::config::{ServerConfig, StoreBackend};
use habitquest_api::router::build_app_router;
use habitquest_api::state::AppState;
use habitquest_core::clock::ManualClock;
use habitquest_core::models::{Category, Event, UserProfile};
use habitquest_core::store::{MemoryRewardStore, RewardStore};
use habitquest_core::types::{RecordId, Timestamp};

/// Build a test `ServerConfig` with safe defaults.
pub fn test_config() -> ServerConfig {
    ServerConfig {
        host: "127.0.0.1".to_string(),
        port: 0,
        cors_origins: vec!["http://localhost:5173".to_string()],
        request_timeout_secs: 30,
        store_backend: StoreBackend::Memory,
        jwt: JwtConfig {
            secret: "integration-test-secret-long-enough".to_string(),
            access_token_expiry_mins: 15,
        },
    }
}

/// Midday on a fixed UTC date; the manual clock starts here.
pub fn noon() -> Timestamp {
    Utc.with_ymd_and_hms(2025, 4, 2, 12, 0, 0).unwrap()
}

/// The full router over an in-memory store, plus handles for arranging
/// state and moving time.
pub struct TestApp {
    pub router: Router,
    pub store: MemoryRewardStore,
    pub clock: Arc<ManualClock>,
    pub config: ServerConfig,
}

pub fn build_test_app() -> TestApp {
    let config = test_config();
    let store = MemoryRewardStore::new();
    let clock = Arc::new(ManualClock::new(noon()));

    let state = AppState {
        store: Arc::new(store.clone()),
        clock: clock.clone(),
        config: Arc::new(config.clone()),
    };

    TestApp {
        router: build_app_router(state, &config),
        store,
        clock,
        config,
    }
}

impl TestApp {
    pub fn token_for(&self, user_id: RecordId) -> String {
        generate_access_token(user_id, &self.config.jwt).unwrap()
    }

    /// Insert a fresh profile and return its id and a bearer token for it.
    pub async fn seed_user(&self, name: &str) -> (RecordId, String) {
        let id = Uuid::new_v4();
        self.store
            .insert_profile(&UserProfile::new(id, name, noon()))
            .await
            .unwrap();
        (id, self.token_for(id))
    }

    /// Insert an event worth 10 XP / 2 coins base over 30 minutes.
    pub async fn seed_event(&self, owner_id: RecordId) -> Event {
        let event = Event {
            id: Uuid::new_v4(),
            owner_id,
            task_id: None,
            title: "Read a chapter".into(),
            description: String::new(),
            scheduled_at: noon(),
            length_seconds: 1800,
            category: Category::Learning,
            energy: 2,
            base_xp: 10,
            base_coins: 2,
            settled_fraction: None,
            created_at: noon(),
        };
        self.store.insert_event(&event).await.unwrap();
        event
    }

    pub async fn get(&self, uri: &str, token: Option<&str>) -> Response {
        self.send(Method::GET, uri, token, Body::empty(), false).await
    }

    pub async fn post_json(
        &self,
        uri: &str,
        token: Option<&str>,
        body: serde_json::Value,
    ) -> Response {
        self.send(Method::POST, uri, token, Body::from(body.to_string()), true)
            .await
    }

    /// POST with no body and no content type.
    pub async fn post_empty(&self, uri: &str, token: Option<&str>) -> Response {
        self.send(Method::POST, uri, token, Body::empty(), false).await
    }

    /// POST a raw, possibly malformed, JSON body.
    pub async fn post_raw(&self, uri: &str, token: Option<&str>, body: &'static str) -> Response {
        self.send(Method::POST, uri, token, Body::from(body), true)
            .await
    }

    async fn send(
        &self,
        method: Method,
        uri: &str,
        token: Option<&str>,
        body: Body,
        json: bool,
    ) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);
        if json {
            builder = builder.header("content-type", "application/json");
        }
        if let Some(token) = token {
            builder = builder.header("authorization", format!("Bearer {token}"));
        }
        self.router
            .clone()
            .oneshot(builder.body(body).unwrap())
            .await
            .unwrap()
    }
}

/// Collect a response body and parse it as JSON.
pub async fn body_json(response: Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}
