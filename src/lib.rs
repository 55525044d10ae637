pub mod config;
pub mod database;
pub mod dto;
pub mod error;
pub mod middleware;
pub mod models;
pub mod routes;
pub mod services;
pub mod session;
pub mod store;
pub mod utils;

use std::sync::Arc;

use axum::{
    routing::{get, post},
    Router,
};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;

use crate::middleware::{auth::require_user_id, cors::attempt_cors, rate_limit};
use crate::services::{
    attempt_service::AttemptService, event_bus::EventBus, test_service::TestService,
};
use crate::store::{AttemptStore, MemoryAttemptStore};

#[derive(Clone)]
pub struct AppState {
    pub store_kind: &'static str,
    pub test_service: TestService,
    pub attempt_service: AttemptService,
    pub events: EventBus,
}

impl AppState {
    pub fn new(store: Arc<dyn AttemptStore>, store_kind: &'static str) -> Self {
        let events = EventBus::default();
        let test_service = TestService::new(store.clone());
        let attempt_service = AttemptService::new(store, test_service.clone(), events.clone());

        Self {
            store_kind,
            test_service,
            attempt_service,
            events,
        }
    }

    /// State backed by the in-memory store and the bundled sample tests.
    pub fn in_memory_demo() -> Self {
        Self::new(Arc::new(MemoryAttemptStore::with_demo_catalogue()), "memory")
    }
}

pub fn build_router(state: AppState, public_rps: u32) -> Router {
    let attempt_api = Router::new()
        .route(
            "/api/tests/start/:test_id",
            post(routes::test_routes::start_test),
        )
        .route("/api/tests/submit", post(routes::test_routes::submit_test))
        .route(
            "/api/tests/completed",
            get(routes::test_routes::list_completed),
        )
        .layer(axum::middleware::from_fn(require_user_id));

    let public_api = Router::new()
        .route(
            "/api/tests/available",
            get(routes::test_routes::list_available),
        )
        .route(
            "/api/tests/:test_id/questions",
            get(routes::test_routes::get_test_questions),
        )
        .route(
            "/api/placement/stream",
            get(routes::placement::placement_stream),
        )
        .merge(attempt_api)
        .layer(axum::middleware::from_fn_with_state(
            rate_limit::new_rps_state(public_rps),
            rate_limit::rps_middleware,
        ));

    Router::new()
        .route("/health", get(routes::health::health))
        .merge(public_api)
        .with_state(state)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(attempt_cors()),
        )
}
