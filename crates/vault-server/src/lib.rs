//! Vault server library logic.
//!
//! Wires the entity store, the agency listener and the subscriber registry
//! into an axum router. Handlers run store work on the blocking pool and
//! share one [`AppState`].

pub mod api;
pub mod api_agency;
pub mod api_events;
pub mod api_tenants;
pub mod config;
pub mod telemetry;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Extension, Json, Router,
};
use serde_json::{json, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use vault_db::DbPool;
use vault_sync::{Listener, SubscriberRegistry, Updater};

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Database connection pool.
    pub pool: DbPool,
    /// Live event subscriptions, per tenant.
    pub subscribers: SubscriberRegistry,
    /// Agency notification entry point.
    pub listener: Listener,
}

impl AppState {
    /// Builds the state, wiring one updater over `pool` and `subscribers`.
    pub fn new(pool: DbPool, subscribers: SubscriberRegistry) -> Self {
        let listener = Listener::new(Updater::new(pool.clone(), subscribers.clone()));
        Self {
            pool,
            subscribers,
            listener,
        }
    }
}

/// Maximum request body size (1 MiB).
const MAX_REQUEST_BODY_BYTES: usize = 1024 * 1024;

/// Health check handler.
async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION")
    }))
}

/// Builds the application router with all routes.
pub fn app(state: AppState) -> Router {
    let tenant_routes = Router::new()
        .route("/api/tenants", post(api_tenants::create_tenant_handler))
        .route(
            "/api/tenants/{tenantId}",
            get(api_tenants::get_tenant_handler),
        )
        .route(
            "/api/tenants/{tenantId}/events",
            get(api::list_events_handler),
        )
        .route(
            "/api/tenants/{tenantId}/events/stream",
            get(api_events::event_stream_handler),
        )
        .route(
            "/api/tenants/{tenantId}/events/{eventId}",
            get(api_events::get_event_handler),
        )
        .route(
            "/api/tenants/{tenantId}/events/{eventId}/read",
            post(api_events::mark_event_read_handler),
        )
        .route(
            "/api/tenants/{tenantId}/events/{eventId}/connection",
            get(api_events::get_event_connection_handler),
        )
        .route(
            "/api/tenants/{tenantId}/events/{eventId}/job",
            get(api_events::get_event_job_handler),
        )
        .route("/api/tenants/{tenantId}/jobs", get(api::list_jobs_handler))
        .route(
            "/api/tenants/{tenantId}/connections",
            get(api::list_connections_handler),
        )
        .route(
            "/api/tenants/{tenantId}/messages",
            get(api::list_messages_handler),
        )
        .route(
            "/api/tenants/{tenantId}/credentials",
            get(api::list_credentials_handler),
        )
        .route(
            "/api/tenants/{tenantId}/proofs",
            get(api::list_proofs_handler),
        );

    Router::new()
        .route("/health", get(health))
        .route(
            "/api/agency/notifications",
            post(api_agency::notification_handler),
        )
        .merge(tenant_routes)
        .layer(DefaultBodyLimit::max(MAX_REQUEST_BODY_BYTES))
        .layer(TraceLayer::new_for_http())
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(Extension(Arc::new(state)))
}
