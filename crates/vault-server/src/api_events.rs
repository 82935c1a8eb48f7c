//! Event endpoints: single-event reads, the read flag, related objects and
//! the live SSE subscription.

use crate::api::{with_conn, ApiError};
use crate::AppState;
use axum::{
    extract::{Extension, Path},
    response::{
        sse::{Event as SseEvent, KeepAlive},
        Sse,
    },
    Json,
};
use futures_util::Stream;
use std::{convert::Infallible, sync::Arc};
use tokio_stream::StreamExt;
use vault_store::{self as store, CursorKind, Event};

/// Handler for `GET /api/tenants/{tenantId}/events/{eventId}`.
pub async fn get_event_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((tenant_id, event_id)): Path<(String, String)>,
) -> Result<Json<Event>, ApiError> {
    let event = with_conn(&state, move |conn| {
        store::get_event(conn, &event_id, &tenant_id)
    })
    .await?;
    Ok(Json(event))
}

/// Handler for `POST /api/tenants/{tenantId}/events/{eventId}/read`.
pub async fn mark_event_read_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((tenant_id, event_id)): Path<(String, String)>,
) -> Result<Json<Event>, ApiError> {
    let event = with_conn(&state, move |conn| {
        store::mark_event_read(conn, &event_id, &tenant_id)
    })
    .await?;
    tracing::debug!(tenant_id = %event.tenant_id, event_id = %event.id, "event marked read");
    Ok(Json(event))
}

/// Handler for `GET /api/tenants/{tenantId}/events/{eventId}/connection`.
pub async fn get_event_connection_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((tenant_id, event_id)): Path<(String, String)>,
) -> Result<Json<store::Connection>, ApiError> {
    let connection = with_conn(&state, move |conn| {
        store::connection_for_event(conn, &event_id, &tenant_id)
    })
    .await?;
    Ok(Json(connection))
}

/// Handler for `GET /api/tenants/{tenantId}/events/{eventId}/job`.
pub async fn get_event_job_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path((tenant_id, event_id)): Path<(String, String)>,
) -> Result<Json<store::Job>, ApiError> {
    let job = with_conn(&state, move |conn| {
        store::job_for_event(conn, &event_id, &tenant_id)
    })
    .await?;
    Ok(Json(job))
}

fn to_sse(event: Event) -> Option<Result<SseEvent, Infallible>> {
    match serde_json::to_string(&event) {
        Ok(data) => Some(Ok(SseEvent::default()
            .event("event")
            .id(store::encode_cursor(CursorKind::Event, event.cursor))
            .data(data))),
        Err(e) => {
            tracing::error!(event_id = %event.id, "failed to serialize event: {}", e);
            None
        }
    }
}

/// Handler for `GET /api/tenants/{tenantId}/events/stream`.
///
/// Streams the tenant's new events as they are appended. Each SSE message
/// carries the event's opaque cursor as its id, so a reconnecting client can
/// page forward from the last one it saw. The subscription is removed when
/// the client disconnects and the stream is dropped.
pub async fn event_stream_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> Result<Sse<impl Stream<Item = Result<SseEvent, Infallible>>>, ApiError> {
    let lookup_id = tenant_id.clone();
    with_conn(&state, move |conn| store::get_tenant(conn, &lookup_id)).await?;

    let subscription = state.subscribers.subscribe(&tenant_id);
    tracing::info!(
        tenant_id = %tenant_id,
        subscription_id = %subscription.id(),
        "event stream opened"
    );

    let stream = subscription.filter_map(to_sse);
    Ok(Sse::new(stream).keep_alive(KeepAlive::default()))
}
