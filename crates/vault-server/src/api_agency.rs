//! Agency notification ingestion.

use crate::api::ApiError;
use crate::AppState;
use axum::{extract::Extension, Json};
use serde::Serialize;
use std::sync::Arc;
use vault_store::Event;
use vault_types::AgencyNotification;

/// Response body for an ingested notification.
#[derive(Debug, Serialize)]
pub struct NotificationResponse {
    /// Events appended while reconciling, oldest first. Empty when the
    /// notification was a redelivery.
    pub events: Vec<Event>,
}

/// Handler for `POST /api/agency/notifications`.
pub async fn notification_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(notification): Json<AgencyNotification>,
) -> Result<Json<NotificationResponse>, ApiError> {
    let job = notification.job();
    tracing::debug!(
        job_id = %job.job_id,
        tenant_id = %job.tenant_id,
        "agency notification received"
    );
    let events = state.listener.dispatch(notification).await?;
    Ok(Json(NotificationResponse { events }))
}
