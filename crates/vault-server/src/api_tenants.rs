//! Tenant registration.

use crate::api::{with_conn, ApiError};
use crate::AppState;
use axum::{
    extract::{Extension, Path},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use std::sync::Arc;
use vault_store::{self as store, Tenant};

/// Request body for `POST /api/tenants`.
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateTenantRequest {
    /// The agency's identifier for the agent.
    pub agent_id: String,
    #[serde(default)]
    pub label: String,
}

/// Handler for `POST /api/tenants`.
pub async fn create_tenant_handler(
    Extension(state): Extension<Arc<AppState>>,
    Json(request): Json<CreateTenantRequest>,
) -> Result<(StatusCode, Json<Tenant>), ApiError> {
    if request.agent_id.trim().is_empty() {
        return Err(ApiError::BadRequest("agentId must not be empty".to_string()));
    }
    let tenant = with_conn(&state, move |conn| {
        store::add_tenant(conn, &request.agent_id, &request.label)
    })
    .await?;
    Ok((StatusCode::CREATED, Json(tenant)))
}

/// Handler for `GET /api/tenants/{tenantId}`.
pub async fn get_tenant_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(tenant_id): Path<String>,
) -> Result<Json<Tenant>, ApiError> {
    let tenant = with_conn(&state, move |conn| store::get_tenant(conn, &tenant_id)).await?;
    Ok(Json(tenant))
}
