//! Paginated list endpoints and the API error type.
//!
//! Every list endpoint takes GraphQL-style paging arguments (`first`, `last`,
//! `after`, `before`) and returns a page of edges with opaque cursors, page
//! info and the total number of matching rows.

use crate::AppState;
use axum::{
    extract::{Extension, Path, Query},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use rusqlite::Connection;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use thiserror::Error;
use vault_store::{
    self as store, BatchInfo, CursorKind, Cursored, JobFilter, Page, PageArgs, StoreError,
};
use vault_sync::SyncError;

/// API error type mapping to HTTP status codes.
#[derive(Debug, Error)]
pub enum ApiError {
    #[error("invalid input: {0}")]
    BadRequest(String),
    #[error("not found: {0}")]
    NotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("service unavailable: {0}")]
    Unavailable(String),
    #[error("internal server error: {0}")]
    InternalServerError(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg),
            ApiError::Unavailable(msg) => (StatusCode::SERVICE_UNAVAILABLE, msg),
            ApiError::InternalServerError(msg) => {
                tracing::error!(error = %msg, "request failed");
                (StatusCode::INTERNAL_SERVER_ERROR, msg)
            }
        };

        let body = Json(serde_json::json!({
            "error": message
        }));

        (status, body).into_response()
    }
}

impl From<StoreError> for ApiError {
    fn from(err: StoreError) -> Self {
        if err.is_unavailable() {
            return ApiError::Unavailable(err.to_string());
        }
        match err {
            StoreError::NotFound { .. } => ApiError::NotFound(err.to_string()),
            StoreError::InvalidArgument(_) => ApiError::BadRequest(err.to_string()),
            StoreError::Conflict(_) => ApiError::Conflict(err.to_string()),
            _ => ApiError::InternalServerError(err.to_string()),
        }
    }
}

impl From<SyncError> for ApiError {
    fn from(err: SyncError) -> Self {
        match err {
            SyncError::Store(err) => err.into(),
            SyncError::MissingPayload(_) => ApiError::BadRequest(err.to_string()),
            SyncError::ProtocolMismatch { .. } | SyncError::MissingEntity(_) => {
                ApiError::Conflict(err.to_string())
            }
            SyncError::Join(_) => ApiError::InternalServerError(err.to_string()),
        }
    }
}

impl From<tokio::task::JoinError> for ApiError {
    fn from(err: tokio::task::JoinError) -> Self {
        ApiError::InternalServerError(format!("task join error: {err}"))
    }
}

/// Runs a store operation on the blocking pool with a pooled connection.
pub(crate) async fn with_conn<T, F>(state: &AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Connection) -> Result<T, StoreError> + Send + 'static,
{
    let pool = state.pool.clone();
    let value = tokio::task::spawn_blocking(move || {
        let conn = pool.get().map_err(StoreError::from)?;
        f(&conn)
    })
    .await??;
    Ok(value)
}

/// Query parameters shared by the list endpoints.
#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListQuery {
    pub first: Option<usize>,
    pub last: Option<usize>,
    pub after: Option<String>,
    pub before: Option<String>,
    /// Restrict to one pairwise connection.
    pub connection_id: Option<String>,
    /// Jobs only: `true` for complete jobs, `false` for open ones.
    pub completed: Option<bool>,
}

impl ListQuery {
    fn batch(&self, kind: CursorKind) -> Result<BatchInfo, StoreError> {
        PageArgs {
            first: self.first,
            last: self.last,
            after: self.after.clone(),
            before: self.before.clone(),
        }
        .to_batch(kind)
    }
}

#[derive(Debug, Serialize, Deserialize)]
pub struct Edge<T> {
    pub cursor: String,
    pub node: T,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageInfo {
    pub has_next_page: bool,
    pub has_previous_page: bool,
    pub start_cursor: Option<String>,
    pub end_cursor: Option<String>,
}

/// One page of a list endpoint.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T> {
    pub edges: Vec<Edge<T>>,
    pub page_info: PageInfo,
    pub total_count: usize,
}

impl<T: Cursored> PageResponse<T> {
    fn new(kind: CursorKind, page: Page<T>, total_count: usize) -> Self {
        let page_info = PageInfo {
            has_next_page: page.has_next_page,
            has_previous_page: page.has_previous_page,
            start_cursor: page.start_cursor(kind),
            end_cursor: page.end_cursor(kind),
        };
        let edges = page
            .items
            .into_iter()
            .map(|node| Edge {
                cursor: store::encode_cursor(kind, node.cursor()),
                node,
            })
            .collect();
        Self {
            edges,
            page_info,
            total_count,
        }
    }
}

/// Shared body of the list handlers: resolves the page request, checks the
/// tenant, then fetches the page and its total in one connection checkout.
async fn list<T, L, C>(
    state: &AppState,
    kind: CursorKind,
    tenant_id: String,
    query: &ListQuery,
    fetch: L,
    count: C,
) -> Result<Json<PageResponse<T>>, ApiError>
where
    T: Cursored + Send + 'static,
    L: FnOnce(&Connection, &str, &BatchInfo) -> Result<Page<T>, StoreError> + Send + 'static,
    C: FnOnce(&Connection, &str) -> Result<usize, StoreError> + Send + 'static,
{
    let batch = query.batch(kind)?;
    let (page, total) = with_conn(state, move |conn| {
        store::get_tenant(conn, &tenant_id)?;
        let page = fetch(conn, &tenant_id, &batch)?;
        let total = count(conn, &tenant_id)?;
        Ok((page, total))
    })
    .await?;
    Ok(Json(PageResponse::new(kind, page, total)))
}

/// Handler for `GET /api/tenants/{tenantId}/events`.
pub async fn list_events_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PageResponse<store::Event>>, ApiError> {
    let connection_id = query.connection_id.clone();
    let count_connection_id = connection_id.clone();
    list(
        &state,
        CursorKind::Event,
        tenant_id,
        &query,
        move |conn, tenant, batch| {
            store::list_events(conn, tenant, connection_id.as_deref(), batch)
        },
        move |conn, tenant| store::count_events(conn, tenant, count_connection_id.as_deref()),
    )
    .await
}

/// Handler for `GET /api/tenants/{tenantId}/jobs`.
pub async fn list_jobs_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PageResponse<store::Job>>, ApiError> {
    let filter = JobFilter {
        connection_id: query.connection_id.clone(),
        completed: query.completed,
    };
    let count_filter = filter.clone();
    list(
        &state,
        CursorKind::Job,
        tenant_id,
        &query,
        move |conn, tenant, batch| store::list_jobs(conn, tenant, &filter, batch),
        move |conn, tenant| store::count_jobs(conn, tenant, &count_filter),
    )
    .await
}

/// Handler for `GET /api/tenants/{tenantId}/connections`.
pub async fn list_connections_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PageResponse<store::Connection>>, ApiError> {
    list(
        &state,
        CursorKind::Connection,
        tenant_id,
        &query,
        store::list_connections,
        store::count_connections,
    )
    .await
}

/// Handler for `GET /api/tenants/{tenantId}/messages`.
pub async fn list_messages_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PageResponse<store::Message>>, ApiError> {
    let connection_id = query.connection_id.clone();
    let count_connection_id = connection_id.clone();
    list(
        &state,
        CursorKind::Message,
        tenant_id,
        &query,
        move |conn, tenant, batch| {
            store::list_messages(conn, tenant, connection_id.as_deref(), batch)
        },
        move |conn, tenant| store::count_messages(conn, tenant, count_connection_id.as_deref()),
    )
    .await
}

/// Handler for `GET /api/tenants/{tenantId}/credentials`.
pub async fn list_credentials_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PageResponse<store::Credential>>, ApiError> {
    let connection_id = query.connection_id.clone();
    let count_connection_id = connection_id.clone();
    list(
        &state,
        CursorKind::Credential,
        tenant_id,
        &query,
        move |conn, tenant, batch| {
            store::list_credentials(conn, tenant, connection_id.as_deref(), batch)
        },
        move |conn, tenant| {
            store::count_credentials(conn, tenant, count_connection_id.as_deref())
        },
    )
    .await
}

/// Handler for `GET /api/tenants/{tenantId}/proofs`.
pub async fn list_proofs_handler(
    Extension(state): Extension<Arc<AppState>>,
    Path(tenant_id): Path<String>,
    Query(query): Query<ListQuery>,
) -> Result<Json<PageResponse<store::Proof>>, ApiError> {
    let connection_id = query.connection_id.clone();
    let count_connection_id = connection_id.clone();
    list(
        &state,
        CursorKind::Proof,
        tenant_id,
        &query,
        move |conn, tenant, batch| {
            store::list_proofs(conn, tenant, connection_id.as_deref(), batch)
        },
        move |conn, tenant| store::count_proofs(conn, tenant, count_connection_id.as_deref()),
    )
    .await
}
