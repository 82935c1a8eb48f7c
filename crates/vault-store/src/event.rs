//! The append-only per-tenant event log.
//!
//! Events are written once per job transition and never deleted. The only
//! mutable column is `read`, which clients toggle and which plays no part
//! in pagination.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::connection::{self, Connection as PairwiseConnection};
use crate::error::{Result, StoreError};
use crate::job::{self, Job};
use crate::paginator::{BatchInfo, Cursored, Page, Predicate, QueryPlan};
use crate::query::{self, next_cursor};

const TABLE: &str = "events";
const COLUMNS: &str = "id, tenant_id, connection_id, job_id, description, read, created, cursor";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Event {
    pub id: String,
    pub tenant_id: String,
    pub connection_id: Option<String>,
    pub job_id: Option<String>,
    pub description: String,
    pub read: bool,
    pub created: String,
    #[serde(skip)]
    pub cursor: u64,
}

impl Cursored for Event {
    fn cursor(&self) -> u64 {
        self.cursor
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateEventParams {
    pub tenant_id: String,
    pub connection_id: Option<String>,
    pub job_id: Option<String>,
    pub description: String,
}

/// Appends an event. The cursor is assigned in the same statement.
pub fn add_event(conn: &Connection, params: &CreateEventParams) -> Result<Event> {
    let id = uuid::Uuid::new_v4().to_string();
    let sql = format!(
        "INSERT INTO events (id, tenant_id, connection_id, job_id, description, cursor)
         VALUES (?1, ?2, ?3, ?4, ?5, {})
         RETURNING {COLUMNS}",
        next_cursor(TABLE)
    );
    let event = conn.query_row(
        &sql,
        params![
            id,
            params.tenant_id,
            params.connection_id,
            params.job_id,
            params.description,
        ],
        map_row,
    )?;
    tracing::debug!(
        event_id = %event.id,
        tenant_id = %event.tenant_id,
        cursor = event.cursor,
        "event appended"
    );
    Ok(event)
}

pub fn get_event(conn: &Connection, id: &str, tenant_id: &str) -> Result<Event> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM events WHERE id = ?1 AND tenant_id = ?2"),
        params![id, tenant_id],
        map_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("event", id))
}

/// Marks an event read and returns it.
pub fn mark_event_read(conn: &Connection, id: &str, tenant_id: &str) -> Result<Event> {
    conn.query_row(
        &format!(
            "UPDATE events SET read = 1 WHERE id = ?1 AND tenant_id = ?2 RETURNING {COLUMNS}"
        ),
        params![id, tenant_id],
        map_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("event", id))
}

fn filters(tenant_id: &str, connection_id: Option<&str>) -> Vec<Predicate> {
    let mut filters = vec![Predicate::eq("tenant_id", tenant_id)];
    if let Some(connection_id) = connection_id {
        filters.push(Predicate::eq("connection_id", connection_id));
    }
    filters
}

pub fn list_events(
    conn: &Connection,
    tenant_id: &str,
    connection_id: Option<&str>,
    batch: &BatchInfo,
) -> Result<Page<Event>> {
    query::page(
        conn,
        TABLE,
        COLUMNS,
        batch,
        filters(tenant_id, connection_id),
        map_row,
    )
}

pub fn count_events(
    conn: &Connection,
    tenant_id: &str,
    connection_id: Option<&str>,
) -> Result<usize> {
    query::count(
        conn,
        TABLE,
        &QueryPlan::count(filters(tenant_id, connection_id)),
    )
}

/// The connection an event refers to.
///
/// # Errors
///
/// `StoreError::NotFound` if the event has no connection or the connection
/// row does not exist.
pub fn connection_for_event(
    conn: &Connection,
    event_id: &str,
    tenant_id: &str,
) -> Result<PairwiseConnection> {
    let event = get_event(conn, event_id, tenant_id)?;
    let connection_id = event
        .connection_id
        .ok_or_else(|| StoreError::not_found("connection", ""))?;
    connection::get_connection(conn, &connection_id, tenant_id)
}

/// The job an event was emitted for.
///
/// # Errors
///
/// `StoreError::NotFound` if the event has no job or the job row does not
/// exist.
pub fn job_for_event(conn: &Connection, event_id: &str, tenant_id: &str) -> Result<Job> {
    let event = get_event(conn, event_id, tenant_id)?;
    let job_id = event
        .job_id
        .ok_or_else(|| StoreError::not_found("job", ""))?;
    job::get_job(conn, &job_id, tenant_id)
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<Event> {
    Ok(Event {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        connection_id: row.get(2)?,
        job_id: row.get(3)?,
        description: row.get(4)?,
        read: row.get(5)?,
        created: row.get(6)?,
        cursor: row.get(7)?,
    })
}
