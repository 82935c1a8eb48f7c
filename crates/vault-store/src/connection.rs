//! Pairwise connections.

use rusqlite::{params, Connection as Db, OptionalExtension, Row};
use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::paginator::{BatchInfo, Cursored, Page, Predicate, QueryPlan};
use crate::query::{self, next_cursor};

const TABLE: &str = "connections";
const COLUMNS: &str = "id, tenant_id, our_did, their_did, their_endpoint, their_label, \
                       invited, approved, created, cursor";

/// A pairwise connection between the tenant and another agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Connection {
    /// The agency's connection id.
    pub id: String,
    pub tenant_id: String,
    pub our_did: String,
    pub their_did: String,
    pub their_endpoint: String,
    pub their_label: String,
    /// `true` when the other party accepted our invitation.
    pub invited: bool,
    pub approved: Option<String>,
    pub created: String,
    #[serde(skip)]
    pub cursor: u64,
}

impl Connection {
    /// Event description for an established connection.
    pub fn description(&self) -> String {
        format!("Established connection to {}", self.their_label)
    }
}

impl Cursored for Connection {
    fn cursor(&self) -> u64 {
        self.cursor
    }
}

/// Parameters for storing a new connection.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateConnectionParams {
    pub id: String,
    pub tenant_id: String,
    pub our_did: String,
    pub their_did: String,
    pub their_endpoint: String,
    pub their_label: String,
    pub invited: bool,
    pub approved: Option<String>,
}

pub fn add_connection(conn: &Db, params: &CreateConnectionParams) -> Result<Connection> {
    let sql = format!(
        "INSERT INTO connections (
            id, tenant_id, our_did, their_did, their_endpoint, their_label, invited, approved,
            cursor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, {})
        RETURNING {COLUMNS}",
        next_cursor(TABLE)
    );
    let connection = conn.query_row(
        &sql,
        params![
            params.id,
            params.tenant_id,
            params.our_did,
            params.their_did,
            params.their_endpoint,
            params.their_label,
            params.invited,
            params.approved,
        ],
        map_row,
    )?;
    Ok(connection)
}

pub fn get_connection(conn: &Db, id: &str, tenant_id: &str) -> Result<Connection> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM connections WHERE id = ?1 AND tenant_id = ?2"),
        params![id, tenant_id],
        map_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("connection", id))
}

pub fn list_connections(
    conn: &Db,
    tenant_id: &str,
    batch: &BatchInfo,
) -> Result<Page<Connection>> {
    query::page(
        conn,
        TABLE,
        COLUMNS,
        batch,
        vec![Predicate::eq("tenant_id", tenant_id)],
        map_row,
    )
}

pub fn count_connections(conn: &Db, tenant_id: &str) -> Result<usize> {
    query::count(
        conn,
        TABLE,
        &QueryPlan::count(vec![Predicate::eq("tenant_id", tenant_id)]),
    )
}

pub(crate) fn map_row(row: &Row<'_>) -> rusqlite::Result<Connection> {
    Ok(Connection {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        our_did: row.get(2)?,
        their_did: row.get(3)?,
        their_endpoint: row.get(4)?,
        their_label: row.get(5)?,
        invited: row.get(6)?,
        approved: row.get(7)?,
        created: row.get(8)?,
        cursor: row.get(9)?,
    })
}
