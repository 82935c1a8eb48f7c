//! Basic messages.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::paginator::{BatchInfo, Cursored, Page, Predicate, QueryPlan};
use crate::query::{self, next_cursor};

const TABLE: &str = "messages";
const COLUMNS: &str =
    "id, tenant_id, connection_id, message, sent_by_me, delivered, created, cursor";

/// A basic message exchanged over a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Message {
    pub id: String,
    pub tenant_id: String,
    pub connection_id: String,
    pub message: String,
    pub sent_by_me: bool,
    pub delivered: Option<bool>,
    pub created: String,
    #[serde(skip)]
    pub cursor: u64,
}

impl Message {
    pub fn description(&self) -> String {
        if self.sent_by_me {
            format!("Sent message: {}", self.message)
        } else {
            format!("Received message: {}", self.message)
        }
    }
}

impl Cursored for Message {
    fn cursor(&self) -> u64 {
        self.cursor
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateMessageParams {
    pub tenant_id: String,
    pub connection_id: String,
    pub message: String,
    pub sent_by_me: bool,
}

pub fn add_message(conn: &Connection, params: &CreateMessageParams) -> Result<Message> {
    let id = uuid::Uuid::new_v4().to_string();
    let sql = format!(
        "INSERT INTO messages (id, tenant_id, connection_id, message, sent_by_me, cursor)
         VALUES (?1, ?2, ?3, ?4, ?5, {})
         RETURNING {COLUMNS}",
        next_cursor(TABLE)
    );
    Ok(conn.query_row(
        &sql,
        params![
            id,
            params.tenant_id,
            params.connection_id,
            params.message,
            params.sent_by_me,
        ],
        map_row,
    )?)
}

pub fn get_message(conn: &Connection, id: &str, tenant_id: &str) -> Result<Message> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM messages WHERE id = ?1 AND tenant_id = ?2"),
        params![id, tenant_id],
        map_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("message", id))
}

fn filters(tenant_id: &str, connection_id: Option<&str>) -> Vec<Predicate> {
    let mut filters = vec![Predicate::eq("tenant_id", tenant_id)];
    if let Some(connection_id) = connection_id {
        filters.push(Predicate::eq("connection_id", connection_id));
    }
    filters
}

pub fn list_messages(
    conn: &Connection,
    tenant_id: &str,
    connection_id: Option<&str>,
    batch: &BatchInfo,
) -> Result<Page<Message>> {
    query::page(
        conn,
        TABLE,
        COLUMNS,
        batch,
        filters(tenant_id, connection_id),
        map_row,
    )
}

pub fn count_messages(
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

fn map_row(row: &Row<'_>) -> rusqlite::Result<Message> {
    Ok(Message {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        connection_id: row.get(2)?,
        message: row.get(3)?,
        sent_by_me: row.get(4)?,
        delivered: row.get(5)?,
        created: row.get(6)?,
        cursor: row.get(7)?,
    })
}
