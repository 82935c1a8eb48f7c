//! Tenants: the agents whose data the vault keeps.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;

use crate::error::{Result, StoreError};
use crate::paginator::Cursored;
use crate::query::next_cursor;

const COLUMNS: &str = "id, agent_id, label, created, cursor";

/// A tenant. Every other entity references one.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Tenant {
    pub id: String,
    /// The agency's identifier for the agent.
    pub agent_id: String,
    pub label: String,
    pub created: String,
    #[serde(skip)]
    pub cursor: u64,
}

impl Cursored for Tenant {
    fn cursor(&self) -> u64 {
        self.cursor
    }
}

/// Registers a tenant for `agent_id`.
///
/// # Errors
///
/// `StoreError::Conflict` if the agent already has a tenant.
pub fn add_tenant(conn: &Connection, agent_id: &str, label: &str) -> Result<Tenant> {
    if tenant_for_agent(conn, agent_id)?.is_some() {
        return Err(StoreError::Conflict(format!(
            "tenant already exists for agent {agent_id}"
        )));
    }

    let id = uuid::Uuid::new_v4().to_string();
    let sql = format!(
        "INSERT INTO tenants (id, agent_id, label, cursor)
         VALUES (?1, ?2, ?3, {})
         RETURNING {COLUMNS}",
        next_cursor("tenants")
    );
    let tenant = conn.query_row(&sql, params![id, agent_id, label], map_row)?;
    tracing::info!(tenant_id = %tenant.id, agent_id, "tenant added");
    Ok(tenant)
}

pub fn get_tenant(conn: &Connection, id: &str) -> Result<Tenant> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM tenants WHERE id = ?1"),
        [id],
        map_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("tenant", id))
}

/// Looks up the tenant registered for an agency agent id.
pub fn tenant_for_agent(conn: &Connection, agent_id: &str) -> Result<Option<Tenant>> {
    Ok(conn
        .query_row(
            &format!("SELECT {COLUMNS} FROM tenants WHERE agent_id = ?1"),
            [agent_id],
            map_row,
        )
        .optional()?)
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<Tenant> {
    Ok(Tenant {
        id: row.get(0)?,
        agent_id: row.get(1)?,
        label: row.get(2)?,
        created: row.get(3)?,
        cursor: row.get(4)?,
    })
}
