//! Credentials issued or received over a connection.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use vault_types::{CredentialRole, CredentialValue, ProofAttribute};

use crate::error::{Result, StoreError};
use crate::paginator::{BatchInfo, Cursored, Page, Predicate, QueryPlan};
use crate::query::{self, next_cursor, parse_json, parse_label};

const TABLE: &str = "credentials";
const COLUMNS: &str = "id, tenant_id, connection_id, role, schema_id, cred_def_id, \
                       attributes_json, initiated_by_us, approved, issued, failed, created, cursor";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Credential {
    pub id: String,
    pub tenant_id: String,
    pub connection_id: String,
    pub role: CredentialRole,
    pub schema_id: String,
    pub cred_def_id: String,
    pub attributes: Vec<CredentialValue>,
    pub initiated_by_us: bool,
    pub approved: Option<String>,
    pub issued: Option<String>,
    pub failed: Option<String>,
    pub created: String,
    #[serde(skip)]
    pub cursor: u64,
}

impl Credential {
    /// Event description for the credential's current lifecycle step.
    pub fn description(&self) -> String {
        if self.failed.is_some() {
            return format!("Credential exchange failed ({})", self.cred_def_id);
        }
        match (self.role, self.issued.is_some(), self.approved.is_some()) {
            (CredentialRole::Issuer, true, _) => format!("Issued credential {}", self.cred_def_id),
            (CredentialRole::Holder, true, _) => {
                format!("Received credential {}", self.cred_def_id)
            }
            (_, false, true) => format!("Approved credential offer {}", self.cred_def_id),
            (CredentialRole::Issuer, false, false) => {
                format!("Sent credential offer {}", self.cred_def_id)
            }
            (CredentialRole::Holder, false, false) => {
                format!("Received credential offer {}", self.cred_def_id)
            }
        }
    }

    /// Whether the credential carries an attribute that satisfies `attribute`.
    pub fn satisfies(&self, attribute: &ProofAttribute) -> bool {
        self.attributes
            .iter()
            .any(|value| attribute.satisfied_by(&self.cred_def_id, &value.name))
    }
}

impl Cursored for Credential {
    fn cursor(&self) -> u64 {
        self.cursor
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateCredentialParams {
    pub tenant_id: String,
    pub connection_id: String,
    pub role: CredentialRole,
    pub schema_id: String,
    pub cred_def_id: String,
    pub attributes: Vec<CredentialValue>,
    pub initiated_by_us: bool,
}

/// Lifecycle timestamps to stamp on a credential. `None` leaves the stored
/// value as it is.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateCredentialParams {
    pub approved: Option<String>,
    pub issued: Option<String>,
    pub failed: Option<String>,
}

pub fn add_credential(conn: &Connection, params: &CreateCredentialParams) -> Result<Credential> {
    let id = uuid::Uuid::new_v4().to_string();
    let attributes_json = serde_json::to_string(&params.attributes)?;
    let sql = format!(
        "INSERT INTO credentials (
            id, tenant_id, connection_id, role, schema_id, cred_def_id, attributes_json,
            initiated_by_us, cursor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, {})
        RETURNING {COLUMNS}",
        next_cursor(TABLE)
    );
    Ok(conn.query_row(
        &sql,
        params![
            id,
            params.tenant_id,
            params.connection_id,
            params.role.as_str(),
            params.schema_id,
            params.cred_def_id,
            attributes_json,
            params.initiated_by_us,
        ],
        map_row,
    )?)
}

pub fn get_credential(conn: &Connection, id: &str, tenant_id: &str) -> Result<Credential> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM credentials WHERE id = ?1 AND tenant_id = ?2"),
        params![id, tenant_id],
        map_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("credential", id))
}

/// Applies lifecycle timestamps and returns the updated credential.
pub fn update_credential(
    conn: &Connection,
    id: &str,
    tenant_id: &str,
    update: &UpdateCredentialParams,
) -> Result<Credential> {
    conn.query_row(
        &format!(
            "UPDATE credentials SET
                approved = COALESCE(?3, approved),
                issued = COALESCE(?4, issued),
                failed = COALESCE(?5, failed)
             WHERE id = ?1 AND tenant_id = ?2
             RETURNING {COLUMNS}"
        ),
        params![id, tenant_id, update.approved, update.issued, update.failed],
        map_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("credential", id))
}

fn filters(tenant_id: &str, connection_id: Option<&str>) -> Vec<Predicate> {
    let mut filters = vec![Predicate::eq("tenant_id", tenant_id)];
    if let Some(connection_id) = connection_id {
        filters.push(Predicate::eq("connection_id", connection_id));
    }
    filters
}

pub fn list_credentials(
    conn: &Connection,
    tenant_id: &str,
    connection_id: Option<&str>,
    batch: &BatchInfo,
) -> Result<Page<Credential>> {
    query::page(
        conn,
        TABLE,
        COLUMNS,
        batch,
        filters(tenant_id, connection_id),
        map_row,
    )
}

pub fn count_credentials(
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

/// Credentials the tenant holds (issued to it, not failed) that satisfy at
/// least one of `attributes`, oldest first.
pub fn search_credentials(
    conn: &Connection,
    tenant_id: &str,
    attributes: &[ProofAttribute],
) -> Result<Vec<Credential>> {
    if attributes.is_empty() {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM credentials
         WHERE tenant_id = ?1 AND role = ?2 AND issued IS NOT NULL AND failed IS NULL
         ORDER BY cursor ASC"
    ))?;
    let rows = stmt.query_map(params![tenant_id, CredentialRole::Holder.as_str()], map_row)?;

    let mut found = Vec::new();
    for row in rows {
        let credential = row?;
        if attributes.iter().any(|a| credential.satisfies(a)) {
            found.push(credential);
        }
    }
    Ok(found)
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<Credential> {
    Ok(Credential {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        connection_id: row.get(2)?,
        role: parse_label(row, 3)?,
        schema_id: row.get(4)?,
        cred_def_id: row.get(5)?,
        attributes: parse_json(row, 6)?,
        initiated_by_us: row.get(7)?,
        approved: row.get(8)?,
        issued: row.get(9)?,
        failed: row.get(10)?,
        created: row.get(11)?,
        cursor: row.get(12)?,
    })
}
