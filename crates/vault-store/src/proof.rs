//! Proof presentations requested or provided over a connection.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use vault_types::{ProofAttribute, ProofRole};

use crate::credential::Credential;
use crate::error::{Result, StoreError};
use crate::paginator::{BatchInfo, Cursored, Page, Predicate, QueryPlan};
use crate::query::{self, next_cursor, parse_json, parse_label};

const TABLE: &str = "proofs";
const COLUMNS: &str = "id, tenant_id, connection_id, role, attributes_json, result, \
                       initiated_by_us, provable, approved, verified, failed, created, cursor";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Proof {
    pub id: String,
    pub tenant_id: String,
    pub connection_id: String,
    pub role: ProofRole,
    pub attributes: Vec<ProofAttribute>,
    /// `true` once the presentation has been verified.
    pub result: bool,
    pub initiated_by_us: bool,
    /// Set when the tenant's credentials can answer the request.
    pub provable: Option<String>,
    pub approved: Option<String>,
    pub verified: Option<String>,
    pub failed: Option<String>,
    pub created: String,
    #[serde(skip)]
    pub cursor: u64,
}

impl Proof {
    pub fn description(&self) -> String {
        if self.failed.is_some() {
            return "Proof presentation failed".to_string();
        }
        match (self.role, self.verified.is_some(), self.approved.is_some()) {
            (ProofRole::Verifier, true, _) => "Verified proof".to_string(),
            (ProofRole::Prover, true, _) => "Proof accepted by verifier".to_string(),
            (_, false, true) => "Approved proof request".to_string(),
            (ProofRole::Verifier, false, false) => "Sent proof request".to_string(),
            (ProofRole::Prover, false, false) => "Received proof request".to_string(),
        }
    }
}

impl Cursored for Proof {
    fn cursor(&self) -> u64 {
        self.cursor
    }
}

/// Returns `true` when every requested attribute is satisfied by one of
/// `credentials`. An empty request is trivially provable.
pub fn attributes_provable(attributes: &[ProofAttribute], credentials: &[Credential]) -> bool {
    attributes
        .iter()
        .all(|attribute| credentials.iter().any(|c| c.satisfies(attribute)))
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateProofParams {
    pub tenant_id: String,
    pub connection_id: String,
    pub role: ProofRole,
    pub attributes: Vec<ProofAttribute>,
    pub initiated_by_us: bool,
    pub provable: Option<String>,
}

/// Lifecycle timestamps to stamp on a proof. `None` leaves the stored value
/// as it is; a `verified` timestamp also sets `result`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UpdateProofParams {
    pub provable: Option<String>,
    pub approved: Option<String>,
    pub verified: Option<String>,
    pub failed: Option<String>,
}

pub fn add_proof(conn: &Connection, params: &CreateProofParams) -> Result<Proof> {
    let id = uuid::Uuid::new_v4().to_string();
    let attributes_json = serde_json::to_string(&params.attributes)?;
    let sql = format!(
        "INSERT INTO proofs (
            id, tenant_id, connection_id, role, attributes_json, initiated_by_us, provable,
            cursor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, {})
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
            attributes_json,
            params.initiated_by_us,
            params.provable,
        ],
        map_row,
    )?)
}

pub fn get_proof(conn: &Connection, id: &str, tenant_id: &str) -> Result<Proof> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM proofs WHERE id = ?1 AND tenant_id = ?2"),
        params![id, tenant_id],
        map_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("proof", id))
}

pub fn update_proof(
    conn: &Connection,
    id: &str,
    tenant_id: &str,
    update: &UpdateProofParams,
) -> Result<Proof> {
    conn.query_row(
        &format!(
            "UPDATE proofs SET
                provable = COALESCE(?3, provable),
                approved = COALESCE(?4, approved),
                verified = COALESCE(?5, verified),
                failed = COALESCE(?6, failed),
                result = CASE WHEN ?5 IS NOT NULL THEN 1 ELSE result END
             WHERE id = ?1 AND tenant_id = ?2
             RETURNING {COLUMNS}"
        ),
        params![
            id,
            tenant_id,
            update.provable,
            update.approved,
            update.verified,
            update.failed,
        ],
        map_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("proof", id))
}

fn filters(tenant_id: &str, connection_id: Option<&str>) -> Vec<Predicate> {
    let mut filters = vec![Predicate::eq("tenant_id", tenant_id)];
    if let Some(connection_id) = connection_id {
        filters.push(Predicate::eq("connection_id", connection_id));
    }
    filters
}

pub fn list_proofs(
    conn: &Connection,
    tenant_id: &str,
    connection_id: Option<&str>,
    batch: &BatchInfo,
) -> Result<Page<Proof>> {
    query::page(
        conn,
        TABLE,
        COLUMNS,
        batch,
        filters(tenant_id, connection_id),
        map_row,
    )
}

pub fn count_proofs(
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

pub(crate) fn map_row(row: &Row<'_>) -> rusqlite::Result<Proof> {
    Ok(Proof {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        connection_id: row.get(2)?,
        role: parse_label(row, 3)?,
        attributes: parse_json(row, 4)?,
        result: row.get(5)?,
        initiated_by_us: row.get(6)?,
        provable: row.get(7)?,
        approved: row.get(8)?,
        verified: row.get(9)?,
        failed: row.get(10)?,
        created: row.get(11)?,
        cursor: row.get(12)?,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tests::{seed_tenant, test_db};
    use vault_types::{CredentialRole, CredentialValue};

    fn request(tenant_id: &str, names: &[&str]) -> CreateProofParams {
        CreateProofParams {
            tenant_id: tenant_id.to_string(),
            connection_id: "c1".to_string(),
            role: ProofRole::Prover,
            attributes: names
                .iter()
                .map(|n| ProofAttribute {
                    name: n.to_string(),
                    cred_def_id: String::new(),
                })
                .collect(),
            initiated_by_us: false,
            provable: None,
        }
    }

    #[test]
    fn verification_sets_result() {
        let conn = test_db();
        let tenant = seed_tenant(&conn, "agent-1");
        let proof = add_proof(&conn, &request(&tenant, &["email"])).unwrap();
        assert!(!proof.result);
        assert_eq!(proof.description(), "Received proof request");

        let approved = update_proof(
            &conn,
            &proof.id,
            &tenant,
            &UpdateProofParams {
                approved: Some(crate::timestamp::now()),
                ..UpdateProofParams::default()
            },
        )
        .unwrap();
        assert!(!approved.result);

        let verified = update_proof(
            &conn,
            &proof.id,
            &tenant,
            &UpdateProofParams {
                verified: Some(crate::timestamp::now()),
                ..UpdateProofParams::default()
            },
        )
        .unwrap();
        assert!(verified.result);
        assert_eq!(verified.approved, approved.approved);
        assert_eq!(verified.attributes, proof.attributes);
        assert_eq!(verified.description(), "Proof accepted by verifier");
    }

    #[test]
    fn provability_needs_every_attribute() {
        let credential = Credential {
            id: "cred".to_string(),
            tenant_id: "t".to_string(),
            connection_id: "c".to_string(),
            role: CredentialRole::Holder,
            schema_id: "s".to_string(),
            cred_def_id: "def-1".to_string(),
            attributes: vec![CredentialValue {
                name: "email".to_string(),
                value: "a@b".to_string(),
            }],
            initiated_by_us: false,
            approved: None,
            issued: Some("2024-01-01T00:00:00.000Z".to_string()),
            failed: None,
            created: "2024-01-01T00:00:00.000Z".to_string(),
            cursor: 1,
        };
        let one = request("t", &["email"]).attributes;
        let two = request("t", &["email", "name"]).attributes;

        assert!(attributes_provable(&one, std::slice::from_ref(&credential)));
        assert!(!attributes_provable(&two, &[credential]));
        assert!(attributes_provable(&[], &[]));
    }
}
