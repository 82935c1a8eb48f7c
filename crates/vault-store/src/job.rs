//! Jobs: the tracked lifecycle of one protocol run.
//!
//! A job's protocol type is fixed at creation and its status only moves
//! forward (`waiting` → `pending` → `complete`). [`update_job`] enforces both;
//! the state machine deciding *which* transition to take lives in the sync
//! layer.

use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use vault_types::{JobResult, JobStatus, ProofAttribute, ProtocolType};

use crate::error::{Result, StoreError};
use crate::paginator::{BatchInfo, Cursored, Page, Predicate, QueryPlan};
use crate::proof::{self, Proof};
use crate::query::{self, next_cursor, parse_label};
use crate::timestamp::NOW_SQL;

const TABLE: &str = "jobs";
const COLUMNS: &str = "id, tenant_id, connection_id, protocol_type, protocol_id, status, result, \
                       initiated_by_us, created, updated, cursor";

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Job {
    /// The agency's job id.
    pub id: String,
    pub tenant_id: String,
    pub connection_id: Option<String>,
    pub protocol_type: ProtocolType,
    /// Id of the message, credential or proof row the job tracks.
    pub protocol_id: Option<String>,
    pub status: JobStatus,
    pub result: JobResult,
    pub initiated_by_us: bool,
    pub created: String,
    pub updated: String,
    #[serde(skip)]
    pub cursor: u64,
}

impl Job {
    pub fn is_complete(&self) -> bool {
        self.status == JobStatus::Complete
    }
}

impl Cursored for Job {
    fn cursor(&self) -> u64 {
        self.cursor
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateJobParams {
    pub id: String,
    pub tenant_id: String,
    pub connection_id: Option<String>,
    pub protocol_type: ProtocolType,
    pub protocol_id: Option<String>,
    pub status: JobStatus,
    pub result: JobResult,
    pub initiated_by_us: bool,
}

/// A state change for an existing job. `protocol_id` is only written when
/// given.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpdateJobParams {
    pub status: JobStatus,
    pub result: JobResult,
    pub protocol_id: Option<String>,
}

/// List and count filters for jobs.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct JobFilter {
    pub connection_id: Option<String>,
    /// `Some(true)` keeps only complete jobs, `Some(false)` only open ones.
    pub completed: Option<bool>,
}

impl JobFilter {
    fn predicates(&self, tenant_id: &str) -> Vec<Predicate> {
        let mut filters = vec![Predicate::eq("tenant_id", tenant_id)];
        if let Some(connection_id) = &self.connection_id {
            filters.push(Predicate::eq("connection_id", connection_id.as_str()));
        }
        match self.completed {
            Some(true) => filters.push(Predicate::eq("status", JobStatus::Complete.as_str())),
            Some(false) => filters.push(Predicate::ne("status", JobStatus::Complete.as_str())),
            None => {}
        }
        filters
    }
}

/// An incomplete proof job together with the proof it tracks.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpenProofJob {
    pub job: Job,
    pub proof: Proof,
}

/// Creates a job.
///
/// # Errors
///
/// `StoreError::Conflict` if the tenant already has a job with this id.
/// Job ids are scoped to the tenant, so other tenants' jobs never clash.
pub fn add_job(conn: &Connection, params: &CreateJobParams) -> Result<Job> {
    let exists: bool = conn.query_row(
        "SELECT EXISTS(SELECT 1 FROM jobs WHERE id = ?1 AND tenant_id = ?2)",
        params![params.id, params.tenant_id],
        |row| row.get(0),
    )?;
    if exists {
        return Err(StoreError::Conflict(format!(
            "job already exists: {}",
            params.id
        )));
    }

    let sql = format!(
        "INSERT INTO jobs (
            id, tenant_id, connection_id, protocol_type, protocol_id, status, result,
            initiated_by_us, cursor
        ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, {})
        RETURNING {COLUMNS}",
        next_cursor(TABLE)
    );
    let job = conn.query_row(
        &sql,
        params![
            params.id,
            params.tenant_id,
            params.connection_id,
            params.protocol_type.as_str(),
            params.protocol_id,
            params.status.as_str(),
            params.result.as_str(),
            params.initiated_by_us,
        ],
        map_row,
    )?;
    tracing::debug!(
        job_id = %job.id,
        tenant_id = %job.tenant_id,
        protocol = job.protocol_type.as_str(),
        status = job.status.as_str(),
        "job added"
    );
    Ok(job)
}

pub fn get_job(conn: &Connection, id: &str, tenant_id: &str) -> Result<Job> {
    conn.query_row(
        &format!("SELECT {COLUMNS} FROM jobs WHERE id = ?1 AND tenant_id = ?2"),
        params![id, tenant_id],
        map_row,
    )
    .optional()?
    .ok_or_else(|| StoreError::not_found("job", id))
}

/// Moves a job forward and returns it.
///
/// # Errors
///
/// `StoreError::NotFound` for an unknown job, `StoreError::Conflict` if the
/// new status is behind the stored one.
pub fn update_job(
    conn: &Connection,
    id: &str,
    tenant_id: &str,
    update: &UpdateJobParams,
) -> Result<Job> {
    let current = get_job(conn, id, tenant_id)?;
    if update.status < current.status {
        return Err(StoreError::Conflict(format!(
            "job {id} cannot move from {} to {}",
            current.status.as_str(),
            update.status.as_str()
        )));
    }

    let job = conn.query_row(
        &format!(
            "UPDATE jobs SET
                status = ?3,
                result = ?4,
                protocol_id = COALESCE(?5, protocol_id),
                updated = {NOW_SQL}
             WHERE id = ?1 AND tenant_id = ?2
             RETURNING {COLUMNS}"
        ),
        params![
            id,
            tenant_id,
            update.status.as_str(),
            update.result.as_str(),
            update.protocol_id,
        ],
        map_row,
    )?;
    tracing::debug!(
        job_id = id,
        tenant_id,
        status = job.status.as_str(),
        result = job.result.as_str(),
        "job updated"
    );
    Ok(job)
}

pub fn list_jobs(
    conn: &Connection,
    tenant_id: &str,
    filter: &JobFilter,
    batch: &BatchInfo,
) -> Result<Page<Job>> {
    query::page(
        conn,
        TABLE,
        COLUMNS,
        batch,
        filter.predicates(tenant_id),
        map_row,
    )
}

pub fn count_jobs(conn: &Connection, tenant_id: &str, filter: &JobFilter) -> Result<usize> {
    query::count(conn, TABLE, &QueryPlan::count(filter.predicates(tenant_id)))
}

/// Incomplete proof jobs in which the tenant is the prover and the proof
/// requests at least one of `attributes`, oldest first.
pub fn open_proof_jobs(
    conn: &Connection,
    tenant_id: &str,
    attributes: &[ProofAttribute],
) -> Result<Vec<OpenProofJob>> {
    if attributes.is_empty() {
        return Ok(Vec::new());
    }

    let mut stmt = conn.prepare(&format!(
        "SELECT {COLUMNS} FROM jobs
         WHERE tenant_id = ?1 AND protocol_type = ?2 AND status != ?3
           AND protocol_id IS NOT NULL
         ORDER BY cursor ASC"
    ))?;
    let rows = stmt.query_map(
        params![
            tenant_id,
            ProtocolType::Proof.as_str(),
            JobStatus::Complete.as_str()
        ],
        map_row,
    )?;

    let mut open = Vec::new();
    for row in rows {
        let job = row?;
        let Some(proof_id) = job.protocol_id.as_deref() else {
            continue;
        };
        let proof = proof::get_proof(conn, proof_id, tenant_id)?;
        let wanted = proof.attributes.iter().any(|requested| {
            attributes
                .iter()
                .any(|offered| requested.satisfied_by(&offered.cred_def_id, &offered.name))
        });
        if proof.role == vault_types::ProofRole::Prover && wanted {
            open.push(OpenProofJob { job, proof });
        }
    }
    Ok(open)
}

fn map_row(row: &Row<'_>) -> rusqlite::Result<Job> {
    Ok(Job {
        id: row.get(0)?,
        tenant_id: row.get(1)?,
        connection_id: row.get(2)?,
        protocol_type: parse_label(row, 3)?,
        protocol_id: row.get(4)?,
        status: parse_label(row, 5)?,
        result: parse_label(row, 6)?,
        initiated_by_us: row.get(7)?,
        created: row.get(8)?,
        updated: row.get(9)?,
        cursor: row.get(10)?,
    })
}
