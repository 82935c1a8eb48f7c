//! Applies one agency step to the store.
//!
//! Each function runs in its own `BEGIN IMMEDIATE` transaction: the job
//! lookup, the entity and job writes, and the event append either all land
//! or none do. Because SQLite admits one writer at a time, two
//! reconciliations of the same job cannot interleave their read and write.
//!
//! Functions return the events they appended, in order. An ignored
//! redelivery returns no events.

use rusqlite::{Connection, Transaction, TransactionBehavior};
use vault_store::{
    self as store, CreateConnectionParams, CreateCredentialParams, CreateEventParams,
    CreateJobParams, CreateMessageParams, CreateProofParams, Credential, Event, Job, OpenProofJob,
    Proof, UpdateCredentialParams, UpdateJobParams, UpdateProofParams,
};
use vault_types::{
    CredentialRole, JobInfo, JobResult, JobStatus, ProofAttribute, ProofRole, ProtocolType,
};

use crate::error::{Result, SyncError};
use crate::state::{ensure_protocol, plan, JobPhase, Step, Transition};

fn begin<'c>(conn: &'c mut Connection, job: &JobInfo) -> Result<Transaction<'c>> {
    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    store::get_tenant(&tx, &job.tenant_id)?;
    Ok(tx)
}

/// Loads the job, treating `NotFound` as "no job yet".
fn current_job(conn: &Connection, job: &JobInfo, protocol: ProtocolType) -> Result<Option<Job>> {
    match store::get_job(conn, &job.job_id, &job.tenant_id) {
        Ok(found) => {
            ensure_protocol(&found, protocol)?;
            Ok(Some(found))
        }
        Err(err) if err.is_not_found() => {
            tracing::debug!(
                job_id = %job.job_id,
                tenant_id = %job.tenant_id,
                protocol = protocol.as_str(),
                "no stored job for notification"
            );
            Ok(None)
        }
        Err(err) => Err(err.into()),
    }
}

fn connection_id(job: &JobInfo) -> Option<String> {
    (!job.connection_id.is_empty()).then(|| job.connection_id.clone())
}

/// Creates the job, or moves a pre-created one forward.
#[allow(clippy::too_many_arguments)]
fn open_job(
    conn: &Connection,
    job: &JobInfo,
    existing: Option<&Job>,
    protocol: ProtocolType,
    protocol_id: &str,
    status: JobStatus,
    result: JobResult,
    initiated_by_us: bool,
) -> Result<Job> {
    let stored = match existing {
        Some(_) => store::update_job(
            conn,
            &job.job_id,
            &job.tenant_id,
            &UpdateJobParams {
                status,
                result,
                protocol_id: Some(protocol_id.to_string()),
            },
        )?,
        None => store::add_job(
            conn,
            &CreateJobParams {
                id: job.job_id.clone(),
                tenant_id: job.tenant_id.clone(),
                connection_id: connection_id(job),
                protocol_type: protocol,
                protocol_id: Some(protocol_id.to_string()),
                status,
                result,
                initiated_by_us,
            },
        )?,
    };
    Ok(stored)
}

fn complete_job(conn: &Connection, job: &JobInfo, result: JobResult) -> Result<Job> {
    Ok(store::update_job(
        conn,
        &job.job_id,
        &job.tenant_id,
        &UpdateJobParams {
            status: JobStatus::Complete,
            result,
            protocol_id: None,
        },
    )?)
}

fn record_event(conn: &Connection, job: &JobInfo, description: String) -> Result<Event> {
    Ok(store::add_event(
        conn,
        &CreateEventParams {
            tenant_id: job.tenant_id.clone(),
            connection_id: connection_id(job),
            job_id: Some(job.job_id.clone()),
            description,
        },
    )?)
}

fn ignored(job: &JobInfo, step: &str) -> Vec<Event> {
    tracing::info!(
        job_id = %job.job_id,
        tenant_id = %job.tenant_id,
        step,
        "redelivered notification ignored"
    );
    Vec::new()
}

fn protocol_entity(existing: Option<Job>, job: &JobInfo) -> Result<String> {
    existing
        .and_then(|j| j.protocol_id)
        .ok_or_else(|| SyncError::MissingEntity(job.job_id.clone()))
}

/// Completes a pre-created connection job.
///
/// The job was created under the connection id when the invitation went out,
/// so it is looked up by `job.connection_id`, whatever run id the agency
/// reports.
pub fn connect(
    conn: &mut Connection,
    job: &JobInfo,
    params: &CreateConnectionParams,
) -> Result<Vec<Event>> {
    let job = &JobInfo {
        job_id: job.connection_id.clone(),
        ..job.clone()
    };
    let tx = begin(conn, job)?;
    let existing = current_job(&tx, job, ProtocolType::Connection)?;
    let transition = plan(
        &job.job_id,
        ProtocolType::Connection,
        JobPhase::of(existing.as_ref()),
        Step::Connect,
    )?;
    if transition != Transition::Establish {
        return Ok(ignored(job, "connection"));
    }

    let connection = store::add_connection(&tx, params)?;
    complete_job(&tx, job, JobResult::Success)?;
    let event = record_event(&tx, job, connection.description())?;
    tx.commit()?;

    tracing::info!(
        job_id = %job.job_id,
        tenant_id = %job.tenant_id,
        connection_id = %connection.id,
        "connection established"
    );
    Ok(vec![event])
}

/// Stores a message as a run that completes immediately.
pub fn deliver(
    conn: &mut Connection,
    job: &JobInfo,
    params: &CreateMessageParams,
) -> Result<Vec<Event>> {
    let tx = begin(conn, job)?;
    let existing = current_job(&tx, job, ProtocolType::Message)?;
    let transition = plan(
        &job.job_id,
        ProtocolType::Message,
        JobPhase::of(existing.as_ref()),
        Step::Deliver,
    )?;
    if transition != Transition::Deliver {
        return Ok(ignored(job, "message"));
    }

    let message = store::add_message(&tx, params)?;
    open_job(
        &tx,
        job,
        existing.as_ref(),
        ProtocolType::Message,
        &message.id,
        JobStatus::Complete,
        JobResult::Success,
        message.sent_by_me,
    )?;
    let event = record_event(&tx, job, message.description())?;
    tx.commit()?;

    tracing::info!(
        job_id = %job.job_id,
        tenant_id = %job.tenant_id,
        message_id = %message.id,
        "message stored"
    );
    Ok(vec![event])
}

fn record_credential_offer(
    conn: &Connection,
    job: &JobInfo,
    existing: Option<&Job>,
    params: &CreateCredentialParams,
) -> Result<(Credential, Event)> {
    let credential = store::add_credential(conn, params)?;
    open_job(
        conn,
        job,
        existing,
        ProtocolType::Credential,
        &credential.id,
        JobStatus::Pending,
        JobResult::None,
        credential.initiated_by_us,
    )?;
    let event = record_event(conn, job, credential.description())?;
    Ok((credential, event))
}

/// Starts a credential exchange.
pub fn offer_credential(
    conn: &mut Connection,
    job: &JobInfo,
    params: &CreateCredentialParams,
) -> Result<Vec<Event>> {
    let tx = begin(conn, job)?;
    let existing = current_job(&tx, job, ProtocolType::Credential)?;
    let transition = plan(
        &job.job_id,
        ProtocolType::Credential,
        JobPhase::of(existing.as_ref()),
        Step::Offer,
    )?;
    if transition != Transition::Offer {
        return Ok(ignored(job, "credential offer"));
    }

    let (credential, event) = record_credential_offer(&tx, job, existing.as_ref(), params)?;
    tx.commit()?;

    tracing::info!(
        job_id = %job.job_id,
        tenant_id = %job.tenant_id,
        credential_id = %credential.id,
        "credential offer stored"
    );
    Ok(vec![event])
}

/// Advances a credential exchange, synthesizing the offer from `offer` when
/// it was never reported.
pub fn update_credential(
    conn: &mut Connection,
    job: &JobInfo,
    offer: Option<&CreateCredentialParams>,
    update: &UpdateCredentialParams,
) -> Result<Vec<Event>> {
    let tx = begin(conn, job)?;
    let existing = current_job(&tx, job, ProtocolType::Credential)?;
    let transition = plan(
        &job.job_id,
        ProtocolType::Credential,
        JobPhase::of(existing.as_ref()),
        Step::Update {
            failed: update.failed.is_some(),
        },
    )?;

    let mut events = Vec::with_capacity(transition.event_count());
    let (credential_id, result) = match transition {
        Transition::Update(result) => (protocol_entity(existing, job)?, result),
        Transition::AutoAccept(result) => {
            let offer = offer.ok_or_else(|| SyncError::MissingPayload(job.job_id.clone()))?;
            tracing::info!(
                job_id = %job.job_id,
                tenant_id = %job.tenant_id,
                "credential auto-accepted, synthesizing offer"
            );
            let (credential, event) = record_credential_offer(&tx, job, existing.as_ref(), offer)?;
            events.push(event);
            (credential.id, result)
        }
        _ => return Ok(ignored(job, "credential update")),
    };

    let credential = store::update_credential(&tx, &credential_id, &job.tenant_id, update)?;
    complete_job(&tx, job, result)?;
    events.push(record_event(&tx, job, credential.description())?);
    tx.commit()?;

    tracing::info!(
        job_id = %job.job_id,
        tenant_id = %job.tenant_id,
        credential_id = %credential.id,
        result = result.as_str(),
        "credential updated"
    );

    if credential.role == CredentialRole::Holder && credential.issued.is_some() {
        match refresh_provable_proofs(conn, &credential) {
            Ok(stamped) if stamped > 0 => tracing::info!(
                tenant_id = %credential.tenant_id,
                stamped,
                "open proof requests became provable"
            ),
            Ok(_) => {}
            Err(err) => tracing::warn!(
                tenant_id = %credential.tenant_id,
                credential_id = %credential.id,
                error = %err,
                "failed to refresh open proof requests"
            ),
        }
    }

    Ok(events)
}

/// Stamps `provable` on open proof requests that the newly issued
/// `credential` completes. Returns how many were stamped.
fn refresh_provable_proofs(conn: &mut Connection, credential: &Credential) -> Result<usize> {
    let offered: Vec<ProofAttribute> = credential
        .attributes
        .iter()
        .map(|value| ProofAttribute {
            name: value.name.clone(),
            cred_def_id: credential.cred_def_id.clone(),
        })
        .collect();

    let tx = conn.transaction_with_behavior(TransactionBehavior::Immediate)?;
    let open = store::open_proof_jobs(&tx, &credential.tenant_id, &offered)?;

    let mut stamped = 0;
    for OpenProofJob { job, proof } in open {
        if proof.provable.is_some() {
            continue;
        }
        if provable_now(&tx, &credential.tenant_id, &proof.attributes)?.is_some() {
            store::update_proof(
                &tx,
                &proof.id,
                &credential.tenant_id,
                &UpdateProofParams {
                    provable: Some(store::timestamp::now()),
                    ..UpdateProofParams::default()
                },
            )?;
            tracing::debug!(job_id = %job.id, proof_id = %proof.id, "proof request provable");
            stamped += 1;
        }
    }
    tx.commit()?;
    Ok(stamped)
}

/// Returns the current time if the tenant's issued credentials satisfy
/// every attribute in `attributes`.
fn provable_now(
    conn: &Connection,
    tenant_id: &str,
    attributes: &[ProofAttribute],
) -> Result<Option<String>> {
    let held = store::search_credentials(conn, tenant_id, attributes)?;
    Ok(store::attributes_provable(attributes, &held).then(store::timestamp::now))
}

fn record_proof_offer(
    conn: &Connection,
    job: &JobInfo,
    existing: Option<&Job>,
    params: &CreateProofParams,
) -> Result<(Proof, Event)> {
    let mut params = params.clone();
    if params.role == ProofRole::Prover && params.provable.is_none() {
        params.provable = match provable_now(conn, &params.tenant_id, &params.attributes) {
            Ok(provable) => provable,
            Err(err) => {
                tracing::warn!(
                    job_id = %job.job_id,
                    error = %err,
                    "failed to check proof request against held credentials"
                );
                None
            }
        };
    }

    let proof = store::add_proof(conn, &params)?;
    open_job(
        conn,
        job,
        existing,
        ProtocolType::Proof,
        &proof.id,
        JobStatus::Pending,
        JobResult::None,
        proof.initiated_by_us,
    )?;
    let event = record_event(conn, job, proof.description())?;
    Ok((proof, event))
}

/// Starts a proof presentation.
pub fn offer_proof(
    conn: &mut Connection,
    job: &JobInfo,
    params: &CreateProofParams,
) -> Result<Vec<Event>> {
    let tx = begin(conn, job)?;
    let existing = current_job(&tx, job, ProtocolType::Proof)?;
    let transition = plan(
        &job.job_id,
        ProtocolType::Proof,
        JobPhase::of(existing.as_ref()),
        Step::Offer,
    )?;
    if transition != Transition::Offer {
        return Ok(ignored(job, "proof offer"));
    }

    let (proof, event) = record_proof_offer(&tx, job, existing.as_ref(), params)?;
    tx.commit()?;

    tracing::info!(
        job_id = %job.job_id,
        tenant_id = %job.tenant_id,
        proof_id = %proof.id,
        provable = proof.provable.is_some(),
        "proof request stored"
    );
    Ok(vec![event])
}

/// Advances a proof presentation, synthesizing the request from `offer`
/// when it was never reported.
pub fn update_proof(
    conn: &mut Connection,
    job: &JobInfo,
    offer: Option<&CreateProofParams>,
    update: &UpdateProofParams,
) -> Result<Vec<Event>> {
    let tx = begin(conn, job)?;
    let existing = current_job(&tx, job, ProtocolType::Proof)?;
    let transition = plan(
        &job.job_id,
        ProtocolType::Proof,
        JobPhase::of(existing.as_ref()),
        Step::Update {
            failed: update.failed.is_some(),
        },
    )?;

    let mut events = Vec::with_capacity(transition.event_count());
    let (proof_id, result) = match transition {
        Transition::Update(result) => (protocol_entity(existing, job)?, result),
        Transition::AutoAccept(result) => {
            let offer = offer.ok_or_else(|| SyncError::MissingPayload(job.job_id.clone()))?;
            tracing::info!(
                job_id = %job.job_id,
                tenant_id = %job.tenant_id,
                "proof auto-accepted, synthesizing request"
            );
            let (proof, event) = record_proof_offer(&tx, job, existing.as_ref(), offer)?;
            events.push(event);
            (proof.id, result)
        }
        _ => return Ok(ignored(job, "proof update")),
    };

    let proof = store::update_proof(&tx, &proof_id, &job.tenant_id, update)?;
    complete_job(&tx, job, result)?;
    events.push(record_event(&tx, job, proof.description())?);
    tx.commit()?;

    tracing::info!(
        job_id = %job.job_id,
        tenant_id = %job.tenant_id,
        proof_id = %proof.id,
        result = result.as_str(),
        "proof updated"
    );
    Ok(events)
}
