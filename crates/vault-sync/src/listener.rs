//! Translates agency notifications into reconciliation calls.
//!
//! The listener holds no state of its own. Each method maps the agency's
//! wire fields onto store parameters and forwards to the [`Updater`];
//! credential and proof notifications are offers unless they carry an
//! update payload.

use vault_store::{
    timestamp, CreateConnectionParams, CreateCredentialParams, CreateMessageParams,
    CreateProofParams, Event, UpdateCredentialParams, UpdateProofParams,
};
use vault_types::{
    AgencyConnection, AgencyCredential, AgencyMessage, AgencyNotification, AgencyProof,
    CredentialUpdate, JobInfo, ProofUpdate,
};

use crate::error::{Result, SyncError};
use crate::updater::Updater;

/// Agency callback surface.
#[derive(Clone)]
pub struct Listener {
    updater: Updater,
}

/// Converts an agency timestamp. Values chrono cannot represent are stamped
/// with the current time so that the step itself is not lost.
fn stamp(ms: Option<i64>) -> Option<String> {
    ms.map(|ms| timestamp::from_millis(ms).unwrap_or_else(timestamp::now))
}

fn credential_params(job: &JobInfo, credential: AgencyCredential) -> CreateCredentialParams {
    CreateCredentialParams {
        tenant_id: job.tenant_id.clone(),
        connection_id: job.connection_id.clone(),
        role: credential.role,
        schema_id: credential.schema_id,
        cred_def_id: credential.cred_def_id,
        attributes: credential.attributes,
        initiated_by_us: credential.initiated_by_us,
    }
}

fn credential_update(update: &CredentialUpdate) -> UpdateCredentialParams {
    UpdateCredentialParams {
        approved: stamp(update.approved_ms),
        issued: stamp(update.issued_ms),
        failed: stamp(update.failed_ms),
    }
}

fn proof_params(job: &JobInfo, proof: AgencyProof) -> CreateProofParams {
    CreateProofParams {
        tenant_id: job.tenant_id.clone(),
        connection_id: job.connection_id.clone(),
        role: proof.role,
        attributes: proof.attributes,
        initiated_by_us: proof.initiated_by_us,
        provable: None,
    }
}

fn proof_update(update: &ProofUpdate) -> UpdateProofParams {
    UpdateProofParams {
        provable: None,
        approved: stamp(update.approved_ms),
        verified: stamp(update.verified_ms),
        failed: stamp(update.failed_ms),
    }
}

impl Listener {
    pub fn new(updater: Updater) -> Self {
        Self { updater }
    }

    pub fn updater(&self) -> &Updater {
        &self.updater
    }

    /// Routes any notification to its handler.
    pub async fn dispatch(&self, notification: AgencyNotification) -> Result<Vec<Event>> {
        match notification {
            AgencyNotification::Connection { job, connection } => {
                self.add_connection(job, connection).await
            }
            AgencyNotification::Message { job, message } => self.add_message(job, message).await,
            AgencyNotification::Credential {
                job,
                credential,
                update: Some(update),
            } => self.update_credential(job, credential, update).await,
            AgencyNotification::Credential {
                job,
                credential: Some(credential),
                update: None,
            } => self.add_credential(job, credential).await,
            AgencyNotification::Proof {
                job,
                proof,
                update: Some(update),
            } => self.update_proof(job, proof, update).await,
            AgencyNotification::Proof {
                job,
                proof: Some(proof),
                update: None,
            } => self.add_proof(job, proof).await,
            AgencyNotification::Credential { job, .. } | AgencyNotification::Proof { job, .. } => {
                Err(SyncError::MissingPayload(job.job_id))
            }
        }
    }

    pub async fn add_connection(
        &self,
        job: JobInfo,
        connection: AgencyConnection,
    ) -> Result<Vec<Event>> {
        let params = CreateConnectionParams {
            id: job.connection_id.clone(),
            tenant_id: job.tenant_id.clone(),
            our_did: connection.our_did,
            their_did: connection.their_did,
            their_endpoint: connection.their_endpoint,
            their_label: connection.their_label,
            invited: connection.invited,
            approved: Some(timestamp::now()),
        };
        self.updater.add_connection(job, params).await
    }

    pub async fn add_message(&self, job: JobInfo, message: AgencyMessage) -> Result<Vec<Event>> {
        let params = CreateMessageParams {
            tenant_id: job.tenant_id.clone(),
            connection_id: job.connection_id.clone(),
            message: message.message,
            sent_by_me: message.sent_by_me,
        };
        self.updater.add_message(job, params).await
    }

    pub async fn add_credential(
        &self,
        job: JobInfo,
        credential: AgencyCredential,
    ) -> Result<Vec<Event>> {
        let params = credential_params(&job, credential);
        self.updater.add_credential(job, params).await
    }

    pub async fn update_credential(
        &self,
        job: JobInfo,
        credential: Option<AgencyCredential>,
        update: CredentialUpdate,
    ) -> Result<Vec<Event>> {
        let offer = credential.map(|c| credential_params(&job, c));
        self.updater
            .update_credential(job, offer, credential_update(&update))
            .await
    }

    pub async fn add_proof(&self, job: JobInfo, proof: AgencyProof) -> Result<Vec<Event>> {
        let params = proof_params(&job, proof);
        self.updater.add_proof(job, params).await
    }

    pub async fn update_proof(
        &self,
        job: JobInfo,
        proof: Option<AgencyProof>,
        update: ProofUpdate,
    ) -> Result<Vec<Event>> {
        let offer = proof.map(|p| proof_params(&job, p));
        self.updater
            .update_proof(job, offer, proof_update(&update))
            .await
    }
}
