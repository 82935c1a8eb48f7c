//! Notification shapes reported by the identity agency.
//!
//! The agency drives protocol runs on behalf of a tenant and reports each
//! observable step. Every notification carries a [`JobInfo`] that names the
//! protocol run (job), the tenant and the pairwise connection involved.

use serde::{Deserialize, Serialize};

use crate::{CredentialRole, CredentialValue, ProofAttribute, ProofRole};

/// Identifies the protocol run a notification belongs to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct JobInfo {
    pub job_id: String,
    pub tenant_id: String,
    pub connection_id: String,
}

/// A newly established pairwise connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgencyConnection {
    pub our_did: String,
    pub their_did: String,
    pub their_endpoint: String,
    pub their_label: String,
    /// `true` when the other party accepted our invitation.
    #[serde(default)]
    pub invited: bool,
}

/// A basic message sent or received over a connection.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgencyMessage {
    pub message: String,
    #[serde(default)]
    pub sent_by_me: bool,
}

/// A credential offer (holder) or proposal (issuer).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgencyCredential {
    pub role: CredentialRole,
    pub schema_id: String,
    pub cred_def_id: String,
    #[serde(default)]
    pub attributes: Vec<CredentialValue>,
    #[serde(default)]
    pub initiated_by_us: bool,
}

/// Progress of a credential exchange. Timestamps are Unix milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CredentialUpdate {
    pub approved_ms: Option<i64>,
    pub issued_ms: Option<i64>,
    pub failed_ms: Option<i64>,
}

/// A proof request (prover) or proposal (verifier).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AgencyProof {
    pub role: ProofRole,
    #[serde(default)]
    pub attributes: Vec<ProofAttribute>,
    #[serde(default)]
    pub initiated_by_us: bool,
}

/// Progress of a proof presentation. Timestamps are Unix milliseconds.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofUpdate {
    pub approved_ms: Option<i64>,
    pub verified_ms: Option<i64>,
    pub failed_ms: Option<i64>,
}

/// Any notification the agency can deliver, tagged by `type`.
///
/// Credential and proof notifications are offers when `update` is absent
/// and updates when it is present. An update may omit the offer payload
/// only when the offer has already been reported.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum AgencyNotification {
    Connection {
        job: JobInfo,
        connection: AgencyConnection,
    },
    Message {
        job: JobInfo,
        message: AgencyMessage,
    },
    Credential {
        job: JobInfo,
        #[serde(default)]
        credential: Option<AgencyCredential>,
        #[serde(default)]
        update: Option<CredentialUpdate>,
    },
    Proof {
        job: JobInfo,
        #[serde(default)]
        proof: Option<AgencyProof>,
        #[serde(default)]
        update: Option<ProofUpdate>,
    },
}

impl AgencyNotification {
    /// The job the notification refers to.
    pub fn job(&self) -> &JobInfo {
        match self {
            Self::Connection { job, .. }
            | Self::Message { job, .. }
            | Self::Credential { job, .. }
            | Self::Proof { job, .. } => job,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_update_notification_parses_without_offer() {
        let json = r#"{
            "type": "credential",
            "job": { "jobId": "j1", "tenantId": "t1", "connectionId": "c1" },
            "update": { "approvedMs": 1700000000000 }
        }"#;

        let parsed: AgencyNotification = serde_json::from_str(json).unwrap();
        match parsed {
            AgencyNotification::Credential {
                job,
                credential,
                update,
            } => {
                assert_eq!(job.job_id, "j1");
                assert!(credential.is_none());
                let update = update.expect("update payload");
                assert_eq!(update.approved_ms, Some(1_700_000_000_000));
                assert_eq!(update.issued_ms, None);
            }
            other => panic!("unexpected notification: {other:?}"),
        }
    }

    #[test]
    fn proof_request_parses_attributes() {
        let json = r#"{
            "type": "proof",
            "job": { "jobId": "j2", "tenantId": "t1", "connectionId": "c1" },
            "proof": {
                "role": "prover",
                "attributes": [{ "name": "email", "credDefId": "def-1" }]
            }
        }"#;

        let parsed: AgencyNotification = serde_json::from_str(json).unwrap();
        assert_eq!(parsed.job().job_id, "j2");
        match parsed {
            AgencyNotification::Proof { proof, update, .. } => {
                let proof = proof.expect("proof payload");
                assert_eq!(proof.role, ProofRole::Prover);
                assert_eq!(proof.attributes[0].cred_def_id, "def-1");
                assert!(!proof.initiated_by_us);
                assert!(update.is_none());
            }
            other => panic!("unexpected notification: {other:?}"),
        }
    }
}
