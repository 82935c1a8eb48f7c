//! Shared types for the Vault workspace.
//!
//! This crate holds the enumerations that describe protocol runs (protocol
//! type, job status, job result, participant roles), the attribute value
//! types carried by credentials and proofs, and the wire shapes reported by
//! the identity agency (see [`agency`]).
//!
//! Every other crate in the workspace depends on `vault-types` for these
//! definitions; it has no internal dependencies of its own.

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod agency;

pub use agency::{
    AgencyConnection, AgencyCredential, AgencyMessage, AgencyNotification, AgencyProof,
    CredentialUpdate, JobInfo, ProofUpdate,
};

/// Error returned when a stored or user-supplied label does not name a known
/// variant.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("unknown {kind}: {value}")]
pub struct ParseLabelError {
    /// The enumeration that was being parsed.
    pub kind: &'static str,
    /// The rejected input.
    pub value: String,
}

impl ParseLabelError {
    fn new(kind: &'static str, value: &str) -> Self {
        Self {
            kind,
            value: value.to_string(),
        }
    }
}

/// The protocol a job tracks.
///
/// A job's protocol type is fixed when the job is created.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProtocolType {
    /// Pairwise connection establishment.
    Connection,
    /// Basic message exchange.
    Message,
    /// Credential issuance.
    Credential,
    /// Proof presentation.
    Proof,
}

impl ProtocolType {
    /// Returns the canonical lowercase label stored in the database.
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Connection => "connection",
            Self::Message => "message",
            Self::Credential => "credential",
            Self::Proof => "proof",
        }
    }
}

impl std::str::FromStr for ProtocolType {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "connection" => Ok(Self::Connection),
            "message" => Ok(Self::Message),
            "credential" => Ok(Self::Credential),
            "proof" => Ok(Self::Proof),
            _ => Err(ParseLabelError::new("protocol type", s)),
        }
    }
}

/// Progress of a job. Ordered: a job never moves to an earlier status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobStatus {
    /// Created locally, waiting for the other party.
    Waiting,
    /// Protocol started, not yet finished.
    Pending,
    /// Protocol finished; see [`JobResult`].
    Complete,
}

impl JobStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Waiting => "waiting",
            Self::Pending => "pending",
            Self::Complete => "complete",
        }
    }
}

impl std::str::FromStr for JobStatus {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "waiting" => Ok(Self::Waiting),
            "pending" => Ok(Self::Pending),
            "complete" => Ok(Self::Complete),
            _ => Err(ParseLabelError::new("job status", s)),
        }
    }
}

/// Outcome of a job. Only meaningful once the job is complete.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum JobResult {
    None,
    Success,
    Failure,
}

impl JobResult {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::None => "none",
            Self::Success => "success",
            Self::Failure => "failure",
        }
    }
}

impl std::str::FromStr for JobResult {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "none" => Ok(Self::None),
            "success" => Ok(Self::Success),
            "failure" => Ok(Self::Failure),
            _ => Err(ParseLabelError::new("job result", s)),
        }
    }
}

/// Our side of a credential exchange.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CredentialRole {
    Issuer,
    Holder,
}

impl CredentialRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Issuer => "issuer",
            Self::Holder => "holder",
        }
    }
}

impl std::str::FromStr for CredentialRole {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "issuer" => Ok(Self::Issuer),
            "holder" => Ok(Self::Holder),
            _ => Err(ParseLabelError::new("credential role", s)),
        }
    }
}

/// Our side of a proof presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ProofRole {
    Verifier,
    Prover,
}

impl ProofRole {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Verifier => "verifier",
            Self::Prover => "prover",
        }
    }
}

impl std::str::FromStr for ProofRole {
    type Err = ParseLabelError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "verifier" => Ok(Self::Verifier),
            "prover" => Ok(Self::Prover),
            _ => Err(ParseLabelError::new("proof role", s)),
        }
    }
}

/// A single named attribute value of a credential.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CredentialValue {
    pub name: String,
    pub value: String,
}

/// An attribute requested in a proof, bound to a credential definition.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProofAttribute {
    pub name: String,
    /// Credential definition the attribute must come from. Empty matches any.
    #[serde(default)]
    pub cred_def_id: String,
}

impl ProofAttribute {
    /// Returns `true` if a credential with `cred_def_id` carrying an attribute
    /// called `name` can satisfy this requested attribute.
    pub fn satisfied_by(&self, cred_def_id: &str, name: &str) -> bool {
        self.name == name && (self.cred_def_id.is_empty() || self.cred_def_id == cred_def_id)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn protocol_type_labels_parse_back() {
        for protocol in [
            ProtocolType::Connection,
            ProtocolType::Message,
            ProtocolType::Credential,
            ProtocolType::Proof,
        ] {
            assert_eq!(protocol.as_str().parse::<ProtocolType>(), Ok(protocol));
        }
    }

    #[test]
    fn unknown_label_is_rejected() {
        let err = "basic_message".parse::<ProtocolType>().unwrap_err();
        assert_eq!(err.kind, "protocol type");
        assert_eq!(err.to_string(), "unknown protocol type: basic_message");
        assert!("done".parse::<JobStatus>().is_err());
        assert!("ok".parse::<JobResult>().is_err());
    }

    #[test]
    fn job_status_only_orders_forward() {
        assert!(JobStatus::Waiting < JobStatus::Pending);
        assert!(JobStatus::Pending < JobStatus::Complete);
    }

    #[test]
    fn enums_serialize_lowercase() {
        assert_eq!(
            serde_json::to_string(&JobStatus::Complete).unwrap(),
            "\"complete\""
        );
        assert_eq!(
            serde_json::to_string(&CredentialRole::Holder).unwrap(),
            "\"holder\""
        );
    }

    #[test]
    fn proof_attribute_matching() {
        let attr = ProofAttribute {
            name: "email".to_string(),
            cred_def_id: "def-1".to_string(),
        };
        assert!(attr.satisfied_by("def-1", "email"));
        assert!(!attr.satisfied_by("def-2", "email"));
        assert!(!attr.satisfied_by("def-1", "name"));

        let any = ProofAttribute {
            name: "email".to_string(),
            cred_def_id: String::new(),
        };
        assert!(any.satisfied_by("def-9", "email"));
    }
}
