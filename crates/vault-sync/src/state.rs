//! The job state machine.
//!
//! Each agency notification is classified as a [`Step`], the stored job as a
//! [`JobPhase`], and [`plan`] picks the [`Transition`] to apply. Every
//! transition except [`Transition::Ignore`] appends at least one event;
//! [`Transition::AutoAccept`] appends two.
//!
//! ```text
//!             offer              update
//!   absent --------> pending ----------> complete
//!     |                                     ^
//!     +------------- auto-accept -----------+
//! ```
//!
//! Connection jobs are created ahead of time in `waiting` and complete in a
//! single step. Message runs go straight from absent to complete.

use vault_store::Job;
use vault_types::{JobResult, JobStatus, ProtocolType};

use crate::error::{Result, SyncError};

/// Where a protocol run currently stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JobPhase {
    Absent,
    Waiting,
    Pending,
    Complete(JobResult),
}

impl JobPhase {
    pub fn of(job: Option<&Job>) -> Self {
        match job {
            None => Self::Absent,
            Some(job) => match job.status {
                JobStatus::Waiting => Self::Waiting,
                JobStatus::Pending => Self::Pending,
                JobStatus::Complete => Self::Complete(job.result),
            },
        }
    }
}

/// What the agency reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Step {
    /// A connection was established.
    Connect,
    /// A message was sent or received.
    Deliver,
    /// A credential or proof exchange started.
    Offer,
    /// A credential or proof exchange progressed.
    Update { failed: bool },
}

/// The change to apply for a [`Step`] in a [`JobPhase`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transition {
    /// waiting → complete/success, creating the connection.
    Establish,
    /// absent → complete/success, creating the message.
    Deliver,
    /// absent (or waiting) → pending/none, creating the protocol entity.
    Offer,
    /// pending → complete, updating the protocol entity.
    Update(JobResult),
    /// absent (or waiting) → pending → complete: the offer was never
    /// reported, so it is synthesized before the update is applied.
    AutoAccept(JobResult),
    /// Redelivery of a step already applied. Nothing is written.
    Ignore,
}

impl Transition {
    /// Number of events the transition appends.
    pub fn event_count(self) -> usize {
        match self {
            Self::Ignore => 0,
            Self::AutoAccept(_) => 2,
            _ => 1,
        }
    }
}

fn update_result(failed: bool) -> JobResult {
    if failed {
        JobResult::Failure
    } else {
        JobResult::Success
    }
}

/// Chooses the transition for `step` on a `protocol` run in `phase`.
///
/// # Errors
///
/// `SyncError::Store(NotFound)` for a connection step with no pre-created
/// job.
pub fn plan(
    job_id: &str,
    protocol: ProtocolType,
    phase: JobPhase,
    step: Step,
) -> Result<Transition> {
    let transition = match (step, phase) {
        (Step::Connect, JobPhase::Absent) => {
            return Err(SyncError::Store(vault_store::StoreError::NotFound {
                entity: "job",
                id: job_id.to_string(),
            }))
        }
        (Step::Connect, JobPhase::Waiting | JobPhase::Pending) => Transition::Establish,
        (Step::Deliver, JobPhase::Absent | JobPhase::Waiting) => Transition::Deliver,
        (Step::Offer, JobPhase::Absent | JobPhase::Waiting) => Transition::Offer,
        (Step::Update { failed }, JobPhase::Absent | JobPhase::Waiting) => {
            Transition::AutoAccept(update_result(failed))
        }
        (Step::Update { failed }, JobPhase::Pending) => Transition::Update(update_result(failed)),
        (Step::Connect | Step::Deliver, JobPhase::Complete(_))
        | (Step::Deliver | Step::Offer, JobPhase::Pending)
        | (Step::Offer | Step::Update { .. }, JobPhase::Complete(_)) => Transition::Ignore,
    };
    tracing::trace!(
        job_id,
        protocol = protocol.as_str(),
        ?phase,
        ?step,
        ?transition,
        "planned transition"
    );
    Ok(transition)
}

/// Fails unless `job` tracks `expected`.
pub(crate) fn ensure_protocol(job: &Job, expected: ProtocolType) -> Result<()> {
    if job.protocol_type == expected {
        Ok(())
    } else {
        Err(SyncError::ProtocolMismatch {
            job_id: job.id.clone(),
            expected: expected.as_str(),
            found: job.protocol_type.as_str(),
        })
    }
}
