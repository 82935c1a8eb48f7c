//! Entity store and cursor paginator for the Vault.
//!
//! Every entity is tenant scoped: reads, updates, lists and counts all take
//! the tenant id and filter on it, so one tenant can never observe another's
//! rows. Functions operate on a borrowed [`rusqlite::Connection`]; callers
//! that need several writes to land together run them inside one
//! transaction (the sync layer uses `BEGIN IMMEDIATE`).
//!
//! # Pagination
//!
//! Paginated tables share a store-assigned `cursor` column. A page request
//! ([`BatchInfo`]) is shaped into a [`QueryPlan`] (filters, order, limit)
//! and rendered to SQL by the private `query` module. List and count
//! functions build their plans from the same filters so totals agree with
//! pages.
//!
//! ```rust,ignore
//! use vault_store::{list_events, BatchInfo};
//!
//! let first = list_events(&conn, tenant_id, None, &BatchInfo::head(2))?;
//! let last = first.items.last().map(|e| e.cursor).unwrap_or_default();
//! let next = list_events(&conn, tenant_id, None, &BatchInfo::head(2).after(last))?;
//! ```

mod connection;
mod credential;
mod error;
mod event;
mod job;
mod message;
mod paginator;
mod proof;
mod query;
mod tenant;
pub mod timestamp;

pub use connection::{
    add_connection, count_connections, get_connection, list_connections, Connection,
    CreateConnectionParams,
};
pub use credential::{
    add_credential, count_credentials, get_credential, list_credentials, search_credentials,
    update_credential, CreateCredentialParams, Credential, UpdateCredentialParams,
};
pub use error::{Result, StoreError};
pub use event::{
    add_event, connection_for_event, count_events, get_event, job_for_event, list_events,
    mark_event_read, CreateEventParams, Event,
};
pub use job::{
    add_job, count_jobs, get_job, list_jobs, open_proof_jobs, update_job, CreateJobParams, Job,
    JobFilter, OpenProofJob, UpdateJobParams,
};
pub use message::{
    add_message, count_messages, get_message, list_messages, CreateMessageParams, Message,
};
pub use paginator::{
    decode_cursor, encode_cursor, BatchInfo, Comparison, CursorKind, Cursored, FilterValue,
    Page, PageArgs, Predicate, QueryPlan, SortOrder, DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE,
};
pub use proof::{
    add_proof, attributes_provable, count_proofs, get_proof, list_proofs, update_proof,
    CreateProofParams, Proof, UpdateProofParams,
};
pub use tenant::{add_tenant, get_tenant, tenant_for_agent, Tenant};

#[cfg(test)]
mod tests;
