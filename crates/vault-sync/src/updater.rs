//! Async entry point for reconciliation.
//!
//! The [`Updater`] checks a connection out of the pool, runs the blocking
//! reconciliation on the blocking thread pool, and once the transaction has
//! committed publishes the appended events to the subscriber registry.

use rusqlite::Connection;
use vault_db::DbPool;
use vault_store::{
    CreateConnectionParams, CreateCredentialParams, CreateMessageParams, CreateProofParams, Event,
    UpdateCredentialParams, UpdateProofParams,
};
use vault_types::JobInfo;

use crate::error::Result;
use crate::reconcile;
use crate::subscribers::SubscriberRegistry;

/// Applies agency steps to the store and fans out the resulting events.
#[derive(Clone)]
pub struct Updater {
    pool: DbPool,
    subscribers: SubscriberRegistry,
}

impl Updater {
    pub fn new(pool: DbPool, subscribers: SubscriberRegistry) -> Self {
        Self { pool, subscribers }
    }

    pub fn pool(&self) -> &DbPool {
        &self.pool
    }

    pub fn subscribers(&self) -> &SubscriberRegistry {
        &self.subscribers
    }

    async fn run<F>(&self, job: &JobInfo, apply: F) -> Result<Vec<Event>>
    where
        F: FnOnce(&mut Connection) -> Result<Vec<Event>> + Send + 'static,
    {
        let pool = self.pool.clone();
        let outcome = tokio::task::spawn_blocking(move || {
            let mut conn = pool.get()?;
            apply(&mut *conn)
        })
        .await?;

        let events = match outcome {
            Ok(events) => events,
            Err(err) if err.is_not_found() => {
                tracing::debug!(
                    job_id = %job.job_id,
                    tenant_id = %job.tenant_id,
                    error = %err,
                    "notification refers to unknown data"
                );
                return Err(err);
            }
            Err(err) => {
                tracing::error!(
                    job_id = %job.job_id,
                    tenant_id = %job.tenant_id,
                    error = %err,
                    "reconciliation failed"
                );
                return Err(err);
            }
        };

        for event in &events {
            self.subscribers.notify(event);
        }
        Ok(events)
    }

    /// Completes the pre-created connection job `job`.
    pub async fn add_connection(
        &self,
        job: JobInfo,
        params: CreateConnectionParams,
    ) -> Result<Vec<Event>> {
        let info = job.clone();
        self.run(&info, move |conn| reconcile::connect(conn, &job, &params))
            .await
    }

    pub async fn add_message(
        &self,
        job: JobInfo,
        params: CreateMessageParams,
    ) -> Result<Vec<Event>> {
        let info = job.clone();
        self.run(&info, move |conn| reconcile::deliver(conn, &job, &params))
            .await
    }

    pub async fn add_credential(
        &self,
        job: JobInfo,
        params: CreateCredentialParams,
    ) -> Result<Vec<Event>> {
        let info = job.clone();
        self.run(&info, move |conn| {
            reconcile::offer_credential(conn, &job, &params)
        })
        .await
    }

    /// Advances a credential exchange. `offer` is used only when the offer
    /// was never reported.
    pub async fn update_credential(
        &self,
        job: JobInfo,
        offer: Option<CreateCredentialParams>,
        update: UpdateCredentialParams,
    ) -> Result<Vec<Event>> {
        let info = job.clone();
        self.run(&info, move |conn| {
            reconcile::update_credential(conn, &job, offer.as_ref(), &update)
        })
        .await
    }

    pub async fn add_proof(&self, job: JobInfo, params: CreateProofParams) -> Result<Vec<Event>> {
        let info = job.clone();
        self.run(&info, move |conn| reconcile::offer_proof(conn, &job, &params))
            .await
    }

    /// Advances a proof presentation. `offer` is used only when the request
    /// was never reported.
    pub async fn update_proof(
        &self,
        job: JobInfo,
        offer: Option<CreateProofParams>,
        update: UpdateProofParams,
    ) -> Result<Vec<Event>> {
        let info = job.clone();
        self.run(&info, move |conn| {
            reconcile::update_proof(conn, &job, offer.as_ref(), &update)
        })
        .await
    }
}
