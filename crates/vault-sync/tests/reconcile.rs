use tempfile::TempDir;
use vault_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use vault_store::{
    add_job, add_tenant, count_events, count_jobs, get_job, list_credentials, list_events,
    list_proofs, BatchInfo, CreateJobParams, Event, JobFilter,
};
use vault_sync::{Listener, SubscriberRegistry, SyncError, Updater};
use vault_types::{
    AgencyConnection, AgencyCredential, AgencyMessage, AgencyNotification, AgencyProof,
    CredentialRole, CredentialUpdate, CredentialValue, JobInfo, JobResult, JobStatus,
    ProofAttribute, ProofRole, ProofUpdate, ProtocolType,
};

struct Harness {
    _dir: TempDir,
    pool: DbPool,
    registry: SubscriberRegistry,
    listener: Listener,
    tenant_id: String,
}

fn harness() -> Harness {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("vault.db");
    let pool = create_pool(path.to_str().unwrap(), DbRuntimeSettings::default())
        .expect("failed to create pool");
    let tenant_id = {
        let conn = pool.get().expect("failed to get connection");
        run_migrations(&conn).expect("failed to run migrations");
        add_tenant(&conn, "agent-1", "Alice")
            .expect("failed to add tenant")
            .id
    };
    let registry = SubscriberRegistry::new(16);
    let listener = Listener::new(Updater::new(pool.clone(), registry.clone()));
    Harness {
        _dir: dir,
        pool,
        registry,
        listener,
        tenant_id,
    }
}

impl Harness {
    fn job(&self, job_id: &str, connection_id: &str) -> JobInfo {
        JobInfo {
            job_id: job_id.to_string(),
            tenant_id: self.tenant_id.clone(),
            connection_id: connection_id.to_string(),
        }
    }

    fn events(&self) -> Vec<Event> {
        let conn = self.pool.get().unwrap();
        list_events(&conn, &self.tenant_id, None, &BatchInfo::head(100))
            .unwrap()
            .items
    }

    fn descriptions(&self) -> Vec<String> {
        self.events().into_iter().map(|e| e.description).collect()
    }

    fn job_state(&self, job_id: &str) -> (JobStatus, JobResult) {
        let conn = self.pool.get().unwrap();
        let job = get_job(&conn, job_id, &self.tenant_id).unwrap();
        (job.status, job.result)
    }

    fn precreate_connection_job(&self, connection_id: &str) {
        let conn = self.pool.get().unwrap();
        add_job(
            &conn,
            &CreateJobParams {
                id: connection_id.to_string(),
                tenant_id: self.tenant_id.clone(),
                connection_id: Some(connection_id.to_string()),
                protocol_type: ProtocolType::Connection,
                protocol_id: None,
                status: JobStatus::Waiting,
                result: JobResult::None,
                initiated_by_us: true,
            },
        )
        .unwrap();
    }
}

fn agency_connection(label: &str) -> AgencyConnection {
    AgencyConnection {
        our_did: "did:our".to_string(),
        their_did: "did:their".to_string(),
        their_endpoint: "http://agency.example".to_string(),
        their_label: label.to_string(),
        invited: false,
    }
}

fn email_credential() -> AgencyCredential {
    AgencyCredential {
        role: CredentialRole::Holder,
        schema_id: "schema-1".to_string(),
        cred_def_id: "def-1".to_string(),
        attributes: vec![CredentialValue {
            name: "email".to_string(),
            value: "alice@example.com".to_string(),
        }],
        initiated_by_us: false,
    }
}

fn issued() -> CredentialUpdate {
    CredentialUpdate {
        approved_ms: Some(1_700_000_000_000),
        issued_ms: Some(1_700_000_001_000),
        failed_ms: None,
    }
}

fn email_request() -> AgencyProof {
    AgencyProof {
        role: ProofRole::Prover,
        attributes: vec![ProofAttribute {
            name: "email".to_string(),
            cred_def_id: "def-1".to_string(),
        }],
        initiated_by_us: false,
    }
}

#[tokio::test]
async fn connection_without_pre_created_job_writes_nothing() {
    let h = harness();
    let err = h
        .listener
        .add_connection(h.job("c1", "c1"), agency_connection("Bob"))
        .await
        .unwrap_err();
    assert!(err.is_not_found(), "{err}");
    assert!(h.events().is_empty());
    let conn = h.pool.get().unwrap();
    assert_eq!(count_jobs(&conn, &h.tenant_id, &JobFilter::default()).unwrap(), 0);
}

#[tokio::test]
async fn connection_completes_waiting_job_and_notifies() {
    let h = harness();
    h.precreate_connection_job("c1");
    let mut sub = h.registry.subscribe(&h.tenant_id);

    let events = h
        .listener
        .add_connection(h.job("c1", "c1"), agency_connection("Bob"))
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].description, "Established connection to Bob");
    assert_eq!(events[0].connection_id.as_deref(), Some("c1"));
    assert_eq!(h.job_state("c1"), (JobStatus::Complete, JobResult::Success));

    let pushed = sub.recv().await.expect("subscriber should receive event");
    assert_eq!(pushed, events[0]);

    // Redelivery is ignored.
    let again = h
        .listener
        .add_connection(h.job("c1", "c1"), agency_connection("Bob"))
        .await
        .unwrap();
    assert!(again.is_empty());
    assert_eq!(h.events().len(), 1);
}

#[tokio::test]
async fn connection_job_is_found_by_connection_id() {
    let h = harness();
    h.precreate_connection_job("c1");

    let events = h
        .listener
        .add_connection(h.job("j1", "c1"), agency_connection("Bob"))
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].description, "Established connection to Bob");
    assert_eq!(events[0].connection_id.as_deref(), Some("c1"));
    assert_eq!(events[0].job_id.as_deref(), Some("c1"));
    assert_eq!(h.job_state("c1"), (JobStatus::Complete, JobResult::Success));

    let conn = h.pool.get().unwrap();
    assert!(get_job(&conn, "j1", &h.tenant_id).unwrap_err().is_not_found());
    assert_eq!(count_jobs(&conn, &h.tenant_id, &JobFilter::default()).unwrap(), 1);
}

#[tokio::test]
async fn message_is_a_single_complete_step() {
    let h = harness();
    let events = h
        .listener
        .dispatch(AgencyNotification::Message {
            job: h.job("m1", "c1"),
            message: AgencyMessage {
                message: "hello".to_string(),
                sent_by_me: false,
            },
        })
        .await
        .unwrap();

    assert_eq!(events.len(), 1);
    assert_eq!(events[0].description, "Received message: hello");
    assert_eq!(events[0].job_id.as_deref(), Some("m1"));
    assert_eq!(h.job_state("m1"), (JobStatus::Complete, JobResult::Success));
}

#[tokio::test]
async fn explicit_and_auto_accepted_credentials_emit_the_same_events() {
    let explicit = harness();
    explicit
        .listener
        .add_credential(explicit.job("j1", "c1"), email_credential())
        .await
        .unwrap();
    assert_eq!(
        explicit.job_state("j1"),
        (JobStatus::Pending, JobResult::None)
    );
    explicit
        .listener
        .update_credential(explicit.job("j1", "c1"), None, issued())
        .await
        .unwrap();

    let auto = harness();
    let events = auto
        .listener
        .update_credential(auto.job("j1", "c1"), Some(email_credential()), issued())
        .await
        .unwrap();
    assert_eq!(events.len(), 2);
    assert!(events[0].cursor < events[1].cursor);

    let expected = vec![
        "Received credential offer def-1".to_string(),
        "Received credential def-1".to_string(),
    ];
    assert_eq!(explicit.descriptions(), expected);
    assert_eq!(auto.descriptions(), expected);

    for h in [&explicit, &auto] {
        assert_eq!(h.job_state("j1"), (JobStatus::Complete, JobResult::Success));
        let conn = h.pool.get().unwrap();
        let credentials = list_credentials(&conn, &h.tenant_id, None, &BatchInfo::head(10))
            .unwrap()
            .items;
        assert_eq!(credentials.len(), 1);
        assert!(credentials[0].issued.is_some());
        assert!(credentials[0].approved.is_some());
    }
}

#[tokio::test]
async fn redelivered_credential_steps_emit_nothing() {
    let h = harness();
    let job = h.job("j1", "c1");
    h.listener
        .add_credential(job.clone(), email_credential())
        .await
        .unwrap();
    assert!(h
        .listener
        .add_credential(job.clone(), email_credential())
        .await
        .unwrap()
        .is_empty());

    h.listener
        .update_credential(job.clone(), None, issued())
        .await
        .unwrap();
    assert!(h
        .listener
        .update_credential(job.clone(), Some(email_credential()), issued())
        .await
        .unwrap()
        .is_empty());
    assert!(h
        .listener
        .add_credential(job, email_credential())
        .await
        .unwrap()
        .is_empty());

    assert_eq!(h.events().len(), 2);
}

#[tokio::test]
async fn failed_update_completes_with_failure() {
    let h = harness();
    h.listener
        .add_credential(h.job("j1", "c1"), email_credential())
        .await
        .unwrap();
    let events = h
        .listener
        .update_credential(
            h.job("j1", "c1"),
            None,
            CredentialUpdate {
                failed_ms: Some(1_700_000_000_000),
                ..CredentialUpdate::default()
            },
        )
        .await
        .unwrap();

    assert_eq!(events[0].description, "Credential exchange failed (def-1)");
    assert_eq!(h.job_state("j1"), (JobStatus::Complete, JobResult::Failure));
}

#[tokio::test]
async fn update_for_unknown_run_without_payload_is_rejected() {
    let h = harness();
    let err = h
        .listener
        .dispatch(AgencyNotification::Credential {
            job: h.job("j1", "c1"),
            credential: None,
            update: Some(issued()),
        })
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::MissingPayload(ref id) if id == "j1"));
    assert!(h.events().is_empty());
}

#[tokio::test]
async fn update_on_a_job_of_another_protocol_is_rejected() {
    let h = harness();
    h.listener
        .add_proof(h.job("j1", "c1"), email_request())
        .await
        .unwrap();
    let err = h
        .listener
        .update_credential(h.job("j1", "c1"), Some(email_credential()), issued())
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::ProtocolMismatch { .. }));
    assert_eq!(h.events().len(), 1);
}

#[tokio::test]
async fn unknown_tenant_is_not_found() {
    let h = harness();
    let job = JobInfo {
        job_id: "j1".to_string(),
        tenant_id: "nobody".to_string(),
        connection_id: "c1".to_string(),
    };
    let err = h
        .listener
        .add_credential(job, email_credential())
        .await
        .unwrap_err();
    assert!(err.is_not_found());
}

#[tokio::test]
async fn concurrent_duplicate_offers_emit_one_event() {
    let h = harness();
    let job = h.job("j1", "c1");
    let (a, b) = tokio::join!(
        h.listener.add_credential(job.clone(), email_credential()),
        h.listener.add_credential(job.clone(), email_credential()),
    );
    let emitted = a.unwrap().len() + b.unwrap().len();
    assert_eq!(emitted, 1);

    let conn = h.pool.get().unwrap();
    assert_eq!(count_events(&conn, &h.tenant_id, None).unwrap(), 1);
}

#[tokio::test]
async fn auto_accepted_proof_emits_request_then_result() {
    let h = harness();
    let events = h
        .listener
        .update_proof(
            h.job("p1", "c1"),
            Some(email_request()),
            ProofUpdate {
                approved_ms: Some(1_700_000_000_000),
                verified_ms: Some(1_700_000_001_000),
                failed_ms: None,
            },
        )
        .await
        .unwrap();

    let descriptions: Vec<_> = events.iter().map(|e| e.description.as_str()).collect();
    assert_eq!(
        descriptions,
        ["Received proof request", "Proof accepted by verifier"]
    );
    assert_eq!(h.job_state("p1"), (JobStatus::Complete, JobResult::Success));

    let conn = h.pool.get().unwrap();
    let proofs = list_proofs(&conn, &h.tenant_id, None, &BatchInfo::head(10))
        .unwrap()
        .items;
    assert_eq!(proofs.len(), 1);
    assert!(proofs[0].result);
}

#[tokio::test]
async fn proof_request_is_provable_with_held_credential() {
    let h = harness();
    h.listener
        .update_credential(h.job("j1", "c1"), Some(email_credential()), issued())
        .await
        .unwrap();
    h.listener
        .add_proof(h.job("p1", "c1"), email_request())
        .await
        .unwrap();

    let conn = h.pool.get().unwrap();
    let proofs = list_proofs(&conn, &h.tenant_id, None, &BatchInfo::head(10))
        .unwrap()
        .items;
    assert!(proofs[0].provable.is_some());
}

#[tokio::test]
async fn issued_credential_makes_open_proof_request_provable() {
    let h = harness();
    h.listener
        .add_proof(h.job("p1", "c1"), email_request())
        .await
        .unwrap();
    {
        let conn = h.pool.get().unwrap();
        let proofs = list_proofs(&conn, &h.tenant_id, None, &BatchInfo::head(10))
            .unwrap()
            .items;
        assert!(proofs[0].provable.is_none());
    }

    h.listener
        .update_credential(h.job("j1", "c1"), Some(email_credential()), issued())
        .await
        .unwrap();

    let conn = h.pool.get().unwrap();
    let proofs = list_proofs(&conn, &h.tenant_id, None, &BatchInfo::head(10))
        .unwrap()
        .items;
    assert!(proofs[0].provable.is_some());
    // The side effect appends no events of its own.
    assert_eq!(count_events(&conn, &h.tenant_id, None).unwrap(), 3);
}
