//! Agency notifications posted over HTTP end up in the event log and reach
//! live subscribers.

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use serde_json::{json, Value};
use tempfile::TempDir;
use tower::ServiceExt; // for oneshot
use vault_db::{create_pool, run_migrations, DbPool, DbRuntimeSettings};
use vault_server::{app, AppState};
use vault_store::{add_job, add_tenant, CreateJobParams};
use vault_sync::SubscriberRegistry;
use vault_types::{JobResult, JobStatus, ProtocolType};

struct TestApp {
    _dir: TempDir,
    pool: DbPool,
    subscribers: SubscriberRegistry,
    router: Router,
    tenant_id: String,
}

fn setup() -> TestApp {
    let dir = tempfile::tempdir().expect("failed to create temp dir");
    let path = dir.path().join("vault.db");
    let pool = create_pool(path.to_str().unwrap(), DbRuntimeSettings::default())
        .expect("failed to create pool");
    let tenant_id = {
        let conn = pool.get().unwrap();
        run_migrations(&conn).unwrap();
        add_tenant(&conn, "agent-1", "Alice").unwrap().id
    };
    let subscribers = SubscriberRegistry::new(16);
    let router = app(AppState::new(pool.clone(), subscribers.clone()));
    TestApp {
        _dir: dir,
        pool,
        subscribers,
        router,
        tenant_id,
    }
}

impl TestApp {
    fn job(&self, job_id: &str, connection_id: &str) -> Value {
        json!({
            "jobId": job_id,
            "tenantId": self.tenant_id,
            "connectionId": connection_id,
        })
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

    async fn send(&self, request: Request<Body>) -> (StatusCode, Value) {
        let response = self.router.clone().oneshot(request).await.unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    async fn notify(&self, body: Value) -> (StatusCode, Value) {
        self.send(
            Request::builder()
                .method("POST")
                .uri("/api/agency/notifications")
                .header("Content-Type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
    }

    async fn get(&self, uri: &str) -> (StatusCode, Value) {
        self.send(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
    }
}

fn connection_notification(app: &TestApp, connection_id: &str) -> Value {
    json!({
        "type": "connection",
        "job": app.job(&format!("run-{connection_id}"), connection_id),
        "connection": {
            "ourDid": "did:our",
            "theirDid": "did:their",
            "theirEndpoint": "http://agency.example",
            "theirLabel": "Bob",
        }
    })
}

fn credential_offer() -> Value {
    json!({
        "role": "holder",
        "schemaId": "schema-1",
        "credDefId": "def-1",
        "attributes": [{ "name": "email", "value": "alice@example.com" }],
    })
}

#[tokio::test]
async fn connection_without_job_is_not_found() {
    let app = setup();
    let (status, body) = app.notify(connection_notification(&app, "c1")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].is_string());

    let (_, page) = app
        .get(&format!("/api/tenants/{}/events", app.tenant_id))
        .await;
    assert_eq!(page["totalCount"], 0);
}

#[tokio::test]
async fn connection_is_established_and_pushed() {
    let app = setup();
    app.precreate_connection_job("c1");
    let mut subscription = app.subscribers.subscribe(&app.tenant_id);

    let (status, body) = app.notify(connection_notification(&app, "c1")).await;
    assert_eq!(status, StatusCode::OK);
    let events = body["events"].as_array().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0]["description"], "Established connection to Bob");

    let pushed = subscription.recv().await.unwrap();
    assert_eq!(pushed.description, "Established connection to Bob");
    assert_eq!(events[0]["id"], pushed.id.as_str());

    let event_id = pushed.id.clone();
    let (status, connection) = app
        .get(&format!(
            "/api/tenants/{}/events/{event_id}/connection",
            app.tenant_id
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(connection["theirLabel"], "Bob");

    let (status, job) = app
        .get(&format!(
            "/api/tenants/{}/events/{event_id}/job",
            app.tenant_id
        ))
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(job["id"], "c1");
    assert_eq!(job["status"], "complete");

    // Redelivery is acknowledged without new events.
    let (status, body) = app.notify(connection_notification(&app, "c1")).await;
    assert_eq!(status, StatusCode::OK);
    assert!(body["events"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn auto_accepted_credential_emits_offer_and_issue() {
    let app = setup();
    let (status, body) = app
        .notify(json!({
            "type": "credential",
            "job": app.job("j1", "c1"),
            "credential": credential_offer(),
            "update": { "approvedMs": 1700000000000i64, "issuedMs": 1700000001000i64 },
        }))
        .await;
    assert_eq!(status, StatusCode::OK);
    let descriptions: Vec<&str> = body["events"]
        .as_array()
        .unwrap()
        .iter()
        .map(|e| e["description"].as_str().unwrap())
        .collect();
    assert_eq!(
        descriptions,
        vec!["Received credential offer def-1", "Received credential def-1"]
    );

    let (_, jobs) = app
        .get(&format!("/api/tenants/{}/jobs?completed=true", app.tenant_id))
        .await;
    assert_eq!(jobs["totalCount"], 1);

    let (_, credentials) = app
        .get(&format!("/api/tenants/{}/credentials", app.tenant_id))
        .await;
    assert_eq!(credentials["totalCount"], 1);
    assert_eq!(credentials["edges"][0]["node"]["credDefId"], "def-1");
}

#[tokio::test]
async fn update_without_offer_is_a_bad_request() {
    let app = setup();
    let (status, _) = app
        .notify(json!({
            "type": "credential",
            "job": app.job("j1", "c1"),
            "update": { "approvedMs": 1700000000000i64 },
        }))
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn message_lists_under_its_connection() {
    let app = setup();
    let (status, _) = app
        .notify(json!({
            "type": "message",
            "job": app.job("m1", "c1"),
            "message": { "message": "hello", "sentByMe": true },
        }))
        .await;
    assert_eq!(status, StatusCode::OK);

    let (_, messages) = app
        .get(&format!(
            "/api/tenants/{}/messages?connectionId=c1",
            app.tenant_id
        ))
        .await;
    assert_eq!(messages["totalCount"], 1);
    assert_eq!(messages["edges"][0]["node"]["message"], "hello");

    let (_, events) = app
        .get(&format!("/api/tenants/{}/events", app.tenant_id))
        .await;
    assert_eq!(
        events["edges"][0]["node"]["description"],
        "Sent message: hello"
    );
}

#[tokio::test]
async fn malformed_notification_is_rejected() {
    let app = setup();
    let response = app
        .router
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/agency/notifications")
                .header("Content-Type", "application/json")
                .body(Body::from(r#"{"type":"unknown"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert!(response.status().is_client_error());
}
