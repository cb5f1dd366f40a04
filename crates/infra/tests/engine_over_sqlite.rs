//! The engine wired to real adapters: SQLite stores plus the GraphQL client
//! pointed at a mock server.

mod support;

use std::sync::Arc;

use serde_json::{json, Map, Value};
use stagesync_core::{MutationClient, SyncEngine};
use stagesync_domain::{BatchStatus, EngineConfig, RemoteConfig};
use stagesync_infra::database::{
    SqlCipherBatchRepository, SqlCipherProductionStore, SqlCipherStagingStore,
};
use stagesync_infra::{DryRunMutationClient, GraphqlMutationClient};
use support::{candidates, fast_config, TestDatabase};
use tokio_util::sync::CancellationToken;
use wiremock::matchers::method;
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Answers every alias in the posted document with a fresh id, except
/// aliases whose target id is listed as rejected.
struct EchoIds {
    rejected_names: Vec<&'static str>,
}

impl Respond for EchoIds {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let variables = body["variables"].as_object().cloned().unwrap_or_default();

        let mut data = Map::new();
        let mut errors = Vec::new();
        for key in variables.keys().filter(|k| k.ends_with("_target")) {
            let alias = key.trim_end_matches("_target");
            let name = variables[&format!("{alias}_name")].as_str().unwrap_or_default();
            if self.rejected_names.contains(&name) {
                data.insert(alias.to_string(), Value::Null);
                errors.push(json!({ "message": "invalid column value", "path": [alias] }));
            } else {
                data.insert(alias.to_string(), json!({ "id": format!("remote-{name}") }));
            }
        }
        ResponseTemplate::new(200).set_body_json(json!({ "data": data, "errors": errors }))
    }
}

struct Wiring {
    db: TestDatabase,
    engine: SyncEngine,
}

fn wire(client: Arc<dyn MutationClient>, config: EngineConfig) -> Wiring {
    let db = TestDatabase::new();
    let engine = SyncEngine::new(
        Arc::new(SqlCipherStagingStore::new(Arc::clone(&db.manager))),
        Arc::new(SqlCipherBatchRepository::new(Arc::clone(&db.manager))),
        Arc::new(SqlCipherProductionStore::new(Arc::clone(&db.manager))),
        client,
        config,
        CancellationToken::new(),
    );
    Wiring { db, engine }
}

async fn graphql_client(server: &MockServer) -> Arc<dyn MutationClient> {
    let config = RemoteConfig {
        endpoint: server.uri(),
        api_token: "secret-token".into(),
        board_id: "board-1".into(),
        ..RemoteConfig::default()
    };
    Arc::new(GraphqlMutationClient::new(&config).expect("client should build"))
}

#[tokio::test(flavor = "multi_thread")]
async fn full_run_promotes_into_the_production_mirror() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(EchoIds { rejected_names: Vec::new() })
        .mount(&server)
        .await;

    let wiring = wire(graphql_client(&server).await, fast_config());
    let batch = wiring.engine.stage("acme", candidates(20)).await.unwrap().unwrap();

    let report = wiring.engine.run_partitions(None).await.unwrap();
    assert_eq!(report.exit_code(), 0);
    assert_eq!(report.total_succeeded(), 20);

    let outcome = &report.outcomes[0];
    assert_eq!(outcome.batch_id, batch.batch_id);
    assert_eq!(outcome.status, BatchStatus::Completed);
    assert_eq!(outcome.promoted, 20);
    assert_eq!(outcome.requests, 2);

    assert_eq!(wiring.db.count("SELECT COUNT(*) FROM synced_records"), 20);
    assert_eq!(wiring.db.count("SELECT COUNT(*) FROM staged_records"), 0);
    assert_eq!(
        wiring.db.count(
            "SELECT COUNT(*) FROM synced_records WHERE external_id = 'remote-Order 7'"
        ),
        1
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn rejected_records_are_retained_for_triage() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(EchoIds { rejected_names: vec!["Order 2"] })
        .mount(&server)
        .await;

    let wiring = wire(graphql_client(&server).await, fast_config());
    let batch = wiring.engine.stage("acme", candidates(3)).await.unwrap().unwrap();

    let outcome = wiring.engine.run_batch(&batch.batch_id).await.unwrap();
    assert_eq!(outcome.status, BatchStatus::CompletedWithErrors);
    assert_eq!((outcome.succeeded, outcome.failed), (2, 1));
    assert!(outcome.error_summary.unwrap().contains("VALIDATION_ERROR"));

    let snapshot = wiring.engine.status(Some("acme"), 5).await.unwrap().remove(0);
    assert_eq!(snapshot.counts.api_failed, 1);
    assert_eq!(snapshot.batch.failed_records, 1);
    assert_eq!(
        wiring.db.count(
            "SELECT COUNT(*) FROM staged_records
             WHERE status = 'API_FAILED' AND error_message LIKE 'VALIDATION_ERROR:%'"
        ),
        1
    );
}

#[tokio::test(flavor = "multi_thread")]
async fn dry_run_leaves_the_database_untouched() {
    let config = EngineConfig { dry_run: true, ..fast_config() };
    let wiring = wire(Arc::new(DryRunMutationClient), config);
    let batch = wiring.engine.stage("acme", candidates(4)).await.unwrap().unwrap();

    let report = wiring.engine.run_partitions(Some("acme")).await.unwrap();
    assert!(report.dry_run);
    assert_eq!(report.total_succeeded(), 4);

    assert_eq!(
        wiring.db.count("SELECT COUNT(*) FROM staged_records WHERE status = 'PENDING'"),
        4
    );
    assert_eq!(wiring.db.count("SELECT COUNT(*) FROM synced_records"), 0);
    let stored = wiring.engine.status(None, 1).await.unwrap().remove(0).batch;
    assert_eq!(stored.batch_id, batch.batch_id);
    assert_eq!(stored.status, BatchStatus::Started);
}
