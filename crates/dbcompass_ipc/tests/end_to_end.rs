use dbcompass_core::{ConnectionRegistry, DbKind, ObjectKind, ProfileStore, QueryData, Uuid};
use dbcompass_ipc::{CoreHandler, Request, RequestEnvelope, Response};
use dbcompass_test_support::{FakeAdapter, profile_for};
use std::time::Duration;

fn handler_with(adapter: &FakeAdapter, dir: &tempfile::TempDir) -> CoreHandler {
    let store = ProfileStore::at(dir.path().to_path_buf()).expect("store should open");
    let mut registry = ConnectionRegistry::new(store);
    registry.register(adapter.clone().as_adapter_arc());
    CoreHandler::new(registry)
}

#[tokio::test]
async fn saved_password_is_encrypted_at_rest_and_recoverable() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = FakeAdapter::new(DbKind::MySql);
    let handler = handler_with(&adapter, &dir);

    let mut profile = profile_for(DbKind::MySql);
    profile.id = Uuid::nil();
    profile.password = Some("secret123".to_string());

    let id = match handler.handle(Request::SaveConnection(profile)).await {
        Response::ConnectionSaved { id } => id,
        other => panic!("unexpected response: {other:?}"),
    };

    // At rest the record must not contain the plaintext.
    let raw = handler
        .registry()
        .raw_record(id)
        .unwrap()
        .expect("record should exist");
    assert!(!raw.contains("secret123"));
    assert!(raw.contains("ciphertext"));

    // Details return the decrypted password.
    match handler.handle(Request::GetConnectionDetails { id }).await {
        Response::ConnectionDetails(Some(details)) => {
            assert_eq!(details.password.as_deref(), Some("secret123"));
        }
        other => panic!("unexpected response: {other:?}"),
    }

    // Listings redact it.
    match handler.handle(Request::ListConnections).await {
        Response::Connections(profiles) => {
            assert_eq!(profiles.len(), 1);
            assert!(profiles[0].password.is_none());
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn execute_query_against_missing_profile_is_a_failure_value() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = FakeAdapter::new(DbKind::MySql);
    let handler = handler_with(&adapter, &dir);

    let response = handler
        .handle(Request::ExecuteQuery {
            id: Uuid::new_v4(),
            text: "SELECT 1".to_string(),
        })
        .await;

    match response {
        Response::QueryOutcome(result) => {
            assert!(!result.success);
            assert_eq!(result.error.as_deref(), Some("Connection not found"));
        }
        other => panic!("unexpected response: {other:?}"),
    }
    assert_eq!(adapter.stats().connect_calls, 0);
}

#[tokio::test]
async fn execute_query_returns_the_uniform_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = FakeAdapter::new(DbKind::Postgres).with_default_result(QueryData::affected(
        2,
        Duration::from_millis(1),
    ));
    let handler = handler_with(&adapter, &dir);

    let profile = profile_for(DbKind::Postgres);
    let id = profile.id;
    handler.registry().save_profile(profile).unwrap();

    match handler
        .handle(Request::ExecuteQuery {
            id,
            text: "UPDATE t SET x = 1".to_string(),
        })
        .await
    {
        Response::QueryOutcome(result) => {
            assert!(result.success);
            assert_eq!(result.row_count, 2);
            assert!(result.columns.is_empty());
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn test_connection_by_inline_profile_reports_native_error() {
    let dir = tempfile::tempdir().unwrap();
    let adapter =
        FakeAdapter::new(DbKind::Postgres).with_connect_error("ECONNREFUSED 203.0.113.9:5432");
    let handler = handler_with(&adapter, &dir);

    let profile = profile_for(DbKind::Postgres);
    let profile_id = profile.id;
    let response = handler
        .handle(Request::TestConnection {
            id: None,
            profile: Some(profile),
        })
        .await;

    match response {
        Response::TestResult { success, message } => {
            assert!(!success);
            assert!(message.contains("ECONNREFUSED"));
        }
        other => panic!("unexpected response: {other:?}"),
    }
    // A failed test must not leave a cached handle behind.
    assert!(!handler.registry().has_handle(profile_id).await);
}

#[tokio::test]
async fn test_connection_success_names_the_endpoint() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = FakeAdapter::new(DbKind::MySql);
    let handler = handler_with(&adapter, &dir);

    let profile = profile_for(DbKind::MySql);
    let id = profile.id;
    handler.registry().save_profile(profile).unwrap();

    match handler
        .handle(Request::TestConnection {
            id: Some(id),
            profile: None,
        })
        .await
    {
        Response::TestResult { success, message } => {
            assert!(success);
            assert!(message.contains("localhost:3306"));
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn test_connection_requires_id_or_profile() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = FakeAdapter::new(DbKind::MySql);
    let handler = handler_with(&adapter, &dir);

    let response = handler
        .handle(Request::TestConnection {
            id: None,
            profile: None,
        })
        .await;
    assert!(matches!(response, Response::Error { .. }));
}

#[tokio::test]
async fn delete_connection_reports_missing_records() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = FakeAdapter::new(DbKind::MySql);
    let handler = handler_with(&adapter, &dir);

    let response = handler
        .handle(Request::DeleteConnection { id: Uuid::new_v4() })
        .await;
    match response {
        Response::Error { message } => assert_eq!(message, "Connection not found"),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn listing_unsupported_kind_yields_empty_objects() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = FakeAdapter::new(DbKind::Sqlite);
    let handler = handler_with(&adapter, &dir);

    let profile = profile_for(DbKind::Sqlite);
    let id = profile.id;
    handler.registry().save_profile(profile).unwrap();

    match handler
        .handle(Request::ListDatabaseObjects {
            id,
            kind: ObjectKind::Procedures,
        })
        .await
    {
        Response::DatabaseObjects(listing) => {
            assert!(listing.error.is_none());
            assert!(listing.objects.is_empty());
        }
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn estimated_plan_flows_through_the_handler() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = FakeAdapter::new(DbKind::MySql).with_plan("index scan on users");
    let handler = handler_with(&adapter, &dir);

    let profile = profile_for(DbKind::MySql);
    let id = profile.id;
    handler.registry().save_profile(profile).unwrap();

    match handler
        .handle(Request::GetEstimatedPlan {
            id,
            text: "SELECT * FROM users".to_string(),
        })
        .await
    {
        Response::EstimatedPlan { plan } => assert!(plan.contains("index scan")),
        other => panic!("unexpected response: {other:?}"),
    }
}

#[tokio::test]
async fn envelopes_carry_the_correlation_id_back() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = FakeAdapter::new(DbKind::MySql);
    let handler = handler_with(&adapter, &dir);

    let envelope = RequestEnvelope::new(42, Request::ListConnections);
    let response = handler.handle_envelope(envelope).await;

    assert_eq!(response.request_id, 42);
    assert!(matches!(response.body, Response::Connections(_)));
}
