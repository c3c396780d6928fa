use dbcompass_core::{
    ConnectionRegistry, DbKind, MetricKind, MonitoringCollector, ObjectKind, PlanEstimator,
    ProfileStore, QueryData, QueryExecutionService, SchemaIntrospectionService, TopQuery, Uuid,
};
use dbcompass_test_support::{FakeAdapter, profile_for, row};
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

fn registry_with(adapter: &FakeAdapter, dir: &tempfile::TempDir) -> Arc<ConnectionRegistry> {
    let store = ProfileStore::at(dir.path().to_path_buf()).expect("store should open");
    let mut registry = ConnectionRegistry::new(store);
    registry.register(adapter.clone().as_adapter_arc());
    Arc::new(registry)
}

#[tokio::test]
async fn execute_against_unknown_profile_attempts_no_native_call() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = FakeAdapter::new(DbKind::MySql);
    let registry = registry_with(&adapter, &dir);
    let service = QueryExecutionService::new(registry);

    let result = service.execute(Uuid::new_v4(), "SELECT 1").await;

    assert!(!result.success);
    assert_eq!(result.error.as_deref(), Some("Connection not found"));
    assert_eq!(adapter.stats().connect_calls, 0);
}

#[tokio::test]
async fn execute_wraps_rows_into_the_envelope() {
    let dir = tempfile::tempdir().unwrap();
    let data = QueryData::rows(
        vec!["id".to_string(), "name".to_string()],
        vec![
            row(&[("id", json!(1)), ("name", json!("Alice"))]),
            row(&[("id", json!(2)), ("name", json!("Bob"))]),
        ],
        Duration::from_millis(4),
    );
    let adapter = FakeAdapter::new(DbKind::Postgres).with_query_result("SELECT * FROM users", data);
    let registry = registry_with(&adapter, &dir);

    let profile = profile_for(DbKind::Postgres);
    registry.save_profile(profile.clone()).unwrap();

    let service = QueryExecutionService::new(registry);
    let result = service.execute(profile.id, "SELECT * FROM users").await;

    assert!(result.success);
    assert_eq!(result.columns, vec!["id", "name"]);
    assert_eq!(result.row_count, 2);
    assert!(result.error.is_none());
    for record in &result.data {
        for key in record.keys() {
            assert!(result.columns.contains(key));
        }
    }
}

#[tokio::test]
async fn execute_reports_dml_row_count_with_zero_columns() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = FakeAdapter::new(DbKind::MySql)
        .with_default_result(QueryData::affected(3, Duration::from_millis(2)));
    let registry = registry_with(&adapter, &dir);

    let profile = profile_for(DbKind::MySql);
    registry.save_profile(profile.clone()).unwrap();

    let service = QueryExecutionService::new(registry);
    let result = service
        .execute(profile.id, "DELETE FROM users WHERE id = 9")
        .await;

    assert!(result.success);
    assert!(result.columns.is_empty());
    assert!(result.data.is_empty());
    assert_eq!(result.row_count, 3);
}

#[tokio::test]
async fn execute_surfaces_native_error_as_a_value() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = FakeAdapter::new(DbKind::MySql)
        .with_query_error("SELECT boom", "Unknown column 'boom' in 'field list'");
    let registry = registry_with(&adapter, &dir);

    let profile = profile_for(DbKind::MySql);
    registry.save_profile(profile.clone()).unwrap();

    let service = QueryExecutionService::new(registry);
    let result = service.execute(profile.id, "SELECT boom").await;

    assert!(!result.success);
    assert!(result.error.as_deref().unwrap().contains("Unknown column"));
}

#[tokio::test]
async fn listing_a_kind_the_engine_lacks_is_empty_not_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = FakeAdapter::new(DbKind::Sqlite).with_objects(ObjectKind::Tables, &["users"]);
    let registry = registry_with(&adapter, &dir);

    let profile = profile_for(DbKind::Sqlite);
    registry.save_profile(profile.clone()).unwrap();

    let service = SchemaIntrospectionService::new(registry);
    let listing = service.list_objects(profile.id, ObjectKind::Procedures).await;

    assert!(listing.error.is_none());
    assert!(listing.objects.is_empty());

    let tables = service.list_objects(profile.id, ObjectKind::Tables).await;
    assert_eq!(tables.objects.len(), 1);
    assert_eq!(tables.objects[0].name, "users");
}

#[tokio::test]
async fn snapshot_is_fully_populated_despite_failing_probes() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = FakeAdapter::new(DbKind::Postgres)
        .with_metric(MetricKind::ActiveConnections, 12.0)
        .with_metric_error(
            MetricKind::TotalQueries,
            "permission denied for view pg_stat_statements",
        )
        .with_metric_error(MetricKind::CacheHitRatio, "permission denied")
        .with_top_queries(vec![TopQuery {
            query: "SELECT 1".to_string(),
            count: 40,
        }]);
    let registry = registry_with(&adapter, &dir);

    let profile = profile_for(DbKind::Postgres);
    registry.save_profile(profile.clone()).unwrap();

    let collector = MonitoringCollector::new(registry);
    let snapshot = collector.snapshot(profile.id).await.unwrap();

    assert_eq!(snapshot.connections.active, 12);
    // Failed probes degrade to the synthesized defaults.
    assert_eq!(snapshot.queries.per_sec, 0.0);
    assert_eq!(snapshot.cache.hit_ratio, 90.0);
    assert_eq!(snapshot.top_queries.len(), 1);
}

#[tokio::test]
async fn zero_uptime_yields_zero_queries_per_sec() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = FakeAdapter::new(DbKind::MySql)
        .with_metric(MetricKind::TotalQueries, 4200.0)
        .with_metric(MetricKind::UptimeSecs, 0.0);
    let registry = registry_with(&adapter, &dir);

    let profile = profile_for(DbKind::MySql);
    registry.save_profile(profile.clone()).unwrap();

    let collector = MonitoringCollector::new(registry);
    let snapshot = collector.snapshot(profile.id).await.unwrap();

    assert_eq!(snapshot.queries.per_sec, 0.0);
    assert!(snapshot.queries.per_sec.is_finite());
}

#[tokio::test]
async fn snapshot_prefers_cached_values_over_defaults() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = FakeAdapter::new(DbKind::MySql).with_metric(MetricKind::ActiveConnections, 7.0);
    let registry = registry_with(&adapter, &dir);

    let profile = profile_for(DbKind::MySql);
    registry.save_profile(profile.clone()).unwrap();

    let collector = MonitoringCollector::new(registry);
    let first = collector.snapshot(profile.id).await.unwrap();
    assert_eq!(first.connections.active, 7);

    // The probe starts failing; the collector falls back to the value it
    // saw last time, not the synthesized default.
    adapter.set_metric(
        MetricKind::ActiveConnections,
        Err("permission denied".to_string()),
    );
    let second = collector.snapshot(profile.id).await.unwrap();
    assert_eq!(second.connections.active, 7);
}

#[tokio::test]
async fn snapshot_fails_only_when_no_connection_is_possible() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = FakeAdapter::new(DbKind::MySql).with_connect_error("host unreachable");
    let registry = registry_with(&adapter, &dir);

    let profile = profile_for(DbKind::MySql);
    registry.save_profile(profile.clone()).unwrap();

    let collector = MonitoringCollector::new(registry);
    let result = collector.snapshot(profile.id).await;
    assert!(result.is_err());
}

#[tokio::test]
async fn plan_estimation_returns_report_or_error_value() {
    let dir = tempfile::tempdir().unwrap();
    let adapter = FakeAdapter::new(DbKind::MySql).with_plan("table scan on users");
    let registry = registry_with(&adapter, &dir);

    let profile = profile_for(DbKind::MySql);
    registry.save_profile(profile.clone()).unwrap();

    let estimator = PlanEstimator::new(registry);
    let plan = estimator
        .estimate(profile.id, "SELECT * FROM users")
        .await
        .unwrap();
    assert!(plan.contains("table scan"));

    let missing = estimator.estimate(Uuid::new_v4(), "SELECT 1").await;
    assert!(missing.is_err());
}
