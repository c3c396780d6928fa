use dbcompass_core::{ConnectionProfile, DbKind, EngineAdapter, ObjectKind};
use dbcompass_driver_sqlite::SqliteAdapter;

fn profile(dir: &tempfile::TempDir) -> ConnectionProfile {
    let mut profile = ConnectionProfile::new("local file", DbKind::Sqlite);
    profile.database = dir
        .path()
        .join("app.db")
        .to_string_lossy()
        .into_owned();
    profile
}

#[tokio::test(flavor = "multi_thread")]
async fn executes_ddl_dml_and_select() {
    let dir = tempfile::tempdir().unwrap();
    let conn = SqliteAdapter.connect(&profile(&dir)).await.unwrap();

    let ddl = conn
        .execute("CREATE TABLE users (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL)")
        .await
        .unwrap();
    assert!(ddl.columns.is_empty());

    let insert = conn
        .execute("INSERT INTO users (name) VALUES ('Alice'), ('Bob')")
        .await
        .unwrap();
    assert_eq!(insert.row_count(), 2);
    assert!(insert.columns.is_empty());

    let select = conn.execute("SELECT id, name FROM users ORDER BY id").await.unwrap();
    assert_eq!(select.columns, vec!["id", "name"]);
    assert_eq!(select.rows.len(), 2);
    assert_eq!(select.rows[0]["name"], serde_json::json!("Alice"));
    for row in &select.rows {
        for key in row.keys() {
            assert!(select.columns.contains(key));
        }
    }

    conn.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn syntax_error_surfaces_native_message() {
    let dir = tempfile::tempdir().unwrap();
    let conn = SqliteAdapter.connect(&profile(&dir)).await.unwrap();

    let err = conn.execute("SELEKT 1").await.err().expect("should fail");
    assert!(err.to_string().contains("syntax error"));

    conn.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn lists_tables_and_returns_empty_for_procedures() {
    let dir = tempfile::tempdir().unwrap();
    let conn = SqliteAdapter.connect(&profile(&dir)).await.unwrap();

    conn.execute("CREATE TABLE orders (id INTEGER PRIMARY KEY)")
        .await
        .unwrap();
    conn.execute("CREATE VIEW order_ids AS SELECT id FROM orders")
        .await
        .unwrap();

    let tables = conn.list_objects(ObjectKind::Tables).await.unwrap();
    assert_eq!(tables.len(), 1);
    assert_eq!(tables[0].name, "orders");

    let views = conn.list_objects(ObjectKind::Views).await.unwrap();
    assert_eq!(views[0].name, "order_ids");

    assert!(conn.list_objects(ObjectKind::Procedures).await.unwrap().is_empty());
    assert!(conn.list_objects(ObjectKind::Functions).await.unwrap().is_empty());

    conn.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn describes_columns_with_pk_and_autoincrement() {
    let dir = tempfile::tempdir().unwrap();
    let conn = SqliteAdapter.connect(&profile(&dir)).await.unwrap();

    conn.execute(
        "CREATE TABLE items (
            id INTEGER PRIMARY KEY AUTOINCREMENT,
            label TEXT NOT NULL DEFAULT 'none',
            price REAL
        )",
    )
    .await
    .unwrap();

    let columns = conn.describe_columns("items").await.unwrap();
    assert_eq!(columns.len(), 3);

    let id = &columns[0];
    assert_eq!(id.name, "id");
    assert!(id.is_primary_key);
    assert!(id.is_auto_increment);

    let label = &columns[1];
    assert!(!label.nullable);
    assert_eq!(label.default_value.as_deref(), Some("'none'"));

    let price = &columns[2];
    assert!(price.nullable);
    assert!(!price.is_primary_key);

    conn.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn explain_renders_a_readable_report() {
    let dir = tempfile::tempdir().unwrap();
    let conn = SqliteAdapter.connect(&profile(&dir)).await.unwrap();

    conn.execute("CREATE TABLE t (x INTEGER)").await.unwrap();
    let plan = conn.explain("SELECT * FROM t").await.unwrap();

    assert!(plan.contains("Execution Plan"));
    assert!(plan.contains("Plan Analysis"));

    conn.close().await.unwrap();
}

#[tokio::test(flavor = "multi_thread")]
async fn connect_requires_a_file_path() {
    let profile = ConnectionProfile::new("no path", DbKind::Sqlite);
    let result = SqliteAdapter.connect(&profile).await;
    assert!(result.is_err());
}

#[tokio::test(flavor = "multi_thread")]
async fn operations_after_close_fail_cleanly() {
    let dir = tempfile::tempdir().unwrap();
    let conn = SqliteAdapter.connect(&profile(&dir)).await.unwrap();

    conn.close().await.unwrap();
    let err = conn.execute("SELECT 1").await.err().expect("should fail");
    assert!(err.to_string().contains("closed"));
}
