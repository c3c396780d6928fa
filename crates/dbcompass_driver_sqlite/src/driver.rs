use async_trait::async_trait;
use base64::Engine as _;
use dbcompass_core::{
    ColumnDescriptor, Connection, ConnectionProfile, DbError, DbKind, EngineAdapter, MetricKind,
    ObjectInfo, ObjectKind, QueryData, Row,
};
use rusqlite::OpenFlags;
use rusqlite::types::ValueRef;
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// SQLite adapter. File based: the profile's `database` field is the path;
/// host, port, and credentials are ignored.
pub struct SqliteAdapter;

#[async_trait]
impl EngineAdapter for SqliteAdapter {
    fn kind(&self) -> DbKind {
        DbKind::Sqlite
    }

    async fn connect(&self, profile: &ConnectionProfile) -> Result<Box<dyn Connection>, DbError> {
        let path = profile.database.trim().to_string();
        if path.is_empty() {
            return Err(DbError::invalid_profile(
                "SQLite profiles need a database file path",
            ));
        }

        let busy_timeout = profile.connect_timeout();
        let conn = tokio::task::spawn_blocking(move || {
            let conn = rusqlite::Connection::open_with_flags(
                &path,
                OpenFlags::SQLITE_OPEN_READ_WRITE | OpenFlags::SQLITE_OPEN_CREATE,
            )
            .map_err(|e| {
                DbError::connection_failed(format!("Failed to open SQLite database: {e}"))
            })?;

            conn.busy_timeout(busy_timeout)
                .map_err(|e| DbError::connection_failed(e.to_string()))?;

            Ok::<_, DbError>(conn)
        })
        .await
        .map_err(join_error)??;

        Ok(Box::new(SqliteConnection {
            conn: Arc::new(Mutex::new(Some(conn))),
        }))
    }
}

struct SqliteConnection {
    conn: Arc<Mutex<Option<rusqlite::Connection>>>,
}

impl SqliteConnection {
    /// Runs a closure against the native connection on the blocking pool,
    /// so SQLite's synchronous calls never block the async runtime.
    async fn with_conn<T, F>(&self, op: F) -> Result<T, DbError>
    where
        T: Send + 'static,
        F: FnOnce(&rusqlite::Connection) -> Result<T, DbError> + Send + 'static,
    {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let guard = lock(&conn);
            match guard.as_ref() {
                Some(conn) => op(conn),
                None => Err(DbError::connection_failed("connection closed")),
            }
        })
        .await
        .map_err(join_error)?
    }
}

#[async_trait]
impl Connection for SqliteConnection {
    fn kind(&self) -> DbKind {
        DbKind::Sqlite
    }

    async fn ping(&self) -> Result<(), DbError> {
        self.with_conn(|conn| {
            conn.query_row("SELECT 1", [], |_| Ok(()))
                .map_err(|e| DbError::connection_failed(e.to_string()))
        })
        .await
    }

    async fn close(&self) -> Result<(), DbError> {
        let conn = self.conn.clone();
        tokio::task::spawn_blocking(move || {
            let taken = lock(&conn).take();
            match taken {
                Some(conn) => conn
                    .close()
                    .map_err(|(_, e)| DbError::connection_failed(e.to_string())),
                None => Ok(()),
            }
        })
        .await
        .map_err(join_error)?
    }

    async fn execute(&self, sql: &str) -> Result<QueryData, DbError> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let start = Instant::now();
            let mut stmt = conn
                .prepare(&sql)
                .map_err(|e| DbError::query_failed(e.to_string()))?;

            if stmt.column_count() > 0 {
                let columns: Vec<String> =
                    stmt.column_names().iter().map(|s| s.to_string()).collect();

                let mut rows = Vec::new();
                let mut raw = stmt
                    .query([])
                    .map_err(|e| DbError::query_failed(e.to_string()))?;
                while let Some(r) = raw.next().map_err(|e| DbError::query_failed(e.to_string()))? {
                    let mut record = Row::new();
                    for (i, name) in columns.iter().enumerate() {
                        let value = r
                            .get_ref(i)
                            .map_err(|e| DbError::query_failed(e.to_string()))?;
                        record.insert(name.clone(), value_ref_to_json(value));
                    }
                    rows.push(record);
                }

                Ok(QueryData::rows(columns, rows, start.elapsed()))
            } else {
                drop(stmt);
                let affected = conn
                    .execute(&sql, [])
                    .map_err(|e| DbError::query_failed(e.to_string()))?;
                Ok(QueryData::affected(affected as u64, start.elapsed()))
            }
        })
        .await
    }

    async fn list_objects(&self, kind: ObjectKind) -> Result<Vec<ObjectInfo>, DbError> {
        let type_filter = match kind {
            ObjectKind::Tables => "table",
            ObjectKind::Views => "view",
            // SQLite has no stored procedures or functions.
            ObjectKind::Procedures | ObjectKind::Functions => return Ok(Vec::new()),
        };

        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(
                    "SELECT name FROM sqlite_master
                     WHERE type = ?1 AND name NOT LIKE 'sqlite_%'
                     ORDER BY name",
                )
                .map_err(|e| DbError::query_failed(e.to_string()))?;

            let names = stmt
                .query_map([type_filter], |row| row.get::<_, String>(0))
                .map_err(|e| DbError::query_failed(e.to_string()))?
                .collect::<Result<Vec<String>, _>>()
                .map_err(|e| DbError::query_failed(e.to_string()))?;

            Ok(names.into_iter().map(ObjectInfo::new).collect())
        })
        .await
    }

    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, DbError> {
        let table = table.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&format!("PRAGMA table_info({table})"))
                .map_err(|e| DbError::query_failed(e.to_string()))?;

            // table_info columns: cid, name, type, notnull, dflt_value, pk
            let raw: Vec<(String, String, i32, Option<String>, i32)> = stmt
                .query_map([], |row| {
                    Ok((
                        row.get(1)?,
                        row.get(2)?,
                        row.get(3)?,
                        row.get(4)?,
                        row.get(5)?,
                    ))
                })
                .map_err(|e| DbError::query_failed(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| DbError::query_failed(e.to_string()))?;

            if raw.is_empty() {
                return Err(DbError::query_failed(format!("no such table: {table}")));
            }

            // AUTOINCREMENT only shows up in the original CREATE TABLE text.
            let create_sql: Option<String> = conn
                .query_row(
                    "SELECT sql FROM sqlite_master WHERE type = 'table' AND name = ?1",
                    [table.as_str()],
                    |row| row.get(0),
                )
                .unwrap_or(None);
            let has_autoincrement = create_sql
                .map(|sql| sql.to_uppercase().contains("AUTOINCREMENT"))
                .unwrap_or(false);

            Ok(raw
                .into_iter()
                .map(|(name, data_type, notnull, default_value, pk)| {
                    let is_primary_key = pk > 0;
                    ColumnDescriptor {
                        nullable: notnull == 0,
                        default_value,
                        is_primary_key,
                        is_auto_increment: is_primary_key && has_autoincrement,
                        ..ColumnDescriptor::new(name, data_type)
                    }
                })
                .collect())
        })
        .await
    }

    async fn probe_metric(&self, metric: MetricKind) -> Result<f64, DbError> {
        match metric {
            MetricKind::DatabaseSizeBytes => {
                self.with_conn(|conn| {
                    conn.query_row(
                        "SELECT page_count * page_size FROM pragma_page_count(), pragma_page_size()",
                        [],
                        |row| row.get::<_, i64>(0),
                    )
                    .map(|size| size as f64)
                    .map_err(|e| DbError::query_failed(e.to_string()))
                })
                .await
            }
            // An embedded database has exactly this process connected.
            MetricKind::ActiveConnections => Ok(1.0),
            other => Err(DbError::not_supported(other.name())),
        }
    }

    async fn explain(&self, sql: &str) -> Result<String, DbError> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            let mut stmt = conn
                .prepare(&format!("EXPLAIN QUERY PLAN {sql}"))
                .map_err(|e| DbError::query_failed(e.to_string()))?;

            let steps: Vec<(i64, i64, i64, String)> = stmt
                .query_map([], |row| {
                    Ok((row.get(0)?, row.get(1)?, row.get(2)?, row.get(3)?))
                })
                .map_err(|e| DbError::query_failed(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| DbError::query_failed(e.to_string()))?;

            Ok(render_plan(&sql, &steps))
        })
        .await
    }
}

fn render_plan(sql: &str, steps: &[(i64, i64, i64, String)]) -> String {
    let mut plan = format!("SQLite Estimated Execution Plan for query:\n{sql}\n\n");
    plan.push_str("Execution Plan:\n");
    plan.push_str("id | parent | detail\n");
    plan.push_str("---|--------|-------\n");
    for (id, parent, _, detail) in steps {
        plan.push_str(&format!("{id:>2} | {parent:>6} | {detail}\n"));
    }
    plan.push_str("\nPlan Analysis:\n");
    plan.push_str("- The detail column shows the execution steps\n");
    plan.push_str("- Look for SCAN operations which indicate table scans\n");
    plan.push_str("- SEARCH operations use indexes when available\n");
    plan
}

fn value_ref_to_json(value: ValueRef<'_>) -> serde_json::Value {
    match value {
        ValueRef::Null => serde_json::Value::Null,
        ValueRef::Integer(i) => serde_json::Value::from(i),
        ValueRef::Real(f) => serde_json::Number::from_f64(f)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ValueRef::Text(text) => {
            serde_json::Value::String(String::from_utf8_lossy(text).into_owned())
        }
        ValueRef::Blob(blob) => {
            serde_json::Value::String(base64::engine::general_purpose::STANDARD.encode(blob))
        }
    }
}

fn lock<'a>(
    conn: &'a Arc<Mutex<Option<rusqlite::Connection>>>,
) -> MutexGuard<'a, Option<rusqlite::Connection>> {
    match conn.lock() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    }
}

fn join_error(e: tokio::task::JoinError) -> DbError {
    DbError::connection_failed(format!("worker task failed: {e}"))
}
