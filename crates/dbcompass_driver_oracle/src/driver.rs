use async_trait::async_trait;
use dbcompass_core::{
    ColumnDescriptor, Connection, ConnectionProfile, DbError, DbKind, EngineAdapter, MetricKind,
    ObjectInfo, ObjectKind, QueryData, Row,
};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::Instant;

/// Oracle adapter. The underlying driver is synchronous, so every call
/// runs on the blocking pool; the connect string is the EZConnect form
/// `//host:port/service`.
pub struct OracleAdapter;

#[async_trait]
impl EngineAdapter for OracleAdapter {
    fn kind(&self) -> DbKind {
        DbKind::Oracle
    }

    async fn connect(&self, profile: &ConnectionProfile) -> Result<Box<dyn Connection>, DbError> {
        let connect_string = format!(
            "//{}:{}/{}",
            profile.host,
            profile.effective_port(),
            profile.database
        );
        let username = profile.username.clone();
        let password = profile.password.clone().unwrap_or_default();

        let connect = tokio::task::spawn_blocking(move || {
            let mut conn = oracle::Connection::connect(&username, &password, &connect_string)
                .map_err(|e| {
                    DbError::connection_failed(format!("Failed to connect to Oracle: {e}"))
                })?;
            conn.set_autocommit(true);
            Ok::<_, DbError>(conn)
        });

        let conn = tokio::time::timeout(profile.connect_timeout(), connect)
            .await
            .map_err(|_| DbError::Timeout)?
            .map_err(join_error)??;

        Ok(Box::new(OracleConnection {
            conn: Arc::new(Mutex::new(Some(conn))),
        }))
    }
}

struct OracleConnection {
    conn: Arc<Mutex<Option<oracle::Connection>>>,
}

impl OracleConnection {
    async fn with_conn<T, F>(&self, op: F) -> Result<T, DbError>
    where
        T: Send + 'static,
        F: FnOnce(&oracle::Connection) -> Result<T, DbError> + Send + 'static,
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

    async fn scalar_f64(&self, sql: &'static str) -> Result<f64, DbError> {
        self.with_conn(move |conn| {
            let value = conn
                .query_row_as::<Option<f64>>(sql, &[])
                .map_err(|e| DbError::query_failed(e.to_string()))?;
            value.ok_or_else(|| DbError::query_failed("metric query returned no value"))
        })
        .await
    }
}

#[async_trait]
impl Connection for OracleConnection {
    fn kind(&self) -> DbKind {
        DbKind::Oracle
    }

    async fn ping(&self) -> Result<(), DbError> {
        self.with_conn(|conn| {
            conn.query_row_as::<i64>("SELECT 1 FROM dual", &[])
                .map(|_| ())
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
                    .map_err(|e| DbError::connection_failed(e.to_string())),
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
                .statement(&sql)
                .build()
                .map_err(|e| DbError::query_failed(e.to_string()))?;

            if stmt.is_query() {
                let result_set = stmt
                    .query(&[])
                    .map_err(|e| DbError::query_failed(e.to_string()))?;

                let columns: Vec<String> = result_set
                    .column_info()
                    .iter()
                    .map(|c| c.name().to_string())
                    .collect();

                let mut rows = Vec::new();
                for row_result in result_set {
                    let row = row_result.map_err(|e| DbError::query_failed(e.to_string()))?;
                    let mut record = Row::new();
                    for (i, name) in columns.iter().enumerate() {
                        let value: Option<String> = row
                            .get(i)
                            .map_err(|e| DbError::query_failed(e.to_string()))?;
                        record.insert(
                            name.clone(),
                            value
                                .map(serde_json::Value::String)
                                .unwrap_or(serde_json::Value::Null),
                        );
                    }
                    rows.push(record);
                }

                Ok(QueryData::rows(columns, rows, start.elapsed()))
            } else {
                stmt.execute(&[])
                    .map_err(|e| DbError::query_failed(e.to_string()))?;
                let affected = stmt
                    .row_count()
                    .map_err(|e| DbError::query_failed(e.to_string()))?;
                Ok(QueryData::affected(affected, start.elapsed()))
            }
        })
        .await
    }

    async fn list_objects(&self, kind: ObjectKind) -> Result<Vec<ObjectInfo>, DbError> {
        let sql = match kind {
            ObjectKind::Tables => "SELECT table_name FROM user_tables ORDER BY table_name",
            ObjectKind::Views => "SELECT view_name FROM user_views ORDER BY view_name",
            ObjectKind::Procedures => {
                "SELECT object_name FROM user_objects
                 WHERE object_type = 'PROCEDURE' ORDER BY object_name"
            }
            ObjectKind::Functions => {
                "SELECT object_name FROM user_objects
                 WHERE object_type = 'FUNCTION' ORDER BY object_name"
            }
        };

        self.with_conn(move |conn| {
            let rows = conn
                .query_as::<String>(sql, &[])
                .map_err(|e| DbError::query_failed(e.to_string()))?;

            let mut objects = Vec::new();
            for name in rows {
                let name = name.map_err(|e| DbError::query_failed(e.to_string()))?;
                objects.push(ObjectInfo::new(name));
            }
            Ok(objects)
        })
        .await
    }

    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, DbError> {
        let table = table.to_string();
        self.with_conn(move |conn| {
            let pk_columns: Vec<String> = conn
                .query_as::<String>(
                    "SELECT cols.column_name
                     FROM user_constraints cons
                     JOIN user_cons_columns cols
                       ON cons.constraint_name = cols.constraint_name
                     WHERE cons.constraint_type = 'P' AND cons.table_name = UPPER(:1)",
                    &[&table],
                )
                .map_err(|e| DbError::query_failed(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| DbError::query_failed(e.to_string()))?;

            let rows = conn
                .query_as::<(
                    String,
                    String,
                    String,
                    Option<String>,
                    Option<i64>,
                    Option<i64>,
                    Option<i64>,
                    Option<String>,
                )>(
                    "SELECT column_name, data_type, nullable, data_default,
                            char_length, data_precision, data_scale, identity_column
                     FROM user_tab_columns
                     WHERE table_name = UPPER(:1)
                     ORDER BY column_id",
                    &[&table],
                )
                .map_err(|e| DbError::query_failed(e.to_string()))?;

            let mut columns = Vec::new();
            for row in rows {
                let (name, data_type, nullable, default_value, char_len, precision, scale, identity) =
                    row.map_err(|e| DbError::query_failed(e.to_string()))?;

                columns.push(ColumnDescriptor {
                    nullable: nullable == "Y",
                    default_value,
                    char_max_length: char_len,
                    numeric_precision: precision,
                    numeric_scale: scale,
                    is_primary_key: pk_columns.contains(&name),
                    is_auto_increment: identity.as_deref() == Some("YES"),
                    ..ColumnDescriptor::new(name, data_type)
                });
            }
            Ok(columns)
        })
        .await
    }

    async fn probe_metric(&self, metric: MetricKind) -> Result<f64, DbError> {
        let sql = match metric {
            MetricKind::ActiveConnections => {
                "SELECT COUNT(*) FROM v$session WHERE status = 'ACTIVE'"
            }
            MetricKind::TotalQueries => {
                "SELECT value FROM v$sysstat WHERE name = 'execute count'"
            }
            MetricKind::UptimeSecs => {
                "SELECT (SYSDATE - startup_time) * 86400 FROM v$instance"
            }
            MetricKind::CommittedTransactions => {
                "SELECT value FROM v$sysstat WHERE name = 'user commits'"
            }
            MetricKind::RolledBackTransactions => {
                "SELECT value FROM v$sysstat WHERE name = 'user rollbacks'"
            }
            MetricKind::TableScanRate => {
                "SELECT value FROM v$sysstat WHERE name = 'table scans (long tables)'"
            }
            MetricKind::DatabaseSizeBytes => "SELECT NVL(SUM(bytes), 0) FROM user_segments",
            other => return Err(DbError::not_supported(other.name())),
        };

        self.scalar_f64(sql).await
    }

    async fn explain(&self, sql: &str) -> Result<String, DbError> {
        let sql = sql.to_string();
        self.with_conn(move |conn| {
            conn.execute(&format!("EXPLAIN PLAN FOR {sql}"), &[])
                .map_err(|e| DbError::query_failed(e.to_string()))?;

            let lines = conn
                .query_as::<String>(
                    "SELECT LPAD(' ', 2 * (LEVEL - 1)) || OPERATION || ' ' ||
                            OPTIONS || ' ' || OBJECT_NAME AS plan_line
                     FROM PLAN_TABLE
                     START WITH ID = 0
                     CONNECT BY PRIOR ID = PARENT_ID
                     ORDER SIBLINGS BY POSITION",
                    &[],
                )
                .map_err(|e| DbError::query_failed(e.to_string()))?
                .collect::<Result<Vec<_>, _>>()
                .map_err(|e| DbError::query_failed(e.to_string()))?;

            Ok(render_plan(&sql, &lines))
        })
        .await
    }
}

fn render_plan(sql: &str, lines: &[String]) -> String {
    let mut plan = format!("Oracle Estimated Execution Plan for query:\n{sql}\n\n");
    plan.push_str("Execution Plan:\n");
    for line in lines {
        plan.push_str("  ");
        plan.push_str(line);
        plan.push('\n');
    }
    plan.push_str("\nPlan Analysis:\n");
    plan.push_str("- The plan shows the query execution tree\n");
    plan.push_str("- Indentation indicates parent-child relationships\n");
    plan.push_str("- TABLE ACCESS operations indicate table scans\n");
    plan.push_str("- INDEX operations show index usage\n");
    plan
}

fn lock<'a>(
    conn: &'a Arc<Mutex<Option<oracle::Connection>>>,
) -> MutexGuard<'a, Option<oracle::Connection>> {
    match conn.lock() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    }
}

fn join_error(e: tokio::task::JoinError) -> DbError {
    DbError::connection_failed(format!("worker task failed: {e}"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_plan_indents_tree_lines() {
        let lines = vec![
            "SELECT STATEMENT  ".to_string(),
            "  TABLE ACCESS FULL USERS".to_string(),
        ];
        let plan = render_plan("SELECT * FROM users", &lines);

        assert!(plan.contains("    TABLE ACCESS FULL USERS"));
        assert!(plan.contains("Plan Analysis"));
    }
}
