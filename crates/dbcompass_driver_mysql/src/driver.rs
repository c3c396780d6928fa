use async_trait::async_trait;
use base64::Engine as _;
use dbcompass_core::{
    ColumnDescriptor, Connection, ConnectionProfile, DbError, DbKind, EngineAdapter, MetricKind,
    ObjectInfo, ObjectKind, QueryData, Row, SslMode, TopQuery,
};
use mysql_async::prelude::*;
use mysql_async::{Conn, OptsBuilder, SslOpts, Value};
use std::time::Instant;
use tokio::sync::Mutex;

/// MySQL/MariaDB adapter on `mysql_async`.
pub struct MysqlAdapter;

#[async_trait]
impl EngineAdapter for MysqlAdapter {
    fn kind(&self) -> DbKind {
        DbKind::MySql
    }

    async fn connect(&self, profile: &ConnectionProfile) -> Result<Box<dyn Connection>, DbError> {
        let mut builder = OptsBuilder::default()
            .ip_or_hostname(profile.host.clone())
            .tcp_port(profile.effective_port())
            .user(Some(profile.username.clone()))
            .pass(profile.password.clone());

        if !profile.database.trim().is_empty() {
            builder = builder.db_name(Some(profile.database.clone()));
        }
        if profile.ssl_mode == SslMode::Require {
            builder =
                builder.ssl_opts(Some(SslOpts::default().with_danger_accept_invalid_certs(true)));
        }

        let conn = tokio::time::timeout(profile.connect_timeout(), Conn::new(builder))
            .await
            .map_err(|_| DbError::Timeout)?
            .map_err(|e| DbError::connection_failed(format!("Failed to connect to MySQL: {e}")))?;

        Ok(Box::new(MysqlConnection {
            conn: Mutex::new(Some(conn)),
        }))
    }
}

struct MysqlConnection {
    conn: Mutex<Option<Conn>>,
}

impl MysqlConnection {
    /// Fetches a `SHOW STATUS LIKE` counter as f64. The value arrives as a
    /// string in the second column.
    async fn status_value(&self, variable: &str) -> Result<f64, DbError> {
        let mut guard = self.conn.lock().await;
        let conn = require(&mut guard)?;

        let row: Option<(String, String)> = conn
            .query_first(format!("SHOW STATUS LIKE '{variable}'"))
            .await
            .map_err(|e| DbError::query_failed(e.to_string()))?;

        let (_, value) = row
            .ok_or_else(|| DbError::query_failed(format!("status variable {variable} not found")))?;
        value
            .parse::<f64>()
            .map_err(|e| DbError::query_failed(format!("non-numeric status {variable}: {e}")))
    }

    /// Runs a single-value query whose first column converts to f64.
    /// NULL (no rows or NULL aggregate) reads as an error so the
    /// monitoring collector can fall back.
    async fn scalar_f64(&self, sql: &str) -> Result<f64, DbError> {
        let mut guard = self.conn.lock().await;
        let conn = require(&mut guard)?;

        let row: Option<mysql_async::Row> = conn
            .query_first(sql)
            .await
            .map_err(|e| DbError::query_failed(e.to_string()))?;

        row.and_then(|row| row.get::<Option<f64>, _>(0))
            .flatten()
            .ok_or_else(|| DbError::query_failed("metric query returned no value"))
    }
}

fn require<'a>(guard: &'a mut Option<Conn>) -> Result<&'a mut Conn, DbError> {
    guard
        .as_mut()
        .ok_or_else(|| DbError::connection_failed("connection closed"))
}

/// Statements that produce a result set. `mysql_async` has no
/// prepare-then-inspect step for text queries, so classification is a
/// keyword heuristic.
fn returns_rows(sql: &str) -> bool {
    let upper = sql.trim().to_uppercase();
    upper.starts_with("SELECT")
        || upper.starts_with("SHOW")
        || upper.starts_with("DESCRIBE")
        || upper.starts_with("DESC")
        || upper.starts_with("EXPLAIN")
        || (upper.starts_with("WITH") && upper.contains("SELECT"))
}

#[async_trait]
impl Connection for MysqlConnection {
    fn kind(&self) -> DbKind {
        DbKind::MySql
    }

    async fn ping(&self) -> Result<(), DbError> {
        let mut guard = self.conn.lock().await;
        let conn = require(&mut guard)?;
        conn.query_drop("SELECT 1")
            .await
            .map_err(|e| DbError::connection_failed(e.to_string()))
    }

    async fn close(&self) -> Result<(), DbError> {
        let taken = self.conn.lock().await.take();
        match taken {
            Some(conn) => conn
                .disconnect()
                .await
                .map_err(|e| DbError::connection_failed(e.to_string())),
            None => Ok(()),
        }
    }

    async fn execute(&self, sql: &str) -> Result<QueryData, DbError> {
        let mut guard = self.conn.lock().await;
        let conn = require(&mut guard)?;

        let start = Instant::now();
        if returns_rows(sql) {
            let rows: Vec<mysql_async::Row> = conn
                .query(sql)
                .await
                .map_err(|e| DbError::query_failed(e.to_string()))?;
            let elapsed = start.elapsed();

            let columns: Vec<String> = rows
                .first()
                .map(|row| {
                    row.columns_ref()
                        .iter()
                        .map(|c| c.name_str().to_string())
                        .collect()
                })
                .unwrap_or_default();

            let data = rows.iter().map(row_to_record).collect();
            Ok(QueryData::rows(columns, data, elapsed))
        } else {
            let result = conn
                .query_iter(sql)
                .await
                .map_err(|e| DbError::query_failed(e.to_string()))?;
            let affected = result.affected_rows();
            result
                .drop_result()
                .await
                .map_err(|e| DbError::query_failed(e.to_string()))?;

            Ok(QueryData::affected(affected, start.elapsed()))
        }
    }

    async fn list_objects(&self, kind: ObjectKind) -> Result<Vec<ObjectInfo>, DbError> {
        let mut guard = self.conn.lock().await;
        let conn = require(&mut guard)?;

        let names: Vec<String> = match kind {
            ObjectKind::Tables => {
                let rows: Vec<mysql_async::Row> = conn
                    .query("SHOW TABLES")
                    .await
                    .map_err(|e| DbError::query_failed(e.to_string()))?;
                rows.iter().filter_map(|row| row.get::<String, _>(0)).collect()
            }
            ObjectKind::Views => {
                let rows: Vec<mysql_async::Row> = conn
                    .query("SHOW FULL TABLES WHERE Table_type = 'VIEW'")
                    .await
                    .map_err(|e| DbError::query_failed(e.to_string()))?;
                rows.iter().filter_map(|row| row.get::<String, _>(0)).collect()
            }
            ObjectKind::Procedures => {
                let rows: Vec<mysql_async::Row> = conn
                    .query("SHOW PROCEDURE STATUS WHERE Db = DATABASE()")
                    .await
                    .map_err(|e| DbError::query_failed(e.to_string()))?;
                rows.iter().filter_map(|row| row.get::<String, _>("Name")).collect()
            }
            ObjectKind::Functions => {
                let rows: Vec<mysql_async::Row> = conn
                    .query("SHOW FUNCTION STATUS WHERE Db = DATABASE()")
                    .await
                    .map_err(|e| DbError::query_failed(e.to_string()))?;
                rows.iter().filter_map(|row| row.get::<String, _>("Name")).collect()
            }
        };

        Ok(names.into_iter().map(ObjectInfo::new).collect())
    }

    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, DbError> {
        const SQL: &str = "
            SELECT COLUMN_NAME, COLUMN_TYPE, IS_NULLABLE, COLUMN_DEFAULT,
                   CHARACTER_MAXIMUM_LENGTH, NUMERIC_PRECISION, NUMERIC_SCALE,
                   COLUMN_KEY, EXTRA
            FROM information_schema.columns
            WHERE table_schema = DATABASE() AND table_name = ?
            ORDER BY ORDINAL_POSITION";

        let mut guard = self.conn.lock().await;
        let conn = require(&mut guard)?;

        let rows: Vec<mysql_async::Row> = conn
            .exec(SQL, (table,))
            .await
            .map_err(|e| DbError::query_failed(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| {
                let name: String = row.get(0).unwrap_or_default();
                let data_type: String = row.get(1).unwrap_or_default();
                let is_nullable: String = row.get(2).unwrap_or_default();
                let column_key: String = row.get(7).unwrap_or_default();
                let extra: String = row.get(8).unwrap_or_default();

                ColumnDescriptor {
                    nullable: is_nullable.eq_ignore_ascii_case("YES"),
                    default_value: row.get(3).unwrap_or(None),
                    char_max_length: row.get(4).unwrap_or(None),
                    numeric_precision: row.get(5).unwrap_or(None),
                    numeric_scale: row.get(6).unwrap_or(None),
                    is_primary_key: column_key == "PRI",
                    is_auto_increment: extra.to_lowercase().contains("auto_increment"),
                    ..ColumnDescriptor::new(name, data_type)
                }
            })
            .collect())
    }

    async fn probe_metric(&self, metric: MetricKind) -> Result<f64, DbError> {
        match metric {
            MetricKind::ActiveConnections => self.status_value("Threads_connected").await,
            MetricKind::TotalQueries => self.status_value("Questions").await,
            MetricKind::SlowQueries => self.status_value("Slow_queries").await,
            MetricKind::UptimeSecs => self.status_value("Uptime").await,
            MetricKind::AvgResponseTimeMs => {
                self.scalar_f64(
                    "SELECT AVG_TIMER_WAIT/1000000000
                     FROM performance_schema.events_statements_summary_global_by_event_name
                     WHERE EVENT_NAME = 'statement/sql/select'",
                )
                .await
            }
            MetricKind::CacheHitRatio => {
                let data = self.status_value("Innodb_buffer_pool_pages_data").await?;
                let total = self.status_value("Innodb_buffer_pool_pages_total").await?;
                if total <= 0.0 {
                    return Err(DbError::query_failed("buffer pool reports zero pages"));
                }
                Ok(data / total * 100.0)
            }
            MetricKind::LockWaits => {
                self.scalar_f64(
                    "SELECT COUNT(*)
                     FROM performance_schema.table_lock_waits_summary_by_table",
                )
                .await
            }
            MetricKind::CommittedTransactions => {
                self.scalar_f64(
                    "SELECT COUNT(*)
                     FROM performance_schema.events_transactions_summary_global_by_event_name
                     WHERE STATE = 'COMMITTED'",
                )
                .await
            }
            MetricKind::DatabaseSizeBytes => {
                self.scalar_f64(
                    "SELECT SUM(data_length + index_length)
                     FROM information_schema.tables
                     WHERE table_schema = DATABASE()",
                )
                .await
            }
            MetricKind::TableScanRate => {
                self.scalar_f64(
                    "SELECT SUM_ROWS_EXAMINED
                     FROM performance_schema.events_statements_summary_global_by_event_name
                     WHERE EVENT_NAME LIKE 'statement/sql/select%'",
                )
                .await
            }
            other => Err(DbError::not_supported(other.name())),
        }
    }

    async fn top_queries(&self) -> Result<Vec<TopQuery>, DbError> {
        let mut guard = self.conn.lock().await;
        let conn = require(&mut guard)?;

        let rows: Vec<mysql_async::Row> = conn
            .query("SHOW PROCESSLIST")
            .await
            .map_err(|e| DbError::query_failed(e.to_string()))?;

        Ok(rows
            .iter()
            .filter_map(|row| row.get::<Option<String>, _>("Info").flatten())
            .filter(|info| !info.trim().is_empty())
            .take(5)
            .map(|query| TopQuery { query, count: 1 })
            .collect())
    }

    async fn explain(&self, sql: &str) -> Result<String, DbError> {
        let mut guard = self.conn.lock().await;
        let conn = require(&mut guard)?;

        let rows: Vec<mysql_async::Row> = conn
            .query(format!("EXPLAIN {sql}"))
            .await
            .map_err(|e| DbError::query_failed(e.to_string()))?;

        let columns: Vec<String> = rows
            .first()
            .map(|row| {
                row.columns_ref()
                    .iter()
                    .map(|c| c.name_str().to_string())
                    .collect()
            })
            .unwrap_or_default();

        let cells: Vec<Vec<String>> = rows
            .iter()
            .map(|row| {
                (0..row.len())
                    .map(|i| display_value(row.as_ref(i)))
                    .collect()
            })
            .collect();

        let mut plan = format!("MySQL Estimated Execution Plan for query:\n{sql}\n\n");
        plan.push_str("Execution Plan:\n");
        plan.push_str(&text_table(&columns, &cells));
        plan.push_str("\nPlan Analysis:\n");
        plan.push_str("- The rows column estimates how many rows each step scans\n");
        plan.push_str("- Key columns indicate index usage\n");
        plan.push_str("- Type ALL means a full table scan; index means an index scan\n");
        Ok(plan)
    }
}

fn row_to_record(row: &mysql_async::Row) -> Row {
    let mut record = Row::new();
    for (i, column) in row.columns_ref().iter().enumerate() {
        record.insert(column.name_str().to_string(), value_to_json(row.as_ref(i)));
    }
    record
}

fn value_to_json(value: Option<&Value>) -> serde_json::Value {
    let Some(value) = value else {
        return serde_json::Value::Null;
    };

    match value {
        Value::NULL => serde_json::Value::Null,
        Value::Bytes(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => serde_json::Value::String(text.to_string()),
            Err(_) => serde_json::Value::String(
                base64::engine::general_purpose::STANDARD.encode(bytes),
            ),
        },
        Value::Int(i) => serde_json::Value::from(*i),
        Value::UInt(u) => serde_json::Value::from(*u),
        Value::Float(f) => serde_json::Number::from_f64(f64::from(*f))
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Double(d) => serde_json::Number::from_f64(*d)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        Value::Date(year, month, day, hour, minute, second, micro) => {
            serde_json::Value::String(format!(
                "{year:04}-{month:02}-{day:02}T{hour:02}:{minute:02}:{second:02}.{micro:06}"
            ))
        }
        Value::Time(negative, days, hours, minutes, seconds, micros) => {
            let sign = if *negative { "-" } else { "" };
            let total_hours = days * 24 + u32::from(*hours);
            serde_json::Value::String(format!(
                "{sign}{total_hours}:{minutes:02}:{seconds:02}.{micros:06}"
            ))
        }
    }
}

fn display_value(value: Option<&Value>) -> String {
    match value_to_json(value) {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

/// Pads cells into a readable fixed-width table for plan reports.
fn text_table(columns: &[String], rows: &[Vec<String>]) -> String {
    if columns.is_empty() {
        return "No execution plan data returned.\n".to_string();
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.len()).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len());
            }
        }
    }

    let mut out = String::new();
    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{c:<w$}"))
        .collect();
    out.push_str(&header.join(" | "));
    out.push('\n');
    out.push_str(&widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-|-"));
    out.push('\n');

    for row in rows {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{cell:<w$}"))
            .collect();
        out.push_str(&line.join(" | "));
        out.push('\n');
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_row_returning_statements() {
        assert!(returns_rows("SELECT 1"));
        assert!(returns_rows("  show tables"));
        assert!(returns_rows("WITH t AS (SELECT 1) SELECT * FROM t"));
        assert!(returns_rows("EXPLAIN SELECT 1"));
        assert!(!returns_rows("INSERT INTO t VALUES (1)"));
        assert!(!returns_rows("UPDATE t SET x = 1"));
        assert!(!returns_rows("CREATE TABLE t (x INT)"));
    }

    #[test]
    fn converts_values_to_json() {
        assert_eq!(value_to_json(Some(&Value::Int(5))), serde_json::json!(5));
        assert_eq!(value_to_json(Some(&Value::NULL)), serde_json::Value::Null);
        assert_eq!(
            value_to_json(Some(&Value::Bytes(b"abc".to_vec()))),
            serde_json::json!("abc")
        );
        assert_eq!(value_to_json(None), serde_json::Value::Null);
    }

    #[test]
    fn text_table_pads_columns() {
        let table = text_table(
            &["id".to_string(), "select_type".to_string()],
            &[vec!["1".to_string(), "SIMPLE".to_string()]],
        );

        let lines: Vec<&str> = table.lines().collect();
        assert_eq!(lines[0], "id | select_type");
        assert_eq!(lines[2], "1  | SIMPLE     ");
    }
}
