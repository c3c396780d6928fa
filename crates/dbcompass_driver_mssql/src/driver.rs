use async_trait::async_trait;
use base64::Engine as _;
use dbcompass_core::{
    ColumnDescriptor, Connection, ConnectionProfile, DbError, DbKind, EngineAdapter, MetricKind,
    ObjectInfo, ObjectKind, QueryData, Row, SslMode, TopQuery,
};
use std::time::Instant;
use tiberius::{AuthMethod, Client, ColumnData, Config, EncryptionLevel};
use tokio::net::TcpStream;
use tokio::sync::Mutex;
use tokio_util::compat::{Compat, TokioAsyncWriteCompatExt};

type MsClient = Client<Compat<TcpStream>>;

/// SQL Server adapter over the TDS protocol. `sslMode = require` turns on
/// channel encryption; the server certificate is trusted as-is, matching
/// how desktop clients usually reach development instances.
pub struct MssqlAdapter;

#[async_trait]
impl EngineAdapter for MssqlAdapter {
    fn kind(&self) -> DbKind {
        DbKind::MsSql
    }

    async fn connect(&self, profile: &ConnectionProfile) -> Result<Box<dyn Connection>, DbError> {
        let mut config = Config::new();
        config.host(&profile.host);
        config.port(profile.effective_port());
        if !profile.database.trim().is_empty() {
            config.database(&profile.database);
        }
        config.authentication(AuthMethod::sql_server(
            &profile.username,
            profile.password.as_deref().unwrap_or(""),
        ));
        config.trust_cert();
        if profile.ssl_mode != SslMode::Require {
            config.encryption(EncryptionLevel::NotSupported);
        }

        let addr = config.get_addr();
        let connect = async move {
            let tcp = TcpStream::connect(&addr)
                .await
                .map_err(|e| DbError::connection_failed(format!("Failed to reach {addr}: {e}")))?;
            tcp.set_nodelay(true)
                .map_err(|e| DbError::connection_failed(e.to_string()))?;

            Client::connect(config, tcp.compat_write())
                .await
                .map_err(|e| {
                    DbError::connection_failed(format!("Failed to connect to SQL Server: {e}"))
                })
        };

        let client = tokio::time::timeout(profile.connect_timeout(), connect)
            .await
            .map_err(|_| DbError::Timeout)??;

        Ok(Box::new(MssqlConnection {
            client: Mutex::new(Some(client)),
        }))
    }
}

struct MssqlConnection {
    client: Mutex<Option<MsClient>>,
}

impl MssqlConnection {
    /// Single-value metric query; the SQL casts its result to FLOAT.
    async fn scalar_f64(&self, sql: &str) -> Result<f64, DbError> {
        let mut guard = self.client.lock().await;
        let client = require(&mut guard)?;

        let row = client
            .simple_query(sql)
            .await
            .map_err(|e| DbError::query_failed(e.to_string()))?
            .into_row()
            .await
            .map_err(|e| DbError::query_failed(e.to_string()))?
            .ok_or_else(|| DbError::query_failed("metric query returned no rows"))?;

        row.get::<f64, _>(0)
            .ok_or_else(|| DbError::query_failed("metric query returned no value"))
    }
}

fn require<'a>(guard: &'a mut Option<MsClient>) -> Result<&'a mut MsClient, DbError> {
    guard
        .as_mut()
        .ok_or_else(|| DbError::connection_failed("connection closed"))
}

fn returns_rows(sql: &str) -> bool {
    let upper = sql.trim().to_uppercase();
    upper.starts_with("SELECT")
        || upper.starts_with("EXEC")
        || (upper.starts_with("WITH") && upper.contains("SELECT"))
}

#[async_trait]
impl Connection for MssqlConnection {
    fn kind(&self) -> DbKind {
        DbKind::MsSql
    }

    async fn ping(&self) -> Result<(), DbError> {
        let mut guard = self.client.lock().await;
        let client = require(&mut guard)?;
        client
            .simple_query("SELECT 1")
            .await
            .map_err(|e| DbError::connection_failed(e.to_string()))?
            .into_results()
            .await
            .map(|_| ())
            .map_err(|e| DbError::connection_failed(e.to_string()))
    }

    async fn close(&self) -> Result<(), DbError> {
        let taken = self.client.lock().await.take();
        match taken {
            Some(client) => client
                .close()
                .await
                .map_err(|e| DbError::connection_failed(e.to_string())),
            None => Ok(()),
        }
    }

    async fn execute(&self, sql: &str) -> Result<QueryData, DbError> {
        let mut guard = self.client.lock().await;
        let client = require(&mut guard)?;

        let start = Instant::now();
        if returns_rows(sql) {
            let result_sets = client
                .simple_query(sql)
                .await
                .map_err(|e| DbError::query_failed(e.to_string()))?
                .into_results()
                .await
                .map_err(|e| DbError::query_failed(e.to_string()))?;
            let elapsed = start.elapsed();

            let rows = result_sets.into_iter().next().unwrap_or_default();
            let columns: Vec<String> = rows
                .first()
                .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
                .unwrap_or_default();

            let data = rows.iter().map(row_to_record).collect();
            Ok(QueryData::rows(columns, data, elapsed))
        } else {
            let result = client
                .execute(sql, &[])
                .await
                .map_err(|e| DbError::query_failed(e.to_string()))?;
            Ok(QueryData::affected(result.total(), start.elapsed()))
        }
    }

    async fn list_objects(&self, kind: ObjectKind) -> Result<Vec<ObjectInfo>, DbError> {
        let sql = match kind {
            ObjectKind::Tables => "SELECT name FROM sys.tables WHERE type = 'U' ORDER BY name",
            ObjectKind::Views => "SELECT name FROM sys.views ORDER BY name",
            ObjectKind::Procedures => "SELECT name FROM sys.procedures ORDER BY name",
            ObjectKind::Functions => {
                "SELECT name FROM sys.objects WHERE type IN ('FN', 'IF', 'TF') ORDER BY name"
            }
        };

        let mut guard = self.client.lock().await;
        let client = require(&mut guard)?;
        let rows = client
            .simple_query(sql)
            .await
            .map_err(|e| DbError::query_failed(e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| DbError::query_failed(e.to_string()))?;

        Ok(rows
            .iter()
            .filter_map(|row| row.get::<&str, _>(0))
            .map(ObjectInfo::new)
            .collect())
    }

    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, DbError> {
        const SQL: &str = "
            SELECT c.COLUMN_NAME,
                   c.DATA_TYPE,
                   c.IS_NULLABLE,
                   c.COLUMN_DEFAULT,
                   CAST(c.CHARACTER_MAXIMUM_LENGTH AS BIGINT) AS char_max_length,
                   CAST(c.NUMERIC_PRECISION AS BIGINT) AS numeric_precision,
                   CAST(c.NUMERIC_SCALE AS BIGINT) AS numeric_scale,
                   CAST(COLUMNPROPERTY(OBJECT_ID(c.TABLE_NAME), c.COLUMN_NAME, 'IsIdentity')
                        AS BIGINT) AS is_identity,
                   CAST(CASE WHEN pk.COLUMN_NAME IS NOT NULL THEN 1 ELSE 0 END
                        AS BIGINT) AS is_primary_key
            FROM INFORMATION_SCHEMA.COLUMNS c
            LEFT JOIN (
                SELECT ku.TABLE_NAME, ku.COLUMN_NAME
                FROM INFORMATION_SCHEMA.TABLE_CONSTRAINTS tc
                JOIN INFORMATION_SCHEMA.KEY_COLUMN_USAGE ku
                  ON tc.CONSTRAINT_NAME = ku.CONSTRAINT_NAME
                WHERE tc.CONSTRAINT_TYPE = 'PRIMARY KEY'
            ) pk ON pk.TABLE_NAME = c.TABLE_NAME AND pk.COLUMN_NAME = c.COLUMN_NAME
            WHERE c.TABLE_NAME = @P1
            ORDER BY c.ORDINAL_POSITION";

        let mut guard = self.client.lock().await;
        let client = require(&mut guard)?;
        let rows = client
            .query(SQL, &[&table])
            .await
            .map_err(|e| DbError::query_failed(e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| DbError::query_failed(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| {
                let name = row.get::<&str, _>(0).unwrap_or_default().to_string();
                let data_type = row.get::<&str, _>(1).unwrap_or_default().to_string();
                let is_nullable = row.get::<&str, _>(2).unwrap_or_default();

                ColumnDescriptor {
                    nullable: is_nullable.eq_ignore_ascii_case("YES"),
                    default_value: row.get::<&str, _>(3).map(str::to_string),
                    char_max_length: row.get::<i64, _>(4),
                    numeric_precision: row.get::<i64, _>(5),
                    numeric_scale: row.get::<i64, _>(6),
                    is_auto_increment: row.get::<i64, _>(7) == Some(1),
                    is_primary_key: row.get::<i64, _>(8) == Some(1),
                    ..ColumnDescriptor::new(name, data_type)
                }
            })
            .collect())
    }

    async fn probe_metric(&self, metric: MetricKind) -> Result<f64, DbError> {
        let sql = match metric {
            MetricKind::ActiveConnections => {
                "SELECT CAST(COUNT(*) AS FLOAT) FROM sys.dm_exec_sessions
                 WHERE is_user_process = 1 AND status = 'running'"
            }
            MetricKind::TotalQueries => {
                "SELECT CAST(ISNULL(SUM(execution_count), 0) AS FLOAT)
                 FROM sys.dm_exec_query_stats"
            }
            MetricKind::SlowQueries => {
                "SELECT CAST(COUNT(*) AS FLOAT) FROM sys.dm_exec_query_stats
                 WHERE total_elapsed_time / execution_count > 100000"
            }
            MetricKind::UptimeSecs => {
                "SELECT CAST(DATEDIFF(second, sqlserver_start_time, GETDATE()) AS FLOAT)
                 FROM sys.dm_os_sys_info"
            }
            MetricKind::AvgResponseTimeMs => {
                "SELECT CAST(ISNULL(AVG(total_elapsed_time / execution_count), 0) AS FLOAT)
                 FROM sys.dm_exec_query_stats WHERE execution_count > 0"
            }
            MetricKind::CacheHitRatio => {
                "SELECT CAST((CAST(cached_pages AS FLOAT) / (cached_pages + 1)) * 100 AS FLOAT)
                 FROM (
                     SELECT COUNT(*) AS cached_pages
                     FROM sys.dm_os_buffer_descriptors
                     WHERE database_id = DB_ID()
                 ) AS cache_stats"
            }
            MetricKind::LockWaits => {
                "SELECT CAST(COUNT(*) AS FLOAT) FROM sys.dm_os_wait_stats
                 WHERE wait_type LIKE 'LCK%'"
            }
            MetricKind::CommittedTransactions => {
                "SELECT CAST(cntr_value AS FLOAT) FROM sys.dm_os_performance_counters
                 WHERE counter_name = 'Transactions/sec' AND instance_name = '_Total'"
            }
            MetricKind::DatabaseSizeBytes => {
                "SELECT CAST(ISNULL(SUM(size), 0) * 8.0 * 1024 AS FLOAT)
                 FROM sys.master_files WHERE database_id = DB_ID()"
            }
            other => return Err(DbError::not_supported(other.name())),
        };

        self.scalar_f64(sql).await
    }

    async fn top_queries(&self) -> Result<Vec<TopQuery>, DbError> {
        const SQL: &str = "
            SELECT TOP 5
                SUBSTRING(st.text, (qs.statement_start_offset / 2) + 1,
                    ((CASE qs.statement_end_offset
                        WHEN -1 THEN DATALENGTH(st.text)
                        ELSE qs.statement_end_offset
                      END - qs.statement_start_offset) / 2) + 1) AS statement_text,
                CAST(qs.execution_count AS BIGINT) AS execution_count
            FROM sys.dm_exec_query_stats qs
            CROSS APPLY sys.dm_exec_sql_text(qs.sql_handle) st
            ORDER BY qs.execution_count DESC";

        let mut guard = self.client.lock().await;
        let client = require(&mut guard)?;
        let rows = client
            .simple_query(SQL)
            .await
            .map_err(|e| DbError::query_failed(e.to_string()))?
            .into_first_result()
            .await
            .map_err(|e| DbError::query_failed(e.to_string()))?;

        Ok(rows
            .iter()
            .filter_map(|row| {
                let query = row.get::<&str, _>(0)?.to_string();
                let count = row.get::<i64, _>(1).unwrap_or(0).max(0) as u64;
                Some(TopQuery { query, count })
            })
            .collect())
    }

    async fn explain(&self, sql: &str) -> Result<String, DbError> {
        let mut guard = self.client.lock().await;
        let client = require(&mut guard)?;

        client
            .simple_query("SET SHOWPLAN_ALL ON")
            .await
            .map_err(|e| DbError::query_failed(e.to_string()))?
            .into_results()
            .await
            .map_err(|e| DbError::query_failed(e.to_string()))?;

        // The showplan rows come back instead of query results. Capture the
        // outcome but restore the session mode before reporting it.
        let plan_result = async {
            client
                .simple_query(sql)
                .await
                .map_err(|e| DbError::query_failed(e.to_string()))?
                .into_results()
                .await
                .map_err(|e| DbError::query_failed(e.to_string()))
        }
        .await;

        let off_result = async {
            client
                .simple_query("SET SHOWPLAN_ALL OFF")
                .await
                .map_err(|e| DbError::query_failed(e.to_string()))?
                .into_results()
                .await
                .map_err(|e| DbError::query_failed(e.to_string()))
        }
        .await;

        let result_sets = plan_result?;
        off_result?;

        let rows = result_sets.into_iter().next().unwrap_or_default();
        let columns: Vec<String> = rows
            .first()
            .map(|row| row.columns().iter().map(|c| c.name().to_string()).collect())
            .unwrap_or_default();
        let cells: Vec<Vec<String>> = rows
            .iter()
            .map(|row| row.cells().map(|(_, data)| display_value(data)).collect())
            .collect();

        let mut plan = format!("SQL Server Estimated Execution Plan for query:\n{sql}\n\n");
        plan.push_str("Execution Plan:\n");
        plan.push_str(&text_table(&columns, &cells));
        plan.push_str("\nPlan Analysis:\n");
        plan.push_str("- StmtText shows the SQL statement being executed\n");
        plan.push_str("- LogicalOp shows the logical operation (e.g., Index Seek)\n");
        plan.push_str("- EstimateRows shows the estimated number of rows\n");
        plan.push_str("- EstimateIO and EstimateCPU show cost components\n");
        Ok(plan)
    }
}

fn row_to_record(row: &tiberius::Row) -> Row {
    let mut record = Row::new();
    for (column, data) in row.cells() {
        record.insert(column.name().to_string(), column_data_to_json(data));
    }
    record
}

fn column_data_to_json(data: &ColumnData<'_>) -> serde_json::Value {
    match data {
        ColumnData::Bit(v) => v.map(serde_json::Value::Bool).unwrap_or(serde_json::Value::Null),
        ColumnData::U8(v) => v.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null),
        ColumnData::I16(v) => v.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null),
        ColumnData::I32(v) => v.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null),
        ColumnData::I64(v) => v.map(serde_json::Value::from).unwrap_or(serde_json::Value::Null),
        ColumnData::F32(v) => v
            .and_then(|f| serde_json::Number::from_f64(f64::from(f)))
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ColumnData::F64(v) => v
            .and_then(serde_json::Number::from_f64)
            .map(serde_json::Value::Number)
            .unwrap_or(serde_json::Value::Null),
        ColumnData::String(v) => v
            .as_deref()
            .map(|s| serde_json::Value::String(s.to_string()))
            .unwrap_or(serde_json::Value::Null),
        ColumnData::Guid(v) => v
            .map(|g| serde_json::Value::String(g.to_string()))
            .unwrap_or(serde_json::Value::Null),
        ColumnData::Binary(v) => v
            .as_deref()
            .map(|bytes| {
                serde_json::Value::String(
                    base64::engine::general_purpose::STANDARD.encode(bytes),
                )
            })
            .unwrap_or(serde_json::Value::Null),
        // Numerics, date/time families, and XML render through their debug
        // shape; the grid shows them as text either way.
        other => serde_json::Value::String(format!("{other:?}")),
    }
}

fn display_value(data: &ColumnData<'_>) -> String {
    match column_data_to_json(data) {
        serde_json::Value::Null => "NULL".to_string(),
        serde_json::Value::String(s) => s,
        other => other.to_string(),
    }
}

fn text_table(columns: &[String], rows: &[Vec<String>]) -> String {
    if columns.is_empty() {
        return "No execution plan data returned.\n".to_string();
    }

    let mut widths: Vec<usize> = columns.iter().map(|c| c.len().min(30)).collect();
    for row in rows {
        for (i, cell) in row.iter().enumerate() {
            if i < widths.len() {
                widths[i] = widths[i].max(cell.len().min(30));
            }
        }
    }

    let mut out = String::new();
    let header: Vec<String> = columns
        .iter()
        .zip(&widths)
        .map(|(c, w)| format!("{:<w$}", truncate(c, 30)))
        .collect();
    out.push_str(&header.join(" | "));
    out.push('\n');
    out.push_str(&widths.iter().map(|w| "-".repeat(*w)).collect::<Vec<_>>().join("-|-"));
    out.push('\n');

    for row in rows {
        let line: Vec<String> = row
            .iter()
            .zip(&widths)
            .map(|(cell, w)| format!("{:<w$}", truncate(cell, 30)))
            .collect();
        out.push_str(&line.join(" | "));
        out.push('\n');
    }

    out
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        s.to_string()
    } else {
        s.chars().take(max).collect()
    }
}
