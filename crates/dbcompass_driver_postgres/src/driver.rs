use async_trait::async_trait;
use dbcompass_core::{
    ColumnDescriptor, Connection, ConnectionProfile, DbError, DbKind, EngineAdapter, MetricKind,
    ObjectInfo, ObjectKind, QueryData, Row, SslMode, TopQuery,
};
use std::time::Instant;
use tokio::sync::Mutex;
use tokio_postgres::{Client, SimpleQueryMessage};

/// PostgreSQL adapter on `tokio-postgres`. `sslMode = require` negotiates
/// TLS via native-tls, accepting the server certificate as-is (the client
/// is a browsing tool, not a trust anchor).
pub struct PostgresAdapter;

#[async_trait]
impl EngineAdapter for PostgresAdapter {
    fn kind(&self) -> DbKind {
        DbKind::Postgres
    }

    async fn connect(&self, profile: &ConnectionProfile) -> Result<Box<dyn Connection>, DbError> {
        let mut config = tokio_postgres::Config::new();
        config
            .host(&profile.host)
            .port(profile.effective_port())
            .user(&profile.username)
            .dbname(&profile.database)
            .connect_timeout(profile.connect_timeout());
        if let Some(password) = &profile.password {
            config.password(password);
        }

        let client = match profile.ssl_mode {
            SslMode::Require => {
                let tls = native_tls::TlsConnector::builder()
                    .danger_accept_invalid_certs(true)
                    .build()
                    .map_err(|e| DbError::connection_failed(e.to_string()))?;
                let connector = postgres_native_tls::MakeTlsConnector::new(tls);

                let (client, connection) = config
                    .connect(connector)
                    .await
                    .map_err(|e| DbError::connection_failed(e.to_string()))?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::debug!("PostgreSQL connection task ended: {e}");
                    }
                });
                client
            }
            SslMode::Disable | SslMode::Prefer => {
                let (client, connection) = config
                    .connect(tokio_postgres::NoTls)
                    .await
                    .map_err(|e| DbError::connection_failed(e.to_string()))?;
                tokio::spawn(async move {
                    if let Err(e) = connection.await {
                        log::debug!("PostgreSQL connection task ended: {e}");
                    }
                });
                client
            }
        };

        Ok(Box::new(PostgresConnection {
            client: Mutex::new(Some(client)),
        }))
    }
}

struct PostgresConnection {
    client: Mutex<Option<Client>>,
}

impl PostgresConnection {
    async fn scalar_f64(&self, sql: &str) -> Result<f64, DbError> {
        let guard = self.client.lock().await;
        let client = require(&guard)?;

        let row = client
            .query_opt(sql, &[])
            .await
            .map_err(|e| DbError::query_failed(e.to_string()))?
            .ok_or_else(|| DbError::query_failed("metric query returned no rows"))?;

        row.try_get::<_, f64>(0)
            .map_err(|e| DbError::query_failed(e.to_string()))
    }
}

fn require<'a>(guard: &'a Option<Client>) -> Result<&'a Client, DbError> {
    guard
        .as_ref()
        .ok_or_else(|| DbError::connection_failed("connection closed"))
}

#[async_trait]
impl Connection for PostgresConnection {
    fn kind(&self) -> DbKind {
        DbKind::Postgres
    }

    async fn ping(&self) -> Result<(), DbError> {
        let guard = self.client.lock().await;
        let client = require(&guard)?;
        client
            .simple_query("SELECT 1")
            .await
            .map(|_| ())
            .map_err(|e| DbError::connection_failed(e.to_string()))
    }

    async fn close(&self) -> Result<(), DbError> {
        // Dropping the client terminates the background connection task.
        self.client.lock().await.take();
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<QueryData, DbError> {
        let guard = self.client.lock().await;
        let client = require(&guard)?;

        let start = Instant::now();
        let messages = client
            .simple_query(sql)
            .await
            .map_err(|e| DbError::query_failed(e.to_string()))?;
        let elapsed = start.elapsed();

        let mut columns: Vec<String> = Vec::new();
        let mut rows = Vec::new();
        let mut affected = None;

        for message in messages {
            match message {
                SimpleQueryMessage::Row(row) => {
                    if columns.is_empty() {
                        columns = row
                            .columns()
                            .iter()
                            .map(|c| c.name().to_string())
                            .collect();
                    }
                    let mut record = Row::new();
                    for (i, column) in row.columns().iter().enumerate() {
                        let value = row
                            .get(i)
                            .map(|text| serde_json::Value::String(text.to_string()))
                            .unwrap_or(serde_json::Value::Null);
                        record.insert(column.name().to_string(), value);
                    }
                    rows.push(record);
                }
                SimpleQueryMessage::CommandComplete(count) => {
                    affected = Some(count);
                }
                // Empty result sets still announce their columns here.
                SimpleQueryMessage::RowDescription(description) => {
                    if columns.is_empty() {
                        columns = description
                            .iter()
                            .map(|c| c.name().to_string())
                            .collect();
                    }
                }
                _ => {}
            }
        }

        if columns.is_empty() {
            Ok(QueryData::affected(affected.unwrap_or(0), elapsed))
        } else {
            Ok(QueryData::rows(columns, rows, elapsed))
        }
    }

    async fn list_objects(&self, kind: ObjectKind) -> Result<Vec<ObjectInfo>, DbError> {
        let sql = match kind {
            ObjectKind::Tables => {
                "SELECT tablename AS name FROM pg_tables
                 WHERE schemaname = 'public' ORDER BY tablename"
            }
            ObjectKind::Views => {
                "SELECT viewname AS name FROM pg_views
                 WHERE schemaname = 'public' ORDER BY viewname"
            }
            ObjectKind::Procedures => {
                "SELECT proname AS name FROM pg_proc p
                 JOIN pg_namespace n ON p.pronamespace = n.oid
                 WHERE n.nspname = 'public' AND p.prokind = 'p' ORDER BY proname"
            }
            ObjectKind::Functions => {
                "SELECT routine_name AS name FROM information_schema.routines
                 WHERE routine_type = 'FUNCTION' AND routine_schema = 'public'
                 ORDER BY routine_name"
            }
        };

        let guard = self.client.lock().await;
        let client = require(&guard)?;
        let rows = client
            .query(sql, &[])
            .await
            .map_err(|e| DbError::query_failed(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| ObjectInfo::new(row.get::<_, String>(0)))
            .collect())
    }

    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, DbError> {
        const SQL: &str = "
            SELECT c.column_name,
                   c.data_type,
                   c.is_nullable = 'YES' AS nullable,
                   c.column_default,
                   c.character_maximum_length::int8,
                   c.numeric_precision::int8,
                   c.numeric_scale::int8,
                   COALESCE(c.is_identity = 'YES', false)
                       OR COALESCE(c.column_default LIKE 'nextval(%', false) AS is_auto_increment,
                   EXISTS (
                       SELECT 1
                       FROM pg_index i
                       JOIN pg_class t ON t.oid = i.indrelid
                       JOIN pg_attribute a ON a.attrelid = t.oid AND a.attnum = ANY(i.indkey)
                       WHERE t.relname = c.table_name
                         AND i.indisprimary
                         AND a.attname = c.column_name
                   ) AS is_primary_key
            FROM information_schema.columns c
            WHERE c.table_schema = 'public' AND c.table_name = $1
            ORDER BY c.ordinal_position";

        let guard = self.client.lock().await;
        let client = require(&guard)?;
        let rows = client
            .query(SQL, &[&table])
            .await
            .map_err(|e| DbError::query_failed(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| ColumnDescriptor {
                nullable: row.get(2),
                default_value: row.get(3),
                char_max_length: row.get(4),
                numeric_precision: row.get(5),
                numeric_scale: row.get(6),
                is_auto_increment: row.get(7),
                is_primary_key: row.get(8),
                ..ColumnDescriptor::new(
                    row.get::<_, String>(0),
                    row.get::<_, String>(1),
                )
            })
            .collect())
    }

    async fn probe_metric(&self, metric: MetricKind) -> Result<f64, DbError> {
        let sql = match metric {
            MetricKind::ActiveConnections => {
                "SELECT count(*)::float8 FROM pg_stat_activity WHERE state = 'active'"
            }
            MetricKind::TotalQueries => {
                "SELECT COALESCE(sum(calls), 0)::float8 FROM pg_stat_statements"
            }
            MetricKind::SlowQueries => {
                "SELECT count(*)::float8 FROM pg_stat_statements WHERE mean_exec_time > 100"
            }
            MetricKind::UptimeSecs => {
                "SELECT EXTRACT(EPOCH FROM (now() - pg_postmaster_start_time()))::float8"
            }
            MetricKind::AvgResponseTimeMs => {
                "SELECT COALESCE(avg(mean_exec_time), 0)::float8 FROM pg_stat_statements"
            }
            MetricKind::CacheHitRatio => {
                "SELECT COALESCE(blks_hit::float8 / NULLIF(blks_read + blks_hit, 0) * 100, 0)
                 FROM pg_stat_database WHERE datname = current_database()"
            }
            MetricKind::LockWaits => "SELECT count(*)::float8 FROM pg_locks WHERE NOT granted",
            MetricKind::Deadlocks => {
                "SELECT COALESCE(deadlocks, 0)::float8 FROM pg_stat_database
                 WHERE datname = current_database()"
            }
            MetricKind::CommittedTransactions => {
                "SELECT COALESCE(xact_commit, 0)::float8 FROM pg_stat_database
                 WHERE datname = current_database()"
            }
            MetricKind::RolledBackTransactions => {
                "SELECT COALESCE(xact_rollback, 0)::float8 FROM pg_stat_database
                 WHERE datname = current_database()"
            }
            MetricKind::DatabaseSizeBytes => {
                "SELECT pg_database_size(current_database())::float8"
            }
            MetricKind::ReplicationLagSecs => {
                "SELECT COALESCE(EXTRACT(EPOCH FROM (now() - pg_last_xact_replay_timestamp())), 0)::float8"
            }
            MetricKind::TableScanRate => {
                "SELECT COALESCE(sum(seq_scan), 0)::float8 FROM pg_stat_user_tables"
            }
        };

        self.scalar_f64(sql).await
    }

    async fn top_queries(&self) -> Result<Vec<TopQuery>, DbError> {
        let guard = self.client.lock().await;
        let client = require(&guard)?;
        let rows = client
            .query(
                "SELECT query, calls FROM pg_stat_statements ORDER BY calls DESC LIMIT 5",
                &[],
            )
            .await
            .map_err(|e| DbError::query_failed(e.to_string()))?;

        Ok(rows
            .iter()
            .map(|row| TopQuery {
                query: row.get(0),
                count: row.get::<_, i64>(1).max(0) as u64,
            })
            .collect())
    }

    async fn explain(&self, sql: &str) -> Result<String, DbError> {
        let guard = self.client.lock().await;
        let client = require(&guard)?;

        let messages = client
            .simple_query(&format!("EXPLAIN {sql}"))
            .await
            .map_err(|e| DbError::query_failed(e.to_string()))?;

        let mut lines = Vec::new();
        for message in messages {
            if let SimpleQueryMessage::Row(row) = message {
                lines.push(row.get(0).unwrap_or("").to_string());
            }
        }

        Ok(render_plan(sql, &lines))
    }
}

fn render_plan(sql: &str, lines: &[String]) -> String {
    let mut plan = format!("PostgreSQL Estimated Execution Plan for query:\n{sql}\n\n");
    plan.push_str("Execution Plan:\n");
    for line in lines {
        plan.push_str("  ");
        plan.push_str(line);
        plan.push('\n');
    }
    plan.push_str("\nPlan Analysis:\n");
    plan.push_str("- The plan shows the query execution steps\n");
    plan.push_str("- Look for sequential scans (Seq Scan) which may indicate missing indexes\n");
    plan.push_str("- Cost values show relative expense of each step\n");
    plan
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn render_plan_indents_each_step() {
        let plan = render_plan(
            "SELECT 1",
            &["Seq Scan on users  (cost=0.00..1.10)".to_string()],
        );

        assert!(plan.contains("  Seq Scan on users"));
        assert!(plan.contains("Plan Analysis"));
        assert!(plan.starts_with("PostgreSQL Estimated Execution Plan"));
    }
}
