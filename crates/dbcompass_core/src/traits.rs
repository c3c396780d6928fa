use crate::{
    ColumnDescriptor, ConnectionProfile, DbError, DbKind, MetricKind, ObjectInfo, ObjectKind,
    QueryData, TopQuery,
};
use async_trait::async_trait;

/// Factory for opening connections to one database engine.
///
/// One implementation per engine, registered in the `ConnectionRegistry`
/// by `DbKind` at startup. Services dispatch through this trait and never
/// branch on the engine type themselves.
#[async_trait]
pub trait EngineAdapter: Send + Sync {
    /// Returns the engine this adapter handles.
    fn kind(&self) -> DbKind;

    /// Human-readable name for UI display (e.g., "PostgreSQL", "SQLite").
    fn display_name(&self) -> &'static str {
        self.kind().display_name()
    }

    /// Opens a native session, honoring the profile's connect timeout and
    /// TLS mode where the engine supports them.
    async fn connect(&self, profile: &ConnectionProfile) -> Result<Box<dyn Connection>, DbError>;

    /// Opens a short-lived connection, issues a trivial round-trip, and
    /// closes it on both the success and failure path. No handle survives
    /// a test.
    async fn test_connection(&self, profile: &ConnectionProfile) -> Result<(), DbError> {
        let conn = self.connect(profile).await?;
        let outcome = conn.ping().await;
        if let Err(e) = conn.close().await {
            log::warn!("Error closing test connection: {e}");
        }
        outcome
    }
}

/// Active database connection.
///
/// Implementations must be thread-safe (`Send + Sync`): one handle is
/// shared by query execution, introspection, and monitoring for a given
/// profile id. Native errors are converted to `DbError` at this boundary,
/// preserving the driver's message text.
#[async_trait]
pub trait Connection: Send + Sync {
    /// Returns the engine kind for this connection.
    fn kind(&self) -> DbKind;

    /// Lightweight liveness round-trip (`SELECT 1` or equivalent).
    async fn ping(&self) -> Result<(), DbError>;

    /// Closes the connection and releases native resources. Subsequent
    /// calls on a closed connection fail with `ConnectionFailed`.
    async fn close(&self) -> Result<(), DbError>;

    /// Executes query text verbatim — no parsing or sanitization at this
    /// layer — and measures wall-clock time around the native call.
    /// Row-shaped and affected-rows-shaped results are distinguished in
    /// the returned `QueryData`.
    async fn execute(&self, sql: &str) -> Result<QueryData, DbError>;

    /// Lists schema objects of the given kind. Engines lacking a concept
    /// (SQLite procedures, MongoDB functions) return an empty list rather
    /// than erroring.
    async fn list_objects(&self, kind: ObjectKind) -> Result<Vec<ObjectInfo>, DbError>;

    /// Column metadata for one table, from the engine's catalog. MongoDB
    /// infers it by sampling documents.
    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, DbError>;

    /// Reads one numeric operational metric. `NotSupported` is a normal
    /// answer here; the monitoring collector substitutes a fallback.
    async fn probe_metric(&self, metric: MetricKind) -> Result<f64, DbError>;

    /// Top queries by call count, where the engine exposes them.
    async fn top_queries(&self) -> Result<Vec<TopQuery>, DbError> {
        Err(DbError::not_supported("top queries"))
    }

    /// Engine-native estimated execution plan, rendered as a readable
    /// report. Diagnostic output for a human; format stability is not a
    /// contract.
    async fn explain(&self, sql: &str) -> Result<String, DbError>;
}
