use async_trait::async_trait;
use dbcompass_core::{
    ColumnDescriptor, Connection, ConnectionProfile, DbError, DbKind, EngineAdapter, MetricKind,
    ObjectInfo, ObjectKind, QueryData, TopQuery,
};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::time::Duration;

/// Scripted outcome for one query text.
#[derive(Debug, Clone)]
pub enum FakeQueryOutcome {
    Success(QueryData),
    Error(String),
}

impl FakeQueryOutcome {
    fn into_result(self) -> Result<QueryData, DbError> {
        match self {
            Self::Success(data) => Ok(data),
            Self::Error(message) => Err(DbError::query_failed(message)),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct FakeAdapterStats {
    pub connect_calls: usize,
    pub close_calls: usize,
    pub executed_queries: Vec<String>,
}

#[derive(Default)]
struct FakeState {
    connect_error: RwLock<Option<String>>,
    connect_delay: RwLock<Option<Duration>>,
    ping_error: RwLock<Option<String>>,
    query_outcomes: RwLock<HashMap<String, FakeQueryOutcome>>,
    default_data: RwLock<Option<QueryData>>,
    objects: RwLock<HashMap<ObjectKind, Vec<ObjectInfo>>>,
    columns: RwLock<HashMap<String, Vec<ColumnDescriptor>>>,
    metrics: RwLock<HashMap<MetricKind, Result<f64, String>>>,
    top_queries: RwLock<Option<Vec<TopQuery>>>,
    plan: RwLock<Option<String>>,
    connect_calls: AtomicUsize,
    close_calls: AtomicUsize,
    executed_queries: RwLock<Vec<String>>,
}

/// Deterministic in-memory adapter for registry and service tests.
///
/// Outcomes are scripted through the builder methods; every native-side
/// effect (connects, closes, executed query text) is counted so tests can
/// assert on adapter traffic.
#[derive(Clone)]
pub struct FakeAdapter {
    kind: DbKind,
    state: Arc<FakeState>,
}

impl FakeAdapter {
    pub fn new(kind: DbKind) -> Self {
        Self {
            kind,
            state: Arc::new(FakeState::default()),
        }
    }

    pub fn with_connect_error(self, message: impl Into<String>) -> Self {
        *write(&self.state.connect_error) = Some(message.into());
        self
    }

    /// Delays each connect, widening the race window for concurrency tests.
    pub fn with_connect_delay(self, delay: Duration) -> Self {
        *write(&self.state.connect_delay) = Some(delay);
        self
    }

    pub fn with_ping_error(self, message: impl Into<String>) -> Self {
        *write(&self.state.ping_error) = Some(message.into());
        self
    }

    pub fn with_query_result(self, sql: impl Into<String>, data: QueryData) -> Self {
        write(&self.state.query_outcomes).insert(sql.into(), FakeQueryOutcome::Success(data));
        self
    }

    pub fn with_query_error(self, sql: impl Into<String>, message: impl Into<String>) -> Self {
        write(&self.state.query_outcomes).insert(sql.into(), FakeQueryOutcome::Error(message.into()));
        self
    }

    pub fn with_default_result(self, data: QueryData) -> Self {
        *write(&self.state.default_data) = Some(data);
        self
    }

    pub fn with_objects(self, kind: ObjectKind, names: &[&str]) -> Self {
        write(&self.state.objects).insert(kind, names.iter().map(|n| ObjectInfo::new(*n)).collect());
        self
    }

    pub fn with_columns(self, table: impl Into<String>, columns: Vec<ColumnDescriptor>) -> Self {
        write(&self.state.columns).insert(table.into(), columns);
        self
    }

    pub fn with_metric(self, metric: MetricKind, value: f64) -> Self {
        write(&self.state.metrics).insert(metric, Ok(value));
        self
    }

    pub fn with_metric_error(self, metric: MetricKind, message: impl Into<String>) -> Self {
        write(&self.state.metrics).insert(metric, Err(message.into()));
        self
    }

    pub fn with_top_queries(self, queries: Vec<TopQuery>) -> Self {
        *write(&self.state.top_queries) = Some(queries);
        self
    }

    pub fn with_plan(self, plan: impl Into<String>) -> Self {
        *write(&self.state.plan) = Some(plan.into());
        self
    }

    pub fn set_metric(&self, metric: MetricKind, outcome: Result<f64, String>) {
        write(&self.state.metrics).insert(metric, outcome);
    }

    pub fn stats(&self) -> FakeAdapterStats {
        FakeAdapterStats {
            connect_calls: self.state.connect_calls.load(Ordering::SeqCst),
            close_calls: self.state.close_calls.load(Ordering::SeqCst),
            executed_queries: read(&self.state.executed_queries).clone(),
        }
    }

    pub fn as_adapter_arc(self) -> Arc<dyn EngineAdapter> {
        Arc::new(self)
    }
}

#[async_trait]
impl EngineAdapter for FakeAdapter {
    fn kind(&self) -> DbKind {
        self.kind
    }

    async fn connect(&self, _profile: &ConnectionProfile) -> Result<Box<dyn Connection>, DbError> {
        let delay = *read(&self.state.connect_delay);
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if let Some(message) = read(&self.state.connect_error).clone() {
            return Err(DbError::connection_failed(message));
        }

        self.state.connect_calls.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakeConnection {
            kind: self.kind,
            state: self.state.clone(),
        }))
    }
}

struct FakeConnection {
    kind: DbKind,
    state: Arc<FakeState>,
}

#[async_trait]
impl Connection for FakeConnection {
    fn kind(&self) -> DbKind {
        self.kind
    }

    async fn ping(&self) -> Result<(), DbError> {
        match read(&self.state.ping_error).clone() {
            Some(message) => Err(DbError::connection_failed(message)),
            None => Ok(()),
        }
    }

    async fn close(&self) -> Result<(), DbError> {
        self.state.close_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    async fn execute(&self, sql: &str) -> Result<QueryData, DbError> {
        write(&self.state.executed_queries).push(sql.to_string());

        if let Some(outcome) = read(&self.state.query_outcomes).get(sql).cloned() {
            return outcome.into_result();
        }

        if let Some(data) = read(&self.state.default_data).clone() {
            return Ok(data);
        }

        Ok(QueryData::default())
    }

    async fn list_objects(&self, kind: ObjectKind) -> Result<Vec<ObjectInfo>, DbError> {
        Ok(read(&self.state.objects).get(&kind).cloned().unwrap_or_default())
    }

    async fn describe_columns(&self, table: &str) -> Result<Vec<ColumnDescriptor>, DbError> {
        read(&self.state.columns)
            .get(table)
            .cloned()
            .ok_or_else(|| DbError::query_failed(format!("no such table: {table}")))
    }

    async fn probe_metric(&self, metric: MetricKind) -> Result<f64, DbError> {
        match read(&self.state.metrics).get(&metric).cloned() {
            Some(Ok(value)) => Ok(value),
            Some(Err(message)) => Err(DbError::query_failed(message)),
            None => Err(DbError::not_supported(metric.name())),
        }
    }

    async fn top_queries(&self) -> Result<Vec<TopQuery>, DbError> {
        match read(&self.state.top_queries).clone() {
            Some(queries) => Ok(queries),
            None => Err(DbError::not_supported("top queries")),
        }
    }

    async fn explain(&self, _sql: &str) -> Result<String, DbError> {
        match read(&self.state.plan).clone() {
            Some(plan) => Ok(plan),
            None => Err(DbError::not_supported("explain")),
        }
    }
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    match lock.read() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    }
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    match lock.write() {
        Ok(guard) => guard,
        Err(poison_error) => poison_error.into_inner(),
    }
}
