mod error;
mod introspection;
mod monitor;
mod monitoring;
mod plan;
mod profile;
mod query;
mod query_service;
mod registry;
mod schema;
mod store;
mod traits;
mod vault;

pub use error::DbError;
pub use introspection::{ObjectListing, SchemaIntrospectionService, TableSchema};
pub use monitor::{
    CacheMetrics, ConnectionMetrics, LockMetrics, MetricKind, MonitoringSnapshot, QueryMetrics,
    TopQuery, TransactionMetrics, queries_per_sec,
};
pub use monitoring::MonitoringCollector;
pub use plan::PlanEstimator;
pub use profile::{ConnectionProfile, DbKind, EncryptedSecret, SslMode, StoredProfile};
pub use query::{QueryData, QueryResult, Row};
pub use query_service::QueryExecutionService;
pub use registry::ConnectionRegistry;
pub use schema::{ColumnDescriptor, ObjectInfo, ObjectKind};
pub use store::ProfileStore;
pub use traits::{Connection, EngineAdapter};
pub use vault::CredentialVault;

pub use uuid::Uuid;
