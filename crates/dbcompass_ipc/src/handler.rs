use crate::{Request, RequestEnvelope, Response, ResponseEnvelope};
use dbcompass_core::{
    ConnectionProfile, ConnectionRegistry, DbError, MonitoringCollector, PlanEstimator,
    ProfileStore, QueryExecutionService, SchemaIntrospectionService,
};
use std::sync::Arc;

/// Builds a registry with every engine adapter registered and the default
/// on-disk profile store.
pub fn default_registry() -> Result<ConnectionRegistry, DbError> {
    let mut registry = ConnectionRegistry::new(ProfileStore::new()?);
    registry.register(Arc::new(dbcompass_driver_mysql::MysqlAdapter));
    registry.register(Arc::new(dbcompass_driver_postgres::PostgresAdapter));
    registry.register(Arc::new(dbcompass_driver_mssql::MssqlAdapter));
    registry.register(Arc::new(dbcompass_driver_sqlite::SqliteAdapter));
    registry.register(Arc::new(dbcompass_driver_oracle::OracleAdapter));
    registry.register(Arc::new(dbcompass_driver_mongodb::MongoAdapter));
    Ok(registry)
}

/// Dispatches UI requests to the core services. This is the only surface
/// the UI collaborator talks to; every reply is a value, including
/// failures.
pub struct CoreHandler {
    registry: Arc<ConnectionRegistry>,
    queries: QueryExecutionService,
    schema: SchemaIntrospectionService,
    monitoring: MonitoringCollector,
    plans: PlanEstimator,
}

impl CoreHandler {
    pub fn new(registry: ConnectionRegistry) -> Self {
        let registry = Arc::new(registry);
        Self {
            queries: QueryExecutionService::new(registry.clone()),
            schema: SchemaIntrospectionService::new(registry.clone()),
            monitoring: MonitoringCollector::new(registry.clone()),
            plans: PlanEstimator::new(registry.clone()),
            registry,
        }
    }

    pub fn registry(&self) -> &Arc<ConnectionRegistry> {
        &self.registry
    }

    pub async fn handle_envelope(&self, envelope: RequestEnvelope) -> ResponseEnvelope {
        let body = self.handle(envelope.body).await;
        ResponseEnvelope::new(envelope.request_id, body)
    }

    pub async fn handle(&self, request: Request) -> Response {
        match request {
            Request::SaveConnection(profile) => match self.registry.save_profile(profile) {
                Ok(id) => Response::ConnectionSaved { id },
                Err(e) => Response::Error {
                    message: e.to_string(),
                },
            },

            Request::ListConnections => match self.registry.list_profiles() {
                Ok(profiles) => {
                    Response::Connections(profiles.iter().map(ConnectionProfile::redacted).collect())
                }
                Err(e) => Response::Error {
                    message: e.to_string(),
                },
            },

            Request::GetConnectionDetails { id } => match self.registry.get_profile(id) {
                Ok(profile) => Response::ConnectionDetails(profile),
                Err(e) => Response::Error {
                    message: e.to_string(),
                },
            },

            Request::DeleteConnection { id } => match self.registry.delete_profile(id).await {
                Ok(true) => Response::ConnectionDeleted { id },
                Ok(false) => Response::Error {
                    message: "Connection not found".to_string(),
                },
                Err(e) => Response::Error {
                    message: e.to_string(),
                },
            },

            Request::TestConnection { id, profile } => self.test_connection(id, profile).await,

            Request::ListDatabaseObjects { id, kind } => {
                Response::DatabaseObjects(self.schema.list_objects(id, kind).await)
            }

            Request::GetTableSchema { id, table_name } => {
                Response::TableSchema(self.schema.describe_columns(id, &table_name).await)
            }

            Request::ExecuteQuery { id, text } => {
                Response::QueryOutcome(self.queries.execute(id, &text).await)
            }

            Request::GetMonitoringSnapshot { id } => match self.monitoring.snapshot(id).await {
                Ok(snapshot) => Response::Monitoring(snapshot),
                Err(e) => Response::Error {
                    message: e.to_string(),
                },
            },

            Request::GetEstimatedPlan { id, text } => match self.plans.estimate(id, &text).await {
                Ok(plan) => Response::EstimatedPlan { plan },
                Err(e) => Response::Error {
                    message: e.to_string(),
                },
            },
        }
    }

    async fn test_connection(
        &self,
        id: Option<dbcompass_core::Uuid>,
        profile: Option<ConnectionProfile>,
    ) -> Response {
        let profile = match (id, profile) {
            (Some(id), _) => match self.registry.get_profile(id) {
                Ok(Some(profile)) => profile,
                Ok(None) => {
                    return Response::TestResult {
                        success: false,
                        message: "Connection not found".to_string(),
                    };
                }
                Err(e) => {
                    return Response::Error {
                        message: e.to_string(),
                    };
                }
            },
            (None, Some(profile)) => profile,
            (None, None) => {
                return Response::Error {
                    message: "test-connection requires an id or an inline profile".to_string(),
                };
            }
        };

        match self.registry.test_connection(&profile).await {
            Ok(()) => Response::TestResult {
                success: true,
                message: format!(
                    "Successfully connected to {} ({}:{})",
                    profile.name,
                    profile.host,
                    profile.effective_port()
                ),
            },
            Err(e) => Response::TestResult {
                success: false,
                message: format!("Connection test failed: {e}"),
            },
        }
    }
}
