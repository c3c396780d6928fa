use crate::{ColumnDescriptor, ConnectionRegistry, Connection, DbError, ObjectInfo, ObjectKind};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

/// Reply shape for object listings: either the objects or an error, never
/// a thrown exception.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ObjectListing {
    pub objects: Vec<ObjectInfo>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ObjectListing {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            objects: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Reply shape for table column descriptions.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TableSchema {
    pub columns: Vec<ColumnDescriptor>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl TableSchema {
    fn failure(error: impl Into<String>) -> Self {
        Self {
            columns: Vec::new(),
            error: Some(error.into()),
        }
    }
}

/// Dispatches schema introspection to the right adapter and normalizes
/// engine differences into the common descriptor shapes.
pub struct SchemaIntrospectionService {
    registry: Arc<ConnectionRegistry>,
}

impl SchemaIntrospectionService {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    async fn resolve(&self, profile_id: Uuid) -> Result<Arc<dyn Connection>, DbError> {
        let profile = self
            .registry
            .get_profile(profile_id)?
            .ok_or_else(|| DbError::connection_failed("Connection not found"))?;
        self.registry.get_or_open(&profile).await
    }

    pub async fn list_objects(&self, profile_id: Uuid, kind: ObjectKind) -> ObjectListing {
        let conn = match self.resolve(profile_id).await {
            Ok(conn) => conn,
            Err(e) => return ObjectListing::failure(e.to_string()),
        };

        match conn.list_objects(kind).await {
            Ok(objects) => ObjectListing {
                objects,
                error: None,
            },
            Err(e) => {
                log::warn!("Failed to list {kind} for {profile_id}: {e}");
                ObjectListing::failure(format!("Failed to fetch {kind}: {e}"))
            }
        }
    }

    pub async fn describe_columns(&self, profile_id: Uuid, table: &str) -> TableSchema {
        let conn = match self.resolve(profile_id).await {
            Ok(conn) => conn,
            Err(e) => return TableSchema::failure(e.to_string()),
        };

        match conn.describe_columns(table).await {
            Ok(columns) => TableSchema {
                columns,
                error: None,
            },
            Err(e) => {
                log::warn!("Failed to describe {table} for {profile_id}: {e}");
                TableSchema::failure(e.to_string())
            }
        }
    }
}
