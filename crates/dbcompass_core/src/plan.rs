use crate::{ConnectionRegistry, DbError};
use std::sync::Arc;
use uuid::Uuid;

/// Dispatches estimated-plan requests to the right adapter. Plans are
/// diagnostic and non-critical: a failure surfaces as an error value with
/// no retry.
pub struct PlanEstimator {
    registry: Arc<ConnectionRegistry>,
}

impl PlanEstimator {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    pub async fn estimate(&self, profile_id: Uuid, sql: &str) -> Result<String, DbError> {
        let profile = self
            .registry
            .get_profile(profile_id)?
            .ok_or_else(|| DbError::connection_failed("Connection not found"))?;
        let conn = self.registry.get_or_open(&profile).await?;

        match tokio::time::timeout(profile.connect_timeout(), conn.explain(sql)).await {
            Ok(result) => result,
            Err(_) => Err(DbError::Timeout),
        }
    }
}
