use crate::{ConnectionRegistry, DbError, QueryResult};
use std::sync::Arc;
use uuid::Uuid;

/// Executes ad-hoc query text against a profile's connection and folds
/// every outcome into the uniform [`QueryResult`] envelope.
///
/// This boundary never returns an error to its caller: driver failures,
/// missing profiles, and timeouts all become `{success: false, error}`
/// values, because the UI collaborator needs one reply channel.
pub struct QueryExecutionService {
    registry: Arc<ConnectionRegistry>,
}

impl QueryExecutionService {
    pub fn new(registry: Arc<ConnectionRegistry>) -> Self {
        Self { registry }
    }

    /// Resolves the profile, obtains or opens its handle, and dispatches
    /// the query verbatim. The profile's timeout bounds the statement.
    pub async fn execute(&self, profile_id: Uuid, sql: &str) -> QueryResult {
        let profile = match self.registry.get_profile(profile_id) {
            Ok(Some(profile)) => profile,
            Ok(None) => return QueryResult::failure("Connection not found"),
            Err(e) => return QueryResult::failure(e.to_string()),
        };

        let conn = match self.registry.get_or_open(&profile).await {
            Ok(conn) => conn,
            Err(e) => return QueryResult::failure(e.to_string()),
        };

        match tokio::time::timeout(profile.connect_timeout(), conn.execute(sql)).await {
            Ok(Ok(data)) => QueryResult::from_data(data),
            Ok(Err(e)) => {
                log::warn!("Query failed for {}: {e}", profile.name);
                QueryResult::failure(e.to_string())
            }
            Err(_) => QueryResult::failure(DbError::Timeout.to_string()),
        }
    }
}
