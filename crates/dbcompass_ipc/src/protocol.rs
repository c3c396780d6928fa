use dbcompass_core::{
    ConnectionProfile, MonitoringSnapshot, ObjectKind, ObjectListing, QueryResult, TableSchema,
    Uuid,
};
use serde::{Deserialize, Serialize};

/// Operations the UI collaborator can request, mirroring the application's
/// message table one-to-one. Transport-agnostic: the same shapes work over
/// a socket, a pipe, or an in-process call.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "op", content = "payload", rename_all = "kebab-case")]
pub enum Request {
    /// Persist a profile (plaintext password in the payload; encrypted at
    /// rest). Assigns an id when the payload has none.
    SaveConnection(ConnectionProfile),
    ListConnections,
    GetConnectionDetails {
        id: Uuid,
    },
    DeleteConnection {
        id: Uuid,
    },
    /// Test either a stored profile (by id) or an unsaved one (inline).
    TestConnection {
        #[serde(default)]
        id: Option<Uuid>,
        #[serde(default)]
        profile: Option<ConnectionProfile>,
    },
    ListDatabaseObjects {
        id: Uuid,
        kind: ObjectKind,
    },
    GetTableSchema {
        id: Uuid,
        table_name: String,
    },
    ExecuteQuery {
        id: Uuid,
        text: String,
    },
    GetMonitoringSnapshot {
        id: Uuid,
    },
    GetEstimatedPlan {
        id: Uuid,
        text: String,
    },
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", content = "payload", rename_all = "kebab-case")]
pub enum Response {
    ConnectionSaved {
        id: Uuid,
    },
    /// Passwords are redacted here; only `get-connection-details` returns
    /// the plaintext.
    Connections(Vec<ConnectionProfile>),
    ConnectionDetails(Option<ConnectionProfile>),
    ConnectionDeleted {
        id: Uuid,
    },
    TestResult {
        success: bool,
        message: String,
    },
    DatabaseObjects(ObjectListing),
    TableSchema(TableSchema),
    QueryOutcome(QueryResult),
    Monitoring(MonitoringSnapshot),
    EstimatedPlan {
        plan: String,
    },
    Error {
        message: String,
    },
}

/// Request envelope carrying a caller-chosen correlation id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RequestEnvelope {
    pub request_id: u64,
    pub body: Request,
}

impl RequestEnvelope {
    pub fn new(request_id: u64, body: Request) -> Self {
        Self { request_id, body }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseEnvelope {
    pub request_id: u64,
    pub body: Response,
}

impl ResponseEnvelope {
    pub fn new(request_id: u64, body: Response) -> Self {
        Self { request_id, body }
    }

    pub fn error(request_id: u64, message: impl Into<String>) -> Self {
        Self {
            request_id,
            body: Response::Error {
                message: message.into(),
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use dbcompass_core::DbKind;

    #[test]
    fn requests_use_kebab_case_operation_names() {
        let request = Request::ExecuteQuery {
            id: Uuid::nil(),
            text: "SELECT 1".to_string(),
        };
        let json = serde_json::to_string(&request).unwrap();

        assert!(json.contains(r#""op":"execute-query""#));
        assert!(json.contains(r#""text":"SELECT 1""#));
    }

    #[test]
    fn list_connections_needs_no_payload() {
        let request: Request = serde_json::from_str(r#"{"op":"list-connections"}"#).unwrap();
        assert!(matches!(request, Request::ListConnections));
    }

    #[test]
    fn save_connection_round_trips_through_the_wire_shape() {
        let mut profile = ConnectionProfile::new("dev", DbKind::MySql);
        profile.password = Some("pw".to_string());

        let envelope = RequestEnvelope::new(7, Request::SaveConnection(profile));
        let json = serde_json::to_string(&envelope).unwrap();
        let parsed: RequestEnvelope = serde_json::from_str(&json).unwrap();

        assert_eq!(parsed.request_id, 7);
        assert!(matches!(parsed.body, Request::SaveConnection(p) if p.name == "dev"));
    }

    #[test]
    fn test_connection_accepts_id_or_inline_profile() {
        let by_id: Request = serde_json::from_str(&format!(
            r#"{{"op":"test-connection","payload":{{"id":"{}"}}}}"#,
            Uuid::nil()
        ))
        .unwrap();
        assert!(matches!(
            by_id,
            Request::TestConnection {
                id: Some(_),
                profile: None
            }
        ));
    }
}
