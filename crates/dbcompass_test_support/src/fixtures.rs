use dbcompass_core::{ConnectionProfile, DbKind, Row};

/// A plausible localhost profile for the given engine.
pub fn profile_for(kind: DbKind) -> ConnectionProfile {
    let mut profile = ConnectionProfile::new(format!("{kind} test"), kind);
    profile.host = "localhost".to_string();
    profile.database = match kind {
        DbKind::Sqlite => "/tmp/test.db".to_string(),
        _ => "app".to_string(),
    };
    profile.username = "tester".to_string();
    profile
}

/// Builds a result row from (column, value) pairs, preserving order.
pub fn row(pairs: &[(&str, serde_json::Value)]) -> Row {
    pairs
        .iter()
        .map(|(name, value)| (name.to_string(), value.clone()))
        .collect()
}
