use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::Duration;
use uuid::Uuid;

/// Supported database engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum DbKind {
    #[serde(rename = "mysql")]
    MySql,
    #[serde(rename = "postgresql")]
    Postgres,
    #[serde(rename = "mssql")]
    MsSql,
    #[serde(rename = "sqlite")]
    Sqlite,
    #[serde(rename = "oracle")]
    Oracle,
    #[serde(rename = "mongodb")]
    MongoDb,
}

impl DbKind {
    pub fn display_name(&self) -> &'static str {
        match self {
            DbKind::MySql => "MySQL",
            DbKind::Postgres => "PostgreSQL",
            DbKind::MsSql => "SQL Server",
            DbKind::Sqlite => "SQLite",
            DbKind::Oracle => "Oracle",
            DbKind::MongoDb => "MongoDB",
        }
    }

    /// Default port used when the profile leaves the port unset.
    ///
    /// SQLite is file based and has no port.
    pub fn default_port(&self) -> Option<u16> {
        match self {
            DbKind::MySql => Some(3306),
            DbKind::Postgres => Some(5432),
            DbKind::MsSql => Some(1433),
            DbKind::Sqlite => None,
            DbKind::Oracle => Some(1521),
            DbKind::MongoDb => Some(27017),
        }
    }
}

impl std::fmt::Display for DbKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.display_name())
    }
}

/// TLS mode for engines that support it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum SslMode {
    /// No TLS (unencrypted connection).
    #[default]
    Disable,

    /// Try TLS, fall back to unencrypted if unavailable.
    Prefer,

    /// Require TLS (fail if the server doesn't support it).
    Require,
}

const DEFAULT_TIMEOUT_MS: u64 = 5000;

fn default_timeout_ms() -> u64 {
    DEFAULT_TIMEOUT_MS
}

/// Saved connection profile.
///
/// This is the in-memory representation; the password, when present, is
/// plaintext. The at-rest representation is [`StoredProfile`], which the
/// credential vault owns exclusively. Anything handed to a display path
/// must go through [`ConnectionProfile::redacted`] first.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectionProfile {
    /// Unique identifier. A nil id means "not yet saved"; the registry
    /// assigns one on save.
    #[serde(default)]
    pub id: Uuid,

    /// User-defined name shown in the UI.
    pub name: String,

    /// The database engine this profile connects to.
    #[serde(rename = "type")]
    pub kind: DbKind,

    #[serde(default)]
    pub host: String,

    /// Engine-specific default applies when unset. Ignored by SQLite.
    #[serde(default)]
    pub port: Option<u16>,

    /// Database name, or the database file path for SQLite.
    #[serde(default)]
    pub database: String,

    #[serde(default)]
    pub username: String,

    /// Plaintext password. Never serialized to the profile store as-is;
    /// the vault encrypts it into the stored record.
    #[serde(default)]
    pub password: Option<String>,

    /// Connect timeout in milliseconds. Also the default statement timeout
    /// for query execution and plan estimation.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default)]
    pub ssl_mode: SslMode,

    /// Free-form engine-specific parameters.
    #[serde(default)]
    pub additional_params: HashMap<String, String>,

    #[serde(default)]
    pub description: Option<String>,
}

impl ConnectionProfile {
    pub fn new(name: impl Into<String>, kind: DbKind) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            kind,
            host: String::new(),
            port: None,
            database: String::new(),
            username: String::new(),
            password: None,
            timeout_ms: DEFAULT_TIMEOUT_MS,
            ssl_mode: SslMode::default(),
            additional_params: HashMap::new(),
            description: None,
        }
    }

    /// Assigns a fresh id if the profile has none yet.
    pub fn ensure_id(&mut self) -> Uuid {
        if self.id.is_nil() {
            self.id = Uuid::new_v4();
        }
        self.id
    }

    /// The port to connect to, falling back to the engine default.
    pub fn effective_port(&self) -> u16 {
        self.port
            .or_else(|| self.kind.default_port())
            .unwrap_or_default()
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(if self.timeout_ms == 0 {
            DEFAULT_TIMEOUT_MS
        } else {
            self.timeout_ms
        })
    }

    /// Copy with the password removed, for display across the UI boundary.
    pub fn redacted(&self) -> Self {
        Self {
            password: None,
            ..self.clone()
        }
    }
}

/// Encrypted password payload as written to disk: hex-encoded nonce and
/// ciphertext, produced and consumed only by the credential vault.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EncryptedSecret {
    pub iv: String,
    pub ciphertext: String,
}

/// The at-rest profile record: same fields as [`ConnectionProfile`] with
/// the password replaced by its encrypted form.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredProfile {
    pub id: Uuid,
    pub name: String,
    #[serde(rename = "type")]
    pub kind: DbKind,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub database: String,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: Option<EncryptedSecret>,
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
    #[serde(default)]
    pub ssl_mode: SslMode,
    #[serde(default)]
    pub additional_params: HashMap<String, String>,
    #[serde(default)]
    pub description: Option<String>,
}

impl StoredProfile {
    /// Builds the at-rest record from an in-memory profile and its
    /// already-encrypted password.
    pub fn from_profile(profile: &ConnectionProfile, password: Option<EncryptedSecret>) -> Self {
        Self {
            id: profile.id,
            name: profile.name.clone(),
            kind: profile.kind,
            host: profile.host.clone(),
            port: profile.port,
            database: profile.database.clone(),
            username: profile.username.clone(),
            password,
            timeout_ms: profile.timeout_ms,
            ssl_mode: profile.ssl_mode,
            additional_params: profile.additional_params.clone(),
            description: profile.description.clone(),
        }
    }

    /// Rebuilds the in-memory profile given the decrypted password.
    pub fn into_profile(self, password: Option<String>) -> ConnectionProfile {
        ConnectionProfile {
            id: self.id,
            name: self.name,
            kind: self.kind,
            host: self.host,
            port: self.port,
            database: self.database,
            username: self.username,
            password,
            timeout_ms: self.timeout_ms,
            ssl_mode: self.ssl_mode,
            additional_params: self.additional_params,
            description: self.description,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn effective_port_falls_back_to_engine_default() {
        let mut profile = ConnectionProfile::new("local", DbKind::Postgres);
        assert_eq!(profile.effective_port(), 5432);

        profile.port = Some(6543);
        assert_eq!(profile.effective_port(), 6543);

        let sqlite = ConnectionProfile::new("file", DbKind::Sqlite);
        assert_eq!(sqlite.effective_port(), 0);
    }

    #[test]
    fn ensure_id_assigns_once() {
        let mut profile = ConnectionProfile::new("a", DbKind::MySql);
        profile.id = Uuid::nil();

        let assigned = profile.ensure_id();
        assert!(!assigned.is_nil());
        assert_eq!(profile.ensure_id(), assigned);
    }

    #[test]
    fn redacted_drops_password_only() {
        let mut profile = ConnectionProfile::new("a", DbKind::MySql);
        profile.password = Some("hunter2".to_string());

        let shown = profile.redacted();
        assert!(shown.password.is_none());
        assert_eq!(shown.name, profile.name);
        assert_eq!(shown.id, profile.id);
    }

    #[test]
    fn kind_serializes_with_original_names() {
        assert_eq!(
            serde_json::to_string(&DbKind::Postgres).unwrap(),
            r#""postgresql""#
        );
        assert_eq!(serde_json::to_string(&DbKind::MsSql).unwrap(), r#""mssql""#);
        assert_eq!(
            serde_json::to_string(&DbKind::MongoDb).unwrap(),
            r#""mongodb""#
        );
    }

    #[test]
    fn profile_deserializes_with_defaults() {
        let profile: ConnectionProfile =
            serde_json::from_str(r#"{"name":"dev","type":"mysql","host":"localhost"}"#).unwrap();

        assert!(profile.id.is_nil());
        assert_eq!(profile.timeout_ms, 5000);
        assert_eq!(profile.ssl_mode, SslMode::Disable);
        assert!(profile.password.is_none());
    }
}
