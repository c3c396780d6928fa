use serde::{Deserialize, Serialize};

/// Kinds of schema objects a caller can list.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ObjectKind {
    Tables,
    Views,
    Procedures,
    Functions,
}

impl ObjectKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ObjectKind::Tables => "tables",
            ObjectKind::Views => "views",
            ObjectKind::Procedures => "procedures",
            ObjectKind::Functions => "functions",
        }
    }
}

impl std::fmt::Display for ObjectKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One named schema object.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ObjectInfo {
    pub name: String,
}

impl ObjectInfo {
    pub fn new(name: impl Into<String>) -> Self {
        Self { name: name.into() }
    }
}

/// Schema metadata for one table column, normalized across engines.
///
/// Engines without a concept report the neutral value: `is_auto_increment`
/// false, the numeric fields `None`. MongoDB inference always reports
/// `nullable: true` since collections are schema-less.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ColumnDescriptor {
    pub name: String,

    /// Engine-native type string (e.g. "varchar(255)", "int4", "NUMBER").
    pub data_type: String,

    pub nullable: bool,

    #[serde(default)]
    pub default_value: Option<String>,

    #[serde(default)]
    pub char_max_length: Option<i64>,

    #[serde(default)]
    pub numeric_precision: Option<i64>,

    #[serde(default)]
    pub numeric_scale: Option<i64>,

    #[serde(default)]
    pub is_primary_key: bool,

    #[serde(default)]
    pub is_auto_increment: bool,
}

impl ColumnDescriptor {
    pub fn new(name: impl Into<String>, data_type: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            data_type: data_type.into(),
            nullable: true,
            default_value: None,
            char_max_length: None,
            numeric_precision: None,
            numeric_scale: None,
            is_primary_key: false,
            is_auto_increment: false,
        }
    }
}
