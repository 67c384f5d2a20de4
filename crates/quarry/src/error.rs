//! Error types for quarry

use thiserror::Error;

/// Result type alias for quarry operations
pub type OrmResult<T> = Result<T, OrmError>;

/// Error types for builder, model and migration operations
#[derive(Debug, Error)]
pub enum OrmError {
    /// Database connection error
    #[error("Connection error: {0}")]
    Connection(String),

    /// Query execution error reported by the driver
    #[error("Query error: {0}")]
    Query(String),

    /// Row not found
    #[error("Not found: {0}")]
    NotFound(String),

    /// Invalid builder or model usage, detected before execution
    #[error("Validation error: {0}")]
    Validation(String),

    /// Unknown relation or a relation path that does not resolve
    #[error("Relation error: {0}")]
    Relation(String),

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// Value decode/mapping error
    #[error("Decode error on column '{column}': {message}")]
    Decode { column: String, message: String },

    /// A migration unit failed to apply or revert
    #[error("Migration '{name}' failed: {message}")]
    Migration { name: String, message: String },

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// SQLite driver error
    #[cfg(feature = "sqlite")]
    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    /// Other errors
    #[error("{0}")]
    Other(String),
}

impl OrmError {
    /// Create a decode error for a specific column
    pub fn decode(column: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Decode {
            column: column.into(),
            message: message.into(),
        }
    }

    /// Create a not found error
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a relation error for an unknown relation on `model`
    pub fn unknown_relation(model: &str, relation: &str) -> Self {
        Self::Relation(format!("call to undefined relation '{relation}' on model '{model}'"))
    }

    /// Wrap a failure that happened while running migration `name`
    pub fn migration(name: impl Into<String>, source: impl std::fmt::Display) -> Self {
        Self::Migration {
            name: name.into(),
            message: source.to_string(),
        }
    }

    /// Check if this is a not found error
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a validation error
    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation(_))
    }

    /// Check if this is a relation configuration error
    pub fn is_relation(&self) -> bool {
        matches!(self, Self::Relation(_))
    }
}

impl From<serde_json::Error> for OrmError {
    fn from(err: serde_json::Error) -> Self {
        Self::Serialization(err.to_string())
    }
}

impl From<toml::de::Error> for OrmError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(err.to_string())
    }
}
