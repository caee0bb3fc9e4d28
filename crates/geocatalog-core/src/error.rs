//! Custom error types for `GeoCatalog` operations.
//!
//! This module provides structured error handling using `thiserror`. Each
//! stage of a catalog load (configuration, storage listing, item resolution,
//! statement compilation, database access) has its own error enum so callers
//! can decide which failures are fatal for a collection and which only skip
//! a single item.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for `GeoCatalog` operations.
///
/// This is the root error type that encompasses all domain-specific errors.
/// It uses `#[error(transparent)]` to delegate display formatting to the
/// underlying error variants.
#[derive(Debug, Error)]
pub enum CatalogError {
    /// Database connection or command errors
    #[error(transparent)]
    Database(#[from] DatabaseError),

    /// Object storage errors (unsupported bucket, listing, fetching)
    #[error(transparent)]
    Storage(#[from] StorageError),

    /// Item metadata resolution errors
    #[error(transparent)]
    Resolve(#[from] ResolveError),

    /// Statement compilation errors
    #[error(transparent)]
    Validation(#[from] ValidationError),

    /// Configuration errors
    #[error(transparent)]
    Config(#[from] ConfigError),
}

/// Database errors.
///
/// A `Connection` error means the database could not be reached at all. A
/// `Command` error carries the message reported by the server for a failed
/// DDL/DML statement; the statement's transaction has already been rolled
/// back when it is returned.
#[derive(Debug, Error)]
pub enum DatabaseError {
    /// Could not connect or authenticate
    #[error("Failed to connect to database '{database}' on '{host}': {source}")]
    Connection {
        /// The configured host
        host: String,
        /// The configured database name
        database: String,
        /// The underlying driver error
        #[source]
        source: postgres::Error,
    },

    /// The server rejected a command
    #[error("Database command failed: {message}")]
    Command {
        /// Message reported by the server
        message: String,
    },
}

impl DatabaseError {
    /// Builds a [`DatabaseError::Command`] from a driver error, preferring the
    /// server-reported message over the driver's formatted one.
    #[must_use]
    pub fn command(error: &postgres::Error) -> Self {
        let message = error
            .as_db_error()
            .map_or_else(|| error.to_string(), |db| db.message().to_string());
        Self::Command { message }
    }

    /// Returns the server message for command failures.
    #[must_use]
    pub fn command_message(&self) -> Option<&str> {
        match self {
            Self::Command { message } => Some(message),
            Self::Connection { .. } => None,
        }
    }
}

/// Object storage errors.
#[derive(Debug, Error)]
pub enum StorageError {
    /// No storage client recognizes the bucket URI scheme
    #[error("Unable to identify client for bucket: {bucket}")]
    UnsupportedBucket {
        /// The configured bucket URI
        bucket: String,
    },

    /// A URI could not be parsed
    #[error("Invalid storage URI '{uri}': {reason}")]
    InvalidUri {
        /// The offending URI
        uri: String,
        /// Why it is invalid
        reason: String,
    },

    /// The listing pattern is not a valid regular expression
    #[error("Invalid object pattern '{pattern}': {source}")]
    InvalidPattern {
        /// The configured pattern
        pattern: String,
        /// The regex compilation error
        #[source]
        source: regex::Error,
    },

    /// The storage backend reported an error
    #[error("Storage request for '{uri}' failed: {source}")]
    Backend {
        /// The URI being accessed
        uri: String,
        /// The underlying `object_store` error
        #[source]
        source: object_store::Error,
    },

    /// The blocking runtime used to drive storage requests could not start
    #[error("Failed to start storage runtime: {0}")]
    Runtime(#[source] std::io::Error),
}

/// Item resolution errors.
///
/// These never abort a batch; the ingestion pipeline records them next to the
/// URI they belong to and moves on.
#[derive(Debug, Error)]
pub enum ResolveError {
    /// No resolver recognizes the object name
    #[error("No resolver matches '{uri}'")]
    Unclassified {
        /// The object URI
        uri: String,
    },

    /// The sidecar document could not be read
    #[error("Failed to read sidecar '{sidecar}': {source}")]
    Sidecar {
        /// The sidecar location
        sidecar: String,
        /// The underlying error
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The sidecar document is not a valid item
    #[error("Failed to parse sidecar '{sidecar}': {message}")]
    Parse {
        /// The sidecar location
        sidecar: String,
        /// Description of the parse error
        message: String,
    },

    /// A required item property is missing and cannot be derived
    #[error("Item '{uri}' is missing required property '{property}'")]
    MissingProperty {
        /// The object URI
        uri: String,
        /// The missing property
        property: String,
    },
}

/// Statement compilation errors.
///
/// Raised before any SQL is sent so that a malformed record or descriptor
/// never reaches the database as a garbled literal.
#[derive(Debug, Error, PartialEq)]
pub enum ValidationError {
    /// A schema, table or column name is not a plain SQL identifier
    #[error("Invalid SQL identifier '{name}'")]
    InvalidIdentifier {
        /// The rejected name
        name: String,
    },

    /// More than one identifier (`SERIAL`) field in a descriptor
    #[error("Field descriptor declares more than one SERIAL field: {fields}")]
    MultipleIdentifiers {
        /// Comma-separated offending field names
        fields: String,
    },

    /// A field name appears twice in a descriptor
    #[error("Field '{name}' is declared more than once")]
    DuplicateField {
        /// The repeated name
        name: String,
    },

    /// A value tuple does not match the column list
    #[error("Row {row} has {found} values but the statement has {expected} columns")]
    Arity {
        /// Zero-based row index
        row: usize,
        /// Number of columns
        expected: usize,
        /// Number of values supplied
        found: usize,
    },

    /// A value does not fit its column's type
    #[error("Row {row}, column '{column}': expected {expected} value")]
    TypeMismatch {
        /// Zero-based row index
        row: usize,
        /// The column name
        column: String,
        /// Expected type token
        expected: String,
    },

    /// A required value is empty
    #[error("Row {row}, column '{column}': value is empty")]
    EmptyValue {
        /// Zero-based row index
        row: usize,
        /// The column name
        column: String,
    },

    /// A numeric value is NaN or infinite
    #[error("Row {row}, column '{column}': value is not finite")]
    NonFinite {
        /// Zero-based row index
        row: usize,
        /// The column name
        column: String,
    },
}

/// Configuration errors.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The configuration file could not be read
    #[error("Failed to read configuration '{path}': {source}")]
    Read {
        /// The file path
        path: PathBuf,
        /// The underlying error
        #[source]
        source: std::io::Error,
    },

    /// The configuration document is malformed
    #[error("Failed to parse configuration '{path}': {source}")]
    Parse {
        /// The file path
        path: PathBuf,
        /// The YAML error
        #[source]
        source: serde_yaml::Error,
    },

    /// Invalid option value
    #[error("Invalid {option} option: {message}")]
    InvalidOption {
        /// The option name
        option: String,
        /// Why it's invalid
        message: String,
    },
}

/// Type alias for Results using `CatalogError`.
pub type Result<T> = std::result::Result<T, CatalogError>;

impl CatalogError {
    /// Get a user-friendly error message.
    #[must_use]
    pub fn user_message(&self) -> String {
        match self {
            Self::Database(DatabaseError::Command { message }) => {
                format!("The database rejected the statement: {message}")
            },
            Self::Database(e) => e.to_string(),
            Self::Storage(e) => format!("Storage error: {e}"),
            Self::Resolve(e) => format!("Item error: {e}"),
            Self::Validation(e) => format!("Invalid catalog data: {e}"),
            Self::Config(e) => format!("Configuration error: {e}"),
        }
    }

    /// Get recovery suggestions if available.
    #[must_use]
    pub fn recovery_suggestion(&self) -> Option<String> {
        match self {
            Self::Database(DatabaseError::Connection { .. }) => Some(
                "Check the server host, port and credentials in the configuration.".to_string(),
            ),
            Self::Storage(StorageError::UnsupportedBucket { .. }) => Some(
                "Use a bucket URI with a supported scheme (gs://, s3://, az://, file://, memory://)."
                    .to_string(),
            ),
            Self::Storage(StorageError::InvalidPattern { .. }) => {
                Some("The item pattern must be a valid regular expression.".to_string())
            },
            Self::Config(ConfigError::Parse { .. }) => {
                Some("Check the YAML syntax of the configuration file.".to_string())
            },
            _ => None,
        }
    }

    /// Check if this error only affects a single item rather than a whole
    /// collection.
    #[must_use]
    pub fn is_item_scoped(&self) -> bool {
        matches!(self, Self::Resolve(_))
    }
}
