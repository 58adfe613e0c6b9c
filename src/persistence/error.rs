//! Error types for the reproduction ledger.

use thiserror::Error;

/// Errors returned while migrating or querying the local `SQLite` ledger.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PersistenceError {
    /// The database URL/path was present but blank.
    #[error("database URL must not be blank (use --database-url or REPRISE_DATABASE_URL)")]
    BlankDatabaseUrl,

    /// Establishing a `SQLite` connection failed.
    #[error("failed to connect to SQLite database: {message}")]
    ConnectionFailed {
        /// Error detail from Diesel.
        message: String,
    },

    /// Running pending migrations failed.
    #[error("failed to run database migrations: {message}")]
    MigrationFailed {
        /// Error detail from Diesel migrations.
        message: String,
    },

    /// Reading the schema version from the migration table failed.
    #[error("failed to read schema version after migrations: {message}")]
    SchemaVersionQueryFailed {
        /// Error detail from Diesel query execution.
        message: String,
    },

    /// The migrations completed but no schema version could be found.
    #[error("no schema version recorded after migrations ran")]
    MissingSchemaVersion,

    /// The ledger tables do not exist yet.
    #[error("ledger schema is not initialised; run `reprise --migrate-db` first")]
    SchemaNotInitialised,

    /// A ledger read failed.
    #[error("ledger query failed: {message}")]
    QueryFailed {
        /// Error detail from Diesel.
        message: String,
    },

    /// A ledger write failed.
    #[error("ledger write failed: {message}")]
    WriteFailed {
        /// Error detail from Diesel.
        message: String,
    },
}
