//! # Tablekit - Typed relational access layer over embedded SQLite
//!
//! Tablekit sits between application message handlers and an embedded
//! SQLite store. It provides:
//! - Static entity descriptors (table, columns, primary key, foreign keys)
//! - Safe predicate building from untrusted structured filters
//! - Pure SQL generation with table-qualified columns and join support
//! - A data access manager with typed select/insert/update/delete/count
//! - Versioned schema migration with automatic pre-migration backup

pub mod config;
pub mod entity;
pub mod predicate;
pub mod query;
pub mod store;
pub mod value;

// Re-exports for convenient access
pub use entity::{
    ColumnType, Entity, EntityDescriptor, EntityRegistry, ForeignKey, OnDelete, TableSettings,
};
pub use predicate::{Filter, FilterOp, FilterValue, Predicate};
pub use query::{Join, JoinKind, OrderBy, SortDir, UpdateSet};
pub use store::manager::{JoinDescriptor, JoinedEntry, ListQuery, Store};
pub use store::migration::{MigrationStep, SchemaPlan};
pub use value::{Row, Value};

/// Result type alias for Tablekit operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for Tablekit operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Caller-supplied filter/order/column references a field that is not
    /// declared or not permitted. Detected before any SQL is built.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    /// The store rejected a write due to a declared foreign-key or
    /// uniqueness constraint. Surfaced verbatim, never retried.
    #[error("Constraint violation: {0}")]
    ConstraintViolation(String),

    /// The underlying store handle could not be opened.
    #[error("Store unavailable: {0}")]
    StoreUnavailable(String),

    /// The pre-migration backup could not be completed. Fatal at startup.
    #[error("Backup failed: {0}")]
    BackupFailure(String),

    /// A migration step failed. The store is left at the last good version
    /// and the backup remains available for manual recovery.
    #[error("Migration step from version {from_version} failed: {message}")]
    MigrationStepFailure { from_version: i32, message: String },

    /// The on-disk schema is newer than the running build expects.
    #[error("Stored schema version {stored} is newer than expected version {expected}")]
    VersionDowngrade { stored: i32, expected: i32 },

    /// An entity descriptor violates its own invariants (primary key or
    /// foreign-key column missing from the column set). Programming error,
    /// caught at registry construction.
    #[error("Invalid descriptor for table {table}: {message}")]
    InvalidDescriptor { table: &'static str, message: String },

    #[error("Storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
