//! Store Layer - SQLite-backed persistence
//!
//! System of record is SQLite, one store file per deployment:
//! - table shapes are generated from entity descriptors (`schema`)
//! - all reads and writes funnel through one connection (`manager`)
//! - schema evolution is versioned, with a pre-migration backup
//!   (`migration`); the version lives in `PRAGMA user_version`

pub mod manager;
pub mod migration;
pub mod schema;

pub use manager::{JoinDescriptor, JoinedEntry, ListQuery, Store};
pub use migration::{MigrationStep, SchemaPlan};
