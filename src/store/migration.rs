//! Versioned schema migration with automatic backup
//!
//! Runs once at store-open time, before any other operation reaches the
//! store. The persisted schema version lives in `PRAGMA user_version`
//! (0 for a freshly created store). On mismatch, a full backup snapshot
//! is taken first; only then do the declared steps run, each bound to the
//! version it upgrades from and each wrapped in a transaction that also
//! bumps the stored version. A failed step leaves the store at the last
//! good version with the backup intact. A stored version newer than the
//! expected one fails fast; no downgrade is ever attempted.

use crate::entity::EntityRegistry;
use crate::store::schema;
use crate::{Error, Result};
use rusqlite::Connection;
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime, UNIX_EPOCH};

/// One migration step, bound to the version it upgrades from
#[derive(Debug, Clone)]
pub struct MigrationStep {
    pub from_version: i32,
    pub statements: Vec<String>,
}

/// The application's declared schema: expected version plus the ordered
/// steps that carry a store from any older version to it.
#[derive(Debug, Clone)]
pub struct SchemaPlan {
    pub version: i32,
    pub steps: Vec<MigrationStep>,
}

impl SchemaPlan {
    pub fn new(version: i32) -> Self {
        Self {
            version,
            steps: Vec::new(),
        }
    }

    /// Declare the step upgrading from `from_version` to the next version
    pub fn step(mut self, from_version: i32, statements: Vec<String>) -> Self {
        self.steps.push(MigrationStep {
            from_version,
            statements,
        });
        self
    }

    /// Plan whose version-0 step creates the full schema from the
    /// registry's descriptors. Later steps are declared on top.
    pub fn with_initial_schema(version: i32, registry: &EntityRegistry) -> Self {
        Self::new(version).step(0, schema::schema_statements(registry))
    }

    fn step_from(&self, version: i32) -> Option<&MigrationStep> {
        self.steps.iter().find(|step| step.from_version == version)
    }
}

/// Bring the store to the plan's version. `db_path` is the store file;
/// `None` for in-memory stores, which have no file to snapshot. Backup
/// snapshots land in `backup_dir` when given, beside the store file
/// otherwise.
pub fn run(
    conn: &mut Connection,
    db_path: Option<&Path>,
    backup_dir: Option<&Path>,
    plan: &SchemaPlan,
) -> Result<()> {
    let stored = user_version(conn)?;
    if stored == plan.version {
        return Ok(());
    }
    if plan.version < stored {
        return Err(Error::VersionDowngrade {
            stored,
            expected: plan.version,
        });
    }

    tracing::info!(stored, expected = plan.version, "schema version mismatch, migrating");

    if let Some(path) = db_path {
        let backup_path = backup_path_for(path, backup_dir)?;
        backup(conn, &backup_path)?;
        tracing::info!(backup = %backup_path.display(), "backup snapshot written");
    }

    for version in stored..plan.version {
        let step = plan.step_from(version).ok_or_else(|| Error::MigrationStepFailure {
            from_version: version,
            message: "no migration step declared for this version".to_string(),
        })?;
        apply_step(conn, step)?;
        tracing::info!(from = version, to = version + 1, "migration step applied");
    }
    Ok(())
}

/// Read the persisted schema version
pub fn user_version(conn: &Connection) -> Result<i32> {
    conn.query_row("PRAGMA user_version", [], |row| row.get(0))
        .map_err(Into::into)
}

/// Apply one step atomically: statements and the version bump commit
/// together or not at all.
fn apply_step(conn: &mut Connection, step: &MigrationStep) -> Result<()> {
    let step_failed = |e: rusqlite::Error| Error::MigrationStepFailure {
        from_version: step.from_version,
        message: e.to_string(),
    };

    let tx = conn.transaction().map_err(step_failed)?;
    for statement in &step.statements {
        tx.execute_batch(statement).map_err(step_failed)?;
    }
    tx.pragma_update(None, "user_version", step.from_version + 1)
        .map_err(step_failed)?;
    tx.commit().map_err(step_failed)
}

/// Deterministic, timestamp-named snapshot path: in `backup_dir` when
/// configured, a sibling of the store file otherwise
fn backup_path_for(db_path: &Path, backup_dir: Option<&Path>) -> Result<PathBuf> {
    let stem = db_path
        .file_stem()
        .and_then(|stem| stem.to_str())
        .unwrap_or("store");
    let millis = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map_err(|e| Error::BackupFailure(e.to_string()))?
        .as_millis();
    let file_name = format!("{stem}-backup-{millis}.sqlite");
    match backup_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir).map_err(|e| Error::BackupFailure(e.to_string()))?;
            Ok(dir.join(file_name))
        }
        None => Ok(db_path.with_file_name(file_name)),
    }
}

/// Full online backup of the open store to `backup_path`. Must complete
/// before any migration statement runs; failure aborts startup.
fn backup(conn: &Connection, backup_path: &Path) -> Result<()> {
    let backup_failed = |e: rusqlite::Error| Error::BackupFailure(e.to_string());

    let mut target = Connection::open(backup_path).map_err(backup_failed)?;
    let backup = rusqlite::backup::Backup::new(conn, &mut target).map_err(backup_failed)?;
    backup
        .run_to_completion(64, Duration::from_millis(0), None)
        .map_err(backup_failed)
}
