//! Data access manager - the single store handle
//!
//! Owns the one `rusqlite::Connection`, created at startup after
//! migration and held until shutdown. All operations address exactly one
//! primary table plus zero or more joined tables, and every operation
//! applies the logical/store boolean coercion declared by the entity
//! descriptors. Serialization across concurrent callers is left to
//! SQLite's own locking; this layer adds no mutex and no transaction
//! around multi-call sequences.

use crate::entity::{EntityDescriptor, EntityRegistry, Entity, TableSettings};
use crate::predicate::{self, Predicate};
use crate::query::{self, Join, JoinKind, OrderBy, SortDir, UpdateSet};
use crate::value::{Row, Value};
use crate::store::migration::{self, SchemaPlan};
use crate::{Error, Result};
use rusqlite::{params_from_iter, Connection};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;

/// A request-scoped join: one additional table attached to a select.
///
/// Constructed by internal callers from entity metadata (usually via
/// [`foreign_key_joins`]); the `on` clause is emitted verbatim.
#[derive(Debug, Clone)]
pub struct JoinDescriptor {
    pub entity: &'static EntityDescriptor,
    pub on: String,
    pub kind: JoinKind,
    /// Unqualified columns of the joined entity to select
    pub columns: Vec<&'static str>,
}

/// One reassembled result row: the primary entity's partial record plus
/// each joined table's partial record, keyed by table name.
///
/// Keying by table name assumes at most one join per joined table; a
/// second join against the same table overwrites the first entry.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct JoinedEntry {
    pub entry: Row,
    pub joined: BTreeMap<String, Row>,
}

/// A caller-facing list request, as deserialized from a network message.
/// Everything in here is untrusted and validated before use.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct ListQuery {
    #[serde(default)]
    pub filters: Vec<predicate::Filter>,
    pub order: Option<String>,
    pub order_dir: Option<SortDir>,
    pub limit: Option<u32>,
    pub offset: Option<u32>,
}

/// Derive one join per declared foreign key: target table attached on
/// `fk_column = target_column`, selecting all of the target's columns.
///
/// Emitted as LEFT JOINs: a NULL foreign-key column (insertable, and what
/// `OnDelete::SetNull` produces) must not drop the primary row, or pages
/// would diverge from the unjoined `count` under the same predicate.
pub fn foreign_key_joins(
    registry: &EntityRegistry,
    descriptor: &EntityDescriptor,
) -> Result<Vec<JoinDescriptor>> {
    descriptor
        .foreign_keys
        .iter()
        .map(|fk| {
            let target = registry.lookup(fk.target_table)?.descriptor;
            Ok(JoinDescriptor {
                entity: target,
                on: format!(
                    "{} = {}",
                    descriptor.qualified(fk.column),
                    target.qualified(fk.target_column)
                ),
                kind: JoinKind::Left,
                columns: target.column_names().collect(),
            })
        })
        .collect()
}

/// The single handle to the embedded store.
///
/// `Closed -> Open` happens once, in [`Store::open`], after migration has
/// run to completion; shutdown (drop) is terminal.
pub struct Store {
    conn: Connection,
}

impl Store {
    /// Open the store file (creating it if absent), enforce foreign keys,
    /// and run migration before anything else touches the store. Backup
    /// snapshots land beside the store file.
    pub fn open(path: &Path, plan: &SchemaPlan) -> Result<Self> {
        Self::open_with_backup_dir(path, None, plan)
    }

    /// Like [`Store::open`], but migration backups are written to
    /// `backup_dir` (see `TablekitConfig.backup_dir`).
    pub fn open_with_backup_dir(
        path: &Path,
        backup_dir: Option<&Path>,
        plan: &SchemaPlan,
    ) -> Result<Self> {
        let mut conn =
            Connection::open(path).map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        conn.pragma_update(None, "foreign_keys", true)?;
        migration::run(&mut conn, Some(path), backup_dir, plan)?;
        tracing::info!(path = %path.display(), "store open");
        Ok(Self { conn })
    }

    /// Open an in-memory store (for testing)
    pub fn open_in_memory(plan: &SchemaPlan) -> Result<Self> {
        let mut conn =
            Connection::open_in_memory().map_err(|e| Error::StoreUnavailable(e.to_string()))?;
        conn.pragma_update(None, "foreign_keys", true)?;
        migration::run(&mut conn, None, None, plan)?;
        Ok(Self { conn })
    }

    // ========== Reads ==========

    /// Select full rows of one table, in store-returned order
    pub fn select_rows(
        &self,
        descriptor: &EntityDescriptor,
        predicate: Option<&Predicate>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<Row>> {
        let columns: Vec<&str> = descriptor.column_names().collect();
        let (where_sql, params) = predicate_parts(predicate);
        let sql = query::build_select(
            descriptor.table,
            Some(&columns),
            &[],
            where_sql,
            None,
            limit,
            offset,
        );
        tracing::debug!(%sql, "select");

        let mut stmt = self.conn.prepare(&sql)?;
        let rows = stmt.query_map(params_from_iter(params), |row| {
            let mut out = Row::new();
            for (idx, (name, ty)) in descriptor.columns.iter().enumerate() {
                out.insert((*name).to_string(), Value::from_column(row, idx, *ty)?);
            }
            Ok(out)
        })?;
        rows.collect::<rusqlite::Result<Vec<Row>>>().map_err(map_store_err)
    }

    /// Select typed records. Zero rows is an empty vector, not an error.
    pub fn select<E: Entity>(
        &self,
        predicate: Option<&Predicate>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<E>> {
        let rows = self.select_rows(E::descriptor(), predicate, limit, offset)?;
        rows.iter().map(E::from_row).collect()
    }

    /// Select with joins: one combined query, then each result row is
    /// split back into the primary entity's partial record and one partial
    /// record per joined table. Returns exactly one entry per store row.
    pub fn joined_select(
        &self,
        descriptor: &EntityDescriptor,
        columns: &[&str],
        joins: &[JoinDescriptor],
        predicate: Option<&Predicate>,
        order: Option<&OrderBy>,
        limit: Option<u32>,
        offset: Option<u32>,
    ) -> Result<Vec<JoinedEntry>> {
        // Resolve every selected column to its declared type up front;
        // unknown columns never reach the store.
        let mut shape: Vec<(&str, crate::entity::ColumnType)> = Vec::new();
        for col in columns {
            let ty = descriptor.column_type(col).ok_or_else(|| {
                Error::InvalidInput(format!(
                    "unknown column '{col}' for table {}",
                    descriptor.table
                ))
            })?;
            shape.push((*col, ty));
        }
        for join in joins {
            for col in &join.columns {
                let ty = join.entity.column_type(col).ok_or_else(|| {
                    Error::InvalidInput(format!(
                        "unknown column '{col}' for joined table {}",
                        join.entity.table
                    ))
                })?;
                shape.push((*col, ty));
            }
        }

        let join_clauses: Vec<Join> = joins
            .iter()
            .map(|join| Join {
                table: join.entity.table.to_string(),
                on: join.on.clone(),
                kind: join.kind,
                columns: join.columns.iter().map(|col| col.to_string()).collect(),
            })
            .collect();
        let (where_sql, params) = predicate_parts(predicate);
        let sql = query::build_select(
            descriptor.table,
            Some(columns),
            &join_clauses,
            where_sql,
            order,
            limit,
            offset,
        );
        tracing::debug!(%sql, "joined select");

        let primary_width = columns.len();
        let mut stmt = self.conn.prepare(&sql)?;
        let entries = stmt.query_map(params_from_iter(params), |row| {
            // Selected columns are read positionally: primary columns
            // first, then each join's columns in declaration order, so
            // same-named columns across tables can never collide.
            let mut entry = Row::new();
            for (idx, (name, ty)) in shape[..primary_width].iter().enumerate() {
                entry.insert((*name).to_string(), Value::from_column(row, idx, *ty)?);
            }

            let mut joined = BTreeMap::new();
            let mut idx = primary_width;
            for join in joins {
                let mut record = Row::new();
                for _ in &join.columns {
                    let (name, ty) = shape[idx];
                    record.insert(name.to_string(), Value::from_column(row, idx, ty)?);
                    idx += 1;
                }
                joined.insert(join.entity.table.to_string(), record);
            }
            Ok(JoinedEntry { entry, joined })
        })?;
        entries
            .collect::<rusqlite::Result<Vec<JoinedEntry>>>()
            .map_err(map_store_err)
    }

    /// Count rows matching the predicate, with the same predicate
    /// semantics as `select`/`joined_select`.
    pub fn count(
        &self,
        descriptor: &EntityDescriptor,
        predicate: Option<&Predicate>,
    ) -> Result<u64> {
        let (where_sql, params) = predicate_parts(predicate);
        let sql = query::build_count(descriptor.table, where_sql);
        let count: i64 = self
            .conn
            .query_row(&sql, params_from_iter(params), |row| row.get(0))
            .map_err(map_store_err)?;
        Ok(count as u64)
    }

    // ========== Writes ==========

    /// Insert one row. Returns the generated primary key, or `None` when
    /// the store reports that no row was inserted.
    pub fn insert(&self, descriptor: &EntityDescriptor, values: &Row) -> Result<Option<i64>> {
        if values.is_empty() {
            return Err(Error::InvalidInput(format!(
                "empty insert into table {}",
                descriptor.table
            )));
        }
        check_declared(descriptor, values)?;

        let columns: Vec<&str> = values.keys().map(String::as_str).collect();
        let sql = query::build_insert(descriptor.table, &columns);
        tracing::debug!(%sql, "insert");

        let changed = self
            .conn
            .execute(&sql, params_from_iter(values.values()))
            .map_err(map_store_err)?;
        Ok((changed > 0).then(|| self.conn.last_insert_rowid()))
    }

    /// Update matching rows, either assigning values or applying deltas.
    /// Returns the changed-row count; zero is a valid outcome.
    pub fn update(
        &self,
        descriptor: &EntityDescriptor,
        set: &UpdateSet,
        predicate: &Predicate,
        limit: Option<u32>,
    ) -> Result<usize> {
        let values = set.values();
        if values.is_empty() {
            return Err(Error::InvalidInput(format!(
                "empty update on table {}",
                descriptor.table
            )));
        }
        check_declared(descriptor, values)?;
        if let UpdateSet::Increment(row) = set {
            for field in row.keys() {
                match descriptor.column_type(field) {
                    Some(crate::entity::ColumnType::Integer)
                    | Some(crate::entity::ColumnType::Float) => {}
                    _ => {
                        return Err(Error::InvalidInput(format!(
                            "increment on non-numeric column '{field}'"
                        )));
                    }
                }
            }
        }
        if predicate.is_empty() {
            return Err(Error::InvalidInput(format!(
                "update on table {} requires a predicate",
                descriptor.table
            )));
        }

        let sql = query::build_update(
            descriptor.table,
            set,
            predicate.sql(),
            descriptor.primary_key,
            limit,
        );
        tracing::debug!(%sql, "update");

        self.conn
            .execute(&sql, params_from_iter(values.values().chain(predicate.params())))
            .map_err(map_store_err)
    }

    /// Delete matching rows. Declared CASCADE relationships are enforced
    /// by the store's referential-integrity engine; RESTRICT surfaces as a
    /// `ConstraintViolation`.
    pub fn delete(
        &self,
        descriptor: &EntityDescriptor,
        predicate: &Predicate,
        limit: Option<u32>,
    ) -> Result<usize> {
        if predicate.is_empty() {
            return Err(Error::InvalidInput(format!(
                "delete on table {} requires a predicate",
                descriptor.table
            )));
        }
        let sql = query::build_delete(
            descriptor.table,
            predicate.sql(),
            descriptor.primary_key,
            limit,
        );
        tracing::debug!(%sql, "delete");

        self.conn
            .execute(&sql, params_from_iter(predicate.params()))
            .map_err(map_store_err)
    }

    // ========== Caller-facing list surface ==========

    /// Resolve a caller-supplied list name and run a fully joined select
    /// under the entity's declared policy: row visibility from the
    /// settings' owner column, filters through the predicate builder,
    /// order restricted to orderable columns, joins derived from foreign
    /// keys. Returns the page plus the total count under the same
    /// predicate.
    pub fn list_select(
        &self,
        registry: &EntityRegistry,
        list_name: &str,
        identity: Option<Value>,
        request: &ListQuery,
    ) -> Result<(Vec<JoinedEntry>, u64)> {
        let registered = registry.lookup(list_name)?;
        let descriptor = registered.descriptor;
        let settings = registered.settings;

        let mut combined = Predicate::default();
        if let Some(owner_column) = settings.owner_column {
            let identity = identity.ok_or_else(|| {
                Error::InvalidInput(format!(
                    "table {} is owner-scoped and needs an identity",
                    descriptor.table
                ))
            })?;
            combined = combined.and(Predicate::column_eq(
                &descriptor.qualified(owner_column),
                identity,
            ));
        }
        combined = combined.and(predicate::from_filters(descriptor, settings, &request.filters)?);

        let order = resolve_order(descriptor, settings, request)?;
        let joins = foreign_key_joins(registry, descriptor)?;
        let columns: Vec<&str> = descriptor.column_names().collect();

        let predicate = (!combined.is_empty()).then_some(&combined);
        let entries = self.joined_select(
            descriptor,
            &columns,
            &joins,
            predicate,
            order.as_ref(),
            request.limit,
            request.offset,
        )?;
        let total = self.count(descriptor, predicate)?;
        Ok((entries, total))
    }
}

fn resolve_order(
    descriptor: &EntityDescriptor,
    settings: &TableSettings,
    request: &ListQuery,
) -> Result<Option<OrderBy>> {
    if let Some(column) = &request.order {
        if !descriptor.has_column(column) || !settings.is_orderable(column) {
            return Err(Error::InvalidInput(format!(
                "cannot order table {} by '{column}'",
                descriptor.table
            )));
        }
        return Ok(Some(OrderBy {
            column: descriptor.qualified(column),
            dir: request.order_dir.unwrap_or(SortDir::Asc),
        }));
    }
    Ok(settings.default_order.map(|(column, dir)| OrderBy {
        column: descriptor.qualified(column),
        dir,
    }))
}

fn predicate_parts(predicate: Option<&Predicate>) -> (Option<&str>, &[Value]) {
    match predicate {
        Some(p) if !p.is_empty() => (Some(p.sql()), p.params()),
        _ => (None, &[]),
    }
}

fn check_declared(descriptor: &EntityDescriptor, values: &Row) -> Result<()> {
    for field in values.keys() {
        if !descriptor.has_column(field) {
            return Err(Error::InvalidInput(format!(
                "unknown field '{}' for table {}",
                field, descriptor.table
            )));
        }
    }
    Ok(())
}

/// Constraint failures surface as their own error; everything else from
/// the store propagates unchanged.
fn map_store_err(e: rusqlite::Error) -> Error {
    match &e {
        rusqlite::Error::SqliteFailure(inner, message)
            if inner.code == rusqlite::ErrorCode::ConstraintViolation =>
        {
            Error::ConstraintViolation(message.clone().unwrap_or_else(|| inner.to_string()))
        }
        _ => Error::Storage(e),
    }
}
