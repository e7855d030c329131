//! Entity descriptors - static per-table metadata
//!
//! Every entity type declares its table shape once, as a `'static`
//! [`EntityDescriptor`]: table name, ordered column set with semantic
//! types, primary key and foreign keys. Descriptors are immutable and are
//! the sole source of truth for schema generation, predicate validation
//! and join derivation. Column types are declared, never inferred from
//! runtime values.

use crate::query::SortDir;
use crate::value::Row;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Semantic type of one column
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Integer,
    Float,
    Boolean,
}

impl ColumnType {
    /// SQLite column affinity used in generated DDL
    pub fn sql_affinity(&self) -> &'static str {
        match self {
            ColumnType::Text => "TEXT",
            ColumnType::Integer => "INTEGER",
            ColumnType::Float => "REAL",
            // Booleans are stored as 1/0 integers
            ColumnType::Boolean => "INTEGER",
        }
    }
}

/// Referential action when a referenced row is deleted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OnDelete {
    Cascade,
    Restrict,
    SetNull,
}

impl OnDelete {
    pub fn as_sql(&self) -> &'static str {
        match self {
            OnDelete::Cascade => "CASCADE",
            OnDelete::Restrict => "RESTRICT",
            OnDelete::SetNull => "SET NULL",
        }
    }
}

/// A declared relationship from one column to another table's column
#[derive(Debug, Clone, Copy)]
pub struct ForeignKey {
    pub column: &'static str,
    pub target_table: &'static str,
    pub target_column: &'static str,
    pub on_delete: OnDelete,
}

/// Static metadata for one table-backed entity type.
///
/// Defined once per type, immutable thereafter. Invariants (primary key
/// and every foreign-key column present in `columns`) are checked by
/// [`EntityDescriptor::validate`] when the descriptor is registered.
#[derive(Debug)]
pub struct EntityDescriptor {
    pub table: &'static str,
    /// Ordered column set: field name -> semantic type
    pub columns: &'static [(&'static str, ColumnType)],
    pub primary_key: &'static str,
    pub foreign_keys: &'static [ForeignKey],
}

impl EntityDescriptor {
    /// Declared column names, in declaration order
    pub fn column_names(&self) -> impl Iterator<Item = &'static str> + '_ {
        self.columns.iter().map(|(name, _)| *name)
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|(col, _)| *col == name)
    }

    pub fn column_type(&self, name: &str) -> Option<ColumnType> {
        self.columns
            .iter()
            .find(|(col, _)| *col == name)
            .map(|(_, ty)| *ty)
    }

    pub fn primary_key_name(&self) -> &'static str {
        self.primary_key
    }

    pub fn foreign_key_for(&self, column: &str) -> Option<&ForeignKey> {
        self.foreign_keys.iter().find(|fk| fk.column == column)
    }

    /// Table-qualified column reference (`table.column`)
    pub fn qualified(&self, column: &str) -> String {
        format!("{}.{}", self.table, column)
    }

    /// Check descriptor invariants. Violations are programming errors and
    /// abort registry construction.
    pub fn validate(&self) -> Result<()> {
        if !self.has_column(self.primary_key) {
            return Err(Error::InvalidDescriptor {
                table: self.table,
                message: format!("primary key '{}' is not a declared column", self.primary_key),
            });
        }
        for fk in self.foreign_keys {
            if !self.has_column(fk.column) {
                return Err(Error::InvalidDescriptor {
                    table: self.table,
                    message: format!("foreign key column '{}' is not a declared column", fk.column),
                });
            }
        }
        Ok(())
    }

    /// Strip the primary key from a caller-supplied value map and reject
    /// any field that is not a declared column. Used before caller-driven
    /// inserts and updates so the store only ever sees declared fields.
    pub fn sanitize_values(&self, values: &mut Row) -> Result<()> {
        values.remove(self.primary_key);
        for field in values.keys() {
            if !self.has_column(field) {
                return Err(Error::InvalidInput(format!(
                    "unknown field '{}' for table {}",
                    field, self.table
                )));
            }
        }
        Ok(())
    }
}

/// Column-level permissions and row-visibility policy for one entity.
///
/// Consulted by the predicate builder (filterable columns), the
/// caller-facing list select (orderable columns, default order) and the
/// ownership wrapper (`owner_column`).
#[derive(Debug, Default)]
pub struct TableSettings {
    /// Columns an external caller may filter on
    pub filterable: &'static [&'static str],
    /// Columns an external caller may order by
    pub orderable: &'static [&'static str],
    /// When set, rows are only visible to the identity stored in this
    /// column; the list wrapper adds the matching predicate.
    pub owner_column: Option<&'static str>,
    pub default_order: Option<(&'static str, SortDir)>,
}

impl TableSettings {
    pub fn is_filterable(&self, column: &str) -> bool {
        self.filterable.contains(&column)
    }

    pub fn is_orderable(&self, column: &str) -> bool {
        self.orderable.contains(&column)
    }
}

/// A row-shaped type backed by exactly one table
pub trait Entity: Sized {
    fn descriptor() -> &'static EntityDescriptor;

    fn settings() -> &'static TableSettings {
        static NONE: TableSettings = TableSettings {
            filterable: &[],
            orderable: &[],
            owner_column: None,
            default_order: None,
        };
        &NONE
    }

    fn from_row(row: &Row) -> Result<Self>;

    fn to_row(&self) -> Row;
}

/// One registry entry: descriptor plus access policy
#[derive(Debug, Clone, Copy)]
pub struct RegisteredEntity {
    pub descriptor: &'static EntityDescriptor,
    pub settings: &'static TableSettings,
}

/// Closed, startup-built mapping from table name to entity metadata.
///
/// Message handlers resolve caller-supplied list names through this
/// registry; unknown names are rejected as `InvalidInput` before any
/// lookup reaches the store.
#[derive(Debug, Default)]
pub struct EntityRegistry {
    entries: HashMap<&'static str, RegisteredEntity>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an entity type under its table name, validating the
    /// descriptor's invariants.
    pub fn register<E: Entity>(&mut self) -> Result<()> {
        let descriptor = E::descriptor();
        descriptor.validate()?;
        self.entries.insert(
            descriptor.table,
            RegisteredEntity {
                descriptor,
                settings: E::settings(),
            },
        );
        Ok(())
    }

    pub fn lookup(&self, name: &str) -> Result<&RegisteredEntity> {
        self.entries
            .get(name)
            .ok_or_else(|| Error::InvalidInput(format!("unknown entity '{name}'")))
    }

    pub fn iter(&self) -> impl Iterator<Item = &RegisteredEntity> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    static ITEM: EntityDescriptor = EntityDescriptor {
        table: "item",
        columns: &[
            ("itemId", ColumnType::Integer),
            ("name", ColumnType::Text),
            ("enabled", ColumnType::Boolean),
        ],
        primary_key: "itemId",
        foreign_keys: &[],
    };

    static BROKEN_PK: EntityDescriptor = EntityDescriptor {
        table: "broken",
        columns: &[("name", ColumnType::Text)],
        primary_key: "missing",
        foreign_keys: &[],
    };

    static BROKEN_FK: EntityDescriptor = EntityDescriptor {
        table: "broken_fk",
        columns: &[("id", ColumnType::Integer)],
        primary_key: "id",
        foreign_keys: &[ForeignKey {
            column: "ownerId",
            target_table: "user",
            target_column: "userId",
            on_delete: OnDelete::Cascade,
        }],
    };

    #[test]
    fn test_column_lookup() {
        assert!(ITEM.has_column("name"));
        assert!(!ITEM.has_column("nope"));
        assert_eq!(ITEM.column_type("enabled"), Some(ColumnType::Boolean));
        assert_eq!(ITEM.qualified("name"), "item.name");
    }

    #[test]
    fn test_validate_catches_missing_primary_key() {
        assert!(ITEM.validate().is_ok());
        assert!(matches!(
            BROKEN_PK.validate(),
            Err(Error::InvalidDescriptor { table: "broken", .. })
        ));
    }

    #[test]
    fn test_validate_catches_missing_foreign_key_column() {
        assert!(matches!(
            BROKEN_FK.validate(),
            Err(Error::InvalidDescriptor { table: "broken_fk", .. })
        ));
    }

    #[test]
    fn test_sanitize_values_strips_primary_key_and_rejects_unknown() {
        let mut values: Row = [
            ("itemId".to_string(), crate::Value::Integer(7)),
            ("name".to_string(), crate::Value::Text("a".into())),
        ]
        .into_iter()
        .collect();
        ITEM.sanitize_values(&mut values).unwrap();
        assert!(!values.contains_key("itemId"));
        assert!(values.contains_key("name"));

        let mut bad: Row = [("evil".to_string(), crate::Value::Integer(1))].into_iter().collect();
        assert!(matches!(ITEM.sanitize_values(&mut bad), Err(Error::InvalidInput(_))));
    }
}
