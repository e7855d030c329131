//! DDL generation from entity descriptors

use crate::entity::{ColumnType, EntityDescriptor, EntityRegistry};

/// SQL to create one descriptor's table.
///
/// Integer primary keys become `INTEGER PRIMARY KEY AUTOINCREMENT` (rowid
/// alias, store-generated). Foreign keys carry their declared ON DELETE
/// action; enforcement is left to SQLite's referential-integrity engine.
pub fn create_table_sql(descriptor: &EntityDescriptor) -> String {
    let mut defs: Vec<String> = Vec::new();
    for (name, ty) in descriptor.columns {
        let mut def = format!("{name} {}", ty.sql_affinity());
        if *name == descriptor.primary_key {
            if *ty == ColumnType::Integer {
                def.push_str(" PRIMARY KEY AUTOINCREMENT");
            } else {
                def.push_str(" PRIMARY KEY");
            }
        }
        defs.push(def);
    }
    for fk in descriptor.foreign_keys {
        defs.push(format!(
            "FOREIGN KEY ({}) REFERENCES {}({}) ON DELETE {}",
            fk.column,
            fk.target_table,
            fk.target_column,
            fk.on_delete.as_sql()
        ));
    }
    format!(
        "CREATE TABLE IF NOT EXISTS {} (\n    {}\n)",
        descriptor.table,
        defs.join(",\n    ")
    )
}

/// Index statements for one table (foreign-key columns)
pub fn create_index_sql(descriptor: &EntityDescriptor) -> Vec<String> {
    descriptor
        .foreign_keys
        .iter()
        .map(|fk| {
            format!(
                "CREATE INDEX IF NOT EXISTS idx_{}_{} ON {}({})",
                descriptor.table, fk.column, descriptor.table, fk.column
            )
        })
        .collect()
}

/// All schema creation statements for a registry, tables first then
/// indexes, in stable (table-name) order.
pub fn schema_statements(registry: &EntityRegistry) -> Vec<String> {
    let mut descriptors: Vec<&EntityDescriptor> =
        registry.iter().map(|entry| entry.descriptor).collect();
    descriptors.sort_by_key(|descriptor| descriptor.table);

    let mut stmts: Vec<String> = descriptors.iter().map(|d| create_table_sql(d)).collect();
    for descriptor in &descriptors {
        stmts.extend(create_index_sql(descriptor));
    }
    stmts
}
