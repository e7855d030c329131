//! SQL generation - pure text builders
//!
//! Every function here is side-effect free: structured descriptors in,
//! SQL text out. Values are never interpolated; statements carry `?`
//! placeholders and the access manager binds parameters in the documented
//! order (SET values first, then predicate values). All selected columns
//! are emitted table-qualified so joined tables can never collide on
//! column names.
//!
//! SQLite built without `SQLITE_ENABLE_UPDATE_DELETE_LIMIT` has no native
//! LIMIT on UPDATE/DELETE, so a limit is emulated with a primary-key
//! subselect ordered by primary key. Candidate rows are therefore chosen
//! deterministically under ties.

use crate::value::Row;
use serde::{Deserialize, Serialize};

/// Sort direction, as a closed enum rather than caller text
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum SortDir {
    Asc,
    Desc,
}

impl SortDir {
    pub fn as_sql(&self) -> &'static str {
        match self {
            SortDir::Asc => "ASC",
            SortDir::Desc => "DESC",
        }
    }
}

/// One resolved ORDER BY target (column already table-qualified)
#[derive(Debug, Clone)]
pub struct OrderBy {
    pub column: String,
    pub dir: SortDir,
}

/// How a joined table is attached
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    /// Keeps primary rows whose join column is NULL
    Left,
}

impl JoinKind {
    pub fn as_sql(&self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
        }
    }
}

/// One additional table attached to a select.
///
/// Plain data: the `on` clause is emitted verbatim, trusted because it is
/// only ever constructed from entity-descriptor column names by internal
/// callers.
#[derive(Debug, Clone)]
pub struct Join {
    pub table: String,
    pub on: String,
    pub kind: JoinKind,
    /// Unqualified column names of the joined table to select
    pub columns: Vec<String>,
}

/// The value form of an update: direct assignment or a relative delta.
///
/// A tagged variant instead of a magic operator key, so update intent is
/// explicit in the type system and the two forms cannot be mixed.
#[derive(Debug, Clone)]
pub enum UpdateSet {
    /// `column = ?` per field
    Assign(Row),
    /// `column = column + ?` per field
    Increment(Row),
}

impl UpdateSet {
    pub fn values(&self) -> &Row {
        match self {
            UpdateSet::Assign(row) | UpdateSet::Increment(row) => row,
        }
    }
}

/// Table-qualified column reference
pub fn qualify(table: &str, column: &str) -> String {
    format!("{table}.{column}")
}

/// Build a SELECT statement.
///
/// `columns` are unqualified names of the primary table; `None` selects
/// all of the table's columns (`table.*`). Join selects are taken from
/// each [`Join`] and qualified with the joined table's name. Joins are
/// emitted in declaration order, each with its declared kind.
pub fn build_select(
    table: &str,
    columns: Option<&[&str]>,
    joins: &[Join],
    predicate: Option<&str>,
    order: Option<&OrderBy>,
    limit: Option<u32>,
    offset: Option<u32>,
) -> String {
    let mut selected: Vec<String> = match columns {
        Some(cols) => cols.iter().map(|col| qualify(table, col)).collect(),
        None => vec![format!("{table}.*")],
    };
    for join in joins {
        selected.extend(join.columns.iter().map(|col| qualify(&join.table, col)));
    }

    let mut sql = format!("SELECT {} FROM {table}", selected.join(", "));
    for join in joins {
        sql.push_str(&format!(" {} {} ON {}", join.kind.as_sql(), join.table, join.on));
    }
    if let Some(predicate) = predicate {
        sql.push_str(&format!(" WHERE {predicate}"));
    }
    if let Some(order) = order {
        sql.push_str(&format!(" ORDER BY {} {}", order.column, order.dir.as_sql()));
    }
    push_limit_offset(&mut sql, limit, offset);
    sql
}

/// Build a COUNT(*) select with the same predicate semantics as
/// [`build_select`].
pub fn build_count(table: &str, predicate: Option<&str>) -> String {
    let mut sql = format!("SELECT COUNT(*) FROM {table}");
    if let Some(predicate) = predicate {
        sql.push_str(&format!(" WHERE {predicate}"));
    }
    sql
}

/// Build an INSERT statement with one positional placeholder per column,
/// in the given order. The caller binds the matching ordered value list.
pub fn build_insert(table: &str, columns: &[&str]) -> String {
    let placeholders = vec!["?"; columns.len()].join(", ");
    format!(
        "INSERT INTO {table} ({}) VALUES ({placeholders})",
        columns.join(", ")
    )
}

/// Build an UPDATE statement. SET placeholders come first, predicate
/// placeholders after. With a limit, affected rows are restricted to the
/// first `n` matching primary keys in primary-key order.
pub fn build_update(
    table: &str,
    set: &UpdateSet,
    predicate: &str,
    primary_key: &str,
    limit: Option<u32>,
) -> String {
    let assignments: Vec<String> = match set {
        UpdateSet::Assign(row) => row.keys().map(|col| format!("{col} = ?")).collect(),
        UpdateSet::Increment(row) => row.keys().map(|col| format!("{col} = {col} + ?")).collect(),
    };
    format!(
        "UPDATE {table} SET {} WHERE {}",
        assignments.join(", "),
        limited_predicate(table, predicate, primary_key, limit)
    )
}

/// Build a DELETE statement, with the same limit emulation as
/// [`build_update`].
pub fn build_delete(table: &str, predicate: &str, primary_key: &str, limit: Option<u32>) -> String {
    format!(
        "DELETE FROM {table} WHERE {}",
        limited_predicate(table, predicate, primary_key, limit)
    )
}

fn limited_predicate(table: &str, predicate: &str, primary_key: &str, limit: Option<u32>) -> String {
    match limit {
        Some(limit) => format!(
            "{primary_key} IN (SELECT {primary_key} FROM {table} WHERE {predicate} ORDER BY {primary_key} LIMIT {limit})"
        ),
        None => predicate.to_string(),
    }
}

fn push_limit_offset(sql: &mut String, limit: Option<u32>, offset: Option<u32>) {
    match (limit, offset) {
        (Some(limit), Some(offset)) => sql.push_str(&format!(" LIMIT {limit} OFFSET {offset}")),
        (Some(limit), None) => sql.push_str(&format!(" LIMIT {limit}")),
        // SQLite needs a LIMIT clause to carry an OFFSET; -1 means unbounded
        (None, Some(offset)) => sql.push_str(&format!(" LIMIT -1 OFFSET {offset}")),
        (None, None) => {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::value::Value;

    #[test]
    fn test_select_all_columns() {
        let sql = build_select("item", None, &[], None, None, None, None);
        assert_eq!(sql, "SELECT item.* FROM item");
    }

    #[test]
    fn test_select_qualifies_columns() {
        let sql = build_select("item", Some(&["itemId", "name"]), &[], None, None, None, None);
        assert_eq!(sql, "SELECT item.itemId, item.name FROM item");
    }

    #[test]
    fn test_select_with_predicate_and_bounds() {
        let sql = build_select(
            "item",
            Some(&["name"]),
            &[],
            Some("item.enabled = ?"),
            None,
            Some(10),
            Some(20),
        );
        assert_eq!(
            sql,
            "SELECT item.name FROM item WHERE item.enabled = ? LIMIT 10 OFFSET 20"
        );
    }

    #[test]
    fn test_select_offset_without_limit() {
        let sql = build_select("item", Some(&["name"]), &[], None, None, None, Some(5));
        assert_eq!(sql, "SELECT item.name FROM item LIMIT -1 OFFSET 5");
    }

    #[test]
    fn test_select_with_join() {
        let join = Join {
            table: "budget".to_string(),
            on: "payment.budgetId = budget.budgetId".to_string(),
            kind: JoinKind::Inner,
            columns: vec!["budgetName".to_string()],
        };
        let sql = build_select(
            "payment",
            Some(&["paymentId", "amount"]),
            &[join],
            Some("payment.userId = ?"),
            None,
            None,
            None,
        );
        assert_eq!(
            sql,
            "SELECT payment.paymentId, payment.amount, budget.budgetName FROM payment \
             INNER JOIN budget ON payment.budgetId = budget.budgetId \
             WHERE payment.userId = ?"
        );
    }

    #[test]
    fn test_select_with_left_join() {
        let join = Join {
            table: "budget".to_string(),
            on: "payment.budgetId = budget.budgetId".to_string(),
            kind: JoinKind::Left,
            columns: vec!["budgetName".to_string()],
        };
        let sql = build_select("payment", Some(&["paymentId"]), &[join], None, None, None, None);
        assert_eq!(
            sql,
            "SELECT payment.paymentId, budget.budgetName FROM payment \
             LEFT JOIN budget ON payment.budgetId = budget.budgetId"
        );
    }

    #[test]
    fn test_select_with_order() {
        let order = OrderBy {
            column: "item.name".to_string(),
            dir: SortDir::Desc,
        };
        let sql = build_select("item", Some(&["name"]), &[], None, Some(&order), None, None);
        assert_eq!(sql, "SELECT item.name FROM item ORDER BY item.name DESC");
    }

    #[test]
    fn test_insert_placeholders() {
        let sql = build_insert("item", &["enabled", "name"]);
        assert_eq!(sql, "INSERT INTO item (enabled, name) VALUES (?, ?)");
    }

    #[test]
    fn test_count() {
        assert_eq!(build_count("item", None), "SELECT COUNT(*) FROM item");
        assert_eq!(
            build_count("item", Some("item.enabled = ?")),
            "SELECT COUNT(*) FROM item WHERE item.enabled = ?"
        );
    }

    #[test]
    fn test_update_assign() {
        let set = UpdateSet::Assign(
            [("name".to_string(), Value::Text("b".into()))].into_iter().collect(),
        );
        let sql = build_update("item", &set, "itemId = ?", "itemId", None);
        assert_eq!(sql, "UPDATE item SET name = ? WHERE itemId = ?");
    }

    #[test]
    fn test_update_increment() {
        let set = UpdateSet::Increment(
            [
                ("spendingSum".to_string(), Value::Float(3.0)),
                ("spendingTimes".to_string(), Value::Integer(1)),
            ]
            .into_iter()
            .collect(),
        );
        let sql = build_update("budget", &set, "budgetId = ?", "budgetId", None);
        assert_eq!(
            sql,
            "UPDATE budget SET spendingSum = spendingSum + ?, spendingTimes = spendingTimes + ? WHERE budgetId = ?"
        );
    }

    #[test]
    fn test_update_with_limit_uses_key_subselect() {
        let set = UpdateSet::Assign(
            [("enabled".to_string(), Value::Bool(false))].into_iter().collect(),
        );
        let sql = build_update("item", &set, "enabled = ?", "itemId", Some(2));
        assert_eq!(
            sql,
            "UPDATE item SET enabled = ? WHERE itemId IN \
             (SELECT itemId FROM item WHERE enabled = ? ORDER BY itemId LIMIT 2)"
        );
    }

    #[test]
    fn test_delete_with_limit_uses_key_subselect() {
        let sql = build_delete("item", "enabled = ?", "itemId", Some(1));
        assert_eq!(
            sql,
            "DELETE FROM item WHERE itemId IN \
             (SELECT itemId FROM item WHERE enabled = ? ORDER BY itemId LIMIT 1)"
        );
    }

    #[test]
    fn test_delete_without_limit() {
        let sql = build_delete("item", "itemId = ?", "itemId", None);
        assert_eq!(sql, "DELETE FROM item WHERE itemId = ?");
    }
}
