//! Predicate building - the injection-safety boundary
//!
//! Structured filters arrive from untrusted callers (network messages).
//! [`from_filters`] validates every triple on every call: the field must
//! be a declared column and be marked filterable, the operator comes from
//! a closed enum, and the value is always bound as a parameter. No caller
//! text ever reaches the SQL string.
//!
//! Internal callers (ownership filters, foreign-key joins) construct
//! predicates through [`Predicate::column_eq`] from descriptor metadata.

use crate::entity::{EntityDescriptor, TableSettings};
use crate::value::Value;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};

/// Whitelisted filter operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FilterOp {
    Eq,
    Ne,
    Lt,
    Gt,
    Contains,
    In,
}

/// A filter value: one scalar, or a set for the `In` operator
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum FilterValue {
    Single(Value),
    Set(Vec<Value>),
}

/// One `{field, operator, value}` triple from an external caller
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Filter {
    pub field: String,
    pub op: FilterOp,
    pub value: FilterValue,
}

/// A predicate fragment plus its bound parameters, in order.
///
/// The SQL text only ever contains validated column references, whitelisted
/// operators and `?` placeholders.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Predicate {
    sql: String,
    params: Vec<Value>,
}

impl Predicate {
    /// Equality predicate on a descriptor-declared column. Internal use:
    /// `column` must come from entity metadata, not caller text.
    pub fn column_eq(qualified_column: &str, value: Value) -> Predicate {
        Predicate {
            sql: format!("{qualified_column} = ?"),
            params: vec![value],
        }
    }

    /// Combine two predicates with AND
    pub fn and(mut self, other: Predicate) -> Predicate {
        if self.sql.is_empty() {
            return other;
        }
        if other.sql.is_empty() {
            return self;
        }
        self.sql = format!("({}) AND ({})", self.sql, other.sql);
        self.params.extend(other.params);
        self
    }

    pub fn is_empty(&self) -> bool {
        self.sql.is_empty()
    }

    pub fn sql(&self) -> &str {
        &self.sql
    }

    pub fn params(&self) -> &[Value] {
        &self.params
    }
}

/// Build a predicate from untrusted filter triples, AND-combined.
///
/// Every triple is validated against the entity's declared column set and
/// the settings' filterable set before any SQL is assembled; failures are
/// `InvalidInput` and nothing reaches the store.
pub fn from_filters(
    descriptor: &EntityDescriptor,
    settings: &TableSettings,
    filters: &[Filter],
) -> Result<Predicate> {
    let mut predicate = Predicate::default();
    for filter in filters {
        predicate = predicate.and(from_filter(descriptor, settings, filter)?);
    }
    Ok(predicate)
}

fn from_filter(
    descriptor: &EntityDescriptor,
    settings: &TableSettings,
    filter: &Filter,
) -> Result<Predicate> {
    if !descriptor.has_column(&filter.field) {
        return Err(Error::InvalidInput(format!(
            "unknown filter field '{}' for table {}",
            filter.field, descriptor.table
        )));
    }
    if !settings.is_filterable(&filter.field) {
        return Err(Error::InvalidInput(format!(
            "field '{}' is not filterable on table {}",
            filter.field, descriptor.table
        )));
    }
    // Field is validated against the declared column set, so qualifying it
    // interpolates descriptor text only.
    let column = descriptor.qualified(&filter.field);

    match (filter.op, &filter.value) {
        (FilterOp::Eq, FilterValue::Single(value)) => Ok(Predicate {
            sql: format!("{column} = ?"),
            params: vec![value.clone()],
        }),
        (FilterOp::Ne, FilterValue::Single(value)) => Ok(Predicate {
            sql: format!("{column} != ?"),
            params: vec![value.clone()],
        }),
        (FilterOp::Lt, FilterValue::Single(value)) => Ok(Predicate {
            sql: format!("{column} < ?"),
            params: vec![value.clone()],
        }),
        (FilterOp::Gt, FilterValue::Single(value)) => Ok(Predicate {
            sql: format!("{column} > ?"),
            params: vec![value.clone()],
        }),
        (FilterOp::Contains, FilterValue::Single(Value::Text(text))) => Ok(Predicate {
            sql: format!("{column} LIKE ?"),
            params: vec![Value::Text(format!("%{text}%"))],
        }),
        (FilterOp::Contains, _) => Err(Error::InvalidInput(format!(
            "contains filter on '{}' requires a text value",
            filter.field
        ))),
        (FilterOp::In, FilterValue::Set(values)) => {
            if values.is_empty() {
                return Err(Error::InvalidInput(format!(
                    "empty value set for in filter on '{}'",
                    filter.field
                )));
            }
            let placeholders = vec!["?"; values.len()].join(", ");
            Ok(Predicate {
                sql: format!("{column} IN ({placeholders})"),
                params: values.clone(),
            })
        }
        (FilterOp::In, FilterValue::Single(_)) => Err(Error::InvalidInput(format!(
            "in filter on '{}' requires a value set",
            filter.field
        ))),
        (_, FilterValue::Set(_)) => Err(Error::InvalidInput(format!(
            "filter on '{}' takes a single value",
            filter.field
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entity::ColumnType;

    static ITEM: EntityDescriptor = EntityDescriptor {
        table: "item",
        columns: &[
            ("itemId", ColumnType::Integer),
            ("name", ColumnType::Text),
            ("enabled", ColumnType::Boolean),
            ("secret", ColumnType::Text),
        ],
        primary_key: "itemId",
        foreign_keys: &[],
    };

    static SETTINGS: TableSettings = TableSettings {
        filterable: &["name", "enabled", "itemId"],
        orderable: &["name"],
        owner_column: None,
        default_order: None,
    };

    fn single(field: &str, op: FilterOp, value: Value) -> Filter {
        Filter {
            field: field.to_string(),
            op,
            value: FilterValue::Single(value),
        }
    }

    #[test]
    fn test_rejects_undeclared_field() {
        let err = from_filters(
            &ITEM,
            &SETTINGS,
            &[single("nope", FilterOp::Eq, Value::Integer(1))],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_rejects_field_not_declared_filterable() {
        // declared column, but settings do not allow filtering on it
        let err = from_filters(
            &ITEM,
            &SETTINGS,
            &[single("secret", FilterOp::Eq, Value::Text("x".into()))],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_value_is_bound_not_interpolated() {
        let injection = "x'; DROP TABLE item; --";
        let predicate = from_filters(
            &ITEM,
            &SETTINGS,
            &[single("name", FilterOp::Eq, Value::Text(injection.into()))],
        )
        .unwrap();
        assert_eq!(predicate.sql(), "item.name = ?");
        assert_eq!(predicate.params(), &[Value::Text(injection.into())]);
    }

    #[test]
    fn test_filters_combine_with_and() {
        let predicate = from_filters(
            &ITEM,
            &SETTINGS,
            &[
                single("enabled", FilterOp::Eq, Value::Bool(true)),
                single("name", FilterOp::Contains, Value::Text("a".into())),
            ],
        )
        .unwrap();
        assert_eq!(predicate.sql(), "(item.enabled = ?) AND (item.name LIKE ?)");
        assert_eq!(
            predicate.params(),
            &[Value::Bool(true), Value::Text("%a%".into())]
        );
    }

    #[test]
    fn test_in_set() {
        let predicate = from_filters(
            &ITEM,
            &SETTINGS,
            &[Filter {
                field: "itemId".to_string(),
                op: FilterOp::In,
                value: FilterValue::Set(vec![Value::Integer(1), Value::Integer(2)]),
            }],
        )
        .unwrap();
        assert_eq!(predicate.sql(), "item.itemId IN (?, ?)");
        assert_eq!(predicate.params().len(), 2);
    }

    #[test]
    fn test_in_rejects_empty_set() {
        let err = from_filters(
            &ITEM,
            &SETTINGS,
            &[Filter {
                field: "itemId".to_string(),
                op: FilterOp::In,
                value: FilterValue::Set(vec![]),
            }],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_contains_requires_text() {
        let err = from_filters(
            &ITEM,
            &SETTINGS,
            &[single("enabled", FilterOp::Contains, Value::Bool(true))],
        )
        .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[test]
    fn test_filter_deserializes_from_message_json() {
        let filters: Vec<Filter> = serde_json::from_str(
            r#"[{"field": "enabled", "op": "eq", "value": true},
                {"field": "itemId", "op": "in", "value": [1, 2, 3]}]"#,
        )
        .unwrap();
        assert_eq!(filters[0].op, FilterOp::Eq);
        assert_eq!(filters[1].value, FilterValue::Set(vec![
            Value::Integer(1),
            Value::Integer(2),
            Value::Integer(3),
        ]));
    }

    #[test]
    fn test_internal_column_eq_and_combine() {
        let owner = Predicate::column_eq("item.userId", Value::Integer(9));
        let combined = owner.and(Predicate::column_eq("item.itemId", Value::Integer(4)));
        assert_eq!(combined.sql(), "(item.userId = ?) AND (item.itemId = ?)");
    }
}
