//! Push-down descriptors: select queries, sort keys, and row filters.

use serde::{Deserialize, Serialize};

use crate::table::Table;
use crate::value::{Row, Value};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum SortDirection {
    Ascending,
    Descending,
}

/// One sort key: a column and a direction.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq, Hash)]
pub struct Sort {
    pub column: String,
    pub direction: SortDirection,
}

impl Sort {
    pub fn ascending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Ascending,
        }
    }

    pub fn descending(column: impl Into<String>) -> Self {
        Self {
            column: column.into(),
            direction: SortDirection::Descending,
        }
    }
}

pub type Sorts = Vec<Sort>;

/// True when `actual` satisfies `required`: the required keys are a prefix
/// of the actual produced order, with identical columns and directions. An
/// empty requirement is satisfied by anything; an empty actual order
/// satisfies nothing.
pub fn sorts_start_with(actual: &[Sort], required: &[Sort]) -> bool {
    if required.is_empty() {
        return true;
    }
    if actual.len() < required.len() {
        return false;
    }
    actual.iter().zip(required.iter()).all(|(a, r)| a == r)
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum FilterOperator {
    Equal,
    NotEqual,
    LessThan,
    LessThanOrEqual,
    GreaterThan,
    GreaterThanOrEqual,
    IsNull,
    IsNotNull,
}

/// A single pushed-down row predicate.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Filter {
    pub column: String,
    pub operator: FilterOperator,
    #[serde(default = "null_value")]
    pub value: Value,
}

fn null_value() -> Value {
    Value::Null
}

impl Filter {
    pub fn new(column: impl Into<String>, operator: FilterOperator, value: Value) -> Self {
        Self {
            column: column.into(),
            operator,
            value,
        }
    }

    /// Evaluate against a row. Comparisons involving a null row value are
    /// false except for the explicit null checks.
    pub fn matches(&self, row: &Row, table: &Table) -> bool {
        let Some(ordinal) = table.ordinal_of(&self.column) else {
            return false;
        };
        let value = &row[ordinal];

        match self.operator {
            FilterOperator::IsNull => return value.is_null(),
            FilterOperator::IsNotNull => return !value.is_null(),
            _ => {}
        }
        if value.is_null() {
            return false;
        }

        let ordering = value.compare(&self.value);
        match self.operator {
            FilterOperator::Equal => ordering.is_eq(),
            FilterOperator::NotEqual => ordering.is_ne(),
            FilterOperator::LessThan => ordering.is_lt(),
            FilterOperator::LessThanOrEqual => ordering.is_le(),
            FilterOperator::GreaterThan => ordering.is_gt(),
            FilterOperator::GreaterThanOrEqual => ordering.is_ge(),
            FilterOperator::IsNull | FilterOperator::IsNotNull => unreachable!(),
        }
    }
}

/// A push-down descriptor. Used both as a request (what a consumer wants)
/// and, after negotiation, as the record of what was actually satisfied
/// upstream.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SelectQuery {
    #[serde(default)]
    pub columns: Vec<String>,
    #[serde(default)]
    pub filters: Vec<Filter>,
    #[serde(default)]
    pub sorts: Sorts,
    #[serde(default)]
    pub groups: Vec<String>,
    #[serde(default)]
    pub rows: Option<u64>,
}

impl SelectQuery {
    pub fn with_sorts(sorts: Sorts) -> Self {
        Self {
            sorts,
            ..Self::default()
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::column::Column;
    use crate::data_type::DataType;

    #[test]
    fn test_prefix_match_same_columns_and_directions() {
        let actual = vec![Sort::ascending("a"), Sort::ascending("b")];
        assert!(sorts_start_with(&actual, &[Sort::ascending("a")]));
        assert!(sorts_start_with(&actual, &actual.clone()));
        assert!(!sorts_start_with(&actual, &[Sort::descending("a")]));
        assert!(!sorts_start_with(
            &[Sort::ascending("a")],
            &[Sort::ascending("a"), Sort::ascending("b")]
        ));
    }

    #[test]
    fn test_empty_requirement_always_satisfied() {
        assert!(sorts_start_with(&[], &[]));
        assert!(sorts_start_with(&[Sort::ascending("a")], &[]));
    }

    fn table() -> Table {
        Table::new("t", vec![Column::new("age", DataType::Int32)]).expect("schema")
    }

    #[test]
    fn test_filter_comparisons() {
        let table = table();
        let row = vec![Value::Int32(30)];
        assert!(Filter::new("age", FilterOperator::Equal, Value::Int32(30)).matches(&row, &table));
        assert!(
            Filter::new("age", FilterOperator::GreaterThan, Value::Int32(18)).matches(&row, &table)
        );
        assert!(
            !Filter::new("age", FilterOperator::LessThan, Value::Int32(18)).matches(&row, &table)
        );
    }

    #[test]
    fn test_null_semantics() {
        let table = table();
        let row = vec![Value::Null];
        assert!(Filter::new("age", FilterOperator::IsNull, Value::Null).matches(&row, &table));
        assert!(!Filter::new("age", FilterOperator::Equal, Value::Int32(1)).matches(&row, &table));
        assert!(!Filter::new("age", FilterOperator::IsNotNull, Value::Null).matches(&row, &table));
    }

    #[test]
    fn test_unknown_column_never_matches() {
        let table = table();
        let row = vec![Value::Int32(1)];
        assert!(!Filter::new("missing", FilterOperator::IsNull, Value::Null).matches(&row, &table));
    }
}
