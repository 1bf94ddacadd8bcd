use serde::{Deserialize, Serialize};

use super::{DataType, Value};

/// One tuple of values, positionally matching a column list.
pub type Row = Vec<Value>;

/// A named, typed column of a relation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Column {
    pub name: String,
    pub ty: DataType,
}

impl Column {
    pub fn new(name: impl Into<String>, ty: DataType) -> Self {
        Self {
            name: name.into(),
            ty,
        }
    }

    /// Unqualified part of the name (`g.e1` -> `e1`).
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }
}

fn short_name(name: &str) -> &str {
    name.rsplit('.').next().unwrap_or(name)
}

/// Resolve a column reference against a column list.
///
/// Matching is case-insensitive. A qualified reference (`g.e1`) matches an
/// identically qualified column first and then falls back to the unqualified
/// column name.
pub fn find_column(columns: &[Column], name: &str) -> Option<usize> {
    if let Some(index) = columns
        .iter()
        .position(|c| c.name.eq_ignore_ascii_case(name))
    {
        return Some(index);
    }
    let short = short_name(name);
    columns
        .iter()
        .position(|c| c.short_name().eq_ignore_ascii_case(short))
}

/// A fully buffered relation: the result of a query, a procedure, or an
/// update count.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ResultSet {
    pub columns: Vec<Column>,
    pub rows: Vec<Row>,
}

impl ResultSet {
    pub fn new(columns: Vec<Column>, rows: Vec<Row>) -> Self {
        Self { columns, rows }
    }

    pub fn empty(columns: Vec<Column>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    /// A single-row, single-column result carrying an update count.
    pub fn update_count(count: i64) -> Self {
        Self::single(UPDATE_COUNT_COLUMN, count)
    }

    /// A single-row, single-column integer result.
    pub fn single(name: &str, count: i64) -> Self {
        let value = i32::try_from(count).unwrap_or(i32::MAX);
        Self {
            columns: vec![Column::new(name, DataType::Integer)],
            rows: vec![vec![Value::Integer(value)]],
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        find_column(&self.columns, name)
    }

    /// Values of one column, in row order.
    pub fn column_values(&self, name: &str) -> Option<Vec<Value>> {
        let index = self.column_index(name)?;
        Some(self.rows.iter().map(|row| row[index].clone()).collect())
    }
}

/// Column name used for update-count results.
pub const UPDATE_COUNT_COLUMN: &str = "count";

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_find_column_qualified_fallback() {
        let columns = vec![
            Column::new("g.e1", DataType::String),
            Column::new("e2", DataType::Integer),
        ];
        assert_eq!(find_column(&columns, "G.E1"), Some(0));
        assert_eq!(find_column(&columns, "e1"), Some(0));
        assert_eq!(find_column(&columns, "x.e2"), Some(1));
        assert_eq!(find_column(&columns, "e3"), None);
    }

    #[test]
    fn test_update_count_result() {
        let result = ResultSet::update_count(3);
        assert_eq!(result.columns[0].name, "count");
        assert_eq!(result.rows, vec![vec![Value::Integer(3)]]);
    }
}
