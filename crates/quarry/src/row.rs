//! Row mapping traits and utilities

use crate::error::{OrmError, OrmResult};
use crate::value::{FromValue, Value, decode};
use indexmap::IndexMap;
use serde::Serialize;

/// A result row: an ordered `column -> value` map.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Row {
    columns: IndexMap<String, Value>,
}

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build a row from `(column, value)` pairs, keeping their order.
    pub fn from_pairs<K, V, I>(pairs: I) -> Self
    where
        K: Into<String>,
        V: Into<Value>,
        I: IntoIterator<Item = (K, V)>,
    {
        Self {
            columns: pairs
                .into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        }
    }

    pub fn push(&mut self, column: impl Into<String>, value: impl Into<Value>) {
        self.columns.insert(column.into(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&Value> {
        self.columns.get(column)
    }

    /// The first column's value (used by `value()` / aggregates).
    pub fn first(&self) -> Option<&Value> {
        self.columns.get_index(0).map(|(_, v)| v)
    }

    pub fn columns(&self) -> impl Iterator<Item = &str> {
        self.columns.keys().map(String::as_str)
    }

    pub fn len(&self) -> usize {
        self.columns.len()
    }

    pub fn is_empty(&self) -> bool {
        self.columns.is_empty()
    }

    pub fn into_map(self) -> IndexMap<String, Value> {
        self.columns
    }
}

impl IntoIterator for Row {
    type Item = (String, Value);
    type IntoIter = indexmap::map::IntoIter<String, Value>;

    fn into_iter(self) -> Self::IntoIter {
        self.columns.into_iter()
    }
}

/// Trait for types that can be constructed from a result [`Row`].
pub trait FromRow: Sized {
    fn from_row(row: &Row) -> OrmResult<Self>;
}

impl FromRow for Row {
    fn from_row(row: &Row) -> OrmResult<Self> {
        Ok(row.clone())
    }
}

/// Extension helpers for typed column access.
pub trait RowExt {
    /// Get a column value, returning an error if the column is missing or cannot be decoded.
    fn try_get_column<T: FromValue>(&self, column: &str) -> OrmResult<T>;
}

impl RowExt for Row {
    fn try_get_column<T: FromValue>(&self, column: &str) -> OrmResult<T> {
        let value = self
            .get(column)
            .ok_or_else(|| OrmError::decode(column, "column not present in row"))?;
        decode(column, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn typed_access() {
        let row = Row::from_pairs([("id", Value::Int(3)), ("name", Value::from("ann"))]);
        assert_eq!(row.try_get_column::<i64>("id").unwrap(), 3);
        assert_eq!(row.try_get_column::<String>("name").unwrap(), "ann");
        assert!(row.try_get_column::<i64>("missing").is_err());
        assert_eq!(row.first(), Some(&Value::Int(3)));
    }
}
