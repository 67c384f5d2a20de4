//! [`Connection`] over an in-process SQLite database.

use crate::config::DatabaseConfig;
use crate::connection::Connection;
use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::row::Row;
use crate::value::Value;
use rusqlite::types::{ToSqlOutput, ValueRef};
use rusqlite::{ToSql, params_from_iter};
use std::path::Path;

impl ToSql for Value {
    fn to_sql(&self) -> rusqlite::Result<ToSqlOutput<'_>> {
        Ok(match self {
            Value::Null => ToSqlOutput::Owned(rusqlite::types::Value::Null),
            Value::Bool(b) => ToSqlOutput::from(*b),
            Value::Int(n) => ToSqlOutput::from(*n),
            Value::Float(f) => ToSqlOutput::from(*f),
            Value::Text(s) => ToSqlOutput::Borrowed(ValueRef::Text(s.as_bytes())),
        })
    }
}

/// Decode one cell. BLOBs have no [`Value`] counterpart and are rejected rather
/// than coerced to text.
fn from_sqlite(column: &str, value: ValueRef<'_>) -> OrmResult<Value> {
    Ok(match value {
        ValueRef::Null => Value::Null,
        ValueRef::Integer(n) => Value::Int(n),
        ValueRef::Real(f) => Value::Float(f),
        ValueRef::Text(bytes) => match std::str::from_utf8(bytes) {
            Ok(text) => Value::Text(text.to_string()),
            Err(e) => return Err(OrmError::decode(column, e.to_string())),
        },
        ValueRef::Blob(bytes) => {
            return Err(OrmError::decode(
                column,
                format!("binary value of {} bytes is not supported", bytes.len()),
            ));
        }
    })
}

/// A SQLite database opened with foreign-key enforcement on.
pub struct SqliteConnection {
    inner: rusqlite::Connection,
}

impl SqliteConnection {
    pub fn open(path: impl AsRef<Path>) -> OrmResult<Self> {
        Self::init(rusqlite::Connection::open(path)?)
    }

    pub fn open_in_memory() -> OrmResult<Self> {
        Self::init(rusqlite::Connection::open_in_memory()?)
    }

    /// Open the database named by a `sqlite` config (`:memory:` for a private in-memory one).
    pub fn from_config(config: &DatabaseConfig) -> OrmResult<Self> {
        if config.driver != Dialect::Sqlite {
            return Err(OrmError::Config(format!(
                "cannot open a {} database with the SQLite adapter",
                config.driver
            )));
        }
        match config.database.as_str() {
            ":memory:" => Self::open_in_memory(),
            path => Self::open(path),
        }
    }

    fn init(inner: rusqlite::Connection) -> OrmResult<Self> {
        inner.execute_batch("PRAGMA foreign_keys = ON")?;
        Ok(Self { inner })
    }

    /// The wrapped rusqlite connection.
    pub fn inner(&self) -> &rusqlite::Connection {
        &self.inner
    }
}

impl Connection for SqliteConnection {
    fn dialect(&self) -> Dialect {
        Dialect::Sqlite
    }

    fn select(&self, sql: &str, bindings: &[Value]) -> OrmResult<Vec<Row>> {
        let mut stmt = self.inner.prepare(sql)?;
        let columns: Vec<String> = stmt.column_names().into_iter().map(String::from).collect();
        let mut rows = stmt.query(params_from_iter(bindings.iter()))?;

        let mut out = Vec::new();
        while let Some(row) = rows.next()? {
            let mut values = Row::default();
            for (i, column) in columns.iter().enumerate() {
                values.push(column.clone(), from_sqlite(column, row.get_ref(i)?)?);
            }
            out.push(values);
        }
        Ok(out)
    }

    fn execute(&self, sql: &str, bindings: &[Value]) -> OrmResult<u64> {
        let affected = self.inner.execute(sql, params_from_iter(bindings.iter()))?;
        Ok(affected as u64)
    }

    fn insert(&self, sql: &str, bindings: &[Value]) -> OrmResult<Option<i64>> {
        self.inner.execute(sql, params_from_iter(bindings.iter()))?;
        Ok(Some(self.inner.last_insert_rowid()))
    }

    fn statement(&self, sql: &str) -> OrmResult<()> {
        self.inner.execute_batch(sql)?;
        Ok(())
    }

    fn begin_transaction(&self) -> OrmResult<()> {
        self.inner.execute_batch("BEGIN")?;
        Ok(())
    }

    fn commit(&self) -> OrmResult<()> {
        self.inner.execute_batch("COMMIT")?;
        Ok(())
    }

    fn rollback(&self) -> OrmResult<()> {
        self.inner.execute_batch("ROLLBACK")?;
        Ok(())
    }
}
