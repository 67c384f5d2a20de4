//! The connection abstraction consumed by the builder, model and migration layers.
//!
//! quarry never opens connections itself: callers hand it something that implements
//! [`Connection`] (a driver adapter configured elsewhere). Every statement the crate issues
//! goes through the `run_*` helpers in this module, which emit the SQL as a `tracing`
//! event on the `quarry.sql` target before executing it.

use crate::dialect::Dialect;
use crate::error::OrmResult;
use crate::row::Row;
use crate::value::Value;

/// A synchronous database connection.
///
/// SQL handed to a connection always uses `?` positional placeholders; `bindings`
/// holds exactly one value per placeholder, in order. Adapters for engines with
/// numbered placeholders are responsible for rewriting them.
pub trait Connection {
    /// The dialect SQL should be rendered for.
    fn dialect(&self) -> Dialect;

    /// Run a query and return all rows.
    fn select(&self, sql: &str, bindings: &[Value]) -> OrmResult<Vec<Row>>;

    /// Run a statement and return the number of affected rows.
    fn execute(&self, sql: &str, bindings: &[Value]) -> OrmResult<u64>;

    /// Run an INSERT and return the generated id, if the engine reports one.
    fn insert(&self, sql: &str, bindings: &[Value]) -> OrmResult<Option<i64>>;

    /// Run a statement without bindings (DDL).
    fn statement(&self, sql: &str) -> OrmResult<()> {
        self.execute(sql, &[]).map(|_| ())
    }

    fn begin_transaction(&self) -> OrmResult<()>;

    fn commit(&self) -> OrmResult<()>;

    fn rollback(&self) -> OrmResult<()>;
}

pub(crate) fn run_select(conn: &dyn Connection, sql: &str, bindings: &[Value]) -> OrmResult<Vec<Row>> {
    tracing::debug!(target: "quarry.sql", kind = "select", sql, bindings = bindings.len());
    conn.select(sql, bindings)
}

pub(crate) fn run_execute(conn: &dyn Connection, sql: &str, bindings: &[Value]) -> OrmResult<u64> {
    tracing::debug!(target: "quarry.sql", kind = "execute", sql, bindings = bindings.len());
    conn.execute(sql, bindings)
}

pub(crate) fn run_insert(
    conn: &dyn Connection,
    sql: &str,
    bindings: &[Value],
) -> OrmResult<Option<i64>> {
    tracing::debug!(target: "quarry.sql", kind = "insert", sql, bindings = bindings.len());
    conn.insert(sql, bindings)
}

pub(crate) fn run_statement(conn: &dyn Connection, sql: &str) -> OrmResult<()> {
    tracing::debug!(target: "quarry.sql", kind = "statement", sql);
    conn.statement(sql)
}
