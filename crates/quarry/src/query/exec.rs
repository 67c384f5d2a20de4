//! Execution methods for [`Query`].
//!
//! Every method validates the builder first (`build_error`), renders SQL with the
//! connection's dialect and runs it through the logging helpers in
//! [`connection`](crate::connection). Derived queries (count, exists, first, pagination)
//! run on clones; the receiver is never modified.

use super::grammar::{Assignment, Compiled, Grammar};
use super::pagination::{Paginator, SimplePaginator};
use super::{MAX_ROWS, Query, Values};
use crate::connection::{Connection, run_execute, run_insert, run_select};
use crate::error::{OrmError, OrmResult};
use crate::row::{FromRow, Row};
use crate::value::Value;

fn grammar(conn: &dyn Connection) -> Grammar {
    Grammar::for_dialect(conn.dialect())
}

fn fetch(conn: &dyn Connection, compiled: &Compiled) -> OrmResult<Vec<Row>> {
    run_select(conn, &compiled.sql, &compiled.bindings)
}

impl Query {
    // ==================== Reads ====================

    /// Run the query and return all rows.
    pub fn get(&self, conn: &dyn Connection) -> OrmResult<Vec<Row>> {
        self.validate()?;
        fetch(conn, &grammar(conn).compile_select(self))
    }

    /// Run the query and map every row.
    pub fn get_as<T: FromRow>(&self, conn: &dyn Connection) -> OrmResult<Vec<T>> {
        self.get(conn)?.iter().map(T::from_row).collect()
    }

    /// First row (`LIMIT 1`).
    pub fn first(&self, conn: &dyn Connection) -> OrmResult<Option<Row>> {
        let mut q = self.clone();
        q.limit(1);
        Ok(q.get(conn)?.into_iter().next())
    }

    pub fn first_or_fail(&self, conn: &dyn Connection) -> OrmResult<Row> {
        self.first(conn)?.ok_or_else(|| {
            OrmError::not_found(format!(
                "no rows in '{}'",
                self.from.as_deref().unwrap_or_default()
            ))
        })
    }

    /// Row whose `id` column equals `id`.
    pub fn find(&self, conn: &dyn Connection, id: impl Into<Value>) -> OrmResult<Option<Row>> {
        self.find_by(conn, "id", id)
    }

    /// Row whose `key` column equals `id`.
    pub fn find_by(
        &self,
        conn: &dyn Connection,
        key: &str,
        id: impl Into<Value>,
    ) -> OrmResult<Option<Row>> {
        let mut q = self.clone();
        q.where_eq(key, id);
        q.first(conn)
    }

    /// First column of the first row.
    pub fn value(&self, conn: &dyn Connection, column: &str) -> OrmResult<Option<Value>> {
        let mut q = self.clone();
        q.select([column]);
        Ok(q.first(conn)?.and_then(|row| row.first().cloned()))
    }

    /// One column from every row.
    pub fn pluck(&self, conn: &dyn Connection, column: &str) -> OrmResult<Vec<Value>> {
        let mut q = self.clone();
        q.select([column]);
        Ok(q
            .get(conn)?
            .into_iter()
            .filter_map(|row| row.first().cloned())
            .collect())
    }

    // ==================== Aggregates ====================

    /// Run `function(column)` over the query's predicates.
    pub fn aggregate(
        &self,
        conn: &dyn Connection,
        function: &str,
        column: &str,
    ) -> OrmResult<Value> {
        self.validate()?;
        let q = if self.groups.is_empty() && !self.distinct {
            self.clone_for_aggregate()
        } else {
            self.clone()
        };
        let rows = fetch(conn, &grammar(conn).compile_aggregate(&q, function, column))?;
        Ok(rows
            .into_iter()
            .next()
            .and_then(|row| row.first().cloned())
            .unwrap_or_default())
    }

    pub fn count(&self, conn: &dyn Connection) -> OrmResult<u64> {
        let value = self.aggregate(conn, "count", "*")?;
        Ok(value.as_i64().map_or(0, |n| n.max(0) as u64))
    }

    pub fn max(&self, conn: &dyn Connection, column: &str) -> OrmResult<Option<Value>> {
        let value = self.aggregate(conn, "max", column)?;
        Ok((!value.is_null()).then_some(value))
    }

    pub fn min(&self, conn: &dyn Connection, column: &str) -> OrmResult<Option<Value>> {
        let value = self.aggregate(conn, "min", column)?;
        Ok((!value.is_null()).then_some(value))
    }

    pub fn avg(&self, conn: &dyn Connection, column: &str) -> OrmResult<Option<f64>> {
        Ok(self.aggregate(conn, "avg", column)?.as_f64())
    }

    /// `SUM(column)`; an empty set sums to `0`.
    pub fn sum(&self, conn: &dyn Connection, column: &str) -> OrmResult<Value> {
        let value = self.aggregate(conn, "sum", column)?;
        Ok(if value.is_null() { Value::Int(0) } else { value })
    }

    pub fn exists(&self, conn: &dyn Connection) -> OrmResult<bool> {
        self.validate()?;
        let rows = fetch(conn, &grammar(conn).compile_exists(self))?;
        Ok(rows
            .first()
            .and_then(Row::first)
            .and_then(Value::as_bool)
            .unwrap_or(false))
    }

    pub fn doesnt_exist(&self, conn: &dyn Connection) -> OrmResult<bool> {
        Ok(!self.exists(conn)?)
    }

    // ==================== Pagination ====================

    /// Page of rows plus the total count of the unpaged query.
    pub fn paginate(
        &self,
        conn: &dyn Connection,
        per_page: u64,
        page: u64,
    ) -> OrmResult<Paginator<Row>> {
        let total = self.count(conn)?;
        let items = if total == 0 {
            Vec::new()
        } else {
            let mut q = self.clone();
            q.for_page(page, per_page);
            q.get(conn)?
        };
        Ok(Paginator::new(items, total, per_page, page))
    }

    /// Page of rows without counting; fetches `per_page + 1` rows.
    pub fn simple_paginate(
        &self,
        conn: &dyn Connection,
        per_page: u64,
        page: u64,
    ) -> OrmResult<SimplePaginator<Row>> {
        let mut q = self.clone();
        q.for_page(page, per_page);
        q.limit(per_page.clamp(1, MAX_ROWS - 1) + 1);
        Ok(SimplePaginator::from_overfetch(q.get(conn)?, per_page, page))
    }

    // ==================== Writes ====================

    /// Insert one row; returns the affected row count.
    pub fn insert(&self, conn: &dyn Connection, values: Values) -> OrmResult<u64> {
        self.insert_many(conn, vec![values])
    }

    /// Insert several rows with one statement. All rows must share one column set.
    pub fn insert_many(&self, conn: &dyn Connection, rows: Vec<Values>) -> OrmResult<u64> {
        self.validate()?;
        let table = self.require_table("insert")?;
        let compiled = grammar(conn).compile_insert(table, &rows)?;
        run_execute(conn, &compiled.sql, &compiled.bindings)
    }

    /// Insert one row and return its generated `id`.
    pub fn insert_get_id(&self, conn: &dyn Connection, values: Values) -> OrmResult<i64> {
        self.insert_get_id_as(conn, values, "id")
    }

    /// Insert one row and return the generated value of `key`.
    pub fn insert_get_id_as(
        &self,
        conn: &dyn Connection,
        values: Values,
        key: &str,
    ) -> OrmResult<i64> {
        self.validate()?;
        let table = self.require_table("insert")?;
        let g = grammar(conn);
        let compiled = g.compile_insert_get_id(table, &values, key)?;

        let id = if g.dialect() == Some(crate::Dialect::Postgres) {
            fetch(conn, &compiled)?
                .first()
                .and_then(Row::first)
                .and_then(Value::as_i64)
        } else {
            run_insert(conn, &compiled.sql, &compiled.bindings)?
        };
        id.ok_or_else(|| OrmError::Query(format!("insert into '{table}' returned no id")))
    }

    /// Update matching rows; returns the affected row count.
    pub fn update(&self, conn: &dyn Connection, values: Values) -> OrmResult<u64> {
        self.validate()?;
        let compiled = grammar(conn).compile_update(self, &values)?;
        run_execute(conn, &compiled.sql, &compiled.bindings)
    }

    /// `column = column + amount`
    pub fn increment(
        &self,
        conn: &dyn Connection,
        column: &str,
        amount: impl Into<Value>,
    ) -> OrmResult<u64> {
        self.increment_with(conn, column, amount, Values::new())
    }

    /// Increment plus extra column updates in the same statement.
    pub fn increment_with(
        &self,
        conn: &dyn Connection,
        column: &str,
        amount: impl Into<Value>,
        extra: Values,
    ) -> OrmResult<u64> {
        self.adjust(conn, column, Assignment::Increment(amount.into()), extra)
    }

    /// `column = column - amount`
    pub fn decrement(
        &self,
        conn: &dyn Connection,
        column: &str,
        amount: impl Into<Value>,
    ) -> OrmResult<u64> {
        self.decrement_with(conn, column, amount, Values::new())
    }

    pub fn decrement_with(
        &self,
        conn: &dyn Connection,
        column: &str,
        amount: impl Into<Value>,
        extra: Values,
    ) -> OrmResult<u64> {
        self.adjust(conn, column, Assignment::Decrement(amount.into()), extra)
    }

    fn adjust(
        &self,
        conn: &dyn Connection,
        column: &str,
        assignment: Assignment,
        extra: Values,
    ) -> OrmResult<u64> {
        self.validate()?;
        let amount_ok = match &assignment {
            Assignment::Increment(v) | Assignment::Decrement(v) | Assignment::Set(v) => {
                v.as_f64().is_some()
            }
        };
        if !amount_ok {
            return Err(OrmError::validation(format!(
                "non-numeric amount for '{column}'"
            )));
        }
        let mut sets = vec![(column.to_string(), assignment)];
        sets.extend(extra.into_iter().map(|(k, v)| (k, Assignment::Set(v))));
        let compiled = grammar(conn).compile_update_assignments(self, &sets)?;
        run_execute(conn, &compiled.sql, &compiled.bindings)
    }

    /// Delete matching rows. A query without WHERE clauses is refused; use
    /// [`Query::truncate`] to empty a table.
    pub fn delete(&self, conn: &dyn Connection) -> OrmResult<u64> {
        self.validate()?;
        if self.wheres.is_empty() {
            return Err(OrmError::validation(
                "delete without a WHERE clause; use truncate() to empty the table",
            ));
        }
        let compiled = grammar(conn).compile_delete(self)?;
        run_execute(conn, &compiled.sql, &compiled.bindings)
    }

    /// Remove every row from the table.
    pub fn truncate(&self, conn: &dyn Connection) -> OrmResult<()> {
        self.validate()?;
        let table = self.require_table("truncate")?;
        for compiled in grammar(conn).compile_truncate(table) {
            run_execute(conn, &compiled.sql, &compiled.bindings)?;
        }
        Ok(())
    }

    /// Update the row matching `attributes`, or insert `attributes + values`.
    ///
    /// Returns `true` when a statement was executed.
    pub fn update_or_insert(
        &self,
        conn: &dyn Connection,
        attributes: Values,
        values: Values,
    ) -> OrmResult<bool> {
        if attributes.is_empty() {
            return Err(OrmError::validation(
                "update_or_insert requires identifying attributes",
            ));
        }
        let mut q = self.clone();
        for (column, value) in &attributes {
            q.where_eq(column.as_str(), value.clone());
        }

        if q.exists(conn)? {
            if values.is_empty() {
                return Ok(true);
            }
            q.limit(1);
            return Ok(q.update(conn, values)? > 0);
        }

        let mut row = attributes;
        row.extend(values);
        Ok(self.insert(conn, row)? > 0)
    }

    fn require_table(&self, action: &str) -> OrmResult<&str> {
        self.from
            .as_deref()
            .ok_or_else(|| OrmError::validation(format!("{action} requires a table")))
    }
}
