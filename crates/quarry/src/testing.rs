//! Recording connection for unit tests.

use crate::connection::Connection;
use crate::dialect::Dialect;
use crate::error::OrmResult;
use crate::row::Row;
use crate::value::Value;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;

/// Logs every statement and answers SELECTs from a queue of canned results.
pub(crate) struct MockConnection {
    dialect: Dialect,
    log: RefCell<Vec<(String, Vec<Value>)>>,
    results: RefCell<VecDeque<Vec<Row>>>,
    affected: Cell<u64>,
    next_id: Cell<i64>,
}

impl MockConnection {
    pub(crate) fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            log: RefCell::new(Vec::new()),
            results: RefCell::new(VecDeque::new()),
            affected: Cell::new(1),
            next_id: Cell::new(1),
        }
    }

    pub(crate) fn sqlite() -> Self {
        Self::new(Dialect::Sqlite)
    }

    /// Queue the rows returned by the next SELECT.
    pub(crate) fn push_result(&self, rows: Vec<Row>) {
        self.results.borrow_mut().push_back(rows);
    }

    pub(crate) fn set_affected(&self, n: u64) {
        self.affected.set(n);
    }

    pub(crate) fn statements(&self) -> Vec<String> {
        self.log.borrow().iter().map(|(sql, _)| sql.clone()).collect()
    }

    pub(crate) fn bindings(&self, index: usize) -> Vec<Value> {
        self.log.borrow()[index].1.clone()
    }

    fn record(&self, sql: &str, bindings: &[Value]) {
        self.log
            .borrow_mut()
            .push((sql.to_string(), bindings.to_vec()));
    }
}

impl Connection for MockConnection {
    fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn select(&self, sql: &str, bindings: &[Value]) -> OrmResult<Vec<Row>> {
        self.record(sql, bindings);
        Ok(self.results.borrow_mut().pop_front().unwrap_or_default())
    }

    fn execute(&self, sql: &str, bindings: &[Value]) -> OrmResult<u64> {
        self.record(sql, bindings);
        Ok(self.affected.get())
    }

    fn insert(&self, sql: &str, bindings: &[Value]) -> OrmResult<Option<i64>> {
        self.record(sql, bindings);
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        Ok(Some(id))
    }

    fn begin_transaction(&self) -> OrmResult<()> {
        self.record("BEGIN", &[]);
        Ok(())
    }

    fn commit(&self) -> OrmResult<()> {
        self.record("COMMIT", &[]);
        Ok(())
    }

    fn rollback(&self) -> OrmResult<()> {
        self.record("ROLLBACK", &[]);
        Ok(())
    }
}
