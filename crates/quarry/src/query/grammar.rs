//! Query compiler.
//!
//! [`Grammar`] renders a [`Query`] into SQL text and its bindings in a single pass:
//! every clause writes its SQL and pushes its values into the same [`SqlWriter`], so the
//! binding order can never drift from the placeholder order.
//!
//! A grammar without a dialect renders ANSI SQL (`"` quoting); this is what
//! [`Query::to_sql`] uses. Execution renders with the connection's dialect.

use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use crate::ident::{quote_name, wrap};
use crate::query::expr::{Condition, Expression, JoinKind, Op, Order, WhereClause};
use crate::query::{Query, Values};
use crate::value::Value;

/// Rendered SQL plus its bindings.
#[derive(Debug, Clone, PartialEq)]
pub struct Compiled {
    pub sql: String,
    pub bindings: Vec<Value>,
}

/// Right-hand side of an UPDATE assignment.
#[derive(Debug, Clone, PartialEq)]
pub(crate) enum Assignment {
    Set(Value),
    Increment(Value),
    Decrement(Value),
}

/// SQL text and bindings accumulated together.
#[derive(Debug, Default)]
pub(crate) struct SqlWriter {
    sql: String,
    bindings: Vec<Value>,
}

impl SqlWriter {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    pub(crate) fn push(&mut self, sql: &str) -> &mut Self {
        self.sql.push_str(sql);
        self
    }

    /// Append a `?` placeholder and bind its value.
    pub(crate) fn push_bind(&mut self, value: &Value) -> &mut Self {
        self.sql.push('?');
        self.bindings.push(value.clone());
        self
    }

    /// Append `?, ?, ...` for `values`.
    pub(crate) fn push_bind_list(&mut self, values: &[Value]) -> &mut Self {
        for (i, v) in values.iter().enumerate() {
            if i > 0 {
                self.push(", ");
            }
            self.push_bind(v);
        }
        self
    }

    /// Append raw SQL that carries its own bindings.
    pub(crate) fn push_raw(&mut self, sql: &str, bindings: &[Value]) -> &mut Self {
        self.sql.push_str(sql);
        self.bindings.extend_from_slice(bindings);
        self
    }

    pub(crate) fn finish(self) -> Compiled {
        Compiled {
            sql: self.sql,
            bindings: self.bindings,
        }
    }
}

/// Dialect-aware SQL renderer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Grammar {
    dialect: Option<Dialect>,
}

impl Grammar {
    /// ANSI rendering (double-quoted identifiers).
    pub fn ansi() -> Self {
        Self { dialect: None }
    }

    pub fn for_dialect(dialect: Dialect) -> Self {
        Self {
            dialect: Some(dialect),
        }
    }

    pub fn dialect(&self) -> Option<Dialect> {
        self.dialect
    }

    pub fn quote_char(&self) -> char {
        self.dialect.map_or('"', Dialect::quote_char)
    }

    /// Quote a possibly dotted / aliased identifier.
    pub fn wrap(&self, value: &str) -> String {
        wrap(value, self.quote_char())
    }

    /// Quote a single name without dot splitting.
    pub fn quote(&self, name: &str) -> String {
        quote_name(name, self.quote_char())
    }

    fn is(&self, dialect: Dialect) -> bool {
        self.dialect == Some(dialect)
    }

    // ==================== SELECT ====================

    pub fn compile_select(&self, query: &Query) -> Compiled {
        let mut w = SqlWriter::new();
        self.write_select(&mut w, query);
        w.finish()
    }

    pub(crate) fn write_select(&self, w: &mut SqlWriter, query: &Query) {
        w.push(if query.distinct { "SELECT DISTINCT " } else { "SELECT " });
        self.write_columns(w, &query.columns);
        self.write_from(w, query);
        self.write_joins(w, query);
        self.write_wheres(w, &query.wheres, false);
        self.write_groups(w, &query.groups);
        self.write_havings(w, &query.havings);
        self.write_orders(w, &query.orders);
        self.write_limit_offset(w, query.limit, query.offset);
    }

    /// `SELECT <function>(<column>) AS "aggregate" ...`
    ///
    /// Grouped and distinct queries are wrapped as a derived table so the aggregate runs
    /// over the grouped rows.
    pub fn compile_aggregate(&self, query: &Query, function: &str, column: &str) -> Compiled {
        let mut w = SqlWriter::new();
        let target = if column == "*" {
            "*".to_string()
        } else {
            self.wrap(column)
        };

        if !query.groups.is_empty() || query.distinct {
            let mut inner = query.clone();
            inner.orders.clear();
            inner.limit = None;
            inner.offset = None;
            if inner.columns.is_empty() && !inner.groups.is_empty() {
                inner.columns = inner.groups.clone();
            }
            let outer_target = match column {
                "*" => "*".to_string(),
                c => self.quote(crate::ident::Ident::parse(c).base_name().unwrap_or(c)),
            };
            w.push("SELECT ")
                .push(&function.to_ascii_uppercase())
                .push("(")
                .push(&outer_target)
                .push(") AS ")
                .push(&self.quote("aggregate"))
                .push(" FROM (");
            self.write_select(&mut w, &inner);
            w.push(") AS ").push(&self.quote("aggregate_table"));
            return w.finish();
        }

        w.push("SELECT ")
            .push(&function.to_ascii_uppercase())
            .push("(")
            .push(&target)
            .push(") AS ")
            .push(&self.quote("aggregate"));
        self.write_from(&mut w, query);
        self.write_joins(&mut w, query);
        // HAVING needs a GROUP BY here; ungrouped havings are not applied.
        self.write_wheres(&mut w, &query.wheres, false);
        w.finish()
    }

    /// `SELECT EXISTS(<select>) AS "exists"`; order, limit and offset are ignored.
    pub fn compile_exists(&self, query: &Query) -> Compiled {
        let inner = query.clone_for_aggregate();
        let mut w = SqlWriter::new();
        w.push("SELECT EXISTS(");
        self.write_select(&mut w, &inner);
        w.push(") AS ").push(&self.quote("exists"));
        w.finish()
    }

    // ==================== INSERT ====================

    /// Multi-row INSERT. All rows must share the first row's column set.
    pub fn compile_insert(&self, table: &str, rows: &[Values]) -> OrmResult<Compiled> {
        let Some(first) = rows.first() else {
            return Err(OrmError::validation("insert requires at least one row"));
        };
        if first.is_empty() {
            return Err(OrmError::validation("insert requires at least one column"));
        }
        let columns: Vec<&String> = first.keys().collect();

        let mut w = SqlWriter::new();
        w.push("INSERT INTO ").push(&self.wrap(table)).push(" (");
        for (i, c) in columns.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            w.push(&self.wrap(c));
        }
        w.push(") VALUES ");

        for (r, row) in rows.iter().enumerate() {
            if row.len() != columns.len() || columns.iter().any(|c| !row.contains_key(*c)) {
                return Err(OrmError::validation(format!(
                    "insert row {r} has a different column set than row 0"
                )));
            }
            if r > 0 {
                w.push(", ");
            }
            w.push("(");
            for (i, c) in columns.iter().enumerate() {
                if i > 0 {
                    w.push(", ");
                }
                // Bind in the first row's column order.
                w.push_bind(&row[*c]);
            }
            w.push(")");
        }
        Ok(w.finish())
    }

    /// INSERT that reports the generated key. PostgreSQL gets a `RETURNING` clause.
    pub fn compile_insert_get_id(
        &self,
        table: &str,
        values: &Values,
        key: &str,
    ) -> OrmResult<Compiled> {
        let mut compiled = self.compile_insert(table, std::slice::from_ref(values))?;
        if self.is(Dialect::Postgres) {
            compiled.sql.push_str(" RETURNING ");
            compiled.sql.push_str(&self.wrap(key));
        }
        Ok(compiled)
    }

    // ==================== UPDATE ====================

    pub fn compile_update(&self, query: &Query, values: &Values) -> OrmResult<Compiled> {
        let sets: Vec<(String, Assignment)> = values
            .iter()
            .map(|(k, v)| (k.clone(), Assignment::Set(v.clone())))
            .collect();
        self.compile_update_assignments(query, &sets)
    }

    pub(crate) fn compile_update_assignments(
        &self,
        query: &Query,
        sets: &[(String, Assignment)],
    ) -> OrmResult<Compiled> {
        let table = require_table(query, "update")?;
        if sets.is_empty() {
            return Err(OrmError::validation("update requires at least one column"));
        }
        if !query.joins.is_empty() && !self.is(Dialect::Mysql) {
            return Err(OrmError::validation(
                "update with joins is only supported on MySQL",
            ));
        }

        let mut w = SqlWriter::new();
        w.push("UPDATE ").push(&self.wrap(table));
        self.write_joins(&mut w, query);
        w.push(" SET ");
        for (i, (column, assignment)) in sets.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            let col = self.wrap(column);
            w.push(&col).push(" = ");
            match assignment {
                Assignment::Set(v) => {
                    w.push_bind(v);
                }
                Assignment::Increment(v) => {
                    w.push(&col).push(" + ").push_bind(v);
                }
                Assignment::Decrement(v) => {
                    w.push(&col).push(" - ").push_bind(v);
                }
            }
        }
        self.write_wheres(&mut w, &query.wheres, false);
        if self.is(Dialect::Mysql) && query.joins.is_empty() {
            self.write_orders(&mut w, &query.orders);
            if let Some(limit) = query.limit {
                w.push(&format!(" LIMIT {limit}"));
            }
        }
        Ok(w.finish())
    }

    // ==================== DELETE ====================

    pub fn compile_delete(&self, query: &Query) -> OrmResult<Compiled> {
        let table = require_table(query, "delete")?;
        let mut w = SqlWriter::new();
        if query.joins.is_empty() {
            w.push("DELETE FROM ").push(&self.wrap(table));
        } else if self.is(Dialect::Mysql) {
            let target = query.qualifier().unwrap_or_else(|| table.to_string());
            w.push("DELETE ")
                .push(&self.wrap(&target))
                .push(" FROM ")
                .push(&self.wrap(table));
            self.write_joins(&mut w, query);
        } else {
            return Err(OrmError::validation(
                "delete with joins is only supported on MySQL",
            ));
        }
        self.write_wheres(&mut w, &query.wheres, false);
        if self.is(Dialect::Mysql) && query.joins.is_empty() {
            self.write_orders(&mut w, &query.orders);
            if let Some(limit) = query.limit {
                w.push(&format!(" LIMIT {limit}"));
            }
        }
        Ok(w.finish())
    }

    /// Statements that empty `table`. SQLite has no TRUNCATE and also resets its
    /// autoincrement sequence.
    pub fn compile_truncate(&self, table: &str) -> Vec<Compiled> {
        if self.is(Dialect::Sqlite) {
            return vec![
                Compiled {
                    sql: "DELETE FROM sqlite_sequence WHERE name = ?".to_string(),
                    bindings: vec![Value::from(table)],
                },
                Compiled {
                    sql: format!("DELETE FROM {}", self.wrap(table)),
                    bindings: Vec::new(),
                },
            ];
        }
        let mut sql = format!("TRUNCATE TABLE {}", self.wrap(table));
        if self.is(Dialect::Postgres) {
            sql.push_str(" RESTART IDENTITY CASCADE");
        }
        vec![Compiled {
            sql,
            bindings: Vec::new(),
        }]
    }

    // ==================== Clauses ====================

    fn write_columns(&self, w: &mut SqlWriter, columns: &[Expression]) {
        if columns.is_empty() {
            w.push("*");
            return;
        }
        for (i, column) in columns.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            match column {
                Expression::Sub { query, alias } => {
                    w.push("(");
                    self.write_select(w, query);
                    w.push(") AS ").push(&self.quote(alias));
                }
                other => self.write_expression(w, other),
            }
        }
    }

    fn write_from(&self, w: &mut SqlWriter, query: &Query) {
        if let Some(table) = &query.from {
            w.push(" FROM ").push(&self.wrap(table));
        }
    }

    fn write_joins(&self, w: &mut SqlWriter, query: &Query) {
        for join in &query.joins {
            w.push(" ")
                .push(join.kind.as_sql())
                .push(" ")
                .push(&self.wrap(&join.table));
            if join.clauses.is_empty() || join.kind == JoinKind::Cross {
                continue;
            }
            w.push(" ON ");
            self.write_conditions(w, &join.clauses, false);
        }
    }

    fn write_wheres(&self, w: &mut SqlWriter, wheres: &[WhereClause], having: bool) {
        if wheres.is_empty() {
            return;
        }
        w.push(" WHERE ");
        self.write_conditions(w, wheres, having);
    }

    fn write_groups(&self, w: &mut SqlWriter, groups: &[Expression]) {
        if groups.is_empty() {
            return;
        }
        w.push(" GROUP BY ");
        for (i, g) in groups.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            self.write_expression(w, g);
        }
    }

    fn write_havings(&self, w: &mut SqlWriter, havings: &[WhereClause]) {
        if havings.is_empty() {
            return;
        }
        w.push(" HAVING ");
        self.write_conditions(w, havings, true);
    }

    fn write_orders(&self, w: &mut SqlWriter, orders: &[Order]) {
        if orders.is_empty() {
            return;
        }
        w.push(" ORDER BY ");
        for (i, order) in orders.iter().enumerate() {
            if i > 0 {
                w.push(", ");
            }
            match order {
                Order::Column { column, direction } => {
                    self.write_expression(w, column);
                    w.push(" ").push(direction.as_sql());
                }
                Order::Raw { sql, bindings } => {
                    w.push_raw(sql, bindings);
                }
            }
        }
    }

    fn write_limit_offset(&self, w: &mut SqlWriter, limit: Option<u64>, offset: Option<u64>) {
        match (limit, offset) {
            (Some(limit), _) => {
                w.push(&format!(" LIMIT {limit}"));
            }
            // MySQL and SQLite cannot OFFSET without a LIMIT.
            (None, Some(_)) if self.is(Dialect::Mysql) => {
                w.push(" LIMIT 18446744073709551615");
            }
            (None, Some(_)) if self.is(Dialect::Sqlite) => {
                w.push(" LIMIT -1");
            }
            _ => {}
        }
        if let Some(offset) = offset {
            w.push(&format!(" OFFSET {offset}"));
        }
    }

    /// Render a connector-separated condition list. The first connector is dropped.
    fn write_conditions(&self, w: &mut SqlWriter, clauses: &[WhereClause], having: bool) {
        for (i, clause) in clauses.iter().enumerate() {
            if i > 0 {
                w.push(" ").push(clause.boolean.as_sql()).push(" ");
            }
            self.write_condition(w, &clause.condition, having);
        }
    }

    fn write_condition(&self, w: &mut SqlWriter, condition: &Condition, having: bool) {
        match condition {
            Condition::Basic { column, op, value } => {
                self.write_expression(w, column);
                w.push(" ").push(self.operator(*op)).push(" ").push_bind(value);
            }
            Condition::Column { first, op, second } => {
                w.push(&self.wrap(first))
                    .push(" ")
                    .push(self.operator(*op))
                    .push(" ")
                    .push(&self.wrap(second));
            }
            Condition::In {
                column,
                values,
                negated,
            } => {
                if values.is_empty() {
                    w.push(if *negated { "1 = 1" } else { "0 = 1" });
                    return;
                }
                self.write_expression(w, column);
                w.push(if *negated { " NOT IN (" } else { " IN (" })
                    .push_bind_list(values)
                    .push(")");
            }
            Condition::Null { column, negated } => {
                self.write_expression(w, column);
                w.push(if *negated { " IS NOT NULL" } else { " IS NULL" });
            }
            Condition::Between {
                column,
                low,
                high,
                negated,
            } => {
                self.write_expression(w, column);
                w.push(if *negated { " NOT BETWEEN " } else { " BETWEEN " })
                    .push_bind(low)
                    .push(" AND ")
                    .push_bind(high);
            }
            Condition::Exists { query, negated } => {
                w.push(if *negated { "NOT EXISTS (" } else { "EXISTS (" });
                self.write_select(w, query);
                w.push(")");
            }
            Condition::Raw { sql, bindings } => {
                w.push_raw(sql, bindings);
            }
            Condition::Nested { query } => {
                let inner = if having { &query.havings } else { &query.wheres };
                w.push("(");
                self.write_conditions(w, inner, having);
                w.push(")");
            }
        }
    }

    fn write_expression(&self, w: &mut SqlWriter, expr: &Expression) {
        match expr {
            Expression::Column(c) => {
                w.push(&self.wrap(c));
            }
            Expression::Raw { sql, bindings } => {
                w.push_raw(sql, bindings);
            }
            Expression::Sub { query, .. } => {
                w.push("(");
                self.write_select(w, query);
                w.push(")");
            }
        }
    }

    fn operator(&self, op: Op) -> &'static str {
        match op {
            Op::ILike if self.dialect.is_some() && !self.is(Dialect::Postgres) => "LIKE",
            other => other.as_sql(),
        }
    }
}

fn require_table<'a>(query: &'a Query, action: &str) -> OrmResult<&'a str> {
    query
        .from
        .as_deref()
        .ok_or_else(|| OrmError::validation(format!("{action} requires a table")))
}
