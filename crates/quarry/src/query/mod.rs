//! Fluent SQL query builder.
//!
//! A [`Query`] accumulates clauses through `&mut self` methods and is compiled by a
//! [`Grammar`] into SQL text plus an ordered binding list. Compilation walks the
//! clauses in a fixed order (columns, from, joins, where, group, having, order, limit,
//! offset) and renders each clause together with its bindings, so the binding list
//! always lines up with the `?` placeholders.
//!
//! # Example
//!
//! ```ignore
//! use quarry::Query;
//!
//! let mut q = Query::table("users");
//! q.where_eq("active", 1).order_by("name").limit(10);
//! assert_eq!(
//!     q.to_sql(),
//!     r#"SELECT * FROM "users" WHERE "active" = ? ORDER BY "name" ASC LIMIT 10"#
//! );
//!
//! let rows = q.get(&conn)?;
//! let total = q.count(&conn)?; // runs on a clone, `q` keeps its ORDER/LIMIT
//! ```
//!
//! Builders mutate in place. Deriving a second query from an existing one always goes
//! through `clone()`, which deep-copies nested groups and sub-queries.

mod exec;
pub mod expr;
pub mod grammar;
mod pagination;

pub use expr::{
    Boolean, Condition, Direction, Expression, JoinClause, JoinKind, Op, Order, WhereClause, raw,
    raw_with,
};
pub use grammar::{Compiled, Grammar};
pub use pagination::{Paginator, SimplePaginator};

use crate::value::Value;
use indexmap::IndexMap;

/// Largest LIMIT/OFFSET accepted by every supported engine.
pub const MAX_ROWS: u64 = i64::MAX as u64;

/// Column → value map used for INSERT and UPDATE payloads.
pub type Values = IndexMap<String, Value>;

/// Build a [`Values`] map from `(column, value)` pairs.
pub fn values<K, V, I>(pairs: I) -> Values
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    pairs
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Build a [`Values`] map inline.
///
/// ```ignore
/// let row = quarry::values! { "name" => "Ada", "age" => 36 };
/// ```
#[macro_export]
macro_rules! values {
    () => { $crate::query::Values::new() };
    ($($key:expr => $value:expr),+ $(,)?) => {{
        let mut map = $crate::query::Values::new();
        $( map.insert(::std::string::String::from($key), $crate::Value::from($value)); )+
        map
    }};
}

/// SELECT query builder (also the target of INSERT/UPDATE/DELETE execution).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Query {
    pub(crate) from: Option<String>,
    pub(crate) columns: Vec<Expression>,
    pub(crate) distinct: bool,
    pub(crate) joins: Vec<JoinClause>,
    pub(crate) wheres: Vec<WhereClause>,
    pub(crate) groups: Vec<Expression>,
    pub(crate) havings: Vec<WhereClause>,
    pub(crate) orders: Vec<Order>,
    pub(crate) limit: Option<u64>,
    pub(crate) offset: Option<u64>,
    pub(crate) build_error: Option<String>,
}

impl Query {
    /// An empty builder with no table (used for nested groups).
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder selecting from `table` (`"users"` or `"users as u"`).
    pub fn table(table: &str) -> Self {
        Self {
            from: Some(table.to_string()),
            ..Self::default()
        }
    }

    /// Set the FROM table.
    pub fn from(&mut self, table: &str) -> &mut Self {
        self.from = Some(table.to_string());
        self
    }

    pub fn table_name(&self) -> Option<&str> {
        self.from.as_deref()
    }

    /// Name used to qualify columns of the FROM table (alias if present).
    pub fn qualifier(&self) -> Option<String> {
        self.from
            .as_deref()
            .and_then(|t| crate::ident::Ident::parse(t).base_name().map(str::to_string))
    }

    // ==================== SELECT columns ====================

    /// Replace the column list.
    pub fn select<E: Into<Expression>>(&mut self, columns: impl IntoIterator<Item = E>) -> &mut Self {
        self.columns = columns.into_iter().map(Into::into).collect();
        self
    }

    /// Append one column.
    pub fn add_select(&mut self, column: impl Into<Expression>) -> &mut Self {
        self.columns.push(column.into());
        self
    }

    /// Append a raw select expression.
    pub fn select_raw(&mut self, sql: &str, bindings: Vec<Value>) -> &mut Self {
        self.columns.push(raw_with(sql, bindings));
        self
    }

    /// Append `(<query>) as "<alias>"`.
    pub fn select_sub(&mut self, query: Query, alias: &str) -> &mut Self {
        self.absorb_error(&query);
        self.columns.push(Expression::Sub {
            query: Box::new(query),
            alias: alias.to_string(),
        });
        self
    }

    pub fn distinct(&mut self) -> &mut Self {
        self.distinct = true;
        self
    }

    // ==================== JOIN ====================

    /// `INNER JOIN table ON first op second`
    pub fn join(&mut self, table: &str, first: &str, op: Op, second: &str) -> &mut Self {
        let mut join = JoinClause::new(JoinKind::Inner, table);
        join.on(first, op, second);
        self.joins.push(join);
        self
    }

    /// `LEFT JOIN table ON first op second`
    pub fn left_join(&mut self, table: &str, first: &str, op: Op, second: &str) -> &mut Self {
        let mut join = JoinClause::new(JoinKind::Left, table);
        join.on(first, op, second);
        self.joins.push(join);
        self
    }

    /// `RIGHT JOIN table ON first op second`
    pub fn right_join(&mut self, table: &str, first: &str, op: Op, second: &str) -> &mut Self {
        let mut join = JoinClause::new(JoinKind::Right, table);
        join.on(first, op, second);
        self.joins.push(join);
        self
    }

    /// `CROSS JOIN table`
    pub fn cross_join(&mut self, table: &str) -> &mut Self {
        self.joins.push(JoinClause::new(JoinKind::Cross, table));
        self
    }

    /// Join with a callback that adds any number of predicates.
    pub fn join_with<F>(&mut self, kind: JoinKind, table: &str, f: F) -> &mut Self
    where
        F: FnOnce(&mut JoinClause),
    {
        let mut join = JoinClause::new(kind, table);
        f(&mut join);
        self.joins.push(join);
        self
    }

    // ==================== WHERE ====================

    /// `column op ?` with a string operator (`"="`, `">="`, `"like"`, ...).
    ///
    /// A `NULL` value with `=` / `!=` becomes `IS NULL` / `IS NOT NULL`.
    pub fn where_op(
        &mut self,
        column: impl Into<Expression>,
        op: &str,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.push_basic(column.into(), op, value.into(), Boolean::And)
    }

    /// `column = ?`
    pub fn where_eq(&mut self, column: impl Into<Expression>, value: impl Into<Value>) -> &mut Self {
        self.push_basic(column.into(), "=", value.into(), Boolean::And)
    }

    /// `OR column = ?`
    pub fn or_where(&mut self, column: impl Into<Expression>, value: impl Into<Value>) -> &mut Self {
        self.push_basic(column.into(), "=", value.into(), Boolean::Or)
    }

    /// `OR column op ?`
    pub fn or_where_op(
        &mut self,
        column: impl Into<Expression>,
        op: &str,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.push_basic(column.into(), op, value.into(), Boolean::Or)
    }

    /// `first op second`, comparing two columns.
    pub fn where_column(&mut self, first: &str, op: Op, second: &str) -> &mut Self {
        self.push_where(
            Condition::Column {
                first: first.to_string(),
                op,
                second: second.to_string(),
            },
            Boolean::And,
        )
    }

    /// `OR first op second`
    pub fn or_where_column(&mut self, first: &str, op: Op, second: &str) -> &mut Self {
        self.push_where(
            Condition::Column {
                first: first.to_string(),
                op,
                second: second.to_string(),
            },
            Boolean::Or,
        )
    }

    /// `column IN (?, ...)`; an empty list matches nothing.
    pub fn where_in<V: Into<Value>>(
        &mut self,
        column: impl Into<Expression>,
        values: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        self.push_in(column.into(), values, false, Boolean::And)
    }

    /// `column NOT IN (?, ...)`; an empty list matches everything.
    pub fn where_not_in<V: Into<Value>>(
        &mut self,
        column: impl Into<Expression>,
        values: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        self.push_in(column.into(), values, true, Boolean::And)
    }

    /// `OR column IN (?, ...)`
    pub fn or_where_in<V: Into<Value>>(
        &mut self,
        column: impl Into<Expression>,
        values: impl IntoIterator<Item = V>,
    ) -> &mut Self {
        self.push_in(column.into(), values, false, Boolean::Or)
    }

    /// `column IS NULL`
    pub fn where_null(&mut self, column: impl Into<Expression>) -> &mut Self {
        self.push_where(
            Condition::Null {
                column: column.into(),
                negated: false,
            },
            Boolean::And,
        )
    }

    /// `column IS NOT NULL`
    pub fn where_not_null(&mut self, column: impl Into<Expression>) -> &mut Self {
        self.push_where(
            Condition::Null {
                column: column.into(),
                negated: true,
            },
            Boolean::And,
        )
    }

    /// `OR column IS NULL`
    pub fn or_where_null(&mut self, column: impl Into<Expression>) -> &mut Self {
        self.push_where(
            Condition::Null {
                column: column.into(),
                negated: false,
            },
            Boolean::Or,
        )
    }

    /// `column BETWEEN ? AND ?`
    pub fn where_between(
        &mut self,
        column: impl Into<Expression>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> &mut Self {
        self.push_where(
            Condition::Between {
                column: column.into(),
                low: low.into(),
                high: high.into(),
                negated: false,
            },
            Boolean::And,
        )
    }

    /// `column NOT BETWEEN ? AND ?`
    pub fn where_not_between(
        &mut self,
        column: impl Into<Expression>,
        low: impl Into<Value>,
        high: impl Into<Value>,
    ) -> &mut Self {
        self.push_where(
            Condition::Between {
                column: column.into(),
                low: low.into(),
                high: high.into(),
                negated: true,
            },
            Boolean::And,
        )
    }

    /// Raw condition with `?` placeholders.
    pub fn where_raw(&mut self, sql: &str, bindings: Vec<Value>) -> &mut Self {
        self.push_where(
            Condition::Raw {
                sql: sql.to_string(),
                bindings,
            },
            Boolean::And,
        )
    }

    /// `OR <raw>`
    pub fn or_where_raw(&mut self, sql: &str, bindings: Vec<Value>) -> &mut Self {
        self.push_where(
            Condition::Raw {
                sql: sql.to_string(),
                bindings,
            },
            Boolean::Or,
        )
    }

    /// `AND ( ... )` built by a callback. Empty groups are dropped.
    pub fn where_nested<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&mut Query),
    {
        self.push_nested(f, Boolean::And)
    }

    /// `OR ( ... )` built by a callback.
    pub fn or_where_nested<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&mut Query),
    {
        self.push_nested(f, Boolean::Or)
    }

    /// `EXISTS (<sub-query>)`, the sub-query built by a callback on an empty builder.
    pub fn where_exists<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&mut Query),
    {
        let mut sub = Query::new();
        f(&mut sub);
        self.where_exists_query(sub, Boolean::And, false)
    }

    /// `NOT EXISTS (<sub-query>)`
    pub fn where_not_exists<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&mut Query),
    {
        let mut sub = Query::new();
        f(&mut sub);
        self.where_exists_query(sub, Boolean::And, true)
    }

    /// `OR EXISTS (<sub-query>)`
    pub fn or_where_exists<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&mut Query),
    {
        let mut sub = Query::new();
        f(&mut sub);
        self.where_exists_query(sub, Boolean::Or, false)
    }

    /// Add an already-built EXISTS sub-query.
    pub fn where_exists_query(&mut self, query: Query, boolean: Boolean, negated: bool) -> &mut Self {
        self.absorb_error(&query);
        self.push_where(
            Condition::Exists {
                query: Box::new(query),
                negated,
            },
            boolean,
        )
    }

    // ==================== GROUP BY / HAVING ====================

    pub fn group_by<E: Into<Expression>>(&mut self, columns: impl IntoIterator<Item = E>) -> &mut Self {
        self.groups.extend(columns.into_iter().map(Into::into));
        self
    }

    pub fn group_by_raw(&mut self, sql: &str) -> &mut Self {
        self.groups.push(raw(sql));
        self
    }

    /// `HAVING column op ?`. A missing (NULL) value is a usage error.
    pub fn having(
        &mut self,
        column: impl Into<Expression>,
        op: &str,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.push_having(column.into(), op, value.into(), Boolean::And)
    }

    /// `OR column op ?` in HAVING.
    pub fn or_having(
        &mut self,
        column: impl Into<Expression>,
        op: &str,
        value: impl Into<Value>,
    ) -> &mut Self {
        self.push_having(column.into(), op, value.into(), Boolean::Or)
    }

    pub fn having_raw(&mut self, sql: &str, bindings: Vec<Value>) -> &mut Self {
        self.havings.push(WhereClause::new(
            Condition::Raw {
                sql: sql.to_string(),
                bindings,
            },
            Boolean::And,
        ));
        self
    }

    /// `HAVING ( ... )` built by a callback that adds `having` clauses.
    pub fn having_nested<F>(&mut self, f: F) -> &mut Self
    where
        F: FnOnce(&mut Query),
    {
        let mut sub = Query::new();
        sub.from = self.from.clone();
        f(&mut sub);
        self.absorb_error(&sub);
        if !sub.havings.is_empty() {
            self.havings.push(WhereClause::new(
                Condition::Nested {
                    query: Box::new(sub),
                },
                Boolean::And,
            ));
        }
        self
    }

    // ==================== ORDER / LIMIT ====================

    /// `ORDER BY column ASC`
    pub fn order_by(&mut self, column: impl Into<Expression>) -> &mut Self {
        self.orders.push(Order::Column {
            column: column.into(),
            direction: Direction::Asc,
        });
        self
    }

    /// `ORDER BY column DESC`
    pub fn order_by_desc(&mut self, column: impl Into<Expression>) -> &mut Self {
        self.orders.push(Order::Column {
            column: column.into(),
            direction: Direction::Desc,
        });
        self
    }

    /// `ORDER BY column <direction>` with a string direction.
    pub fn order_by_dir(&mut self, column: impl Into<Expression>, direction: &str) -> &mut Self {
        match direction.parse::<Direction>() {
            Ok(direction) => self.orders.push(Order::Column {
                column: column.into(),
                direction,
            }),
            Err(e) => self.set_error(e.to_string()),
        }
        self
    }

    pub fn order_by_raw(&mut self, sql: &str, bindings: Vec<Value>) -> &mut Self {
        self.orders.push(Order::Raw {
            sql: sql.to_string(),
            bindings,
        });
        self
    }

    /// `ORDER BY column DESC` (defaults to `created_at` in the model layer).
    pub fn latest(&mut self, column: &str) -> &mut Self {
        self.order_by_desc(column)
    }

    pub fn oldest(&mut self, column: &str) -> &mut Self {
        self.order_by(column)
    }

    pub fn limit(&mut self, n: u64) -> &mut Self {
        self.limit = Some(n);
        self
    }

    pub fn offset(&mut self, n: u64) -> &mut Self {
        self.offset = Some(n);
        self
    }

    /// Alias for [`Query::limit`].
    pub fn take(&mut self, n: u64) -> &mut Self {
        self.limit(n)
    }

    /// Alias for [`Query::offset`].
    pub fn skip(&mut self, n: u64) -> &mut Self {
        self.offset(n)
    }

    /// Set LIMIT/OFFSET for a 1-based page (both clamped to >= 1). Offsets past
    /// [`MAX_ROWS`] are capped.
    pub fn for_page(&mut self, page: u64, per_page: u64) -> &mut Self {
        let page = page.max(1);
        let per_page = per_page.clamp(1, MAX_ROWS);
        self.limit = Some(per_page);
        self.offset = Some((page - 1).saturating_mul(per_page).min(MAX_ROWS));
        self
    }

    // ==================== Compilation ====================

    /// SQL rendered with ANSI identifier quoting.
    pub fn to_sql(&self) -> String {
        Grammar::default().compile_select(self).sql
    }

    /// Bindings in placeholder order.
    pub fn bindings(&self) -> Vec<Value> {
        Grammar::default().compile_select(self).bindings
    }

    /// SQL and bindings for a specific grammar.
    pub fn compile(&self, grammar: &Grammar) -> Compiled {
        grammar.compile_select(self)
    }

    pub fn has_wheres(&self) -> bool {
        !self.wheres.is_empty()
    }

    /// Whether any top-level WHERE clause is OR-connected.
    pub(crate) fn has_or_wheres(&self) -> bool {
        self.wheres.iter().any(|w| w.boolean == Boolean::Or)
    }

    /// Move the current WHERE clauses into one parenthesised group, so clauses appended
    /// afterwards apply to the whole group.
    pub(crate) fn wrap_wheres(&mut self) {
        if self.wheres.is_empty() {
            return;
        }
        let mut group = Query::new();
        group.from = self.from.clone();
        group.wheres = std::mem::take(&mut self.wheres);
        self.wheres.push(WhereClause::new(
            Condition::Nested {
                query: Box::new(group),
            },
            Boolean::And,
        ));
    }

    /// Copy used by aggregates: same predicates, no columns/order/limit/offset.
    pub(crate) fn clone_for_aggregate(&self) -> Query {
        let mut q = self.clone();
        q.columns.clear();
        q.orders.clear();
        q.limit = None;
        q.offset = None;
        q
    }

    pub(crate) fn validate(&self) -> crate::OrmResult<()> {
        match &self.build_error {
            Some(err) => Err(crate::OrmError::validation(err.clone())),
            None => Ok(()),
        }
    }

    // ==================== Internals ====================

    fn push_where(&mut self, condition: Condition, boolean: Boolean) -> &mut Self {
        self.wheres.push(WhereClause::new(condition, boolean));
        self
    }

    fn push_basic(&mut self, column: Expression, op: &str, value: Value, boolean: Boolean) -> &mut Self {
        let op = match op.parse::<Op>() {
            Ok(op) => op,
            Err(e) => {
                self.set_error(e.to_string());
                return self;
            }
        };
        let condition = match (op, value.is_null()) {
            (Op::Eq, true) => Condition::Null {
                column,
                negated: false,
            },
            (Op::Ne, true) => Condition::Null {
                column,
                negated: true,
            },
            (_, true) => {
                self.set_error(format!("operator '{op}' cannot be compared with NULL"));
                return self;
            }
            (op, false) => Condition::Basic { column, op, value },
        };
        self.push_where(condition, boolean)
    }

    fn push_in<V: Into<Value>>(
        &mut self,
        column: Expression,
        values: impl IntoIterator<Item = V>,
        negated: bool,
        boolean: Boolean,
    ) -> &mut Self {
        self.push_where(
            Condition::In {
                column,
                values: values.into_iter().map(Into::into).collect(),
                negated,
            },
            boolean,
        )
    }

    fn push_nested<F>(&mut self, f: F, boolean: Boolean) -> &mut Self
    where
        F: FnOnce(&mut Query),
    {
        let mut sub = Query::new();
        sub.from = self.from.clone();
        f(&mut sub);
        self.absorb_error(&sub);
        if !sub.wheres.is_empty() {
            self.push_where(
                Condition::Nested {
                    query: Box::new(sub),
                },
                boolean,
            );
        }
        self
    }

    fn push_having(&mut self, column: Expression, op: &str, value: Value, boolean: Boolean) -> &mut Self {
        if value.is_null() {
            let name = match &column {
                Expression::Column(c) => c.clone(),
                _ => "<expression>".to_string(),
            };
            self.set_error(format!("HAVING clause on '{name}' requires a value"));
            return self;
        }
        match op.parse::<Op>() {
            Ok(op) => self
                .havings
                .push(WhereClause::new(Condition::Basic { column, op, value }, boolean)),
            Err(e) => self.set_error(e.to_string()),
        }
        self
    }

    pub(crate) fn set_error(&mut self, err: String) {
        if self.build_error.is_none() {
            self.build_error = Some(err);
        }
    }

    fn absorb_error(&mut self, other: &Query) {
        if let Some(err) = &other.build_error {
            self.set_error(err.clone());
        }
    }
}

#[cfg(test)]
mod tests;
