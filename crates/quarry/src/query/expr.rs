//! Expression layer for the query builder.
//!
//! - [`Expression`] distinguishes identifiers from raw SQL fragments (and aliased
//!   sub-selects). The distinction is made once, where the caller hands the value in:
//!   `&str`/`String` convert to [`Expression::Column`], [`raw`] builds
//!   [`Expression::Raw`]. The compiler never guesses by inspecting strings.
//! - [`Condition`] is one node of a WHERE/HAVING tree; [`WhereClause`] pairs it with the
//!   connector ([`Boolean`]) that joins it to its left neighbour.

use crate::error::{OrmError, OrmResult};
use crate::query::Query;
use crate::value::Value;
use std::fmt;
use std::str::FromStr;

/// A column reference, a raw SQL fragment, or an aliased sub-select.
#[derive(Debug, Clone, PartialEq)]
pub enum Expression {
    /// Identifier, rendered quoted (`users.id` → `"users"."id"`).
    Column(String),
    /// Raw SQL, rendered verbatim; `bindings` fill its `?` placeholders.
    Raw { sql: String, bindings: Vec<Value> },
    /// `(<query>) as "<alias>"`
    Sub { query: Box<Query>, alias: String },
}

impl Expression {
    pub fn column(name: impl Into<String>) -> Self {
        Expression::Column(name.into())
    }

    pub fn is_raw(&self) -> bool {
        matches!(self, Expression::Raw { .. })
    }
}

impl From<&str> for Expression {
    fn from(value: &str) -> Self {
        Expression::Column(value.to_string())
    }
}

impl From<String> for Expression {
    fn from(value: String) -> Self {
        Expression::Column(value)
    }
}

impl From<&String> for Expression {
    fn from(value: &String) -> Self {
        Expression::Column(value.clone())
    }
}

/// Create a raw SQL fragment that is passed through without quoting.
pub fn raw(sql: impl Into<String>) -> Expression {
    Expression::Raw {
        sql: sql.into(),
        bindings: Vec::new(),
    }
}

/// Create a raw SQL fragment with `?` placeholders and their bindings.
pub fn raw_with(sql: impl Into<String>, bindings: Vec<Value>) -> Expression {
    Expression::Raw {
        sql: sql.into(),
        bindings,
    }
}

/// Connector between a clause and the clause before it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Boolean {
    And,
    Or,
}

impl Boolean {
    pub fn as_sql(self) -> &'static str {
        match self {
            Boolean::And => "AND",
            Boolean::Or => "OR",
        }
    }
}

/// Comparison operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Op {
    Eq,
    Ne,
    Gt,
    Gte,
    Lt,
    Lte,
    Like,
    NotLike,
    /// Case-insensitive LIKE; rendered as `LIKE` outside PostgreSQL.
    ILike,
}

impl Op {
    pub fn as_sql(self) -> &'static str {
        match self {
            Op::Eq => "=",
            Op::Ne => "!=",
            Op::Gt => ">",
            Op::Gte => ">=",
            Op::Lt => "<",
            Op::Lte => "<=",
            Op::Like => "LIKE",
            Op::NotLike => "NOT LIKE",
            Op::ILike => "ILIKE",
        }
    }
}

impl fmt::Display for Op {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_sql())
    }
}

impl FromStr for Op {
    type Err = OrmError;

    fn from_str(s: &str) -> OrmResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "=" | "==" => Ok(Op::Eq),
            "!=" | "<>" => Ok(Op::Ne),
            ">" => Ok(Op::Gt),
            ">=" => Ok(Op::Gte),
            "<" => Ok(Op::Lt),
            "<=" => Ok(Op::Lte),
            "like" => Ok(Op::Like),
            "not like" => Ok(Op::NotLike),
            "ilike" => Ok(Op::ILike),
            other => Err(OrmError::validation(format!("illegal operator '{other}'"))),
        }
    }
}

/// One node of a WHERE / HAVING / JOIN ON tree.
#[derive(Debug, Clone, PartialEq)]
pub enum Condition {
    /// `column op ?`
    Basic {
        column: Expression,
        op: Op,
        value: Value,
    },
    /// `first op second` (both identifiers; used for join and correlation predicates)
    Column {
        first: String,
        op: Op,
        second: String,
    },
    /// `column [NOT] IN (?, ...)`
    In {
        column: Expression,
        values: Vec<Value>,
        negated: bool,
    },
    /// `column IS [NOT] NULL`
    Null { column: Expression, negated: bool },
    /// `column [NOT] BETWEEN ? AND ?`
    Between {
        column: Expression,
        low: Value,
        high: Value,
        negated: bool,
    },
    /// `[NOT] EXISTS (<query>)`
    Exists { query: Box<Query>, negated: bool },
    /// Raw SQL with its own bindings.
    Raw { sql: String, bindings: Vec<Value> },
    /// Parenthesised group; the sub-query's own wheres (or havings) are rendered.
    Nested { query: Box<Query> },
}

/// A condition together with its connector.
#[derive(Debug, Clone, PartialEq)]
pub struct WhereClause {
    pub condition: Condition,
    pub boolean: Boolean,
}

impl WhereClause {
    pub fn new(condition: Condition, boolean: Boolean) -> Self {
        Self { condition, boolean }
    }
}

/// Sort direction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Asc,
    Desc,
}

impl Direction {
    pub fn as_sql(self) -> &'static str {
        match self {
            Direction::Asc => "ASC",
            Direction::Desc => "DESC",
        }
    }
}

impl FromStr for Direction {
    type Err = OrmError;

    fn from_str(s: &str) -> OrmResult<Self> {
        match s.trim().to_ascii_lowercase().as_str() {
            "asc" => Ok(Direction::Asc),
            "desc" => Ok(Direction::Desc),
            other => Err(OrmError::validation(format!(
                "order direction must be 'asc' or 'desc', got '{other}'"
            ))),
        }
    }
}

/// ORDER BY entry.
#[derive(Debug, Clone, PartialEq)]
pub enum Order {
    Column {
        column: Expression,
        direction: Direction,
    },
    Raw {
        sql: String,
        bindings: Vec<Value>,
    },
}

/// JOIN type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum JoinKind {
    Inner,
    Left,
    Right,
    Cross,
}

impl JoinKind {
    pub fn as_sql(self) -> &'static str {
        match self {
            JoinKind::Inner => "INNER JOIN",
            JoinKind::Left => "LEFT JOIN",
            JoinKind::Right => "RIGHT JOIN",
            JoinKind::Cross => "CROSS JOIN",
        }
    }
}

/// A JOIN with its correlation predicates.
///
/// Predicates are regular [`WhereClause`]s, so a join can mix column comparisons
/// (`on`) with value-bearing conditions (`where_eq`).
#[derive(Debug, Clone, PartialEq)]
pub struct JoinClause {
    pub kind: JoinKind,
    pub table: String,
    pub clauses: Vec<WhereClause>,
}

impl JoinClause {
    pub fn new(kind: JoinKind, table: impl Into<String>) -> Self {
        Self {
            kind,
            table: table.into(),
            clauses: Vec::new(),
        }
    }

    /// `ON first op second`
    pub fn on(&mut self, first: &str, op: Op, second: &str) -> &mut Self {
        self.push_on(first, op, second, Boolean::And)
    }

    /// `OR first op second`
    pub fn or_on(&mut self, first: &str, op: Op, second: &str) -> &mut Self {
        self.push_on(first, op, second, Boolean::Or)
    }

    /// `AND column = ?` inside the ON clause.
    pub fn where_eq(&mut self, column: &str, value: impl Into<Value>) -> &mut Self {
        self.clauses.push(WhereClause::new(
            Condition::Basic {
                column: column.into(),
                op: Op::Eq,
                value: value.into(),
            },
            Boolean::And,
        ));
        self
    }

    /// `AND column IS NULL` inside the ON clause.
    pub fn where_null(&mut self, column: &str) -> &mut Self {
        self.clauses.push(WhereClause::new(
            Condition::Null {
                column: column.into(),
                negated: false,
            },
            Boolean::And,
        ));
        self
    }

    fn push_on(&mut self, first: &str, op: Op, second: &str, boolean: Boolean) -> &mut Self {
        self.clauses.push(WhereClause::new(
            Condition::Column {
                first: first.to_string(),
                op,
                second: second.to_string(),
            },
            boolean,
        ));
        self
    }
}
