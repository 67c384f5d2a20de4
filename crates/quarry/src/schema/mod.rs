//! Schema builder.
//!
//! [`Schema`] runs DDL against a connection; [`Blueprint`] collects the columns, indexes
//! and constraints of one table and [`SchemaGrammar`] renders it for the connection's
//! dialect.
//!
//! ```ignore
//! use quarry::schema::Schema;
//!
//! let schema = Schema::new(&conn);
//! schema.create("customers", |table| {
//!     table.id();
//!     table.string("name", 120);
//!     table.string("email", 191).unique();
//!     table.timestamps();
//!     table.soft_deletes();
//! })?;
//! schema.table("customers", |table| {
//!     table.boolean("vip").default(false);
//! })?;
//! ```

mod blueprint;
mod column;
mod grammar;

pub use blueprint::{Blueprint, BlueprintMode, Command, IndexKind};
pub use column::{ColumnDefault, ColumnDefinition, ColumnType, ForeignKeyDefinition};
pub use grammar::{MAX_IDENTIFIER_LEN, SchemaGrammar, index_name};

use crate::config::DatabaseConfig;
use crate::connection::{self, Connection};
use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};

/// DDL facade over a connection.
pub struct Schema<'a> {
    conn: &'a dyn Connection,
    grammar: SchemaGrammar,
    charset: Option<String>,
    collation: Option<String>,
}

impl<'a> Schema<'a> {
    pub fn new(conn: &'a dyn Connection) -> Self {
        Self {
            conn,
            grammar: SchemaGrammar::new(conn.dialect()),
            charset: None,
            collation: None,
        }
    }

    /// Schema builder honouring a config's table prefix and its default charset and
    /// collation for created tables. The config must name the connection's driver.
    pub fn from_config(conn: &'a dyn Connection, config: &DatabaseConfig) -> OrmResult<Self> {
        if config.driver != conn.dialect() {
            return Err(OrmError::Config(format!(
                "config is for {} but the connection is {}",
                config.driver,
                conn.dialect()
            )));
        }
        let mut schema = Self::new(conn).with_prefix(&config.prefix);
        schema.charset = config.charset.clone();
        schema.collation = config.collation.clone();
        Ok(schema)
    }

    /// Prefix every table name (configured as `prefix` in [`DatabaseConfig`](crate::DatabaseConfig)).
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.grammar = self.grammar.with_prefix(prefix);
        self
    }

    pub fn connection(&self) -> &'a dyn Connection {
        self.conn
    }

    pub fn dialect(&self) -> Dialect {
        self.grammar.dialect()
    }

    pub fn grammar(&self) -> &SchemaGrammar {
        &self.grammar
    }

    /// Create a table. Configured charset and collation apply unless `f` sets its own.
    pub fn create<F: FnOnce(&mut Blueprint)>(&self, table: &str, f: F) -> OrmResult<()> {
        let mut blueprint = Blueprint::new(table, BlueprintMode::Create);
        if let Some(charset) = &self.charset {
            blueprint.charset(charset);
        }
        if let Some(collation) = &self.collation {
            blueprint.collation(collation);
        }
        f(&mut blueprint);
        self.build(&blueprint)
    }

    /// Alter an existing table.
    pub fn table<F: FnOnce(&mut Blueprint)>(&self, table: &str, f: F) -> OrmResult<()> {
        let mut blueprint = Blueprint::new(table, BlueprintMode::Alter);
        f(&mut blueprint);
        self.build(&blueprint)
    }

    /// Execute every statement of `blueprint`.
    pub fn build(&self, blueprint: &Blueprint) -> OrmResult<()> {
        for sql in self.grammar.compile(blueprint) {
            connection::run_statement(self.conn, &sql)?;
        }
        Ok(())
    }

    pub fn drop(&self, table: &str) -> OrmResult<()> {
        connection::run_statement(self.conn, &self.grammar.compile_drop(table))
    }

    pub fn drop_if_exists(&self, table: &str) -> OrmResult<()> {
        connection::run_statement(self.conn, &self.grammar.compile_drop_if_exists(table))
    }

    pub fn rename(&self, from: &str, to: &str) -> OrmResult<()> {
        connection::run_statement(self.conn, &self.grammar.compile_rename(from, to))
    }

    pub fn has_table(&self, table: &str) -> OrmResult<bool> {
        self.grammar.table_exists_query(table).exists(self.conn)
    }

    /// Column names of `table`, in definition order.
    pub fn get_column_listing(&self, table: &str) -> OrmResult<Vec<String>> {
        let compiled = self.grammar.compile_column_listing(table);
        let rows = connection::run_select(self.conn, &compiled.sql, &compiled.bindings)?;
        Ok(rows
            .iter()
            .filter_map(|row| row.get("column_name").and_then(|v| v.as_str()))
            .map(str::to_string)
            .collect())
    }

    /// Case-insensitive column check.
    pub fn has_column(&self, table: &str, column: &str) -> OrmResult<bool> {
        self.has_columns(table, &[column])
    }

    pub fn has_columns(&self, table: &str, columns: &[&str]) -> OrmResult<bool> {
        let existing: Vec<String> = self
            .get_column_listing(table)?
            .into_iter()
            .map(|c| c.to_lowercase())
            .collect();
        Ok(columns
            .iter()
            .all(|c| existing.contains(&c.to_lowercase())))
    }

    /// Run raw DDL.
    pub fn statement(&self, sql: &str) -> OrmResult<()> {
        connection::run_statement(self.conn, sql)
    }
}

#[cfg(test)]
mod tests;
