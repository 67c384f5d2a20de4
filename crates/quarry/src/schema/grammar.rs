//! DDL rendering per dialect.
//!
//! A [`Blueprint`] compiles to an ordered list of statements. Where an engine cannot
//! express something inside `CREATE TABLE` (PostgreSQL and SQLite plain indexes, SQLite
//! unique indexes) it is emitted as a follow-up statement. SQLite cannot add a foreign key
//! to an existing column; such constraints are skipped with a warning.

use super::blueprint::{Blueprint, BlueprintMode, Command, IndexKind};
use super::column::{ColumnDefault, ColumnDefinition, ColumnType, ForeignKeyDefinition};
use crate::dialect::Dialect;
use crate::ident;
use crate::query::{Compiled, Grammar, Query};
use crate::value::Value;
use sha2::{Digest, Sha256};

/// Longest generated index / constraint name.
pub const MAX_IDENTIFIER_LEN: usize = 64;

/// `{table}_{columns}_{suffix}`, lowercased with `-` and `.` replaced by `_`, capped at
/// [`MAX_IDENTIFIER_LEN`] by truncating and appending eight hex digits of the SHA-256 of
/// the full name.
pub fn index_name(table: &str, columns: &[String], suffix: &str) -> String {
    let name = format!("{}_{}_{}", table, columns.join("_"), suffix)
        .to_lowercase()
        .replace(['-', '.'], "_");
    cap_identifier(&name)
}

fn cap_identifier(name: &str) -> String {
    if name.len() <= MAX_IDENTIFIER_LEN {
        return name.to_string();
    }
    let digest = Sha256::digest(name.as_bytes());
    let hash: String = digest.iter().take(4).map(|b| format!("{b:02x}")).collect();
    let mut cut = MAX_IDENTIFIER_LEN - hash.len() - 1;
    while !name.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}_{}", &name[..cut], hash)
}

struct IndexSpec {
    kind: IndexKind,
    name: String,
    columns: Vec<String>,
}

/// Renders blueprints and table-level statements for one dialect.
#[derive(Debug, Clone)]
pub struct SchemaGrammar {
    dialect: Dialect,
    prefix: String,
}

impl SchemaGrammar {
    pub fn new(dialect: Dialect) -> Self {
        Self {
            dialect,
            prefix: String::new(),
        }
    }

    /// Prefix prepended to every table name.
    pub fn with_prefix(mut self, prefix: &str) -> Self {
        self.prefix = prefix.to_string();
        self
    }

    pub fn dialect(&self) -> Dialect {
        self.dialect
    }

    fn wrap(&self, name: &str) -> String {
        ident::quote_name(name, self.dialect.quote_char())
    }

    fn wrap_table(&self, table: &str) -> String {
        ident::wrap(&format!("{}{}", self.prefix, table), self.dialect.quote_char())
    }

    fn columnize(&self, columns: &[String]) -> String {
        columns
            .iter()
            .map(|c| self.wrap(c))
            .collect::<Vec<_>>()
            .join(", ")
    }

    // ==================== Blueprints ====================

    /// All statements for `blueprint`, in execution order.
    pub fn compile(&self, blueprint: &Blueprint) -> Vec<String> {
        let mut statements = match blueprint.mode {
            BlueprintMode::Create => self.compile_create(blueprint),
            BlueprintMode::Alter => self.compile_alter(blueprint),
        };
        for command in &blueprint.commands {
            statements.extend(self.compile_command(blueprint, command));
        }
        statements
    }

    fn compile_create(&self, blueprint: &Blueprint) -> Vec<String> {
        let table = self.wrap_table(&blueprint.table);
        let mut definitions: Vec<String> = blueprint
            .columns
            .iter()
            .map(|c| self.column_sql(c, true))
            .collect();
        let mut after = Vec::new();

        for index in self.indexes(blueprint) {
            let columns = self.columnize(&index.columns);
            let name = self.wrap(&index.name);
            match (index.kind, self.dialect) {
                (IndexKind::Primary, _) => definitions.push(format!("primary key ({columns})")),
                (IndexKind::Unique, Dialect::Sqlite) => {
                    after.push(format!("CREATE UNIQUE INDEX {name} ON {table} ({columns})"))
                }
                (IndexKind::Unique, _) => {
                    definitions.push(format!("constraint {name} unique ({columns})"))
                }
                (IndexKind::Index, Dialect::Mysql) => {
                    definitions.push(format!("index {name} ({columns})"))
                }
                (IndexKind::Index, _) => {
                    after.push(format!("CREATE INDEX {name} ON {table} ({columns})"))
                }
            }
        }
        for foreign in self.foreign_keys(blueprint) {
            definitions.push(self.foreign_sql(&blueprint.table, foreign));
        }

        let mut sql = format!("CREATE TABLE {table} ({})", definitions.join(", "));
        self.push_table_options(&mut sql, blueprint);
        let mut statements = vec![sql];
        statements.extend(after);
        statements
    }

    fn push_table_options(&self, sql: &mut String, blueprint: &Blueprint) {
        if !self.dialect.supports_charset() {
            if blueprint.charset.is_some() || blueprint.collation.is_some() {
                tracing::debug!(
                    target: "quarry.schema",
                    table = %blueprint.table,
                    dialect = %self.dialect,
                    "charset/collation ignored"
                );
            }
            return;
        }
        if let Some(charset) = &blueprint.charset {
            sql.push_str(&format!(" default character set {charset}"));
        }
        if let Some(collation) = &blueprint.collation {
            sql.push_str(&format!(" collate '{collation}'"));
        }
        if let Some(engine) = &blueprint.engine {
            sql.push_str(&format!(" engine = {engine}"));
        }
    }

    fn compile_alter(&self, blueprint: &Blueprint) -> Vec<String> {
        if self.dialect == Dialect::Sqlite {
            return self.compile_sqlite_alter(blueprint);
        }
        let table = self.wrap_table(&blueprint.table);
        let mut statements = Vec::new();

        if !blueprint.columns.is_empty() {
            let adds: Vec<String> = blueprint
                .columns
                .iter()
                .map(|c| format!("ADD COLUMN {}", self.column_sql(c, true)))
                .collect();
            statements.push(format!("ALTER TABLE {table} {}", adds.join(", ")));
        }

        for index in self.indexes(blueprint) {
            let columns = self.columnize(&index.columns);
            let name = self.wrap(&index.name);
            statements.push(match (index.kind, self.dialect) {
                (IndexKind::Primary, _) => format!("ALTER TABLE {table} ADD primary key ({columns})"),
                (IndexKind::Unique, Dialect::Mysql) => {
                    format!("ALTER TABLE {table} ADD unique {name} ({columns})")
                }
                (IndexKind::Unique, _) => {
                    format!("ALTER TABLE {table} ADD constraint {name} unique ({columns})")
                }
                (IndexKind::Index, Dialect::Mysql) => {
                    format!("ALTER TABLE {table} ADD index {name} ({columns})")
                }
                (IndexKind::Index, _) => format!("CREATE INDEX {name} ON {table} ({columns})"),
            });
        }
        for foreign in self.foreign_keys(blueprint) {
            statements.push(format!(
                "ALTER TABLE {table} ADD {}",
                self.foreign_sql(&blueprint.table, foreign)
            ));
        }
        statements
    }

    /// SQLite: one `ADD COLUMN` per column; a foreign key can only ride along on a new column.
    fn compile_sqlite_alter(&self, blueprint: &Blueprint) -> Vec<String> {
        let table = self.wrap_table(&blueprint.table);
        let mut statements = Vec::new();

        for column in &blueprint.columns {
            let mut sql = format!("ALTER TABLE {table} ADD COLUMN {}", self.column_sql(column, false));
            let foreign = column.foreign.as_ref().or_else(|| {
                blueprint
                    .foreign_keys
                    .iter()
                    .find(|f| f.columns.len() == 1 && f.columns[0] == column.name)
            });
            if let Some(foreign) = foreign {
                sql.push(' ');
                sql.push_str(&self.references_sql(foreign));
            }
            statements.push(sql);
        }

        for foreign in &blueprint.foreign_keys {
            let attached = foreign.columns.len() == 1
                && blueprint
                    .columns
                    .iter()
                    .any(|c| c.name == foreign.columns[0] && c.foreign.is_none());
            if !attached {
                tracing::warn!(
                    target: "quarry.schema",
                    table = %blueprint.table,
                    columns = ?foreign.columns,
                    "SQLite cannot add a foreign key to an existing column; skipped"
                );
            }
        }

        for index in self.indexes(blueprint) {
            let columns = self.columnize(&index.columns);
            let name = self.wrap(&index.name);
            match index.kind {
                IndexKind::Primary => tracing::warn!(
                    target: "quarry.schema",
                    table = %blueprint.table,
                    columns = ?index.columns,
                    "SQLite cannot add a primary key to an existing table; skipped"
                ),
                IndexKind::Unique => {
                    statements.push(format!("CREATE UNIQUE INDEX {name} ON {table} ({columns})"))
                }
                IndexKind::Index => {
                    statements.push(format!("CREATE INDEX {name} ON {table} ({columns})"))
                }
            }
        }
        statements
    }

    fn compile_command(&self, blueprint: &Blueprint, command: &Command) -> Vec<String> {
        let table = self.wrap_table(&blueprint.table);
        match command {
            // Rendered with the columns.
            Command::Index { .. } => Vec::new(),
            Command::DropColumn(columns) => {
                let drops: Vec<String> = columns
                    .iter()
                    .map(|c| format!("DROP COLUMN {}", self.wrap(c)))
                    .collect();
                if self.dialect == Dialect::Sqlite {
                    drops
                        .into_iter()
                        .map(|d| format!("ALTER TABLE {table} {d}"))
                        .collect()
                } else {
                    vec![format!("ALTER TABLE {table} {}", drops.join(", "))]
                }
            }
            Command::RenameColumn { from, to } => vec![format!(
                "ALTER TABLE {table} RENAME COLUMN {} TO {}",
                self.wrap(from),
                self.wrap(to)
            )],
            Command::DropIndex(name) => vec![match self.dialect {
                Dialect::Mysql => format!("ALTER TABLE {table} DROP INDEX {}", self.wrap(name)),
                _ => format!("DROP INDEX {}", self.wrap(name)),
            }],
            Command::DropUnique(name) => vec![match self.dialect {
                Dialect::Mysql => format!("ALTER TABLE {table} DROP INDEX {}", self.wrap(name)),
                Dialect::Postgres => {
                    format!("ALTER TABLE {table} DROP CONSTRAINT {}", self.wrap(name))
                }
                Dialect::Sqlite => format!("DROP INDEX {}", self.wrap(name)),
            }],
            Command::DropForeign(name) => match self.dialect {
                Dialect::Mysql => vec![format!(
                    "ALTER TABLE {table} DROP FOREIGN KEY {}",
                    self.wrap(name)
                )],
                Dialect::Postgres => vec![format!(
                    "ALTER TABLE {table} DROP CONSTRAINT {}",
                    self.wrap(name)
                )],
                Dialect::Sqlite => {
                    tracing::warn!(
                        target: "quarry.schema",
                        table = %blueprint.table,
                        constraint = %name,
                        "SQLite cannot drop a foreign key; skipped"
                    );
                    Vec::new()
                }
            },
        }
    }

    /// Column-level and table-level indexes, with generated names filled in.
    fn indexes(&self, blueprint: &Blueprint) -> Vec<IndexSpec> {
        let table = format!("{}{}", self.prefix, blueprint.table);
        let mut indexes = Vec::new();
        for column in &blueprint.columns {
            let columns = vec![column.name.clone()];
            if column.unique {
                indexes.push(IndexSpec {
                    kind: IndexKind::Unique,
                    name: index_name(&table, &columns, "unique"),
                    columns: columns.clone(),
                });
            }
            if column.index {
                indexes.push(IndexSpec {
                    kind: IndexKind::Index,
                    name: index_name(&table, &columns, "index"),
                    columns,
                });
            }
        }
        for command in &blueprint.commands {
            if let Command::Index {
                kind,
                name,
                columns,
            } = command
            {
                indexes.push(IndexSpec {
                    kind: *kind,
                    name: name
                        .clone()
                        .unwrap_or_else(|| index_name(&table, columns, kind.suffix())),
                    columns: columns.clone(),
                });
            }
        }
        indexes
    }

    fn foreign_keys<'b>(&self, blueprint: &'b Blueprint) -> Vec<&'b ForeignKeyDefinition> {
        blueprint
            .columns
            .iter()
            .filter_map(|c| c.foreign.as_ref())
            .chain(blueprint.foreign_keys.iter())
            .collect()
    }

    fn foreign_sql(&self, table: &str, foreign: &ForeignKeyDefinition) -> String {
        let name = foreign.name.clone().unwrap_or_else(|| {
            index_name(&format!("{}{}", self.prefix, table), &foreign.columns, "foreign")
        });
        format!(
            "constraint {} foreign key ({}) {}",
            self.wrap(&name),
            self.columnize(&foreign.columns),
            self.references_sql(foreign)
        )
    }

    fn references_sql(&self, foreign: &ForeignKeyDefinition) -> String {
        let mut sql = format!(
            "references {} ({})",
            self.wrap_table(&foreign.on),
            self.columnize(&foreign.references)
        );
        if let Some(action) = &foreign.on_delete {
            sql.push_str(&format!(" on delete {action}"));
        }
        if let Some(action) = &foreign.on_update {
            sql.push_str(&format!(" on update {action}"));
        }
        sql
    }

    // ==================== Columns ====================

    fn column_sql(&self, column: &ColumnDefinition, inline_primary: bool) -> String {
        let mut sql = format!("{} {}", self.wrap(&column.name), self.type_sql(column));

        if column.auto_increment && column.kind.is_integer() {
            match self.dialect {
                Dialect::Mysql => {
                    if column.unsigned {
                        sql.push_str(" unsigned");
                    }
                    sql.push_str(" not null auto_increment primary key");
                }
                Dialect::Postgres => sql.push_str(" primary key"),
                Dialect::Sqlite => sql.push_str(" primary key autoincrement not null"),
            }
            return sql;
        }

        if column.unsigned && self.dialect == Dialect::Mysql && column.kind.is_integer() {
            sql.push_str(" unsigned");
        }
        sql.push_str(if column.nullable { " null" } else { " not null" });
        if let Some(default) = &column.default {
            sql.push_str(" default ");
            sql.push_str(&self.default_sql(default));
        }
        if column.primary && inline_primary {
            sql.push_str(" primary key");
        }
        sql
    }

    fn type_sql(&self, column: &ColumnDefinition) -> String {
        let auto = column.auto_increment;
        match (&column.kind, self.dialect) {
            (
                ColumnType::Increments
                | ColumnType::BigIncrements
                | ColumnType::Integer
                | ColumnType::BigInteger
                | ColumnType::SmallInteger,
                Dialect::Sqlite,
            ) => "integer".to_string(),
            (ColumnType::Increments | ColumnType::Integer, Dialect::Postgres) if auto => {
                "serial".to_string()
            }
            (ColumnType::BigIncrements | ColumnType::BigInteger, Dialect::Postgres) if auto => {
                "bigserial".to_string()
            }
            (ColumnType::SmallInteger, Dialect::Postgres) if auto => "smallserial".to_string(),
            (ColumnType::Increments | ColumnType::Integer, Dialect::Mysql) => "int".to_string(),
            (ColumnType::Increments | ColumnType::Integer, Dialect::Postgres) => {
                "integer".to_string()
            }
            (ColumnType::BigIncrements | ColumnType::BigInteger, _) => "bigint".to_string(),
            (ColumnType::SmallInteger, _) => "smallint".to_string(),
            (ColumnType::String(_), Dialect::Sqlite) => "varchar".to_string(),
            (ColumnType::String(length), _) => format!("varchar({length})"),
            (ColumnType::Text, _) => "text".to_string(),
            (ColumnType::Boolean, Dialect::Postgres) => "boolean".to_string(),
            (ColumnType::Boolean, _) => "tinyint(1)".to_string(),
            (ColumnType::Decimal { .. }, Dialect::Sqlite) => "numeric".to_string(),
            (ColumnType::Decimal { precision, scale }, _) => {
                format!("decimal({precision}, {scale})")
            }
            (ColumnType::Float, Dialect::Mysql) => "double".to_string(),
            (ColumnType::Float, Dialect::Postgres) => "double precision".to_string(),
            (ColumnType::Float, Dialect::Sqlite) => "float".to_string(),
            (ColumnType::Date, _) => "date".to_string(),
            (ColumnType::DateTime, Dialect::Mysql) => "datetime".to_string(),
            (ColumnType::Timestamp, Dialect::Mysql) => "timestamp".to_string(),
            (ColumnType::DateTime | ColumnType::Timestamp, Dialect::Postgres) => {
                "timestamp(0) without time zone".to_string()
            }
            (ColumnType::DateTime | ColumnType::Timestamp, Dialect::Sqlite) => {
                "datetime".to_string()
            }
            (ColumnType::Json, Dialect::Sqlite) => "text".to_string(),
            (ColumnType::Json, _) => "json".to_string(),
        }
    }

    fn default_sql(&self, default: &ColumnDefault) -> String {
        match default {
            ColumnDefault::Raw(sql) => sql.clone(),
            ColumnDefault::Value(Value::Null) => "null".to_string(),
            ColumnDefault::Value(Value::Bool(b)) => match self.dialect {
                Dialect::Postgres => b.to_string(),
                _ => (if *b { "1" } else { "0" }).to_string(),
            },
            ColumnDefault::Value(Value::Int(n)) => n.to_string(),
            ColumnDefault::Value(Value::Float(f)) => f.to_string(),
            ColumnDefault::Value(Value::Text(s)) => format!("'{}'", s.replace('\'', "''")),
        }
    }

    // ==================== Tables ====================

    pub fn compile_drop(&self, table: &str) -> String {
        format!("DROP TABLE {}", self.wrap_table(table))
    }

    pub fn compile_drop_if_exists(&self, table: &str) -> String {
        format!("DROP TABLE IF EXISTS {}", self.wrap_table(table))
    }

    pub fn compile_rename(&self, from: &str, to: &str) -> String {
        match self.dialect {
            Dialect::Mysql => format!(
                "RENAME TABLE {} TO {}",
                self.wrap_table(from),
                self.wrap_table(to)
            ),
            _ => format!(
                "ALTER TABLE {} RENAME TO {}",
                self.wrap_table(from),
                self.wrap_table(to)
            ),
        }
    }

    /// Query matching `table` in the engine's catalog.
    pub fn table_exists_query(&self, table: &str) -> Query {
        let table = format!("{}{}", self.prefix, table);
        match self.dialect {
            Dialect::Sqlite => {
                let mut q = Query::table("sqlite_master");
                q.where_eq("type", "table").where_eq("name", table);
                q
            }
            Dialect::Mysql => {
                let mut q = Query::table("information_schema.tables");
                q.where_raw("table_schema = database()", Vec::new())
                    .where_eq("table_name", table);
                q
            }
            Dialect::Postgres => {
                let mut q = Query::table("information_schema.tables");
                q.where_raw("table_schema = current_schema()", Vec::new())
                    .where_eq("table_name", table);
                q
            }
        }
    }

    /// Statement listing `table`'s columns as a single `column_name` column.
    pub fn compile_column_listing(&self, table: &str) -> Compiled {
        let table = format!("{}{}", self.prefix, table);
        let schema_filter = match self.dialect {
            Dialect::Sqlite => {
                return Compiled {
                    sql: "SELECT name AS column_name FROM pragma_table_info(?)".to_string(),
                    bindings: vec![Value::Text(table)],
                };
            }
            Dialect::Mysql => "table_schema = database()",
            Dialect::Postgres => "table_schema = current_schema()",
        };
        let mut q = Query::table("information_schema.columns");
        q.select(["column_name as column_name"])
            .where_raw(schema_filter, Vec::new())
            .where_eq("table_name", table)
            .order_by("ordinal_position");
        q.compile(&Grammar::for_dialect(self.dialect))
    }
}
