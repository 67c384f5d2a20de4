//! Table blueprints: the columns and commands of one CREATE or ALTER.

use super::column::{ColumnDefinition, ColumnType, ForeignKeyDefinition};
use super::grammar::SchemaGrammar;
use crate::dialect::Dialect;

/// Whether the blueprint creates a new table or alters an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlueprintMode {
    Create,
    Alter,
}

/// Kind of a multi-column index.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexKind {
    Primary,
    Unique,
    Index,
}

impl IndexKind {
    pub(crate) fn suffix(self) -> &'static str {
        match self {
            IndexKind::Primary => "primary",
            IndexKind::Unique => "unique",
            IndexKind::Index => "index",
        }
    }
}

/// A table-level command.
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Index {
        kind: IndexKind,
        name: Option<String>,
        columns: Vec<String>,
    },
    DropColumn(Vec<String>),
    RenameColumn { from: String, to: String },
    DropIndex(String),
    DropUnique(String),
    DropForeign(String),
}

/// Columns and commands for a single table.
///
/// ```ignore
/// Schema::new(&conn).create("invoices", |table| {
///     table.id();
///     table.foreign_id("customer_id").constrained().on_delete("cascade");
///     table.string("number", 32).unique();
///     table.decimal("total", 10, 2).default(0);
///     table.timestamps();
///     table.soft_deletes();
/// })?;
/// ```
#[derive(Debug, Clone)]
pub struct Blueprint {
    pub(crate) table: String,
    pub(crate) mode: BlueprintMode,
    pub(crate) columns: Vec<ColumnDefinition>,
    pub(crate) commands: Vec<Command>,
    pub(crate) foreign_keys: Vec<ForeignKeyDefinition>,
    pub(crate) charset: Option<String>,
    pub(crate) collation: Option<String>,
    pub(crate) engine: Option<String>,
}

impl Blueprint {
    pub fn new(table: &str, mode: BlueprintMode) -> Self {
        Self {
            table: table.to_string(),
            mode,
            columns: Vec::new(),
            commands: Vec::new(),
            foreign_keys: Vec::new(),
            charset: None,
            collation: None,
            engine: None,
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn mode(&self) -> BlueprintMode {
        self.mode
    }

    pub fn columns(&self) -> &[ColumnDefinition] {
        &self.columns
    }

    pub fn commands(&self) -> &[Command] {
        &self.commands
    }

    /// Render the DDL statements for `dialect`.
    pub fn to_sql(&self, dialect: Dialect) -> Vec<String> {
        SchemaGrammar::new(dialect).compile(self)
    }

    fn add_column(&mut self, name: &str, kind: ColumnType) -> &mut ColumnDefinition {
        self.columns.push(ColumnDefinition::new(name, kind));
        let last = self.columns.len() - 1;
        &mut self.columns[last]
    }

    // ==================== Column types ====================

    /// `id` big auto-increment primary key.
    pub fn id(&mut self) -> &mut ColumnDefinition {
        self.big_increments("id")
    }

    pub fn increments(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Increments)
    }

    pub fn big_increments(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::BigIncrements)
    }

    pub fn integer(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Integer)
    }

    pub fn big_integer(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::BigInteger)
    }

    pub fn small_integer(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::SmallInteger)
    }

    pub fn unsigned_integer(&mut self, name: &str) -> &mut ColumnDefinition {
        self.integer(name).unsigned()
    }

    pub fn unsigned_big_integer(&mut self, name: &str) -> &mut ColumnDefinition {
        self.big_integer(name).unsigned()
    }

    /// Unsigned big integer meant to hold another table's `id`.
    pub fn foreign_id(&mut self, name: &str) -> &mut ColumnDefinition {
        self.unsigned_big_integer(name)
    }

    pub fn string(&mut self, name: &str, length: u32) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::String(length))
    }

    pub fn text(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Text)
    }

    pub fn boolean(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Boolean)
    }

    pub fn decimal(&mut self, name: &str, precision: u8, scale: u8) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Decimal { precision, scale })
    }

    pub fn float(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Float)
    }

    pub fn date(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Date)
    }

    pub fn date_time(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::DateTime)
    }

    pub fn timestamp(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Timestamp)
    }

    pub fn json(&mut self, name: &str) -> &mut ColumnDefinition {
        self.add_column(name, ColumnType::Json)
    }

    /// Nullable `created_at` and `updated_at`.
    pub fn timestamps(&mut self) {
        self.timestamp("created_at").nullable();
        self.timestamp("updated_at").nullable();
    }

    /// Nullable `deleted_at`.
    pub fn soft_deletes(&mut self) -> &mut ColumnDefinition {
        self.timestamp("deleted_at").nullable()
    }

    // ==================== Table commands ====================

    pub fn primary(&mut self, columns: &[&str]) -> &mut Self {
        self.add_index(IndexKind::Primary, columns, None)
    }

    pub fn unique(&mut self, columns: &[&str]) -> &mut Self {
        self.add_index(IndexKind::Unique, columns, None)
    }

    pub fn index(&mut self, columns: &[&str]) -> &mut Self {
        self.add_index(IndexKind::Index, columns, None)
    }

    /// Index with an explicit name.
    pub fn named_index(&mut self, kind: IndexKind, columns: &[&str], name: &str) -> &mut Self {
        self.add_index(kind, columns, Some(name))
    }

    fn add_index(&mut self, kind: IndexKind, columns: &[&str], name: Option<&str>) -> &mut Self {
        self.commands.push(Command::Index {
            kind,
            name: name.map(str::to_string),
            columns: columns.iter().map(|c| c.to_string()).collect(),
        });
        self
    }

    /// Foreign key over `columns`; defaults to referencing `id`.
    pub fn foreign(&mut self, columns: &[&str]) -> &mut ForeignKeyDefinition {
        self.foreign_keys.push(ForeignKeyDefinition::new(
            columns.iter().map(|c| c.to_string()).collect(),
        ));
        let last = self.foreign_keys.len() - 1;
        &mut self.foreign_keys[last]
    }

    pub fn drop_column(&mut self, columns: &[&str]) -> &mut Self {
        self.commands.push(Command::DropColumn(
            columns.iter().map(|c| c.to_string()).collect(),
        ));
        self
    }

    pub fn rename_column(&mut self, from: &str, to: &str) -> &mut Self {
        self.commands.push(Command::RenameColumn {
            from: from.to_string(),
            to: to.to_string(),
        });
        self
    }

    pub fn drop_index(&mut self, name: &str) -> &mut Self {
        self.commands.push(Command::DropIndex(name.to_string()));
        self
    }

    pub fn drop_unique(&mut self, name: &str) -> &mut Self {
        self.commands.push(Command::DropUnique(name.to_string()));
        self
    }

    pub fn drop_foreign(&mut self, name: &str) -> &mut Self {
        self.commands.push(Command::DropForeign(name.to_string()));
        self
    }

    // ==================== Table options ====================

    pub fn charset(&mut self, charset: &str) -> &mut Self {
        self.charset = Some(charset.to_string());
        self
    }

    pub fn collation(&mut self, collation: &str) -> &mut Self {
        self.collation = Some(collation.to_string());
        self
    }

    pub fn engine(&mut self, engine: &str) -> &mut Self {
        self.engine = Some(engine.to_string());
        self
    }
}
