//! Column and foreign-key definitions collected by a [`Blueprint`](super::Blueprint).

use crate::value::Value;

/// Logical column type; each dialect maps it to its own SQL type.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnType {
    /// Auto-incrementing `int` primary key.
    Increments,
    /// Auto-incrementing `bigint` primary key.
    BigIncrements,
    Integer,
    BigInteger,
    SmallInteger,
    String(u32),
    Text,
    Boolean,
    Decimal { precision: u8, scale: u8 },
    Float,
    Date,
    DateTime,
    Timestamp,
    Json,
}

impl ColumnType {
    pub fn is_integer(&self) -> bool {
        matches!(
            self,
            ColumnType::Integer
                | ColumnType::BigInteger
                | ColumnType::SmallInteger
                | ColumnType::Increments
                | ColumnType::BigIncrements
        )
    }
}

/// Column default: a literal value or a raw SQL expression.
#[derive(Debug, Clone, PartialEq)]
pub enum ColumnDefault {
    Value(Value),
    Raw(String),
}

/// A column being added to a table.
///
/// Modifiers chain on the definition returned by the blueprint:
///
/// ```ignore
/// table.foreign_id("customer_id").constrained().on_delete("cascade");
/// table.string("email", 191).unique();
/// ```
#[derive(Debug, Clone, PartialEq)]
pub struct ColumnDefinition {
    pub name: String,
    pub kind: ColumnType,
    pub nullable: bool,
    pub default: Option<ColumnDefault>,
    pub unsigned: bool,
    pub auto_increment: bool,
    pub primary: bool,
    pub unique: bool,
    pub index: bool,
    pub foreign: Option<ForeignKeyDefinition>,
}

impl ColumnDefinition {
    pub fn new(name: &str, kind: ColumnType) -> Self {
        let auto_increment = matches!(kind, ColumnType::Increments | ColumnType::BigIncrements);
        Self {
            name: name.to_string(),
            kind,
            nullable: false,
            default: None,
            unsigned: auto_increment,
            auto_increment,
            primary: auto_increment,
            unique: false,
            index: false,
            foreign: None,
        }
    }

    pub fn nullable(&mut self) -> &mut Self {
        self.nullable = true;
        self
    }

    pub fn default(&mut self, value: impl Into<Value>) -> &mut Self {
        self.default = Some(ColumnDefault::Value(value.into()));
        self
    }

    /// Default given as a SQL expression (`CURRENT_TIMESTAMP`).
    pub fn default_raw(&mut self, sql: &str) -> &mut Self {
        self.default = Some(ColumnDefault::Raw(sql.to_string()));
        self
    }

    pub fn unsigned(&mut self) -> &mut Self {
        self.unsigned = true;
        self
    }

    /// Auto-incrementing primary key (integer columns only).
    pub fn auto_increment(&mut self) -> &mut Self {
        self.auto_increment = true;
        self.primary = true;
        self
    }

    pub fn primary(&mut self) -> &mut Self {
        self.primary = true;
        self
    }

    pub fn unique(&mut self) -> &mut Self {
        self.unique = true;
        self
    }

    pub fn index(&mut self) -> &mut Self {
        self.index = true;
        self
    }

    /// Start a foreign key on this column referencing `column`; finish with [`on`](Self::on).
    pub fn references(&mut self, column: &str) -> &mut Self {
        let foreign = self.foreign_mut();
        foreign.references = vec![column.to_string()];
        self
    }

    pub fn on(&mut self, table: &str) -> &mut Self {
        self.foreign_mut().on = table.to_string();
        self
    }

    pub fn on_delete(&mut self, action: &str) -> &mut Self {
        self.foreign_mut().on_delete = Some(action.to_string());
        self
    }

    pub fn on_update(&mut self, action: &str) -> &mut Self {
        self.foreign_mut().on_update = Some(action.to_string());
        self
    }

    /// Reference `id` on the table guessed from the column name
    /// (`customer_id` → `customers.id`).
    pub fn constrained(&mut self) -> &mut Self {
        let stem = self.name.strip_suffix("_id").unwrap_or(&self.name);
        let table = pluralize(stem);
        self.references("id").on(&table)
    }

    fn foreign_mut(&mut self) -> &mut ForeignKeyDefinition {
        let column = self.name.clone();
        self.foreign
            .get_or_insert_with(|| ForeignKeyDefinition::new(vec![column]))
    }
}

/// A foreign-key constraint.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct ForeignKeyDefinition {
    pub name: Option<String>,
    pub columns: Vec<String>,
    pub on: String,
    pub references: Vec<String>,
    pub on_delete: Option<String>,
    pub on_update: Option<String>,
}

impl ForeignKeyDefinition {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            references: vec!["id".to_string()],
            ..Self::default()
        }
    }

    /// Constraint name; generated from the table and columns when unset.
    pub fn name(&mut self, name: &str) -> &mut Self {
        self.name = Some(name.to_string());
        self
    }

    pub fn references(&mut self, columns: &[&str]) -> &mut Self {
        self.references = columns.iter().map(|c| c.to_string()).collect();
        self
    }

    pub fn on(&mut self, table: &str) -> &mut Self {
        self.on = table.to_string();
        self
    }

    pub fn on_delete(&mut self, action: &str) -> &mut Self {
        self.on_delete = Some(action.to_string());
        self
    }

    pub fn on_update(&mut self, action: &str) -> &mut Self {
        self.on_update = Some(action.to_string());
        self
    }
}

fn pluralize(word: &str) -> String {
    if let Some(stem) = word.strip_suffix('y') {
        if !stem.ends_with(['a', 'e', 'i', 'o', 'u']) {
            return format!("{stem}ies");
        }
    }
    if word.ends_with(['s', 'x', 'z']) || word.ends_with("ch") || word.ends_with("sh") {
        return format!("{word}es");
    }
    format!("{word}s")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constrained_guesses_table() {
        let mut column = ColumnDefinition::new("customer_id", ColumnType::BigInteger);
        column.constrained().on_delete("cascade");
        let foreign = column.foreign.unwrap();
        assert_eq!(foreign.on, "customers");
        assert_eq!(foreign.references, vec!["id"]);
        assert_eq!(foreign.columns, vec!["customer_id"]);
        assert_eq!(foreign.on_delete.as_deref(), Some("cascade"));
    }

    #[test]
    fn pluralizes_common_endings() {
        assert_eq!(pluralize("category"), "categories");
        assert_eq!(pluralize("day"), "days");
        assert_eq!(pluralize("address"), "addresses");
        assert_eq!(pluralize("invoice"), "invoices");
    }

    #[test]
    fn increments_are_primary_keys() {
        let column = ColumnDefinition::new("id", ColumnType::BigIncrements);
        assert!(column.auto_increment && column.primary && column.unsigned);
        assert!(!column.nullable);
    }
}
