//! Migrations backed by SQL files on disk.

use super::Migration;
use crate::error::{OrmError, OrmResult};
use crate::schema::Schema;
use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FileKind {
    Up,
    Down,
}

/// A migration read from `<name>.up.sql` and an optional `<name>.down.sql`.
///
/// Statements are separated by `;` and run one at a time.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SqlFileMigration {
    name: String,
    up: String,
    down: Option<String>,
}

impl SqlFileMigration {
    pub fn new(name: impl Into<String>, up: impl Into<String>, down: Option<String>) -> Self {
        Self {
            name: name.into(),
            up: up.into(),
            down,
        }
    }

    pub fn up_sql(&self) -> &str {
        &self.up
    }

    pub fn down_sql(&self) -> Option<&str> {
        self.down.as_deref()
    }
}

fn run_script(schema: &Schema<'_>, script: &str) -> OrmResult<()> {
    for statement in split_statements(script) {
        schema.statement(statement)?;
    }
    Ok(())
}

fn split_statements(script: &str) -> Vec<&str> {
    script
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}

impl Migration for SqlFileMigration {
    fn name(&self) -> &str {
        &self.name
    }

    fn up(&self, schema: &Schema<'_>) -> OrmResult<()> {
        run_script(schema, &self.up)
    }

    fn down(&self, schema: &Schema<'_>) -> Option<OrmResult<()>> {
        self.down.as_deref().map(|script| run_script(schema, script))
    }
}

fn parse_file_name(file_name: &str) -> Option<(String, FileKind)> {
    let (stem, kind) = if let Some(stem) = file_name.strip_suffix(".down.sql") {
        (stem, FileKind::Down)
    } else if let Some(stem) = file_name.strip_suffix(".up.sql") {
        (stem, FileKind::Up)
    } else {
        (file_name.strip_suffix(".sql")?, FileKind::Up)
    };
    (!stem.is_empty()).then(|| (stem.to_string(), kind))
}

#[derive(Default)]
struct PartialMigration {
    up: Option<PathBuf>,
    down: Option<PathBuf>,
}

fn read(path: &Path) -> OrmResult<String> {
    fs::read_to_string(path)
        .map_err(|e| OrmError::Other(format!("failed to read migration {}: {e}", path.display())))
}

/// Load every migration in `dir`, sorted by name.
///
/// Supported file names:
/// - `2024_01_01_000000_create_customers.sql` (up)
/// - `2024_01_01_000000_create_customers.up.sql` (up)
/// - `2024_01_01_000000_create_customers.down.sql` (down)
pub fn scan_migrations_dir(dir: impl AsRef<Path>) -> OrmResult<Vec<SqlFileMigration>> {
    let dir = dir.as_ref();
    let entries = fs::read_dir(dir).map_err(|e| {
        OrmError::Other(format!(
            "failed to read migrations dir {}: {e}",
            dir.display()
        ))
    })?;

    let mut by_name: BTreeMap<String, PartialMigration> = BTreeMap::new();

    for entry in entries {
        let entry = entry.map_err(|e| {
            OrmError::Other(format!("failed to read entry in {}: {e}", dir.display()))
        })?;
        let path = entry.path();
        if !path.is_file() {
            continue;
        }
        let Some(file_name) = path.file_name().and_then(|s| s.to_str()) else {
            continue;
        };
        let Some((name, kind)) = parse_file_name(file_name) else {
            continue;
        };

        let slot = by_name.entry(name.clone()).or_default();
        let target = match kind {
            FileKind::Up => &mut slot.up,
            FileKind::Down => &mut slot.down,
        };
        if target.is_some() {
            let kind = if kind == FileKind::Up { "up" } else { "down" };
            return Err(OrmError::Other(format!(
                "duplicate {kind} migration for {name}"
            )));
        }
        *target = Some(path);
    }

    let mut out = Vec::with_capacity(by_name.len());
    for (name, partial) in by_name {
        let Some(up) = partial.up else {
            return Err(OrmError::Other(format!(
                "migration {name} has down.sql but no up.sql"
            )));
        };
        let down = partial.down.as_deref().map(read).transpose()?;
        out.push(SqlFileMigration::new(name, read(&up)?, down));
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_file_names() {
        assert_eq!(
            parse_file_name("2024_01_01_000000_users.up.sql"),
            Some(("2024_01_01_000000_users".to_string(), FileKind::Up))
        );
        assert_eq!(
            parse_file_name("2024_01_01_000000_users.down.sql"),
            Some(("2024_01_01_000000_users".to_string(), FileKind::Down))
        );
        assert_eq!(
            parse_file_name("2024_01_01_000000_users.sql"),
            Some(("2024_01_01_000000_users".to_string(), FileKind::Up))
        );
        assert_eq!(parse_file_name("README.md"), None);
        assert_eq!(parse_file_name(".sql"), None);
    }

    #[test]
    fn splits_statements() {
        assert_eq!(
            split_statements("CREATE TABLE a (id int);\n\nCREATE INDEX i ON a (id);\n"),
            vec!["CREATE TABLE a (id int)", "CREATE INDEX i ON a (id)"]
        );
    }

    #[test]
    fn scans_directory() {
        let dir = tempfile::tempdir().unwrap();
        let write = |name: &str, body: &str| fs::write(dir.path().join(name), body).unwrap();
        write("2024_01_02_000000_create_invoices.up.sql", "CREATE TABLE invoices (id int)");
        write("2024_01_02_000000_create_invoices.down.sql", "DROP TABLE invoices");
        write("2024_01_01_000000_create_customers.sql", "CREATE TABLE customers (id int)");
        write("notes.txt", "ignored");

        let migrations = scan_migrations_dir(dir.path()).unwrap();
        let names: Vec<&str> = migrations.iter().map(|m| m.name()).collect();
        assert_eq!(
            names,
            vec![
                "2024_01_01_000000_create_customers",
                "2024_01_02_000000_create_invoices"
            ]
        );
        assert_eq!(migrations[0].down_sql(), None);
        assert_eq!(migrations[1].down_sql(), Some("DROP TABLE invoices"));
    }

    #[test]
    fn down_without_up_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        fs::write(dir.path().join("2024_01_01_000000_x.down.sql"), "DROP TABLE x").unwrap();
        assert!(scan_migrations_dir(dir.path()).is_err());
    }
}
