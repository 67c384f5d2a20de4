//! Database and migration configuration.
//!
//! ```toml
//! driver = "sqlite"
//! database = "${APP_DB_PATH}"
//! prefix = ""
//!
//! [migrations]
//! table = "migrations"
//! path = "database/migrations"
//! transactional = true
//! ```
//!
//! `${VAR}` references in string values are replaced with the environment variable's
//! value after parsing; a missing variable is a configuration error.

use crate::dialect::Dialect;
use crate::error::{OrmError, OrmResult};
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

pub const DEFAULT_MIGRATION_TABLE: &str = "migrations";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    pub driver: Dialect,
    /// Database name, or the file path for SQLite (`:memory:` allowed).
    pub database: String,
    #[serde(default)]
    pub charset: Option<String>,
    #[serde(default)]
    pub collation: Option<String>,
    /// Prefix prepended to table names by the schema builder.
    #[serde(default)]
    pub prefix: String,
    #[serde(default)]
    pub migrations: MigrationConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MigrationConfig {
    #[serde(default = "default_migration_table")]
    pub table: String,
    /// Directory of `.up.sql` / `.down.sql` files.
    #[serde(default)]
    pub path: Option<PathBuf>,
    /// Run each migration inside its own transaction.
    #[serde(default = "default_true")]
    pub transactional: bool,
}

impl Default for MigrationConfig {
    fn default() -> Self {
        Self {
            table: default_migration_table(),
            path: None,
            transactional: true,
        }
    }
}

fn default_migration_table() -> String {
    DEFAULT_MIGRATION_TABLE.to_string()
}

fn default_true() -> bool {
    true
}

impl DatabaseConfig {
    pub fn new(driver: Dialect, database: impl Into<String>) -> Self {
        Self {
            driver,
            database: database.into(),
            charset: None,
            collation: None,
            prefix: String::new(),
            migrations: MigrationConfig::default(),
        }
    }

    /// Read, expand and validate a TOML config file. A relative migration path is
    /// resolved against the file's directory.
    pub fn load(path: impl AsRef<Path>) -> OrmResult<Self> {
        let path = path.as_ref();
        let raw = std::fs::read_to_string(path).map_err(|e| {
            OrmError::Config(format!("failed to read config file {}: {e}", path.display()))
        })?;
        let mut config = Self::from_toml_str(&raw)?;

        let dir = path.parent().unwrap_or_else(|| Path::new("."));
        if let Some(migrations) = &config.migrations.path {
            if migrations.is_relative() {
                config.migrations.path = Some(dir.join(migrations));
            }
        }
        Ok(config)
    }

    pub fn from_toml_str(raw: &str) -> OrmResult<Self> {
        let mut config: Self = toml::from_str(raw)?;
        config.expand_env()?;
        config.validate()?;
        Ok(config)
    }

    fn expand_env(&mut self) -> OrmResult<()> {
        self.database = expand_env_vars(&self.database)?;
        self.prefix = expand_env_vars(&self.prefix)?;
        if let Some(charset) = &mut self.charset {
            *charset = expand_env_vars(charset)?;
        }
        if let Some(collation) = &mut self.collation {
            *collation = expand_env_vars(collation)?;
        }
        self.migrations.table = expand_env_vars(&self.migrations.table)?;
        if let Some(path) = &self.migrations.path {
            let expanded = expand_env_vars(&path.to_string_lossy())?;
            self.migrations.path = Some(PathBuf::from(expanded));
        }
        Ok(())
    }

    pub fn validate(&self) -> OrmResult<()> {
        if self.database.trim().is_empty() {
            return Err(OrmError::Config("database must not be empty".to_string()));
        }
        if !is_identifier(&self.migrations.table, true) {
            return Err(OrmError::Config(format!(
                "invalid migrations.table: {}",
                self.migrations.table
            )));
        }
        if !self.prefix.is_empty() && !is_identifier(&self.prefix, false) {
            return Err(OrmError::Config(format!("invalid prefix: {}", self.prefix)));
        }
        for (key, value) in [("charset", &self.charset), ("collation", &self.collation)] {
            if let Some(value) = value.as_deref().filter(|v| !is_identifier(v, false)) {
                return Err(OrmError::Config(format!("invalid {key}: {value}")));
            }
        }
        if (self.charset.is_some() || self.collation.is_some()) && !self.driver.supports_charset() {
            tracing::warn!(
                target: "quarry.config",
                driver = %self.driver,
                "charset/collation only apply to mysql and will be ignored"
            );
        }
        Ok(())
    }
}

fn is_identifier(s: &str, allow_dots: bool) -> bool {
    let parts: Vec<&str> = if allow_dots {
        s.split('.').collect()
    } else {
        vec![s]
    };
    parts.iter().all(|part| {
        !part.is_empty() && part.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
    })
}

fn env_reference() -> &'static Regex {
    static ENV_REF: OnceLock<Regex> = OnceLock::new();
    ENV_REF.get_or_init(|| {
        Regex::new(r"\$\{([^}]*)(\}?)").expect("invalid built-in env reference regex")
    })
}

/// Replace `${VAR}` with the value of the environment variable `VAR`.
///
/// Every unset variable is reported in one error. A bare `$` is left alone.
pub fn expand_env_vars(input: &str) -> OrmResult<String> {
    let mut out = String::with_capacity(input.len());
    let mut missing: Vec<&str> = Vec::new();
    let mut tail = 0;

    for caps in env_reference().captures_iter(input) {
        let (Some(whole), Some(name)) = (caps.get(0), caps.get(1)) else {
            continue;
        };
        let name = name.as_str();
        if caps.get(2).is_none_or(|close| close.is_empty()) {
            return Err(OrmError::Config(format!(
                "unterminated env var reference: ${{{name}"
            )));
        }
        if !is_identifier(name, false) || name.starts_with(|c: char| c.is_ascii_digit()) {
            return Err(OrmError::Config(format!(
                "invalid env var reference: ${{{name}}}"
            )));
        }

        out.push_str(&input[tail..whole.start()]);
        match std::env::var(name) {
            Ok(value) => out.push_str(&value),
            Err(_) => missing.push(name),
        }
        tail = whole.end();
    }

    if !missing.is_empty() {
        return Err(OrmError::Config(format!(
            "missing env vars for config expansion: {}",
            missing.join(", ")
        )));
    }
    out.push_str(&input[tail..]);
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_config_with_defaults() {
        let config = DatabaseConfig::from_toml_str(
            r#"
            driver = "pgsql"
            database = "shop"
            "#,
        )
        .unwrap();
        assert_eq!(config.driver, Dialect::Postgres);
        assert_eq!(config.migrations, MigrationConfig::default());
        assert_eq!(config.migrations.table, "migrations");
        assert!(config.migrations.transactional);
    }

    #[test]
    fn expands_env_vars() {
        // SAFETY: test-only variable with a unique name.
        unsafe { std::env::set_var("QUARRY_TEST_DB_NAME", "billing") };
        let config = DatabaseConfig::from_toml_str(
            r#"
            driver = "mysql"
            database = "${QUARRY_TEST_DB_NAME}_prod"
            charset = "utf8mb4"

            [migrations]
            table = "schema_migrations"
            transactional = false
            "#,
        )
        .unwrap();
        assert_eq!(config.database, "billing_prod");
        assert_eq!(config.charset.as_deref(), Some("utf8mb4"));
        assert_eq!(config.migrations.table, "schema_migrations");
        assert!(!config.migrations.transactional);
    }

    #[test]
    fn rejects_bad_input() {
        let unknown_driver = DatabaseConfig::from_toml_str(
            r#"
            driver = "oracle"
            database = "x"
            "#,
        );
        assert!(matches!(unknown_driver, Err(OrmError::Config(_))));

        let missing_env = DatabaseConfig::from_toml_str(
            r#"
            driver = "sqlite"
            database = "${QUARRY_TEST_SURELY_UNSET_VAR}"
            "#,
        );
        assert!(matches!(missing_env, Err(OrmError::Config(_))));

        let bad_table = DatabaseConfig::from_toml_str(
            r#"
            driver = "sqlite"
            database = ":memory:"

            [migrations]
            table = "drop table; --"
            "#,
        );
        assert!(matches!(bad_table, Err(OrmError::Config(_))));

        let bad_collation = DatabaseConfig::from_toml_str(
            r#"
            driver = "mysql"
            database = "shop"
            collation = "utf8mb4' --"
            "#,
        );
        assert!(matches!(bad_collation, Err(OrmError::Config(_))));
    }

    #[test]
    fn unterminated_reference_is_an_error() {
        assert!(expand_env_vars("${OPEN").is_err());
        assert!(expand_env_vars("${}").is_err());
        assert!(expand_env_vars("${1ST}").is_err());
        assert!(expand_env_vars("${A B}").is_err());
        assert_eq!(expand_env_vars("plain $HOME").unwrap(), "plain $HOME");
    }

    #[test]
    fn reports_every_missing_variable() {
        // SAFETY: test-only variable with a unique name.
        unsafe { std::env::set_var("QUARRY_TEST_ENV_HOST", "db") };
        assert_eq!(
            expand_env_vars("${QUARRY_TEST_ENV_HOST}:${QUARRY_TEST_ENV_HOST}/x").unwrap(),
            "db:db/x"
        );

        let err = expand_env_vars("${QUARRY_TEST_UNSET_A}/${QUARRY_TEST_ENV_HOST}/${QUARRY_TEST_UNSET_B}")
            .unwrap_err();
        let message = err.to_string();
        assert!(message.contains("QUARRY_TEST_UNSET_A, QUARRY_TEST_UNSET_B"), "{message}");
    }

    #[test]
    fn load_resolves_relative_migration_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("quarry.toml");
        std::fs::write(
            &path,
            "driver = \"sqlite\"\ndatabase = \":memory:\"\n\n[migrations]\npath = \"migrations\"\n",
        )
        .unwrap();
        let config = DatabaseConfig::load(&path).unwrap();
        assert_eq!(config.migrations.path, Some(dir.path().join("migrations")));
    }
}
