//! Versioned schema migrations.
//!
//! Migrations are registered with a [`Migrator`] and applied in name order. Each `run`
//! applies every pending migration as one batch; `rollback` reverts whole batches, newest
//! first.
//!
//! ```ignore
//! use quarry::migrate::{DatabaseMigrationRepository, Migration, Migrator};
//! use quarry::schema::Schema;
//!
//! struct CreateCustomers;
//!
//! impl Migration for CreateCustomers {
//!     fn name(&self) -> &str { "2024_01_01_000000_create_customers" }
//!
//!     fn up(&self, schema: &Schema<'_>) -> quarry::OrmResult<()> {
//!         schema.create("customers", |t| {
//!             t.id();
//!             t.string("name", 120);
//!             t.timestamps();
//!         })
//!     }
//!
//!     fn down(&self, schema: &Schema<'_>) -> Option<quarry::OrmResult<()>> {
//!         Some(schema.drop_if_exists("customers"))
//!     }
//! }
//!
//! let mut migrator = Migrator::new(DatabaseMigrationRepository::default(), Default::default());
//! migrator.add(CreateCustomers);
//! let ran = migrator.run(&conn)?;
//! ```

mod file;
mod repository;

pub use file::{SqlFileMigration, scan_migrations_dir};
pub use repository::{DatabaseMigrationRepository, MigrationRecord, MigrationRepository};

use crate::config::{DatabaseConfig, MigrationConfig};
use crate::connection::Connection;
use crate::error::{OrmError, OrmResult};
use crate::schema::Schema;
use crate::transaction::transaction;
use regex::Regex;
use serde::Serialize;
use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::OnceLock;

/// A reversible schema change.
pub trait Migration {
    /// Unique name with a sortable `YYYY_MM_DD_HHMMSS_` prefix.
    fn name(&self) -> &str;

    fn up(&self, schema: &Schema<'_>) -> OrmResult<()>;

    /// Revert [`up`](Self::up). `None` marks the migration irreversible.
    fn down(&self, _schema: &Schema<'_>) -> Option<OrmResult<()>> {
        None
    }
}

/// Status of one registered migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationState {
    pub name: String,
    /// Batch the migration was applied in; `None` while pending.
    pub batch: Option<i64>,
}

impl MigrationState {
    pub fn is_applied(&self) -> bool {
        self.batch.is_some()
    }
}

fn name_pattern() -> &'static Regex {
    static NAME_RE: OnceLock<Regex> = OnceLock::new();
    NAME_RE.get_or_init(|| {
        Regex::new(r"^\d{4}_\d{2}_\d{2}_\d{6}_\w+$").expect("invalid built-in migration name regex")
    })
}

/// Whether `name` carries the `YYYY_MM_DD_HHMMSS_description` shape.
pub fn is_valid_name(name: &str) -> bool {
    name_pattern().is_match(name)
}

/// Applies and reverts registered migrations, recording them in a repository.
pub struct Migrator<R: MigrationRepository> {
    repository: R,
    config: MigrationConfig,
    /// Handed to each migration's [`Schema`] when set.
    database: Option<DatabaseConfig>,
    migrations: Vec<Box<dyn Migration>>,
}

impl Migrator<DatabaseMigrationRepository> {
    /// Migrator recording into `config.migrations.table`, with the SQL files under
    /// `config.migrations.path` registered. Migrations see a [`Schema`] carrying the
    /// config's prefix, charset and collation.
    pub fn from_config(config: &DatabaseConfig) -> OrmResult<Self> {
        config.validate()?;
        let mut migrator = Self::new(
            DatabaseMigrationRepository::new(&config.migrations.table),
            config.migrations.clone(),
        );
        migrator.database = Some(config.clone());
        if let Some(path) = &config.migrations.path {
            migrator.add_path(path)?;
        }
        Ok(migrator)
    }
}

impl<R: MigrationRepository> Migrator<R> {
    pub fn new(repository: R, config: MigrationConfig) -> Self {
        Self {
            repository,
            config,
            database: None,
            migrations: Vec::new(),
        }
    }

    pub fn repository(&self) -> &R {
        &self.repository
    }

    pub fn config(&self) -> &MigrationConfig {
        &self.config
    }

    pub fn add(&mut self, migration: impl Migration + 'static) -> &mut Self {
        self.migrations.push(Box::new(migration));
        self
    }

    pub fn add_boxed(&mut self, migration: Box<dyn Migration>) -> &mut Self {
        self.migrations.push(migration);
        self
    }

    /// Register every SQL file migration in `dir`.
    pub fn add_path(&mut self, dir: impl AsRef<Path>) -> OrmResult<&mut Self> {
        for migration in scan_migrations_dir(dir)? {
            self.add(migration);
        }
        Ok(self)
    }

    /// Registered migrations sorted by name.
    fn sorted(&self) -> Vec<&dyn Migration> {
        let mut sorted: Vec<&dyn Migration> = self.migrations.iter().map(|m| m.as_ref()).collect();
        sorted.sort_by(|a, b| a.name().cmp(b.name()));
        sorted
    }

    fn find(&self, name: &str) -> Option<&dyn Migration> {
        self.migrations
            .iter()
            .find(|m| m.name() == name)
            .map(|m| m.as_ref())
    }

    /// Check that every name is well-formed and unique.
    pub fn validate(&self) -> OrmResult<()> {
        let mut seen = HashSet::new();
        for migration in &self.migrations {
            let name = migration.name();
            if !is_valid_name(name) {
                return Err(OrmError::validation(format!(
                    "invalid migration name '{name}': expected YYYY_MM_DD_HHMMSS_description"
                )));
            }
            if !seen.insert(name) {
                return Err(OrmError::validation(format!(
                    "duplicate migration name '{name}'"
                )));
            }
        }
        Ok(())
    }

    fn schema<'c>(&self, conn: &'c dyn Connection) -> OrmResult<Schema<'c>> {
        match &self.database {
            Some(database) => Schema::from_config(conn, database),
            None => Ok(Schema::new(conn)),
        }
    }

    fn ensure_repository(&self, conn: &dyn Connection) -> OrmResult<()> {
        if !self.repository.repository_exists(conn)? {
            tracing::info!(target: "quarry.migrate", "creating migration repository");
            self.repository.create_repository(conn)?;
        }
        Ok(())
    }

    fn within<T, F>(&self, conn: &dyn Connection, body: F) -> OrmResult<T>
    where
        F: FnOnce(&dyn Connection) -> OrmResult<T>,
    {
        if self.config.transactional {
            transaction(conn, body)
        } else {
            body(conn)
        }
    }

    /// Apply all pending migrations as a new batch. Returns the names applied.
    pub fn run(&self, conn: &dyn Connection) -> OrmResult<Vec<String>> {
        self.validate()?;
        self.ensure_repository(conn)?;

        let applied: HashSet<String> = self.repository.get_applied(conn)?.into_iter().collect();
        let pending: Vec<&dyn Migration> = self
            .sorted()
            .into_iter()
            .filter(|m| !applied.contains(m.name()))
            .collect();
        if pending.is_empty() {
            tracing::info!(target: "quarry.migrate", "nothing to migrate");
            return Ok(Vec::new());
        }

        let batch = self.repository.next_batch_number(conn)?;
        let mut ran = Vec::with_capacity(pending.len());
        for migration in pending {
            let name = migration.name();
            tracing::info!(target: "quarry.migrate", migration = name, batch, "migrating");
            self.within(conn, |conn| {
                migration.up(&self.schema(conn)?)?;
                self.repository.log(conn, name, batch)
            })
            .map_err(|e| OrmError::migration(name, e))?;
            tracing::info!(target: "quarry.migrate", migration = name, batch, "migrated");
            ran.push(name.to_string());
        }
        Ok(ran)
    }

    /// Revert the `steps` most recent batches (at least one). Returns the names reverted.
    pub fn rollback(&self, conn: &dyn Connection, steps: usize) -> OrmResult<Vec<String>> {
        self.ensure_repository(conn)?;
        let records = self
            .repository
            .records_for_rollback(conn, steps.max(1))?;
        self.revert(conn, records.into_iter().map(|r| r.migration))
    }

    /// Revert every applied migration. Returns the names reverted.
    pub fn reset(&self, conn: &dyn Connection) -> OrmResult<Vec<String>> {
        self.ensure_repository(conn)?;
        let mut records = self.repository.get_records(conn)?;
        records.reverse();
        self.revert(conn, records.into_iter().map(|r| r.migration))
    }

    /// [`reset`](Self::reset) then [`run`](Self::run). Returns the names applied.
    pub fn refresh(&self, conn: &dyn Connection) -> OrmResult<Vec<String>> {
        self.reset(conn)?;
        self.run(conn)
    }

    fn revert(
        &self,
        conn: &dyn Connection,
        names: impl Iterator<Item = String>,
    ) -> OrmResult<Vec<String>> {
        let mut reverted = Vec::new();
        for name in names {
            let Some(migration) = self.find(&name) else {
                tracing::warn!(target: "quarry.migrate", migration = %name, "migration not registered; skipped");
                continue;
            };
            tracing::info!(target: "quarry.migrate", migration = %name, "rolling back");
            let done = self
                .within(conn, |conn| match migration.down(&self.schema(conn)?) {
                    None => Ok(false),
                    Some(result) => {
                        result?;
                        self.repository.delete(conn, &name)?;
                        Ok(true)
                    }
                })
                .map_err(|e| OrmError::migration(&name, e))?;
            if done {
                tracing::info!(target: "quarry.migrate", migration = %name, "rolled back");
                reverted.push(name);
            } else {
                tracing::warn!(target: "quarry.migrate", migration = %name, "migration has no down(); skipped");
            }
        }
        Ok(reverted)
    }

    /// Every registered migration with its batch, sorted by name.
    pub fn status(&self, conn: &dyn Connection) -> OrmResult<Vec<MigrationState>> {
        let batches: HashMap<String, i64> = if self.repository.repository_exists(conn)? {
            self.repository
                .get_records(conn)?
                .into_iter()
                .map(|r| (r.migration, r.batch))
                .collect()
        } else {
            HashMap::new()
        };
        Ok(self
            .sorted()
            .into_iter()
            .map(|m| MigrationState {
                name: m.name().to_string(),
                batch: batches.get(m.name()).copied(),
            })
            .collect())
    }
}
