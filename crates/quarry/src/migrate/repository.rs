//! Where applied migrations are recorded.

use crate::config::DEFAULT_MIGRATION_TABLE;
use crate::connection::Connection;
use crate::error::OrmResult;
use crate::query::{Query, Values};
use crate::row::{FromRow, Row, RowExt};
use crate::schema::Schema;
use crate::value::Value;
use serde::Serialize;

/// One applied migration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MigrationRecord {
    pub migration: String,
    pub batch: i64,
    pub applied_at: Option<String>,
}

impl FromRow for MigrationRecord {
    fn from_row(row: &Row) -> OrmResult<Self> {
        Ok(Self {
            migration: row.try_get_column("migration")?,
            batch: row.try_get_column("batch")?,
            applied_at: row.try_get_column("applied_at")?,
        })
    }
}

/// Storage for migration records.
pub trait MigrationRepository {
    /// Names of applied migrations, in application order.
    fn get_applied(&self, conn: &dyn Connection) -> OrmResult<Vec<String>> {
        Ok(self
            .get_records(conn)?
            .into_iter()
            .map(|r| r.migration)
            .collect())
    }

    /// All records, in application order.
    fn get_records(&self, conn: &dyn Connection) -> OrmResult<Vec<MigrationRecord>>;

    /// One past the highest recorded batch (1 when nothing is applied).
    fn next_batch_number(&self, conn: &dyn Connection) -> OrmResult<i64>;

    /// Records of the `steps` most recent batches, most recently applied first.
    fn records_for_rollback(
        &self,
        conn: &dyn Connection,
        steps: usize,
    ) -> OrmResult<Vec<MigrationRecord>>;

    fn log(&self, conn: &dyn Connection, migration: &str, batch: i64) -> OrmResult<()>;

    fn delete(&self, conn: &dyn Connection, migration: &str) -> OrmResult<()>;

    fn repository_exists(&self, conn: &dyn Connection) -> OrmResult<bool>;

    fn create_repository(&self, conn: &dyn Connection) -> OrmResult<()>;
}

/// Records migrations in a database table.
#[derive(Debug, Clone)]
pub struct DatabaseMigrationRepository {
    table: String,
}

impl Default for DatabaseMigrationRepository {
    fn default() -> Self {
        Self::new(DEFAULT_MIGRATION_TABLE)
    }
}

impl DatabaseMigrationRepository {
    pub fn new(table: &str) -> Self {
        Self {
            table: table.to_string(),
        }
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    fn query(&self) -> Query {
        Query::table(&self.table)
    }
}

impl MigrationRepository for DatabaseMigrationRepository {
    fn get_records(&self, conn: &dyn Connection) -> OrmResult<Vec<MigrationRecord>> {
        let mut q = self.query();
        q.order_by("batch").order_by("id");
        q.get_as(conn)
    }

    fn next_batch_number(&self, conn: &dyn Connection) -> OrmResult<i64> {
        let last = self
            .query()
            .max(conn, "batch")?
            .and_then(|v| v.as_i64())
            .unwrap_or(0);
        Ok(last + 1)
    }

    fn records_for_rollback(
        &self,
        conn: &dyn Connection,
        steps: usize,
    ) -> OrmResult<Vec<MigrationRecord>> {
        let mut batches = self.query();
        batches
            .distinct()
            .order_by_desc("batch")
            .limit(steps as u64);
        let batches = batches.pluck(conn, "batch")?;
        if batches.is_empty() {
            return Ok(Vec::new());
        }

        let mut q = self.query();
        q.where_in("batch", batches)
            .order_by_desc("batch")
            .order_by_desc("id");
        q.get_as(conn)
    }

    fn log(&self, conn: &dyn Connection, migration: &str, batch: i64) -> OrmResult<()> {
        let mut values = Values::new();
        values.insert("migration".to_string(), Value::from(migration));
        values.insert("batch".to_string(), Value::Int(batch));
        values.insert("applied_at".to_string(), Value::now());
        self.query().insert(conn, values)?;
        Ok(())
    }

    fn delete(&self, conn: &dyn Connection, migration: &str) -> OrmResult<()> {
        let mut q = self.query();
        q.where_eq("migration", migration);
        q.delete(conn)?;
        Ok(())
    }

    fn repository_exists(&self, conn: &dyn Connection) -> OrmResult<bool> {
        Schema::new(conn).has_table(&self.table)
    }

    fn create_repository(&self, conn: &dyn Connection) -> OrmResult<()> {
        Schema::new(conn).create(&self.table, |table| {
            table.increments("id");
            table.string("migration", 255).unique();
            table.integer("batch");
            table.timestamp("applied_at").nullable();
        })
    }
}
