#![cfg(feature = "sqlite")]

use quarry::migrate::MigrationRepository;
use quarry::{
    DatabaseConfig, DatabaseMigrationRepository, Migration, Migrator, OrmError, OrmResult, Schema,
    SqlFileMigration, SqliteConnection,
};
use std::fs;

struct CreateCustomers;

impl Migration for CreateCustomers {
    fn name(&self) -> &str {
        "2024_01_01_000000_create_customers"
    }

    fn up(&self, schema: &Schema<'_>) -> OrmResult<()> {
        schema.create("customers", |t| {
            t.id();
            t.string("name", 120);
            t.timestamps();
        })
    }

    fn down(&self, schema: &Schema<'_>) -> Option<OrmResult<()>> {
        Some(schema.drop_if_exists("customers"))
    }
}

struct AddVipFlag;

impl Migration for AddVipFlag {
    fn name(&self) -> &str {
        "2024_02_01_000000_add_vip_flag"
    }

    fn up(&self, schema: &Schema<'_>) -> OrmResult<()> {
        schema.table("customers", |t| {
            t.boolean("vip").default(false);
        })
    }

    fn down(&self, schema: &Schema<'_>) -> Option<OrmResult<()>> {
        Some(schema.table("customers", |t| {
            t.drop_column(&["vip"]);
        }))
    }
}

/// No `down`: rolling back leaves it applied.
struct SeedRegions;

impl Migration for SeedRegions {
    fn name(&self) -> &str {
        "2024_03_01_000000_seed_regions"
    }

    fn up(&self, schema: &Schema<'_>) -> OrmResult<()> {
        schema.create("regions", |t| {
            t.increments("id");
            t.string("code", 8).unique();
        })?;
        schema.statement("INSERT INTO regions (code) VALUES ('eu'), ('us')")
    }
}

fn migrator() -> Migrator<DatabaseMigrationRepository> {
    Migrator::new(DatabaseMigrationRepository::default(), Default::default())
}

#[test]
fn run_is_idempotent_and_batched() {
    let conn = SqliteConnection::open_in_memory().unwrap();
    let mut m = migrator();
    m.add(CreateCustomers);

    assert_eq!(m.run(&conn).unwrap(), vec!["2024_01_01_000000_create_customers"]);
    assert!(m.run(&conn).unwrap().is_empty());

    m.add(AddVipFlag);
    assert_eq!(m.run(&conn).unwrap(), vec!["2024_02_01_000000_add_vip_flag"]);

    let schema = Schema::new(&conn);
    assert!(schema.has_table("migrations").unwrap());
    assert!(schema.has_columns("customers", &["id", "name", "VIP"]).unwrap());

    let records = m.repository().get_records(&conn).unwrap();
    let batches: Vec<i64> = records.iter().map(|r| r.batch).collect();
    assert_eq!(batches, vec![1, 2]);
    assert!(records.iter().all(|r| r.applied_at.is_some()));
}

#[test]
fn rollback_reverts_only_the_last_batch() {
    let conn = SqliteConnection::open_in_memory().unwrap();
    let mut m = migrator();
    m.add(CreateCustomers);
    m.run(&conn).unwrap();
    m.add(AddVipFlag);
    m.run(&conn).unwrap();

    assert_eq!(m.rollback(&conn, 1).unwrap(), vec!["2024_02_01_000000_add_vip_flag"]);
    let schema = Schema::new(&conn);
    assert!(!schema.has_column("customers", "vip").unwrap());
    assert!(schema.has_table("customers").unwrap());

    let status = m.status(&conn).unwrap();
    assert!(status[0].is_applied());
    assert!(!status[1].is_applied());

    assert_eq!(m.reset(&conn).unwrap(), vec!["2024_01_01_000000_create_customers"]);
    assert!(!schema.has_table("customers").unwrap());
    assert!(m.rollback(&conn, 1).unwrap().is_empty());
}

#[test]
fn migration_without_down_stays_applied() {
    let conn = SqliteConnection::open_in_memory().unwrap();
    let mut m = migrator();
    m.add(CreateCustomers).add(SeedRegions);
    m.run(&conn).unwrap();

    assert_eq!(m.rollback(&conn, 1).unwrap(), vec!["2024_01_01_000000_create_customers"]);
    assert_eq!(
        m.repository().get_applied(&conn).unwrap(),
        vec!["2024_03_01_000000_seed_regions"]
    );
    assert!(Schema::new(&conn).has_table("regions").unwrap());
}

#[test]
fn failing_migration_is_rolled_back() {
    let conn = SqliteConnection::open_in_memory().unwrap();
    let mut m = migrator();
    m.add(CreateCustomers).add(SqlFileMigration::new(
        "2024_01_02_000000_broken",
        "CREATE TABLE invoices (id integer primary key); CREATE TABLE oops (",
        None,
    ));

    match m.run(&conn).unwrap_err() {
        OrmError::Migration { name, .. } => assert_eq!(name, "2024_01_02_000000_broken"),
        other => panic!("unexpected error: {other:?}"),
    }

    let schema = Schema::new(&conn);
    assert!(schema.has_table("customers").unwrap());
    assert!(!schema.has_table("invoices").unwrap());
    assert_eq!(
        m.repository().get_applied(&conn).unwrap(),
        vec!["2024_01_01_000000_create_customers"]
    );
}

#[test]
fn runs_sql_file_migrations_from_config() {
    let dir = tempfile::tempdir().unwrap();
    let migrations = dir.path().join("migrations");
    fs::create_dir(&migrations).unwrap();
    fs::write(
        migrations.join("2024_01_01_000000_create_notes.up.sql"),
        "CREATE TABLE notes (id integer primary key, body text);\nCREATE INDEX notes_body_index ON notes (body);\n",
    )
    .unwrap();
    fs::write(
        migrations.join("2024_01_01_000000_create_notes.down.sql"),
        "DROP TABLE notes;",
    )
    .unwrap();

    let config_path = dir.path().join("quarry.toml");
    fs::write(
        &config_path,
        r#"
driver = "sqlite"
database = ":memory:"

[migrations]
table = "schema_migrations"
path = "migrations"
"#,
    )
    .unwrap();

    let config = DatabaseConfig::load(&config_path).unwrap();
    let conn = SqliteConnection::from_config(&config).unwrap();
    let m = Migrator::from_config(&config).unwrap();
    assert_eq!(m.repository().table(), "schema_migrations");

    assert_eq!(m.run(&conn).unwrap(), vec!["2024_01_01_000000_create_notes"]);
    let schema = Schema::new(&conn);
    assert!(schema.has_table("schema_migrations").unwrap());
    assert!(schema.has_table("notes").unwrap());

    assert_eq!(m.refresh(&conn).unwrap(), vec!["2024_01_01_000000_create_notes"]);
    m.rollback(&conn, 1).unwrap();
    assert!(!schema.has_table("notes").unwrap());
}

#[test]
fn config_prefix_reaches_migrations() {
    let mut config = DatabaseConfig::new(quarry::Dialect::Sqlite, ":memory:");
    config.prefix = "app_".to_string();
    config.migrations.table = "app_history".to_string();
    let conn = SqliteConnection::from_config(&config).unwrap();

    let mut m = Migrator::from_config(&config).unwrap();
    m.add(CreateCustomers);
    assert_eq!(m.run(&conn).unwrap(), vec!["2024_01_01_000000_create_customers"]);

    let schema = Schema::new(&conn);
    assert!(schema.has_table("app_customers").unwrap());
    assert!(!schema.has_table("customers").unwrap());
    assert!(schema.has_table("app_history").unwrap());

    m.reset(&conn).unwrap();
    assert!(!schema.has_table("app_customers").unwrap());
}

#[test]
fn config_with_missing_migrations_dir_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let mut config = DatabaseConfig::new(quarry::Dialect::Sqlite, ":memory:");
    config.migrations.path = Some(dir.path().join("absent"));
    assert!(matches!(Migrator::from_config(&config), Err(OrmError::Other(_))));
}
