use super::*;
use crate::row::Row;
use crate::testing::MockConnection;
use crate::value::Value;

fn customers() -> Blueprint {
    let mut table = Blueprint::new("customers", BlueprintMode::Create);
    table.id();
    table.string("name", 120);
    table.string("email", 191).unique();
    table.boolean("vip").default(false);
    table.timestamps();
    table.soft_deletes();
    table
}

fn invoices() -> Blueprint {
    let mut table = Blueprint::new("invoices", BlueprintMode::Create);
    table.id();
    table.foreign_id("customer_id").constrained().on_delete("cascade");
    table.string("number", 32).index();
    table.decimal("total", 10, 2).default(0);
    table
}

// ==================== CREATE ====================

#[test]
fn create_table_sqlite() {
    assert_eq!(
        customers().to_sql(Dialect::Sqlite),
        vec![
            concat!(
                r#"CREATE TABLE "customers" ("id" integer primary key autoincrement not null, "#,
                r#""name" varchar not null, "email" varchar not null, "vip" tinyint(1) not null default 0, "#,
                r#""created_at" datetime null, "updated_at" datetime null, "deleted_at" datetime null)"#
            )
            .to_string(),
            r#"CREATE UNIQUE INDEX "customers_email_unique" ON "customers" ("email")"#.to_string(),
        ]
    );
}

#[test]
fn create_table_mysql_inlines_unique_and_options() {
    let mut table = customers();
    table.charset("utf8mb4").collation("utf8mb4_unicode_ci").engine("InnoDB");
    assert_eq!(
        table.to_sql(Dialect::Mysql),
        vec![concat!(
            "CREATE TABLE `customers` (`id` bigint unsigned not null auto_increment primary key, ",
            "`name` varchar(120) not null, `email` varchar(191) not null, `vip` tinyint(1) not null default 0, ",
            "`created_at` timestamp null, `updated_at` timestamp null, `deleted_at` timestamp null, ",
            "constraint `customers_email_unique` unique (`email`)) ",
            "default character set utf8mb4 collate 'utf8mb4_unicode_ci' engine = InnoDB"
        )
        .to_string()]
    );
}

#[test]
fn create_table_postgres_ignores_charset() {
    let mut table = customers();
    table.charset("utf8mb4");
    let sql = table.to_sql(Dialect::Postgres);
    assert_eq!(sql.len(), 1);
    assert!(sql[0].starts_with(r#"CREATE TABLE "customers" ("id" bigserial primary key, "name" varchar(120) not null"#));
    assert!(sql[0].contains(r#""vip" boolean not null default false"#));
    assert!(sql[0].contains(r#""deleted_at" timestamp(0) without time zone null"#));
    assert!(sql[0].ends_with(r#"constraint "customers_email_unique" unique ("email"))"#));
}

#[test]
fn create_with_foreign_key_and_index() {
    assert_eq!(
        invoices().to_sql(Dialect::Postgres),
        vec![
            concat!(
                r#"CREATE TABLE "invoices" ("id" bigserial primary key, "customer_id" bigint not null, "#,
                r#""number" varchar(32) not null, "total" decimal(10, 2) not null default 0, "#,
                r#"constraint "invoices_customer_id_foreign" foreign key ("customer_id") "#,
                r#"references "customers" ("id") on delete cascade)"#
            )
            .to_string(),
            r#"CREATE INDEX "invoices_number_index" ON "invoices" ("number")"#.to_string(),
        ]
    );

    assert_eq!(
        invoices().to_sql(Dialect::Mysql),
        vec![concat!(
            "CREATE TABLE `invoices` (`id` bigint unsigned not null auto_increment primary key, ",
            "`customer_id` bigint unsigned not null, `number` varchar(32) not null, ",
            "`total` decimal(10, 2) not null default 0, index `invoices_number_index` (`number`), ",
            "constraint `invoices_customer_id_foreign` foreign key (`customer_id`) ",
            "references `customers` (`id`) on delete cascade)"
        )
        .to_string()]
    );
}

#[test]
fn create_composite_primary_key() {
    let mut table = Blueprint::new("invoice_tag", BlueprintMode::Create);
    table.foreign_id("invoice_id");
    table.foreign_id("tag_id");
    table.primary(&["invoice_id", "tag_id"]);
    assert_eq!(
        table.to_sql(Dialect::Sqlite),
        vec![
            r#"CREATE TABLE "invoice_tag" ("invoice_id" integer not null, "tag_id" integer not null, primary key ("invoice_id", "tag_id"))"#
                .to_string()
        ]
    );
}

#[test]
fn sqlite_type_collapse() {
    let mut table = Blueprint::new("t", BlueprintMode::Create);
    table.small_integer("a");
    table.decimal("b", 8, 2);
    table.json("c");
    table.float("d");
    table.date_time("e");
    assert_eq!(
        table.to_sql(Dialect::Sqlite)[0],
        r#"CREATE TABLE "t" ("a" integer not null, "b" numeric not null, "c" text not null, "d" float not null, "e" datetime not null)"#
    );
}

#[test]
fn defaults_are_escaped() {
    let mut table = Blueprint::new("t", BlueprintMode::Create);
    table.string("status", 20).default("it's new");
    table.timestamp("seen_at").default_raw("CURRENT_TIMESTAMP");
    assert_eq!(
        table.to_sql(Dialect::Sqlite)[0],
        r#"CREATE TABLE "t" ("status" varchar not null default 'it''s new', "seen_at" datetime not null default CURRENT_TIMESTAMP)"#
    );
}

// ==================== ALTER ====================

#[test]
fn alter_mysql_and_postgres() {
    let mut table = Blueprint::new("customers", BlueprintMode::Alter);
    table.string("phone", 20).nullable();
    table.boolean("vip").default(true);
    table.unique(&["email", "phone"]);

    assert_eq!(
        table.to_sql(Dialect::Postgres),
        vec![
            r#"ALTER TABLE "customers" ADD COLUMN "phone" varchar(20) null, ADD COLUMN "vip" boolean not null default true"#.to_string(),
            r#"ALTER TABLE "customers" ADD constraint "customers_email_phone_unique" unique ("email", "phone")"#.to_string(),
        ]
    );
    assert_eq!(
        table.to_sql(Dialect::Mysql),
        vec![
            "ALTER TABLE `customers` ADD COLUMN `phone` varchar(20) null, ADD COLUMN `vip` tinyint(1) not null default 1".to_string(),
            "ALTER TABLE `customers` ADD unique `customers_email_phone_unique` (`email`, `phone`)".to_string(),
        ]
    );
}

#[test]
fn alter_postgres_adds_foreign_constraint() {
    let mut table = Blueprint::new("invoices", BlueprintMode::Alter);
    table.foreign(&["customer_id"]).on("customers").on_delete("restrict");
    assert_eq!(
        table.to_sql(Dialect::Postgres),
        vec![
            r#"ALTER TABLE "invoices" ADD constraint "invoices_customer_id_foreign" foreign key ("customer_id") references "customers" ("id") on delete restrict"#
                .to_string()
        ]
    );
}

#[test]
fn alter_sqlite_one_statement_per_column() {
    let mut table = Blueprint::new("invoices", BlueprintMode::Alter);
    table.foreign_id("tag_id").nullable().references("id").on("tags");
    table.integer("position").default(1);
    // Existing column: cannot be constrained on SQLite.
    table.foreign(&["customer_id"]).on("customers");

    assert_eq!(
        table.to_sql(Dialect::Sqlite),
        vec![
            r#"ALTER TABLE "invoices" ADD COLUMN "tag_id" integer null references "tags" ("id")"#.to_string(),
            r#"ALTER TABLE "invoices" ADD COLUMN "position" integer not null default 1"#.to_string(),
        ]
    );
}

#[test]
fn alter_sqlite_attaches_table_level_foreign_to_new_column() {
    let mut table = Blueprint::new("items", BlueprintMode::Alter);
    table.foreign_id("invoice_id").nullable();
    table.foreign(&["invoice_id"]).on("invoices").on_delete("cascade");
    assert_eq!(
        table.to_sql(Dialect::Sqlite),
        vec![
            r#"ALTER TABLE "items" ADD COLUMN "invoice_id" integer null references "invoices" ("id") on delete cascade"#
                .to_string()
        ]
    );
}

#[test]
fn drop_and_rename_commands() {
    let mut table = Blueprint::new("t", BlueprintMode::Alter);
    table.drop_column(&["a", "b"]);
    table.rename_column("c", "d");
    table.drop_index("t_x_index");
    table.drop_foreign("t_y_foreign");

    assert_eq!(
        table.to_sql(Dialect::Mysql),
        vec![
            "ALTER TABLE `t` DROP COLUMN `a`, DROP COLUMN `b`".to_string(),
            "ALTER TABLE `t` RENAME COLUMN `c` TO `d`".to_string(),
            "ALTER TABLE `t` DROP INDEX `t_x_index`".to_string(),
            "ALTER TABLE `t` DROP FOREIGN KEY `t_y_foreign`".to_string(),
        ]
    );
    assert_eq!(
        table.to_sql(Dialect::Sqlite),
        vec![
            r#"ALTER TABLE "t" DROP COLUMN "a""#.to_string(),
            r#"ALTER TABLE "t" DROP COLUMN "b""#.to_string(),
            r#"ALTER TABLE "t" RENAME COLUMN "c" TO "d""#.to_string(),
            r#"DROP INDEX "t_x_index""#.to_string(),
        ]
    );
    assert_eq!(
        table.to_sql(Dialect::Postgres)[3],
        r#"ALTER TABLE "t" DROP CONSTRAINT "t_y_foreign""#
    );
}

// ==================== Names ====================

#[test]
fn index_names_are_normalized() {
    assert_eq!(
        index_name("Public.Users", &["Email-Address".to_string()], "unique"),
        "public_users_email_address_unique"
    );
}

#[test]
fn long_index_names_are_capped_deterministically() {
    let columns = vec![
        "first_really_long_column_name".to_string(),
        "second_really_long_column_name".to_string(),
    ];
    let name = index_name("a_table_with_a_rather_long_name", &columns, "unique");
    assert_eq!(name.len(), MAX_IDENTIFIER_LEN);
    assert_eq!(name, index_name("a_table_with_a_rather_long_name", &columns, "unique"));
    assert!(name.starts_with("a_table_with_a_rather_long_name_first_really_long_colum"));

    let (_, hash) = name.rsplit_once('_').unwrap();
    assert_eq!(hash.len(), 8);
    assert!(hash.chars().all(|c| c.is_ascii_hexdigit()));

    let other = index_name("a_table_with_a_rather_long_name", &columns, "index");
    assert_ne!(name, other);
}

// ==================== Facade ====================

#[test]
fn facade_runs_statements() {
    let conn = MockConnection::sqlite();
    let schema = Schema::new(&conn);
    schema
        .create("tags", |table| {
            table.id();
            table.string("name", 50).unique();
        })
        .unwrap();
    schema.rename("tags", "labels").unwrap();
    schema.drop_if_exists("labels").unwrap();
    schema.statement("PRAGMA foreign_keys = ON").unwrap();

    assert_eq!(
        conn.statements(),
        vec![
            r#"CREATE TABLE "tags" ("id" integer primary key autoincrement not null, "name" varchar not null)"#.to_string(),
            r#"CREATE UNIQUE INDEX "tags_name_unique" ON "tags" ("name")"#.to_string(),
            r#"ALTER TABLE "tags" RENAME TO "labels""#.to_string(),
            r#"DROP TABLE IF EXISTS "labels""#.to_string(),
            "PRAGMA foreign_keys = ON".to_string(),
        ]
    );
}

#[test]
fn facade_applies_prefix() {
    let conn = MockConnection::new(Dialect::Mysql);
    let schema = Schema::new(&conn).with_prefix("app_");
    schema.drop("users").unwrap();
    schema.rename("users", "members").unwrap();
    assert_eq!(
        conn.statements(),
        vec![
            "DROP TABLE `app_users`".to_string(),
            "RENAME TABLE `app_users` TO `app_members`".to_string(),
        ]
    );
}

#[test]
fn facade_inspects_catalog() {
    let conn = MockConnection::sqlite();
    conn.push_result(vec![
        Row::from_pairs([("column_name", Value::from("id"))]),
        Row::from_pairs([("column_name", Value::from("Email"))]),
    ]);
    let schema = Schema::new(&conn);
    assert!(schema.has_column("customers", "email").unwrap());
    assert_eq!(
        conn.statements()[0],
        "SELECT name AS column_name FROM pragma_table_info(?)"
    );
    assert_eq!(conn.bindings(0), vec![Value::from("customers")]);

    assert!(!schema.has_table("customers").unwrap());
    assert!(conn.statements()[1].contains(r#"FROM "sqlite_master" WHERE "type" = ? AND "name" = ?"#));
}

#[test]
fn from_config_applies_prefix_and_table_defaults() {
    let conn = MockConnection::new(Dialect::Mysql);
    let mut config = crate::DatabaseConfig::new(Dialect::Mysql, "shop");
    config.prefix = "app_".to_string();
    config.charset = Some("utf8mb4".to_string());
    config.collation = Some("utf8mb4_unicode_ci".to_string());

    let schema = Schema::from_config(&conn, &config).unwrap();
    schema.create("tags", |t| {
        t.id();
    })
    .unwrap();
    schema.create("logs", |t| {
        t.id();
        t.charset("latin1");
    })
    .unwrap();
    schema.table("tags", |t| {
        t.string("label", 40);
    })
    .unwrap();

    let statements = conn.statements();
    assert_eq!(
        statements[0],
        concat!(
            "CREATE TABLE `app_tags` (`id` bigint unsigned not null auto_increment primary key) ",
            "default character set utf8mb4 collate 'utf8mb4_unicode_ci'"
        )
    );
    assert!(statements[1].starts_with("CREATE TABLE `app_logs`"));
    assert!(statements[1].ends_with("default character set latin1 collate 'utf8mb4_unicode_ci'"));
    assert!(statements[2].starts_with("ALTER TABLE `app_tags` ADD COLUMN `label`"));
    assert!(!statements[2].contains("character set"));
}

#[test]
fn from_config_rejects_a_driver_mismatch() {
    let conn = MockConnection::sqlite();
    let config = crate::DatabaseConfig::new(Dialect::Postgres, "shop");
    assert!(matches!(
        Schema::from_config(&conn, &config),
        Err(crate::OrmError::Config(_))
    ));

    let sqlite = crate::DatabaseConfig::new(Dialect::Sqlite, ":memory:");
    let schema = Schema::from_config(&conn, &sqlite).unwrap();
    schema.create("tags", |t| {
        t.id();
    })
    .unwrap();
    assert_eq!(
        conn.statements()[0],
        r#"CREATE TABLE "tags" ("id" integer primary key autoincrement not null)"#
    );
}
