//! Tests for the query builder and compiler.

use super::*;
use crate::dialect::Dialect;
use crate::row::Row;
use crate::testing::MockConnection;

fn placeholders(sql: &str) -> usize {
    sql.matches('?').count()
}

#[test]
fn test_select_basic() {
    let q = Query::table("users");
    assert_eq!(q.to_sql(), r#"SELECT * FROM "users""#);
    assert!(q.bindings().is_empty());
}

#[test]
fn test_where_order_limit() {
    let mut q = Query::table("users");
    q.where_eq("active", 1).order_by("name").limit(10);

    assert_eq!(
        q.to_sql(),
        r#"SELECT * FROM "users" WHERE "active" = ? ORDER BY "name" ASC LIMIT 10"#
    );
    assert_eq!(q.bindings(), vec![Value::Int(1)]);
}

#[test]
fn test_identifier_quoting() {
    let mut q = Query::table("users as u");
    q.select(["u.id", "u.*", "email as contact"]);
    assert_eq!(
        q.to_sql(),
        r#"SELECT "u"."id", "u".*, "email" as "contact" FROM "users" as "u""#
    );

    let mysql = Grammar::for_dialect(Dialect::Mysql).compile_select(&q);
    assert_eq!(
        mysql.sql,
        "SELECT `u`.`id`, `u`.*, `email` as `contact` FROM `users` as `u`"
    );
}

#[test]
fn test_raw_expressions_pass_through() {
    let mut q = Query::table("users");
    q.select_raw("count(*) as total", vec![])
        .add_select("status")
        .group_by(["status"])
        .order_by_raw("total desc", vec![])
        .order_by(raw("lower(status)"));
    assert_eq!(
        q.to_sql(),
        r#"SELECT count(*) as total, "status" FROM "users" GROUP BY "status" ORDER BY total desc, lower(status) ASC"#
    );
}

#[test]
fn test_nested_or_group() {
    let mut q = Query::table("t");
    q.where_eq("a", 1).or_where_nested(|q| {
        q.where_op("b", ">", 2).where_null("c");
    });
    assert_eq!(
        q.to_sql(),
        r#"SELECT * FROM "t" WHERE "a" = ? OR ("b" > ? AND "c" IS NULL)"#
    );
    assert_eq!(q.bindings(), vec![Value::Int(1), Value::Int(2)]);
}

#[test]
fn test_empty_nested_group_is_dropped() {
    let mut q = Query::table("t");
    q.where_nested(|_| {});
    assert_eq!(q.to_sql(), r#"SELECT * FROM "t""#);
}

#[test]
fn test_binding_order_follows_clause_order() {
    let mut q = Query::table("orders");
    q.select_raw("price * ? as total", vec![Value::from(2)])
        .join_with(JoinKind::Left, "users as u", |j| {
            j.on("u.id", Op::Eq, "orders.user_id").where_eq("u.active", true);
        })
        .where_eq("orders.status", "paid")
        .group_by(["orders.user_id"])
        .having("total", ">", 10)
        .order_by_raw("field(status, ?)", vec![Value::from("x")]);

    assert_eq!(
        q.to_sql(),
        concat!(
            r#"SELECT price * ? as total FROM "orders" "#,
            r#"LEFT JOIN "users" as "u" ON "u"."id" = "orders"."user_id" AND "u"."active" = ? "#,
            r#"WHERE "orders"."status" = ? GROUP BY "orders"."user_id" HAVING "total" > ? "#,
            r#"ORDER BY field(status, ?)"#
        )
    );
    assert_eq!(
        q.bindings(),
        vec![
            Value::Int(2),
            Value::Bool(true),
            Value::from("paid"),
            Value::Int(10),
            Value::from("x"),
        ]
    );
}

#[test]
fn test_binding_count_matches_placeholders() {
    let mut sub = Query::table("posts");
    sub.select_raw("count(*)", vec![])
        .where_column("posts.user_id", Op::Eq, "users.id")
        .where_eq("posts.published", true);

    let mut queries = Vec::new();

    let mut q = Query::table("users");
    q.select_sub(sub, "posts_count")
        .where_in("id", [1, 2, 3])
        .where_between("age", 18, 65)
        .or_where_raw("score > ? and score < ?", vec![Value::from(1), Value::from(9)]);
    queries.push(q);

    let mut q = Query::table("users");
    q.where_not_in("id", Vec::<i64>::new())
        .where_exists(|s| {
            s.from("orders")
                .where_column("orders.user_id", Op::Eq, "users.id")
                .where_op("orders.total", ">=", 100);
        })
        .having_nested(|h| {
            h.having("n", ">", 1).or_having("n", "<", 0);
        });
    queries.push(q);

    for q in &queries {
        let compiled = q.compile(&Grammar::ansi());
        assert_eq!(compiled.bindings.len(), placeholders(&compiled.sql), "{}", compiled.sql);
    }
}

#[test]
fn test_clone_is_deep() {
    let mut q = Query::table("users");
    q.where_nested(|g| {
        g.where_eq("a", 1);
    });
    let before = (q.to_sql(), q.bindings());

    let mut derived = q.clone();
    if let Condition::Nested { query } = &mut derived.wheres[0].condition {
        query.where_eq("b", 2);
    }
    derived.where_eq("c", 3);

    assert_eq!((q.to_sql(), q.bindings()), before);
    assert_ne!(derived.to_sql(), before.0);
}

#[test]
fn test_empty_in_lists() {
    let mut q = Query::table("users");
    q.where_in("id", Vec::<i64>::new());
    assert_eq!(q.to_sql(), r#"SELECT * FROM "users" WHERE 0 = 1"#);

    let mut q = Query::table("users");
    q.where_not_in("id", Vec::<i64>::new());
    assert_eq!(q.to_sql(), r#"SELECT * FROM "users" WHERE 1 = 1"#);
}

#[test]
fn test_null_comparisons() {
    let mut q = Query::table("users");
    q.where_op("deleted_at", "=", Value::Null)
        .where_op("email", "<>", None::<String>);
    assert_eq!(
        q.to_sql(),
        r#"SELECT * FROM "users" WHERE "deleted_at" IS NULL AND "email" IS NOT NULL"#
    );
    assert!(q.bindings().is_empty());
}

#[test]
fn test_usage_errors_fail_before_execution() {
    let conn = MockConnection::sqlite();

    let mut q = Query::table("users");
    q.where_op("age", ">", Value::Null);
    assert!(q.get(&conn).unwrap_err().is_validation());

    let mut q = Query::table("users");
    q.having("total", ">", Value::Null);
    let err = q.get(&conn).unwrap_err();
    assert!(err.to_string().contains("requires a value"));

    let mut q = Query::table("users");
    q.where_op("age", "=~", 3);
    assert!(q.count(&conn).unwrap_err().is_validation());

    assert!(conn.statements().is_empty());
}

#[test]
fn test_where_exists() {
    let mut q = Query::table("users");
    q.where_exists(|s| {
        s.from("orders")
            .select_raw("1", vec![])
            .where_column("orders.user_id", Op::Eq, "users.id");
    });
    assert_eq!(
        q.to_sql(),
        r#"SELECT * FROM "users" WHERE EXISTS (SELECT 1 FROM "orders" WHERE "orders"."user_id" = "users"."id")"#
    );
}

#[test]
fn test_ilike_outside_postgres() {
    let mut q = Query::table("users");
    q.where_op("name", "ilike", "a%");
    let pg = Grammar::for_dialect(Dialect::Postgres).compile_select(&q);
    let mysql = Grammar::for_dialect(Dialect::Mysql).compile_select(&q);
    assert_eq!(pg.sql, r#"SELECT * FROM "users" WHERE "name" ILIKE ?"#);
    assert_eq!(mysql.sql, "SELECT * FROM `users` WHERE `name` LIKE ?");
}

#[test]
fn test_offset_without_limit() {
    let mut q = Query::table("users");
    q.offset(5);
    let sqlite = Grammar::for_dialect(Dialect::Sqlite).compile_select(&q);
    assert_eq!(sqlite.sql, r#"SELECT * FROM "users" LIMIT -1 OFFSET 5"#);
    let pg = Grammar::for_dialect(Dialect::Postgres).compile_select(&q);
    assert_eq!(pg.sql, r#"SELECT * FROM "users" OFFSET 5"#);
}

#[test]
fn test_for_page() {
    let mut q = Query::table("users");
    q.for_page(3, 15);
    assert_eq!(q.to_sql(), r#"SELECT * FROM "users" LIMIT 15 OFFSET 30"#);

    q.for_page(0, 0);
    assert_eq!(q.to_sql(), r#"SELECT * FROM "users" LIMIT 1 OFFSET 0"#);
}

#[test]
fn test_count_runs_on_clone() {
    let conn = MockConnection::sqlite();
    conn.push_result(vec![Row::from_pairs([("aggregate", 5)])]);

    let mut q = Query::table("users");
    q.where_eq("active", 1).order_by("name").limit(10).offset(20);
    let sql_before = q.to_sql();

    assert_eq!(q.count(&conn).unwrap(), 5);
    assert_eq!(
        conn.statements()[0],
        r#"SELECT COUNT(*) AS "aggregate" FROM "users" WHERE "active" = ?"#
    );
    assert_eq!(conn.bindings(0), vec![Value::Int(1)]);
    assert_eq!(q.to_sql(), sql_before);
}

#[test]
fn test_grouped_count_uses_derived_table() {
    let conn = MockConnection::sqlite();
    conn.push_result(vec![Row::from_pairs([("aggregate", 2)])]);

    let mut q = Query::table("users");
    q.group_by(["status"]).order_by("status");
    assert_eq!(q.count(&conn).unwrap(), 2);
    assert_eq!(
        conn.statements()[0],
        r#"SELECT COUNT(*) AS "aggregate" FROM (SELECT "status" FROM "users" GROUP BY "status") AS "aggregate_table""#
    );
}

#[test]
fn test_exists_and_sum() {
    let conn = MockConnection::sqlite();
    conn.push_result(vec![Row::from_pairs([("exists", 1)])]);
    conn.push_result(vec![Row::from_pairs([("aggregate", Value::Null)])]);

    let mut q = Query::table("users");
    q.where_eq("id", 7);
    assert!(q.exists(&conn).unwrap());
    assert_eq!(q.sum(&conn, "balance").unwrap(), Value::Int(0));

    let statements = conn.statements();
    assert_eq!(
        statements[0],
        r#"SELECT EXISTS(SELECT * FROM "users" WHERE "id" = ?) AS "exists""#
    );
    assert_eq!(
        statements[1],
        r#"SELECT SUM("balance") AS "aggregate" FROM "users" WHERE "id" = ?"#
    );
}

#[test]
fn test_insert_statements() {
    let conn = MockConnection::sqlite();
    let q = Query::table("users");

    q.insert_many(
        &conn,
        vec![
            crate::values! { "name" => "ann", "age" => 30 },
            crate::values! { "age" => 31, "name" => "bob" },
        ],
    )
    .unwrap();
    assert_eq!(
        conn.statements()[0],
        r#"INSERT INTO "users" ("name", "age") VALUES (?, ?), (?, ?)"#
    );
    assert_eq!(
        conn.bindings(0),
        vec![
            Value::from("ann"),
            Value::Int(30),
            Value::from("bob"),
            Value::Int(31),
        ]
    );

    let err = q
        .insert_many(
            &conn,
            vec![
                crate::values! { "name" => "ann" },
                crate::values! { "email" => "x" },
            ],
        )
        .unwrap_err();
    assert!(err.is_validation());
    assert_eq!(conn.statements().len(), 1);
}

#[test]
fn test_insert_get_id_returning_on_postgres() {
    let grammar = Grammar::for_dialect(Dialect::Postgres);
    let compiled = grammar
        .compile_insert_get_id("users", &crate::values! { "name" => "ann" }, "id")
        .unwrap();
    assert_eq!(
        compiled.sql,
        r#"INSERT INTO "users" ("name") VALUES (?) RETURNING "id""#
    );

    let conn = MockConnection::sqlite();
    let id = Query::table("users")
        .insert_get_id(&conn, crate::values! { "name" => "ann" })
        .unwrap();
    assert_eq!(id, 1);
}

#[test]
fn test_update_increment_delete() {
    let conn = MockConnection::sqlite();
    let mut q = Query::table("users");
    q.where_eq("id", 4);

    q.update(&conn, crate::values! { "name" => "zed" }).unwrap();
    q.increment(&conn, "votes", 2).unwrap();
    q.decrement_with(&conn, "stock", 1, crate::values! { "sold" => true })
        .unwrap();
    q.delete(&conn).unwrap();

    let statements = conn.statements();
    assert_eq!(statements[0], r#"UPDATE "users" SET "name" = ? WHERE "id" = ?"#);
    assert_eq!(conn.bindings(0), vec![Value::from("zed"), Value::Int(4)]);
    assert_eq!(
        statements[1],
        r#"UPDATE "users" SET "votes" = "votes" + ? WHERE "id" = ?"#
    );
    assert_eq!(
        statements[2],
        r#"UPDATE "users" SET "stock" = "stock" - ?, "sold" = ? WHERE "id" = ?"#
    );
    assert_eq!(statements[3], r#"DELETE FROM "users" WHERE "id" = ?"#);
}

#[test]
fn test_delete_without_where_is_refused() {
    let conn = MockConnection::sqlite();
    let err = Query::table("users").delete(&conn).unwrap_err();
    assert!(err.is_validation());

    Query::table("users").truncate(&conn).unwrap();
    assert_eq!(
        conn.statements(),
        vec![
            "DELETE FROM sqlite_sequence WHERE name = ?".to_string(),
            r#"DELETE FROM "users""#.to_string(),
        ]
    );
}

#[test]
fn test_update_requires_table_and_values() {
    let conn = MockConnection::sqlite();
    let mut q = Query::new();
    q.where_eq("id", 1);
    assert!(q.update(&conn, crate::values! { "a" => 1 }).unwrap_err().is_validation());
    assert!(
        Query::table("users")
            .update(&conn, Values::new())
            .unwrap_err()
            .is_validation()
    );
}

#[test]
fn test_mysql_joined_update() {
    let mut q = Query::table("users");
    q.join("accounts", "accounts.user_id", Op::Eq, "users.id")
        .where_eq("accounts.closed", true);
    let compiled = Grammar::for_dialect(Dialect::Mysql)
        .compile_update(&q, &crate::values! { "users.active" => false })
        .unwrap();
    assert_eq!(
        compiled.sql,
        "UPDATE `users` INNER JOIN `accounts` ON `accounts`.`user_id` = `users`.`id` SET `users`.`active` = ? WHERE `accounts`.`closed` = ?"
    );
    assert!(
        Grammar::for_dialect(Dialect::Sqlite)
            .compile_update(&q, &crate::values! { "active" => false })
            .is_err()
    );
}

#[test]
fn test_paginate() {
    let conn = MockConnection::sqlite();
    conn.push_result(vec![Row::from_pairs([("aggregate", 12)])]);
    conn.push_result(vec![
        Row::from_pairs([("id", 11)]),
        Row::from_pairs([("id", 12)]),
    ]);

    let mut q = Query::table("users");
    q.where_eq("active", true).order_by("id");
    let page = q.paginate(&conn, 5, 3).unwrap();

    assert_eq!(page.total, 12);
    assert_eq!(page.items.len(), 2);
    assert_eq!(page.last_page(), 3);
    assert!(!page.has_more_pages());
    assert_eq!(page.first_item(), Some(11));
    assert_eq!(
        conn.statements()[1],
        r#"SELECT * FROM "users" WHERE "active" = ? ORDER BY "id" ASC LIMIT 5 OFFSET 10"#
    );
}

#[test]
fn test_simple_paginate_overfetches() {
    let conn = MockConnection::sqlite();
    conn.push_result(vec![
        Row::from_pairs([("id", 1)]),
        Row::from_pairs([("id", 2)]),
        Row::from_pairs([("id", 3)]),
    ]);

    let page = Query::table("users").simple_paginate(&conn, 2, 1).unwrap();
    assert!(page.has_more);
    assert_eq!(page.items.len(), 2);
    assert_eq!(
        conn.statements()[0],
        r#"SELECT * FROM "users" LIMIT 3 OFFSET 0"#
    );
}

#[test]
fn test_update_or_insert_inserts_when_missing() {
    let conn = MockConnection::sqlite();
    conn.push_result(vec![Row::from_pairs([("exists", 0)])]);

    let done = Query::table("settings")
        .update_or_insert(
            &conn,
            crate::values! { "key" => "theme" },
            crate::values! { "value" => "dark" },
        )
        .unwrap();
    assert!(done);
    assert_eq!(
        conn.statements()[1],
        r#"INSERT INTO "settings" ("key", "value") VALUES (?, ?)"#
    );

    let err = Query::table("settings")
        .update_or_insert(&conn, Values::new(), crate::values! { "value" => "x" })
        .unwrap_err();
    assert!(err.is_validation());
}

#[test]
fn test_value_and_pluck() {
    let conn = MockConnection::sqlite();
    conn.push_result(vec![Row::from_pairs([("email", "a@x")])]);
    conn.push_result(vec![
        Row::from_pairs([("email", "a@x")]),
        Row::from_pairs([("email", "b@x")]),
    ]);

    let q = Query::table("users");
    assert_eq!(q.value(&conn, "email").unwrap(), Some(Value::from("a@x")));
    assert_eq!(
        q.pluck(&conn, "email").unwrap(),
        vec![Value::from("a@x"), Value::from("b@x")]
    );
    assert_eq!(
        conn.statements()[0],
        r#"SELECT "email" FROM "users" LIMIT 1"#
    );
}

#[test]
fn test_exists_ignores_limit_and_offset() {
    let conn = MockConnection::sqlite();
    conn.push_result(vec![Row::from_pairs([("exists", 1)])]);

    let mut q = Query::table("users");
    q.where_eq("active", true).order_by("id").limit(1).offset(1000);
    assert!(q.exists(&conn).unwrap());
    assert_eq!(
        conn.statements()[0],
        r#"SELECT EXISTS(SELECT * FROM "users" WHERE "active" = ?) AS "exists""#
    );
    assert_eq!(conn.bindings(0), vec![Value::Bool(true)]);
}

#[test]
fn test_ungrouped_having_is_not_counted() {
    let conn = MockConnection::sqlite();
    conn.push_result(vec![Row::from_pairs([("aggregate", 3)])]);

    let mut q = Query::table("orders");
    q.where_eq("status", "paid").having("total", ">", 100);
    assert_eq!(q.count(&conn).unwrap(), 3);
    assert_eq!(
        conn.statements()[0],
        r#"SELECT COUNT(*) AS "aggregate" FROM "orders" WHERE "status" = ?"#
    );
    assert_eq!(conn.bindings(0), vec![Value::from("paid")]);
}

#[test]
fn test_for_page_saturates() {
    let mut q = Query::table("users");
    q.for_page(u64::MAX, 10);
    assert_eq!(
        q.to_sql(),
        r#"SELECT * FROM "users" LIMIT 10 OFFSET 9223372036854775807"#
    );

    q.for_page(0, u64::MAX);
    assert_eq!(
        q.to_sql(),
        r#"SELECT * FROM "users" LIMIT 9223372036854775807 OFFSET 0"#
    );
}

#[test]
fn test_simple_paginate_with_huge_page_size() {
    let conn = MockConnection::sqlite();
    conn.push_result(vec![Row::from_pairs([("id", 1)])]);

    let page = Query::table("users")
        .simple_paginate(&conn, u64::MAX, 1)
        .unwrap();
    assert!(!page.has_more);
    assert_eq!(
        conn.statements()[0],
        r#"SELECT * FROM "users" LIMIT 9223372036854775807 OFFSET 0"#
    );
}
