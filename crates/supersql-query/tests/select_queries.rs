//! Integration tests for SELECT building across dialects.
//!
//! These exercise the public builder API end to end: joins, NULL handling,
//! ordering, paging, DISTINCT, CTEs and placeholder numbering.

use supersql_core::{ErrorKind, SqlError};
use supersql_query::{fx, Condition, Dialect, Expr, Field, Operand, QueryBuilder, Table, Value};

fn users_u() -> Table {
    Table::new("users").as_("u")
}

fn posts_p() -> Table {
    Table::new("posts").as_("p")
}

// ── Dialects and placeholders ─────────────────────────────────────────

#[test]
fn test_same_query_per_dialect() {
    let expected = [
        (Dialect::Postgres, r#"SELECT id FROM "users" WHERE "id" = $1"#),
        (Dialect::MySql, r#"SELECT id FROM "users" WHERE "id" = %s"#),
        (Dialect::Sqlite, r#"SELECT id FROM "users" WHERE "id" = ?"#),
    ];
    for (dialect, sql) in expected {
        let compiled = QueryBuilder::new(dialect)
            .select(["id"])
            .from("users")
            .where_(Field::new("id").eq(1))
            .unwrap()
            .build()
            .unwrap();
        assert_eq!(compiled.sql, sql, "{dialect}");
        assert_eq!(compiled.params, vec![Value::Int(1)]);
    }
}

#[test]
fn test_build_is_deterministic() {
    let q = QueryBuilder::postgres()
        .select(["*"])
        .from("users")
        .where_(Field::new("age").between(18, 65))
        .unwrap()
        .and(Field::new("role").is_in(["admin", "staff"]))
        .unwrap();
    let first = q.build().unwrap();
    let second = q.build().unwrap();
    assert_eq!(first, second);
    assert_eq!(
        first.sql,
        r#"SELECT * FROM "users" WHERE "age" BETWEEN $1 AND $2 AND "role" IN ($3, $4)"#
    );
}

#[test]
fn test_in_list_one_placeholder_per_value() {
    let compiled = QueryBuilder::sqlite()
        .select(["*"])
        .from("users")
        .where_(Field::new("id").is_in(vec![3, 1, 2]))
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(compiled.sql, r#"SELECT * FROM "users" WHERE "id" IN (?, ?, ?)"#);
    assert_eq!(
        compiled.params,
        vec![Value::Int(3), Value::Int(1), Value::Int(2)]
    );
}

#[test]
fn test_values_are_bound_not_inlined() {
    let hostile = "x'; DROP TABLE users; --";
    let compiled = QueryBuilder::postgres()
        .select(["*"])
        .from("users")
        .where_(Field::new("name").eq(hostile))
        .unwrap()
        .build()
        .unwrap();
    assert!(!compiled.sql.contains("DROP"));
    assert_eq!(compiled.params, vec![Value::from(hostile)]);
}

#[test]
fn test_boolean_operators_group_with_parentheses() {
    let age = Field::new("age");
    let role = Field::new("role");
    let condition: Condition = (age.gt(18) & role.eq("admin")) | !age.lt(65);
    let compiled = QueryBuilder::postgres()
        .select(["*"])
        .from("users")
        .where_(condition)
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(
        compiled.sql,
        r#"SELECT * FROM "users" WHERE (("age" > $1) AND ("role" = $2)) OR (NOT ("age" < $3))"#
    );
    assert_eq!(compiled.params.len(), 3);
}

// ── Joins ─────────────────────────────────────────────────────────────

#[test]
fn test_inner_join_with_aliases() {
    let (u, p) = (users_u(), posts_p());
    let sql = QueryBuilder::postgres()
        .select([u.field("name")])
        .from(u.clone())
        .join(p.clone())
        .on(u.field("id").eq(p.field("user_id")))
        .unwrap()
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        r#"SELECT "u"."name" FROM "users" AS "u" INNER JOIN "posts" AS "p" ON "u"."id" = "p"."user_id""#
    );
}

#[test]
fn test_left_join() {
    let (u, p) = (users_u(), posts_p());
    let sql = QueryBuilder::postgres()
        .select([u.field("name")])
        .from(u.clone())
        .left_join(p.clone())
        .on(u.field("id").eq(p.field("user_id")))
        .unwrap()
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        r#"SELECT "u"."name" FROM "users" AS "u" LEFT JOIN "posts" AS "p" ON "u"."id" = "p"."user_id""#
    );
}

#[test]
fn test_cross_join_has_no_on() {
    let sql = QueryBuilder::postgres()
        .select(["*"])
        .from("users")
        .cross_join("roles")
        .to_sql()
        .unwrap();
    assert_eq!(sql, r#"SELECT * FROM "users" CROSS JOIN "roles""#);
}

#[test]
fn test_joined_table_is_not_repeated_in_implied_from() {
    let (u, p) = (users_u(), posts_p());
    let sql = QueryBuilder::postgres()
        .select(vec![Expr::from(u.field("name")), p.field("title").into()])
        .join(p.clone())
        .on(u.field("id").eq(p.field("user_id")))
        .unwrap()
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        r#"SELECT "u"."name", "p"."title" FROM "users" AS "u" INNER JOIN "posts" AS "p" ON "u"."id" = "p"."user_id""#
    );
}

#[test]
fn test_join_on_subquery_and_repeated_on() {
    let totals = QueryBuilder::postgres()
        .select(["user_id", "SUM(total) AS spent"])
        .from("orders")
        .group_by(["user_id"])
        .as_("o");
    let compiled = QueryBuilder::postgres()
        .select(["u.name", "o.spent"])
        .from(users_u())
        .join(totals)
        .on("o.user_id = u.id")
        .unwrap()
        .on("o.spent > 100")
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(
        compiled.sql,
        concat!(
            r#"SELECT u.name, o.spent FROM "users" AS "u" "#,
            r#"INNER JOIN (SELECT user_id, SUM(total) AS spent FROM "orders" GROUP BY user_id) AS "o" "#,
            r#"ON (o.user_id = u.id) AND (o.spent > 100)"#
        )
    );
    assert!(compiled.params.is_empty());
}

// ── NULL handling ─────────────────────────────────────────────────────

#[test]
fn test_eq_null_becomes_is_null() {
    let u = users_u();
    let compiled = QueryBuilder::postgres()
        .select(["*"])
        .from(u.clone())
        .where_(u.field("name").eq(Value::Null))
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(compiled.sql, r#"SELECT * FROM "users" AS "u" WHERE "u"."name" IS NULL"#);
    assert!(compiled.params.is_empty());
}

#[test]
fn test_ne_null_becomes_is_not_null() {
    let u = users_u();
    let compiled = QueryBuilder::postgres()
        .select(["*"])
        .from(u.clone())
        .where_(u.field("name").ne(None::<String>))
        .unwrap()
        .build()
        .unwrap();
    assert!(compiled.sql.ends_with(r#"WHERE "u"."name" IS NOT NULL"#));
    assert!(!compiled.sql.contains("<>"));
    assert!(compiled.params.is_empty());
}

#[test]
fn test_explicit_is_null_and_none_value() {
    let u = users_u();
    let q = QueryBuilder::postgres().select(["*"]).from(u.clone());
    let explicit = q.where_(u.field("name").is_null()).unwrap().to_sql().unwrap();
    assert!(explicit.contains(r#""u"."name" IS NULL"#));

    let missing: Option<i64> = None;
    let from_option = q.where_(u.field("id").eq(missing)).unwrap().to_sql().unwrap();
    assert!(from_option.contains(r#""u"."id" IS NULL"#));

    let present = q.where_(u.field("name").eq("John")).unwrap().to_sql().unwrap();
    assert!(present.contains(r#""u"."name" = $1"#));
}

// ── ORDER BY / LIMIT / OFFSET / DISTINCT ──────────────────────────────

#[test]
fn test_order_by_fields() {
    let p = posts_p();
    let q = QueryBuilder::postgres().select([p.field("id")]).from(p.clone());
    assert!(q
        .order_by([p.field("id")])
        .to_sql()
        .unwrap()
        .ends_with(r#"ORDER BY "p"."id" ASC"#));
    assert!(q
        .order_by([-p.field("id")])
        .to_sql()
        .unwrap()
        .ends_with(r#"ORDER BY "p"."id" DESC"#));
    assert!(q
        .order_by([p.field("id").asc(), -p.field("created_at")])
        .to_sql()
        .unwrap()
        .ends_with(r#"ORDER BY "p"."id" ASC, "p"."created_at" DESC"#));
}

#[test]
fn test_order_by_strings() {
    let sql = QueryBuilder::postgres()
        .select(["*"])
        .from(posts_p())
        .order_by(["id", "-created_at"])
        .to_sql()
        .unwrap();
    assert!(sql.ends_with("ORDER BY id ASC, created_at DESC"));
}

#[test]
fn test_limit_and_offset() {
    let q = QueryBuilder::postgres().select(["*"]).from("users");
    assert_eq!(q.offset(10).to_sql().unwrap(), r#"SELECT * FROM "users" OFFSET 10"#);
    assert_eq!(
        q.limit(5).offset(10).to_sql().unwrap(),
        r#"SELECT * FROM "users" LIMIT 5 OFFSET 10"#
    );
    assert_eq!(
        q.limit_offset(5, 20).to_sql().unwrap(),
        r#"SELECT * FROM "users" LIMIT 5 OFFSET 20"#
    );
}

#[test]
fn test_select_distinct() {
    let q = QueryBuilder::postgres();
    assert_eq!(
        q.select_distinct(["name"]).from("users").to_sql().unwrap(),
        r#"SELECT DISTINCT name FROM "users""#
    );
    assert_eq!(
        q.select_distinct(["name", "age"]).from("users").to_sql().unwrap(),
        r#"SELECT DISTINCT name, age FROM "users""#
    );
    assert_eq!(
        q.select_distinct(Vec::<&str>::new()).from("users").to_sql().unwrap(),
        r#"SELECT DISTINCT * FROM "users""#
    );
    assert_eq!(
        q.select_distinct(["name"])
            .from("users")
            .where_("age > 18")
            .unwrap()
            .to_sql()
            .unwrap(),
        r#"SELECT DISTINCT name FROM "users" WHERE age > 18"#
    );
    assert_eq!(
        q.select_distinct(["name"])
            .from("users")
            .order_by(["name"])
            .to_sql()
            .unwrap(),
        r#"SELECT DISTINCT name FROM "users" ORDER BY name ASC"#
    );
}

#[test]
fn test_group_by_with_aggregates() {
    let orders = Table::new("orders");
    let sql = QueryBuilder::sqlite()
        .select(vec![
            Expr::from(orders.field("customer_id")),
            fx::count_all().as_("n").into(),
        ])
        .group_by([orders.field("customer_id")])
        .order_by(["-n"])
        .limit(3)
        .to_sql()
        .unwrap();
    assert_eq!(
        sql,
        r#"SELECT "orders"."customer_id", COUNT(*) AS n FROM "orders" GROUP BY "orders"."customer_id" ORDER BY n DESC LIMIT 3"#
    );
}

// ── Common table expressions ──────────────────────────────────────────

#[test]
fn test_simple_cte() {
    let q = QueryBuilder::postgres();
    let sql = q
        .with("users_cte", q.select(["*"]).from("users"))
        .select(["*"])
        .from("users_cte")
        .print()
        .unwrap();
    assert_eq!(
        sql,
        "WITH users_cte AS (SELECT * FROM \"users\")\nSELECT * FROM \"users_cte\""
    );
}

#[test]
fn test_multiple_ctes_and_join() {
    let q = QueryBuilder::postgres();
    let sql = q
        .with("cte1", q.select(["a"]).from("t1"))
        .with("cte2", q.select(["b"]).from("t2"))
        .select(["*"])
        .from("cte1")
        .join("cte2")
        .on("cte1.a = cte2.b")
        .unwrap()
        .print()
        .unwrap();
    assert_eq!(
        sql,
        "WITH cte1 AS (SELECT a FROM \"t1\"), cte2 AS (SELECT b FROM \"t2\")\nSELECT * FROM \"cte1\" INNER JOIN \"cte2\" ON cte1.a = cte2.b"
    );
}

#[test]
fn test_cte_from_raw_sql_before_delete() {
    let sql = QueryBuilder::postgres()
        .with("old_users", "SELECT * FROM users WHERE age > 50")
        .delete_from("old_users")
        .print()
        .unwrap();
    assert_eq!(
        sql,
        "WITH old_users AS (SELECT * FROM users WHERE age > 50)\nDELETE FROM \"old_users\""
    );
}

#[test]
fn test_cte_parameters_come_first() {
    let q = QueryBuilder::postgres();
    let compiled = q
        .with(
            "recent",
            q.select(["*"])
                .from("orders")
                .where_(Field::new("placed").gt("2024-01-01"))
                .unwrap(),
        )
        .select(["*"])
        .from("recent")
        .where_(Field::new("total").ge(50))
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(
        compiled.sql,
        "WITH recent AS (SELECT * FROM \"orders\" WHERE \"placed\" > $1)\nSELECT * FROM \"recent\" WHERE \"total\" >= $2"
    );
    assert_eq!(compiled.params, vec![Value::from("2024-01-01"), Value::Int(50)]);
}

// ── Scalar functions ──────────────────────────────────────────────────

#[test]
fn test_functions_in_select_list() {
    let p = posts_p();
    let q = QueryBuilder::postgres();

    let compiled = q
        .select([fx::call("random_func", [Operand::from(1), Operand::from("a")])])
        .from(p.clone())
        .build()
        .unwrap();
    assert!(compiled.sql.contains("random_func($1, 'a')"));
    assert_eq!(compiled.params, vec![Value::Int(1)]);

    let compiled = q
        .select([fx::call("my_func", [1]).as_("res")])
        .from(p.clone())
        .build()
        .unwrap();
    assert!(compiled.sql.contains("my_func($1) AS res"));
}

#[test]
fn test_json_object_per_dialect() {
    let p = posts_p();
    let compiled = QueryBuilder::postgres()
        .select([fx::json_object([("k", p.field("id"))])])
        .from(p.clone())
        .build()
        .unwrap();
    assert!(compiled.sql.contains(r#"json_build_object('k', "p"."id")"#));
    assert!(compiled.params.is_empty());

    let compiled = QueryBuilder::sqlite()
        .select([fx::json_object([("k", 1)])])
        .from(p)
        .build()
        .unwrap();
    assert!(compiled.sql.contains("json_object('k', ?)"));
    assert_eq!(compiled.params, vec![Value::Int(1)]);
}

// ── Errors ────────────────────────────────────────────────────────────

#[test]
fn test_errors_are_classified() {
    let q = QueryBuilder::postgres().select(["*"]).from("users");
    let bare = q.where_(Field::new("active")).unwrap_err();
    assert!(matches!(bare, SqlError::BareColumn(_)));
    assert_eq!(bare.kind(), ErrorKind::Build);
    assert!(!bare.is_retryable());
    assert!(bare.to_string().contains("active"));
    assert!(q.union(&q).unwrap_err().to_string().contains("UNION"));
}
