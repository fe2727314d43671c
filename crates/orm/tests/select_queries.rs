use quarry_orm::comparators;
use quarry_orm::{Comparator, Conditions, OrmError, Query, Timezone};
use quarry_orm::sql::Operand;

fn query() -> Query {
    Query::postgres(Timezone::Local)
}

#[test]
fn test_equality_filter() {
    let sql = query()
        .select()
        .from("person")
        .where_conditions(Conditions::new().eq("age", 18))
        .build()
        .unwrap();
    assert_eq!(sql, r#"SELECT * FROM "person" WHERE "age" = 18"#);
}

#[test]
fn test_null_filter_renders_is_null() {
    let sql = query()
        .select()
        .from("person")
        .where_conditions(Conditions::new().is_null("age"))
        .build()
        .unwrap();
    assert_eq!(sql, r#"SELECT * FROM "person" WHERE "age" IS NULL"#);

    let sql = query()
        .select()
        .from("person")
        .where_conditions(Conditions::new().eq("age", Option::<i32>::None))
        .build()
        .unwrap();
    assert_eq!(sql, r#"SELECT * FROM "person" WHERE "age" IS NULL"#);
}

#[test]
fn test_array_membership() {
    let sql = query()
        .select()
        .from("person")
        .where_conditions(Conditions::new().eq("name", vec!["Jane", "John"]))
        .build()
        .unwrap();
    assert_eq!(sql, r#"SELECT * FROM "person" WHERE "name" = ANY('{Jane,John}')"#);
}

#[test]
fn test_empty_array_is_always_false() {
    let sql = query()
        .select()
        .from("person")
        .where_conditions(Conditions::new().eq("id", Vec::<i64>::new()).eq("active", true))
        .build()
        .unwrap();
    assert_eq!(sql, r#"SELECT * FROM "person" WHERE FALSE AND "active" = true"#);
}

#[test]
fn test_flat_conditions_are_conjoined_in_order() {
    let sql = query()
        .select()
        .from("person")
        .where_conditions(
            Conditions::new()
                .eq("a", 1)
                .is_null("b")
                .eq("c", "x")
                .is_null("d"),
        )
        .build()
        .unwrap();
    assert_eq!(
        sql,
        r#"SELECT * FROM "person" WHERE "a" = 1 AND "b" IS NULL AND "c" = 'x' AND "d" IS NULL"#
    );
}

#[test]
fn test_order_directions() {
    let ascending = query().select().from("person").order_by("age").build().unwrap();
    assert_eq!(ascending, r#"SELECT * FROM "person" ORDER BY "age" ASC"#);

    let descending = query().select().from("person").order_by("-age").build().unwrap();
    let coded = query()
        .select()
        .from("person")
        .order("age", quarry_orm::OrderDirection::from_code("Z"))
        .build()
        .unwrap();
    assert_eq!(descending, r#"SELECT * FROM "person" ORDER BY "age" DESC"#);
    assert_eq!(coded, descending);
}

#[test]
fn test_join_comparator_references_aliases_in_insertion_order() {
    let sql = query()
        .select()
        .from("person")
        .from_join("pet", "owner_id", "person", comparators::eq("id"))
        .unwrap()
        .build()
        .unwrap();
    assert_eq!(
        sql,
        r#"SELECT * FROM "person" "t1" JOIN "pet" "t2" ON "t2"."owner_id" = "t1"."id""#
    );

    let sql = query()
        .select()
        .from("person")
        .from_join("pet", "owner_id", "person", "id")
        .unwrap()
        .alias("p")
        .build()
        .unwrap();
    assert_eq!(sql, r#"SELECT * FROM "person" "t1" JOIN "pet" "p" ON "p"."owner_id" = "t1"."id""#);
}

#[test]
fn test_malformed_joins_fail_at_construction() {
    let err = query()
        .select()
        .from("person")
        .from_join("pet", vec!["owner_id", "owner_org"], "person", vec!["id"])
        .unwrap_err();
    assert!(matches!(err, OrmError::MalformedJoin(_)));

    let err = query()
        .select()
        .from("person")
        .from_join("pet", Vec::<&str>::new(), "person", Vec::<&str>::new())
        .unwrap_err();
    assert!(matches!(err, OrmError::MalformedJoin(_)));
}

#[test]
fn test_unknown_table_reference_is_reported() {
    let err = query()
        .select()
        .from("person")
        .where_table("pet", Conditions::new().eq("name", "Rex"))
        .unwrap_err();
    assert!(matches!(err, OrmError::UnknownTableReference(table) if table == "pet"));

    let err = query()
        .select()
        .from("person")
        .from_join("pet", "owner_id", "owner", "id")
        .unwrap_err();
    assert!(matches!(err, OrmError::UnknownTableReference(_)));
}

#[test]
fn test_unsupported_operator_tokens() {
    for token in ["~~", "DROP", "=", "", "eq;"] {
        let err = Comparator::new(token, Operand::Val(1.into())).unwrap_err();
        assert!(matches!(err, OrmError::UnsupportedOperator(_)), "token {:?}", token);
    }
    assert!(Comparator::new("between", Operand::Range { from: 1.into(), to: 2.into() }).is_ok());
}

#[test]
fn test_aggregate_with_grouping() {
    let sql = query()
        .select()
        .from("orders")
        .select(["customer_id"])
        .count_of(["id"], Some("orders"))
        .sum_of(["total"], Some("spent"))
        .group_by(["customer_id"])
        .order_by_desc("spent")
        .limit(10)
        .build()
        .unwrap();
    assert_eq!(
        sql,
        r#"SELECT "customer_id", COUNT("id") AS "orders", SUM("total") AS "spent" FROM "orders" GROUP BY "customer_id" ORDER BY "spent" DESC LIMIT 10"#
    );
}

#[test]
fn test_count_query_shares_joins_and_filters() {
    let sql = query()
        .select()
        .from("person")
        .from_join("pet", "owner_id", "person", "id")
        .unwrap()
        .where_table("pet", Conditions::new().eq("species", "dog"))
        .unwrap()
        .order_by("name")
        .limit(5)
        .build_count()
        .unwrap();
    assert_eq!(
        sql,
        r#"SELECT COUNT(*) AS "c" FROM "person" "t1" JOIN "pet" "t2" ON "t2"."owner_id" = "t1"."id" WHERE "t2"."species" = 'dog'"#
    );
}

#[test]
fn test_dml_statements() {
    let q = query();
    assert_eq!(
        q.insert().table("person").set("name", "O'Brien").build().unwrap(),
        r#"INSERT INTO "person" ("name") VALUES ('O''Brien')"#
    );
    assert_eq!(
        q.update()
            .table("person")
            .set("age", 40)
            .where_conditions(Conditions::new().eq("id", 1))
            .build()
            .unwrap(),
        r#"UPDATE "person" SET "age" = 40 WHERE "id" = 1"#
    );
    assert_eq!(
        q.remove().from("person").where_conditions(Conditions::new().is_null("email")).build().unwrap(),
        r#"DELETE FROM "person" WHERE "email" IS NULL"#
    );
}
