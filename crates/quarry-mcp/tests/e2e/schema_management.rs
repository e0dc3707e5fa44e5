//! create_table, alter_table, drop_table, create_index and drop_index tests.

use super::common::*;
use serde_json::{Value, json};

async fn column_names(d: &quarry_mcp::Dispatcher, table: &str) -> Vec<String> {
    let described = call_ok(d, "describe_table", json!({ "table": table })).await;
    described["columns"]
        .as_array()
        .map(|cols| {
            cols.iter()
                .filter_map(|c| c["name"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

pub async fn test_create_table(ctx: &TestContext) {
    println!("  🧪 test_create_table");
    let d = ctx.dispatcher("manage_create");

    let created = call_ok(
        &d,
        "create_table",
        json!({
            "table": "flags",
            "columns": [
                { "name": "id", "type": "INTEGER", "primaryKey": true },
                { "name": "enabled", "type": "BOOLEAN", "default": true },
                { "name": "weight", "type": "REAL", "default": 0.5 }
            ]
        }),
    )
    .await;
    assert_eq!(created, json!({ "table": "flags", "created": true }));

    call_ok(&d, "execute", json!({ "sql": "INSERT INTO flags (id) VALUES (1)" })).await;
    let row = call_ok(&d, "query", json!({ "sql": "SELECT enabled, weight FROM flags" })).await;
    assert_eq!(row["rows"][0], json!({ "enabled": 1, "weight": 0.5 }));

    let message = call_err(
        &d,
        "create_table",
        json!({ "table": "flags", "columns": [{ "name": "id", "type": "INTEGER" }] }),
    )
    .await;
    assert!(message.contains("already exists"), "got: {message}");

    call_ok(
        &d,
        "create_table",
        json!({
            "table": "flags",
            "columns": [{ "name": "id", "type": "INTEGER" }],
            "ifNotExists": true
        }),
    )
    .await;
    println!("     ✓ Table created with defaults; ifNotExists tolerates existing table");
}

pub async fn test_create_table_rejects_bad_input(ctx: &TestContext) {
    println!("  🧪 test_create_table_rejects_bad_input");
    let d = ctx.dispatcher("manage_bad_create");

    let message = call_err(&d, "create_table", json!({ "table": "t", "columns": [] })).await;
    assert!(message.contains("at least one column"), "got: {message}");

    let message = call_err(
        &d,
        "create_table",
        json!({ "table": "t", "columns": [{ "name": "x", "type": "TEXT); DROP TABLE t; --" }] }),
    )
    .await;
    assert!(message.contains("invalid column type"), "got: {message}");

    let message = call_err(&d, "create_table", json!({ "table": "t" })).await;
    assert!(message.contains("columns"), "got: {message}");

    let tables = call_ok(&d, "list_tables", json!({})).await;
    assert_eq!(tables["tables"], json!([]));
    println!("     ✓ Empty columns, unsafe types and missing fields rejected");
}

pub async fn test_alter_table_actions(ctx: &TestContext) {
    println!("  🧪 test_alter_table_actions");
    let d = ctx.dispatcher("manage_alter");
    create_people(&d).await;

    let added = call_ok(
        &d,
        "alter_table",
        json!({
            "table": "people",
            "action": "add_column",
            "params": { "column": "age", "type": "INTEGER", "notNull": true, "default": 0 }
        }),
    )
    .await;
    assert_eq!(added, json!({ "table": "people", "action": "add_column" }));
    assert!(column_names(&d, "people").await.contains(&"age".to_string()));

    call_ok(
        &d,
        "alter_table",
        json!({
            "table": "people",
            "action": "rename_column",
            "params": { "oldName": "age", "newName": "years" }
        }),
    )
    .await;
    let columns = column_names(&d, "people").await;
    assert!(columns.contains(&"years".to_string()));
    assert!(!columns.contains(&"age".to_string()));

    call_ok(
        &d,
        "alter_table",
        json!({
            "table": "people",
            "action": "rename_table",
            "params": { "newName": "persons" }
        }),
    )
    .await;
    let tables = call_ok(&d, "list_tables", json!({})).await;
    let names: Vec<&Value> = tables["tables"]
        .as_array()
        .map(|t| t.iter().map(|t| &t["name"]).collect())
        .unwrap_or_default();
    assert_eq!(names, vec![&json!("persons")]);
    println!("     ✓ add_column, rename_column and rename_table applied");
}

pub async fn test_alter_table_rejects_unknown_action(ctx: &TestContext) {
    println!("  🧪 test_alter_table_rejects_unknown_action");
    let d = ctx.dispatcher("manage_alter_bad");
    create_people(&d).await;

    let message = call_err(
        &d,
        "alter_table",
        json!({ "table": "people", "action": "drop_column", "params": { "column": "email" } }),
    )
    .await;
    assert!(message.contains("unknown alter_table action: drop_column"), "got: {message}");

    let message = call_err(
        &d,
        "alter_table",
        json!({ "table": "people", "action": "rename_table", "params": {} }),
    )
    .await;
    assert!(message.contains("params.newName"), "got: {message}");

    assert!(column_names(&d, "people").await.contains(&"email".to_string()));
    println!("     ✓ Unsupported actions and missing params leave the table unchanged");
}

pub async fn test_drop_table(ctx: &TestContext) {
    println!("  🧪 test_drop_table");
    let d = ctx.dispatcher("manage_drop");
    create_people(&d).await;

    let dropped = call_ok(&d, "drop_table", json!({ "table": "people" })).await;
    assert_eq!(dropped, json!({ "table": "people", "dropped": true }));

    let message = call_err(&d, "drop_table", json!({ "table": "people" })).await;
    assert!(message.contains("no such table: people"), "got: {message}");

    call_ok(&d, "drop_table", json!({ "table": "people", "ifExists": true })).await;
    println!("     ✓ Missing table is an error unless ifExists");
}

pub async fn test_create_and_drop_index(ctx: &TestContext) {
    println!("  🧪 test_create_and_drop_index");
    let d = ctx.dispatcher("manage_index");
    call_ok(
        &d,
        "create_table",
        json!({
            "table": "t",
            "columns": [
                { "name": "a", "type": "TEXT" },
                { "name": "b", "type": "TEXT" }
            ]
        }),
    )
    .await;

    let derived = call_ok(&d, "create_index", json!({ "table": "t", "columns": ["a", "b"] })).await;
    assert_eq!(
        derived,
        json!({ "indexName": "idx_t_a_b", "table": "t", "columns": ["a", "b"] })
    );

    let named = call_ok(
        &d,
        "create_index",
        json!({ "table": "t", "columns": ["b"], "indexName": "t_b_unique", "unique": true }),
    )
    .await;
    assert_eq!(named["indexName"], "t_b_unique");

    let indexes = call_ok(&d, "list_indexes", json!({ "table": "t" })).await;
    let unique = indexes["indexes"]
        .as_array()
        .and_then(|list| list.iter().find(|i| i["name"] == "t_b_unique"))
        .expect("named index listed");
    assert_eq!(unique["unique"], true);

    let message = call_err(&d, "create_index", json!({ "table": "t", "columns": ["a", "b"] })).await;
    assert!(message.contains("already exists"), "got: {message}");
    call_ok(
        &d,
        "create_index",
        json!({ "table": "t", "columns": ["a", "b"], "ifNotExists": true }),
    )
    .await;

    let dropped = call_ok(&d, "drop_index", json!({ "indexName": "idx_t_a_b" })).await;
    assert_eq!(dropped, json!({ "indexName": "idx_t_a_b", "dropped": true }));

    let message = call_err(&d, "drop_index", json!({ "indexName": "idx_t_a_b" })).await;
    assert!(message.contains("no such index: idx_t_a_b"), "got: {message}");
    call_ok(&d, "drop_index", json!({ "indexName": "idx_t_a_b", "ifExists": true })).await;
    println!("     ✓ Derived names, unique indexes and ifExists/ifNotExists");
}

pub async fn run_all_tests(ctx: &TestContext) {
    println!("\n📦 SCHEMA MANAGEMENT");
    test_create_table(ctx).await;
    test_create_table_rejects_bad_input(ctx).await;
    test_alter_table_actions(ctx).await;
    test_alter_table_rejects_unknown_action(ctx).await;
    test_drop_table(ctx).await;
    test_create_and_drop_index(ctx).await;
}
