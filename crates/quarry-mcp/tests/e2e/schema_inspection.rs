//! list_tables, describe_table, list_indexes and list_foreign_keys tests.

use super::common::*;
use serde_json::json;

async fn seed_library(d: &quarry_mcp::Dispatcher) {
    call_ok(
        d,
        "run_script",
        json!({
            "sql": "CREATE TABLE authors (id INTEGER PRIMARY KEY AUTOINCREMENT, name TEXT NOT NULL);\n\
                    CREATE TABLE books (\n\
                        id INTEGER PRIMARY KEY,\n\
                        title TEXT NOT NULL DEFAULT 'untitled',\n\
                        isbn TEXT UNIQUE,\n\
                        author_id INTEGER REFERENCES authors(id) ON DELETE CASCADE\n\
                    );\n\
                    CREATE INDEX idx_books_title ON books (title);\n\
                    CREATE VIEW recent AS SELECT title FROM books;\n\
                    INSERT INTO authors (name) VALUES ('Le Guin'), ('Herbert');\n\
                    INSERT INTO books (title, author_id) VALUES ('Dune', 2);"
        }),
    )
    .await;
}

pub async fn test_list_tables_empty_database(ctx: &TestContext) {
    println!("  🧪 test_list_tables_empty_database");
    let d = ctx.dispatcher("inspect_empty");

    let result = call_ok(&d, "list_tables", json!({})).await;
    assert_eq!(result, json!({ "tables": [] }));
    println!("     ✓ Empty database lists no tables");
}

pub async fn test_list_tables_counts_rows(ctx: &TestContext) {
    println!("  🧪 test_list_tables_counts_rows");
    let d = ctx.dispatcher("inspect_library");
    seed_library(&d).await;

    let result = call_ok(&d, "list_tables", json!({})).await;
    let tables = result["tables"].as_array().expect("tables array");
    let names: Vec<&str> = tables.iter().filter_map(|t| t["name"].as_str()).collect();

    // sqlite_sequence exists because of AUTOINCREMENT but is internal.
    assert_eq!(names, vec!["authors", "books", "recent"]);
    assert_eq!(tables[0], json!({ "name": "authors", "type": "table", "rowCount": 2 }));
    assert_eq!(tables[1]["rowCount"], 1);
    assert_eq!(tables[2]["type"], "view");
    println!("     ✓ Sorted names, kinds and row counts; internal tables hidden");
}

pub async fn test_list_tables_empty_and_filled(ctx: &TestContext) {
    println!("  🧪 test_list_tables_empty_and_filled");
    let d = ctx.dispatcher("inspect_counts");
    call_ok(
        &d,
        "run_script",
        json!({
            "sql": "CREATE TABLE empty (id INTEGER);\n\
                       CREATE TABLE full (id INTEGER);\n\
                       INSERT INTO full VALUES (1), (2), (3);"
        }),
    )
    .await;

    let result = call_ok(&d, "list_tables", json!({})).await;
    assert_eq!(
        result["tables"],
        json!([
            { "name": "empty", "type": "table", "rowCount": 0 },
            { "name": "full", "type": "table", "rowCount": 3 }
        ])
    );
    println!("     ✓ A 0-row table is listed next to a 3-row table");
}

pub async fn test_describe_table(ctx: &TestContext) {
    println!("  🧪 test_describe_table");
    let d = ctx.dispatcher("inspect_describe");
    seed_library(&d).await;

    let result = call_ok(&d, "describe_table", json!({ "table": "books" })).await;
    assert_eq!(result["table"], "books");
    assert!(
        result["sql"]
            .as_str()
            .is_some_and(|s| s.starts_with("CREATE TABLE books"))
    );

    let columns = result["columns"].as_array().expect("columns array");
    assert_eq!(columns.len(), 4);
    assert_eq!(columns[0]["name"], "id");
    assert_eq!(columns[0]["primaryKey"], true);
    assert_eq!(columns[1]["type"], "TEXT");
    assert_eq!(columns[1]["notNull"], true);
    assert_eq!(columns[1]["defaultValue"], "'untitled'");
    assert_eq!(columns[3]["position"], 3);
    assert!(columns[3]["defaultValue"].is_null());

    let message = call_err(&d, "describe_table", json!({ "table": "ghosts" })).await;
    assert!(message.contains("no such table: ghosts"), "got: {message}");
    println!("     ✓ Columns, flags, defaults and DDL reported");
}

pub async fn test_list_indexes(ctx: &TestContext) {
    println!("  🧪 test_list_indexes");
    let d = ctx.dispatcher("inspect_indexes");
    seed_library(&d).await;

    let result = call_ok(&d, "list_indexes", json!({ "table": "books" })).await;
    assert_eq!(result["table"], "books");

    let indexes = result["indexes"].as_array().expect("indexes array");
    assert_eq!(indexes.len(), 2);

    let explicit = indexes
        .iter()
        .find(|i| i["name"] == "idx_books_title")
        .expect("explicit index listed");
    assert_eq!(explicit["unique"], false);
    assert_eq!(explicit["origin"], "c");
    assert_eq!(explicit["columns"], json!(["title"]));

    let implicit = indexes
        .iter()
        .find(|i| i["origin"] == "u")
        .expect("unique constraint index listed");
    assert_eq!(implicit["unique"], true);
    assert_eq!(implicit["columns"], json!(["isbn"]));

    let none = call_ok(&d, "list_indexes", json!({ "table": "authors" })).await;
    assert_eq!(none["indexes"], json!([]));
    println!("     ✓ Explicit and constraint indexes with columns");
}

pub async fn test_list_foreign_keys(ctx: &TestContext) {
    println!("  🧪 test_list_foreign_keys");
    let d = ctx.dispatcher("inspect_fks");
    seed_library(&d).await;

    let result = call_ok(&d, "list_foreign_keys", json!({ "table": "books" })).await;
    assert_eq!(result["table"], "books");
    let keys = result["foreignKeys"].as_array().expect("foreignKeys array");
    assert_eq!(keys.len(), 1);
    assert_eq!(keys[0]["table"], "authors");
    assert_eq!(keys[0]["from"], "author_id");
    assert_eq!(keys[0]["to"], "id");
    assert_eq!(keys[0]["onDelete"], "CASCADE");
    assert_eq!(keys[0]["onUpdate"], "NO ACTION");

    let none = call_ok(&d, "list_foreign_keys", json!({ "table": "authors" })).await;
    assert_eq!(none["foreignKeys"], json!([]));
    println!("     ✓ Foreign key edges reported");
}

pub async fn run_all_tests(ctx: &TestContext) {
    println!("\n📦 SCHEMA INSPECTION");
    test_list_tables_empty_database(ctx).await;
    test_list_tables_counts_rows(ctx).await;
    test_list_tables_empty_and_filled(ctx).await;
    test_describe_table(ctx).await;
    test_list_indexes(ctx).await;
    test_list_foreign_keys(ctx).await;
}
