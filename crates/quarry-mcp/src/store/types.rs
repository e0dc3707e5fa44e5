//! Result types returned by backing-store clients.

use super::value::{SqlValue, json_integer};
use serde::{Serialize, Serializer};
use serde_json::{Map, Value, json};

/// Rows of a read statement, with column names in result order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryResult {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<SqlValue>>,
}

impl QueryResult {
    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    /// Iterate rows with by-name access.
    pub fn records(&self) -> impl Iterator<Item = Record<'_>> {
        self.rows.iter().map(|values| Record {
            columns: &self.columns,
            values,
        })
    }

    /// First column of the first row.
    pub fn scalar(&self) -> Option<&SqlValue> {
        self.rows.first().and_then(|row| row.first())
    }

    /// `{columns, rows, rowCount}` with each row keyed by column name.
    pub fn to_json(&self) -> Value {
        let rows: Vec<Value> = self
            .rows
            .iter()
            .map(|row| {
                let object: Map<String, Value> = self
                    .columns
                    .iter()
                    .cloned()
                    .zip(row.iter().map(SqlValue::to_json))
                    .collect();
                Value::Object(object)
            })
            .collect();
        json!({
            "columns": self.columns,
            "rows": rows,
            "rowCount": self.row_count(),
        })
    }
}

impl Serialize for QueryResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        self.to_json().serialize(serializer)
    }
}

/// A row view over a [`QueryResult`].
#[derive(Debug, Clone, Copy)]
pub struct Record<'a> {
    columns: &'a [String],
    values: &'a [SqlValue],
}

impl<'a> Record<'a> {
    pub fn get(&self, column: &str) -> Option<&'a SqlValue> {
        self.columns
            .iter()
            .position(|c| c == column)
            .and_then(|i| self.values.get(i))
    }

    pub fn text(&self, column: &str) -> String {
        self.get(column).and_then(SqlValue::as_text).unwrap_or_default()
    }

    pub fn opt_text(&self, column: &str) -> Option<String> {
        self.get(column).and_then(SqlValue::as_text)
    }

    pub fn integer(&self, column: &str) -> i64 {
        self.get(column).and_then(SqlValue::as_i64).unwrap_or(0)
    }

    pub fn flag(&self, column: &str) -> bool {
        self.integer(column) != 0
    }
}

/// Outcome of a mutating statement.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExecuteResult {
    pub rows_affected: u64,
    #[serde(serialize_with = "serialize_rowid")]
    pub last_insert_rowid: Option<i64>,
}

fn serialize_rowid<S: Serializer>(rowid: &Option<i64>, serializer: S) -> Result<S::Ok, S::Error> {
    match rowid {
        Some(id) => json_integer(*id).serialize(serializer),
        None => serializer.serialize_none(),
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ScriptResult {
    pub statements_executed: usize,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableInfo {
    pub name: String,
    #[serde(rename = "type")]
    pub kind: String,
    pub row_count: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnInfo {
    pub position: i64,
    pub name: String,
    #[serde(rename = "type")]
    pub declared_type: String,
    pub not_null: bool,
    pub default_value: Option<String>,
    pub primary_key: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TableDescription {
    pub table: String,
    pub columns: Vec<ColumnInfo>,
    /// Creating statement, empty when the engine does not report one.
    pub sql: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexInfo {
    pub name: String,
    pub unique: bool,
    /// `c` for CREATE INDEX, `u` for UNIQUE constraints, `pk` for primary keys.
    pub origin: String,
    pub partial: bool,
    pub columns: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ForeignKeyInfo {
    pub id: i64,
    pub seq: i64,
    pub table: String,
    pub from: String,
    /// `None` when the key references the parent's primary key implicitly.
    pub to: Option<String>,
    pub on_update: String,
    pub on_delete: String,
    #[serde(rename = "match")]
    pub match_type: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DatabaseInfo {
    /// Absolute file path, `:memory:`, or the remote URL.
    pub path: String,
    pub size_bytes: u64,
    pub table_count: u64,
    pub page_count: u64,
    pub page_size: u64,
    pub journal_mode: String,
    pub wal_mode: bool,
    pub encoding: String,
    pub sqlite_version: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct VacuumResult {
    pub size_before: u64,
    pub size_after: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct IntegrityReport {
    pub ok: bool,
    pub results: Vec<String>,
}

impl IntegrityReport {
    /// The database is intact only when the check reports exactly `ok`.
    pub fn from_results(results: Vec<String>) -> Self {
        let ok = results.len() == 1 && results[0] == "ok";
        Self { ok, results }
    }
}
