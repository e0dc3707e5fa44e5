//! SQL text shared by both backing-store clients.
//!
//! Identifiers are always double-quoted with embedded quotes doubled, so
//! caller-supplied names never change the shape of a statement.

use crate::error::StoreError;
use serde::Deserialize;
use serde_json::Value;

/// Lists user-visible tables and views, name-sorted.
pub const LIST_TABLES_SQL: &str =
    "SELECT name, type FROM sqlite_master WHERE type IN ('table', 'view') ORDER BY name";

/// Lists every table name, including internal ones.
pub const TABLE_NAMES_SQL: &str = "SELECT name FROM sqlite_master WHERE type = 'table'";

/// Looks up the creating statement of a table or view.
pub const TABLE_DDL_SQL: &str =
    "SELECT sql FROM sqlite_master WHERE type IN ('table', 'view') AND name = ?";

/// Prefixes of tables managed by SQLite, libSQL and their replication tooling.
const INTERNAL_PREFIXES: &[&str] = &["sqlite_", "_litestream_", "libsql_", "_cf_"];

/// Quote an identifier.
pub fn quote_ident(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}

/// Quote a string literal.
pub fn quote_literal(value: &str) -> String {
    format!("'{}'", value.replace('\'', "''"))
}

/// Whether a table belongs to the engine or its tooling rather than the user.
pub fn is_internal_table(name: &str) -> bool {
    INTERNAL_PREFIXES.iter().any(|prefix| name.starts_with(prefix))
}

pub fn count_rows_sql(table: &str) -> String {
    format!("SELECT COUNT(*) FROM {}", quote_ident(table))
}

pub fn pragma_sql(pragma: &str, argument: &str) -> String {
    format!("PRAGMA {pragma}({})", quote_ident(argument))
}

/// Render a JSON scalar as a `DEFAULT` literal.
pub fn default_literal(value: &Value) -> Result<String, StoreError> {
    match value {
        Value::Null => Ok("NULL".to_string()),
        Value::Bool(true) => Ok("TRUE".to_string()),
        Value::Bool(false) => Ok("FALSE".to_string()),
        Value::Number(n) => Ok(n.to_string()),
        Value::String(s) => Ok(quote_literal(s)),
        Value::Array(_) | Value::Object(_) => Err(StoreError::InvalidArguments(
            "default must be a string, number, boolean or null".to_string(),
        )),
    }
}

/// Declared column types are spliced in unquoted, so only type-name
/// characters are accepted (`INTEGER`, `VARCHAR(255)`, `NUMERIC(10, 2)`).
fn check_type_name(data_type: &str) -> Result<&str, StoreError> {
    let trimmed = data_type.trim();
    let valid = !trimmed.is_empty()
        && trimmed
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '_' | ' ' | '(' | ')' | ',' | '.' | '+' | '-'));
    if valid {
        Ok(trimmed)
    } else {
        Err(StoreError::InvalidArguments(format!(
            "invalid column type: {data_type:?}"
        )))
    }
}

/// Column of a `create_table` request.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ColumnDefinition {
    pub name: String,
    #[serde(rename = "type")]
    pub data_type: String,
    #[serde(default)]
    pub primary_key: bool,
    #[serde(default)]
    pub not_null: bool,
    #[serde(default)]
    pub unique: bool,
    #[serde(default)]
    pub default: Option<Value>,
}

impl ColumnDefinition {
    pub fn to_sql(&self) -> Result<String, StoreError> {
        let mut sql = format!(
            "{} {}",
            quote_ident(&self.name),
            check_type_name(&self.data_type)?
        );
        if self.primary_key {
            sql.push_str(" PRIMARY KEY");
        }
        if self.not_null {
            sql.push_str(" NOT NULL");
        }
        if self.unique {
            sql.push_str(" UNIQUE");
        }
        if let Some(default) = &self.default {
            sql.push_str(" DEFAULT ");
            sql.push_str(&default_literal(default)?);
        }
        Ok(sql)
    }
}

pub fn create_table_sql(
    table: &str,
    columns: &[ColumnDefinition],
    if_not_exists: bool,
) -> Result<String, StoreError> {
    if columns.is_empty() {
        return Err(StoreError::InvalidArguments(
            "at least one column is required".to_string(),
        ));
    }
    let columns = columns
        .iter()
        .map(ColumnDefinition::to_sql)
        .collect::<Result<Vec<_>, _>>()?;
    Ok(format!(
        "CREATE TABLE {}{} ({})",
        if if_not_exists { "IF NOT EXISTS " } else { "" },
        quote_ident(table),
        columns.join(", ")
    ))
}

pub fn drop_table_sql(table: &str, if_exists: bool) -> String {
    format!(
        "DROP TABLE {}{}",
        if if_exists { "IF EXISTS " } else { "" },
        quote_ident(table)
    )
}

/// One structural change to an existing table.
#[derive(Debug, Clone, PartialEq)]
pub enum AlterAction {
    AddColumn {
        column: String,
        data_type: String,
        not_null: bool,
        default: Option<Value>,
    },
    RenameColumn {
        old_name: String,
        new_name: String,
    },
    RenameTable {
        new_name: String,
    },
}

impl AlterAction {
    pub const NAMES: [&'static str; 3] = ["add_column", "rename_column", "rename_table"];

    /// Build an action from its name and the free-form `params` object.
    pub fn parse(action: &str, params: &Value) -> Result<Self, StoreError> {
        let text = |key: &str| -> Result<String, StoreError> {
            params
                .get(key)
                .and_then(Value::as_str)
                .map(str::to_string)
                .ok_or_else(|| {
                    StoreError::InvalidArguments(format!("{action} requires params.{key}"))
                })
        };

        match action {
            "add_column" => Ok(AlterAction::AddColumn {
                column: text("column")?,
                data_type: text("type")?,
                not_null: params
                    .get("notNull")
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                default: params.get("default").filter(|v| !v.is_null()).cloned(),
            }),
            "rename_column" => Ok(AlterAction::RenameColumn {
                old_name: text("oldName")?,
                new_name: text("newName")?,
            }),
            "rename_table" => Ok(AlterAction::RenameTable {
                new_name: text("newName")?,
            }),
            other => Err(StoreError::UnknownAction(other.to_string())),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            AlterAction::AddColumn { .. } => "add_column",
            AlterAction::RenameColumn { .. } => "rename_column",
            AlterAction::RenameTable { .. } => "rename_table",
        }
    }

    pub fn to_sql(&self, table: &str) -> Result<String, StoreError> {
        let table = quote_ident(table);
        match self {
            AlterAction::AddColumn {
                column,
                data_type,
                not_null,
                default,
            } => {
                let mut sql = format!(
                    "ALTER TABLE {table} ADD COLUMN {} {}",
                    quote_ident(column),
                    check_type_name(data_type)?
                );
                if *not_null {
                    sql.push_str(" NOT NULL");
                }
                if let Some(default) = default {
                    sql.push_str(" DEFAULT ");
                    sql.push_str(&default_literal(default)?);
                }
                Ok(sql)
            }
            AlterAction::RenameColumn { old_name, new_name } => Ok(format!(
                "ALTER TABLE {table} RENAME COLUMN {} TO {}",
                quote_ident(old_name),
                quote_ident(new_name)
            )),
            AlterAction::RenameTable { new_name } => Ok(format!(
                "ALTER TABLE {table} RENAME TO {}",
                quote_ident(new_name)
            )),
        }
    }
}

/// A `create_index` request.
#[derive(Debug, Clone, PartialEq)]
pub struct IndexSpec {
    pub table: String,
    pub columns: Vec<String>,
    pub index_name: Option<String>,
    pub unique: bool,
    pub if_not_exists: bool,
}

impl IndexSpec {
    /// The explicit name, or `idx_<table>_<col1>_<col2>...`.
    pub fn name(&self) -> String {
        match &self.index_name {
            Some(name) if !name.is_empty() => name.clone(),
            _ => derive_index_name(&self.table, &self.columns),
        }
    }

    pub fn to_sql(&self) -> Result<String, StoreError> {
        if self.columns.is_empty() {
            return Err(StoreError::InvalidArguments(
                "at least one column is required".to_string(),
            ));
        }
        let columns: Vec<String> = self.columns.iter().map(|c| quote_ident(c)).collect();
        Ok(format!(
            "CREATE {}INDEX {}{} ON {} ({})",
            if self.unique { "UNIQUE " } else { "" },
            if self.if_not_exists { "IF NOT EXISTS " } else { "" },
            quote_ident(&self.name()),
            quote_ident(&self.table),
            columns.join(", ")
        ))
    }
}

pub fn derive_index_name(table: &str, columns: &[String]) -> String {
    format!("idx_{}_{}", table, columns.join("_"))
}

pub fn drop_index_sql(index: &str, if_exists: bool) -> String {
    format!(
        "DROP INDEX {}{}",
        if if_exists { "IF EXISTS " } else { "" },
        quote_ident(index)
    )
}

/// Split a script into statements on `;`.
///
/// The split is lexical: a semicolon inside a string literal, comment or
/// trigger body also ends a statement.
pub fn split_statements(script: &str) -> Vec<&str> {
    script
        .split(';')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .collect()
}
