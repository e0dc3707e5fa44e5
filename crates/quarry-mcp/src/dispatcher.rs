//! Tool dispatch.
//!
//! The dispatcher maps a `(tool name, arguments)` pair onto a typed call
//! against the resolved [`DatabaseClient`] and wraps the outcome in a
//! [`CallToolResponse`]. Every failure ends up in the envelope; nothing
//! escapes `dispatch`.

use crate::error::{DispatchError, StoreError};
use crate::protocol::{CallToolResponse, ToolDefinition};
use crate::resolver::ConnectionResolver;
use crate::store::{AlterAction, ColumnDefinition, DatabaseClient, IndexSpec, SqlValue};
use crate::tools::{ToolCatalog, ToolKind};
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value, json};
use std::sync::Arc;
use std::time::Instant;

/// Routes tool calls to the backing store.
pub struct Dispatcher {
    catalog: &'static ToolCatalog,
    resolver: Arc<ConnectionResolver>,
}

impl Dispatcher {
    pub fn new(resolver: Arc<ConnectionResolver>) -> Self {
        Self {
            catalog: ToolCatalog::global(),
            resolver,
        }
    }

    pub fn catalog(&self) -> &'static ToolCatalog {
        self.catalog
    }

    pub fn resolver(&self) -> &Arc<ConnectionResolver> {
        &self.resolver
    }

    /// Run one tool call. Always yields exactly one envelope.
    pub async fn dispatch(&self, name: &str, arguments: Value) -> CallToolResponse {
        let started = Instant::now();
        tracing::debug!(tool = name, "Dispatching tool call");

        match self.try_dispatch(name, arguments).await {
            Ok(payload) => {
                tracing::debug!(
                    tool = name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Tool call succeeded"
                );
                CallToolResponse::json(&payload)
            }
            Err(err) => {
                tracing::warn!(
                    tool = name,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %err,
                    "Tool call failed"
                );
                CallToolResponse::error(err.to_string())
            }
        }
    }

    async fn try_dispatch(&self, name: &str, arguments: Value) -> Result<Value, DispatchError> {
        let (kind, tool) = self
            .catalog
            .lookup(name)
            .ok_or_else(|| DispatchError::UnknownTool {
                name: name.to_string(),
            })?;

        let client = self.resolver.resolve().await?;

        let arguments = match arguments {
            Value::Null => Value::Object(Map::new()),
            other => other,
        };
        validate_arguments(tool, &arguments).map_err(|reason| DispatchError::InvalidArguments {
            tool: name.to_string(),
            reason,
        })?;

        let call = ToolCall::decode(kind, arguments).map_err(|e| DispatchError::InvalidArguments {
            tool: name.to_string(),
            reason: e.to_string(),
        })?;

        call.run(client.as_ref())
            .await
            .map_err(|e| DispatchError::from_store(name, e))
    }
}

/// Check required fields and top-level JSON types against the tool's schema.
fn validate_arguments(tool: &ToolDefinition, arguments: &Value) -> Result<(), String> {
    if !arguments.is_object() {
        return Err("arguments must be a JSON object".to_string());
    }
    let schema = &tool.input_schema;

    if let Some(required) = schema["required"].as_array() {
        for field in required.iter().filter_map(Value::as_str) {
            if arguments.get(field).is_none() {
                return Err(format!("missing required field: {field}"));
            }
        }
    }

    if let Some(props) = schema["properties"].as_object() {
        for (field, prop_schema) in props {
            let Some(value) = arguments.get(field) else {
                continue;
            };
            let matches = match &prop_schema["type"] {
                Value::String(expected) => check_type(value, expected),
                Value::Array(options) => options
                    .iter()
                    .filter_map(Value::as_str)
                    .any(|expected| check_type(value, expected)),
                _ => true,
            };
            if !matches {
                return Err(format!(
                    "invalid type for '{field}': expected {}, got {value}",
                    prop_schema["type"]
                ));
            }
        }
    }

    Ok(())
}

fn check_type(value: &Value, expected: &str) -> bool {
    match expected {
        "string" => value.is_string(),
        "integer" => value.is_i64() || value.is_u64(),
        "number" => value.is_number(),
        "boolean" => value.is_boolean(),
        "object" => value.is_object(),
        "array" => value.is_array(),
        "null" => value.is_null(),
        _ => true,
    }
}

#[derive(Debug, Deserialize)]
struct SqlArgs {
    sql: String,
    #[serde(default)]
    params: Vec<Value>,
}

#[derive(Debug, Deserialize)]
struct ScriptArgs {
    sql: String,
}

#[derive(Debug, Deserialize)]
struct TableArgs {
    table: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateTableArgs {
    table: String,
    columns: Vec<ColumnDefinition>,
    #[serde(default)]
    if_not_exists: bool,
}

#[derive(Debug, Deserialize)]
struct AlterTableArgs {
    table: String,
    action: String,
    #[serde(default)]
    params: Value,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DropTableArgs {
    table: String,
    #[serde(default)]
    if_exists: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateIndexArgs {
    table: String,
    columns: Vec<String>,
    #[serde(default)]
    index_name: Option<String>,
    #[serde(default)]
    unique: bool,
    #[serde(default)]
    if_not_exists: bool,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DropIndexArgs {
    index_name: String,
    #[serde(default)]
    if_exists: bool,
}

/// A decoded tool call.
#[derive(Debug)]
enum ToolCall {
    Query(SqlArgs),
    Execute(SqlArgs),
    RunScript(ScriptArgs),
    ListTables,
    DescribeTable(TableArgs),
    ListIndexes(TableArgs),
    ListForeignKeys(TableArgs),
    CreateTable(CreateTableArgs),
    AlterTable(AlterTableArgs),
    DropTable(DropTableArgs),
    CreateIndex(CreateIndexArgs),
    DropIndex(DropIndexArgs),
    DatabaseInfo,
    Vacuum,
    IntegrityCheck,
}

impl ToolCall {
    fn decode(kind: ToolKind, arguments: Value) -> Result<Self, serde_json::Error> {
        fn args<T: DeserializeOwned>(arguments: Value) -> Result<T, serde_json::Error> {
            serde_json::from_value(arguments)
        }

        Ok(match kind {
            ToolKind::Query => ToolCall::Query(args(arguments)?),
            ToolKind::Execute => ToolCall::Execute(args(arguments)?),
            ToolKind::RunScript => ToolCall::RunScript(args(arguments)?),
            ToolKind::ListTables => ToolCall::ListTables,
            ToolKind::DescribeTable => ToolCall::DescribeTable(args(arguments)?),
            ToolKind::ListIndexes => ToolCall::ListIndexes(args(arguments)?),
            ToolKind::ListForeignKeys => ToolCall::ListForeignKeys(args(arguments)?),
            ToolKind::CreateTable => ToolCall::CreateTable(args(arguments)?),
            ToolKind::AlterTable => ToolCall::AlterTable(args(arguments)?),
            ToolKind::DropTable => ToolCall::DropTable(args(arguments)?),
            ToolKind::CreateIndex => ToolCall::CreateIndex(args(arguments)?),
            ToolKind::DropIndex => ToolCall::DropIndex(args(arguments)?),
            ToolKind::DatabaseInfo => ToolCall::DatabaseInfo,
            ToolKind::Vacuum => ToolCall::Vacuum,
            ToolKind::IntegrityCheck => ToolCall::IntegrityCheck,
        })
    }

    async fn run(self, client: &dyn DatabaseClient) -> Result<Value, StoreError> {
        match self {
            ToolCall::Query(args) => {
                let params = SqlValue::from_json_list(&args.params)?;
                Ok(client.query(&args.sql, &params).await?.to_json())
            }
            ToolCall::Execute(args) => {
                let params = SqlValue::from_json_list(&args.params)?;
                let result = client.execute(&args.sql, &params).await?;
                Ok(json!(result))
            }
            ToolCall::RunScript(args) => Ok(json!(client.run_script(&args.sql).await?)),
            ToolCall::ListTables => Ok(json!({ "tables": client.list_tables().await? })),
            ToolCall::DescribeTable(args) => Ok(json!(client.describe_table(&args.table).await?)),
            ToolCall::ListIndexes(args) => {
                let indexes = client.list_indexes(&args.table).await?;
                Ok(json!({ "table": args.table, "indexes": indexes }))
            }
            ToolCall::ListForeignKeys(args) => {
                let keys = client.list_foreign_keys(&args.table).await?;
                Ok(json!({ "table": args.table, "foreignKeys": keys }))
            }
            ToolCall::CreateTable(args) => {
                client
                    .create_table(&args.table, &args.columns, args.if_not_exists)
                    .await?;
                Ok(json!({ "table": args.table, "created": true }))
            }
            ToolCall::AlterTable(args) => {
                let action = AlterAction::parse(&args.action, &args.params)?;
                client.alter_table(&args.table, &action).await?;
                Ok(json!({ "table": args.table, "action": action.name() }))
            }
            ToolCall::DropTable(args) => {
                client.drop_table(&args.table, args.if_exists).await?;
                Ok(json!({ "table": args.table, "dropped": true }))
            }
            ToolCall::CreateIndex(args) => {
                let spec = IndexSpec {
                    table: args.table,
                    columns: args.columns,
                    index_name: args.index_name,
                    unique: args.unique,
                    if_not_exists: args.if_not_exists,
                };
                let index_name = client.create_index(&spec).await?;
                Ok(json!({
                    "indexName": index_name,
                    "table": spec.table,
                    "columns": spec.columns,
                }))
            }
            ToolCall::DropIndex(args) => {
                client.drop_index(&args.index_name, args.if_exists).await?;
                Ok(json!({ "indexName": args.index_name, "dropped": true }))
            }
            ToolCall::DatabaseInfo => Ok(json!(client.get_info().await?)),
            ToolCall::Vacuum => Ok(json!(client.vacuum().await?)),
            ToolCall::IntegrityCheck => Ok(json!(client.integrity_check().await?)),
        }
    }
}
