//! Tool catalog.
//!
//! The catalog is a fixed, ordered set of tool definitions built once per
//! process. Each tool is identified by a [`ToolKind`]; the input schemas
//! below are published verbatim through `tools/list`.

use crate::protocol::{ToolAnnotations, ToolDefinition};
use serde_json::{Value, json};
use std::sync::LazyLock;

/// Logical grouping of tools.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolGroup {
    QueryExecute,
    SchemaInspection,
    SchemaManagement,
    IndexManagement,
    DatabaseManagement,
}

impl ToolGroup {
    pub fn as_str(&self) -> &'static str {
        match self {
            ToolGroup::QueryExecute => "query",
            ToolGroup::SchemaInspection => "schema-inspection",
            ToolGroup::SchemaManagement => "schema-management",
            ToolGroup::IndexManagement => "index-management",
            ToolGroup::DatabaseManagement => "database-management",
        }
    }
}

/// One variant per tool in the catalog.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ToolKind {
    Query,
    Execute,
    RunScript,
    ListTables,
    DescribeTable,
    ListIndexes,
    ListForeignKeys,
    CreateTable,
    AlterTable,
    DropTable,
    CreateIndex,
    DropIndex,
    DatabaseInfo,
    Vacuum,
    IntegrityCheck,
}

impl ToolKind {
    /// Every tool, in catalog order.
    pub const ALL: [ToolKind; 15] = [
        ToolKind::Query,
        ToolKind::Execute,
        ToolKind::RunScript,
        ToolKind::ListTables,
        ToolKind::DescribeTable,
        ToolKind::ListIndexes,
        ToolKind::ListForeignKeys,
        ToolKind::CreateTable,
        ToolKind::AlterTable,
        ToolKind::DropTable,
        ToolKind::CreateIndex,
        ToolKind::DropIndex,
        ToolKind::DatabaseInfo,
        ToolKind::Vacuum,
        ToolKind::IntegrityCheck,
    ];

    pub fn name(self) -> &'static str {
        match self {
            ToolKind::Query => "query",
            ToolKind::Execute => "execute",
            ToolKind::RunScript => "run_script",
            ToolKind::ListTables => "list_tables",
            ToolKind::DescribeTable => "describe_table",
            ToolKind::ListIndexes => "list_indexes",
            ToolKind::ListForeignKeys => "list_foreign_keys",
            ToolKind::CreateTable => "create_table",
            ToolKind::AlterTable => "alter_table",
            ToolKind::DropTable => "drop_table",
            ToolKind::CreateIndex => "create_index",
            ToolKind::DropIndex => "drop_index",
            ToolKind::DatabaseInfo => "database_info",
            ToolKind::Vacuum => "vacuum",
            ToolKind::IntegrityCheck => "integrity_check",
        }
    }

    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    pub fn group(self) -> ToolGroup {
        match self {
            ToolKind::Query | ToolKind::Execute | ToolKind::RunScript => ToolGroup::QueryExecute,
            ToolKind::ListTables
            | ToolKind::DescribeTable
            | ToolKind::ListIndexes
            | ToolKind::ListForeignKeys => ToolGroup::SchemaInspection,
            ToolKind::CreateTable | ToolKind::AlterTable | ToolKind::DropTable => {
                ToolGroup::SchemaManagement
            }
            ToolKind::CreateIndex | ToolKind::DropIndex => ToolGroup::IndexManagement,
            ToolKind::DatabaseInfo | ToolKind::Vacuum | ToolKind::IntegrityCheck => {
                ToolGroup::DatabaseManagement
            }
        }
    }

    fn title(self) -> &'static str {
        match self {
            ToolKind::Query => "Run query",
            ToolKind::Execute => "Execute statement",
            ToolKind::RunScript => "Run SQL script",
            ToolKind::ListTables => "List tables",
            ToolKind::DescribeTable => "Describe table",
            ToolKind::ListIndexes => "List indexes",
            ToolKind::ListForeignKeys => "List foreign keys",
            ToolKind::CreateTable => "Create table",
            ToolKind::AlterTable => "Alter table",
            ToolKind::DropTable => "Drop table",
            ToolKind::CreateIndex => "Create index",
            ToolKind::DropIndex => "Drop index",
            ToolKind::DatabaseInfo => "Database info",
            ToolKind::Vacuum => "Vacuum database",
            ToolKind::IntegrityCheck => "Check integrity",
        }
    }

    fn description(self) -> &'static str {
        match self {
            ToolKind::Query => {
                "Run a read-only SQL statement (SELECT, PRAGMA, EXPLAIN) and return the \
                 column names, the rows as objects keyed by column, and the row count. \
                 Values are passed as positional `?` parameters. Statements that change \
                 data are refused; use execute for those."
            }
            ToolKind::Execute => {
                "Run a single INSERT, UPDATE, DELETE or other mutating statement and return \
                 the number of affected rows and the last inserted rowid."
            }
            ToolKind::RunScript => {
                "Run several statements separated by semicolons as one transaction: either \
                 all of them take effect or none do. Splitting is purely lexical, so \
                 semicolons inside string literals or comments also split."
            }
            ToolKind::ListTables => {
                "List user tables and views in name order with their row counts. Internal \
                 SQLite and replication tables are omitted."
            }
            ToolKind::DescribeTable => {
                "Describe the columns of a table (position, name, type, NOT NULL, default, \
                 primary key) along with its CREATE statement."
            }
            ToolKind::ListIndexes => "List the indexes defined on a table and their columns.",
            ToolKind::ListForeignKeys => "List the foreign keys declared on a table.",
            ToolKind::CreateTable => {
                "Create a table from a list of column definitions. String defaults are \
                 quoted automatically."
            }
            ToolKind::AlterTable => {
                "Change an existing table. Supported actions: add_column (params: column, \
                 type, notNull, default), rename_column (params: oldName, newName) and \
                 rename_table (params: newName)."
            }
            ToolKind::DropTable => "Drop a table. With ifExists, a missing table is not an error.",
            ToolKind::CreateIndex => {
                "Create an index on one or more columns. Without indexName the index is \
                 named idx_<table>_<column1>_<column2>..."
            }
            ToolKind::DropIndex => "Drop an index. With ifExists, a missing index is not an error.",
            ToolKind::DatabaseInfo => {
                "Report the database location, size, table count, page layout, journal \
                 mode, text encoding and SQLite version."
            }
            ToolKind::Vacuum => "Rebuild the database to reclaim free space and report its size before and after.",
            ToolKind::IntegrityCheck => {
                "Run PRAGMA integrity_check. ok is true only when SQLite reports a single \"ok\"."
            }
        }
    }

    fn annotations(self) -> ToolAnnotations {
        let (read_only, destructive, idempotent) = match self {
            ToolKind::Query
            | ToolKind::ListTables
            | ToolKind::DescribeTable
            | ToolKind::ListIndexes
            | ToolKind::ListForeignKeys
            | ToolKind::DatabaseInfo
            | ToolKind::IntegrityCheck => (true, false, true),
            ToolKind::Execute | ToolKind::RunScript | ToolKind::DropTable | ToolKind::DropIndex => {
                (false, true, false)
            }
            ToolKind::CreateTable | ToolKind::AlterTable | ToolKind::CreateIndex => {
                (false, false, false)
            }
            ToolKind::Vacuum => (false, false, true),
        };
        ToolAnnotations {
            read_only,
            destructive,
            idempotent,
            open_world: true,
        }
    }

    fn input_schema(self) -> Value {
        match self {
            ToolKind::Query | ToolKind::Execute => json!({
                "type": "object",
                "properties": {
                    "sql": {
                        "type": "string",
                        "description": "SQL statement with optional ? placeholders"
                    },
                    "params": {
                        "type": "array",
                        "description": "Positional parameter values",
                        "items": { "type": ["string", "number", "boolean", "null"] }
                    }
                },
                "required": ["sql"]
            }),
            ToolKind::RunScript => json!({
                "type": "object",
                "properties": {
                    "sql": {
                        "type": "string",
                        "description": "Statements separated by semicolons"
                    }
                },
                "required": ["sql"]
            }),
            ToolKind::DescribeTable | ToolKind::ListIndexes | ToolKind::ListForeignKeys => json!({
                "type": "object",
                "properties": {
                    "table": { "type": "string", "description": "Table name" }
                },
                "required": ["table"]
            }),
            ToolKind::CreateTable => json!({
                "type": "object",
                "properties": {
                    "table": { "type": "string", "description": "Table name" },
                    "columns": {
                        "type": "array",
                        "minItems": 1,
                        "items": {
                            "type": "object",
                            "properties": {
                                "name": { "type": "string" },
                                "type": { "type": "string", "description": "Declared type, e.g. INTEGER or TEXT" },
                                "primaryKey": { "type": "boolean" },
                                "notNull": { "type": "boolean" },
                                "unique": { "type": "boolean" },
                                "default": {
                                    "type": ["string", "number", "boolean", "null"],
                                    "description": "Default value; strings are quoted"
                                }
                            },
                            "required": ["name", "type"]
                        }
                    },
                    "ifNotExists": { "type": "boolean", "default": false }
                },
                "required": ["table", "columns"]
            }),
            ToolKind::AlterTable => json!({
                "type": "object",
                "properties": {
                    "table": { "type": "string", "description": "Table name" },
                    "action": {
                        "type": "string",
                        "enum": ["add_column", "rename_column", "rename_table"]
                    },
                    "params": {
                        "type": "object",
                        "description": "Action parameters",
                        "properties": {
                            "column": { "type": "string" },
                            "type": { "type": "string" },
                            "notNull": { "type": "boolean" },
                            "default": { "type": ["string", "number", "boolean", "null"] },
                            "oldName": { "type": "string" },
                            "newName": { "type": "string" }
                        }
                    }
                },
                "required": ["table", "action", "params"]
            }),
            ToolKind::DropTable => json!({
                "type": "object",
                "properties": {
                    "table": { "type": "string", "description": "Table name" },
                    "ifExists": { "type": "boolean", "default": false }
                },
                "required": ["table"]
            }),
            ToolKind::CreateIndex => json!({
                "type": "object",
                "properties": {
                    "table": { "type": "string", "description": "Table name" },
                    "columns": {
                        "type": "array",
                        "minItems": 1,
                        "items": { "type": "string" }
                    },
                    "indexName": { "type": "string", "description": "Defaults to idx_<table>_<columns>" },
                    "unique": { "type": "boolean", "default": false },
                    "ifNotExists": { "type": "boolean", "default": false }
                },
                "required": ["table", "columns"]
            }),
            ToolKind::DropIndex => json!({
                "type": "object",
                "properties": {
                    "indexName": { "type": "string" },
                    "ifExists": { "type": "boolean", "default": false }
                },
                "required": ["indexName"]
            }),
            ToolKind::ListTables
            | ToolKind::DatabaseInfo
            | ToolKind::Vacuum
            | ToolKind::IntegrityCheck => json!({
                "type": "object",
                "properties": {}
            }),
        }
    }

    /// Build the published definition of this tool.
    pub fn definition(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name().to_string(),
            title: Some(self.title().to_string()),
            description: self.description().to_string(),
            input_schema: self.input_schema(),
            annotations: self.annotations(),
        }
    }
}

static CATALOG: LazyLock<ToolCatalog> = LazyLock::new(ToolCatalog::build);

/// Immutable, ordered set of tool definitions.
#[derive(Debug, Clone)]
pub struct ToolCatalog {
    tools: Vec<ToolDefinition>,
}

impl ToolCatalog {
    fn build() -> Self {
        let tools: Vec<ToolDefinition> = ToolKind::ALL.into_iter().map(ToolKind::definition).collect();
        tracing::debug!(count = tools.len(), "Built tool catalog");
        Self { tools }
    }

    /// The process-wide catalog.
    pub fn global() -> &'static ToolCatalog {
        &CATALOG
    }

    /// Look up a tool by name.
    pub fn lookup(&self, name: &str) -> Option<(ToolKind, &ToolDefinition)> {
        let kind = ToolKind::from_name(name)?;
        self.tools.get(kind as usize).map(|tool| (kind, tool))
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.lookup(name).map(|(_, tool)| tool)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.lookup(name).is_some()
    }

    /// All tools in catalog order.
    pub fn list(&self) -> &[ToolDefinition] {
        &self.tools
    }

    pub fn len(&self) -> usize {
        self.tools.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tools.is_empty()
    }

    pub fn names(&self) -> Vec<&str> {
        self.tools.iter().map(|t| t.name.as_str()).collect()
    }
}
