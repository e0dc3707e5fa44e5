//! Backing-store clients.
//!
//! [`DatabaseClient`] is the seam between the tool dispatcher and the SQL
//! engine. Implementations provide the raw primitives (`query`, `execute`,
//! `run_script`); schema inspection, DDL and maintenance operations are
//! provided on top of them and behave identically for every backend.

pub mod hrana;
pub mod local;
pub mod remote;
pub mod sql;
pub mod types;
pub mod value;

use crate::error::StoreError;
use async_trait::async_trait;
use quarry_core::BackingStoreTarget;
use std::sync::Arc;
use std::time::Duration;

pub use local::LocalClient;
pub use remote::RemoteClient;
pub use sql::{AlterAction, ColumnDefinition, IndexSpec};
pub use types::{
    ColumnInfo, DatabaseInfo, ExecuteResult, ForeignKeyInfo, IndexInfo, IntegrityReport,
    QueryResult, Record, ScriptResult, TableDescription, TableInfo, VacuumResult,
};
pub use value::SqlValue;

/// Shared handle to a connected client.
pub type ClientHandle = Arc<dyn DatabaseClient>;

/// Reported when `query` is handed a statement that returns no rows or changes data.
pub const NOT_A_QUERY: &str =
    "query only runs read-only statements that return rows; use execute for changes";

#[async_trait]
pub trait DatabaseClient: Send + Sync {
    /// Target identifier without credentials.
    fn target(&self) -> &str;

    /// `local` or `remote`.
    fn kind(&self) -> &'static str;

    /// Run a read-only statement and return its rows. Nothing it does is committed.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, StoreError>;

    /// Run a mutating statement.
    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ExecuteResult, StoreError>;

    /// Run a multi-statement script atomically.
    async fn run_script(&self, script: &str) -> Result<ScriptResult, StoreError>;

    /// On-disk size of the database file, when there is one.
    async fn file_size(&self) -> Option<u64>;

    /// Release the underlying connection.
    async fn close(&self);

    async fn list_tables(&self) -> Result<Vec<TableInfo>, StoreError> {
        let listing = self.query(sql::LIST_TABLES_SQL, &[]).await?;
        let mut tables = Vec::with_capacity(listing.row_count());

        for record in listing.records() {
            let name = record.text("name");
            if sql::is_internal_table(&name) {
                continue;
            }
            let row_count = match self.query(&sql::count_rows_sql(&name), &[]).await {
                Ok(count) => count
                    .scalar()
                    .and_then(SqlValue::as_i64)
                    .map_or(0, |n| n.max(0) as u64),
                Err(e) => {
                    tracing::debug!(table = %name, error = %e, "Row count unavailable");
                    0
                }
            };
            tables.push(TableInfo {
                name,
                kind: record.text("type"),
                row_count,
            });
        }

        Ok(tables)
    }

    async fn describe_table(&self, table: &str) -> Result<TableDescription, StoreError> {
        let info = self.query(&sql::pragma_sql("table_info", table), &[]).await?;
        if info.rows.is_empty() {
            return Err(StoreError::Engine(format!("no such table: {table}")));
        }

        let columns = info
            .records()
            .map(|r| ColumnInfo {
                position: r.integer("cid"),
                name: r.text("name"),
                declared_type: r.text("type"),
                not_null: r.flag("notnull"),
                default_value: r.opt_text("dflt_value"),
                primary_key: r.integer("pk") > 0,
            })
            .collect();

        let ddl = self
            .query(sql::TABLE_DDL_SQL, &[SqlValue::Text(table.to_string())])
            .await?;

        Ok(TableDescription {
            table: table.to_string(),
            columns,
            sql: ddl.scalar().and_then(SqlValue::as_text).unwrap_or_default(),
        })
    }

    async fn list_indexes(&self, table: &str) -> Result<Vec<IndexInfo>, StoreError> {
        let list = self.query(&sql::pragma_sql("index_list", table), &[]).await?;
        let mut indexes = Vec::with_capacity(list.row_count());

        for record in list.records() {
            let name = record.text("name");
            let info = self.query(&sql::pragma_sql("index_info", &name), &[]).await?;
            let columns = info.records().filter_map(|c| c.opt_text("name")).collect();
            indexes.push(IndexInfo {
                unique: record.flag("unique"),
                origin: record.text("origin"),
                partial: record.flag("partial"),
                name,
                columns,
            });
        }

        Ok(indexes)
    }

    async fn list_foreign_keys(&self, table: &str) -> Result<Vec<ForeignKeyInfo>, StoreError> {
        let list = self
            .query(&sql::pragma_sql("foreign_key_list", table), &[])
            .await?;

        Ok(list
            .records()
            .map(|r| ForeignKeyInfo {
                id: r.integer("id"),
                seq: r.integer("seq"),
                table: r.text("table"),
                from: r.text("from"),
                to: r.opt_text("to"),
                on_update: r.text("on_update"),
                on_delete: r.text("on_delete"),
                match_type: r.text("match"),
            })
            .collect())
    }

    async fn create_table(
        &self,
        table: &str,
        columns: &[ColumnDefinition],
        if_not_exists: bool,
    ) -> Result<(), StoreError> {
        let statement = sql::create_table_sql(table, columns, if_not_exists)?;
        self.execute(&statement, &[]).await?;
        Ok(())
    }

    async fn alter_table(&self, table: &str, action: &AlterAction) -> Result<(), StoreError> {
        let statement = action.to_sql(table)?;
        self.execute(&statement, &[]).await?;
        Ok(())
    }

    async fn drop_table(&self, table: &str, if_exists: bool) -> Result<(), StoreError> {
        self.execute(&sql::drop_table_sql(table, if_exists), &[])
            .await?;
        Ok(())
    }

    /// Create an index and return the name it was created under.
    async fn create_index(&self, spec: &IndexSpec) -> Result<String, StoreError> {
        let statement = spec.to_sql()?;
        self.execute(&statement, &[]).await?;
        Ok(spec.name())
    }

    async fn drop_index(&self, index: &str, if_exists: bool) -> Result<(), StoreError> {
        self.execute(&sql::drop_index_sql(index, if_exists), &[])
            .await?;
        Ok(())
    }

    /// Snapshot of database-level facts. Only the version query is required
    /// to succeed; the remaining pragmas degrade to defaults.
    async fn get_info(&self) -> Result<DatabaseInfo, StoreError> {
        let sqlite_version = self
            .query("SELECT sqlite_version()", &[])
            .await?
            .scalar()
            .and_then(SqlValue::as_text)
            .unwrap_or_default();

        let page_count = pragma_value(self, "page_count").await.and_then(|v| v.as_i64());
        let page_size = pragma_value(self, "page_size").await.and_then(|v| v.as_i64());
        let journal_mode = pragma_value(self, "journal_mode")
            .await
            .and_then(|v| v.as_text())
            .unwrap_or_default()
            .to_lowercase();
        let encoding = pragma_value(self, "encoding")
            .await
            .and_then(|v| v.as_text())
            .unwrap_or_default();

        let table_count = match self.query(sql::TABLE_NAMES_SQL, &[]).await {
            Ok(names) => names
                .records()
                .filter(|r| !sql::is_internal_table(&r.text("name")))
                .count() as u64,
            Err(e) => {
                tracing::debug!(error = %e, "Table count unavailable");
                0
            }
        };

        let page_count = page_count.unwrap_or(0).max(0) as u64;
        let page_size = page_size.unwrap_or(0).max(0) as u64;
        let size_bytes = match self.file_size().await {
            Some(size) => size,
            None => page_count * page_size,
        };

        Ok(DatabaseInfo {
            path: self.target().to_string(),
            size_bytes,
            table_count,
            page_count,
            page_size,
            wal_mode: journal_mode == "wal",
            journal_mode,
            encoding,
            sqlite_version,
        })
    }

    /// File size, or `page_count * page_size` when there is no file.
    async fn storage_size(&self) -> Option<u64> {
        if let Some(size) = self.file_size().await {
            return Some(size);
        }
        let pages = pragma_value(self, "page_count").await?.as_i64()?;
        let page_size = pragma_value(self, "page_size").await?.as_i64()?;
        Some((pages.max(0) * page_size.max(0)) as u64)
    }

    /// Compact the database. Sizes are zero when they cannot be measured.
    async fn vacuum(&self) -> Result<VacuumResult, StoreError> {
        let size_before = self.storage_size().await.unwrap_or(0);
        self.execute("VACUUM", &[]).await?;
        let size_after = self.storage_size().await.unwrap_or(0);
        Ok(VacuumResult {
            size_before,
            size_after,
        })
    }

    async fn integrity_check(&self) -> Result<IntegrityReport, StoreError> {
        let check = self.query("PRAGMA integrity_check", &[]).await?;
        let results = check
            .rows
            .iter()
            .filter_map(|row| row.first().and_then(SqlValue::as_text))
            .collect();
        Ok(IntegrityReport::from_results(results))
    }
}

/// First value of `PRAGMA <name>`, or `None` when the pragma fails.
async fn pragma_value<C>(client: &C, name: &str) -> Option<SqlValue>
where
    C: DatabaseClient + ?Sized,
{
    match client.query(&format!("PRAGMA {name}"), &[]).await {
        Ok(result) => result.scalar().cloned(),
        Err(e) => {
            tracing::debug!(pragma = name, error = %e, "Pragma unavailable");
            None
        }
    }
}

/// Open a client for `target`.
pub async fn connect(target: &BackingStoreTarget) -> Result<ClientHandle, StoreError> {
    match target {
        BackingStoreTarget::Local {
            path,
            timeout_ms,
            create_if_missing,
        } => {
            let client =
                LocalClient::open_with(path, Duration::from_millis(*timeout_ms), *create_if_missing)
                    .await?;
            Ok(Arc::new(client))
        }
        BackingStoreTarget::Remote { url, auth_token } => {
            let client = RemoteClient::connect(url, auth_token.clone()).await?;
            Ok(Arc::new(client))
        }
    }
}
