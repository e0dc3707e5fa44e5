//! Embedded SQLite client built on sqlx.

use super::sql::split_statements;
use super::{
    DatabaseClient, ExecuteResult, NOT_A_QUERY, QueryResult, ScriptResult, SqlValue, VacuumResult,
};
use crate::error::StoreError;
use async_trait::async_trait;
use sqlx::sqlite::{
    SqliteArguments, SqliteConnectOptions, SqliteConnection, SqlitePool, SqlitePoolOptions,
    SqliteRow,
};
use sqlx::{Column, Executor, Row, Sqlite, Statement, TypeInfo, ValueRef};
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

type SqliteQuery<'q> = sqlx::query::Query<'q, Sqlite, SqliteArguments<'q>>;

const MEMORY_PATH: &str = ":memory:";

/// Client for a local SQLite file.
///
/// The pool holds a single connection so every statement observes the
/// effects of the ones before it, which also keeps `:memory:` databases alive.
pub struct LocalClient {
    pool: SqlitePool,
    path: Option<PathBuf>,
    display: String,
}

impl LocalClient {
    /// Open (creating if needed) the database at `path`.
    pub async fn open(path: &Path, busy_timeout: Duration) -> Result<Self, StoreError> {
        Self::open_with(path, busy_timeout, true).await
    }

    /// Open the database at `path`. A missing file is an error unless `create` is set.
    pub async fn open_with(
        path: &Path,
        busy_timeout: Duration,
        create: bool,
    ) -> Result<Self, StoreError> {
        let in_memory = path.as_os_str() == MEMORY_PATH;
        let options = if in_memory {
            SqliteConnectOptions::from_str("sqlite::memory:")?
        } else {
            SqliteConnectOptions::new()
                .filename(path)
                .create_if_missing(create)
        }
        .busy_timeout(busy_timeout);

        let pool = SqlitePoolOptions::new()
            .max_connections(1)
            .min_connections(1)
            .idle_timeout(None)
            .max_lifetime(None)
            .connect_with(options)
            .await?;

        let path = (!in_memory).then(|| std::path::absolute(path).unwrap_or_else(|_| path.to_path_buf()));
        let shown = path
            .as_ref()
            .map_or_else(|| MEMORY_PATH.to_string(), |p| p.display().to_string());

        tracing::info!(path = %shown, "Opened local database");
        Ok(Self {
            pool,
            path,
            display: shown,
        })
    }

    /// Fold the write-ahead log into the main file. A no-op outside WAL mode.
    async fn checkpoint(&self) {
        if let Err(e) = sqlx::query("PRAGMA wal_checkpoint(TRUNCATE)")
            .execute(&self.pool)
            .await
        {
            tracing::debug!(path = %self.display, error = %e, "Checkpoint failed");
        }
    }
}

#[async_trait]
impl DatabaseClient for LocalClient {
    fn target(&self) -> &str {
        &self.display
    }

    fn kind(&self) -> &'static str {
        "local"
    }

    /// The statement is prepared once. Statements without result columns are
    /// refused before they run, and the rest run with `query_only` set so a
    /// write fails instead of committing.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, StoreError> {
        let mut conn = self.pool.acquire().await?;
        let statement = (&mut *conn).prepare(sql).await?;
        let columns: Vec<String> = statement
            .columns()
            .iter()
            .map(|c| c.name().to_string())
            .collect();
        if columns.is_empty() {
            return Err(StoreError::InvalidArguments(NOT_A_QUERY.to_string()));
        }

        set_query_only(&mut *conn, true).await?;
        let fetched = bind_params(statement.query(), params)
            .fetch_all(&mut *conn)
            .await;
        if let Err(e) = set_query_only(&mut *conn, false).await {
            tracing::warn!(path = %self.display, error = %e, "Failed to clear query_only");
        }

        let rows = fetched?
            .iter()
            .map(decode_row)
            .collect::<Result<Vec<_>, _>>()?;
        Ok(QueryResult { columns, rows })
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ExecuteResult, StoreError> {
        let result = bind_params(sqlx::query(sql), params)
            .execute(&self.pool)
            .await?;
        Ok(ExecuteResult {
            rows_affected: result.rows_affected(),
            last_insert_rowid: Some(result.last_insert_rowid()),
        })
    }

    async fn run_script(&self, script: &str) -> Result<ScriptResult, StoreError> {
        let statements = split_statements(script);
        let mut tx = self.pool.begin().await?;

        for (index, statement) in statements.iter().enumerate() {
            if let Err(e) = sqlx::query(statement)
                .persistent(false)
                .execute(&mut *tx)
                .await
            {
                tracing::debug!(statement = index, error = %e, "Script failed, rolling back");
                if let Err(rollback) = tx.rollback().await {
                    tracing::warn!(error = %rollback, "Rollback failed");
                }
                return Err(e.into());
            }
        }

        tx.commit().await?;
        Ok(ScriptResult {
            statements_executed: statements.len(),
        })
    }

    async fn file_size(&self) -> Option<u64> {
        let path = self.path.as_ref()?;
        tokio::fs::metadata(path).await.ok().map(|m| m.len())
    }

    /// Sizes are taken after a WAL checkpoint so they describe the main file.
    async fn vacuum(&self) -> Result<VacuumResult, StoreError> {
        self.checkpoint().await;
        let size_before = self.storage_size().await.unwrap_or(0);
        self.execute("VACUUM", &[]).await?;
        self.checkpoint().await;
        let size_after = self.storage_size().await.unwrap_or(0);
        Ok(VacuumResult {
            size_before,
            size_after,
        })
    }

    async fn close(&self) {
        self.pool.close().await;
        tracing::debug!(path = %self.display, "Closed local database");
    }
}

async fn set_query_only(conn: &mut SqliteConnection, on: bool) -> Result<(), sqlx::Error> {
    let pragma = if on {
        "PRAGMA query_only = ON"
    } else {
        "PRAGMA query_only = OFF"
    };
    sqlx::query(pragma).execute(conn).await?;
    Ok(())
}

/// Caller SQL is arbitrary, so statements are not kept in the cache.
fn bind_params<'q>(query: SqliteQuery<'q>, params: &[SqlValue]) -> SqliteQuery<'q> {
    params
        .iter()
        .fold(query.persistent(false), |query, param| match param {
            SqlValue::Null => query.bind(None::<i64>),
            SqlValue::Integer(i) => query.bind(*i),
            SqlValue::Real(f) => query.bind(*f),
            SqlValue::Text(s) => query.bind(s.clone()),
            SqlValue::Blob(b) => query.bind(b.clone()),
        })
}

/// Decode by the storage class of each value rather than the declared type.
fn decode_row(row: &SqliteRow) -> Result<Vec<SqlValue>, StoreError> {
    (0..row.len())
        .map(|i| {
            let raw = row.try_get_raw(i)?;
            if raw.is_null() {
                return Ok(SqlValue::Null);
            }
            let value = match raw.type_info().name() {
                "INTEGER" | "BOOLEAN" => SqlValue::Integer(row.try_get_unchecked::<i64, _>(i)?),
                "REAL" => SqlValue::Real(row.try_get_unchecked::<f64, _>(i)?),
                "BLOB" => SqlValue::Blob(row.try_get_unchecked::<Vec<u8>, _>(i)?),
                _ => SqlValue::Text(row.try_get_unchecked::<String, _>(i)?),
            };
            Ok(value)
        })
        .collect()
}
