//! Remote libSQL client speaking Hrana over HTTP.

use super::hrana::{
    Batch, BatchResult, PipelineRequest, PipelineResponse, StmtResult, Stmt, StreamRequest,
    StreamResponse, StreamResult, read_only_batch, transaction_batch,
};
use super::sql::split_statements;
use super::{DatabaseClient, ExecuteResult, NOT_A_QUERY, QueryResult, ScriptResult, SqlValue};
use crate::error::StoreError;
use async_trait::async_trait;

/// Client for a remote libSQL server.
///
/// Every call is one self-contained pipeline request, so there is no
/// server-side stream to keep alive between calls.
pub struct RemoteClient {
    http: reqwest::Client,
    pipeline_url: String,
    url: String,
    auth_token: Option<String>,
}

impl RemoteClient {
    /// Build the client and check the server answers `SELECT 1`.
    pub async fn connect(url: &str, auth_token: Option<String>) -> Result<Self, StoreError> {
        let base = http_base_url(url)?;
        let http = reqwest::Client::builder()
            .user_agent(concat!("quarry/", env!("CARGO_PKG_VERSION")))
            .build()?;

        let client = Self {
            http,
            pipeline_url: format!("{base}/v2/pipeline"),
            url: url.trim().to_string(),
            auth_token,
        };

        client.query("SELECT 1", &[]).await?;
        tracing::info!(url = %client.url, "Connected to remote database");
        Ok(client)
    }

    async fn pipeline(&self, requests: Vec<StreamRequest>) -> Result<Vec<StreamResult>, StoreError> {
        let body = PipelineRequest {
            baton: None,
            requests,
        };

        let mut request = self.http.post(&self.pipeline_url).json(&body);
        if let Some(token) = &self.auth_token {
            request = request.bearer_auth(token);
        }

        let response = request.send().await?;
        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(StoreError::Connection(format!(
                "server returned {status}: {}",
                detail.trim()
            )));
        }

        let parsed: PipelineResponse = response
            .json()
            .await
            .map_err(|e| StoreError::Protocol(e.to_string()))?;
        Ok(parsed.results)
    }

    async fn execute_stmt(&self, stmt: Stmt) -> Result<StmtResult, StoreError> {
        let results = self
            .pipeline(vec![StreamRequest::Execute { stmt }, StreamRequest::Close])
            .await?;

        match results.into_iter().next() {
            Some(StreamResult::Ok {
                response: StreamResponse::Execute { result },
            }) => Ok(result),
            Some(StreamResult::Error { error }) => Err(StoreError::Engine(error.message)),
            _ => Err(StoreError::Protocol(
                "unexpected response to execute request".to_string(),
            )),
        }
    }

    async fn run_batch(&self, batch: Batch) -> Result<BatchResult, StoreError> {
        let results = self
            .pipeline(vec![StreamRequest::Batch { batch }, StreamRequest::Close])
            .await?;

        match results.into_iter().next() {
            Some(StreamResult::Ok {
                response: StreamResponse::Batch { result },
            }) => Ok(result),
            Some(StreamResult::Error { error }) => Err(StoreError::Engine(error.message)),
            _ => Err(StoreError::Protocol(
                "unexpected response to batch request".to_string(),
            )),
        }
    }
}

#[async_trait]
impl DatabaseClient for RemoteClient {
    fn target(&self) -> &str {
        &self.url
    }

    fn kind(&self) -> &'static str {
        "remote"
    }

    /// Runs inside a transaction that is rolled back, so writes never land.
    /// Results without columns or with affected rows are refused.
    async fn query(&self, sql: &str, params: &[SqlValue]) -> Result<QueryResult, StoreError> {
        let batch = self
            .run_batch(read_only_batch(Stmt::new(sql, params, true)))
            .await?;
        if let Some(error) = batch.step_errors.into_iter().take(2).flatten().next() {
            return Err(StoreError::Engine(error.message));
        }
        let Some(Some(result)) = batch.step_results.into_iter().nth(1) else {
            return Err(StoreError::Protocol(
                "missing statement result in batch response".to_string(),
            ));
        };
        if result.cols.is_empty() || result.affected_row_count > 0 {
            return Err(StoreError::InvalidArguments(NOT_A_QUERY.to_string()));
        }

        let columns = result
            .cols
            .into_iter()
            .enumerate()
            .map(|(i, col)| col.name.unwrap_or_else(|| format!("column{i}")))
            .collect();
        let rows = result
            .rows
            .into_iter()
            .map(|row| row.into_iter().map(SqlValue::try_from).collect())
            .collect::<Result<Vec<_>, _>>()?;
        Ok(QueryResult { columns, rows })
    }

    async fn execute(&self, sql: &str, params: &[SqlValue]) -> Result<ExecuteResult, StoreError> {
        let result = self.execute_stmt(Stmt::new(sql, params, false)).await?;
        let last_insert_rowid = result
            .last_insert_rowid
            .map(|id| {
                id.parse()
                    .map_err(|_| StoreError::Protocol(format!("invalid rowid {id:?}")))
            })
            .transpose()?;
        Ok(ExecuteResult {
            rows_affected: result.affected_row_count,
            last_insert_rowid,
        })
    }

    async fn run_script(&self, script: &str) -> Result<ScriptResult, StoreError> {
        let statements = split_statements(script);
        let batch = transaction_batch(&statements);
        let commit_step = statements.len() + 1;
        let result = self.run_batch(batch).await?;

        if let Some(error) = result.step_errors.into_iter().take(commit_step + 1).flatten().next() {
            return Err(StoreError::Engine(error.message));
        }
        if !matches!(result.step_results.get(commit_step), Some(Some(_))) {
            return Err(StoreError::Engine(
                "script transaction did not commit".to_string(),
            ));
        }

        Ok(ScriptResult {
            statements_executed: statements.len(),
        })
    }

    async fn file_size(&self) -> Option<u64> {
        None
    }

    async fn close(&self) {
        tracing::debug!(url = %self.url, "Closed remote database client");
    }
}

/// Map a libSQL URL to the HTTP base the pipeline endpoint lives under.
///
/// `libsql://` and `wss://` become `https://`, `ws://` becomes `http://`;
/// a `tls=0` query parameter downgrades `libsql://` to plain HTTP.
pub fn http_base_url(url: &str) -> Result<String, StoreError> {
    let url = url.trim();
    let (scheme, rest) = url
        .split_once("://")
        .ok_or_else(|| StoreError::Connection(format!("invalid database URL: {url}")))?;
    let (authority, query) = match rest.split_once('?') {
        Some((authority, query)) => (authority, Some(query)),
        None => (rest, None),
    };
    let plaintext = query.is_some_and(|q| q.split('&').any(|pair| pair == "tls=0"));

    let scheme = match scheme.to_ascii_lowercase().as_str() {
        "libsql" if plaintext => "http",
        "libsql" | "https" | "wss" => "https",
        "http" | "ws" => "http",
        other => {
            return Err(StoreError::Connection(format!(
                "unsupported URL scheme {other:?} in {url}"
            )));
        }
    };

    Ok(format!("{scheme}://{}", authority.trim_end_matches('/')))
}
