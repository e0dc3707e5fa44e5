//! Wire types for the Hrana-over-HTTP pipeline protocol spoken by libSQL servers.
//!
//! Only the subset needed here is modelled: `execute`, `batch` and `close`
//! stream requests, without batons (every pipeline opens and closes its own
//! stream).

use super::value::SqlValue;
use crate::error::StoreError;
use base64::Engine;
use base64::alphabet;
use base64::engine::general_purpose::{GeneralPurpose, GeneralPurposeConfig, STANDARD as BASE64};
use base64::engine::DecodePaddingMode;
use serde::{Deserialize, Serialize};

/// Servers may omit blob padding.
const LENIENT_BASE64: GeneralPurpose = GeneralPurpose::new(
    &alphabet::STANDARD,
    GeneralPurposeConfig::new().with_decode_padding_mode(DecodePaddingMode::Indifferent),
);

#[derive(Debug, Clone, Serialize)]
pub struct PipelineRequest {
    pub baton: Option<String>,
    pub requests: Vec<StreamRequest>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamRequest {
    Execute { stmt: Stmt },
    Batch { batch: Batch },
    Close,
}

#[derive(Debug, Clone, Serialize)]
pub struct Stmt {
    pub sql: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub args: Vec<HranaValue>,
    pub want_rows: bool,
}

impl Stmt {
    pub fn new(sql: impl Into<String>, params: &[SqlValue], want_rows: bool) -> Self {
        Self {
            sql: sql.into(),
            args: params.iter().map(HranaValue::from).collect(),
            want_rows,
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Batch {
    pub steps: Vec<BatchStep>,
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchStep {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub condition: Option<BatchCond>,
    pub stmt: Stmt,
}

#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum BatchCond {
    Ok { step: usize },
    Not { cond: Box<BatchCond> },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HranaValue {
    Null,
    /// Integers travel as decimal strings.
    Integer { value: String },
    Float { value: f64 },
    Text { value: String },
    Blob { base64: String },
}

impl From<&SqlValue> for HranaValue {
    fn from(value: &SqlValue) -> Self {
        match value {
            SqlValue::Null => HranaValue::Null,
            SqlValue::Integer(i) => HranaValue::Integer {
                value: i.to_string(),
            },
            SqlValue::Real(f) => HranaValue::Float { value: *f },
            SqlValue::Text(s) => HranaValue::Text { value: s.clone() },
            SqlValue::Blob(b) => HranaValue::Blob {
                base64: BASE64.encode(b),
            },
        }
    }
}

impl TryFrom<HranaValue> for SqlValue {
    type Error = StoreError;

    fn try_from(value: HranaValue) -> Result<Self, Self::Error> {
        Ok(match value {
            HranaValue::Null => SqlValue::Null,
            HranaValue::Integer { value } => SqlValue::Integer(value.parse().map_err(|_| {
                StoreError::Protocol(format!("invalid integer value {value:?}"))
            })?),
            HranaValue::Float { value } => SqlValue::Real(value),
            HranaValue::Text { value } => SqlValue::Text(value),
            HranaValue::Blob { base64 } => SqlValue::Blob(
                LENIENT_BASE64
                    .decode(&base64)
                    .map_err(|e| StoreError::Protocol(format!("invalid blob value: {e}")))?,
            ),
        })
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct PipelineResponse {
    pub results: Vec<StreamResult>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamResult {
    Ok { response: StreamResponse },
    Error { error: HranaError },
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamResponse {
    Execute { result: StmtResult },
    Batch { result: BatchResult },
    Close,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct StmtResult {
    #[serde(default)]
    pub cols: Vec<Col>,
    #[serde(default)]
    pub rows: Vec<Vec<HranaValue>>,
    #[serde(default)]
    pub affected_row_count: u64,
    #[serde(default)]
    pub last_insert_rowid: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Col {
    #[serde(default)]
    pub name: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct BatchResult {
    pub step_results: Vec<Option<StmtResult>>,
    pub step_errors: Vec<Option<HranaError>>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct HranaError {
    pub message: String,
}

/// Steps that run `stmt` inside a transaction that is always rolled back.
///
/// Step 1 carries the statement's result.
pub fn read_only_batch(stmt: Stmt) -> Batch {
    Batch {
        steps: vec![
            BatchStep {
                condition: None,
                stmt: Stmt::new("BEGIN", &[], false),
            },
            BatchStep {
                condition: Some(BatchCond::Ok { step: 0 }),
                stmt,
            },
            BatchStep {
                condition: None,
                stmt: Stmt::new("ROLLBACK", &[], false),
            },
        ],
    }
}

/// Steps that run `statements` inside one transaction.
///
/// Step 0 is `BEGIN`; each statement runs only if the previous step
/// succeeded; `COMMIT` runs only if the last statement succeeded; `ROLLBACK`
/// runs whenever `COMMIT` did not succeed.
pub fn transaction_batch(statements: &[&str]) -> Batch {
    let mut steps = Vec::with_capacity(statements.len() + 3);
    steps.push(BatchStep {
        condition: None,
        stmt: Stmt::new("BEGIN", &[], false),
    });
    for (i, statement) in statements.iter().enumerate() {
        steps.push(BatchStep {
            condition: Some(BatchCond::Ok { step: i }),
            stmt: Stmt::new(*statement, &[], false),
        });
    }
    let commit = steps.len();
    steps.push(BatchStep {
        condition: Some(BatchCond::Ok { step: commit - 1 }),
        stmt: Stmt::new("COMMIT", &[], false),
    });
    steps.push(BatchStep {
        condition: Some(BatchCond::Not {
            cond: Box::new(BatchCond::Ok { step: commit }),
        }),
        stmt: Stmt::new("ROLLBACK", &[], false),
    });
    Batch { steps }
}
