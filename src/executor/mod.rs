//! Statement execution seam. The engine only sees plans going in and rows or a
//! structured failure coming out.

pub mod sqlite;

pub use sqlite::SqliteExecutor;

use crate::mutation::StatementPlan;
use serde_json::{Map, Value};

#[derive(Debug, Clone, Default, PartialEq)]
pub struct ExecutionOutcome {
    pub rows: Vec<Map<String, Value>>,
    pub rows_affected: usize,
    pub last_insert_id: Option<i64>,
}

/// Driver-reported failure. `code` is the driver's symbolic or numeric code,
/// `column` is set when the driver names one directly.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("statement failed ({}): {detail}", .code.as_deref().unwrap_or("no code"))]
pub struct ExecutorFailure {
    pub code: Option<String>,
    pub column: Option<String>,
    pub detail: String,
}

impl ExecutorFailure {
    pub fn new(code: Option<&str>, detail: impl Into<String>) -> Self {
        Self {
            code: code.map(str::to_string),
            column: None,
            detail: detail.into(),
        }
    }

    pub fn with_column(mut self, column: impl Into<String>) -> Self {
        self.column = Some(column.into());
        self
    }
}

pub trait StatementExecutor: Send + Sync {
    fn execute(&self, plan: &StatementPlan) -> Result<ExecutionOutcome, ExecutorFailure>;
}
