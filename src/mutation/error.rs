use super::prompt::FormPrompt;
use super::session::SessionStatus;
use crate::catalog::{CatalogError, MutationKind};

#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("conversation `{conversation_id}` already has an active {kind} session for `{table}`")]
    SessionConflict {
        conversation_id: String,
        table: String,
        kind: MutationKind,
    },
    #[error("column `{column}` is not pending (pending: [{}])", .pending.join(", "))]
    InvalidColumn {
        column: String,
        pending: Vec<String>,
    },
    #[error("no active session for conversation `{conversation_id}`")]
    NotFound { conversation_id: String },
    #[error("session state transition `{from}` -> `{to}` is invalid")]
    InvalidTransition {
        from: SessionStatus,
        to: SessionStatus,
    },
    #[error("session invariant violated: {0}")]
    InvariantViolation(String),
    #[error("session store io error at {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("session record at {path} is not valid json: {source}")]
    Json {
        path: String,
        #[source]
        source: serde_json::Error,
    },
}

#[derive(Debug, thiserror::Error)]
pub enum BuilderError {
    #[error(transparent)]
    Catalog(#[from] CatalogError),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error("`{column}` could not be read: {reason}")]
    TypeMismatch {
        column: String,
        reason: String,
        prompt: Box<FormPrompt>,
    },
    #[error("update of `{table}` has nothing to set")]
    EmptyUpdate { table: String },
    #[error("table `{table}` declares no identity column to update by")]
    UpdateWithoutIdentity { table: String },
    #[error("session is already executing")]
    AlreadyExecuting,
    #[error("session is {status}; it is not collecting values")]
    NotCollecting { status: SessionStatus },
    #[error("filter on `{column}` is invalid: {reason}")]
    InvalidFilter { column: String, reason: String },
    #[error("session still has pending fields: [{}]", .pending.join(", "))]
    QueueNotEmpty { pending: Vec<String> },
}
