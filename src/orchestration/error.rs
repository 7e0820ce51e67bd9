use crate::mutation::{BuilderError, SessionError};

/// Internal failures of a turn. Anything the user can act on is returned as a
/// `TurnOutput::Error` instead.
#[derive(Debug, thiserror::Error)]
pub enum RouterError {
    #[error("invalid conversation id: {0}")]
    InvalidConversationId(String),
    #[error(transparent)]
    Session(#[from] SessionError),
    #[error(transparent)]
    Builder(#[from] BuilderError),
}
