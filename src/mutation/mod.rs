//! Guided mutations: session state, value coercion, statement building, the
//! command-safety guard and recovery from database failures.

pub mod builder;
pub mod coerce;
pub mod error;
pub mod field_input;
pub mod guard;
pub mod plan;
pub mod prompt;
pub mod recovery;
pub mod session;
pub mod store;
pub mod value;

pub use builder::{BuildStep, SqlBuilder};
pub use coerce::coerce_value;
pub use error::{BuilderError, SessionError};
pub use guard::{classify_turn, CommandSignal, GuardDecision};
pub use plan::{StatementKind, StatementPlan};
pub use prompt::{ConfirmationPrompt, FormPrompt};
pub use recovery::{classify_failure, recover, FailureClass, RecoveryStep};
pub use session::{ReplacementRequest, Session, SessionStatus};
pub use store::{
    CorrectionOutcome, FileBackend, MemoryBackend, SessionBackend, SessionPolicy, SessionStore,
};
pub use value::SqlValue;
