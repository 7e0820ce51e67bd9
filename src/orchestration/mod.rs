pub mod conversation_context;
pub mod error;
pub mod lexical_oracle;
pub mod oracle;
pub mod routing;
pub mod turn;

pub use conversation_context::{ConversationHistory, HistoryLimits};
pub use error::RouterError;
pub use lexical_oracle::LexicalOracle;
pub use oracle::{
    ActiveSessionSummary, ConversationContext, IntentAnalysis, IntentOracle, Operation,
    OracleError, Route,
};
pub use routing::{InterruptionPolicy, Router, RouterConfig};
pub use turn::{FinalAnswer, TurnInput, TurnOutput, UserError, UserErrorKind};
