use crate::catalog::{ManifestCatalog, MutationKind};
use crate::mutation::SessionStatus;
use crate::shared::ConversationId;
use std::collections::BTreeMap;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    Sql,
    Chat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Operation {
    Select,
    Insert,
    Update,
}

impl Operation {
    pub fn mutation_kind(self) -> Option<MutationKind> {
        match self {
            Self::Select => None,
            Self::Insert => Some(MutationKind::Insert),
            Self::Update => Some(MutationKind::Update),
        }
    }
}

/// What the oracle understood from one turn.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IntentAnalysis {
    pub route: Route,
    pub operation: Option<Operation>,
    pub entity_token: Option<String>,
    /// Field values for mutations, equality filters for reads.
    pub extracted_values: BTreeMap<String, String>,
    /// Reply text for the chat route.
    pub reply: Option<String>,
}

impl IntentAnalysis {
    pub fn chat(reply: impl Into<String>) -> Self {
        Self {
            route: Route::Chat,
            operation: None,
            entity_token: None,
            extracted_values: BTreeMap::new(),
            reply: Some(reply.into()),
        }
    }

    pub fn sql(operation: Operation, entity_token: Option<&str>) -> Self {
        Self {
            route: Route::Sql,
            operation: Some(operation),
            entity_token: entity_token.map(str::to_string),
            extracted_values: BTreeMap::new(),
            reply: None,
        }
    }

    pub fn with_value(mut self, column: &str, value: &str) -> Self {
        self.extracted_values
            .insert(column.to_string(), value.to_string());
        self
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActiveSessionSummary {
    pub table: String,
    pub kind: MutationKind,
    pub status: SessionStatus,
    pub next_field: Option<String>,
}

pub struct ConversationContext<'a> {
    pub conversation_id: &'a ConversationId,
    pub catalog: &'a ManifestCatalog,
    /// Recent turns rendered oldest first.
    pub history: Option<String>,
    pub active_session: Option<ActiveSessionSummary>,
}

#[derive(Debug, thiserror::Error)]
pub enum OracleError {
    #[error("intent oracle unavailable: {0}")]
    Unavailable(String),
    #[error("intent oracle returned an unusable response: {0}")]
    InvalidResponse(String),
}

/// Natural-language intent classification. Implementations may call out to a
/// model; the engine only depends on this contract.
pub trait IntentOracle: Send + Sync {
    fn analyze(
        &self,
        raw_text: &str,
        context: &ConversationContext<'_>,
    ) -> Result<IntentAnalysis, OracleError>;
}
