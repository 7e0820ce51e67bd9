use super::value::SqlValue;
use crate::catalog::MutationKind;
use crate::shared::ConversationId;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Collecting,
    AwaitingCorrection,
    Ready,
    Executing,
    Complete,
    Abandoned,
    Failed,
}

impl SessionStatus {
    pub fn can_transition_to(self, next: Self) -> bool {
        matches!(
            (self, next),
            (SessionStatus::Collecting, SessionStatus::Collecting)
                | (SessionStatus::Collecting, SessionStatus::AwaitingCorrection)
                | (SessionStatus::Collecting, SessionStatus::Ready)
                | (SessionStatus::Collecting, SessionStatus::Executing)
                | (SessionStatus::Collecting, SessionStatus::Abandoned)
                | (SessionStatus::Collecting, SessionStatus::Failed)
                | (SessionStatus::AwaitingCorrection, SessionStatus::AwaitingCorrection)
                | (SessionStatus::AwaitingCorrection, SessionStatus::Collecting)
                | (SessionStatus::AwaitingCorrection, SessionStatus::Ready)
                | (SessionStatus::AwaitingCorrection, SessionStatus::Executing)
                | (SessionStatus::AwaitingCorrection, SessionStatus::Abandoned)
                | (SessionStatus::AwaitingCorrection, SessionStatus::Failed)
                | (SessionStatus::Ready, SessionStatus::Executing)
                | (SessionStatus::Ready, SessionStatus::Abandoned)
                | (SessionStatus::Ready, SessionStatus::Failed)
                | (SessionStatus::Executing, SessionStatus::Complete)
                | (SessionStatus::Executing, SessionStatus::AwaitingCorrection)
                | (SessionStatus::Executing, SessionStatus::Failed)
        )
    }

    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            SessionStatus::Complete | SessionStatus::Abandoned | SessionStatus::Failed
        )
    }

    /// Statuses in which a raw turn is read as a field value.
    pub fn accepts_values(self) -> bool {
        matches!(
            self,
            SessionStatus::Collecting | SessionStatus::AwaitingCorrection
        )
    }
}

impl std::fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SessionStatus::Collecting => write!(f, "collecting"),
            SessionStatus::AwaitingCorrection => write!(f, "awaiting_correction"),
            SessionStatus::Ready => write!(f, "ready"),
            SessionStatus::Executing => write!(f, "executing"),
            SessionStatus::Complete => write!(f, "complete"),
            SessionStatus::Abandoned => write!(f, "abandoned"),
            SessionStatus::Failed => write!(f, "failed"),
        }
    }
}

/// A mutation requested while another session was active. It waits for the
/// user to pick `replace` or `resume`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReplacementRequest {
    pub table: String,
    pub kind: MutationKind,
    #[serde(default)]
    pub values: BTreeMap<String, String>,
    pub requested_at: i64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub conversation_id: ConversationId,
    pub table: String,
    pub kind: MutationKind,
    #[serde(default)]
    pub collected: BTreeMap<String, SqlValue>,
    #[serde(default)]
    pub pending: Vec<String>,
    pub status: SessionStatus,
    #[serde(default)]
    pub retry_budgets: BTreeMap<String, u32>,
    /// Failed attempts per field, type mismatches included.
    #[serde(default)]
    pub failures: BTreeMap<String, u32>,
    /// Correction reason shown with the next prompt for a pending field.
    #[serde(default)]
    pub reasons: BTreeMap<String, String>,
    #[serde(default)]
    pub pending_replacement: Option<ReplacementRequest>,
    pub created_at: i64,
    pub last_touched: i64,
}

impl Session {
    pub fn next_field(&self) -> Option<&str> {
        self.pending.first().map(String::as_str)
    }

    pub fn is_pending(&self, column: &str) -> bool {
        self.pending.iter().any(|pending| pending == column)
    }

    pub fn attempt(&self, column: &str) -> u32 {
        self.failures.get(column).copied().unwrap_or(0) + 1
    }

    pub fn budget(&self, column: &str) -> Option<u32> {
        self.retry_budgets.get(column).copied()
    }

    pub fn is_expired(&self, now: i64, ttl_seconds: u64) -> bool {
        now.saturating_sub(self.last_touched) > i64::try_from(ttl_seconds).unwrap_or(i64::MAX)
    }

    pub fn check_invariants(&self) -> Result<(), String> {
        let mut seen = BTreeSet::new();
        for column in &self.pending {
            if !seen.insert(column.as_str()) {
                return Err(format!("column `{column}` is queued more than once"));
            }
            if self.collected.contains_key(column) {
                return Err(format!("column `{column}` is both pending and collected"));
            }
        }
        if matches!(self.status, SessionStatus::Ready | SessionStatus::Executing)
            && !self.pending.is_empty()
        {
            return Err(format!(
                "session is {} with {} pending field(s)",
                self.status,
                self.pending.len()
            ));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn session() -> Session {
        Session {
            conversation_id: ConversationId::parse("c-1").expect("id"),
            table: "schedule".to_string(),
            kind: MutationKind::Insert,
            collected: BTreeMap::new(),
            pending: vec!["name".to_string(), "start_time".to_string()],
            status: SessionStatus::Collecting,
            retry_budgets: BTreeMap::new(),
            failures: BTreeMap::new(),
            reasons: BTreeMap::new(),
            pending_replacement: None,
            created_at: 100,
            last_touched: 100,
        }
    }

    #[test]
    fn terminal_statuses_have_no_outgoing_transitions() {
        for terminal in [
            SessionStatus::Complete,
            SessionStatus::Abandoned,
            SessionStatus::Failed,
        ] {
            assert!(terminal.is_terminal());
            assert!(!terminal.can_transition_to(SessionStatus::Collecting));
            assert!(!terminal.can_transition_to(SessionStatus::Executing));
        }
        assert!(!SessionStatus::Complete.can_transition_to(SessionStatus::Executing));
        assert!(SessionStatus::Executing.can_transition_to(SessionStatus::AwaitingCorrection));
    }

    #[test]
    fn huge_ttl_never_expires() {
        let record = session();
        assert!(!record.is_expired(100, u64::MAX));
        assert!(!record.is_expired(i64::MAX, u64::MAX));
        assert!(record.is_expired(102, 1));
    }

    #[test]
    fn invariants_reject_overlap_between_pending_and_collected() {
        let mut record = session();
        assert!(record.check_invariants().is_ok());
        record
            .collected
            .insert("name".to_string(), SqlValue::Text("x".to_string()));
        assert!(record.check_invariants().is_err());
    }

    #[test]
    fn expiry_is_strictly_after_ttl() {
        let record = session();
        assert!(!record.is_expired(160, 60));
        assert!(record.is_expired(161, 60));
    }

    #[test]
    fn record_serializes_in_camel_case() {
        let json = serde_json::to_value(session()).expect("serialize");
        assert_eq!(json["conversationId"], "c-1");
        assert_eq!(json["status"], "collecting");
        assert_eq!(json["kind"], "insert");
    }
}
