use super::error::SessionError;
use super::session::{ReplacementRequest, Session, SessionStatus};
use super::value::SqlValue;
use crate::catalog::MutationKind;
use crate::shared::fs_atomic::{atomic_write_file, remove_file_if_exists};
use crate::shared::{ConversationId, EngineLog};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

/// Persistence seam for session records. Implementations hold at most one
/// record per conversation.
pub trait SessionBackend: Send + Sync {
    fn load(&self, conversation_id: &ConversationId) -> Result<Option<Session>, SessionError>;
    fn save(&self, session: &Session) -> Result<(), SessionError>;
    fn remove(&self, conversation_id: &ConversationId) -> Result<bool, SessionError>;
}

#[derive(Debug, Default)]
pub struct MemoryBackend {
    records: Mutex<HashMap<ConversationId, Session>>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl SessionBackend for MemoryBackend {
    fn load(&self, conversation_id: &ConversationId) -> Result<Option<Session>, SessionError> {
        let records = self.records.lock().unwrap_or_else(|err| err.into_inner());
        Ok(records.get(conversation_id).cloned())
    }

    fn save(&self, session: &Session) -> Result<(), SessionError> {
        let mut records = self.records.lock().unwrap_or_else(|err| err.into_inner());
        records.insert(session.conversation_id.clone(), session.clone());
        Ok(())
    }

    fn remove(&self, conversation_id: &ConversationId) -> Result<bool, SessionError> {
        let mut records = self.records.lock().unwrap_or_else(|err| err.into_inner());
        Ok(records.remove(conversation_id).is_some())
    }
}

/// One JSON record per conversation under `<state_root>/sessions/`.
#[derive(Debug, Clone)]
pub struct FileBackend {
    root: PathBuf,
}

impl FileBackend {
    pub fn new(state_root: impl Into<PathBuf>) -> Self {
        Self {
            root: state_root.into().join("sessions"),
        }
    }

    pub fn record_path(&self, conversation_id: &ConversationId) -> PathBuf {
        let mut hasher = Sha256::new();
        hasher.update(conversation_id.as_str().as_bytes());
        let digest = hasher.finalize();
        let name = digest
            .iter()
            .map(|byte| format!("{byte:02x}"))
            .collect::<String>();
        self.root.join(format!("{name}.json"))
    }
}

fn io_error(path: &Path, source: std::io::Error) -> SessionError {
    SessionError::Io {
        path: path.display().to_string(),
        source,
    }
}

impl SessionBackend for FileBackend {
    fn load(&self, conversation_id: &ConversationId) -> Result<Option<Session>, SessionError> {
        let path = self.record_path(conversation_id);
        let raw = match std::fs::read_to_string(&path) {
            Ok(raw) => raw,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(io_error(&path, err)),
        };
        serde_json::from_str(&raw)
            .map(Some)
            .map_err(|source| SessionError::Json {
                path: path.display().to_string(),
                source,
            })
    }

    fn save(&self, session: &Session) -> Result<(), SessionError> {
        let path = self.record_path(&session.conversation_id);
        let body = serde_json::to_vec_pretty(session).map_err(|source| SessionError::Json {
            path: path.display().to_string(),
            source,
        })?;
        atomic_write_file(&path, &body).map_err(|err| io_error(&path, err))
    }

    fn remove(&self, conversation_id: &ConversationId) -> Result<bool, SessionError> {
        let path = self.record_path(conversation_id);
        remove_file_if_exists(&path).map_err(|err| io_error(&path, err))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionPolicy {
    pub ttl_seconds: u64,
    pub retry_budget: u32,
}

impl Default for SessionPolicy {
    fn default() -> Self {
        Self {
            ttl_seconds: 3600,
            retry_budget: 3,
        }
    }
}

/// Result of a database-driven correction cycle.
#[derive(Debug, Clone, PartialEq)]
pub enum CorrectionOutcome {
    Reprompt(Session),
    /// The field's budget reached zero; the session was closed as failed.
    Exhausted(Session),
}

/// Keyed, TTL-bound session store with a lane lock per conversation.
pub struct SessionStore {
    backend: Box<dyn SessionBackend>,
    policy: SessionPolicy,
    log: EngineLog,
    lanes: Mutex<HashMap<ConversationId, Arc<Mutex<()>>>>,
}

impl SessionStore {
    pub fn new(backend: impl SessionBackend + 'static, policy: SessionPolicy, log: EngineLog) -> Self {
        Self {
            backend: Box::new(backend),
            policy,
            log,
            lanes: Mutex::new(HashMap::new()),
        }
    }

    pub fn in_memory(policy: SessionPolicy) -> Self {
        Self::new(MemoryBackend::new(), policy, EngineLog::disabled())
    }

    pub fn policy(&self) -> SessionPolicy {
        self.policy
    }

    /// Runs `work` while holding the conversation's lane. Turns for the same
    /// conversation never overlap; other conversations proceed in parallel.
    pub fn with_lane<T>(&self, conversation_id: &ConversationId, work: impl FnOnce() -> T) -> T {
        let lane = {
            let mut lanes = self.lanes.lock().unwrap_or_else(|err| err.into_inner());
            lanes
                .entry(conversation_id.clone())
                .or_insert_with(|| Arc::new(Mutex::new(())))
                .clone()
        };
        let result = {
            let _guard = lane.lock().unwrap_or_else(|err| err.into_inner());
            work()
        };
        let mut lanes = self.lanes.lock().unwrap_or_else(|err| err.into_inner());
        // the map and this call hold the only references
        if Arc::strong_count(&lane) == 2 {
            lanes.remove(conversation_id);
        }
        result
    }

    pub fn lane_count(&self) -> usize {
        self.lanes
            .lock()
            .unwrap_or_else(|err| err.into_inner())
            .len()
    }

    /// Returns the active session, evicting it first if its TTL has elapsed.
    pub fn get(
        &self,
        conversation_id: &ConversationId,
        now: i64,
    ) -> Result<Option<Session>, SessionError> {
        let Some(session) = self.backend.load(conversation_id)? else {
            return Ok(None);
        };
        if session.status.is_terminal() {
            self.backend.remove(conversation_id)?;
            return Ok(None);
        }
        if session.is_expired(now, self.policy.ttl_seconds) {
            self.backend.remove(conversation_id)?;
            self.log.event(
                now,
                conversation_id.as_str(),
                "session_expired",
                &[
                    ("table", session.table.clone()),
                    ("status", SessionStatus::Abandoned.to_string()),
                    ("idle_seconds", (now - session.last_touched).to_string()),
                ],
            );
            return Ok(None);
        }
        Ok(Some(session))
    }

    #[allow(clippy::too_many_arguments)]
    pub fn create(
        &self,
        conversation_id: &ConversationId,
        table: &str,
        kind: MutationKind,
        required: &[String],
        initial: BTreeMap<String, SqlValue>,
        replace: bool,
        now: i64,
    ) -> Result<Session, SessionError> {
        if let Some(existing) = self.get(conversation_id, now)? {
            if !replace {
                return Err(SessionError::SessionConflict {
                    conversation_id: conversation_id.to_string(),
                    table: existing.table,
                    kind: existing.kind,
                });
            }
            self.backend.remove(conversation_id)?;
            self.log.event(
                now,
                conversation_id.as_str(),
                "session_closed",
                &[
                    ("table", existing.table),
                    ("status", SessionStatus::Abandoned.to_string()),
                    ("reason", "replaced".to_string()),
                ],
            );
        }

        let pending = required
            .iter()
            .filter(|column| !initial.contains_key(column.as_str()))
            .cloned()
            .collect::<Vec<_>>();
        let retry_budgets = required
            .iter()
            .map(|column| (column.clone(), self.policy.retry_budget))
            .collect();
        let status = if pending.is_empty() {
            SessionStatus::Ready
        } else {
            SessionStatus::Collecting
        };
        let session = Session {
            conversation_id: conversation_id.clone(),
            table: table.to_string(),
            kind,
            collected: initial,
            pending,
            status,
            retry_budgets,
            failures: BTreeMap::new(),
            reasons: BTreeMap::new(),
            pending_replacement: None,
            created_at: now,
            last_touched: now,
        };
        session
            .check_invariants()
            .map_err(SessionError::InvariantViolation)?;
        self.backend.save(&session)?;
        self.log.event(
            now,
            conversation_id.as_str(),
            "session_created",
            &[
                ("table", session.table.clone()),
                ("kind", kind.to_string()),
                ("pending", session.pending.join(",")),
            ],
        );
        Ok(session)
    }

    /// Moves `column` from the pending queue into the collected values.
    pub fn assign(
        &self,
        conversation_id: &ConversationId,
        column: &str,
        value: SqlValue,
        now: i64,
    ) -> Result<Session, SessionError> {
        self.update(conversation_id, now, |session| {
            if !session.status.accepts_values() {
                return Err(SessionError::InvalidTransition {
                    from: session.status,
                    to: SessionStatus::Collecting,
                });
            }
            let Some(index) = session.pending.iter().position(|pending| pending == column) else {
                return Err(SessionError::InvalidColumn {
                    column: column.to_string(),
                    pending: session.pending.clone(),
                });
            };
            let column = session.pending.remove(index);
            session.reasons.remove(&column);
            session.collected.insert(column, value);
            session.status = if session.pending.is_empty() {
                SessionStatus::Ready
            } else if session.reasons.is_empty() {
                SessionStatus::Collecting
            } else {
                SessionStatus::AwaitingCorrection
            };
            Ok(())
        })
    }

    /// Records a value that could not be coerced. The field stays pending and
    /// its retry budget is untouched.
    pub fn record_type_mismatch(
        &self,
        conversation_id: &ConversationId,
        column: &str,
        reason: &str,
        now: i64,
    ) -> Result<Session, SessionError> {
        self.update(conversation_id, now, |session| {
            if !session.is_pending(column) {
                return Err(SessionError::InvalidColumn {
                    column: column.to_string(),
                    pending: session.pending.clone(),
                });
            }
            *session.failures.entry(column.to_string()).or_insert(0) += 1;
            session
                .reasons
                .insert(column.to_string(), reason.to_string());
            session.status = SessionStatus::AwaitingCorrection;
            Ok(())
        })
    }

    /// Pushes `column` back to the front of the queue after the database
    /// rejected it, spending one unit of its retry budget.
    pub fn mark_awaiting_correction(
        &self,
        conversation_id: &ConversationId,
        column: &str,
        reason: &str,
        now: i64,
    ) -> Result<CorrectionOutcome, SessionError> {
        let mut session = self.require(conversation_id, now)?;
        session.collected.remove(column);
        session.pending.retain(|pending| pending != column);
        session.pending.insert(0, column.to_string());
        let budget = session
            .retry_budgets
            .entry(column.to_string())
            .or_insert(self.policy.retry_budget);
        *budget = budget.saturating_sub(1);
        let remaining = *budget;
        *session.failures.entry(column.to_string()).or_insert(0) += 1;
        session
            .reasons
            .insert(column.to_string(), reason.to_string());
        session.last_touched = now;

        if remaining == 0 {
            self.transition_checked(&mut session, SessionStatus::Failed)?;
            self.backend.remove(conversation_id)?;
            self.log.event(
                now,
                conversation_id.as_str(),
                "session_closed",
                &[
                    ("table", session.table.clone()),
                    ("status", SessionStatus::Failed.to_string()),
                    ("reason", format!("retry budget exhausted for {column}")),
                ],
            );
            return Ok(CorrectionOutcome::Exhausted(session));
        }

        self.transition_checked(&mut session, SessionStatus::AwaitingCorrection)?;
        session
            .check_invariants()
            .map_err(SessionError::InvariantViolation)?;
        self.backend.save(&session)?;
        self.log.event(
            now,
            conversation_id.as_str(),
            "awaiting_correction",
            &[
                ("column", column.to_string()),
                ("budget", remaining.to_string()),
            ],
        );
        Ok(CorrectionOutcome::Reprompt(session))
    }

    /// Moves an active session to a non-terminal status.
    pub fn transition(
        &self,
        conversation_id: &ConversationId,
        next: SessionStatus,
        now: i64,
    ) -> Result<Session, SessionError> {
        if next.is_terminal() {
            let current = self.require(conversation_id, now)?;
            return Err(SessionError::InvalidTransition {
                from: current.status,
                to: next,
            });
        }
        let mut session = self.require(conversation_id, now)?;
        self.transition_checked(&mut session, next)?;
        session.last_touched = now;
        session
            .check_invariants()
            .map_err(SessionError::InvariantViolation)?;
        self.backend.save(&session)?;
        Ok(session)
    }

    pub fn set_pending_replacement(
        &self,
        conversation_id: &ConversationId,
        request: Option<ReplacementRequest>,
        now: i64,
    ) -> Result<Session, SessionError> {
        self.update(conversation_id, now, |session| {
            session.pending_replacement = request;
            Ok(())
        })
    }

    /// Closes the session with a terminal outcome and releases it. Abandoning
    /// is allowed from any active status; other outcomes follow the state
    /// machine.
    pub fn close(
        &self,
        conversation_id: &ConversationId,
        outcome: SessionStatus,
        now: i64,
    ) -> Result<Option<Session>, SessionError> {
        let Some(mut session) = self.backend.load(conversation_id)? else {
            return Ok(None);
        };
        if !outcome.is_terminal() {
            return Err(SessionError::InvalidTransition {
                from: session.status,
                to: outcome,
            });
        }
        if outcome != SessionStatus::Abandoned || session.status.is_terminal() {
            self.transition_checked(&mut session, outcome)?;
        }
        session.status = outcome;
        session.last_touched = now;
        self.backend.remove(conversation_id)?;
        self.log.event(
            now,
            conversation_id.as_str(),
            "session_closed",
            &[
                ("table", session.table.clone()),
                ("status", outcome.to_string()),
            ],
        );
        Ok(Some(session))
    }

    fn require(
        &self,
        conversation_id: &ConversationId,
        now: i64,
    ) -> Result<Session, SessionError> {
        self.get(conversation_id, now)?
            .ok_or_else(|| SessionError::NotFound {
                conversation_id: conversation_id.to_string(),
            })
    }

    fn update(
        &self,
        conversation_id: &ConversationId,
        now: i64,
        apply: impl FnOnce(&mut Session) -> Result<(), SessionError>,
    ) -> Result<Session, SessionError> {
        let mut session = self.require(conversation_id, now)?;
        apply(&mut session)?;
        session.last_touched = now;
        session
            .check_invariants()
            .map_err(SessionError::InvariantViolation)?;
        self.backend.save(&session)?;
        Ok(session)
    }

    fn transition_checked(
        &self,
        session: &mut Session,
        next: SessionStatus,
    ) -> Result<(), SessionError> {
        if !session.status.can_transition_to(next) {
            return Err(SessionError::InvalidTransition {
                from: session.status,
                to: next,
            });
        }
        session.status = next;
        Ok(())
    }
}
