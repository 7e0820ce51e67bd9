use super::coerce::coerce_value;
use super::error::{BuilderError, SessionError};
use super::plan::StatementPlan;
use super::prompt::FormPrompt;
use super::session::{Session, SessionStatus};
use super::store::SessionStore;
use super::value::SqlValue;
use crate::catalog::{ManifestCatalog, MutationKind, TableManifest};
use crate::shared::{ConversationId, EngineLog};
use std::collections::BTreeMap;

/// What the caller should do next with a guided mutation.
#[derive(Debug, Clone, PartialEq)]
pub enum BuildStep {
    Prompt(FormPrompt),
    Ready(StatementPlan),
}

pub struct SqlBuilder<'a> {
    catalog: &'a ManifestCatalog,
    store: &'a SessionStore,
    log: &'a EngineLog,
}

impl<'a> SqlBuilder<'a> {
    pub fn new(catalog: &'a ManifestCatalog, store: &'a SessionStore, log: &'a EngineLog) -> Self {
        Self {
            catalog,
            store,
            log,
        }
    }

    /// Opens a session for `table`. Initial values that coerce cleanly are
    /// collected; the rest stay pending with a correction reason.
    pub fn start_mutation(
        &self,
        conversation_id: &ConversationId,
        table: &str,
        kind: MutationKind,
        initial: &BTreeMap<String, String>,
        replace: bool,
        now: i64,
    ) -> Result<BuildStep, BuilderError> {
        let manifest = self.catalog.table(table)?;
        if kind == MutationKind::Update && manifest.identity_columns().is_empty() {
            return Err(BuilderError::UpdateWithoutIdentity {
                table: manifest.name.clone(),
            });
        }

        let mut collected = BTreeMap::new();
        let mut rejected = Vec::new();
        for (raw_column, raw_value) in initial {
            let Some(column) = manifest.column(raw_column) else {
                self.log.event(
                    now,
                    conversation_id.as_str(),
                    "unknown_column_ignored",
                    &[
                        ("table", manifest.name.clone()),
                        ("column", raw_column.clone()),
                    ],
                );
                continue;
            };
            match coerce_value(column, raw_value) {
                Ok(value) => {
                    collected.insert(column.name.clone(), value);
                }
                Err(reason) => rejected.push((column.name.clone(), reason)),
            }
        }

        // explicitly targeted columns join the queue even when optional
        let queue = manifest
            .columns
            .iter()
            .filter(|column| {
                column.required_for(kind)
                    || rejected.iter().any(|(name, _)| name == &column.name)
            })
            .map(|column| column.name.clone())
            .collect::<Vec<_>>();

        let mut session = self.store.create(
            conversation_id,
            &manifest.name,
            kind,
            &queue,
            collected,
            replace,
            now,
        )?;
        for (column, reason) in &rejected {
            session = self
                .store
                .record_type_mismatch(conversation_id, column, reason, now)?;
        }
        self.next_step(&session)
    }

    /// Fills the head of the pending queue with `raw`.
    pub fn advance(
        &self,
        conversation_id: &ConversationId,
        raw: &str,
        now: i64,
    ) -> Result<BuildStep, BuilderError> {
        let session = self.collecting_session(conversation_id, now)?;
        let Some(field) = session.next_field().map(str::to_string) else {
            return self.next_step(&session);
        };
        self.assign_coerced(session, &field, raw, now)
    }

    /// Fills a specific pending field; prompts still follow manifest order.
    pub fn advance_named(
        &self,
        conversation_id: &ConversationId,
        column: &str,
        raw: &str,
        now: i64,
    ) -> Result<BuildStep, BuilderError> {
        let session = self.collecting_session(conversation_id, now)?;
        let manifest = self.catalog.table(&session.table)?;
        let canonical = match manifest.column(column) {
            Some(def) => def.name.clone(),
            None => column.trim().to_string(),
        };
        if !session.is_pending(&canonical) {
            return Err(SessionError::InvalidColumn {
                column: canonical,
                pending: session.pending.clone(),
            }
            .into());
        }
        self.assign_coerced(session, &canonical, raw, now)
    }

    /// Re-derives the next step of the active session without changing it.
    pub fn current_step(
        &self,
        conversation_id: &ConversationId,
        now: i64,
    ) -> Result<BuildStep, BuilderError> {
        let session = self.require(conversation_id, now)?;
        self.next_step(&session)
    }

    /// Produces the statement for a session whose queue is empty. Column order
    /// follows the manifest, so the result does not depend on turn order.
    pub fn finalize(
        &self,
        conversation_id: &ConversationId,
        now: i64,
    ) -> Result<StatementPlan, BuilderError> {
        let session = self.require(conversation_id, now)?;
        self.plan_for(&session)
    }

    /// Claims the session for execution. A second call fails until the
    /// outcome has been recorded.
    pub fn begin_execution(
        &self,
        conversation_id: &ConversationId,
        now: i64,
    ) -> Result<StatementPlan, BuilderError> {
        let session = self.require(conversation_id, now)?;
        if session.status == SessionStatus::Executing {
            return Err(BuilderError::AlreadyExecuting);
        }
        let plan = self.plan_for(&session)?;
        self.store
            .transition(conversation_id, SessionStatus::Executing, now)?;
        Ok(plan)
    }

    pub fn plan_select(
        &self,
        table: &str,
        filters: &BTreeMap<String, String>,
        limit: u32,
    ) -> Result<StatementPlan, BuilderError> {
        let manifest = self.catalog.table(table)?;
        let mut conditions = Vec::new();
        for column in &manifest.columns {
            let Some(raw) = filters
                .iter()
                .find(|(name, _)| column.name.eq_ignore_ascii_case(name.trim()))
                .map(|(_, raw)| raw)
            else {
                continue;
            };
            let value = coerce_value(column, raw).map_err(|reason| BuilderError::InvalidFilter {
                column: column.name.clone(),
                reason,
            })?;
            conditions.push((column.name.clone(), value));
        }
        if let Some(unknown) = filters.keys().find(|name| manifest.column(name).is_none()) {
            return Err(BuilderError::InvalidFilter {
                column: unknown.clone(),
                reason: format!("`{}` has no such column", manifest.name),
            });
        }
        Ok(StatementPlan::select(
            &manifest.name,
            Vec::new(),
            conditions,
            limit,
        ))
    }

    pub(crate) fn prompt_for(&self, session: &Session, field: &str) -> FormPrompt {
        match self
            .catalog
            .table(&session.table)
            .ok()
            .and_then(|manifest| manifest.column(field))
        {
            Some(column) => FormPrompt::for_field(session, column),
            None => FormPrompt::for_unknown_field(session, field),
        }
    }

    fn assign_coerced(
        &self,
        session: Session,
        field: &str,
        raw: &str,
        now: i64,
    ) -> Result<BuildStep, BuilderError> {
        let coerced = match self.catalog.column_def(&session.table, field) {
            Ok(column) => coerce_value(column, raw),
            // required by the database but absent from the manifest
            Err(_) => Ok(SqlValue::Text(raw.trim().to_string())),
        };
        match coerced {
            Ok(value) => {
                let updated = self
                    .store
                    .assign(&session.conversation_id, field, value, now)?;
                self.next_step(&updated)
            }
            Err(reason) => {
                let updated = self.store.record_type_mismatch(
                    &session.conversation_id,
                    field,
                    &reason,
                    now,
                )?;
                self.log.event(
                    now,
                    session.conversation_id.as_str(),
                    "type_mismatch",
                    &[("column", field.to_string()), ("reason", reason.clone())],
                );
                Err(BuilderError::TypeMismatch {
                    column: field.to_string(),
                    reason,
                    prompt: Box::new(self.prompt_for(&updated, field)),
                })
            }
        }
    }

    fn next_step(&self, session: &Session) -> Result<BuildStep, BuilderError> {
        match session.next_field() {
            Some(field) => Ok(BuildStep::Prompt(self.prompt_for(session, field))),
            None => self.plan_for(session).map(BuildStep::Ready),
        }
    }

    fn plan_for(&self, session: &Session) -> Result<StatementPlan, BuilderError> {
        if !session.pending.is_empty() {
            return Err(BuilderError::QueueNotEmpty {
                pending: session.pending.clone(),
            });
        }
        let manifest = self.catalog.table(&session.table)?;
        let ordered = ordered_values(manifest, &session.collected);
        match session.kind {
            MutationKind::Insert => Ok(StatementPlan::insert(&manifest.name, ordered)),
            MutationKind::Update => {
                let (conditions, assignments): (Vec<_>, Vec<_>) =
                    ordered.into_iter().partition(|(column, _)| {
                        manifest
                            .column(column)
                            .map(|def| def.identity)
                            .unwrap_or(false)
                    });
                if conditions.is_empty() {
                    return Err(BuilderError::UpdateWithoutIdentity {
                        table: manifest.name.clone(),
                    });
                }
                if assignments.is_empty() {
                    return Err(BuilderError::EmptyUpdate {
                        table: manifest.name.clone(),
                    });
                }
                Ok(StatementPlan::update(&manifest.name, assignments, conditions))
            }
        }
    }

    fn collecting_session(
        &self,
        conversation_id: &ConversationId,
        now: i64,
    ) -> Result<Session, BuilderError> {
        let session = self.require(conversation_id, now)?;
        match session.status {
            SessionStatus::Executing => Err(BuilderError::AlreadyExecuting),
            status if !status.accepts_values() => Err(BuilderError::NotCollecting { status }),
            _ => Ok(session),
        }
    }

    fn require(
        &self,
        conversation_id: &ConversationId,
        now: i64,
    ) -> Result<Session, BuilderError> {
        self.store
            .get(conversation_id, now)?
            .ok_or_else(|| {
                SessionError::NotFound {
                    conversation_id: conversation_id.to_string(),
                }
                .into()
            })
    }
}

/// Manifest columns first, in declaration order, then any columns the
/// database asked for that the manifest does not declare.
fn ordered_values(
    manifest: &TableManifest,
    collected: &BTreeMap<String, SqlValue>,
) -> Vec<(String, SqlValue)> {
    let mut ordered = manifest
        .columns
        .iter()
        .filter_map(|column| {
            collected
                .get(&column.name)
                .map(|value| (column.name.clone(), value.clone()))
        })
        .collect::<Vec<_>>();
    ordered.extend(
        collected
            .iter()
            .filter(|(name, _)| manifest.column(name).is_none())
            .map(|(name, value)| (name.clone(), value.clone())),
    );
    ordered
}
