use super::conversation_context::{ConversationHistory, HistoryLimits};
use super::error::RouterError;
use super::oracle::{
    ActiveSessionSummary, ConversationContext, IntentAnalysis, IntentOracle, Operation, Route,
};
use super::turn::{FinalAnswer, TurnInput, TurnOutput, UserErrorKind};
use crate::catalog::{CatalogError, ManifestCatalog, MutationKind, TableManifest};
use crate::executor::StatementExecutor;
use crate::mutation::field_input::parse_assignments;
use crate::mutation::{
    classify_failure, classify_turn, recover, BuildStep, BuilderError, CommandSignal,
    ConfirmationPrompt, FailureClass, GuardDecision, RecoveryStep, ReplacementRequest, Session,
    SessionError, SessionStatus, SessionStore, SqlBuilder, StatementKind, StatementPlan,
};
use crate::shared::{ConversationId, EngineLog};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::{Arc, RwLock};

const CANCEL_WORDS: &[&str] = &["cancel", "stop", "exit", "abort"];
const CONFIRM_WORDS: &[&str] = &["yes", "y", "confirm", "ok", "go"];
const DECLINE_WORDS: &[&str] = &["no", "n"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InterruptionPolicy {
    /// Keep the session; the next value-shaped turn continues it.
    #[default]
    Suspend,
    Abandon,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RouterConfig {
    pub interruption_policy: InterruptionPolicy,
    pub confirm_before_execute: bool,
    pub row_limit: u32,
    pub history: HistoryLimits,
}

impl Default for RouterConfig {
    fn default() -> Self {
        Self {
            interruption_policy: InterruptionPolicy::Suspend,
            confirm_before_execute: false,
            row_limit: 100,
            history: HistoryLimits::default(),
        }
    }
}

/// Per-turn driver. One turn per conversation runs at a time; different
/// conversations share only the catalog snapshot.
pub struct Router<O, E> {
    catalog: RwLock<Arc<ManifestCatalog>>,
    store: SessionStore,
    oracle: O,
    executor: E,
    history: ConversationHistory,
    log: EngineLog,
    config: RouterConfig,
}

impl<O: IntentOracle, E: StatementExecutor> Router<O, E> {
    pub fn new(
        catalog: ManifestCatalog,
        store: SessionStore,
        oracle: O,
        executor: E,
        log: EngineLog,
        config: RouterConfig,
    ) -> Self {
        let history =
            ConversationHistory::new(log.state_root().map(|root| root.to_path_buf()), config.history);
        Self {
            catalog: RwLock::new(Arc::new(catalog)),
            store,
            oracle,
            executor,
            history,
            log,
            config,
        }
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn oracle(&self) -> &O {
        &self.oracle
    }

    pub fn executor(&self) -> &E {
        &self.executor
    }

    pub fn catalog(&self) -> Arc<ManifestCatalog> {
        self.catalog
            .read()
            .unwrap_or_else(|err| err.into_inner())
            .clone()
    }

    /// Swaps in a refreshed catalog. Turns already running keep the snapshot
    /// they started with.
    pub fn replace_catalog(&self, catalog: ManifestCatalog) {
        let mut current = self.catalog.write().unwrap_or_else(|err| err.into_inner());
        *current = Arc::new(catalog);
    }

    pub fn handle_turn(&self, input: &TurnInput, now: i64) -> Result<TurnOutput, RouterError> {
        let conversation_id = ConversationId::parse(input.conversation_id.trim())
            .map_err(RouterError::InvalidConversationId)?;
        self.store.with_lane(&conversation_id, || {
            let _ = self
                .history
                .append_inbound(&conversation_id, now, &input.raw_text);
            let output = self.process_turn(&conversation_id, input.raw_text.trim(), now)?;
            let _ = self
                .history
                .append_outbound(&conversation_id, now, &output.render());
            Ok(output)
        })
    }

    fn process_turn(
        &self,
        conversation_id: &ConversationId,
        text: &str,
        now: i64,
    ) -> Result<TurnOutput, RouterError> {
        let catalog = self.catalog();
        let turn = Turn {
            router: self,
            catalog: &catalog,
            builder: SqlBuilder::new(&catalog, &self.store, &self.log),
            conversation_id,
            now,
        };
        match self.store.get(conversation_id, now)? {
            Some(session) => turn.continue_session(session, text),
            None => turn.route_fresh(text),
        }
    }
}

/// Borrowed state for a single turn.
struct Turn<'a, O, E> {
    router: &'a Router<O, E>,
    catalog: &'a ManifestCatalog,
    builder: SqlBuilder<'a>,
    conversation_id: &'a ConversationId,
    now: i64,
}

impl<O: IntentOracle, E: StatementExecutor> Turn<'_, O, E> {
    fn store(&self) -> &SessionStore {
        &self.router.store
    }

    fn event(&self, event: &str, fields: &[(&str, String)]) {
        self.router
            .log
            .event(self.now, self.conversation_id.as_str(), event, fields);
    }

    fn note(&self, message: &str) {
        let _ = self
            .router
            .history
            .append_note(self.conversation_id, self.now, message);
    }

    fn continue_session(&self, session: Session, text: &str) -> Result<TurnOutput, RouterError> {
        let lowered = text.to_ascii_lowercase();
        if CANCEL_WORDS.contains(&lowered.as_str()) {
            self.store()
                .close(self.conversation_id, SessionStatus::Abandoned, self.now)?;
            self.note(&format!("{} of {} cancelled by user", session.kind, session.table));
            return Ok(TurnOutput::Answer(FinalAnswer::summary(format!(
                "Cancelled {} the {} record.",
                session.kind.verb(),
                session.table
            ))));
        }

        let session = if let Some(request) = session.pending_replacement.clone() {
            match lowered.as_str() {
                "replace" => {
                    self.note(&format!(
                        "{} of {} abandoned for a new {} of {}",
                        session.kind, session.table, request.kind, request.table
                    ));
                    let step = self.builder.start_mutation(
                        self.conversation_id,
                        &request.table,
                        request.kind,
                        &request.values,
                        true,
                        self.now,
                    );
                    return self.step_output(step);
                }
                "resume" => {
                    self.store()
                        .set_pending_replacement(self.conversation_id, None, self.now)?;
                    let step = self.builder.current_step(self.conversation_id, self.now);
                    return self.step_output(step);
                }
                // anything else keeps the current session
                _ => self
                    .store()
                    .set_pending_replacement(self.conversation_id, None, self.now)?,
            }
        } else {
            session
        };

        match session.status {
            SessionStatus::Executing => {
                // a previous turn died between execution and recording its outcome
                self.store()
                    .close(self.conversation_id, SessionStatus::Failed, self.now)?;
                self.router.log.diagnostic(
                    self.now,
                    "execution_outcome_unknown",
                    &[
                        ("conversation", Value::from(self.conversation_id.as_str())),
                        ("table", Value::from(session.table.as_str())),
                    ],
                );
                Ok(TurnOutput::error(
                    UserErrorKind::Fatal,
                    format!(
                        "The previous {} of {} was interrupted and its outcome is unknown. Please check the data before trying again.",
                        session.kind, session.table
                    ),
                ))
            }
            SessionStatus::Ready => {
                if CONFIRM_WORDS.contains(&lowered.as_str()) {
                    return self.execute_session();
                }
                if DECLINE_WORDS.contains(&lowered.as_str()) {
                    self.store()
                        .close(self.conversation_id, SessionStatus::Abandoned, self.now)?;
                    return Ok(TurnOutput::Answer(FinalAnswer::summary(format!(
                        "Okay, the {} record was not saved.",
                        session.table
                    ))));
                }
                let notice = self.interrupt(&session, None)?;
                Ok(self.route_fresh(text)?.with_notice(notice))
            }
            _ => self.collect(session, text),
        }
    }

    fn collect(&self, session: Session, text: &str) -> Result<TurnOutput, RouterError> {
        let manifest = self.catalog.table(&session.table).ok();
        let assignments = manifest
            .map(|table| parse_assignments(table, text))
            .unwrap_or_default();
        if !assignments.is_empty() {
            return self.collect_named(&session, &assignments);
        }

        match classify_turn(self.catalog, &session, text) {
            GuardDecision::Value => {
                let step = self.builder.advance(self.conversation_id, text, self.now);
                self.step_output(step)
            }
            GuardDecision::NewCommand(signal) => {
                let notice = self.interrupt(&session, Some(&signal))?;
                Ok(self.route_fresh(text)?.with_notice(notice))
            }
        }
    }

    fn collect_named(
        &self,
        session: &Session,
        assignments: &[(String, String)],
    ) -> Result<TurnOutput, RouterError> {
        let mut skipped = Vec::new();
        for (index, (column, raw)) in assignments.iter().enumerate() {
            // a repeated column keeps its last value
            if assignments[index + 1..].iter().any(|(later, _)| later == column) {
                continue;
            }
            if !session.is_pending(column) {
                skipped.push(column.as_str());
                continue;
            }
            if let Err(err) = self
                .builder
                .advance_named(self.conversation_id, column, raw, self.now)
            {
                return self.builder_error_output(err);
            }
        }
        let step = self.builder.current_step(self.conversation_id, self.now);
        match (step, skipped.is_empty()) {
            (Ok(BuildStep::Prompt(mut prompt)), false) if prompt.reason.is_none() => {
                prompt.reason = Some(format!(
                    "`{}` is not being asked for right now",
                    skipped.join("`, `")
                ));
                Ok(TurnOutput::Prompt(prompt))
            }
            (step, _) => self.step_output(step),
        }
    }

    /// Applies the interruption policy before a new command is routed and
    /// returns the notice shown alongside that command's output.
    fn interrupt(
        &self,
        session: &Session,
        signal: Option<&CommandSignal>,
    ) -> Result<String, RouterError> {
        let reason = signal
            .map(ToString::to_string)
            .unwrap_or_else(|| "unconfirmed".to_string());
        self.event(
            "new_command_detected",
            &[("table", session.table.clone()), ("signal", reason)],
        );
        let notice = match self.router.config.interruption_policy {
            InterruptionPolicy::Suspend => format!(
                "{} of {} suspended; send a value to continue or `cancel` to drop it",
                session.kind, session.table
            ),
            InterruptionPolicy::Abandon => {
                self.store()
                    .close(self.conversation_id, SessionStatus::Abandoned, self.now)?;
                format!(
                    "{} of {} abandoned for a new request; nothing was saved",
                    session.kind, session.table
                )
            }
        };
        self.note(&notice);
        Ok(notice)
    }

    fn route_fresh(&self, text: &str) -> Result<TurnOutput, RouterError> {
        let active = self.store().get(self.conversation_id, self.now)?;
        let context = ConversationContext {
            conversation_id: self.conversation_id,
            catalog: self.catalog,
            history: self
                .router
                .history
                .render_recent(self.conversation_id)
                .ok()
                .flatten(),
            active_session: active.as_ref().map(|session| ActiveSessionSummary {
                table: session.table.clone(),
                kind: session.kind,
                status: session.status,
                next_field: session.next_field().map(str::to_string),
            }),
        };
        let analysis = match self.router.oracle.analyze(text, &context) {
            Ok(analysis) => analysis,
            Err(err) => {
                self.router.log.diagnostic(
                    self.now,
                    "oracle_failed",
                    &[
                        ("conversation", Value::from(self.conversation_id.as_str())),
                        ("error", Value::from(err.to_string())),
                    ],
                );
                return Ok(TurnOutput::error(
                    UserErrorKind::Fatal,
                    "Sorry, I could not understand that request right now.",
                ));
            }
        };

        if analysis.route == Route::Chat {
            let reply = analysis
                .reply
                .unwrap_or_else(|| "How can I help with your records?".to_string());
            return Ok(TurnOutput::Answer(FinalAnswer::summary(reply)));
        }

        let table = match self.resolve_table(&analysis, text) {
            Ok(table) => table,
            Err(output) => return Ok(output),
        };
        let operation = analysis.operation.unwrap_or(Operation::Select);
        let Some(kind) = operation.mutation_kind() else {
            return self.run_select(table, &analysis);
        };

        if let Some(active) = active {
            self.store().set_pending_replacement(
                self.conversation_id,
                Some(ReplacementRequest {
                    table: table.name.clone(),
                    kind,
                    values: analysis.extracted_values.clone(),
                    requested_at: self.now,
                }),
                self.now,
            )?;
            return Ok(TurnOutput::error(
                UserErrorKind::SessionConflict,
                format!(
                    "You are still {} a {} record. Reply `replace` to start the new {} of {} or `resume` to continue.",
                    active.kind.verb(),
                    active.table,
                    kind,
                    table.name
                ),
            ));
        }

        let step = self.builder.start_mutation(
            self.conversation_id,
            &table.name,
            kind,
            &analysis.extracted_values,
            false,
            self.now,
        );
        self.step_output(step)
    }

    fn resolve_table(
        &self,
        analysis: &IntentAnalysis,
        text: &str,
    ) -> Result<&TableManifest, TurnOutput> {
        let resolved = match analysis.entity_token.as_deref() {
            Some(token) => self.catalog.resolve_entity(token).map(Some),
            None => self.catalog.mentioned_entity(text),
        };
        match resolved {
            Ok(Some(table)) => Ok(table),
            Ok(None) | Err(CatalogError::UnknownEntity { .. }) => Err(TurnOutput::error(
                UserErrorKind::UnknownEntity,
                format!(
                    "I could not tell which table you mean. Known tables: {}.",
                    self.catalog.table_names().collect::<Vec<_>>().join(", ")
                ),
            )),
            Err(CatalogError::AmbiguousEntity { token, candidates }) => Err(TurnOutput::error(
                UserErrorKind::AmbiguousEntity,
                format!(
                    "`{token}` could mean {}. Which one do you mean?",
                    candidates.join(" or ")
                ),
            )),
            Err(err) => Err(TurnOutput::error(
                UserErrorKind::InvalidRequest,
                err.to_string(),
            )),
        }
    }

    fn run_select(
        &self,
        table: &TableManifest,
        analysis: &IntentAnalysis,
    ) -> Result<TurnOutput, RouterError> {
        let plan = match self.builder.plan_select(
            &table.name,
            &analysis.extracted_values,
            self.router.config.row_limit,
        ) {
            Ok(plan) => plan,
            Err(BuilderError::InvalidFilter { column, reason }) => {
                return Ok(TurnOutput::error(
                    UserErrorKind::InvalidRequest,
                    format!("Cannot filter on `{column}`: {reason}"),
                ));
            }
            Err(err) => return Err(err.into()),
        };
        match self.router.executor.execute(&plan) {
            Ok(outcome) => {
                self.event(
                    "statement_executed",
                    &[
                        ("kind", "select".to_string()),
                        ("table", table.name.clone()),
                        ("rows", outcome.rows.len().to_string()),
                    ],
                );
                Ok(TurnOutput::Answer(FinalAnswer {
                    summary: format!("Found {} {} record(s).", outcome.rows.len(), table.name),
                    rows_affected: outcome.rows.len(),
                    rows: outcome.rows,
                    notice: None,
                }))
            }
            Err(failure) => {
                self.router.log.diagnostic(
                    self.now,
                    "read_failed",
                    &[
                        ("conversation", Value::from(self.conversation_id.as_str())),
                        ("sql", Value::from(plan.sql())),
                        ("detail", Value::from(failure.detail.as_str())),
                    ],
                );
                Ok(TurnOutput::error(
                    UserErrorKind::Fatal,
                    "The records could not be read.",
                ))
            }
        }
    }

    fn step_output(&self, step: Result<BuildStep, BuilderError>) -> Result<TurnOutput, RouterError> {
        match step {
            Ok(BuildStep::Prompt(prompt)) => Ok(TurnOutput::Prompt(prompt)),
            Ok(BuildStep::Ready(plan)) if self.router.config.confirm_before_execute => {
                Ok(TurnOutput::Confirm(confirmation(self.conversation_id, &plan)))
            }
            Ok(BuildStep::Ready(_)) => self.execute_session(),
            Err(err) => self.builder_error_output(err),
        }
    }

    fn builder_error_output(&self, err: BuilderError) -> Result<TurnOutput, RouterError> {
        match err {
            BuilderError::TypeMismatch { prompt, .. } => Ok(TurnOutput::Prompt(*prompt)),
            BuilderError::Catalog(CatalogError::AmbiguousEntity { token, candidates }) => {
                Ok(TurnOutput::error(
                    UserErrorKind::AmbiguousEntity,
                    format!("`{token}` could mean {}.", candidates.join(" or ")),
                ))
            }
            BuilderError::Session(SessionError::SessionConflict { table, kind, .. }) => {
                Ok(TurnOutput::error(
                    UserErrorKind::SessionConflict,
                    format!(
                        "You are still {} a {table} record. Reply `resume` to continue or `cancel` to drop it.",
                        kind.verb()
                    ),
                ))
            }
            BuilderError::Session(SessionError::InvalidColumn { column, pending }) => {
                self.router.log.diagnostic(
                    self.now,
                    "invariant_violation",
                    &[
                        ("conversation", Value::from(self.conversation_id.as_str())),
                        ("column", Value::from(column)),
                        ("pending", Value::from(pending)),
                    ],
                );
                self.store()
                    .close(self.conversation_id, SessionStatus::Failed, self.now)?;
                Ok(TurnOutput::error(
                    UserErrorKind::Fatal,
                    "Something went wrong with this request, so it was cancelled.",
                ))
            }
            BuilderError::EmptyUpdate { table } => {
                self.store()
                    .close(self.conversation_id, SessionStatus::Failed, self.now)?;
                Ok(TurnOutput::error(
                    UserErrorKind::InvalidRequest,
                    format!(
                        "Nothing to change was given for {table}. Include the new values, for example `update {table} id=1 name=New`."
                    ),
                ))
            }
            BuilderError::UpdateWithoutIdentity { table } => Ok(TurnOutput::error(
                UserErrorKind::InvalidRequest,
                format!("{table} records cannot be updated because no identity column is declared."),
            )),
            BuilderError::AlreadyExecuting => Ok(TurnOutput::error(
                UserErrorKind::InvalidRequest,
                "This request is already being saved.",
            )),
            other => Err(other.into()),
        }
    }

    /// Claims the session, runs the statement once and records the outcome.
    fn execute_session(&self) -> Result<TurnOutput, RouterError> {
        let plan = match self.builder.begin_execution(self.conversation_id, self.now) {
            Ok(plan) => plan,
            Err(err) => return self.builder_error_output(err),
        };
        self.event(
            "statement_started",
            &[
                ("table", plan.table().to_string()),
                ("sql", plan.sql()),
            ],
        );

        match self.router.executor.execute(&plan) {
            Ok(outcome) => {
                self.store()
                    .close(self.conversation_id, SessionStatus::Complete, self.now)?;
                self.event(
                    "statement_executed",
                    &[
                        ("table", plan.table().to_string()),
                        ("rows_affected", outcome.rows_affected.to_string()),
                    ],
                );
                Ok(TurnOutput::Answer(FinalAnswer {
                    summary: completion_summary(&plan, outcome.rows_affected, outcome.last_insert_id),
                    rows_affected: outcome.rows_affected,
                    rows: outcome.rows,
                    notice: None,
                }))
            }
            Err(failure) => {
                let class = classify_failure(self.catalog, plan.table(), &failure);
                self.router.log.diagnostic(
                    self.now,
                    "statement_failed",
                    &[
                        ("conversation", Value::from(self.conversation_id.as_str())),
                        ("sql", Value::from(plan.sql())),
                        ("code", Value::from(failure.code.clone())),
                        ("detail", Value::from(failure.detail.as_str())),
                        ("class", Value::from(class.label())),
                    ],
                );
                match recover(
                    self.catalog,
                    self.store(),
                    &self.router.log,
                    self.conversation_id,
                    class,
                    self.now,
                )? {
                    RecoveryStep::Reprompt(prompt) => Ok(TurnOutput::Prompt(prompt)),
                    RecoveryStep::Closed { class, message } => {
                        let kind = match class {
                            FailureClass::ConstraintViolation { .. } => {
                                UserErrorKind::ConstraintViolation
                            }
                            _ => UserErrorKind::Fatal,
                        };
                        Ok(TurnOutput::error(kind, message))
                    }
                }
            }
        }
    }
}

fn confirmation(conversation_id: &ConversationId, plan: &StatementPlan) -> ConfirmationPrompt {
    let kind = match plan.kind() {
        StatementKind::Update => MutationKind::Update,
        _ => MutationKind::Insert,
    };
    ConfirmationPrompt {
        session_id: conversation_id.to_string(),
        table: plan.table().to_string(),
        kind,
        preview: plan.preview(),
        notice: None,
    }
}

fn completion_summary(plan: &StatementPlan, rows_affected: usize, last_insert_id: Option<i64>) -> String {
    match plan.kind() {
        StatementKind::Insert => match last_insert_id {
            Some(id) => format!("Created the {} record (id {id}).", plan.table()),
            None => format!("Created the {} record.", plan.table()),
        },
        StatementKind::Update if rows_affected == 0 => {
            format!("No {} record matched, so nothing was updated.", plan.table())
        }
        _ => format!("Updated {rows_affected} {} record(s).", plan.table()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::catalog::ManifestFile;
    use crate::executor::{ExecutionOutcome, ExecutorFailure};
    use crate::mutation::SessionPolicy;
    use crate::orchestration::LexicalOracle;
    use crate::shared::logging::diagnostics_log_path;
    use std::collections::BTreeMap;
    use tempfile::tempdir;

    struct NoExecutor;

    impl StatementExecutor for NoExecutor {
        fn execute(&self, _plan: &StatementPlan) -> Result<ExecutionOutcome, ExecutorFailure> {
            Err(ExecutorFailure::new(None, "not expected"))
        }
    }

    fn catalog() -> ManifestCatalog {
        let file: ManifestFile = serde_yaml::from_str(
            r#"
tables:
  schedule:
    columns:
      - { name: id, type: integer, identity: true, has_default: true }
      - { name: name, type: text }
      - { name: owner_id, type: integer }
"#,
        )
        .expect("parse manifest");
        ManifestCatalog::from_manifest_file(file).expect("build catalog")
    }

    #[test]
    fn out_of_order_column_fails_the_session_without_leaking_it() {
        let dir = tempdir().expect("tempdir");
        let router = Router::new(
            catalog(),
            SessionStore::in_memory(SessionPolicy::default()),
            LexicalOracle::new(),
            NoExecutor,
            EngineLog::new(Some(dir.path().to_path_buf())),
            RouterConfig::default(),
        );
        let conversation = ConversationId::parse("c-1").expect("conversation id");
        router
            .store()
            .create(
                &conversation,
                "schedule",
                MutationKind::Insert,
                &["name".to_string()],
                BTreeMap::new(),
                false,
                100,
            )
            .expect("create");

        let catalog = router.catalog();
        let turn = Turn {
            router: &router,
            catalog: &catalog,
            builder: SqlBuilder::new(&catalog, &router.store, &router.log),
            conversation_id: &conversation,
            now: 101,
        };
        let err = turn
            .builder
            .advance_named(&conversation, "owner_id", "7", 101)
            .expect_err("owner_id is not pending");
        let output = turn.builder_error_output(err).expect("output");

        let TurnOutput::Error(error) = &output else {
            panic!("expected error, got {output:?}");
        };
        assert_eq!(error.kind, UserErrorKind::Fatal);
        assert!(!error.message.contains("owner_id"));
        assert!(router.store().get(&conversation, 102).expect("get").is_none());

        let diagnostics =
            std::fs::read_to_string(diagnostics_log_path(dir.path())).expect("diagnostics");
        assert!(diagnostics.contains("invariant_violation"));
        assert!(diagnostics.contains("owner_id"));
    }
}
