use super::error::SessionError;
use super::prompt::FormPrompt;
use super::session::SessionStatus;
use super::store::{CorrectionOutcome, SessionStore};
use crate::catalog::{is_safe_identifier, ManifestCatalog, TableManifest};
use crate::executor::ExecutorFailure;
use crate::shared::{ConversationId, EngineLog};
use regex::Regex;
use serde_json::Value;
use std::sync::LazyLock;

const MISSING_CODES: &[&str] = &["SQLITE_CONSTRAINT_NOTNULL", "1364", "1048", "23502"];
const INVALID_CODES: &[&str] = &[
    "SQLITE_CONSTRAINT_CHECK",
    "SQLITE_CONSTRAINT_DATATYPE",
    "SQLITE_MISMATCH",
    "1366",
    "1292",
    "1265",
    "1406",
    "22P02",
    "22007",
    "22008",
    "22001",
    "22003",
    "23514",
];
const CONSTRAINT_CODES: &[&str] = &[
    "SQLITE_CONSTRAINT_UNIQUE",
    "SQLITE_CONSTRAINT_PRIMARYKEY",
    "SQLITE_CONSTRAINT_FOREIGNKEY",
    "1062",
    "1451",
    "1452",
    "23505",
    "23503",
    "23000",
];

static MISSING_COLUMN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"Field '([^']+)' doesn't have a default value",
        r"Column '([^']+)' cannot be null",
        r"NOT NULL constraint failed: (?:[A-Za-z0-9_]+\.)?([A-Za-z0-9_]+)",
        r#"null value in column "([^"]+)""#,
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("missing-column pattern is valid"))
    .collect()
});

static INVALID_COLUMN_PATTERNS: LazyLock<Vec<Regex>> = LazyLock::new(|| {
    [
        r"for column '([^']+)'",
        r#"for column "([^"]+)""#,
    ]
    .iter()
    .map(|pattern| Regex::new(pattern).expect("invalid-column pattern is valid"))
    .collect()
});

static CONSTRAINT_DETAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(UNIQUE constraint failed|FOREIGN KEY constraint failed|Duplicate entry|duplicate key value|violates foreign key constraint|a foreign key constraint fails)")
        .expect("constraint pattern is valid")
});

static INVALID_DETAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(CHECK constraint failed|datatype mismatch|Incorrect [a-z ]+ value|invalid input syntax|out of range|Data too long|Data truncated|violates check constraint)")
        .expect("invalid pattern is valid")
});

static MISSING_DETAIL: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)(NOT NULL constraint failed|doesn't have a default value|cannot be null|null value in column)")
        .expect("missing pattern is valid")
});

/// Closed taxonomy of database failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FailureClass {
    InvalidValue { column: String },
    MissingRequired { column: String },
    ConstraintViolation { detail: String },
    Fatal { detail: String },
}

impl FailureClass {
    pub fn label(&self) -> &'static str {
        match self {
            Self::InvalidValue { .. } => "invalid_value",
            Self::MissingRequired { .. } => "missing_required",
            Self::ConstraintViolation { .. } => "constraint_violation",
            Self::Fatal { .. } => "fatal",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Category {
    Missing,
    Invalid,
    Constraint,
}

pub fn classify_failure(
    catalog: &ManifestCatalog,
    table: &str,
    failure: &ExecutorFailure,
) -> FailureClass {
    let detail = failure.detail.clone();
    let Some(category) = category_of(failure) else {
        return FailureClass::Fatal { detail };
    };
    let manifest = catalog.table(table).ok();

    match category {
        Category::Constraint => FailureClass::ConstraintViolation { detail },
        Category::Missing => {
            let column = failure
                .column
                .clone()
                .or_else(|| first_capture(&MISSING_COLUMN_PATTERNS, &failure.detail));
            match column.and_then(|column| canonical_column(manifest, &column, true)) {
                Some(column) => FailureClass::MissingRequired { column },
                None => FailureClass::Fatal { detail },
            }
        }
        Category::Invalid => {
            let column = failure
                .column
                .clone()
                .or_else(|| first_capture(&INVALID_COLUMN_PATTERNS, &failure.detail))
                .or_else(|| {
                    manifest.and_then(|manifest| sole_mentioned_column(manifest, &failure.detail))
                });
            match column.and_then(|column| canonical_column(manifest, &column, false)) {
                Some(column) => FailureClass::InvalidValue { column },
                None => FailureClass::Fatal { detail },
            }
        }
    }
}

fn category_of(failure: &ExecutorFailure) -> Option<Category> {
    if let Some(code) = failure.code.as_deref() {
        let code = code.trim();
        if MISSING_CODES.contains(&code) {
            return Some(Category::Missing);
        }
        if INVALID_CODES.contains(&code) {
            return Some(Category::Invalid);
        }
        if CONSTRAINT_CODES.contains(&code) {
            return Some(Category::Constraint);
        }
    }
    if MISSING_DETAIL.is_match(&failure.detail) {
        Some(Category::Missing)
    } else if CONSTRAINT_DETAIL.is_match(&failure.detail) {
        Some(Category::Constraint)
    } else if INVALID_DETAIL.is_match(&failure.detail) {
        Some(Category::Invalid)
    } else {
        None
    }
}

fn first_capture(patterns: &[Regex], detail: &str) -> Option<String> {
    patterns
        .iter()
        .find_map(|pattern| pattern.captures(detail)?.get(1))
        .map(|found| found.as_str().to_string())
}

/// A CHECK failure names an expression, not a column. Attribute it only when
/// exactly one manifest column appears in the message.
fn sole_mentioned_column(manifest: &TableManifest, detail: &str) -> Option<String> {
    let mut mentioned = manifest.columns.iter().filter(|column| {
        Regex::new(&format!(r"(?i)\b{}\b", regex::escape(&column.name)))
            .map(|pattern| pattern.is_match(detail))
            .unwrap_or(false)
    });
    let first = mentioned.next()?;
    if mentioned.next().is_some() {
        return None;
    }
    Some(first.name.clone())
}

/// Maps a reported column to its manifest name. A missing column the manifest
/// does not know is accepted as schema drift when it is a plain identifier.
fn canonical_column(
    manifest: Option<&TableManifest>,
    column: &str,
    allow_drift: bool,
) -> Option<String> {
    if let Some(def) = manifest.and_then(|manifest| manifest.column(column)) {
        return Some(def.name.clone());
    }
    (allow_drift && is_safe_identifier(column)).then(|| column.to_string())
}

/// What the router tells the user after a failed execution.
#[derive(Debug, Clone, PartialEq)]
pub enum RecoveryStep {
    Reprompt(FormPrompt),
    Closed { class: FailureClass, message: String },
}

/// Applies a classified failure to the executing session: recoverable kinds
/// re-queue the field, terminal kinds close the session as failed. Detail
/// text goes to diagnostics only.
pub fn recover(
    catalog: &ManifestCatalog,
    store: &SessionStore,
    log: &EngineLog,
    conversation_id: &ConversationId,
    class: FailureClass,
    now: i64,
) -> Result<RecoveryStep, SessionError> {
    let (column, reason) = match &class {
        FailureClass::InvalidValue { column } => (
            column.clone(),
            format!("the database rejected the previous `{column}` value"),
        ),
        FailureClass::MissingRequired { column } => (
            column.clone(),
            format!("the database requires `{column}` for this record"),
        ),
        FailureClass::ConstraintViolation { detail } | FailureClass::Fatal { detail } => {
            log.diagnostic(
                now,
                "execution_failed",
                &[
                    ("conversation", Value::from(conversation_id.as_str())),
                    ("class", Value::from(class.label())),
                    ("detail", Value::from(detail.as_str())),
                ],
            );
            store.close(conversation_id, SessionStatus::Failed, now)?;
            let message = match class {
                FailureClass::ConstraintViolation { .. } => {
                    "The record could not be saved because it conflicts with existing data."
                }
                _ => "The request could not be completed.",
            };
            return Ok(RecoveryStep::Closed {
                class,
                message: message.to_string(),
            });
        }
    };

    match store.mark_awaiting_correction(conversation_id, &column, &reason, now)? {
        CorrectionOutcome::Reprompt(session) => {
            let prompt = match catalog.column_def(&session.table, &column) {
                Ok(def) => FormPrompt::for_field(&session, def),
                Err(_) => FormPrompt::for_unknown_field(&session, &column),
            };
            Ok(RecoveryStep::Reprompt(prompt))
        }
        CorrectionOutcome::Exhausted(session) => {
            log.diagnostic(
                now,
                "retry_budget_exhausted",
                &[
                    ("conversation", Value::from(conversation_id.as_str())),
                    ("table", Value::from(session.table.as_str())),
                    ("column", Value::from(column.as_str())),
                ],
            );
            Ok(RecoveryStep::Closed {
                class: FailureClass::Fatal {
                    detail: format!("retry budget exhausted for {column}"),
                },
                message: format!(
                    "`{column}` was rejected too many times, so the request was cancelled."
                ),
            })
        }
    }
}
