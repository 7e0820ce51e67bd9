use crate::mutation::{ConfirmationPrompt, FormPrompt};
use serde::Serialize;
use serde_json::{Map, Value};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TurnInput {
    pub conversation_id: String,
    pub raw_text: String,
}

impl TurnInput {
    pub fn new(conversation_id: impl Into<String>, raw_text: impl Into<String>) -> Self {
        Self {
            conversation_id: conversation_id.into(),
            raw_text: raw_text.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FinalAnswer {
    pub rows: Vec<Map<String, Value>>,
    pub rows_affected: usize,
    pub summary: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl FinalAnswer {
    pub fn summary(summary: impl Into<String>) -> Self {
        Self {
            rows: Vec::new(),
            rows_affected: 0,
            summary: summary.into(),
            notice: None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum UserErrorKind {
    AmbiguousEntity,
    UnknownEntity,
    SessionConflict,
    InvalidRequest,
    ConstraintViolation,
    Fatal,
}

/// User-facing failure. Never carries database detail.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UserError {
    pub kind: UserErrorKind,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl UserError {
    pub fn new(kind: UserErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            notice: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum TurnOutput {
    Answer(FinalAnswer),
    Prompt(FormPrompt),
    Confirm(ConfirmationPrompt),
    Error(UserError),
}

impl TurnOutput {
    pub fn error(kind: UserErrorKind, message: impl Into<String>) -> Self {
        Self::Error(UserError::new(kind, message))
    }

    /// Attaches a note about an interrupted session to whatever the turn
    /// produced, so the user sees it even when no history is kept.
    pub fn with_notice(mut self, notice: impl Into<String>) -> Self {
        let slot = match &mut self {
            Self::Answer(answer) => &mut answer.notice,
            Self::Prompt(prompt) => &mut prompt.notice,
            Self::Confirm(confirm) => &mut confirm.notice,
            Self::Error(error) => &mut error.notice,
        };
        *slot = Some(notice.into());
        self
    }

    pub fn notice(&self) -> Option<&str> {
        match self {
            Self::Answer(answer) => answer.notice.as_deref(),
            Self::Prompt(prompt) => prompt.notice.as_deref(),
            Self::Confirm(confirm) => confirm.notice.as_deref(),
            Self::Error(error) => error.notice.as_deref(),
        }
    }

    pub fn as_prompt(&self) -> Option<&FormPrompt> {
        match self {
            Self::Prompt(prompt) => Some(prompt),
            _ => None,
        }
    }

    pub fn render(&self) -> String {
        match self {
            Self::Answer(answer) => {
                let mut out = match &answer.notice {
                    Some(notice) => format!("{notice}\n{}", answer.summary),
                    None => answer.summary.clone(),
                };
                for row in &answer.rows {
                    let line = serde_json::to_string(row).unwrap_or_default();
                    out.push('\n');
                    out.push_str(&line);
                }
                out
            }
            Self::Prompt(prompt) => prompt.render(),
            Self::Confirm(confirm) => confirm.render(),
            Self::Error(error) => match &error.notice {
                Some(notice) => format!("{notice}\n{}", error.message),
                None => error.message.clone(),
            },
        }
    }
}
