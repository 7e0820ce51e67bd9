use super::session::Session;
use crate::catalog::{ColumnDef, ColumnOption, ColumnType, MutationKind};
use serde::Serialize;

/// Request for exactly one field value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FormPrompt {
    pub session_id: String,
    pub table: String,
    pub kind: MutationKind,
    pub field: String,
    pub type_hint: String,
    pub description: Option<String>,
    pub options: Vec<ColumnOption>,
    pub attempt: u32,
    pub reason: Option<String>,
    /// What happened to an interrupted session, if anything.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl FormPrompt {
    pub(crate) fn for_field(session: &Session, column: &ColumnDef) -> Self {
        Self {
            session_id: session.conversation_id.to_string(),
            table: session.table.clone(),
            kind: session.kind,
            field: column.name.clone(),
            type_hint: column.column_type.type_hint().to_string(),
            description: column.description.clone(),
            options: column.options.clone(),
            attempt: session.attempt(&column.name),
            reason: session.reasons.get(&column.name).cloned(),
            notice: None,
        }
    }

    /// Prompt for a column the database requires but the manifest does not know.
    pub(crate) fn for_unknown_field(session: &Session, column: &str) -> Self {
        Self {
            session_id: session.conversation_id.to_string(),
            table: session.table.clone(),
            kind: session.kind,
            field: column.to_string(),
            type_hint: ColumnType::Text.type_hint().to_string(),
            description: None,
            options: Vec::new(),
            attempt: session.attempt(column),
            reason: session.reasons.get(column).cloned(),
            notice: None,
        }
    }

    pub fn render(&self) -> String {
        let mut out = String::new();
        if let Some(notice) = &self.notice {
            out.push_str(notice);
            out.push('\n');
        }
        if let Some(reason) = &self.reason {
            out.push_str(&format!("Sorry, {reason}.\n"));
        }
        out.push_str(&format!(
            "For {} the {} record, what is `{}`? ({})",
            self.kind.verb(),
            self.table,
            self.field,
            self.type_hint
        ));
        if let Some(description) = &self.description {
            out.push_str(&format!("\n{description}"));
        }
        if !self.options.is_empty() {
            let choices = self
                .options
                .iter()
                .map(|option| format!("{} ({})", option.label, option.value))
                .collect::<Vec<_>>()
                .join(", ");
            out.push_str(&format!("\nChoose one of: {choices}"));
        }
        if self.attempt > 1 {
            out.push_str(&format!("\n(attempt {})", self.attempt));
        }
        out
    }
}

/// Shown when execution waits for an explicit yes/no.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ConfirmationPrompt {
    pub session_id: String,
    pub table: String,
    pub kind: MutationKind,
    pub preview: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub notice: Option<String>,
}

impl ConfirmationPrompt {
    pub fn render(&self) -> String {
        let body = format!(
            "Ready to {} `{}`:\n{}\nProceed? (yes/no)",
            self.kind, self.table, self.preview
        );
        match &self.notice {
            Some(notice) => format!("{notice}\n{body}"),
            None => body,
        }
    }
}
