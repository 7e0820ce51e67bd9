use super::field_input::parse_assignments;
use super::session::Session;
use crate::catalog::{CatalogError, ColumnType, ManifestCatalog};

const OPERATION_VERBS: &[&str] = &[
    "show", "list", "find", "get", "count", "display", "create", "add", "insert", "new",
    "update", "edit", "change", "modify", "delete", "remove",
];

/// Why a turn was read as a new command rather than a field value.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandSignal {
    /// The whole turn names another table.
    DifferentEntity { table: String },
    /// An operation verb followed by an entity mention.
    OperationVerb { verb: String },
    /// Too many words for the pending field's type.
    ShapeExceeded { words: usize, limit: usize },
}

impl std::fmt::Display for CommandSignal {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::DifferentEntity { table } => write!(f, "different_entity:{table}"),
            Self::OperationVerb { verb } => write!(f, "operation_verb:{verb}"),
            Self::ShapeExceeded { words, limit } => write!(f, "shape_exceeded:{words}>{limit}"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GuardDecision {
    Value,
    NewCommand(CommandSignal),
}

/// Decides whether `raw` answers the session's pending field. Pure: the
/// session is never touched here.
pub fn classify_turn(catalog: &ManifestCatalog, session: &Session, raw: &str) -> GuardDecision {
    let text = raw.trim();
    if text.is_empty() {
        return GuardDecision::Value;
    }
    if let Ok(table) = catalog.table(&session.table) {
        if !parse_assignments(table, text).is_empty() {
            return GuardDecision::Value;
        }
    }

    match catalog.exact_entity(text) {
        Ok(Some(table)) if table.name != session.table => {
            return GuardDecision::NewCommand(CommandSignal::DifferentEntity {
                table: table.name.clone(),
            });
        }
        Err(CatalogError::AmbiguousEntity { candidates, .. })
            if !candidates.contains(&session.table) =>
        {
            return GuardDecision::NewCommand(CommandSignal::DifferentEntity {
                table: candidates.join("|"),
            });
        }
        _ => {}
    }

    let words = text.split_whitespace().collect::<Vec<_>>();
    if let Some(verb) = verb_before_entity(catalog, &words) {
        return GuardDecision::NewCommand(CommandSignal::OperationVerb { verb });
    }

    if let Some(limit) = pending_word_limit(catalog, session) {
        if words.len() > limit {
            return GuardDecision::NewCommand(CommandSignal::ShapeExceeded {
                words: words.len(),
                limit,
            });
        }
    }
    GuardDecision::Value
}

/// First operation verb, at any position, whose trailing words mention a
/// table. "can you show all customers" qualifies; "show and tell" does not.
fn verb_before_entity(catalog: &ManifestCatalog, words: &[&str]) -> Option<String> {
    words.iter().enumerate().find_map(|(index, word)| {
        let word = word.to_ascii_lowercase();
        let word = word.trim_matches(|ch: char| !ch.is_ascii_alphabetic());
        if !OPERATION_VERBS.contains(&word) {
            return None;
        }
        let rest = words[index + 1..].join(" ");
        let mentions_entity = match catalog.mentioned_entity(&rest) {
            Ok(found) => found.is_some(),
            Err(CatalogError::AmbiguousEntity { .. }) => true,
            Err(_) => false,
        };
        mentions_entity.then(|| word.to_string())
    })
}

/// Longest plausible answer, in words, for the pending field. Text is
/// unbounded; option lists allow their longest label.
fn pending_word_limit(catalog: &ManifestCatalog, session: &Session) -> Option<usize> {
    let field = session.next_field()?;
    let column = catalog.column_def(&session.table, field).ok()?;
    let option_words = column
        .options
        .iter()
        .map(|option| option.label.split_whitespace().count() + 1)
        .max();
    let type_limit = match column.column_type {
        ColumnType::Text => None,
        ColumnType::Integer | ColumnType::Decimal | ColumnType::Boolean => Some(2),
        ColumnType::Date | ColumnType::DateTime => Some(3),
    };
    match (option_words, type_limit) {
        (Some(words), Some(limit)) => Some(words.max(limit)),
        (words, limit) => words.or(limit),
    }
}
