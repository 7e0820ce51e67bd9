use super::oracle::{
    ConversationContext, IntentAnalysis, IntentOracle, OracleError, Operation, Route,
};
use crate::catalog::CatalogError;
use crate::mutation::field_input::extract_inline_pairs;
use regex::Regex;
use std::sync::LazyLock;

static SQL_VERBS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(select|insert|update|create|add|new|edit|modify|change|set|show|list|count|get|find)\b")
        .expect("sql verb pattern is valid")
});

static INSERT_VERBS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(insert|create|add|new)\b").expect("insert verb pattern is valid")
});

static UPDATE_VERBS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(update|edit|modify|change|set)\b").expect("update verb pattern is valid")
});

static UNSUPPORTED_VERBS: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b(delete|remove|drop|truncate|destroy)\b")
        .expect("unsupported verb pattern is valid")
});

const UNSUPPORTED_REPLY: &str =
    "Deleting records is not supported here. I can look records up, create them, or update them.";

const CHAT_REPLY: &str =
    "I can look up records or help you create and update them. Try `show schedules` or `create schedule`.";

/// Keyword oracle: verbs pick the operation, catalog aliases pick the entity,
/// inline `key=value` pairs become extracted values.
#[derive(Debug, Clone, Copy, Default)]
pub struct LexicalOracle;

impl LexicalOracle {
    pub fn new() -> Self {
        Self
    }
}

impl IntentOracle for LexicalOracle {
    fn analyze(
        &self,
        raw_text: &str,
        context: &ConversationContext<'_>,
    ) -> Result<IntentAnalysis, OracleError> {
        let text = raw_text.trim();
        // values may contain aliases, so look for the entity before them
        let head = text.split(['=', ':']).next().unwrap_or(text);
        let entity = match context.catalog.mentioned_entity(head) {
            Ok(found) => found.map(|table| table.name.clone()),
            Err(CatalogError::AmbiguousEntity { .. }) => Some(head.to_string()),
            Err(_) => None,
        };
        if UNSUPPORTED_VERBS.is_match(head) {
            return Ok(IntentAnalysis::chat(UNSUPPORTED_REPLY));
        }
        if entity.is_none() && !SQL_VERBS.is_match(text) {
            return Ok(IntentAnalysis::chat(CHAT_REPLY));
        }

        let operation = if INSERT_VERBS.is_match(head) {
            Operation::Insert
        } else if UPDATE_VERBS.is_match(head) {
            Operation::Update
        } else {
            Operation::Select
        };
        Ok(IntentAnalysis {
            route: Route::Sql,
            operation: Some(operation),
            entity_token: entity,
            extracted_values: extract_inline_pairs(text),
            reply: None,
        })
    }
}
