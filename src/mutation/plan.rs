use super::value::SqlValue;
use crate::catalog::MutationKind;
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StatementKind {
    Select,
    Insert,
    Update,
}

impl From<MutationKind> for StatementKind {
    fn from(kind: MutationKind) -> Self {
        match kind {
            MutationKind::Insert => Self::Insert,
            MutationKind::Update => Self::Update,
        }
    }
}

/// A fully resolved statement. Identifiers come from the catalog and are
/// quoted; every value travels as a bound parameter.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatementPlan {
    kind: StatementKind,
    table: String,
    /// INSERT values or UPDATE `SET` pairs, in manifest order.
    assignments: Vec<(String, SqlValue)>,
    /// `WHERE` equality conditions, in manifest order.
    conditions: Vec<(String, SqlValue)>,
    /// SELECT projection; empty selects every column.
    columns: Vec<String>,
    limit: Option<u32>,
}

impl StatementPlan {
    pub(crate) fn insert(table: &str, assignments: Vec<(String, SqlValue)>) -> Self {
        Self {
            kind: StatementKind::Insert,
            table: table.to_string(),
            assignments,
            conditions: Vec::new(),
            columns: Vec::new(),
            limit: None,
        }
    }

    pub(crate) fn update(
        table: &str,
        assignments: Vec<(String, SqlValue)>,
        conditions: Vec<(String, SqlValue)>,
    ) -> Self {
        Self {
            kind: StatementKind::Update,
            table: table.to_string(),
            assignments,
            conditions,
            columns: Vec::new(),
            limit: None,
        }
    }

    pub(crate) fn select(
        table: &str,
        columns: Vec<String>,
        conditions: Vec<(String, SqlValue)>,
        limit: u32,
    ) -> Self {
        Self {
            kind: StatementKind::Select,
            table: table.to_string(),
            assignments: Vec::new(),
            conditions,
            columns,
            limit: Some(limit),
        }
    }

    pub fn kind(&self) -> StatementKind {
        self.kind
    }

    pub fn table(&self) -> &str {
        &self.table
    }

    pub fn assignments(&self) -> &[(String, SqlValue)] {
        &self.assignments
    }

    pub fn conditions(&self) -> &[(String, SqlValue)] {
        &self.conditions
    }

    pub fn sql(&self) -> String {
        match self.kind {
            StatementKind::Insert => {
                let columns = self
                    .assignments
                    .iter()
                    .map(|(column, _)| quote_identifier(column))
                    .collect::<Vec<_>>()
                    .join(", ");
                let placeholders = vec!["?"; self.assignments.len()].join(", ");
                format!(
                    "INSERT INTO {} ({columns}) VALUES ({placeholders})",
                    quote_identifier(&self.table)
                )
            }
            StatementKind::Update => {
                let set = self
                    .assignments
                    .iter()
                    .map(|(column, _)| format!("{} = ?", quote_identifier(column)))
                    .collect::<Vec<_>>()
                    .join(", ");
                format!(
                    "UPDATE {} SET {set}{}",
                    quote_identifier(&self.table),
                    where_clause(&self.conditions)
                )
            }
            StatementKind::Select => {
                let projection = if self.columns.is_empty() {
                    "*".to_string()
                } else {
                    self.columns
                        .iter()
                        .map(|column| quote_identifier(column))
                        .collect::<Vec<_>>()
                        .join(", ")
                };
                let mut sql = format!(
                    "SELECT {projection} FROM {}{}",
                    quote_identifier(&self.table),
                    where_clause(&self.conditions)
                );
                if let Some(limit) = self.limit {
                    sql.push_str(&format!(" LIMIT {limit}"));
                }
                sql
            }
        }
    }

    /// Bound values in placeholder order.
    pub fn parameters(&self) -> Vec<&SqlValue> {
        self.assignments
            .iter()
            .chain(self.conditions.iter())
            .map(|(_, value)| value)
            .collect()
    }

    /// Human-readable summary used for confirmation prompts.
    pub fn preview(&self) -> String {
        let mut lines = self
            .assignments
            .iter()
            .map(|(column, value)| format!("  {column} = {value}"))
            .collect::<Vec<_>>();
        lines.extend(
            self.conditions
                .iter()
                .map(|(column, value)| format!("  where {column} = {value}")),
        );
        lines.join("\n")
    }
}

fn where_clause(conditions: &[(String, SqlValue)]) -> String {
    if conditions.is_empty() {
        return String::new();
    }
    let joined = conditions
        .iter()
        .map(|(column, _)| format!("{} = ?", quote_identifier(column)))
        .collect::<Vec<_>>()
        .join(" AND ");
    format!(" WHERE {joined}")
}

fn quote_identifier(name: &str) -> String {
    format!("\"{}\"", name.replace('"', "\"\""))
}
