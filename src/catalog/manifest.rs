use super::error::CatalogError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fs;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ColumnType {
    Text,
    Integer,
    Decimal,
    Boolean,
    Date,
    DateTime,
}

impl ColumnType {
    /// Maps a declared SQL type to a column type using SQLite affinity rules,
    /// with date/boolean names recognized before the numeric fallbacks.
    pub fn from_declared(declared: &str) -> Self {
        let upper = declared.trim().to_ascii_uppercase();
        if upper.contains("DATETIME") || upper.contains("TIMESTAMP") {
            Self::DateTime
        } else if upper.contains("DATE") {
            Self::Date
        } else if upper.contains("BOOL") {
            Self::Boolean
        } else if upper.contains("INT") {
            Self::Integer
        } else if upper.contains("CHAR") || upper.contains("CLOB") || upper.contains("TEXT") {
            Self::Text
        } else if upper.contains("REAL")
            || upper.contains("FLOA")
            || upper.contains("DOUB")
            || upper.contains("DEC")
            || upper.contains("NUM")
        {
            Self::Decimal
        } else {
            Self::Text
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "integer",
            Self::Decimal => "decimal",
            Self::Boolean => "boolean",
            Self::Date => "date",
            Self::DateTime => "date_time",
        }
    }

    pub fn type_hint(self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Integer => "whole number",
            Self::Decimal => "number",
            Self::Boolean => "yes or no",
            Self::Date => "date (YYYY-MM-DD)",
            Self::DateTime => "date and time (YYYY-MM-DDTHH:MM)",
        }
    }
}

impl std::fmt::Display for ColumnType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MutationKind {
    Insert,
    Update,
}

impl MutationKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Insert => "insert",
            Self::Update => "update",
        }
    }

    pub fn verb(self) -> &'static str {
        match self {
            Self::Insert => "creating",
            Self::Update => "updating",
        }
    }
}

impl std::fmt::Display for MutationKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnOption {
    pub label: String,
    pub value: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ColumnDef {
    pub name: String,
    pub column_type: ColumnType,
    pub nullable: bool,
    pub has_default: bool,
    /// Identity columns locate the row for UPDATE and are required there.
    pub identity: bool,
    pub max_length: Option<usize>,
    pub description: Option<String>,
    pub options: Vec<ColumnOption>,
}

impl ColumnDef {
    pub fn new(name: impl Into<String>, column_type: ColumnType) -> Self {
        Self {
            name: name.into(),
            column_type,
            nullable: false,
            has_default: false,
            identity: false,
            max_length: None,
            description: None,
            options: Vec::new(),
        }
    }

    pub fn required_for(&self, kind: MutationKind) -> bool {
        match kind {
            MutationKind::Insert => !self.nullable && !self.has_default,
            MutationKind::Update => self.identity,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TableManifest {
    pub name: String,
    pub description: Option<String>,
    pub aliases: Vec<String>,
    pub columns: Vec<ColumnDef>,
}

impl TableManifest {
    pub fn column(&self, name: &str) -> Option<&ColumnDef> {
        self.columns
            .iter()
            .find(|column| column.name.eq_ignore_ascii_case(name.trim()))
    }

    pub fn required_columns(&self, kind: MutationKind) -> Vec<&ColumnDef> {
        self.columns
            .iter()
            .filter(|column| column.required_for(kind))
            .collect()
    }

    pub fn identity_columns(&self) -> Vec<&ColumnDef> {
        self.columns.iter().filter(|column| column.identity).collect()
    }
}

/// On-disk manifest. As a standalone catalog every column needs a `type`; as an
/// introspection overlay the database supplies the column shape and the
/// overlay adds aliases, descriptions, options and identity flags.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ManifestFile {
    #[serde(default)]
    pub tables: BTreeMap<String, TableSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct TableSpec {
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub aliases: Vec<String>,
    #[serde(default)]
    pub columns: Vec<ColumnSpec>,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ColumnSpec {
    pub name: String,
    #[serde(default, rename = "type")]
    pub column_type: Option<ColumnType>,
    #[serde(default)]
    pub nullable: Option<bool>,
    #[serde(default)]
    pub has_default: Option<bool>,
    #[serde(default)]
    pub identity: Option<bool>,
    #[serde(default)]
    pub max_length: Option<usize>,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub options: Vec<ColumnOption>,
}

impl ColumnSpec {
    pub fn into_column_def(self, table: &str) -> Result<ColumnDef, CatalogError> {
        let column_type = self.column_type.ok_or_else(|| {
            CatalogError::InvalidManifest(format!(
                "column `{table}.{}` must declare a `type`",
                self.name
            ))
        })?;
        let mut column = ColumnDef::new(self.name, column_type);
        column.nullable = self.nullable.unwrap_or(false);
        column.has_default = self.has_default.unwrap_or(false);
        column.identity = self.identity.unwrap_or(false);
        column.max_length = self.max_length;
        column.description = self.description;
        column.options = self.options;
        Ok(column)
    }

    pub fn apply_to(&self, column: &mut ColumnDef) {
        if let Some(column_type) = self.column_type {
            column.column_type = column_type;
        }
        if let Some(nullable) = self.nullable {
            column.nullable = nullable;
        }
        if let Some(has_default) = self.has_default {
            column.has_default = has_default;
        }
        if let Some(identity) = self.identity {
            column.identity = identity;
        }
        if self.max_length.is_some() {
            column.max_length = self.max_length;
        }
        if self.description.is_some() {
            column.description = self.description.clone();
        }
        if !self.options.is_empty() {
            column.options = self.options.clone();
        }
    }
}

impl ManifestFile {
    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        let raw = fs::read_to_string(path).map_err(|source| CatalogError::Read {
            path: path.display().to_string(),
            source,
        })?;
        serde_yaml::from_str(&raw).map_err(|source| CatalogError::Parse {
            path: path.display().to_string(),
            source,
        })
    }

    pub fn into_tables(self) -> Result<Vec<TableManifest>, CatalogError> {
        let mut tables = Vec::with_capacity(self.tables.len());
        for (name, spec) in self.tables {
            let mut columns = Vec::with_capacity(spec.columns.len());
            for column in spec.columns {
                columns.push(column.into_column_def(&name)?);
            }
            tables.push(TableManifest {
                name,
                description: spec.description,
                aliases: spec.aliases,
                columns,
            });
        }
        Ok(tables)
    }
}
