//! Schema manifest: table and column metadata plus alias resolution.
//!
//! The catalog is built once at startup, either from a standalone YAML
//! manifest or from SQLite introspection merged with a YAML overlay, and is
//! read-only afterwards. Replacing it is an explicit operation on the router.

mod aliases;
pub mod error;
pub mod introspect;
pub mod manifest;

use aliases::{AliasIndex, AliasMatch};
pub use error::CatalogError;
pub use introspect::introspect_sqlite;
pub use manifest::{
    ColumnDef, ColumnOption, ColumnSpec, ColumnType, ManifestFile, MutationKind, TableManifest,
    TableSpec,
};
use regex::Regex;
use std::collections::{BTreeMap, HashSet};
use std::path::Path;
use std::sync::LazyLock;

static SAFE_IDENTIFIER: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").expect("identifier pattern is valid")
});

pub fn is_safe_identifier(name: &str) -> bool {
    SAFE_IDENTIFIER.is_match(name)
}

#[derive(Debug, Clone)]
pub struct ManifestCatalog {
    tables: BTreeMap<String, TableManifest>,
    aliases: AliasIndex,
}

impl ManifestCatalog {
    pub fn new(tables: Vec<TableManifest>) -> Result<Self, CatalogError> {
        let mut by_name = BTreeMap::new();
        let mut seen_lower = HashSet::new();
        for table in tables {
            validate_table(&table)?;
            if !seen_lower.insert(table.name.to_ascii_lowercase()) {
                return Err(CatalogError::InvalidManifest(format!(
                    "table `{}` is declared more than once",
                    table.name
                )));
            }
            by_name.insert(table.name.clone(), table);
        }
        let aliases = AliasIndex::build(by_name.values());
        Ok(Self {
            tables: by_name,
            aliases,
        })
    }

    pub fn from_manifest_file(file: ManifestFile) -> Result<Self, CatalogError> {
        Self::new(file.into_tables()?)
    }

    pub fn from_path(path: &Path) -> Result<Self, CatalogError> {
        Self::from_manifest_file(ManifestFile::from_path(path)?)
    }

    pub fn table_names(&self) -> impl Iterator<Item = &str> {
        self.tables.keys().map(String::as_str)
    }

    pub fn table(&self, name: &str) -> Result<&TableManifest, CatalogError> {
        if let Some(table) = self.tables.get(name) {
            return Ok(table);
        }
        self.tables
            .values()
            .find(|table| table.name.eq_ignore_ascii_case(name.trim()))
            .ok_or_else(|| CatalogError::UnknownTable {
                table: name.to_string(),
            })
    }

    /// Exact alias match only: the whole token must be one of a table's aliases.
    pub fn exact_entity(&self, token: &str) -> Result<Option<&TableManifest>, CatalogError> {
        match self.aliases.exact(token) {
            AliasMatch::None => Ok(None),
            AliasMatch::Unique(name) => self.table(name).map(Some),
            AliasMatch::Ambiguous(candidates) => Err(CatalogError::AmbiguousEntity {
                token: token.trim().to_string(),
                candidates,
            }),
        }
    }

    /// Any alias mentioned as whole words inside free text, longest alias first.
    pub fn mentioned_entity(&self, text: &str) -> Result<Option<&TableManifest>, CatalogError> {
        match self.aliases.mentioned_in(text) {
            AliasMatch::None => Ok(None),
            AliasMatch::Unique(name) => self.table(name).map(Some),
            AliasMatch::Ambiguous(candidates) => Err(CatalogError::AmbiguousEntity {
                token: text.trim().to_string(),
                candidates,
            }),
        }
    }

    /// Resolves a user-supplied entity token to its canonical table.
    pub fn resolve_entity(&self, token: &str) -> Result<&TableManifest, CatalogError> {
        if let Some(table) = self.exact_entity(token)? {
            return Ok(table);
        }
        self.mentioned_entity(token)?
            .ok_or_else(|| CatalogError::UnknownEntity {
                token: token.trim().to_string(),
            })
    }

    pub fn required_columns(
        &self,
        table: &str,
        kind: MutationKind,
    ) -> Result<Vec<&ColumnDef>, CatalogError> {
        Ok(self.table(table)?.required_columns(kind))
    }

    pub fn column_def(&self, table: &str, column: &str) -> Result<&ColumnDef, CatalogError> {
        let manifest = self.table(table)?;
        manifest
            .column(column)
            .ok_or_else(|| CatalogError::UnknownColumn {
                table: manifest.name.clone(),
                column: column.to_string(),
            })
    }
}

fn validate_table(table: &TableManifest) -> Result<(), CatalogError> {
    if !is_safe_identifier(&table.name) {
        return Err(CatalogError::InvalidManifest(format!(
            "table name `{}` is not a plain SQL identifier",
            table.name
        )));
    }
    if table.columns.is_empty() {
        return Err(CatalogError::InvalidManifest(format!(
            "table `{}` declares no columns",
            table.name
        )));
    }
    let mut seen = HashSet::new();
    for column in &table.columns {
        if !is_safe_identifier(&column.name) {
            return Err(CatalogError::InvalidManifest(format!(
                "column name `{}.{}` is not a plain SQL identifier",
                table.name, column.name
            )));
        }
        if !seen.insert(column.name.to_ascii_lowercase()) {
            return Err(CatalogError::InvalidManifest(format!(
                "column `{}.{}` is declared more than once",
                table.name, column.name
            )));
        }
        if column.max_length == Some(0) {
            return Err(CatalogError::InvalidManifest(format!(
                "column `{}.{}` max_length must be >= 1",
                table.name, column.name
            )));
        }
    }
    Ok(())
}
