use super::error::CatalogError;
use super::manifest::{ColumnDef, ColumnType, ManifestFile, TableManifest};
use super::ManifestCatalog;
use rusqlite::{params, Connection};
use std::collections::BTreeMap;

#[derive(Debug, Clone, PartialEq, Eq)]
struct IntrospectedColumn {
    name: String,
    declared_type: String,
    not_null: bool,
    default_value: Option<String>,
    primary_key_position: i64,
}

/// Builds a catalog from the live SQLite schema, then layers the overlay's
/// aliases, descriptions and column tweaks on top.
pub fn introspect_sqlite(
    connection: &Connection,
    overlay: &ManifestFile,
) -> Result<ManifestCatalog, CatalogError> {
    let mut tables = BTreeMap::<String, TableManifest>::new();
    for table_name in user_tables(connection)? {
        let columns = table_columns(connection, &table_name)?;
        let single_integer_pk = columns
            .iter()
            .filter(|column| column.primary_key_position > 0)
            .count()
            == 1;
        let columns = columns
            .into_iter()
            .map(|column| column_from_introspection(column, single_integer_pk))
            .collect();
        tables.insert(
            table_name.clone(),
            TableManifest {
                name: table_name,
                description: None,
                aliases: Vec::new(),
                columns,
            },
        );
    }

    for (table_name, spec) in &overlay.tables {
        let table = tables.get_mut(table_name).ok_or_else(|| {
            CatalogError::InvalidManifest(format!(
                "overlay table `{table_name}` does not exist in the database"
            ))
        })?;
        if spec.description.is_some() {
            table.description = spec.description.clone();
        }
        table.aliases.extend(spec.aliases.iter().cloned());
        for column_spec in &spec.columns {
            let column = table
                .columns
                .iter_mut()
                .find(|column| column.name.eq_ignore_ascii_case(&column_spec.name))
                .ok_or_else(|| {
                    CatalogError::InvalidManifest(format!(
                        "overlay column `{table_name}.{}` does not exist in the database",
                        column_spec.name
                    ))
                })?;
            column_spec.apply_to(column);
        }
    }

    ManifestCatalog::new(tables.into_values().collect())
}

fn user_tables(connection: &Connection) -> Result<Vec<String>, CatalogError> {
    let mut statement = connection
        .prepare(
            "
            SELECT name FROM sqlite_master
            WHERE type = 'table' AND name NOT LIKE 'sqlite_%'
            ORDER BY name ASC
            ",
        )
        .map_err(|source| CatalogError::Introspection { source })?;
    let rows = statement
        .query_map([], |row| row.get::<_, String>(0))
        .map_err(|source| CatalogError::Introspection { source })?;

    let mut names = Vec::new();
    for row in rows {
        names.push(row.map_err(|source| CatalogError::Introspection { source })?);
    }
    Ok(names)
}

fn table_columns(
    connection: &Connection,
    table: &str,
) -> Result<Vec<IntrospectedColumn>, CatalogError> {
    let mut statement = connection
        .prepare(
            "
            SELECT name, type, \"notnull\", dflt_value, pk
            FROM pragma_table_info(?1)
            ORDER BY cid ASC
            ",
        )
        .map_err(|source| CatalogError::Introspection { source })?;
    let rows = statement
        .query_map(params![table], |row| {
            Ok(IntrospectedColumn {
                name: row.get(0)?,
                declared_type: row.get(1)?,
                not_null: row.get::<_, i64>(2)? != 0,
                default_value: row.get(3)?,
                primary_key_position: row.get(4)?,
            })
        })
        .map_err(|source| CatalogError::Introspection { source })?;

    let mut columns = Vec::new();
    for row in rows {
        columns.push(row.map_err(|source| CatalogError::Introspection { source })?);
    }
    Ok(columns)
}

fn column_from_introspection(column: IntrospectedColumn, single_pk: bool) -> ColumnDef {
    let is_pk = column.primary_key_position > 0;
    // A lone INTEGER PRIMARY KEY aliases the rowid and is assigned automatically.
    let rowid_alias =
        is_pk && single_pk && column.declared_type.trim().eq_ignore_ascii_case("INTEGER");

    let mut def = ColumnDef::new(column.name, ColumnType::from_declared(&column.declared_type));
    def.nullable = !column.not_null && !is_pk;
    def.has_default = column.default_value.is_some() || rowid_alias;
    def.identity = is_pk;
    def.max_length = declared_length(&column.declared_type);
    def
}

fn declared_length(declared: &str) -> Option<usize> {
    let upper = declared.to_ascii_uppercase();
    if !upper.contains("CHAR") {
        return None;
    }
    let open = declared.find('(')?;
    let close = declared[open..].find(')')? + open;
    declared[open + 1..close]
        .split(',')
        .next()?
        .trim()
        .parse::<usize>()
        .ok()
        .filter(|len| *len > 0)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn declared_length_reads_varchar_bounds() {
        assert_eq!(declared_length("VARCHAR(120)"), Some(120));
        assert_eq!(declared_length("nvarchar( 8 )"), Some(8));
        assert_eq!(declared_length("TEXT"), None);
        assert_eq!(declared_length("DECIMAL(10,2)"), None);
    }
}
