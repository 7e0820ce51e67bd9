use rusqlite::Connection;
use sqlform::catalog::{
    introspect_sqlite, CatalogError, ColumnType, ManifestCatalog, ManifestFile, MutationKind,
};
use std::fs;
use tempfile::tempdir;

const MANIFEST: &str = r#"
tables:
  schedule:
    description: Scheduled work items
    aliases: [schedules, calendar entry]
    columns:
      - { name: id, type: integer, identity: true, has_default: true }
      - { name: name, type: text, max_length: 80 }
      - { name: start_time, type: date_time }
      - { name: owner_id, type: integer }
      - { name: notes, type: text, nullable: true }
  schedule_task:
    aliases: [schedule tasks]
    columns:
      - { name: id, type: integer, identity: true, has_default: true }
      - { name: schedule_id, type: integer }
  customer:
    aliases: [customers, client]
    columns:
      - { name: id, type: integer, identity: true, has_default: true }
      - { name: name, type: text }
  vendor:
    aliases: [vendors, client]
    columns:
      - { name: id, type: integer, identity: true, has_default: true }
      - { name: name, type: text }
"#;

fn catalog() -> ManifestCatalog {
    let file: ManifestFile = serde_yaml::from_str(MANIFEST).expect("parse manifest");
    ManifestCatalog::from_manifest_file(file).expect("build catalog")
}

#[test]
fn catalog_module_resolves_exact_aliases_case_insensitively() {
    let catalog = catalog();
    assert_eq!(catalog.resolve_entity("Schedules").expect("alias").name, "schedule");
    assert_eq!(catalog.resolve_entity("  CUSTOMER ").expect("name").name, "customer");
    assert_eq!(
        catalog.resolve_entity("calendar entry").expect("phrase").name,
        "schedule"
    );
}

#[test]
fn catalog_module_prefers_longer_alias_mentions() {
    let catalog = catalog();
    let table = catalog
        .resolve_entity("show me the schedule tasks for today")
        .expect("mention");
    assert_eq!(table.name, "schedule_task");
    let table = catalog
        .resolve_entity("show me schedules")
        .expect("mention");
    assert_eq!(table.name, "schedule");
}

#[test]
fn catalog_module_reports_alias_ties_as_ambiguous() {
    let catalog = catalog();
    match catalog.resolve_entity("client") {
        Err(CatalogError::AmbiguousEntity { candidates, .. }) => {
            assert_eq!(candidates, vec!["customer".to_string(), "vendor".to_string()]);
        }
        other => panic!("expected ambiguity, got {other:?}"),
    }
    assert!(matches!(
        catalog.resolve_entity("invoice"),
        Err(CatalogError::UnknownEntity { .. })
    ));
}

#[test]
fn catalog_module_required_columns_follow_manifest_order() {
    let catalog = catalog();
    let insert = catalog
        .required_columns("schedule", MutationKind::Insert)
        .expect("insert columns")
        .into_iter()
        .map(|column| column.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(insert, vec!["name", "start_time", "owner_id"]);

    let update = catalog
        .required_columns("schedule", MutationKind::Update)
        .expect("update columns")
        .into_iter()
        .map(|column| column.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(update, vec!["id"]);

    let column = catalog.column_def("schedule", "START_TIME").expect("column");
    assert_eq!(column.column_type, ColumnType::DateTime);
    assert!(matches!(
        catalog.column_def("schedule", "missing"),
        Err(CatalogError::UnknownColumn { .. })
    ));
}

#[test]
fn catalog_module_rejects_unsafe_identifiers_and_missing_types() {
    let bad_name: ManifestFile = serde_yaml::from_str(
        r#"
tables:
  "bad-table":
    columns:
      - { name: id, type: integer }
"#,
    )
    .expect("parse");
    assert!(matches!(
        ManifestCatalog::from_manifest_file(bad_name),
        Err(CatalogError::InvalidManifest(_))
    ));

    let untyped: ManifestFile = serde_yaml::from_str(
        r#"
tables:
  note:
    columns:
      - { name: body }
"#,
    )
    .expect("parse");
    assert!(matches!(
        ManifestCatalog::from_manifest_file(untyped),
        Err(CatalogError::InvalidManifest(_))
    ));
}

#[test]
fn catalog_module_loads_manifest_from_disk() {
    let temp = tempdir().expect("tempdir");
    let path = temp.path().join("manifest.yaml");
    fs::write(&path, MANIFEST).expect("write manifest");
    let catalog = ManifestCatalog::from_path(&path).expect("load");
    assert_eq!(
        catalog.table_names().collect::<Vec<_>>(),
        vec!["customer", "schedule", "schedule_task", "vendor"]
    );
}

#[test]
fn catalog_module_introspects_sqlite_and_applies_overlay() {
    let temp = tempdir().expect("tempdir");
    let db_path = temp.path().join("app.db");
    let conn = Connection::open(&db_path).expect("open db");
    conn.execute_batch(
        "
        CREATE TABLE schedule (
            id INTEGER PRIMARY KEY,
            name VARCHAR(80) NOT NULL,
            start_time DATETIME NOT NULL,
            owner_id INTEGER NOT NULL,
            status TEXT NOT NULL DEFAULT 'open',
            notes TEXT
        );
        ",
    )
    .expect("create schema");

    let overlay: ManifestFile = serde_yaml::from_str(
        r#"
tables:
  schedule:
    aliases: [schedules]
    columns:
      - name: owner_id
        description: User who owns the entry
"#,
    )
    .expect("parse overlay");
    let catalog = introspect_sqlite(&conn, &overlay).expect("introspect");

    let required = catalog
        .required_columns("schedule", MutationKind::Insert)
        .expect("required")
        .into_iter()
        .map(|column| column.name.as_str())
        .collect::<Vec<_>>();
    assert_eq!(required, vec!["name", "start_time", "owner_id"]);

    let id = catalog.column_def("schedule", "id").expect("id");
    assert!(id.identity && id.has_default && !id.nullable);
    let name = catalog.column_def("schedule", "name").expect("name");
    assert_eq!(name.max_length, Some(80));
    let owner = catalog.column_def("schedule", "owner_id").expect("owner");
    assert_eq!(owner.description.as_deref(), Some("User who owns the entry"));
    assert_eq!(catalog.resolve_entity("schedules").expect("alias").name, "schedule");

    let stale: ManifestFile = serde_yaml::from_str(
        r#"
tables:
  invoices:
    aliases: [bills]
"#,
    )
    .expect("parse stale overlay");
    assert!(matches!(
        introspect_sqlite(&conn, &stale),
        Err(CatalogError::InvalidManifest(_))
    ));
}
