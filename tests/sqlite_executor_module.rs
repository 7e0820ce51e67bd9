use rusqlite::Connection;
use sqlform::catalog::{introspect_sqlite, ManifestCatalog, ManifestFile, MutationKind};
use sqlform::executor::{SqliteExecutor, StatementExecutor};
use sqlform::mutation::{
    classify_failure, BuildStep, FailureClass, SessionPolicy, SessionStore, SqlBuilder,
    StatementPlan,
};
use sqlform::shared::{ConversationId, EngineLog};
use std::collections::BTreeMap;
use std::path::Path;
use tempfile::tempdir;

const SCHEMA: &str = "
CREATE TABLE schedule (
    id INTEGER PRIMARY KEY,
    name VARCHAR(80) NOT NULL UNIQUE,
    start_time DATETIME NOT NULL,
    owner_id INTEGER NOT NULL,
    notes TEXT
);
";

fn create_database(path: &Path) {
    let conn = Connection::open(path).expect("open db");
    conn.execute_batch(SCHEMA).expect("schema");
}

fn catalog_for(path: &Path, overlay: &str) -> ManifestCatalog {
    let conn = Connection::open(path).expect("open db");
    let overlay: ManifestFile = serde_yaml::from_str(overlay).expect("overlay");
    introspect_sqlite(&conn, &overlay).expect("introspect")
}

fn values(pairs: &[(&str, &str)]) -> BTreeMap<String, String> {
    pairs
        .iter()
        .map(|(key, value)| (key.to_string(), value.to_string()))
        .collect()
}

fn ready_plan(
    catalog: &ManifestCatalog,
    conversation: &str,
    kind: MutationKind,
    pairs: &[(&str, &str)],
) -> StatementPlan {
    let store = SessionStore::in_memory(SessionPolicy::default());
    let log = EngineLog::disabled();
    let builder = SqlBuilder::new(catalog, &store, &log);
    let conversation = ConversationId::parse(conversation).expect("conversation id");
    match builder
        .start_mutation(&conversation, "schedule", kind, &values(pairs), false, 100)
        .expect("start")
    {
        BuildStep::Ready(plan) => plan,
        BuildStep::Prompt(prompt) => panic!("unexpected prompt for {}", prompt.field),
    }
}

#[test]
fn sqlite_executor_module_inserts_and_reads_back_rows() {
    let temp = tempdir().expect("tempdir");
    let db = temp.path().join("app.db");
    create_database(&db);
    let catalog = catalog_for(&db, "tables: {}");
    let executor = SqliteExecutor::new(&db);

    let insert = ready_plan(
        &catalog,
        "c-1",
        MutationKind::Insert,
        &[("name", "Weekly Sync"), ("start_time", "2026-03-01T09:00"), ("owner_id", "42")],
    );
    let outcome = executor.execute(&insert).expect("insert");
    assert_eq!(outcome.rows_affected, 1);
    assert_eq!(outcome.last_insert_id, Some(1));

    let store = SessionStore::in_memory(SessionPolicy::default());
    let log = EngineLog::disabled();
    let select = SqlBuilder::new(&catalog, &store, &log)
        .plan_select("schedule", &values(&[("owner_id", "42")]), 10)
        .expect("select plan");
    let outcome = executor.execute(&select).expect("select");
    assert_eq!(outcome.rows.len(), 1);
    let row = &outcome.rows[0];
    assert_eq!(row["name"], "Weekly Sync");
    assert_eq!(row["start_time"], "2026-03-01 09:00:00");
    assert_eq!(row["owner_id"], 42);
    assert!(row["notes"].is_null());
}

#[test]
fn sqlite_executor_module_updates_by_identity() {
    let temp = tempdir().expect("tempdir");
    let db = temp.path().join("app.db");
    create_database(&db);
    let catalog = catalog_for(&db, "tables: {}");
    let executor = SqliteExecutor::new(&db);
    executor
        .execute(&ready_plan(
            &catalog,
            "c-1",
            MutationKind::Insert,
            &[("name", "Sync"), ("start_time", "2026-03-01"), ("owner_id", "1")],
        ))
        .expect("insert");

    let update = ready_plan(
        &catalog,
        "c-2",
        MutationKind::Update,
        &[("id", "1"), ("notes", "bring slides")],
    );
    assert_eq!(executor.execute(&update).expect("update").rows_affected, 1);

    let conn = Connection::open(&db).expect("open db");
    let notes: String = conn
        .query_row("SELECT notes FROM schedule WHERE id = 1", [], |row| row.get(0))
        .expect("notes");
    assert_eq!(notes, "bring slides");
}

#[test]
fn sqlite_executor_module_reports_not_null_as_missing_required() {
    let temp = tempdir().expect("tempdir");
    let db = temp.path().join("app.db");
    create_database(&db);
    // the overlay claims a default the database does not have
    let catalog = catalog_for(
        &db,
        "tables:\n  schedule:\n    columns:\n      - { name: owner_id, has_default: true }\n",
    );
    let executor = SqliteExecutor::new(&db);

    let insert = ready_plan(
        &catalog,
        "c-1",
        MutationKind::Insert,
        &[("name", "Sync"), ("start_time", "2026-03-01T09:00")],
    );
    let failure = executor.execute(&insert).expect_err("not null");
    assert_eq!(failure.code.as_deref(), Some("SQLITE_CONSTRAINT_NOTNULL"));
    assert_eq!(
        classify_failure(&catalog, "schedule", &failure),
        FailureClass::MissingRequired {
            column: "owner_id".to_string()
        }
    );
}

#[test]
fn sqlite_executor_module_reports_unique_as_constraint_violation() {
    let temp = tempdir().expect("tempdir");
    let db = temp.path().join("app.db");
    create_database(&db);
    let catalog = catalog_for(&db, "tables: {}");
    let executor = SqliteExecutor::new(&db);
    let pairs = [("name", "Sync"), ("start_time", "2026-03-01T09:00"), ("owner_id", "1")];

    executor
        .execute(&ready_plan(&catalog, "c-1", MutationKind::Insert, &pairs))
        .expect("first insert");
    let failure = executor
        .execute(&ready_plan(&catalog, "c-2", MutationKind::Insert, &pairs))
        .expect_err("duplicate");
    assert_eq!(failure.code.as_deref(), Some("SQLITE_CONSTRAINT_UNIQUE"));
    assert!(matches!(
        classify_failure(&catalog, "schedule", &failure),
        FailureClass::ConstraintViolation { .. }
    ));
}
