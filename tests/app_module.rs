use rusqlite::Connection;
use sqlform::app::{build_router, run_chat};
use sqlform::config::Settings;
use std::fs;
use std::io::Cursor;
use std::path::Path;
use tempfile::tempdir;

fn write_fixture(root: &Path, store: &str) -> Settings {
    let db = root.join("app.db");
    let conn = Connection::open(&db).expect("open db");
    conn.execute_batch(
        "
        CREATE TABLE customer (id INTEGER PRIMARY KEY, name TEXT NOT NULL, city TEXT);
        CREATE TABLE schedule (
            id INTEGER PRIMARY KEY,
            name TEXT NOT NULL,
            start_time DATETIME NOT NULL
        );
        ",
    )
    .expect("schema");
    fs::write(
        root.join("manifest.yaml"),
        "tables:\n  customer:\n    aliases: [customers]\n",
    )
    .expect("manifest");
    fs::write(
        root.join("config.yaml"),
        format!(
            "database_path: app.db\nmanifest_path: manifest.yaml\nstate_root: state\nsessions:\n  store: {store}\n"
        ),
    )
    .expect("config");
    Settings::from_path(&root.join("config.yaml")).expect("settings")
}

fn chat(settings: &Settings, lines: &str) -> String {
    let router = build_router(settings).expect("router");
    let mut output = Vec::new();
    run_chat(&router, "cli-1", Cursor::new(lines.to_string()), &mut output).expect("chat");
    String::from_utf8(output).expect("utf8")
}

#[test]
fn app_module_chat_loop_creates_and_lists_records() {
    let temp = tempdir().expect("tempdir");
    let settings = write_fixture(temp.path(), "memory");

    let transcript = chat(
        &settings,
        "create customer name=Ada\ncreate schedule\nSync\n2026-03-01 09:00\nshow customers\n:quit\nshow customers\n",
    );
    assert!(transcript.contains("Created the customer record (id 1)."));
    assert!(transcript.contains("what is `name`?"));
    assert!(transcript.contains("what is `start_time`?"));
    assert!(transcript.contains("Created the schedule record (id 1)."));
    assert_eq!(transcript.matches("Found 1 customer record(s).").count(), 1);
    assert!(transcript.contains("\"name\":\"Ada\""));

    let conn = Connection::open(&settings.database_path).expect("open db");
    let start: String = conn
        .query_row("SELECT start_time FROM schedule WHERE id = 1", [], |row| row.get(0))
        .expect("row");
    assert_eq!(start, "2026-03-01 09:00:00");
}

#[test]
fn app_module_file_store_resumes_after_restart() {
    let temp = tempdir().expect("tempdir");
    let settings = write_fixture(temp.path(), "file");

    let first = chat(&settings, "create schedule\n");
    assert!(first.contains("what is `name`?"));

    let second = chat(&settings, "Sync\n2026-03-01T09:00\n");
    assert!(second.contains("what is `start_time`?"));
    assert!(second.contains("Created the schedule record (id 1)."));

    let engine_log = fs::read_to_string(temp.path().join("state/logs/engine.log"))
        .expect("engine log");
    assert!(engine_log.contains("event=session_closed"));
}
