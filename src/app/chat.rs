use crate::catalog::{introspect_sqlite, ManifestCatalog, ManifestFile};
use crate::config::{SessionStoreKind, Settings};
use crate::executor::SqliteExecutor;
use crate::mutation::{FileBackend, MemoryBackend, SessionStore};
use crate::orchestration::{LexicalOracle, Router, TurnInput};
use crate::shared::{now_secs, EngineLog};
use rusqlite::Connection;
use std::io::{BufRead, Write};

pub type SqliteRouter = Router<LexicalOracle, SqliteExecutor>;

const QUIT_COMMAND: &str = ":quit";

/// Introspects the configured database and merges the manifest overlay.
pub fn build_catalog(settings: &Settings) -> Result<ManifestCatalog, String> {
    let overlay = match &settings.manifest_path {
        Some(path) => ManifestFile::from_path(path).map_err(|err| err.to_string())?,
        None => ManifestFile::default(),
    };
    let connection = Connection::open(&settings.database_path).map_err(|err| {
        format!(
            "failed to open database {}: {err}",
            settings.database_path.display()
        )
    })?;
    introspect_sqlite(&connection, &overlay).map_err(|err| err.to_string())
}

pub fn build_router(settings: &Settings) -> Result<SqliteRouter, String> {
    let catalog = build_catalog(settings)?;
    let log = EngineLog::new(settings.state_root.clone());
    let policy = settings.session_policy();
    let store = match (settings.sessions.store, settings.state_root.as_ref()) {
        (SessionStoreKind::File, Some(root)) => {
            SessionStore::new(FileBackend::new(root), policy, log.clone())
        }
        (SessionStoreKind::File, None) => {
            return Err("`sessions.store: file` requires `state_root`".to_string())
        }
        (SessionStoreKind::Memory, _) => SessionStore::new(MemoryBackend::new(), policy, log.clone()),
    };
    Ok(Router::new(
        catalog,
        store,
        LexicalOracle::new(),
        SqliteExecutor::new(&settings.database_path),
        log,
        settings.router_config(),
    ))
}

/// Line-oriented loop: one turn per input line until EOF or `:quit`.
pub fn run_chat<R, W>(
    router: &SqliteRouter,
    conversation_id: &str,
    input: R,
    output: &mut W,
) -> std::io::Result<()>
where
    R: BufRead,
    W: Write,
{
    write!(output, "> ")?;
    output.flush()?;
    for line in input.lines() {
        let line = line?;
        let text = line.trim();
        if text == QUIT_COMMAND {
            break;
        }
        if !text.is_empty() {
            let rendered = match router.handle_turn(&TurnInput::new(conversation_id, text), now_secs())
            {
                Ok(turn) => turn.render(),
                Err(err) => format!("error: {err}"),
            };
            writeln!(output, "{rendered}")?;
        }
        write!(output, "> ")?;
        output.flush()?;
    }
    writeln!(output)?;
    Ok(())
}
