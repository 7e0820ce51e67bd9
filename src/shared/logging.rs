use serde_json::{Map, Value};
use std::fs;
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::{SystemTime, UNIX_EPOCH};

pub fn engine_log_path(state_root: &Path) -> PathBuf {
    state_root.join("logs/engine.log")
}

pub fn diagnostics_log_path(state_root: &Path) -> PathBuf {
    state_root.join("logs/diagnostics.jsonl")
}

pub fn append_engine_log_line(state_root: &Path, line: &str) -> std::io::Result<()> {
    let path = engine_log_path(state_root);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(&path)?;
    writeln!(file, "{line}")
}

pub fn append_diagnostic_event(
    path: &Path,
    timestamp: i64,
    event: &str,
    fields: &[(&str, Value)],
) -> std::io::Result<()> {
    let mut payload = Map::new();
    payload.insert("timestamp".to_string(), Value::from(timestamp));
    payload.insert("event".to_string(), Value::String(event.to_string()));
    for (key, value) in fields {
        payload.insert((*key).to_string(), value.clone());
    }
    let line = serde_json::to_string(&payload).map_err(std::io::Error::other)?;

    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = fs::OpenOptions::new()
        .create(true)
        .append(true)
        .open(path)?;
    writeln!(file, "{line}")
}

/// Best-effort event sink. Without a state root every call is a no-op, and
/// write failures are swallowed so logging never fails a turn.
#[derive(Debug, Clone, Default)]
pub struct EngineLog {
    state_root: Option<PathBuf>,
}

impl EngineLog {
    pub fn new(state_root: Option<PathBuf>) -> Self {
        Self { state_root }
    }

    pub fn disabled() -> Self {
        Self { state_root: None }
    }

    pub fn state_root(&self) -> Option<&Path> {
        self.state_root.as_deref()
    }

    pub fn event(&self, now: i64, conversation_id: &str, event: &str, fields: &[(&str, String)]) {
        let Some(root) = self.state_root.as_deref() else {
            return;
        };
        let mut line = format!("ts={now} conversation={conversation_id} event={event}");
        for (key, value) in fields {
            line.push_str(&format!(" {key}={}", quote_if_needed(value)));
        }
        let _ = append_engine_log_line(root, &line);
    }

    pub fn diagnostic(&self, now: i64, event: &str, fields: &[(&str, Value)]) {
        let Some(root) = self.state_root.as_deref() else {
            return;
        };
        let _ = append_diagnostic_event(&diagnostics_log_path(root), now, event, fields);
    }
}

fn quote_if_needed(value: &str) -> String {
    if value.is_empty() || value.chars().any(|ch| ch.is_whitespace() || ch == '"') {
        format!("{value:?}")
    } else {
        value.to_string()
    }
}

pub fn now_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|duration| duration.as_secs() as i64)
        .unwrap_or(0)
}
