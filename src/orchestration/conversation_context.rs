use crate::shared::ConversationId;
use serde::{Deserialize, Serialize};
use std::fs::{self, OpenOptions};
use std::io::{BufRead, BufReader, Write};
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HistoryLimits {
    pub max_turns: usize,
    pub max_chars: usize,
}

impl Default for HistoryLimits {
    fn default() -> Self {
        Self {
            max_turns: 20,
            max_chars: 6000,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
enum TurnDirection {
    Inbound,
    Outbound,
    Note,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct TurnRecord {
    timestamp: i64,
    direction: TurnDirection,
    message: String,
}

fn sanitize_component(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    for ch in raw.chars() {
        if ch.is_ascii_alphanumeric() || ch == '-' || ch == '_' || ch == '.' {
            out.push(ch);
        } else {
            out.push('_');
        }
    }
    if out.is_empty() {
        "_".to_string()
    } else {
        out
    }
}

pub fn history_path(state_root: &Path, conversation_id: &ConversationId) -> PathBuf {
    state_root
        .join("conversations")
        .join(format!("{}.jsonl", sanitize_component(conversation_id.as_str())))
}

fn append_turn(
    state_root: &Path,
    conversation_id: &ConversationId,
    turn: &TurnRecord,
) -> std::io::Result<()> {
    let path = history_path(state_root, conversation_id);
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }
    let mut file = OpenOptions::new().create(true).append(true).open(&path)?;
    let line = serde_json::to_string(turn).map_err(std::io::Error::other)?;
    file.write_all(line.as_bytes())?;
    file.write_all(b"\n")?;
    Ok(())
}

fn render_turn(turn: &TurnRecord) -> String {
    let who = match turn.direction {
        TurnDirection::Inbound => "user",
        TurnDirection::Outbound => "assistant",
        TurnDirection::Note => "note",
    };
    format!("[{who}] {}", turn.message.trim())
}

/// Per-conversation JSONL transcript. Without a state root nothing is kept.
#[derive(Debug, Clone, Default)]
pub struct ConversationHistory {
    state_root: Option<PathBuf>,
    limits: HistoryLimits,
}

impl ConversationHistory {
    pub fn new(state_root: Option<PathBuf>, limits: HistoryLimits) -> Self {
        Self { state_root, limits }
    }

    pub fn append_inbound(
        &self,
        conversation_id: &ConversationId,
        timestamp: i64,
        message: &str,
    ) -> std::io::Result<()> {
        self.append(conversation_id, timestamp, TurnDirection::Inbound, message)
    }

    pub fn append_outbound(
        &self,
        conversation_id: &ConversationId,
        timestamp: i64,
        message: &str,
    ) -> std::io::Result<()> {
        self.append(conversation_id, timestamp, TurnDirection::Outbound, message)
    }

    /// Engine-side notes such as a suspended or abandoned session.
    pub fn append_note(
        &self,
        conversation_id: &ConversationId,
        timestamp: i64,
        message: &str,
    ) -> std::io::Result<()> {
        self.append(conversation_id, timestamp, TurnDirection::Note, message)
    }

    fn append(
        &self,
        conversation_id: &ConversationId,
        timestamp: i64,
        direction: TurnDirection,
        message: &str,
    ) -> std::io::Result<()> {
        let Some(root) = self.state_root.as_deref() else {
            return Ok(());
        };
        if message.trim().is_empty() {
            return Ok(());
        }
        append_turn(
            root,
            conversation_id,
            &TurnRecord {
                timestamp,
                direction,
                message: message.to_string(),
            },
        )
    }

    pub fn render_recent(
        &self,
        conversation_id: &ConversationId,
    ) -> std::io::Result<Option<String>> {
        let Some(root) = self.state_root.as_deref() else {
            return Ok(None);
        };
        if self.limits.max_turns == 0 || self.limits.max_chars == 0 {
            return Ok(None);
        }

        let path = history_path(root, conversation_id);
        let file = match fs::File::open(&path) {
            Ok(file) => file,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(err) => return Err(err),
        };

        let reader = BufReader::new(file);
        let mut turns = Vec::new();
        for line in reader.lines() {
            let line = line?;
            if line.trim().is_empty() {
                continue;
            }
            if let Ok(turn) = serde_json::from_str::<TurnRecord>(&line) {
                turns.push(turn);
            }
        }
        if turns.len() > self.limits.max_turns {
            let keep_from = turns.len() - self.limits.max_turns;
            turns = turns.split_off(keep_from);
        }

        let mut selected_lines = Vec::<String>::new();
        let mut used = 0usize;
        for line in turns.iter().rev().map(render_turn) {
            let line_len = line.chars().count();
            let sep = if selected_lines.is_empty() { 0 } else { 1 };
            if used + sep + line_len > self.limits.max_chars {
                break;
            }
            used += sep + line_len;
            selected_lines.push(line);
        }
        selected_lines.reverse();
        if selected_lines.is_empty() {
            return Ok(None);
        }
        Ok(Some(selected_lines.join("\n")))
    }
}
