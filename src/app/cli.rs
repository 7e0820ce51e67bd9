use super::chat::{build_router, run_chat};
use crate::config::load_settings;
use crate::shared::now_secs;
use std::path::PathBuf;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CliVerb {
    Chat,
    Help,
    Unknown,
}

pub fn parse_cli_verb(input: &str) -> CliVerb {
    match input {
        "chat" => CliVerb::Chat,
        "help" | "--help" | "-h" => CliVerb::Help,
        _ => CliVerb::Unknown,
    }
}

pub fn cli_help_lines() -> Vec<String> {
    vec![
        "Commands:".to_string(),
        "  chat [--config <path>] [--conversation <id>]   Start an interactive session".to_string(),
        "  help                                           Show this help".to_string(),
        String::new(),
        "Inside chat, `:quit` leaves; `cancel` drops the request in progress.".to_string(),
    ]
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChatArgs {
    pub config_path: Option<PathBuf>,
    pub conversation_id: Option<String>,
}

pub fn parse_chat_args(args: &[String]) -> Result<ChatArgs, String> {
    let mut parsed = ChatArgs::default();
    let mut iter = args.iter();
    while let Some(arg) = iter.next() {
        match arg.as_str() {
            "--config" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "`--config` requires a path".to_string())?;
                parsed.config_path = Some(PathBuf::from(value));
            }
            "--conversation" => {
                let value = iter
                    .next()
                    .ok_or_else(|| "`--conversation` requires an id".to_string())?;
                parsed.conversation_id = Some(value.clone());
            }
            other => return Err(format!("unknown chat argument `{other}`")),
        }
    }
    Ok(parsed)
}

pub fn run_cli(args: Vec<String>) -> Result<String, String> {
    let Some(verb) = args.first() else {
        return Ok(cli_help_lines().join("\n"));
    };
    match parse_cli_verb(verb) {
        CliVerb::Help => Ok(cli_help_lines().join("\n")),
        CliVerb::Chat => {
            let chat_args = parse_chat_args(&args[1..])?;
            let settings =
                load_settings(chat_args.config_path.as_deref()).map_err(|err| err.to_string())?;
            let router = build_router(&settings)?;
            let conversation_id = chat_args
                .conversation_id
                .unwrap_or_else(|| format!("cli-{}", now_secs()));
            let stdin = std::io::stdin();
            let mut stdout = std::io::stdout();
            run_chat(&router, &conversation_id, stdin.lock(), &mut stdout)
                .map_err(|err| format!("chat failed: {err}"))?;
            Ok(String::new())
        }
        CliVerb::Unknown => Err(format!(
            "unknown command `{verb}`\n{}",
            cli_help_lines().join("\n")
        )),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chat_args_accept_config_and_conversation() {
        let args = ["--config", "/tmp/c.yaml", "--conversation", "team:1"]
            .iter()
            .map(|value| value.to_string())
            .collect::<Vec<_>>();
        let parsed = parse_chat_args(&args).expect("parse");
        assert_eq!(parsed.config_path, Some(PathBuf::from("/tmp/c.yaml")));
        assert_eq!(parsed.conversation_id.as_deref(), Some("team:1"));
    }

    #[test]
    fn chat_args_reject_missing_values_and_unknown_flags() {
        assert!(parse_chat_args(&["--config".to_string()]).is_err());
        assert!(parse_chat_args(&["--verbose".to_string()]).is_err());
    }

    #[test]
    fn unknown_verb_reports_help() {
        let err = run_cli(vec!["serve".to_string()]).expect_err("unknown");
        assert!(err.contains("unknown command `serve`"));
        assert!(err.contains("chat [--config <path>]"));
    }
}
