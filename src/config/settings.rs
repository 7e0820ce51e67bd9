use super::ConfigError;
use crate::mutation::SessionPolicy;
use crate::orchestration::{HistoryLimits, InterruptionPolicy, RouterConfig};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum SessionStoreKind {
    #[default]
    Memory,
    File,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Settings {
    pub database_path: PathBuf,
    /// Standalone manifest, or the overlay merged over introspected tables.
    #[serde(default)]
    pub manifest_path: Option<PathBuf>,
    #[serde(default)]
    pub state_root: Option<PathBuf>,
    #[serde(default)]
    pub sessions: SessionsConfig,
    #[serde(default)]
    pub history: HistoryConfig,
    #[serde(default)]
    pub reads: ReadsConfig,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SessionsConfig {
    #[serde(default = "default_ttl_seconds")]
    pub ttl_seconds: u64,
    #[serde(default = "default_retry_budget")]
    pub retry_budget: u32,
    #[serde(default)]
    pub interruption_policy: InterruptionPolicy,
    #[serde(default)]
    pub confirm_before_execute: bool,
    #[serde(default)]
    pub store: SessionStoreKind,
}

impl Default for SessionsConfig {
    fn default() -> Self {
        Self {
            ttl_seconds: default_ttl_seconds(),
            retry_budget: default_retry_budget(),
            interruption_policy: InterruptionPolicy::default(),
            confirm_before_execute: false,
            store: SessionStoreKind::default(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct HistoryConfig {
    #[serde(default = "default_max_turns")]
    pub max_turns: usize,
}

impl Default for HistoryConfig {
    fn default() -> Self {
        Self {
            max_turns: default_max_turns(),
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReadsConfig {
    #[serde(default = "default_row_limit")]
    pub row_limit: u32,
}

impl Default for ReadsConfig {
    fn default() -> Self {
        Self {
            row_limit: default_row_limit(),
        }
    }
}

fn default_ttl_seconds() -> u64 {
    3600
}

fn default_retry_budget() -> u32 {
    3
}

fn default_max_turns() -> usize {
    20
}

fn default_row_limit() -> u32 {
    100
}

#[derive(Debug, Clone, Copy)]
pub struct ValidationOptions {
    pub require_paths_exist: bool,
}

impl Default for ValidationOptions {
    fn default() -> Self {
        Self {
            require_paths_exist: true,
        }
    }
}

impl Settings {
    /// Parses a settings file. Relative paths inside it are resolved against
    /// the file's directory.
    pub fn from_path(path: &Path) -> Result<Self, ConfigError> {
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let mut settings: Self =
            serde_yaml::from_str(&raw).map_err(|source| ConfigError::Parse {
                path: path.display().to_string(),
                source,
            })?;
        if let Some(base) = path.parent().filter(|base| base.is_absolute()) {
            settings.resolve_relative_paths(base);
        }
        Ok(settings)
    }

    pub fn resolve_relative_paths(&mut self, base: &Path) {
        let resolve = |path: &mut PathBuf| {
            if path.is_relative() {
                *path = base.join(&*path);
            }
        };
        resolve(&mut self.database_path);
        if let Some(path) = self.manifest_path.as_mut() {
            resolve(path);
        }
        if let Some(path) = self.state_root.as_mut() {
            resolve(path);
        }
    }

    pub fn validate(&self, options: ValidationOptions) -> Result<(), ConfigError> {
        if !self.database_path.is_absolute() {
            return Err(ConfigError::Settings(
                "`database_path` must be an absolute path".to_string(),
            ));
        }
        if let Some(path) = &self.manifest_path {
            if !path.is_absolute() {
                return Err(ConfigError::Settings(
                    "`manifest_path` must be an absolute path".to_string(),
                ));
            }
            if options.require_paths_exist && !path.is_file() {
                return Err(ConfigError::Settings(format!(
                    "manifest `{}` is missing",
                    path.display()
                )));
            }
        }
        if options.require_paths_exist && !self.database_path.is_file() {
            return Err(ConfigError::Settings(format!(
                "database `{}` is missing",
                self.database_path.display()
            )));
        }
        if let Some(root) = &self.state_root {
            if !root.is_absolute() {
                return Err(ConfigError::Settings(
                    "`state_root` must be an absolute path".to_string(),
                ));
            }
        }

        if self.sessions.ttl_seconds == 0 {
            return Err(ConfigError::Settings(
                "`sessions.ttl_seconds` must be >= 1".to_string(),
            ));
        }
        if self.sessions.retry_budget == 0 {
            return Err(ConfigError::Settings(
                "`sessions.retry_budget` must be >= 1".to_string(),
            ));
        }
        if self.sessions.store == SessionStoreKind::File && self.state_root.is_none() {
            return Err(ConfigError::Settings(
                "`sessions.store: file` requires `state_root`".to_string(),
            ));
        }
        if self.history.max_turns == 0 {
            return Err(ConfigError::Settings(
                "`history.max_turns` must be >= 1".to_string(),
            ));
        }
        if self.reads.row_limit == 0 {
            return Err(ConfigError::Settings(
                "`reads.row_limit` must be >= 1".to_string(),
            ));
        }
        Ok(())
    }

    pub fn session_policy(&self) -> SessionPolicy {
        SessionPolicy {
            ttl_seconds: self.sessions.ttl_seconds,
            retry_budget: self.sessions.retry_budget,
        }
    }

    pub fn router_config(&self) -> RouterConfig {
        RouterConfig {
            interruption_policy: self.sessions.interruption_policy,
            confirm_before_execute: self.sessions.confirm_before_execute,
            row_limit: self.reads.row_limit,
            history: HistoryLimits {
                max_turns: self.history.max_turns,
                ..HistoryLimits::default()
            },
        }
    }
}
