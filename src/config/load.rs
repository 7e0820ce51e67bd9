use super::{default_global_config_path, ConfigError, Settings, ValidationOptions};
use std::path::Path;

/// Loads settings from `path`, or from `~/.sqlform/config.yaml` when none is
/// given, and validates them.
pub fn load_settings(path: Option<&Path>) -> Result<Settings, ConfigError> {
    let path = match path {
        Some(path) => path.to_path_buf(),
        None => default_global_config_path()?,
    };
    let settings = Settings::from_path(&path)?;
    settings.validate(ValidationOptions::default())?;
    Ok(settings)
}
