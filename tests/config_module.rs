use sqlform::config::{
    load_settings, ConfigError, SessionStoreKind, Settings, ValidationOptions,
};
use sqlform::orchestration::InterruptionPolicy;
use std::fs;
use tempfile::tempdir;

#[test]
fn config_module_defaults_and_relative_paths() {
    let temp = tempdir().expect("tempdir");
    fs::write(temp.path().join("app.db"), b"").expect("db file");
    let config = temp.path().join("config.yaml");
    fs::write(&config, "database_path: app.db\nstate_root: state\n").expect("write config");

    let settings = load_settings(Some(&config)).expect("load");
    assert_eq!(settings.database_path, temp.path().join("app.db"));
    assert_eq!(settings.state_root, Some(temp.path().join("state")));
    assert_eq!(settings.manifest_path, None);

    let policy = settings.session_policy();
    assert_eq!(policy.ttl_seconds, 3600);
    assert_eq!(policy.retry_budget, 3);

    let router = settings.router_config();
    assert_eq!(router.interruption_policy, InterruptionPolicy::Suspend);
    assert!(!router.confirm_before_execute);
    assert_eq!(router.row_limit, 100);
    assert_eq!(router.history.max_turns, 20);
}

#[test]
fn config_module_reads_session_and_read_sections() {
    let temp = tempdir().expect("tempdir");
    let config = temp.path().join("config.yaml");
    fs::write(
        &config,
        r#"
database_path: /data/app.db
manifest_path: manifest.yaml
state_root: /var/lib/sqlform
sessions:
  ttl_seconds: 600
  retry_budget: 5
  interruption_policy: abandon
  confirm_before_execute: true
  store: file
history:
  max_turns: 8
reads:
  row_limit: 25
"#,
    )
    .expect("write config");

    let settings = Settings::from_path(&config).expect("parse");
    assert_eq!(settings.manifest_path, Some(temp.path().join("manifest.yaml")));
    assert_eq!(settings.sessions.store, SessionStoreKind::File);
    settings
        .validate(ValidationOptions {
            require_paths_exist: false,
        })
        .expect("valid");

    let router = settings.router_config();
    assert_eq!(router.interruption_policy, InterruptionPolicy::Abandon);
    assert!(router.confirm_before_execute);
    assert_eq!(router.row_limit, 25);
    assert_eq!(router.history.max_turns, 8);
    assert_eq!(settings.session_policy().retry_budget, 5);
}

#[test]
fn config_module_rejects_invalid_settings() {
    let temp = tempdir().expect("tempdir");
    let config = temp.path().join("config.yaml");
    let relaxed = ValidationOptions {
        require_paths_exist: false,
    };

    fs::write(&config, "database_path: missing.db\n").expect("write config");
    let err = load_settings(Some(&config)).expect_err("missing database");
    assert!(err.to_string().contains("missing.db"));

    fs::write(
        &config,
        "database_path: /data/app.db\nsessions:\n  store: file\n",
    )
    .expect("write config");
    let settings = Settings::from_path(&config).expect("parse");
    assert!(matches!(
        settings.validate(relaxed),
        Err(ConfigError::Settings(message)) if message.contains("state_root")
    ));

    fs::write(
        &config,
        "database_path: /data/app.db\nsessions:\n  retry_budget: 0\n",
    )
    .expect("write config");
    let settings = Settings::from_path(&config).expect("parse");
    assert!(settings.validate(relaxed).is_err());

    fs::write(
        &config,
        "database_path: /data/app.db\nsessions:\n  interruption_policy: ignore\n",
    )
    .expect("write config");
    assert!(matches!(
        Settings::from_path(&config),
        Err(ConfigError::Parse { .. })
    ));

    assert!(matches!(
        load_settings(Some(&temp.path().join("absent.yaml"))),
        Err(ConfigError::Read { .. })
    ));
}
