// Config loading and validation tests

use std::collections::HashMap;

use trafficmon::accounting::GroupBy;
use trafficmon::config::{AppConfig, SourceKind};
use trafficmon::history_repo::HistoryBackend;
use trafficmon::models::EntityKind;

const VALID_CONFIG: &str = r#"
[source]
kind = "routeros"
entities = "connections"
host = "192.168.88.1"
username = "monitor"
password = "secret"

[accounting]
poll_interval_secs = 3600
top_n = 10

[storage]
history_path = "data/history.jsonl"
snapshot_path = "data/snapshot.json"

[server]
port = 8081
host = "127.0.0.1"
"#;

const LOCAL_CONFIG: &str = r#"
[source]
kind = "local"

[storage]
history_path = "data/history.db"
history_backend = "sqlite"
snapshot_path = "data/snapshot.json"
"#;

#[test]
fn test_config_loads_from_str() {
    let config = AppConfig::load_from_str(VALID_CONFIG).expect("load_from_str");
    assert_eq!(config.source.kind, SourceKind::RouterOs);
    assert_eq!(config.source.entities, EntityKind::Connections);
    assert_eq!(config.source.host, "192.168.88.1");
    assert_eq!(config.source.port, 8728);
    assert_eq!(config.source.timeout_ms, 10_000);
    assert_eq!(config.accounting.poll_interval_secs, 3600);
    assert_eq!(config.storage.history_backend, HistoryBackend::Jsonl);
    assert_eq!(config.storage.write_timeout_ms, 5_000);
    assert_eq!(config.server.as_ref().map(|s| s.port), Some(8081));
}

#[test]
fn test_local_config_defaults() {
    let config = AppConfig::load_from_str(LOCAL_CONFIG).expect("load_from_str");
    assert_eq!(config.source.kind, SourceKind::Local);
    assert_eq!(config.source.entities, EntityKind::Interfaces);
    assert_eq!(config.accounting.top_n, 10);
    assert_eq!(config.accounting.poll_interval_secs, 3600);
    assert!(config.accounting.schedule.is_none());
    assert_eq!(config.storage.history_backend, HistoryBackend::Sqlite);
    assert!(config.server.is_none());
}

#[test]
fn test_group_by_defaults_follow_entity_kind() {
    let config = AppConfig::load_from_str(VALID_CONFIG).unwrap();
    assert_eq!(
        config.accounting.group_by_for(EntityKind::Connections),
        GroupBy::SourceAddress
    );
    assert_eq!(
        config.accounting.group_by_for(EntityKind::Interfaces),
        GroupBy::Entity
    );

    let explicit = VALID_CONFIG.replace("top_n = 10", "top_n = 10\ngroup_by = \"entity\"");
    let config = AppConfig::load_from_str(&explicit).unwrap();
    assert_eq!(
        config.accounting.group_by_for(EntityKind::Connections),
        GroupBy::Entity
    );
}

#[test]
fn test_config_validation_rejects_missing_password() {
    let bad = VALID_CONFIG.replace("password = \"secret\"\n", "");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("source.password"));
}

#[test]
fn test_config_validation_rejects_missing_host() {
    let bad = VALID_CONFIG.replace("host = \"192.168.88.1\"\n", "");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("source.host"));
}

#[test]
fn test_config_validation_rejects_zero_poll_interval() {
    let bad = VALID_CONFIG.replace("poll_interval_secs = 3600", "poll_interval_secs = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("accounting.poll_interval_secs"));
}

#[test]
fn test_config_validation_rejects_zero_top_n() {
    let bad = VALID_CONFIG.replace("top_n = 10", "top_n = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("accounting.top_n"));
}

#[test]
fn test_config_validation_rejects_bad_cron() {
    let bad = VALID_CONFIG.replace("top_n = 10", "top_n = 10\nschedule = \"every hour\"");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("accounting.schedule"));

    let good = VALID_CONFIG.replace("top_n = 10", "top_n = 10\nschedule = \"0 0 * * * *\"");
    let config = AppConfig::load_from_str(&good).unwrap();
    assert_eq!(config.accounting.schedule.as_deref(), Some("0 0 * * * *"));
}

#[test]
fn test_config_validation_rejects_same_history_and_snapshot_path() {
    let bad = VALID_CONFIG.replace("data/snapshot.json", "data/history.jsonl");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("must differ"));
}

#[test]
fn test_config_validation_rejects_local_connections() {
    let bad = LOCAL_CONFIG.replace(
        "kind = \"local\"",
        "kind = \"local\"\nentities = \"connections\"",
    );
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("routeros"));
}

#[test]
fn test_config_validation_rejects_invalid_server_port() {
    let bad = VALID_CONFIG.replace("port = 8081", "port = 0");
    let err = AppConfig::load_from_str(&bad).unwrap_err();
    assert!(err.to_string().contains("server.port"));
}

#[test]
fn test_env_overrides_win_over_file() {
    let without_secret = VALID_CONFIG.replace("password = \"secret\"\n", "");
    let mut config: AppConfig = toml::from_str(&without_secret).unwrap();
    let env: HashMap<&str, &str> = HashMap::from([
        ("API_HOST", "10.0.0.1"),
        ("API_PORT", "8729"),
        ("API_PASSWORD", "from-env"),
    ]);
    config
        .apply_env_overrides(|key| env.get(key).map(|v| v.to_string()))
        .unwrap();
    config.validate().unwrap();

    assert_eq!(config.source.host, "10.0.0.1");
    assert_eq!(config.source.port, 8729);
    assert_eq!(config.source.username, "monitor");
    assert_eq!(config.source.password.as_deref(), Some("from-env"));
}

#[test]
fn test_env_override_rejects_bad_port() {
    let mut config = AppConfig::load_from_str(VALID_CONFIG).unwrap();
    let err = config
        .apply_env_overrides(|key| (key == "API_PORT").then(|| "eighty".to_string()))
        .unwrap_err();
    assert!(err.to_string().contains("API_PORT"));
}

#[test]
fn test_debug_output_redacts_password() {
    let config = AppConfig::load_from_str(VALID_CONFIG).unwrap();
    let debug = format!("{:?}", config.source);
    assert!(!debug.contains("secret"));
    assert!(debug.contains("<redacted>"));
}
