//! Tests for configuration loading, resolution and validation
//!
//! Note: Uses serial_test to prevent ENV variable races. Tests that touch
//! MADMP_CONFIG, MADMP_DATABASE or MADMP_COMMUNICATION_TOKEN are #[serial].

use madmp_common::config::{
    resolve_config_path, MadmpConfig, CONFIG_ENV_VAR, DATABASE_ENV_VAR, HOST_URL_ENV_VAR,
    TOKEN_ENV_VAR,
};
use serial_test::serial;
use std::env;
use std::io::Write;
use std::path::PathBuf;

const FULL_CONFIG: &str = r#"
database_path = "/tmp/madmp-test.db"
bind_address = "0.0.0.0:9000"

[logging]
level = "debug"

[host]
url = "https://repo.example"
title = "Repo"

[sync]
allow_multiple_distributions = true
allow_unknown_contributors = true
relevant_contributor_roles = ["owner", "DataManager"]
record_creator_user_id = 7
record_converters = ["rdm", "generic"]
fallback_record_converter = "generic"

[dmp_tool]
token = "s3cret"
dataset_endpoint_url = "https://dmp.example/api/datasets/{}"
timeout_ms = 2500

[translations.resource_type]
dataset = "dataset"
software = "software"
"#;

fn write_config(content: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().expect("temp file");
    file.write_all(content.as_bytes()).expect("write config");
    file
}

#[test]
fn test_parse_full_config() {
    let config = MadmpConfig::from_toml_str(FULL_CONFIG).expect("valid config");

    assert_eq!(config.database_path, PathBuf::from("/tmp/madmp-test.db"));
    assert_eq!(config.bind_address, "0.0.0.0:9000");
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.host.url.as_deref(), Some("https://repo.example"));
    assert!(config.sync.allow_multiple_distributions);
    assert!(config.sync.allow_unknown_contributors);
    assert_eq!(config.sync.record_creator_user_id, Some(7));
    assert_eq!(config.sync.record_converters, vec!["rdm", "generic"]);
    assert_eq!(config.sync.fallback_record_converter, "generic");
    assert_eq!(config.dmp_tool.token.as_deref(), Some("s3cret"));
    assert_eq!(config.dmp_tool.timeout_ms, 2500);
    assert_eq!(
        config.translations.resource_type.get("software").map(String::as_str),
        Some("software")
    );
    assert!(config.auth_enabled());
}

#[test]
fn test_defaults_fill_missing_sections() {
    let config = MadmpConfig::from_toml_str("[host]\ntitle = \"Repo\"\n").expect("valid config");

    assert!(!config.sync.allow_multiple_distributions);
    assert!(!config.sync.allow_unknown_contributors);
    assert_eq!(config.sync.default_data_access, "open");
    assert_eq!(config.sync.default_language, "eng");
    assert_eq!(config.sync.fallback_record_converter, "rdm");
    assert_eq!(config.sync.preferred_pid_types, vec!["doi", "recid"]);
    assert!(config.dmp_tool.token.is_none());
    assert!(!config.auth_enabled());
}

#[test]
fn test_missing_host_identity_is_rejected() {
    let err = MadmpConfig::from_toml_str("bind_address = \"127.0.0.1:1\"\n").unwrap_err();
    assert!(err.to_string().contains("host.url or host.title"));
}

#[test]
fn test_empty_fallback_converter_is_rejected() {
    let toml = "[host]\ntitle = \"Repo\"\n[sync]\nfallback_record_converter = \"\"\n";
    let err = MadmpConfig::from_toml_str(toml).unwrap_err();
    assert!(err.to_string().contains("fallback_record_converter"));
}

#[test]
fn test_unknown_converter_is_rejected() {
    let toml = "[host]\ntitle = \"Repo\"\n[sync]\nrecord_converters = [\"dublin-core\"]\n";
    let err = MadmpConfig::from_toml_str(toml).unwrap_err();
    assert!(err.to_string().contains("dublin-core"));
}

#[test]
fn test_zero_timeout_is_rejected() {
    let toml = "[host]\ntitle = \"Repo\"\n[dmp_tool]\ntimeout_ms = 0\n";
    assert!(MadmpConfig::from_toml_str(toml).is_err());
}

#[test]
fn test_invalid_toml_is_config_error() {
    let err = MadmpConfig::from_toml_str("[host\n").unwrap_err();
    assert!(err.to_string().starts_with("Configuration error"));
}

#[test]
#[serial]
fn test_cli_path_has_priority_over_env() {
    let file = write_config(FULL_CONFIG);
    env::set_var(CONFIG_ENV_VAR, "/nonexistent/madmp.toml");

    let resolved = resolve_config_path(Some(file.path()));
    assert_eq!(resolved.as_deref(), Some(file.path()));

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_load_from_env_path() {
    let file = write_config(FULL_CONFIG);
    env::set_var(CONFIG_ENV_VAR, file.path());
    env::remove_var(DATABASE_ENV_VAR);
    env::remove_var(TOKEN_ENV_VAR);

    let config = MadmpConfig::load(None).expect("config loads");
    assert_eq!(config.bind_address, "0.0.0.0:9000");

    env::remove_var(CONFIG_ENV_VAR);
}

#[test]
#[serial]
fn test_env_overrides_database_and_token() {
    let file = write_config(FULL_CONFIG);
    env::set_var(DATABASE_ENV_VAR, "/tmp/override.db");
    env::set_var(TOKEN_ENV_VAR, "other-token");

    let config = MadmpConfig::load(Some(file.path())).expect("config loads");
    assert_eq!(config.database_path, PathBuf::from("/tmp/override.db"));
    assert_eq!(config.dmp_tool.token.as_deref(), Some("other-token"));

    env::remove_var(DATABASE_ENV_VAR);
    env::remove_var(TOKEN_ENV_VAR);
}

#[test]
#[serial]
fn test_blank_token_env_disables_auth() {
    let file = write_config(FULL_CONFIG);
    env::set_var(TOKEN_ENV_VAR, "  ");

    let config = MadmpConfig::load(Some(file.path())).expect("config loads");
    assert!(config.dmp_tool.token.is_none());
    assert!(!config.auth_enabled());

    env::remove_var(TOKEN_ENV_VAR);
}

#[test]
#[serial]
fn test_missing_cli_file_is_an_error() {
    let result = MadmpConfig::load(Some(std::path::Path::new("/nonexistent/madmp.toml")));
    assert!(result.is_err());
}

#[test]
#[serial]
fn test_host_url_env_makes_defaults_usable() {
    env::remove_var(CONFIG_ENV_VAR);
    env::set_var(HOST_URL_ENV_VAR, "https://repo.example");

    let mut config = MadmpConfig::default();
    config.apply_env_overrides();
    assert!(config.validate().is_ok());
    assert_eq!(config.host.url.as_deref(), Some("https://repo.example"));

    env::remove_var(HOST_URL_ENV_VAR);
}
