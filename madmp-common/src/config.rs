//! Configuration loading and validation
//!
//! One immutable [`MadmpConfig`] is built at startup and shared by reference
//! (usually behind an `Arc`). Nothing in the core reads configuration from
//! ambient global state.
//!
//! # Resolution order for the config file
//!
//! 1. Command-line argument (highest priority)
//! 2. `MADMP_CONFIG` environment variable
//! 3. `~/.config/madmp/config.toml`
//! 4. `/etc/madmp/config.toml`
//! 5. Compiled defaults (a missing file is not an error)
//!
//! `MADMP_DATABASE` and `MADMP_COMMUNICATION_TOKEN` override the matching
//! file values after loading.

use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Environment variable naming the config file
pub const CONFIG_ENV_VAR: &str = "MADMP_CONFIG";
/// Environment variable overriding the database path
pub const DATABASE_ENV_VAR: &str = "MADMP_DATABASE";
/// Environment variable overriding the shared-secret token
pub const TOKEN_ENV_VAR: &str = "MADMP_COMMUNICATION_TOKEN";
/// Environment variable setting `host.url`
pub const HOST_URL_ENV_VAR: &str = "MADMP_HOST_URL";

/// Names of the record converters that can be referenced from the config
pub const KNOWN_RECORD_CONVERTERS: &[&str] = &["rdm", "generic"];

/// Top-level configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MadmpConfig {
    /// Path to the SQLite database file
    pub database_path: PathBuf,
    /// Address the HTTP server binds to
    pub bind_address: String,
    pub logging: LoggingConfig,
    /// Identity of this repository as it appears in `distribution.host`
    pub host: HostConfig,
    pub sync: SyncConfig,
    pub dmp_tool: DmpToolConfig,
    pub translations: TranslationConfig,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Log level (trace, debug, info, warn, error)
    pub level: String,
}

/// Host identity used for distribution matching
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct HostConfig {
    pub url: Option<String>,
    pub title: Option<String>,
}

/// Policy switches and defaults for the reconciliation engine
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Process datasets with several distributions hosted here instead of failing
    pub allow_multiple_distributions: bool,
    /// Accept owner e-mail addresses that have no local account
    pub allow_unknown_contributors: bool,
    /// Contributor roles that qualify as record owners (empty means every role)
    pub relevant_contributor_roles: Vec<String>,
    /// Fixed `created_by` user for new records (first resolved owner if unset)
    pub record_creator_user_id: Option<i64>,
    pub default_data_access: String,
    pub default_language: String,
    pub default_contact: Option<String>,
    /// Ordered converter names, evaluated first-match-wins
    pub record_converters: Vec<String>,
    /// Converter used when nothing in `record_converters` matches
    pub fallback_record_converter: String,
    /// PID types preferred when a record is reachable through several PIDs
    pub preferred_pid_types: Vec<String>,
    /// Metadata standard identifiers that select the RDM converter
    pub datacite_schema_identifiers: Vec<String>,
}

/// Outbound communication with the DMP tool
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct DmpToolConfig {
    /// Shared secret; checked on inbound requests and sent on outbound ones
    pub token: Option<String>,
    /// Endpoint for one dataset, `{}` is replaced by the dataset id
    pub dataset_endpoint_url: String,
    /// Endpoint for datasets whose id cannot be put into a URL path
    pub datasets_endpoint_url: String,
    /// Endpoint for one DMP, `{}` is replaced by the DMP id
    pub dmp_endpoint_url: String,
    pub dmps_endpoint_url: String,
    pub timeout_ms: u64,
    pub send_notifications: bool,
}

/// Translation tables consulted by the record converters
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct TranslationConfig {
    pub resource_type: HashMap<String, String>,
    pub resource_subtype: HashMap<String, String>,
}

impl Default for MadmpConfig {
    fn default() -> Self {
        Self {
            database_path: default_database_path(),
            bind_address: "127.0.0.1:5780".to_string(),
            logging: LoggingConfig::default(),
            host: HostConfig::default(),
            sync: SyncConfig::default(),
            dmp_tool: DmpToolConfig::default(),
            translations: TranslationConfig::default(),
        }
    }
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            allow_multiple_distributions: false,
            allow_unknown_contributors: false,
            relevant_contributor_roles: Vec::new(),
            record_creator_user_id: None,
            default_data_access: "open".to_string(),
            default_language: "eng".to_string(),
            default_contact: None,
            record_converters: vec!["rdm".to_string()],
            fallback_record_converter: "rdm".to_string(),
            preferred_pid_types: vec!["doi".to_string(), "recid".to_string()],
            datacite_schema_identifiers: vec![
                "https://schema.datacite.org/meta/kernel-4.3/".to_string(),
                "https://schema.datacite.org/meta/kernel-4/".to_string(),
            ],
        }
    }
}

impl Default for DmpToolConfig {
    fn default() -> Self {
        Self {
            token: None,
            dataset_endpoint_url: "http://localhost:8080/api/datasets/{}".to_string(),
            datasets_endpoint_url: "http://localhost:8080/api/datasets".to_string(),
            dmp_endpoint_url: "http://localhost:8080/api/dmps/{}".to_string(),
            dmps_endpoint_url: "http://localhost:8080/api/dmps".to_string(),
            timeout_ms: 10_000,
            send_notifications: true,
        }
    }
}

impl HostConfig {
    /// Check whether a distribution host refers to this repository
    ///
    /// URL equality OR title equality. Unset config values never match.
    pub fn matches(&self, url: Option<&str>, title: Option<&str>) -> bool {
        let url_matches = matches!((self.url.as_deref(), url), (Some(a), Some(b)) if a == b);
        let title_matches =
            matches!((self.title.as_deref(), title), (Some(a), Some(b)) if a == b);
        url_matches || title_matches
    }
}

impl SyncConfig {
    /// Check whether a contributor with the given roles may own records
    pub fn is_relevant_contributor<S: AsRef<str>>(&self, roles: &[S]) -> bool {
        if self.relevant_contributor_roles.is_empty() {
            return true;
        }

        roles.iter().any(|role| {
            self.relevant_contributor_roles
                .iter()
                .any(|relevant| relevant == role.as_ref())
        })
    }
}

impl MadmpConfig {
    /// Parse and validate configuration from TOML text
    pub fn from_toml_str(content: &str) -> Result<Self> {
        let config: MadmpConfig = toml::from_str(content)
            .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Resolve, load, override from environment and validate
    pub fn load(cli_path: Option<&Path>) -> Result<Self> {
        let mut config = match resolve_config_path(cli_path) {
            Some(path) => {
                info!("Loading configuration from {}", path.display());
                let content = std::fs::read_to_string(&path).map_err(|e| {
                    Error::Config(format!("Read {} failed: {}", path.display(), e))
                })?;
                toml::from_str(&content)
                    .map_err(|e| Error::Config(format!("Parse TOML failed: {}", e)))?
            }
            None => {
                warn!("No configuration file found, using compiled defaults");
                MadmpConfig::default()
            }
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// Apply `MADMP_DATABASE`, `MADMP_HOST_URL` and `MADMP_COMMUNICATION_TOKEN`
    pub fn apply_env_overrides(&mut self) {
        if let Ok(path) = std::env::var(DATABASE_ENV_VAR) {
            if !path.trim().is_empty() {
                self.database_path = PathBuf::from(path);
            }
        }

        if let Ok(url) = std::env::var(HOST_URL_ENV_VAR) {
            if !url.trim().is_empty() {
                self.host.url = Some(url.trim().to_string());
            }
        }

        if let Ok(token) = std::env::var(TOKEN_ENV_VAR) {
            self.dmp_tool.token = if token.trim().is_empty() {
                None
            } else {
                Some(token)
            };
        }
    }

    /// Reject configurations the engine cannot run with
    pub fn validate(&self) -> Result<()> {
        let blank = |v: &Option<String>| v.as_deref().map_or(true, |s| s.trim().is_empty());
        if blank(&self.host.url) && blank(&self.host.title) {
            return Err(Error::Config(
                "host.url or host.title must be set to match distributions".to_string(),
            ));
        }

        let fallback = self.sync.fallback_record_converter.trim();
        if fallback.is_empty() {
            return Err(Error::Config(
                "sync.fallback_record_converter is mandatory".to_string(),
            ));
        }

        for name in std::iter::once(fallback)
            .chain(self.sync.record_converters.iter().map(String::as_str))
        {
            if !KNOWN_RECORD_CONVERTERS.contains(&name) {
                return Err(Error::Config(format!(
                    "unknown record converter '{}' (known: {})",
                    name,
                    KNOWN_RECORD_CONVERTERS.join(", ")
                )));
            }
        }

        if self.dmp_tool.timeout_ms == 0 {
            return Err(Error::Config("dmp_tool.timeout_ms must be positive".to_string()));
        }

        Ok(())
    }

    /// Whether inbound requests must carry the bearer token
    pub fn auth_enabled(&self) -> bool {
        self.dmp_tool.token.is_some()
    }
}

/// Find the config file to load, if any
pub fn resolve_config_path(cli_path: Option<&Path>) -> Option<PathBuf> {
    // Priority 1: Command-line argument
    if let Some(path) = cli_path {
        return Some(path.to_path_buf());
    }

    // Priority 2: Environment variable
    if let Ok(path) = std::env::var(CONFIG_ENV_VAR) {
        if !path.trim().is_empty() {
            return Some(PathBuf::from(path));
        }
    }

    // Priority 3 and 4: user then system config file
    let user_config = dirs::config_dir().map(|d| d.join("madmp").join("config.toml"));
    let system_config = PathBuf::from("/etc/madmp/config.toml");

    user_config
        .into_iter()
        .chain(std::iter::once(system_config))
        .find(|p| p.exists())
}

/// OS-dependent default database location
fn default_database_path() -> PathBuf {
    dirs::data_local_dir()
        .map(|d| d.join("madmp").join("madmp.db"))
        .unwrap_or_else(|| PathBuf::from("./madmp.db"))
}
