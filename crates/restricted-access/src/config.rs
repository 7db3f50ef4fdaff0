use serde::Deserialize;
use std::path::{Path, PathBuf};
use tracing::warn;

#[derive(Debug, Deserialize, PartialEq)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub logging: LoggingConfig,
    #[serde(default = "default_policy_file")]
    pub policy_file: PathBuf,
    #[serde(default)]
    pub identity: IdentityConfig,
    #[serde(default = "default_login_url")]
    pub login_url: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            network: NetworkConfig::default(),
            logging: LoggingConfig::default(),
            policy_file: default_policy_file(),
            identity: IdentityConfig::default(),
            login_url: default_login_url(),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct NetworkConfig {
    #[serde(default = "default_listen")]
    pub listen_addr: String,
    #[serde(default = "default_upstream")]
    pub upstream_url: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            listen_addr: default_listen(),
            upstream_url: default_upstream(),
        }
    }
}

#[derive(Debug, Deserialize, PartialEq)]
pub struct LoggingConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
    #[serde(default = "default_audit_path")]
    pub audit_log_path: PathBuf,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            audit_log_path: default_audit_path(),
        }
    }
}

/// Where the caller's identity comes from.
#[derive(Debug, Deserialize, PartialEq)]
pub struct IdentityConfig {
    /// Header set by the authenticating proxy in front of the gate.
    #[serde(default = "default_user_header")]
    pub user_header: String,
    /// Usernames treated as super-admins.
    #[serde(default)]
    pub sysadmins: Vec<String>,
}

impl Default for IdentityConfig {
    fn default() -> Self {
        Self {
            user_header: default_user_header(),
            sysadmins: Vec::new(),
        }
    }
}

// ---------------------------------------------------------------------------
// Default-value functions used by serde
// ---------------------------------------------------------------------------

fn default_policy_file() -> PathBuf {
    PathBuf::from("policy.yaml")
}

fn default_listen() -> String {
    "127.0.0.1:8080".to_string()
}

fn default_upstream() -> String {
    "http://127.0.0.1:5000".to_string()
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_audit_path() -> PathBuf {
    PathBuf::from("audit.jsonl")
}

fn default_user_header() -> String {
    access_gate::DEFAULT_USER_HEADER.to_string()
}

fn default_login_url() -> String {
    "/user/login".to_string()
}

// ---------------------------------------------------------------------------
// Loader
// ---------------------------------------------------------------------------

/// Load configuration from a YAML file.
///
/// A missing file yields the default configuration with a warning.
pub fn load(path: &Path) -> anyhow::Result<Config> {
    if !path.exists() {
        warn!(
            path = %path.display(),
            "configuration file not found; using defaults"
        );
        return Ok(Config::default());
    }

    let contents = std::fs::read_to_string(path)
        .map_err(|e| anyhow::anyhow!("failed to read config file {}: {e}", path.display()))?;

    let config: Config = serde_yml::from_str(&contents)
        .map_err(|e| anyhow::anyhow!("failed to parse config file {}: {e}", path.display()))?;

    Ok(config)
}
