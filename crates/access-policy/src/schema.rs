use serde::{Deserialize, Deserializer, Serialize};

use crate::error::ConfigError;

/// Default status for rejected UI paths. Chosen so a restricted page is
/// indistinguishable from a missing one.
pub const DEFAULT_PATH_ERROR_CODE: u16 = 404;

/// Default body text for rejected UI paths.
pub const DEFAULT_PATH_ERROR_MESSAGE: &str = "Not found";

/// Flat option keys understood by [`PolicyConfig::from_ckan_options`].
pub mod keys {
    /// Common prefix of every option key.
    pub const PREFIX: &str = "ckan.restricted.";
    pub const API_ACTIONS: &str = "ckan.restricted.api_actions";
    pub const UI_PATHS: &str = "ckan.restricted.ui_paths";
    pub const UI_PATHS_ERROR_CODE: &str = "ckan.restricted.ui_paths.error_code";
    pub const UI_PATHS_ERROR_MESSAGE: &str = "ckan.restricted.ui_paths.error_message";
    pub const REDIRECT_ANON_TO_LOGIN: &str = "ckan.restricted.redirect_anon_to_login";
}

/// Restriction policy as written by an operator.
///
/// Pattern lists accept either a whitespace-separated string or a YAML
/// sequence of strings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PolicyConfig {
    /// Schema version; currently must be "1.0".
    pub version: String,
    /// Restricted API action names. A trailing `*` means "prefix".
    #[serde(default, deserialize_with = "token_list")]
    pub api_actions: Vec<String>,
    /// Restricted UI path regular expressions, matched at the start of the path.
    #[serde(default, deserialize_with = "token_list")]
    pub ui_paths: Vec<String>,
    /// Response used when a restricted UI path is rejected.
    #[serde(default)]
    pub ui_paths_error: PathErrorConfig,
    /// Send unauthenticated visitors to the login page.
    #[serde(default)]
    pub redirect_anon_to_login: bool,
    /// Endpoints exempt from every rule, in addition to the built-in set.
    #[serde(default)]
    pub exempt_endpoints: Vec<String>,
}

impl Default for PolicyConfig {
    fn default() -> Self {
        Self {
            version: "1.0".to_string(),
            api_actions: Vec::new(),
            ui_paths: Vec::new(),
            ui_paths_error: PathErrorConfig::default(),
            redirect_anon_to_login: false,
            exempt_endpoints: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct PathErrorConfig {
    #[serde(default = "default_error_code")]
    pub code: u16,
    #[serde(default)]
    pub message: Option<String>,
}

impl Default for PathErrorConfig {
    fn default() -> Self {
        Self {
            code: default_error_code(),
            message: None,
        }
    }
}

impl PathErrorConfig {
    /// Configured message, or the generic default.
    pub fn message_or_default(&self) -> &str {
        self.message.as_deref().unwrap_or(DEFAULT_PATH_ERROR_MESSAGE)
    }
}

fn default_error_code() -> u16 {
    DEFAULT_PATH_ERROR_CODE
}

impl PolicyConfig {
    /// Structural checks that do not require compiling patterns.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.version != "1.0" {
            return Err(ConfigError::UnsupportedVersion(self.version.clone()));
        }
        if !(400..=599).contains(&self.ui_paths_error.code) {
            return Err(ConfigError::InvalidStatusCode(self.ui_paths_error.code));
        }
        Ok(())
    }

    /// Build a policy from flat `ckan.restricted.*` options, as found in a
    /// CKAN ini file. Unknown keys are ignored.
    pub fn from_ckan_options<I, K, V>(options: I) -> Result<Self, ConfigError>
    where
        I: IntoIterator<Item = (K, V)>,
        K: AsRef<str>,
        V: AsRef<str>,
    {
        let mut config = Self::default();

        for (key, value) in options {
            let (key, value) = (key.as_ref(), value.as_ref());
            match key {
                keys::API_ACTIONS => config.api_actions = split_tokens(value),
                keys::UI_PATHS => config.ui_paths = split_tokens(value),
                keys::UI_PATHS_ERROR_CODE => config.ui_paths_error.code = parse_int(key, value)?,
                keys::UI_PATHS_ERROR_MESSAGE => {
                    config.ui_paths_error.message = Some(value.to_string())
                }
                keys::REDIRECT_ANON_TO_LOGIN => {
                    config.redirect_anon_to_login = parse_bool(key, value)?
                }
                _ => {}
            }
        }

        config.validate()?;
        Ok(config)
    }
}

// ---------------------------------------------------------------------------
// Value parsing
// ---------------------------------------------------------------------------

fn split_tokens(value: &str) -> Vec<String> {
    value.split_whitespace().map(str::to_string).collect()
}

fn parse_int(key: &str, value: &str) -> Result<u16, ConfigError> {
    value.trim().parse().map_err(|_| ConfigError::InvalidInt {
        key: key.to_string(),
        value: value.to_string(),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "true" | "yes" | "on" | "y" | "t" | "1" => Ok(true),
        "false" | "no" | "off" | "n" | "f" | "0" => Ok(false),
        _ => Err(ConfigError::InvalidBool {
            key: key.to_string(),
            value: value.to_string(),
        }),
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum TokenList {
    Joined(String),
    Items(Vec<String>),
}

fn token_list<'de, D>(deserializer: D) -> Result<Vec<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(match Option::<TokenList>::deserialize(deserializer)? {
        None => Vec::new(),
        Some(TokenList::Joined(s)) => split_tokens(&s),
        Some(TokenList::Items(items)) => items
            .iter()
            .flat_map(|item| item.split_whitespace())
            .map(str::to_string)
            .collect(),
    })
}
