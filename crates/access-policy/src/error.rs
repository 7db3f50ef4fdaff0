use thiserror::Error;

/// Errors raised while turning configuration into a usable rule set.
///
/// All of these are fatal at startup: a process must not serve traffic with
/// a policy that failed to compile.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid restricted path pattern '{pattern}': {source}")]
    InvalidPathPattern {
        pattern: String,
        #[source]
        source: Box<fancy_regex::Error>,
    },

    #[error("restricted path status code {0} is not a 4xx or 5xx code")]
    InvalidStatusCode(u16),

    #[error("option '{key}' expects a boolean, got '{value}'")]
    InvalidBool { key: String, value: String },

    #[error("option '{key}' expects an integer, got '{value}'")]
    InvalidInt { key: String, value: String },

    #[error("unsupported policy version '{0}'; only '1.0' is supported")]
    UnsupportedVersion(String),
}
