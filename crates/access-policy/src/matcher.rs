//! Pure matching primitives used by the restriction rules.
//!
//! Two kinds of pattern exist:
//!
//! * **Action patterns** compare an API action name literally, or by prefix
//!   when the pattern ends in `*`.
//! * **Path patterns** are regular expressions that must match starting at
//!   the first byte of the request path. Trailing content after the match is
//!   permitted, so `^/user/` restricts every path below `/user/`. Lookaround
//!   is supported, e.g. `(?!.*login)^/user/` restricts `/user/*` except login.

use std::fmt;

use fancy_regex::Regex;

use crate::error::ConfigError;

// ---------------------------------------------------------------------------
// Action patterns
// ---------------------------------------------------------------------------

/// A single restricted API action entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionPattern {
    /// Matches only the identical action name.
    Exact(String),
    /// Matches any action name starting with the stored prefix.
    Prefix(String),
}

impl ActionPattern {
    /// Parse a configuration token. Trailing `*` characters turn the token
    /// into a prefix pattern; a lone `*` matches every action.
    pub fn parse(token: &str) -> Self {
        if token.ends_with('*') {
            Self::Prefix(token.trim_end_matches('*').to_string())
        } else {
            Self::Exact(token.to_string())
        }
    }

    /// Whether `candidate` is covered by this pattern.
    pub fn matches(&self, candidate: &str) -> bool {
        match self {
            Self::Exact(name) => candidate == name,
            Self::Prefix(prefix) => candidate.starts_with(prefix.as_str()),
        }
    }
}

impl fmt::Display for ActionPattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Exact(name) => write!(f, "{name}"),
            Self::Prefix(prefix) => write!(f, "{prefix}*"),
        }
    }
}

/// Returns `true` iff any pattern in `patterns` matches `candidate`.
///
/// An empty list restricts nothing.
pub fn match_action(candidate: &str, patterns: &[ActionPattern]) -> bool {
    patterns.iter().any(|p| p.matches(candidate))
}

/// Like [`match_action`] but returns the first pattern that matched.
pub fn first_action_match<'a>(
    candidate: &str,
    patterns: &'a [ActionPattern],
) -> Option<&'a ActionPattern> {
    patterns.iter().find(|p| p.matches(candidate))
}

// ---------------------------------------------------------------------------
// Path patterns
// ---------------------------------------------------------------------------

/// Compiled restricted-path expressions.
///
/// Each source expression is wrapped as `\A(?:<source>)` so a match can only
/// begin at byte 0 of the path. The sources are kept in the same order for
/// reporting.
#[derive(Debug, Clone, Default)]
pub struct PathPatterns {
    compiled: Vec<Regex>,
    sources: Vec<String>,
}

impl PathPatterns {
    /// Compile every expression, failing on the first invalid one.
    pub fn compile<S: AsRef<str>>(sources: &[S]) -> Result<Self, ConfigError> {
        let mut compiled = Vec::with_capacity(sources.len());
        for source in sources {
            let source = source.as_ref();
            let regex = Regex::new(&anchor(source)).map_err(|e| {
                ConfigError::InvalidPathPattern {
                    pattern: source.to_string(),
                    source: Box::new(e),
                }
            })?;
            compiled.push(regex);
        }

        Ok(Self {
            compiled,
            sources: sources.iter().map(|s| s.as_ref().to_string()).collect(),
        })
    }

    /// An empty pattern list that never matches.
    pub fn empty() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.sources.len()
    }

    pub fn is_empty(&self) -> bool {
        self.sources.is_empty()
    }

    /// The original, unwrapped expressions in configuration order.
    pub fn sources(&self) -> &[String] {
        &self.sources
    }

    /// Source of the first (in configuration order) expression matching a
    /// prefix of `path`.
    ///
    /// An expression that hits the backtracking limit counts as a match, so
    /// a pathological path is restricted rather than let through.
    pub fn first_match(&self, path: &str) -> Option<&str> {
        self.compiled
            .iter()
            .zip(&self.sources)
            .find(|(regex, source)| match regex.is_match(path) {
                Ok(matched) => matched,
                Err(err) => {
                    tracing::warn!(pattern = %source, %err, "path pattern failed to run");
                    true
                }
            })
            .map(|(_, source)| source.as_str())
    }
}

/// Returns `true` iff any expression matches `path` starting at index 0.
pub fn match_path(path: &str, patterns: &PathPatterns) -> bool {
    patterns.first_match(path).is_some()
}

fn anchor(source: &str) -> String {
    format!(r"\A(?:{source})")
}
