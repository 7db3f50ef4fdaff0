//! The three admission rules.
//!
//! Each rule is a pure predicate over the request and the caller's identity.
//! Rules know nothing about HTTP responses; the engine maps a [`Verdict`] to
//! an [`Outcome`](crate::Outcome).

use crate::exemptions::LOGIN_ENDPOINT;
use crate::matcher::{first_action_match, ActionPattern, PathPatterns};
use crate::request::{IdentityDescriptor, RequestDescriptor};

/// Result of evaluating a single rule.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Verdict {
    Allow,
    Deny(DenyReason),
}

impl Verdict {
    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Why a rule denied the request.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DenyReason {
    /// Unauthenticated visitor while login is required.
    AnonymousRedirect,
    /// API action matched a restricted action pattern.
    RestrictedAction { action: String, pattern: String },
    /// Request path matched a restricted path expression.
    RestrictedPath { path: String, pattern: String },
}

/// A single admission predicate.
pub trait AdmissionRule: Send + Sync {
    /// Stable identifier used in logs and audit entries.
    fn name(&self) -> &'static str;

    fn evaluate(&self, req: &RequestDescriptor, id: &IdentityDescriptor) -> Verdict;
}

// ---------------------------------------------------------------------------
// AnonymousRedirectRule
// ---------------------------------------------------------------------------

/// Sends unauthenticated visitors to the login page when enabled.
#[derive(Debug, Clone)]
pub struct AnonymousRedirectRule {
    enabled: bool,
}

impl AnonymousRedirectRule {
    pub const NAME: &'static str = "anonymous_redirect";

    pub fn new(enabled: bool) -> Self {
        Self { enabled }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl AdmissionRule for AnonymousRedirectRule {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn evaluate(&self, req: &RequestDescriptor, id: &IdentityDescriptor) -> Verdict {
        if self.enabled && !id.is_authenticated() && req.endpoint() != Some(LOGIN_ENDPOINT) {
            Verdict::Deny(DenyReason::AnonymousRedirect)
        } else {
            Verdict::Allow
        }
    }
}

// ---------------------------------------------------------------------------
// ApiActionRestrictionRule
// ---------------------------------------------------------------------------

/// Rejects restricted API actions for everyone but super-admins.
///
/// Only applies to requests that carry an action name.
#[derive(Debug, Clone)]
pub struct ApiActionRestrictionRule {
    patterns: Vec<ActionPattern>,
}

impl ApiActionRestrictionRule {
    pub const NAME: &'static str = "api_action_restriction";

    pub fn new(patterns: Vec<ActionPattern>) -> Self {
        Self { patterns }
    }

    /// Parse configuration tokens into patterns.
    pub fn from_tokens<S: AsRef<str>>(tokens: &[S]) -> Self {
        Self::new(tokens.iter().map(|t| ActionPattern::parse(t.as_ref())).collect())
    }

    pub fn patterns(&self) -> &[ActionPattern] {
        &self.patterns
    }
}

impl AdmissionRule for ApiActionRestrictionRule {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn evaluate(&self, req: &RequestDescriptor, id: &IdentityDescriptor) -> Verdict {
        let Some(action) = req.api_action() else {
            return Verdict::Allow;
        };

        match first_action_match(action, &self.patterns) {
            Some(pattern) if !id.is_super_admin() => {
                Verdict::Deny(DenyReason::RestrictedAction {
                    action: action.to_string(),
                    pattern: pattern.to_string(),
                })
            }
            _ => Verdict::Allow,
        }
    }
}

// ---------------------------------------------------------------------------
// UiPathRestrictionRule
// ---------------------------------------------------------------------------

/// Rejects restricted UI paths for everyone but super-admins.
///
/// API action requests are left to [`ApiActionRestrictionRule`].
#[derive(Debug, Clone, Default)]
pub struct UiPathRestrictionRule {
    patterns: PathPatterns,
}

impl UiPathRestrictionRule {
    pub const NAME: &'static str = "ui_path_restriction";

    pub fn new(patterns: PathPatterns) -> Self {
        Self { patterns }
    }

    pub fn patterns(&self) -> &PathPatterns {
        &self.patterns
    }
}

impl AdmissionRule for UiPathRestrictionRule {
    fn name(&self) -> &'static str {
        Self::NAME
    }

    fn evaluate(&self, req: &RequestDescriptor, id: &IdentityDescriptor) -> Verdict {
        if req.api_action().is_some() {
            return Verdict::Allow;
        }

        match self.patterns.first_match(&req.path) {
            Some(pattern) if !id.is_authenticated() || !id.is_super_admin() => {
                Verdict::Deny(DenyReason::RestrictedPath {
                    path: req.path.clone(),
                    pattern: pattern.to_string(),
                })
            }
            _ => Verdict::Allow,
        }
    }
}
