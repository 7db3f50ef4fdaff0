use std::collections::HashSet;

/// Endpoint id of the login page. Always exempt, so redirecting anonymous
/// visitors there cannot loop.
pub const LOGIN_ENDPOINT: &str = "user.login";

/// Endpoints that bypass every rule.
pub const BUILTIN_EXEMPT_ENDPOINTS: &[&str] = &[
    LOGIN_ENDPOINT,
    "static",
    "webassets.index",
    "health",
    "api.status",
];

/// Set of endpoint ids that always resolve to `Allow`.
///
/// The built-in entries cannot be removed; operators may only add to them.
#[derive(Debug, Clone)]
pub struct ExemptionRegistry {
    endpoints: HashSet<String>,
}

impl ExemptionRegistry {
    pub fn builtin() -> Self {
        Self {
            endpoints: BUILTIN_EXEMPT_ENDPOINTS
                .iter()
                .map(|e| e.to_string())
                .collect(),
        }
    }

    /// Built-in set plus `extra`.
    pub fn with_extra<I, S>(extra: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let mut registry = Self::builtin();
        registry.endpoints.extend(extra.into_iter().map(Into::into));
        registry
    }

    pub fn contains(&self, endpoint: &str) -> bool {
        self.endpoints.contains(endpoint)
    }

    /// `true` when `endpoint` is present and exempt.
    pub fn is_exempt(&self, endpoint: Option<&str>) -> bool {
        endpoint.is_some_and(|e| self.contains(e))
    }

    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }
}

impl Default for ExemptionRegistry {
    fn default() -> Self {
        Self::builtin()
    }
}
