//! Per-request inputs to the engine. Both values are built once at the HTTP
//! boundary and never mutated afterwards.

/// What is being requested.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDescriptor {
    /// Request path, without query string.
    pub path: String,
    /// Framework route identifier (e.g. `user.login`), when one was resolved.
    pub endpoint: Option<String>,
    /// API action name for action-dispatch routes; `None` for UI requests.
    pub api_action: Option<String>,
}

impl RequestDescriptor {
    pub fn new(path: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            endpoint: None,
            api_action: None,
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = Some(endpoint.into());
        self
    }

    /// Attach an API action name. An empty name is treated as no action.
    pub fn with_api_action(mut self, action: impl Into<String>) -> Self {
        let action = action.into();
        self.api_action = if action.is_empty() { None } else { Some(action) };
        self
    }

    pub fn endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    pub fn api_action(&self) -> Option<&str> {
        self.api_action.as_deref()
    }
}

/// Who is asking, as resolved by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IdentityDescriptor {
    Anonymous,
    User { username: String, super_admin: bool },
}

impl IdentityDescriptor {
    /// A regular authenticated user.
    pub fn user(username: impl Into<String>) -> Self {
        Self::User {
            username: username.into(),
            super_admin: false,
        }
    }

    /// An authenticated super-administrator.
    pub fn super_admin(username: impl Into<String>) -> Self {
        Self::User {
            username: username.into(),
            super_admin: true,
        }
    }

    pub fn is_authenticated(&self) -> bool {
        matches!(self, Self::User { .. })
    }

    pub fn is_super_admin(&self) -> bool {
        matches!(self, Self::User { super_admin: true, .. })
    }

    pub fn username(&self) -> Option<&str> {
        match self {
            Self::Anonymous => None,
            Self::User { username, .. } => Some(username),
        }
    }

    /// Username for log lines; `"anonymous"` when unauthenticated.
    pub fn display_name(&self) -> &str {
        self.username().unwrap_or("anonymous")
    }
}
