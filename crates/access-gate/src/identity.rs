use std::collections::HashSet;

use access_policy::IdentityDescriptor;
use http::header::{HeaderMap, HeaderName, InvalidHeaderName};

/// Default header carrying the authenticated username.
pub const DEFAULT_USER_HEADER: &str = "x-remote-user";

/// Resolves who is making a request.
///
/// Authentication happens elsewhere; implementations only read its result.
pub trait IdentityResolver: Send + Sync {
    fn resolve(&self, headers: &HeaderMap) -> IdentityDescriptor;
}

/// Reads the username from a header set by a trusted authenticating proxy.
///
/// Super-admins are the configured set of usernames. A missing, empty or
/// non-UTF-8 header means anonymous.
#[derive(Debug, Clone)]
pub struct TrustedHeaderResolver {
    header: HeaderName,
    sysadmins: HashSet<String>,
}

impl TrustedHeaderResolver {
    pub fn new<I, S>(header: &str, sysadmins: I) -> Result<Self, InvalidHeaderName>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Ok(Self {
            header: HeaderName::from_bytes(header.as_bytes())?,
            sysadmins: sysadmins.into_iter().map(Into::into).collect(),
        })
    }

    pub fn header(&self) -> &HeaderName {
        &self.header
    }
}

impl IdentityResolver for TrustedHeaderResolver {
    fn resolve(&self, headers: &HeaderMap) -> IdentityDescriptor {
        let username = headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|s| !s.is_empty());

        match username {
            None => IdentityDescriptor::Anonymous,
            Some(name) => IdentityDescriptor::User {
                username: name.to_string(),
                super_admin: self.sysadmins.contains(name),
            },
        }
    }
}
