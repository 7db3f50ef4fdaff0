//! Maps request paths onto CKAN endpoint ids and API action names.
//!
//! Only the routes the admission rules care about are recognised; every other
//! path yields a descriptor without an endpoint id.
//!
//! Paths are classified after percent-decoding, the same form CKAN routes on.

use access_policy::{RequestDescriptor, LOGIN_ENDPOINT};

/// Endpoint id of the action API dispatcher.
pub const API_ACTION_ENDPOINT: &str = "api.action";

const STATIC_PREFIXES: &[&str] = &["/base/", "/images/", "/fonts/"];

/// Builds [`RequestDescriptor`]s from request paths.
#[derive(Debug, Clone)]
pub struct EndpointResolver {
    login_path: String,
}

impl Default for EndpointResolver {
    fn default() -> Self {
        Self::new("/user/login")
    }
}

impl EndpointResolver {
    /// `login_path` is the path served by the login endpoint.
    pub fn new(login_path: impl Into<String>) -> Self {
        let login_path = login_path.into();
        let trimmed = login_path.trim_end_matches('/');
        Self {
            login_path: if trimmed.is_empty() {
                "/".to_string()
            } else {
                trimmed.to_string()
            },
        }
    }

    pub fn login_path(&self) -> &str {
        &self.login_path
    }

    pub fn describe(&self, path: &str) -> RequestDescriptor {
        let req = RequestDescriptor::new(path);

        if path.trim_end_matches('/') == self.login_path {
            return req.with_endpoint(LOGIN_ENDPOINT);
        }
        if path == "/health" {
            return req.with_endpoint("health");
        }
        if path == "/favicon.ico" || STATIC_PREFIXES.iter().any(|p| path.starts_with(p)) {
            return req.with_endpoint("static");
        }
        if path.starts_with("/webassets/") {
            return req.with_endpoint("webassets.index");
        }
        if let Some(rest) = path.strip_prefix("/api/") {
            return describe_api(req, rest);
        }

        req
    }
}

/// Percent-decode a raw request path once. `None` when the decoded bytes
/// are not UTF-8.
pub fn decode_path(raw: &str) -> Option<String> {
    urlencoding::decode(raw).ok().map(|path| path.into_owned())
}

/// `rest` is the path after `/api/`, optionally starting with a version
/// segment: `action/<name>`, `3/action/<name>`, `util/status`.
fn describe_api(req: RequestDescriptor, rest: &str) -> RequestDescriptor {
    let mut segments = rest.split('/');
    let mut head = segments.next().unwrap_or_default();
    if !head.is_empty() && head.chars().all(|c| c.is_ascii_digit()) {
        head = segments.next().unwrap_or_default();
    }

    match (head, segments.next()) {
        ("action", Some(action)) => req
            .with_endpoint(API_ACTION_ENDPOINT)
            .with_api_action(action),
        ("action", None) => req.with_endpoint(API_ACTION_ENDPOINT),
        ("util", Some("status")) => req.with_endpoint("api.status"),
        _ => req,
    }
}
