//! The admission middleware: builds descriptors from the HTTP request, asks
//! the engine, and turns the outcome into a response.

use std::net::SocketAddr;
use std::sync::Arc;

use access_policy::{Denial, Outcome, RejectBody, SharedEngine, LOGIN_ENDPOINT};
use audit_log::{AuditEntry, AuditEventType, AuditSink, AuditSource, DenialRecord};
use axum::extract::{ConnectInfo, Request, State};
use axum::middleware::Next;
use axum::response::{Html, IntoResponse, Response};
use axum::Json;
use http::{header, StatusCode};

use crate::endpoint::{decode_path, EndpointResolver};
use crate::identity::IdentityResolver;

/// Everything the middleware needs, shared across requests.
#[derive(Clone)]
pub struct GateState {
    pub engine: SharedEngine,
    pub endpoints: Arc<EndpointResolver>,
    pub identities: Arc<dyn IdentityResolver>,
    pub audit: Option<AuditSink>,
}

impl GateState {
    pub fn new(
        engine: SharedEngine,
        endpoints: EndpointResolver,
        identities: Arc<dyn IdentityResolver>,
    ) -> Self {
        Self {
            engine,
            endpoints: Arc::new(endpoints),
            identities,
            audit: None,
        }
    }

    pub fn with_audit(mut self, audit: AuditSink) -> Self {
        self.audit = Some(audit);
        self
    }

    /// Fire-and-forget audit record for a denial.
    fn record(&self, denial: &Denial, req: &Request) {
        let Some(audit) = &self.audit else {
            return;
        };
        let Some(event_type) = AuditEventType::for_rule(denial.rule) else {
            return;
        };

        let source = AuditSource {
            component: "access-gate".to_string(),
            remote_addr: req
                .extensions()
                .get::<ConnectInfo<SocketAddr>>()
                .map(|ConnectInfo(addr)| addr.to_string()),
            method: Some(req.method().to_string()),
            path: Some(req.uri().path().to_string()),
        };
        let record = DenialRecord {
            rule: denial.rule.to_string(),
            subject: denial.subject.clone(),
            username: denial.username.clone(),
            pattern: denial.pattern.clone(),
        };
        let details = serde_json::json!({ "rule": denial.rule });
        audit.try_log(AuditEntry::new(event_type, source, details).with_denial(record));
    }
}

/// Axum middleware; mount with [`axum::middleware::from_fn_with_state`].
///
/// The path is percent-decoded before classification; the request is relayed
/// with its original encoding. Paths that do not decode to UTF-8 get `400`.
pub async fn admission(State(state): State<GateState>, req: Request, next: Next) -> Response {
    let Some(path) = decode_path(req.uri().path()) else {
        tracing::info!(path = %req.uri().path(), "rejecting undecodable request path");
        return (StatusCode::BAD_REQUEST, "Bad Request").into_response();
    };
    let descriptor = state.endpoints.describe(&path);
    let identity = state.identities.resolve(req.headers());

    let decision = state.engine.current().evaluate(&descriptor, &identity);

    if let Some(denial) = &decision.denial {
        state.record(denial, &req);
    }

    match decision.outcome {
        Outcome::Allow => next.run(req).await,
        Outcome::RedirectTo { endpoint } => {
            redirect_to_login(&endpoint, state.endpoints.login_path(), &req)
        }
        Outcome::Reject { status, body } => reject(status, body),
    }
}

/// `302 Found` to the login page, remembering where the visitor was going.
fn redirect_to_login(endpoint: &str, login_path: &str, req: &Request) -> Response {
    if endpoint != LOGIN_ENDPOINT {
        tracing::warn!(%endpoint, "no route for redirect endpoint; using login");
    }
    let came_from = req
        .uri()
        .path_and_query()
        .map(|pq| pq.as_str())
        .unwrap_or("/");
    let location = format!("{login_path}?came_from={}", urlencoding::encode(came_from));
    (StatusCode::FOUND, [(header::LOCATION, location)]).into_response()
}

fn reject(status: u16, body: RejectBody) -> Response {
    let status = StatusCode::from_u16(status).unwrap_or(StatusCode::NOT_FOUND);
    match body {
        RejectBody::Json(value) => (status, Json(value)).into_response(),
        RejectBody::Text(message) => (status, Html(error_page(status, &message))).into_response(),
    }
}

fn error_page(status: StatusCode, message: &str) -> String {
    let title = format!(
        "{} {}",
        status.as_u16(),
        status.canonical_reason().unwrap_or("Error")
    );
    format!(
        "<!DOCTYPE html>\n<html><head><title>{title}</title></head>\
         <body><h1>{title}</h1><p>{}</p></body></html>\n",
        escape_html(message)
    )
}

fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for ch in s.chars() {
        match ch {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#x27;"),
            _ => out.push(ch),
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use access_policy::{loader::load_policy_from_str, PolicyEngine};
    use axum::body::Body;
    use axum::Router;
    use http_body_util::BodyExt;
    use tower::ServiceExt;

    use super::*;
    use crate::identity::TrustedHeaderResolver;

    fn state(yaml: &str) -> GateState {
        let engine = PolicyEngine::new(load_policy_from_str(yaml).unwrap()).unwrap();
        let identities = TrustedHeaderResolver::new("x-remote-user", ["sysadmin"]).unwrap();
        GateState::new(
            SharedEngine::new(engine),
            EndpointResolver::default(),
            Arc::new(identities),
        )
    }

    fn app(state: GateState) -> Router {
        Router::new()
            .fallback(|| async { "upstream page" })
            .layer(axum::middleware::from_fn_with_state(state, admission))
    }

    async fn get(
        app: &Router,
        uri: &str,
        user: Option<&str>,
    ) -> (StatusCode, Option<String>, String) {
        let mut builder = http::Request::builder().uri(uri);
        if let Some(user) = user {
            builder = builder.header("x-remote-user", user);
        }
        let resp = app
            .clone()
            .oneshot(builder.body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = resp.status();
        let location = resp
            .headers()
            .get(http::header::LOCATION)
            .map(|v| v.to_str().unwrap().to_string());
        let body = resp.into_body().collect().await.unwrap().to_bytes();
        (status, location, String::from_utf8(body.to_vec()).unwrap())
    }

    #[tokio::test]
    async fn restricted_path_returns_not_found_page() {
        let app = app(state("version: \"1.0\"\nui_paths: \"^/user/default$\"\n"));

        let (status, _, body) = get(&app, "/user/default", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert!(body.contains("404 Not Found"), "{body}");
        assert!(!body.contains("upstream page"));

        let (status, _, _) = get(&app, "/user/default", Some("requester")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);

        let (status, _, body) = get(&app, "/user/default", Some("sysadmin")).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, "upstream page");

        let (status, _, _) = get(&app, "/user/test_user", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn restricted_action_returns_invalid_request_json() {
        let app = app(state("version: \"1.0\"\napi_actions: status_show\n"));

        for user in [None, Some("regular")] {
            let (status, _, body) = get(&app, "/api/action/status_show", user).await;
            assert_eq!(status, StatusCode::BAD_REQUEST);
            let json: serde_json::Value = serde_json::from_str(&body).unwrap();
            assert_eq!(
                json,
                serde_json::json!({"success": false, "error": {"message": "Invalid request"}})
            );
        }

        let (status, _, _) = get(&app, "/api/3/action/package_search", Some("regular")).await;
        assert_eq!(status, StatusCode::OK);

        let (status, _, _) = get(&app, "/api/action/status_show", Some("sysadmin")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn percent_encoded_action_is_still_restricted() {
        let app = app(state("version: \"1.0\"\napi_actions: status_show\n"));

        for uri in ["/api/action/status%5Fshow", "/api/3/action/%73tatus_show"] {
            let (status, _, body) = get(&app, uri, Some("regular")).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{uri}");
            assert!(body.contains("Invalid request"), "{uri}: {body}");
        }
    }

    #[tokio::test]
    async fn percent_encoded_path_is_still_restricted() {
        let app = app(state("version: \"1.0\"\nui_paths: \"^/user/default$\"\n"));

        let (status, _, _) = get(&app, "/user/%64efault", Some("regular")).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        let (status, _, _) = get(&app, "/user/%64efault", Some("sysadmin")).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn undecodable_path_is_bad_request() {
        let app = app(state("version: \"1.0\"\n"));
        let (status, _, body) = get(&app, "/dataset/%ff%fe", None).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(!body.contains("upstream page"));
    }

    #[tokio::test]
    async fn wildcard_actions_for_anonymous() {
        let app = app(state(
            "version: \"1.0\"\napi_actions: \"package_* vocabulary_list resource_*\"\n",
        ));
        for action in ["package_search", "package_show", "vocabulary_list", "resource_view_show"] {
            let (status, _, _) = get(&app, &format!("/api/action/{action}"), None).await;
            assert_eq!(status, StatusCode::BAD_REQUEST, "{action}");
        }
        let (status, _, _) = get(&app, "/api/action/group_list", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn anonymous_redirected_to_login() {
        let app = app(state("version: \"1.0\"\nredirect_anon_to_login: true\n"));

        let (status, location, _) = get(&app, "/dataset?q=water", None).await;
        assert_eq!(status, StatusCode::FOUND);
        let location = location.expect("redirect must carry a location");
        assert!(location.starts_with("/user/login?came_from="), "{location}");
        assert!(location.contains("%2Fdataset%3Fq%3Dwater"), "{location}");

        let (status, location, _) = get(&app, "/dataset", Some("regular")).await;
        assert_eq!(status, StatusCode::OK);
        assert!(location.is_none());

        let (status, _, _) = get(&app, "/user/login", None).await;
        assert_eq!(status, StatusCode::OK);
    }

    #[tokio::test]
    async fn anonymous_not_redirected_when_disabled() {
        let app = app(state("version: \"1.0\"\n"));
        let (status, location, _) = get(&app, "/dataset", None).await;
        assert_eq!(status, StatusCode::OK);
        assert!(location.is_none());
    }

    #[tokio::test]
    async fn configured_message_is_escaped() {
        let app = app(state(
            r#"
version: "1.0"
ui_paths: "/organization/"
ui_paths_error:
  code: 403
  message: "<b>nope</b>"
"#,
        ));
        let (status, _, body) = get(&app, "/organization/acme", None).await;
        assert_eq!(status, StatusCode::FORBIDDEN);
        assert!(body.contains("&lt;b&gt;nope&lt;/b&gt;"), "{body}");
        assert!(body.contains("403 Forbidden"));
    }

    #[tokio::test]
    async fn reloaded_policy_applies_to_next_request() {
        let state = state("version: \"1.0\"\n");
        let engine = state.engine.clone();
        let app = app(state);

        let (status, _, _) = get(&app, "/user/default", None).await;
        assert_eq!(status, StatusCode::OK);

        let policy = load_policy_from_str("version: \"1.0\"\nui_paths: \"/user/\"\n").unwrap();
        engine.replace(PolicyEngine::new(policy).unwrap());
        let (status, _, _) = get(&app, "/user/default", None).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }

    #[tokio::test]
    async fn denials_are_audited() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("audit.jsonl");
        let (sink, handle) = AuditSink::start(&path).await.unwrap();

        let app = app(state("version: \"1.0\"\napi_actions: status_show\n").with_audit(sink));
        get(&app, "/api/action/status_show", Some("regular")).await;
        get(&app, "/api/action/package_search", Some("regular")).await;
        drop(app);
        handle.await.unwrap();

        let contents = std::fs::read_to_string(&path).unwrap();
        let entries: Vec<AuditEntry> = contents
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(entries.len(), 1);
        assert_eq!(entries[0].event_type, AuditEventType::ActionRejected);
        let denial = entries[0].denial.as_ref().unwrap();
        assert_eq!(denial.subject, "status_show");
        assert_eq!(denial.username, "regular");
        assert_eq!(entries[0].source.path.as_deref(), Some("/api/action/status_show"));
    }

    #[test]
    fn escape_html_covers_markup() {
        assert_eq!(escape_html(r#"<a href="x">&'"#), "&lt;a href=&quot;x&quot;&gt;&amp;&#x27;");
    }
}
