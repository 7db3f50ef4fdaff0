use tracing::{debug, info};

use crate::decision::{Decision, Denial, Outcome, RejectBody};
use crate::error::ConfigError;
use crate::exemptions::{ExemptionRegistry, LOGIN_ENDPOINT};
use crate::matcher::PathPatterns;
use crate::request::{IdentityDescriptor, RequestDescriptor};
use crate::rules::{
    AdmissionRule, AnonymousRedirectRule, ApiActionRestrictionRule, DenyReason,
    UiPathRestrictionRule, Verdict,
};
use crate::schema::PolicyConfig;

// ---------------------------------------------------------------------------
// PolicyEngine
// ---------------------------------------------------------------------------

/// The admission decision engine.
///
/// Construct via [`PolicyEngine::new`], which compiles every pattern up front
/// so that evaluation cannot fail. The engine holds no per-request state and
/// can be shared across threads behind an `Arc`.
pub struct PolicyEngine {
    config: PolicyConfig,
    exemptions: ExemptionRegistry,
    anonymous: AnonymousRedirectRule,
    actions: ApiActionRestrictionRule,
    paths: UiPathRestrictionRule,
}

impl std::fmt::Debug for PolicyEngine {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PolicyEngine")
            .field("version", &self.config.version)
            .field("redirect_anon_to_login", &self.anonymous.is_enabled())
            .field("num_action_patterns", &self.actions.patterns().len())
            .field("num_path_patterns", &self.paths.patterns().len())
            .field("num_exemptions", &self.exemptions.len())
            .finish()
    }
}

impl PolicyEngine {
    /// Create a new engine from a [`PolicyConfig`].
    ///
    /// Returns an error if the config is structurally invalid or any path
    /// expression fails to compile.
    pub fn new(config: PolicyConfig) -> Result<Self, ConfigError> {
        config.validate()?;

        let paths = PathPatterns::compile(&config.ui_paths)?;
        let actions = ApiActionRestrictionRule::from_tokens(&config.api_actions);
        let exemptions = ExemptionRegistry::with_extra(config.exempt_endpoints.iter().cloned());

        Ok(Self {
            anonymous: AnonymousRedirectRule::new(config.redirect_anon_to_login),
            actions,
            paths: UiPathRestrictionRule::new(paths),
            exemptions,
            config,
        })
    }

    /// Return a reference to the underlying config.
    pub fn config(&self) -> &PolicyConfig {
        &self.config
    }

    pub fn exemptions(&self) -> &ExemptionRegistry {
        &self.exemptions
    }

    /// Decide a request, returning only the outcome.
    pub fn decide(&self, req: &RequestDescriptor, id: &IdentityDescriptor) -> Outcome {
        self.evaluate(req, id).outcome
    }

    /// Decide a request.
    ///
    /// Order: exemptions, anonymous redirect, API action restriction, UI path
    /// restriction. The first denial is terminal.
    pub fn evaluate(&self, req: &RequestDescriptor, id: &IdentityDescriptor) -> Decision {
        if self.exemptions.is_exempt(req.endpoint()) {
            debug!(endpoint = req.endpoint(), "exempt endpoint");
            return Decision::allow();
        }

        let rules: [&dyn AdmissionRule; 3] = [&self.anonymous, &self.actions, &self.paths];

        for rule in rules {
            if let Verdict::Deny(reason) = rule.evaluate(req, id) {
                let decision = self.decision_from_denial(rule.name(), reason, req, id);
                if let Some(denial) = &decision.denial {
                    report(denial);
                }
                return decision;
            }
        }

        Decision::allow()
    }

    // -- Helpers --------------------------------------------------------------

    fn decision_from_denial(
        &self,
        rule: &'static str,
        reason: DenyReason,
        req: &RequestDescriptor,
        id: &IdentityDescriptor,
    ) -> Decision {
        let username = id.display_name().to_string();

        let (outcome, subject, pattern) = match reason {
            DenyReason::AnonymousRedirect => (
                Outcome::RedirectTo {
                    endpoint: LOGIN_ENDPOINT.to_string(),
                },
                req.path.clone(),
                None,
            ),
            DenyReason::RestrictedAction { action, pattern } => {
                (Outcome::invalid_request(), action, Some(pattern))
            }
            DenyReason::RestrictedPath { path, pattern } => (
                Outcome::Reject {
                    status: self.config.ui_paths_error.code,
                    body: RejectBody::Text(
                        self.config.ui_paths_error.message_or_default().to_string(),
                    ),
                },
                path,
                Some(pattern),
            ),
        };

        Decision {
            outcome,
            denial: Some(Denial {
                rule,
                subject,
                username,
                pattern,
            }),
        }
    }
}

fn report(denial: &Denial) {
    info!(
        rule = denial.rule,
        subject = %denial.subject,
        user = %denial.username,
        pattern = denial.pattern.as_deref(),
        "request denied"
    );
}

// ---------------------------------------------------------------------------
// Tests
// ---------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use crate::loader::load_policy_from_str;

    fn engine_from_yaml(yaml: &str) -> PolicyEngine {
        let config = load_policy_from_str(yaml).expect("test YAML should parse");
        PolicyEngine::new(config).expect("engine construction should succeed")
    }

    fn api(action: &str) -> RequestDescriptor {
        RequestDescriptor::new(format!("/api/action/{action}"))
            .with_endpoint("api.action")
            .with_api_action(action)
    }

    fn not_found() -> Outcome {
        Outcome::Reject {
            status: 404,
            body: RejectBody::Text("Not found".into()),
        }
    }

    // -- Scenario A: restricted path --

    #[test]
    fn restricted_path_rejects_anonymous_allows_super_admin() {
        let engine = engine_from_yaml(
            r#"
version: "1.0"
ui_paths: "^/user/default$"
"#,
        );
        let req = RequestDescriptor::new("/user/default").with_endpoint("user.read");

        assert_eq!(engine.decide(&req, &IdentityDescriptor::Anonymous), not_found());
        assert_eq!(
            engine.decide(&req, &IdentityDescriptor::user("requester")),
            not_found()
        );
        assert_eq!(
            engine.decide(&req, &IdentityDescriptor::super_admin("admin")),
            Outcome::Allow
        );

        let other = RequestDescriptor::new("/user/test_user").with_endpoint("user.read");
        assert_eq!(engine.decide(&other, &IdentityDescriptor::Anonymous), Outcome::Allow);
    }

    #[test]
    fn restricted_path_uses_configured_code_and_message() {
        let engine = engine_from_yaml(
            r#"
version: "1.0"
ui_paths: "/organization/"
ui_paths_error:
  code: 410
  message: "Gone"
"#,
        );
        assert_eq!(
            engine.decide(
                &RequestDescriptor::new("/organization/acme"),
                &IdentityDescriptor::Anonymous
            ),
            Outcome::Reject {
                status: 410,
                body: RejectBody::Text("Gone".into()),
            }
        );
    }

    // -- Scenario B: single restricted action --

    #[test]
    fn restricted_action_rejects_regular_user() {
        let engine = engine_from_yaml(
            r#"
version: "1.0"
api_actions: status_show
"#,
        );
        let user = IdentityDescriptor::user("bob");

        assert_eq!(engine.decide(&api("status_show"), &user), Outcome::invalid_request());
        assert_eq!(engine.decide(&api("package_search"), &user), Outcome::Allow);
        assert_eq!(
            engine.decide(&api("status_show"), &IdentityDescriptor::Anonymous),
            Outcome::invalid_request()
        );
        assert_eq!(
            engine.decide(&api("status_show"), &IdentityDescriptor::super_admin("root")),
            Outcome::Allow
        );
    }

    // -- Scenario C: wildcard actions --

    #[test]
    fn wildcard_actions_for_anonymous() {
        let engine = engine_from_yaml(
            r#"
version: "1.0"
api_actions: "package_* vocabulary_list resource_*"
"#,
        );
        let anon = IdentityDescriptor::Anonymous;

        for action in [
            "package_search",
            "package_show",
            "vocabulary_list",
            "resource_show",
            "resource_view_show",
        ] {
            assert_eq!(
                engine.decide(&api(action), &anon),
                Outcome::invalid_request(),
                "{action}"
            );
        }
        assert_eq!(engine.decide(&api("group_list"), &anon), Outcome::Allow);
    }

    #[test]
    fn wildcard_actions_for_super_admin() {
        let engine = engine_from_yaml(
            r#"
version: "1.0"
api_actions: "package_* vocabulary_list user_*"
"#,
        );
        let admin = IdentityDescriptor::super_admin("root");
        for action in ["package_search", "vocabulary_list", "user_list"] {
            assert_eq!(engine.decide(&api(action), &admin), Outcome::Allow, "{action}");
        }
    }

    // -- Scenario D: anonymous redirect --

    #[test]
    fn anonymous_redirected_when_enabled() {
        let engine = engine_from_yaml(
            r#"
version: "1.0"
redirect_anon_to_login: true
"#,
        );
        let req = RequestDescriptor::new("/dataset").with_endpoint("dataset.search");

        assert_eq!(
            engine.decide(&req, &IdentityDescriptor::Anonymous),
            Outcome::RedirectTo {
                endpoint: "user.login".into()
            }
        );
        assert_eq!(
            engine.decide(&req, &IdentityDescriptor::user("bob")),
            Outcome::Allow
        );
    }

    #[test]
    fn anonymous_not_redirected_when_disabled() {
        let engine = engine_from_yaml("version: \"1.0\"\n");
        let req = RequestDescriptor::new("/dataset").with_endpoint("dataset.search");
        assert_eq!(engine.decide(&req, &IdentityDescriptor::Anonymous), Outcome::Allow);
    }

    #[test]
    fn login_page_is_reachable_for_anonymous() {
        let engine = engine_from_yaml(
            r#"
version: "1.0"
redirect_anon_to_login: true
ui_paths: "/user/"
"#,
        );
        let req = RequestDescriptor::new("/user/login").with_endpoint("user.login");
        assert_eq!(engine.decide(&req, &IdentityDescriptor::Anonymous), Outcome::Allow);
    }

    // -- Precedence --

    #[test]
    fn redirect_takes_precedence_over_restrictions() {
        let engine = engine_from_yaml(
            r#"
version: "1.0"
redirect_anon_to_login: true
api_actions: "*"
ui_paths: "/"
"#,
        );
        let redirect = Outcome::RedirectTo {
            endpoint: "user.login".into(),
        };
        assert_eq!(engine.decide(&api("status_show"), &IdentityDescriptor::Anonymous), redirect);
        assert_eq!(
            engine.decide(&RequestDescriptor::new("/dataset"), &IdentityDescriptor::Anonymous),
            redirect
        );
    }

    #[test]
    fn action_rule_precedes_path_rule() {
        let engine = engine_from_yaml(
            r#"
version: "1.0"
api_actions: status_show
ui_paths: "/api/"
"#,
        );
        let d = engine.evaluate(&api("status_show"), &IdentityDescriptor::user("bob"));
        assert_eq!(d.outcome, Outcome::invalid_request());
        assert_eq!(d.denial.unwrap().rule, "api_action_restriction");
    }

    #[test]
    fn exemptions_override_everything() {
        let engine = engine_from_yaml(
            r#"
version: "1.0"
redirect_anon_to_login: true
ui_paths: "/"
exempt_endpoints: ["dataset.search"]
"#,
        );
        for (path, endpoint) in [
            ("/base/main.css", "static"),
            ("/webassets/app.js", "webassets.index"),
            ("/health", "health"),
            ("/dataset", "dataset.search"),
        ] {
            let req = RequestDescriptor::new(path).with_endpoint(endpoint);
            assert_eq!(
                engine.decide(&req, &IdentityDescriptor::Anonymous),
                Outcome::Allow,
                "{endpoint}"
            );
        }
    }

    // -- Properties --

    #[test]
    fn super_admin_always_passes_restrictions() {
        let engine = engine_from_yaml(
            r#"
version: "1.0"
api_actions: "*"
ui_paths: ".*"
"#,
        );
        let admin = IdentityDescriptor::super_admin("root");
        assert_eq!(engine.decide(&api("anything"), &admin), Outcome::Allow);
        assert_eq!(
            engine.decide(&RequestDescriptor::new("/any/path"), &admin),
            Outcome::Allow
        );
    }

    #[test]
    fn evaluation_is_idempotent() {
        let engine = engine_from_yaml(
            r#"
version: "1.0"
api_actions: "package_*"
ui_paths: "^/user/"
"#,
        );
        let cases = [
            (api("package_show"), IdentityDescriptor::Anonymous),
            (RequestDescriptor::new("/user/x"), IdentityDescriptor::user("bob")),
            (RequestDescriptor::new("/dataset"), IdentityDescriptor::Anonymous),
        ];
        for (req, id) in &cases {
            assert_eq!(engine.evaluate(req, id), engine.evaluate(req, id));
        }
    }

    #[test]
    fn denial_carries_subject_and_user() {
        let engine = engine_from_yaml(
            r#"
version: "1.0"
api_actions: "resource_*"
"#,
        );
        let d = engine.evaluate(&api("resource_show"), &IdentityDescriptor::Anonymous);
        let denial = d.denial.expect("should be denied");
        assert_eq!(denial.rule, "api_action_restriction");
        assert_eq!(denial.subject, "resource_show");
        assert_eq!(denial.username, "anonymous");
        assert_eq!(denial.pattern.as_deref(), Some("resource_*"));

        let d = engine.evaluate(&api("group_list"), &IdentityDescriptor::user("bob"));
        assert!(d.denial.is_none());
    }

    // -- Engine construction errors --

    #[test]
    fn invalid_regex_rejected_at_construction() {
        let config = load_policy_from_str(
            r#"
version: "1.0"
ui_paths: "[invalid"
"#,
        )
        .unwrap();

        let err = PolicyEngine::new(config).unwrap_err();
        assert!(
            err.to_string().contains("[invalid"),
            "error should mention the pattern: {err}"
        );
    }

    #[test]
    fn lookahead_pattern_spares_login() {
        let engine = engine_from_yaml(
            r#"
version: "1.0"
ui_paths: "(?!.*login)^/user/*"
"#,
        );
        let anon = IdentityDescriptor::Anonymous;

        let login = RequestDescriptor::new("/user/login");
        assert!(engine.decide(&login, &anon).is_allow());
        let reset = RequestDescriptor::new("/user/reset");
        assert_eq!(engine.decide(&reset, &anon), not_found());
    }

    #[test]
    fn engine_is_send_and_sync() {
        fn assert_send_sync<T: Send + Sync>() {}
        assert_send_sync::<PolicyEngine>();
    }
}
