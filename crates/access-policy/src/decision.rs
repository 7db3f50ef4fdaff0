use serde::Serialize;

/// Body returned for every rejected API action.
pub const INVALID_REQUEST_MESSAGE: &str = "Invalid request";

/// The engine's terminal decision for one request.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum Outcome {
    /// Continue normal dispatch.
    Allow,
    /// Redirect to the given endpoint id.
    RedirectTo { endpoint: String },
    /// Short-circuit with this status and body.
    Reject { status: u16, body: RejectBody },
}

/// Payload of a rejection.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", content = "content", rename_all = "snake_case")]
pub enum RejectBody {
    Json(serde_json::Value),
    Text(String),
}

impl Outcome {
    /// `400` with the fixed `{"success": false, "error": {"message": "Invalid request"}}` body.
    pub fn invalid_request() -> Self {
        Self::Reject {
            status: 400,
            body: RejectBody::Json(serde_json::json!({
                "success": false,
                "error": { "message": INVALID_REQUEST_MESSAGE },
            })),
        }
    }

    pub fn is_allow(&self) -> bool {
        matches!(self, Self::Allow)
    }
}

/// Structured record of a denied request, handed to observability sinks.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Denial {
    /// Name of the rule that denied.
    pub rule: &'static str,
    /// Offending request path or API action name.
    pub subject: String,
    /// Resolved username, or `"anonymous"`.
    pub username: String,
    /// Pattern that matched, when the rule is pattern-based.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

/// Outcome plus the denial that produced it, if any.
#[derive(Debug, Clone, PartialEq)]
pub struct Decision {
    pub outcome: Outcome,
    pub denial: Option<Denial>,
}

impl Decision {
    pub fn allow() -> Self {
        Self {
            outcome: Outcome::Allow,
            denial: None,
        }
    }
}
