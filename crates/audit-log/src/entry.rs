use serde::{Deserialize, Serialize};

/// A single audit log entry representing an event in the system.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: uuid::Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event_type: AuditEventType,
    pub source: AuditSource,
    pub details: serde_json::Value,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub denial: Option<DenialRecord>,
}

impl AuditEntry {
    /// Create a new `AuditEntry` with an auto-generated UUID v4 and the current
    /// UTC timestamp. The caller supplies the event type, source, and
    /// free-form details JSON value. `denial` defaults to `None`.
    pub fn new(
        event_type: AuditEventType,
        source: AuditSource,
        details: serde_json::Value,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4(),
            timestamp: chrono::Utc::now(),
            event_type,
            source,
            details,
            denial: None,
        }
    }

    /// Attach a denial record to this entry, consuming and returning `self`
    /// for builder-style usage.
    pub fn with_denial(mut self, denial: DenialRecord) -> Self {
        self.denial = Some(denial);
        self
    }
}

/// The category of audit event being recorded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    AnonymousRedirected,
    ActionRejected,
    PathRejected,
    PolicyLoaded,
    PolicyReloaded,
    PolicyReloadFailed,
    ProcessStarted,
    ProcessStopped,
}

impl AuditEventType {
    /// Event type recorded for a denial produced by the named rule.
    pub fn for_rule(rule: &str) -> Option<Self> {
        match rule {
            "anonymous_redirect" => Some(Self::AnonymousRedirected),
            "api_action_restriction" => Some(Self::ActionRejected),
            "ui_path_restriction" => Some(Self::PathRejected),
            _ => None,
        }
    }
}

/// Identifies the component and optional contextual metadata for the event
/// source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditSource {
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub method: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl AuditSource {
    /// Convenience constructor that only requires the component name. All
    /// optional fields default to `None`.
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            remote_addr: None,
            method: None,
            path: None,
        }
    }
}

/// Who was denied what, and by which rule.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DenialRecord {
    pub rule: String,
    pub subject: String,
    pub username: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pattern: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rule_names_map_to_event_types() {
        assert_eq!(
            AuditEventType::for_rule("api_action_restriction"),
            Some(AuditEventType::ActionRejected)
        );
        assert_eq!(
            AuditEventType::for_rule("ui_path_restriction"),
            Some(AuditEventType::PathRejected)
        );
        assert_eq!(
            AuditEventType::for_rule("anonymous_redirect"),
            Some(AuditEventType::AnonymousRedirected)
        );
        assert_eq!(AuditEventType::for_rule("other"), None);
    }

    #[test]
    fn entry_serializes_denial_and_skips_empty_fields() {
        let entry = AuditEntry::new(
            AuditEventType::PathRejected,
            AuditSource::new("access-gate"),
            serde_json::json!({}),
        )
        .with_denial(DenialRecord {
            rule: "ui_path_restriction".into(),
            subject: "/user/default".into(),
            username: "anonymous".into(),
            pattern: None,
        });

        let json = serde_json::to_value(&entry).unwrap();
        assert_eq!(json["event_type"], "path_rejected");
        assert_eq!(json["denial"]["subject"], "/user/default");
        assert!(json["denial"].get("pattern").is_none());
        assert!(json["source"].get("remote_addr").is_none());
    }
}
