use serde::{Deserialize, Serialize};

/// One line of the audit trail.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuditEntry {
    pub id: uuid::Uuid,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub event_type: AuditEventType,
    pub source: AuditSource,
    pub details: serde_json::Value,
}

impl AuditEntry {
    /// New entry stamped with a random v4 id and the current UTC time.
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
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuditEventType {
    ServerStarted,
    ServerStopped,
    /// Passed to the renderer unchanged.
    RequestForwarded,
    /// Passed to the renderer after narrowing the requested attributes.
    RequestRewritten,
    AccessDenied,
    MalformedRequest,
    ProjectNotFound,
    /// Project settings exist but could not be loaded.
    SettingsInvalid,
    UpstreamFailed,
}

/// Who caused the event and in which request.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AuditSource {
    pub component: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub project: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub username: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_addr: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_id: Option<String>,
}

impl AuditSource {
    pub fn new(component: impl Into<String>) -> Self {
        Self {
            component: component.into(),
            ..Default::default()
        }
    }

    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = Some(project.into());
        self
    }

    /// Anonymous users are recorded without a username.
    pub fn with_username(mut self, username: &str) -> Self {
        if !username.is_empty() {
            self.username = Some(username.to_string());
        }
        self
    }

    pub fn with_remote_addr(mut self, addr: impl ToString) -> Self {
        self.remote_addr = Some(addr.to_string());
        self
    }

    pub fn with_request_id(mut self, id: uuid::Uuid) -> Self {
        self.request_id = Some(id.to_string());
        self
    }
}
