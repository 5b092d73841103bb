use http::StatusCode;
use thiserror::Error;

/// Why a request did not reach the renderer.
///
/// The `Display` text of [`GateError::AuthorizationDenied`] is deliberately
/// generic; the failing check is only recorded through [`GateError::detail`]
/// in logs and the audit trail.
#[derive(Debug, Error)]
pub enum GateError {
    #[error("access denied")]
    AuthorizationDenied { detail: String },

    #[error("project not found")]
    ProjectNotFound(String),

    #[error("malformed request body: {0}")]
    MalformedRequestBody(String),

    #[error("request body too large")]
    PayloadTooLarge,

    #[error("renderer request failed: {0}")]
    Upstream(String),

    #[error("project metadata unavailable: {0}")]
    Store(String),
}

impl GateError {
    pub fn denied(detail: impl Into<String>) -> Self {
        GateError::AuthorizationDenied {
            detail: detail.into(),
        }
    }

    pub fn malformed(reason: impl ToString) -> Self {
        GateError::MalformedRequestBody(reason.to_string())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            GateError::AuthorizationDenied { .. } => StatusCode::FORBIDDEN,
            GateError::ProjectNotFound(_) => StatusCode::NOT_FOUND,
            GateError::MalformedRequestBody(_) => StatusCode::BAD_REQUEST,
            GateError::PayloadTooLarge => StatusCode::PAYLOAD_TOO_LARGE,
            GateError::Upstream(_) => StatusCode::BAD_GATEWAY,
            GateError::Store(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Full explanation for logs; never sent to the client.
    pub fn detail(&self) -> String {
        match self {
            GateError::AuthorizationDenied { detail } => detail.clone(),
            other => other.to_string(),
        }
    }

    /// Body sent to the client. Only the status reason, so nothing about
    /// layers or attributes leaks.
    pub fn public_message(&self) -> &'static str {
        self.status().canonical_reason().unwrap_or("error")
    }
}

impl From<access_policy::StoreError> for GateError {
    fn from(err: access_policy::StoreError) -> Self {
        match err {
            access_policy::StoreError::NotFound(project) => GateError::ProjectNotFound(project),
            other => GateError::Store(other.to_string()),
        }
    }
}
