use access_policy::RequestUser;
use http::header::HeaderName;
use http::HeaderMap;

/// Header set by the authenticating front end when none is configured.
pub const DEFAULT_USER_HEADER: &str = "x-auth-user";

/// Establishes who is calling.
///
/// Must be cheap and side-effect free; it may be called more than once per
/// request.
pub trait Authenticator: Send + Sync {
    fn authenticate(&self, headers: &HeaderMap) -> RequestUser;
}

/// Trusts a username header set by an authenticating reverse proxy in front
/// of the gate. A missing or blank header means an anonymous caller.
#[derive(Debug, Clone)]
pub struct TrustedHeaderAuth {
    header: HeaderName,
}

impl TrustedHeaderAuth {
    pub fn new(header: HeaderName) -> Self {
        Self { header }
    }

    pub fn header_name(&self) -> &HeaderName {
        &self.header
    }
}

impl Default for TrustedHeaderAuth {
    fn default() -> Self {
        Self::new(HeaderName::from_static(DEFAULT_USER_HEADER))
    }
}

impl Authenticator for TrustedHeaderAuth {
    fn authenticate(&self, headers: &HeaderMap) -> RequestUser {
        match headers
            .get(&self.header)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
        {
            Some(name) if !name.is_empty() => RequestUser::authenticated(name),
            _ => RequestUser::anonymous(),
        }
    }
}
