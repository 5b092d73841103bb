use tracing::trace;

use crate::schema::{AccessRole, AuthMode};

/// Identity of the caller, as established by the authentication layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestUser {
    pub username: String,
    pub is_authenticated: bool,
}

impl RequestUser {
    pub fn anonymous() -> Self {
        Self {
            username: String::new(),
            is_authenticated: false,
        }
    }

    pub fn authenticated(username: impl Into<String>) -> Self {
        Self {
            username: username.into(),
            is_authenticated: true,
        }
    }
}

/// Select the roles that apply to `user`.
///
/// Every non-`other` role whose predicate matches is returned, in document
/// order. Only when none of them match are the `other` roles returned
/// instead.
pub fn resolve_roles<'a>(user: &RequestUser, roles: &'a [AccessRole]) -> Vec<&'a AccessRole> {
    let matched: Vec<&AccessRole> = roles
        .iter()
        .filter(|role| role.auth != AuthMode::Other && role_matches(role, user))
        .collect();

    if !matched.is_empty() {
        trace!(user = %user.username, count = matched.len(), "roles matched");
        return matched;
    }

    let fallback: Vec<&AccessRole> = roles
        .iter()
        .filter(|role| role.auth == AuthMode::Other)
        .collect();
    trace!(user = %user.username, count = fallback.len(), "falling back to 'other' roles");
    fallback
}

fn role_matches(role: &AccessRole, user: &RequestUser) -> bool {
    match role.auth {
        AuthMode::All => true,
        AuthMode::Authenticated => user.is_authenticated,
        AuthMode::Anonymous => !user.is_authenticated,
        AuthMode::Users => user.is_authenticated && role.users.contains(&user.username),
        AuthMode::Other => false,
    }
}
