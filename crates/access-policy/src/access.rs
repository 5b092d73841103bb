use tracing::debug;

use crate::permissions::PermissionContext;
use crate::resolver::RequestUser;
use crate::schema::{AccessMode, ProjectSettings};

/// Outcome of the project-level access check.
#[derive(Debug)]
pub enum AccessDecision<'a> {
    /// The project defines roles and at least one applies; every layer and
    /// attribute must be checked against the returned context.
    Roles(PermissionContext<'a>),
    /// The project defines no roles and its default lets the user in; the
    /// role gate is not engaged.
    Open,
    /// The user may not access the project at all.
    Deny(String),
}

impl AccessDecision<'_> {
    pub fn is_denied(&self) -> bool {
        matches!(self, AccessDecision::Deny(_))
    }
}

/// Decide whether `user` may use the project described by `settings`.
///
/// With roles defined, a user to whom no role applies is denied. Without
/// roles, the project's [`AccessMode`] decides.
pub fn check_project_access<'a>(
    settings: &'a ProjectSettings,
    user: &RequestUser,
) -> AccessDecision<'a> {
    if !settings.roles.is_empty() {
        let ctx = PermissionContext::new(user, &settings.roles);
        if !ctx.has_roles() {
            return AccessDecision::Deny(format!(
                "no role applies to user '{}'",
                user.username
            ));
        }
        debug!(user = %user.username, roles = ?ctx.role_names(), "roles resolved");
        return AccessDecision::Roles(ctx);
    }

    let allowed = match settings.access.mode {
        AccessMode::Public => true,
        AccessMode::Authenticated => user.is_authenticated,
        AccessMode::Users => {
            user.is_authenticated && settings.access.users.contains(&user.username)
        }
        AccessMode::Private => false,
    };

    if allowed {
        AccessDecision::Open
    } else {
        AccessDecision::Deny(format!(
            "project access mode {:?} rejects user '{}'",
            settings.access.mode, user.username
        ))
    }
}
