//! Request-time authorization for the back-office area.
//!
//! Two-tier model: area-level deny for requests without a usable session,
//! then a privileged-prefix check that demotes authenticated non-admins to
//! the dashboard instead of bouncing them out of the area. Deny and
//! redirect are distinct outcomes; the surrounding middleware sends denied
//! requests to sign-in.

use crate::services::auth_service::Role;
use crate::services::session::{DEFAULT_LANDING, SessionClaims};

/// Everything under this prefix requires a session.
pub const ADMIN_PREFIX: &str = "/admin";

/// Sign-in page; denied requests are redirected here.
pub const SIGN_IN_PATH: &str = "/auth/signin";

/// Sub-paths that additionally require the admin role.
const ADMIN_ONLY_PREFIXES: &[&str] = &["/admin/users"];

/// Paths that never require a session.
const PUBLIC_PREFIXES: &[&str] = &["/auth/", "/api/auth/", "/assets/"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    Allow,
    /// No usable session for the area; send to sign-in.
    Deny,
    /// Authenticated but under-privileged for this sub-path; demote to a
    /// safe in-area landing page.
    Redirect(String),
}

#[must_use]
pub fn authorize(path: &str, session: Option<&SessionClaims>) -> Decision {
    if path == "/" || PUBLIC_PREFIXES.iter().any(|p| path.starts_with(p)) {
        return Decision::Allow;
    }

    if !path.starts_with(ADMIN_PREFIX) {
        return Decision::Allow;
    }

    let Some(claims) = session else {
        return Decision::Deny;
    };

    // A claims role outside {admin, moderator} should be unreachable (the
    // authenticator rejects it before a session exists) but is still denied.
    let Some(role) = claims.role() else {
        return Decision::Deny;
    };

    if role != Role::Admin
        && ADMIN_ONLY_PREFIXES.iter().any(|p| path.starts_with(p))
    {
        return Decision::Redirect(DEFAULT_LANDING.to_string());
    }

    Decision::Allow
}
