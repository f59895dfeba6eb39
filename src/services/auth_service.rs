//! Domain service for back-office authentication.
//!
//! Handles credential verification and the password-reset token lifecycle.

use serde::Serialize;
use thiserror::Error;

/// Errors specific to authentication operations.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("Invalid email or password")]
    InvalidCredentials,

    #[error("Account is deactivated")]
    InactiveAccount,

    #[error("Insufficient permissions")]
    InsufficientPermissions,

    #[error("Invalid reset token")]
    InvalidToken,

    #[error("Reset token has expired")]
    TokenExpired,

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Notification dispatch failed: {0}")]
    Dispatch(String),

    #[error("Database error: {0}")]
    Database(String),
}

impl From<sea_orm::DbErr> for AuthError {
    fn from(err: sea_orm::DbErr) -> Self {
        Self::Database(err.to_string())
    }
}

impl From<anyhow::Error> for AuthError {
    fn from(err: anyhow::Error) -> Self {
        Self::Database(err.to_string())
    }
}

/// Back-office roles. Every other role value belongs to the public site
/// and never authenticates here.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Admin,
    Moderator,
}

impl Role {
    #[must_use]
    pub const fn from_i32(value: i32) -> Option<Self> {
        match value {
            1 => Some(Self::Admin),
            2 => Some(Self::Moderator),
            _ => None,
        }
    }

    #[must_use]
    pub const fn as_i32(self) -> i32 {
        match self {
            Self::Admin => 1,
            Self::Moderator => 2,
        }
    }

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            Self::Admin => "admin",
            Self::Moderator => "moderator",
        }
    }
}

/// Normalized identity produced by a successful credential check.
#[derive(Debug, Clone, Serialize)]
pub struct Identity {
    pub id: i32,
    /// "name surname", as displayed in the back office.
    pub name: String,
    pub email: String,
    #[serde(skip)]
    pub role: Role,
}

impl Identity {
    #[must_use]
    pub const fn role_name(&self) -> &'static str {
        self.role.name()
    }
}

/// Domain service trait for authentication and password recovery.
#[async_trait::async_trait]
pub trait AuthService: Send + Sync {
    /// Verifies a credential pair. The password arrives pre-hashed; this
    /// service never sees plaintext on the sign-in path.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidCredentials`] when no user matches,
    /// [`AuthError::InactiveAccount`] for deactivated users, and
    /// [`AuthError::InsufficientPermissions`] for roles outside the back
    /// office.
    async fn authenticate(&self, email: &str, hashed_password: &str)
    -> Result<Identity, AuthError>;

    /// Issues a reset token and dispatches the recovery link. Succeeds
    /// without side effects for unknown emails so the endpoint never
    /// reveals whether an address exists.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Dispatch`] when the notification cannot be
    /// sent; the token stays persisted in that case.
    async fn request_password_reset(&self, email: &str) -> Result<(), AuthError>;

    /// Consumes a reset token and stores the new credential. The token is
    /// single-use: the password update and the token clear happen in one
    /// write.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::InvalidToken`] for unknown or already-consumed
    /// tokens and [`AuthError::TokenExpired`] for expired ones (which are
    /// cleared on detection).
    async fn reset_password(
        &self,
        token: &str,
        new_credential: &str,
        already_hashed: bool,
    ) -> Result<(), AuthError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_mapping_round_trips() {
        assert_eq!(Role::from_i32(1), Some(Role::Admin));
        assert_eq!(Role::from_i32(2), Some(Role::Moderator));
        assert_eq!(Role::Admin.as_i32(), 1);
        assert_eq!(Role::Moderator.name(), "moderator");
    }

    #[test]
    fn public_site_roles_are_rejected() {
        assert_eq!(Role::from_i32(0), None);
        assert_eq!(Role::from_i32(3), None);
        assert_eq!(Role::from_i32(-1), None);
    }
}
