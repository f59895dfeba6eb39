//! `SeaORM` implementation of the `AuthService` trait.

use async_trait::async_trait;
use chrono::{Duration, Utc};
use std::sync::Arc;
use tracing::{debug, info};

use crate::clients::mailer::Mailer;
use crate::db::Store;
use crate::db::repositories::user::{generate_reset_token, legacy_password_hash};
use crate::services::auth_service::{AuthError, AuthService, Identity, Role};

/// Reset tokens are valid for one hour from issuance.
const RESET_TOKEN_TTL_MINUTES: i64 = 60;

/// Minimum raw password length, enforced only when this service does the
/// hashing. A caller-supplied hash reveals nothing about the raw length,
/// so the rule cannot apply there.
const MIN_PASSWORD_LEN: usize = 6;

pub struct SeaOrmAuthService {
    store: Store,
    mailer: Arc<dyn Mailer>,
    public_base_url: String,
}

impl SeaOrmAuthService {
    #[must_use]
    pub fn new(store: Store, mailer: Arc<dyn Mailer>, public_base_url: impl Into<String>) -> Self {
        Self {
            store,
            mailer,
            public_base_url: public_base_url.into(),
        }
    }

    fn reset_link(&self, token: &str) -> String {
        let base = self.public_base_url.trim_end_matches('/');
        format!("{base}/auth/reset-password?token={token}")
    }
}

#[async_trait]
impl AuthService for SeaOrmAuthService {
    async fn authenticate(
        &self,
        email: &str,
        hashed_password: &str,
    ) -> Result<Identity, AuthError> {
        if email.trim().is_empty() || hashed_password.is_empty() {
            return Err(AuthError::Validation(
                "Email and password are required".to_string(),
            ));
        }

        let user = self
            .store
            .users()
            .find_by_credentials(email, hashed_password)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !user.active {
            return Err(AuthError::InactiveAccount);
        }

        let role = Role::from_i32(user.role).ok_or(AuthError::InsufficientPermissions)?;

        Ok(Identity {
            id: user.id,
            name: format!("{} {}", user.name, user.surname),
            email: user.email,
            role,
        })
    }

    async fn request_password_reset(&self, email: &str) -> Result<(), AuthError> {
        if email.trim().is_empty() {
            return Err(AuthError::Validation("Email is required".to_string()));
        }

        let Some(user) = self.store.users().find_active_by_email(email).await? else {
            // Anti-enumeration: respond exactly as for a known address.
            debug!("Password reset requested for unknown email");
            return Ok(());
        };

        let recipient = user.email.clone();
        let token = generate_reset_token();
        let expiry = Utc::now() + Duration::minutes(RESET_TOKEN_TTL_MINUTES);

        // Overwrites any previous token; the old one is dead from here on.
        self.store
            .users()
            .set_reset_token(user, &token, expiry)
            .await?;

        let link = self.reset_link(&token);

        // The token stays persisted on dispatch failure; the user can retry
        // the request and a fresh token will replace it.
        self.mailer
            .send_password_reset(&recipient, &link)
            .await
            .map_err(|e| AuthError::Dispatch(e.to_string()))?;

        info!("Password reset issued for user");
        Ok(())
    }

    async fn reset_password(
        &self,
        token: &str,
        new_credential: &str,
        already_hashed: bool,
    ) -> Result<(), AuthError> {
        if token.is_empty() || new_credential.is_empty() {
            return Err(AuthError::Validation(
                "Token and new password are required".to_string(),
            ));
        }

        if !already_hashed && new_credential.len() < MIN_PASSWORD_LEN {
            return Err(AuthError::Validation(format!(
                "Password must be at least {MIN_PASSWORD_LEN} characters"
            )));
        }

        let user = self
            .store
            .users()
            .find_active_by_reset_token(token)
            .await?
            .ok_or(AuthError::InvalidToken)?;

        let now = Utc::now();
        let live = user.reset_token_expiry.is_some_and(|expiry| now <= expiry);

        if !live {
            // Cleanup on detection: an expired token collapses back to the
            // no-token state instead of lingering as "expired".
            self.store.users().clear_reset_token(user).await?;
            return Err(AuthError::TokenExpired);
        }

        let new_hash = if already_hashed {
            new_credential.to_string()
        } else {
            legacy_password_hash(new_credential, &user.email)
        };

        // Conditional update: clears the token in the same statement that
        // changes the password, so a concurrent consumer of the same token
        // loses the race cleanly.
        let consumed = self
            .store
            .users()
            .consume_reset_token(token, &new_hash, now)
            .await?;

        if !consumed {
            return Err(AuthError::InvalidToken);
        }

        info!("Password reset completed for user");
        Ok(())
    }
}
