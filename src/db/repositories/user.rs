use anyhow::{Context, Result};
use sea_orm::sea_query::{Expr, Func, SimpleExpr};
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, Set,
    prelude::DateTimeUtc,
};
use sha2::{Digest, Sha256};

use crate::entities::users;

/// Static salt of the legacy credential scheme. The public site hashes
/// passwords client-side with the same constant, so the server only ever
/// compares or stores the resulting digests.
const LEGACY_HASH_SALT: &str = "salus-credencial-v1";

pub struct UserRepository {
    conn: DatabaseConnection,
}

impl UserRepository {
    #[must_use]
    pub const fn new(conn: DatabaseConnection) -> Self {
        Self { conn }
    }

    /// Find a user whose email matches case-insensitively and whose stored
    /// hash equals the supplied one. Deliberately does not filter on
    /// `active`: the caller distinguishes inactive accounts from bad
    /// credentials.
    pub async fn find_by_credentials(
        &self,
        email: &str,
        password_hash: &str,
    ) -> Result<Option<users::Model>> {
        let user = users::Entity::find()
            .filter(email_matches(email))
            .filter(users::Column::PasswordHash.eq(password_hash))
            .one(&self.conn)
            .await
            .context("Failed to query user by credentials")?;

        Ok(user)
    }

    pub async fn find_active_by_email(&self, email: &str) -> Result<Option<users::Model>> {
        let user = users::Entity::find()
            .filter(email_matches(email))
            .filter(users::Column::Active.eq(true))
            .one(&self.conn)
            .await
            .context("Failed to query user by email")?;

        Ok(user)
    }

    /// Exact-match token lookup. Tokens are opaque random strings, so no
    /// case normalization is applied.
    pub async fn find_active_by_reset_token(&self, token: &str) -> Result<Option<users::Model>> {
        let user = users::Entity::find()
            .filter(users::Column::ResetToken.eq(token))
            .filter(users::Column::Active.eq(true))
            .one(&self.conn)
            .await
            .context("Failed to query user by reset token")?;

        Ok(user)
    }

    /// Store a fresh reset token, overwriting any previous one. The old
    /// token becomes unusable the moment this commits.
    pub async fn set_reset_token(
        &self,
        user: users::Model,
        token: &str,
        expiry: DateTimeUtc,
    ) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();

        let mut active: users::ActiveModel = user.into();
        active.reset_token = Set(Some(token.to_string()));
        active.reset_token_expiry = Set(Some(expiry));
        active.updated_at = Set(now);
        active
            .update(&self.conn)
            .await
            .context("Failed to store reset token")?;

        Ok(())
    }

    /// Collapse an expired token back to the no-token state.
    pub async fn clear_reset_token(&self, user: users::Model) -> Result<()> {
        let now = chrono::Utc::now().to_rfc3339();

        let mut active: users::ActiveModel = user.into();
        active.reset_token = Set(None);
        active.reset_token_expiry = Set(None);
        active.updated_at = Set(now);
        active
            .update(&self.conn)
            .await
            .context("Failed to clear reset token")?;

        Ok(())
    }

    /// Single conditional UPDATE that changes the password and clears the
    /// token fields only while the token is still live. Returns false when
    /// no row qualified, i.e. the token was consumed, cleared, or expired
    /// by a concurrent request after the caller's lookup.
    pub async fn consume_reset_token(
        &self,
        token: &str,
        new_password_hash: &str,
        now: DateTimeUtc,
    ) -> Result<bool> {
        let result = users::Entity::update_many()
            .col_expr(users::Column::PasswordHash, Expr::value(new_password_hash))
            .col_expr(users::Column::ResetToken, Expr::value(Option::<String>::None))
            .col_expr(
                users::Column::ResetTokenExpiry,
                Expr::value(Option::<DateTimeUtc>::None),
            )
            .col_expr(
                users::Column::UpdatedAt,
                Expr::value(chrono::Utc::now().to_rfc3339()),
            )
            .filter(users::Column::ResetToken.eq(token))
            .filter(users::Column::Active.eq(true))
            .filter(users::Column::ResetTokenExpiry.gte(now))
            .exec(&self.conn)
            .await
            .context("Failed to consume reset token")?;

        Ok(result.rows_affected == 1)
    }
}

fn email_matches(email: &str) -> SimpleExpr {
    let normalized = email.trim().to_lowercase();
    Expr::expr(Func::lower(Expr::col((
        users::Entity,
        users::Column::Email,
    ))))
    .eq(normalized)
}

/// Legacy deterministic scheme: sha256(password + lowercased email + salt),
/// hex encoded. Kept for compatibility with hashes computed by the site's
/// sign-in form.
#[must_use]
pub fn legacy_password_hash(password: &str, email: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(password.as_bytes());
    hasher.update(email.trim().to_lowercase().as_bytes());
    hasher.update(LEGACY_HASH_SALT.as_bytes());

    hex_encode(&hasher.finalize())
}

/// Generate a random reset token (64 character hex string, 256 bits)
#[must_use]
pub fn generate_reset_token() -> String {
    use rand::Rng;

    let mut rng = rand::rng();
    let bytes: [u8; 32] = rng.random();

    hex_encode(&bytes)
}

fn hex_encode(bytes: &[u8]) -> String {
    bytes
        .iter()
        .fold(String::with_capacity(bytes.len() * 2), |mut acc, b| {
            use std::fmt::Write;
            let _ = write!(acc, "{b:02x}");
            acc
        })
}
