//! Session issuance and refresh.
//!
//! Two tokens are involved: the outer session JWT carried by the cookie,
//! with a fixed absolute 24-hour lifetime from login, and an embedded
//! access token that downstream consumers verify independently. The
//! embedded token is re-signed to `now + 24h` on every session read, so
//! its expiry slides while the outer token's does not.

use anyhow::{Context, Result};
use chrono::Utc;
use jsonwebtoken::{DecodingKey, EncodingKey, Header, Validation};
use serde::{Deserialize, Serialize};
use url::Url;

use crate::services::auth_service::{Identity, Role};

/// Absolute lifetime of the outer session token, from login. Not sliding.
pub const SESSION_TTL_SECS: i64 = 24 * 60 * 60;

/// Lifetime of the embedded access token, from the most recent read.
pub const ACCESS_TOKEN_TTL_SECS: i64 = 24 * 60 * 60;

/// Where a signed-in user lands when no valid return URL was requested.
pub const DEFAULT_LANDING: &str = "/admin/dashboard";

/// Claims of the embedded access token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AccessClaims {
    pub sub: i32,
    pub email: String,
    pub role: i32,
    pub iat: i64,
    pub exp: i64,
}

/// Claims of the outer session token. Stored once; the duplicated
/// nested-plus-top-level wire shape is produced at serialization time by
/// [`SessionClaims::payload`].
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionClaims {
    pub sub: i32,
    pub email: String,
    pub name: String,
    pub role: i32,
    pub role_name: String,
    pub access_token: String,
    pub iat: i64,
    pub exp: i64,
}

/// Nested user record, one of the two historical consumer shapes.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionUser<'a> {
    pub id: i32,
    pub email: &'a str,
    pub name: &'a str,
    pub role: i32,
    pub role_name: &'a str,
}

/// Wire shape of a session: the user record nested under `user` and the
/// same fields duplicated at the top level, both derived from the single
/// claims struct.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionPayload<'a> {
    pub user: SessionUser<'a>,
    pub user_id: i32,
    pub email: &'a str,
    pub name: &'a str,
    pub role: i32,
    pub role_name: &'a str,
    pub access_token: &'a str,
    pub expires: String,
}

impl SessionClaims {
    #[must_use]
    pub const fn role(&self) -> Option<Role> {
        Role::from_i32(self.role)
    }

    #[must_use]
    pub fn user(&self) -> SessionUser<'_> {
        SessionUser {
            id: self.sub,
            email: &self.email,
            name: &self.name,
            role: self.role,
            role_name: &self.role_name,
        }
    }

    #[must_use]
    pub fn payload(&self) -> SessionPayload<'_> {
        let expires = chrono::DateTime::from_timestamp(self.exp, 0)
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();

        SessionPayload {
            user: self.user(),
            user_id: self.sub,
            email: &self.email,
            name: &self.name,
            role: self.role,
            role_name: &self.role_name,
            access_token: &self.access_token,
            expires,
        }
    }
}

/// A signed session token together with its decoded claims.
pub struct IssuedSession {
    pub token: String,
    pub claims: SessionClaims,
}

pub struct SessionService {
    encoding_key: EncodingKey,
    decoding_key: DecodingKey,
    validation: Validation,
    base_url: Url,
}

impl SessionService {
    pub fn new(secret: &str, public_base_url: &str) -> Result<Self> {
        let base_url = Url::parse(public_base_url)
            .with_context(|| format!("Invalid public base URL: {public_base_url}"))?;

        Ok(Self {
            encoding_key: EncodingKey::from_secret(secret.as_bytes()),
            decoding_key: DecodingKey::from_secret(secret.as_bytes()),
            validation: Validation::default(),
            base_url,
        })
    }

    /// Create a session for a verified identity.
    pub fn issue(&self, identity: &Identity) -> Result<IssuedSession> {
        let now = Utc::now().timestamp();

        let claims = SessionClaims {
            sub: identity.id,
            email: identity.email.clone(),
            name: identity.name.clone(),
            role: identity.role.as_i32(),
            role_name: identity.role_name().to_string(),
            access_token: self.sign_access_token(identity.id, &identity.email, identity.role.as_i32(), now)?,
            iat: now,
            exp: now + SESSION_TTL_SECS,
        };

        let token = self.sign(&claims)?;
        Ok(IssuedSession { token, claims })
    }

    /// Verify a session token without mutating it. Used by the route gate.
    pub fn verify(&self, token: &str) -> Result<SessionClaims> {
        let data = jsonwebtoken::decode::<SessionClaims>(token, &self.decoding_key, &self.validation)
            .context("Session token rejected")?;
        Ok(data.claims)
    }

    /// Verify and re-sign. The embedded access token gets a fresh
    /// 24-hour expiry; the outer token keeps its original issuance time
    /// and absolute expiry.
    pub fn refresh(&self, token: &str) -> Result<IssuedSession> {
        let mut claims = self.verify(token)?;

        let now = Utc::now().timestamp();
        claims.access_token = self.sign_access_token(claims.sub, &claims.email, claims.role, now)?;

        let token = self.sign(&claims)?;
        Ok(IssuedSession { token, claims })
    }

    /// Resolve a post-login return URL. Relative paths join the public
    /// base URL; absolute same-origin URLs pass verbatim; anything else is
    /// replaced with the default landing page.
    #[must_use]
    pub fn resolve_redirect(&self, requested: Option<&str>) -> String {
        let fallback = || {
            self.base_url
                .join(DEFAULT_LANDING)
                .map_or_else(|_| DEFAULT_LANDING.to_string(), |u| u.to_string())
        };

        let Some(target) = requested.filter(|t| !t.is_empty()) else {
            return fallback();
        };

        if target.starts_with('/') {
            return self
                .base_url
                .join(target)
                .map_or_else(|_| fallback(), |u| u.to_string());
        }

        match Url::parse(target) {
            Ok(url) if url.origin() == self.base_url.origin() => target.to_string(),
            _ => fallback(),
        }
    }

    fn sign(&self, claims: &SessionClaims) -> Result<String> {
        jsonwebtoken::encode(&Header::default(), claims, &self.encoding_key)
            .context("Failed to sign session token")
    }

    fn sign_access_token(&self, sub: i32, email: &str, role: i32, now: i64) -> Result<String> {
        let claims = AccessClaims {
            sub,
            email: email.to_string(),
            role,
            iat: now,
            exp: now + ACCESS_TOKEN_TTL_SECS,
        };

        jsonwebtoken::encode(&Header::default(), &claims, &self.encoding_key)
            .context("Failed to sign access token")
    }
}
