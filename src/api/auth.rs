use axum::{
    Json,
    extract::{Request, State},
    http::{HeaderMap, StatusCode, header::SET_COOKIE},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::{ApiError, ApiResponse, AppState};
use crate::services::gate::{self, Decision, SIGN_IN_PATH};
use crate::services::session::{SESSION_TTL_SECS, SessionPayload};

const SESSION_COOKIE: &str = "salus_session";

// ============================================================================
// Request/Response Types
// ============================================================================

/// Wire names follow the site's existing sign-in form.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    pub email: String,
    /// Hashed client-side by the sign-in form; plaintext never travels.
    pub hashed_password: String,
    #[serde(default)]
    pub callback_url: Option<String>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LoginResponse<'a> {
    #[serde(flatten)]
    session: SessionPayload<'a>,
    redirect_to: String,
}

#[derive(Deserialize)]
pub struct ForgotPasswordRequest {
    #[serde(default)]
    pub email: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResetPasswordRequest {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub new_password: String,
    /// When true the raw password is hashed here; otherwise the client
    /// already applied the legacy scheme and the value is stored as-is.
    #[serde(default)]
    pub hash_on_backend: bool,
}

#[derive(Serialize)]
pub struct MessageResponse {
    pub message: String,
}

// ============================================================================
// Middleware
// ============================================================================

/// Route authorization gate, evaluated before any handler. Reads the
/// session from the cookie (or a Bearer header for non-browser clients),
/// then applies the path rules: deny-to-sign-in at the area level,
/// redirect-to-dashboard for under-privileged sub-paths.
pub async fn admin_gate(
    State(state): State<Arc<AppState>>,
    request: Request,
    next: Next,
) -> Response {
    let path = request.uri().path().to_string();

    let claims = extract_session_token(request.headers())
        .and_then(|token| state.sessions().verify(&token).ok());

    match gate::authorize(&path, claims.as_ref()) {
        Decision::Allow => {
            if let Some(claims) = &claims {
                tracing::Span::current().record("user_id", claims.sub);
            }
            next.run(request).await
        }
        Decision::Deny => {
            let to = format!("{SIGN_IN_PATH}?callbackUrl={}", urlencoding::encode(&path));
            Redirect::temporary(&to).into_response()
        }
        Decision::Redirect(to) => Redirect::temporary(&to).into_response(),
    }
}

/// Extract the session token from the cookie or an Authorization header.
fn extract_session_token(headers: &HeaderMap) -> Option<String> {
    if let Some(cookies) = headers.get("Cookie")
        && let Ok(cookie_str) = cookies.to_str()
    {
        for pair in cookie_str.split(';') {
            if let Some(value) = pair
                .trim()
                .strip_prefix(SESSION_COOKIE)
                .and_then(|rest| rest.strip_prefix('='))
            {
                return Some(value.to_string());
            }
        }
    }

    if let Some(auth_header) = headers.get("Authorization")
        && let Ok(auth_str) = auth_header.to_str()
        && let Some(token) = auth_str.strip_prefix("Bearer ")
    {
        return Some(token.trim().to_string());
    }

    None
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/login
/// Verify credentials, issue the session cookie, and resolve the post-login
/// redirect target.
pub async fn login(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<LoginRequest>,
) -> Result<Response, ApiError> {
    if payload.email.trim().is_empty() {
        return Err(ApiError::validation("Email is required"));
    }
    if payload.hashed_password.is_empty() {
        return Err(ApiError::validation("Password is required"));
    }

    let identity = state
        .auth()
        .authenticate(&payload.email, &payload.hashed_password)
        .await?;

    let issued = state
        .sessions()
        .issue(&identity)
        .map_err(|e| ApiError::internal(format!("Failed to issue session: {e}")))?;

    let redirect_to = state
        .sessions()
        .resolve_redirect(payload.callback_url.as_deref());

    tracing::info!("User {} signed in", identity.id);

    let cookie = session_cookie(&issued.token, state.secure_cookies().await);
    let body = Json(ApiResponse::success(LoginResponse {
        session: issued.claims.payload(),
        redirect_to,
    }));

    Ok(([(SET_COOKIE, cookie)], body).into_response())
}

/// GET /api/auth/session
/// Read the current session. Each read re-signs the embedded access token
/// with a fresh expiry; the outer token keeps its absolute lifetime.
pub async fn session(
    State(state): State<Arc<AppState>>,
    headers: HeaderMap,
) -> Result<Response, ApiError> {
    let token = extract_session_token(&headers)
        .ok_or_else(|| ApiError::Unauthorized("Not authenticated".to_string()))?;

    let refreshed = state
        .sessions()
        .refresh(&token)
        .map_err(|_| ApiError::Unauthorized("Session expired or invalid".to_string()))?;

    let cookie = session_cookie(&refreshed.token, state.secure_cookies().await);
    let body = Json(ApiResponse::success(refreshed.claims.payload()));

    Ok(([(SET_COOKIE, cookie)], body).into_response())
}

/// POST /api/auth/logout
/// Destroy the session cookie.
pub async fn logout() -> impl IntoResponse {
    (
        [(SET_COOKIE, clear_session_cookie())],
        (StatusCode::OK, "Logged out"),
    )
}

/// POST /api/auth/forgot-password
/// Issue a reset token and dispatch the recovery link. The response is the
/// same whether or not the email exists.
pub async fn forgot_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ForgotPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    if payload.email.trim().is_empty() {
        return Err(ApiError::validation("Email is required"));
    }

    state.auth().request_password_reset(&payload.email).await?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "If the email exists, a recovery link has been sent".to_string(),
    })))
}

/// POST /api/auth/reset-password
/// Consume a reset token and store the new credential.
pub async fn reset_password(
    State(state): State<Arc<AppState>>,
    Json(payload): Json<ResetPasswordRequest>,
) -> Result<Json<ApiResponse<MessageResponse>>, ApiError> {
    if payload.token.is_empty() || payload.new_password.is_empty() {
        return Err(ApiError::validation("Token and new password are required"));
    }

    state
        .auth()
        .reset_password(&payload.token, &payload.new_password, !payload.hash_on_backend)
        .await?;

    Ok(Json(ApiResponse::success(MessageResponse {
        message: "Password updated successfully".to_string(),
    })))
}

// ============================================================================
// Helpers
// ============================================================================

fn session_cookie(token: &str, secure: bool) -> String {
    let mut cookie = format!(
        "{SESSION_COOKIE}={token}; Path=/; HttpOnly; SameSite=Lax; Max-Age={SESSION_TTL_SECS}"
    );
    if secure {
        cookie.push_str("; Secure");
    }
    cookie
}

fn clear_session_cookie() -> String {
    format!("{SESSION_COOKIE}=; Path=/; HttpOnly; SameSite=Lax; Max-Age=0")
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn token_extracted_from_cookie_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Cookie",
            HeaderValue::from_static("theme=dark; salus_session=abc.def.ghi; lang=es"),
        );
        assert_eq!(
            extract_session_token(&headers),
            Some("abc.def.ghi".to_string())
        );
    }

    #[test]
    fn token_extracted_from_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            "Authorization",
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(
            extract_session_token(&headers),
            Some("abc.def.ghi".to_string())
        );
    }

    #[test]
    fn missing_token_yields_none() {
        assert_eq!(extract_session_token(&HeaderMap::new()), None);
    }

    #[test]
    fn secure_flag_is_appended_when_requested() {
        assert!(session_cookie("t", true).ends_with("; Secure"));
        assert!(!session_cookie("t", false).contains("Secure"));
    }
}
