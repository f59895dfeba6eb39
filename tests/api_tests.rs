use axum::{
    Router,
    body::Body,
    http::{Request, StatusCode, header},
};
use http_body_util::BodyExt;
use sea_orm::{ActiveModelTrait, Set};
use std::sync::Arc;
use tower::ServiceExt;

use salus::api::AppState;
use salus::clients::mailer::MemoryMailer;
use salus::config::Config;
use salus::db::repositories::user::legacy_password_hash;
use salus::entities::users;
use salus::state::SharedState;

/// Seeded by the initial migration (must match m20260305_add_users.rs)
const ADMIN_EMAIL: &str = "admin@salud.municipio.gob";
const ADMIN_PASSWORD: &str = "cambiame-ya";

const SECRET: &str = "integration-test-secret";

fn test_config() -> Config {
    let mut config = Config::default();
    config.general.database_path = "sqlite::memory:".to_string();
    config.auth.session_secret = SECRET.to_string();
    config.server.secure_cookies = false;
    config
}

async fn spawn_app() -> (Router, Arc<AppState>, Arc<MemoryMailer>) {
    spawn_app_with_mailer(MemoryMailer::default()).await
}

async fn spawn_app_with_mailer(mailer: MemoryMailer) -> (Router, Arc<AppState>, Arc<MemoryMailer>) {
    let mailer = Arc::new(mailer);
    let shared = SharedState::with_mailer(test_config(), mailer.clone())
        .await
        .expect("Failed to create shared state");

    let state = salus::api::create_app_state(Arc::new(shared), None);
    let app = salus::api::router(state.clone()).await;

    (app, state, mailer)
}

async fn seed_moderator(state: &Arc<AppState>, email: &str, password: &str) {
    let now = chrono::Utc::now().to_rfc3339();
    let model = users::ActiveModel {
        name: Set("Marta".to_string()),
        surname: Set("López".to_string()),
        email: Set(email.to_string()),
        password_hash: Set(legacy_password_hash(password, email)),
        role: Set(2),
        active: Set(true),
        created_at: Set(now.clone()),
        updated_at: Set(now),
        ..Default::default()
    };
    model
        .insert(&state.store().conn)
        .await
        .expect("seed moderator");
}

fn login_body(email: &str, password: &str) -> String {
    serde_json::json!({
        "email": email,
        "hashedPassword": legacy_password_hash(password, email),
    })
    .to_string()
}

async fn login(app: &Router, email: &str, password: &str) -> (StatusCode, Option<String>, serde_json::Value) {
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header("Content-Type", "application/json")
                .body(Body::from(login_body(email, password)))
                .unwrap(),
        )
        .await
        .unwrap();

    let status = response.status();
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.split(';').next())
        .map(ToString::to_string);

    let body = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&body).unwrap_or_default();

    (status, cookie, json)
}

#[tokio::test]
async fn login_issues_session_with_dual_shape_payload() {
    let (app, _, _) = spawn_app().await;

    let (status, cookie, json) = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    assert_eq!(status, StatusCode::OK);
    let cookie = cookie.expect("session cookie set");
    assert!(cookie.starts_with("salus_session="));

    let data = &json["data"];
    assert_eq!(data["roleName"], "admin");
    assert_eq!(data["user"]["roleName"], "admin");
    assert_eq!(data["userId"], data["user"]["id"]);
    assert!(data["accessToken"].is_string());
    assert!(
        data["redirectTo"]
            .as_str()
            .unwrap()
            .ends_with("/admin/dashboard")
    );
}

#[tokio::test]
async fn login_rejects_wrong_password_generically() {
    let (app, _, _) = spawn_app().await;

    let (status, cookie, json) = login(&app, ADMIN_EMAIL, "incorrecta").await;

    assert_eq!(status, StatusCode::UNAUTHORIZED);
    assert!(cookie.is_none());
    assert_eq!(json["success"], false);
}

#[tokio::test]
async fn login_requires_both_fields() {
    let (app, _, _) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({"email": ADMIN_EMAIL, "hashedPassword": ""}).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_resolves_relative_callback_url() {
    let (app, _, _) = spawn_app().await;

    let body = serde_json::json!({
        "email": ADMIN_EMAIL,
        "hashedPassword": legacy_password_hash(ADMIN_PASSWORD, ADMIN_EMAIL),
        "callbackUrl": "/admin/reports",
    })
    .to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header("Content-Type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(
        json["data"]["redirectTo"]
            .as_str()
            .unwrap()
            .ends_with("/admin/reports")
    );
}

#[tokio::test]
async fn login_ignores_foreign_origin_callback_url() {
    let (app, _, _) = spawn_app().await;

    let body = serde_json::json!({
        "email": ADMIN_EMAIL,
        "hashedPassword": legacy_password_hash(ADMIN_PASSWORD, ADMIN_EMAIL),
        "callbackUrl": "https://evil.example.com/phish",
    })
    .to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/login")
                .header("Content-Type", "application/json")
                .body(Body::from(body))
                .unwrap(),
        )
        .await
        .unwrap();

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert!(
        json["data"]["redirectTo"]
            .as_str()
            .unwrap()
            .ends_with("/admin/dashboard")
    );
}

#[tokio::test]
async fn session_read_refreshes_cookie() {
    let (app, _, _) = spawn_app().await;
    let (_, cookie, _) = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/session")
                .header("Cookie", cookie.unwrap())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    assert!(response.headers().get(header::SET_COOKIE).is_some());

    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["data"]["user"]["email"], ADMIN_EMAIL);
}

#[tokio::test]
async fn session_read_without_cookie_is_unauthorized() {
    let (app, _, _) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/auth/session")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn logout_expires_the_cookie() {
    let (app, _, _) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/logout")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    assert!(cookie.contains("Max-Age=0"));
}

#[tokio::test]
async fn gate_redirects_unauthenticated_to_sign_in() {
    let (app, _, _) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/dashboard")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    let location = response.headers().get(header::LOCATION).unwrap().to_str().unwrap();
    assert!(location.starts_with("/auth/signin"));
    assert!(location.contains("callbackUrl="));
}

#[tokio::test]
async fn gate_demotes_moderator_from_user_management() {
    let (app, state, _) = spawn_app().await;
    seed_moderator(&state, "marta@example.com", "secreto-mod").await;

    let (_, cookie, _) = login(&app, "marta@example.com", "secreto-mod").await;
    let cookie = cookie.expect("moderator session");

    // Moderator reaches the area...
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/dashboard")
                .header("Cookie", cookie.clone())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // ...but user management demotes to the dashboard, not to sign-in.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/users")
                .header("Cookie", cookie)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::TEMPORARY_REDIRECT);
    assert_eq!(
        response.headers().get(header::LOCATION).unwrap(),
        "/admin/dashboard"
    );
}

#[tokio::test]
async fn gate_allows_admin_into_user_management() {
    let (app, _, _) = spawn_app().await;
    let (_, cookie, _) = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/admin/users")
                .header("Cookie", cookie.unwrap())
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn forgot_password_is_indistinguishable_for_unknown_email() {
    let (app, _, mailer) = spawn_app().await;

    for email in [ADMIN_EMAIL, "nadie@example.com"] {
        let response = app
            .clone()
            .oneshot(
                Request::builder()
                    .method("POST")
                    .uri("/api/auth/forgot-password")
                    .header("Content-Type", "application/json")
                    .body(Body::from(serde_json::json!({ "email": email }).to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        let bytes = response.into_body().collect().await.unwrap().to_bytes();
        let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(
            json["data"]["message"],
            "If the email exists, a recovery link has been sent"
        );
    }

    // Only the real account got mail.
    assert_eq!(mailer.sent.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn forgot_password_requires_email() {
    let (app, _, _) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/forgot-password")
                .header("Content-Type", "application/json")
                .body(Body::from("{}"))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn forgot_password_reports_dispatch_failure() {
    let (app, _, _) = spawn_app_with_mailer(MemoryMailer::failing()).await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/forgot-password")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "email": ADMIN_EMAIL }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);
}

#[tokio::test]
async fn reset_password_round_trip_is_single_use() {
    let (app, _, mailer) = spawn_app().await;

    app.clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/forgot-password")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({ "email": ADMIN_EMAIL }).to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    let link = mailer.sent.lock().unwrap()[0].1.clone();
    let token = link.split("token=").nth(1).unwrap().to_string();

    let reset_body = serde_json::json!({
        "token": token,
        "newPassword": "clave-nueva",
        "hashOnBackend": true,
    })
    .to_string();

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/reset-password")
                .header("Content-Type", "application/json")
                .body(Body::from(reset_body.clone()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    // The new credential signs in; the old one no longer does.
    let (status, _, _) = login(&app, ADMIN_EMAIL, "clave-nueva").await;
    assert_eq!(status, StatusCode::OK);
    let (status, _, _) = login(&app, ADMIN_EMAIL, ADMIN_PASSWORD).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    // Second consumption of the same token fails.
    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/reset-password")
                .header("Content-Type", "application/json")
                .body(Body::from(reset_body))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reset_password_rejects_unknown_token() {
    let (app, _, _) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/reset-password")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "token": "no-existe",
                        "newPassword": "clave-nueva",
                        "hashOnBackend": true,
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn reset_password_enforces_minimum_length_when_hashing() {
    let (app, _, _) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/api/auth/reset-password")
                .header("Content-Type", "application/json")
                .body(Body::from(
                    serde_json::json!({
                        "token": "cualquiera",
                        "newPassword": "corta",
                        "hashOnBackend": true,
                    })
                    .to_string(),
                ))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn system_status_reports_database_ok() {
    let (app, _, _) = spawn_app().await;

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .uri("/api/system/status")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let json: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
    assert_eq!(json["data"]["database"], "ok");
}
