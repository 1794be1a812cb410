use axum::http::{Method, StatusCode};
use chrono::{Duration, Utc};
use checkin_backend::{
    models::password_reset::PasswordReset,
    repositories::CheckInStore,
    types::{PasswordResetId, UserId},
    utils::token::hash_token,
};
use serde_json::json;

mod support;

use support::TestApp;

fn credentials(email: &str, password: &str) -> serde_json::Value {
    json!({"email": email, "password": password})
}

#[tokio::test]
async fn signup_then_login_and_fetch_me() {
    let app = TestApp::new();
    let (status, body) = app
        .request(
            Method::POST,
            "/users/signup",
            None,
            Some(json!({"username": "ana", "email": "Ana@Example.com", "password": "s3cret"})),
        )
        .await;
    assert_eq!(status, StatusCode::CREATED);
    assert_eq!(body["user"]["email"], "ana@example.com");
    assert_eq!(body["user"]["has_push_address"], false);
    assert!(body["user"].get("password_hash").is_none());

    let (status, login) = app
        .request(
            Method::POST,
            "/users/login",
            None,
            Some(credentials("ana@example.com", "s3cret")),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = login["token"].as_str().unwrap();
    assert_ne!(token, body["token"].as_str().unwrap());

    let (status, me) = app
        .request(Method::GET, "/users/me", Some(token), None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(me["username"], "ana");
}

#[tokio::test]
async fn duplicate_signup_conflicts() {
    let app = TestApp::new();
    app.user("ana").await;

    let (status, _) = app
        .request(
            Method::POST,
            "/users/signup",
            None,
            Some(json!({"username": "other", "email": "ana@example.com", "password": "pw"})),
        )
        .await;
    assert_eq!(status, StatusCode::CONFLICT);
}

#[tokio::test]
async fn signup_validates_username_and_email() {
    let app = TestApp::new();
    let (status, body) = app
        .request(
            Method::POST,
            "/users/signup",
            None,
            Some(json!({"username": "two words", "email": "not-an-email", "password": "pw"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    let errors = body["details"]["errors"].as_array().unwrap();
    assert_eq!(errors.len(), 2);
}

#[tokio::test]
async fn wrong_password_and_unknown_email_are_unauthorized() {
    let app = TestApp::new();
    let ana = app.user("ana").await;

    let (status, _) = app
        .request(
            Method::POST,
            "/users/login",
            None,
            Some(credentials(&ana.email, "wrong")),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request(
            Method::POST,
            "/users/login",
            None,
            Some(credentials("nobody@example.com", "pw")),
        )
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn bearer_token_is_required_and_checked() {
    let app = TestApp::new();
    let (status, _) = app.request(Method::GET, "/users/me", None, None).await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);

    let (status, _) = app
        .request(Method::GET, "/users/me", Some("made-up-token"), None)
        .await;
    assert_eq!(status, StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn push_address_can_be_cleared() {
    let app = TestApp::new();
    let ana = app.user("ana").await;

    let (status, body) = app
        .request(
            Method::PUT,
            "/users/me/push-address",
            Some(&ana.token),
            Some(json!({"push_address": null})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["has_push_address"], false);
}

#[tokio::test]
async fn password_reset_flow_is_single_use() {
    let app = TestApp::new();
    let ana = app.user("ana").await;

    let (status, _) = app
        .request(
            Method::POST,
            "/users/password-reset",
            None,
            Some(json!({"email": ana.email})),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
    let token = app.mailer.last_token_for(&ana.email).expect("reset mailed");

    let confirm = json!({"token": token, "new_password": "n3w-password"});
    let (status, _) = app
        .request(
            Method::POST,
            "/users/password-reset/confirm",
            None,
            Some(confirm.clone()),
        )
        .await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = app
        .request(
            Method::POST,
            "/users/password-reset/confirm",
            None,
            Some(confirm),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = app
        .request(
            Method::POST,
            "/users/login",
            None,
            Some(credentials(&ana.email, "n3w-password")),
        )
        .await;
    assert_eq!(status, StatusCode::OK);
}

#[tokio::test]
async fn undelivered_reset_link_cannot_be_redeemed() {
    let app = TestApp::new();
    let ana = app.user("ana").await;
    app.mailer.fail_sends();

    let (status, _) = app
        .request(
            Method::POST,
            "/users/password-reset",
            None,
            Some(json!({"email": ana.email})),
        )
        .await;
    assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);

    let token = app.mailer.last_token_for(&ana.email).expect("link built");
    let (status, _) = app
        .request(
            Method::POST,
            "/users/password-reset/confirm",
            None,
            Some(json!({"token": token, "new_password": "n3w-password"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn password_reset_rejects_unknown_email_and_expired_token() {
    let app = TestApp::new();
    let ana = app.user("ana").await;

    let (status, _) = app
        .request(
            Method::POST,
            "/users/password-reset",
            None,
            Some(json!({"email": "ghost@example.com"})),
        )
        .await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let stale = "stale-reset-token-value";
    app.store
        .insert_password_reset(&PasswordReset {
            id: PasswordResetId::new(),
            user_id: ana.id.parse::<UserId>().unwrap(),
            token_hash: hash_token(stale),
            created_at: Utc::now() - Duration::hours(2),
            expires_at: Some(Utc::now() - Duration::hours(1)),
        })
        .await
        .unwrap();

    let (status, _) = app
        .request(
            Method::POST,
            "/users/password-reset/confirm",
            None,
            Some(json!({"token": stale, "new_password": "whatever"})),
        )
        .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn server_version_is_public() {
    let app = TestApp::new();
    let (status, body) = app
        .request(Method::GET, "/server-version", None, None)
        .await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body, format!("v{}", env!("CARGO_PKG_VERSION")));
}
