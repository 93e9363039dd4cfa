//! Login, refresh rotation, logout and invitation registration.

mod common;

use boardroom::{authz::catalog::COMPANY_ADMIN_ROLE, models::UserStatus};
use common::{TestApp, TEST_PASSWORD};
use serde_json::{json, Value};
use serial_test::serial;

// ============================================================================
// Login
// ============================================================================

#[tokio::test]
#[serial]
async fn login_returns_tokens_and_sets_access_cookie() {
    let app = TestApp::spawn().await;
    let email = TestApp::unique_email();
    app.insert_user(&email, None, &[], UserStatus::Active);

    let response = app.login(&email, TEST_PASSWORD).await;

    assert_eq!(response.status().as_u16(), 200);
    let cookie = response
        .headers()
        .get("set-cookie")
        .and_then(|v| v.to_str().ok())
        .unwrap()
        .to_string();
    assert!(cookie.starts_with("access_token="));
    assert!(cookie.contains("HttpOnly"));

    let body: Value = response.json().await.unwrap();
    assert_eq!(body["user"]["email"], email.as_str());
    assert_eq!(body["user"]["scope"], "GLOBAL");
    assert!(body["access_token"].as_str().is_some());
    assert!(body["refresh_token"].as_str().is_some());
}

#[tokio::test]
#[serial]
async fn login_email_is_case_insensitive() {
    let app = TestApp::spawn().await;
    let email = TestApp::unique_email();
    app.insert_user(&email, None, &[], UserStatus::Active);

    let response = app.login(&email.to_uppercase(), TEST_PASSWORD).await;

    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
#[serial]
async fn login_with_wrong_password_is_rejected() {
    let app = TestApp::spawn().await;
    let email = TestApp::unique_email();
    app.insert_user(&email, None, &[], UserStatus::Active);

    let response = app.login(&email, "wrong-password").await;

    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
#[serial]
async fn login_with_unknown_email_looks_like_wrong_password() {
    let app = TestApp::spawn().await;

    let response = app.login(&TestApp::unique_email(), TEST_PASSWORD).await;

    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "INVALID_CREDENTIALS");
}

#[tokio::test]
#[serial]
async fn suspended_account_cannot_log_in() {
    let app = TestApp::spawn().await;
    let email = TestApp::unique_email();
    app.insert_user(&email, None, &[], UserStatus::Suspended);

    let response = app.login(&email, TEST_PASSWORD).await;

    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "ACCOUNT_NOT_ACTIVE");
}

#[tokio::test]
#[serial]
async fn login_rejects_malformed_email() {
    let app = TestApp::spawn().await;

    let response = app.login("not-an-email", TEST_PASSWORD).await;

    assert_eq!(response.status().as_u16(), 400);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "VALIDATION_ERROR");
}

// ============================================================================
// Refresh and logout
// ============================================================================

#[tokio::test]
#[serial]
async fn refresh_rotates_and_invalidates_the_previous_token() {
    let app = TestApp::spawn().await;
    let user = app.create_user(None, &[]).await;

    let response = app
        .post_public("/auth/refresh", json!({ "refresh_token": user.refresh_token }))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let rotated: Value = response.json().await.unwrap();
    let new_refresh = rotated["refresh_token"].as_str().unwrap();
    assert_ne!(new_refresh, user.refresh_token);

    let replay = app
        .post_public("/auth/refresh", json!({ "refresh_token": user.refresh_token }))
        .await;
    assert_eq!(replay.status().as_u16(), 401);

    let again = app
        .post_public("/auth/refresh", json!({ "refresh_token": new_refresh }))
        .await;
    assert_eq!(again.status().as_u16(), 200);
}

#[tokio::test]
#[serial]
async fn access_token_is_not_accepted_as_refresh_token() {
    let app = TestApp::spawn().await;
    let user = app.create_user(None, &[]).await;

    let response = app
        .post_public("/auth/refresh", json!({ "refresh_token": user.access_token }))
        .await;

    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
#[serial]
async fn logout_revokes_refresh_token_and_clears_cookie() {
    let app = TestApp::spawn().await;
    let user = app.create_user(None, &[]).await;

    let response = app.post("/auth/logout", &user.access_token, json!({})).await;
    assert_eq!(response.status().as_u16(), 200);
    let cookie = response.headers().get("set-cookie").unwrap().to_str().unwrap();
    assert!(cookie.contains("Max-Age=0"));

    let refresh = app
        .post_public("/auth/refresh", json!({ "refresh_token": user.refresh_token }))
        .await;
    assert_eq!(refresh.status().as_u16(), 401);
}

// ============================================================================
// Session endpoints
// ============================================================================

#[tokio::test]
#[serial]
async fn me_requires_a_token() {
    let app = TestApp::spawn().await;

    let response = app.get_public("/auth/me").await;

    assert_eq!(response.status().as_u16(), 401);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "MISSING_AUTH_TOKEN");
}

#[tokio::test]
#[serial]
async fn me_accepts_the_access_cookie() {
    let app = TestApp::spawn().await;
    let user = app.create_user(None, &[]).await;

    let response = app
        .client
        .get(app.url("/auth/me"))
        .header("Cookie", format!("access_token={}", user.access_token))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["user"]["id"], user.id);
    assert!(body["user"].get("password_hash").is_none());
}

#[tokio::test]
#[serial]
async fn token_of_deactivated_user_stops_working() {
    let app = TestApp::spawn().await;
    let user = app.create_user(None, &[]).await;

    let response = app
        .patch(
            &format!("/users/{}", user.id),
            &app.admin.access_token,
            json!({ "status": "INACTIVE" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let response = app.get("/auth/me", &user.access_token).await;
    assert_eq!(response.status().as_u16(), 401);
}

#[tokio::test]
#[serial]
async fn permissions_lists_grants_from_roles() {
    let app = TestApp::spawn().await;
    let company = app.create_company();
    let user = app
        .create_user(Some(company.id), &[app.role_id(COMPANY_ADMIN_ROLE)])
        .await;

    let response = app.get("/auth/permissions", &user.access_token).await;

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    let names: Vec<&str> = body["permissions"]
        .as_array()
        .unwrap()
        .iter()
        .filter_map(Value::as_str)
        .collect();
    assert!(names.contains(&"company-users:invite"));
    assert!(!names.contains(&"roles:manage"));
}

// ============================================================================
// Invitation registration
// ============================================================================

#[tokio::test]
#[serial]
async fn invitation_code_registers_a_company_user_once() {
    let app = TestApp::spawn().await;
    let company = app.create_company();
    let company_admin = app
        .create_user(Some(company.id), &[app.role_id(COMPANY_ADMIN_ROLE)])
        .await;
    let email = TestApp::unique_email();

    let response = app
        .post(
            &format!("/companies/{}/invitations", company.id),
            &company_admin.access_token,
            json!({ "email": email }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let invitation: Value = response.json().await.unwrap();
    let code = invitation["code"].as_str().unwrap().to_string();

    let response = app
        .post_public(
            "/auth/register",
            json!({ "code": code, "password": "Str0ng!Passw0rd", "full_name": "New Hire" }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["user"]["email"], email.as_str());
    assert_eq!(body["user"]["company_id"], company.id);
    assert_eq!(body["user"]["scope"], "COMPANY");

    let reuse = app
        .post_public(
            "/auth/register",
            json!({ "code": code, "password": "Str0ng!Passw0rd", "full_name": "Again" }),
        )
        .await;
    assert!(reuse.status().is_client_error());
}

#[tokio::test]
#[serial]
async fn register_with_unknown_code_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .post_public(
            "/auth/register",
            json!({ "code": "INV-0-NOPE", "password": "Str0ng!Passw0rd", "full_name": "X" }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
#[serial]
async fn register_rejects_short_password_before_touching_the_code() {
    let app = TestApp::spawn().await;

    let response = app
        .post_public(
            "/auth/register",
            json!({ "code": "INV-0-NOPE", "password": "short", "full_name": "X" }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 400);
}
