//! Route guards: required permissions, company scoping and admin bypass.

mod common;

use boardroom::authz::catalog::{COMPANY_ADMIN_ROLE, COMPANY_USER_ROLE};
use common::TestApp;
use serde_json::{json, Value};
use serial_test::serial;

#[tokio::test]
#[serial]
async fn missing_permission_is_forbidden_and_named() {
    let app = TestApp::spawn().await;
    let user = app.create_user(None, &[]).await;

    let response = app.get("/roles", &user.access_token).await;

    assert_eq!(response.status().as_u16(), 403);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["code"], "MISSING_PERMISSIONS");
    assert!(body["error"].as_str().unwrap().contains("roles:manage"));
}

#[tokio::test]
#[serial]
async fn granted_permission_opens_the_route() {
    let app = TestApp::spawn().await;
    let user = app.user_with_permissions(None, &["roles:manage"]).await;

    let response = app.get("/roles", &user.access_token).await;

    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
#[serial]
async fn admin_bypasses_permission_checks() {
    let app = TestApp::spawn().await;

    for path in ["/roles", "/permissions", "/users", "/companies"] {
        let response = app.get(path, &app.admin.access_token).await;
        assert_eq!(response.status().as_u16(), 200, "admin denied on {}", path);
    }
}

#[tokio::test]
#[serial]
async fn revoked_role_takes_effect_without_new_token() {
    let app = TestApp::spawn().await;
    let role_id = app.create_role(&["roles:manage"]);
    let user = app.create_user(None, &[role_id]).await;
    assert_eq!(app.get("/roles", &user.access_token).await.status().as_u16(), 200);

    let response = app
        .delete(
            &format!("/users/{}/roles/{}", user.id, role_id),
            &app.admin.access_token,
        )
        .await;
    assert_eq!(response.status().as_u16(), 200);

    let response = app.get("/roles", &user.access_token).await;
    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
#[serial]
async fn company_user_cannot_reach_another_company() {
    let app = TestApp::spawn().await;
    let own = app.create_company();
    let other = app.create_company();
    let user = app
        .create_user(Some(own.id), &[app.role_id(COMPANY_ADMIN_ROLE)])
        .await;

    let allowed = app
        .get(&format!("/companies/{}/users", own.id), &user.access_token)
        .await;
    assert_eq!(allowed.status().as_u16(), 200);

    let denied = app
        .get(&format!("/companies/{}/users", other.id), &user.access_token)
        .await;
    assert_eq!(denied.status().as_u16(), 403);
    let body: Value = denied.json().await.unwrap();
    assert_eq!(body["code"], "FORBIDDEN");
}

#[tokio::test]
#[serial]
async fn user_without_company_is_denied_company_routes() {
    let app = TestApp::spawn().await;
    let company = app.create_company();
    let user = app
        .user_with_permissions(None, &["company-users:list"])
        .await;

    let response = app
        .get(&format!("/companies/{}/users", company.id), &user.access_token)
        .await;

    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
#[serial]
async fn non_numeric_company_id_is_forbidden() {
    let app = TestApp::spawn().await;
    let company = app.create_company();
    let user = app
        .create_user(Some(company.id), &[app.role_id(COMPANY_ADMIN_ROLE)])
        .await;

    let response = app.get("/companies/abc/users", &user.access_token).await;

    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
#[serial]
async fn company_user_role_is_read_only() {
    let app = TestApp::spawn().await;
    let company = app.create_company();
    let user = app
        .create_user(Some(company.id), &[app.role_id(COMPANY_USER_ROLE)])
        .await;

    let read = app
        .get(
            &format!("/companies/{}/users/{}", company.id, user.id),
            &user.access_token,
        )
        .await;
    assert_eq!(read.status().as_u16(), 200);

    let invite = app
        .post(
            &format!("/companies/{}/invitations", company.id),
            &user.access_token,
            json!({ "email": TestApp::unique_email() }),
        )
        .await;
    assert_eq!(invite.status().as_u16(), 403);
}

#[tokio::test]
#[serial]
async fn admin_may_act_on_any_company() {
    let app = TestApp::spawn().await;
    let company = app.create_company();

    let response = app
        .get(
            &format!("/companies/{}/users", company.id),
            &app.admin.access_token,
        )
        .await;

    assert_eq!(response.status().as_u16(), 200);
}

#[tokio::test]
#[serial]
async fn dictionaries_are_readable_but_not_writable_without_permission() {
    let app = TestApp::spawn().await;
    let user = app.create_user(None, &[]).await;

    let read = app.get("/regions", &user.access_token).await;
    assert_eq!(read.status().as_u16(), 200);

    let write = app
        .post(
            "/regions",
            &user.access_token,
            json!({ "name": TestApp::unique("region") }),
        )
        .await;
    assert_eq!(write.status().as_u16(), 403);
}
