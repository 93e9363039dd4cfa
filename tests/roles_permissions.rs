//! Role, permission, user and dictionary administration.

mod common;

use boardroom::authz::catalog::COMPANY_USER_ROLE;
use common::TestApp;
use serde_json::{json, Value};
use serial_test::serial;

async fn permission_id(app: &TestApp, name: &str) -> i64 {
    let catalog: Vec<Value> = app
        .get("/permissions", &app.admin.access_token)
        .await
        .json()
        .await
        .unwrap();
    catalog
        .iter()
        .find(|p| p["name"] == name)
        .and_then(|p| p["id"].as_i64())
        .unwrap()
}

// ============================================================================
// Roles
// ============================================================================

#[tokio::test]
#[serial]
async fn create_role_with_grants() {
    let app = TestApp::spawn().await;
    let read = permission_id(&app, "projects:read").await;
    let name = TestApp::unique("auditor");

    let response = app
        .post(
            "/roles",
            &app.admin.access_token,
            json!({ "name": name, "description": "Read-only", "permission_ids": [read] }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["name"], name.as_str());
    assert_eq!(body["permissions"], json!(["projects:read"]));
}

#[tokio::test]
#[serial]
async fn create_role_with_unknown_permission_is_not_found() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/roles",
            &app.admin.access_token,
            json!({ "name": TestApp::unique("role"), "permission_ids": [999999] }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
#[serial]
async fn duplicate_role_name_conflicts() {
    let app = TestApp::spawn().await;
    let name = TestApp::unique("role");

    let first = app
        .post("/roles", &app.admin.access_token, json!({ "name": name }))
        .await;
    assert_eq!(first.status().as_u16(), 201);

    let second = app
        .post("/roles", &app.admin.access_token, json!({ "name": name }))
        .await;
    assert_eq!(second.status().as_u16(), 409);
}

#[tokio::test]
#[serial]
async fn update_role_replaces_grants() {
    let app = TestApp::spawn().await;
    let role_id = app.create_role(&["projects:read"]);
    let update = permission_id(&app, "projects:update").await;

    let response = app
        .patch(
            &format!("/roles/{}", role_id),
            &app.admin.access_token,
            json!({ "permission_ids": [update] }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["permissions"], json!(["projects:update"]));
}

#[tokio::test]
#[serial]
async fn built_in_role_cannot_be_deleted() {
    let app = TestApp::spawn().await;
    let role_id = app.role_id(COMPANY_USER_ROLE);

    let response = app
        .delete(&format!("/roles/{}", role_id), &app.admin.access_token)
        .await;

    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
#[serial]
async fn assigned_role_cannot_be_deleted_until_released() {
    let app = TestApp::spawn().await;
    let role_id = app.create_role(&["projects:read"]);
    let user = app.create_user(None, &[role_id]).await;
    let path = format!("/roles/{}", role_id);

    let response = app.delete(&path, &app.admin.access_token).await;
    assert_eq!(response.status().as_u16(), 409);

    app.delete(
        &format!("/users/{}/roles/{}", user.id, role_id),
        &app.admin.access_token,
    )
    .await;

    let response = app.delete(&path, &app.admin.access_token).await;
    assert_eq!(response.status().as_u16(), 204);
    assert_eq!(app.count_events("role.deleted", role_id), 1);
}

// ============================================================================
// Permissions
// ============================================================================

#[tokio::test]
#[serial]
async fn permission_crud_round() {
    let app = TestApp::spawn().await;
    let token = &app.admin.access_token;
    let name = format!("{}:export", TestApp::unique("reports"));

    let response = app
        .post("/permissions", token, json!({ "name": name }))
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let permission: Value = response.json().await.unwrap();
    let path = format!("/permissions/{}", permission["id"]);

    let response = app
        .patch(&path, token, json!({ "description": "Export reports" }))
        .await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["description"], "Export reports");
    assert_eq!(body["name"], name.as_str());

    let duplicate = app.post("/permissions", token, json!({ "name": name })).await;
    assert_eq!(duplicate.status().as_u16(), 409);

    assert_eq!(app.delete(&path, token).await.status().as_u16(), 204);
    assert_eq!(app.get(&path, token).await.status().as_u16(), 404);
}

#[tokio::test]
#[serial]
async fn granted_permission_cannot_be_deleted() {
    let app = TestApp::spawn().await;
    let token = &app.admin.access_token;
    let name = format!("{}:export", TestApp::unique("reports"));
    let permission: Value = app
        .post("/permissions", token, json!({ "name": name }))
        .await
        .json()
        .await
        .unwrap();
    app.create_role(&[name.as_str()]);

    let response = app
        .delete(&format!("/permissions/{}", permission["id"]), token)
        .await;

    assert_eq!(response.status().as_u16(), 409);
}

// ============================================================================
// Users
// ============================================================================

#[tokio::test]
#[serial]
async fn admin_creates_and_lists_users() {
    let app = TestApp::spawn().await;
    let company = app.create_company();
    let email = TestApp::unique_email();

    let response = app
        .post(
            "/users",
            &app.admin.access_token,
            json!({
                "email": email,
                "password": "Str0ng!Passw0rd",
                "full_name": "Dispatcher",
                "company_id": company.id,
                "role_ids": [app.role_id(COMPANY_USER_ROLE)]
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let user: Value = response.json().await.unwrap();
    assert_eq!(user["company_id"], company.id);
    assert_eq!(user["status"], "ACTIVE");
    assert_eq!(user["roles"], json!([COMPANY_USER_ROLE]));

    let page: Value = app
        .get("/users?page=1&per_page=1", &app.admin.access_token)
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(page["data"].as_array().unwrap().len(), 1);
    assert_eq!(page["pagination"]["per_page"], 1);
    assert!(page["pagination"]["total_count"].as_i64().unwrap() >= 2);
}

#[tokio::test]
#[serial]
async fn duplicate_email_conflicts() {
    let app = TestApp::spawn().await;
    let existing = app.create_user(None, &[]).await;

    let response = app
        .post(
            "/users",
            &app.admin.access_token,
            json!({
                "email": existing.email.to_uppercase(),
                "password": "Str0ng!Passw0rd",
                "full_name": "Copy"
            }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
#[serial]
async fn patch_user_updates_profile_fields() {
    let app = TestApp::spawn().await;
    let user = app.create_user(None, &[]).await;

    let response = app
        .patch(
            &format!("/users/{}", user.id),
            &app.admin.access_token,
            json!({ "full_name": "Renamed", "phone": "+100200300" }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["full_name"], "Renamed");
    assert_eq!(body["phone"], "+100200300");
}

#[tokio::test]
#[serial]
async fn admin_cannot_delete_themselves() {
    let app = TestApp::spawn().await;

    let response = app
        .delete(&format!("/users/{}", app.admin.id), &app.admin.access_token)
        .await;

    assert_eq!(response.status().as_u16(), 400);
}

#[tokio::test]
#[serial]
async fn deleted_user_is_hidden_and_cannot_log_in() {
    let app = TestApp::spawn().await;
    let user = app.create_user(None, &[]).await;
    let path = format!("/users/{}", user.id);

    assert_eq!(app.delete(&path, &app.admin.access_token).await.status().as_u16(), 204);
    assert_eq!(app.get(&path, &app.admin.access_token).await.status().as_u16(), 404);

    let login = app.login(&user.email, common::TEST_PASSWORD).await;
    assert_eq!(login.status().as_u16(), 401);
}

#[tokio::test]
#[serial]
async fn assigning_a_role_twice_conflicts() {
    let app = TestApp::spawn().await;
    let role_id = app.create_role(&["projects:read"]);
    let user = app.create_user(None, &[]).await;
    let path = format!("/users/{}/roles", user.id);

    let first = app
        .post(&path, &app.admin.access_token, json!({ "role_id": role_id }))
        .await;
    assert_eq!(first.status().as_u16(), 200);

    let second = app
        .post(&path, &app.admin.access_token, json!({ "role_id": role_id }))
        .await;
    assert_eq!(second.status().as_u16(), 409);

    let unassigned = app
        .delete(
            &format!("/users/{}/roles/{}", user.id, app.role_id(COMPANY_USER_ROLE)),
            &app.admin.access_token,
        )
        .await;
    assert_eq!(unassigned.status().as_u16(), 400);
}

// ============================================================================
// Dictionaries
// ============================================================================

#[tokio::test]
#[serial]
async fn dictionary_entry_lifecycle() {
    let app = TestApp::spawn().await;
    let token = &app.admin.access_token;
    let name = TestApp::unique("north");

    let response = app.post("/regions", token, json!({ "name": name })).await;
    assert_eq!(response.status().as_u16(), 201);
    let region: Value = response.json().await.unwrap();
    let path = format!("/regions/{}", region["id"]);

    let duplicate = app.post("/regions", token, json!({ "name": name })).await;
    assert_eq!(duplicate.status().as_u16(), 409);

    let renamed = TestApp::unique("south");
    let response = app.patch(&path, token, json!({ "name": renamed })).await;
    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["name"], renamed.as_str());

    assert_eq!(app.delete(&path, token).await.status().as_u16(), 204);
    assert_eq!(app.get(&path, token).await.status().as_u16(), 404);
}

#[tokio::test]
#[serial]
async fn dictionary_entry_in_use_cannot_be_deleted() {
    let app = TestApp::spawn().await;
    let dict = app.create_dictionaries();
    let (_, column_id) = app.create_board_with_column().await;
    let response = app
        .post(
            "/projects",
            &app.admin.access_token,
            json!({
                "name": TestApp::unique("project"),
                "region_id": dict.region_id,
                "status_id": dict.status_id,
                "kanban_column_id": column_id
            }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let response = app
        .delete(
            &format!("/project-statuses/{}", dict.status_id),
            &app.admin.access_token,
        )
        .await;

    assert_eq!(response.status().as_u16(), 409);
}
