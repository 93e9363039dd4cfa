//! Kanban boards, membership and column ordering.

mod common;

use boardroom::{
    error::ServiceError,
    models::KanbanColumn,
    schema::kanban_columns,
    services::columns::{apply_positions, ReorderItem},
};
use common::TestApp;
use diesel::prelude::*;
use serde_json::{json, Value};
use serial_test::serial;

async fn column(app: &TestApp, board_id: i32, name: &str) -> i32 {
    let response = app
        .post(
            "/kanban-columns",
            &app.admin.access_token,
            json!({ "board_id": board_id, "name": name }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    body["id"].as_i64().unwrap() as i32
}

fn positions(app: &TestApp, board_id: i32) -> Vec<(i32, i32)> {
    kanban_columns::table
        .filter(kanban_columns::board_id.eq(board_id))
        .order(kanban_columns::id.asc())
        .select((kanban_columns::id, kanban_columns::position))
        .load(&mut app.conn())
        .unwrap()
}

// ============================================================================
// Boards
// ============================================================================

#[tokio::test]
#[serial]
async fn create_board_issues_a_join_code() {
    let app = TestApp::spawn().await;

    let response = app
        .post(
            "/kanban-boards",
            &app.admin.access_token,
            json!({ "name": "Operations", "description": "Field work" }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 201);
    let body: Value = response.json().await.unwrap();
    assert_eq!(body["name"], "Operations");
    assert_eq!(body["code"].as_str().unwrap().len(), 10);
}

#[tokio::test]
#[serial]
async fn member_sees_only_their_boards() {
    let app = TestApp::spawn().await;
    let (mine, _) = app.create_board_with_column().await;
    let (theirs, _) = app.create_board_with_column().await;
    let user = app.create_user(None, &[]).await;

    let response = app
        .post(
            &format!("/kanban-boards/{}/members", mine),
            &app.admin.access_token,
            json!({ "user_id": user.id }),
        )
        .await;
    assert_eq!(response.status().as_u16(), 201);

    let list: Value = app
        .get("/kanban-boards", &user.access_token)
        .await
        .json()
        .await
        .unwrap();
    let ids: Vec<i64> = list
        .as_array()
        .unwrap()
        .iter()
        .map(|b| b["id"].as_i64().unwrap())
        .collect();
    assert_eq!(ids, vec![mine as i64]);
    assert_eq!(list[0]["columns"].as_array().unwrap().len(), 1);

    let denied = app
        .get(&format!("/kanban-boards/{}", theirs), &user.access_token)
        .await;
    assert_eq!(denied.status().as_u16(), 403);
}

#[tokio::test]
#[serial]
async fn unknown_board_is_forbidden_for_non_admin_and_missing_for_admin() {
    let app = TestApp::spawn().await;
    let user = app.create_user(None, &[]).await;

    let response = app.get("/kanban-boards/999999", &user.access_token).await;
    assert_eq!(response.status().as_u16(), 403);

    let response = app.get("/kanban-boards/999999", &app.admin.access_token).await;
    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
#[serial]
async fn adding_the_same_member_twice_conflicts() {
    let app = TestApp::spawn().await;
    let (board_id, _) = app.create_board_with_column().await;
    let user = app.create_user(None, &[]).await;
    let path = format!("/kanban-boards/{}/members", board_id);

    let first = app
        .post(&path, &app.admin.access_token, json!({ "user_id": user.id }))
        .await;
    assert_eq!(first.status().as_u16(), 201);
    assert_eq!(app.count_events("kanban.member.added", board_id), 1);

    let second = app
        .post(&path, &app.admin.access_token, json!({ "user_id": user.id }))
        .await;
    assert_eq!(second.status().as_u16(), 409);
}

#[tokio::test]
#[serial]
async fn removed_member_loses_access() {
    let app = TestApp::spawn().await;
    let (board_id, _) = app.create_board_with_column().await;
    let user = app.create_user(None, &[]).await;
    app.post(
        &format!("/kanban-boards/{}/members", board_id),
        &app.admin.access_token,
        json!({ "user_id": user.id }),
    )
    .await;

    let response = app
        .delete(
            &format!("/kanban-boards/{}/members/{}", board_id, user.id),
            &app.admin.access_token,
        )
        .await;
    assert_eq!(response.status().as_u16(), 204);

    let response = app
        .get(&format!("/kanban-boards/{}", board_id), &user.access_token)
        .await;
    assert_eq!(response.status().as_u16(), 403);

    let again = app
        .delete(
            &format!("/kanban-boards/{}/members/{}", board_id, user.id),
            &app.admin.access_token,
        )
        .await;
    assert_eq!(again.status().as_u16(), 404);
}

#[tokio::test]
#[serial]
async fn joining_by_code_is_idempotent() {
    let app = TestApp::spawn().await;
    let board: Value = app
        .post(
            "/kanban-boards",
            &app.admin.access_token,
            json!({ "name": TestApp::unique("board") }),
        )
        .await
        .json()
        .await
        .unwrap();
    let code = board["code"].as_str().unwrap();
    let user = app.create_user(None, &[]).await;

    for _ in 0..2 {
        let response = app
            .post("/kanban-boards/join", &user.access_token, json!({ "code": code }))
            .await;
        assert_eq!(response.status().as_u16(), 200);
    }

    let members: Value = app
        .get(
            &format!("/kanban-boards/{}/members", board["id"]),
            &app.admin.access_token,
        )
        .await
        .json()
        .await
        .unwrap();
    assert_eq!(members.as_array().unwrap().len(), 1);
}

#[tokio::test]
#[serial]
async fn join_with_unknown_code_is_not_found() {
    let app = TestApp::spawn().await;
    let user = app.create_user(None, &[]).await;

    let response = app
        .post(
            "/kanban-boards/join",
            &user.access_token,
            json!({ "code": "no-such-code" }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 404);
}

#[tokio::test]
#[serial]
async fn update_board_can_clear_description() {
    let app = TestApp::spawn().await;
    let board: Value = app
        .post(
            "/kanban-boards",
            &app.admin.access_token,
            json!({ "name": TestApp::unique("board"), "description": "temp" }),
        )
        .await
        .json()
        .await
        .unwrap();

    let response = app
        .patch(
            &format!("/kanban-boards/{}", board["id"]),
            &app.admin.access_token,
            json!({ "description": null }),
        )
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let body: Value = response.json().await.unwrap();
    assert!(body["description"].is_null());
    assert_eq!(body["name"], board["name"]);
}

// ============================================================================
// Columns
// ============================================================================

#[tokio::test]
#[serial]
async fn columns_are_appended_in_order() {
    let app = TestApp::spawn().await;
    let (board_id, first) = app.create_board_with_column().await;
    let second = column(&app, board_id, "Doing").await;
    let third = column(&app, board_id, "Done").await;

    let response = app
        .get(
            &format!("/kanban-columns/board/{}", board_id),
            &app.admin.access_token,
        )
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let columns: Vec<Value> = response.json().await.unwrap();
    let order: Vec<(i64, i64)> = columns
        .iter()
        .map(|c| (c["id"].as_i64().unwrap(), c["position"].as_i64().unwrap()))
        .collect();
    assert_eq!(
        order,
        vec![(first as i64, 0), (second as i64, 1), (third as i64, 2)]
    );
}

#[tokio::test]
#[serial]
async fn reorder_applies_every_position() {
    let app = TestApp::spawn().await;
    let (board_id, first) = app.create_board_with_column().await;
    let second = column(&app, board_id, "Doing").await;

    let response = app
        .patch(
            "/kanban-columns/reorder",
            &app.admin.access_token,
            json!([
                { "id": first, "position": 1 },
                { "id": second, "position": 0 }
            ]),
        )
        .await;

    assert_eq!(response.status().as_u16(), 200);
    let columns: Vec<Value> = response.json().await.unwrap();
    assert_eq!(columns[0]["id"], second);
    assert_eq!(positions(&app, board_id), vec![(first, 1), (second, 0)]);
}

#[tokio::test]
#[serial]
async fn reorder_across_boards_is_rejected_without_changes() {
    let app = TestApp::spawn().await;
    let (board_a, col_a) = app.create_board_with_column().await;
    let (board_b, col_b) = app.create_board_with_column().await;

    let response = app
        .patch(
            "/kanban-columns/reorder",
            &app.admin.access_token,
            json!([
                { "id": col_a, "position": 5 },
                { "id": col_b, "position": 6 }
            ]),
        )
        .await;

    assert_eq!(response.status().as_u16(), 400);
    assert_eq!(positions(&app, board_a), vec![(col_a, 0)]);
    assert_eq!(positions(&app, board_b), vec![(col_b, 0)]);
}

#[tokio::test]
#[serial]
async fn reorder_with_unknown_column_is_not_found() {
    let app = TestApp::spawn().await;
    let (board_id, first) = app.create_board_with_column().await;

    let response = app
        .patch(
            "/kanban-columns/reorder",
            &app.admin.access_token,
            json!([
                { "id": first, "position": 3 },
                { "id": 999999, "position": 4 }
            ]),
        )
        .await;

    assert_eq!(response.status().as_u16(), 404);
    assert_eq!(positions(&app, board_id), vec![(first, 0)]);
}

#[tokio::test]
#[serial]
async fn failed_position_write_rolls_back_earlier_writes() {
    let app = TestApp::spawn().await;
    let (board_id, first) = app.create_board_with_column().await;
    let mut conn = app.conn();

    let result: Result<(), ServiceError> = conn.transaction(|conn| {
        apply_positions(
            conn,
            &[
                ReorderItem { id: first, position: 7 },
                ReorderItem { id: 999999, position: 8 },
            ],
        )
    });

    assert!(matches!(result, Err(ServiceError::NotFound(_))));
    let column: KanbanColumn = kanban_columns::table
        .find(first)
        .select(KanbanColumn::as_select())
        .first(&mut conn)
        .unwrap();
    assert_eq!(column.position, 0);
    assert_eq!(positions(&app, board_id), vec![(first, 0)]);
}

#[tokio::test]
#[serial]
async fn non_member_cannot_reorder_even_with_permission() {
    let app = TestApp::spawn().await;
    let (_, first) = app.create_board_with_column().await;
    let user = app
        .user_with_permissions(None, &["kanban-columns:reorder"])
        .await;

    let response = app
        .patch(
            "/kanban-columns/reorder",
            &user.access_token,
            json!([{ "id": first, "position": 2 }]),
        )
        .await;

    assert_eq!(response.status().as_u16(), 403);
}

#[tokio::test]
#[serial]
async fn column_holding_projects_cannot_be_deleted() {
    let app = TestApp::spawn().await;
    let (_, column_id) = app.create_board_with_column().await;
    let dict = app.create_dictionaries();

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
            &format!("/kanban-columns/{}", column_id),
            &app.admin.access_token,
        )
        .await;
    assert_eq!(response.status().as_u16(), 409);
}

#[tokio::test]
#[serial]
async fn empty_column_is_deleted() {
    let app = TestApp::spawn().await;
    let (board_id, column_id) = app.create_board_with_column().await;

    let response = app
        .delete(
            &format!("/kanban-columns/{}", column_id),
            &app.admin.access_token,
        )
        .await;

    assert_eq!(response.status().as_u16(), 204);
    assert!(positions(&app, board_id).is_empty());
}
