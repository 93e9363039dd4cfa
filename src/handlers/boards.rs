//! Kanban board handlers: board lifecycle, membership and join-by-code.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::SessionContext,
    error::{get_db_conn, parse_id, ApiError, ApiResult},
    handlers::{double_option, validate_body},
    models::KanbanBoard,
    services::boards::{self, BoardChanges, BoardDetail, BoardMemberView},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateBoardRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    #[schema(example = "Field operations")]
    pub name: String,
    #[schema(example = "Work orders for the northern region")]
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateBoardRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,
    /// `null` clears the description.
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddMemberRequest {
    pub user_id: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct JoinBoardRequest {
    #[validate(length(min = 1, message = "Code is required"))]
    #[schema(example = "V1StGXR8_Z")]
    pub code: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MemberAddedResponse {
    pub board_id: i32,
    pub user_id: i32,
    pub joined_at: chrono::NaiveDateTime,
}

#[utoipa::path(
    get,
    path = "/kanban-boards",
    tag = "Kanban Boards",
    responses(
        (status = 200, description = "Boards visible to the caller", body = Vec<BoardDetail>),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_boards(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
) -> ApiResult<Json<Vec<BoardDetail>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(boards::list_boards(&mut conn, &session)?))
}

#[utoipa::path(
    post,
    path = "/kanban-boards",
    tag = "Kanban Boards",
    request_body = CreateBoardRequest,
    responses(
        (status = 201, description = "Board created", body = KanbanBoard),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 403, description = "Missing permission", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_board(
    State(state): State<AppState>,
    Json(payload): Json<CreateBoardRequest>,
) -> ApiResult<(StatusCode, Json<KanbanBoard>)> {
    validate_body(&payload)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let board = boards::create_board(&mut conn, &payload.name, payload.description)?;
    Ok((StatusCode::CREATED, Json(board)))
}

#[utoipa::path(
    get,
    path = "/kanban-boards/{id}",
    tag = "Kanban Boards",
    params(("id" = i32, Path, description = "Board ID")),
    responses(
        (status = 200, description = "Board with its columns", body = BoardDetail),
        (status = 403, description = "Not a member of this board", body = ApiError),
        (status = 404, description = "Board not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_board(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(id): Path<String>,
) -> ApiResult<Json<BoardDetail>> {
    let id = parse_id(&id, "board id")?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(boards::get_board(&mut conn, &session, id)?))
}

#[utoipa::path(
    patch,
    path = "/kanban-boards/{id}",
    tag = "Kanban Boards",
    params(("id" = i32, Path, description = "Board ID")),
    request_body = UpdateBoardRequest,
    responses(
        (status = 200, description = "Board updated", body = KanbanBoard),
        (status = 404, description = "Board not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_board(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateBoardRequest>,
) -> ApiResult<Json<KanbanBoard>> {
    let id = parse_id(&id, "board id")?;
    validate_body(&payload)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let changes = BoardChanges {
        name: payload.name,
        description: payload.description,
    };
    Ok(Json(boards::update_board(&mut conn, id, changes)?))
}

#[utoipa::path(
    post,
    path = "/kanban-boards/{id}/members",
    tag = "Kanban Boards",
    params(("id" = i32, Path, description = "Board ID")),
    request_body = AddMemberRequest,
    responses(
        (status = 201, description = "Member added", body = MemberAddedResponse),
        (status = 404, description = "Board or user not found", body = ApiError),
        (status = 409, description = "Already a member", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_member(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(id): Path<String>,
    Json(payload): Json<AddMemberRequest>,
) -> ApiResult<(StatusCode, Json<MemberAddedResponse>)> {
    let board_id = parse_id(&id, "board id")?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let member = boards::add_member(&mut conn, board_id, payload.user_id, session.user_id)?;
    Ok((
        StatusCode::CREATED,
        Json(MemberAddedResponse {
            board_id: member.board_id,
            user_id: member.user_id,
            joined_at: member.created_at,
        }),
    ))
}

#[utoipa::path(
    delete,
    path = "/kanban-boards/{id}/members/{user_id}",
    tag = "Kanban Boards",
    params(
        ("id" = i32, Path, description = "Board ID"),
        ("user_id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 204, description = "Member removed"),
        (status = 404, description = "Membership not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path((id, user_id)): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let board_id = parse_id(&id, "board id")?;
    let user_id = parse_id(&user_id, "user id")?;
    let mut conn = get_db_conn(&state.db_pool)?;

    boards::remove_member(&mut conn, board_id, user_id, session.user_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/kanban-boards/{id}/members",
    tag = "Kanban Boards",
    params(("id" = i32, Path, description = "Board ID")),
    responses(
        (status = 200, description = "Members in join order", body = Vec<BoardMemberView>)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_members(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<BoardMemberView>>> {
    let board_id = parse_id(&id, "board id")?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(boards::list_members(&mut conn, board_id)?))
}

#[utoipa::path(
    post,
    path = "/kanban-boards/join",
    tag = "Kanban Boards",
    request_body = JoinBoardRequest,
    responses(
        (status = 200, description = "Joined (or already a member)", body = BoardDetail),
        (status = 404, description = "Unknown code", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn join_board(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Json(payload): Json<JoinBoardRequest>,
) -> ApiResult<Json<BoardDetail>> {
    validate_body(&payload)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(boards::join_by_code(
        &mut conn,
        payload.code.trim(),
        session.user_id,
    )?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_request_distinguishes_null_description() {
        let cleared: UpdateBoardRequest =
            serde_json::from_str(r#"{"description": null}"#).unwrap();
        assert_eq!(cleared.description, Some(None));
        assert!(cleared.name.is_none());

        let untouched: UpdateBoardRequest = serde_json::from_str(r#"{"name": "Ops"}"#).unwrap();
        assert_eq!(untouched.description, None);
    }

    #[test]
    fn test_create_request_rejects_empty_name() {
        let request = CreateBoardRequest {
            name: String::new(),
            description: None,
        };
        assert!(request.validate().is_err());
    }
}
