//! Kanban column handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::SessionContext,
    error::{get_db_conn, parse_id, ApiError, ApiResult},
    handlers::{double_option, validate_body},
    models::KanbanColumn,
    services::columns::{self, ColumnChanges, ReorderItem},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateColumnRequest {
    pub board_id: i32,
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    #[schema(example = "In progress")]
    pub name: String,
    /// Appended after the last column when omitted.
    #[validate(range(min = 0, message = "Position must not be negative"))]
    pub position: Option<i32>,
    #[validate(length(max = 32))]
    #[schema(example = "#ffaa00")]
    pub color: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateColumnRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,
    #[validate(range(min = 0, message = "Position must not be negative"))]
    pub position: Option<i32>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub color: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
}

#[utoipa::path(
    post,
    path = "/kanban-columns",
    tag = "Kanban Columns",
    request_body = CreateColumnRequest,
    responses(
        (status = 201, description = "Column created", body = KanbanColumn),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 404, description = "Board not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_column(
    State(state): State<AppState>,
    Json(payload): Json<CreateColumnRequest>,
) -> ApiResult<(StatusCode, Json<KanbanColumn>)> {
    validate_body(&payload)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let column = columns::create_column(
        &mut conn,
        payload.board_id,
        &payload.name,
        payload.position,
        payload.color,
        payload.description,
    )?;
    Ok((StatusCode::CREATED, Json(column)))
}

#[utoipa::path(
    patch,
    path = "/kanban-columns/reorder",
    tag = "Kanban Columns",
    request_body = Vec<ReorderItem>,
    responses(
        (status = 200, description = "Board columns in their new order", body = Vec<KanbanColumn>),
        (status = 400, description = "Columns span several boards", body = ApiError),
        (status = 403, description = "Not a member of the board", body = ApiError),
        (status = 404, description = "Unknown column ids", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn reorder_columns(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Json(items): Json<Vec<ReorderItem>>,
) -> ApiResult<Json<Vec<KanbanColumn>>> {
    for item in &items {
        validate_body(item)?;
    }
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(columns::reorder_columns(&mut conn, &session, &items)?))
}

#[utoipa::path(
    patch,
    path = "/kanban-columns/{id}",
    tag = "Kanban Columns",
    params(("id" = i32, Path, description = "Column ID")),
    request_body = UpdateColumnRequest,
    responses(
        (status = 200, description = "Column updated", body = KanbanColumn),
        (status = 404, description = "Column not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_column(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateColumnRequest>,
) -> ApiResult<Json<KanbanColumn>> {
    let id = parse_id(&id, "column id")?;
    validate_body(&payload)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let changes = ColumnChanges {
        name: payload.name,
        position: payload.position,
        color: payload.color,
        description: payload.description,
    };
    Ok(Json(columns::update_column(&mut conn, id, changes)?))
}

#[utoipa::path(
    get,
    path = "/kanban-columns/board/{board_id}",
    tag = "Kanban Columns",
    params(("board_id" = i32, Path, description = "Board ID")),
    responses(
        (status = 200, description = "Columns ordered by position", body = Vec<KanbanColumn>),
        (status = 403, description = "Not a member of the board", body = ApiError),
        (status = 404, description = "Board not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_board_columns(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(board_id): Path<String>,
) -> ApiResult<Json<Vec<KanbanColumn>>> {
    let board_id = parse_id(&board_id, "board id")?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(columns::list_board_columns(
        &mut conn, &session, board_id,
    )?))
}

#[utoipa::path(
    delete,
    path = "/kanban-columns/{id}",
    tag = "Kanban Columns",
    params(("id" = i32, Path, description = "Column ID")),
    responses(
        (status = 204, description = "Column deleted"),
        (status = 403, description = "Not a member of the board", body = ApiError),
        (status = 404, description = "Column not found", body = ApiError),
        (status = 409, description = "Column still holds projects", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_column(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id, "column id")?;
    let mut conn = get_db_conn(&state.db_pool)?;
    columns::delete_column(&mut conn, &session, id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reorder_body_is_a_plain_array() {
        let items: Vec<ReorderItem> =
            serde_json::from_str(r#"[{"id": 3, "position": 0}, {"id": 1, "position": 1}]"#)
                .unwrap();
        assert_eq!(items.len(), 2);
        assert_eq!(items[0].id, 3);
    }

    #[test]
    fn test_negative_position_is_rejected() {
        let item = ReorderItem { id: 1, position: -1 };
        assert!(validate_body(&item).is_err());

        let request = CreateColumnRequest {
            board_id: 1,
            name: "Done".to_string(),
            position: Some(-2),
            color: None,
            description: None,
        };
        assert!(request.validate().is_err());
    }
}
