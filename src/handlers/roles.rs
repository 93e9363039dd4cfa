//! Role management handlers.

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
    services::roles::{self, RoleChanges, RoleView},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateRoleRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    #[schema(example = "PROJECT_MANAGER")]
    pub name: String,
    #[schema(example = "Can create and move projects")]
    pub description: Option<String>,
    /// Permissions granted to the role on creation.
    #[serde(default)]
    pub permission_ids: Vec<i32>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateRoleRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
    /// Replaces the full grant set when present.
    pub permission_ids: Option<Vec<i32>>,
}

#[utoipa::path(
    post,
    path = "/roles",
    tag = "Roles",
    request_body = CreateRoleRequest,
    responses(
        (status = 201, description = "Role created with its grants", body = RoleView),
        (status = 404, description = "Unknown permission ids", body = ApiError),
        (status = 409, description = "Role name already exists", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_role(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Json(payload): Json<CreateRoleRequest>,
) -> ApiResult<(StatusCode, Json<RoleView>)> {
    validate_body(&payload)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let role = roles::create_role(
        &mut conn,
        payload.name.trim(),
        payload.description,
        &payload.permission_ids,
        session.user_id,
    )?;
    Ok((StatusCode::CREATED, Json(role)))
}

#[utoipa::path(
    get,
    path = "/roles",
    tag = "Roles",
    responses((status = 200, description = "Roles with their permission names", body = Vec<RoleView>)),
    security(("bearer_auth" = []))
)]
pub async fn list_roles(State(state): State<AppState>) -> ApiResult<Json<Vec<RoleView>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(roles::list_roles(&mut conn)?))
}

#[utoipa::path(
    get,
    path = "/roles/{id}",
    tag = "Roles",
    params(("id" = i32, Path, description = "Role ID")),
    responses(
        (status = 200, description = "Role", body = RoleView),
        (status = 404, description = "Role not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_role(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<RoleView>> {
    let id = parse_id(&id, "role id")?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(roles::get_role(&mut conn, id)?))
}

#[utoipa::path(
    patch,
    path = "/roles/{id}",
    tag = "Roles",
    params(("id" = i32, Path, description = "Role ID")),
    request_body = UpdateRoleRequest,
    responses(
        (status = 200, description = "Role updated", body = RoleView),
        (status = 404, description = "Role or permission not found", body = ApiError),
        (status = 409, description = "Role name already exists", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_role(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateRoleRequest>,
) -> ApiResult<Json<RoleView>> {
    let id = parse_id(&id, "role id")?;
    validate_body(&payload)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let changes = RoleChanges {
        name: payload.name.map(|n| n.trim().to_string()),
        description: payload.description,
    };
    Ok(Json(roles::update_role(
        &mut conn,
        id,
        changes,
        payload.permission_ids.as_deref(),
        session.user_id,
    )?))
}

#[utoipa::path(
    delete,
    path = "/roles/{id}",
    tag = "Roles",
    params(("id" = i32, Path, description = "Role ID")),
    responses(
        (status = 204, description = "Role deleted"),
        (status = 404, description = "Role not found", body = ApiError),
        (status = 409, description = "Role is built in or still assigned", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_role(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id, "role id")?;
    let mut conn = get_db_conn(&state.db_pool)?;
    roles::delete_role(&mut conn, id, session.user_id)?;
    Ok(StatusCode::NO_CONTENT)
}
