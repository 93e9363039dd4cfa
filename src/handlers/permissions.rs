//! Permission catalog handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    error::{get_db_conn, parse_id, ApiError, ApiResult},
    handlers::{double_option, validate_body},
    models::Permission,
    services::roles,
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreatePermissionRequest {
    #[validate(length(min = 1, max = 100, message = "Name must be 1-100 characters"))]
    #[schema(example = "reports:export")]
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdatePermissionRequest {
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub description: Option<Option<String>>,
}

#[utoipa::path(
    post,
    path = "/permissions",
    tag = "Permissions",
    request_body = CreatePermissionRequest,
    responses(
        (status = 201, description = "Permission created", body = Permission),
        (status = 409, description = "Permission name already exists", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_permission(
    State(state): State<AppState>,
    Json(payload): Json<CreatePermissionRequest>,
) -> ApiResult<(StatusCode, Json<Permission>)> {
    validate_body(&payload)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let permission =
        roles::create_permission(&mut conn, payload.name.trim(), payload.description)?;
    Ok((StatusCode::CREATED, Json(permission)))
}

#[utoipa::path(
    get,
    path = "/permissions",
    tag = "Permissions",
    responses((status = 200, description = "Catalog ordered by name", body = Vec<Permission>)),
    security(("bearer_auth" = []))
)]
pub async fn list_permissions(State(state): State<AppState>) -> ApiResult<Json<Vec<Permission>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(roles::list_permissions(&mut conn)?))
}

#[utoipa::path(
    get,
    path = "/permissions/{id}",
    tag = "Permissions",
    params(("id" = i32, Path, description = "Permission ID")),
    responses(
        (status = 200, description = "Permission", body = Permission),
        (status = 404, description = "Permission not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_permission(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Permission>> {
    let id = parse_id(&id, "permission id")?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(roles::find_permission(&mut conn, id)?))
}

#[utoipa::path(
    patch,
    path = "/permissions/{id}",
    tag = "Permissions",
    params(("id" = i32, Path, description = "Permission ID")),
    request_body = UpdatePermissionRequest,
    responses(
        (status = 200, description = "Permission updated", body = Permission),
        (status = 404, description = "Permission not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_permission(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdatePermissionRequest>,
) -> ApiResult<Json<Permission>> {
    let id = parse_id(&id, "permission id")?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(roles::update_permission(
        &mut conn,
        id,
        payload.description,
    )?))
}

#[utoipa::path(
    delete,
    path = "/permissions/{id}",
    tag = "Permissions",
    params(("id" = i32, Path, description = "Permission ID")),
    responses(
        (status = 204, description = "Permission deleted"),
        (status = 404, description = "Permission not found", body = ApiError),
        (status = 409, description = "Permission is still granted to roles", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_permission(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id, "permission id")?;
    let mut conn = get_db_conn(&state.db_pool)?;
    roles::delete_permission(&mut conn, id)?;
    Ok(StatusCode::NO_CONTENT)
}
