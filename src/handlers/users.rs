//! System-level user administration.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::{PasswordService, SessionContext},
    error::{get_db_conn, parse_id, ApiError, ApiResult, ServiceError},
    handlers::{companies::AssignRoleRequest, double_option, validate_body},
    models::UserStatus,
    pagination::{PaginatedResponse, PaginationMeta, PaginationParams},
    services::{
        directory::UserView,
        users::{self, AccountChanges, NewAccount},
    },
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "jane.doe@example.com")]
    pub email: String,
    pub password: String,
    #[validate(length(min = 1, max = 255, message = "Full name is required"))]
    pub full_name: String,
    #[serde(default)]
    pub is_admin: bool,
    pub status: Option<UserStatus>,
    pub region_id: Option<i32>,
    pub company_id: Option<i32>,
    #[serde(default)]
    pub role_ids: Vec<i32>,
    pub phone: Option<String>,
    pub position: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[validate(length(min = 1, max = 255, message = "Full name must not be empty"))]
    pub full_name: Option<String>,
    pub is_admin: Option<bool>,
    pub status: Option<UserStatus>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<i32>)]
    pub region_id: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<i32>)]
    pub company_id: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub position: Option<Option<String>>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserListResponse {
    pub data: Vec<UserView>,
    pub pagination: PaginationMeta,
}

#[utoipa::path(
    post,
    path = "/users",
    tag = "Users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserView),
        (status = 400, description = "Validation error or weak password", body = ApiError),
        (status = 404, description = "Company or role not found", body = ApiError),
        (status = 409, description = "Email already registered", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Json(payload): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserView>)> {
    validate_body(&payload)?;
    state
        .password_policy
        .validate(&payload.password)
        .map_err(ServiceError::from)?;

    let password_hash = PasswordService::hash(&payload.password, state.password_hash_cost)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let user = users::create_user(
        &mut conn,
        NewAccount {
            email: payload.email,
            password_hash,
            full_name: payload.full_name,
            is_admin: payload.is_admin,
            status: payload.status.unwrap_or(UserStatus::Active),
            region_id: payload.region_id,
            company_id: payload.company_id,
            role_ids: payload.role_ids,
            phone: payload.phone,
            position: payload.position,
        },
        session.user_id,
    )?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    get,
    path = "/users",
    tag = "Users",
    params(PaginationParams),
    responses((status = 200, description = "Paginated live users", body = UserListResponse)),
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Query(page): Query<PaginationParams>,
) -> ApiResult<Json<UserListResponse>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let (data, total) = users::list_users(&mut conn, &page)?;
    let page = PaginatedResponse::from_params(data, &page, total);
    Ok(Json(UserListResponse {
        data: page.data,
        pagination: page.pagination,
    }))
}

#[utoipa::path(
    get,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 200, description = "User", body = UserView),
        (status = 404, description = "User not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<UserView>> {
    let id = parse_id(&id, "user id")?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(users::get_user(&mut conn, id)?))
}

#[utoipa::path(
    patch,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = i32, Path, description = "User ID")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserView),
        (status = 404, description = "User or company not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserView>> {
    let id = parse_id(&id, "user id")?;
    validate_body(&payload)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let changes = AccountChanges {
        full_name: payload.full_name,
        is_admin: payload.is_admin,
        status: payload.status,
        region_id: payload.region_id,
        company_id: payload.company_id,
        phone: payload.phone,
        position: payload.position,
    };
    Ok(Json(users::update_user(&mut conn, id, changes)?))
}

#[utoipa::path(
    delete,
    path = "/users/{id}",
    tag = "Users",
    params(("id" = i32, Path, description = "User ID")),
    responses(
        (status = 204, description = "User soft-deleted"),
        (status = 400, description = "Cannot delete own account", body = ApiError),
        (status = 404, description = "User not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id, "user id")?;
    let mut conn = get_db_conn(&state.db_pool)?;
    users::delete_user(&mut conn, id, session.user_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/users/{id}/roles",
    tag = "Users",
    params(("id" = i32, Path, description = "User ID")),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = UserView),
        (status = 404, description = "User or role not found", body = ApiError),
        (status = 409, description = "Role already assigned", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn assign_role(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(id): Path<String>,
    Json(payload): Json<AssignRoleRequest>,
) -> ApiResult<Json<UserView>> {
    let id = parse_id(&id, "user id")?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(users::assign_role(
        &mut conn,
        id,
        payload.role_id,
        session.user_id,
    )?))
}

#[utoipa::path(
    delete,
    path = "/users/{id}/roles/{role_id}",
    tag = "Users",
    params(
        ("id" = i32, Path, description = "User ID"),
        ("role_id" = i32, Path, description = "Role ID")
    ),
    responses(
        (status = 200, description = "Role removed", body = UserView),
        (status = 400, description = "Role is not assigned", body = ApiError),
        (status = 404, description = "User or role not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn remove_role(
    State(state): State<AppState>,
    Path((id, role_id)): Path<(String, String)>,
) -> ApiResult<Json<UserView>> {
    let id = parse_id(&id, "user id")?;
    let role_id = parse_id(&role_id, "role id")?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(users::remove_role(&mut conn, id, role_id)?))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_status_deserializes_uppercase() {
        let request: UpdateUserRequest =
            serde_json::from_str(r#"{"status": "SUSPENDED"}"#).unwrap();
        assert_eq!(request.status, Some(UserStatus::Suspended));
    }

    #[test]
    fn test_create_request_defaults() {
        let request: CreateUserRequest = serde_json::from_str(
            r#"{"email": "a@example.com", "password": "x", "full_name": "A"}"#,
        )
        .unwrap();
        assert!(!request.is_admin);
        assert!(request.role_ids.is_empty());
        assert!(request.status.is_none());
    }
}
