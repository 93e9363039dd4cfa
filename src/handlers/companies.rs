//! Company administration and company-scoped user management.
//!
//! Routes under `/companies/{id}/...` are guarded by company scope: outside
//! system admins, only members of company `id` reach these handlers.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use serde::Deserialize;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::{PasswordService, SessionContext},
    error::{get_db_conn, parse_id, ApiError, ApiResult, ServiceError},
    handlers::{
        double_option,
        projects::{CreateProjectRequest, ProjectListResponse},
        validate_body,
    },
    models::{Company, RegistrationInvitation, UserStatus},
    pagination::{PaginatedResponse, PaginationParams},
    services::{
        directory::{self, CompanyChanges, CompanyUserChanges, NewCompanyUser, UserView},
        projects::{self, ProjectFilter, ProjectView},
    },
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCompanyRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    #[schema(example = "Acme LLC")]
    pub name: String,
    #[validate(length(max = 32))]
    #[schema(example = "7701234567")]
    pub inn: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateCompanyRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub inn: Option<Option<String>>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCompanyUserRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "john.doe@example.com")]
    pub email: String,
    #[validate(length(min = 1, max = 255, message = "Full name is required"))]
    pub full_name: String,
    pub password: String,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub region_id: Option<i32>,
    /// Defaults to COMPANY_USER.
    pub role_id: Option<i32>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddExistingUserRequest {
    pub user_id: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateCompanyUserRequest {
    #[validate(length(min = 1, max = 255, message = "Full name must not be empty"))]
    pub full_name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<i32>)]
    pub region_id: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub position: Option<Option<String>>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignRoleRequest {
    pub role_id: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateInvitationRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "new.hire@example.com")]
    pub email: String,
}

fn company_id(raw: &str) -> ApiResult<i32> {
    parse_id(raw, "company id")
}

fn company_user_ids(raw: (String, String)) -> ApiResult<(i32, i32)> {
    Ok((company_id(&raw.0)?, parse_id(&raw.1, "user id")?))
}

// ---------------------------------------------------------------------------
// Companies
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/companies",
    tag = "Companies",
    request_body = CreateCompanyRequest,
    responses(
        (status = 201, description = "Company created", body = Company),
        (status = 409, description = "Name or INN already in use", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_company(
    State(state): State<AppState>,
    Json(payload): Json<CreateCompanyRequest>,
) -> ApiResult<(StatusCode, Json<Company>)> {
    validate_body(&payload)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let company = directory::create_company(&mut conn, &payload.name, payload.inn)?;
    Ok((StatusCode::CREATED, Json(company)))
}

#[utoipa::path(
    get,
    path = "/companies",
    tag = "Companies",
    responses((status = 200, description = "All companies by name", body = Vec<Company>)),
    security(("bearer_auth" = []))
)]
pub async fn list_companies(State(state): State<AppState>) -> ApiResult<Json<Vec<Company>>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(directory::list_companies(&mut conn)?))
}

#[utoipa::path(
    get,
    path = "/companies/{id}",
    tag = "Companies",
    params(("id" = i32, Path, description = "Company ID")),
    responses(
        (status = 200, description = "Company", body = Company),
        (status = 404, description = "Company not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_company(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Company>> {
    let id = company_id(&id)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(directory::find_company(&mut conn, id)?))
}

#[utoipa::path(
    patch,
    path = "/companies/{id}",
    tag = "Companies",
    params(("id" = i32, Path, description = "Company ID")),
    request_body = UpdateCompanyRequest,
    responses(
        (status = 200, description = "Company updated", body = Company),
        (status = 404, description = "Company not found", body = ApiError),
        (status = 409, description = "Name or INN already in use", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_company(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateCompanyRequest>,
) -> ApiResult<Json<Company>> {
    let id = company_id(&id)?;
    validate_body(&payload)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let changes = CompanyChanges {
        name: payload.name,
        inn: payload.inn,
    };
    Ok(Json(directory::update_company(&mut conn, id, changes)?))
}

#[utoipa::path(
    delete,
    path = "/companies/{id}",
    tag = "Companies",
    params(("id" = i32, Path, description = "Company ID")),
    responses(
        (status = 204, description = "Company deleted"),
        (status = 404, description = "Company not found", body = ApiError),
        (status = 409, description = "Users or projects still reference the company", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_company(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = company_id(&id)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    directory::delete_company(&mut conn, id)?;
    Ok(StatusCode::NO_CONTENT)
}

// ---------------------------------------------------------------------------
// Company users
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/companies/{id}/users",
    tag = "Company Users",
    params(("id" = i32, Path, description = "Company ID")),
    responses(
        (status = 200, description = "Active members of the company", body = Vec<UserView>),
        (status = 403, description = "Missing permission or wrong company", body = ApiError),
        (status = 404, description = "Company not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_company_users(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<UserView>>> {
    let id = company_id(&id)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(directory::list_company_users(&mut conn, id)?))
}

#[utoipa::path(
    get,
    path = "/companies/{id}/users/{user_id}",
    tag = "Company Users",
    params(
        ("id" = i32, Path, description = "Company ID"),
        ("user_id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "Company member", body = UserView),
        (status = 404, description = "User does not belong to the company", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_company_user(
    State(state): State<AppState>,
    Path(ids): Path<(String, String)>,
) -> ApiResult<Json<UserView>> {
    let (company_id, user_id) = company_user_ids(ids)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(directory::find_company_user(
        &mut conn, company_id, user_id,
    )?))
}

#[utoipa::path(
    post,
    path = "/companies/{id}/users",
    tag = "Company Users",
    params(("id" = i32, Path, description = "Company ID")),
    request_body = CreateCompanyUserRequest,
    responses(
        (status = 201, description = "User created inside the company", body = UserView),
        (status = 400, description = "Validation error or weak password", body = ApiError),
        (status = 409, description = "Email already registered", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_company_user(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(id): Path<String>,
    Json(payload): Json<CreateCompanyUserRequest>,
) -> ApiResult<(StatusCode, Json<UserView>)> {
    let id = company_id(&id)?;
    validate_body(&payload)?;
    state
        .password_policy
        .validate(&payload.password)
        .map_err(ServiceError::from)?;

    let password_hash = PasswordService::hash(&payload.password, state.password_hash_cost)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let user = directory::create_company_user(
        &mut conn,
        id,
        NewCompanyUser {
            email: payload.email.trim().to_lowercase(),
            password_hash,
            full_name: payload.full_name,
            phone: payload.phone,
            position: payload.position,
            region_id: payload.region_id,
            role_id: payload.role_id,
        },
        session.user_id,
    )?;
    Ok((StatusCode::CREATED, Json(user)))
}

#[utoipa::path(
    post,
    path = "/companies/{id}/users/add-existing",
    tag = "Company Users",
    params(("id" = i32, Path, description = "Company ID")),
    request_body = AddExistingUserRequest,
    responses(
        (status = 200, description = "User linked to the company", body = UserView),
        (status = 404, description = "Company or user not found", body = ApiError),
        (status = 409, description = "User already belongs to a company", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_existing_user(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(id): Path<String>,
    Json(payload): Json<AddExistingUserRequest>,
) -> ApiResult<Json<UserView>> {
    let id = company_id(&id)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(directory::add_existing_user(
        &mut conn,
        id,
        payload.user_id,
        session.user_id,
    )?))
}

#[utoipa::path(
    patch,
    path = "/companies/{id}/users/{user_id}",
    tag = "Company Users",
    params(
        ("id" = i32, Path, description = "Company ID"),
        ("user_id" = i32, Path, description = "User ID")
    ),
    request_body = UpdateCompanyUserRequest,
    responses(
        (status = 200, description = "User updated", body = UserView),
        (status = 404, description = "User does not belong to the company", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_company_user(
    State(state): State<AppState>,
    Path(ids): Path<(String, String)>,
    Json(payload): Json<UpdateCompanyUserRequest>,
) -> ApiResult<Json<UserView>> {
    let (company_id, user_id) = company_user_ids(ids)?;
    validate_body(&payload)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let changes = CompanyUserChanges {
        full_name: payload.full_name,
        region_id: payload.region_id,
        phone: payload.phone,
        position: payload.position,
    };
    Ok(Json(directory::update_company_user(
        &mut conn, company_id, user_id, changes,
    )?))
}

async fn set_status(
    state: &AppState,
    ids: (String, String),
    status: UserStatus,
) -> ApiResult<Json<UserView>> {
    let (company_id, user_id) = company_user_ids(ids)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(directory::set_company_user_status(
        &mut conn, company_id, user_id, status,
    )?))
}

#[utoipa::path(
    post,
    path = "/companies/{id}/users/{user_id}/deactivate",
    tag = "Company Users",
    params(
        ("id" = i32, Path, description = "Company ID"),
        ("user_id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User deactivated; their sessions stop working", body = UserView),
        (status = 404, description = "User does not belong to the company", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn deactivate_company_user(
    State(state): State<AppState>,
    Path(ids): Path<(String, String)>,
) -> ApiResult<Json<UserView>> {
    set_status(&state, ids, UserStatus::Inactive).await
}

#[utoipa::path(
    post,
    path = "/companies/{id}/users/{user_id}/activate",
    tag = "Company Users",
    params(
        ("id" = i32, Path, description = "Company ID"),
        ("user_id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 200, description = "User activated", body = UserView),
        (status = 404, description = "User does not belong to the company", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn activate_company_user(
    State(state): State<AppState>,
    Path(ids): Path<(String, String)>,
) -> ApiResult<Json<UserView>> {
    set_status(&state, ids, UserStatus::Active).await
}

#[utoipa::path(
    delete,
    path = "/companies/{id}/users/{user_id}",
    tag = "Company Users",
    params(
        ("id" = i32, Path, description = "Company ID"),
        ("user_id" = i32, Path, description = "User ID")
    ),
    responses(
        (status = 204, description = "User soft-deleted"),
        (status = 404, description = "User does not belong to the company", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn remove_company_user(
    State(state): State<AppState>,
    Path(ids): Path<(String, String)>,
) -> ApiResult<StatusCode> {
    let (company_id, user_id) = company_user_ids(ids)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    directory::remove_company_user(&mut conn, company_id, user_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/companies/{id}/users/{user_id}/roles",
    tag = "Company Users",
    params(
        ("id" = i32, Path, description = "Company ID"),
        ("user_id" = i32, Path, description = "User ID")
    ),
    request_body = AssignRoleRequest,
    responses(
        (status = 200, description = "Role assigned", body = UserView),
        (status = 404, description = "User or role not found", body = ApiError),
        (status = 409, description = "Role already assigned", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn assign_company_role(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(ids): Path<(String, String)>,
    Json(payload): Json<AssignRoleRequest>,
) -> ApiResult<Json<UserView>> {
    let (company_id, user_id) = company_user_ids(ids)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(directory::assign_company_role(
        &mut conn,
        company_id,
        user_id,
        payload.role_id,
        session.user_id,
    )?))
}

#[utoipa::path(
    delete,
    path = "/companies/{id}/users/{user_id}/roles/{role_id}",
    tag = "Company Users",
    params(
        ("id" = i32, Path, description = "Company ID"),
        ("user_id" = i32, Path, description = "User ID"),
        ("role_id" = i32, Path, description = "Role ID")
    ),
    responses(
        (status = 200, description = "Role removed", body = UserView),
        (status = 400, description = "Role is not assigned", body = ApiError),
        (status = 404, description = "User or role not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn remove_company_role(
    State(state): State<AppState>,
    Path((id, user_id, role_id)): Path<(String, String, String)>,
) -> ApiResult<Json<UserView>> {
    let (company_id, user_id) = company_user_ids((id, user_id))?;
    let role_id = parse_id(&role_id, "role id")?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(directory::remove_company_role(
        &mut conn, company_id, user_id, role_id,
    )?))
}

// ---------------------------------------------------------------------------
// Invitations
// ---------------------------------------------------------------------------

#[utoipa::path(
    post,
    path = "/companies/{id}/invitations",
    tag = "Company Users",
    params(("id" = i32, Path, description = "Company ID")),
    request_body = CreateInvitationRequest,
    responses(
        (status = 201, description = "Invitation issued (valid for 7 days)", body = RegistrationInvitation),
        (status = 404, description = "Company not found", body = ApiError),
        (status = 409, description = "Pending invitation or account already exists", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_invitation(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(id): Path<String>,
    Json(payload): Json<CreateInvitationRequest>,
) -> ApiResult<(StatusCode, Json<RegistrationInvitation>)> {
    let id = company_id(&id)?;
    validate_body(&payload)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let invitation = directory::create_invitation(
        &mut conn,
        id,
        &payload.email.trim().to_lowercase(),
        session.user_id,
    )?;
    Ok((StatusCode::CREATED, Json(invitation)))
}

#[utoipa::path(
    get,
    path = "/companies/{id}/invitations",
    tag = "Company Users",
    params(("id" = i32, Path, description = "Company ID")),
    responses(
        (status = 200, description = "Invitations, newest first", body = Vec<RegistrationInvitation>),
        (status = 404, description = "Company not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_invitations(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<RegistrationInvitation>>> {
    let id = company_id(&id)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(directory::list_invitations(&mut conn, id)?))
}

// ---------------------------------------------------------------------------
// Company projects
// ---------------------------------------------------------------------------

#[utoipa::path(
    get,
    path = "/companies/{id}/projects",
    tag = "Companies",
    params(("id" = i32, Path, description = "Company ID"), PaginationParams),
    responses(
        (status = 200, description = "Projects owned by the company", body = ProjectListResponse),
        (status = 404, description = "Company not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_company_projects(
    State(state): State<AppState>,
    Path(id): Path<String>,
    Query(page): Query<PaginationParams>,
) -> ApiResult<Json<ProjectListResponse>> {
    let id = company_id(&id)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    directory::find_company(&mut conn, id)?;

    let filter = ProjectFilter {
        company_id: Some(id),
        ..Default::default()
    };
    let (data, total) = projects::list_projects(&mut conn, &filter, &page)?;
    Ok(Json(PaginatedResponse::from_params(data, &page, total).into()))
}

#[utoipa::path(
    post,
    path = "/companies/{id}/projects",
    tag = "Companies",
    params(("id" = i32, Path, description = "Company ID")),
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created for the company", body = ProjectView),
        (status = 404, description = "Company or referenced entity not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_company_project(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(id): Path<String>,
    Json(payload): Json<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<ProjectView>)> {
    let id = company_id(&id)?;
    validate_body(&payload)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    directory::find_company(&mut conn, id)?;

    let mut input = payload.into_input();
    input.company_id = Some(id);
    let project = projects::create_project(&mut conn, input, session.user_id)?;
    Ok((StatusCode::CREATED, Json(project)))
}
