//! Project handlers: CRUD, status and column transitions, audit log, comments.

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::{IntoParams, ToSchema};
use validator::Validate;

use crate::{
    auth::SessionContext,
    error::{get_db_conn, parse_id, ApiError, ApiResult},
    handlers::{double_option, validate_body},
    models::ProjectLog,
    pagination::{PaginatedResponse, PaginationParams},
    services::projects::{self, CommentView, ProjectFilter, ProjectInput, ProjectPatch, ProjectView},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    #[schema(example = "Warehouse retrofit")]
    pub name: String,
    #[validate(length(max = 64))]
    pub code: Option<String>,
    pub project_type_id: Option<i32>,
    pub region_id: i32,
    pub status_id: i32,
    pub kanban_column_id: i32,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    #[validate(email(message = "Invalid contact email"))]
    pub contact_email: Option<String>,
    pub company_id: Option<i32>,
    #[serde(default)]
    pub executor_ids: Vec<i32>,
    #[serde(default)]
    pub attached_file_ids: Vec<i32>,
    pub expected_deadline: Option<DateTime<Utc>>,
    pub comments: Option<String>,
}

impl CreateProjectRequest {
    pub fn into_input(self) -> ProjectInput {
        ProjectInput {
            name: self.name.trim().to_string(),
            code: self.code,
            project_type_id: self.project_type_id,
            region_id: self.region_id,
            status_id: self.status_id,
            contact_name: self.contact_name,
            contact_phone: self.contact_phone,
            contact_email: self.contact_email,
            company_id: self.company_id,
            kanban_column_id: self.kanban_column_id,
            executor_ids: self.executor_ids,
            attached_file_ids: self.attached_file_ids,
            expected_deadline: self.expected_deadline.map(|d| d.naive_utc()),
            comments: self.comments,
        }
    }
}

/// Omitted fields stay as they are; `null` clears nullable ones.
#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateProjectRequest {
    #[validate(length(min = 1, max = 255, message = "Name must be 1-255 characters"))]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub code: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<i32>)]
    pub project_type_id: Option<Option<i32>>,
    pub region_id: Option<i32>,
    pub status_id: Option<i32>,
    pub kanban_column_id: Option<i32>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub contact_name: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub contact_phone: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub contact_email: Option<Option<String>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<i32>)]
    pub company_id: Option<Option<i32>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<DateTime<Utc>>)]
    pub expected_deadline: Option<Option<DateTime<Utc>>>,
    #[serde(default, deserialize_with = "double_option")]
    #[schema(value_type = Option<String>)]
    pub comments: Option<Option<String>>,
    pub attached_file_ids: Option<Vec<i32>>,
    /// Replaces the executor set when present.
    pub executor_ids: Option<Vec<i32>>,
}

impl UpdateProjectRequest {
    fn into_patch(self) -> ProjectPatch {
        ProjectPatch {
            name: self.name,
            code: self.code,
            project_type_id: self.project_type_id,
            region_id: self.region_id,
            status_id: self.status_id,
            contact_name: self.contact_name,
            contact_phone: self.contact_phone,
            contact_email: self.contact_email,
            company_id: self.company_id,
            kanban_column_id: self.kanban_column_id,
            expected_deadline: self
                .expected_deadline
                .map(|deadline| deadline.map(|d| d.naive_utc())),
            comments: self.comments,
            attached_file_ids: self.attached_file_ids,
            executor_ids: self.executor_ids,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateStatusRequest {
    pub status_id: i32,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateCommentRequest {
    #[validate(length(min = 1, max = 5000, message = "Comment must be 1-5000 characters"))]
    #[schema(example = "Site survey scheduled for Monday")]
    pub content: String,
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct NameQuery {
    /// Project name to look up (exact match).
    pub name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct NameCheckResponse {
    pub name: String,
    pub taken: bool,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ProjectListResponse {
    pub data: Vec<ProjectView>,
    pub pagination: crate::pagination::PaginationMeta,
}

impl From<PaginatedResponse<ProjectView>> for ProjectListResponse {
    fn from(page: PaginatedResponse<ProjectView>) -> Self {
        Self {
            data: page.data,
            pagination: page.pagination,
        }
    }
}

#[utoipa::path(
    post,
    path = "/projects",
    tag = "Projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 201, description = "Project created", body = ProjectView),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 404, description = "Referenced region, status, column or executor not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_project(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Json(payload): Json<CreateProjectRequest>,
) -> ApiResult<(StatusCode, Json<ProjectView>)> {
    validate_body(&payload)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let project = projects::create_project(&mut conn, payload.into_input(), session.user_id)?;
    Ok((StatusCode::CREATED, Json(project)))
}

#[utoipa::path(
    get,
    path = "/projects",
    tag = "Projects",
    params(ProjectFilter, PaginationParams),
    responses(
        (status = 200, description = "Projects, newest first", body = ProjectListResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_projects(
    State(state): State<AppState>,
    Query(filter): Query<ProjectFilter>,
    Query(page): Query<PaginationParams>,
) -> ApiResult<Json<ProjectListResponse>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let (data, total) = projects::list_projects(&mut conn, &filter, &page)?;
    Ok(Json(PaginatedResponse::from_params(data, &page, total).into()))
}

#[utoipa::path(
    get,
    path = "/projects/check-name",
    tag = "Projects",
    params(NameQuery),
    responses(
        (status = 200, description = "Whether the name is in use", body = NameCheckResponse)
    ),
    security(("bearer_auth" = []))
)]
pub async fn check_name(
    State(state): State<AppState>,
    Query(query): Query<NameQuery>,
) -> ApiResult<Json<NameCheckResponse>> {
    let name = query.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::bad_request("Name is required", "VALIDATION_ERROR"));
    }
    let mut conn = get_db_conn(&state.db_pool)?;
    let taken = projects::is_name_taken(&mut conn, &name)?;
    Ok(Json(NameCheckResponse { name, taken }))
}

#[utoipa::path(
    get,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = i32, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Project with executors", body = ProjectView),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_project(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<ProjectView>> {
    let id = parse_id(&id, "project id")?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(projects::get_project(&mut conn, id)?))
}

#[utoipa::path(
    put,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = i32, Path, description = "Project ID")),
    request_body = UpdateProjectRequest,
    responses(
        (status = 200, description = "Project updated; changed fields are logged", body = ProjectView),
        (status = 404, description = "Project or referenced entity not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_project(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateProjectRequest>,
) -> ApiResult<Json<ProjectView>> {
    let id = parse_id(&id, "project id")?;
    validate_body(&payload)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(projects::update_project(
        &mut conn,
        id,
        payload.into_patch(),
        session.user_id,
    )?))
}

#[utoipa::path(
    delete,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = i32, Path, description = "Project ID")),
    responses(
        (status = 204, description = "Project deleted"),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(id): Path<String>,
) -> ApiResult<StatusCode> {
    let id = parse_id(&id, "project id")?;
    let mut conn = get_db_conn(&state.db_pool)?;
    projects::delete_project(&mut conn, id, session.user_id)?;
    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    patch,
    path = "/projects/{id}/status",
    tag = "Projects",
    params(("id" = i32, Path, description = "Project ID")),
    request_body = UpdateStatusRequest,
    responses(
        (status = 200, description = "Status changed and logged", body = ProjectView),
        (status = 404, description = "Project or status not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_status(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(id): Path<String>,
    Json(payload): Json<UpdateStatusRequest>,
) -> ApiResult<Json<ProjectView>> {
    let id = parse_id(&id, "project id")?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(projects::update_status(
        &mut conn,
        id,
        payload.status_id,
        session.user_id,
    )?))
}

#[utoipa::path(
    patch,
    path = "/projects/{id}/move-to-kanban/{column_id}",
    tag = "Projects",
    params(
        ("id" = i32, Path, description = "Project ID"),
        ("column_id" = i32, Path, description = "Target column ID")
    ),
    responses(
        (status = 200, description = "Project moved and logged", body = ProjectView),
        (status = 404, description = "Project or column not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn move_to_column(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path((id, column_id)): Path<(String, String)>,
) -> ApiResult<Json<ProjectView>> {
    let id = parse_id(&id, "project id")?;
    let column_id = parse_id(&column_id, "column id")?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(projects::move_to_column(
        &mut conn,
        id,
        column_id,
        session.user_id,
    )?))
}

#[utoipa::path(
    get,
    path = "/projects/{id}/logs",
    tag = "Projects",
    params(("id" = i32, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Audit trail, newest first", body = Vec<ProjectLog>),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_logs(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<ProjectLog>>> {
    let id = parse_id(&id, "project id")?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(projects::list_logs(&mut conn, id)?))
}

#[utoipa::path(
    get,
    path = "/projects/{id}/comments",
    tag = "Projects",
    params(("id" = i32, Path, description = "Project ID")),
    responses(
        (status = 200, description = "Comments, newest first", body = Vec<CommentView>),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_comments(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> ApiResult<Json<Vec<CommentView>>> {
    let id = parse_id(&id, "project id")?;
    let mut conn = get_db_conn(&state.db_pool)?;
    Ok(Json(projects::list_comments(&mut conn, id)?))
}

#[utoipa::path(
    post,
    path = "/projects/{id}/comments",
    tag = "Projects",
    params(("id" = i32, Path, description = "Project ID")),
    request_body = CreateCommentRequest,
    responses(
        (status = 201, description = "Comment added", body = CommentView),
        (status = 404, description = "Project not found", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_comment(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
    Path(id): Path<String>,
    Json(payload): Json<CreateCommentRequest>,
) -> ApiResult<(StatusCode, Json<CommentView>)> {
    let id = parse_id(&id, "project id")?;
    validate_body(&payload)?;
    let mut conn = get_db_conn(&state.db_pool)?;
    let comment = projects::add_comment(&mut conn, id, session.user_id, payload.content.trim())?;
    Ok((StatusCode::CREATED, Json(comment)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_update_request_maps_to_patch() {
        let request: UpdateProjectRequest = serde_json::from_str(
            r#"{"name": " Renamed ", "code": null, "expected_deadline": "2026-03-01T12:00:00Z"}"#,
        )
        .unwrap();
        let patch = request.into_patch();

        assert_eq!(patch.name.as_deref(), Some("Renamed"));
        assert_eq!(patch.code, Some(None));
        assert!(patch.region_id.is_none());
        assert!(patch.executor_ids.is_none());
        let deadline = patch.expected_deadline.flatten().unwrap();
        assert_eq!(deadline.to_string(), "2026-03-01 12:00:00");
    }

    #[test]
    fn test_create_request_defaults_collections() {
        let request: CreateProjectRequest = serde_json::from_str(
            r#"{"name": "Depot", "region_id": 1, "status_id": 2, "kanban_column_id": 3}"#,
        )
        .unwrap();
        let input = request.into_input();
        assert!(input.executor_ids.is_empty());
        assert!(input.attached_file_ids.is_empty());
        assert_eq!(input.kanban_column_id, 3);
    }

    #[test]
    fn test_create_request_rejects_bad_contact_email() {
        let request: CreateProjectRequest = serde_json::from_str(
            r#"{"name": "Depot", "region_id": 1, "status_id": 2, "kanban_column_id": 3,
                "contact_email": "nope"}"#,
        )
        .unwrap();
        assert!(request.validate().is_err());
    }
}
