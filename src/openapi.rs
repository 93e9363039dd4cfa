//! OpenAPI documentation served through Swagger UI.

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::error::ApiError;
use crate::handlers::{
    auth, boards, columns, companies, dictionaries, health, permissions, projects, roles, users,
};
use crate::pagination::PaginationMeta;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Boardroom API",
        version = "1.0.0",
        description = "Multi-tenant project management backend.\n\n\
        ## Features\n\
        - Access and refresh tokens with server-side refresh rotation\n\
        - Role-based permissions checked against the store on every request\n\
        - Company-scoped user administration and invitations\n\
        - Kanban boards with ordered columns and membership\n\
        - Projects with field-level audit logs and comments\n\n\
        ## Authentication\n\
        1. Login (or register with an invitation code) to get an access token\n\
        2. Send it as `Authorization: Bearer <token>` or in the `access_token` cookie\n\
        3. Exchange the refresh token at `/auth/refresh` when the access token expires",
        contact(
            name = "Boardroom API Support"
        ),
        license(
            name = "MIT",
            url = "https://opensource.org/licenses/MIT"
        )
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "Health", description = "Health check endpoints"),
        (name = "Authentication", description = "Login, registration and token management"),
        (name = "Kanban Boards", description = "Boards and board membership"),
        (name = "Kanban Columns", description = "Ordered board columns"),
        (name = "Projects", description = "Projects, audit logs and comments"),
        (name = "Companies", description = "Company records"),
        (name = "Company Users", description = "Company-scoped user administration and invitations"),
        (name = "Roles", description = "Roles and their permission grants"),
        (name = "Permissions", description = "Permission catalog"),
        (name = "Users", description = "System-level user administration"),
        (name = "Dictionaries", description = "Regions, project statuses and project types")
    ),
    paths(
        health::health_check_simple,
        health::health_check,
        health::ready_check,
        health::live_check,

        auth::login,
        auth::refresh_token,
        auth::register,
        auth::logout,
        auth::me,
        auth::permissions,

        boards::list_boards,
        boards::create_board,
        boards::join_board,
        boards::get_board,
        boards::update_board,
        boards::add_member,
        boards::list_members,
        boards::remove_member,

        columns::create_column,
        columns::reorder_columns,
        columns::list_board_columns,
        columns::update_column,
        columns::delete_column,

        projects::create_project,
        projects::list_projects,
        projects::check_name,
        projects::get_project,
        projects::update_project,
        projects::delete_project,
        projects::update_status,
        projects::move_to_column,
        projects::list_logs,
        projects::list_comments,
        projects::add_comment,

        companies::create_company,
        companies::list_companies,
        companies::get_company,
        companies::update_company,
        companies::delete_company,
        companies::list_company_users,
        companies::get_company_user,
        companies::create_company_user,
        companies::add_existing_user,
        companies::update_company_user,
        companies::deactivate_company_user,
        companies::activate_company_user,
        companies::remove_company_user,
        companies::assign_company_role,
        companies::remove_company_role,
        companies::create_invitation,
        companies::list_invitations,
        companies::list_company_projects,
        companies::create_company_project,

        roles::create_role,
        roles::list_roles,
        roles::get_role,
        roles::update_role,
        roles::delete_role,

        permissions::create_permission,
        permissions::list_permissions,
        permissions::get_permission,
        permissions::update_permission,
        permissions::delete_permission,

        users::create_user,
        users::list_users,
        users::get_user,
        users::update_user,
        users::delete_user,
        users::assign_role,
        users::remove_role,

        dictionaries::list_regions,
        dictionaries::get_region,
        dictionaries::create_region,
        dictionaries::update_region,
        dictionaries::delete_region,
        dictionaries::list_statuses,
        dictionaries::get_status,
        dictionaries::create_status,
        dictionaries::update_status,
        dictionaries::delete_status,
        dictionaries::list_types,
        dictionaries::get_type,
        dictionaries::create_type,
        dictionaries::update_type,
        dictionaries::delete_type,
    ),
    components(
        schemas(
            ApiError,
            PaginationMeta,

            health::HealthResponse,
            health::ReadinessResponse,
            health::ReadinessChecks,
            health::ComponentStatus,

            auth::LoginRequest,
            auth::RefreshRequest,
            auth::RegisterRequest,
            auth::UserSummary,
            auth::AuthResponse,
            auth::RefreshResponse,
            auth::MeResponse,
            auth::PermissionsResponse,
            auth::MessageResponse,
            crate::auth::SessionContext,
            crate::auth::Scope,

            boards::CreateBoardRequest,
            boards::UpdateBoardRequest,
            boards::AddMemberRequest,
            boards::JoinBoardRequest,
            boards::MemberAddedResponse,
            crate::services::boards::BoardDetail,
            crate::services::boards::ColumnSummary,
            crate::services::boards::BoardMemberView,

            columns::CreateColumnRequest,
            columns::UpdateColumnRequest,
            crate::services::columns::ReorderItem,

            projects::CreateProjectRequest,
            projects::UpdateProjectRequest,
            projects::UpdateStatusRequest,
            projects::CreateCommentRequest,
            projects::NameCheckResponse,
            projects::ProjectListResponse,
            crate::services::projects::ProjectView,
            crate::services::projects::ProjectUser,
            crate::services::projects::CommentView,

            companies::CreateCompanyRequest,
            companies::UpdateCompanyRequest,
            companies::CreateCompanyUserRequest,
            companies::AddExistingUserRequest,
            companies::UpdateCompanyUserRequest,
            companies::AssignRoleRequest,
            companies::CreateInvitationRequest,
            crate::services::directory::UserView,

            roles::CreateRoleRequest,
            roles::UpdateRoleRequest,
            crate::services::roles::RoleView,

            permissions::CreatePermissionRequest,
            permissions::UpdatePermissionRequest,

            users::CreateUserRequest,
            users::UpdateUserRequest,
            users::UserListResponse,

            dictionaries::DictionaryEntryRequest,

            crate::models::User,
            crate::models::UserStatus,
            crate::models::Company,
            crate::models::Role,
            crate::models::Permission,
            crate::models::KanbanBoard,
            crate::models::KanbanColumn,
            crate::models::Project,
            crate::models::ProjectLog,
            crate::models::ProjectComment,
            crate::models::Region,
            crate::models::ProjectStatus,
            crate::models::ProjectType,
            crate::models::RegistrationInvitation,
            crate::models::InvitationStatus,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Access token obtained from /auth/login or /auth/register.\n\
                            Include in requests as: `Authorization: Bearer <token>`",
                        ))
                        .build(),
                ),
            );
        }

        openapi.security = Some(vec![]);
    }
}

pub fn swagger_router() -> Router {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}
