use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Account status stored as text on `users.status`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum UserStatus {
    Active,
    Inactive,
    Suspended,
    Pending,
}

impl UserStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            UserStatus::Active => "ACTIVE",
            UserStatus::Inactive => "INACTIVE",
            UserStatus::Suspended => "SUSPENDED",
            UserStatus::Pending => "PENDING",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(UserStatus::Active),
            "INACTIVE" => Some(UserStatus::Inactive),
            "SUSPENDED" => Some(UserStatus::Suspended),
            "PENDING" => Some(UserStatus::Pending),
            _ => None,
        }
    }
}

impl std::fmt::Display for UserStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum InvitationStatus {
    Pending,
    Accepted,
    Expired,
    Cancelled,
}

impl InvitationStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            InvitationStatus::Pending => "PENDING",
            InvitationStatus::Accepted => "ACCEPTED",
            InvitationStatus::Expired => "EXPIRED",
            InvitationStatus::Cancelled => "CANCELLED",
        }
    }
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::users)]
pub struct User {
    pub id: i32,
    #[schema(example = "user@example.com")]
    pub email: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    #[schema(example = "Jane Doe")]
    pub full_name: String,
    pub is_admin: bool,
    #[schema(example = "ACTIVE")]
    pub status: String,
    pub region_id: Option<i32>,
    #[serde(skip_serializing)]
    pub refresh_token_hash: Option<String>,
    pub last_login: Option<NaiveDateTime>,
    pub is_deleted: bool,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl User {
    pub fn is_active(&self) -> bool {
        !self.is_deleted && UserStatus::parse(&self.status) == Some(UserStatus::Active)
    }
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::users)]
pub struct NewUser {
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub is_admin: bool,
    pub status: String,
    pub region_id: Option<i32>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::user_profiles)]
pub struct UserProfile {
    pub id: i32,
    pub user_id: i32,
    pub company_id: Option<i32>,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::user_profiles)]
pub struct NewUserProfile {
    pub user_id: i32,
    pub company_id: Option<i32>,
    pub phone: Option<String>,
    pub position: Option<String>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::companies)]
pub struct Company {
    pub id: i32,
    #[schema(example = "Acme LLC")]
    pub name: String,
    #[schema(example = "7701234567")]
    pub inn: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::companies)]
pub struct NewCompany {
    pub name: String,
    pub inn: Option<String>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::roles)]
pub struct Role {
    pub id: i32,
    #[schema(example = "COMPANY_ADMIN")]
    pub name: String,
    #[schema(example = "Company administrator")]
    pub description: Option<String>,
    pub created_by: Option<i32>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::roles)]
pub struct NewRole {
    pub name: String,
    pub description: Option<String>,
    pub created_by: Option<i32>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::permissions)]
pub struct Permission {
    pub id: i32,
    #[schema(example = "kanban-boards:members:add")]
    pub name: String,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::permissions)]
pub struct NewPermission {
    pub name: String,
    pub description: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::role_permissions)]
pub struct NewRolePermission {
    pub role_id: i32,
    pub permission_id: i32,
    pub granted_by: Option<i32>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::user_roles)]
pub struct NewUserRole {
    pub user_id: i32,
    pub role_id: i32,
    pub assigned_by: Option<i32>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::kanban_boards)]
pub struct KanbanBoard {
    pub id: i32,
    #[schema(example = "Sales")]
    pub name: String,
    pub description: Option<String>,
    #[schema(example = "V1StGXR8_Z")]
    pub code: String,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::kanban_boards)]
pub struct NewKanbanBoard {
    pub name: String,
    pub description: Option<String>,
    pub code: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, PartialEq, ToSchema)]
#[diesel(table_name = crate::schema::kanban_columns)]
pub struct KanbanColumn {
    pub id: i32,
    pub board_id: i32,
    #[schema(example = "Backlog")]
    pub name: String,
    #[schema(example = 0)]
    pub position: i32,
    #[schema(example = "#3366ff")]
    pub color: Option<String>,
    pub description: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::kanban_columns)]
pub struct NewKanbanColumn {
    pub board_id: i32,
    pub name: String,
    pub position: i32,
    pub color: Option<String>,
    pub description: Option<String>,
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = crate::schema::kanban_board_members)]
pub struct KanbanBoardMember {
    pub id: i32,
    pub board_id: i32,
    pub user_id: i32,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::kanban_board_members)]
pub struct NewKanbanBoardMember {
    pub board_id: i32,
    pub user_id: i32,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::projects)]
pub struct Project {
    pub id: i32,
    #[schema(example = "Warehouse retrofit")]
    pub name: String,
    #[schema(example = "WR-001")]
    pub code: Option<String>,
    pub project_type_id: Option<i32>,
    pub region_id: i32,
    pub status_id: i32,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub company_id: Option<i32>,
    pub kanban_column_id: i32,
    pub created_by: i32,
    pub attached_file_ids: Vec<i32>,
    pub expected_deadline: Option<NaiveDateTime>,
    pub comments: Option<String>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::projects)]
pub struct NewProject {
    pub name: String,
    pub code: Option<String>,
    pub project_type_id: Option<i32>,
    pub region_id: i32,
    pub status_id: i32,
    pub contact_name: Option<String>,
    pub contact_phone: Option<String>,
    pub contact_email: Option<String>,
    pub company_id: Option<i32>,
    pub kanban_column_id: i32,
    pub created_by: i32,
    pub attached_file_ids: Vec<i32>,
    pub expected_deadline: Option<NaiveDateTime>,
    pub comments: Option<String>,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::project_executors)]
pub struct NewProjectExecutor {
    pub project_id: i32,
    pub user_id: i32,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::project_logs)]
pub struct ProjectLog {
    pub id: i32,
    pub project_id: i32,
    pub changed_by: i32,
    #[schema(example = "status_id")]
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Insertable)]
#[diesel(table_name = crate::schema::project_logs)]
pub struct NewProjectLog {
    pub project_id: i32,
    pub changed_by: i32,
    pub field: String,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::project_comments)]
pub struct ProjectComment {
    pub id: i32,
    pub project_id: i32,
    pub author_id: i32,
    pub content: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::project_comments)]
pub struct NewProjectComment {
    pub project_id: i32,
    pub author_id: i32,
    pub content: String,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::regions)]
pub struct Region {
    pub id: i32,
    #[schema(example = "North-West")]
    pub name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::project_statuses)]
pub struct ProjectStatus {
    pub id: i32,
    #[schema(example = "In progress")]
    pub name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::project_types)]
pub struct ProjectType {
    pub id: i32,
    #[schema(example = "Construction")]
    pub name: String,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Queryable, Selectable, Serialize, Clone, ToSchema)]
#[diesel(table_name = crate::schema::registration_invitations)]
pub struct RegistrationInvitation {
    pub id: i32,
    #[schema(example = "new.hire@example.com")]
    pub email: String,
    #[schema(example = "INV-12-M3X9QK-4FJ2A8")]
    pub code: String,
    #[schema(example = "PENDING")]
    pub status: String,
    pub invited_by: i32,
    pub role_id: Option<i32>,
    pub company_id: Option<i32>,
    pub expires_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::registration_invitations)]
pub struct NewRegistrationInvitation {
    pub email: String,
    pub code: String,
    pub status: String,
    pub invited_by: i32,
    pub role_id: Option<i32>,
    pub company_id: Option<i32>,
    pub expires_at: NaiveDateTime,
}

#[derive(Debug, Queryable, Selectable, Clone)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct OutboxEvent {
    pub id: Uuid,
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: i32,
    pub payload: serde_json::Value,
    pub published: bool,
    pub published_at: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Insertable)]
#[diesel(table_name = crate::schema::outbox_events)]
pub struct NewOutboxEvent {
    pub event_type: String,
    pub aggregate_type: String,
    pub aggregate_id: i32,
    pub payload: serde_json::Value,
}
