//! Projects, their executors, comments and the append-only change log.
//!
//! Projects are hard-deleted; their logs and comments go with them.

use chrono::NaiveDateTime;
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeSet, HashMap};
use tracing::{info, instrument};
use utoipa::{IntoParams, ToSchema};

use crate::error::{ServiceError, ServiceResult};
use crate::events::{AggregateType, EventType, OutboxService, ProjectTransitionPayload};
use crate::models::{
    NewProject, NewProjectComment, NewProjectExecutor, NewProjectLog, Project, ProjectComment,
    ProjectLog,
};
use crate::pagination::PaginationParams;
use crate::schema::{
    companies, kanban_columns, project_comments, project_executors, project_logs,
    project_statuses, project_types, projects, regions, users,
};

use super::roles::unknown_ids;

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectUser {
    pub id: i32,
    pub email: String,
    pub full_name: String,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct ProjectView {
    #[serde(flatten)]
    pub project: Project,
    pub executors: Vec<ProjectUser>,
}

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct CommentView {
    #[serde(flatten)]
    pub comment: ProjectComment,
    pub author: ProjectUser,
}

#[derive(Debug, Clone, Default)]
pub struct ProjectInput {
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
    pub executor_ids: Vec<i32>,
    pub attached_file_ids: Vec<i32>,
    pub expected_deadline: Option<NaiveDateTime>,
    pub comments: Option<String>,
}

/// Partial update. `None` leaves a field alone, `Some(None)` clears it.
#[derive(Debug, Clone, Default)]
pub struct ProjectPatch {
    pub name: Option<String>,
    pub code: Option<Option<String>>,
    pub project_type_id: Option<Option<i32>>,
    pub region_id: Option<i32>,
    pub status_id: Option<i32>,
    pub contact_name: Option<Option<String>>,
    pub contact_phone: Option<Option<String>>,
    pub contact_email: Option<Option<String>>,
    pub company_id: Option<Option<i32>>,
    pub kanban_column_id: Option<i32>,
    pub expected_deadline: Option<Option<NaiveDateTime>>,
    pub comments: Option<Option<String>>,
    pub attached_file_ids: Option<Vec<i32>>,
    /// Replaces the whole executor set when present.
    pub executor_ids: Option<Vec<i32>>,
}

impl ProjectPatch {
    /// Trims the name the same way creation does.
    pub fn normalized(mut self) -> Self {
        self.name = self.name.map(|name| name.trim().to_string());
        self
    }
}

#[derive(AsChangeset)]
#[diesel(table_name = projects)]
struct ProjectRowChanges {
    name: Option<String>,
    code: Option<Option<String>>,
    project_type_id: Option<Option<i32>>,
    region_id: Option<i32>,
    status_id: Option<i32>,
    contact_name: Option<Option<String>>,
    contact_phone: Option<Option<String>>,
    contact_email: Option<Option<String>>,
    company_id: Option<Option<i32>>,
    kanban_column_id: Option<i32>,
    expected_deadline: Option<Option<NaiveDateTime>>,
    comments: Option<Option<String>>,
    attached_file_ids: Option<Vec<i32>>,
}

impl ProjectRowChanges {
    fn from_patch(patch: &ProjectPatch) -> Self {
        Self {
            name: patch.name.clone(),
            code: patch.code.clone(),
            project_type_id: patch.project_type_id,
            region_id: patch.region_id,
            status_id: patch.status_id,
            contact_name: patch.contact_name.clone(),
            contact_phone: patch.contact_phone.clone(),
            contact_email: patch.contact_email.clone(),
            company_id: patch.company_id,
            kanban_column_id: patch.kanban_column_id,
            expected_deadline: patch.expected_deadline,
            comments: patch.comments.clone(),
            attached_file_ids: patch.attached_file_ids.clone(),
        }
    }

    fn is_empty(&self) -> bool {
        self.name.is_none()
            && self.code.is_none()
            && self.project_type_id.is_none()
            && self.region_id.is_none()
            && self.status_id.is_none()
            && self.contact_name.is_none()
            && self.contact_phone.is_none()
            && self.contact_email.is_none()
            && self.company_id.is_none()
            && self.kanban_column_id.is_none()
            && self.expected_deadline.is_none()
            && self.comments.is_none()
            && self.attached_file_ids.is_none()
    }
}

#[derive(Debug, Clone, Default, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct ProjectFilter {
    pub region_id: Option<i32>,
    pub status_id: Option<i32>,
    pub project_type_id: Option<i32>,
    pub company_id: Option<i32>,
    pub kanban_column_id: Option<i32>,
    pub executor_id: Option<i32>,
}

/// One logged field transition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FieldChange {
    pub field: &'static str,
    pub old_value: Option<String>,
    pub new_value: Option<String>,
}

trait LogValue {
    fn log_value(&self) -> Option<String>;
}

impl LogValue for i32 {
    fn log_value(&self) -> Option<String> {
        Some(self.to_string())
    }
}

impl LogValue for String {
    fn log_value(&self) -> Option<String> {
        Some(self.clone())
    }
}

impl LogValue for NaiveDateTime {
    fn log_value(&self) -> Option<String> {
        Some(self.and_utc().to_rfc3339())
    }
}

impl<T: LogValue> LogValue for Option<T> {
    fn log_value(&self) -> Option<String> {
        self.as_ref().and_then(LogValue::log_value)
    }
}

fn track<T: PartialEq + LogValue>(
    changes: &mut Vec<FieldChange>,
    field: &'static str,
    old: &T,
    new: Option<&T>,
) {
    if let Some(new) = new {
        if new != old {
            changes.push(FieldChange {
                field,
                old_value: old.log_value(),
                new_value: new.log_value(),
            });
        }
    }
}

/// Logged fields whose requested value differs from the stored one.
/// Attachments and executors are not part of the audit allow-list.
pub fn diff_fields(current: &Project, patch: &ProjectPatch) -> Vec<FieldChange> {
    let mut changes = Vec::new();
    track(&mut changes, "name", &current.name, patch.name.as_ref());
    track(&mut changes, "code", &current.code, patch.code.as_ref());
    track(
        &mut changes,
        "project_type_id",
        &current.project_type_id,
        patch.project_type_id.as_ref(),
    );
    track(&mut changes, "region_id", &current.region_id, patch.region_id.as_ref());
    track(&mut changes, "status_id", &current.status_id, patch.status_id.as_ref());
    track(
        &mut changes,
        "contact_name",
        &current.contact_name,
        patch.contact_name.as_ref(),
    );
    track(
        &mut changes,
        "contact_phone",
        &current.contact_phone,
        patch.contact_phone.as_ref(),
    );
    track(
        &mut changes,
        "contact_email",
        &current.contact_email,
        patch.contact_email.as_ref(),
    );
    track(&mut changes, "company_id", &current.company_id, patch.company_id.as_ref());
    track(
        &mut changes,
        "kanban_column_id",
        &current.kanban_column_id,
        patch.kanban_column_id.as_ref(),
    );
    track(
        &mut changes,
        "expected_deadline",
        &current.expected_deadline,
        patch.expected_deadline.as_ref(),
    );
    track(&mut changes, "comments", &current.comments, patch.comments.as_ref());
    changes
}

fn project_not_found(id: i32) -> ServiceError {
    ServiceError::not_found(format!("Project with id {} not found", id))
}

fn require(found: bool, message: impl FnOnce() -> String) -> ServiceResult<()> {
    if found {
        Ok(())
    } else {
        Err(ServiceError::not_found(message()))
    }
}

/// Checks each referenced row up front so a bad id is reported by name.
fn ensure_references(
    conn: &mut PgConnection,
    region_id: Option<i32>,
    status_id: Option<i32>,
    project_type_id: Option<i32>,
    company_id: Option<i32>,
    kanban_column_id: Option<i32>,
) -> ServiceResult<()> {
    if let Some(id) = region_id {
        let found = diesel::select(diesel::dsl::exists(regions::table.find(id))).get_result(conn)?;
        require(found, || format!("Region with id {} not found", id))?;
    }
    if let Some(id) = status_id {
        let found = diesel::select(diesel::dsl::exists(project_statuses::table.find(id)))
            .get_result(conn)?;
        require(found, || format!("Project status with id {} not found", id))?;
    }
    if let Some(id) = project_type_id {
        let found =
            diesel::select(diesel::dsl::exists(project_types::table.find(id))).get_result(conn)?;
        require(found, || format!("Project type with id {} not found", id))?;
    }
    if let Some(id) = company_id {
        let found =
            diesel::select(diesel::dsl::exists(companies::table.find(id))).get_result(conn)?;
        require(found, || format!("Company with id {} not found", id))?;
    }
    if let Some(id) = kanban_column_id {
        let found =
            diesel::select(diesel::dsl::exists(kanban_columns::table.find(id))).get_result(conn)?;
        require(found, || format!("Kanban column with id {} not found", id))?;
    }
    Ok(())
}

fn replace_executors(
    conn: &mut PgConnection,
    project_id: i32,
    executor_ids: &[i32],
) -> ServiceResult<()> {
    let wanted: Vec<i32> = executor_ids
        .iter()
        .copied()
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect();

    let found: Vec<i32> = users::table
        .filter(users::id.eq_any(&wanted))
        .filter(users::is_deleted.eq(false))
        .select(users::id)
        .load(conn)?;
    let missing = unknown_ids(&wanted, &found);
    if !missing.is_empty() {
        let ids: Vec<String> = missing.iter().map(ToString::to_string).collect();
        return Err(ServiceError::not_found(format!(
            "Executors not found: {}",
            ids.join(", ")
        )));
    }

    diesel::delete(project_executors::table.filter(project_executors::project_id.eq(project_id)))
        .execute(conn)?;

    let rows: Vec<NewProjectExecutor> = wanted
        .into_iter()
        .map(|user_id| NewProjectExecutor {
            project_id,
            user_id,
        })
        .collect();
    diesel::insert_into(project_executors::table)
        .values(&rows)
        .execute(conn)?;
    Ok(())
}

fn load_executors(
    conn: &mut PgConnection,
    project_ids: &[i32],
) -> ServiceResult<HashMap<i32, Vec<ProjectUser>>> {
    let rows: Vec<(i32, i32, String, String)> = project_executors::table
        .inner_join(users::table)
        .filter(project_executors::project_id.eq_any(project_ids))
        .order((project_executors::project_id.asc(), users::id.asc()))
        .select((
            project_executors::project_id,
            users::id,
            users::email,
            users::full_name,
        ))
        .load(conn)?;

    let mut by_project: HashMap<i32, Vec<ProjectUser>> = HashMap::new();
    for (project_id, id, email, full_name) in rows {
        by_project.entry(project_id).or_default().push(ProjectUser {
            id,
            email,
            full_name,
        });
    }
    Ok(by_project)
}

fn to_views(conn: &mut PgConnection, projects: Vec<Project>) -> ServiceResult<Vec<ProjectView>> {
    let ids: Vec<i32> = projects.iter().map(|p| p.id).collect();
    let mut executors = load_executors(conn, &ids)?;
    Ok(projects
        .into_iter()
        .map(|project| ProjectView {
            executors: executors.remove(&project.id).unwrap_or_default(),
            project,
        })
        .collect())
}

fn to_view(conn: &mut PgConnection, project: Project) -> ServiceResult<ProjectView> {
    let id = project.id;
    to_views(conn, vec![project])?
        .pop()
        .ok_or_else(|| project_not_found(id))
}

fn find_project(conn: &mut PgConnection, id: i32) -> ServiceResult<Project> {
    projects::table
        .find(id)
        .select(Project::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| project_not_found(id))
}

fn lock_project(conn: &mut PgConnection, id: i32) -> ServiceResult<Project> {
    projects::table
        .find(id)
        .select(Project::as_select())
        .for_update()
        .first(conn)
        .optional()?
        .ok_or_else(|| project_not_found(id))
}

fn append_logs(
    conn: &mut PgConnection,
    project_id: i32,
    changed_by: i32,
    changes: &[FieldChange],
) -> ServiceResult<()> {
    if changes.is_empty() {
        return Ok(());
    }
    let rows: Vec<NewProjectLog> = changes
        .iter()
        .map(|change| NewProjectLog {
            project_id,
            changed_by,
            field: change.field.to_string(),
            old_value: change.old_value.clone(),
            new_value: change.new_value.clone(),
        })
        .collect();
    diesel::insert_into(project_logs::table)
        .values(&rows)
        .execute(conn)?;
    Ok(())
}

fn notify_executors(
    conn: &mut PgConnection,
    project: &Project,
    title: &str,
    message: &str,
    actor_id: i32,
) -> ServiceResult<()> {
    let executor_ids: Vec<i32> = project_executors::table
        .filter(project_executors::project_id.eq(project.id))
        .select(project_executors::user_id)
        .load(conn)?;

    for user_id in executor_ids.into_iter().filter(|id| *id != actor_id) {
        OutboxService::notify(conn, user_id, title, message, Some(actor_id))?;
    }
    Ok(())
}

#[instrument(skip(conn, input), fields(name = %input.name))]
pub fn create_project(
    conn: &mut PgConnection,
    input: ProjectInput,
    created_by: i32,
) -> ServiceResult<ProjectView> {
    conn.transaction(|conn| {
        ensure_references(
            conn,
            Some(input.region_id),
            Some(input.status_id),
            input.project_type_id,
            input.company_id,
            Some(input.kanban_column_id),
        )?;

        let project = diesel::insert_into(projects::table)
            .values(&NewProject {
                name: input.name.trim().to_string(),
                code: input.code,
                project_type_id: input.project_type_id,
                region_id: input.region_id,
                status_id: input.status_id,
                contact_name: input.contact_name,
                contact_phone: input.contact_phone,
                contact_email: input.contact_email,
                company_id: input.company_id,
                kanban_column_id: input.kanban_column_id,
                created_by,
                attached_file_ids: input.attached_file_ids,
                expected_deadline: input.expected_deadline,
                comments: input.comments,
            })
            .returning(Project::as_returning())
            .get_result(conn)?;

        if !input.executor_ids.is_empty() {
            replace_executors(conn, project.id, &input.executor_ids)?;
        }

        OutboxService::emit(
            conn,
            EventType::ProjectCreated,
            AggregateType::Project,
            project.id,
            &serde_json::json!({
                "project_id": project.id,
                "name": project.name,
                "company_id": project.company_id,
                "kanban_column_id": project.kanban_column_id,
            }),
            Some(created_by),
        )?;

        info!(project_id = project.id, "Project created");
        to_view(conn, project)
    })
}

fn apply_filter<'a>(
    mut query: projects::BoxedQuery<'a, Pg>,
    filter: &ProjectFilter,
) -> projects::BoxedQuery<'a, Pg> {
    if let Some(id) = filter.region_id {
        query = query.filter(projects::region_id.eq(id));
    }
    if let Some(id) = filter.status_id {
        query = query.filter(projects::status_id.eq(id));
    }
    if let Some(id) = filter.project_type_id {
        query = query.filter(projects::project_type_id.eq(id));
    }
    if let Some(id) = filter.company_id {
        query = query.filter(projects::company_id.eq(id));
    }
    if let Some(id) = filter.kanban_column_id {
        query = query.filter(projects::kanban_column_id.eq(id));
    }
    if let Some(user_id) = filter.executor_id {
        query = query.filter(
            projects::id.eq_any(
                project_executors::table
                    .filter(project_executors::user_id.eq(user_id))
                    .select(project_executors::project_id),
            ),
        );
    }
    query
}

/// Newest first.
pub fn list_projects(
    conn: &mut PgConnection,
    filter: &ProjectFilter,
    page: &PaginationParams,
) -> ServiceResult<(Vec<ProjectView>, i64)> {
    let total: i64 = apply_filter(projects::table.into_boxed(), filter)
        .count()
        .get_result(conn)?;

    let (limit, offset) = page.limit_offset();
    let rows: Vec<Project> = apply_filter(projects::table.into_boxed(), filter)
        .order((projects::created_at.desc(), projects::id.desc()))
        .limit(limit)
        .offset(offset)
        .select(Project::as_select())
        .load(conn)?;

    Ok((to_views(conn, rows)?, total))
}

pub fn get_project(conn: &mut PgConnection, id: i32) -> ServiceResult<ProjectView> {
    let project = find_project(conn, id)?;
    to_view(conn, project)
}

/// Applies a partial update and logs every allow-listed field that actually
/// changed, in the same transaction.
#[instrument(skip(conn, patch))]
pub fn update_project(
    conn: &mut PgConnection,
    id: i32,
    patch: ProjectPatch,
    updated_by: i32,
) -> ServiceResult<ProjectView> {
    let patch = patch.normalized();

    conn.transaction(|conn| {
        let current = lock_project(conn, id)?;

        ensure_references(
            conn,
            patch.region_id,
            patch.status_id,
            patch.project_type_id.flatten(),
            patch.company_id.flatten(),
            patch.kanban_column_id,
        )?;

        let changes = diff_fields(&current, &patch);
        let row = ProjectRowChanges::from_patch(&patch);

        let project = if row.is_empty() {
            current
        } else {
            diesel::update(projects::table.find(id))
                .set((&row, projects::updated_at.eq(diesel::dsl::now)))
                .returning(Project::as_returning())
                .get_result(conn)?
        };

        append_logs(conn, id, updated_by, &changes)?;

        if let Some(executor_ids) = patch.executor_ids.as_deref() {
            replace_executors(conn, id, executor_ids)?;
        }

        if !changes.is_empty() {
            let fields: Vec<&str> = changes.iter().map(|c| c.field).collect();
            OutboxService::emit(
                conn,
                EventType::ProjectUpdated,
                AggregateType::Project,
                id,
                &serde_json::json!({ "project_id": id, "fields": fields }),
                Some(updated_by),
            )?;
        }

        info!(project_id = id, changed = changes.len(), "Project updated");
        to_view(conn, project)
    })
}

#[derive(Debug, Clone, Copy)]
enum Transition {
    Status,
    Column,
}

impl Transition {
    fn field(self) -> &'static str {
        match self {
            Transition::Status => "status_id",
            Transition::Column => "kanban_column_id",
        }
    }
}

/// Single-field transition that is always logged, even when the value does
/// not change.
fn transition(
    conn: &mut PgConnection,
    id: i32,
    kind: Transition,
    new_value: i32,
    actor_id: i32,
) -> ServiceResult<(Project, FieldChange)> {
    let current = lock_project(conn, id)?;

    let query = diesel::update(projects::table.find(id));
    let (old_value, project) = match kind {
        Transition::Status => (
            current.status_id,
            query
                .set((
                    projects::status_id.eq(new_value),
                    projects::updated_at.eq(diesel::dsl::now),
                ))
                .returning(Project::as_returning())
                .get_result(conn)?,
        ),
        Transition::Column => (
            current.kanban_column_id,
            query
                .set((
                    projects::kanban_column_id.eq(new_value),
                    projects::updated_at.eq(diesel::dsl::now),
                ))
                .returning(Project::as_returning())
                .get_result(conn)?,
        ),
    };

    let change = FieldChange {
        field: kind.field(),
        old_value: Some(old_value.to_string()),
        new_value: Some(new_value.to_string()),
    };
    append_logs(conn, id, actor_id, std::slice::from_ref(&change))?;
    Ok((project, change))
}

fn transition_payload(project_id: i32, change: FieldChange) -> ProjectTransitionPayload {
    ProjectTransitionPayload {
        project_id,
        field: change.field.to_string(),
        old_value: change.old_value,
        new_value: change.new_value,
    }
}

#[instrument(skip(conn))]
pub fn update_status(
    conn: &mut PgConnection,
    id: i32,
    status_id: i32,
    updated_by: i32,
) -> ServiceResult<ProjectView> {
    conn.transaction(|conn| {
        ensure_references(conn, None, Some(status_id), None, None, None)?;

        let (project, change) = transition(conn, id, Transition::Status, status_id, updated_by)?;

        OutboxService::emit(
            conn,
            EventType::ProjectStatusChanged,
            AggregateType::Project,
            id,
            &transition_payload(id, change),
            Some(updated_by),
        )?;
        notify_executors(
            conn,
            &project,
            "Project status changed",
            &format!("The status of \"{}\" was updated", project.name),
            updated_by,
        )?;

        info!(project_id = id, status_id, "Project status updated");
        to_view(conn, project)
    })
}

#[instrument(skip(conn))]
pub fn move_to_column(
    conn: &mut PgConnection,
    id: i32,
    column_id: i32,
    moved_by: i32,
) -> ServiceResult<ProjectView> {
    conn.transaction(|conn| {
        ensure_references(conn, None, None, None, None, Some(column_id))?;

        let (project, change) = transition(conn, id, Transition::Column, column_id, moved_by)?;

        OutboxService::emit(
            conn,
            EventType::ProjectMoved,
            AggregateType::Project,
            id,
            &transition_payload(id, change),
            Some(moved_by),
        )?;
        notify_executors(
            conn,
            &project,
            "Project moved",
            &format!("\"{}\" was moved to another column", project.name),
            moved_by,
        )?;

        info!(project_id = id, column_id, "Project moved to kanban column");
        to_view(conn, project)
    })
}

#[instrument(skip(conn))]
pub fn delete_project(conn: &mut PgConnection, id: i32, deleted_by: i32) -> ServiceResult<()> {
    conn.transaction(|conn| {
        let deleted = diesel::delete(projects::table.find(id)).execute(conn)?;
        if deleted == 0 {
            return Err(project_not_found(id));
        }

        OutboxService::emit(
            conn,
            EventType::ProjectDeleted,
            AggregateType::Project,
            id,
            &serde_json::json!({ "project_id": id }),
            Some(deleted_by),
        )?;

        info!(project_id = id, "Project deleted");
        Ok(())
    })
}

/// Audit trail, newest first.
pub fn list_logs(conn: &mut PgConnection, project_id: i32) -> ServiceResult<Vec<ProjectLog>> {
    find_project(conn, project_id)?;

    Ok(project_logs::table
        .filter(project_logs::project_id.eq(project_id))
        .order((project_logs::created_at.desc(), project_logs::id.desc()))
        .select(ProjectLog::as_select())
        .load(conn)?)
}

pub fn list_comments(conn: &mut PgConnection, project_id: i32) -> ServiceResult<Vec<CommentView>> {
    find_project(conn, project_id)?;

    let rows: Vec<(ProjectComment, (i32, String, String))> = project_comments::table
        .inner_join(users::table)
        .filter(project_comments::project_id.eq(project_id))
        .order((project_comments::created_at.desc(), project_comments::id.desc()))
        .select((
            ProjectComment::as_select(),
            (users::id, users::email, users::full_name),
        ))
        .load(conn)?;

    Ok(rows
        .into_iter()
        .map(|(comment, (id, email, full_name))| CommentView {
            comment,
            author: ProjectUser {
                id,
                email,
                full_name,
            },
        })
        .collect())
}

#[instrument(skip(conn, content))]
pub fn add_comment(
    conn: &mut PgConnection,
    project_id: i32,
    author_id: i32,
    content: &str,
) -> ServiceResult<CommentView> {
    find_project(conn, project_id)?;

    let comment = diesel::insert_into(project_comments::table)
        .values(&NewProjectComment {
            project_id,
            author_id,
            content: content.trim().to_string(),
        })
        .returning(ProjectComment::as_returning())
        .get_result(conn)?;

    let (id, email, full_name): (i32, String, String) = users::table
        .find(author_id)
        .select((users::id, users::email, users::full_name))
        .first(conn)?;

    info!(project_id, comment_id = comment.id, "Comment added");
    Ok(CommentView {
        comment,
        author: ProjectUser {
            id,
            email,
            full_name,
        },
    })
}

pub fn is_name_taken(conn: &mut PgConnection, name: &str) -> ServiceResult<bool> {
    Ok(diesel::select(diesel::dsl::exists(
        projects::table.filter(projects::name.eq(name.trim())),
    ))
    .get_result(conn)?)
}
