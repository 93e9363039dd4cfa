//! System-level user administration.
//!
//! Users are soft-deleted: the row stays so audit references remain valid.

use diesel::prelude::*;
use tracing::{info, instrument};

use crate::auth::session::revoke_refresh_token;
use crate::error::{ServiceError, ServiceResult};
use crate::models::{NewUser, NewUserProfile, UserStatus};
use crate::pagination::PaginationParams;
use crate::schema::{user_profiles, user_roles, users};

use super::directory::{find_company, grant_role, to_views, ProfileRow, UserView};
use super::roles::find_role;

#[derive(Debug)]
pub struct NewAccount {
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub is_admin: bool,
    pub status: UserStatus,
    pub region_id: Option<i32>,
    pub company_id: Option<i32>,
    pub role_ids: Vec<i32>,
    pub phone: Option<String>,
    pub position: Option<String>,
}

#[derive(Debug, Default)]
pub struct AccountChanges {
    pub full_name: Option<String>,
    pub is_admin: Option<bool>,
    pub status: Option<UserStatus>,
    pub region_id: Option<Option<i32>>,
    pub company_id: Option<Option<i32>>,
    pub phone: Option<Option<String>>,
    pub position: Option<Option<String>>,
}

#[derive(AsChangeset)]
#[diesel(table_name = users)]
struct AccountRowChanges {
    full_name: Option<String>,
    is_admin: Option<bool>,
    status: Option<String>,
    region_id: Option<Option<i32>>,
}

impl AccountRowChanges {
    fn is_empty(&self) -> bool {
        self.full_name.is_none()
            && self.is_admin.is_none()
            && self.status.is_none()
            && self.region_id.is_none()
    }
}

fn user_not_found(id: i32) -> ServiceError {
    ServiceError::not_found(format!("User with id {} not found", id))
}

fn load_views(
    conn: &mut PgConnection,
    ids: Option<&[i32]>,
    page: Option<&PaginationParams>,
) -> ServiceResult<Vec<UserView>> {
    let mut query = users::table
        .left_join(user_profiles::table)
        .filter(users::is_deleted.eq(false))
        .order(users::id.asc())
        .select((
            users::all_columns,
            (
                user_profiles::company_id.nullable(),
                user_profiles::phone.nullable(),
                user_profiles::position.nullable(),
            ),
        ))
        .into_boxed();

    if let Some(ids) = ids {
        query = query.filter(users::id.eq_any(ids.to_vec()));
    }
    if let Some(page) = page {
        let (limit, offset) = page.limit_offset();
        query = query.limit(limit).offset(offset);
    }

    let rows: Vec<ProfileRow> = query.load(conn)?;
    to_views(conn, rows)
}

pub fn get_user(conn: &mut PgConnection, id: i32) -> ServiceResult<UserView> {
    load_views(conn, Some(std::slice::from_ref(&id)), None)?
        .pop()
        .ok_or_else(|| user_not_found(id))
}

/// One page of live users plus the total count.
pub fn list_users(
    conn: &mut PgConnection,
    page: &PaginationParams,
) -> ServiceResult<(Vec<UserView>, i64)> {
    let total: i64 = users::table
        .filter(users::is_deleted.eq(false))
        .count()
        .get_result(conn)?;
    let views = load_views(conn, None, Some(page))?;
    Ok((views, total))
}

#[instrument(skip(conn, input), fields(email = %input.email))]
pub fn create_user(
    conn: &mut PgConnection,
    input: NewAccount,
    created_by: i32,
) -> ServiceResult<UserView> {
    conn.transaction(|conn| {
        if let Some(company_id) = input.company_id {
            find_company(conn, company_id)?;
        }
        for role_id in &input.role_ids {
            find_role(conn, *role_id)?;
        }

        let user_id: i32 = diesel::insert_into(users::table)
            .values(&NewUser {
                email: input.email.trim().to_lowercase(),
                password_hash: input.password_hash,
                full_name: input.full_name,
                is_admin: input.is_admin,
                status: input.status.as_str().to_string(),
                region_id: input.region_id,
            })
            .returning(users::id)
            .get_result(conn)
            .map_err(|e| match e {
                diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::UniqueViolation,
                    _,
                ) => ServiceError::conflict("User with this email already exists"),
                other => other.into(),
            })?;

        diesel::insert_into(user_profiles::table)
            .values(&NewUserProfile {
                user_id,
                company_id: input.company_id,
                phone: input.phone,
                position: input.position,
            })
            .execute(conn)?;

        for role_id in &input.role_ids {
            grant_role(conn, user_id, *role_id, Some(created_by))?;
        }

        info!(user_id, "User created");
        get_user(conn, user_id)
    })
}

#[instrument(skip(conn, changes))]
pub fn update_user(
    conn: &mut PgConnection,
    id: i32,
    changes: AccountChanges,
) -> ServiceResult<UserView> {
    conn.transaction(|conn| {
        get_user(conn, id)?;

        if let Some(Some(company_id)) = changes.company_id {
            find_company(conn, company_id)?;
        }

        let row = AccountRowChanges {
            full_name: changes.full_name,
            is_admin: changes.is_admin,
            status: changes.status.map(|s| s.as_str().to_string()),
            region_id: changes.region_id,
        };
        if !row.is_empty() {
            diesel::update(users::table.find(id))
                .set((row, users::updated_at.eq(diesel::dsl::now)))
                .execute(conn)?;
        }

        if matches!(changes.status, Some(status) if status != UserStatus::Active) {
            revoke_refresh_token(conn, id)?;
        }

        if changes.company_id.is_some() || changes.phone.is_some() || changes.position.is_some() {
            let current: Option<(Option<i32>, Option<String>, Option<String>)> =
                user_profiles::table
                    .filter(user_profiles::user_id.eq(id))
                    .select((
                        user_profiles::company_id,
                        user_profiles::phone,
                        user_profiles::position,
                    ))
                    .first(conn)
                    .optional()?;
            let (company_id, phone, position) = current.unwrap_or_default();

            let profile = NewUserProfile {
                user_id: id,
                company_id: changes.company_id.unwrap_or(company_id),
                phone: changes.phone.unwrap_or(phone),
                position: changes.position.unwrap_or(position),
            };
            diesel::insert_into(user_profiles::table)
                .values(&profile)
                .on_conflict(user_profiles::user_id)
                .do_update()
                .set((
                    user_profiles::company_id.eq(profile.company_id),
                    user_profiles::phone.eq(&profile.phone),
                    user_profiles::position.eq(&profile.position),
                    user_profiles::updated_at.eq(diesel::dsl::now),
                ))
                .execute(conn)?;
        }

        info!(user_id = id, "User updated");
        get_user(conn, id)
    })
}

/// Marks the row deleted, deactivates it and revokes its refresh token.
pub(crate) fn soft_delete_row(conn: &mut PgConnection, id: i32) -> ServiceResult<()> {
    let updated = diesel::update(users::table.find(id).filter(users::is_deleted.eq(false)))
        .set((
            users::is_deleted.eq(true),
            users::status.eq(UserStatus::Inactive.as_str()),
            users::updated_at.eq(diesel::dsl::now),
        ))
        .execute(conn)?;
    if updated == 0 {
        return Err(user_not_found(id));
    }
    revoke_refresh_token(conn, id)
}

#[instrument(skip(conn))]
pub fn delete_user(conn: &mut PgConnection, id: i32, actor_id: i32) -> ServiceResult<()> {
    if id == actor_id {
        return Err(ServiceError::bad_request("You cannot delete your own account"));
    }
    conn.transaction(|conn| soft_delete_row(conn, id))?;
    info!(user_id = id, "User soft-deleted");
    Ok(())
}

#[instrument(skip(conn))]
pub fn assign_role(
    conn: &mut PgConnection,
    user_id: i32,
    role_id: i32,
    assigned_by: i32,
) -> ServiceResult<UserView> {
    conn.transaction(|conn| {
        get_user(conn, user_id)?;
        find_role(conn, role_id)?;

        if grant_role(conn, user_id, role_id, Some(assigned_by))? == 0 {
            return Err(ServiceError::conflict("Role is already assigned to this user"));
        }

        info!(user_id, role_id, "Role assigned");
        get_user(conn, user_id)
    })
}

#[instrument(skip(conn))]
pub fn remove_role(conn: &mut PgConnection, user_id: i32, role_id: i32) -> ServiceResult<UserView> {
    conn.transaction(|conn| {
        get_user(conn, user_id)?;
        find_role(conn, role_id)?;

        let removed = diesel::delete(
            user_roles::table
                .filter(user_roles::user_id.eq(user_id))
                .filter(user_roles::role_id.eq(role_id)),
        )
        .execute(conn)?;
        if removed == 0 {
            return Err(ServiceError::bad_request("Role is not assigned to this user"));
        }

        info!(user_id, role_id, "Role removed");
        get_user(conn, user_id)
    })
}

/// Inserts an active administrator unless the email is already registered.
/// Returns the new id, or `None` when nothing was created.
pub fn ensure_admin<F>(
    conn: &mut PgConnection,
    email: &str,
    full_name: &str,
    hash_password: F,
) -> ServiceResult<Option<i32>>
where
    F: FnOnce() -> ServiceResult<String>,
{
    let email = email.trim().to_lowercase();
    let existing: Option<i32> = users::table
        .filter(users::email.eq(&email))
        .select(users::id)
        .first(conn)
        .optional()?;
    if existing.is_some() {
        return Ok(None);
    }

    let password_hash = hash_password()?;
    conn.transaction(|conn| {
        let user_id: i32 = diesel::insert_into(users::table)
            .values(&NewUser {
                email,
                password_hash,
                full_name: full_name.to_string(),
                is_admin: true,
                status: UserStatus::Active.as_str().to_string(),
                region_id: None,
            })
            .returning(users::id)
            .get_result(conn)?;

        diesel::insert_into(user_profiles::table)
            .values(&NewUserProfile {
                user_id,
                company_id: None,
                phone: None,
                position: None,
            })
            .execute(conn)?;

        Ok(Some(user_id))
    })
}
