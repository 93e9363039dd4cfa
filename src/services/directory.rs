//! Companies, the users that belong to them, and registration invitations.
//!
//! A user belongs to at most one company, recorded on `user_profiles`. The
//! rule is enforced here rather than in the schema, and every company-user
//! operation re-reads the link before acting.

use chrono::{Duration, NaiveDateTime, Utc};
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::Serialize;
use std::collections::HashMap;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::auth::session::revoke_refresh_token;
use crate::authz::catalog::COMPANY_USER_ROLE;
use crate::error::{ServiceError, ServiceResult};
use crate::events::{AggregateType, EventType, OutboxService};
use crate::models::{
    Company, InvitationStatus, NewCompany, NewRegistrationInvitation, NewUser, NewUserProfile,
    NewUserRole, RegistrationInvitation, User, UserStatus,
};
use crate::schema::{
    companies, permissions, projects, registration_invitations, role_permissions, roles,
    user_profiles, user_roles, users,
};

use super::roles::{find_role, find_role_by_name};

pub const INVITATION_TTL_DAYS: i64 = 7;
/// Prefix shared by every permission a company route may hand out.
const COMPANY_GRANT_PREFIX: &str = "company-";
const INVITATION_SUFFIX_ALPHABET: [char; 36] = [
    '0', '1', '2', '3', '4', '5', '6', '7', '8', '9', 'A', 'B', 'C', 'D', 'E', 'F', 'G', 'H', 'I',
    'J', 'K', 'L', 'M', 'N', 'O', 'P', 'Q', 'R', 'S', 'T', 'U', 'V', 'W', 'X', 'Y', 'Z',
];

// ---------------------------------------------------------------------------
// Companies
// ---------------------------------------------------------------------------

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = companies)]
pub struct CompanyChanges {
    pub name: Option<String>,
    pub inn: Option<Option<String>>,
}

impl CompanyChanges {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.inn.is_none()
    }
}

fn company_not_found(id: i32) -> ServiceError {
    ServiceError::not_found(format!("Company with id {} not found", id))
}

pub fn find_company(conn: &mut PgConnection, id: i32) -> ServiceResult<Company> {
    companies::table
        .find(id)
        .select(Company::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| company_not_found(id))
}

fn ensure_inn_free(conn: &mut PgConnection, inn: &str, except: Option<i32>) -> ServiceResult<()> {
    let mut query = companies::table
        .filter(companies::inn.eq(inn))
        .select(companies::id)
        .into_boxed();
    if let Some(id) = except {
        query = query.filter(companies::id.ne(id));
    }
    if query.first::<i32>(conn).optional()?.is_some() {
        return Err(ServiceError::conflict(format!(
            "Company with INN '{}' already exists",
            inn
        )));
    }
    Ok(())
}

fn map_company_name_conflict(name: &str) -> impl FnOnce(DieselError) -> ServiceError + '_ {
    move |e| match e {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            ServiceError::conflict(format!("Company with name '{}' already exists", name))
        }
        other => other.into(),
    }
}

#[instrument(skip(conn))]
pub fn create_company(
    conn: &mut PgConnection,
    name: &str,
    inn: Option<String>,
) -> ServiceResult<Company> {
    conn.transaction(|conn| {
        if let Some(inn) = inn.as_deref() {
            ensure_inn_free(conn, inn, None)?;
        }

        let company = diesel::insert_into(companies::table)
            .values(&NewCompany {
                name: name.to_string(),
                inn,
            })
            .returning(Company::as_returning())
            .get_result(conn)
            .map_err(map_company_name_conflict(name))?;

        info!(company_id = company.id, "Company created");
        Ok(company)
    })
}

pub fn list_companies(conn: &mut PgConnection) -> ServiceResult<Vec<Company>> {
    Ok(companies::table
        .order(companies::name.asc())
        .select(Company::as_select())
        .load(conn)?)
}

#[instrument(skip(conn, changes))]
pub fn update_company(
    conn: &mut PgConnection,
    id: i32,
    changes: CompanyChanges,
) -> ServiceResult<Company> {
    conn.transaction(|conn| {
        let company = find_company(conn, id)?;
        if changes.is_empty() {
            return Ok(company);
        }
        if let Some(Some(inn)) = changes.inn.as_ref() {
            ensure_inn_free(conn, inn, Some(id))?;
        }

        let name = changes.name.clone().unwrap_or(company.name);
        let company = diesel::update(companies::table.find(id))
            .set((&changes, companies::updated_at.eq(diesel::dsl::now)))
            .returning(Company::as_returning())
            .get_result(conn)
            .map_err(map_company_name_conflict(&name))?;

        info!(company_id = id, "Company updated");
        Ok(company)
    })
}

#[instrument(skip(conn))]
pub fn delete_company(conn: &mut PgConnection, id: i32) -> ServiceResult<()> {
    conn.transaction(|conn| {
        find_company(conn, id)?;

        let user_count: i64 = user_profiles::table
            .filter(user_profiles::company_id.eq(id))
            .count()
            .get_result(conn)?;
        let project_count: i64 = projects::table
            .filter(projects::company_id.eq(id))
            .count()
            .get_result(conn)?;

        if user_count > 0 || project_count > 0 {
            warn!(company_id = id, user_count, project_count, "Refusing to delete company in use");
            return Err(ServiceError::conflict(format!(
                "Company is still referenced by {} user(s) and {} project(s)",
                user_count, project_count
            )));
        }

        diesel::delete(
            registration_invitations::table.filter(registration_invitations::company_id.eq(id)),
        )
        .execute(conn)?;
        diesel::delete(companies::table.find(id)).execute(conn)?;

        info!(company_id = id, "Company deleted");
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Company users
// ---------------------------------------------------------------------------

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct UserView {
    pub id: i32,
    #[schema(example = "user@example.com")]
    pub email: String,
    pub full_name: String,
    pub is_admin: bool,
    #[schema(example = "ACTIVE")]
    pub status: String,
    pub company_id: Option<i32>,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub region_id: Option<i32>,
    pub roles: Vec<String>,
    pub last_login: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug)]
pub struct NewCompanyUser {
    pub email: String,
    pub password_hash: String,
    pub full_name: String,
    pub phone: Option<String>,
    pub position: Option<String>,
    pub region_id: Option<i32>,
    pub role_id: Option<i32>,
}

#[derive(Debug, Default)]
pub struct CompanyUserChanges {
    pub full_name: Option<String>,
    pub region_id: Option<Option<i32>>,
    pub phone: Option<Option<String>>,
    pub position: Option<Option<String>>,
}

#[derive(AsChangeset)]
#[diesel(table_name = users)]
struct UserRowChanges {
    full_name: Option<String>,
    region_id: Option<Option<i32>>,
}

#[derive(AsChangeset)]
#[diesel(table_name = user_profiles)]
struct ProfileRowChanges {
    phone: Option<Option<String>>,
    position: Option<Option<String>>,
}

pub(super) type ProfileRow = (User, (Option<i32>, Option<String>, Option<String>));

fn load_role_names(
    conn: &mut PgConnection,
    user_ids: &[i32],
) -> ServiceResult<HashMap<i32, Vec<String>>> {
    let rows: Vec<(i32, String)> = user_roles::table
        .inner_join(roles::table)
        .filter(user_roles::user_id.eq_any(user_ids))
        .order((user_roles::user_id.asc(), roles::name.asc()))
        .select((user_roles::user_id, roles::name))
        .load(conn)?;

    let mut by_user: HashMap<i32, Vec<String>> = HashMap::new();
    for (user_id, name) in rows {
        by_user.entry(user_id).or_default().push(name);
    }
    Ok(by_user)
}

pub(super) fn to_views(conn: &mut PgConnection, rows: Vec<ProfileRow>) -> ServiceResult<Vec<UserView>> {
    let ids: Vec<i32> = rows.iter().map(|(user, _)| user.id).collect();
    let mut role_names = load_role_names(conn, &ids)?;

    Ok(rows
        .into_iter()
        .map(|(user, (company_id, phone, position))| UserView {
            roles: role_names.remove(&user.id).unwrap_or_default(),
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            is_admin: user.is_admin,
            status: user.status,
            company_id,
            phone,
            position,
            region_id: user.region_id,
            last_login: user.last_login,
            created_at: user.created_at,
        })
        .collect())
}

/// Loads a user only if it is live and currently linked to `company_id`.
pub fn find_company_user(
    conn: &mut PgConnection,
    company_id: i32,
    user_id: i32,
) -> ServiceResult<UserView> {
    let row: Option<ProfileRow> = users::table
        .inner_join(user_profiles::table)
        .filter(users::id.eq(user_id))
        .filter(users::is_deleted.eq(false))
        .filter(user_profiles::company_id.eq(company_id))
        .select((
            User::as_select(),
            (
                user_profiles::company_id,
                user_profiles::phone,
                user_profiles::position,
            ),
        ))
        .first(conn)
        .optional()?;

    let row = row.ok_or_else(|| {
        ServiceError::not_found(format!(
            "User {} does not belong to company {}",
            user_id, company_id
        ))
    })?;

    to_views(conn, vec![row])?
        .pop()
        .ok_or_else(|| ServiceError::not_found("User not found"))
}

pub fn list_company_users(
    conn: &mut PgConnection,
    company_id: i32,
) -> ServiceResult<Vec<UserView>> {
    find_company(conn, company_id)?;

    let rows: Vec<ProfileRow> = users::table
        .inner_join(user_profiles::table)
        .filter(user_profiles::company_id.eq(company_id))
        .filter(users::is_deleted.eq(false))
        .order(users::id.asc())
        .select((
            User::as_select(),
            (
                user_profiles::company_id,
                user_profiles::phone,
                user_profiles::position,
            ),
        ))
        .load(conn)?;

    to_views(conn, rows)
}

pub(super) fn grant_role(
    conn: &mut PgConnection,
    user_id: i32,
    role_id: i32,
    assigned_by: Option<i32>,
) -> ServiceResult<usize> {
    Ok(diesel::insert_into(user_roles::table)
        .values(&NewUserRole {
            user_id,
            role_id,
            assigned_by,
        })
        .on_conflict_do_nothing()
        .execute(conn)?)
}

/// Links an existing user without a company to `company_id` and grants the
/// default company role.
#[instrument(skip(conn))]
pub fn add_existing_user(
    conn: &mut PgConnection,
    company_id: i32,
    user_id: i32,
    assigned_by: i32,
) -> ServiceResult<UserView> {
    conn.transaction(|conn| {
        find_company(conn, company_id)?;

        let user_exists: bool = diesel::select(diesel::dsl::exists(
            users::table
                .find(user_id)
                .filter(users::is_deleted.eq(false)),
        ))
        .get_result(conn)?;
        if !user_exists {
            return Err(ServiceError::not_found(format!(
                "User with id {} not found",
                user_id
            )));
        }

        let current: Option<Option<i32>> = user_profiles::table
            .filter(user_profiles::user_id.eq(user_id))
            .select(user_profiles::company_id)
            .first(conn)
            .optional()?;
        if let Some(Some(existing)) = current {
            warn!(user_id, existing_company_id = existing, "User already linked to a company");
            return Err(ServiceError::conflict("User already belongs to a company"));
        }

        diesel::insert_into(user_profiles::table)
            .values(&NewUserProfile {
                user_id,
                company_id: Some(company_id),
                phone: None,
                position: None,
            })
            .on_conflict(user_profiles::user_id)
            .do_update()
            .set((
                user_profiles::company_id.eq(Some(company_id)),
                user_profiles::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)?;

        let default_role = find_role_by_name(conn, COMPANY_USER_ROLE)?;
        grant_role(conn, user_id, default_role.id, Some(assigned_by))?;

        info!(company_id, user_id, "Existing user added to company");
        find_company_user(conn, company_id, user_id)
    })
}

fn insert_user(
    conn: &mut PgConnection,
    new_user: &NewUser,
) -> ServiceResult<User> {
    diesel::insert_into(users::table)
        .values(new_user)
        .returning(User::as_returning())
        .get_result(conn)
        .map_err(|e| match e {
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
                ServiceError::conflict("User with this email already exists")
            }
            other => other.into(),
        })
}

/// Creates an account already linked to the company. User, profile and role
/// land in one transaction.
#[instrument(skip(conn, input), fields(email = %input.email))]
pub fn create_company_user(
    conn: &mut PgConnection,
    company_id: i32,
    input: NewCompanyUser,
    created_by: i32,
) -> ServiceResult<UserView> {
    conn.transaction(|conn| {
        find_company(conn, company_id)?;

        let role = match input.role_id {
            Some(role_id) => find_role(conn, role_id)?,
            None => find_role_by_name(conn, COMPANY_USER_ROLE)?,
        };

        let user = insert_user(
            conn,
            &NewUser {
                email: input.email.trim().to_lowercase(),
                password_hash: input.password_hash,
                full_name: input.full_name,
                is_admin: false,
                status: UserStatus::Active.as_str().to_string(),
                region_id: input.region_id,
            },
        )?;

        diesel::insert_into(user_profiles::table)
            .values(&NewUserProfile {
                user_id: user.id,
                company_id: Some(company_id),
                phone: input.phone,
                position: input.position,
            })
            .execute(conn)?;

        grant_role(conn, user.id, role.id, Some(created_by))?;

        info!(company_id, user_id = user.id, "Company user created");
        find_company_user(conn, company_id, user.id)
    })
}

#[instrument(skip(conn, changes))]
pub fn update_company_user(
    conn: &mut PgConnection,
    company_id: i32,
    user_id: i32,
    changes: CompanyUserChanges,
) -> ServiceResult<UserView> {
    conn.transaction(|conn| {
        find_company_user(conn, company_id, user_id)?;

        if changes.full_name.is_some() || changes.region_id.is_some() {
            diesel::update(users::table.find(user_id))
                .set((
                    UserRowChanges {
                        full_name: changes.full_name,
                        region_id: changes.region_id,
                    },
                    users::updated_at.eq(diesel::dsl::now),
                ))
                .execute(conn)?;
        }

        if changes.phone.is_some() || changes.position.is_some() {
            diesel::update(user_profiles::table.filter(user_profiles::user_id.eq(user_id)))
                .set((
                    ProfileRowChanges {
                        phone: changes.phone,
                        position: changes.position,
                    },
                    user_profiles::updated_at.eq(diesel::dsl::now),
                ))
                .execute(conn)?;
        }

        info!(company_id, user_id, "Company user updated");
        find_company_user(conn, company_id, user_id)
    })
}

/// Activates or deactivates a company user. Deactivation takes effect on the
/// user's next request because every request re-reads the account.
#[instrument(skip(conn))]
pub fn set_company_user_status(
    conn: &mut PgConnection,
    company_id: i32,
    user_id: i32,
    status: UserStatus,
) -> ServiceResult<UserView> {
    conn.transaction(|conn| {
        find_company_user(conn, company_id, user_id)?;

        diesel::update(users::table.find(user_id))
            .set((
                users::status.eq(status.as_str()),
                users::updated_at.eq(diesel::dsl::now),
            ))
            .execute(conn)?;

        if status != UserStatus::Active {
            revoke_refresh_token(conn, user_id)?;
        }

        info!(company_id, user_id, status = %status, "Company user status changed");
        find_company_user(conn, company_id, user_id)
    })
}

/// Soft delete: the row stays, the account can no longer sign in.
#[instrument(skip(conn))]
pub fn remove_company_user(
    conn: &mut PgConnection,
    company_id: i32,
    user_id: i32,
) -> ServiceResult<()> {
    conn.transaction(|conn| {
        find_company_user(conn, company_id, user_id)?;
        super::users::soft_delete_row(conn, user_id)?;
        info!(company_id, user_id, "Company user removed");
        Ok(())
    })
}

/// A role is assignable through company routes only when every grant it
/// carries is company-scoped. A role with no grants qualifies.
pub fn is_company_role(grants: &[String]) -> bool {
    grants.iter().all(|name| name.starts_with(COMPANY_GRANT_PREFIX))
}

fn role_grant_names(conn: &mut PgConnection, role_id: i32) -> ServiceResult<Vec<String>> {
    Ok(role_permissions::table
        .inner_join(permissions::table)
        .filter(role_permissions::role_id.eq(role_id))
        .select(permissions::name)
        .load(conn)?)
}

#[instrument(skip(conn))]
pub fn assign_company_role(
    conn: &mut PgConnection,
    company_id: i32,
    user_id: i32,
    role_id: i32,
    assigned_by: i32,
) -> ServiceResult<UserView> {
    conn.transaction(|conn| {
        find_company_user(conn, company_id, user_id)?;
        let role = find_role(conn, role_id)?;

        if !is_company_role(&role_grant_names(conn, role_id)?) {
            warn!(company_id, user_id, role = %role.name, "Refused to grant a global role");
            return Err(ServiceError::forbidden(
                "Only company-scoped roles can be assigned here",
            ));
        }

        if grant_role(conn, user_id, role_id, Some(assigned_by))? == 0 {
            return Err(ServiceError::conflict("Role is already assigned to this user"));
        }

        info!(company_id, user_id, role_id, "Role assigned to company user");
        find_company_user(conn, company_id, user_id)
    })
}

#[instrument(skip(conn))]
pub fn remove_company_role(
    conn: &mut PgConnection,
    company_id: i32,
    user_id: i32,
    role_id: i32,
) -> ServiceResult<UserView> {
    conn.transaction(|conn| {
        find_company_user(conn, company_id, user_id)?;
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

        info!(company_id, user_id, role_id, "Role removed from company user");
        find_company_user(conn, company_id, user_id)
    })
}

// ---------------------------------------------------------------------------
// Invitations
// ---------------------------------------------------------------------------

fn to_base36(mut value: u64) -> String {
    if value == 0 {
        return "0".to_string();
    }
    let mut digits = Vec::new();
    while value > 0 {
        digits.push(INVITATION_SUFFIX_ALPHABET[(value % 36) as usize]);
        value /= 36;
    }
    digits.iter().rev().collect()
}

/// `INV-<company>-<base36 millis>-<random>`.
pub fn generate_invitation_code(company_id: i32, issued_at: NaiveDateTime) -> String {
    let millis = u64::try_from(issued_at.and_utc().timestamp_millis()).unwrap_or_default();
    format!(
        "INV-{}-{}-{}",
        company_id,
        to_base36(millis),
        nanoid::nanoid!(6, &INVITATION_SUFFIX_ALPHABET)
    )
}

pub fn is_expired(invitation: &RegistrationInvitation, now: NaiveDateTime) -> bool {
    invitation.expires_at <= now
}

/// Flips PENDING invitations for `email` whose deadline has passed to EXPIRED.
fn expire_lapsed_invitations(
    conn: &mut PgConnection,
    email: &str,
    now: NaiveDateTime,
) -> ServiceResult<usize> {
    Ok(diesel::update(
        registration_invitations::table
            .filter(registration_invitations::email.eq(email))
            .filter(registration_invitations::status.eq(InvitationStatus::Pending.as_str()))
            .filter(registration_invitations::expires_at.le(now)),
    )
    .set(registration_invitations::status.eq(InvitationStatus::Expired.as_str()))
    .execute(conn)?)
}

#[derive(Debug, Serialize)]
struct InvitationPayload<'a> {
    email: &'a str,
    code: &'a str,
    company_id: i32,
    expires_at: NaiveDateTime,
}

#[instrument(skip(conn))]
pub fn create_invitation(
    conn: &mut PgConnection,
    company_id: i32,
    email: &str,
    invited_by: i32,
) -> ServiceResult<RegistrationInvitation> {
    let email = email.trim().to_lowercase();

    conn.transaction(|conn| {
        let company = find_company(conn, company_id)?;
        let now = Utc::now().naive_utc();

        let lapsed = expire_lapsed_invitations(conn, &email, now)?;
        if lapsed > 0 {
            info!(lapsed, "Lapsed invitations marked expired");
        }

        let pending: bool = diesel::select(diesel::dsl::exists(
            registration_invitations::table
                .filter(registration_invitations::email.eq(&email))
                .filter(registration_invitations::status.eq(InvitationStatus::Pending.as_str())),
        ))
        .get_result(conn)?;
        if pending {
            return Err(ServiceError::conflict(
                "An active invitation already exists for this email",
            ));
        }

        let registered: bool = diesel::select(diesel::dsl::exists(
            users::table.filter(users::email.eq(&email)),
        ))
        .get_result(conn)?;
        if registered {
            return Err(ServiceError::conflict("User with this email already exists"));
        }

        let role = find_role_by_name(conn, COMPANY_USER_ROLE)?;

        let invitation = diesel::insert_into(registration_invitations::table)
            .values(&NewRegistrationInvitation {
                email: email.clone(),
                code: generate_invitation_code(company_id, now),
                status: InvitationStatus::Pending.as_str().to_string(),
                invited_by,
                role_id: Some(role.id),
                company_id: Some(company_id),
                expires_at: now + Duration::days(INVITATION_TTL_DAYS),
            })
            .returning(RegistrationInvitation::as_returning())
            .get_result(conn)?;

        OutboxService::emit(
            conn,
            EventType::InvitationCreated,
            AggregateType::Invitation,
            invitation.id,
            &InvitationPayload {
                email: &invitation.email,
                code: &invitation.code,
                company_id,
                expires_at: invitation.expires_at,
            },
            Some(invited_by),
        )?;
        OutboxService::notify(
            conn,
            invited_by,
            "Invitation sent",
            format!("{} was invited to join {}", invitation.email, company.name),
            Some(invited_by),
        )?;

        info!(company_id, invitation_id = invitation.id, "Invitation created");
        Ok(invitation)
    })
}

pub fn list_invitations(
    conn: &mut PgConnection,
    company_id: i32,
) -> ServiceResult<Vec<RegistrationInvitation>> {
    find_company(conn, company_id)?;

    Ok(registration_invitations::table
        .filter(registration_invitations::company_id.eq(company_id))
        .order((
            registration_invitations::created_at.desc(),
            registration_invitations::id.desc(),
        ))
        .select(RegistrationInvitation::as_select())
        .load(conn)?)
}

/// Turns a pending invitation into an active account.
#[instrument(skip(conn, code, password_hash, full_name))]
pub fn register_with_invitation(
    conn: &mut PgConnection,
    code: &str,
    password_hash: String,
    full_name: &str,
) -> ServiceResult<User> {
    let invitation: RegistrationInvitation = registration_invitations::table
        .filter(registration_invitations::code.eq(code.trim()))
        .select(RegistrationInvitation::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ServiceError::not_found("Invitation not found"))?;

    if invitation.status != InvitationStatus::Pending.as_str() {
        return Err(ServiceError::bad_request("Invitation is no longer valid"));
    }

    if is_expired(&invitation, Utc::now().naive_utc()) {
        // Persisted outside the registration transaction so the flip survives
        // the rejection.
        diesel::update(registration_invitations::table.find(invitation.id))
            .set(registration_invitations::status.eq(InvitationStatus::Expired.as_str()))
            .execute(conn)?;
        warn!(invitation_id = invitation.id, "Expired invitation used");
        return Err(ServiceError::bad_request("Invitation has expired"));
    }

    conn.transaction(|conn| {
        let accepted = diesel::update(
            registration_invitations::table
                .find(invitation.id)
                .filter(registration_invitations::status.eq(InvitationStatus::Pending.as_str())),
        )
        .set(registration_invitations::status.eq(InvitationStatus::Accepted.as_str()))
        .execute(conn)?;
        if accepted == 0 {
            return Err(ServiceError::bad_request("Invitation is no longer valid"));
        }

        let user = insert_user(
            conn,
            &NewUser {
                email: invitation.email.clone(),
                password_hash,
                full_name: full_name.trim().to_string(),
                is_admin: false,
                status: UserStatus::Active.as_str().to_string(),
                region_id: None,
            },
        )?;

        diesel::insert_into(user_profiles::table)
            .values(&NewUserProfile {
                user_id: user.id,
                company_id: invitation.company_id,
                phone: None,
                position: None,
            })
            .execute(conn)?;

        let role_id = match invitation.role_id {
            Some(role_id) => role_id,
            None => find_role_by_name(conn, COMPANY_USER_ROLE)?.id,
        };
        grant_role(conn, user.id, role_id, Some(invitation.invited_by))?;

        OutboxService::emit(
            conn,
            EventType::UserRegistered,
            AggregateType::User,
            user.id,
            &serde_json::json!({
                "user_id": user.id,
                "invitation_id": invitation.id,
                "company_id": invitation.company_id,
            }),
            None,
        )?;

        info!(user_id = user.id, invitation_id = invitation.id, "User registered from invitation");
        Ok(user)
    })
}
