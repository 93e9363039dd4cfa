//! Roles, permissions and the grants between them.

use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::Serialize;
use std::collections::{BTreeSet, HashMap};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::authz::catalog::{COMPANY_ADMIN_ROLE, COMPANY_USER_ROLE};
use crate::error::{ServiceError, ServiceResult};
use crate::events::{AggregateType, EventType, OutboxService};
use crate::models::{NewPermission, NewRole, NewRolePermission, Permission, Role};
use crate::schema::{permissions, role_permissions, roles, user_roles};

const BUILT_IN_ROLES: [&str; 2] = [COMPANY_ADMIN_ROLE, COMPANY_USER_ROLE];

#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct RoleView {
    #[serde(flatten)]
    pub role: Role,
    pub permissions: Vec<String>,
}

#[derive(Debug, Default, AsChangeset)]
#[diesel(table_name = roles)]
pub struct RoleChanges {
    pub name: Option<String>,
    pub description: Option<Option<String>>,
}

impl RoleChanges {
    fn is_empty(&self) -> bool {
        self.name.is_none() && self.description.is_none()
    }
}

fn unique_name_conflict(kind: &'static str, name: &str) -> impl FnOnce(DieselError) -> ServiceError {
    let message = format!("{} with name '{}' already exists", kind, name);
    move |e| match e {
        DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _) => {
            ServiceError::conflict(message)
        }
        other => other.into(),
    }
}

/// Ids from `requested` that are absent in `found`, sorted.
pub fn unknown_ids(requested: &[i32], found: &[i32]) -> Vec<i32> {
    let found: BTreeSet<i32> = found.iter().copied().collect();
    requested
        .iter()
        .copied()
        .filter(|id| !found.contains(id))
        .collect::<BTreeSet<_>>()
        .into_iter()
        .collect()
}

// ---------------------------------------------------------------------------
// Roles
// ---------------------------------------------------------------------------

pub fn find_role(conn: &mut PgConnection, id: i32) -> ServiceResult<Role> {
    roles::table
        .find(id)
        .select(Role::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ServiceError::not_found(format!("Role with id {} not found", id)))
}

pub fn find_role_by_name(conn: &mut PgConnection, name: &str) -> ServiceResult<Role> {
    roles::table
        .filter(roles::name.eq(name))
        .select(Role::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ServiceError::not_found(format!("Role '{}' not found", name)))
}

fn role_permission_names(
    conn: &mut PgConnection,
    role_ids: &[i32],
) -> ServiceResult<HashMap<i32, Vec<String>>> {
    let rows: Vec<(i32, String)> = role_permissions::table
        .inner_join(permissions::table)
        .filter(role_permissions::role_id.eq_any(role_ids))
        .order((role_permissions::role_id.asc(), permissions::name.asc()))
        .select((role_permissions::role_id, permissions::name))
        .load(conn)?;

    let mut by_role: HashMap<i32, Vec<String>> = HashMap::new();
    for (role_id, name) in rows {
        by_role.entry(role_id).or_default().push(name);
    }
    Ok(by_role)
}

fn with_permissions(conn: &mut PgConnection, roles: Vec<Role>) -> ServiceResult<Vec<RoleView>> {
    let ids: Vec<i32> = roles.iter().map(|r| r.id).collect();
    let mut names = role_permission_names(conn, &ids)?;
    Ok(roles
        .into_iter()
        .map(|role| RoleView {
            permissions: names.remove(&role.id).unwrap_or_default(),
            role,
        })
        .collect())
}

fn replace_grants(
    conn: &mut PgConnection,
    role_id: i32,
    permission_ids: &[i32],
    granted_by: i32,
) -> ServiceResult<()> {
    let found: Vec<i32> = permissions::table
        .filter(permissions::id.eq_any(permission_ids))
        .select(permissions::id)
        .load(conn)?;
    let missing = unknown_ids(permission_ids, &found);
    if !missing.is_empty() {
        let ids: Vec<String> = missing.iter().map(ToString::to_string).collect();
        return Err(ServiceError::not_found(format!(
            "Permissions not found: {}",
            ids.join(", ")
        )));
    }

    diesel::delete(role_permissions::table.filter(role_permissions::role_id.eq(role_id)))
        .execute(conn)?;

    let grants: Vec<NewRolePermission> = found
        .into_iter()
        .map(|permission_id| NewRolePermission {
            role_id,
            permission_id,
            granted_by: Some(granted_by),
        })
        .collect();
    diesel::insert_into(role_permissions::table)
        .values(&grants)
        .execute(conn)?;

    Ok(())
}

fn role_view(conn: &mut PgConnection, role: Role) -> ServiceResult<RoleView> {
    let id = role.id;
    with_permissions(conn, vec![role])?
        .pop()
        .ok_or_else(|| ServiceError::not_found(format!("Role with id {} not found", id)))
}

/// Creates a role and its grants atomically.
#[instrument(skip(conn, description))]
pub fn create_role(
    conn: &mut PgConnection,
    name: &str,
    description: Option<String>,
    permission_ids: &[i32],
    created_by: i32,
) -> ServiceResult<RoleView> {
    conn.transaction(|conn| {
        let role = diesel::insert_into(roles::table)
            .values(&NewRole {
                name: name.to_string(),
                description,
                created_by: Some(created_by),
            })
            .returning(Role::as_returning())
            .get_result(conn)
            .map_err(unique_name_conflict("Role", name))?;

        if !permission_ids.is_empty() {
            replace_grants(conn, role.id, permission_ids, created_by)?;
        }

        OutboxService::emit(
            conn,
            EventType::RoleCreated,
            AggregateType::Role,
            role.id,
            &serde_json::json!({ "role_id": role.id, "name": role.name }),
            Some(created_by),
        )?;

        info!(role_id = role.id, "Role created");
        role_view(conn, role)
    })
}

pub fn list_roles(conn: &mut PgConnection) -> ServiceResult<Vec<RoleView>> {
    let roles: Vec<Role> = roles::table
        .order(roles::name.asc())
        .select(Role::as_select())
        .load(conn)?;
    with_permissions(conn, roles)
}

pub fn get_role(conn: &mut PgConnection, id: i32) -> ServiceResult<RoleView> {
    let role = find_role(conn, id)?;
    role_view(conn, role)
}

/// Partial update. A present `permission_ids` replaces the whole grant set.
#[instrument(skip(conn, changes, permission_ids))]
pub fn update_role(
    conn: &mut PgConnection,
    id: i32,
    changes: RoleChanges,
    permission_ids: Option<&[i32]>,
    updated_by: i32,
) -> ServiceResult<RoleView> {
    conn.transaction(|conn| {
        let mut role = find_role(conn, id)?;

        if !changes.is_empty() {
            let name = changes.name.clone().unwrap_or_else(|| role.name.clone());
            role = diesel::update(roles::table.find(id))
                .set((&changes, roles::updated_at.eq(diesel::dsl::now)))
                .returning(Role::as_returning())
                .get_result(conn)
                .map_err(unique_name_conflict("Role", &name))?;
        }

        if let Some(permission_ids) = permission_ids {
            replace_grants(conn, id, permission_ids, updated_by)?;
        }

        info!(role_id = id, "Role updated");
        role_view(conn, role)
    })
}

#[instrument(skip(conn))]
pub fn delete_role(conn: &mut PgConnection, id: i32, deleted_by: i32) -> ServiceResult<()> {
    conn.transaction(|conn| {
        let role = find_role(conn, id)?;
        if BUILT_IN_ROLES.contains(&role.name.as_str()) {
            return Err(ServiceError::conflict(format!(
                "Built-in role {} cannot be deleted",
                role.name
            )));
        }

        let holders: i64 = user_roles::table
            .filter(user_roles::role_id.eq(id))
            .count()
            .get_result(conn)?;
        if holders > 0 {
            warn!(role_id = id, holders, "Refusing to delete role in use");
            return Err(ServiceError::conflict(format!(
                "Role is assigned to {} user(s)",
                holders
            )));
        }

        diesel::delete(roles::table.find(id)).execute(conn)?;

        OutboxService::emit(
            conn,
            EventType::RoleDeleted,
            AggregateType::Role,
            id,
            &serde_json::json!({ "role_id": id, "name": role.name }),
            Some(deleted_by),
        )?;

        info!(role_id = id, "Role deleted");
        Ok(())
    })
}

// ---------------------------------------------------------------------------
// Permissions
// ---------------------------------------------------------------------------

pub fn find_permission(conn: &mut PgConnection, id: i32) -> ServiceResult<Permission> {
    permissions::table
        .find(id)
        .select(Permission::as_select())
        .first(conn)
        .optional()?
        .ok_or_else(|| ServiceError::not_found(format!("Permission with id {} not found", id)))
}

#[instrument(skip(conn, description))]
pub fn create_permission(
    conn: &mut PgConnection,
    name: &str,
    description: Option<String>,
) -> ServiceResult<Permission> {
    let permission = diesel::insert_into(permissions::table)
        .values(&NewPermission {
            name: name.to_string(),
            description,
        })
        .returning(Permission::as_returning())
        .get_result(conn)
        .map_err(unique_name_conflict("Permission", name))?;

    info!(permission_id = permission.id, "Permission created");
    Ok(permission)
}

pub fn list_permissions(conn: &mut PgConnection) -> ServiceResult<Vec<Permission>> {
    Ok(permissions::table
        .order(permissions::name.asc())
        .select(Permission::as_select())
        .load(conn)?)
}

#[instrument(skip(conn, description))]
pub fn update_permission(
    conn: &mut PgConnection,
    id: i32,
    description: Option<Option<String>>,
) -> ServiceResult<Permission> {
    let permission = find_permission(conn, id)?;
    let Some(description) = description else {
        return Ok(permission);
    };

    let permission = diesel::update(permissions::table.find(id))
        .set(permissions::description.eq(description))
        .returning(Permission::as_returning())
        .get_result(conn)?;

    info!(permission_id = id, "Permission updated");
    Ok(permission)
}

#[instrument(skip(conn))]
pub fn delete_permission(conn: &mut PgConnection, id: i32) -> ServiceResult<()> {
    conn.transaction(|conn| {
        find_permission(conn, id)?;

        let role_names: Vec<String> = role_permissions::table
            .inner_join(roles::table)
            .filter(role_permissions::permission_id.eq(id))
            .order(roles::name.asc())
            .select(roles::name)
            .load(conn)?;
        if !role_names.is_empty() {
            return Err(ServiceError::conflict(format!(
                "Permission is granted to roles: {}",
                role_names.join(", ")
            )));
        }

        diesel::delete(permissions::table.find(id)).execute(conn)?;
        info!(permission_id = id, "Permission deleted");
        Ok(())
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unknown_ids_sorted_and_deduplicated() {
        assert_eq!(unknown_ids(&[9, 3, 9, 1], &[1]), vec![3, 9]);
    }

    #[test]
    fn test_unknown_ids_empty_when_all_found() {
        assert!(unknown_ids(&[1, 2], &[2, 1, 5]).is_empty());
        assert!(unknown_ids(&[], &[]).is_empty());
    }

    #[test]
    fn test_unique_name_conflict_message() {
        let map = unique_name_conflict("Role", "auditor");
        let err = map(DieselError::DatabaseError(
            DatabaseErrorKind::UniqueViolation,
            Box::new("duplicate key".to_string()),
        ));
        assert!(matches!(err, ServiceError::Conflict(_)));
        assert_eq!(err.to_string(), "Role with name 'auditor' already exists");
    }

    #[test]
    fn test_non_unique_errors_pass_through() {
        let map = unique_name_conflict("Permission", "x");
        let err = map(DieselError::NotFound);
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn test_built_in_roles() {
        assert!(BUILT_IN_ROLES.contains(&"COMPANY_USER"));
        assert!(BUILT_IN_ROLES.contains(&"COMPANY_ADMIN"));
    }
}
