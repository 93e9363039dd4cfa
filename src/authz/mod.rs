//! Authorization: permission sets resolved from role grants, company scoping,
//! and the per-route guard description.
//!
//! Every check reads the store at request time. Token claims are never used
//! as the source of granted permissions.

pub mod catalog;

use diesel::prelude::*;
use std::collections::BTreeSet;
use std::time::Instant;
use tracing::{debug, warn};

use crate::auth::SessionContext;
use crate::error::{ServiceError, ServiceResult};
use crate::schema::{permissions, role_permissions, user_roles};
use crate::telemetry::record_authorization_check;

/// Declarative access requirements attached to a route at registration time.
#[derive(Debug, Clone, Copy, Default)]
pub struct Guard {
    pub required_permissions: &'static [&'static str],
    /// Name of the path parameter holding the target company id.
    pub company_scope_param: Option<&'static str>,
}

impl Guard {
    pub const fn authenticated() -> Self {
        Self {
            required_permissions: &[],
            company_scope_param: None,
        }
    }

    pub const fn permissions(required: &'static [&'static str]) -> Self {
        Self {
            required_permissions: required,
            company_scope_param: None,
        }
    }

    pub const fn company(required: &'static [&'static str], param: &'static str) -> Self {
        Self {
            required_permissions: required,
            company_scope_param: Some(param),
        }
    }
}

/// Required names absent from `granted`, in declaration order.
pub fn missing_permissions(required: &[&str], granted: &BTreeSet<String>) -> Vec<String> {
    required
        .iter()
        .filter(|name| !granted.contains(**name))
        .map(|name| name.to_string())
        .collect()
}

/// Flattened permission names granted through every role the user holds.
pub fn load_effective_permissions(
    conn: &mut PgConnection,
    user_id: i32,
) -> ServiceResult<BTreeSet<String>> {
    let names: Vec<String> = user_roles::table
        .inner_join(
            role_permissions::table.on(role_permissions::role_id.eq(user_roles::role_id)),
        )
        .inner_join(permissions::table.on(permissions::id.eq(role_permissions::permission_id)))
        .filter(user_roles::user_id.eq(user_id))
        .select(permissions::name)
        .distinct()
        .load(conn)?;

    Ok(names.into_iter().collect())
}

/// Permission names visible to the session: the whole catalog for admins.
pub fn permissions_for_session(
    conn: &mut PgConnection,
    session: &SessionContext,
) -> ServiceResult<BTreeSet<String>> {
    if session.is_admin {
        let all: Vec<String> = permissions::table.select(permissions::name).load(conn)?;
        return Ok(all.into_iter().collect());
    }
    load_effective_permissions(conn, session.user_id)
}

pub fn check_permissions(
    conn: &mut PgConnection,
    session: &SessionContext,
    required: &[&str],
) -> ServiceResult<()> {
    if required.is_empty() {
        return Ok(());
    }
    if session.is_admin {
        debug!(user_id = session.user_id, "Admin bypassing permission check");
        return Ok(());
    }

    let start = Instant::now();
    let granted = load_effective_permissions(conn, session.user_id)?;
    let missing = missing_permissions(required, &granted);
    record_authorization_check("permissions", missing.is_empty(), start.elapsed());

    if missing.is_empty() {
        Ok(())
    } else {
        warn!(
            user_id = session.user_id,
            missing = %missing.join(", "),
            "Missing permissions"
        );
        Err(ServiceError::MissingPermissions(missing))
    }
}

/// Compares the session's company with the raw target id taken from the request.
pub fn check_company_scope(session: &SessionContext, raw_target: Option<&str>) -> ServiceResult<()> {
    if session.is_admin {
        return Ok(());
    }

    let target = raw_target
        .and_then(|raw| raw.trim().parse::<i32>().ok())
        .ok_or_else(|| ServiceError::forbidden("Invalid company ID"))?;

    let Some(own_company) = session.company_id else {
        warn!(
            user_id = session.user_id,
            target, "User without a company tried a company-scoped route"
        );
        return Err(ServiceError::forbidden(
            "You must be associated with a company to access this resource",
        ));
    };

    if own_company != target {
        warn!(
            user_id = session.user_id,
            own_company, target, "Cross-company access denied"
        );
        return Err(ServiceError::forbidden(
            "You can only access resources from your own company",
        ));
    }

    Ok(())
}

/// Runs both checks in order: permissions first, then company scope.
pub fn authorize(
    conn: &mut PgConnection,
    session: &SessionContext,
    guard: &Guard,
    scope_value: Option<&str>,
) -> ServiceResult<()> {
    check_permissions(conn, session, guard.required_permissions)?;

    if guard.company_scope_param.is_some() {
        let start = Instant::now();
        let result = check_company_scope(session, scope_value);
        record_authorization_check("company_scope", result.is_ok(), start.elapsed());
        result?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::Scope;

    fn session(is_admin: bool, company_id: Option<i32>) -> SessionContext {
        SessionContext {
            user_id: 42,
            email: "member@example.com".to_string(),
            is_admin,
            company_id,
            scope: Scope::for_company(company_id),
            roles: vec![],
            acl_version: 1,
        }
    }

    fn granted(names: &[&str]) -> BTreeSet<String> {
        names.iter().map(|n| n.to_string()).collect()
    }

    #[test]
    fn test_missing_permissions_lists_only_absent_names() {
        let held = granted(&["company-projects:list"]);
        let missing = missing_permissions(
            &["company-projects:list", "company-projects:create"],
            &held,
        );
        assert_eq!(missing, vec!["company-projects:create".to_string()]);
    }

    #[test]
    fn test_missing_permissions_empty_when_all_held() {
        let held = granted(&["projects:read", "projects:update"]);
        assert!(missing_permissions(&["projects:read"], &held).is_empty());
        assert!(missing_permissions(&[], &held).is_empty());
    }

    #[test]
    fn test_missing_permissions_preserves_declaration_order() {
        let missing = missing_permissions(&["b:x", "a:x", "c:x"], &granted(&["a:x"]));
        assert_eq!(missing, vec!["b:x".to_string(), "c:x".to_string()]);
    }

    #[test]
    fn test_company_scope_admin_bypass() {
        assert!(check_company_scope(&session(true, None), Some("99")).is_ok());
        assert!(check_company_scope(&session(true, None), Some("garbage")).is_ok());
    }

    #[test]
    fn test_company_scope_same_company_allowed() {
        assert!(check_company_scope(&session(false, Some(5)), Some("5")).is_ok());
    }

    #[test]
    fn test_company_scope_other_company_denied() {
        let err = check_company_scope(&session(false, Some(5)), Some("6")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "You can only access resources from your own company"
        );
    }

    #[test]
    fn test_company_scope_requires_company() {
        let err = check_company_scope(&session(false, None), Some("6")).unwrap_err();
        assert_eq!(
            err.to_string(),
            "You must be associated with a company to access this resource"
        );
    }

    #[test]
    fn test_company_scope_malformed_id_is_forbidden() {
        for raw in [Some("abc"), Some(""), None] {
            let err = check_company_scope(&session(false, Some(5)), raw).unwrap_err();
            assert!(matches!(err, ServiceError::Forbidden(_)));
            assert_eq!(err.to_string(), "Invalid company ID");
        }
    }

    #[test]
    fn test_guard_constructors() {
        let guard = Guard::company(&[catalog::COMPANY_USERS_LIST], "id");
        assert_eq!(guard.required_permissions, &["company-users:list"]);
        assert_eq!(guard.company_scope_param, Some("id"));

        assert!(Guard::authenticated().required_permissions.is_empty());
        assert!(Guard::permissions(&[catalog::ROLES_MANAGE])
            .company_scope_param
            .is_none());
    }
}
