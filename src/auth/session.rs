//! Credential checks, token issuance and refresh-token rotation.
//!
//! The only writer of `users.refresh_token_hash` and `users.last_login`.

use chrono::Utc;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use tracing::{info, instrument, warn};
use utoipa::ToSchema;

use crate::error::{ServiceError, ServiceResult};
use crate::models::User;
use crate::schema::{roles, user_profiles, user_roles, users};

use super::jwt::{AccessClaims, JwtKeys};
use super::password::PasswordService;

/// Permission snapshots are not versioned yet; every token carries this value.
pub const ACL_VERSION: i32 = 1;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "UPPERCASE")]
pub enum Scope {
    Global,
    Company,
}

impl Scope {
    pub fn for_company(company_id: Option<i32>) -> Self {
        if company_id.is_some() {
            Scope::Company
        } else {
            Scope::Global
        }
    }
}

/// The authenticated caller, rebuilt from the store on every request.
#[derive(Debug, Clone, Serialize, ToSchema)]
pub struct SessionContext {
    pub user_id: i32,
    pub email: String,
    pub is_admin: bool,
    pub company_id: Option<i32>,
    pub scope: Scope,
    pub roles: Vec<String>,
    pub acl_version: i32,
}

#[derive(Debug, Clone)]
pub struct TokenPair {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug)]
pub struct LoginOutcome {
    pub tokens: TokenPair,
    pub user: User,
    pub session: SessionContext,
}

pub fn hash_refresh_token(token: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(token.as_bytes());
    hex::encode(hasher.finalize())
}

/// Current company link and role names for a user.
pub fn load_authz_snapshot(
    conn: &mut PgConnection,
    user_id: i32,
) -> ServiceResult<(Option<i32>, Vec<String>)> {
    let company_id: Option<i32> = user_profiles::table
        .filter(user_profiles::user_id.eq(user_id))
        .select(user_profiles::company_id)
        .first::<Option<i32>>(conn)
        .optional()?
        .flatten();

    let role_names: Vec<String> = user_roles::table
        .inner_join(roles::table)
        .filter(user_roles::user_id.eq(user_id))
        .select(roles::name)
        .order(roles::name.asc())
        .load(conn)?;

    Ok((company_id, role_names))
}

fn build_session(user: &User, company_id: Option<i32>, roles: Vec<String>) -> SessionContext {
    SessionContext {
        user_id: user.id,
        email: user.email.clone(),
        is_admin: user.is_admin,
        company_id,
        scope: Scope::for_company(company_id),
        roles,
        acl_version: ACL_VERSION,
    }
}

fn issue_tokens(keys: &JwtKeys, session: &SessionContext) -> ServiceResult<TokenPair> {
    let claims = AccessClaims {
        email: session.email.clone(),
        company_id: session.company_id,
        scope: session.scope,
        roles: session.roles.clone(),
        acl_version: session.acl_version,
    };

    let access_token = keys
        .generate_access_token(session.user_id, claims)
        .map_err(|e| ServiceError::Internal(format!("Token generation failed: {}", e)))?;
    let refresh_token = keys
        .generate_refresh_token(session.user_id)
        .map_err(|e| ServiceError::Internal(format!("Token generation failed: {}", e)))?;

    Ok(TokenPair {
        access_token,
        refresh_token,
    })
}

fn find_live_user(conn: &mut PgConnection, user_id: i32) -> ServiceResult<Option<User>> {
    Ok(users::table
        .find(user_id)
        .filter(users::is_deleted.eq(false))
        .select(User::as_select())
        .first(conn)
        .optional()?)
}

#[instrument(skip(conn, keys, password))]
pub fn login(
    conn: &mut PgConnection,
    keys: &JwtKeys,
    email: &str,
    password: &str,
) -> ServiceResult<LoginOutcome> {
    let user: Option<User> = users::table
        .filter(users::email.eq(email.trim().to_lowercase()))
        .filter(users::is_deleted.eq(false))
        .select(User::as_select())
        .first(conn)
        .optional()?;

    let Some(user) = user else {
        PasswordService::verify_unknown_account(password);
        warn!("Login attempt for unknown email");
        return Err(ServiceError::InvalidCredentials);
    };

    let valid = PasswordService::verify_password(password, &user.password_hash)
        .map_err(|e| ServiceError::Internal(format!("Password verification error: {}", e)))?;
    if !valid {
        warn!(user_id = user.id, "Failed login attempt");
        return Err(ServiceError::InvalidCredentials);
    }

    if !user.is_active() {
        warn!(user_id = user.id, status = %user.status, "Login attempt for inactive account");
        return Err(ServiceError::AccountNotActive);
    }

    let outcome = open_session(conn, keys, &user)?;
    info!(user_id = user.id, scope = ?outcome.session.scope, "User logged in");
    Ok(outcome)
}

/// Issues a fresh token pair for an already authenticated user and stores the
/// refresh-token hash. Used by login and by invitation registration.
pub fn open_session(
    conn: &mut PgConnection,
    keys: &JwtKeys,
    user: &User,
) -> ServiceResult<LoginOutcome> {
    let (company_id, role_names) = load_authz_snapshot(conn, user.id)?;
    let session = build_session(user, company_id, role_names);
    let tokens = issue_tokens(keys, &session)?;

    let user: User = diesel::update(users::table.find(user.id))
        .set((
            users::refresh_token_hash.eq(Some(hash_refresh_token(&tokens.refresh_token))),
            users::last_login.eq(Some(Utc::now().naive_utc())),
        ))
        .returning(User::as_returning())
        .get_result(conn)?;

    Ok(LoginOutcome {
        tokens,
        user,
        session,
    })
}

#[instrument(skip(conn, keys, refresh_token))]
pub fn refresh(
    conn: &mut PgConnection,
    keys: &JwtKeys,
    refresh_token: &str,
) -> ServiceResult<TokenPair> {
    let claims = keys
        .verify_refresh_token(refresh_token)
        .map_err(|_| ServiceError::InvalidRefreshToken)?;

    let user = find_live_user(conn, claims.sub)?.ok_or(ServiceError::InvalidRefreshToken)?;

    let presented_hash = hash_refresh_token(refresh_token);
    if user.refresh_token_hash.as_deref() != Some(presented_hash.as_str()) {
        warn!(user_id = user.id, "Refresh token does not match the stored hash");
        return Err(ServiceError::InvalidRefreshToken);
    }

    if !user.is_active() {
        return Err(ServiceError::AccountNotActive);
    }

    let (company_id, role_names) = load_authz_snapshot(conn, user.id)?;
    let session = build_session(&user, company_id, role_names);
    let tokens = issue_tokens(keys, &session)?;

    // Compare-and-swap on the stored hash: of two concurrent refreshes with the
    // same token only one matches.
    let rotated = diesel::update(
        users::table
            .find(user.id)
            .filter(users::refresh_token_hash.eq(&presented_hash)),
    )
    .set(users::refresh_token_hash.eq(Some(hash_refresh_token(&tokens.refresh_token))))
    .execute(conn)?;

    if rotated == 0 {
        warn!(user_id = user.id, "Refresh token was rotated concurrently");
        return Err(ServiceError::InvalidRefreshToken);
    }

    info!(user_id = user.id, "Tokens refreshed");
    Ok(tokens)
}

#[instrument(skip(conn))]
pub fn logout(conn: &mut PgConnection, user_id: i32) -> ServiceResult<()> {
    revoke_refresh_token(conn, user_id)?;
    info!(user_id, "User logged out");
    Ok(())
}

/// Makes any outstanding refresh token unusable. Deactivation and soft delete
/// go through here as well.
pub fn revoke_refresh_token(conn: &mut PgConnection, user_id: i32) -> ServiceResult<()> {
    diesel::update(users::table.find(user_id))
        .set(users::refresh_token_hash.eq(None::<String>))
        .execute(conn)?;
    Ok(())
}

/// Verifies an access token and re-reads the account behind it.
pub fn validate_bearer(
    conn: &mut PgConnection,
    keys: &JwtKeys,
    token: &str,
) -> ServiceResult<SessionContext> {
    let claims = keys
        .verify_access_token(token)
        .map_err(|_| ServiceError::InvalidToken)?;

    let user = find_live_user(conn, claims.sub)?.ok_or(ServiceError::UserNotFound)?;
    if !user.is_active() {
        return Err(ServiceError::AccountNotActive);
    }

    let (company_id, role_names) = load_authz_snapshot(conn, user.id)?;
    Ok(build_session(&user, company_id, role_names))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_refresh_token_is_stable_hex() {
        let a = hash_refresh_token("token-value");
        let b = hash_refresh_token("token-value");
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
        assert!(a.chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(a, hash_refresh_token("token-value2"));
    }

    #[test]
    fn test_scope_from_company() {
        assert_eq!(Scope::for_company(Some(3)), Scope::Company);
        assert_eq!(Scope::for_company(None), Scope::Global);
    }

    #[test]
    fn test_scope_serializes_uppercase() {
        assert_eq!(serde_json::to_value(Scope::Global).unwrap(), "GLOBAL");
        assert_eq!(serde_json::to_value(Scope::Company).unwrap(), "COMPANY");
    }

    #[test]
    fn test_issued_tokens_carry_session_snapshot() {
        let keys = JwtKeys::generate();
        let session = SessionContext {
            user_id: 11,
            email: "lead@example.com".to_string(),
            is_admin: false,
            company_id: Some(4),
            scope: Scope::Company,
            roles: vec!["COMPANY_ADMIN".to_string()],
            acl_version: ACL_VERSION,
        };

        let pair = issue_tokens(&keys, &session).unwrap();
        let claims = keys.verify_access_token(&pair.access_token).unwrap();
        assert_eq!(claims.sub, 11);
        assert_eq!(claims.company_id, Some(4));
        assert_eq!(claims.scope, Scope::Company);
        assert_eq!(claims.roles, vec!["COMPANY_ADMIN".to_string()]);

        let refresh = keys.verify_refresh_token(&pair.refresh_token).unwrap();
        assert_eq!(refresh.sub, 11);
    }
}
