//! Authentication handlers.

use axum::{
    extract::State,
    http::{header, HeaderMap, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use validator::Validate;

use crate::{
    auth::{
        password::PasswordService,
        session::{self, LoginOutcome, SessionContext},
        Scope,
    },
    authz,
    error::{get_db_conn, ApiError, ApiResult, ServiceError},
    handlers::validate_body,
    middleware::auth::ACCESS_TOKEN_COOKIE,
    models::User,
    services::directory,
    telemetry::{record_auth_attempt, AuthOutcome},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "user@example.com")]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    #[schema(example = "securepassword123")]
    pub password: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RefreshRequest {
    #[validate(length(min = 1, message = "Refresh token is required"))]
    #[schema(example = "eyJhbGciOiJFZERTQSIsInR5cCI6IkpXVCJ9...")]
    pub refresh_token: String,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 1, message = "Invitation code is required"))]
    #[schema(example = "INV-12-M3X9QK-4FJ2A8")]
    pub code: String,
    #[schema(example = "Str0ng!Passw0rd")]
    pub password: String,
    #[validate(length(min = 1, max = 255, message = "Full name is required"))]
    #[schema(example = "Jane Doe")]
    pub full_name: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserSummary {
    pub id: i32,
    #[schema(example = "user@example.com")]
    pub email: String,
    #[schema(example = "Jane Doe")]
    pub full_name: String,
    pub is_admin: bool,
    #[schema(example = "ACTIVE")]
    pub status: String,
    pub company_id: Option<i32>,
    pub scope: Scope,
    pub roles: Vec<String>,
}

impl UserSummary {
    fn new(user: User, session: &SessionContext) -> Self {
        Self {
            id: user.id,
            email: user.email,
            full_name: user.full_name,
            is_admin: user.is_admin,
            status: user.status,
            company_id: session.company_id,
            scope: session.scope,
            roles: session.roles.clone(),
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserSummary,
    #[schema(example = "eyJhbGciOiJFZERTQSIsInR5cCI6IkpXVCJ9...")]
    pub access_token: String,
    #[schema(example = "eyJhbGciOiJFZERTQSIsInR5cCI6IkpXVCJ9...")]
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct RefreshResponse {
    pub access_token: String,
    pub refresh_token: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MeResponse {
    pub user: User,
    pub session: SessionContext,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct PermissionsResponse {
    #[schema(example = json!(["company-projects:list", "company-users:read"]))]
    pub permissions: Vec<String>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MessageResponse {
    #[schema(example = "Logged out")]
    pub message: String,
}

fn access_cookie(token: &str, max_age_secs: i64, secure: bool) -> String {
    format!(
        "{}={}; HttpOnly; Path=/; SameSite=Lax; Max-Age={}{}",
        ACCESS_TOKEN_COOKIE,
        token,
        max_age_secs,
        if secure { "; Secure" } else { "" }
    )
}

fn with_access_cookie<T: Serialize>(state: &AppState, token: &str, body: T) -> Response {
    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&access_cookie(
        token,
        state.jwt.access_token_expiry,
        state.secure_cookies,
    )) {
        headers.insert(header::SET_COOKIE, value);
    }
    (StatusCode::OK, headers, Json(body)).into_response()
}

fn auth_response(outcome: LoginOutcome) -> AuthResponse {
    AuthResponse {
        user: UserSummary::new(outcome.user, &outcome.session),
        access_token: outcome.tokens.access_token,
        refresh_token: outcome.tokens.refresh_token,
    }
}

#[utoipa::path(
    post,
    path = "/auth/login",
    tag = "Authentication",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful; also sets the access_token cookie", body = AuthResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Invalid credentials or inactive account", body = ApiError),
        (status = 429, description = "Too many requests", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Response> {
    validate_body(&payload)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let outcome = session::login(&mut conn, &state.jwt, &payload.email, &payload.password)
        .map_err(|e| {
            record_auth_attempt("login", AuthOutcome::from_error(&e));
            e
        })?;

    record_auth_attempt("login", AuthOutcome::Success);
    let access_token = outcome.tokens.access_token.clone();
    Ok(with_access_cookie(&state, &access_token, auth_response(outcome)))
}

#[utoipa::path(
    post,
    path = "/auth/refresh",
    tag = "Authentication",
    request_body = RefreshRequest,
    responses(
        (status = 200, description = "Tokens rotated", body = RefreshResponse),
        (status = 401, description = "Invalid or expired refresh token", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn refresh_token(
    State(state): State<AppState>,
    Json(payload): Json<RefreshRequest>,
) -> ApiResult<Json<RefreshResponse>> {
    validate_body(&payload)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let tokens = session::refresh(&mut conn, &state.jwt, &payload.refresh_token).map_err(|e| {
        record_auth_attempt("refresh", AuthOutcome::from_error(&e));
        e
    })?;

    record_auth_attempt("refresh", AuthOutcome::Success);
    Ok(Json(RefreshResponse {
        access_token: tokens.access_token,
        refresh_token: tokens.refresh_token,
    }))
}

#[utoipa::path(
    post,
    path = "/auth/logout",
    tag = "Authentication",
    responses(
        (status = 200, description = "Refresh token revoked", body = MessageResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn logout(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
) -> ApiResult<Response> {
    let mut conn = get_db_conn(&state.db_pool)?;
    session::logout(&mut conn, session.user_id)?;

    let mut headers = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&access_cookie("", 0, state.secure_cookies)) {
        headers.insert(header::SET_COOKIE, value);
    }
    Ok((
        StatusCode::OK,
        headers,
        Json(MessageResponse {
            message: "Logged out".to_string(),
        }),
    )
        .into_response())
}

#[utoipa::path(
    get,
    path = "/auth/me",
    tag = "Authentication",
    responses(
        (status = 200, description = "Current user and session", body = MeResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn me(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
) -> ApiResult<Json<MeResponse>> {
    use crate::schema::users;
    use diesel::prelude::*;

    let mut conn = get_db_conn(&state.db_pool)?;
    let user: User = users::table
        .find(session.user_id)
        .select(User::as_select())
        .first(&mut conn)
        .map_err(ServiceError::from)?;

    Ok(Json(MeResponse { user, session }))
}

#[utoipa::path(
    get,
    path = "/auth/permissions",
    tag = "Authentication",
    responses(
        (status = 200, description = "Effective permission names", body = PermissionsResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn permissions(
    State(state): State<AppState>,
    Extension(session): Extension<SessionContext>,
) -> ApiResult<Json<PermissionsResponse>> {
    let mut conn = get_db_conn(&state.db_pool)?;
    let permissions = authz::permissions_for_session(&mut conn, &session)?;
    Ok(Json(PermissionsResponse {
        permissions: permissions.into_iter().collect(),
    }))
}

#[utoipa::path(
    post,
    path = "/auth/register",
    tag = "Authentication",
    request_body = RegisterRequest,
    responses(
        (status = 200, description = "Account created from invitation", body = AuthResponse),
        (status = 400, description = "Weak password, or invitation expired or used", body = ApiError),
        (status = 404, description = "Invitation not found", body = ApiError),
        (status = 409, description = "Email already registered", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn register(
    State(state): State<AppState>,
    Json(payload): Json<RegisterRequest>,
) -> ApiResult<Response> {
    validate_body(&payload)?;
    state
        .password_policy
        .validate(&payload.password)
        .map_err(ServiceError::from)?;

    let password_hash = PasswordService::hash(&payload.password, state.password_hash_cost)?;
    let mut conn = get_db_conn(&state.db_pool)?;

    let user = directory::register_with_invitation(
        &mut conn,
        &payload.code,
        password_hash,
        &payload.full_name,
    )?;
    let outcome = session::open_session(&mut conn, &state.jwt, &user)?;

    record_auth_attempt("register", AuthOutcome::Success);
    info!(user_id = user.id, "User registered");

    let access_token = outcome.tokens.access_token.clone();
    Ok(with_access_cookie(&state, &access_token, auth_response(outcome)))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_access_cookie_attributes() {
        let cookie = access_cookie("abc", 900, false);
        assert_eq!(
            cookie,
            "access_token=abc; HttpOnly; Path=/; SameSite=Lax; Max-Age=900"
        );
        assert!(access_cookie("abc", 900, true).ends_with("; Secure"));
    }

    #[test]
    fn test_login_request_validation() {
        let request = LoginRequest {
            email: "not-an-email".to_string(),
            password: "x".to_string(),
        };
        assert!(request.validate().is_err());

        let request = LoginRequest {
            email: "user@example.com".to_string(),
            password: String::new(),
        };
        assert!(request.validate().is_err());
    }

    #[test]
    fn test_register_request_requires_code_and_name() {
        let request = RegisterRequest {
            code: String::new(),
            password: "Str0ng!Passw0rd".to_string(),
            full_name: "Jane".to_string(),
        };
        assert!(request.validate().is_err());
    }
}
