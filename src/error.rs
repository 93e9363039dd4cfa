//! Shared error handling utilities.

use axum::{http::StatusCode, Json};
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::DbPool;

#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    #[schema(example = "Kanban board with id 4 not found")]
    pub error: String,
    #[schema(example = "NOT_FOUND")]
    pub code: String,
}

impl ApiError {
    pub fn new(error: impl Into<String>, code: impl Into<String>) -> Self {
        Self {
            error: error.into(),
            code: code.into(),
        }
    }

    pub fn bad_request(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::BAD_REQUEST, Json(Self::new(error, code)))
    }

    pub fn unauthorized(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::UNAUTHORIZED, Json(Self::new(error, code)))
    }

    pub fn forbidden(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::FORBIDDEN, Json(Self::new(error, code)))
    }

    pub fn not_found(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::NOT_FOUND, Json(Self::new(error, code)))
    }

    pub fn internal(error: impl Into<String>, code: impl Into<String>) -> (StatusCode, Json<Self>) {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(Self::new(error, code)),
        )
    }

    pub fn db_error() -> (StatusCode, Json<Self>) {
        Self::internal("Database error", "DB_ERROR")
    }

    pub fn validation(errors: validator::ValidationErrors) -> (StatusCode, Json<Self>) {
        Self::bad_request(format!("Validation error: {}", errors), "VALIDATION_ERROR")
    }
}

pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

/// Domain failures raised by the service layer.
#[derive(Debug, thiserror::Error)]
pub enum ServiceError {
    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("Missing required permissions: {}", .0.join(", "))]
    MissingPermissions(Vec<String>),

    #[error("{0}")]
    BadRequest(String),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid credentials")]
    InvalidCredentials,

    #[error("User account is not active")]
    AccountNotActive,

    #[error("Invalid or expired refresh token")]
    InvalidRefreshToken,

    #[error("Invalid or expired token")]
    InvalidToken,

    #[error("User not found")]
    UserNotFound,

    #[error("Database error: {0}")]
    Database(DieselError),

    #[error("{0}")]
    Internal(String),
}

pub type ServiceResult<T> = Result<T, ServiceError>;

impl ServiceError {
    pub fn not_found(message: impl Into<String>) -> Self {
        Self::NotFound(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        Self::Conflict(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        Self::Forbidden(message.into())
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        Self::BadRequest(message.into())
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ServiceError::NotFound(_) => StatusCode::NOT_FOUND,
            ServiceError::Conflict(_) => StatusCode::CONFLICT,
            ServiceError::Forbidden(_) | ServiceError::MissingPermissions(_) => {
                StatusCode::FORBIDDEN
            }
            ServiceError::BadRequest(_) | ServiceError::Validation(_) => StatusCode::BAD_REQUEST,
            ServiceError::InvalidCredentials
            | ServiceError::AccountNotActive
            | ServiceError::InvalidRefreshToken
            | ServiceError::InvalidToken
            | ServiceError::UserNotFound => StatusCode::UNAUTHORIZED,
            ServiceError::Database(_) | ServiceError::Internal(_) => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    pub fn code(&self) -> &'static str {
        match self {
            ServiceError::NotFound(_) => "NOT_FOUND",
            ServiceError::Conflict(_) => "CONFLICT",
            ServiceError::Forbidden(_) => "FORBIDDEN",
            ServiceError::MissingPermissions(_) => "MISSING_PERMISSIONS",
            ServiceError::BadRequest(_) => "BAD_REQUEST",
            ServiceError::Validation(_) => "VALIDATION_ERROR",
            ServiceError::InvalidCredentials => "INVALID_CREDENTIALS",
            ServiceError::AccountNotActive => "ACCOUNT_NOT_ACTIVE",
            ServiceError::InvalidRefreshToken => "INVALID_REFRESH_TOKEN",
            ServiceError::InvalidToken => "INVALID_TOKEN",
            ServiceError::UserNotFound => "USER_NOT_FOUND",
            ServiceError::Database(_) => "DB_ERROR",
            ServiceError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<DieselError> for ServiceError {
    fn from(err: DieselError) -> Self {
        match err {
            DieselError::NotFound => ServiceError::NotFound("Record not found".to_string()),
            DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, info) => {
                ServiceError::Conflict(format!("Duplicate value: {}", info.message()))
            }
            DieselError::DatabaseError(DatabaseErrorKind::ForeignKeyViolation, info) => {
                ServiceError::NotFound(format!("Referenced record not found: {}", info.message()))
            }
            other => ServiceError::Database(other),
        }
    }
}

impl From<ServiceError> for (StatusCode, Json<ApiError>) {
    fn from(err: ServiceError) -> Self {
        let status = err.status();
        if status.is_server_error() {
            error!(error = %err, "Request failed");
            // Storage details never leave the process.
            let message = match &err {
                ServiceError::Database(_) => "Database error".to_string(),
                other => other.to_string(),
            };
            return (status, Json(ApiError::new(message, err.code())));
        }
        (status, Json(ApiError::new(err.to_string(), err.code())))
    }
}

pub type PooledConn =
    diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<diesel::PgConnection>>;

pub fn get_db_conn(pool: &DbPool) -> Result<PooledConn, (StatusCode, Json<ApiError>)> {
    pool.get().map_err(|e| {
        error!(error = %e, "Database connection error");
        ApiError::internal("Database connection error", "DB_CONNECTION_ERROR")
    })
}

/// Parses a numeric path segment, rejecting anything that is not a well-formed id.
pub fn parse_id(raw: &str, name: &str) -> ApiResult<i32> {
    raw.trim()
        .parse::<i32>()
        .ok()
        .filter(|id| *id > 0)
        .ok_or_else(|| ApiError::bad_request(format!("Invalid {}", name), "INVALID_ID"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_permissions_message_lists_names() {
        let err = ServiceError::MissingPermissions(vec![
            "company-projects:create".to_string(),
            "company-users:list".to_string(),
        ]);
        assert_eq!(
            err.to_string(),
            "Missing required permissions: company-projects:create, company-users:list"
        );
        assert_eq!(err.status(), StatusCode::FORBIDDEN);
    }

    #[test]
    fn test_status_mapping() {
        assert_eq!(
            ServiceError::not_found("x").status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(ServiceError::conflict("x").status(), StatusCode::CONFLICT);
        assert_eq!(
            ServiceError::bad_request("x").status(),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            ServiceError::InvalidCredentials.status(),
            StatusCode::UNAUTHORIZED
        );
        assert_eq!(
            ServiceError::Internal("boom".into()).status(),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }

    #[test]
    fn test_diesel_not_found_maps_to_not_found() {
        let err: ServiceError = DieselError::NotFound.into();
        assert!(matches!(err, ServiceError::NotFound(_)));
    }

    #[test]
    fn test_diesel_other_errors_map_to_database() {
        let err: ServiceError = DieselError::RollbackTransaction.into();
        assert!(matches!(err, ServiceError::Database(_)));
        assert_eq!(err.code(), "DB_ERROR");
    }

    #[test]
    fn test_api_error_conversion_hides_database_details() {
        let err = ServiceError::Database(DieselError::BrokenTransactionManager);
        let (status, Json(body)) = err.into();
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body.error, "Database error");
        assert_eq!(body.code, "DB_ERROR");
    }

    #[test]
    fn test_parse_id() {
        assert_eq!(parse_id("42", "board id").unwrap(), 42);
        assert!(parse_id("abc", "board id").is_err());
        assert!(parse_id("0", "board id").is_err());
        assert!(parse_id("-3", "board id").is_err());
        assert!(parse_id("1.5", "board id").is_err());
    }
}
