//! Authentication and route guards.

use axum::{
    extract::{rejection::RawPathParamsRejection, RawPathParams, Request, State},
    http::{header, HeaderMap},
    middleware::Next,
    response::Response,
};
use tracing::Span;

use crate::auth::session;
use crate::authz::{self, Guard};
use crate::error::{get_db_conn, ApiError, ApiResult};
use crate::telemetry::{record_auth_attempt, AuthOutcome};
use crate::AppState;

pub const ACCESS_TOKEN_COOKIE: &str = "access_token";

/// Bearer header first, then the `access_token` cookie.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    if let Some(value) = headers
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
    {
        if let Some(token) = value.strip_prefix("Bearer ") {
            let token = token.trim();
            if !token.is_empty() {
                return Some(token.to_string());
            }
        }
    }

    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|v| v.to_str().ok())
        .flat_map(|v| v.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(name, value)| *name == ACCESS_TOKEN_COOKIE && !value.is_empty())
        .map(|(_, value)| value.to_string())
}

/// Authenticates the caller, then evaluates the route's [`Guard`].
///
/// On success the [`session::SessionContext`] is available to handlers as an
/// extension.
pub async fn guard_middleware(
    State((state, guard)): State<(AppState, Guard)>,
    path_params: Result<RawPathParams, RawPathParamsRejection>,
    mut req: Request,
    next: Next,
) -> ApiResult<Response> {
    let token = extract_token(req.headers()).ok_or_else(|| {
        ApiError::unauthorized("Missing authorization token", "MISSING_AUTH_TOKEN")
    })?;

    let mut conn = get_db_conn(&state.db_pool)?;

    let session = session::validate_bearer(&mut conn, &state.jwt, &token).map_err(|e| {
        record_auth_attempt("validate", AuthOutcome::from_error(&e));
        e
    })?;
    Span::current().record("user_id", session.user_id);

    let scope_value = match (guard.company_scope_param, &path_params) {
        (Some(param), Ok(params)) => params
            .iter()
            .find(|(name, _)| *name == param)
            .map(|(_, value)| value.to_string()),
        _ => None,
    };

    authz::authorize(&mut conn, &session, &guard, scope_value.as_deref())?;
    drop(conn);

    req.extensions_mut().insert(session);
    Ok(next.run(req).await)
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_token_from_bearer_header() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer abc.def.ghi"),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("abc.def.ghi"));
    }

    #[test]
    fn test_extract_token_falls_back_to_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; access_token=tok123; other=1"),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("tok123"));
    }

    #[test]
    fn test_extract_token_prefers_header_over_cookie() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::AUTHORIZATION,
            HeaderValue::from_static("Bearer from-header"),
        );
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("access_token=from-cookie"),
        );
        assert_eq!(extract_token(&headers).as_deref(), Some("from-header"));
    }

    #[test]
    fn test_extract_token_rejects_other_schemes() {
        let mut headers = HeaderMap::new();
        headers.insert(header::AUTHORIZATION, HeaderValue::from_static("Basic dXNlcg=="));
        assert!(extract_token(&headers).is_none());

        let empty = HeaderMap::new();
        assert!(extract_token(&empty).is_none());
    }
}
