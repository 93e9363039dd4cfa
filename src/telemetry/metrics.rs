//! Prometheus metrics.

use axum::{extract::State, http::StatusCode, response::IntoResponse};
use metrics::{counter, histogram};
use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use std::sync::OnceLock;
use std::time::Duration;

static PROMETHEUS_HANDLE: OnceLock<Option<PrometheusHandle>> = OnceLock::new();

#[derive(Clone)]
pub struct MetricsState {
    handle: Option<PrometheusHandle>,
}

impl MetricsState {
    /// Installs the global recorder on first use; later calls share it.
    pub fn new(enabled: bool) -> Self {
        if !enabled {
            return Self::disabled();
        }

        let handle = PROMETHEUS_HANDLE.get_or_init(|| {
            match PrometheusBuilder::new().install_recorder() {
                Ok(handle) => Some(handle),
                Err(e) => {
                    tracing::error!(error = %e, "Failed to install Prometheus recorder");
                    None
                }
            }
        });

        Self {
            handle: handle.clone(),
        }
    }

    pub fn disabled() -> Self {
        Self { handle: None }
    }

    pub fn render(&self) -> Option<String> {
        self.handle.as_ref().map(|h| h.render())
    }

    pub fn is_enabled(&self) -> bool {
        self.handle.is_some()
    }
}

pub async fn metrics_handler(State(state): State<MetricsState>) -> impl IntoResponse {
    match state.render() {
        Some(metrics) => (StatusCode::OK, metrics),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            "Metrics not enabled".to_string(),
        ),
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthOutcome {
    Success,
    InvalidCredentials,
    AccountInactive,
    InvalidToken,
    InvalidRefreshToken,
    Error,
}

impl AuthOutcome {
    pub fn as_str(&self) -> &'static str {
        match self {
            AuthOutcome::Success => "success",
            AuthOutcome::InvalidCredentials => "invalid_credentials",
            AuthOutcome::AccountInactive => "account_inactive",
            AuthOutcome::InvalidToken => "invalid_token",
            AuthOutcome::InvalidRefreshToken => "invalid_refresh_token",
            AuthOutcome::Error => "error",
        }
    }

    pub fn from_error(err: &crate::error::ServiceError) -> Self {
        use crate::error::ServiceError;

        match err {
            ServiceError::InvalidCredentials => AuthOutcome::InvalidCredentials,
            ServiceError::AccountNotActive => AuthOutcome::AccountInactive,
            ServiceError::InvalidToken | ServiceError::UserNotFound => AuthOutcome::InvalidToken,
            ServiceError::InvalidRefreshToken => AuthOutcome::InvalidRefreshToken,
            _ => AuthOutcome::Error,
        }
    }
}

pub fn record_auth_attempt(action: &str, outcome: AuthOutcome) {
    counter!(
        "auth_attempts_total",
        "action" => action.to_string(),
        "outcome" => outcome.as_str()
    )
    .increment(1);
}

/// `check` is either `permissions` or `company_scope`.
pub fn record_authorization_check(check: &'static str, granted: bool, duration: Duration) {
    counter!(
        "authorization_checks_total",
        "check" => check,
        "granted" => granted.to_string()
    )
    .increment(1);

    histogram!("authorization_check_duration_seconds", "check" => check)
        .record(duration.as_secs_f64());
}

pub fn record_request_latency(method: &str, path: &str, status: u16, duration: Duration) {
    histogram!(
        "http_request_duration_seconds",
        "method" => method.to_string(),
        "path" => path.to_string(),
        "status" => status.to_string()
    )
    .record(duration.as_secs_f64());
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ServiceError;

    #[test]
    fn test_auth_outcome_as_str() {
        assert_eq!(AuthOutcome::Success.as_str(), "success");
        assert_eq!(
            AuthOutcome::InvalidCredentials.as_str(),
            "invalid_credentials"
        );
        assert_eq!(AuthOutcome::AccountInactive.as_str(), "account_inactive");
    }

    #[test]
    fn test_auth_outcome_from_error() {
        assert_eq!(
            AuthOutcome::from_error(&ServiceError::InvalidCredentials),
            AuthOutcome::InvalidCredentials
        );
        assert_eq!(
            AuthOutcome::from_error(&ServiceError::AccountNotActive),
            AuthOutcome::AccountInactive
        );
        assert_eq!(
            AuthOutcome::from_error(&ServiceError::Internal("x".into())),
            AuthOutcome::Error
        );
    }

    #[test]
    fn test_metrics_state_disabled() {
        let state = MetricsState::disabled();
        assert!(!state.is_enabled());
        assert!(state.render().is_none());
    }
}
