//! Liveness and readiness probes.

use axum::{extract::State, http::StatusCode, Json};
use diesel::prelude::*;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{schema::outbox_events, AppState};

pub const SERVICE_NAME: &str = "boardroom";

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    #[schema(example = "boardroom")]
    pub service: String,
    #[schema(example = "0.1.0")]
    pub version: String,
    #[schema(example = "2026-01-15T10:30:00Z")]
    pub timestamp: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessResponse {
    #[schema(example = "ready")]
    pub status: String,
    pub checks: ReadinessChecks,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ReadinessChecks {
    pub database: ComponentStatus,
    /// Present only when event streaming is configured.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redis: Option<ComponentStatus>,
    /// Domain events still waiting to be published.
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = 0)]
    pub outbox_backlog: Option<i64>,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ComponentStatus {
    #[schema(example = "up")]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = 5)]
    pub latency_ms: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "Connection refused")]
    pub error: Option<String>,
}

impl ComponentStatus {
    pub fn up(latency_ms: u64) -> Self {
        Self {
            status: "up".to_string(),
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    pub fn down(error: impl Into<String>) -> Self {
        Self {
            status: "down".to_string(),
            latency_ms: None,
            error: Some(error.into()),
        }
    }

    fn is_up(&self) -> bool {
        self.status == "up"
    }
}

#[utoipa::path(
    get,
    path = "/health/status",
    tag = "Health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: SERVICE_NAME.to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses(
        (status = 200, description = "Simple health check", content_type = "text/plain")
    )
)]
pub async fn health_check_simple() -> &'static str {
    "OK"
}

#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses(
        (status = 200, description = "Service is alive")
    )
)]
pub async fn live_check() -> StatusCode {
    StatusCode::OK
}

#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Service is ready", body = ReadinessResponse),
        (status = 503, description = "Service is not ready", body = ReadinessResponse)
    )
)]
pub async fn ready_check(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let (database, outbox_backlog) = match check_database(&state) {
        Ok((latency_ms, backlog)) => (ComponentStatus::up(latency_ms), Some(backlog)),
        Err(e) => (ComponentStatus::down(e), None),
    };
    let redis = check_redis(&state).await;

    let ready = database.is_up() && redis.as_ref().map_or(true, ComponentStatus::is_up);
    let response = ReadinessResponse {
        status: if ready { "ready" } else { "not_ready" }.to_string(),
        checks: ReadinessChecks {
            database,
            redis,
            outbox_backlog,
        },
    };

    if ready {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

fn check_database(state: &AppState) -> Result<(u64, i64), String> {
    let start = std::time::Instant::now();

    let mut conn = state
        .db_pool
        .get()
        .map_err(|e| format!("Failed to get connection: {}", e))?;

    let backlog: i64 = outbox_events::table
        .filter(outbox_events::published.eq(false))
        .count()
        .get_result(&mut conn)
        .map_err(|e| format!("Query failed: {}", e))?;

    Ok((start.elapsed().as_millis() as u64, backlog))
}

async fn check_redis(state: &AppState) -> Option<ComponentStatus> {
    let pool = state.redis_pool.as_ref()?;
    let start = std::time::Instant::now();

    let status = match pool.get().await {
        Ok(mut conn) => {
            let pong: redis::RedisResult<String> = redis::cmd("PING").query_async(&mut conn).await;
            match pong {
                Ok(_) => ComponentStatus::up(start.elapsed().as_millis() as u64),
                Err(e) => ComponentStatus::down(format!("PING failed: {}", e)),
            }
        }
        Err(e) => ComponentStatus::down(format!("Connection failed: {}", e)),
    };
    Some(status)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_status_up() {
        let status = ComponentStatus::up(10);
        assert!(status.is_up());
        assert_eq!(status.latency_ms, Some(10));
        assert!(status.error.is_none());
    }

    #[test]
    fn test_component_status_down() {
        let status = ComponentStatus::down("Connection refused");
        assert!(!status.is_up());
        assert!(status.latency_ms.is_none());
        assert_eq!(status.error, Some("Connection refused".to_string()));
    }

    #[test]
    fn test_readiness_omits_unconfigured_redis() {
        let body = serde_json::to_value(ReadinessChecks {
            database: ComponentStatus::up(1),
            redis: None,
            outbox_backlog: Some(3),
        })
        .unwrap();
        assert!(body.get("redis").is_none());
        assert_eq!(body["outbox_backlog"], 3);
    }

    #[tokio::test]
    async fn test_health_check_reports_service_name() {
        let response = health_check().await;
        assert_eq!(response.status, "healthy");
        assert_eq!(response.service, SERVICE_NAME);
    }
}
