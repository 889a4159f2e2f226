//! Health check handlers.

use std::time::Instant;

use axum::{extract::State, http::StatusCode, Json};
use diesel::prelude::*;
use redis::AsyncCommands;
use serde::Serialize;
use utoipa::ToSchema;

use crate::{error::run_blocking, AppState};

#[derive(Debug, Serialize, ToSchema)]
pub struct RootResponse {
    #[schema(example = "API running successfully")]
    pub message: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct HealthResponse {
    #[schema(example = "healthy")]
    pub status: String,
    #[schema(example = "taskboard")]
    pub service: String,
    #[schema(example = "0.1.0")]
    pub version: String,
    #[schema(example = "2025-09-14T10:30:00Z")]
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
    pub cache: ComponentStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct ComponentStatus {
    #[schema(example = "up")]
    pub status: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    #[schema(example = "redis")]
    pub backend: Option<String>,
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
            backend: None,
            latency_ms: Some(latency_ms),
            error: None,
        }
    }

    pub fn down(error: impl Into<String>) -> Self {
        Self {
            status: "down".to_string(),
            backend: None,
            latency_ms: None,
            error: Some(error.into()),
        }
    }

    fn with_backend(mut self, backend: &str) -> Self {
        self.backend = Some(backend.to_string());
        self
    }

    fn is_up(&self) -> bool {
        self.status == "up"
    }
}

#[utoipa::path(
    get,
    path = "/",
    tag = "Health",
    responses((status = 200, description = "API is running", body = RootResponse))
)]
pub async fn root() -> Json<RootResponse> {
    Json(RootResponse {
        message: "API running successfully".to_string(),
    })
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "Health",
    responses((status = 200, description = "Service is healthy", body = HealthResponse))
)]
pub async fn health_check() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
        service: env!("CARGO_PKG_NAME").to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        timestamp: chrono::Utc::now().to_rfc3339(),
    })
}

#[utoipa::path(
    get,
    path = "/health/live",
    tag = "Health",
    responses((status = 200, description = "Process is alive"))
)]
pub async fn live_check() -> StatusCode {
    StatusCode::OK
}

#[utoipa::path(
    get,
    path = "/health/ready",
    tag = "Health",
    responses(
        (status = 200, description = "Store and cache reachable", body = ReadinessResponse),
        (status = 503, description = "A dependency is down", body = ReadinessResponse)
    )
)]
pub async fn ready_check(
    State(state): State<AppState>,
) -> Result<Json<ReadinessResponse>, (StatusCode, Json<ReadinessResponse>)> {
    let database = check_database(&state).await;
    let cache = check_cache(&state).await;
    let ready = database.is_up() && cache.is_up();

    let response = ReadinessResponse {
        status: if ready { "ready" } else { "not_ready" }.to_string(),
        checks: ReadinessChecks { database, cache },
    };

    if ready {
        Ok(Json(response))
    } else {
        Err((StatusCode::SERVICE_UNAVAILABLE, Json(response)))
    }
}

async fn check_database(state: &AppState) -> ComponentStatus {
    let start = Instant::now();
    let result = run_blocking(&state.db_pool, |conn| {
        diesel::sql_query("SELECT 1")
            .execute(conn)
            .map_err(|_| crate::error::ApiError::db_error())
    })
    .await;

    match result {
        Ok(_) => ComponentStatus::up(start.elapsed().as_millis() as u64),
        Err((_, body)) => ComponentStatus::down(body.0.error),
    }
}

async fn check_cache(state: &AppState) -> ComponentStatus {
    let backend = state.project_cache.backend_name();
    let Some(pool) = state.project_cache.pool() else {
        return ComponentStatus::up(0).with_backend(backend);
    };

    let start = Instant::now();
    let status = match pool.get().await {
        Ok(mut conn) => match conn.exists::<_, bool>("health:ping").await {
            Ok(_) => ComponentStatus::up(start.elapsed().as_millis() as u64),
            Err(e) => ComponentStatus::down(format!("Probe failed: {}", e)),
        },
        Err(e) => ComponentStatus::down(format!("Connection failed: {}", e)),
    };
    status.with_backend(backend)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_component_status() {
        let up = ComponentStatus::up(10).with_backend("local");
        assert!(up.is_up());
        assert_eq!(up.latency_ms, Some(10));
        assert_eq!(up.backend.as_deref(), Some("local"));

        let down = ComponentStatus::down("Connection refused");
        assert!(!down.is_up());
        assert_eq!(down.error.as_deref(), Some("Connection refused"));
    }

    #[tokio::test]
    async fn test_root_message() {
        let Json(body) = root().await;
        assert_eq!(body.message, "API running successfully");
    }

    #[tokio::test]
    async fn test_health_reports_package() {
        let Json(body) = health_check().await;
        assert_eq!(body.status, "healthy");
        assert_eq!(body.service, "taskboard");
    }
}
