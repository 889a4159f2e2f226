//! Shared error handling utilities.

use axum::{
    extract::{rejection::QueryRejection, FromRequestParts},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::Serialize;
use tracing::error;
use utoipa::ToSchema;

use crate::DbPool;

/// Client-visible error body.
#[derive(Debug, Serialize, ToSchema)]
pub struct ApiError {
    #[schema(example = "Project not found")]
    pub error: String,
    #[schema(example = "PROJECT_NOT_FOUND")]
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

    pub fn conflict(error: impl Into<String>, code: impl Into<String>) -> (StatusCode, Json<Self>) {
        (StatusCode::CONFLICT, Json(Self::new(error, code)))
    }

    pub fn unavailable(
        error: impl Into<String>,
        code: impl Into<String>,
    ) -> (StatusCode, Json<Self>) {
        (StatusCode::SERVICE_UNAVAILABLE, Json(Self::new(error, code)))
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
}

pub type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

/// Query string extractor whose rejection uses the `ApiError` body.
#[derive(Debug, FromRequestParts)]
#[from_request(via(axum::extract::Query), rejection(InvalidQuery))]
pub struct ApiQuery<T>(pub T);

#[derive(Debug)]
pub struct InvalidQuery(String);

impl From<QueryRejection> for InvalidQuery {
    fn from(rejection: QueryRejection) -> Self {
        Self(rejection.body_text())
    }
}

impl IntoResponse for InvalidQuery {
    fn into_response(self) -> Response {
        ApiError::bad_request(self.0, "INVALID_QUERY").into_response()
    }
}

pub type DbConn =
    diesel::r2d2::PooledConnection<diesel::r2d2::ConnectionManager<diesel::PgConnection>>;

pub fn get_db_conn(pool: &DbPool) -> Result<DbConn, (StatusCode, Json<ApiError>)> {
    pool.get().map_err(|e| {
        error!(error = %e, "Database connection error");
        ApiError::internal("Database connection error", "DB_CONNECTION_ERROR")
    })
}

/// Logs a store failure and maps it to a generic 500 that carries no internal detail.
pub fn store_failure(
    action: &'static str,
    message: &'static str,
) -> impl FnOnce(diesel::result::Error) -> (StatusCode, Json<ApiError>) {
    move |e| {
        error!(error = %e, action, "Store operation failed");
        ApiError::internal(message, "INTERNAL_ERROR")
    }
}

/// Runs a blocking store call on the blocking thread pool so other requests keep running.
pub async fn run_blocking<T, F>(pool: &DbPool, f: F) -> ApiResult<T>
where
    F: FnOnce(&mut diesel::PgConnection) -> ApiResult<T> + Send + 'static,
    T: Send + 'static,
{
    let pool = pool.clone();
    tokio::task::spawn_blocking(move || {
        let mut conn = get_db_conn(&pool)?;
        f(&mut *conn)
    })
    .await
    .map_err(|e| {
        error!(error = %e, "Blocking store task failed");
        ApiError::internal("Internal server error", "INTERNAL_ERROR")
    })?
}
