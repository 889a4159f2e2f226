//! Authentication middleware.

use axum::{
    extract::{Request, State},
    http::header,
    middleware::Next,
    response::{IntoResponse, Response},
};
use diesel::prelude::*;
use tracing::{debug, warn};

use crate::{
    auth::Principal,
    error::{run_blocking, store_failure, ApiError},
    schema::users,
    AppState,
};

/// Verifies the bearer token, loads its user and stores a [`Principal`] in request extensions.
pub async fn auth_middleware(
    State(state): State<AppState>,
    mut req: Request,
    next: Next,
) -> Result<Response, Response> {
    let auth_header = req
        .headers()
        .get(header::AUTHORIZATION)
        .and_then(|h| h.to_str().ok())
        .ok_or_else(|| {
            ApiError::unauthorized("Missing authorization header", "MISSING_AUTH_HEADER")
                .into_response()
        })?;

    let token = auth_header.strip_prefix("Bearer ").ok_or_else(|| {
        ApiError::unauthorized("Invalid authorization header format", "INVALID_AUTH_FORMAT")
            .into_response()
    })?;

    let claims = state.jwt_config.verify_access_token(token).map_err(|e| {
        debug!(error = %e, "Rejected access token");
        ApiError::unauthorized("Invalid or expired token", "INVALID_TOKEN").into_response()
    })?;

    let user_id = claims.user_id().ok_or_else(|| {
        ApiError::unauthorized("Invalid or expired token", "INVALID_TOKEN").into_response()
    })?;

    let found = run_blocking(&state.db_pool, move |conn| {
        users::table
            .filter(users::id.eq(user_id))
            .select((users::username, users::is_admin))
            .first::<(String, bool)>(conn)
            .optional()
            .map_err(store_failure("load_principal", "Failed to authenticate"))
    })
    .await
    .map_err(IntoResponse::into_response)?;

    let (username, is_admin) = found.ok_or_else(|| {
        warn!(user_id = %user_id, "Token subject no longer exists");
        ApiError::unauthorized("User not found", "USER_NOT_FOUND").into_response()
    })?;

    req.extensions_mut().insert(Principal {
        user_id,
        username,
        is_admin,
    });
    Ok(next.run(req).await)
}
