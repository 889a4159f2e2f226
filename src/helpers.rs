//! Shared lookups and authorization guards for handlers.

use axum::{http::StatusCode, Json};
use diesel::prelude::*;
use tracing::{debug, error};
use uuid::Uuid;

use crate::{
    auth::{authorize, Action, Decision, Principal},
    error::{ApiError, ApiResult},
    models::MemberRole,
    schema::{project_members, projects, users},
    telemetry::record_authz_decision,
};

/// Role of `user_id` in `project_id`. Duplicate membership rows resolve to the strongest role.
pub fn project_role(
    conn: &mut PgConnection,
    project_id: Uuid,
    user_id: Uuid,
) -> Result<Option<MemberRole>, diesel::result::Error> {
    let roles: Vec<MemberRole> = project_members::table
        .filter(project_members::project_id.eq(project_id))
        .filter(project_members::user_id.eq(user_id))
        .select(project_members::role)
        .load(conn)?;
    Ok(MemberRole::strongest(roles))
}

/// Resolves the caller's role in `project_id` and runs the policy for `action`.
///
/// Returns the allowing decision so list handlers can honour a scoped outcome.
pub fn guard(
    conn: &mut PgConnection,
    principal: &Principal,
    project_id: Uuid,
    action: Action,
) -> ApiResult<Decision> {
    let role = caller_role(conn, principal, project_id)?;
    check(principal, role, action)
}

/// The caller's role in `project_id`; always `None` for admins.
pub fn caller_role(
    conn: &mut PgConnection,
    principal: &Principal,
    project_id: Uuid,
) -> ApiResult<Option<MemberRole>> {
    // Admins never need the membership lookup.
    if principal.is_admin {
        return Ok(None);
    }
    project_role(conn, project_id, principal.user_id).map_err(|e| {
        error!(error = %e, "Failed to resolve project role");
        ApiError::db_error()
    })
}

/// Runs the policy for an already resolved role.
pub fn check(principal: &Principal, role: Option<MemberRole>, action: Action) -> ApiResult<Decision> {
    let decision = authorize(principal, role, action);
    record_authz_decision(action, &decision);

    match decision {
        Decision::Deny(reason) => {
            debug!(
                user_id = %principal.user_id,
                action = action.name(),
                reason = reason.code(),
                "Authorization denied"
            );
            Err(ApiError::forbidden(reason.message(), reason.code()))
        }
        allowed => Ok(allowed),
    }
}

pub fn ensure_project_exists(conn: &mut PgConnection, project_id: Uuid) -> ApiResult<()> {
    let exists: bool = diesel::select(diesel::dsl::exists(
        projects::table.filter(projects::id.eq(project_id)),
    ))
    .get_result(conn)
    .map_err(|e| {
        error!(error = %e, "Failed to look up project");
        ApiError::db_error()
    })?;

    if exists {
        Ok(())
    } else {
        Err(project_not_found())
    }
}

pub fn ensure_user_exists(conn: &mut PgConnection, user_id: Uuid) -> ApiResult<()> {
    let exists: bool =
        diesel::select(diesel::dsl::exists(users::table.filter(users::id.eq(user_id))))
            .get_result(conn)
            .map_err(|e| {
                error!(error = %e, "Failed to look up user");
                ApiError::db_error()
            })?;

    if exists {
        Ok(())
    } else {
        Err(ApiError::not_found("User not found", "USER_NOT_FOUND"))
    }
}

pub fn project_not_found() -> (StatusCode, Json<ApiError>) {
    ApiError::not_found("Project not found", "PROJECT_NOT_FOUND")
}

pub fn task_not_found() -> (StatusCode, Json<ApiError>) {
    ApiError::not_found("Task not found", "TASK_NOT_FOUND")
}
