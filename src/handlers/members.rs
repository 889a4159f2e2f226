//! Project membership handlers.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    auth::{Action, Principal},
    error::{run_blocking, store_failure, ApiError, ApiQuery, ApiResult},
    helpers::{ensure_project_exists, guard},
    models::{MemberRole, NewProjectMember, ProjectMember},
    pagination::{PaginationMeta, PaginationParams},
    schema::{project_members, users},
    AppState,
};

#[derive(Debug, Deserialize, ToSchema)]
pub struct AddMemberRequest {
    pub user_id: Uuid,
    #[serde(default = "default_role")]
    #[schema(example = "member")]
    pub role: MemberRole,
}

fn default_role() -> MemberRole {
    MemberRole::Member
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MemberResponse {
    /// Membership id; tasks are assigned to this id.
    pub id: Uuid,
    pub user_id: Uuid,
    #[schema(example = "jdoe")]
    pub username: String,
    #[schema(example = "jdoe@example.com")]
    pub email: String,
    pub role: MemberRole,
    pub added_at: NaiveDateTime,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct MembersListResponse {
    pub data: Vec<MemberResponse>,
    pub pagination: PaginationMeta,
}

#[utoipa::path(
    post,
    path = "/projects/{id}/add-member",
    tag = "Members",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = AddMemberRequest,
    responses(
        (status = 201, description = "Member added", body = MemberResponse),
        (status = 403, description = "Leader or admin required", body = ApiError),
        (status = 404, description = "Project or user not found", body = ApiError),
        (status = 409, description = "User is already a member", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn add_member(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<AddMemberRequest>,
) -> ApiResult<(StatusCode, Json<MemberResponse>)> {
    let response = run_blocking(&state.db_pool, move |conn| {
        guard(conn, &principal, project_id, Action::ManageMembers)?;
        ensure_project_exists(conn, project_id)?;

        let user: Option<(String, String)> = users::table
            .find(payload.user_id)
            .select((users::username, users::email))
            .first(conn)
            .optional()
            .map_err(store_failure("find_user", "Failed to add member"))?;
        let (username, email) =
            user.ok_or_else(|| ApiError::not_found("User not found", "USER_NOT_FOUND"))?;

        let existing: Option<Uuid> = project_members::table
            .filter(project_members::project_id.eq(project_id))
            .filter(project_members::user_id.eq(payload.user_id))
            .select(project_members::id)
            .first(conn)
            .optional()
            .map_err(store_failure("find_membership", "Failed to add member"))?;
        if existing.is_some() {
            return Err(ApiError::conflict(
                "User is already a member of this project",
                "ALREADY_MEMBER",
            ));
        }

        let member: ProjectMember = diesel::insert_into(project_members::table)
            .values(&NewProjectMember {
                project_id,
                user_id: payload.user_id,
                role: payload.role,
            })
            .returning(ProjectMember::as_returning())
            .get_result(conn)
            .map_err(store_failure("add_member", "Failed to add member"))?;

        Ok(MemberResponse {
            id: member.id,
            user_id: member.user_id,
            username,
            email,
            role: member.role,
            added_at: member.added_at,
        })
    })
    .await?;

    info!(project_id = %project_id, user_id = %response.user_id, role = %response.role, "Added member to project");

    Ok((StatusCode::CREATED, Json(response)))
}

#[utoipa::path(
    delete,
    path = "/projects/{id}/remove-member/{user_id}",
    tag = "Members",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("user_id" = Uuid, Path, description = "User to remove")
    ),
    responses(
        (status = 204, description = "Member removed; their tasks become unassigned"),
        (status = 403, description = "Leader or admin required", body = ApiError),
        (status = 404, description = "Membership not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn remove_member(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((project_id, user_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let removed = run_blocking(&state.db_pool, move |conn| {
        guard(conn, &principal, project_id, Action::ManageMembers)?;

        diesel::delete(
            project_members::table
                .filter(project_members::project_id.eq(project_id))
                .filter(project_members::user_id.eq(user_id)),
        )
        .execute(conn)
        .map_err(store_failure("remove_member", "Failed to remove member"))
    })
    .await?;

    if removed == 0 {
        return Err(ApiError::not_found(
            "User is not a member of this project",
            "MEMBERSHIP_NOT_FOUND",
        ));
    }

    info!(project_id = %project_id, user_id = %user_id, "Removed member from project");

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/projects/{id}/members",
    tag = "Members",
    params(("id" = Uuid, Path, description = "Project id"), PaginationParams),
    responses(
        (status = 200, description = "Paginated list of project members", body = MembersListResponse),
        (status = 403, description = "Caller holds no membership in the project", body = ApiError),
        (status = 404, description = "Project not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_members(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_id): Path<Uuid>,
    ApiQuery(pagination): ApiQuery<PaginationParams>,
) -> ApiResult<Json<MembersListResponse>> {
    let (limit, offset) = (pagination.limit(), pagination.offset());

    let (rows, total_count) = run_blocking(&state.db_pool, move |conn| {
        guard(conn, &principal, project_id, Action::ViewMembers)?;
        ensure_project_exists(conn, project_id)?;

        let total_count: i64 = project_members::table
            .filter(project_members::project_id.eq(project_id))
            .count()
            .get_result(conn)
            .map_err(store_failure("count_members", "Failed to list members"))?;

        let rows: Vec<(ProjectMember, String, String)> = project_members::table
            .inner_join(users::table)
            .filter(project_members::project_id.eq(project_id))
            .order((users::username.asc(), project_members::id.asc()))
            .limit(limit)
            .offset(offset)
            .select((ProjectMember::as_select(), users::username, users::email))
            .load(conn)
            .map_err(store_failure("list_members", "Failed to list members"))?;

        Ok((rows, total_count))
    })
    .await?;

    let data = rows
        .into_iter()
        .map(|(member, username, email)| MemberResponse {
            id: member.id,
            user_id: member.user_id,
            username,
            email,
            role: member.role,
            added_at: member.added_at,
        })
        .collect();

    Ok(Json(MembersListResponse {
        data,
        pagination: pagination.into_metadata(total_count),
    }))
}
