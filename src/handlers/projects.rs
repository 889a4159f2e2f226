//! Project lifecycle handlers.
//!
//! Reads of `/projects/all` and `/projects/{id}` are served through the
//! project cache. Mutations go straight to the store and leave cached entries
//! alone until their TTL runs out.

use axum::{
    extract::{Path, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Extension, Json,
};
use chrono::NaiveDateTime;
use diesel::prelude::*;
use serde::Deserialize;
use tracing::{debug, error, info};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{Action, Principal},
    cache::{Cached, ProjectCache, ALL_PROJECTS_KEY},
    error::{run_blocking, store_failure, ApiError, ApiResult},
    helpers::{check, ensure_project_exists, ensure_user_exists, project_not_found},
    models::{MemberRole, NewProject, NewProjectMember, Project, ProjectChanges, ProjectMember},
    schema::{project_members, projects, tasks},
    AppState,
};

pub const CACHE_STATUS_HEADER: &str = "x-cache";

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateProjectRequest {
    #[validate(length(min = 1, max = 255, message = "Project name must not be empty"))]
    #[schema(example = "Alpha")]
    pub name: String,
    #[validate(length(max = 100, message = "Description must be at most 100 characters"))]
    #[schema(example = "Internal tooling revamp")]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 30, message = "Status must be 1 to 30 characters"))]
    #[schema(example = "active")]
    pub status: Option<String>,
    pub deadline: Option<NaiveDateTime>,
    #[schema(example = "backend,q3")]
    pub tags: Option<String>,
}

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct UpdateProjectRequest {
    #[validate(length(min = 1, max = 255, message = "Project name must not be empty"))]
    pub name: Option<String>,
    #[validate(length(max = 100, message = "Description must be at most 100 characters"))]
    pub description: Option<String>,
    #[validate(length(min = 1, max = 30, message = "Status must be 1 to 30 characters"))]
    pub status: Option<String>,
    pub deadline: Option<NaiveDateTime>,
    pub tags: Option<String>,
}

impl From<UpdateProjectRequest> for ProjectChanges {
    fn from(req: UpdateProjectRequest) -> Self {
        Self {
            name: req.name,
            description: req.description,
            status: req.status,
            deadline: req.deadline,
            tags: req.tags,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct AssignLeaderRequest {
    pub user_id: Uuid,
}

fn validation_error(e: validator::ValidationErrors) -> (StatusCode, Json<ApiError>) {
    ApiError::bad_request(format!("Validation error: {}", e), "VALIDATION_ERROR")
}

fn duplicate_name() -> (StatusCode, Json<ApiError>) {
    ApiError::forbidden("Project with this name already exists", "PROJECT_EXISTS")
}

/// Check-then-act: no constraint backs this, so concurrent writers can both pass.
fn name_taken(
    conn: &mut PgConnection,
    name: &str,
    except: Option<Uuid>,
) -> Result<bool, diesel::result::Error> {
    let mut query = projects::table
        .filter(projects::name.eq(name))
        .select(projects::id)
        .into_boxed();
    if let Some(id) = except {
        query = query.filter(projects::id.ne(id));
    }
    Ok(query.first::<Uuid>(conn).optional()?.is_some())
}

/// Serves a cached body verbatim, tagging the response with hit or miss.
fn cached_json(cached: Cached) -> Response {
    let mut response = (
        [(header::CONTENT_TYPE, HeaderValue::from_static("application/json"))],
        cached.body,
    )
        .into_response();
    response.headers_mut().insert(
        CACHE_STATUS_HEADER,
        HeaderValue::from_static(if cached.hit { "hit" } else { "miss" }),
    );
    response
}

fn encode<T: serde::Serialize>(value: &T) -> ApiResult<String> {
    serde_json::to_string(value).map_err(|e| {
        error!(error = %e, "Failed to serialize project payload");
        ApiError::internal("Internal server error", "INTERNAL_ERROR")
    })
}

#[utoipa::path(
    post,
    path = "/projects/create",
    tag = "Projects",
    request_body = CreateProjectRequest,
    responses(
        (status = 200, description = "Project created", body = Project),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 403, description = "Admin required, or name already exists", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_project(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<CreateProjectRequest>,
) -> ApiResult<Json<Project>> {
    check(&principal, None, Action::ManageProject)?;
    payload.validate().map_err(validation_error)?;

    let created_by = principal.user_id;
    let project = run_blocking(&state.db_pool, move |conn| {
        if name_taken(conn, &payload.name, None)
            .map_err(store_failure("check_project_name", "Failed to create project"))?
        {
            return Err(duplicate_name());
        }

        diesel::insert_into(projects::table)
            .values(&NewProject {
                name: payload.name,
                description: payload.description,
                created_by,
                status: payload.status.unwrap_or_else(|| "active".to_string()),
                deadline: payload.deadline,
                tags: payload.tags,
            })
            .returning(Project::as_returning())
            .get_result(conn)
            .map_err(store_failure("create_project", "Failed to create project"))
    })
    .await?;

    info!(project_id = %project.id, name = %project.name, created_by = %created_by, "Created project");

    Ok(Json(project))
}

#[utoipa::path(
    get,
    path = "/projects/all",
    tag = "Projects",
    responses(
        (status = 200, description = "All projects, possibly up to one TTL stale", body = [Project]),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_projects(State(state): State<AppState>) -> ApiResult<Response> {
    let pool = state.db_pool.clone();
    let cached = state
        .project_cache
        .get_or_load(ALL_PROJECTS_KEY, || async move {
            let all = run_blocking(&pool, |conn| {
                projects::table
                    .order((projects::created_at.asc(), projects::id.asc()))
                    .select(Project::as_select())
                    .load(conn)
                    .map_err(store_failure("list_projects", "Failed to load projects"))
            })
            .await?;
            debug!(count = all.len(), "Loaded projects from store");
            encode(&all)
        })
        .await?;

    Ok(cached_json(cached))
}

#[utoipa::path(
    get,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 200, description = "Project, possibly up to one TTL stale", body = Project),
        (status = 401, description = "Unauthorized", body = ApiError),
        (status = 404, description = "Project not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_project(
    State(state): State<AppState>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<Response> {
    let pool = state.db_pool.clone();
    let cached = state
        .project_cache
        .get_or_load(&ProjectCache::project_key(project_id), || async move {
            let project = run_blocking(&pool, move |conn| {
                projects::table
                    .find(project_id)
                    .select(Project::as_select())
                    .first(conn)
                    .optional()
                    .map_err(store_failure("get_project", "Failed to load project"))
            })
            .await?
            .ok_or_else(project_not_found)?;
            encode(&project)
        })
        .await?;

    Ok(cached_json(cached))
}

#[utoipa::path(
    put,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = UpdateProjectRequest,
    responses(
        (status = 200, description = "Project updated", body = Project),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 403, description = "Admin required, or name already exists", body = ApiError),
        (status = 404, description = "Project not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_project(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<UpdateProjectRequest>,
) -> ApiResult<Json<Project>> {
    check(&principal, None, Action::ManageProject)?;
    payload.validate().map_err(validation_error)?;

    let changes = ProjectChanges::from(payload);
    let project = run_blocking(&state.db_pool, move |conn| {
        ensure_project_exists(conn, project_id)?;

        if let Some(name) = &changes.name {
            if name_taken(conn, name, Some(project_id))
                .map_err(store_failure("check_project_name", "Failed to update project"))?
            {
                return Err(duplicate_name());
            }
        }

        if changes.is_empty() {
            return projects::table
                .find(project_id)
                .select(Project::as_select())
                .first(conn)
                .map_err(store_failure("get_project", "Failed to update project"));
        }

        diesel::update(projects::table.find(project_id))
            .set(&changes)
            .returning(Project::as_returning())
            .get_result(conn)
            .map_err(store_failure("update_project", "Failed to update project"))
    })
    .await?;

    info!(project_id = %project_id, "Updated project");

    Ok(Json(project))
}

#[utoipa::path(
    delete,
    path = "/projects/{id}",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    responses(
        (status = 204, description = "Project, its tasks and memberships deleted"),
        (status = 403, description = "Admin required", body = ApiError),
        (status = 404, description = "Project not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_project(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    check(&principal, None, Action::ManageProject)?;

    let deleted = run_blocking(&state.db_pool, move |conn| {
        conn.transaction::<_, diesel::result::Error, _>(|conn| {
            diesel::delete(tasks::table.filter(tasks::project_id.eq(project_id))).execute(conn)?;
            diesel::delete(project_members::table.filter(project_members::project_id.eq(project_id)))
                .execute(conn)?;
            diesel::delete(projects::table.find(project_id)).execute(conn)
        })
        .map_err(store_failure("delete_project", "Failed to delete project"))
    })
    .await?;

    if deleted == 0 {
        return Err(project_not_found());
    }

    info!(project_id = %project_id, "Deleted project");

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    post,
    path = "/projects/{id}/members/assign-leader",
    tag = "Projects",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = AssignLeaderRequest,
    responses(
        (status = 201, description = "Leader membership created", body = ProjectMember),
        (status = 403, description = "Admin required", body = ApiError),
        (status = 404, description = "Project or user not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn assign_leader(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<AssignLeaderRequest>,
) -> ApiResult<(StatusCode, Json<ProjectMember>)> {
    check(&principal, None, Action::AssignLeader)?;

    let user_id = payload.user_id;
    let membership = run_blocking(&state.db_pool, move |conn| {
        ensure_project_exists(conn, project_id)?;
        ensure_user_exists(conn, user_id)?;

        // An existing membership does not stop the insert; role lookups resolve duplicates.
        let existing: Option<Uuid> = project_members::table
            .filter(project_members::project_id.eq(project_id))
            .filter(project_members::user_id.eq(user_id))
            .select(project_members::id)
            .first(conn)
            .optional()
            .map_err(store_failure("find_membership", "Failed to assign leader"))?;
        if let Some(membership_id) = existing {
            debug!(membership_id = %membership_id, "User already holds a membership in project");
        }

        diesel::insert_into(project_members::table)
            .values(&NewProjectMember {
                project_id,
                user_id,
                role: MemberRole::Leader,
            })
            .returning(ProjectMember::as_returning())
            .get_result(conn)
            .map_err(store_failure("assign_leader", "Failed to assign leader"))
    })
    .await?;

    info!(project_id = %project_id, user_id = %user_id, "Assigned project leader");

    Ok((StatusCode::CREATED, Json(membership)))
}
