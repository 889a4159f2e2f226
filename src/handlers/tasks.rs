//! Task handlers, nested under a project.
//!
//! Tasks are assigned to a membership row, not a user. Requests and
//! responses speak in user ids; `assigned_to_user` is resolved through the
//! membership when a task is read.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{DateTime, NaiveDate, NaiveDateTime};
use diesel::pg::Pg;
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::info;
use utoipa::{IntoParams, ToSchema};
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{Action, Decision, Principal},
    error::{run_blocking, store_failure, ApiError, ApiQuery, ApiResult},
    helpers::{caller_role, check, ensure_project_exists, guard, task_not_found},
    models::{NewTask, Task, TaskChanges, TaskPriority, TaskStatus},
    pagination::{PaginatedResponse, PaginationParams, DEFAULT_LIMIT},
    schema::{project_members, tasks},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 50, message = "Task name must be 1 to 50 characters"))]
    #[schema(example = "Write migration")]
    pub name: String,
    #[validate(length(max = 50, message = "Description must be at most 50 characters"))]
    pub description: Option<String>,
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDateTime>,
    /// User id of the assignee; must hold a membership in the project.
    pub assigned_to: Uuid,
    #[validate(range(min = 0))]
    pub estimated_hours: Option<i32>,
    pub tags: Option<String>,
    pub attachments: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 50, message = "Task name must be 1 to 50 characters"))]
    pub name: Option<String>,
    #[validate(length(max = 50, message = "Description must be at most 50 characters"))]
    pub description: Option<String>,
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    pub due_date: Option<NaiveDateTime>,
    #[validate(range(min = 0))]
    pub estimated_hours: Option<i32>,
    #[validate(range(min = 0))]
    pub actual_hours: Option<i32>,
    pub tags: Option<String>,
    pub attachments: Option<String>,
}

impl From<UpdateTaskRequest> for TaskChanges {
    fn from(req: UpdateTaskRequest) -> Self {
        Self {
            name: req.name,
            description: req.description,
            status: req.status,
            priority: req.priority,
            due_date: req.due_date,
            estimated_hours: req.estimated_hours,
            actual_hours: req.actual_hours,
            tags: req.tags,
            attachments: req.attachments,
        }
    }
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateTaskStatusRequest {
    pub status: TaskStatus,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct TaskResponse {
    pub id: Uuid,
    pub name: String,
    pub description: Option<String>,
    pub status: TaskStatus,
    pub priority: TaskPriority,
    pub due_date: Option<NaiveDateTime>,
    pub estimated_hours: Option<i32>,
    pub actual_hours: Option<i32>,
    pub tags: Option<String>,
    pub attachments: Option<String>,
    pub project_id: Uuid,
    /// Membership id.
    pub assigned_to: Option<Uuid>,
    /// User behind the membership.
    pub assigned_to_user: Option<Uuid>,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

impl TaskResponse {
    fn new(task: Task, assigned_to_user: Option<Uuid>) -> Self {
        Self {
            id: task.id,
            name: task.name,
            description: task.description,
            status: task.status,
            priority: task.priority,
            due_date: task.due_date,
            estimated_hours: task.estimated_hours,
            actual_hours: task.actual_hours,
            tags: task.tags,
            attachments: task.attachments,
            project_id: task.project_id,
            assigned_to: task.assigned_to,
            assigned_to_user,
            created_at: task.created_at,
            updated_at: task.updated_at,
        }
    }
}

#[derive(Debug, Deserialize, IntoParams)]
#[into_params(parameter_in = Query)]
pub struct TaskListQuery {
    pub status: Option<TaskStatus>,
    pub priority: Option<TaskPriority>,
    /// User id. Plain members may only pass their own.
    pub assigned_to: Option<Uuid>,
    /// `YYYY-MM-DD` or RFC 3339.
    pub due_before: Option<String>,
    /// `YYYY-MM-DD` or RFC 3339.
    pub due_after: Option<String>,
    #[serde(default = "default_limit")]
    #[param(minimum = 1, maximum = 100, default = 20)]
    pub limit: i64,
    #[serde(default)]
    #[param(minimum = 0, default = 0)]
    pub offset: i64,
}

fn default_limit() -> i64 {
    DEFAULT_LIMIT
}

/// Parses a due-date bound. A bare date means midnight at the start of that day.
pub fn parse_due_bound(raw: &str) -> Option<NaiveDateTime> {
    let raw = raw.trim();
    if let Ok(date) = NaiveDate::parse_from_str(raw, "%Y-%m-%d") {
        return date.and_hms_opt(0, 0, 0);
    }
    if let Ok(dt) = DateTime::parse_from_rfc3339(raw) {
        return Some(dt.naive_utc());
    }
    NaiveDateTime::parse_from_str(raw, "%Y-%m-%dT%H:%M:%S%.f").ok()
}

fn due_bound(name: &str, raw: Option<&str>) -> ApiResult<Option<NaiveDateTime>> {
    raw.map(|value| {
        parse_due_bound(value).ok_or_else(|| {
            ApiError::bad_request(
                format!("Invalid {} '{}': expected YYYY-MM-DD or RFC 3339", name, value),
                "INVALID_DATE_FILTER",
            )
        })
    })
    .transpose()
}

/// Assignee filter after the policy has had its say: a scoped decision overrides the request.
pub fn effective_assignee(decision: Decision, requested: Option<Uuid>) -> Option<Uuid> {
    match decision {
        Decision::AllowScoped(scope) => Some(scope.assignee),
        _ => requested,
    }
}

#[derive(Debug, Clone, Copy)]
struct TaskFilters {
    project_id: Uuid,
    status: Option<TaskStatus>,
    priority: Option<TaskPriority>,
    assignee: Option<Uuid>,
    due_before: Option<NaiveDateTime>,
    due_after: Option<NaiveDateTime>,
}

impl TaskFilters {
    fn query(&self) -> tasks::BoxedQuery<'static, Pg> {
        let mut query = tasks::table
            .filter(tasks::project_id.eq(self.project_id))
            .into_boxed();

        if let Some(status) = self.status {
            query = query.filter(tasks::status.eq(status));
        }
        if let Some(priority) = self.priority {
            query = query.filter(tasks::priority.eq(priority));
        }
        if let Some(user_id) = self.assignee {
            let memberships = project_members::table
                .filter(project_members::project_id.eq(self.project_id))
                .filter(project_members::user_id.eq(user_id))
                .select(project_members::id.nullable());
            query = query.filter(tasks::assigned_to.eq_any(memberships));
        }
        if let Some(before) = self.due_before {
            query = query.filter(tasks::due_date.lt(before));
        }
        if let Some(after) = self.due_after {
            query = query.filter(tasks::due_date.gt(after));
        }
        query
    }
}

/// Loads a task of `project_id` together with the user it is assigned to.
fn load_task(
    conn: &mut PgConnection,
    project_id: Uuid,
    task_id: Uuid,
) -> ApiResult<(Task, Option<Uuid>)> {
    tasks::table
        .left_join(project_members::table)
        .filter(tasks::id.eq(task_id))
        .filter(tasks::project_id.eq(project_id))
        .select((Task::as_select(), project_members::user_id.nullable()))
        .first(conn)
        .optional()
        .map_err(store_failure("load_task", "Failed to load task"))?
        .ok_or_else(task_not_found)
}

#[utoipa::path(
    post,
    path = "/projects/{id}/tasks/create",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Project id")),
    request_body = CreateTaskRequest,
    responses(
        (status = 200, description = "Task created with status pending", body = TaskResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 403, description = "Leader or admin required", body = ApiError),
        (status = 404, description = "Project not found, or assignee is not a member", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_task(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_id): Path<Uuid>,
    Json(payload): Json<CreateTaskRequest>,
) -> ApiResult<Json<TaskResponse>> {
    payload.validate().map_err(|e| {
        ApiError::bad_request(format!("Validation error: {}", e), "VALIDATION_ERROR")
    })?;

    let assignee = payload.assigned_to;
    let task = run_blocking(&state.db_pool, move |conn| {
        guard(conn, &principal, project_id, Action::CreateTask)?;
        ensure_project_exists(conn, project_id)?;

        let membership_id: Uuid = project_members::table
            .filter(project_members::project_id.eq(project_id))
            .filter(project_members::user_id.eq(assignee))
            .order(project_members::added_at.asc())
            .select(project_members::id)
            .first(conn)
            .optional()
            .map_err(store_failure("find_membership", "Could not assign task"))?
            .ok_or_else(|| {
                ApiError::not_found(
                    "Assignee is not a member of this project",
                    "MEMBER_NOT_FOUND",
                )
            })?;

        diesel::insert_into(tasks::table)
            .values(&NewTask {
                name: payload.name,
                description: payload.description,
                status: TaskStatus::Pending,
                priority: payload.priority,
                due_date: payload.due_date,
                estimated_hours: payload.estimated_hours,
                tags: payload.tags,
                attachments: payload.attachments,
                project_id,
                assigned_to: Some(membership_id),
            })
            .returning(Task::as_returning())
            .get_result(conn)
            .map_err(store_failure("create_task", "Could not assign task"))
    })
    .await?;

    info!(task_id = %task.id, project_id = %project_id, assignee = %assignee, "Created task");

    Ok(Json(TaskResponse::new(task, Some(assignee))))
}

#[utoipa::path(
    put,
    path = "/projects/{id}/tasks/update/{task_id}",
    tag = "Tasks",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("task_id" = Uuid, Path, description = "Task id")
    ),
    request_body = UpdateTaskRequest,
    responses(
        (status = 200, description = "Task updated; absent fields are left as they were", body = TaskResponse),
        (status = 400, description = "Validation error", body = ApiError),
        (status = 404, description = "Task not found in project", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_task(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((project_id, task_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateTaskRequest>,
) -> ApiResult<Json<TaskResponse>> {
    check(&principal, None, Action::UpdateTask)?;
    payload.validate().map_err(|e| {
        ApiError::bad_request(format!("Validation error: {}", e), "VALIDATION_ERROR")
    })?;

    let changes = TaskChanges::from(payload);
    let (task, assigned_to_user) = run_blocking(&state.db_pool, move |conn| {
        let (current, assigned_to_user) = load_task(conn, project_id, task_id)?;
        if changes.is_empty() {
            return Ok((current, assigned_to_user));
        }

        let task = diesel::update(tasks::table.find(task_id))
            .set(&changes)
            .returning(Task::as_returning())
            .get_result(conn)
            .map_err(store_failure("update_task", "Could not update task"))?;
        Ok((task, assigned_to_user))
    })
    .await?;

    info!(task_id = %task_id, project_id = %project_id, updated_by = %principal.user_id, "Updated task");

    Ok(Json(TaskResponse::new(task, assigned_to_user)))
}

#[utoipa::path(
    patch,
    path = "/projects/{id}/tasks/{task_id}/status",
    tag = "Tasks",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("task_id" = Uuid, Path, description = "Task id")
    ),
    request_body = UpdateTaskStatusRequest,
    responses(
        (status = 200, description = "Status changed", body = TaskResponse),
        (status = 403, description = "Caller is not the assignee", body = ApiError),
        (status = 404, description = "Task not found in project", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_task_status(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((project_id, task_id)): Path<(Uuid, Uuid)>,
    Json(payload): Json<UpdateTaskStatusRequest>,
) -> ApiResult<Json<TaskResponse>> {
    let user_id = principal.user_id;
    let (task, assigned_to_user) = run_blocking(&state.db_pool, move |conn| {
        let (_, assigned_to_user) = load_task(conn, project_id, task_id)?;
        check(
            &principal,
            None,
            Action::UpdateTaskStatus {
                assignee: assigned_to_user,
            },
        )?;

        let task = diesel::update(tasks::table.find(task_id))
            .set(tasks::status.eq(payload.status))
            .returning(Task::as_returning())
            .get_result(conn)
            .map_err(store_failure("update_task_status", "Could not modify task"))?;
        Ok((task, assigned_to_user))
    })
    .await?;

    info!(task_id = %task_id, status = %task.status, user_id = %user_id, "Task status changed");

    Ok(Json(TaskResponse::new(task, assigned_to_user)))
}

#[utoipa::path(
    get,
    path = "/projects/{id}/tasks/{task_id}",
    tag = "Tasks",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("task_id" = Uuid, Path, description = "Task id")
    ),
    responses(
        (status = 200, description = "Task", body = TaskResponse),
        (status = 403, description = "Caller is neither leader, admin nor assignee", body = ApiError),
        (status = 404, description = "Task not found in project", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_task(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((project_id, task_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<Json<TaskResponse>> {
    let (task, assigned_to_user) = run_blocking(&state.db_pool, move |conn| {
        let role = caller_role(conn, &principal, project_id)?;
        // Outsiders are refused before the lookup so task ids in other projects don't leak.
        if !principal.is_admin && role.is_none() {
            check(&principal, role, Action::ViewTask { assignee: None })?;
        }

        let (task, assigned_to_user) = load_task(conn, project_id, task_id)?;
        check(
            &principal,
            role,
            Action::ViewTask {
                assignee: assigned_to_user,
            },
        )?;
        Ok((task, assigned_to_user))
    })
    .await?;

    Ok(Json(TaskResponse::new(task, assigned_to_user)))
}

#[utoipa::path(
    get,
    path = "/projects/{id}/tasks/",
    tag = "Tasks",
    params(("id" = Uuid, Path, description = "Project id"), TaskListQuery),
    responses(
        (status = 200, description = "Tasks ordered by due date; plain members only see their own", body = PaginatedResponse<TaskResponse>),
        (status = 400, description = "Malformed date filter", body = ApiError),
        (status = 403, description = "Not a member, or filtering on another member", body = ApiError),
        (status = 404, description = "Project not found", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_tasks(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(project_id): Path<Uuid>,
    ApiQuery(query): ApiQuery<TaskListQuery>,
) -> ApiResult<Json<PaginatedResponse<TaskResponse>>> {
    let due_before = due_bound("due_before", query.due_before.as_deref())?;
    let due_after = due_bound("due_after", query.due_after.as_deref())?;
    let pagination = PaginationParams::new(query.limit, query.offset);
    let (limit, offset) = (pagination.limit(), pagination.offset());
    let requested = query.assigned_to;
    let (status, priority) = (query.status, query.priority);

    let (rows, total_count) = run_blocking(&state.db_pool, move |conn| {
        let decision = guard(
            conn,
            &principal,
            project_id,
            Action::ListTasks {
                requested_assignee: requested,
            },
        )?;
        ensure_project_exists(conn, project_id)?;

        let filters = TaskFilters {
            project_id,
            status,
            priority,
            assignee: effective_assignee(decision, requested),
            due_before,
            due_after,
        };

        let total_count: i64 = filters
            .query()
            .count()
            .get_result(conn)
            .map_err(store_failure("count_tasks", "Failed to list tasks"))?;

        let page: Vec<Task> = filters
            .query()
            .order((tasks::due_date.asc().nulls_last(), tasks::id.asc()))
            .limit(limit)
            .offset(offset)
            .select(Task::as_select())
            .load(conn)
            .map_err(store_failure("list_tasks", "Failed to list tasks"))?;

        let membership_ids: Vec<Uuid> = page.iter().filter_map(|t| t.assigned_to).collect();
        let owners: HashMap<Uuid, Uuid> = project_members::table
            .filter(project_members::id.eq_any(membership_ids))
            .select((project_members::id, project_members::user_id))
            .load::<(Uuid, Uuid)>(conn)
            .map_err(store_failure("resolve_assignees", "Failed to list tasks"))?
            .into_iter()
            .collect();

        let rows: Vec<TaskResponse> = page
            .into_iter()
            .map(|task| {
                let user = task.assigned_to.and_then(|m| owners.get(&m).copied());
                TaskResponse::new(task, user)
            })
            .collect();

        Ok((rows, total_count))
    })
    .await?;

    Ok(Json(PaginatedResponse::from_params(
        rows,
        pagination,
        total_count,
    )))
}

#[utoipa::path(
    delete,
    path = "/projects/{id}/tasks/delete/{task_id}",
    tag = "Tasks",
    params(
        ("id" = Uuid, Path, description = "Project id"),
        ("task_id" = Uuid, Path, description = "Task id")
    ),
    responses(
        (status = 204, description = "Task deleted"),
        (status = 403, description = "Leader or admin required", body = ApiError),
        (status = 404, description = "Task not found in project", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_task(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path((project_id, task_id)): Path<(Uuid, Uuid)>,
) -> ApiResult<StatusCode> {
    let deleted = run_blocking(&state.db_pool, move |conn| {
        guard(conn, &principal, project_id, Action::DeleteTask)?;
        diesel::delete(
            tasks::table
                .filter(tasks::id.eq(task_id))
                .filter(tasks::project_id.eq(project_id)),
        )
        .execute(conn)
        .map_err(store_failure("delete_task", "Could not delete task"))
    })
    .await?;

    if deleted == 0 {
        return Err(task_not_found());
    }

    info!(task_id = %task_id, project_id = %project_id, "Deleted task");

    Ok(StatusCode::NO_CONTENT)
}
