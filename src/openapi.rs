//! OpenAPI document and Swagger UI.

use axum::Router;
use utoipa::{
    openapi::security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    Modify, OpenApi,
};
use utoipa_swagger_ui::SwaggerUi;

use crate::error::ApiError;
use crate::handlers::{health, members, projects, tasks, users};
use crate::models::{MemberRole, Project, ProjectMember, TaskPriority, TaskStatus};
use crate::pagination::PaginationMeta;

#[derive(OpenApi)]
#[openapi(
    info(
        title = "Taskboard API",
        version = "1.0.0",
        description = "Project and task tracking for small teams.\n\n\
        ## Authentication\n\
        Obtain a token from `POST /user/login` and send it as `Authorization: Bearer <token>`.\n\n\
        ## Roles\n\
        Administrators manage users and projects. Within a project, leaders manage members \
        and tasks; members see the tasks assigned to them and move their status.\n\n\
        ## Caching\n\
        Project reads are served from a cache for up to ten minutes. The `x-cache` header \
        reports `hit` or `miss`."
    ),
    servers(
        (url = "/", description = "Current server")
    ),
    tags(
        (name = "Health", description = "Liveness and readiness checks"),
        (name = "Users", description = "Accounts, login and profiles"),
        (name = "Projects", description = "Project management"),
        (name = "Members", description = "Project membership"),
        (name = "Tasks", description = "Tasks within a project")
    ),
    paths(
        health::root,
        health::health_check,
        health::live_check,
        health::ready_check,

        users::create_user,
        users::login,
        users::get_me,
        users::update_profile_picture,
        users::update_user,
        users::delete_user,
        users::list_users,

        projects::create_project,
        projects::list_projects,
        projects::get_project,
        projects::update_project,
        projects::delete_project,
        projects::assign_leader,

        members::add_member,
        members::remove_member,
        members::list_members,

        tasks::create_task,
        tasks::update_task,
        tasks::update_task_status,
        tasks::get_task,
        tasks::list_tasks,
        tasks::delete_task,
    ),
    components(
        schemas(
            ApiError,
            PaginationMeta,
            MemberRole,
            TaskStatus,
            TaskPriority,
            Project,
            ProjectMember,

            health::RootResponse,
            health::HealthResponse,
            health::ReadinessResponse,
            health::ReadinessChecks,
            health::ComponentStatus,

            users::CreateUserRequest,
            users::UpdateUserRequest,
            users::LoginRequest,
            users::LoginResponse,
            users::UserResponse,

            projects::CreateProjectRequest,
            projects::UpdateProjectRequest,
            projects::AssignLeaderRequest,

            members::AddMemberRequest,
            members::MemberResponse,
            members::MembersListResponse,

            tasks::CreateTaskRequest,
            tasks::UpdateTaskRequest,
            tasks::UpdateTaskStatusRequest,
            tasks::TaskResponse,
        )
    ),
    modifiers(&SecurityAddon)
)]
pub struct ApiDoc;

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut utoipa::openapi::OpenApi) {
        if let Some(components) = openapi.components.as_mut() {
            components.add_security_scheme(
                "bearer_auth",
                SecurityScheme::Http(
                    HttpBuilder::new()
                        .scheme(HttpAuthScheme::Bearer)
                        .bearer_format("JWT")
                        .description(Some(
                            "Access token obtained from /user/login.\n\
                            Include in requests as: `Authorization: Bearer <token>`",
                        ))
                        .build(),
                ),
            );
        }

        openapi.security = Some(vec![]);
    }
}

pub fn swagger_router() -> Router {
    SwaggerUi::new("/swagger-ui")
        .url("/api-docs/openapi.json", ApiDoc::openapi())
        .into()
}
