//! Taskboard - project and task tracking with per-project roles.

pub mod auth;
pub mod bootstrap;
pub mod cache;
pub mod config;
pub mod error;
pub mod handlers;
pub mod helpers;
pub mod middleware;
pub mod models;
pub mod openapi;
pub mod pagination;
pub mod schema;
pub mod storage;
pub mod telemetry;

use axum::{
    extract::DefaultBodyLimit,
    http::StatusCode,
    middleware as axum_middleware,
    response::IntoResponse,
    routing::{delete, get, patch, post, put},
    Json, Router,
};

use diesel::r2d2::{self, ConnectionManager};
use diesel::PgConnection;
use std::sync::Arc;
use std::time::Duration;

use tower_http::{
    cors::{Any, CorsLayer},
    limit::RequestBodyLimitLayer,
    timeout::TimeoutLayer,
    trace::{DefaultMakeSpan, DefaultOnRequest, DefaultOnResponse, TraceLayer},
};
use tracing::Level;

use auth::jwt::JwtConfig;
use auth::password::PasswordPolicy;
use cache::{create_redis_pool, ProjectCache};
use handlers::{health, members, projects, tasks, users};
use middleware::{auth_middleware, metrics_middleware, request_id_middleware};
use storage::BlobStore;
use telemetry::MetricsState;

pub type DbPool = r2d2::Pool<ConnectionManager<PgConnection>>;

#[derive(Clone)]
pub struct AppState {
    pub db_pool: DbPool,
    pub jwt_config: Arc<JwtConfig>,
    pub project_cache: ProjectCache,
    pub blob_store: Option<BlobStore>,
    pub password_policy: PasswordPolicy,
    pub password_hash_cost: u32,
    pub metrics: MetricsState,
}

impl AppState {
    /// Reads the signing key from `JWT_PRIVATE_KEY`.
    pub fn new(db_pool: DbPool, redis_pool: Option<deadpool_redis::Pool>, config: &Config) -> Self {
        let jwt_config = JwtConfig::from_env_with_expiry(
            config.jwt.access_token_expiry_secs,
            config.jwt.issuer.clone(),
            config.jwt.audience.clone(),
        );

        Self::with_jwt(db_pool, redis_pool, config, jwt_config)
    }

    pub fn with_jwt(
        db_pool: DbPool,
        redis_pool: Option<deadpool_redis::Pool>,
        config: &Config,
        jwt_config: JwtConfig,
    ) -> Self {
        let redis_pool = redis_pool.or_else(|| create_redis_pool(&config.redis));
        let project_cache = ProjectCache::new(
            redis_pool,
            config.cache.project_ttl_secs,
            config.cache.local_capacity,
        );

        Self {
            db_pool,
            jwt_config: Arc::new(jwt_config),
            project_cache,
            blob_store: BlobStore::from_config(&config.storage),
            password_policy: PasswordPolicy::from_config(&config.security),
            password_hash_cost: config.security.password_hash_cost,
            metrics: MetricsState::new(config.telemetry.metrics_enabled),
        }
    }
}

pub fn create_router(state: AppState, config: &config::Config) -> Router {
    let cors = build_cors_layer(config);
    let body_limit = RequestBodyLimitLayer::new(config.server.max_body_size);

    #[allow(deprecated)]
    let timeout = TimeoutLayer::new(Duration::from_secs(config.server.request_timeout_secs));

    let trace_layer = TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(Level::INFO))
        .on_request(DefaultOnRequest::new().level(Level::INFO))
        .on_response(DefaultOnResponse::new().level(Level::INFO));

    let metrics_state = state.metrics.clone();
    let public_routes = Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/health/ready", get(health::ready_check))
        .route("/health/live", get(health::live_check))
        .route(
            "/metrics",
            get(telemetry::metrics::metrics_handler).with_state(metrics_state),
        )
        .route("/user/login", post(users::login))
        .with_state(state.clone());

    let user_routes = Router::new()
        .route("/users/create", post(users::create_user))
        .route("/users/me", get(users::get_me))
        .route(
            "/users/me/update-profile-picture",
            patch(users::update_profile_picture)
                .layer(DefaultBodyLimit::max(config.server.max_body_size)),
        )
        .route("/users/update/{id}", put(users::update_user))
        .route("/users/delete/{id}", delete(users::delete_user))
        .route("/users/all", get(users::list_users));

    let project_routes = Router::new()
        .route("/projects/create", post(projects::create_project))
        .route("/projects/all", get(projects::list_projects))
        .route(
            "/projects/{id}",
            get(projects::get_project)
                .put(projects::update_project)
                .delete(projects::delete_project),
        )
        .route(
            "/projects/{id}/members/assign-leader",
            post(projects::assign_leader),
        )
        .route("/projects/{id}/add-member", post(members::add_member))
        .route(
            "/projects/{id}/remove-member/{user_id}",
            delete(members::remove_member),
        )
        .route("/projects/{id}/members", get(members::list_members));

    let task_routes = Router::new()
        .route("/projects/{id}/tasks/create", post(tasks::create_task))
        .route(
            "/projects/{id}/tasks/update/{task_id}",
            put(tasks::update_task),
        )
        .route(
            "/projects/{id}/tasks/{task_id}/status",
            patch(tasks::update_task_status),
        )
        .route("/projects/{id}/tasks/{task_id}", get(tasks::get_task))
        .route("/projects/{id}/tasks/", get(tasks::list_tasks))
        .route("/projects/{id}/tasks", get(tasks::list_tasks))
        .route(
            "/projects/{id}/tasks/delete/{task_id}",
            delete(tasks::delete_task),
        );

    let protected_routes = Router::new()
        .merge(user_routes)
        .merge(project_routes)
        .merge(task_routes)
        .layer(axum_middleware::from_fn_with_state(
            state.clone(),
            auth_middleware,
        ))
        .with_state(state);

    let docs_routes = openapi::swagger_router();

    Router::new()
        .merge(docs_routes)
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(fallback_handler)
        .layer(axum_middleware::from_fn(metrics_middleware))
        .layer(axum_middleware::from_fn(request_id_middleware))
        .layer(trace_layer)
        .layer(timeout)
        .layer(body_limit)
        .layer(cors)
}

async fn fallback_handler() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(error::ApiError::new("Not found", "NOT_FOUND")),
    )
}

fn build_cors_layer(config: &config::Config) -> CorsLayer {
    use axum::http::header::HeaderName;
    use axum::http::Method;

    let is_wildcard_origin = config.cors.allowed_origins.contains(&"*".to_string())
        || config.cors.allowed_origins.is_empty();

    let methods: Vec<Method> = config
        .cors
        .allowed_methods
        .iter()
        .filter_map(|m| m.parse().ok())
        .collect();

    let headers: Vec<HeaderName> = config
        .cors
        .allowed_headers
        .iter()
        .filter_map(|h| h.parse().ok())
        .collect();

    if config.cors.allow_credentials && is_wildcard_origin {
        CorsLayer::new()
            .allow_origin(tower_http::cors::AllowOrigin::mirror_request())
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(true)
            .max_age(Duration::from_secs(config.cors.max_age_secs))
    } else if config.cors.allow_credentials {
        let origins: Vec<_> = config
            .cors
            .allowed_origins
            .iter()
            .filter_map(|o| o.parse().ok())
            .collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(true)
            .max_age(Duration::from_secs(config.cors.max_age_secs))
    } else {
        let cors = if is_wildcard_origin {
            CorsLayer::new().allow_origin(Any)
        } else {
            let origins: Vec<_> = config
                .cors
                .allowed_origins
                .iter()
                .filter_map(|o| o.parse().ok())
                .collect();
            CorsLayer::new().allow_origin(origins)
        };

        cors.allow_methods(methods)
            .allow_headers(headers)
            .allow_credentials(false)
            .max_age(Duration::from_secs(config.cors.max_age_secs))
    }
}

pub fn create_db_pool(config: &config::Config) -> Result<DbPool, r2d2::PoolError> {
    let manager = ConnectionManager::<PgConnection>::new(&config.database.url);
    r2d2::Pool::builder()
        .max_size(config.database.max_connections)
        .min_idle(Some(config.database.min_connections))
        .connection_timeout(Duration::from_secs(config.database.connection_timeout_secs))
        .idle_timeout(Some(Duration::from_secs(config.database.idle_timeout_secs)))
        .build(manager)
}

pub fn init_tracing(config: &config::Config) {
    telemetry::init_telemetry(config);
}

pub use telemetry::tracing::shutdown_telemetry;

pub use config::Config;
