use taskboard::{
    bootstrap::ensure_admin, cache::create_redis_pool, create_db_pool, create_router,
    init_tracing, shutdown_telemetry, AppState, Config,
};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() {
    let config = Config::from_env();

    init_tracing(&config);

    info!(
        service = "taskboard",
        version = env!("CARGO_PKG_VERSION"),
        environment = ?config.server.environment,
        "Starting server"
    );

    for issue in config.validate_for_production() {
        warn!(issue = %issue, "Configuration warning");
    }

    info!(
        database_url = %config.database.url.split('@').next_back().unwrap_or("***"),
        max_connections = config.database.max_connections,
        "Connecting to database"
    );

    let db_pool = create_db_pool(&config).unwrap_or_else(|e| {
        error!(error = %e, "Failed to create database pool");
        std::process::exit(1);
    });

    info!("Database connection pool created");

    match ensure_admin(&db_pool, &config.bootstrap, config.security.password_hash_cost) {
        Ok(Some(_)) => {}
        Ok(None) => {
            if config.bootstrap.admin_credentials().is_none() {
                info!("No bootstrap admin configured");
            }
        }
        Err(e) => {
            error!(error = %e, "Failed to provision bootstrap admin");
            std::process::exit(1);
        }
    }

    let redis_pool = create_redis_pool(&config.redis);
    let state = AppState::new(db_pool, redis_pool, &config);

    info!(
        cache_backend = state.project_cache.backend_name(),
        ttl_secs = state.project_cache.ttl_secs(),
        storage = state.blob_store.is_some(),
        "Collaborators ready"
    );

    let app = create_router(state, &config);

    let http_addr = config.server_addr();
    let listener = tokio::net::TcpListener::bind(&http_addr)
        .await
        .unwrap_or_else(|e| {
            error!(error = %e, address = %http_addr, "Failed to bind HTTP server");
            std::process::exit(1);
        });

    info!(
        http_address = %http_addr,
        docs_url = %format!("http://{}/swagger-ui", http_addr),
        "HTTP server ready"
    );

    let shutdown_signal = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "Failed to install CTRL+C signal handler");
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received");
    };

    if let Err(e) = axum::serve(
        listener,
        app.into_make_service_with_connect_info::<std::net::SocketAddr>(),
    )
    .with_graceful_shutdown(shutdown_signal)
    .await
    {
        error!(error = %e, "HTTP server error");
    }

    shutdown_telemetry();

    info!("Server shutdown complete");
}
