//! Project read cache, backed by Redis when configured.

pub mod project_cache;

use deadpool_redis::{Config as RedisPoolConfig, Pool, Runtime};
use tracing::{info, warn};

use crate::config::RedisConfig;

pub use project_cache::{Cached, CacheError, ProjectCache, ALL_PROJECTS_KEY};

pub fn create_redis_pool(config: &RedisConfig) -> Option<Pool> {
    let url = config.url.as_ref()?;

    let timeout = std::time::Duration::from_secs(config.connection_timeout_secs);
    let pool = RedisPoolConfig::from_url(url)
        .builder()
        .map_err(|e| warn!(error = %e, "Invalid Redis configuration"))
        .ok()?
        .max_size(config.pool_size)
        .wait_timeout(Some(timeout))
        .create_timeout(Some(timeout))
        .runtime(Runtime::Tokio1)
        .build()
        .map_err(|e| warn!(error = %e, "Failed to build Redis pool"))
        .ok()?;

    info!(redis_url = %url.split('@').next_back().unwrap_or("***"), "Redis pool created");
    Some(pool)
}
