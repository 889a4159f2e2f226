//! Read-through cache for project listings and details.
//!
//! Values are the serialized JSON response bodies, so a hit is returned
//! byte-for-byte as the miss that populated it. Writes never purge entries:
//! readers may see data up to one TTL old after an update.

use std::future::Future;
use std::time::Duration;

use deadpool_redis::Pool;
use moka::future::Cache;
use redis::AsyncCommands;
use thiserror::Error;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::telemetry::metrics::{record_cache_lookup, CacheOutcome};

pub const ALL_PROJECTS_KEY: &str = "projects:all";
const PROJECT_KEY_PREFIX: &str = "project:";
pub const DEFAULT_TTL_SECS: u64 = 600;

#[derive(Debug, Error)]
pub enum CacheError {
    #[error("Redis connection failed: {0}")]
    Connection(#[from] deadpool_redis::PoolError),
    #[error("Redis operation failed: {0}")]
    Operation(#[from] redis::RedisError),
}

#[derive(Clone)]
enum Backend {
    Redis(Pool),
    Local(Cache<String, String>),
}

/// Result of a read-through lookup.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Cached {
    pub body: String,
    pub hit: bool,
}

#[derive(Clone)]
pub struct ProjectCache {
    backend: Backend,
    ttl_secs: u64,
}

impl ProjectCache {
    pub fn redis(pool: Pool, ttl_secs: u64) -> Self {
        Self {
            backend: Backend::Redis(pool),
            ttl_secs,
        }
    }

    /// Per-process cache for deployments without Redis.
    pub fn local(ttl_secs: u64, max_capacity: u64) -> Self {
        let cache = Cache::builder()
            .max_capacity(max_capacity)
            .time_to_live(Duration::from_secs(ttl_secs))
            .build();
        Self {
            backend: Backend::Local(cache),
            ttl_secs,
        }
    }

    pub fn new(pool: Option<Pool>, ttl_secs: u64, local_capacity: u64) -> Self {
        match pool {
            Some(pool) => Self::redis(pool, ttl_secs),
            None => Self::local(ttl_secs, local_capacity),
        }
    }

    pub fn project_key(project_id: Uuid) -> String {
        format!("{}{}", PROJECT_KEY_PREFIX, project_id)
    }

    pub fn ttl_secs(&self) -> u64 {
        self.ttl_secs
    }

    pub fn backend_name(&self) -> &'static str {
        match self.backend {
            Backend::Redis(_) => "redis",
            Backend::Local(_) => "local",
        }
    }

    pub fn pool(&self) -> Option<&Pool> {
        match &self.backend {
            Backend::Redis(pool) => Some(pool),
            Backend::Local(_) => None,
        }
    }

    pub async fn get(&self, key: &str) -> Result<Option<String>, CacheError> {
        match &self.backend {
            Backend::Redis(pool) => {
                let mut conn = pool.get().await?;
                Ok(conn.get::<_, Option<String>>(key).await?)
            }
            Backend::Local(cache) => Ok(cache.get(key).await),
        }
    }

    pub async fn set(&self, key: &str, value: &str) -> Result<(), CacheError> {
        match &self.backend {
            Backend::Redis(pool) => {
                let mut conn = pool.get().await?;
                conn.set_ex::<_, _, ()>(key, value, self.ttl_secs).await?;
            }
            Backend::Local(cache) => cache.insert(key.to_string(), value.to_string()).await,
        }
        Ok(())
    }

    /// Returns the cached body for `key`, or runs `load`, stores its output and returns it.
    ///
    /// Cache failures are logged and treated as misses; only `load` errors propagate.
    pub async fn get_or_load<F, Fut, E>(&self, key: &str, load: F) -> Result<Cached, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<String, E>>,
    {
        match self.get(key).await {
            Ok(Some(body)) => {
                debug!(key, "Project cache hit");
                record_cache_lookup(CacheOutcome::Hit);
                return Ok(Cached { body, hit: true });
            }
            Ok(None) => record_cache_lookup(CacheOutcome::Miss),
            Err(e) => {
                warn!(error = %e, key, "Project cache read failed, falling back to store");
                record_cache_lookup(CacheOutcome::Error);
            }
        }

        let body = load().await?;

        if let Err(e) = self.set(key, &body).await {
            warn!(error = %e, key, "Failed to populate project cache");
        } else {
            debug!(key, ttl_secs = self.ttl_secs, "Project cache populated");
        }

        Ok(Cached { body, hit: false })
    }
}
