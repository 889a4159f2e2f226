//! First-admin provisioning at startup.

use diesel::prelude::*;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::auth::password::PasswordService;
use crate::config::BootstrapConfig;
use crate::models::NewUser;
use crate::schema::users;
use crate::DbPool;

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error("Database connection failed: {0}")]
    Pool(#[from] diesel::r2d2::PoolError),
    #[error("Database query failed: {0}")]
    Query(#[from] diesel::result::Error),
    #[error("Password hashing failed: {0}")]
    Hash(argon2::password_hash::Error),
}

/// Creates the configured admin when credentials are set and no admin exists.
///
/// Returns the id of the created account, or `None` when nothing was done.
pub fn ensure_admin(
    pool: &DbPool,
    config: &BootstrapConfig,
    password_hash_cost: u32,
) -> Result<Option<Uuid>, BootstrapError> {
    let Some((username, email, password)) = config.admin_credentials() else {
        return Ok(None);
    };

    let mut conn = pool.get()?;

    let admins: i64 = users::table
        .filter(users::is_admin.eq(true))
        .count()
        .get_result(&mut conn)?;
    if admins > 0 {
        return Ok(None);
    }

    let hashed_password =
        PasswordService::hash_password(password, password_hash_cost).map_err(BootstrapError::Hash)?;

    let id: Uuid = diesel::insert_into(users::table)
        .values(&NewUser {
            username: username.to_string(),
            email: email.to_lowercase(),
            hashed_password,
            is_admin: true,
            bio: None,
            timezone: Some("UTC".to_string()),
        })
        .returning(users::id)
        .get_result(&mut conn)?;

    info!(user_id = %id, username = %username, "Created bootstrap admin");
    Ok(Some(id))
}
