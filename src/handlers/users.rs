//! User accounts, login and profile handlers.

use axum::{
    extract::{Multipart, Path, State},
    http::StatusCode,
    Extension, Json,
};
use chrono::{NaiveDateTime, Utc};
use diesel::prelude::*;
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

use crate::{
    auth::{password::PasswordService, Action, Principal},
    error::{run_blocking, store_failure, ApiError, ApiQuery, ApiResult},
    helpers::check,
    models::{NewUser, User, UserChanges},
    pagination::{PaginatedResponse, PaginationParams},
    schema::{project_members, projects, users},
    storage::StorageError,
    telemetry::{record_login, LoginOutcome},
    AppState,
};

#[derive(Debug, Deserialize, Validate, ToSchema)]
pub struct CreateUserRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3 to 50 characters"))]
    #[schema(example = "jdoe")]
    pub username: String,
    #[validate(email(message = "Invalid email format"))]
    #[schema(example = "jdoe@example.com")]
    pub email: String,
    #[schema(example = "correct-horse-battery")]
    pub password: String,
    #[serde(default)]
    pub is_admin: bool,
    pub bio: Option<String>,
    #[schema(example = "Europe/Berlin")]
    pub timezone: Option<String>,
}

#[derive(Debug, Default, Deserialize, Validate, ToSchema)]
pub struct UpdateUserRequest {
    #[validate(length(min = 3, max = 50, message = "Username must be 3 to 50 characters"))]
    pub username: Option<String>,
    #[validate(email(message = "Invalid email format"))]
    pub email: Option<String>,
    pub password: Option<String>,
    pub is_admin: Option<bool>,
    pub bio: Option<String>,
    pub timezone: Option<String>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct LoginRequest {
    #[schema(example = "jdoe")]
    pub username: String,
    #[schema(example = "correct-horse-battery")]
    pub password: String,
}

#[derive(Debug, Serialize, ToSchema)]
pub struct UserResponse {
    pub id: Uuid,
    #[schema(example = "jdoe")]
    pub username: String,
    #[schema(example = "jdoe@example.com")]
    pub email: String,
    pub is_admin: bool,
    pub profile_picture: Option<String>,
    pub bio: Option<String>,
    #[schema(example = "UTC")]
    pub timezone: Option<String>,
    pub last_login: Option<NaiveDateTime>,
    pub created_at: NaiveDateTime,
    pub updated_at: Option<NaiveDateTime>,
}

impl From<User> for UserResponse {
    fn from(user: User) -> Self {
        Self {
            id: user.id,
            username: user.username,
            email: user.email,
            is_admin: user.is_admin,
            profile_picture: user.profile_picture,
            bio: user.bio,
            timezone: user.timezone,
            last_login: user.last_login,
            created_at: user.created_at,
            updated_at: user.updated_at,
        }
    }
}

#[derive(Debug, Serialize, ToSchema)]
pub struct LoginResponse {
    pub access_token: String,
    #[schema(example = "bearer")]
    pub token_type: String,
    /// Seconds until the access token expires.
    #[schema(example = 1800)]
    pub expires_in: i64,
    pub user: UserResponse,
}

fn validation_error(e: validator::ValidationErrors) -> (StatusCode, Json<ApiError>) {
    ApiError::bad_request(format!("Validation error: {}", e), "VALIDATION_ERROR")
}

fn invalid_credentials() -> (StatusCode, Json<ApiError>) {
    ApiError::unauthorized("Invalid username or password", "INVALID_CREDENTIALS")
}

fn user_not_found() -> (StatusCode, Json<ApiError>) {
    ApiError::not_found("User not found", "USER_NOT_FOUND")
}

fn user_in_use() -> (StatusCode, Json<ApiError>) {
    ApiError::conflict(
        "User still holds project memberships or created projects",
        "USER_IN_USE",
    )
}

fn hash(password: &str, cost: u32) -> ApiResult<String> {
    PasswordService::hash_password(password, cost).map_err(|e| {
        error!(error = %e, "Password hashing failed");
        ApiError::internal("Failed to process password", "PASSWORD_HASH_ERROR")
    })
}

/// Rejects a username or email already held by a user other than `except`.
fn ensure_identity_free(
    conn: &mut PgConnection,
    username: Option<&str>,
    email: Option<&str>,
    except: Option<Uuid>,
) -> ApiResult<()> {
    if let Some(username) = username {
        let mut query = users::table
            .filter(users::username.eq(username))
            .select(users::id)
            .into_boxed();
        if let Some(id) = except {
            query = query.filter(users::id.ne(id));
        }
        if query
            .first::<Uuid>(conn)
            .optional()
            .map_err(store_failure("check_username", "Failed to save user"))?
            .is_some()
        {
            return Err(ApiError::conflict("Username is already taken", "USERNAME_EXISTS"));
        }
    }

    if let Some(email) = email {
        let mut query = users::table
            .filter(users::email.eq(email))
            .select(users::id)
            .into_boxed();
        if let Some(id) = except {
            query = query.filter(users::id.ne(id));
        }
        if query
            .first::<Uuid>(conn)
            .optional()
            .map_err(store_failure("check_email", "Failed to save user"))?
            .is_some()
        {
            return Err(ApiError::conflict(
                "A user with this email already exists",
                "EMAIL_EXISTS",
            ));
        }
    }

    Ok(())
}

fn map_unique_violation(
    action: &'static str,
) -> impl FnOnce(diesel::result::Error) -> (StatusCode, Json<ApiError>) {
    move |e| match e {
        diesel::result::Error::DatabaseError(
            diesel::result::DatabaseErrorKind::UniqueViolation,
            _,
        ) => ApiError::conflict("A user with this email already exists", "EMAIL_EXISTS"),
        other => store_failure(action, "Failed to save user")(other),
    }
}

#[utoipa::path(
    post,
    path = "/users/create",
    tag = "Users",
    request_body = CreateUserRequest,
    responses(
        (status = 201, description = "User created", body = UserResponse),
        (status = 400, description = "Validation or password policy error", body = ApiError),
        (status = 403, description = "Admin required", body = ApiError),
        (status = 409, description = "Username or email already in use", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn create_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Json(payload): Json<CreateUserRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    check(&principal, None, Action::ManageUsers)?;
    payload.validate().map_err(validation_error)?;
    state
        .password_policy
        .validate(&payload.password)
        .map_err(|e| ApiError::bad_request(e.to_string(), "PASSWORD_POLICY_VIOLATION"))?;

    let cost = state.password_hash_cost;
    let user = run_blocking(&state.db_pool, move |conn| {
        let email = payload.email.to_lowercase();
        ensure_identity_free(conn, Some(&payload.username), Some(&email), None)?;

        let new_user = NewUser {
            username: payload.username,
            email,
            hashed_password: hash(&payload.password, cost)?,
            is_admin: payload.is_admin,
            bio: payload.bio,
            timezone: Some(payload.timezone.unwrap_or_else(|| "UTC".to_string())),
        };

        diesel::insert_into(users::table)
            .values(&new_user)
            .returning(User::as_returning())
            .get_result(conn)
            .map_err(map_unique_violation("create_user"))
    })
    .await?;

    info!(user_id = %user.id, username = %user.username, is_admin = user.is_admin, "Created user");

    Ok((StatusCode::CREATED, Json(user.into())))
}

#[utoipa::path(
    post,
    path = "/user/login",
    tag = "Users",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = LoginResponse),
        (status = 401, description = "Invalid credentials", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    )
)]
pub async fn login(
    State(state): State<AppState>,
    Json(payload): Json<LoginRequest>,
) -> ApiResult<Json<LoginResponse>> {
    let user = run_blocking(&state.db_pool, move |conn| {
        let user: Option<User> = users::table
            .filter(users::username.eq(&payload.username))
            .order(users::created_at.asc())
            .select(User::as_select())
            .first(conn)
            .optional()
            .map_err(store_failure("find_user", "Failed to log in"))?;

        let Some(user) = user else {
            warn!(username = %payload.username, "Login attempt for unknown user");
            record_login(LoginOutcome::InvalidCredentials);
            return Err(invalid_credentials());
        };

        let valid = PasswordService::verify_password(&payload.password, &user.hashed_password)
            .map_err(|e| {
                error!(error = %e, user_id = %user.id, "Password verification error");
                ApiError::internal("Failed to log in", "PASSWORD_VERIFY_ERROR")
            })?;
        if !valid {
            warn!(user_id = %user.id, "Failed login attempt");
            record_login(LoginOutcome::InvalidCredentials);
            return Err(invalid_credentials());
        }

        diesel::update(users::table.find(user.id))
            .set(users::last_login.eq(Utc::now().naive_utc()))
            .returning(User::as_returning())
            .get_result(conn)
            .map_err(store_failure("record_login", "Failed to log in"))
    })
    .await?;

    let access_token = state
        .jwt_config
        .generate_access_token(user.id, &user.username)
        .map_err(|e| {
            error!(error = %e, "Token generation failed");
            ApiError::internal("Token generation failed", "TOKEN_GENERATION_ERROR")
        })?;

    record_login(LoginOutcome::Success);
    info!(user_id = %user.id, username = %user.username, "User logged in");

    Ok(Json(LoginResponse {
        access_token,
        token_type: "bearer".to_string(),
        expires_in: state.jwt_config.access_token_expiry,
        user: user.into(),
    }))
}

#[utoipa::path(
    get,
    path = "/users/me",
    tag = "Users",
    responses(
        (status = 200, description = "Caller's profile", body = UserResponse),
        (status = 401, description = "Unauthorized", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn get_me(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
) -> ApiResult<Json<UserResponse>> {
    let user = run_blocking(&state.db_pool, move |conn| {
        users::table
            .find(principal.user_id)
            .select(User::as_select())
            .first(conn)
            .optional()
            .map_err(store_failure("get_me", "Failed to load profile"))?
            .ok_or_else(user_not_found)
    })
    .await?;

    Ok(Json(user.into()))
}

#[utoipa::path(
    patch,
    path = "/users/me/update-profile-picture",
    tag = "Users",
    request_body(content_type = "multipart/form-data", description = "Image in field `file`"),
    responses(
        (status = 200, description = "Profile picture stored", body = UserResponse),
        (status = 400, description = "Missing file, wrong type or too large", body = ApiError),
        (status = 502, description = "Object storage rejected the upload", body = ApiError),
        (status = 503, description = "Object storage is not configured", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_profile_picture(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    mut multipart: Multipart,
) -> ApiResult<Json<UserResponse>> {
    let store = state.blob_store.as_ref().ok_or_else(|| {
        ApiError::unavailable("Profile picture uploads are not configured", "STORAGE_UNAVAILABLE")
    })?;

    let mut upload = None;
    while let Some(field) = multipart.next_field().await.map_err(|e| {
        ApiError::bad_request(format!("Invalid multipart body: {}", e), "INVALID_MULTIPART")
    })? {
        if field.name() != Some("file") {
            continue;
        }
        let file_name = field.file_name().unwrap_or("upload").to_string();
        let content_type = field
            .content_type()
            .unwrap_or("application/octet-stream")
            .to_string();
        let bytes = field.bytes().await.map_err(|e| {
            ApiError::bad_request(format!("Failed to read upload: {}", e), "INVALID_MULTIPART")
        })?;
        upload = Some((file_name, content_type, bytes));
        break;
    }

    let (file_name, content_type, bytes) = upload
        .ok_or_else(|| ApiError::bad_request("Missing multipart field 'file'", "MISSING_FILE"))?;

    let url = store
        .upload_image(&file_name, &content_type, bytes.to_vec())
        .await
        .map_err(|e| match e {
            StorageError::UnsupportedContentType(_)
            | StorageError::TooLarge { .. }
            | StorageError::Empty => ApiError::bad_request(e.to_string(), "INVALID_UPLOAD"),
            StorageError::Request(_) | StorageError::Rejected(_) => {
                error!(error = %e, user_id = %principal.user_id, "Profile picture upload failed");
                (
                    StatusCode::BAD_GATEWAY,
                    Json(ApiError::new("Failed to upload profile picture", "UPLOAD_FAILED")),
                )
            }
        })?;

    let user_id = principal.user_id;
    let user = run_blocking(&state.db_pool, move |conn| {
        diesel::update(users::table.find(user_id))
            .set(users::profile_picture.eq(Some(url)))
            .returning(User::as_returning())
            .get_result(conn)
            .optional()
            .map_err(store_failure("update_profile_picture", "Failed to save profile picture"))?
            .ok_or_else(user_not_found)
    })
    .await?;

    info!(user_id = %user_id, "Updated profile picture");

    Ok(Json(user.into()))
}

#[utoipa::path(
    put,
    path = "/users/update/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    request_body = UpdateUserRequest,
    responses(
        (status = 200, description = "User updated; absent fields are left as they were", body = UserResponse),
        (status = 400, description = "Validation or password policy error", body = ApiError),
        (status = 403, description = "Admin required", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
        (status = 409, description = "Username or email already in use", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn update_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(user_id): Path<Uuid>,
    Json(payload): Json<UpdateUserRequest>,
) -> ApiResult<Json<UserResponse>> {
    check(&principal, None, Action::ManageUsers)?;
    payload.validate().map_err(validation_error)?;
    if let Some(password) = &payload.password {
        state
            .password_policy
            .validate(password)
            .map_err(|e| ApiError::bad_request(e.to_string(), "PASSWORD_POLICY_VIOLATION"))?;
    }

    let cost = state.password_hash_cost;
    let user = run_blocking(&state.db_pool, move |conn| {
        let current: User = users::table
            .find(user_id)
            .select(User::as_select())
            .first(conn)
            .optional()
            .map_err(store_failure("find_user", "Failed to update user"))?
            .ok_or_else(user_not_found)?;

        let email = payload.email.map(|e| e.to_lowercase());
        ensure_identity_free(
            conn,
            payload.username.as_deref(),
            email.as_deref(),
            Some(user_id),
        )?;

        let changes = UserChanges {
            username: payload.username,
            email,
            hashed_password: payload
                .password
                .as_deref()
                .map(|p| hash(p, cost))
                .transpose()?,
            is_admin: payload.is_admin,
            bio: payload.bio,
            timezone: payload.timezone,
        };
        if changes.is_empty() {
            return Ok(current);
        }

        diesel::update(users::table.find(user_id))
            .set(&changes)
            .returning(User::as_returning())
            .get_result(conn)
            .map_err(map_unique_violation("update_user"))
    })
    .await?;

    info!(user_id = %user_id, updated_by = %principal.user_id, "Updated user");

    Ok(Json(user.into()))
}

#[utoipa::path(
    delete,
    path = "/users/delete/{id}",
    tag = "Users",
    params(("id" = Uuid, Path, description = "User id")),
    responses(
        (status = 204, description = "User deleted"),
        (status = 403, description = "Admin required", body = ApiError),
        (status = 404, description = "User not found", body = ApiError),
        (status = 409, description = "User still holds memberships or created projects", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    Path(user_id): Path<Uuid>,
) -> ApiResult<StatusCode> {
    check(&principal, None, Action::ManageUsers)?;

    run_blocking(&state.db_pool, move |conn| {
        let memberships: i64 = project_members::table
            .filter(project_members::user_id.eq(user_id))
            .count()
            .get_result(conn)
            .map_err(store_failure("count_memberships", "Failed to delete user"))?;
        let created: i64 = projects::table
            .filter(projects::created_by.eq(user_id))
            .count()
            .get_result(conn)
            .map_err(store_failure("count_projects", "Failed to delete user"))?;
        if memberships > 0 || created > 0 {
            return Err(user_in_use());
        }

        // A membership added after the counts still trips the foreign key.
        let deleted = diesel::delete(users::table.find(user_id))
            .execute(conn)
            .map_err(|e| match e {
                diesel::result::Error::DatabaseError(
                    diesel::result::DatabaseErrorKind::ForeignKeyViolation,
                    _,
                ) => user_in_use(),
                other => store_failure("delete_user", "Failed to delete user")(other),
            })?;
        if deleted == 0 {
            return Err(user_not_found());
        }
        Ok(())
    })
    .await?;

    info!(user_id = %user_id, deleted_by = %principal.user_id, "Deleted user");

    Ok(StatusCode::NO_CONTENT)
}

#[utoipa::path(
    get,
    path = "/users/all",
    tag = "Users",
    params(PaginationParams),
    responses(
        (status = 200, description = "Paginated list of users", body = PaginatedResponse<UserResponse>),
        (status = 403, description = "Admin required", body = ApiError),
        (status = 500, description = "Internal server error", body = ApiError)
    ),
    security(("bearer_auth" = []))
)]
pub async fn list_users(
    State(state): State<AppState>,
    Extension(principal): Extension<Principal>,
    ApiQuery(pagination): ApiQuery<PaginationParams>,
) -> ApiResult<Json<PaginatedResponse<UserResponse>>> {
    check(&principal, None, Action::ManageUsers)?;

    let (limit, offset) = (pagination.limit(), pagination.offset());
    let (rows, total_count) = run_blocking(&state.db_pool, move |conn| {
        let total_count: i64 = users::table
            .count()
            .get_result(conn)
            .map_err(store_failure("count_users", "Failed to list users"))?;
        let rows: Vec<User> = users::table
            .order((users::created_at.asc(), users::id.asc()))
            .limit(limit)
            .offset(offset)
            .select(User::as_select())
            .load(conn)
            .map_err(store_failure("list_users", "Failed to list users"))?;
        Ok((rows, total_count))
    })
    .await?;

    Ok(Json(PaginatedResponse::from_params(
        rows.into_iter().map(UserResponse::from).collect(),
        pagination,
        total_count,
    )))
}
