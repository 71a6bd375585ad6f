use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Extension, Json, extract::State, http::StatusCode, response::IntoResponse};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::info;

use capsule_types::api::{
    Claims, LoginRequest, LoginResponse, RegisterRequest, RegisterResponse, UpdatePasswordRequest,
    UpdateUserRequest,
};
use capsule_types::models::User;

use crate::error::ApiError;
use crate::extract::ApiJson;
use crate::middleware::AuthUser;
use crate::state::{AppState, run_blocking};

const MIN_PASSWORD_LEN: usize = 6;
const MAX_PASSWORD_LEN: usize = 130;
const MAX_NAME_LEN: usize = 255;

pub async fn register(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<RegisterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let first_name = validate_name("firstName", &req.first_name)?;
    let last_name = validate_name("lastName", &req.last_name)?;
    let email = validate_email(&req.email)?;
    validate_password(&req.password)?;

    // Check if email is taken
    let db = state.clone();
    let lookup = email.clone();
    if run_blocking(move || db.users.get_user_by_email(&lookup))
        .await?
        .is_some()
    {
        return Err(ApiError::Conflict(format!("user with email {} already exists", email)));
    }

    let password_hash = hash_password(&req.password)?;

    let db = state.clone();
    let user_id = run_blocking(move || {
        db.users
            .create_user(&first_name, &last_name, &email, &password_hash)
    })
    .await?;

    info!("Registered user {}", user_id);
    Ok((StatusCode::CREATED, Json(RegisterResponse { user_id })))
}

pub async fn login(
    State(state): State<AppState>,
    ApiJson(req): ApiJson<LoginRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let db = state.clone();
    let email = req.email.trim().to_ascii_lowercase();
    let user = run_blocking(move || db.users.get_user_by_email(&email))
        .await?
        .ok_or_else(invalid_credentials)?;

    if !verify_password(&user.password, &req.password)? {
        return Err(invalid_credentials());
    }

    let token = create_token(
        &state.config.jwt_secret,
        state.config.jwt_expiration_secs,
        user.id,
        &user.email,
    )?;

    Ok(Json(LoginResponse { token }))
}

pub async fn current_user(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<User>, ApiError> {
    let db = state.clone();
    let row = run_blocking(move || db.users.get_user_by_id(user.id))
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;
    Ok(Json(row.into()))
}

pub async fn update_user(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<UpdateUserRequest>,
) -> Result<StatusCode, ApiError> {
    let first_name = validate_name("firstName", &req.first_name)?;
    let last_name = validate_name("lastName", &req.last_name)?;
    let email = validate_email(&req.email)?;

    let db = state.clone();
    run_blocking(move || db.users.update_user(user.id, &first_name, &last_name, &email)).await?;
    Ok(StatusCode::NO_CONTENT)
}

pub async fn update_password(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
    ApiJson(req): ApiJson<UpdatePasswordRequest>,
) -> Result<StatusCode, ApiError> {
    validate_password(&req.new_password)?;

    let db = state.clone();
    let row = run_blocking(move || db.users.get_user_by_id(user.id))
        .await?
        .ok_or_else(|| ApiError::NotFound("user not found".into()))?;

    if !verify_password(&row.password, &req.current_password)? {
        return Err(ApiError::Unauthorized("current password is incorrect".into()));
    }

    let password_hash = hash_password(&req.new_password)?;
    let db = state.clone();
    run_blocking(move || db.users.update_user_password(user.id, &password_hash)).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Dev tooling only. Capsules and content the user owned stay behind.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(user): Extension<AuthUser>,
) -> Result<StatusCode, ApiError> {
    let db = state.clone();
    run_blocking(move || db.users.delete_user(user.id)).await?;
    info!("Deleted user {}", user.id);
    Ok(StatusCode::NO_CONTENT)
}

pub fn create_token(
    secret: &str,
    expiration_secs: i64,
    user_id: i64,
    email: &str,
) -> Result<String, ApiError> {
    let exp = chrono::Duration::try_seconds(expiration_secs)
        .and_then(|ttl| chrono::Utc::now().checked_add_signed(ttl))
        .ok_or_else(|| {
            ApiError::Internal(format!("token expiration out of range: {}s", expiration_secs))
        })?;
    let claims = Claims {
        sub: user_id,
        email: email.to_string(),
        exp: exp.timestamp() as usize,
    };

    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(secret.as_bytes()),
    )
    .map_err(|e| ApiError::Internal(format!("token encoding failed: {}", e)))
}

fn hash_password(password: &str) -> Result<String, ApiError> {
    // Hash password with Argon2id
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| ApiError::Internal(format!("password hashing failed: {}", e)))
}

fn verify_password(hash: &str, password: &str) -> Result<bool, ApiError> {
    let parsed = PasswordHash::new(hash)
        .map_err(|e| ApiError::Internal(format!("stored password hash is corrupt: {}", e)))?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn invalid_credentials() -> ApiError {
    ApiError::Unauthorized("invalid email or password".into())
}

fn validate_name(field: &str, value: &str) -> Result<String, ApiError> {
    let value = value.trim();
    if value.is_empty() || value.chars().count() > MAX_NAME_LEN {
        return Err(ApiError::BadRequest(format!(
            "{field} must be between 1 and {MAX_NAME_LEN} characters"
        )));
    }
    Ok(value.to_string())
}

/// Normalizes to lowercase and checks the basic `local@domain.tld` shape.
fn validate_email(email: &str) -> Result<String, ApiError> {
    let email = email.trim().to_ascii_lowercase();
    let valid = email.len() <= 254
        && !email.chars().any(char::is_whitespace)
        && match email.split_once('@') {
            Some((local, domain)) => {
                !local.is_empty()
                    && !domain.contains('@')
                    && domain.contains('.')
                    && !domain.starts_with('.')
                    && !domain.ends_with('.')
            }
            None => false,
        };
    if !valid {
        return Err(ApiError::BadRequest("invalid email address".into()));
    }
    Ok(email)
}

fn validate_password(password: &str) -> Result<(), ApiError> {
    let len = password.chars().count();
    if !(MIN_PASSWORD_LEN..=MAX_PASSWORD_LEN).contains(&len) {
        return Err(ApiError::BadRequest(format!(
            "password must be between {MIN_PASSWORD_LEN} and {MAX_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}
