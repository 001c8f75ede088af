//! services/api/src/web/auth.rs
//!
//! Authentication and account endpoints: register, login, logout, current
//! user, profile update, password change and account deletion. Sessions are
//! opaque cookies backed by the database.

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use axum::{
    extract::State,
    http::{header, StatusCode},
    response::IntoResponse,
    Extension, Json,
};
use chrono::{Duration, Utc};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use storybook_core::domain::{User, UserPreferences};
use storybook_core::ports::PortError;
use tracing::error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::web::middleware::CurrentUser;
use crate::web::state::AppState;

const SESSION_DAYS: i64 = 30;
const MIN_PASSWORD_LEN: usize = 6;

//=========================================================================================
// Request/Response Types
//=========================================================================================

#[derive(Deserialize, ToSchema)]
pub struct RegisterRequest {
    pub name: String,
    pub email: String,
    pub password: String,
}

#[derive(Deserialize, ToSchema)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Serialize, ToSchema)]
pub struct AuthResponse {
    pub success: bool,
    #[schema(value_type = Object)]
    pub user: User,
}

#[derive(Deserialize, ToSchema)]
pub struct UpdateProfileRequest {
    pub name: Option<String>,
    #[schema(value_type = Object)]
    pub preferences: Option<UserPreferences>,
}

#[derive(Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct ChangePasswordRequest {
    pub current_password: String,
    pub new_password: String,
}

//=========================================================================================
// Helpers
//=========================================================================================

fn hash_password(password: &str) -> Result<String, (StatusCode, String)> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(password.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("Failed to hash password: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to hash password".to_string(),
            )
        })
}

fn verify_password(password: &str, hash: &str) -> Result<bool, (StatusCode, String)> {
    let parsed = PasswordHash::new(hash).map_err(|e| {
        error!("Failed to parse password hash: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Authentication error".to_string(),
        )
    })?;
    Ok(Argon2::default()
        .verify_password(password.as_bytes(), &parsed)
        .is_ok())
}

fn session_cookie(session_id: &str) -> String {
    format!(
        "session={}; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age={}",
        session_id,
        Duration::days(SESSION_DAYS).num_seconds()
    )
}

async fn open_session(
    state: &AppState,
    user_id: &str,
) -> Result<String, (StatusCode, String)> {
    let session_id = Uuid::new_v4().to_string();
    let expires_at = Utc::now() + Duration::days(SESSION_DAYS);
    state
        .db
        .create_auth_session(&session_id, user_id, expires_at)
        .await
        .map_err(|e| {
            error!("Failed to create auth session: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to create session".to_string(),
            )
        })?;
    Ok(session_id)
}

//=========================================================================================
// Handlers
//=========================================================================================

/// POST /api/auth/register - Create a new user account
#[utoipa::path(
    post,
    path = "/api/auth/register",
    request_body = RegisterRequest,
    responses(
        (status = 201, description = "User created successfully", body = AuthResponse),
        (status = 400, description = "Invalid request"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn register_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<RegisterRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.name.trim().is_empty() || req.email.trim().is_empty() || req.password.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "All fields are required".to_string(),
        ));
    }
    if req.password.len() < MIN_PASSWORD_LEN {
        return Err((
            StatusCode::BAD_REQUEST,
            "Password must be at least 6 characters".to_string(),
        ));
    }

    let password_hash = hash_password(&req.password)?;

    let user = state
        .db
        .create_user(&req.name, &req.email, &password_hash)
        .await
        .map_err(|e| match e {
            PortError::Validation(message) => (StatusCode::BAD_REQUEST, message),
            other => {
                error!("Failed to create user: {:?}", other);
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Failed to register user".to_string(),
                )
            }
        })?;

    let session_id = open_session(&state, &user.id).await?;

    Ok((
        StatusCode::CREATED,
        [(header::SET_COOKIE, session_cookie(&session_id))],
        Json(AuthResponse {
            success: true,
            user,
        }),
    ))
}

/// POST /api/auth/login - Login with existing account
#[utoipa::path(
    post,
    path = "/api/auth/login",
    request_body = LoginRequest,
    responses(
        (status = 200, description = "Login successful", body = AuthResponse),
        (status = 400, description = "Invalid credentials"),
        (status = 500, description = "Internal server error")
    )
)]
pub async fn login_handler(
    State(state): State<Arc<AppState>>,
    Json(req): Json<LoginRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.email.trim().is_empty() || req.password.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Email and password are required".to_string(),
        ));
    }

    let invalid = || (StatusCode::BAD_REQUEST, "Invalid credentials".to_string());

    let credentials = state
        .db
        .get_user_by_email(&req.email)
        .await
        .map_err(|_| invalid())?;

    if !verify_password(&req.password, &credentials.password_hash)? {
        return Err(invalid());
    }

    let user = state.db.get_user(&credentials.id).await.map_err(|e| {
        error!("Failed to load user after login: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to login".to_string(),
        )
    })?;

    let session_id = open_session(&state, &user.id).await?;

    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, session_cookie(&session_id))],
        Json(AuthResponse {
            success: true,
            user,
        }),
    ))
}

/// POST /api/auth/logout - Logout and invalidate session
#[utoipa::path(
    post,
    path = "/api/auth/logout",
    responses(
        (status = 200, description = "Logout successful"),
        (status = 401, description = "No active session")
    )
)]
pub async fn logout_handler(
    State(state): State<Arc<AppState>>,
    headers: axum::http::HeaderMap,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let session_id = headers
        .get(header::COOKIE)
        .and_then(|v| v.to_str().ok())
        .and_then(|cookies| {
            cookies
                .split(';')
                .find_map(|c| c.trim().strip_prefix("session="))
        })
        .ok_or((StatusCode::UNAUTHORIZED, "No session found".to_string()))?;

    state
        .db
        .delete_auth_session(session_id)
        .await
        .map_err(|e| {
            error!("Failed to delete auth session: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to logout".to_string(),
            )
        })?;

    let cookie = "session=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0";
    Ok((StatusCode::OK, [(header::SET_COOKIE, cookie.to_string())]))
}

/// GET /api/auth/me - Get the authenticated user's record
#[utoipa::path(
    get,
    path = "/api/auth/me",
    responses(
        (status = 200, description = "The current user"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn me_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user = state.db.get_user(&user_id).await.map_err(|e| {
        error!("Failed to get user: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to get user info".to_string(),
        )
    })?;
    Ok(Json(user))
}

/// PUT /api/auth/profile - Update name and/or preferences
#[utoipa::path(
    put,
    path = "/api/auth/profile",
    request_body = UpdateProfileRequest,
    responses(
        (status = 200, description = "Updated user record"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn update_profile_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Json(req): Json<UpdateProfileRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    let user = state
        .db
        .update_user_profile(&user_id, req.name.as_deref(), req.preferences)
        .await
        .map_err(|e| {
            error!("Profile update error: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to update profile".to_string(),
            )
        })?;
    Ok(Json(user))
}

/// PUT /api/auth/change-password - Change the account password
#[utoipa::path(
    put,
    path = "/api/auth/change-password",
    request_body = ChangePasswordRequest,
    responses(
        (status = 200, description = "Password changed"),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn change_password_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
    Json(req): Json<ChangePasswordRequest>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    if req.current_password.is_empty() || req.new_password.is_empty() {
        return Err((
            StatusCode::BAD_REQUEST,
            "Both passwords are required".to_string(),
        ));
    }
    if req.new_password.len() < MIN_PASSWORD_LEN {
        return Err((
            StatusCode::BAD_REQUEST,
            "New password must be at least 6 characters".to_string(),
        ));
    }

    let user = state.db.get_user(&user_id).await.map_err(|e| {
        error!("Failed to get user: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to change password".to_string(),
        )
    })?;
    let credentials = state
        .db
        .get_user_by_email(&user.email)
        .await
        .map_err(|e| {
            error!("Failed to get credentials: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to change password".to_string(),
            )
        })?;

    if !verify_password(&req.current_password, &credentials.password_hash)? {
        return Err((
            StatusCode::BAD_REQUEST,
            "Current password is incorrect".to_string(),
        ));
    }

    let new_hash = hash_password(&req.new_password)?;
    state
        .db
        .update_user_password(&user_id, &new_hash)
        .await
        .map_err(|e| {
            error!("Password change error: {:?}", e);
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Failed to change password".to_string(),
            )
        })?;

    Ok(Json(serde_json::json!({
        "success": true,
        "message": "Password changed successfully"
    })))
}

/// DELETE /api/auth/account - Delete the authenticated account
#[utoipa::path(
    delete,
    path = "/api/auth/account",
    responses(
        (status = 200, description = "Account deleted"),
        (status = 401, description = "Not authenticated")
    )
)]
pub async fn delete_account_handler(
    State(state): State<Arc<AppState>>,
    Extension(CurrentUser(user_id)): Extension<CurrentUser>,
) -> Result<impl IntoResponse, (StatusCode, String)> {
    // TODO: also delete the user's stories and their stored assets.
    state.db.delete_user(&user_id).await.map_err(|e| {
        error!("Account deletion error: {:?}", e);
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            "Failed to delete account".to_string(),
        )
    })?;

    let cookie = "session=; HttpOnly; Secure; SameSite=Lax; Path=/; Max-Age=0";
    Ok((
        StatusCode::OK,
        [(header::SET_COOKIE, cookie.to_string())],
        Json(serde_json::json!({
            "success": true,
            "message": "Account deleted successfully"
        })),
    ))
}
