//! Authentication route handlers: register, login, verify.

use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use serde::{Deserialize, Serialize};
use serde_json::json;

use streambox_core::Error;
use streambox_db::queries;

use super::auth::{self, AuthUser};
use super::context::AppContext;
use super::error::AppError;

#[derive(Debug, Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub id: i64,
    pub username: String,
    #[serde(rename = "isAdmin")]
    pub is_admin: bool,
}

fn validate_credentials(payload: &CredentialsRequest) -> Result<(), Error> {
    let name = payload.username.trim();
    if name.is_empty() || name.len() > 64 {
        return Err(Error::Validation(
            "username must be between 1 and 64 characters".into(),
        ));
    }
    if payload.password.len() < 4 {
        return Err(Error::Validation(
            "password must be at least 4 characters".into(),
        ));
    }
    Ok(())
}

/// POST /api/auth/register
///
/// The first registered user becomes the administrator.
pub async fn register(
    State(ctx): State<AppContext>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, AppError> {
    validate_credentials(&payload)?;

    let username = payload.username.trim().to_string();
    let hash = auth::hash_password(&payload.password)?;

    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let is_first = queries::users::count_users(&conn)? == 0;
    let user = queries::users::create_user(&conn, &username, &hash, is_first)?;

    let token = auth::issue_token(&ctx.config.auth.secret, user.id, &user.username);
    tracing::info!(username = %user.username, is_admin = user.is_admin, "User registered");

    Ok((
        StatusCode::CREATED,
        Json(json!({
            "user": UserResponse {
                id: user.id.as_i64(),
                username: user.username,
                is_admin: user.is_admin,
            },
            "token": token,
        })),
    ))
}

/// POST /api/auth/login
///
/// Failures never reveal whether the username or the password was wrong.
pub async fn login(
    State(ctx): State<AppContext>,
    Json(payload): Json<CredentialsRequest>,
) -> Result<impl IntoResponse, AppError> {
    let conn = streambox_db::pool::get_conn(&ctx.db)?;
    let user = queries::users::get_user_by_username(&conn, payload.username.trim())?;

    // Verify against a constant dummy hash when the user is missing so the
    // two failure paths cost the same.
    const DUMMY_HASH: &str = "$2b$12$C6UzMDM.H6dfI/f/IKcEeO7ZUVJLVSX1lAOJFiPyuWrbfjMMnjqO2";
    let valid = match &user {
        Some(u) => auth::verify_password(&payload.password, &u.password_hash),
        None => {
            let _ = auth::verify_password(&payload.password, DUMMY_HASH);
            false
        }
    };

    let user = match (valid, user) {
        (true, Some(u)) => u,
        _ => return Err(Error::Unauthorized("invalid credentials".into()).into()),
    };

    let token = auth::issue_token(&ctx.config.auth.secret, user.id, &user.username);
    tracing::info!(username = %user.username, "User logged in");

    Ok(Json(json!({
        "user": UserResponse {
            id: user.id.as_i64(),
            username: user.username,
            is_admin: user.is_admin,
        },
        "token": token,
    })))
}

/// GET /api/auth/verify
pub async fn verify(Extension(user): Extension<AuthUser>) -> Json<serde_json::Value> {
    Json(json!({
        "valid": true,
        "user": UserResponse {
            id: user.id.as_i64(),
            username: user.username,
            is_admin: user.is_admin,
        },
    }))
}
