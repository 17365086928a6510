use axum::{Extension, Router, extract::State, middleware, routing::{get, post}};

use crate::crypto::{verify_dummy_password, verify_password};
use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::extractors::Json;
use crate::middleware::{AuthContext, require_user};
use crate::models::{LoginRequest, LoginResponse, User};

/// Exchange email and password for a bearer token.
///
/// Unknown email and wrong password answer the same way and both pay for
/// one argon2 verification.
pub async fn login(
    State(state): State<AppState>,
    Json(input): Json<LoginRequest>,
) -> Result<Json<LoginResponse>> {
    let conn = state.db.get()?;

    let Some(user) = queries::get_user_by_email(&conn, &input.email)? else {
        verify_dummy_password(&input.password);
        return Err(AppError::Unauthenticated(msg::INVALID_CREDENTIALS.into()));
    };

    if !verify_password(&input.password, &user.password_hash)? {
        tracing::debug!("Failed login for user {}", user.id);
        return Err(AppError::Unauthenticated(msg::INVALID_CREDENTIALS.into()));
    }

    let access_token = state
        .tokens
        .issue(user.id)
        .map_err(|e| AppError::Internal(format!("Failed to issue token: {}", e)))?;

    tracing::info!("User {} logged in", user.id);

    Ok(Json(LoginResponse {
        message: "Login successful",
        access_token,
        token_type: "bearer",
        id: user.id,
        username: user.username,
        email: user.email,
        role: user.role,
    }))
}

/// The caller's own profile.
pub async fn me(Extension(ctx): Extension<AuthContext>) -> Json<User> {
    Json(ctx.user)
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/me", get(me))
        .layer(middleware::from_fn_with_state(state, require_user))
        .route("/auth/login", post(login))
}
