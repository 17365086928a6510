use axum::{
    Extension, Router,
    extract::State,
    http::StatusCode,
    middleware,
    routing::{get, patch, post},
};
use serde::Serialize;

use crate::crypto::{hash_password, verify_password};
use crate::db::{AppState, queries};
use crate::error::{AppError, OptionExt, Result, msg};
use crate::extractors::{Json, Path};
use crate::middleware::{AuthContext, require_admin, require_user};
use crate::models::{ChangePassword, CreateUser, RoleUpdate, UpdateUser, User, UserRole};

#[derive(Debug, Serialize)]
pub struct DetailResponse {
    pub detail: String,
}

impl DetailResponse {
    fn new(detail: impl Into<String>) -> Json<Self> {
        Json(Self {
            detail: detail.into(),
        })
    }
}

/// Create a `user`-role account. Shared by registration and checkout.
pub fn register_user(state: &AppState, input: &CreateUser) -> Result<User> {
    input.validate()?;

    let conn = state.db.get()?;
    if queries::user_identity_taken(&conn, &input.username, &input.email, None)? {
        return Err(AppError::Conflict(msg::USER_EXISTS.into()));
    }

    let password_hash = hash_password(&input.password)?;
    let user = queries::create_user(
        &conn,
        &input.username,
        &input.email,
        &password_hash,
        UserRole::User,
    )?;

    tracing::info!("Registered user {} ({})", user.id, user.username);
    Ok(user)
}

pub async fn create_user(
    State(state): State<AppState>,
    Json(input): Json<CreateUser>,
) -> Result<(StatusCode, Json<User>)> {
    let user = register_user(&state, &input)?;
    Ok((StatusCode::CREATED, Json(user)))
}

pub async fn list_users(State(state): State<AppState>) -> Result<Json<Vec<User>>> {
    let conn = state.db.get()?;
    Ok(Json(queries::list_users(&conn)?))
}

pub async fn get_user(
    State(state): State<AppState>,
    Path(user_id): Path<i64>,
) -> Result<Json<User>> {
    let conn = state.db.get()?;
    let user = queries::get_user_by_id(&conn, user_id)?.or_not_found(msg::USER_NOT_FOUND)?;
    Ok(Json(user))
}

/// Replace username, email and password. Own account, or any account for admins.
pub async fn update_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(user_id): Path<i64>,
    Json(input): Json<UpdateUser>,
) -> Result<Json<User>> {
    ctx.require_self_or_admin(user_id)?;
    input.validate()?;

    let conn = state.db.get()?;
    let target = queries::get_user_by_id(&conn, user_id)?.or_not_found(msg::USER_NOT_FOUND)?;
    check_superadmin_target(&ctx.user, &target)?;

    if queries::user_identity_taken(&conn, &input.username, &input.email, Some(user_id))? {
        return Err(AppError::Conflict(msg::USER_EXISTS.into()));
    }

    let password_hash = hash_password(&input.password)?;
    let user = queries::update_user_profile(
        &conn,
        user_id,
        &input.username,
        &input.email,
        &password_hash,
    )?
    .or_not_found(msg::USER_NOT_FOUND)?;

    Ok(Json(user))
}

pub async fn change_password(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Json(input): Json<ChangePassword>,
) -> Result<Json<DetailResponse>> {
    input.validate()?;

    if !verify_password(&input.current_password, &ctx.user.password_hash)? {
        return Err(AppError::Unauthenticated(msg::WRONG_CURRENT_PASSWORD.into()));
    }

    let conn = state.db.get()?;
    let password_hash = hash_password(&input.new_password)?;
    queries::update_user_password(&conn, ctx.user.id, &password_hash)?
        .or_not_found(msg::USER_NOT_FOUND)?;

    Ok(DetailResponse::new("Password updated"))
}

/// Only a superadmin may touch the superadmin role, in either direction.
fn check_superadmin_change(actor: &User, target: &User, new_role: UserRole) -> Result<()> {
    let involves_superadmin =
        new_role == UserRole::Superadmin || target.role == UserRole::Superadmin;
    if involves_superadmin && actor.role != UserRole::Superadmin {
        return Err(AppError::Forbidden(msg::SUPERADMIN_REQUIRED.into()));
    }
    Ok(())
}

/// A superadmin account is only edited by itself or another superadmin.
fn check_superadmin_target(actor: &User, target: &User) -> Result<()> {
    if target.role == UserRole::Superadmin
        && actor.role != UserRole::Superadmin
        && actor.id != target.id
    {
        return Err(AppError::Forbidden(msg::SUPERADMIN_REQUIRED.into()));
    }
    Ok(())
}

pub async fn update_role(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(user_id): Path<i64>,
    Json(input): Json<RoleUpdate>,
) -> Result<Json<DetailResponse>> {
    let new_role: UserRole = input
        .new_role
        .trim()
        .to_ascii_lowercase()
        .parse()
        .map_err(|_| AppError::BadRequest(msg::INVALID_ROLE.into()))?;

    let conn = state.db.get()?;
    let target = queries::get_user_by_id(&conn, user_id)?.or_not_found(msg::USER_NOT_FOUND)?;
    check_superadmin_change(&ctx.user, &target, new_role)?;

    queries::update_user_role(&conn, user_id, new_role)?.or_not_found(msg::USER_NOT_FOUND)?;

    tracing::info!(
        "User {} changed role of user {} from {} to {}",
        ctx.user.id,
        user_id,
        target.role.as_ref(),
        new_role.as_ref()
    );

    Ok(DetailResponse::new(format!(
        "Role of {} updated to {}",
        target.username,
        new_role.as_ref()
    )))
}

/// Delete an account. Its payments remain, unlinked.
pub async fn delete_user(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(user_id): Path<i64>,
) -> Result<(StatusCode, Json<DetailResponse>)> {
    let mut conn = state.db.get()?;
    let target = queries::get_user_by_id(&conn, user_id)?.or_not_found(msg::USER_NOT_FOUND)?;

    check_superadmin_target(&ctx.user, &target)?;

    if !queries::delete_user(&mut conn, user_id)? {
        return Err(AppError::NotFound(msg::USER_NOT_FOUND.into()));
    }

    tracing::info!("User {} deleted user {}", ctx.user.id, user_id);

    Ok((
        StatusCode::ACCEPTED,
        DetailResponse::new(format!("User {} deleted", target.username)),
    ))
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // Admin only
        .route("/users", get(list_users))
        .route("/users/{user_id}/role", patch(update_role))
        .route("/users/{user_id}", axum::routing::delete(delete_user))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .merge(
            Router::new()
                .route("/users/change-password", patch(change_password))
                .route("/users/{user_id}", get(get_user).put(update_user))
                .layer(middleware::from_fn_with_state(state, require_user)),
        )
        // Registration is public
        .route("/users", post(create_user))
}
