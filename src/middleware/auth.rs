use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use crate::db::{AppState, queries};
use crate::error::{AppError, Result, msg};
use crate::models::User;
use crate::util::extract_bearer_token;

/// Identity resolved for the current request, re-read from storage.
#[derive(Debug, Clone)]
pub struct AuthContext {
    pub user: User,
}

impl AuthContext {
    pub fn is_admin(&self) -> bool {
        self.user.role.is_admin()
    }

    /// Allow the owner of `user_id` or any admin.
    pub fn require_self_or_admin(&self, user_id: i64) -> Result<()> {
        if self.user.id == user_id || self.is_admin() {
            Ok(())
        } else {
            Err(AppError::Forbidden(msg::NOT_YOUR_ACCOUNT.into()))
        }
    }
}

/// Bearer token -> validated claims -> current user row.
///
/// The role is never taken from the token, so role changes and deletions
/// apply to the very next request.
pub fn authenticate(state: &AppState, request: &Request) -> Result<User> {
    let token = extract_bearer_token(request.headers())
        .ok_or_else(|| AppError::Unauthenticated(msg::MISSING_BEARER.into()))?;

    let claims = state.tokens.validate(token).map_err(|e| {
        tracing::debug!("Token rejected: {}", e);
        AppError::from(e)
    })?;

    let conn = state.db.get()?;
    queries::get_user_by_id(&conn, claims.user_id)?.ok_or_else(|| {
        tracing::debug!("Token subject {} does not exist", claims.user_id);
        AppError::UnknownSubject
    })
}

pub async fn require_user(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let user = authenticate(&state, &request)?;

    request.extensions_mut().insert(AuthContext { user });
    Ok(next.run(request).await)
}

pub async fn require_admin(
    State(state): State<AppState>,
    mut request: Request,
    next: Next,
) -> Result<Response> {
    let user = authenticate(&state, &request)?;

    if !user.role.is_admin() {
        return Err(AppError::Forbidden(msg::ADMIN_REQUIRED.into()));
    }

    request.extensions_mut().insert(AuthContext { user });
    Ok(next.run(request).await)
}
