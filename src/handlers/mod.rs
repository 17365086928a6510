pub mod auth;
pub mod mp;
pub mod public;
pub mod user_payments;
pub mod users;

use axum::Router;

use crate::db::AppState;

/// All routes with state applied. Cross-cutting layers (tracing, CORS) are
/// added by the binary.
pub fn router(state: AppState) -> Router {
    Router::new()
        .merge(public::router())
        .merge(auth::router(state.clone()))
        .merge(users::router(state.clone()))
        .merge(mp::router(state.clone()))
        .merge(user_payments::router(state.clone()))
        .with_state(state)
}
