mod checkout;
mod payments;
mod redirect;
mod webhook;

pub use checkout::*;
pub use payments::*;
pub use redirect::*;
pub use webhook::*;

use axum::{
    Router, middleware,
    routing::{get, post},
};

use crate::db::AppState;
use crate::middleware::require_admin;

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        // Direct creation with a known amount (admin only)
        .route("/mp/payments", post(create_payment))
        .layer(middleware::from_fn_with_state(state, require_admin))
        .route("/mp/create_preference", post(create_preference))
        .route("/mp/checkout", post(checkout))
        // Provider redirects after checkout
        .route("/mp/success", get(payment_success))
        .route("/mp/failure", get(payment_failure))
        .route("/mp/pending", get(payment_pending))
        // Provider notifications
        .route("/mp/webhook", post(webhook))
        .route("/mp/webhook/", post(webhook))
}
