use axum::{
    Extension, Router,
    extract::State,
    middleware,
    routing::{get, patch},
};

use crate::db::{AppState, queries};
use crate::error::{OptionExt, Result, msg};
use crate::extractors::{Json, Path, Query};
use crate::middleware::{AuthContext, require_admin, require_user};
use crate::models::{Payment, PaymentFilter, PaymentStatus, PaymentStatusUpdate};

/// Filtered payment listing. Non-admins only ever see their own payments.
pub async fn list_user_payments(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Query(filter): Query<PaymentFilter>,
) -> Result<Json<Vec<Payment>>> {
    let status = filter
        .status
        .as_deref()
        .filter(|s| !s.trim().is_empty())
        .map(PaymentStatus::parse_strict)
        .transpose()?;

    let user_id = if ctx.is_admin() {
        filter.user_id
    } else {
        Some(ctx.user.id)
    };

    let conn = state.db.get()?;
    let payments = queries::list_payments(&conn, user_id, status, filter.curso_id)?;
    Ok(Json(payments))
}

/// Manual status correction.
pub async fn update_payment_status(
    State(state): State<AppState>,
    Extension(ctx): Extension<AuthContext>,
    Path(payment_id): Path<i64>,
    Json(input): Json<PaymentStatusUpdate>,
) -> Result<Json<Payment>> {
    let status = PaymentStatus::parse_strict(&input.status)?;

    let conn = state.db.get()?;
    let previous =
        queries::get_payment_by_id(&conn, payment_id)?.or_not_found(msg::PAYMENT_NOT_FOUND)?;
    let payment = queries::update_payment_status(&conn, payment_id, status)?
        .or_not_found(msg::PAYMENT_NOT_FOUND)?;

    tracing::info!(
        "User {} set payment {} status {} -> {}",
        ctx.user.id,
        payment.provider_payment_id,
        previous.status.as_ref(),
        payment.status.as_ref()
    );

    if payment.status == PaymentStatus::Approved && previous.status != PaymentStatus::Approved {
        state.activation.payment_approved(&payment);
    }

    Ok(Json(payment))
}

pub fn router(state: AppState) -> Router<AppState> {
    Router::new()
        .route("/userpayments/{payment_id}/status", patch(update_payment_status))
        .layer(middleware::from_fn_with_state(state.clone(), require_admin))
        .merge(
            Router::new()
                .route("/userpayments/user_payments", get(list_user_payments))
                .layer(middleware::from_fn_with_state(state, require_user)),
        )
}
