use axum::{extract::State, http::StatusCode};

use crate::db::{AppState, queries};
use crate::error::Result;
use crate::extractors::Json;
use crate::models::{CreatePayment, Payment, PaymentStatus};

/// Record a payment whose details, amount included, are known to the caller.
pub async fn create_payment(
    State(state): State<AppState>,
    Json(input): Json<CreatePayment>,
) -> Result<(StatusCode, Json<Payment>)> {
    input.validate()?;

    let conn = state.db.get()?;
    let payment = queries::create_payment(&conn, &input.to_new_payment()?)?;

    tracing::info!(
        "Payment {} created directly with status {}",
        payment.provider_payment_id,
        payment.status.as_ref()
    );

    if payment.status == PaymentStatus::Approved {
        state.activation.payment_approved(&payment);
    }

    Ok((StatusCode::CREATED, Json(payment)))
}
