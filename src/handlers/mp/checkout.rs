use axum::extract::State;
use serde::{Deserialize, Serialize};

use crate::db::AppState;
use crate::error::Result;
use crate::extractors::Json;
use crate::handlers::users::register_user;
use crate::models::{CreateUser, User};
use crate::payments::{CheckoutPreference, PreferenceRequest};

/// Start a checkout for an existing user.
pub async fn create_preference(
    State(state): State<AppState>,
    Json(input): Json<PreferenceRequest>,
) -> Result<Json<CheckoutPreference>> {
    input.validate()?;

    let preference = state.mercadopago.create_preference(&input).await?;

    tracing::info!(
        "Created preference {} for user {} course {}",
        preference.id,
        input.user_id,
        input.curso_id
    );
    Ok(Json(preference))
}

/// Registration and checkout in one step.
#[derive(Debug, Deserialize)]
pub struct CheckoutRequest {
    pub username: String,
    pub email: String,
    pub password: String,
    pub curso_titulo: String,
    pub precio: f64,
    pub cantidad: u32,
    pub curso_id: i64,
}

#[derive(Debug, Serialize)]
pub struct CheckoutResponse {
    pub user: User,
    #[serde(flatten)]
    pub preference: CheckoutPreference,
}

pub async fn checkout(
    State(state): State<AppState>,
    Json(input): Json<CheckoutRequest>,
) -> Result<Json<CheckoutResponse>> {
    let mut preference_request = PreferenceRequest {
        username: input.username.clone(),
        email: input.email.clone(),
        curso_titulo: input.curso_titulo,
        precio: input.precio,
        cantidad: input.cantidad,
        user_id: 0,
        curso_id: input.curso_id,
    };
    // Reject a bad order before creating the account
    preference_request.validate()?;

    let user = register_user(
        &state,
        &CreateUser {
            username: input.username,
            email: input.email,
            password: input.password,
        },
    )?;
    preference_request.user_id = user.id;

    let preference = state.mercadopago.create_preference(&preference_request).await?;

    Ok(Json(CheckoutResponse { user, preference }))
}
