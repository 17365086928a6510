use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::{Query, State, rejection::QueryRejection},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
};
use serde_json::json;

use crate::db::AppState;
use crate::reconcile::{WebhookNotification, reconcile_and_log};
use crate::util::header_str;

fn acknowledge() -> impl IntoResponse {
    (StatusCode::OK, axum::Json(json!({ "status": "OK" })))
}

/// Provider notification endpoint.
///
/// Always answers 200 so the provider does not retry. Only `payment` topics
/// with a resolvable id are reconciled.
pub async fn webhook(
    State(state): State<AppState>,
    query: Result<Query<BTreeMap<String, String>>, QueryRejection>,
    headers: HeaderMap,
    body: Bytes,
) -> impl IntoResponse {
    let query = match query {
        Ok(Query(q)) => q,
        Err(e) => {
            tracing::warn!("Mercado Pago webhook with unreadable query: {}", e);
            BTreeMap::new()
        }
    };

    let body = if body.is_empty() {
        None
    } else {
        serde_json::from_slice(&body).ok()
    };

    let event = WebhookNotification::from_parts(query, body);

    if state.mercadopago.webhook_secret_configured() {
        let Some(signature) = header_str(&headers, "x-signature") else {
            tracing::warn!("Mercado Pago webhook without x-signature, ignored");
            return acknowledge();
        };

        match state.mercadopago.verify_webhook_signature(
            event.resource_id.as_deref(),
            header_str(&headers, "x-request-id"),
            signature,
        ) {
            Ok(true) => {}
            Ok(false) => {
                tracing::warn!("Mercado Pago webhook signature mismatch, ignored");
                return acknowledge();
            }
            Err(e) => {
                tracing::warn!("Mercado Pago webhook signature unreadable: {}", e);
                return acknowledge();
            }
        }
    }

    let topic = event.topic.clone();
    let resource_id = event.resource_id.clone();
    match event.into_notification() {
        Some(notification) => {
            reconcile_and_log(&state, &notification);
        }
        None => tracing::info!(
            topic = ?topic,
            id = ?resource_id,
            "Mercado Pago notification acknowledged without reconciliation"
        ),
    }

    acknowledge()
}
