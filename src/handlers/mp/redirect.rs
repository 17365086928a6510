use std::collections::BTreeMap;

use axum::{extract::State, response::Redirect};

use crate::db::AppState;
use crate::extractors::Query;
use crate::reconcile::{Notification, RedirectOutcome, reconcile_and_log};

/// Reconcile what the redirect reports, then send the browser on to the
/// frontend no matter how reconciliation went.
fn handle_redirect(
    state: &AppState,
    outcome: RedirectOutcome,
    params: &BTreeMap<String, String>,
) -> Redirect {
    let notification = Notification::from_redirect(Some(outcome), params);
    reconcile_and_log(state, &notification);

    Redirect::temporary(&format!("{}/{}", state.frontend_url, outcome.path()))
}

pub async fn payment_success(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Redirect {
    handle_redirect(&state, RedirectOutcome::Success, &params)
}

pub async fn payment_failure(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Redirect {
    handle_redirect(&state, RedirectOutcome::Failure, &params)
}

pub async fn payment_pending(
    State(state): State<AppState>,
    Query(params): Query<BTreeMap<String, String>>,
) -> Redirect {
    handle_redirect(&state, RedirectOutcome::Pending, &params)
}
