use rusqlite::Connection;

use crate::activation::CourseActivation;
use crate::db::{AppState, queries};
use crate::error::Result;
use crate::models::{Payment, PaymentStatus};

use super::Notification;

#[derive(Debug, Clone)]
pub enum ReconcileOutcome {
    /// Nothing written: the notification carried no payment id.
    Skipped,
    Applied { payment: Payment, created: bool },
}

/// Apply one notification to storage.
///
/// Lookup and create-or-update run in a single transaction keyed by the
/// provider payment id, so concurrent channels converge on one record. An
/// existing record has its status overwritten and its missing details filled
/// in; stored details are never replaced.
pub fn reconcile(
    conn: &mut Connection,
    notification: &Notification,
    activation: &dyn CourseActivation,
) -> Result<ReconcileOutcome> {
    let Some(provider_payment_id) = notification.provider_payment_id.as_deref() else {
        return Ok(ReconcileOutcome::Skipped);
    };

    if notification.external_reference.is_some() && notification.linkage().is_none() {
        tracing::warn!(
            payment_id = provider_payment_id,
            external_reference = ?notification.external_reference,
            "Unparsable external reference, payment left unlinked"
        );
    }

    let input = notification.to_new_payment(provider_payment_id);
    let (payment, created) = queries::upsert_payment_notification(conn, &input)?;

    tracing::info!(
        payment_id = %payment.provider_payment_id,
        channel = ?notification.channel,
        status = payment.status.as_ref(),
        created,
        "Payment reconciled"
    );

    if payment.status == PaymentStatus::Approved {
        activation.payment_approved(&payment);
    }

    Ok(ReconcileOutcome::Applied { payment, created })
}

/// Reconcile at a notification boundary: failures are logged and swallowed so
/// the caller can always acknowledge. Never retried.
pub fn reconcile_and_log(state: &AppState, notification: &Notification) -> Option<Payment> {
    let result = state
        .db
        .get()
        .map_err(Into::into)
        .and_then(|mut conn| reconcile(&mut conn, notification, state.activation.as_ref()));

    match result {
        Ok(ReconcileOutcome::Applied { payment, .. }) => Some(payment),
        Ok(ReconcileOutcome::Skipped) => {
            tracing::warn!(
                channel = ?notification.channel,
                "Notification without payment id, nothing to reconcile"
            );
            None
        }
        Err(e) => {
            tracing::error!(
                channel = ?notification.channel,
                payment_id = ?notification.provider_payment_id,
                "Reconciliation failed: {}",
                e
            );
            None
        }
    }
}
