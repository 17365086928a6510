//! Hook fired when a payment reaches `approved`.
//!
//! Granting access to the course lives outside this service; the default hook
//! only records the event.

use crate::models::Payment;

pub trait CourseActivation: Send + Sync {
    fn payment_approved(&self, payment: &Payment);
}

/// Logs approvals.
#[derive(Debug, Clone, Copy, Default)]
pub struct LogActivation;

impl CourseActivation for LogActivation {
    fn payment_approved(&self, payment: &Payment) {
        match payment.linkage {
            Some(linkage) => tracing::info!(
                payment_id = %payment.provider_payment_id,
                user_id = linkage.user_id,
                course_id = linkage.course_id,
                "Payment approved, course activation due"
            ),
            None => tracing::warn!(
                payment_id = %payment.provider_payment_id,
                "Payment approved without user/course linkage, nothing to activate"
            ),
        }
    }
}
