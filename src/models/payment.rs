use serde::{Deserialize, Serialize};
use strum::{AsRefStr, EnumString};

use crate::error::{AppError, Result, msg};

/// Outcome of a payment as last reported by the provider.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize, AsRefStr, EnumString,
)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum PaymentStatus {
    Approved,
    Pending,
    Rejected,
    #[default]
    Unknown,
}

impl PaymentStatus {
    /// Parse a provider/client supplied status, rejecting anything outside the four values.
    pub fn parse_strict(s: &str) -> Result<Self> {
        s.trim()
            .to_ascii_lowercase()
            .parse()
            .map_err(|_| AppError::BadRequest(msg::INVALID_STATUS.into()))
    }

    /// Lenient parse for notification parameters: unrecognized or blank values are `Unknown`.
    pub fn from_provider(s: &str) -> Self {
        s.trim().to_ascii_lowercase().parse().unwrap_or_default()
    }
}

/// Purchaser and product a payment belongs to. Either both are known or neither is.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentLinkage {
    pub user_id: i64,
    pub course_id: i64,
}

impl PaymentLinkage {
    /// Parse an external reference of the form `"<user_id>_<course_id>"`.
    ///
    /// Only the first two `_`-separated segments are considered. Returns `None`
    /// when either segment is missing or not an integer.
    pub fn from_external_reference(reference: &str) -> Option<Self> {
        let mut parts = reference.trim().split('_');
        let user_id = parts.next()?.trim().parse().ok()?;
        let course_id = parts.next()?.trim().parse().ok()?;
        Some(Self { user_id, course_id })
    }

    /// Build the external reference sent to the provider.
    pub fn external_reference(&self) -> String {
        format!("{}_{}", self.user_id, self.course_id)
    }
}

/// Authoritative, deduplicated payment record.
#[derive(Debug, Clone, Serialize)]
#[serde(into = "PaymentRead")]
pub struct Payment {
    pub id: i64,
    pub provider_payment_id: String,
    pub external_reference: Option<String>,
    pub linkage: Option<PaymentLinkage>,
    pub status: PaymentStatus,
    pub amount: f64,
    pub payment_method: Option<String>,
    pub merchant_order_id: Option<String>,
    pub raw_payload: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

/// Wire shape of a payment. Uses the same flat names the request payloads
/// and listing filters accept (`payment_id`, `user_id`, `curso_id`).
#[derive(Debug, Clone, Serialize)]
pub struct PaymentRead {
    pub id: i64,
    pub payment_id: String,
    pub user_id: Option<i64>,
    pub curso_id: Option<i64>,
    pub external_reference: Option<String>,
    pub status: PaymentStatus,
    pub amount: f64,
    pub payment_method: Option<String>,
    pub merchant_order_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_payload: Option<String>,
    pub created_at: i64,
    pub updated_at: i64,
}

impl From<Payment> for PaymentRead {
    fn from(p: Payment) -> Self {
        Self {
            id: p.id,
            payment_id: p.provider_payment_id,
            user_id: p.linkage.map(|l| l.user_id),
            curso_id: p.linkage.map(|l| l.course_id),
            external_reference: p.external_reference,
            status: p.status,
            amount: p.amount,
            payment_method: p.payment_method,
            merchant_order_id: p.merchant_order_id,
            raw_payload: p.raw_payload,
            created_at: p.created_at,
            updated_at: p.updated_at,
        }
    }
}

/// Fields written when a payment record is first created.
#[derive(Debug, Clone)]
pub struct NewPayment {
    pub provider_payment_id: String,
    pub external_reference: Option<String>,
    pub linkage: Option<PaymentLinkage>,
    pub status: PaymentStatus,
    pub amount: f64,
    pub payment_method: Option<String>,
    pub merchant_order_id: Option<String>,
    pub raw_payload: Option<String>,
}

/// Payload for the direct payment creation endpoint, which knows the real amount.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CreatePayment {
    #[serde(alias = "provider_payment_id")]
    pub payment_id: String,
    #[serde(default)]
    pub user_id: Option<i64>,
    #[serde(default, alias = "course_id")]
    pub curso_id: Option<i64>,
    #[serde(default)]
    pub external_reference: Option<String>,
    pub status: String,
    pub amount: f64,
    #[serde(default)]
    pub payment_method: Option<String>,
    #[serde(default)]
    pub merchant_order_id: Option<String>,
}

impl CreatePayment {
    pub fn validate(&self) -> Result<()> {
        if self.payment_id.trim().is_empty() {
            return Err(AppError::BadRequest("payment_id cannot be empty".into()));
        }
        if !self.amount.is_finite() || self.amount < 0.0 {
            return Err(AppError::BadRequest("amount must be a non-negative number".into()));
        }
        if self.user_id.is_some() != self.curso_id.is_some() {
            return Err(AppError::BadRequest(
                "user_id and curso_id must be provided together".into(),
            ));
        }
        PaymentStatus::parse_strict(&self.status)?;
        Ok(())
    }

    /// Record to insert. The request itself is kept as the raw payload.
    pub fn to_new_payment(&self) -> Result<NewPayment> {
        Ok(NewPayment {
            provider_payment_id: self.payment_id.trim().to_string(),
            external_reference: self.external_reference.clone(),
            linkage: self.linkage(),
            status: PaymentStatus::parse_strict(&self.status)?,
            amount: self.amount,
            payment_method: self.payment_method.clone(),
            merchant_order_id: self.merchant_order_id.clone(),
            raw_payload: Some(serde_json::to_string(self)?),
        })
    }

    /// Linkage from explicit ids, falling back to the external reference.
    pub fn linkage(&self) -> Option<PaymentLinkage> {
        match (self.user_id, self.curso_id) {
            (Some(user_id), Some(course_id)) => Some(PaymentLinkage { user_id, course_id }),
            _ => self
                .external_reference
                .as_deref()
                .and_then(PaymentLinkage::from_external_reference),
        }
    }
}

/// Filters for payment listings. All optional, combined with AND.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentFilter {
    pub user_id: Option<i64>,
    pub status: Option<String>,
    #[serde(alias = "course_id")]
    pub curso_id: Option<i64>,
}

#[derive(Debug, Deserialize)]
pub struct PaymentStatusUpdate {
    pub status: String,
}
