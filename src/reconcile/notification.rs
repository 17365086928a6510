use std::collections::BTreeMap;

use serde_json::{Value, json};

use crate::models::{NewPayment, PaymentLinkage, PaymentStatus};

/// Which provider redirect the buyer came back through.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirectOutcome {
    Success,
    Failure,
    Pending,
}

impl RedirectOutcome {
    /// Status implied by the redirect path. Overrides any status query value.
    pub fn forced_status(self) -> PaymentStatus {
        match self {
            RedirectOutcome::Success => PaymentStatus::Approved,
            RedirectOutcome::Failure => PaymentStatus::Rejected,
            RedirectOutcome::Pending => PaymentStatus::Pending,
        }
    }

    /// Path segment of the redirect, reused for the frontend landing page.
    pub fn path(self) -> &'static str {
        match self {
            RedirectOutcome::Success => "success",
            RedirectOutcome::Failure => "failure",
            RedirectOutcome::Pending => "pending",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Channel {
    Redirect,
    Webhook,
}

/// One inbound report about a payment, from either channel.
#[derive(Debug, Clone, PartialEq)]
pub struct Notification {
    pub channel: Channel,
    pub provider_payment_id: Option<String>,
    pub status: PaymentStatus,
    pub external_reference: Option<String>,
    pub merchant_order_id: Option<String>,
    pub payment_method: Option<String>,
    pub raw_payload: String,
}

fn param<'a>(params: &'a BTreeMap<String, String>, keys: &[&str]) -> Option<&'a str> {
    keys.iter()
        .filter_map(|k| params.get(*k))
        .map(|v| v.trim())
        .find(|v| !v.is_empty() && *v != "null")
}

impl Notification {
    /// Build from the query string of a provider redirect.
    ///
    /// Payment id comes from `payment_id` or `collection_id`. Status precedence is
    /// the forced status of the path, then `status`, then `collection_status`,
    /// then `unknown`.
    pub fn from_redirect(outcome: Option<RedirectOutcome>, params: &BTreeMap<String, String>) -> Self {
        let status = match outcome {
            Some(outcome) => outcome.forced_status(),
            None => param(params, &["status", "collection_status"])
                .map(PaymentStatus::from_provider)
                .unwrap_or_default(),
        };

        Self {
            channel: Channel::Redirect,
            provider_payment_id: param(params, &["payment_id", "collection_id"]).map(String::from),
            status,
            external_reference: param(params, &["external_reference"]).map(String::from),
            merchant_order_id: param(params, &["merchant_order_id"]).map(String::from),
            payment_method: param(params, &["payment_type"]).map(String::from),
            raw_payload: json!(params).to_string(),
        }
    }

    /// Linkage recovered from the external reference, if it parses.
    pub fn linkage(&self) -> Option<PaymentLinkage> {
        self.external_reference
            .as_deref()
            .and_then(PaymentLinkage::from_external_reference)
    }

    /// Record to insert when no payment exists yet for this id. The amount is
    /// not reported by notifications and starts at zero.
    pub fn to_new_payment(&self, provider_payment_id: &str) -> NewPayment {
        NewPayment {
            provider_payment_id: provider_payment_id.to_string(),
            external_reference: self.external_reference.clone(),
            linkage: self.linkage(),
            status: self.status,
            amount: 0.0,
            payment_method: self.payment_method.clone(),
            merchant_order_id: self.merchant_order_id.clone(),
            raw_payload: Some(self.raw_payload.clone()),
        }
    }
}

/// Server-to-server notification from the provider.
#[derive(Debug, Clone, PartialEq)]
pub struct WebhookNotification {
    pub topic: Option<String>,
    pub resource_id: Option<String>,
    pub query: BTreeMap<String, String>,
    pub body: Option<Value>,
}

/// Topic that drives reconciliation. Everything else is acknowledged only.
pub const PAYMENT_TOPIC: &str = "payment";

fn json_str(value: &Value) -> Option<String> {
    match value {
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        Value::Number(n) => Some(n.to_string()),
        _ => None,
    }
}

impl WebhookNotification {
    /// Topic from `topic` or `type`, resource id from `id` or `data.id`. The
    /// query string wins; the JSON body fills in what it lacks, including the
    /// `resource` field of older feeds (a bare id or a URL ending in the id).
    pub fn from_parts(query: BTreeMap<String, String>, body: Option<Value>) -> Self {
        let mut topic = param(&query, &["topic", "type"]).map(String::from);
        let mut resource_id = param(&query, &["id", "data.id"]).map(String::from);

        if let Some(body) = body.as_ref() {
            if topic.is_none() {
                topic = body
                    .get("topic")
                    .or_else(|| body.get("type"))
                    .and_then(json_str);
            }
            if resource_id.is_none() {
                resource_id = body
                    .get("data")
                    .and_then(|d| d.get("id"))
                    .and_then(json_str)
                    .or_else(|| body.get("id").and_then(json_str))
                    .or_else(|| {
                        body.get("resource")
                            .and_then(json_str)
                            .and_then(|r| r.rsplit('/').next().map(String::from))
                            .filter(|r| !r.is_empty())
                    });
            }
        }

        Self {
            topic: topic.map(|t| t.to_ascii_lowercase()),
            resource_id,
            query,
            body,
        }
    }

    pub fn is_payment(&self) -> bool {
        self.topic.as_deref() == Some(PAYMENT_TOPIC)
    }

    /// Convert into a reconcilable notification. `None` for non-payment topics
    /// or when no id can be resolved.
    pub fn into_notification(self) -> Option<Notification> {
        if !self.is_payment() {
            return None;
        }
        let provider_payment_id = self.resource_id.clone()?;

        let raw_payload = json!({ "query": self.query, "body": self.body }).to_string();

        Some(Notification {
            channel: Channel::Webhook,
            provider_payment_id: Some(provider_payment_id),
            status: PaymentStatus::Unknown,
            external_reference: param(&self.query, &["external_reference"]).map(String::from),
            merchant_order_id: None,
            payment_method: None,
            raw_payload,
        })
    }
}
