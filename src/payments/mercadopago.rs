use hmac::{Hmac, Mac};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use serde_json::json;
use sha2::Sha256;
use subtle::ConstantTimeEq;

use crate::error::{AppError, Result, msg};
use crate::models::PaymentLinkage;

type HmacSha256 = Hmac<Sha256>;

/// Checkout currency. The storefront only sells in pesos.
pub const CURRENCY_ID: &str = "ARS";

/// Redirect paths the provider sends the buyer back to.
pub const BACK_PATHS: [&str; 3] = ["success", "failure", "pending"];

/// Checkout request for one course.
#[derive(Debug, Clone, Deserialize)]
pub struct PreferenceRequest {
    pub username: String,
    pub email: String,
    pub curso_titulo: String,
    pub precio: f64,
    pub cantidad: u32,
    pub user_id: i64,
    pub curso_id: i64,
}

impl PreferenceRequest {
    pub fn validate(&self) -> Result<()> {
        if self.curso_titulo.trim().is_empty() {
            return Err(AppError::BadRequest("curso_titulo cannot be empty".into()));
        }
        if !self.precio.is_finite() || self.precio <= 0.0 {
            return Err(AppError::BadRequest("precio must be greater than zero".into()));
        }
        if self.cantidad == 0 {
            return Err(AppError::BadRequest("cantidad must be at least 1".into()));
        }
        Ok(())
    }

    pub fn linkage(&self) -> PaymentLinkage {
        PaymentLinkage {
            user_id: self.user_id,
            course_id: self.curso_id,
        }
    }
}

/// Checkout session created by the provider.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckoutPreference {
    pub id: String,
    pub init_point: Option<String>,
    pub sandbox_init_point: Option<String>,
}

#[derive(Debug, Clone)]
pub struct MercadoPagoClient {
    client: Client,
    access_token: String,
    api_url: String,
    /// Public URL of this server, for back URLs and the notification URL
    base_url: String,
    webhook_secret: Option<String>,
}

impl MercadoPagoClient {
    pub fn new(
        access_token: &str,
        api_url: &str,
        base_url: &str,
        webhook_secret: Option<String>,
    ) -> Self {
        Self {
            client: Client::new(),
            access_token: access_token.to_string(),
            api_url: api_url.trim_end_matches('/').to_string(),
            base_url: base_url.trim_end_matches('/').to_string(),
            webhook_secret,
        }
    }

    pub fn webhook_secret_configured(&self) -> bool {
        self.webhook_secret.is_some()
    }

    pub fn notification_url(&self) -> String {
        format!("{}/mp/webhook", self.base_url)
    }

    /// Request body for `POST /checkout/preferences`.
    pub fn preference_body(&self, req: &PreferenceRequest) -> serde_json::Value {
        let back_url = |path: &str| format!("{}/mp/{}", self.base_url, path);

        json!({
            "items": [{
                "id": req.curso_id.to_string(),
                "title": format!("{} comprado por {}", req.curso_titulo, req.username),
                "quantity": req.cantidad,
                "unit_price": req.precio,
                "currency_id": CURRENCY_ID,
            }],
            "payer": {
                "name": req.username,
                "email": req.email,
            },
            "back_urls": {
                "success": back_url(BACK_PATHS[0]),
                "failure": back_url(BACK_PATHS[1]),
                "pending": back_url(BACK_PATHS[2]),
            },
            "auto_return": "approved",
            "external_reference": req.linkage().external_reference(),
            "notification_url": self.notification_url(),
        })
    }

    /// Create a checkout preference. Any transport error or non-2xx answer is
    /// an upstream failure.
    pub async fn create_preference(&self, req: &PreferenceRequest) -> Result<CheckoutPreference> {
        let response = self
            .client
            .post(format!("{}/checkout/preferences", self.api_url))
            .bearer_auth(&self.access_token)
            .json(&self.preference_body(req))
            .send()
            .await
            .map_err(|e| AppError::Upstream(format!("Mercado Pago API error: {}", e)))?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            return Err(AppError::Upstream(format!(
                "Mercado Pago API error ({}): {}",
                status, error_text
            )));
        }

        response.json().await.map_err(|e| {
            AppError::Upstream(format!("Failed to parse Mercado Pago response: {}", e))
        })
    }

    /// Maximum age of a webhook signature timestamp, in seconds.
    const WEBHOOK_TIMESTAMP_TOLERANCE_SECS: i64 = 300;

    /// Verify an `x-signature: ts=<ts>,v1=<hex>` header.
    ///
    /// The signed manifest is `id:<data.id>;request-id:<x-request-id>;ts:<ts>;`,
    /// with segments whose value is missing left out. Returns `Ok(true)` when no
    /// secret is configured.
    pub fn verify_webhook_signature(
        &self,
        data_id: Option<&str>,
        request_id: Option<&str>,
        signature: &str,
    ) -> Result<bool> {
        let Some(secret) = self.webhook_secret.as_deref() else {
            return Ok(true);
        };

        let mut ts = None;
        let mut sig_v1 = None;
        for part in signature.split(',') {
            let part = part.trim();
            if let Some(t) = part.strip_prefix("ts=") {
                ts = Some(t);
            } else if let Some(s) = part.strip_prefix("v1=") {
                sig_v1 = Some(s);
            }
        }

        let ts = ts.ok_or_else(|| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;
        let sig_v1 =
            sig_v1.ok_or_else(|| AppError::BadRequest(msg::INVALID_SIGNATURE_FORMAT.into()))?;

        let ts_value: i64 = ts
            .parse()
            .map_err(|_| AppError::BadRequest(msg::INVALID_TIMESTAMP_IN_SIGNATURE.into()))?;
        // Millisecond timestamps are accepted too
        let ts_secs = if ts_value > 1_000_000_000_000 {
            ts_value / 1000
        } else {
            ts_value
        };

        let age = chrono::Utc::now().timestamp() - ts_secs;
        if age > Self::WEBHOOK_TIMESTAMP_TOLERANCE_SECS || age < -60 {
            tracing::warn!("Mercado Pago webhook rejected: timestamp out of range (age={}s)", age);
            return Ok(false);
        }

        let mut manifest = String::new();
        if let Some(id) = data_id.filter(|s| !s.is_empty()) {
            manifest.push_str(&format!("id:{};", id.to_lowercase()));
        }
        if let Some(request_id) = request_id.filter(|s| !s.is_empty()) {
            manifest.push_str(&format!("request-id:{};", request_id));
        }
        manifest.push_str(&format!("ts:{};", ts));

        let expected = sign_manifest(secret, &manifest)?;
        let expected_bytes = expected.as_bytes();
        let provided_bytes = sig_v1.as_bytes();

        // Signature length is not secret
        if expected_bytes.len() != provided_bytes.len() {
            return Ok(false);
        }

        Ok(expected_bytes.ct_eq(provided_bytes).into())
    }
}

/// Hex HMAC-SHA256 of a webhook manifest.
pub fn sign_manifest(secret: &str, manifest: &str) -> Result<String> {
    let mut mac = HmacSha256::new_from_slice(secret.as_bytes())
        .map_err(|_| AppError::Internal(msg::INVALID_WEBHOOK_SECRET.into()))?;
    mac.update(manifest.as_bytes());
    Ok(hex::encode(mac.finalize().into_bytes()))
}
