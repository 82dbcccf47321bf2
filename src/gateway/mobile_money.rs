use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use super::{
    CheckoutSession, GatewayError, PaymentGateway, PaymentStatus, ReturnUrls, WebhookEvent,
    http_client, is_not_found, read_json, signature,
};
use crate::{config::GatewayConfig, models::Order};

/// Chapa-style transaction API. A fresh `tx_ref` is minted per checkout attempt.
pub struct MobileMoneyGateway {
    config: GatewayConfig,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct InitializeRequest<'a> {
    amount: String,
    currency: &'a str,
    email: &'a str,
    first_name: &'a str,
    last_name: &'a str,
    phone_number: &'a str,
    tx_ref: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    callback_url: Option<&'a str>,
    return_url: String,
    customization: Customization,
}

#[derive(Debug, Serialize)]
struct Customization {
    title: String,
    description: String,
}

#[derive(Debug, Deserialize)]
struct ProviderResponse<T> {
    status: String,
    #[serde(default)]
    message: Option<serde_json::Value>,
    data: Option<T>,
}

#[derive(Debug, Deserialize)]
struct InitializeData {
    checkout_url: String,
}

#[derive(Debug, Deserialize)]
struct VerifyData {
    status: String,
}

#[derive(Debug, Deserialize)]
struct WebhookPayload {
    #[serde(default)]
    event: String,
    tx_ref: Option<String>,
    #[serde(default)]
    status: String,
}

impl MobileMoneyGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = http_client(config.timeout)?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_base)
    }

    pub fn new_transaction_reference(order: &Order) -> String {
        format!("mm-{}-{}", order.id.simple(), Utc::now().timestamp_millis())
    }
}

/// Minor units to the provider's decimal major-unit string.
pub fn major_units(amount: i64) -> String {
    format!("{}.{:02}", amount / 100, (amount % 100).abs())
}

fn verification_status(data_status: &str) -> PaymentStatus {
    match data_status {
        "success" => PaymentStatus::Paid,
        "failed" | "cancelled" | "reversed" => PaymentStatus::NotPaid,
        _ => PaymentStatus::Unknown,
    }
}

fn event_outcome(event: &str, status: &str) -> PaymentStatus {
    match (event, status) {
        ("charge.success", "success") => PaymentStatus::Paid,
        ("charge.failed" | "charge.cancelled", _) | (_, "failed") => PaymentStatus::NotPaid,
        _ => PaymentStatus::Unknown,
    }
}

fn message_text(message: &Option<serde_json::Value>) -> String {
    match message {
        Some(serde_json::Value::String(text)) => text.clone(),
        Some(other) => other.to_string(),
        None => "no message".to_string(),
    }
}

#[async_trait]
impl PaymentGateway for MobileMoneyGateway {
    fn name(&self) -> &'static str {
        "mobile-money"
    }

    fn signature_headers(&self) -> &'static [&'static str] {
        &["chapa-signature", "x-chapa-signature"]
    }

    fn return_urls(&self, order: &Order) -> ReturnUrls {
        ReturnUrls::for_order(&self.config.return_url_base, order.id, self.name())
    }

    async fn initiate(
        &self,
        order: &Order,
        urls: &ReturnUrls,
    ) -> Result<CheckoutSession, GatewayError> {
        let tx_ref = Self::new_transaction_reference(order);
        let request = InitializeRequest {
            amount: major_units(order.amount),
            currency: &self.config.currency,
            email: &order.address.email,
            first_name: &order.address.first_name,
            last_name: &order.address.last_name,
            phone_number: &order.address.phone,
            tx_ref: &tx_ref,
            callback_url: self.config.callback_url.as_deref(),
            return_url: format!("{}&tx_ref={tx_ref}", urls.success_url),
            customization: Customization {
                title: "Order Payment".into(),
                description: format!("Payment for order {}", order.id),
            },
        };

        tracing::debug!(order_id = %order.id, tx_ref = %tx_ref, "initializing mobile money transaction");
        let response = self
            .client
            .post(self.url("/v1/transaction/initialize"))
            .bearer_auth(self.config.api_key.reveal())
            .json(&request)
            .send()
            .await?;
        let body: ProviderResponse<InitializeData> = read_json(response).await?;
        match (body.status.as_str(), body.data) {
            ("success", Some(data)) => Ok(CheckoutSession {
                redirect_url: data.checkout_url,
                external_reference: tx_ref,
            }),
            _ => Err(GatewayError::Unavailable(format!(
                "transaction not initialized: {}",
                message_text(&body.message)
            ))),
        }
    }

    async fn verify(&self, external_reference: &str) -> Result<PaymentStatus, GatewayError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/transaction/verify/{external_reference}")))
            .bearer_auth(self.config.api_key.reveal())
            .send()
            .await?;
        // The provider answers 404 for references it never saw a payment for.
        if is_not_found(response.status()) {
            return Ok(PaymentStatus::NotPaid);
        }
        let body: ProviderResponse<VerifyData> = read_json(response).await?;
        if body.status != "success" {
            return Ok(PaymentStatus::Unknown);
        }
        Ok(body
            .data
            .map(|d| verification_status(&d.status))
            .unwrap_or(PaymentStatus::Unknown))
    }

    fn validate_and_parse_webhook(
        &self,
        raw_payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, GatewayError> {
        let sig = signature.ok_or(GatewayError::SignatureInvalid)?;
        signature::verify_hex(
            self.config.webhook_secret.reveal().as_bytes(),
            &[raw_payload],
            sig,
        )?;

        let payload: WebhookPayload = serde_json::from_slice(raw_payload)
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;
        let external_reference = payload
            .tx_ref
            .filter(|r| !r.is_empty())
            .ok_or_else(|| GatewayError::Malformed("webhook has no tx_ref".into()))?;
        Ok(WebhookEvent {
            outcome: event_outcome(&payload.event, &payload.status),
            event_type: payload.event,
            external_reference,
        })
    }
}
