use std::sync::Arc;

use async_trait::async_trait;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize, de::DeserializeOwned};
use thiserror::Error;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Order, PaymentMethod};

pub mod card;
pub mod mobile_money;
pub mod signature;

pub use card::CardGateway;
pub use mobile_money::MobileMoneyGateway;

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("provider unreachable: {0}")]
    Unavailable(String),

    #[error("webhook signature rejected")]
    SignatureInvalid,

    #[error("unexpected provider payload: {0}")]
    Malformed(String),
}

impl From<reqwest::Error> for GatewayError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            GatewayError::Unavailable(format!("request timed out: {err}"))
        } else if err.is_decode() {
            GatewayError::Malformed(err.to_string())
        } else {
            GatewayError::Unavailable(err.to_string())
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub enum PaymentStatus {
    Paid,
    NotPaid,
    Unknown,
}

/// A hosted checkout the customer is redirected to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CheckoutSession {
    pub redirect_url: String,
    pub external_reference: String,
}

/// Where the provider sends the customer back to once the hosted checkout ends.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReturnUrls {
    pub success_url: String,
    pub cancel_url: String,
}

impl ReturnUrls {
    pub fn for_order(base: &str, order_id: Uuid, gateway: &str) -> Self {
        let base = base.trim_end_matches('/');
        Self {
            success_url: format!("{base}/verify?success=true&orderId={order_id}&gateway={gateway}"),
            cancel_url: format!("{base}/verify?success=false&orderId={order_id}&gateway={gateway}"),
        }
    }
}

/// An authenticated provider notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WebhookEvent {
    pub event_type: String,
    pub external_reference: String,
    pub outcome: PaymentStatus,
}

/// A hosted-checkout provider. Provider error types stay behind [`GatewayError`].
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Short identifier used in return URLs and logs.
    fn name(&self) -> &'static str;

    /// Request headers that may carry the webhook signature, in order of preference.
    fn signature_headers(&self) -> &'static [&'static str];

    fn return_urls(&self, order: &Order) -> ReturnUrls;

    /// Opens a hosted checkout for `order.amount`, tagged with the order id.
    async fn initiate(
        &self,
        order: &Order,
        urls: &ReturnUrls,
    ) -> Result<CheckoutSession, GatewayError>;

    async fn verify(&self, external_reference: &str) -> Result<PaymentStatus, GatewayError>;

    /// Authenticates `raw_payload` against `signature` before reading anything out of it.
    fn validate_and_parse_webhook(
        &self,
        raw_payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, GatewayError>;
}

/// The adapters available to the coordinator, one per gateway payment method.
#[derive(Clone)]
pub struct Gateways {
    card: Arc<dyn PaymentGateway>,
    mobile_money: Arc<dyn PaymentGateway>,
}

impl Gateways {
    pub fn new(card: Arc<dyn PaymentGateway>, mobile_money: Arc<dyn PaymentGateway>) -> Self {
        Self { card, mobile_money }
    }

    pub fn for_method(&self, method: PaymentMethod) -> Option<&Arc<dyn PaymentGateway>> {
        match method {
            PaymentMethod::Cod => None,
            PaymentMethod::CardGateway => Some(&self.card),
            PaymentMethod::MobileMoneyGateway => Some(&self.mobile_money),
        }
    }
}

/// Maps the `gateway` flag of a redirect-return URL to the payment method it belongs to.
/// Accepts both our own slugs and the provider names older storefront builds used.
pub fn method_for_slug(slug: &str) -> Option<PaymentMethod> {
    match slug.trim().to_ascii_lowercase().as_str() {
        "card" | "stripe" => Some(PaymentMethod::CardGateway),
        "mobile-money" | "mobile_money" | "chapa" => Some(PaymentMethod::MobileMoneyGateway),
        _ => None,
    }
}

pub(crate) fn http_client(timeout: std::time::Duration) -> Result<reqwest::Client, GatewayError> {
    reqwest::Client::builder()
        .use_rustls_tls()
        .timeout(timeout)
        .build()
        .map_err(|e| GatewayError::Unavailable(format!("could not build http client: {e}")))
}

/// Decodes a successful JSON body, or turns a failed response into an error.
pub(crate) async fn read_json<T: DeserializeOwned>(
    response: reqwest::Response,
) -> Result<T, GatewayError> {
    let status = response.status();
    if status.is_success() {
        return response
            .json::<T>()
            .await
            .map_err(|e| GatewayError::Malformed(e.to_string()));
    }
    let body = response.text().await.unwrap_or_default();
    Err(GatewayError::Unavailable(format!(
        "provider returned {}: {}",
        status.as_u16(),
        truncate(&body, 200)
    )))
}

pub(crate) fn is_not_found(status: StatusCode) -> bool {
    status == StatusCode::NOT_FOUND
}

fn truncate(value: &str, max: usize) -> &str {
    match value.char_indices().nth(max) {
        Some((idx, _)) => &value[..idx],
        None => value,
    }
}
