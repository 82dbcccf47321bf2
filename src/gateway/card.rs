use async_trait::async_trait;
use chrono::Utc;
use serde::Deserialize;

use super::{
    CheckoutSession, GatewayError, PaymentGateway, PaymentStatus, ReturnUrls, WebhookEvent,
    http_client, is_not_found, read_json, signature,
};
use crate::{config::GatewayConfig, models::Order};

/// Webhooks older (or newer) than this are treated as replays.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

/// Stripe-style hosted checkout sessions. Webhooks carry `Stripe-Signature: t=<unix>,v1=<hex>`
/// over `"{t}.{body}"`.
pub struct CardGateway {
    config: GatewayConfig,
    client: reqwest::Client,
}

#[derive(Debug, Deserialize)]
struct SessionResponse {
    id: String,
    url: Option<String>,
    payment_status: Option<String>,
}

#[derive(Debug, Deserialize)]
struct EventEnvelope {
    #[serde(rename = "type")]
    event_type: String,
    data: EventData,
}

#[derive(Debug, Deserialize)]
struct EventData {
    object: SessionResponse,
}

impl CardGateway {
    pub fn new(config: GatewayConfig) -> Result<Self, GatewayError> {
        let client = http_client(config.timeout)?;
        Ok(Self { config, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.config.api_base)
    }

    fn session_form(&self, order: &Order, urls: &ReturnUrls) -> Vec<(String, String)> {
        let currency = self.config.currency.to_ascii_lowercase();
        let order_id = order.id.to_string();
        let mut form: Vec<(String, String)> = vec![
            ("mode".into(), "payment".into()),
            ("payment_method_types[0]".into(), "card".into()),
            ("success_url".into(), urls.success_url.clone()),
            ("cancel_url".into(), urls.cancel_url.clone()),
            ("client_reference_id".into(), order_id.clone()),
            ("metadata[order_id]".into(), order_id),
            ("metadata[user_id]".into(), order.user_id.to_string()),
        ];
        if !order.address.email.is_empty() {
            form.push(("customer_email".into(), order.address.email.clone()));
        }

        let mut items_total = 0i64;
        for (idx, item) in order.items.iter().enumerate() {
            let prefix = format!("line_items[{idx}]");
            form.push((format!("{prefix}[price_data][currency]"), currency.clone()));
            form.push((
                format!("{prefix}[price_data][product_data][name]"),
                item.name.clone(),
            ));
            if !item.image.is_empty() {
                form.push((
                    format!("{prefix}[price_data][product_data][images][0]"),
                    item.image.clone(),
                ));
            }
            form.push((
                format!("{prefix}[price_data][unit_amount]"),
                item.unit_price.to_string(),
            ));
            form.push((format!("{prefix}[quantity]"), item.quantity.to_string()));
            items_total = items_total.saturating_add(item.line_total().unwrap_or(0));
        }

        // The delivery line makes the provider total equal the stored order amount.
        let delivery = order.amount - items_total;
        if delivery > 0 {
            let prefix = format!("line_items[{}]", order.items.len());
            form.push((format!("{prefix}[price_data][currency]"), currency));
            form.push((
                format!("{prefix}[price_data][product_data][name]"),
                "Delivery Charges".into(),
            ));
            form.push((format!("{prefix}[price_data][unit_amount]"), delivery.to_string()));
            form.push((format!("{prefix}[quantity]"), "1".into()));
        }
        form
    }
}

/// Checks a `Stripe-Signature` header against `payload` at time `now` (unix seconds).
pub fn verify_signature_header(
    secret: &str,
    payload: &[u8],
    header: &str,
    now: i64,
) -> Result<(), GatewayError> {
    let mut timestamp = None;
    let mut candidates = Vec::new();
    for part in header.split(',') {
        let part = part.trim();
        if let Some(t) = part.strip_prefix("t=") {
            timestamp = Some(t);
        } else if let Some(v) = part.strip_prefix("v1=") {
            candidates.push(v);
        }
    }
    let timestamp = timestamp.ok_or(GatewayError::SignatureInvalid)?;
    if candidates.is_empty() {
        return Err(GatewayError::SignatureInvalid);
    }

    let signed_at: i64 = timestamp.parse().map_err(|_| GatewayError::SignatureInvalid)?;
    if (now - signed_at).abs() > SIGNATURE_TOLERANCE_SECS {
        return Err(GatewayError::SignatureInvalid);
    }

    let parts: [&[u8]; 3] = [timestamp.as_bytes(), b".", payload];
    if candidates
        .iter()
        .any(|sig| signature::verify_hex(secret.as_bytes(), &parts, sig).is_ok())
    {
        Ok(())
    } else {
        Err(GatewayError::SignatureInvalid)
    }
}

fn session_status(payment_status: Option<&str>) -> PaymentStatus {
    match payment_status {
        Some("paid") | Some("no_payment_required") => PaymentStatus::Paid,
        Some("unpaid") => PaymentStatus::NotPaid,
        _ => PaymentStatus::Unknown,
    }
}

fn event_outcome(event_type: &str, payment_status: Option<&str>) -> PaymentStatus {
    match event_type {
        // Delayed payment methods complete the session before the money arrives.
        "checkout.session.completed" => match session_status(payment_status) {
            PaymentStatus::Paid => PaymentStatus::Paid,
            _ => PaymentStatus::Unknown,
        },
        "checkout.session.async_payment_succeeded" => PaymentStatus::Paid,
        "checkout.session.async_payment_failed" | "checkout.session.expired" => {
            PaymentStatus::NotPaid
        }
        _ => PaymentStatus::Unknown,
    }
}

#[async_trait]
impl PaymentGateway for CardGateway {
    fn name(&self) -> &'static str {
        "card"
    }

    fn signature_headers(&self) -> &'static [&'static str] {
        &["stripe-signature"]
    }

    fn return_urls(&self, order: &Order) -> ReturnUrls {
        ReturnUrls::for_order(&self.config.return_url_base, order.id, self.name())
    }

    async fn initiate(
        &self,
        order: &Order,
        urls: &ReturnUrls,
    ) -> Result<CheckoutSession, GatewayError> {
        let form = self.session_form(order, urls);
        tracing::debug!(order_id = %order.id, "creating card checkout session");
        let response = self
            .client
            .post(self.url("/v1/checkout/sessions"))
            .basic_auth(self.config.api_key.reveal(), None::<&str>)
            .form(&form)
            .send()
            .await?;
        let session: SessionResponse = read_json(response).await?;
        let redirect_url = session
            .url
            .ok_or_else(|| GatewayError::Malformed("checkout session has no url".into()))?;
        Ok(CheckoutSession {
            redirect_url,
            external_reference: session.id,
        })
    }

    async fn verify(&self, external_reference: &str) -> Result<PaymentStatus, GatewayError> {
        let response = self
            .client
            .get(self.url(&format!("/v1/checkout/sessions/{external_reference}")))
            .basic_auth(self.config.api_key.reveal(), None::<&str>)
            .send()
            .await?;
        if is_not_found(response.status()) {
            return Ok(PaymentStatus::Unknown);
        }
        let session: SessionResponse = read_json(response).await?;
        Ok(session_status(session.payment_status.as_deref()))
    }

    fn validate_and_parse_webhook(
        &self,
        raw_payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, GatewayError> {
        let header = signature.ok_or(GatewayError::SignatureInvalid)?;
        verify_signature_header(
            self.config.webhook_secret.reveal(),
            raw_payload,
            header,
            Utc::now().timestamp(),
        )?;

        let event: EventEnvelope = serde_json::from_slice(raw_payload)
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;
        let outcome = event_outcome(
            &event.event_type,
            event.data.object.payment_status.as_deref(),
        );
        Ok(WebhookEvent {
            event_type: event.event_type,
            external_reference: event.data.object.id,
            outcome,
        })
    }
}
