#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::http::{HeaderMap, HeaderValue};
use chrono::Utc;
use jsonwebtoken::{EncodingKey, Header, encode};
use parking_lot::Mutex;
use serde::Deserialize;
use storefront_orders::{
    config::{CheckoutSettings, Secret},
    dto::{
        auth::Claims,
        orders::{CreateOrderRequest, OrderItemRequest},
    },
    gateway::{
        CheckoutSession, GatewayError, Gateways, PaymentGateway, PaymentStatus, ReturnUrls,
        WebhookEvent, signature,
    },
    middleware::auth::{AuthUser, Role},
    models::{Address, Order, PaymentMethod},
    services::{
        cart_service::{CartLine, MemoryCart},
        catalog_service::{MemoryCatalog, ProductSnapshot},
    },
    state::AppState,
    store::{MemoryOrderStore, OrderStore},
};
use uuid::Uuid;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const WEBHOOK_SECRET: &str = "test-webhook-secret";
pub const SIGNATURE_HEADER: &str = "x-test-signature";
pub const DELIVERY_CHARGE: i64 = 10;
pub const SHIRT_PRICE: i64 = 100;

#[derive(Deserialize)]
struct FakeWebhook {
    reference: String,
    status: String,
}

/// Scriptable provider: answers verifications from a per-reference table and signs webhooks
/// with a shared secret.
pub struct FakeGateway {
    name: &'static str,
    sessions: AtomicUsize,
    verify_calls: AtomicUsize,
    initiate_down: AtomicBool,
    verify_down: AtomicBool,
    verify_delay: Mutex<Option<Duration>>,
    statuses: Mutex<HashMap<String, PaymentStatus>>,
}

impl FakeGateway {
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            sessions: AtomicUsize::new(0),
            verify_calls: AtomicUsize::new(0),
            initiate_down: AtomicBool::new(false),
            verify_down: AtomicBool::new(false),
            verify_delay: Mutex::new(None),
            statuses: Mutex::new(HashMap::new()),
        }
    }

    pub fn set_status(&self, reference: &str, status: PaymentStatus) {
        self.statuses.lock().insert(reference.to_string(), status);
    }

    pub fn set_initiate_down(&self, down: bool) {
        self.initiate_down.store(down, Ordering::SeqCst);
    }

    pub fn set_verify_down(&self, down: bool) {
        self.verify_down.store(down, Ordering::SeqCst);
    }

    pub fn set_verify_delay(&self, delay: Duration) {
        *self.verify_delay.lock() = Some(delay);
    }

    pub fn verify_calls(&self) -> usize {
        self.verify_calls.load(Ordering::SeqCst)
    }

    pub fn sessions_opened(&self) -> usize {
        self.sessions.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PaymentGateway for FakeGateway {
    fn name(&self) -> &'static str {
        self.name
    }

    fn signature_headers(&self) -> &'static [&'static str] {
        &[SIGNATURE_HEADER]
    }

    fn return_urls(&self, order: &Order) -> ReturnUrls {
        ReturnUrls::for_order("https://shop.test", order.id, self.name)
    }

    async fn initiate(
        &self,
        order: &Order,
        _urls: &ReturnUrls,
    ) -> Result<CheckoutSession, GatewayError> {
        if self.initiate_down.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("provider down".into()));
        }
        assert!(order.amount > 0);
        let n = self.sessions.fetch_add(1, Ordering::SeqCst) + 1;
        let reference = format!("{}-{}-{n}", self.name, order.id.simple());
        Ok(CheckoutSession {
            redirect_url: format!("https://pay.test/{reference}"),
            external_reference: reference,
        })
    }

    async fn verify(&self, external_reference: &str) -> Result<PaymentStatus, GatewayError> {
        self.verify_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.verify_delay.lock();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if self.verify_down.load(Ordering::SeqCst) {
            return Err(GatewayError::Unavailable("verification timed out".into()));
        }
        Ok(self
            .statuses
            .lock()
            .get(external_reference)
            .copied()
            .unwrap_or(PaymentStatus::Unknown))
    }

    fn validate_and_parse_webhook(
        &self,
        raw_payload: &[u8],
        signature: Option<&str>,
    ) -> Result<WebhookEvent, GatewayError> {
        let sig = signature.ok_or(GatewayError::SignatureInvalid)?;
        signature::verify_hex(WEBHOOK_SECRET.as_bytes(), &[raw_payload], sig)?;
        let payload: FakeWebhook = serde_json::from_slice(raw_payload)
            .map_err(|e| GatewayError::Malformed(e.to_string()))?;
        let outcome = match payload.status.as_str() {
            "paid" => PaymentStatus::Paid,
            "failed" => PaymentStatus::NotPaid,
            _ => PaymentStatus::Unknown,
        };
        Ok(WebhookEvent {
            event_type: format!("payment.{}", payload.status),
            external_reference: payload.reference,
            outcome,
        })
    }
}

pub struct TestApp {
    pub state: AppState,
    pub store: Arc<MemoryOrderStore>,
    pub catalog: Arc<MemoryCatalog>,
    pub carts: Arc<MemoryCart>,
    pub card: Arc<FakeGateway>,
    pub mobile_money: Arc<FakeGateway>,
    pub shirt: Uuid,
    pub jacket: Uuid,
}

impl TestApp {
    pub fn new() -> Self {
        Self::with_store(Arc::new(MemoryOrderStore::new()))
    }

    fn with_store(store: Arc<MemoryOrderStore>) -> Self {
        let catalog = Arc::new(MemoryCatalog::new());
        let shirt = Uuid::new_v4();
        let jacket = Uuid::new_v4();
        catalog.insert(ProductSnapshot {
            id: shirt,
            name: "Classic White T-Shirt".into(),
            price: SHIRT_PRICE,
            image: "/images/tshirt.png".into(),
        });
        catalog.insert(ProductSnapshot {
            id: jacket,
            name: "Denim Jacket".into(),
            price: 450,
            image: "/images/jacket.png".into(),
        });

        let carts = Arc::new(MemoryCart::new());
        let card = Arc::new(FakeGateway::new("card"));
        let mobile_money = Arc::new(FakeGateway::new("mobile-money"));

        let state = AppState::new(
            store.clone() as Arc<dyn OrderStore>,
            catalog.clone(),
            carts.clone(),
            Gateways::new(card.clone(), mobile_money.clone()),
            CheckoutSettings {
                delivery_charge: DELIVERY_CHARGE,
                currency: "ETB".into(),
            },
            Secret::new(JWT_SECRET.to_string()),
        );

        Self {
            state,
            store,
            catalog,
            carts,
            card,
            mobile_money,
            shirt,
            jacket,
        }
    }

    /// Two shirts in the customer's cart, matching `shirts_order`.
    pub fn fill_cart(&self, user: &AuthUser) {
        self.carts.add(
            user.user_id,
            CartLine {
                product_id: self.shirt,
                size: "M".into(),
                quantity: 2,
            },
        );
    }

    pub fn shirts_order(&self, method: PaymentMethod) -> CreateOrderRequest {
        CreateOrderRequest {
            items: vec![OrderItemRequest {
                product_id: self.shirt,
                size: Some("M".into()),
                quantity: 2,
            }],
            address: address(),
            payment_method: method,
        }
    }
}

pub fn customer() -> AuthUser {
    AuthUser {
        user_id: Uuid::new_v4(),
        role: Role::Customer,
    }
}

pub fn admin() -> AuthUser {
    AuthUser {
        user_id: Uuid::new_v4(),
        role: Role::Admin,
    }
}

pub fn address() -> Address {
    Address {
        first_name: "Sara".into(),
        last_name: "Tesfaye".into(),
        email: "sara@example.com".into(),
        street: "Churchill Ave 12".into(),
        city: "Addis Ababa".into(),
        region: "Addis Ababa".into(),
        zipcode: "1000".into(),
        country: "Ethiopia".into(),
        phone: "0911223344".into(),
    }
}

pub fn token(user: &AuthUser) -> String {
    let claims = Claims {
        sub: user.user_id.to_string(),
        role: user.role.as_str().to_string(),
        exp: (Utc::now().timestamp() + 3600) as usize,
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(JWT_SECRET.as_bytes()),
    )
    .expect("token")
}

pub fn webhook_body(reference: &str, status: &str) -> Vec<u8> {
    serde_json::json!({ "reference": reference, "status": status })
        .to_string()
        .into_bytes()
}

pub fn signed_headers(body: &[u8]) -> HeaderMap {
    let sig = signature::sign_hex(WEBHOOK_SECRET.as_bytes(), &[body]).expect("sign");
    let mut headers = HeaderMap::new();
    headers.insert(SIGNATURE_HEADER, HeaderValue::from_str(&sig).expect("header"));
    headers
}
