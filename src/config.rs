use std::{env, fmt, time::Duration};

use anyhow::Context;

/// Wrapper that keeps credentials out of logs and debug output.
#[derive(Clone, Default, PartialEq, Eq)]
pub struct Secret<T>(T);

impl<T> Secret<T> {
    pub fn new(value: T) -> Self {
        Self(value)
    }

    pub fn reveal(&self) -> &T {
        &self.0
    }
}

impl<T> fmt::Debug for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

impl<T> fmt::Display for Secret<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("****")
    }
}

/// Settings handed to a single payment gateway adapter at construction.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    pub api_key: Secret<String>,
    pub webhook_secret: Secret<String>,
    /// Storefront origin the customer is sent back to after the hosted checkout.
    pub return_url_base: String,
    pub api_base: String,
    /// Where the provider should push asynchronous notifications, if it supports it.
    pub callback_url: Option<String>,
    pub timeout: Duration,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    /// Flat delivery charge in minor units, added once per order.
    pub delivery_charge: i64,
    pub currency: String,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_url: String,
    pub host: String,
    pub port: u16,
    pub jwt_secret: Secret<String>,
    pub checkout: CheckoutSettings,
    pub card_gateway: GatewayConfig,
    pub mobile_money_gateway: GatewayConfig,
}

const DEFAULT_STOREFRONT_URL: &str = "http://localhost:3000";
const DEFAULT_PUBLIC_API_URL: &str = "http://localhost:3000";
const DEFAULT_CARD_API_BASE: &str = "https://api.stripe.com";
const DEFAULT_MOBILE_MONEY_API_BASE: &str = "https://api.chapa.co";

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        Self::from_vars(|key| env::var(key).ok())
    }

    pub fn from_vars<F>(var: F) -> anyhow::Result<Self>
    where
        F: Fn(&str) -> Option<String>,
    {
        let database_url = var("DATABASE_URL").context("DATABASE_URL is not set")?;
        let jwt_secret = var("JWT_SECRET").context("JWT_SECRET is not set")?;
        let host = var("APP_HOST").unwrap_or_else(|| "127.0.0.1".to_string());
        let port = var("APP_PORT")
            .and_then(|p| p.parse::<u16>().ok())
            .unwrap_or(3000);

        let currency = var("CURRENCY").unwrap_or_else(|| "ETB".to_string());
        let delivery_charge = match var("DELIVERY_CHARGE") {
            Some(raw) => raw
                .parse::<i64>()
                .ok()
                .filter(|c| *c >= 0)
                .with_context(|| format!("DELIVERY_CHARGE must be a non-negative integer, got {raw}"))?,
            None => 1000,
        };
        let timeout = Duration::from_millis(
            var("GATEWAY_TIMEOUT_MS")
                .and_then(|t| t.parse::<u64>().ok())
                .filter(|t| *t > 0)
                .unwrap_or(15_000),
        );

        let storefront_url = trim_base(var("STOREFRONT_URL"), DEFAULT_STOREFRONT_URL);
        let public_api_url = trim_base(var("PUBLIC_API_URL"), DEFAULT_PUBLIC_API_URL);

        let card_gateway = GatewayConfig {
            api_key: Secret::new(required_or_warn(&var, "CARD_GATEWAY_API_KEY")),
            webhook_secret: Secret::new(required_or_warn(&var, "CARD_GATEWAY_WEBHOOK_SECRET")),
            return_url_base: storefront_url.clone(),
            api_base: trim_base(var("CARD_GATEWAY_API_BASE"), DEFAULT_CARD_API_BASE),
            // Card provider webhooks are registered in the provider dashboard.
            callback_url: None,
            timeout,
            currency: currency.clone(),
        };
        let mobile_money_gateway = GatewayConfig {
            api_key: Secret::new(required_or_warn(&var, "MOBILE_MONEY_API_KEY")),
            webhook_secret: Secret::new(required_or_warn(&var, "MOBILE_MONEY_WEBHOOK_SECRET")),
            return_url_base: storefront_url,
            api_base: trim_base(var("MOBILE_MONEY_API_BASE"), DEFAULT_MOBILE_MONEY_API_BASE),
            callback_url: Some(format!("{public_api_url}/api/payments/webhooks/mobile-money")),
            timeout,
            currency: currency.clone(),
        };

        Ok(Self {
            database_url,
            host,
            port,
            jwt_secret: Secret::new(jwt_secret),
            checkout: CheckoutSettings {
                delivery_charge,
                currency,
            },
            card_gateway,
            mobile_money_gateway,
        })
    }
}

fn trim_base(value: Option<String>, default: &str) -> String {
    value
        .unwrap_or_else(|| default.to_string())
        .trim_end_matches('/')
        .to_string()
}

fn required_or_warn<F>(var: &F, key: &str) -> String
where
    F: Fn(&str) -> Option<String>,
{
    var(key).unwrap_or_else(|| {
        tracing::warn!("{key} not set, payments through this gateway will fail");
        String::new()
    })
}
