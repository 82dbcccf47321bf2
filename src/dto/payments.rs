use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::{
    dto::orders::OrderView,
    error::{AppError, AppResult},
};

/// Query flags the storefront forwards after a hosted checkout returns.
///
/// Some providers HTML-escape the separators of the return URL they were given, so keys can
/// arrive as `amp;orderId`. Those are folded back onto the plain key.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProviderFlags {
    pub order_id: Option<Uuid>,
    pub gateway: Option<String>,
    pub success: Option<bool>,
    pub reference: Option<String>,
}

impl ProviderFlags {
    pub fn from_pairs<I>(pairs: I) -> AppResult<Self>
    where
        I: IntoIterator<Item = (String, String)>,
    {
        let mut flags = ProviderFlags::default();
        for (key, value) in pairs {
            let key = key.trim_start_matches("amp;");
            let value = value.trim();
            if value.is_empty() {
                continue;
            }
            match key {
                "orderId" | "order_id" => {
                    let id = Uuid::parse_str(value)
                        .map_err(|_| AppError::BadRequest("Invalid orderId".into()))?;
                    flags.order_id = Some(id);
                }
                "gateway" => flags.gateway = Some(value.to_string()),
                "success" => flags.success = Some(value.eq_ignore_ascii_case("true")),
                // Providers name the reference differently on the way back.
                "tx_ref" | "trx_ref" | "transaction_id" | "session_id" => {
                    if flags.reference.is_none() {
                        flags.reference = Some(value.to_string());
                    }
                }
                _ => {}
            }
        }
        Ok(flags)
    }

    pub fn from_query(query: HashMap<String, String>) -> AppResult<Self> {
        Self::from_pairs(query)
    }

    pub fn from_json(body: HashMap<String, serde_json::Value>) -> AppResult<Self> {
        Self::from_pairs(body.into_iter().map(|(k, v)| {
            let v = match v {
                serde_json::Value::String(s) => s,
                serde_json::Value::Null => String::new(),
                other => other.to_string(),
            };
            (k, v)
        }))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConfirmOutcome {
    /// This call moved the order to paid.
    Confirmed,
    AlreadyConfirmed,
    NotPaid,
    /// The provider could not say either way yet.
    Undetermined,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PaymentVerification {
    pub outcome: ConfirmOutcome,
    pub order: OrderView,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct WebhookAck {
    pub received: bool,
    /// True only when this notification moved the order to paid.
    pub applied: bool,
}
