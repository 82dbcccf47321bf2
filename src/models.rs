use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum PaymentMethod {
    #[serde(rename = "COD", alias = "cod")]
    Cod,
    // Aliases accept the gateway slugs storefront clients send at checkout.
    #[serde(alias = "card", alias = "stripe")]
    CardGateway,
    #[serde(alias = "mobile-money", alias = "chapa")]
    MobileMoneyGateway,
}

impl PaymentMethod {
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentMethod::Cod => "COD",
            PaymentMethod::CardGateway => "CardGateway",
            PaymentMethod::MobileMoneyGateway => "MobileMoneyGateway",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "COD" => Some(PaymentMethod::Cod),
            "CardGateway" => Some(PaymentMethod::CardGateway),
            "MobileMoneyGateway" => Some(PaymentMethod::MobileMoneyGateway),
            _ => None,
        }
    }

    pub fn is_gateway(&self) -> bool {
        !matches!(self, PaymentMethod::Cod)
    }

    /// COD orders skip `PaymentPending`: cash is collected on delivery.
    pub fn initial_status(&self) -> OrderStatus {
        match self {
            PaymentMethod::Cod => OrderStatus::OrderPlaced,
            PaymentMethod::CardGateway | PaymentMethod::MobileMoneyGateway => {
                OrderStatus::PaymentPending
            }
        }
    }
}

impl fmt::Display for PaymentMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, ToSchema)]
pub enum OrderStatus {
    #[serde(rename = "Payment Pending")]
    PaymentPending,
    #[serde(rename = "Order Placed")]
    OrderPlaced,
    Processing,
    Shipped,
    Delivered,
    Cancelled,
}

impl OrderStatus {
    pub const ALL: [OrderStatus; 6] = [
        OrderStatus::PaymentPending,
        OrderStatus::OrderPlaced,
        OrderStatus::Processing,
        OrderStatus::Shipped,
        OrderStatus::Delivered,
        OrderStatus::Cancelled,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            OrderStatus::PaymentPending => "Payment Pending",
            OrderStatus::OrderPlaced => "Order Placed",
            OrderStatus::Processing => "Processing",
            OrderStatus::Shipped => "Shipped",
            OrderStatus::Delivered => "Delivered",
            OrderStatus::Cancelled => "Cancelled",
        }
    }

    pub fn parse(value: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.as_str() == value)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, OrderStatus::Delivered | OrderStatus::Cancelled)
    }

    // Position on the fulfilment chain. `PaymentPending` and `Cancelled` sit outside it.
    fn fulfilment_rank(&self) -> Option<u8> {
        match self {
            OrderStatus::OrderPlaced => Some(0),
            OrderStatus::Processing => Some(1),
            OrderStatus::Shipped => Some(2),
            OrderStatus::Delivered => Some(3),
            OrderStatus::PaymentPending | OrderStatus::Cancelled => None,
        }
    }

    /// Transitions an administrator may request.
    ///
    /// Forward along `OrderPlaced → Processing → Shipped → Delivered` (skipping ahead is allowed),
    /// or to `Cancelled` from any non-terminal state. Leaving `PaymentPending` any other way is
    /// reserved for payment confirmation.
    pub fn admin_can_move_to(&self, next: OrderStatus) -> bool {
        if self.is_terminal() {
            return false;
        }
        if next == OrderStatus::Cancelled {
            return true;
        }
        match (self.fulfilment_rank(), next.fulfilment_rank()) {
            (Some(current), Some(target)) => target > current,
            _ => false,
        }
    }
}

impl fmt::Display for OrderStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Line item snapshot. Name and price are copied from the catalog when the order is created
/// and never re-read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct LineItem {
    pub product_id: Uuid,
    pub name: String,
    pub unit_price: i64,
    pub size: String,
    pub quantity: i32,
    pub image: String,
}

impl LineItem {
    pub fn line_total(&self) -> Option<i64> {
        self.unit_price.checked_mul(i64::from(self.quantity))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase", default)]
pub struct Address {
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub street: String,
    pub city: String,
    pub region: String,
    pub zipcode: String,
    pub country: String,
    pub phone: String,
}

impl Address {
    pub fn validate(&self) -> Result<(), String> {
        let required = [
            ("firstName", &self.first_name),
            ("lastName", &self.last_name),
            ("email", &self.email),
            ("street", &self.street),
            ("city", &self.city),
            ("country", &self.country),
            ("phone", &self.phone),
        ];
        if let Some((field, _)) = required.iter().find(|(_, v)| v.trim().is_empty()) {
            return Err(format!("address.{field} is required"));
        }
        match self.email.split_once('@') {
            Some((local, domain)) if !local.is_empty() && domain.contains('.') => Ok(()),
            _ => Err("address.email is malformed".to_string()),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct Order {
    pub id: Uuid,
    pub user_id: Uuid,
    pub items: Vec<LineItem>,
    pub address: Address,
    pub amount: i64,
    pub payment_method: PaymentMethod,
    pub payment_confirmed: bool,
    pub status: OrderStatus,
    pub external_reference: Option<String>,
    pub paid_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    /// Whether the order counts as paid for display and reporting.
    ///
    /// COD payment is never confirmed electronically; it is inferred once the order is delivered.
    pub fn is_paid(&self) -> bool {
        self.payment_confirmed
            || (self.payment_method == PaymentMethod::Cod && self.status == OrderStatus::Delivered)
    }
}

/// Sum of line totals plus the delivery charge, or `None` on overflow.
pub fn order_amount(items: &[LineItem], delivery_charge: i64) -> Option<i64> {
    items
        .iter()
        .try_fold(delivery_charge, |acc, item| acc.checked_add(item.line_total()?))
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderStats {
    pub total_orders: i64,
    pub delivered_orders: i64,
    pub total_sales: i64,
}
