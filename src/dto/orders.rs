use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::models::{Address, Order, OrderStatus, PaymentMethod};

#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderItemRequest {
    pub product_id: Uuid,
    #[serde(default)]
    pub size: Option<String>,
    pub quantity: i32,
}

/// Checkout payload. Prices are never taken from the client; they come from the catalogue.
#[derive(Debug, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct CreateOrderRequest {
    pub items: Vec<OrderItemRequest>,
    pub address: Address,
    pub payment_method: PaymentMethod,
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct PlaceOrderResponse {
    pub order_id: Uuid,
    pub status: OrderStatus,
    pub amount: i64,
    pub payment_method: PaymentMethod,
    /// Hosted checkout to send the customer to. Absent for cash on delivery.
    pub redirect_url: Option<String>,
}

impl PlaceOrderResponse {
    pub fn new(order: &Order, redirect_url: Option<String>) -> Self {
        Self {
            order_id: order.id,
            status: order.status,
            amount: order.amount,
            payment_method: order.payment_method,
            redirect_url,
        }
    }
}

/// An order as shown to customers and admins, with the derived paid flag.
#[derive(Debug, Serialize, Deserialize, ToSchema)]
#[serde(rename_all = "camelCase")]
pub struct OrderView {
    #[serde(flatten)]
    pub order: Order,
    pub is_paid: bool,
}

impl From<Order> for OrderView {
    fn from(order: Order) -> Self {
        let is_paid = order.is_paid();
        Self { order, is_paid }
    }
}

#[derive(Debug, Serialize, Deserialize, ToSchema)]
pub struct OrderList {
    pub items: Vec<OrderView>,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: String,
}
