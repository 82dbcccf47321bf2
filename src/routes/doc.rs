use utoipa::{
    Modify, OpenApi,
    openapi::{
        self,
        OpenApi as OpenApiSpec,
        security::{HttpAuthScheme, HttpBuilder, SecurityScheme},
    },
};
use utoipa_scalar::{Scalar, Servable};

use crate::{
    dto::{
        orders::{
            CreateOrderRequest, OrderItemRequest, OrderList, OrderView, PlaceOrderResponse,
            UpdateOrderStatusRequest,
        },
        payments::{ConfirmOutcome, PaymentVerification, WebhookAck},
    },
    models::{Address, LineItem, Order, OrderStats, OrderStatus, PaymentMethod},
    response::Meta,
    routes::{admin, health, orders, params, payments},
};

struct SecurityAddon;

impl Modify for SecurityAddon {
    fn modify(&self, openapi: &mut openapi::OpenApi) {
        let components = openapi.components.get_or_insert_with(Default::default);
        components.add_security_scheme(
            "bearer_auth",
            SecurityScheme::Http(
                HttpBuilder::new()
                    .scheme(HttpAuthScheme::Bearer)
                    .bearer_format("JWT")
                    .build(),
            ),
        );
    }
}

#[derive(OpenApi)]
#[openapi(
    paths(
        health::health_check,
        orders::list_orders,
        orders::place_order,
        orders::get_order,
        orders::retry_checkout,
        payments::verify_from_query,
        payments::verify_from_body,
        payments::card_webhook,
        payments::mobile_money_webhook,
        admin::list_all_orders,
        admin::order_stats,
        admin::get_order_admin,
        admin::update_order_status
    ),
    components(
        schemas(
            Order,
            LineItem,
            Address,
            OrderStatus,
            PaymentMethod,
            OrderStats,
            OrderView,
            OrderList,
            CreateOrderRequest,
            OrderItemRequest,
            PlaceOrderResponse,
            UpdateOrderStatusRequest,
            PaymentVerification,
            ConfirmOutcome,
            WebhookAck,
            params::Pagination,
            params::OrderListQuery,
            Meta
        )
    ),
    security(
        ("bearer_auth" = [])
    ),
    modifiers(&SecurityAddon),
    tags(
        (name = "Health", description = "Health check endpoint"),
        (name = "Orders", description = "Order placement and history"),
        (name = "Payments", description = "Checkout returns and provider webhooks"),
        (name = "Admin", description = "Admin endpoints"),
    )
)]
pub struct ApiDoc;

pub fn scalar_docs() -> Scalar<OpenApiSpec> {
    Scalar::with_url("/docs", ApiDoc::openapi())
}
