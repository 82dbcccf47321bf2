use std::sync::Arc;

use serde_json::json;
use uuid::Uuid;

use crate::{
    audit::log_audit,
    dto::{
        orders::{CreateOrderRequest, OrderList, OrderView, PlaceOrderResponse},
        payments::ConfirmOutcome,
    },
    error::{AppError, AppResult},
    gateway::{PaymentGateway, PaymentStatus},
    middleware::auth::{AuthUser, ensure_admin},
    models::{LineItem, Order, OrderStatus, order_amount},
    response::{ApiResponse, Meta},
    routes::params::OrderListQuery,
    state::AppState,
    store::NewOrder,
};

const DEFAULT_SIZE: &str = "default";
// Concurrent admin edits are re-evaluated against the fresh status this many times.
const STATUS_UPDATE_ATTEMPTS: usize = 3;

/// How the order to confirm is identified.
#[derive(Debug, Clone)]
pub enum PaymentTarget {
    Order(Uuid),
    ExternalReference(String),
}

/// What triggered a confirmation attempt.
#[derive(Debug, Clone, Copy)]
pub enum ConfirmSource {
    /// Customer came back from the hosted checkout. The provider is always asked.
    RedirectReturn,
    /// An authenticated webhook already carries the provider's verdict.
    Webhook(PaymentStatus),
}

#[derive(Debug, Clone)]
pub struct Confirmation {
    pub outcome: ConfirmOutcome,
    pub order: Order,
}

pub async fn place_order(
    state: &AppState,
    user: &AuthUser,
    payload: CreateOrderRequest,
) -> AppResult<ApiResponse<PlaceOrderResponse>> {
    if payload.items.is_empty() {
        return Err(AppError::Validation("No items in order".into()));
    }

    let mut items = Vec::with_capacity(payload.items.len());
    for requested in &payload.items {
        if requested.quantity <= 0 {
            return Err(AppError::Validation(format!(
                "quantity for product {} must be greater than 0",
                requested.product_id
            )));
        }
        let product = state
            .catalog
            .product(requested.product_id)
            .await?
            .ok_or_else(|| {
                AppError::Validation(format!("unknown product {}", requested.product_id))
            })?;
        let size = requested
            .size
            .as_deref()
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .unwrap_or(DEFAULT_SIZE);
        items.push(LineItem {
            product_id: product.id,
            name: product.name,
            unit_price: product.price,
            size: size.to_string(),
            quantity: requested.quantity,
            image: product.image,
        });
    }

    let amount = order_amount(&items, state.checkout.delivery_charge)
        .ok_or_else(|| AppError::Validation("order amount is out of range".into()))?;

    let order = state
        .orders
        .create(NewOrder {
            user_id: user.user_id,
            items,
            address: payload.address,
            amount,
            payment_method: payload.payment_method,
        })
        .await?;

    tracing::info!(
        order_id = %order.id,
        user_id = %user.user_id,
        method = %order.payment_method,
        amount = order.amount,
        "order placed"
    );
    if let Err(err) = log_audit(
        state.orders.as_ref(),
        Some(user.user_id),
        "order_placed",
        Some("orders"),
        Some(json!({
            "order_id": order.id,
            "payment_method": order.payment_method,
            "amount": order.amount
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    let response = match state.gateways.for_method(order.payment_method) {
        None => {
            // Cash on delivery is committed at placement.
            clear_cart_after(state, &order).await;
            PlaceOrderResponse::new(&order, None)
        }
        Some(gateway) => start_checkout(state, gateway, order).await?,
    };

    Ok(ApiResponse::single("Order placed", response))
}

/// Opens a fresh hosted checkout for an order still awaiting payment.
pub async fn retry_checkout(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<PlaceOrderResponse>> {
    let order = owned_order(state, user, id).await?;
    if order.payment_confirmed || order.status != OrderStatus::PaymentPending {
        return Err(AppError::Validation("order is not awaiting payment".into()));
    }
    let gateway = state
        .gateways
        .for_method(order.payment_method)
        .ok_or_else(|| AppError::Validation("cash-on-delivery orders need no checkout".into()))?;

    let response = start_checkout(state, gateway, order).await?;
    Ok(ApiResponse::single("Checkout started", response))
}

async fn start_checkout(
    state: &AppState,
    gateway: &Arc<dyn PaymentGateway>,
    order: Order,
) -> AppResult<PlaceOrderResponse> {
    let urls = gateway.return_urls(&order);
    let session = gateway.initiate(&order, &urls).await.map_err(|err| {
        tracing::error!(
            order_id = %order.id,
            gateway = gateway.name(),
            error = %err,
            "checkout initiation failed; order left awaiting payment"
        );
        AppError::from(err)
    })?;

    let order = state
        .orders
        .attach_external_reference(order.id, &session.external_reference)
        .await?
        .ok_or_else(|| AppError::Validation("order is no longer awaiting payment".into()))?;

    tracing::info!(
        order_id = %order.id,
        gateway = gateway.name(),
        external_reference = %session.external_reference,
        "checkout session opened"
    );
    if let Err(err) = log_audit(
        state.orders.as_ref(),
        Some(order.user_id),
        "checkout_started",
        Some("orders"),
        Some(json!({
            "order_id": order.id,
            "gateway": gateway.name(),
            "external_reference": session.external_reference
        })),
    )
    .await
    {
        tracing::warn!(error = %err, "audit log failed");
    }

    Ok(PlaceOrderResponse::new(&order, Some(session.redirect_url)))
}

/// Applies a payment to an order, at most once.
///
/// Returns `Confirmed` only to the caller whose update flipped the order. Concurrent or
/// repeated attempts get `AlreadyConfirmed`; a provider that says no, or cannot tell yet,
/// leaves the order untouched.
pub async fn confirm_payment(
    state: &AppState,
    target: PaymentTarget,
    source: ConfirmSource,
) -> AppResult<Confirmation> {
    let order = match &target {
        PaymentTarget::Order(id) => state.orders.find_by_id(*id).await?,
        PaymentTarget::ExternalReference(reference) => {
            state.orders.find_by_external_reference(reference).await?
        }
    };

    if order.payment_confirmed {
        tracing::info!(order_id = %order.id, "payment already confirmed");
        return Ok(Confirmation {
            outcome: ConfirmOutcome::AlreadyConfirmed,
            order,
        });
    }

    let gateway = state.gateways.for_method(order.payment_method).ok_or_else(|| {
        AppError::Validation("cash-on-delivery orders are settled on delivery".into())
    })?;

    let status = match source {
        ConfirmSource::Webhook(status) => status,
        ConfirmSource::RedirectReturn => {
            let reference = order.external_reference.as_deref().ok_or_else(|| {
                AppError::Validation("order has no checkout session to verify".into())
            })?;
            gateway.verify(reference).await.map_err(|err| {
                tracing::error!(
                    order_id = %order.id,
                    gateway = gateway.name(),
                    error = %err,
                    "payment verification failed"
                );
                AppError::from(err)
            })?
        }
    };

    match status {
        PaymentStatus::Paid => apply_payment(state, order, gateway.name()).await,
        PaymentStatus::NotPaid => {
            tracing::info!(order_id = %order.id, gateway = gateway.name(), "provider reports order unpaid");
            Ok(Confirmation {
                outcome: ConfirmOutcome::NotPaid,
                order,
            })
        }
        PaymentStatus::Unknown => {
            tracing::warn!(order_id = %order.id, gateway = gateway.name(), "provider could not determine payment state");
            Ok(Confirmation {
                outcome: ConfirmOutcome::Undetermined,
                order,
            })
        }
    }
}

async fn apply_payment(state: &AppState, order: Order, gateway: &str) -> AppResult<Confirmation> {
    if order.status == OrderStatus::Cancelled {
        // Money arrived for an order an admin already cancelled. Needs a manual refund.
        tracing::error!(
            order_id = %order.id,
            gateway,
            external_reference = ?order.external_reference,
            "payment received for cancelled order"
        );
        if let Err(err) = log_audit(
            state.orders.as_ref(),
            None,
            "payment_on_cancelled_order",
            Some("orders"),
            Some(json!({ "order_id": order.id, "gateway": gateway })),
        )
        .await
        {
            tracing::warn!(error = %err, "audit log failed");
        }
        return Err(AppError::IllegalTransition {
            from: OrderStatus::Cancelled,
            to: OrderStatus::OrderPlaced,
        });
    }

    match state.orders.mark_paid(order.id).await? {
        Some(paid) => {
            tracing::info!(order_id = %paid.id, gateway, amount = paid.amount, "payment confirmed");
            if let Err(err) = log_audit(
                state.orders.as_ref(),
                Some(paid.user_id),
                "payment_confirmed",
                Some("orders"),
                Some(json!({
                    "order_id": paid.id,
                    "gateway": gateway,
                    "external_reference": paid.external_reference
                })),
            )
            .await
            {
                tracing::warn!(error = %err, "audit log failed");
            }
            clear_cart_after(state, &paid).await;
            Ok(Confirmation {
                outcome: ConfirmOutcome::Confirmed,
                order: paid,
            })
        }
        None => {
            let current = state.orders.find_by_id(order.id).await?;
            if current.payment_confirmed {
                tracing::info!(order_id = %current.id, "payment confirmed by a concurrent attempt");
                Ok(Confirmation {
                    outcome: ConfirmOutcome::AlreadyConfirmed,
                    order: current,
                })
            } else {
                tracing::warn!(
                    order_id = %current.id,
                    status = %current.status,
                    "payment could not be applied in current status"
                );
                Err(AppError::IllegalTransition {
                    from: current.status,
                    to: OrderStatus::OrderPlaced,
                })
            }
        }
    }
}

/// A failed clear leaves the order committed; the cart is only stale.
async fn clear_cart_after(state: &AppState, order: &Order) {
    if let Err(err) = state.carts.clear_cart(order.user_id).await {
        tracing::warn!(
            order_id = %order.id,
            user_id = %order.user_id,
            error = %err,
            "cart clear failed after order commit"
        );
    }
}

/// Admin-driven fulfilment step. Payment confirmation is never touched here.
pub async fn update_status_by_admin(
    state: &AppState,
    actor: &AuthUser,
    id: Uuid,
    next: OrderStatus,
) -> AppResult<Order> {
    ensure_admin(actor)?;

    let mut current = state.orders.find_by_id(id).await?;
    for _ in 0..STATUS_UPDATE_ATTEMPTS {
        if !current.status.admin_can_move_to(next) {
            tracing::warn!(order_id = %id, from = %current.status, to = %next, "rejected status change");
            return Err(AppError::IllegalTransition {
                from: current.status,
                to: next,
            });
        }
        match state.orders.update_status(id, current.status, next).await? {
            Some(updated) => {
                tracing::info!(order_id = %id, from = %current.status, to = %next, "order status updated");
                if let Err(err) = log_audit(
                    state.orders.as_ref(),
                    Some(actor.user_id),
                    "order_status_updated",
                    Some("orders"),
                    Some(json!({
                        "order_id": id,
                        "from": current.status,
                        "to": next
                    })),
                )
                .await
                {
                    tracing::warn!(error = %err, "audit log failed");
                }
                return Ok(updated);
            }
            None => current = state.orders.find_by_id(id).await?,
        }
    }

    Err(AppError::IllegalTransition {
        from: current.status,
        to: next,
    })
}

pub async fn list_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    let (page, per_page, store_query) = query.to_store_query()?;
    let (orders, total) = state
        .orders
        .list_for_user(user.user_id, &store_query)
        .await?;

    let meta = Meta::page(page, per_page, total);
    let list = OrderList {
        items: orders.into_iter().map(OrderView::from).collect(),
    };
    Ok(ApiResponse::paged("Ok", list, meta))
}

pub async fn get_order(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderView>> {
    let order = owned_order(state, user, id).await?;
    Ok(ApiResponse::single("OK", OrderView::from(order)))
}

/// Loads an order the caller may see. Other customers' orders read as missing.
pub(crate) async fn owned_order(state: &AppState, user: &AuthUser, id: Uuid) -> AppResult<Order> {
    let order = state.orders.find_by_id(id).await?;
    if order.user_id != user.user_id && !user.is_admin() {
        return Err(AppError::NotFound);
    }
    Ok(order)
}
