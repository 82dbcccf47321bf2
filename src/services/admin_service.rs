use uuid::Uuid;

use crate::{
    dto::orders::{OrderList, OrderView, UpdateOrderStatusRequest},
    error::{AppError, AppResult},
    middleware::auth::{AuthUser, ensure_admin},
    models::{OrderStats, OrderStatus},
    response::{ApiResponse, Meta},
    routes::params::OrderListQuery,
    services::order_service,
    state::AppState,
};

pub async fn list_all_orders(
    state: &AppState,
    user: &AuthUser,
    query: OrderListQuery,
) -> AppResult<ApiResponse<OrderList>> {
    ensure_admin(user)?;
    let (page, per_page, store_query) = query.to_store_query()?;
    let (orders, total) = state.orders.list_all(&store_query).await?;

    let meta = Meta::page(page, per_page, total);
    let order_list = OrderList {
        items: orders.into_iter().map(OrderView::from).collect(),
    };

    Ok(ApiResponse::paged("Orders", order_list, meta))
}

pub async fn get_order_admin(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
) -> AppResult<ApiResponse<OrderView>> {
    ensure_admin(user)?;
    let order = state.orders.find_by_id(id).await?;
    Ok(ApiResponse::single("OK", OrderView::from(order)))
}

pub async fn update_order_status(
    state: &AppState,
    user: &AuthUser,
    id: Uuid,
    payload: UpdateOrderStatusRequest,
) -> AppResult<ApiResponse<OrderView>> {
    ensure_admin(user)?;
    let next = OrderStatus::parse(payload.status.trim())
        .ok_or_else(|| AppError::BadRequest("Invalid order status".into()))?;

    let order = order_service::update_status_by_admin(state, user, id, next).await?;
    Ok(ApiResponse::single("Order status updated", OrderView::from(order)))
}

/// Totals for the admin dashboard. Sales count delivered orders only.
pub async fn order_stats(state: &AppState, user: &AuthUser) -> AppResult<ApiResponse<OrderStats>> {
    ensure_admin(user)?;
    let stats = state.orders.stats().await?;
    Ok(ApiResponse::single("Order stats", stats))
}
