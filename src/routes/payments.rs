use std::collections::HashMap;

use axum::{
    Json, Router,
    body::Bytes,
    extract::{Query, State},
    http::HeaderMap,
    routing::{get, post},
};

use crate::{
    dto::payments::{PaymentVerification, ProviderFlags, WebhookAck},
    error::AppResult,
    middleware::auth::AuthUser,
    models::PaymentMethod,
    response::ApiResponse,
    services::reconcile_service,
    state::AppState,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/verify", get(verify_from_query).post(verify_from_body))
        .route("/webhooks/card", post(card_webhook))
        .route("/webhooks/mobile-money", post(mobile_money_webhook))
}

#[utoipa::path(
    get,
    path = "/api/payments/verify",
    params(
        ("orderId" = Option<String>, Query, description = "Order the checkout belonged to"),
        ("gateway" = Option<String>, Query, description = "card or mobile-money"),
        ("success" = Option<String>, Query, description = "Client-side hint only, never trusted"),
        ("tx_ref" = Option<String>, Query, description = "Provider transaction reference")
    ),
    responses(
        (status = 200, description = "Payment confirmed", body = ApiResponse<PaymentVerification>),
        (status = 402, description = "Provider does not report the order paid"),
        (status = 404, description = "Not Found"),
        (status = 502, description = "Provider unreachable, retry"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn verify_from_query(
    State(state): State<AppState>,
    user: AuthUser,
    Query(query): Query<HashMap<String, String>>,
) -> AppResult<Json<ApiResponse<PaymentVerification>>> {
    let flags = ProviderFlags::from_query(query)?;
    let resp = reconcile_service::handle_redirect_return(&state, &user, flags).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/payments/verify",
    responses(
        (status = 200, description = "Payment confirmed", body = ApiResponse<PaymentVerification>),
        (status = 402, description = "Provider does not report the order paid"),
        (status = 404, description = "Not Found"),
        (status = 502, description = "Provider unreachable, retry"),
    ),
    security(("bearer_auth" = [])),
    tag = "Payments"
)]
pub async fn verify_from_body(
    State(state): State<AppState>,
    user: AuthUser,
    Json(body): Json<HashMap<String, serde_json::Value>>,
) -> AppResult<Json<ApiResponse<PaymentVerification>>> {
    let flags = ProviderFlags::from_json(body)?;
    let resp = reconcile_service::handle_redirect_return(&state, &user, flags).await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/payments/webhooks/card",
    request_body(content = String, content_type = "application/json", description = "Raw provider payload; the signature is checked over these bytes"),
    responses(
        (status = 200, description = "Notification accepted", body = ApiResponse<WebhookAck>),
        (status = 400, description = "Signature rejected or payload unreadable"),
        (status = 404, description = "Unknown checkout reference"),
    ),
    tag = "Payments"
)]
pub async fn card_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<ApiResponse<WebhookAck>>> {
    let resp =
        reconcile_service::handle_webhook(&state, PaymentMethod::CardGateway, &headers, &body)
            .await?;
    Ok(Json(resp))
}

#[utoipa::path(
    post,
    path = "/api/payments/webhooks/mobile-money",
    request_body(content = String, content_type = "application/json", description = "Raw provider payload; the signature is checked over these bytes"),
    responses(
        (status = 200, description = "Notification accepted", body = ApiResponse<WebhookAck>),
        (status = 400, description = "Signature rejected or payload unreadable"),
        (status = 404, description = "Unknown transaction reference"),
    ),
    tag = "Payments"
)]
pub async fn mobile_money_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> AppResult<Json<ApiResponse<WebhookAck>>> {
    let resp = reconcile_service::handle_webhook(
        &state,
        PaymentMethod::MobileMoneyGateway,
        &headers,
        &body,
    )
    .await?;
    Ok(Json(resp))
}
