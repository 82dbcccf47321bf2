use axum::http::HeaderMap;

use crate::{
    dto::{
        orders::OrderView,
        payments::{ConfirmOutcome, PaymentVerification, ProviderFlags, WebhookAck},
    },
    error::{AppError, AppResult},
    gateway::{GatewayError, PaymentStatus, method_for_slug},
    middleware::auth::AuthUser,
    models::{OrderStatus, PaymentMethod},
    response::ApiResponse,
    services::order_service::{self, ConfirmSource, PaymentTarget},
    state::AppState,
};

/// Customer returned from a hosted checkout.
///
/// The flags only say which order to look at. Whether it is paid is always asked of the
/// provider, so a forged `success=true` cannot confirm anything.
pub async fn handle_redirect_return(
    state: &AppState,
    user: &AuthUser,
    flags: ProviderFlags,
) -> AppResult<ApiResponse<PaymentVerification>> {
    let order = match (flags.order_id, flags.reference.as_deref()) {
        (Some(id), _) => order_service::owned_order(state, user, id).await?,
        (None, Some(reference)) => {
            let order = state.orders.find_by_external_reference(reference).await?;
            order_service::owned_order(state, user, order.id).await?
        }
        (None, None) => {
            return Err(AppError::BadRequest(
                "orderId or a transaction reference is required".into(),
            ));
        }
    };

    if let Some(slug) = flags.gateway.as_deref() {
        match method_for_slug(slug) {
            Some(method) if method == order.payment_method => {}
            _ => {
                return Err(AppError::Validation(format!(
                    "gateway {slug} does not match the order's payment method"
                )));
            }
        }
    }
    if let Some(reference) = flags.reference.as_deref() {
        if order.external_reference.as_deref() != Some(reference) {
            tracing::warn!(
                order_id = %order.id,
                claimed = reference,
                "redirect reference differs from the stored one; verifying the stored reference"
            );
        }
    }
    if flags.success == Some(false) {
        tracing::debug!(order_id = %order.id, "client reports an abandoned checkout; verifying anyway");
    }

    let confirmation = order_service::confirm_payment(
        state,
        PaymentTarget::Order(order.id),
        ConfirmSource::RedirectReturn,
    )
    .await?;

    match confirmation.outcome {
        ConfirmOutcome::Confirmed | ConfirmOutcome::AlreadyConfirmed => Ok(ApiResponse::single(
            "Payment verified",
            PaymentVerification {
                outcome: confirmation.outcome,
                order: OrderView::from(confirmation.order),
            },
        )),
        ConfirmOutcome::NotPaid => Err(AppError::PaymentNotConfirmed(
            "the provider reports this order unpaid".into(),
        )),
        ConfirmOutcome::Undetermined => Err(AppError::PaymentNotConfirmed(
            "the provider has not settled this payment yet".into(),
        )),
    }
}

/// Asynchronous provider notification. The raw body is authenticated before anything in it
/// is trusted.
pub async fn handle_webhook(
    state: &AppState,
    method: PaymentMethod,
    headers: &HeaderMap,
    body: &[u8],
) -> AppResult<ApiResponse<WebhookAck>> {
    let gateway = state.gateways.for_method(method).ok_or(AppError::NotFound)?;

    let signature = gateway
        .signature_headers()
        .iter()
        .find_map(|name| headers.get(*name))
        .and_then(|value| value.to_str().ok());

    let event = match gateway.validate_and_parse_webhook(body, signature) {
        Ok(event) => event,
        Err(GatewayError::SignatureInvalid) => {
            tracing::warn!(
                gateway = gateway.name(),
                has_signature = signature.is_some(),
                "webhook signature rejected; payload dropped"
            );
            return Err(AppError::SignatureInvalid);
        }
        Err(err) => {
            tracing::warn!(gateway = gateway.name(), error = %err, "unreadable webhook payload");
            return Err(AppError::BadRequest(err.to_string()));
        }
    };

    tracing::info!(
        gateway = gateway.name(),
        event_type = %event.event_type,
        external_reference = %event.external_reference,
        outcome = ?event.outcome,
        "webhook received"
    );

    let order = state
        .orders
        .find_by_external_reference(&event.external_reference)
        .await
        .inspect_err(|_| {
            tracing::warn!(
                gateway = gateway.name(),
                external_reference = %event.external_reference,
                "webhook references no known order"
            );
        })?;

    if order.payment_method != method {
        tracing::warn!(
            order_id = %order.id,
            gateway = gateway.name(),
            order_method = %order.payment_method,
            "webhook arrived on another gateway's endpoint; ignored"
        );
        return Err(AppError::Validation(format!(
            "reference {} does not belong to a {} order",
            event.external_reference,
            gateway.name()
        )));
    }

    if event.outcome != PaymentStatus::Paid {
        return Ok(ApiResponse::single(
            "Webhook received",
            WebhookAck {
                received: true,
                applied: false,
            },
        ));
    }

    let confirmation = match order_service::confirm_payment(
        state,
        PaymentTarget::Order(order.id),
        ConfirmSource::Webhook(event.outcome),
    )
    .await
    {
        Ok(confirmation) => confirmation,
        // Already recorded for manual refund. Acknowledge so the provider stops redelivering.
        Err(AppError::IllegalTransition {
            from: OrderStatus::Cancelled,
            ..
        }) => {
            return Ok(ApiResponse::single(
                "Webhook received",
                WebhookAck {
                    received: true,
                    applied: false,
                },
            ));
        }
        Err(err) => return Err(err),
    };

    Ok(ApiResponse::single(
        "Webhook received",
        WebhookAck {
            received: true,
            applied: confirmation.outcome == ConfirmOutcome::Confirmed,
        },
    ))
}
