mod support;

use axum::{
    Router,
    body::{Body, to_bytes},
    http::{Request, StatusCode, header},
};
use serde_json::{Value, json};
use storefront_orders::{
    gateway::PaymentStatus,
    models::{OrderStatus, PaymentMethod},
    routes,
    services::order_service,
    store::OrderStore,
};
use support::{SIGNATURE_HEADER, TestApp, admin, customer, signed_headers, token, webhook_body};
use tower::ServiceExt;
use uuid::Uuid;

async fn send(app: &Router, request: Request<Body>) -> anyhow::Result<(StatusCode, Value)> {
    let response = app.clone().oneshot(request).await?;
    let status = response.status();
    let bytes = to_bytes(response.into_body(), usize::MAX).await?;
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes)?
    };
    Ok((status, body))
}

fn get(uri: &str, bearer: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
        .body(Body::empty())
        .expect("request")
}

fn json_request(method: &str, uri: &str, bearer: &str, body: &Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::AUTHORIZATION, format!("Bearer {bearer}"))
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn order_payload(product_id: Uuid, method: &str) -> Value {
    json!({
        "items": [{ "productId": product_id, "size": "M", "quantity": 2 }],
        "address": {
            "firstName": "Sara",
            "lastName": "Tesfaye",
            "email": "sara@example.com",
            "street": "Churchill Ave 12",
            "city": "Addis Ababa",
            "country": "Ethiopia",
            "phone": "0911223344"
        },
        "paymentMethod": method
    })
}

#[tokio::test]
async fn health_and_fallback() -> anyhow::Result<()> {
    let app = routes::app(TestApp::new().state);

    let (status, body) = send(
        &app,
        Request::builder().uri("/health").body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "ok");

    let (status, body) = send(
        &app,
        Request::builder().uri("/nowhere").body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["data"]["path"], "/nowhere");
    Ok(())
}

#[tokio::test]
async fn order_routes_require_a_valid_token() -> anyhow::Result<()> {
    let app = routes::app(TestApp::new().state);

    let (status, _) = send(
        &app,
        Request::builder().uri("/api/orders").body(Body::empty())?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, _) = send(&app, get("/api/orders", "not-a-token")).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn cod_order_over_http() -> anyhow::Result<()> {
    let harness = TestApp::new();
    let user = customer();
    let bearer = token(&user);
    let app = routes::app(harness.state.clone());

    let (status, body) = send(
        &app,
        json_request("POST", "/api/orders", &bearer, &order_payload(harness.shirt, "COD")),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["amount"], 210);
    assert_eq!(body["data"]["status"], "Order Placed");
    assert!(body["data"]["redirectUrl"].is_null());

    let (status, body) = send(&app, get("/api/orders?status=Order%20Placed", &bearer)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["total"], 1);
    let listed = &body["data"]["items"][0];
    assert_eq!(listed["paymentMethod"], "COD");
    assert_eq!(listed["isPaid"], false);
    assert_eq!(listed["paymentConfirmed"], false);
    assert_eq!(listed["items"][0]["unitPrice"], 100);

    let (status, _) = send(&app, get("/api/orders?status=Lost", &bearer)).await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    Ok(())
}

#[tokio::test]
async fn gateway_checkout_and_escaped_redirect_flags() -> anyhow::Result<()> {
    let harness = TestApp::new();
    let user = customer();
    let bearer = token(&user);
    let app = routes::app(harness.state.clone());

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/orders",
            &bearer,
            &order_payload(harness.shirt, "mobile-money"),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "Payment Pending");
    let order_id: Uuid = serde_json::from_value(body["data"]["orderId"].clone())?;
    assert!(body["data"]["redirectUrl"].as_str().is_some());

    let reference = harness
        .store
        .find_by_id(order_id)
        .await?
        .external_reference
        .expect("reference attached");

    // Not paid yet: the client is told so.
    harness.mobile_money.set_status(&reference, PaymentStatus::NotPaid);
    let uri = format!(
        "/api/payments/verify?success=true&amp;orderId={order_id}&amp;gateway=mobile-money&amp;tx_ref={reference}"
    );
    let (status, body) = send(&app, get(&uri, &bearer)).await?;
    assert_eq!(status, StatusCode::PAYMENT_REQUIRED);
    assert_eq!(body["data"]["retriable"], false);

    harness.mobile_money.set_status(&reference, PaymentStatus::Paid);
    let (status, body) = send(&app, get(&uri, &bearer)).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "confirmed");
    assert_eq!(body["data"]["order"]["status"], "Order Placed");
    assert_eq!(body["data"]["order"]["isPaid"], true);

    let (status, body) = send(
        &app,
        json_request(
            "POST",
            "/api/payments/verify",
            &bearer,
            &json!({ "orderId": order_id, "success": true, "gateway": "chapa" }),
        ),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["outcome"], "already_confirmed");
    Ok(())
}

#[tokio::test]
async fn provider_outage_is_reported_as_retriable() -> anyhow::Result<()> {
    let harness = TestApp::new();
    let user = customer();
    let bearer = token(&user);
    let app = routes::app(harness.state.clone());
    harness.card.set_initiate_down(true);

    let (status, body) = send(
        &app,
        json_request("POST", "/api/orders", &bearer, &order_payload(harness.shirt, "card")),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_GATEWAY);
    assert_eq!(body["data"]["retriable"], true);
    Ok(())
}

#[tokio::test]
async fn webhooks_authenticate_the_raw_body() -> anyhow::Result<()> {
    let harness = TestApp::new();
    let user = customer();
    let app = routes::app(harness.state.clone());
    let placed = order_service::place_order(
        &harness.state,
        &user,
        harness.shirts_order(PaymentMethod::CardGateway),
    )
    .await?
    .data
    .expect("placed order");
    let reference = harness
        .store
        .find_by_id(placed.order_id)
        .await?
        .external_reference
        .expect("reference attached");

    let body = webhook_body(&reference, "paid");
    let (status, _) = send(
        &app,
        Request::builder()
            .method("POST")
            .uri("/api/payments/webhooks/card")
            .header(SIGNATURE_HEADER, "deadbeef")
            .body(Body::from(body.clone()))?,
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert!(!harness.store.find_by_id(placed.order_id).await?.payment_confirmed);

    let mut request = Request::builder()
        .method("POST")
        .uri("/api/payments/webhooks/card")
        .body(Body::from(body.clone()))?;
    request.headers_mut().extend(signed_headers(&body));
    let (status, ack) = send(&app, request).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(ack["data"]["applied"], true);

    let order = harness.store.find_by_id(placed.order_id).await?;
    assert!(order.payment_confirmed);
    assert_eq!(order.status, OrderStatus::OrderPlaced);
    Ok(())
}

#[tokio::test]
async fn admin_status_updates_over_http() -> anyhow::Result<()> {
    let harness = TestApp::new();
    let user = customer();
    let staff = admin();
    let app = routes::app(harness.state.clone());
    let placed = order_service::place_order(
        &harness.state,
        &user,
        harness.shirts_order(PaymentMethod::Cod),
    )
    .await?
    .data
    .expect("placed order");
    let uri = format!("/api/admin/orders/{}/status", placed.order_id);

    let (status, _) = send(
        &app,
        json_request("PATCH", &uri, &token(&user), &json!({ "status": "Shipped" })),
    )
    .await?;
    assert_eq!(status, StatusCode::FORBIDDEN);

    let (status, _) = send(
        &app,
        json_request("PATCH", &uri, &token(&staff), &json!({ "status": "Lost" })),
    )
    .await?;
    assert_eq!(status, StatusCode::BAD_REQUEST);

    let (status, body) = send(
        &app,
        json_request("PATCH", &uri, &token(&staff), &json!({ "status": "Delivered" })),
    )
    .await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["status"], "Delivered");
    assert_eq!(body["data"]["isPaid"], true);

    let (status, _) = send(
        &app,
        json_request("PATCH", &uri, &token(&staff), &json!({ "status": "Processing" })),
    )
    .await?;
    assert_eq!(status, StatusCode::CONFLICT);

    let (status, body) = send(&app, get("/api/admin/orders/stats", &token(&staff))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["data"]["totalSales"], 210);

    let (status, body) = send(&app, get("/api/admin/orders?per_page=5", &token(&staff))).await?;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["meta"]["per_page"], 5);
    assert_eq!(body["data"]["items"][0]["status"], "Delivered");
    Ok(())
}
