//! Axum route handlers for the facilitator service.
//!
//! Provides the purchase endpoint, order status, the supported payment kinds,
//! and a health check.

use std::sync::Arc;

use axum::Json;
use axum::body::Bytes;
use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use c402::phase::OrderPhase;
use c402::proto::PAYMENT_HEADER;
use c402::proto::v1::SupportedResponse;
use c402::verify::VerificationError;
use serde_json::json;
use tower_http::trace::TraceLayer;

use crate::error::ApiError;
use crate::service::{OrderRequest, OrderService, OrderStatus, PaymentOutcome};

/// Shared application state for the facilitator service.
pub type FacilitatorState = Arc<OrderService>;

impl IntoResponse for PaymentOutcome {
    fn into_response(self) -> Response {
        match self {
            Self::Fulfilled(receipt) => (StatusCode::OK, Json(receipt)).into_response(),
            Self::CollectionFailed { order_id, error } => (
                StatusCode::OK,
                Json(json!({
                    "message": "Payment verified but funds could not be collected",
                    "orderId": order_id,
                    "payment": {
                        "status": "verified",
                        "collected": false,
                        "error": error,
                    },
                    "phase": OrderPhase::PaymentVerified,
                })),
            )
                .into_response(),
        }
    }
}

/// `POST /orders` — Creates a priced order, or pays for one.
///
/// Without an `X-PAYMENT` header the body is read as an [`OrderRequest`] and
/// answered with `402` and the payment challenge. With the header the body is
/// ignored and the referenced order is verified, collected and fulfilled.
///
/// # Errors
///
/// Returns 400 on bad input or rejected payments, 404 for unknown orders,
/// 422 when payment was collected but fulfillment failed, and 429/502 for
/// upstream failures.
pub async fn post_order(
    State(service): State<FacilitatorState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Response, ApiError> {
    if let Some(value) = headers.get(PAYMENT_HEADER) {
        let header = value.to_str().map_err(|_| {
            VerificationError::InvalidFormat(format!("{PAYMENT_HEADER} is not valid ASCII"))
        })?;
        let outcome = service.pay_order(header).await?;
        return Ok(outcome.into_response());
    }

    let request: OrderRequest = serde_json::from_slice(&body)
        .map_err(|e| ApiError::validation(format!("invalid request body: {e}")))?;
    let challenge = service.create_order(request).await?;
    Ok((StatusCode::PAYMENT_REQUIRED, Json(challenge)).into_response())
}

/// `GET /orders/{order_id}/status` — Returns the platform status of an order.
///
/// # Errors
///
/// Returns 404 for unknown orders and 429/502 for upstream failures.
pub async fn get_order_status(
    State(service): State<FacilitatorState>,
    Path(order_id): Path<String>,
) -> Result<Json<OrderStatus>, ApiError> {
    Ok(Json(service.order_status(&order_id).await?))
}

/// `GET /supported` — Returns the list of supported payment kinds.
pub async fn get_supported(State(service): State<FacilitatorState>) -> Json<SupportedResponse> {
    Json(service.supported())
}

/// `GET /health` — Liveness check.
pub async fn get_health() -> Json<serde_json::Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Creates an Axum [`axum::Router`] with all facilitator endpoints.
///
/// Endpoints:
/// - `POST /orders` — create a priced order or pay for one
/// - `GET /orders/{order_id}/status` — current order status and quote
/// - `GET /supported` — list supported payment kinds
/// - `GET /health` — liveness check
pub fn facilitator_router(state: FacilitatorState) -> axum::Router {
    axum::Router::new()
        .route("/orders", axum::routing::post(post_order))
        .route("/orders/{order_id}/status", axum::routing::get(get_order_status))
        .route("/supported", axum::routing::get(get_supported))
        .route("/health", axum::routing::get(get_health))
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
