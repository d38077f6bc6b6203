//! A [`FulfillmentPlatform`] implementation that talks to the order-fulfillment
//! platform over HTTP.
//!
//! ## Endpoints
//!
//! - `POST {base}/orders` creates an order and returns its quote
//! - `GET {base}/orders/{orderId}` returns the current state of an order
//!
//! Every request carries the platform API key in `X-API-KEY`. Creation
//! responses may wrap the order as `{"order": {...}}`; both shapes are accepted.
//!
//! ## Error Handling
//!
//! Requests fail with a [`ClientError`]. The [`FulfillmentPlatform`]
//! implementation folds it into [`PlatformError`]: `404` is `NotFound`, `429`
//! is `RateLimited`, other `4xx` are `Rejected`, and `5xx` and transport
//! failures are `Unavailable`.

use std::time::Duration;

use c402::BoxFuture;
use c402::order::{
    CreateOrder, FulfillmentPlatform, OrderQuote, PlatformError, PlatformOrder, PreparedTransaction,
    Recipient,
};
use http::StatusCode;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use serde_with::{DisplayFromStr, PickFirst, serde_as};
use url::Url;

#[cfg(feature = "telemetry")]
use tracing::instrument;

use crate::client::{ApiClient, ClientError, join, normalize_base, push_segment};

impl From<ClientError> for PlatformError {
    fn from(error: ClientError) -> Self {
        match error {
            ClientError::HttpStatus { status, .. } if status == StatusCode::NOT_FOUND => {
                Self::NotFound
            }
            ClientError::HttpStatus { status, .. } if status == StatusCode::TOO_MANY_REQUESTS => {
                Self::RateLimited
            }
            ClientError::HttpStatus { status, body, .. } if status.is_client_error() => {
                Self::Rejected {
                    status: status.as_u16(),
                    message: body,
                }
            }
            e @ (ClientError::HttpStatus { .. }
            | ClientError::Http { .. }
            | ClientError::DeadlineElapsed { .. }
            | ClientError::ResponseBodyRead { .. }) => Self::Unavailable(e.to_string()),
            e @ (ClientError::JsonDeserialization { .. }
            | ClientError::UrlParse { .. }
            | ClientError::CannotBeABase(_)) => Self::InvalidResponse(e.to_string()),
        }
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct CreateOrderBody<'a> {
    recipient: &'a Recipient,
    payment: PaymentBody<'a>,
    line_items: [LineItemBody<'a>; 1],
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct PaymentBody<'a> {
    method: &'a str,
    currency: &'a str,
    payer_address: &'a str,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct LineItemBody<'a> {
    product_locator: &'a str,
}

#[derive(Deserialize)]
#[serde(untagged)]
enum OrderEnvelope {
    Wrapped { order: OrderBody },
    Bare(OrderBody),
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct OrderBody {
    order_id: String,
    status: String,
    quote: QuoteBody,
    payment: PaymentInfo,
    #[serde(default)]
    line_items: Vec<LineItemInfo>,
    #[serde(default)]
    recipient: Option<Recipient>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct QuoteBody {
    total_price: PriceBody,
}

#[serde_as]
#[derive(Deserialize)]
struct PriceBody {
    #[serde_as(as = "PickFirst<(DisplayFromStr, _)>")]
    amount: Decimal,
    currency: String,
}

#[derive(Deserialize)]
struct PaymentInfo {
    method: String,
    currency: String,
    #[serde(default)]
    preparation: Option<PreparedTransaction>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LineItemInfo {
    product_locator: Option<String>,
}

impl From<OrderEnvelope> for PlatformOrder {
    fn from(envelope: OrderEnvelope) -> Self {
        let body = match envelope {
            OrderEnvelope::Wrapped { order } | OrderEnvelope::Bare(order) => order,
        };
        Self {
            order_id: body.order_id,
            status: body.status,
            quote: OrderQuote {
                total_price: body.quote.total_price.amount,
                currency: body.quote.total_price.currency,
            },
            network: body.payment.method,
            currency: body.payment.currency,
            prepared_transaction: body.payment.preparation,
            product_locator: body.line_items.into_iter().find_map(|item| item.product_locator),
            recipient: body.recipient,
        }
    }
}

/// A client for the fulfillment platform's order API.
#[derive(Clone, Debug)]
pub struct PlatformClient {
    /// Base URL of the platform API.
    base_url: Url,
    /// Full URL of the orders collection.
    orders_url: Url,
    /// Authenticated transport.
    api: ApiClient,
}

impl PlatformClient {
    /// Constructs a new [`PlatformClient`] from a base URL and API key.
    ///
    /// A missing trailing slash on `base_url` is added, so `https://p.example/api`
    /// and `https://p.example/api/` both resolve orders under `/api/orders`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if URL construction fails.
    pub fn try_new(base_url: Url, api_key: impl Into<String>) -> Result<Self, ClientError> {
        let base_url = normalize_base(base_url).map_err(ClientError::CannotBeABase)?;
        let orders_url = join(&base_url, "./orders", "Failed to construct ./orders URL")?;
        Ok(Self {
            base_url,
            orders_url,
            api: ApiClient::new(api_key),
        })
    }

    /// Sets a timeout for all future requests.
    #[must_use]
    pub const fn with_timeout(mut self, timeout: Duration) -> Self {
        self.api.set_timeout(timeout);
        self
    }

    /// Returns the base URL used by this client.
    #[must_use]
    pub const fn base_url(&self) -> &Url {
        &self.base_url
    }

    /// Sends `POST /orders`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the request fails or the response is not an
    /// order.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "c402.platform.create_order", skip_all, err, fields(
            network = %order.network,
            currency = %order.currency,
            otel.status_code = tracing::field::Empty,
            error.message = tracing::field::Empty,
        ))
    )]
    pub async fn create_order(&self, order: &CreateOrder) -> Result<PlatformOrder, ClientError> {
        let body = CreateOrderBody {
            recipient: &order.recipient,
            payment: PaymentBody {
                method: &order.network,
                currency: &order.currency,
                payer_address: &order.payer_locator,
            },
            line_items: [LineItemBody {
                product_locator: &order.product_locator,
            }],
        };
        let request = self.api.post(self.orders_url.clone()).json(&body);
        let envelope: OrderEnvelope = self.api.send_json(request, "POST /orders").await?;
        Ok(envelope.into())
    }

    /// Sends `GET /orders/{order_id}`.
    ///
    /// # Errors
    ///
    /// Returns [`ClientError`] if the request fails or the response is not an
    /// order.
    #[cfg_attr(
        feature = "telemetry",
        instrument(name = "c402.platform.get_order", skip(self), err, fields(
            otel.status_code = tracing::field::Empty,
            error.message = tracing::field::Empty,
        ))
    )]
    pub async fn get_order(&self, order_id: &str) -> Result<PlatformOrder, ClientError> {
        let url = push_segment(&self.orders_url, order_id)?;
        let request = self.api.get(url);
        let envelope: OrderEnvelope = self.api.send_json(request, "GET /orders/{orderId}").await?;
        Ok(envelope.into())
    }
}

impl FulfillmentPlatform for PlatformClient {
    fn create_order(
        &self,
        order: CreateOrder,
    ) -> BoxFuture<'_, Result<PlatformOrder, PlatformError>> {
        Box::pin(async move { Self::create_order(self, &order).await.map_err(PlatformError::from) })
    }

    fn get_order<'a>(
        &'a self,
        order_id: &'a str,
    ) -> BoxFuture<'a, Result<PlatformOrder, PlatformError>> {
        Box::pin(async move { Self::get_order(self, order_id).await.map_err(PlatformError::from) })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use c402::order::PhysicalAddress;
    use serde_json::json;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn order_json(order_id: &str) -> serde_json::Value {
        json!({
            "orderId": order_id,
            "status": "awaiting-payment",
            "quote": { "totalPrice": { "amount": "1.80", "currency": "usdc" } },
            "payment": {
                "method": "base-sepolia",
                "currency": "usdc",
                "preparation": {
                    "to": "0x4444444444444444444444444444444444444444",
                    "data": "0xdeadbeef"
                }
            },
            "lineItems": [{ "productLocator": "amazon:B01" }]
        })
    }

    fn create_request() -> CreateOrder {
        CreateOrder {
            product_locator: "amazon:B01".into(),
            recipient: Recipient {
                email: "buyer@example.com".into(),
                physical_address: PhysicalAddress {
                    name: "Ada Lovelace".into(),
                    line1: "1 Main St".into(),
                    line2: None,
                    city: "Springfield".into(),
                    state: None,
                    postal_code: "62701".into(),
                    country: "US".into(),
                },
            },
            payer_locator: "0x2222222222222222222222222222222222222222".into(),
            network: "base-sepolia".into(),
            currency: "usdc".into(),
        }
    }

    async fn client(server: &MockServer) -> PlatformClient {
        let base: Url = format!("{}/api", server.uri()).parse().unwrap();
        PlatformClient::try_new(base, "secret").unwrap()
    }

    #[tokio::test]
    async fn test_create_order_sends_wire_shape_and_reads_wrapped_order() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/orders"))
            .and(header("X-API-KEY", "secret"))
            .and(body_partial_json(json!({
                "payment": {
                    "method": "base-sepolia",
                    "currency": "usdc",
                    "payerAddress": "0x2222222222222222222222222222222222222222"
                },
                "lineItems": [{ "productLocator": "amazon:B01" }],
                "recipient": { "email": "buyer@example.com" }
            })))
            .respond_with(
                ResponseTemplate::new(201).set_body_json(json!({ "order": order_json("ord_1") })),
            )
            .expect(1)
            .mount(&server)
            .await;

        let order = client(&server).await.create_order(&create_request()).await.unwrap();
        assert_eq!(order.order_id, "ord_1");
        assert_eq!(order.quote.total_price, Decimal::new(180, 2));
        assert_eq!(order.network, "base-sepolia");
        assert_eq!(order.product_locator.as_deref(), Some("amazon:B01"));
        assert!(order.prepared_transaction.is_some());
    }

    #[tokio::test]
    async fn test_get_order_reads_bare_order_with_numeric_amount() {
        let server = MockServer::start().await;
        let mut body = order_json("ord_2");
        body["quote"]["totalPrice"]["amount"] = json!(2.5);
        Mock::given(method("GET"))
            .and(path("/api/orders/ord_2"))
            .respond_with(ResponseTemplate::new(200).set_body_json(body))
            .mount(&server)
            .await;

        let order = client(&server).await.get_order("ord_2").await.unwrap();
        assert_eq!(order.quote.total_price, Decimal::new(25, 1));
    }

    #[tokio::test]
    async fn test_status_mapping() {
        let server = MockServer::start().await;
        for (id, status) in [("missing", 404), ("busy", 429), ("broken", 503), ("bad", 400)] {
            Mock::given(method("GET"))
                .and(path(format!("/api/orders/{id}")))
                .respond_with(ResponseTemplate::new(status).set_body_string("nope"))
                .mount(&server)
                .await;
        }
        let client = client(&server).await;
        let platform: &dyn FulfillmentPlatform = &client;
        assert_eq!(platform.get_order("missing").await, Err(PlatformError::NotFound));
        assert_eq!(platform.get_order("busy").await, Err(PlatformError::RateLimited));
        assert!(matches!(
            platform.get_order("broken").await,
            Err(PlatformError::Unavailable(_))
        ));
        assert_eq!(
            platform.get_order("bad").await,
            Err(PlatformError::Rejected {
                status: 400,
                message: "nope".into()
            })
        );
    }

    #[tokio::test]
    async fn test_malformed_order_is_invalid_response() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/orders/ord_3"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "orderId": "ord_3" })))
            .mount(&server)
            .await;
        let client = client(&server).await;
        let platform: &dyn FulfillmentPlatform = &client;
        assert!(matches!(
            platform.get_order("ord_3").await,
            Err(PlatformError::InvalidResponse(_))
        ));
    }
}
