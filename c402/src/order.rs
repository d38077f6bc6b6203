//! Orders on the fulfillment platform and the sessions built from them.
//!
//! The facilitator keeps no order state of its own. An [`OrderSession`] is a
//! snapshot of what the [`FulfillmentPlatform`] says about an order right now:
//! it is produced by [`OrderSessionResolver::create_priced`] when the purchase
//! starts and rebuilt from scratch by [`OrderSessionResolver::reload`] when the
//! payment arrives. The platform-assigned `order_id` is the only thing carried
//! between the two.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, Bytes, U256};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

use crate::BoxFuture;
use crate::registry::{AssetDeployment, AssetRegistry, UnsupportedAsset};

/// Postal address the purchased goods ship to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PhysicalAddress {
    /// Full name of the addressee.
    pub name: String,
    /// First address line.
    pub line1: String,
    /// Second address line.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub line2: Option<String>,
    /// City or locality.
    pub city: String,
    /// State, province or region.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,
    /// Postal or ZIP code.
    pub postal_code: String,
    /// ISO 3166-1 alpha-2 country code.
    pub country: String,
}

/// Who receives the order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Recipient {
    /// Contact e-mail.
    pub email: String,
    /// Shipping address.
    pub physical_address: PhysicalAddress,
}

/// A transaction the platform wants executed to settle an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PreparedTransaction {
    /// Target contract.
    pub to: Address,
    /// ABI-encoded calldata.
    pub data: Bytes,
    /// Native value to attach, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
}

/// The platform's price for an order.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderQuote {
    /// Total price in whole currency units.
    pub total_price: Decimal,
    /// Currency code of `total_price`.
    pub currency: String,
}

/// Request to create an order on the platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreateOrder {
    /// Platform-specific product identifier.
    pub product_locator: String,
    /// Who receives the goods.
    pub recipient: Recipient,
    /// Custodial wallet that will pay the platform.
    pub payer_locator: String,
    /// x402 v1 network name.
    pub network: String,
    /// Currency code.
    pub currency: String,
}

/// An order as reported by the fulfillment platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PlatformOrder {
    /// Platform-assigned identifier.
    pub order_id: String,
    /// Platform status string, passed through verbatim.
    pub status: String,
    /// Current price.
    pub quote: OrderQuote,
    /// Network the order is payable on.
    pub network: String,
    /// Currency the order is payable in.
    pub currency: String,
    /// Settlement transaction, when the platform requires one.
    pub prepared_transaction: Option<PreparedTransaction>,
    /// Echo of the ordered product, when the platform returns it.
    pub product_locator: Option<String>,
    /// Echo of the recipient, when the platform returns it.
    pub recipient: Option<Recipient>,
}

/// Failures reported by a [`FulfillmentPlatform`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum PlatformError {
    /// The order does not exist.
    #[error("order not found")]
    NotFound,
    /// The platform is throttling requests.
    #[error("rate limited by fulfillment platform")]
    RateLimited,
    /// The platform could not be reached or failed internally.
    #[error("fulfillment platform unavailable: {0}")]
    Unavailable(String),
    /// The platform refused the request.
    #[error("fulfillment platform rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status returned.
        status: u16,
        /// Platform-provided message.
        message: String,
    },
    /// The platform answered with something that is not an order.
    #[error("invalid response from fulfillment platform: {0}")]
    InvalidResponse(String),
}

/// The order-fulfillment platform the facilitator buys from.
pub trait FulfillmentPlatform: Send + Sync {
    /// Creates an order and returns it with its authoritative price.
    fn create_order(
        &self,
        order: CreateOrder,
    ) -> BoxFuture<'_, Result<PlatformOrder, PlatformError>>;

    /// Fetches the current state of an order.
    fn get_order<'a>(
        &'a self,
        order_id: &'a str,
    ) -> BoxFuture<'a, Result<PlatformOrder, PlatformError>>;
}

/// A platform order viewed as one purchase attempt.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderSession {
    /// Platform-assigned identifier and sole correlation key.
    pub order_id: String,
    /// Ordered product. Only known on reload when the platform echoes it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub product_locator: Option<String>,
    /// Recipient. Only known on reload when the platform echoes it.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub recipient: Option<Recipient>,
    /// x402 v1 network name.
    pub network: String,
    /// Lowercase currency code.
    pub currency: String,
    /// Price quoted by the platform, before the facilitator fee.
    pub base_price: Decimal,
    /// Facilitator fee in percent.
    pub fee_percent: Decimal,
    /// Platform status string.
    pub status: String,
    /// Settlement transaction requested by the platform.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prepared_transaction: Option<PreparedTransaction>,
}

/// Failure to create or reload an [`OrderSession`].
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum OrderError {
    /// The requested network/currency is not payable.
    #[error(transparent)]
    UnsupportedAsset(#[from] UnsupportedAsset),
    /// The platform does not know the order.
    #[error("order {0} not found")]
    OrderNotFound(String),
    /// The platform is throttling requests.
    #[error("fulfillment platform rate limited the request")]
    RateLimited,
    /// The platform failed or refused the request.
    #[error("fulfillment platform error: {0}")]
    Upstream(PlatformError),
    /// The platform's quote is unusable.
    #[error("invalid quote for order {order_id}: {reason}")]
    InvalidQuote {
        /// The affected order.
        order_id: String,
        /// What is wrong with the quote.
        reason: String,
    },
}

impl OrderError {
    /// Returns `true` if retrying the same request later may succeed.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::RateLimited | Self::Upstream(PlatformError::Unavailable(_))
        )
    }

    fn from_platform(error: PlatformError, order_id: &str) -> Self {
        match error {
            PlatformError::NotFound => Self::OrderNotFound(order_id.to_owned()),
            PlatformError::RateLimited => Self::RateLimited,
            other => Self::Upstream(other),
        }
    }
}

/// Builds [`OrderSession`]s from the fulfillment platform.
#[derive(Clone)]
pub struct OrderSessionResolver {
    platform: Arc<dyn FulfillmentPlatform>,
    registry: AssetRegistry,
    fee_percent: Decimal,
    payer_locator: String,
}

impl fmt::Debug for OrderSessionResolver {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OrderSessionResolver")
            .field("fee_percent", &self.fee_percent)
            .field("payer_locator", &self.payer_locator)
            .finish_non_exhaustive()
    }
}

impl OrderSessionResolver {
    /// Creates a resolver.
    ///
    /// `payer_locator` identifies the custodial wallet that pays the platform.
    #[must_use]
    pub fn new(
        platform: Arc<dyn FulfillmentPlatform>,
        registry: AssetRegistry,
        fee_percent: Decimal,
        payer_locator: impl Into<String>,
    ) -> Self {
        Self {
            platform,
            registry,
            fee_percent,
            payer_locator: payer_locator.into(),
        }
    }

    /// Returns the asset registry used for resolution.
    #[must_use]
    pub const fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    /// Creates a priced order for a product, paid in an already resolved
    /// `deployment`.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError`] if the platform call fails or the returned
    /// quote is unusable.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(
            name = "order.create",
            skip_all,
            fields(network = %deployment.network, currency = %deployment.currency)
        )
    )]
    pub async fn create_priced(
        &self,
        product_locator: String,
        recipient: Recipient,
        deployment: &AssetDeployment,
    ) -> Result<OrderSession, OrderError> {
        let request = CreateOrder {
            product_locator: product_locator.clone(),
            recipient: recipient.clone(),
            payer_locator: self.payer_locator.clone(),
            network: deployment.network.to_owned(),
            currency: deployment.currency.to_owned(),
        };
        let order = self
            .platform
            .create_order(request)
            .await
            .map_err(|e| OrderError::from_platform(e, &product_locator))?;
        let mut session = self.session_from(order)?;
        session.product_locator.get_or_insert(product_locator);
        session.recipient.get_or_insert(recipient);
        Ok(session)
    }

    /// Re-reads an order from the platform.
    ///
    /// # Errors
    ///
    /// Returns [`OrderError::OrderNotFound`] for unknown orders and other
    /// [`OrderError`] variants for upstream failures or unusable quotes.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "order.reload", skip(self), err)
    )]
    pub async fn reload(&self, order_id: &str) -> Result<OrderSession, OrderError> {
        let order = self
            .platform
            .get_order(order_id)
            .await
            .map_err(|e| OrderError::from_platform(e, order_id))?;
        self.session_from(order)
    }

    fn session_from(&self, order: PlatformOrder) -> Result<OrderSession, OrderError> {
        let deployment = self.registry.resolve(&order.network, &order.currency)?;
        if !order.quote.currency.eq_ignore_ascii_case(deployment.currency) {
            return Err(OrderError::InvalidQuote {
                order_id: order.order_id,
                reason: format!(
                    "quoted in {} but payable in {}",
                    order.quote.currency, deployment.currency
                ),
            });
        }
        if order.quote.total_price.is_sign_negative() {
            return Err(OrderError::InvalidQuote {
                order_id: order.order_id,
                reason: "negative price".to_owned(),
            });
        }
        Ok(OrderSession {
            order_id: order.order_id,
            product_locator: order.product_locator,
            recipient: order.recipient,
            network: deployment.network.to_owned(),
            currency: deployment.currency.to_owned(),
            base_price: order.quote.total_price,
            fee_percent: self.fee_percent,
            status: order.status,
            prepared_transaction: order.prepared_transaction,
        })
    }
}
