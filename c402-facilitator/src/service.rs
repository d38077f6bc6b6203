//! Order purchase orchestration.
//!
//! [`OrderService`] drives one purchase through its two requests. The first
//! creates a priced order and returns the payment challenge; the second
//! reloads the order named in the `X-PAYMENT` header, verifies the payment,
//! collects the funds and dispatches fulfillment.
//!
//! Nothing is kept between the two requests. Everything past
//! [`OrderPhase::FundsCollected`] is reported, never rolled back.

use std::sync::Arc;
use std::time::Duration;

use alloy_primitives::{Address, B256};
use c402::challenge::{ChallengeError, PaymentChallenge, total_price};
use c402::order::{
    FulfillmentPlatform, OrderSession, OrderSessionResolver, PhysicalAddress, Recipient,
};
use c402::phase::OrderPhase;
use c402::proto::v1::{EXACT_SCHEME, PaymentRequired, SupportedKind, SupportedResponse, V1};
use c402::registry::AssetRegistry;
use c402::verify::{PaymentVerifier, peek_order_id};
use c402_evm::dispatch::FulfillmentResult;
use c402_evm::{CollectError, FulfillmentDispatcher, FundCollector, WalletExecutor};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use tokio::time::{Instant, timeout_at};

use crate::error::ApiError;

/// Message accompanying the 402 challenge.
pub const PAYMENT_REQUIRED_MESSAGE: &str = "X-PAYMENT header is required";

/// Static settings of an [`OrderService`].
#[derive(Debug, Clone)]
pub struct ServiceSettings {
    /// Facilitator fee in percent.
    pub fee_percent: Decimal,
    /// Custodial receiving address.
    pub pay_to: Address,
    /// Payment validity advertised in challenges, and the time budget of one
    /// paid request.
    pub max_timeout_seconds: u64,
    /// Custodial wallet locator paying the platform.
    pub payer_locator: String,
    /// Network used when a purchase names none.
    pub default_network: String,
    /// Currency used when a purchase names none.
    pub default_currency: String,
    /// Echo raw upstream error bodies.
    pub expose_upstream_errors: bool,
}

/// Body of `POST /orders`.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderRequest {
    /// Product to buy, in the platform's locator format.
    #[serde(default)]
    pub product_locator: String,
    /// Recipient e-mail.
    #[serde(default)]
    pub email: String,
    /// Shipping address.
    #[serde(default)]
    pub physical_address: Option<PhysicalAddress>,
    /// Requested payment network and currency.
    #[serde(default)]
    pub payment: Option<PaymentChoice>,
}

/// The `payment` block of an [`OrderRequest`].
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentChoice {
    /// Network name, e.g. `base-sepolia`.
    #[serde(default)]
    pub method: Option<String>,
    /// Currency code, e.g. `usdc`.
    #[serde(default)]
    pub currency: Option<String>,
}

impl OrderRequest {
    fn recipient(&self) -> Result<Recipient, ApiError> {
        if self.product_locator.trim().is_empty() {
            return Err(ApiError::validation("productLocator is required"));
        }
        let email = self.email.trim();
        if email.is_empty() || !email.contains('@') {
            return Err(ApiError::validation("a valid email is required"));
        }
        let address = self
            .physical_address
            .as_ref()
            .ok_or_else(|| ApiError::validation("physicalAddress is required"))?;
        let required = [
            ("name", &address.name),
            ("line1", &address.line1),
            ("city", &address.city),
            ("postalCode", &address.postal_code),
            ("country", &address.country),
        ];
        if let Some((field, _)) = required.iter().find(|(_, value)| value.trim().is_empty()) {
            return Err(ApiError::validation(format!("physicalAddress.{field} is required")));
        }
        Ok(Recipient {
            email: email.to_owned(),
            physical_address: address.clone(),
        })
    }
}

/// `payment` block of a successful purchase response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentConfirmation {
    /// Always `confirmed`.
    pub status: &'static str,
    /// Inbound transfer hash.
    pub transaction_hash: Option<B256>,
    /// Authorized amount in atomic units.
    pub amount: String,
    /// Network the transfer ran on.
    pub network: String,
}

/// Body of a successful paid `POST /orders`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PurchaseReceipt {
    /// Human-readable summary.
    pub message: &'static str,
    /// The order as reloaded before payment.
    pub order: OrderSession,
    /// The inbound payment.
    pub payment: PaymentConfirmation,
    /// The outbound settlement.
    pub fulfillment: FulfillmentResult,
    /// Final phase.
    pub phase: OrderPhase,
}

/// Outcome of a paid `POST /orders` that did not end in an error response.
#[derive(Debug, Clone)]
pub enum PaymentOutcome {
    /// Funds collected and fulfillment dispatched.
    Fulfilled(Box<PurchaseReceipt>),
    /// The payment verified but the funds did not move.
    CollectionFailed {
        /// The affected order.
        order_id: String,
        /// Why collection failed.
        error: String,
    },
}

impl PaymentOutcome {
    fn collection_failed(order_id: String, error: &CollectError, expose: bool) -> Self {
        Self::CollectionFailed {
            order_id,
            error: if expose { error.to_string() } else { error.summary() },
        }
    }
}

/// Quote block of `GET /orders/{orderId}/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StatusQuote {
    /// Platform price before the fee.
    pub base_price: Decimal,
    /// Facilitator fee in percent.
    pub fee_percent: Decimal,
    /// Price including the fee, rounded to six decimal places.
    pub total_price: Decimal,
    /// Currency code.
    pub currency: String,
    /// Network name.
    pub network: String,
}

/// Body of `GET /orders/{orderId}/status`.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct OrderStatus {
    /// The order.
    pub order_id: String,
    /// Platform status string.
    pub status: String,
    /// Current quote.
    pub quote: StatusQuote,
}

/// Tracks the phase of one order for logging.
struct PhaseLog<'a> {
    order_id: &'a str,
    phase: OrderPhase,
}

impl<'a> PhaseLog<'a> {
    const fn at(order_id: &'a str, phase: OrderPhase) -> Self {
        Self { order_id, phase }
    }

    fn advance(&mut self, next: OrderPhase) {
        debug_assert!(self.phase.can_advance_to(next), "{} -> {next}", self.phase);
        self.phase = next;
        tracing::info!(order_id = %self.order_id, phase = %next, "order phase advanced");
    }
}

/// The purchase flow behind the HTTP handlers.
#[derive(Debug, Clone)]
pub struct OrderService {
    resolver: OrderSessionResolver,
    challenge: PaymentChallenge,
    verifier: PaymentVerifier,
    collector: FundCollector,
    dispatcher: FulfillmentDispatcher,
    default_network: String,
    default_currency: String,
    expose_upstream_errors: bool,
    pay_timeout: Duration,
}

impl OrderService {
    /// Wires the flow over a platform and a wallet executor.
    #[must_use]
    pub fn new(
        platform: Arc<dyn FulfillmentPlatform>,
        executor: Arc<dyn WalletExecutor>,
        settings: ServiceSettings,
    ) -> Self {
        let registry = AssetRegistry::default();
        let resolver = OrderSessionResolver::new(
            platform,
            registry.clone(),
            settings.fee_percent,
            settings.payer_locator,
        );
        let challenge =
            PaymentChallenge::new(registry, settings.pay_to, settings.max_timeout_seconds);
        Self {
            pay_timeout: Duration::from_secs(settings.max_timeout_seconds),
            verifier: PaymentVerifier::new(challenge.clone()),
            collector: FundCollector::new(Arc::clone(&executor)),
            dispatcher: FulfillmentDispatcher::new(executor, resolver.clone()),
            resolver,
            challenge,
            default_network: settings.default_network,
            default_currency: settings.default_currency,
            expose_upstream_errors: settings.expose_upstream_errors,
        }
    }

    /// Creates a priced order and returns its payment challenge.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Validation`] for bad input or unsupported assets,
    /// and the upstream variants when the platform fails.
    pub async fn create_order(&self, request: OrderRequest) -> Result<PaymentRequired, ApiError> {
        let recipient = request.recipient()?;
        let choice = request.payment.unwrap_or_default();
        let network = choice.method.unwrap_or_else(|| self.default_network.clone());
        let currency = choice.currency.unwrap_or_else(|| self.default_currency.clone());

        let deployment = self
            .challenge
            .registry()
            .resolve(&network, &currency)
            .map_err(|error| ApiError::from_order(error.into(), self.expose_upstream_errors))?;
        if deployment.is_native() {
            return Err(ApiError::from_challenge(ChallengeError::UnsupportedAssetType {
                network,
                currency,
            }));
        }

        let session = self
            .resolver
            .create_priced(request.product_locator, recipient, &deployment)
            .await
            .map_err(|error| {
                tracing::warn!(%network, %currency, %error, "order creation failed");
                ApiError::from_order(error, self.expose_upstream_errors)
            })?;
        let mut phase = PhaseLog::at(&session.order_id, OrderPhase::Created);
        phase.advance(OrderPhase::Priced);

        let requirements = self.challenge.build(&session).map_err(|error| {
            tracing::error!(order_id = %session.order_id, %error, "challenge construction failed");
            ApiError::from_challenge(error)
        })?;
        phase.advance(OrderPhase::ChallengeIssued);
        tracing::info!(
            order_id = %session.order_id,
            amount = %requirements.max_amount_required,
            network = %requirements.network,
            "payment challenge issued"
        );

        Ok(PaymentRequired {
            x402_version: V1,
            error: PAYMENT_REQUIRED_MESSAGE.to_owned(),
            accepts: vec![requirements],
        })
    }

    /// Verifies, collects and fulfills a paid order.
    ///
    /// The whole request shares one deadline of `max_timeout_seconds`. Running
    /// out of time before collection reports the funds as not collected; after
    /// collection it is a fulfillment failure.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::Verification`] when the header is rejected,
    /// [`ApiError::FulfillmentFailed`] when funds were collected but dispatch
    /// failed, and the order lookup variants when the reload fails.
    pub async fn pay_order(&self, header: &str) -> Result<PaymentOutcome, ApiError> {
        let deadline = Instant::now() + self.pay_timeout;
        let expose = self.expose_upstream_errors;
        let order_id = peek_order_id(header).inspect_err(|error| {
            tracing::warn!(%error, reason = %error.reason(), "unreadable payment header");
        })?;
        let session = timeout_at(deadline, self.resolver.reload(&order_id))
            .await
            .map_err(|_| {
                tracing::warn!(%order_id, "order reload timed out");
                ApiError::Upstream {
                    message: "fulfillment platform request timed out".to_owned(),
                    detail: None,
                }
            })?
            .map_err(|error| {
                tracing::warn!(%order_id, %error, "order reload failed");
                ApiError::from_order(error, expose)
            })?;

        let payment = self.verifier.verify(header, &session).inspect_err(|error| {
            tracing::warn!(%order_id, %error, reason = %error.reason(), "payment rejected");
        })?;
        let mut phase = PhaseLog::at(&order_id, OrderPhase::ChallengeIssued);
        phase.advance(OrderPhase::PaymentVerified);

        let transfer = match timeout_at(deadline, self.collector.collect_verified(&payment)).await {
            Ok(Ok(transfer)) => transfer,
            Ok(Err(error)) => {
                tracing::warn!(%order_id, %error, "fund collection failed");
                return Ok(PaymentOutcome::collection_failed(order_id, &error, expose));
            }
            Err(_) => {
                tracing::warn!(%order_id, "fund collection did not finish before the deadline");
                return Ok(PaymentOutcome::CollectionFailed {
                    order_id,
                    error: "fund collection timed out".to_owned(),
                });
            }
        };
        phase.advance(OrderPhase::FundsCollected);

        let error = match timeout_at(deadline, self.dispatcher.dispatch(&session)).await {
            Ok(Ok(fulfillment)) => {
                phase.advance(OrderPhase::Fulfilled);
                return Ok(PaymentOutcome::Fulfilled(Box::new(PurchaseReceipt {
                    message: "Payment collected and order dispatched",
                    payment: PaymentConfirmation {
                        status: "confirmed",
                        transaction_hash: transfer.transaction_hash,
                        amount: payment.authorization.value,
                        network: session.network.clone(),
                    },
                    order: session,
                    fulfillment,
                    phase: OrderPhase::Fulfilled,
                })));
            }
            Ok(Err(error)) => {
                tracing::error!(%order_id, %error, "fulfillment dispatch failed");
                ApiError::from_dispatch(order_id.clone(), transfer.transaction_hash, &error, expose)
            }
            Err(_) => {
                tracing::error!(%order_id, "fulfillment dispatch ran past the deadline");
                ApiError::FulfillmentFailed {
                    order_id: order_id.clone(),
                    transaction_hash: transfer.transaction_hash,
                    error: "fulfillment dispatch timed out".to_owned(),
                }
            }
        };
        phase.advance(OrderPhase::FulfillmentFailed);
        tracing::error!(
            %order_id,
            critical = true,
            inbound_transaction = ?transfer.transaction_hash,
            "payment collected but fulfillment failed; manual intervention required"
        );
        Err(error)
    }

    /// Returns the current platform status and quote of an order.
    ///
    /// # Errors
    ///
    /// Returns [`ApiError::NotFound`] for unknown orders and the upstream
    /// variants when the platform fails.
    pub async fn order_status(&self, order_id: &str) -> Result<OrderStatus, ApiError> {
        let session = self
            .resolver
            .reload(order_id)
            .await
            .map_err(|error| ApiError::from_order(error, self.expose_upstream_errors))?;
        let total = total_price(session.base_price, session.fee_percent)
            .map_err(|error| ApiError::Internal(error.to_string()))?;
        Ok(OrderStatus {
            order_id: session.order_id,
            status: session.status,
            quote: StatusQuote {
                base_price: session.base_price,
                fee_percent: session.fee_percent,
                total_price: total.normalize(),
                currency: session.currency,
                network: session.network,
            },
        })
    }

    /// Lists the network/asset pairs payments are accepted in.
    #[must_use]
    pub fn supported(&self) -> SupportedResponse {
        let kinds = self
            .challenge
            .registry()
            .token_deployments()
            .filter_map(|deployment| {
                Some(SupportedKind {
                    x402_version: V1,
                    scheme: EXACT_SCHEME.to_owned(),
                    network: deployment.network.to_owned(),
                    currency: deployment.currency.to_owned(),
                    asset: deployment.token_address()?.to_string(),
                    decimals: deployment.decimals,
                })
            })
            .collect();
        SupportedResponse { kinds }
    }
}
