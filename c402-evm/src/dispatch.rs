//! Fulfillment dispatch: paying the platform from the custodial wallet.
//!
//! Runs only after funds have been collected. If the platform prepared a
//! settlement transaction for the order, the wallet executes it under the
//! order id as idempotency key; otherwise the platform settles on its side and
//! there is nothing to send.
//!
//! A failure here is never rolled back. The caller reports it as
//! "payment confirmed, fulfillment failed" and an operator takes over.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::B256;
use c402::order::{OrderSession, OrderSessionResolver};
use serde::Serialize;

use crate::wallet::{ContractCall, TransactionStatus, WalletError, WalletExecutor};

/// How an order's settlement was performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Settlement {
    /// The prepared transaction was executed by the wallet.
    Submitted,
    /// The platform needed no transaction from us.
    AlreadySettled,
}

/// Outcome of a successful dispatch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FulfillmentResult {
    /// Order that was dispatched.
    pub order_id: String,
    /// Platform status after dispatch, or the last known one.
    pub status: String,
    /// Settlement transaction hash, when one was sent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub transaction_hash: Option<B256>,
    /// How settlement happened.
    pub settlement: Settlement,
}

/// Failure to dispatch fulfillment.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DispatchError {
    /// The wallet call itself failed.
    #[error(transparent)]
    Wallet(#[from] WalletError),
    /// The settlement transaction failed on-chain.
    #[error("settlement {transaction_id} failed: {reason}")]
    Rejected {
        /// Wallet transaction id.
        transaction_id: String,
        /// Failure description.
        reason: String,
    },
    /// The settlement transaction did not confirm in time.
    #[error("settlement {transaction_id} not confirmed in time")]
    NotConfirmed {
        /// Wallet transaction id.
        transaction_id: String,
    },
}

impl DispatchError {
    /// Like the `Display` output, minus the wallet's own failure text.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Wallet(error) => error.summary(),
            Self::Rejected { transaction_id, .. } => format!("settlement {transaction_id} failed"),
            Self::NotConfirmed { .. } => self.to_string(),
        }
    }
}

/// Pays the platform for collected orders.
#[derive(Clone)]
pub struct FulfillmentDispatcher {
    executor: Arc<dyn WalletExecutor>,
    resolver: OrderSessionResolver,
}

impl fmt::Debug for FulfillmentDispatcher {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FulfillmentDispatcher")
            .field("resolver", &self.resolver)
            .finish_non_exhaustive()
    }
}

impl FulfillmentDispatcher {
    /// Creates a dispatcher sending through `executor` and re-reading order
    /// status through `resolver`.
    #[must_use]
    pub fn new(executor: Arc<dyn WalletExecutor>, resolver: OrderSessionResolver) -> Self {
        Self { executor, resolver }
    }

    /// Dispatches fulfillment for `session`.
    ///
    /// # Errors
    ///
    /// Returns [`DispatchError`] if the prepared transaction could not be
    /// executed. A failing status re-fetch afterwards is not an error.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(
            name = "fulfillment.dispatch",
            skip_all,
            err,
            fields(order_id = %session.order_id)
        )
    )]
    pub async fn dispatch(
        &self,
        session: &OrderSession,
    ) -> Result<FulfillmentResult, DispatchError> {
        let Some(prepared) = &session.prepared_transaction else {
            return Ok(FulfillmentResult {
                order_id: session.order_id.clone(),
                status: session.status.clone(),
                transaction_hash: None,
                settlement: Settlement::AlreadySettled,
            });
        };

        let call = ContractCall {
            to: prepared.to,
            data: prepared.data.clone(),
            value: prepared.value,
        };
        let result = self
            .executor
            .execute(&session.network, vec![call], session.order_id.clone())
            .await?;
        match result.status {
            TransactionStatus::Success => {}
            TransactionStatus::Failed => {
                return Err(DispatchError::Rejected {
                    reason: result.error.unwrap_or_else(|| "transaction failed".to_owned()),
                    transaction_id: result.id,
                });
            }
            TransactionStatus::Pending => {
                return Err(DispatchError::NotConfirmed {
                    transaction_id: result.id,
                });
            }
        }

        let status = match self.resolver.reload(&session.order_id).await {
            Ok(fresh) => fresh.status,
            Err(error) => {
                #[cfg(feature = "telemetry")]
                tracing::warn!(
                    order_id = %session.order_id,
                    error = %error,
                    "order status refresh failed after dispatch, keeping last known status"
                );
                #[cfg(not(feature = "telemetry"))]
                let _ = error;
                session.status.clone()
            }
        };
        Ok(FulfillmentResult {
            order_id: session.order_id.clone(),
            status,
            transaction_hash: result.transaction_hash,
            settlement: Settlement::Submitted,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::{Address, Bytes};
    use c402::BoxFuture;
    use c402::order::{
        CreateOrder, FulfillmentPlatform, OrderQuote, PlatformError, PlatformOrder,
        PreparedTransaction,
    };
    use c402::registry::AssetRegistry;
    use rust_decimal::Decimal;
    use std::sync::Mutex;

    use crate::wallet::TransactionResult;

    struct Platform {
        reload: Result<PlatformOrder, PlatformError>,
    }

    impl FulfillmentPlatform for Platform {
        fn create_order(
            &self,
            _order: CreateOrder,
        ) -> BoxFuture<'_, Result<PlatformOrder, PlatformError>> {
            Box::pin(async { Err(PlatformError::Unavailable("not used".into())) })
        }

        fn get_order<'a>(
            &'a self,
            _order_id: &'a str,
        ) -> BoxFuture<'a, Result<PlatformOrder, PlatformError>> {
            let reload = self.reload.clone();
            Box::pin(async move { reload })
        }
    }

    struct Executor {
        status: TransactionStatus,
        keys: Mutex<Vec<String>>,
    }

    impl WalletExecutor for Executor {
        fn execute(
            &self,
            _network: &str,
            _calls: Vec<ContractCall>,
            idempotency_key: String,
        ) -> BoxFuture<'_, Result<TransactionResult, WalletError>> {
            self.keys.lock().unwrap().push(idempotency_key);
            let status = self.status;
            Box::pin(async move {
                Ok(TransactionResult {
                    id: "tx_out".into(),
                    transaction_hash: Some(B256::repeat_byte(9)),
                    status,
                    error: None,
                })
            })
        }
    }

    fn platform_order(status: &str) -> PlatformOrder {
        PlatformOrder {
            order_id: "ord_1".into(),
            status: status.into(),
            quote: OrderQuote {
                total_price: Decimal::new(180, 2),
                currency: "usdc".into(),
            },
            network: "base-sepolia".into(),
            currency: "usdc".into(),
            prepared_transaction: None,
            product_locator: None,
            recipient: None,
        }
    }

    fn session(prepared: bool) -> OrderSession {
        OrderSession {
            order_id: "ord_1".into(),
            product_locator: None,
            recipient: None,
            network: "base-sepolia".into(),
            currency: "usdc".into(),
            base_price: Decimal::new(180, 2),
            fee_percent: Decimal::ZERO,
            status: "awaiting-payment".into(),
            prepared_transaction: prepared.then(|| PreparedTransaction {
                to: Address::repeat_byte(0x44),
                data: Bytes::from_static(&[1, 2, 3]),
                value: None,
            }),
        }
    }

    fn make_dispatcher(
        status: TransactionStatus,
        reload: Result<PlatformOrder, PlatformError>,
    ) -> (FulfillmentDispatcher, Arc<Executor>) {
        let executor = Arc::new(Executor {
            status,
            keys: Mutex::new(Vec::new()),
        });
        let resolver = OrderSessionResolver::new(
            Arc::new(Platform { reload }),
            AssetRegistry::default(),
            Decimal::ZERO,
            "wallet-1",
        );
        (
            FulfillmentDispatcher::new(Arc::clone(&executor) as Arc<dyn WalletExecutor>, resolver),
            executor,
        )
    }

    #[tokio::test]
    async fn test_dispatch_submits_prepared_transaction() {
        let (dispatcher, executor) =
            make_dispatcher(TransactionStatus::Success, Ok(platform_order("in-progress")));
        let result = dispatcher.dispatch(&session(true)).await.unwrap();
        assert_eq!(result.settlement, Settlement::Submitted);
        assert_eq!(result.status, "in-progress");
        assert_eq!(result.transaction_hash, Some(B256::repeat_byte(9)));
        assert_eq!(executor.keys.lock().unwrap().as_slice(), ["ord_1"]);
    }

    #[tokio::test]
    async fn test_dispatch_without_preparation_is_immediate() {
        let (dispatcher, executor) =
            make_dispatcher(TransactionStatus::Success, Err(PlatformError::NotFound));
        let result = dispatcher.dispatch(&session(false)).await.unwrap();
        assert_eq!(result.settlement, Settlement::AlreadySettled);
        assert_eq!(result.status, "awaiting-payment");
        assert!(executor.keys.lock().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_refresh_failure_keeps_last_status() {
        let (dispatcher, _) = make_dispatcher(
            TransactionStatus::Success,
            Err(PlatformError::Unavailable("down".into())),
        );
        let result = dispatcher.dispatch(&session(true)).await.unwrap();
        assert_eq!(result.status, "awaiting-payment");
        assert_eq!(result.settlement, Settlement::Submitted);
    }

    #[tokio::test]
    async fn test_failed_settlement_is_an_error() {
        let (dispatcher, _) = make_dispatcher(TransactionStatus::Failed, Ok(platform_order("x")));
        assert!(matches!(
            dispatcher.dispatch(&session(true)).await,
            Err(DispatchError::Rejected { .. })
        ));
        let (dispatcher, _) = dispatcher_pending();
        assert!(matches!(
            dispatcher.dispatch(&session(true)).await,
            Err(DispatchError::NotConfirmed { .. })
        ));
    }

    fn dispatcher_pending() -> (FulfillmentDispatcher, Arc<Executor>) {
        make_dispatcher(TransactionStatus::Pending, Ok(platform_order("x")))
    }
}
