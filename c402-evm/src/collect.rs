//! Fund collection: executing a verified EIP-3009 authorization.
//!
//! The payer's signed `transferWithAuthorization` is submitted by the
//! custodial wallet against the token contract, moving the funds into the
//! wallet. Submission is keyed by `<orderId>-inbound`, so a retried request
//! for the same order collects at most once.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Bytes, U256};
use alloy_sol_types::SolCall;
use c402::proto::v1::PaymentAuthorization;
use c402::registry::{AssetDeployment, AssetKind};
use c402::verify::VerifiedPayment;

use crate::contract::IEIP3009;
use crate::signature::{SignatureError, SplitSignature};
use crate::wallet::{
    ContractCall, TransactionResult, TransactionStatus, WalletError, WalletExecutor,
};

/// Suffix appended to the order id to key the inbound transfer.
pub const INBOUND_KEY_SUFFIX: &str = "-inbound";

/// Returns the idempotency key of the inbound transfer for an order.
#[must_use]
pub fn inbound_idempotency_key(order_id: &str) -> String {
    format!("{order_id}{INBOUND_KEY_SUFFIX}")
}

/// Failure to collect funds.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CollectError {
    /// The asset is the chain's native coin.
    #[error("{currency} on {network} cannot be collected by authorization")]
    UnsupportedAssetType {
        /// Network of the asset.
        network: String,
        /// Currency of the asset.
        currency: String,
    },
    /// The signature could not be split into `(v, r, s)`.
    #[error(transparent)]
    Signature(#[from] SignatureError),
    /// `authorization.value` is not a base-10 integer.
    #[error("invalid authorization value {0}")]
    InvalidAmount(String),
    /// The wallet call itself failed.
    #[error(transparent)]
    Wallet(#[from] WalletError),
    /// The transfer failed or reverted on-chain.
    #[error("transfer {transaction_id} failed: {reason}")]
    Rejected {
        /// Wallet transaction id.
        transaction_id: String,
        /// Failure description.
        reason: String,
    },
    /// The transfer did not confirm before the deadline.
    #[error("transfer {transaction_id} not confirmed in time")]
    NotConfirmed {
        /// Wallet transaction id.
        transaction_id: String,
    },
}

impl CollectError {
    /// Like the `Display` output, minus the wallet's own failure text.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Wallet(error) => error.summary(),
            Self::Rejected { transaction_id, .. } => format!("transfer {transaction_id} failed"),
            other => other.to_string(),
        }
    }
}

/// Encodes `transferWithAuthorization(from, to, value, validAfter, validBefore, nonce, v, r, s)`.
///
/// # Errors
///
/// Returns [`CollectError`] if the value is not an integer or the signature
/// cannot be normalized for `chain_id`.
pub fn encode_transfer(
    authorization: &PaymentAuthorization,
    signature: &[u8],
    chain_id: u64,
) -> Result<Bytes, CollectError> {
    let value = U256::from_str_radix(&authorization.value, 10)
        .map_err(|_| CollectError::InvalidAmount(authorization.value.clone()))?;
    let SplitSignature { v, r, s } = SplitSignature::from_bytes(signature, chain_id)?;
    let call = IEIP3009::transferWithAuthorizationCall {
        from: authorization.from,
        to: authorization.to,
        value,
        validAfter: U256::from(authorization.valid_after.as_secs()),
        validBefore: U256::from(authorization.valid_before.as_secs()),
        nonce: authorization.nonce,
        v,
        r,
        s,
    };
    Ok(call.abi_encode().into())
}

/// Moves authorized funds into the custodial wallet.
#[derive(Clone)]
pub struct FundCollector {
    executor: Arc<dyn WalletExecutor>,
}

impl fmt::Debug for FundCollector {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FundCollector").finish_non_exhaustive()
    }
}

impl FundCollector {
    /// Creates a collector submitting through `executor`.
    #[must_use]
    pub fn new(executor: Arc<dyn WalletExecutor>) -> Self {
        Self { executor }
    }

    /// Collects a [`VerifiedPayment`].
    ///
    /// # Errors
    ///
    /// See [`FundCollector::collect`].
    pub async fn collect_verified(
        &self,
        payment: &VerifiedPayment,
    ) -> Result<TransactionResult, CollectError> {
        self.collect(
            &payment.authorization,
            &payment.signature,
            &payment.asset,
            &payment.order_id,
        )
        .await
    }

    /// Executes `authorization` against the token contract of `asset`.
    ///
    /// Only a [`TransactionStatus::Success`] result is returned as `Ok`.
    ///
    /// # Errors
    ///
    /// Returns [`CollectError::UnsupportedAssetType`] for native assets before
    /// any I/O, [`CollectError::Rejected`] when the transfer failed,
    /// [`CollectError::NotConfirmed`] when it is still pending, and the
    /// remaining variants for encoding or wallet failures.
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(name = "funds.collect", skip_all, err, fields(
            order_id = %order_id,
            network = %asset.network,
            from = %authorization.from,
            value = %authorization.value,
        ))
    )]
    pub async fn collect(
        &self,
        authorization: &PaymentAuthorization,
        signature: &[u8],
        asset: &AssetDeployment,
        order_id: &str,
    ) -> Result<TransactionResult, CollectError> {
        let AssetKind::Token { address, .. } = asset.kind else {
            return Err(CollectError::UnsupportedAssetType {
                network: asset.network.to_owned(),
                currency: asset.currency.to_owned(),
            });
        };
        let data = encode_transfer(authorization, signature, asset.chain_id)?;
        let call = ContractCall {
            to: address,
            data,
            value: None,
        };
        let result = self
            .executor
            .execute(asset.network, vec![call], inbound_idempotency_key(order_id))
            .await?;

        match result.status {
            TransactionStatus::Success => {
                #[cfg(feature = "telemetry")]
                tracing::info!(
                    order_id,
                    transaction_id = %result.id,
                    tx = ?result.transaction_hash,
                    "funds collected"
                );
                Ok(result)
            }
            TransactionStatus::Failed => Err(CollectError::Rejected {
                reason: result.error.unwrap_or_else(|| "transaction failed".to_owned()),
                transaction_id: result.id,
            }),
            TransactionStatus::Pending => Err(CollectError::NotConfirmed {
                transaction_id: result.id,
            }),
        }
    }
}
