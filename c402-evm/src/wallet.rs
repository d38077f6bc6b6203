//! Custodial wallet execution.
//!
//! The facilitator never holds keys. Every on-chain action is a contract call
//! handed to a custodial wallet service, which signs, broadcasts, and reports
//! the outcome. Two seams separate the concerns:
//!
//! - [`WalletBackend`] is the transport: it submits a [`WalletSubmission`] and
//!   waits, within its own deadline, for a [`TransactionResult`];
//! - [`WalletExecutor`] decides how calls are packaged for the backend. Some
//!   wallets take a single call object, others an array of calls. The choice is
//!   made once, from configuration, via [`executor_for`].
//!
//! Every submission carries an idempotency key. Replaying a key must return
//! the original transaction instead of sending a second one.

use std::fmt;
use std::sync::Arc;

use alloy_primitives::{Address, B256, Bytes, U256};
use c402::BoxFuture;
use serde::{Deserialize, Serialize};

/// One contract call to execute.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContractCall {
    /// Target contract.
    pub to: Address,
    /// ABI-encoded calldata.
    pub data: Bytes,
    /// Native value to send with the call.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub value: Option<U256>,
}

/// Calls as sent to the wallet, in the shape it accepts.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum CallPayload {
    /// A single call object.
    Single(ContractCall),
    /// An array of calls executed atomically.
    Batch(Vec<ContractCall>),
}

/// A transaction request handed to a [`WalletBackend`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WalletSubmission {
    /// x402 v1 network name the wallet should use.
    pub network: String,
    /// Calls in the wallet's accepted shape.
    pub calls: CallPayload,
    /// Key that makes resubmission a no-op.
    pub idempotency_key: String,
}

/// Outcome reported by the wallet.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Not yet final.
    Pending,
    /// Mined and successful.
    Success,
    /// Rejected, reverted, or dropped.
    Failed,
}

impl TransactionStatus {
    /// Returns `true` once the wallet will not change the status any more.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        !matches!(self, Self::Pending)
    }
}

impl fmt::Display for TransactionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Pending => "pending",
            Self::Success => "success",
            Self::Failed => "failed",
        })
    }
}

/// A wallet transaction as last observed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionResult {
    /// Wallet-assigned transaction id.
    pub id: String,
    /// On-chain transaction hash, once broadcast.
    pub transaction_hash: Option<B256>,
    /// Current status.
    pub status: TransactionStatus,
    /// Wallet-provided failure description.
    pub error: Option<String>,
}

/// Failure to get a transaction through the wallet.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum WalletError {
    /// The wallet service could not be reached or failed internally.
    #[error("wallet unavailable: {0}")]
    Unavailable(String),
    /// The wallet refused the request.
    #[error("wallet rejected request ({status}): {message}")]
    Rejected {
        /// HTTP status returned.
        status: u16,
        /// Wallet-provided message.
        message: String,
    },
    /// The wallet answered with something unparseable.
    #[error("invalid response from wallet: {0}")]
    InvalidResponse(String),
    /// The executor cannot package this many calls.
    #[error("wallet accepts exactly one call, got {0}")]
    CallCount(usize),
}

impl WalletError {
    /// Describes the failure by kind and status only, leaving out anything
    /// the wallet service wrote.
    #[must_use]
    pub fn summary(&self) -> String {
        match self {
            Self::Unavailable(_) => "wallet unavailable".to_owned(),
            Self::Rejected { status, .. } => format!("wallet rejected request ({status})"),
            Self::InvalidResponse(_) => "invalid response from wallet".to_owned(),
            Self::CallCount(_) => self.to_string(),
        }
    }
}

/// Transport to a custodial wallet service.
pub trait WalletBackend: Send + Sync {
    /// Submits a transaction and waits for it to leave the pending state.
    ///
    /// A result still [`TransactionStatus::Pending`] means the backend's
    /// deadline passed first.
    fn submit(
        &self,
        submission: WalletSubmission,
    ) -> BoxFuture<'_, Result<TransactionResult, WalletError>>;
}

/// Executes contract calls through a custodial wallet.
pub trait WalletExecutor: Send + Sync {
    /// Executes `calls` on `network` under `idempotency_key`.
    fn execute(
        &self,
        network: &str,
        calls: Vec<ContractCall>,
        idempotency_key: String,
    ) -> BoxFuture<'_, Result<TransactionResult, WalletError>>;
}

/// Sends exactly one call as a bare object.
#[derive(Clone)]
pub struct SingleCallExecutor {
    backend: Arc<dyn WalletBackend>,
}

impl SingleCallExecutor {
    /// Creates an executor over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn WalletBackend>) -> Self {
        Self { backend }
    }
}

impl fmt::Debug for SingleCallExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SingleCallExecutor").finish_non_exhaustive()
    }
}

impl WalletExecutor for SingleCallExecutor {
    fn execute(
        &self,
        network: &str,
        mut calls: Vec<ContractCall>,
        idempotency_key: String,
    ) -> BoxFuture<'_, Result<TransactionResult, WalletError>> {
        let network = network.to_owned();
        Box::pin(async move {
            if calls.len() != 1 {
                return Err(WalletError::CallCount(calls.len()));
            }
            let call = calls.remove(0);
            self.backend
                .submit(WalletSubmission {
                    network,
                    calls: CallPayload::Single(call),
                    idempotency_key,
                })
                .await
        })
    }
}

/// Sends calls as an array.
#[derive(Clone)]
pub struct BatchCallExecutor {
    backend: Arc<dyn WalletBackend>,
}

impl BatchCallExecutor {
    /// Creates an executor over `backend`.
    #[must_use]
    pub fn new(backend: Arc<dyn WalletBackend>) -> Self {
        Self { backend }
    }
}

impl fmt::Debug for BatchCallExecutor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BatchCallExecutor").finish_non_exhaustive()
    }
}

impl WalletExecutor for BatchCallExecutor {
    fn execute(
        &self,
        network: &str,
        calls: Vec<ContractCall>,
        idempotency_key: String,
    ) -> BoxFuture<'_, Result<TransactionResult, WalletError>> {
        let submission = WalletSubmission {
            network: network.to_owned(),
            calls: CallPayload::Batch(calls),
            idempotency_key,
        };
        self.backend.submit(submission)
    }
}

/// Call shape a wallet accepts.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CallShape {
    /// One call object per transaction.
    Single,
    /// An array of calls per transaction.
    #[default]
    Batch,
}

/// Builds the executor matching a wallet's call shape.
#[must_use]
pub fn executor_for(shape: CallShape, backend: Arc<dyn WalletBackend>) -> Arc<dyn WalletExecutor> {
    match shape {
        CallShape::Single => Arc::new(SingleCallExecutor::new(backend)),
        CallShape::Batch => Arc::new(BatchCallExecutor::new(backend)),
    }
}
