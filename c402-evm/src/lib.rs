#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! EVM execution for the c402 order facilitator.
//!
//! Everything that ends in an on-chain transaction lives here. The facilitator
//! holds no keys: transactions are executed by a custodial wallet behind the
//! [`wallet::WalletExecutor`] trait.
//!
//! # Modules
//!
//! - [`contract`] - `sol!` bindings for EIP-3009 `transferWithAuthorization`
//! - [`signature`] - Splitting signatures and normalizing the recovery id
//! - [`wallet`] - Custodial wallet seams and the single/batch call executors
//! - [`collect`] - Executing a verified authorization into the custodial wallet
//! - [`dispatch`] - Paying the fulfillment platform after collection
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

pub mod collect;
pub mod contract;
pub mod dispatch;
pub mod signature;
pub mod wallet;

pub use collect::{CollectError, FundCollector};
pub use dispatch::{DispatchError, FulfillmentDispatcher, FulfillmentResult};
pub use wallet::{CallShape, WalletBackend, WalletExecutor, executor_for};
