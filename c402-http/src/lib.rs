#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! HTTP clients for the services the c402 facilitator depends on.
//!
//! # Modules
//!
//! - [`client`] — Authenticated JSON requests and the shared [`ClientError`]
//! - [`platform`] — Order-fulfillment platform client, implementing
//!   [`c402::order::FulfillmentPlatform`]
//! - [`wallet`] — Custodial wallet client with confirmation polling,
//!   implementing [`c402_evm::wallet::WalletBackend`]
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing spans around every outbound request

pub mod client;
pub mod platform;
pub mod wallet;

pub use client::{API_KEY_HEADER, ClientError};
pub use platform::PlatformClient;
pub use wallet::WalletClient;
