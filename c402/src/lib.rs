#![cfg_attr(docsrs, feature(doc_auto_cfg))]

//! Core types for the c402 order-payment facilitator.
//!
//! c402 sells physical goods from an order-fulfillment platform over the x402
//! HTTP 402 protocol. A purchase takes two requests: the first creates a priced
//! order and answers with a payment challenge, the second carries a signed
//! EIP-3009 authorization that is verified, collected into a custodial wallet,
//! and used to pay the platform.
//!
//! This crate holds everything that does not touch a chain or the network:
//!
//! - [`registry`] - Supported networks and the assets payable on them
//! - [`proto`] - x402 v1 wire types and machine-readable error reasons
//! - [`order`] - Platform orders, the platform interface, and session resolution
//! - [`challenge`] - Pricing and 402 challenge construction
//! - [`verify`] - `X-PAYMENT` verification against a reloaded order
//! - [`phase`] - The order payment state machine
//! - [`encoding`] / [`timestamp`] - Header encoding and authorization timestamps
//!
//! # Feature Flags
//!
//! - `telemetry` - Enables tracing instrumentation for debugging and monitoring

use std::future::Future;
use std::pin::Pin;

pub mod challenge;
pub mod encoding;
pub mod order;
pub mod phase;
pub mod proto;
pub mod registry;
pub mod timestamp;
pub mod verify;

/// A boxed, `Send` future used at object-safe trait seams.
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;
