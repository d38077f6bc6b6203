//! Protocol types for x402 payment messages.
//!
//! This module defines the wire format exchanged between the commerce client
//! and the facilitator. Only protocol version 1 is spoken: networks are named
//! (`"base"`, `"base-sepolia"`, ...) and the payment travels base64-encoded in
//! the `X-PAYMENT` request header.
//!
//! # Wire Format
//!
//! All types serialize to JSON using camelCase field names. The protocol version
//! is indicated by the `x402Version` field.

pub mod error;
pub mod v1;

pub use error::ErrorReason;
pub use v1::*;

/// Request header carrying the base64 JSON [`PaymentPayload`].
pub const PAYMENT_HEADER: &str = "X-PAYMENT";
