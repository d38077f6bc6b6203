//! Protocol version 1 (V1) wire types.
//!
//! V1 identifies networks by name (e.g. `"base-sepolia"`) and carries the
//! payment in the legacy `X-PAYMENT` header. Order correlation rides in the
//! `extra.orderId` field of both the challenge and the payload.
//!
//! # Key Types
//!
//! - [`PaymentRequired`] - HTTP 402 response body
//! - [`PaymentRequirements`] - Payment terms for one order
//! - [`PaymentPayload`] - Signed payment authorization from the buyer
//! - [`PaymentAuthorization`] - EIP-3009 `transferWithAuthorization` message
//! - [`SupportedResponse`] - Payment kinds accepted by this facilitator

use alloy_primitives::{Address, B256, Bytes};
use serde::de::{Error as _, Unexpected};
use serde::{Deserialize, Deserializer, Serialize, Serializer};

use crate::timestamp::UnixTimestamp;

/// The `x402Version` field of every v1 message.
///
/// Serializes as the integer `1`; any other value fails to deserialize.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash)]
pub struct X402Version1;

impl X402Version1 {
    /// Numeric protocol version.
    pub const VALUE: u8 = 1;
}

impl Serialize for X402Version1 {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u8(Self::VALUE)
    }
}

impl<'de> Deserialize<'de> for X402Version1 {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        match u64::deserialize(deserializer)? {
            1 => Ok(Self),
            other => Err(D::Error::invalid_value(Unexpected::Unsigned(other), &"x402 version 1")),
        }
    }
}

/// Shorthand for constructing v1 messages.
pub const V1: X402Version1 = X402Version1;

/// The only payment scheme this facilitator settles.
pub const EXACT_SCHEME: &str = "exact";

/// Payment requirements for a single priced order.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequirements {
    /// The payment scheme, always `"exact"`.
    pub scheme: String,
    /// The network name (e.g., "base-sepolia").
    pub network: String,
    /// Exact amount due, in the asset's atomic units, as a decimal string.
    pub max_amount_required: String,
    /// The resource being paid for.
    pub resource: String,
    /// Human-readable description of the purchase.
    pub description: String,
    /// MIME type of the resource response.
    pub mime_type: String,
    /// Custodial receiving address.
    pub pay_to: String,
    /// Maximum time in seconds for payment validity.
    pub max_timeout_seconds: u64,
    /// The token contract address.
    pub asset: String,
    /// Order correlation and EIP-712 domain hints.
    pub extra: RequirementsExtra,
}

/// The `extra` block of [`PaymentRequirements`].
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequirementsExtra {
    /// Platform order identifier the payment must reference.
    pub order_id: String,
    /// Token name as used in its EIP-712 domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    /// Token version as used in its EIP-712 domain.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub version: Option<String>,
}

/// HTTP 402 Payment Required response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequired {
    /// Protocol version (always 1).
    pub x402_version: X402Version1,
    /// Why payment is required.
    pub error: String,
    /// Acceptable payment methods; exactly one per order.
    pub accepts: Vec<PaymentRequirements>,
}

/// EIP-3009 `transferWithAuthorization` message signed by the payer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentAuthorization {
    /// The address authorizing the transfer (token owner).
    pub from: Address,
    /// The recipient address for the transfer.
    pub to: Address,
    /// Amount in atomic units, kept as the exact string the client signed.
    pub value: String,
    /// The authorization is not valid before this timestamp (inclusive).
    pub valid_after: UnixTimestamp,
    /// The authorization expires at this timestamp (exclusive).
    pub valid_before: UnixTimestamp,
    /// A unique 32-byte nonce to prevent replay.
    pub nonce: B256,
}

/// The scheme-specific part of a [`PaymentPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExactPayload {
    /// The signed authorization message.
    pub authorization: PaymentAuthorization,
    /// 65-byte ECDSA signature over the EIP-712 digest of `authorization`.
    pub signature: Bytes,
}

/// The `extra` block of a [`PaymentPayload`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PayloadExtra {
    /// Echo of the challenge's `extra.orderId`.
    pub order_id: String,
}

/// A signed payment sent back by the client in the `X-PAYMENT` header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentPayload {
    /// Protocol version (always 1).
    pub x402_version: X402Version1,
    /// The payment scheme (e.g., "exact").
    pub scheme: String,
    /// The network name (e.g., "base-sepolia").
    pub network: String,
    /// The scheme-specific signed payload.
    pub payload: ExactPayload,
    /// Order correlation.
    pub extra: PayloadExtra,
}

/// A payment kind accepted by this facilitator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SupportedKind {
    /// Protocol version (always 1).
    pub x402_version: X402Version1,
    /// The payment scheme.
    pub scheme: String,
    /// The network name.
    pub network: String,
    /// Currency code of the accepted asset.
    pub currency: String,
    /// Token contract address.
    pub asset: String,
    /// Token decimals.
    pub decimals: u8,
}

/// Response body of `GET /supported`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SupportedResponse {
    /// Every accepted network/asset pair.
    pub kinds: Vec<SupportedKind>,
}
