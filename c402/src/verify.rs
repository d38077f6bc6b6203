//! Verification of `X-PAYMENT` headers against a reloaded order session.
//!
//! Verification is all-or-nothing and runs its checks in a fixed order, so the
//! first failing check decides the reported [`ErrorReason`]:
//!
//! 1. the header decodes (base64, then JSON);
//! 2. `x402Version` is 1 and `scheme` is `exact`;
//! 3. `payload.authorization` and `payload.signature` are present and well formed;
//! 4. `extra.orderId` is present and names the session's order;
//! 5. `network` equals the session's network;
//! 6. `authorization.value` equals the recomputed amount, as strings;
//! 7. the authorization pays the custodial wallet inside its validity window.
//!
//! Nonce reuse is not checked here. The token contract rejects replays.

use alloy_primitives::{Address, Bytes};
use serde::Deserialize;

use crate::challenge::{ChallengeError, PaymentChallenge};
use crate::encoding::decode_header_bytes;
use crate::order::OrderSession;
use crate::proto::ErrorReason;
use crate::proto::v1::{EXACT_SCHEME, PaymentAuthorization};
use crate::registry::AssetDeployment;
use crate::timestamp::UnixTimestamp;

/// Length of an `r || s || v` ECDSA signature.
pub const SIGNATURE_LENGTH: usize = 65;

/// Seconds an authorization must remain valid beyond "now" to be accepted.
pub const EXPIRY_GRACE_SECONDS: u64 = 6;

/// Reasons a payment header is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum VerificationError {
    /// The header or one of its fields is malformed.
    #[error("Invalid format: {0}")]
    InvalidFormat(String),
    /// `x402Version` is not 1.
    #[error("Unsupported x402 version")]
    UnsupportedVersion,
    /// `scheme` is not `exact`.
    #[error("Unsupported scheme")]
    UnsupportedScheme,
    /// The authorization is missing.
    #[error("Payment authorization is missing")]
    MissingAuthorization,
    /// The signature is missing.
    #[error("Payment signature is missing")]
    MissingSignature,
    /// The signature is not 65 bytes of hex.
    #[error("Invalid signature: {0}")]
    InvalidSignature(String),
    /// `extra.orderId` is missing.
    #[error("Payment does not reference an order")]
    MissingOrderId,
    /// `extra.orderId` names another order.
    #[error("Payment references order {actual}, expected {expected}")]
    OrderIdMismatch {
        /// Order being verified.
        expected: String,
        /// Order named in the payment.
        actual: String,
    },
    /// The payment targets another network.
    #[error("Payment network {actual} does not match order network {expected}")]
    NetworkMismatch {
        /// Network of the order.
        expected: String,
        /// Network named in the payment.
        actual: String,
    },
    /// The authorized amount differs from the amount due.
    #[error("Payment amount {actual} does not match required amount {expected}")]
    InvalidPaymentAmount {
        /// Amount due, in atomic units.
        expected: String,
        /// Amount authorized.
        actual: String,
    },
    /// The authorization pays another address.
    #[error("Payment recipient is invalid with respect to the payment requirements")]
    RecipientMismatch,
    /// The authorization has expired or is about to.
    #[error("Payment authorization is expired")]
    Expired,
    /// The authorization is not yet valid.
    #[error("Payment authorization is not yet valid")]
    Early,
    /// The amount due could not be computed for the order.
    #[error(transparent)]
    Pricing(#[from] ChallengeError),
}

impl VerificationError {
    /// Returns the machine-readable reason code.
    #[must_use]
    pub const fn reason(&self) -> ErrorReason {
        match self {
            Self::InvalidFormat(_) => ErrorReason::InvalidFormat,
            Self::UnsupportedVersion => ErrorReason::UnsupportedVersion,
            Self::UnsupportedScheme => ErrorReason::UnsupportedScheme,
            Self::MissingAuthorization => ErrorReason::MissingAuthorization,
            Self::MissingSignature => ErrorReason::MissingSignature,
            Self::InvalidSignature(_) => ErrorReason::InvalidSignature,
            Self::MissingOrderId => ErrorReason::MissingOrderId,
            Self::OrderIdMismatch { .. } => ErrorReason::OrderIdMismatch,
            Self::NetworkMismatch { .. } => ErrorReason::NetworkMismatch,
            Self::InvalidPaymentAmount { .. } => ErrorReason::InvalidPaymentAmount,
            Self::RecipientMismatch => ErrorReason::RecipientMismatch,
            Self::Expired => ErrorReason::InvalidPaymentExpired,
            Self::Early => ErrorReason::InvalidPaymentEarly,
            Self::Pricing(
                ChallengeError::UnsupportedAsset(_) | ChallengeError::UnsupportedAssetType { .. },
            ) => {
                ErrorReason::UnsupportedAsset
            }
            Self::Pricing(_) => ErrorReason::UnexpectedError,
        }
    }
}

/// A payment that passed every check for its order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerifiedPayment {
    /// Order the payment is for.
    pub order_id: String,
    /// Asset the payment is made in.
    pub asset: AssetDeployment,
    /// The signed authorization.
    pub authorization: PaymentAuthorization,
    /// The 65-byte signature over `authorization`.
    pub signature: Bytes,
}

// Every field is optional so that each check can report its own reason
// instead of a generic decode error.
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LoosePayload {
    x402_version: Option<serde_json::Value>,
    scheme: Option<String>,
    network: Option<String>,
    payload: Option<LooseExact>,
    extra: Option<LooseExtra>,
}

#[derive(Deserialize)]
struct LooseExact {
    authorization: Option<serde_json::Value>,
    signature: Option<String>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct LooseExtra {
    order_id: Option<String>,
}

fn decode(header: &str) -> Result<LoosePayload, VerificationError> {
    let bytes =
        decode_header_bytes(header).map_err(|e| VerificationError::InvalidFormat(e.to_string()))?;
    serde_json::from_slice(&bytes).map_err(|e| VerificationError::InvalidFormat(e.to_string()))
}

fn assert_protocol(raw: &LoosePayload) -> Result<(), VerificationError> {
    if raw.x402_version.as_ref().and_then(serde_json::Value::as_u64) != Some(1) {
        return Err(VerificationError::UnsupportedVersion);
    }
    if raw.scheme.as_deref() != Some(EXACT_SCHEME) {
        return Err(VerificationError::UnsupportedScheme);
    }
    Ok(())
}

/// Extracts `extra.orderId` from a payment header without verifying it.
///
/// Used to find out which order to reload before calling
/// [`PaymentVerifier::verify`].
///
/// # Errors
///
/// Returns [`VerificationError`] if the header does not decode, is not an
/// x402 v1 `exact` payment, or carries no order id.
pub fn peek_order_id(header: &str) -> Result<String, VerificationError> {
    let raw = decode(header)?;
    assert_protocol(&raw)?;
    raw.extra
        .and_then(|extra| extra.order_id)
        .filter(|id| !id.is_empty())
        .ok_or(VerificationError::MissingOrderId)
}

/// Checks the authorization's validity window against `now`.
///
/// `validBefore` must leave at least [`EXPIRY_GRACE_SECONDS`] for execution.
///
/// # Errors
///
/// Returns [`VerificationError::Expired`] or [`VerificationError::Early`].
pub fn assert_time(
    valid_after: UnixTimestamp,
    valid_before: UnixTimestamp,
    now: UnixTimestamp,
) -> Result<(), VerificationError> {
    if valid_before < now + EXPIRY_GRACE_SECONDS {
        return Err(VerificationError::Expired);
    }
    if valid_after > now {
        return Err(VerificationError::Early);
    }
    Ok(())
}

/// Verifies payment headers against freshly loaded order sessions.
#[derive(Debug, Clone)]
pub struct PaymentVerifier {
    challenge: PaymentChallenge,
}

impl PaymentVerifier {
    /// Creates a verifier that prices orders the way `challenge` does.
    #[must_use]
    pub const fn new(challenge: PaymentChallenge) -> Self {
        Self { challenge }
    }

    /// Verifies `header` against `session` at the current time.
    ///
    /// # Errors
    ///
    /// Returns the first failing check as a [`VerificationError`].
    #[cfg_attr(
        feature = "telemetry",
        tracing::instrument(
            name = "payment.verify",
            skip_all,
            err,
            fields(order_id = %session.order_id)
        )
    )]
    pub fn verify(
        &self,
        header: &str,
        session: &OrderSession,
    ) -> Result<VerifiedPayment, VerificationError> {
        self.verify_at(header, session, UnixTimestamp::now())
    }

    /// Verifies `header` against `session` as of `now`.
    ///
    /// # Errors
    ///
    /// Returns the first failing check as a [`VerificationError`].
    pub fn verify_at(
        &self,
        header: &str,
        session: &OrderSession,
        now: UnixTimestamp,
    ) -> Result<VerifiedPayment, VerificationError> {
        let raw = decode(header)?;
        assert_protocol(&raw)?;

        let exact = raw.payload.ok_or(VerificationError::MissingAuthorization)?;
        let authorization = exact
            .authorization
            .filter(|value| !value.is_null())
            .ok_or(VerificationError::MissingAuthorization)?;
        let signature = exact.signature.ok_or(VerificationError::MissingSignature)?;
        let authorization: PaymentAuthorization = serde_json::from_value(authorization)
            .map_err(|e| VerificationError::InvalidFormat(format!("authorization: {e}")))?;
        let signature = parse_signature(&signature)?;

        let order_id = raw
            .extra
            .and_then(|extra| extra.order_id)
            .filter(|id| !id.is_empty())
            .ok_or(VerificationError::MissingOrderId)?;
        if order_id != session.order_id {
            return Err(VerificationError::OrderIdMismatch {
                expected: session.order_id.clone(),
                actual: order_id,
            });
        }

        let network = raw.network.unwrap_or_default();
        if network != session.network {
            return Err(VerificationError::NetworkMismatch {
                expected: session.network.clone(),
                actual: network,
            });
        }

        let expected = self.challenge.expected_amount(session)?;
        if authorization.value != expected {
            return Err(VerificationError::InvalidPaymentAmount {
                expected,
                actual: authorization.value,
            });
        }

        if authorization.to != self.challenge.pay_to() {
            return Err(VerificationError::RecipientMismatch);
        }
        assert_time(authorization.valid_after, authorization.valid_before, now)?;

        let asset = self
            .challenge
            .registry()
            .resolve(&session.network, &session.currency)
            .map_err(ChallengeError::from)?;
        Ok(VerifiedPayment {
            order_id,
            asset,
            authorization,
            signature,
        })
    }

    /// Returns the custodial address payments must be made to.
    #[must_use]
    pub const fn pay_to(&self) -> Address {
        self.challenge.pay_to()
    }
}

fn parse_signature(hex: &str) -> Result<Bytes, VerificationError> {
    let bytes: Bytes = hex
        .parse()
        .map_err(|e| VerificationError::InvalidSignature(format!("{e}")))?;
    if bytes.len() != SIGNATURE_LENGTH {
        return Err(VerificationError::InvalidSignature(format!(
            "expected {SIGNATURE_LENGTH} bytes, got {}",
            bytes.len()
        )));
    }
    Ok(bytes)
}
