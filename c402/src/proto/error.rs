//! Machine-readable reason codes for rejected payments.
//!
//! Every rejected `X-PAYMENT` header is answered with one stable
//! `snake_case` [`ErrorReason`] next to the human-readable error.

use serde::{Deserialize, Serialize};

/// Machine-readable error reason codes for payment failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
#[non_exhaustive]
pub enum ErrorReason {
    /// The payment header or one of its fields is malformed.
    InvalidFormat,
    /// `x402Version` is not 1.
    UnsupportedVersion,
    /// The scheme is not `exact`.
    UnsupportedScheme,
    /// `payload.authorization` is absent.
    MissingAuthorization,
    /// `payload.signature` is absent.
    MissingSignature,
    /// The signature is not a well-formed 65-byte ECDSA signature.
    InvalidSignature,
    /// `extra.orderId` is absent.
    MissingOrderId,
    /// `extra.orderId` names a different order.
    OrderIdMismatch,
    /// The payment network differs from the order's network.
    NetworkMismatch,
    /// The authorized value differs from the amount due.
    InvalidPaymentAmount,
    /// The authorization pays someone other than the custodial wallet.
    RecipientMismatch,
    /// The authorization is not yet valid.
    InvalidPaymentEarly,
    /// The authorization has expired.
    InvalidPaymentExpired,
    /// The order's network/currency pair is not supported.
    UnsupportedAsset,
    /// An unexpected error occurred.
    UnexpectedError,
}

impl ErrorReason {
    /// Returns the `snake_case` string representation matching the wire format.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::InvalidFormat => "invalid_format",
            Self::UnsupportedVersion => "unsupported_version",
            Self::UnsupportedScheme => "unsupported_scheme",
            Self::MissingAuthorization => "missing_authorization",
            Self::MissingSignature => "missing_signature",
            Self::InvalidSignature => "invalid_signature",
            Self::MissingOrderId => "missing_order_id",
            Self::OrderIdMismatch => "order_id_mismatch",
            Self::NetworkMismatch => "network_mismatch",
            Self::InvalidPaymentAmount => "invalid_payment_amount",
            Self::RecipientMismatch => "recipient_mismatch",
            Self::InvalidPaymentEarly => "invalid_payment_early",
            Self::InvalidPaymentExpired => "invalid_payment_expired",
            Self::UnsupportedAsset => "unsupported_asset",
            Self::UnexpectedError => "unexpected_error",
        }
    }
}

impl core::fmt::Display for ErrorReason {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_as_str_matches_serde() {
        for reason in [
            ErrorReason::InvalidFormat,
            ErrorReason::OrderIdMismatch,
            ErrorReason::InvalidPaymentAmount,
            ErrorReason::InvalidPaymentExpired,
        ] {
            let json = serde_json::to_value(reason).unwrap();
            assert_eq!(json, reason.as_str());
        }
    }
}
