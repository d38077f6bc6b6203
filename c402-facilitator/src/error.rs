//! Error responses of the facilitator API.

use alloy_primitives::B256;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use c402::challenge::ChallengeError;
use c402::order::OrderError;
use c402::proto::ErrorReason;
use c402::verify::VerificationError;
use c402_evm::DispatchError;
use serde_json::json;

/// Errors returned by the facilitator API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// The request is missing fields or names an unsupported asset.
    #[error("{message}")]
    Validation {
        /// What is wrong with the request.
        message: String,
        /// Machine-readable reason, when one applies.
        reason: Option<ErrorReason>,
    },

    /// The `X-PAYMENT` header failed verification.
    #[error("payment verification failed: {0}")]
    Verification(#[from] VerificationError),

    /// The order does not exist on the platform.
    #[error("order {0} not found")]
    NotFound(String),

    /// The platform is throttling requests.
    #[error("fulfillment platform rate limited the request")]
    RateLimited,

    /// The platform or wallet failed.
    #[error("{message}")]
    Upstream {
        /// Client-facing message.
        message: String,
        /// Raw upstream detail, only set when exposing upstream errors.
        detail: Option<String>,
    },

    /// Funds were collected but the order could not be fulfilled.
    #[error("payment confirmed for order {order_id} but fulfillment failed: {error}")]
    FulfillmentFailed {
        /// The affected order.
        order_id: String,
        /// Hash of the inbound transfer.
        transaction_hash: Option<B256>,
        /// Why dispatch failed.
        error: String,
    },

    /// An unexpected internal fault.
    #[error("internal error: {0}")]
    Internal(String),
}

impl ApiError {
    /// Creates a validation error without a machine-readable reason.
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation {
            message: message.into(),
            reason: None,
        }
    }

    /// Maps an [`OrderError`], keeping upstream detail only if `expose` is set.
    #[must_use]
    pub fn from_order(error: OrderError, expose: bool) -> Self {
        match error {
            OrderError::UnsupportedAsset(e) => Self::Validation {
                message: e.to_string(),
                reason: Some(ErrorReason::UnsupportedAsset),
            },
            OrderError::OrderNotFound(id) => Self::NotFound(id),
            OrderError::RateLimited => Self::RateLimited,
            other @ (OrderError::Upstream(_) | OrderError::InvalidQuote { .. }) => Self::Upstream {
                message: "fulfillment platform request failed".to_owned(),
                detail: expose.then(|| other.to_string()),
            },
        }
    }

    /// Maps a dispatch failure after collection. The wallet's own failure text
    /// is kept only if `expose` is set.
    #[must_use]
    pub fn from_dispatch(
        order_id: String,
        transaction_hash: Option<B256>,
        error: &DispatchError,
        expose: bool,
    ) -> Self {
        Self::FulfillmentFailed {
            order_id,
            transaction_hash,
            error: if expose { error.to_string() } else { error.summary() },
        }
    }

    /// Maps a pricing failure while building a challenge.
    #[must_use]
    pub fn from_challenge(error: ChallengeError) -> Self {
        match error {
            ChallengeError::UnsupportedAsset(_) | ChallengeError::UnsupportedAssetType { .. } => {
                Self::Validation {
                    message: error.to_string(),
                    reason: Some(ErrorReason::UnsupportedAsset),
                }
            }
            other => Self::Internal(other.to_string()),
        }
    }

    /// The HTTP status this error is reported with.
    #[must_use]
    pub const fn status(&self) -> StatusCode {
        match self {
            Self::Validation { .. } | Self::Verification(_) => StatusCode::BAD_REQUEST,
            Self::NotFound(_) => StatusCode::NOT_FOUND,
            Self::RateLimited => StatusCode::TOO_MANY_REQUESTS,
            Self::Upstream { .. } => StatusCode::BAD_GATEWAY,
            Self::FulfillmentFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            Self::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let body = match &self {
            Self::Validation {
                reason: Some(reason), ..
            } => json!({ "error": self.to_string(), "reason": reason }),
            Self::Verification(e) => json!({ "error": self.to_string(), "reason": e.reason() }),
            Self::Upstream {
                detail: Some(detail), ..
            } => json!({ "error": self.to_string(), "details": detail }),
            Self::RateLimited => json!({ "error": self.to_string(), "retryable": true }),
            Self::FulfillmentFailed {
                order_id,
                transaction_hash,
                error,
            } => json!({
                "error": "Payment confirmed but fulfillment failed",
                "critical": true,
                "retryable": false,
                "orderId": order_id,
                "payment": {
                    "status": "confirmed",
                    "transactionHash": transaction_hash,
                },
                "fulfillment": {
                    "status": "failed",
                    "error": error,
                },
            }),
            _ => json!({ "error": self.to_string() }),
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use c402::order::PlatformError;
    use c402_evm::wallet::WalletError;

    #[test]
    fn test_order_error_mapping() {
        assert_eq!(
            ApiError::from_order(OrderError::OrderNotFound("ord".into()), false).status(),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            ApiError::from_order(OrderError::RateLimited, false).status(),
            StatusCode::TOO_MANY_REQUESTS
        );
        let upstream = OrderError::Upstream(PlatformError::Unavailable("db on fire".into()));
        assert!(matches!(
            ApiError::from_order(upstream.clone(), false),
            ApiError::Upstream { detail: None, .. }
        ));
        let ApiError::Upstream {
            detail: Some(detail), ..
        } = ApiError::from_order(upstream, true)
        else {
            panic!("expected upstream detail");
        };
        assert!(detail.contains("db on fire"));
    }

    #[test]
    fn test_verification_is_bad_request() {
        let error = ApiError::from(VerificationError::Expired);
        assert_eq!(error.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_dispatch_failure_hides_wallet_body() {
        let error = DispatchError::Wallet(WalletError::Rejected {
            status: 409,
            message: "signer key kms://prod/7 locked".into(),
        });
        let ApiError::FulfillmentFailed { error: hidden, .. } =
            ApiError::from_dispatch("ord".into(), None, &error, false)
        else {
            panic!("expected fulfillment failure");
        };
        assert_eq!(hidden, "wallet rejected request (409)");

        let ApiError::FulfillmentFailed { error: shown, .. } =
            ApiError::from_dispatch("ord".into(), None, &error, true)
        else {
            panic!("expected fulfillment failure");
        };
        assert!(shown.contains("kms://prod/7"));
    }

    #[test]
    fn test_fulfillment_failure_is_unprocessable() {
        let error = ApiError::FulfillmentFailed {
            order_id: "ord".into(),
            transaction_hash: None,
            error: "reverted".into(),
        };
        assert_eq!(error.status(), StatusCode::UNPROCESSABLE_ENTITY);
    }
}
