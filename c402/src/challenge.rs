//! Payment challenge construction and pricing.
//!
//! The amount a client must authorize is derived from the platform's quote in
//! two fixed steps:
//!
//! 1. `total = round(base * (1 + fee / 100), 6)`, midpoint away from zero;
//! 2. `atomic = floor(total * 10^decimals)`.
//!
//! The verifier recomputes the same value from a freshly reloaded session, so
//! both sides must go through [`atomic_amount`].

use alloy_primitives::Address;
use rust_decimal::{Decimal, RoundingStrategy};

use crate::order::OrderSession;
use crate::proto::v1::{EXACT_SCHEME, PaymentRequirements, RequirementsExtra};
use crate::registry::{AssetKind, AssetRegistry, UnsupportedAsset};

/// Decimal places the fee-adjusted total is rounded to.
pub const PRICE_SCALE: u32 = 6;

/// Resource path orders are paid on.
pub const ORDERS_RESOURCE: &str = "/orders";

/// Failure to price an order.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChallengeError {
    /// Fee outside `0 <= fee < 100`.
    #[error("fee percent {0} is outside [0, 100)")]
    FeeOutOfRange(Decimal),
    /// The price is negative.
    #[error("negative amount {0}")]
    NegativeAmount(Decimal),
    /// The amount does not fit in the decimal range.
    #[error("amount overflow")]
    Overflow,
    /// The asset is a native coin, which cannot be paid by authorization.
    #[error("asset {currency} on {network} is not an authorization-capable token")]
    UnsupportedAssetType {
        /// Network of the asset.
        network: String,
        /// Currency of the asset.
        currency: String,
    },
    /// The session's network/currency is not known.
    #[error(transparent)]
    UnsupportedAsset(#[from] UnsupportedAsset),
}

/// Applies the facilitator fee and rounds to [`PRICE_SCALE`] places.
///
/// # Errors
///
/// Returns [`ChallengeError`] on a negative price, a fee outside `[0, 100)`,
/// or arithmetic overflow.
pub fn total_price(base_price: Decimal, fee_percent: Decimal) -> Result<Decimal, ChallengeError> {
    if fee_percent.is_sign_negative() || fee_percent >= Decimal::ONE_HUNDRED {
        return Err(ChallengeError::FeeOutOfRange(fee_percent));
    }
    if base_price.is_sign_negative() {
        return Err(ChallengeError::NegativeAmount(base_price));
    }
    let multiplier = fee_percent
        .checked_div(Decimal::ONE_HUNDRED)
        .and_then(|f| f.checked_add(Decimal::ONE))
        .ok_or(ChallengeError::Overflow)?;
    let total = base_price
        .checked_mul(multiplier)
        .ok_or(ChallengeError::Overflow)?;
    Ok(total.round_dp_with_strategy(PRICE_SCALE, RoundingStrategy::MidpointAwayFromZero))
}

/// Converts a whole-unit total into the asset's atomic units, truncating.
///
/// The result is a plain decimal integer string with no exponent, sign, or
/// fractional part.
///
/// # Errors
///
/// Returns [`ChallengeError::Overflow`] if the scaled value does not fit and
/// [`ChallengeError::NegativeAmount`] for negative input.
pub fn to_atomic(total: Decimal, decimals: u8) -> Result<String, ChallengeError> {
    if total.is_sign_negative() && !total.is_zero() {
        return Err(ChallengeError::NegativeAmount(total));
    }
    let scale = 10u64
        .checked_pow(u32::from(decimals))
        .map(Decimal::from)
        .ok_or(ChallengeError::Overflow)?;
    let atomic = total.checked_mul(scale).ok_or(ChallengeError::Overflow)?;
    Ok(atomic.floor().normalize().to_string())
}

/// Computes the exact atomic amount due for a base price and fee.
///
/// # Errors
///
/// See [`total_price`] and [`to_atomic`].
pub fn atomic_amount(
    base_price: Decimal,
    fee_percent: Decimal,
    decimals: u8,
) -> Result<String, ChallengeError> {
    let total = total_price(base_price, fee_percent)?;
    to_atomic(total, decimals)
}

/// Builds the 402 payment requirements for an order session.
#[derive(Debug, Clone)]
pub struct PaymentChallenge {
    registry: AssetRegistry,
    pay_to: Address,
    max_timeout_seconds: u64,
}

impl PaymentChallenge {
    /// Creates a builder paying into `pay_to`.
    #[must_use]
    pub const fn new(registry: AssetRegistry, pay_to: Address, max_timeout_seconds: u64) -> Self {
        Self {
            registry,
            pay_to,
            max_timeout_seconds,
        }
    }

    /// Returns the registry assets are resolved against.
    #[must_use]
    pub const fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    /// Returns the custodial receiving address.
    #[must_use]
    pub const fn pay_to(&self) -> Address {
        self.pay_to
    }

    /// Returns the atomic amount the client must authorize for `session`.
    ///
    /// # Errors
    ///
    /// Returns [`ChallengeError`] if the asset is unsupported or native, or
    /// if pricing fails.
    pub fn expected_amount(&self, session: &OrderSession) -> Result<String, ChallengeError> {
        let deployment = self.registry.resolve(&session.network, &session.currency)?;
        if deployment.is_native() {
            return Err(ChallengeError::UnsupportedAssetType {
                network: session.network.clone(),
                currency: session.currency.clone(),
            });
        }
        atomic_amount(session.base_price, session.fee_percent, deployment.decimals)
    }

    /// Builds the payment requirements for `session`.
    ///
    /// Deterministic: the same session always yields the same requirements.
    ///
    /// # Errors
    ///
    /// Returns [`ChallengeError`] if the asset is unsupported or native, or
    /// if pricing fails.
    pub fn build(&self, session: &OrderSession) -> Result<PaymentRequirements, ChallengeError> {
        let deployment = self.registry.resolve(&session.network, &session.currency)?;
        let AssetKind::Token { address, domain } = deployment.kind else {
            return Err(ChallengeError::UnsupportedAssetType {
                network: session.network.clone(),
                currency: session.currency.clone(),
            });
        };
        let amount = atomic_amount(session.base_price, session.fee_percent, deployment.decimals)?;
        let description = session.product_locator.as_deref().map_or_else(
            || format!("Order {}", session.order_id),
            |product| format!("Order {} for {product}", session.order_id),
        );
        Ok(PaymentRequirements {
            scheme: EXACT_SCHEME.to_owned(),
            network: deployment.network.to_owned(),
            max_amount_required: amount,
            resource: ORDERS_RESOURCE.to_owned(),
            description,
            mime_type: "application/json".to_owned(),
            pay_to: self.pay_to.to_string(),
            max_timeout_seconds: self.max_timeout_seconds,
            asset: address.to_string(),
            extra: RequirementsExtra {
                order_id: session.order_id.clone(),
                name: Some(domain.name.to_owned()),
                version: Some(domain.version.to_owned()),
            },
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy_primitives::address;

    fn dec(s: &str) -> Decimal {
        s.parse().unwrap()
    }

    fn session(price: &str, fee: &str) -> OrderSession {
        OrderSession {
            order_id: "ord_1".into(),
            product_locator: Some("amazon:B01".into()),
            recipient: None,
            network: "base-sepolia".into(),
            currency: "usdc".into(),
            base_price: dec(price),
            fee_percent: dec(fee),
            status: "awaiting-payment".into(),
            prepared_transaction: None,
        }
    }

    fn challenge() -> PaymentChallenge {
        PaymentChallenge::new(
            AssetRegistry::default(),
            address!("0x2222222222222222222222222222222222222222"),
            300,
        )
    }

    #[test]
    fn test_atomic_amount_without_fee() {
        assert_eq!(atomic_amount(dec("1.80"), Decimal::ZERO, 6).unwrap(), "1800000");
    }

    #[test]
    fn test_atomic_amount_with_fee() {
        assert_eq!(atomic_amount(dec("1.80"), dec("5"), 6).unwrap(), "1890000");
    }

    #[test]
    fn test_rounds_half_away_from_zero_before_truncating() {
        // 0.0000005 * 1.00 rounds to 0.000001 at 6 dp, i.e. one atomic unit.
        assert_eq!(atomic_amount(dec("0.0000005"), Decimal::ZERO, 6).unwrap(), "1");
        // 0.00000049 rounds down to zero.
        assert_eq!(atomic_amount(dec("0.00000049"), Decimal::ZERO, 6).unwrap(), "0");
    }

    #[test]
    fn test_truncates_below_six_decimals() {
        // Rounded total has 6 dp; a 2-decimal asset keeps only cents.
        assert_eq!(atomic_amount(dec("1.239"), Decimal::ZERO, 2).unwrap(), "123");
    }

    #[test]
    fn test_eighteen_decimals_renders_without_exponent() {
        assert_eq!(
            atomic_amount(dec("2.5"), Decimal::ZERO, 18).unwrap(),
            "2500000000000000000"
        );
    }

    #[test]
    fn test_fee_bounds() {
        assert!(matches!(
            total_price(Decimal::ONE, Decimal::ONE_HUNDRED),
            Err(ChallengeError::FeeOutOfRange(_))
        ));
        assert!(matches!(
            total_price(Decimal::ONE, dec("-0.5")),
            Err(ChallengeError::FeeOutOfRange(_))
        ));
        assert_eq!(total_price(Decimal::ONE, dec("99.99")).unwrap(), dec("1.9999"));
    }

    #[test]
    fn test_overflow_is_an_error() {
        assert_eq!(to_atomic(Decimal::MAX, 18), Err(ChallengeError::Overflow));
    }

    #[test]
    fn test_build_is_deterministic() {
        let challenge = challenge();
        let session = session("1.80", "5");
        let a = challenge.build(&session).unwrap();
        let b = challenge.build(&session).unwrap();
        assert_eq!(a, b);
        assert_eq!(a.max_amount_required, "1890000");
        assert_eq!(a.extra.order_id, "ord_1");
        assert_eq!(a.extra.name.as_deref(), Some("USDC"));
        assert_eq!(a.scheme, "exact");
        assert_eq!(a.max_timeout_seconds, 300);
        assert_eq!(
            a.asset,
            address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e").to_string()
        );
    }

    #[test]
    fn test_build_refuses_native_asset() {
        let mut session = session("1", "0");
        session.currency = "eth".into();
        assert!(matches!(
            challenge().build(&session),
            Err(ChallengeError::UnsupportedAssetType { .. })
        ));
    }

    #[test]
    fn test_challenge_and_expected_amount_agree_across_fees() {
        let challenge = challenge();
        for fee in ["0", "0.5", "1", "2.5", "5", "12.345", "33.3333", "50", "99.9999"] {
            for price in ["0.01", "1.80", "19.99", "123.456789", "1000"] {
                let session = session(price, fee);
                let built = challenge.build(&session).unwrap();
                assert_eq!(built.max_amount_required, challenge.expected_amount(&session).unwrap());
            }
        }
    }
}
