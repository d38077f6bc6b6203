//! Order payment phases.
//!
//! A purchase moves through these phases within a single facilitator, but
//! nothing is persisted: the phase is reconstructed from which step of the
//! request handling is running and is attached to logs and responses.
//!
//! ```text
//! Created -> Priced -> ChallengeIssued -> PaymentVerified -> FundsCollected -> Fulfilled
//!                                                                          \-> FulfillmentFailed
//! ```
//!
//! [`OrderPhase::FundsCollected`] is the point of no return. From there on a
//! failure is reported, never rolled back.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Where an order is in the payment flow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OrderPhase {
    /// The platform order exists.
    Created,
    /// The platform quoted a price.
    Priced,
    /// A 402 challenge was sent to the client.
    ChallengeIssued,
    /// A signed payment passed verification.
    PaymentVerified,
    /// Funds moved into the custodial wallet.
    FundsCollected,
    /// The platform was paid and the order is being fulfilled.
    Fulfilled,
    /// Funds were collected but fulfillment could not be dispatched.
    FulfillmentFailed,
}

impl OrderPhase {
    /// Returns the phases directly reachable from this one.
    #[must_use]
    pub const fn successors(self) -> &'static [Self] {
        match self {
            Self::Created => &[Self::Priced],
            Self::Priced => &[Self::ChallengeIssued],
            Self::ChallengeIssued => &[Self::PaymentVerified],
            Self::PaymentVerified => &[Self::FundsCollected],
            Self::FundsCollected => &[Self::Fulfilled, Self::FulfillmentFailed],
            Self::Fulfilled | Self::FulfillmentFailed => &[],
        }
    }

    /// Returns `true` if `next` directly follows this phase.
    #[must_use]
    pub fn can_advance_to(self, next: Self) -> bool {
        self.successors().contains(&next)
    }

    /// Returns `true` if no further phase follows.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        self.successors().is_empty()
    }

    /// Returns `true` once funds have moved and nothing may be rolled back.
    #[must_use]
    pub const fn is_committed(self) -> bool {
        matches!(self, Self::FundsCollected | Self::Fulfilled | Self::FulfillmentFailed)
    }

    /// Returns the `snake_case` name used on the wire and in logs.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Created => "created",
            Self::Priced => "priced",
            Self::ChallengeIssued => "challenge_issued",
            Self::PaymentVerified => "payment_verified",
            Self::FundsCollected => "funds_collected",
            Self::Fulfilled => "fulfilled",
            Self::FulfillmentFailed => "fulfillment_failed",
        }
    }
}

impl fmt::Display for OrderPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const ALL: [OrderPhase; 7] = [
        OrderPhase::Created,
        OrderPhase::Priced,
        OrderPhase::ChallengeIssued,
        OrderPhase::PaymentVerified,
        OrderPhase::FundsCollected,
        OrderPhase::Fulfilled,
        OrderPhase::FulfillmentFailed,
    ];

    #[test]
    fn test_forward_edges_only() {
        assert!(OrderPhase::Created.can_advance_to(OrderPhase::Priced));
        assert!(OrderPhase::FundsCollected.can_advance_to(OrderPhase::FulfillmentFailed));
        assert!(!OrderPhase::Priced.can_advance_to(OrderPhase::PaymentVerified));
        assert!(!OrderPhase::FundsCollected.can_advance_to(OrderPhase::PaymentVerified));
        assert!(!OrderPhase::Fulfilled.can_advance_to(OrderPhase::FulfillmentFailed));
        for phase in ALL {
            assert!(!phase.can_advance_to(phase));
        }
    }

    #[test]
    fn test_terminal_phases() {
        let terminal: Vec<_> = ALL.into_iter().filter(|p| p.is_terminal()).collect();
        assert_eq!(terminal, [OrderPhase::Fulfilled, OrderPhase::FulfillmentFailed]);
    }

    #[test]
    fn test_serde_matches_display() {
        for phase in ALL {
            let json = serde_json::to_string(&phase).unwrap();
            assert_eq!(json, format!("\"{phase}\""));
        }
    }
}
