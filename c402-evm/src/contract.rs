//! Solidity interface definitions for the calls the facilitator submits.
//!
//! Only the EIP-3009 `(v, r, s)` variant of `transferWithAuthorization` is
//! declared; USDC accepts it on every supported network.

use alloy_sol_types::sol;

sol! {
    /// Minimal ERC-3009 interface for USDC-style tokens.
    ///
    /// References:
    /// - ERC-3009: <https://eips.ethereum.org/EIPS/eip-3009>
    /// - USDC `FiatTokenV2_2`: <https://github.com/circlefin/stablecoin-evm>
    #[allow(missing_docs)]
    #[allow(clippy::too_many_arguments)]
    #[derive(Debug)]
    interface IEIP3009 {
        function transferWithAuthorization(
            address from,
            address to,
            uint256 value,
            uint256 validAfter,
            uint256 validBefore,
            bytes32 nonce,
            uint8 v,
            bytes32 r,
            bytes32 s
        ) external;
    }
}
