//! Network and asset registry.
//!
//! Maps an x402 v1 network name (e.g. `"base-sepolia"`) plus a currency code
//! (e.g. `"usdc"`) to the concrete on-chain deployment an order is paid in.
//! The lookup is static and fails closed: anything not listed here is
//! [`UnsupportedAsset`].
//!
//! Every network lists its USDC deployment and its native asset. The native
//! asset is known so that callers can reject it explicitly rather than
//! confuse it with an unknown currency.

use std::collections::HashMap;

use alloy_primitives::{Address, address};

/// EIP-712 domain parameters of a token implementing EIP-3009.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TokenDomain {
    /// Token name as used in its EIP-712 domain.
    pub name: &'static str,
    /// Token version as used in its EIP-712 domain.
    pub version: &'static str,
}

/// How an asset is held on-chain.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetKind {
    /// An ERC-20 token supporting `transferWithAuthorization`.
    Token {
        /// Token contract address.
        address: Address,
        /// EIP-712 domain of the token contract.
        domain: TokenDomain,
    },
    /// The chain's native gas asset. Cannot be paid by authorization.
    Native,
}

/// A resolved network/currency pair.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AssetDeployment {
    /// x402 v1 network name.
    pub network: &'static str,
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Lowercase currency code.
    pub currency: &'static str,
    /// Number of decimal places of the asset's atomic unit.
    pub decimals: u8,
    /// Token contract or native asset.
    pub kind: AssetKind,
}

impl AssetDeployment {
    /// Returns the token contract address, or `None` for a native asset.
    #[must_use]
    pub const fn token_address(&self) -> Option<Address> {
        match self.kind {
            AssetKind::Token { address, .. } => Some(address),
            AssetKind::Native => None,
        }
    }

    /// Returns `true` for a chain's native gas asset.
    #[must_use]
    pub const fn is_native(&self) -> bool {
        matches!(self.kind, AssetKind::Native)
    }
}

/// Failure to resolve a network/currency pair.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum UnsupportedAsset {
    /// The network name is not known.
    #[error("unsupported network: {0}")]
    UnknownNetwork(String),
    /// The network is known but does not list this currency.
    #[error("unsupported currency {currency} on network {network}")]
    UnknownCurrency {
        /// The requested network.
        network: String,
        /// The requested currency.
        currency: String,
    },
}

/// A network definition with the assets it carries.
#[derive(Debug, Clone, Copy)]
pub struct NetworkInfo {
    /// x402 v1 network name.
    pub name: &'static str,
    /// EIP-155 chain id.
    pub chain_id: u64,
    /// Assets payable on this network.
    pub assets: &'static [AssetInfo],
}

/// One asset on a [`NetworkInfo`].
#[derive(Debug, Clone, Copy)]
pub struct AssetInfo {
    /// Lowercase currency code.
    pub currency: &'static str,
    /// Number of decimal places.
    pub decimals: u8,
    /// Token contract or native asset.
    pub kind: AssetKind,
}

const USDC_MAINNET: TokenDomain = TokenDomain {
    name: "USD Coin",
    version: "2",
};

const USDC_TESTNET: TokenDomain = TokenDomain {
    name: "USDC",
    version: "2",
};

const fn usdc(address: Address, domain: TokenDomain) -> AssetInfo {
    AssetInfo {
        currency: "usdc",
        decimals: 6,
        kind: AssetKind::Token { address, domain },
    }
}

const fn native(currency: &'static str) -> AssetInfo {
    AssetInfo {
        currency,
        decimals: 18,
        kind: AssetKind::Native,
    }
}

/// Every network the facilitator knows about.
pub static KNOWN_NETWORKS: &[NetworkInfo] = &[
    NetworkInfo {
        name: "base",
        chain_id: 8453,
        assets: &[
            usdc(address!("0x833589fCD6eDb6E08f4c7C32D4f71b54bdA02913"), USDC_MAINNET),
            native("eth"),
        ],
    },
    NetworkInfo {
        name: "base-sepolia",
        chain_id: 84532,
        assets: &[
            usdc(address!("0x036CbD53842c5426634e7929541eC2318f3dCF7e"), USDC_TESTNET),
            native("eth"),
        ],
    },
    NetworkInfo {
        name: "ethereum",
        chain_id: 1,
        assets: &[
            usdc(address!("0xA0b86991c6218b36c1d19D4a2e9Eb0cE3606eB48"), USDC_MAINNET),
            native("eth"),
        ],
    },
    NetworkInfo {
        name: "ethereum-sepolia",
        chain_id: 11_155_111,
        assets: &[
            usdc(address!("0x1c7D4B196Cb0C7B01d743Fbc6116a902379C7238"), USDC_TESTNET),
            native("eth"),
        ],
    },
    NetworkInfo {
        name: "polygon",
        chain_id: 137,
        assets: &[
            usdc(address!("0x3c499c542cEF5E3811e1192ce70d8cC03d5c3359"), USDC_MAINNET),
            native("pol"),
        ],
    },
    NetworkInfo {
        name: "polygon-amoy",
        chain_id: 80002,
        assets: &[
            usdc(address!("0x41E94Eb71Ef8C9fAE0235d1e472b21E21B5a4dbF"), USDC_TESTNET),
            native("pol"),
        ],
    },
    NetworkInfo {
        name: "arbitrum",
        chain_id: 42161,
        assets: &[
            usdc(address!("0xaf88d065e77c8cC2239327C5EDb3A432268e5831"), USDC_MAINNET),
            native("eth"),
        ],
    },
    NetworkInfo {
        name: "arbitrum-sepolia",
        chain_id: 421_614,
        assets: &[
            usdc(address!("0x75faf114eafb1BDbe2F0316DF893fd58CE46AA4d"), USDC_TESTNET),
            native("eth"),
        ],
    },
    NetworkInfo {
        name: "optimism",
        chain_id: 10,
        assets: &[
            usdc(address!("0x0b2C639c533813f4Aa9D7837cAf62653d097Ff85"), USDC_MAINNET),
            native("eth"),
        ],
    },
    NetworkInfo {
        name: "optimism-sepolia",
        chain_id: 11_155_420,
        assets: &[
            usdc(address!("0x5fd84259d66Cd46123540766Be93DFE6D43130D7"), USDC_TESTNET),
            native("eth"),
        ],
    },
];

/// Lookup table from network name to its assets.
///
/// # Example
///
/// ```
/// use c402::registry::AssetRegistry;
///
/// let registry = AssetRegistry::default();
/// let usdc = registry.resolve("base-sepolia", "USDC").unwrap();
/// assert_eq!(usdc.decimals, 6);
/// assert!(registry.resolve("base-sepolia", "doge").is_err());
/// ```
#[derive(Debug, Clone)]
pub struct AssetRegistry {
    by_name: HashMap<&'static str, &'static NetworkInfo>,
    order: Vec<&'static NetworkInfo>,
}

impl Default for AssetRegistry {
    fn default() -> Self {
        Self::from_networks(KNOWN_NETWORKS)
    }
}

impl AssetRegistry {
    /// Creates a registry over the given network slice.
    #[must_use]
    pub fn from_networks(networks: &'static [NetworkInfo]) -> Self {
        let mut by_name = HashMap::with_capacity(networks.len());
        let mut order = Vec::with_capacity(networks.len());
        for network in networks {
            by_name.insert(network.name, network);
            order.push(network);
        }
        Self { by_name, order }
    }

    /// Resolves a network/currency pair to its deployment.
    ///
    /// Network names match exactly; currency codes case-insensitively.
    ///
    /// # Errors
    ///
    /// Returns [`UnsupportedAsset`] if either the network or the currency
    /// on that network is unknown.
    pub fn resolve(
        &self,
        network: &str,
        currency: &str,
    ) -> Result<AssetDeployment, UnsupportedAsset> {
        let info = self
            .by_name
            .get(network)
            .ok_or_else(|| UnsupportedAsset::UnknownNetwork(network.to_owned()))?;
        info.assets
            .iter()
            .find(|asset| asset.currency.eq_ignore_ascii_case(currency))
            .map(|asset| AssetDeployment {
                network: info.name,
                chain_id: info.chain_id,
                currency: asset.currency,
                decimals: asset.decimals,
                kind: asset.kind,
            })
            .ok_or_else(|| UnsupportedAsset::UnknownCurrency {
                network: network.to_owned(),
                currency: currency.to_owned(),
            })
    }

    /// Returns the EIP-155 chain id of a network.
    #[must_use]
    pub fn chain_id(&self, network: &str) -> Option<u64> {
        self.by_name.get(network).map(|info| info.chain_id)
    }

    /// Iterates over the registered networks in declaration order.
    pub fn networks(&self) -> impl Iterator<Item = &'static NetworkInfo> + '_ {
        self.order.iter().copied()
    }

    /// Iterates over every token deployment payable by authorization.
    pub fn token_deployments(&self) -> impl Iterator<Item = AssetDeployment> + '_ {
        self.networks().flat_map(|info| {
            info.assets
                .iter()
                .filter(|asset| matches!(asset.kind, AssetKind::Token { .. }))
                .map(|asset| AssetDeployment {
                    network: info.name,
                    chain_id: info.chain_id,
                    currency: asset.currency,
                    decimals: asset.decimals,
                    kind: asset.kind,
                })
        })
    }
}
