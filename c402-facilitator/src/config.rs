//! Facilitator server configuration.
//!
//! Loads configuration from a TOML file with support for environment variable
//! expansion in string values. Variables use `$VAR` or `${VAR}` syntax.
//!
//! # Example Configuration
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 4021
//! fee_percent = "5"
//! max_timeout_seconds = 300
//! default_network = "base-sepolia"
//! default_currency = "usdc"
//!
//! [platform]
//! base_url = "https://staging.example.com/api/2022-06-09"
//! api_key = "$PLATFORM_API_KEY"
//!
//! [wallet]
//! base_url = "https://staging.example.com/api/2025-06-09"
//! api_key = "${WALLET_API_KEY}"
//! locator = "email:treasury@example.com:evm-smart-wallet"
//! address = "0x2222222222222222222222222222222222222222"
//! call_shape = "batch"
//! ```
//!
//! # Environment Variables
//!
//! - `CONFIG` — Path to configuration file (default: `config.toml`)
//! - `HOST` — Override server bind address
//! - `PORT` — Override server port
//! - Secrets referenced by `$VAR` in the config file

use std::net::{IpAddr, SocketAddr};
use std::path::Path;
use std::time::Duration;

use alloy_primitives::Address;
use c402::registry::AssetRegistry;
use c402_evm::CallShape;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::service::ServiceSettings;

/// Error loading or validating the configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The configuration file exists but could not be read.
    #[error("failed to read {path}: {source}")]
    Read {
        /// Path that was read.
        path: String,
        /// Underlying I/O error.
        #[source]
        source: std::io::Error,
    },
    /// The file is not valid TOML for [`FacilitatorConfig`].
    #[error("failed to parse configuration: {0}")]
    Parse(#[from] toml::de::Error),
    /// A field holds an unusable value.
    #[error("invalid configuration field `{field}`: {reason}")]
    Invalid {
        /// Dotted field name.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}

impl ConfigError {
    fn invalid(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Invalid {
            field,
            reason: reason.into(),
        }
    }
}

/// Top-level facilitator configuration as written in the file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FacilitatorConfig {
    /// Server bind address (default: `0.0.0.0`).
    #[serde(default = "default_host")]
    pub host: IpAddr,

    /// Server port (default: `4021`).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Facilitator fee in percent of the platform price, `0 <= f < 100`.
    #[serde(default)]
    pub fee_percent: Decimal,

    /// Bound on payment validity and on every outbound call (default: `300`).
    #[serde(default = "default_max_timeout_seconds")]
    pub max_timeout_seconds: u64,

    /// Network used when a purchase does not name one.
    #[serde(default = "default_network")]
    pub default_network: String,

    /// Currency used when a purchase does not name one.
    #[serde(default = "default_currency")]
    pub default_currency: String,

    /// Echo raw upstream error bodies to clients.
    #[serde(default)]
    pub expose_upstream_errors: bool,

    /// Fulfillment platform access.
    #[serde(default)]
    pub platform: PlatformConfig,

    /// Custodial wallet access.
    #[serde(default)]
    pub wallet: WalletConfig,
}

/// `[platform]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PlatformConfig {
    /// API base URL, e.g. `https://www.example.com/api/2022-06-09`.
    #[serde(default)]
    pub base_url: String,
    /// Server-side API key. Supports `$VAR` / `${VAR}`.
    #[serde(default)]
    pub api_key: String,
}

/// `[wallet]` section.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct WalletConfig {
    /// API base URL of the wallet service.
    #[serde(default)]
    pub base_url: String,
    /// Server-side API key. Supports `$VAR` / `${VAR}`.
    #[serde(default)]
    pub api_key: String,
    /// Wallet locator, also used as payer locator on platform orders.
    #[serde(default)]
    pub locator: String,
    /// On-chain address of the wallet; payments are made to it.
    #[serde(default)]
    pub address: String,
    /// Whether the wallet takes one call or an array of calls.
    #[serde(default)]
    pub call_shape: CallShape,
}

fn default_host() -> IpAddr {
    IpAddr::V4(std::net::Ipv4Addr::new(0, 0, 0, 0))
}

const fn default_port() -> u16 {
    4021
}

const fn default_max_timeout_seconds() -> u64 {
    300
}

fn default_network() -> String {
    "base-sepolia".to_owned()
}

fn default_currency() -> String {
    "usdc".to_owned()
}

impl FacilitatorConfig {
    /// Loads configuration from a specific file path.
    ///
    /// A missing file yields an empty configuration, relying on defaults.
    /// `$VAR` / `${VAR}` references are expanded from the process environment
    /// and the `HOST` and `PORT` env vars override the file values.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError`] if the file cannot be read or parsed.
    pub fn load_from(path: &str) -> Result<Self, ConfigError> {
        let content = if Path::new(path).exists() {
            std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_owned(),
                source,
            })?
        } else {
            String::new()
        };

        let mut config = Self::parse(&content)?;

        if let Ok(host) = std::env::var("HOST") {
            if let Ok(addr) = host.parse() {
                config.host = addr;
            }
        }
        if let Ok(port) = std::env::var("PORT") {
            if let Ok(p) = port.parse() {
                config.port = p;
            }
        }

        Ok(config)
    }

    /// Parses configuration text after expanding environment variables.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] for invalid TOML.
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        let expanded = expand_env_vars(content);
        Ok(toml::from_str(&expanded)?)
    }

    /// Checks every field and produces the runtime configuration.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] naming the first unusable field.
    pub fn validate(&self) -> Result<AppConfig, ConfigError> {
        if self.fee_percent.is_sign_negative() || self.fee_percent >= Decimal::ONE_HUNDRED {
            return Err(ConfigError::invalid(
                "fee_percent",
                format!("{} is outside [0, 100)", self.fee_percent),
            ));
        }
        if self.max_timeout_seconds == 0 {
            return Err(ConfigError::invalid("max_timeout_seconds", "must be positive"));
        }

        let registry = AssetRegistry::default();
        let deployment = registry
            .resolve(&self.default_network, &self.default_currency)
            .map_err(|e| ConfigError::invalid("default_currency", e.to_string()))?;
        if deployment.is_native() {
            return Err(ConfigError::invalid(
                "default_currency",
                format!("{} is a native asset", deployment.currency),
            ));
        }

        let platform_url = parse_url("platform.base_url", &self.platform.base_url)?;
        let platform_api_key = require("platform.api_key", &self.platform.api_key)?;
        let wallet_url = parse_url("wallet.base_url", &self.wallet.base_url)?;
        let wallet_api_key = require("wallet.api_key", &self.wallet.api_key)?;
        let wallet_locator = require("wallet.locator", &self.wallet.locator)?;
        let pay_to = require("wallet.address", &self.wallet.address)?
            .parse::<Address>()
            .map_err(|e| ConfigError::invalid("wallet.address", format!("{e}")))?;

        Ok(AppConfig {
            addr: SocketAddr::new(self.host, self.port),
            fee_percent: self.fee_percent,
            max_timeout_seconds: self.max_timeout_seconds,
            default_network: deployment.network.to_owned(),
            default_currency: deployment.currency.to_owned(),
            expose_upstream_errors: self.expose_upstream_errors,
            platform_url,
            platform_api_key,
            wallet_url,
            wallet_api_key,
            wallet_locator,
            pay_to,
            call_shape: self.wallet.call_shape,
        })
    }
}

/// Validated, immutable runtime configuration.
#[derive(Debug, Clone)]
pub struct AppConfig {
    /// Socket address to bind.
    pub addr: SocketAddr,
    /// Facilitator fee in percent.
    pub fee_percent: Decimal,
    /// Payment validity and outbound call bound, in seconds.
    pub max_timeout_seconds: u64,
    /// Fallback network for purchases.
    pub default_network: String,
    /// Fallback currency for purchases.
    pub default_currency: String,
    /// Echo raw upstream error bodies.
    pub expose_upstream_errors: bool,
    /// Fulfillment platform base URL.
    pub platform_url: Url,
    /// Fulfillment platform API key.
    pub platform_api_key: String,
    /// Wallet service base URL.
    pub wallet_url: Url,
    /// Wallet service API key.
    pub wallet_api_key: String,
    /// Custodial wallet locator.
    pub wallet_locator: String,
    /// Custodial wallet address.
    pub pay_to: Address,
    /// Wallet call shape.
    pub call_shape: CallShape,
}

impl AppConfig {
    /// Bound applied to outbound calls and confirmation polling.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_secs(self.max_timeout_seconds)
    }

    /// Settings for [`crate::service::OrderService`].
    #[must_use]
    pub fn service_settings(&self) -> ServiceSettings {
        ServiceSettings {
            fee_percent: self.fee_percent,
            pay_to: self.pay_to,
            max_timeout_seconds: self.max_timeout_seconds,
            payer_locator: self.wallet_locator.clone(),
            default_network: self.default_network.clone(),
            default_currency: self.default_currency.clone(),
            expose_upstream_errors: self.expose_upstream_errors,
        }
    }
}

fn require(field: &'static str, value: &str) -> Result<String, ConfigError> {
    let value = value.trim();
    if value.is_empty() {
        return Err(ConfigError::invalid(field, "is required"));
    }
    if value.starts_with('$') {
        return Err(ConfigError::invalid(
            field,
            format!("{value} is not set in the environment"),
        ));
    }
    Ok(value.to_owned())
}

fn parse_url(field: &'static str, value: &str) -> Result<Url, ConfigError> {
    Url::parse(&require(field, value)?).map_err(|e| ConfigError::invalid(field, e.to_string()))
}

/// Expands `$VAR` and `${VAR}` patterns in a string from environment variables.
///
/// Unresolved variables are left as-is.
fn expand_env_vars(input: &str) -> String {
    let mut result = String::with_capacity(input.len());
    let mut chars = input.chars().peekable();

    while let Some(ch) = chars.next() {
        if ch != '$' {
            result.push(ch);
            continue;
        }
        let braced = chars.next_if_eq(&'{').is_some();
        let mut name = String::new();
        while let Some(&c) = chars.peek() {
            if braced && c == '}' {
                chars.next();
                break;
            }
            if !braced && !c.is_ascii_alphanumeric() && c != '_' {
                break;
            }
            name.push(c);
            chars.next();
        }

        match std::env::var(&name) {
            Ok(value) if !name.is_empty() => result.push_str(&value),
            _ if braced => {
                result.push_str("${");
                result.push_str(&name);
                if !name.is_empty() {
                    result.push('}');
                }
            }
            _ => {
                result.push('$');
                result.push_str(&name);
            }
        }
    }

    result
}
