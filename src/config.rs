// 5.0 config.rs: timelock margins, event retention, token metadata. env presets.
// `access` times spender authorization on the gateway, `update` times gateway
// rotation on the ledger. they are kept apart so each can carry its own margin.

use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::path::Path;

use crate::timelock::TimelockParams;
use crate::types::TokenAddress;

// highest scale a Decimal can display
const MAX_TOKEN_DECIMALS: u32 = 28;

// Display metadata for a custodied token
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenConfig {
    pub address: TokenAddress,
    // Ticker shown in logs and the simulator (e.g. "USDC")
    pub symbol: String,
    // Base-unit decimals
    pub decimals: u32,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CustodyConfig {
    // Gateway spender authorization timelock
    pub access: TimelockParams,
    // Ledger gateway rotation timelock
    pub update: TimelockParams,
    // Events retained per component
    pub max_events: usize,
    pub tokens: Vec<TokenConfig>,
}

impl Default for CustodyConfig {
    fn default() -> Self {
        Self {
            access: TimelockParams::new(3_600, 86_400),  // 1h delay, 1d window
            update: TimelockParams::new(86_400, 172_800), // 1d delay, 2d window
            max_events: 100_000,
            tokens: vec![
                TokenConfig {
                    address: TokenAddress(1),
                    symbol: "USDC".to_string(),
                    decimals: 6,
                },
                TokenConfig {
                    address: TokenAddress(2),
                    symbol: "WETH".to_string(),
                    decimals: 18,
                },
            ],
        }
    }
}

impl CustodyConfig {
    // Short windows for running scenarios by hand
    pub fn testnet() -> Self {
        let mut config = Self::default();
        config.access = TimelockParams::new(60, 3_600);
        config.update = TimelockParams::new(300, 3_600);
        config
    }

    // Long warning periods before any change to who can move funds
    pub fn mainnet_conservative() -> Self {
        let mut config = Self::default();
        config.access = TimelockParams::new(172_800, 604_800); // 2d delay, 1w window
        config.update = TimelockParams::new(604_800, 604_800); // 1w delay, 1w window
        config
    }

    pub fn from_toml_str(raw: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(raw).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            message: e.to_string(),
        })?;
        Self::from_toml_str(&raw)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        validate_timelock("access", &self.access)?;
        validate_timelock("update", &self.update)?;

        if self.max_events == 0 {
            return Err(ConfigError::InvalidEvents {
                reason: "max_events must be positive".to_string(),
            });
        }

        let mut addresses = BTreeSet::new();
        let mut symbols = BTreeSet::new();
        for token in &self.tokens {
            if !addresses.insert(token.address) {
                return Err(ConfigError::InvalidTokens {
                    reason: format!("duplicate token address {}", token.address),
                });
            }
            if token.symbol.is_empty() || !symbols.insert(token.symbol.as_str()) {
                return Err(ConfigError::InvalidTokens {
                    reason: format!("missing or duplicate symbol {:?}", token.symbol),
                });
            }
            if token.decimals > MAX_TOKEN_DECIMALS {
                return Err(ConfigError::InvalidTokens {
                    reason: format!("{} has {} decimals, max {}", token.symbol, token.decimals, MAX_TOKEN_DECIMALS),
                });
            }
        }

        Ok(())
    }

    pub fn token(&self, address: TokenAddress) -> Option<&TokenConfig> {
        self.tokens.iter().find(|t| t.address == address)
    }

    pub fn token_by_symbol(&self, symbol: &str) -> Option<&TokenConfig> {
        self.tokens.iter().find(|t| t.symbol == symbol)
    }
}

fn validate_timelock(which: &'static str, params: &TimelockParams) -> Result<(), ConfigError> {
    if params.grace_window_secs == 0 {
        return Err(ConfigError::InvalidTimelock {
            which,
            reason: "grace window must be positive".to_string(),
        });
    }
    if params.delay_secs.checked_add(params.grace_window_secs).is_none() {
        return Err(ConfigError::InvalidTimelock {
            which,
            reason: "delay plus grace window overflows".to_string(),
        });
    }
    Ok(())
}

#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ConfigError {
    #[error("invalid {which} timelock: {reason}")]
    InvalidTimelock { which: &'static str, reason: String },

    #[error("invalid tokens: {reason}")]
    InvalidTokens { reason: String },

    #[error("invalid event settings: {reason}")]
    InvalidEvents { reason: String },

    #[error("config parse error: {0}")]
    Parse(String),

    #[error("cannot read {path}: {message}")]
    Io { path: String, message: String },
}

// Environment presets
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Environment {
    Development,
    Testnet,
    Mainnet,
}

impl Environment {
    pub fn config(&self) -> CustodyConfig {
        match self {
            Environment::Development => CustodyConfig::default(),
            Environment::Testnet => CustodyConfig::testnet(),
            Environment::Mainnet => CustodyConfig::mainnet_conservative(),
        }
    }
}
