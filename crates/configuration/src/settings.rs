use crate::error::ConfigError;
use rust_decimal::Decimal;
use serde::Deserialize;
use std::fmt;

/// Default public endpoint of the Deriv WebSocket API.
pub const DEFAULT_DERIV_ENDPOINT: &str = "wss://ws.derivws.com/websockets/v3";

/// The root configuration structure for the entire application.
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub deriv: DerivConfig,
    /// The strategy run by `run strategy`. Optional so that tick streaming
    /// works without one.
    #[serde(default)]
    pub strategy: Option<StrategyConfig>,
}

/// Connection parameters for the Deriv API.
#[derive(Debug, Clone, Deserialize)]
pub struct DerivConfig {
    /// The application id registered with Deriv.
    pub app_id: u32,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    /// Value sent in the `Origin` header. Left out when empty.
    #[serde(default)]
    pub origin: String,
}

/// A single strategy: what to trade and when to open and close.
#[derive(Clone, Deserialize)]
pub struct StrategyConfig {
    /// API token used to authorize the trading session.
    pub token: String,
    pub symbol: String,
    /// Stake per position.
    pub amount: Decimal,
    /// `buy`, `sell`, or empty for unset.
    #[serde(default)]
    pub side: String,
    #[serde(default = "default_leverage")]
    pub leverage: u32,
    /// Close a position that is still open when the run ends.
    #[serde(default)]
    pub close_on_exit: bool,
    #[serde(default)]
    pub open: ThresholdConfig,
    #[serde(default)]
    pub close: ThresholdConfig,
}

/// Price thresholds a condition fires on. Both bounds are exclusive; an empty
/// threshold never fires.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct ThresholdConfig {
    #[serde(default)]
    pub above: Option<Decimal>,
    #[serde(default)]
    pub below: Option<Decimal>,
}

fn default_endpoint() -> String {
    DEFAULT_DERIV_ENDPOINT.to_string()
}

fn default_leverage() -> u32 {
    1
}

impl Config {
    /// Checks the invariants serde cannot express.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.deriv.app_id == 0 {
            return Err(ConfigError::ValidationError(
                "deriv.app_id must be greater than zero".to_string(),
            ));
        }
        if self.deriv.endpoint.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "deriv.endpoint must not be empty".to_string(),
            ));
        }
        if let Some(strategy) = &self.strategy {
            strategy.validate()?;
        }
        Ok(())
    }
}

impl StrategyConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.symbol.trim().is_empty() {
            return Err(ConfigError::ValidationError(
                "strategy.symbol must not be empty".to_string(),
            ));
        }
        if self.amount <= Decimal::ZERO {
            return Err(ConfigError::ValidationError(format!(
                "strategy.amount must be positive, got {}",
                self.amount
            )));
        }
        if self.leverage == 0 {
            return Err(ConfigError::ValidationError(
                "strategy.leverage must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

// The token never ends up in logs.
impl fmt::Debug for StrategyConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StrategyConfig")
            .field("token", &"<redacted>")
            .field("symbol", &self.symbol)
            .field("amount", &self.amount)
            .field("side", &self.side)
            .field("leverage", &self.leverage)
            .field("close_on_exit", &self.close_on_exit)
            .field("open", &self.open)
            .field("close", &self.close)
            .finish()
    }
}
