use api_client::ApiError;
use configuration::error::ConfigError;
use core_types::{ContractId, Side};
use signals::SignalError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Configuration error: {0}")]
    Configuration(#[from] ConfigError),

    #[error("Unknown strategy type '{0}', expected 'buy' or 'sell'")]
    UnknownStrategyType(String),

    #[error("Strategy for '{symbol}' has no side set")]
    SideNotSet { symbol: String },

    #[error("Failed to authorize trading provider: {0}")]
    Authorization(#[source] ApiError),

    #[error("Failed to subscribe to market data: {0}")]
    Subscription(#[from] SignalError),

    #[error("Failed to open {side} position on '{symbol}': {source}")]
    Open {
        symbol: String,
        side: Side,
        source: ApiError,
    },

    #[error("Shutdown interrupted opening a {side} position on '{symbol}'; the provider may have opened it")]
    OpenInterrupted { symbol: String, side: Side },

    #[error("Failed to close contract {contract_id}: {source}")]
    Close {
        contract_id: ContractId,
        source: ApiError,
    },
}
