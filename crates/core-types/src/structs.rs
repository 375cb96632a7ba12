use crate::error::CoreError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::num::NonZeroU64;

/// A single market price observation.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Tick {
    /// When the provider recorded the observation.
    pub time: DateTime<Utc>,
    /// The reference (mid) price.
    pub quote: Decimal,
    pub ask: Decimal,
    pub bid: Decimal,
}

impl Tick {
    pub fn new(time: DateTime<Utc>, quote: Decimal, ask: Decimal, bid: Decimal) -> Self {
        Self { time, quote, ask, bid }
    }
}

/// The result of a successful authorization with the trading provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    /// Settlement currency every order of the run is placed in.
    pub currency: String,
}

/// The identifier a trading provider assigns to an open contract.
///
/// Zero is never a valid contract, so the id is stored as a `NonZeroU64`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "u64", into = "u64")]
pub struct ContractId(NonZeroU64);

impl ContractId {
    pub fn get(&self) -> u64 {
        self.0.get()
    }
}

impl TryFrom<u64> for ContractId {
    type Error = CoreError;

    fn try_from(value: u64) -> Result<Self, Self::Error> {
        NonZeroU64::new(value).map(ContractId).ok_or(CoreError::ZeroContractId)
    }
}

impl From<ContractId> for u64 {
    fn from(id: ContractId) -> Self {
        id.get()
    }
}

impl fmt::Display for ContractId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// The parameters of a position about to be opened.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub symbol: String,
    /// Stake placed on the contract.
    pub amount: Decimal,
    /// Multiplier applied by the provider.
    pub leverage: u32,
    /// Quote of the tick that triggered the entry.
    pub price: Decimal,
    pub currency: String,
}
