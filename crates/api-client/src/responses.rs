//! Response payloads received from the Deriv API.

use crate::error::ApiError;
use chrono::{DateTime, Utc};
use core_types::Tick;
use rust_decimal::Decimal;
use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

/// The `error` object Deriv attaches to a failed request.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    pub code: String,
    pub message: String,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeResponse {
    pub authorize: AuthorizeDetails,
}

#[derive(Debug, Deserialize)]
pub struct AuthorizeDetails {
    pub loginid: String,
    #[serde(default)]
    pub currency: String,
}

/// One message of a `ticks` subscription. The first message doubles as the
/// subscription acknowledgement.
#[derive(Debug, Deserialize)]
pub struct TickResponse {
    #[serde(default)]
    pub tick: Option<TickUpdate>,
    #[serde(default)]
    pub subscription: Option<SubscriptionInfo>,
}

#[derive(Debug, Deserialize)]
pub struct TickUpdate {
    pub epoch: i64,
    pub quote: Decimal,
    pub ask: Decimal,
    pub bid: Decimal,
    #[serde(default)]
    pub symbol: String,
}

impl TickUpdate {
    pub fn to_tick(&self) -> Result<Tick, ApiError> {
        let time: DateTime<Utc> = DateTime::from_timestamp(self.epoch, 0)
            .ok_or_else(|| ApiError::InvalidData(format!("Invalid tick epoch: {}", self.epoch)))?;
        Ok(Tick::new(time, self.quote, self.ask, self.bid))
    }
}

#[derive(Debug, Deserialize)]
pub struct SubscriptionInfo {
    pub id: String,
}

#[derive(Debug, Deserialize)]
pub struct BuyResponse {
    pub buy: BuyReceipt,
}

#[derive(Debug, Deserialize)]
pub struct BuyReceipt {
    pub contract_id: u64,
    #[serde(default)]
    pub buy_price: Option<Decimal>,
    #[serde(default)]
    pub transaction_id: Option<u64>,
}

#[derive(Debug, Deserialize)]
pub struct SellResponse {
    pub sell: SellReceipt,
}

#[derive(Debug, Deserialize)]
pub struct SellReceipt {
    #[serde(default)]
    pub sold_for: Option<Decimal>,
    #[serde(default)]
    pub transaction_id: Option<u64>,
}

/// Turns a raw response into `T`, mapping Deriv's `error` object to
/// [`ApiError::Rejected`].
pub fn decode<T: DeserializeOwned>(value: Value) -> Result<T, ApiError> {
    if let Some(error) = value.get("error") {
        let error: ApiErrorResponse = serde_json::from_value(error.clone())
            .map_err(|e| ApiError::Deserialization(format!("Failed to deserialize error response: {e}")))?;
        return Err(ApiError::Rejected {
            code: error.code,
            message: error.message,
        });
    }
    serde_json::from_value(value).map_err(|e| ApiError::Deserialization(e.to_string()))
}
