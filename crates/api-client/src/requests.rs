//! Request payloads sent to the Deriv API. The connector adds `req_id`.

use rust_decimal::Decimal;
use serde::Serialize;

pub const CONTRACT_MULTIPLIER_UP: &str = "MULTUP";
pub const CONTRACT_MULTIPLIER_DOWN: &str = "MULTDOWN";

#[derive(Debug, Serialize)]
pub struct AuthorizeRequest<'a> {
    pub authorize: &'a str,
}

#[derive(Debug, Serialize)]
pub struct TicksRequest<'a> {
    pub ticks: &'a str,
    pub subscribe: u8,
}

#[derive(Debug, Serialize)]
pub struct BuyRequest<'a> {
    /// Always `"1"`: buy the contract described by `parameters`.
    pub buy: &'a str,
    /// Maximum price accepted for the contract.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
    pub parameters: ContractParameters<'a>,
}

#[derive(Debug, Serialize)]
pub struct ContractParameters<'a> {
    pub contract_type: &'a str,
    pub basis: &'a str,
    pub symbol: &'a str,
    #[serde(with = "rust_decimal::serde::float")]
    pub amount: Decimal,
    pub product_type: &'a str,
    pub multiplier: u32,
    pub currency: &'a str,
}

#[derive(Debug, Serialize)]
pub struct SellRequest {
    pub sell: u64,
    /// Minimum price accepted; zero sells at market.
    #[serde(with = "rust_decimal::serde::float")]
    pub price: Decimal,
}

#[derive(Debug, Serialize)]
pub struct ForgetRequest<'a> {
    pub forget: &'a str,
}

#[derive(Debug, Serialize)]
pub struct PingRequest {
    pub ping: u8,
}
