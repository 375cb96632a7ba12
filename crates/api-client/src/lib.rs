//! # API Client
//!
//! The capability contracts the trading core depends on, and their Deriv
//! implementation.
//!
//! - `MarketProvider`: opens an upstream tick stream for a symbol.
//! - `TradingProvider`: authorizes a session and opens/closes positions.
//! - `DerivClient`: both capabilities over one Deriv WebSocket connection.

use crate::live_connector::{LiveConnector, Subscription};
use crate::requests::{
    AuthorizeRequest, BuyRequest, CONTRACT_MULTIPLIER_DOWN, CONTRACT_MULTIPLIER_UP, ContractParameters,
    ForgetRequest, SellRequest, TicksRequest,
};
use crate::responses::{AuthorizeResponse, BuyResponse, SellResponse, TickResponse, decode};
use async_trait::async_trait;
use configuration::DerivConfig;
use core_types::{Account, ContractId, DEFAULT_TICK_BUFFER, Position, TickSender, TickStream, tick_channel};
use rust_decimal::Decimal;
use serde_json::Value;
use std::sync::Arc;

pub mod error;
pub mod live_connector;
pub mod requests;
pub mod responses;

// --- Public API ---
pub use error::ApiError;

/// The market-data capability: one upstream tick subscription per call.
#[async_trait]
pub trait MarketProvider: Send + Sync {
    /// Subscribes to ticks for `symbol`. The returned stream delivers ticks in
    /// arrival order and ends when the upstream subscription ends.
    async fn subscribe_to_ticks(&self, symbol: &str) -> Result<TickStream, ApiError>;
}

/// The trading capability the execution engine drives.
#[async_trait]
pub trait TradingProvider: Send + Sync {
    async fn authorize(&self, token: &str) -> Result<Account, ApiError>;

    /// Opens a long position. Returns the provider's contract id.
    async fn buy(&self, position: &Position) -> Result<ContractId, ApiError>;

    /// Opens a short position. Returns the provider's contract id.
    async fn sell(&self, position: &Position) -> Result<ContractId, ApiError>;

    /// Closes an open contract at market.
    async fn close_position(&self, contract_id: ContractId) -> Result<(), ApiError>;
}

/// A client for the Deriv WebSocket API.
#[derive(Clone)]
pub struct DerivClient {
    connector: Arc<LiveConnector>,
    tick_buffer: usize,
}

impl DerivClient {
    pub async fn connect(config: &DerivConfig) -> Result<Self, ApiError> {
        let connector = LiveConnector::connect(config).await?;
        Ok(Self {
            connector: Arc::new(connector),
            tick_buffer: DEFAULT_TICK_BUFFER,
        })
    }

    /// Disconnects and waits for every tick stream producer to stop.
    pub async fn close(&self) {
        self.connector.close().await;
    }

    async fn place_contract(&self, position: &Position, contract_type: &str) -> Result<ContractId, ApiError> {
        let request = BuyRequest {
            buy: "1",
            price: position.price,
            parameters: ContractParameters {
                contract_type,
                basis: "stake",
                symbol: &position.symbol,
                amount: position.amount,
                product_type: "basic",
                multiplier: position.leverage,
                currency: &position.currency,
            },
        };

        let response: BuyResponse = self.connector.request(&request).await?;
        let contract_id = ContractId::try_from(response.buy.contract_id)
            .map_err(|e| ApiError::InvalidData(e.to_string()))?;

        tracing::info!(
            symbol = %position.symbol,
            contract_type,
            %contract_id,
            buy_price = ?response.buy.buy_price,
            transaction_id = ?response.buy.transaction_id,
            "Contract purchased."
        );
        Ok(contract_id)
    }
}

#[async_trait]
impl MarketProvider for DerivClient {
    async fn subscribe_to_ticks(&self, symbol: &str) -> Result<TickStream, ApiError> {
        let mut subscription = self
            .connector
            .subscribe(&TicksRequest { ticks: symbol, subscribe: 1 })
            .await?;

        // The first message either acknowledges the subscription or rejects it.
        let first = match subscription.updates.recv().await {
            Some(first) => first,
            None => return Err(ApiError::Disconnected),
        };
        let first: TickResponse = match decode(first) {
            Ok(first) => first,
            Err(e) => {
                self.connector.unsubscribe(subscription.req_id).await;
                return Err(e);
            }
        };

        let (sender, stream) = tick_channel(symbol, self.tick_buffer);
        if let Some(update) = &first.tick {
            sender.send(update.to_tick()?).await;
        }
        let subscription_id = first.subscription.map(|s| s.id);
        tracing::info!(symbol, ?subscription_id, "Subscribed to ticks.");

        let forwarder = tokio::spawn(forward_ticks(
            Arc::clone(&self.connector),
            symbol.to_string(),
            subscription,
            subscription_id,
            sender,
        ));
        self.connector.track(forwarder).await;

        Ok(stream)
    }
}

/// Pumps subscription updates into the tick stream until the upstream ends or
/// nobody is listening any more.
async fn forward_ticks(
    connector: Arc<LiveConnector>,
    symbol: String,
    mut subscription: Subscription,
    subscription_id: Option<String>,
    sender: TickSender,
) {
    let mut abandoned = false;
    while let Some(update) = subscription.updates.recv().await {
        match decode::<TickResponse>(update) {
            Ok(TickResponse { tick: Some(update), .. }) => match update.to_tick() {
                Ok(tick) => {
                    if !sender.send(tick).await {
                        abandoned = true;
                        break;
                    }
                }
                Err(e) => tracing::warn!(%symbol, error = %e, "Skipping malformed tick."),
            },
            Ok(_) => {}
            Err(e) => {
                tracing::error!(%symbol, error = %e, "Tick subscription failed.");
                break;
            }
        }
    }

    connector.unsubscribe(subscription.req_id).await;
    if abandoned {
        if let Some(id) = subscription_id {
            if let Err(e) = connector.request::<_, Value>(&ForgetRequest { forget: &id }).await {
                tracing::debug!(%symbol, error = %e, "Failed to forget tick subscription.");
            }
        }
    }
    tracing::info!(%symbol, "Tick stream ended.");
}

#[async_trait]
impl TradingProvider for DerivClient {
    async fn authorize(&self, token: &str) -> Result<Account, ApiError> {
        let response: AuthorizeResponse = self.connector.request(&AuthorizeRequest { authorize: token }).await?;
        tracing::info!(account = %response.authorize.loginid, currency = %response.authorize.currency, "Authorized.");
        Ok(Account {
            id: response.authorize.loginid,
            currency: response.authorize.currency,
        })
    }

    async fn buy(&self, position: &Position) -> Result<ContractId, ApiError> {
        self.place_contract(position, CONTRACT_MULTIPLIER_UP).await
    }

    async fn sell(&self, position: &Position) -> Result<ContractId, ApiError> {
        self.place_contract(position, CONTRACT_MULTIPLIER_DOWN).await
    }

    async fn close_position(&self, contract_id: ContractId) -> Result<(), ApiError> {
        let request = SellRequest {
            sell: contract_id.get(),
            price: Decimal::ZERO,
        };
        let response: SellResponse = self.connector.request(&request).await?;
        tracing::info!(
            %contract_id,
            sold_for = ?response.sell.sold_for,
            transaction_id = ?response.sell.transaction_id,
            "Position closed."
        );
        Ok(())
    }
}
