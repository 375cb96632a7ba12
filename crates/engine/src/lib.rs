//! # Engine
//!
//! Runs a [`Strategy`] against a live tick stream. The engine authorizes with
//! the trading provider, takes the strategy's symbol stream from the signal
//! multiplexer, and then walks every tick through a two-state position
//! machine: while idle it asks the open condition, while a position is open it
//! asks the close condition.

use api_client::TradingProvider;
use core_types::{Account, ContractId, Position, Shutdown, Side, Tick};
use signals::{MarketSignals, SignalError};
use std::future::Future;
use std::sync::Arc;

pub mod conditions;
pub mod error;
pub mod strategy;

pub use conditions::PriceThreshold;
pub use error::EngineError;
pub use strategy::{Strategy, TickCondition};

/// Why a run stopped without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunEnd {
    /// The tick stream ended.
    StreamClosed,
    /// The shutdown signal fired.
    Cancelled,
}

/// The result of a run that ended without an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RunOutcome {
    pub end: RunEnd,
    /// The contract still open when the run ended, including one whose close
    /// was interrupted by shutdown. The engine never closes it on its own.
    pub open_contract: Option<ContractId>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum PositionState {
    Idle,
    Open { contract_id: ContractId },
}

impl PositionState {
    fn contract(&self) -> Option<ContractId> {
        match self {
            PositionState::Idle => None,
            PositionState::Open { contract_id } => Some(*contract_id),
        }
    }
}

/// The strategy execution engine.
pub struct ExecutionEngine {
    signals: Arc<dyn MarketSignals>,
    trading: Arc<dyn TradingProvider>,
}

impl ExecutionEngine {
    pub fn new(signals: Arc<dyn MarketSignals>, trading: Arc<dyn TradingProvider>) -> Self {
        Self { signals, trading }
    }

    /// Runs `strategy` until its tick stream ends, `shutdown` fires, or a
    /// trading call fails. Any failure ends the run; nothing is retried.
    ///
    /// Shutdown also abandons a trading call still waiting for its reply.
    pub async fn execute_strategy(
        &self,
        strategy: &Strategy,
        shutdown: &mut Shutdown,
    ) -> Result<RunOutcome, EngineError> {
        let Some(authorized) = unless_shutdown(shutdown, self.trading.authorize(&strategy.token)).await else {
            tracing::info!(symbol = %strategy.symbol, "Strategy cancelled during authorization.");
            return Ok(RunOutcome {
                end: RunEnd::Cancelled,
                open_contract: None,
            });
        };
        let account = authorized.map_err(EngineError::Authorization)?;
        tracing::info!(account = %account.id, symbol = %strategy.symbol, side = %strategy.side, "Starting strategy.");

        let stream = match self.signals.subscribe_on_market(&strategy.symbol, shutdown).await {
            Ok(stream) => stream,
            Err(SignalError::Cancelled { .. }) => {
                tracing::info!(symbol = %strategy.symbol, "Strategy cancelled before the first tick.");
                return Ok(RunOutcome {
                    end: RunEnd::Cancelled,
                    open_contract: None,
                });
            }
            Err(e) => return Err(e.into()),
        };
        let mut ticks = stream.subscribe();

        let mut state = PositionState::Idle;
        let end = loop {
            let tick = tokio::select! {
                biased;
                _ = shutdown.recv() => break RunEnd::Cancelled,
                tick = ticks.recv() => match tick {
                    Some(tick) => tick,
                    None => break RunEnd::StreamClosed,
                },
            };
            tracing::debug!(symbol = %strategy.symbol, quote = %tick.quote, "Received tick.");
            match self.on_tick(strategy, &account, state, &tick, shutdown).await? {
                Some(next) => state = next,
                None => break RunEnd::Cancelled,
            }
        };

        let open_contract = state.contract();
        match open_contract {
            Some(contract_id) => tracing::warn!(
                symbol = %strategy.symbol,
                %contract_id,
                ?end,
                "Strategy stopped with a position still open."
            ),
            None => tracing::info!(symbol = %strategy.symbol, ?end, "Strategy stopped."),
        }
        Ok(RunOutcome { end, open_contract })
    }

    /// Advances the position machine by one tick. Returns `None` when shutdown
    /// interrupted a close; the position then counts as still open.
    async fn on_tick(
        &self,
        strategy: &Strategy,
        account: &Account,
        state: PositionState,
        tick: &Tick,
        shutdown: &mut Shutdown,
    ) -> Result<Option<PositionState>, EngineError> {
        match state {
            PositionState::Idle if strategy.open_when.check(tick) => {
                let contract_id = self.open_position(strategy, account, tick, shutdown).await?;
                Ok(Some(PositionState::Open { contract_id }))
            }
            PositionState::Open { contract_id } if strategy.close_when.check(tick) => {
                let Some(closed) = unless_shutdown(shutdown, self.trading.close_position(contract_id)).await else {
                    tracing::warn!(symbol = %strategy.symbol, %contract_id, "Shutdown interrupted closing the position.");
                    return Ok(None);
                };
                closed.map_err(|source| EngineError::Close { contract_id, source })?;
                tracing::info!(symbol = %strategy.symbol, %contract_id, quote = %tick.quote, "Position closed.");
                Ok(Some(PositionState::Idle))
            }
            unchanged => Ok(Some(unchanged)),
        }
    }

    async fn open_position(
        &self,
        strategy: &Strategy,
        account: &Account,
        tick: &Tick,
        shutdown: &mut Shutdown,
    ) -> Result<ContractId, EngineError> {
        let position = Position {
            symbol: strategy.symbol.clone(),
            amount: strategy.amount,
            leverage: strategy.leverage,
            price: tick.quote,
            currency: account.currency.clone(),
        };
        let placed = match strategy.side {
            Side::Buy => unless_shutdown(shutdown, self.trading.buy(&position)).await,
            Side::Sell => unless_shutdown(shutdown, self.trading.sell(&position)).await,
            Side::NotSet => {
                return Err(EngineError::SideNotSet {
                    symbol: strategy.symbol.clone(),
                });
            }
        };
        // Whether the provider opened the contract is unknown.
        let placed = placed.ok_or_else(|| EngineError::OpenInterrupted {
            symbol: strategy.symbol.clone(),
            side: strategy.side,
        })?;
        let contract_id = placed.map_err(|source| EngineError::Open {
            symbol: strategy.symbol.clone(),
            side: strategy.side,
            source,
        })?;

        tracing::info!(
            symbol = %strategy.symbol,
            side = %strategy.side,
            %contract_id,
            price = %position.price,
            "Position opened."
        );
        Ok(contract_id)
    }
}

/// Awaits `call` unless `shutdown` fires first, in which case the call is
/// dropped and `None` is returned.
async fn unless_shutdown<F: Future>(shutdown: &mut Shutdown, call: F) -> Option<F::Output> {
    tokio::select! {
        biased;
        _ = shutdown.recv() => None,
        output = call => Some(output),
    }
}
