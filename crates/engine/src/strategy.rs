use crate::conditions::PriceThreshold;
use crate::error::EngineError;
use configuration::StrategyConfig;
use core_types::{Side, Tick};
use rust_decimal::Decimal;
use std::fmt;
use std::sync::Arc;

/// A yes/no decision taken on every tick.
pub trait TickCondition: Send + Sync {
    fn check(&self, tick: &Tick) -> bool;
}

impl<F> TickCondition for F
where
    F: Fn(&Tick) -> bool + Send + Sync,
{
    fn check(&self, tick: &Tick) -> bool {
        self(tick)
    }
}

fn never(_: &Tick) -> bool {
    false
}

/// A trading plan bound to one symbol: how much to trade, in which direction,
/// and when to enter and leave the market.
#[derive(Clone)]
pub struct Strategy {
    /// API token used to authorize the session.
    pub token: String,
    pub symbol: String,
    /// Stake of every position.
    pub amount: Decimal,
    pub side: Side,
    pub leverage: u32,
    /// Evaluated while no position is open.
    pub open_when: Arc<dyn TickCondition>,
    /// Evaluated while a position is open.
    pub close_when: Arc<dyn TickCondition>,
}

impl Strategy {
    /// A strategy with no side, a leverage of one, and conditions that never fire.
    pub fn new(token: impl Into<String>, symbol: impl Into<String>, amount: Decimal) -> Self {
        Self {
            token: token.into(),
            symbol: symbol.into(),
            amount,
            side: Side::NotSet,
            leverage: 1,
            open_when: Arc::new(never),
            close_when: Arc::new(never),
        }
    }

    pub fn side(mut self, side: Side) -> Self {
        self.side = side;
        self
    }

    pub fn leverage(mut self, leverage: u32) -> Self {
        self.leverage = leverage;
        self
    }

    pub fn open_when(mut self, condition: impl TickCondition + 'static) -> Self {
        self.open_when = Arc::new(condition);
        self
    }

    pub fn close_when(mut self, condition: impl TickCondition + 'static) -> Self {
        self.close_when = Arc::new(condition);
        self
    }

    /// Builds a price-threshold strategy from its configuration section.
    pub fn from_config(config: &StrategyConfig) -> Result<Self, EngineError> {
        config.validate()?;
        let side = config
            .side
            .parse::<Side>()
            .map_err(|_| EngineError::UnknownStrategyType(config.side.clone()))?;

        Ok(Self::new(config.token.clone(), config.symbol.clone(), config.amount)
            .side(side)
            .leverage(config.leverage)
            .open_when(PriceThreshold::from(&config.open))
            .close_when(PriceThreshold::from(&config.close)))
    }
}

impl fmt::Debug for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Strategy")
            .field("token", &"<redacted>")
            .field("symbol", &self.symbol)
            .field("amount", &self.amount)
            .field("side", &self.side)
            .field("leverage", &self.leverage)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use configuration::ThresholdConfig;
    use rust_decimal_macros::dec;

    fn tick(quote: Decimal) -> Tick {
        Tick::new(Utc::now(), quote, quote, quote)
    }

    fn config(side: &str) -> StrategyConfig {
        StrategyConfig {
            token: "secret-token".to_string(),
            symbol: "R_100".to_string(),
            amount: dec!(10),
            side: side.to_string(),
            leverage: 100,
            close_on_exit: false,
            open: ThresholdConfig {
                above: Some(dec!(100)),
                below: None,
            },
            close: ThresholdConfig {
                above: None,
                below: Some(dec!(90)),
            },
        }
    }

    #[test]
    fn defaults_never_trade() {
        let strategy = Strategy::new("t", "R_100", dec!(1));
        assert_eq!(strategy.side, Side::NotSet);
        assert_eq!(strategy.leverage, 1);
        assert!(!strategy.open_when.check(&tick(dec!(100))));
        assert!(!strategy.close_when.check(&tick(dec!(100))));
    }

    #[test]
    fn closures_are_conditions() {
        let strategy = Strategy::new("t", "R_100", dec!(1))
            .side(Side::Sell)
            .open_when(|tick: &Tick| tick.quote == dec!(100));
        assert!(strategy.open_when.check(&tick(dec!(100))));
        assert!(!strategy.open_when.check(&tick(dec!(100.1))));
    }

    #[test]
    fn built_from_config() {
        let strategy = Strategy::from_config(&config("buy")).unwrap();
        assert_eq!(strategy.side, Side::Buy);
        assert_eq!(strategy.leverage, 100);
        assert_eq!(strategy.amount, dec!(10));
        assert!(strategy.open_when.check(&tick(dec!(100.5))));
        assert!(!strategy.open_when.check(&tick(dec!(100))));
        assert!(strategy.close_when.check(&tick(dec!(89))));
    }

    #[test]
    fn unset_side_is_accepted_until_the_engine_trades() {
        let strategy = Strategy::from_config(&config("")).unwrap();
        assert_eq!(strategy.side, Side::NotSet);
    }

    #[test]
    fn unknown_side_is_rejected() {
        let err = Strategy::from_config(&config("hold")).unwrap_err();
        assert!(matches!(err, EngineError::UnknownStrategyType(ref side) if side == "hold"));
    }

    #[test]
    fn invalid_config_is_rejected() {
        let mut invalid = config("buy");
        invalid.amount = dec!(0);
        assert!(matches!(
            Strategy::from_config(&invalid),
            Err(EngineError::Configuration(_))
        ));
    }

    #[test]
    fn debug_output_hides_the_token() {
        let strategy = Strategy::from_config(&config("buy")).unwrap();
        let debug = format!("{strategy:?}");
        assert!(!debug.contains("secret-token"));
        assert!(debug.contains("R_100"));
    }
}
