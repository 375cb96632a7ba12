use crate::strategy::TickCondition;
use configuration::ThresholdConfig;
use core_types::Tick;
use rust_decimal::Decimal;

/// Fires when the quote crosses a price level.
///
/// Both bounds are exclusive. With neither bound set the condition never fires.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PriceThreshold {
    pub above: Option<Decimal>,
    pub below: Option<Decimal>,
}

impl PriceThreshold {
    pub fn above(level: Decimal) -> Self {
        Self {
            above: Some(level),
            below: None,
        }
    }

    pub fn below(level: Decimal) -> Self {
        Self {
            above: None,
            below: Some(level),
        }
    }
}

impl TickCondition for PriceThreshold {
    fn check(&self, tick: &Tick) -> bool {
        self.above.is_some_and(|level| tick.quote > level)
            || self.below.is_some_and(|level| tick.quote < level)
    }
}

impl From<&ThresholdConfig> for PriceThreshold {
    fn from(config: &ThresholdConfig) -> Self {
        Self {
            above: config.above,
            below: config.below,
        }
    }
}
