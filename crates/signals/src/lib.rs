//! # Signals
//!
//! Shares upstream market data between every component of the bot that needs
//! it. A symbol is subscribed to upstream at most once: concurrent first-time
//! requests are coalesced into one attempt, and successful subscriptions are
//! kept in a [`SubscriptionRegistry`] for later callers.

pub mod error;
pub mod registry;
pub mod service;

pub use error::SignalError;
pub use registry::SubscriptionRegistry;
pub use service::{MarketSignals, SignalService};
