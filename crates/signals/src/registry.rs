use core_types::TickStream;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};

/// Maps each symbol to the tick stream already opened for it.
///
/// Entries live as long as the registry. Streams whose producer has finished
/// are not evicted.
#[derive(Debug, Default)]
pub struct SubscriptionRegistry {
    streams: Mutex<HashMap<String, TickStream>>,
}

impl SubscriptionRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the stream registered for `symbol`, if any.
    pub fn lookup(&self, symbol: &str) -> Option<TickStream> {
        self.streams().get(symbol).cloned()
    }

    /// Registers `stream` for `symbol`, replacing any previous entry.
    pub fn store(&self, symbol: impl Into<String>, stream: TickStream) {
        let symbol = symbol.into();
        if self.streams().insert(symbol.clone(), stream).is_some() {
            tracing::debug!(%symbol, "Replaced registered tick stream.");
        }
    }

    pub fn len(&self) -> usize {
        self.streams().len()
    }

    pub fn is_empty(&self) -> bool {
        self.streams().is_empty()
    }

    fn streams(&self) -> MutexGuard<'_, HashMap<String, TickStream>> {
        self.streams.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
