use crate::error::SignalError;
use crate::registry::SubscriptionRegistry;
use api_client::MarketProvider;
use async_trait::async_trait;
use core_types::{Shutdown, TickStream};
use futures::future::{BoxFuture, FutureExt, Shared};
use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

type Attempt = Shared<BoxFuture<'static, Result<TickStream, SignalError>>>;
type InFlight = Arc<Mutex<HashMap<String, Attempt>>>;

/// Hands out the tick stream for a market symbol.
#[async_trait]
pub trait MarketSignals: Send + Sync {
    /// Returns the stream for `symbol`, subscribing upstream only if no stream
    /// exists yet. Returns `SignalError::Cancelled` as soon as `shutdown` fires.
    async fn subscribe_on_market(
        &self,
        symbol: &str,
        shutdown: &mut Shutdown,
    ) -> Result<TickStream, SignalError>;
}

/// The signal multiplexer.
///
/// Concurrent requests for a symbol that has no registered stream share a
/// single upstream attempt. The attempt runs as its own task, so a caller that
/// stops waiting does not abort it for the others.
pub struct SignalService {
    provider: Arc<dyn MarketProvider>,
    registry: Arc<SubscriptionRegistry>,
    in_flight: InFlight,
}

impl SignalService {
    pub fn new(provider: Arc<dyn MarketProvider>, registry: Arc<SubscriptionRegistry>) -> Self {
        Self {
            provider,
            registry,
            in_flight: Arc::default(),
        }
    }

    /// Joins the attempt in flight for `symbol`, or starts one.
    fn attempt(&self, symbol: &str) -> Attempt {
        let mut in_flight = lock(&self.in_flight);
        if let Some(attempt) = in_flight.get(symbol) {
            tracing::debug!(symbol, "Joining in-flight subscription attempt.");
            return attempt.clone();
        }

        // The table stays locked until the entry is inserted, so the task's
        // cleanup can never run before it.
        let guard = InFlightEntry {
            symbol: symbol.to_string(),
            in_flight: Arc::clone(&self.in_flight),
        };
        let task = tokio::spawn(resolve(
            Arc::clone(&self.provider),
            Arc::clone(&self.registry),
            guard,
        ));

        let owned = symbol.to_string();
        let attempt = task
            .map(move |joined| {
                joined.unwrap_or_else(|e| {
                    Err(SignalError::Aborted {
                        symbol: owned,
                        reason: e.to_string(),
                    })
                })
            })
            .boxed()
            .shared();
        in_flight.insert(symbol.to_string(), attempt.clone());
        attempt
    }
}

#[async_trait]
impl MarketSignals for SignalService {
    async fn subscribe_on_market(
        &self,
        symbol: &str,
        shutdown: &mut Shutdown,
    ) -> Result<TickStream, SignalError> {
        let attempt = self.attempt(symbol);
        tokio::select! {
            biased;
            _ = shutdown.recv() => {
                tracing::info!(symbol, "Stopped waiting for market subscription.");
                Err(SignalError::Cancelled { symbol: symbol.to_string() })
            }
            result = attempt => result,
        }
    }
}

/// Removes an in-flight entry when the attempt that owns it finishes, panics
/// included.
struct InFlightEntry {
    symbol: String,
    in_flight: InFlight,
}

impl Drop for InFlightEntry {
    fn drop(&mut self) {
        lock(&self.in_flight).remove(&self.symbol);
    }
}

/// One subscription attempt: serve the registered stream, or open a new one
/// upstream and register it.
async fn resolve(
    provider: Arc<dyn MarketProvider>,
    registry: Arc<SubscriptionRegistry>,
    entry: InFlightEntry,
) -> Result<TickStream, SignalError> {
    let symbol = entry.symbol.as_str();

    if let Some(stream) = registry.lookup(symbol) {
        if stream.is_closed() {
            tracing::warn!(symbol, "Serving a registered tick stream that has already ended.");
        } else {
            tracing::debug!(symbol, "Serving registered tick stream.");
        }
        return Ok(stream);
    }

    tracing::info!(symbol, "Opening upstream tick subscription.");
    let stream = provider
        .subscribe_to_ticks(symbol)
        .await
        .map_err(|source| {
            tracing::error!(symbol, error = %source, "Upstream tick subscription failed.");
            SignalError::Subscribe {
                symbol: symbol.to_string(),
                source: Arc::new(source),
            }
        })?;

    registry.store(symbol, stream.clone());
    Ok(stream)
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}
