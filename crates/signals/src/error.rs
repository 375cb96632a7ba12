use api_client::ApiError;
use std::sync::Arc;
use thiserror::Error;

/// Errors returned by the signal multiplexer.
///
/// One result is handed to every coalesced caller, so the error is `Clone` and
/// the upstream cause is shared behind an `Arc`.
#[derive(Error, Debug, Clone)]
pub enum SignalError {
    #[error("Failed to subscribe to '{symbol}': {source}")]
    Subscribe {
        symbol: String,
        #[source]
        source: Arc<ApiError>,
    },

    #[error("Subscription to '{symbol}' was cancelled")]
    Cancelled { symbol: String },

    #[error("Subscription attempt for '{symbol}' did not complete: {reason}")]
    Aborted { symbol: String, reason: String },
}

impl SignalError {
    pub fn symbol(&self) -> &str {
        match self {
            SignalError::Subscribe { symbol, .. }
            | SignalError::Cancelled { symbol }
            | SignalError::Aborted { symbol, .. } => symbol,
        }
    }
}
