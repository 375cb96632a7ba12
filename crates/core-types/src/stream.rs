//! The stream abstraction tick producers and consumers meet on.
//!
//! A producer creates a channel with [`tick_channel`], keeps the [`TickSender`]
//! and hands out the [`TickStream`]. The stream is a cheap, cloneable handle:
//! every clone refers to the same underlying channel, which is what lets the
//! signal multiplexer give many callers one upstream subscription. Consumers
//! call [`TickStream::subscribe`] to get their own [`TickReceiver`].
//!
//! Delivery is lossless. Every receiver has its own bounded queue and the
//! producer waits for room in each of them, so a slow consumer slows the
//! producer down instead of missing ticks.
//!
//! The stream ends when the producer drops its sender.

use crate::structs::Tick;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};
use tokio::sync::mpsc;

/// Default number of ticks queued per receiver before the producer waits.
pub const DEFAULT_TICK_BUFFER: usize = 1024;

/// Creates a new tick channel for `symbol`.
pub fn tick_channel(symbol: impl Into<String>, capacity: usize) -> (TickSender, TickStream) {
    let capacity = capacity.max(1);
    let (first_tx, first_rx) = mpsc::channel(capacity);
    let fanout = Arc::new(Fanout {
        symbol: symbol.into(),
        capacity,
        state: Mutex::new(FanoutState {
            closed: false,
            first: Some(first_rx),
            consumers: vec![first_tx],
        }),
    });
    let handle = Arc::new(Handle {
        fanout: Arc::clone(&fanout),
    });

    let sender = TickSender {
        fanout,
        handles: Arc::downgrade(&handle),
    };
    (sender, TickStream { handle })
}

struct Fanout {
    symbol: String,
    capacity: usize,
    state: Mutex<FanoutState>,
}

struct FanoutState {
    closed: bool,
    /// Receiver created together with the channel. Handed to the first
    /// subscriber so it sees every tick published since the stream opened.
    first: Option<mpsc::Receiver<Tick>>,
    consumers: Vec<mpsc::Sender<Tick>>,
}

impl Fanout {
    fn state(&self) -> MutexGuard<'_, FanoutState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

/// The producing half of a tick stream.
pub struct TickSender {
    fanout: Arc<Fanout>,
    handles: Weak<Handle>,
}

impl TickSender {
    /// Publishes a tick to every receiver, waiting while any of them is full.
    ///
    /// Returns `false` once no receiver is left and every handle to the stream
    /// has been dropped, which tells the producer nobody is left to listen.
    pub async fn send(&self, tick: Tick) -> bool {
        let orphaned = self.handles.strong_count() == 0;
        let consumers = {
            let mut state = self.fanout.state();
            if orphaned {
                // Nobody can take the first receiver any more.
                state.first = None;
            }
            let before = state.consumers.len();
            state.consumers.retain(|consumer| !consumer.is_closed());
            let gone = before - state.consumers.len();
            if gone > 0 {
                tracing::debug!(symbol = %self.fanout.symbol, gone, "Tick receivers dropped.");
            }
            state.consumers.clone()
        };

        let mut delivered = false;
        for consumer in consumers {
            delivered |= consumer.send(tick).await.is_ok();
        }
        delivered || !orphaned
    }
}

impl Drop for TickSender {
    fn drop(&mut self) {
        let mut state = self.fanout.state();
        state.closed = true;
        state.consumers.clear();
    }
}

struct Handle {
    fanout: Arc<Fanout>,
}

/// A shared handle to an upstream tick stream.
#[derive(Clone)]
pub struct TickStream {
    handle: Arc<Handle>,
}

impl TickStream {
    pub fn symbol(&self) -> &str {
        &self.handle.fanout.symbol
    }

    /// Whether the producer has finished. Queued ticks may still be readable.
    pub fn is_closed(&self) -> bool {
        self.handle.fanout.state().closed
    }

    /// Whether both handles refer to the same underlying stream.
    pub fn same_stream(&self, other: &TickStream) -> bool {
        Arc::ptr_eq(&self.handle, &other.handle)
    }

    /// Opens a new receiver on this stream.
    ///
    /// The first receiver ever taken starts at the beginning of the stream;
    /// every later one starts with the next tick published.
    pub fn subscribe(&self) -> TickReceiver {
        let mut state = self.handle.fanout.state();
        if let Some(rx) = state.first.take() {
            return TickReceiver { rx };
        }

        let (tx, rx) = mpsc::channel(self.handle.fanout.capacity);
        if !state.closed {
            state.consumers.push(tx);
        }
        TickReceiver { rx }
    }
}

impl std::fmt::Debug for TickStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TickStream")
            .field("symbol", &self.symbol())
            .field("closed", &self.is_closed())
            .finish()
    }
}

/// A consumer's view of a tick stream, delivering every tick in publish order.
pub struct TickReceiver {
    rx: mpsc::Receiver<Tick>,
}

impl TickReceiver {
    /// Waits for the next tick. Returns `None` once the stream has ended and
    /// every queued tick has been read. Cancel safe.
    pub async fn recv(&mut self) -> Option<Tick> {
        self.rx.recv().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use rust_decimal::Decimal;
    use std::time::Duration;
    use tokio::time::timeout;

    fn tick(quote: i64) -> Tick {
        let quote = Decimal::from(quote);
        Tick::new(Utc::now(), quote, quote, quote)
    }

    fn quote(tick: Option<Tick>) -> Option<Decimal> {
        tick.map(|t| t.quote)
    }

    #[tokio::test]
    async fn first_receiver_sees_ticks_sent_before_subscribing() {
        let (tx, stream) = tick_channel("R_100", 8);
        assert!(tx.send(tick(1)).await);
        assert!(tx.send(tick(2)).await);
        drop(tx);

        let mut rx = stream.subscribe();
        assert_eq!(quote(rx.recv().await), Some(Decimal::from(1)));
        assert_eq!(quote(rx.recv().await), Some(Decimal::from(2)));
        assert_eq!(rx.recv().await, None);
        assert!(stream.is_closed());
    }

    #[tokio::test]
    async fn late_receivers_start_with_the_next_tick() {
        let (tx, stream) = tick_channel("R_100", 8);
        let mut first = stream.subscribe();
        tx.send(tick(1)).await;

        let mut late = stream.clone().subscribe();
        tx.send(tick(2)).await;

        assert_eq!(quote(first.recv().await), Some(Decimal::from(1)));
        assert_eq!(quote(first.recv().await), Some(Decimal::from(2)));
        assert_eq!(quote(late.recv().await), Some(Decimal::from(2)));
    }

    #[tokio::test]
    async fn subscribing_to_an_ended_stream_yields_nothing() {
        let (tx, stream) = tick_channel("R_50", 8);
        let _first = stream.subscribe();
        drop(tx);

        let mut rx = stream.subscribe();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn a_full_receiver_holds_the_producer_back_without_losing_ticks() {
        let (tx, stream) = tick_channel("R_100", 2);
        let mut rx = stream.subscribe();

        let producer = tokio::spawn(async move {
            for n in 1..=10 {
                assert!(tx.send(tick(n)).await);
            }
        });

        tokio::time::sleep(Duration::from_millis(50)).await;
        assert!(!producer.is_finished());

        for n in 1..=10 {
            assert_eq!(quote(rx.recv().await), Some(Decimal::from(n)));
        }
        producer.await.unwrap();
        assert_eq!(rx.recv().await, None);
    }

    #[tokio::test]
    async fn dropped_receivers_do_not_block_the_producer() {
        let (tx, stream) = tick_channel("R_100", 1);
        let first = stream.subscribe();
        let mut other = stream.subscribe();
        drop(first);

        for n in 1..=3 {
            let sent = timeout(Duration::from_secs(1), tx.send(tick(n))).await.unwrap();
            assert!(sent);
            assert_eq!(quote(other.recv().await), Some(Decimal::from(n)));
        }
    }

    #[test]
    fn clones_share_identity() {
        let (_tx, stream) = tick_channel("R_100", 8);
        let (_other_tx, other) = tick_channel("R_100", 8);
        assert!(stream.same_stream(&stream.clone()));
        assert!(!stream.same_stream(&other));
        assert!(!stream.is_closed());
    }

    #[tokio::test]
    async fn send_reports_when_nobody_is_left() {
        let (tx, stream) = tick_channel("R_100", 8);
        assert!(tx.send(tick(1)).await);
        drop(stream);
        assert!(!tx.send(tick(2)).await);
    }
}
