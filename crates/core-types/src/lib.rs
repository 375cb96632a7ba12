//! # Core Types
//!
//! Plain data shared by every crate in the workspace: market ticks, the tick
//! stream abstraction producers and consumers meet on, trading values, and the
//! run-scoped shutdown signal.

pub mod enums;
pub mod error;
pub mod shutdown;
pub mod stream;
pub mod structs;

// Re-export the core types to provide a clean public API.
pub use enums::Side;
pub use error::CoreError;
pub use shutdown::{Shutdown, ShutdownTrigger};
pub use stream::{tick_channel, TickReceiver, TickSender, TickStream, DEFAULT_TICK_BUFFER};
pub use structs::{Account, ContractId, Position, Tick};
