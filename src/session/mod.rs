//! Per-connection session pipeline
//!
//! Opening a stream runs the snapshot sequencer: register first, fetch the
//! snapshot second, activate third. The delivery loop then writes the
//! snapshot ahead of everything that was buffered meanwhile and keeps
//! draining the queue until the subscription closes.

pub mod context;
pub mod delivery;
pub mod sequencer;

pub use context::SubscriptionContext;
pub use delivery::DeliveryLoop;
pub use sequencer::{open, OpenedSubscription};
