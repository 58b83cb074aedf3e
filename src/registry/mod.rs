//! Subscriber registry and event fan-out
//!
//! The registry tracks every live subscription and routes committed feature
//! changes from the mutation layer to the per-connection delivery loops.
//! Each subscription owns a bounded queue, so a slow connection only ever
//! affects itself.
//!
//! # Architecture
//!
//! ```text
//!                        Arc<SubscriberRegistry>
//!                   ┌───────────────────────────────┐
//!                   │ by_environment: HashMap<Env,  │
//!                   │   Vec<Arc<Subscription {      │
//!                   │     queue: EventQueue,        │
//!                   │     state,                    │
//!                   │   }>>                         │
//!                   │ >                             │
//!                   └───────────────┬───────────────┘
//!                                   │
//!         ┌─────────────────────────┼─────────────────────────┐
//!         │                         │                         │
//!         ▼                         ▼                         ▼
//!   [FeatureService]          [DeliveryLoop]            [DeliveryLoop]
//!   commit + publish()        next_event()              next_event()
//!         │                         │                         │
//!         └──► Broadcaster::publish()──► queue.push() ──► transport
//! ```
//!
//! # Zero-Copy Design
//!
//! An event is serialized once and wrapped in an `Arc`. Every matching
//! queue holds a reference to the same allocation, and the payload is a
//! `bytes::Bytes`, so handing it to a transport is a reference-count bump.

pub mod broadcast;
pub mod config;
pub mod error;
pub mod event;
pub mod queue;
pub mod store;
pub mod subscription;

pub use broadcast::{Broadcaster, PublishReport};
pub use config::{OverflowPolicy, RegistryConfig};
pub use error::RegistryError;
pub use event::{EnvironmentId, Event, EventKind, Frame};
pub use queue::{EventQueue, PushOutcome};
pub use store::{SubscriberRegistry, SubscriptionHandle};
pub use subscription::{CloseReason, Subscription, SubscriptionId, SubscriptionState};
