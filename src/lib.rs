//! # flagstream
//!
//! Live feature-flag updates over Server-Sent-Events.
//!
//! An SDK opens one long-lived stream scoped to an environment, receives the
//! environment's full flag snapshot, and from then on receives every
//! `feature_created`, `feature_updated` and `feature_deleted` change as it is
//! committed.
//!
//! ## Guarantees
//!
//! - **Snapshot first**: a subscription is registered before its snapshot is
//!   read, so nothing committed after the snapshot is missed. Changes racing
//!   the read may be delivered twice; apply them by id and revision (see
//!   [`client::FlagCache`]).
//! - **No head-of-line blocking**: every subscription has its own bounded
//!   queue. Publishing never waits on a consumer; a full queue drops its
//!   oldest event or closes that one subscription, per [`registry::OverflowPolicy`].
//! - **Isolation**: events are routed by environment id only.
//!
//! ## Example
//!
//! ```no_run
//! use flagstream::server::{FlagServer, ServerConfig};
//!
//! # async fn example() -> flagstream::error::Result<()> {
//! let config = ServerConfig::default().max_connections(10_000);
//! let server = FlagServer::new(config);
//!
//! server.run_until(async {
//!     let _ = tokio::signal::ctrl_c().await;
//! }).await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod error;
pub mod features;
pub mod registry;
pub mod server;
pub mod session;
pub mod stats;
pub mod transport;

pub use error::{Error, Result};
pub use features::{Feature, FeatureService, FeatureStore, MemoryFeatureStore};
pub use registry::{Broadcaster, EnvironmentId, Event, EventKind, SubscriberRegistry};
pub use server::{FlagServer, ServerConfig};
