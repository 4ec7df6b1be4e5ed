//! Synchronization engine between a Smart Home Controller and a local state tree.
//!
//! This crate owns the mirroring logic; the hub's HTTP surface lives in
//! `shcsync-api` and the host's storage is abstracted behind [`LocalTree`]:
//!
//! - **[`Engine`]**: Central facade. [`run_discovery()`](Engine::run_discovery)
//!   walks every registered handler's detection in order,
//!   [`start_reconnection_loop()`](Engine::start_reconnection_loop) spawns the
//!   long-poll feed and the rate-limited outbound writer, and
//!   [`on_local_change()`](Engine::on_local_change) queues user edits for the hub.
//!
//! - **[`SyncHandler`]**: The unit of work. Each handler discovers its slice of
//!   the hub, claims inbound notifications it recognizes, and forwards local
//!   edits it owns. [`DeviceHandler`] is the reference implementation.
//!
//! - **[`NodeCache`]**: `DashMap`-backed index from local address to the remote
//!   descriptors an attribute was built from. Rebuildable from node metadata,
//!   so restarts resolve notifications without a remote re-scan.
//!
//! - **[`codec`]** / **[`definition`]**: value mapping between hub JSON and
//!   flat storage values, and the static role/unit/write tables.

pub mod cache;
pub mod codec;
pub mod config;
pub mod definition;
pub mod engine;
pub mod enum_queue;
pub mod error;
pub mod handler;
pub mod model;
pub mod poller;
pub mod rate_limit;
pub mod remote;
pub mod tree;

#[cfg(test)]
pub(crate) mod testing;

// ── Primary re-exports ──────────────────────────────────────────────
pub use cache::{CacheEntry, NodeCache, RestoreStats, ServiceEntry};
pub use config::{EngineConfig, Namespace, PollConfig};
pub use engine::{ConnectionState, DiscoveryReport, Engine, HandlerOutcome};
pub use error::{CoreError, DiscoveryPhase, TransportError};
pub use handler::device::DeviceHandler;
pub use handler::general::GeneralUpdateHandler;
pub use handler::hooks::{ArmingCountdownHook, UpdateHook};
pub use handler::{HandlerContext, SyncHandler};
pub use model::{Notification, RemoteEntity};
pub use rate_limit::RateLimiter;
pub use remote::{EntityKind, FeedHandle, HubTransport, PollResponse, RemoteTransport};
pub use tree::memory::MemoryTree;
pub use tree::{
    EnumCategory, LocalTree, NodeCommon, NodeKind, NodeObject, StorageValue, TreeError, ValueType,
};
