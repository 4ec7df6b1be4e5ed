// shcsync-api: Async Rust client for the Smart Home Controller (REST + long-poll feed)

pub mod client;
pub mod error;
pub mod rpc;
pub mod transport;

pub use client::HubClient;
pub use error::Error;
pub use rpc::LongPollResponse;
pub use transport::{ClientIdentity, TlsMode, TransportConfig};
