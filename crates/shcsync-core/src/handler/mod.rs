// ── Synchronization handlers ──
//
// A handler owns one slice of the hub: it discovers it, claims the
// notifications it recognizes and forwards the local edits it owns.
// The engine keeps handlers in registration order and offers every
// notification to each in turn until one claims it.

pub mod device;
pub mod general;
pub mod hooks;

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::config::Namespace;
use crate::error::{CoreError, TransportError};
use crate::model::Notification;
use crate::remote::RemoteTransport;
use crate::tree::{LocalTree, StorageValue};

#[async_trait]
pub trait SyncHandler: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// (Re-)discover this handler's entities. Idempotent: creates missing
    /// nodes and never clobbers existing values except nodes that always
    /// mirror the hub.
    async fn detect(&self) -> Result<(), CoreError>;

    /// Returns `true` when the notification was recognized and processed.
    /// Failures are logged, not returned.
    async fn handle_remote_update(&self, notification: &Notification) -> bool;

    /// Returns `true` when `address` (full namespace) belongs to this
    /// handler. Issues the outbound write.
    async fn handle_local_change(&self, address: &str, value: &StorageValue) -> bool;
}

/// Collaborators shared by every handler of one engine.
#[derive(Clone)]
pub struct HandlerContext {
    pub tree: Arc<dyn LocalTree>,
    pub remote: Arc<dyn RemoteTransport>,
    pub namespace: Namespace,
    /// Deadline for discovery fetches and single-record lookups.
    pub long_timeout: Duration,
}

impl HandlerContext {
    /// Run a remote call under the long timeout.
    pub async fn with_timeout<T, F>(&self, call: F) -> Result<T, TransportError>
    where
        F: Future<Output = Result<T, TransportError>>,
    {
        tokio::time::timeout(self.long_timeout, call)
            .await
            .unwrap_or_else(|_| {
                Err(TransportError::Timeout {
                    timeout_ms: u64::try_from(self.long_timeout.as_millis()).unwrap_or(u64::MAX),
                })
            })
    }
}
