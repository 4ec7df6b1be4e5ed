// ── Remote transport seam ──
//
// What the engine needs from the hub, as a trait so handlers and the
// long-poll loop can be driven by a scripted transport in tests.
// `HubTransport` adapts the `shcsync-api` client.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use shcsync_api::HubClient;
use tracing::debug;

use crate::error::TransportError;
use crate::model::{Notification, RemoteEntity};

/// Collections fetched during discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum EntityKind {
    Rooms,
    Devices,
    DeviceServices,
}

/// Opaque change-feed subscription id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeedHandle(String);

impl FeedHandle {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for FeedHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// One long-poll answer. Notifications are empty unless `status` is 2xx.
#[derive(Debug, Clone, PartialEq)]
pub struct PollResponse {
    pub status: u16,
    pub notifications: Vec<Notification>,
}

impl PollResponse {
    pub fn ok(notifications: Vec<Notification>) -> Self {
        Self {
            status: 200,
            notifications,
        }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

#[async_trait]
pub trait RemoteTransport: Send + Sync {
    async fn fetch_entities(&self, kind: EntityKind) -> Result<Vec<RemoteEntity>, TransportError>;

    /// Full record of the device service at `path`.
    async fn fetch_attribute_state(&self, path: &str) -> Result<RemoteEntity, TransportError>;

    /// Write a partial state (`@type` plus changed attributes).
    async fn send_command(&self, path: &str, delta: Value) -> Result<(), TransportError>;

    async fn subscribe(&self) -> Result<FeedHandle, TransportError>;

    /// Ask the hub to hold the request for up to `wait`. Implementations
    /// with their own deadline allow `wait + grace` before giving up.
    async fn long_poll(
        &self,
        handle: &FeedHandle,
        wait: Duration,
        grace: Duration,
    ) -> Result<PollResponse, TransportError>;

    async fn unsubscribe(&self, handle: &FeedHandle) -> Result<(), TransportError>;
}

// ── HubTransport ─────────────────────────────────────────────────────

pub struct HubTransport {
    client: HubClient,
}

impl HubTransport {
    pub fn new(client: HubClient) -> Self {
        Self { client }
    }
}

fn entities(kind: EntityKind, values: Vec<Value>) -> Vec<RemoteEntity> {
    let total = values.len();
    let entities: Vec<_> = values
        .into_iter()
        .filter_map(RemoteEntity::from_value)
        .collect();
    if entities.len() != total {
        debug!(%kind, skipped = total - entities.len(), "ignored non-object records");
    }
    entities
}

#[async_trait]
impl RemoteTransport for HubTransport {
    async fn fetch_entities(&self, kind: EntityKind) -> Result<Vec<RemoteEntity>, TransportError> {
        let values = match kind {
            EntityKind::Rooms => self.client.rooms().await?,
            EntityKind::Devices => self.client.devices().await?,
            EntityKind::DeviceServices => self.client.device_services().await?,
        };
        Ok(entities(kind, values))
    }

    async fn fetch_attribute_state(&self, path: &str) -> Result<RemoteEntity, TransportError> {
        let value = self.client.device_service(path).await?;
        RemoteEntity::from_value(value)
            .ok_or_else(|| TransportError::Other(format!("record at {path} is not an object")))
    }

    async fn send_command(&self, path: &str, delta: Value) -> Result<(), TransportError> {
        Ok(self.client.put_state(path, &delta).await?)
    }

    async fn subscribe(&self) -> Result<FeedHandle, TransportError> {
        Ok(FeedHandle(self.client.subscribe().await?))
    }

    async fn long_poll(
        &self,
        handle: &FeedHandle,
        wait: Duration,
        grace: Duration,
    ) -> Result<PollResponse, TransportError> {
        let response = self.client.long_poll(handle.as_str(), wait, grace).await?;
        Ok(PollResponse {
            status: response.status,
            notifications: response
                .results
                .into_iter()
                .filter_map(Notification::from_value)
                .collect(),
        })
    }

    async fn unsubscribe(&self, handle: &FeedHandle) -> Result<(), TransportError> {
        Ok(self.client.unsubscribe(handle.as_str()).await?)
    }
}
