// ── Device handler ──
//
// Mirrors rooms, devices and device services. Every device service
// becomes a channel `<deviceId>.<serviceId>` holding one state per
// attribute plus a read-only `faults` list. Push notifications are
// resolved back to those nodes through the node cache.

use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashSet;
use serde_json::{Map, Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use super::hooks::{ArmingCountdownHook, UpdateHook};
use super::{HandlerContext, SyncHandler};
use crate::cache::{CacheEntry, NodeCache, ServiceEntry, device_native};
use crate::codec;
use crate::definition;
use crate::enum_queue::{EnumQueue, EnumTask};
use crate::error::{CoreError, DiscoveryPhase};
use crate::model::{FAULTS_KEY, Notification, NotificationKind, RemoteEntity, TYPE_KEY};
use crate::remote::EntityKind;
use crate::tree::{EnumCategory, NodeObject, StorageValue, TreeError};

/// Name of the hub's own device node.
pub const ROOT_DEVICE_NAME: &str = "BSHC";

pub struct DeviceHandler {
    ctx: HandlerContext,
    cache: NodeCache,
    /// Service paths that neither the hub nor the notification could
    /// turn into a channel. Cleared on every discovery.
    unresolved: DashSet<String>,
    enums: EnumQueue,
    hooks: Vec<Box<dyn UpdateHook>>,
}

impl DeviceHandler {
    /// Must be called within a tokio runtime: spawns the enum worker,
    /// which stops with `cancel`.
    pub fn new(ctx: HandlerContext, cancel: CancellationToken) -> Self {
        let enums = EnumQueue::spawn(Arc::clone(&ctx.tree), cancel);
        Self {
            cache: NodeCache::new(ctx.namespace.clone()),
            ctx,
            unresolved: DashSet::new(),
            enums,
            hooks: vec![Box::new(ArmingCountdownHook)],
        }
    }

    /// Register an additional post-update hook.
    #[must_use]
    pub fn with_hook(mut self, hook: impl UpdateHook + 'static) -> Self {
        self.hooks.push(Box::new(hook));
        self
    }

    pub fn cache(&self) -> &NodeCache {
        &self.cache
    }

    /// Wait for queued room/function assignments.
    pub async fn flush_enums(&self) {
        self.enums.flush().await;
    }

    // ── Discovery ────────────────────────────────────────────────────

    async fn fetch(
        &self,
        phase: DiscoveryPhase,
        kind: EntityKind,
    ) -> Result<Vec<RemoteEntity>, CoreError> {
        let entities = self
            .ctx
            .with_timeout(self.ctx.remote.fetch_entities(kind))
            .await
            .map_err(|source| CoreError::Discovery { phase, source })?;
        debug!(%phase, count = entities.len(), "fetched");
        Ok(entities)
    }

    async fn import_device(&self, device: &RemoteEntity) -> Result<(), TreeError> {
        let Some(id) = device.id() else {
            debug!("device without id ignored");
            return Ok(());
        };

        let name = self.display_name(Some(device));
        let room = device.room_id().and_then(|room_id| self.cache.room(room_id));
        self.ctx
            .tree
            .create_node_if_absent(id, NodeObject::device(name, device_native(device, room.as_ref())))
            .await?;
        self.cache.put_device(device.clone());

        // The hub is not listed as a device of its own; every device
        // names it as its root.
        if let Some(root_id) = device.root_device_id() {
            if self.cache.get_device(root_id).is_some() {
                return Ok(());
            }
            let mut root = Map::new();
            root.insert("id".into(), Value::String(root_id.to_owned()));
            if let Some(room_id) = device.room_id() {
                root.insert("roomId".into(), Value::String(room_id.to_owned()));
            }
            root.insert("name".into(), Value::String(ROOT_DEVICE_NAME.to_owned()));
            let root = RemoteEntity::from_value(Value::Object(root)).unwrap_or_default();
            self.ctx
                .tree
                .create_node_if_absent(
                    root_id,
                    NodeObject::device(ROOT_DEVICE_NAME, device_native(&root, room.as_ref())),
                )
                .await?;
            self.cache.put_device(root);
        }
        Ok(())
    }

    /// Device a service belongs to. `Ok(None)` for device-less services,
    /// `Err(())` when the service names a device that was never seen.
    fn device_for(&self, service: &RemoteEntity) -> Result<Option<RemoteEntity>, ()> {
        match service.device_id() {
            None => Ok(None),
            Some(id) => self.cache.get_device(id).map(Some).ok_or(()),
        }
    }

    /// Create the channel for a service, its faults node and one state per
    /// attribute. Room and function membership is assigned once, when the
    /// channel is first created.
    async fn import_service(
        &self,
        device: Option<&RemoteEntity>,
        service: &RemoteEntity,
    ) -> Result<(), TreeError> {
        let Some(channel) = channel_address(device, service) else {
            debug!("device service without id ignored");
            return Ok(());
        };
        let service_id = service.id().unwrap_or_default();

        let entry = ServiceEntry {
            device: device.cloned(),
            device_service: service.clone(),
        };
        let name = format!("{}.{service_id}", self.display_name(device));
        let created = self
            .ctx
            .tree
            .create_node_if_absent(&channel, NodeObject::channel(name, entry.native()))
            .await?;
        if created {
            self.assign_enums(device, service_id, &channel);
        }

        self.import_attribute(&channel, device, service, FAULTS_KEY, &service.fault_entries(), Some(false))
            .await?;

        if let Some(path) = service.path() {
            self.cache.put_service(path, device.cloned(), service.clone());
        }

        for (key, value) in service.attributes() {
            self.import_attribute(&channel, device, service, key, value, None)
                .await?;
        }
        Ok(())
    }

    fn assign_enums(&self, device: Option<&RemoteEntity>, service_id: &str, channel: &str) {
        let device_addr = device.and_then(RemoteEntity::id).unwrap_or(service_id);

        if let Some(label) = device.and_then(|d| self.cache.room_name_of(d)) {
            self.enums.submit(EnumTask {
                category: EnumCategory::Rooms,
                label,
                device_addr: device_addr.to_owned(),
                service_addr: channel.to_owned(),
                attr_addr: None,
            });
        }

        if let Some(label) = definition::function_for(service_id) {
            self.enums.submit(EnumTask {
                category: EnumCategory::Functions,
                label: label.to_owned(),
                device_addr: device_addr.to_owned(),
                service_addr: channel.to_owned(),
                attr_addr: None,
            });
        }
    }

    /// Create the state node for one attribute if needed, index it, and
    /// write the value unless the stored one is already equal.
    async fn import_attribute(
        &self,
        channel: &str,
        device: Option<&RemoteEntity>,
        service: &RemoteEntity,
        key: &str,
        value: &Value,
        writable: Option<bool>,
    ) -> Result<(), TreeError> {
        let address = format!("{channel}.{key}");
        let mut meta = definition::resolve(service.state_type(), key, Some(value));
        if let Some(writable) = writable {
            meta.writable = writable;
        }

        let entry = CacheEntry {
            device: device.cloned(),
            device_service: service.clone(),
            local_address: address.clone(),
            attribute_key: key.to_owned(),
        };
        let name = format!(
            "{}.{}.{key}",
            self.display_name(device),
            service.id().unwrap_or_default()
        );
        self.ctx
            .tree
            .create_node_if_absent(&address, NodeObject::state(name, &meta, entry.native()))
            .await?;
        self.cache.put(self.ctx.namespace.qualify(&address), entry);

        let incoming = codec::encode(value);
        let unchanged = self
            .ctx
            .tree
            .get_value(&address)
            .await?
            .is_some_and(|current| codec::values_equal(&current, &incoming));
        if !unchanged {
            self.ctx.tree.set_value(&address, incoming, true).await?;
        }
        Ok(())
    }

    fn display_name(&self, device: Option<&RemoteEntity>) -> String {
        let Some(device) = device else {
            return String::new();
        };
        let room = self.cache.room_name_of(device);
        definition::device_name(device.device_model(), device.name(), room.as_deref())
            .or_else(|| device.id().map(str::to_owned))
            .unwrap_or_default()
    }

    // ── Inbound ──────────────────────────────────────────────────────

    /// Cached service for `path`, importing it on first sight.
    async fn resolve_service(
        &self,
        path: &str,
        notification: &Notification,
    ) -> Option<Arc<ServiceEntry>> {
        if let Some(entry) = self.cache.get_service(path) {
            return Some(entry);
        }
        if self.unresolved.contains(path) {
            return None;
        }

        let service = match self
            .ctx
            .with_timeout(self.ctx.remote.fetch_attribute_state(path))
            .await
        {
            Ok(service) => service,
            Err(e) => {
                debug!(error = %e, path, "service lookup failed; importing from notification");
                notification.entity().clone()
            }
        };
        let device = service.device_id().map(|id| {
            self.cache.get_device(id).unwrap_or_else(|| {
                RemoteEntity::from_value(json!({ "id": id })).unwrap_or_default()
            })
        });

        info!(path, "importing previously unseen device service");
        if let Err(e) = self.import_service(device.as_ref(), &service).await {
            warn!(error = %e, path, "could not import device service");
            return None;
        }
        if service.path().is_none() && service.id().is_some() {
            self.cache.put_service(path, device, service);
        }
        let resolved = self.cache.get_service(path);
        if resolved.is_none() {
            debug!(path, "device service has no id; ignoring further updates until rediscovery");
            self.unresolved.insert(path.to_owned());
        }
        resolved
    }

    async fn apply_attribute(
        &self,
        channel: &str,
        entry: &ServiceEntry,
        key: &str,
        value: &Value,
    ) -> Result<(), TreeError> {
        let address = format!("{channel}.{key}");
        if self.ctx.tree.get_node(&address).await?.is_some() {
            self.ctx
                .tree
                .set_value(&address, codec::encode(value), true)
                .await?;
        } else {
            debug!(address, "synthesizing node for unseen attribute");
            self.import_attribute(
                channel,
                entry.device.as_ref(),
                &entry.device_service,
                key,
                value,
                None,
            )
            .await?;
        }

        for hook in &self.hooks {
            for (derived, derived_value) in hook.derive(&address, value) {
                if let Err(e) = self.ctx.tree.set_value(&derived, derived_value, true).await {
                    debug!(error = %e, address = derived, "derived write skipped");
                }
            }
        }
        Ok(())
    }
}

/// `<deviceId>.<serviceId>`, or `<serviceId>` without a device.
fn channel_address(device: Option<&RemoteEntity>, service: &RemoteEntity) -> Option<String> {
    let service_id = service.id()?;
    Some(match device.and_then(RemoteEntity::id) {
        Some(device_id) => format!("{device_id}.{service_id}"),
        None => service_id.to_owned(),
    })
}

#[async_trait]
impl SyncHandler for DeviceHandler {
    fn name(&self) -> &'static str {
        "device"
    }

    async fn detect(&self) -> Result<(), CoreError> {
        info!("detecting devices");

        match self.cache.rebuild_from_local_tree(self.ctx.tree.as_ref()).await {
            Ok(stats) => debug!(
                rooms = stats.rooms,
                devices = stats.devices,
                services = stats.services,
                attributes = stats.attributes,
                "cache restored"
            ),
            Err(e) => warn!(error = %e, phase = %DiscoveryPhase::RestoreCache, "cache restore failed"),
        }

        self.unresolved.clear();

        for room in self.fetch(DiscoveryPhase::FetchRooms, EntityKind::Rooms).await? {
            self.cache.put_room(room);
        }

        for device in self.fetch(DiscoveryPhase::FetchDevices, EntityKind::Devices).await? {
            if let Err(e) = self.import_device(&device).await {
                warn!(error = %e, device = device.id(), "could not import device");
            }
        }

        let services = self
            .fetch(DiscoveryPhase::FetchDeviceServices, EntityKind::DeviceServices)
            .await?;

        debug!(phase = %DiscoveryPhase::ImportStates, count = services.len(), "importing");
        for service in &services {
            let Ok(device) = self.device_for(service) else {
                warn!(
                    device = service.device_id(),
                    service = service.id(),
                    "device service references an unknown device"
                );
                continue;
            };
            if let Err(e) = self.import_service(device.as_ref(), service).await {
                warn!(error = %e, service = service.id(), "could not import device service");
            }
        }

        info!(
            rooms = self.cache.room_count(),
            devices = self.cache.device_count(),
            services = self.cache.service_count(),
            states = self.cache.len(),
            "detecting devices finished"
        );
        Ok(())
    }

    async fn handle_remote_update(&self, notification: &Notification) -> bool {
        let NotificationKind::DeviceService { path } = notification.kind() else {
            return false;
        };
        let Some(entry) = self.resolve_service(path, notification).await else {
            return true;
        };
        let Some(channel) = channel_address(entry.device.as_ref(), &entry.device_service) else {
            return true;
        };

        for (key, value) in notification.attributes() {
            if let Err(e) = self.apply_attribute(&channel, &entry, key, value).await {
                warn!(error = %e, path, key = key.as_str(), "could not apply update");
            }
        }

        // Cleared faults arrive as a missing or empty list.
        let faults = notification.fault_entries();
        let address = format!("{channel}.{FAULTS_KEY}");
        if let Err(e) = self
            .ctx
            .tree
            .set_value(&address, codec::encode(&faults), true)
            .await
        {
            warn!(error = %e, address, "could not write faults");
        }
        true
    }

    async fn handle_local_change(&self, address: &str, value: &StorageValue) -> bool {
        let Some(entry) = self.cache.get(address) else {
            return false;
        };
        let (Some(state_type), Some(path)) = (
            entry.device_service.state_type(),
            entry.device_service.path(),
        ) else {
            debug!(address, "cached service has no state type or path; not writable");
            return false;
        };

        let decoded = codec::decode(self.ctx.tree.as_ref(), &entry.local_address, value).await;
        let mut body = Map::new();
        body.insert(TYPE_KEY.to_owned(), Value::String(state_type.to_owned()));
        body.insert(entry.attribute_key.clone(), decoded);
        debug!(address, path, "sending state change");

        if let Err(e) = self
            .ctx
            .with_timeout(self.ctx.remote.send_command(path, Value::Object(body)))
            .await
        {
            error!(error = %e, address, %value, "hub rejected state change");
        }
        true
    }
}
