// ── Node cache ──
//
// Concurrent index from local state addresses to the remote descriptors
// they were built from, plus a path index for device services and the
// rooms and devices those services hang off. Push notifications only
// carry a service path and a partial state, so this is what turns them
// back into fully-typed node writes.
//
// Everything here is also written into node metadata (`native`), which
// lets a restart rebuild the index from the tree alone.

use std::sync::Arc;

use dashmap::DashMap;
use serde::Deserialize;
use serde_json::{Value, json};
use tracing::debug;

use crate::config::Namespace;
use crate::model::RemoteEntity;
use crate::tree::{LocalTree, NodeKind, TreeError};

/// Descriptors behind one attribute node.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub device: Option<RemoteEntity>,
    pub device_service: RemoteEntity,
    /// Relative address of the attribute node.
    pub local_address: String,
    pub attribute_key: String,
}

impl CacheEntry {
    /// Node metadata from which this entry can be restored.
    pub fn native(&self) -> Value {
        json!({
            "device": self.device,
            "deviceService": self.device_service,
            "state": self.attribute_key,
        })
    }
}

/// Descriptors behind one channel node, keyed by service path.
#[derive(Debug, Clone, PartialEq)]
pub struct ServiceEntry {
    pub device: Option<RemoteEntity>,
    pub device_service: RemoteEntity,
}

impl ServiceEntry {
    pub fn native(&self) -> Value {
        json!({
            "device": self.device,
            "deviceService": self.device_service,
        })
    }
}

/// Node metadata for a device node: the descriptor plus the room it sat
/// in when it was imported, so room names survive a restart.
pub fn device_native(device: &RemoteEntity, room: Option<&RemoteEntity>) -> Value {
    match room {
        Some(room) => json!({ "device": device, "room": room }),
        None => json!({ "device": device }),
    }
}

// Persisted shapes. Attribute natives carry `state`; channel natives don't.

#[derive(Deserialize)]
struct DeviceNative {
    device: RemoteEntity,
    #[serde(default)]
    room: Option<RemoteEntity>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct AttributeNative {
    #[serde(default)]
    device: Option<RemoteEntity>,
    device_service: RemoteEntity,
    state: String,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChannelNative {
    #[serde(default)]
    device: Option<RemoteEntity>,
    device_service: RemoteEntity,
}

/// Counts from a cache rebuild.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RestoreStats {
    pub rooms: usize,
    pub devices: usize,
    pub services: usize,
    pub attributes: usize,
}

// ── NodeCache ────────────────────────────────────────────────────────

pub struct NodeCache {
    namespace: Namespace,
    /// Room id -> room record.
    rooms: DashMap<String, RemoteEntity>,
    /// Device id -> device record.
    devices: DashMap<String, RemoteEntity>,
    /// Full-namespace attribute address -> entry.
    states: DashMap<String, Arc<CacheEntry>>,
    /// Device-service path -> descriptors.
    services: DashMap<String, Arc<ServiceEntry>>,
}

impl NodeCache {
    pub fn new(namespace: Namespace) -> Self {
        Self {
            namespace,
            rooms: DashMap::new(),
            devices: DashMap::new(),
            states: DashMap::new(),
            services: DashMap::new(),
        }
    }

    /// Index a room by id. Records without an id are ignored.
    pub fn put_room(&self, room: RemoteEntity) {
        if let Some(id) = room.id().map(str::to_owned) {
            self.rooms.insert(id, room);
        }
    }

    pub fn room(&self, id: &str) -> Option<RemoteEntity> {
        self.rooms.get(id).map(|r| r.value().clone())
    }

    /// Display name of the room a device sits in.
    pub fn room_name_of(&self, device: &RemoteEntity) -> Option<String> {
        let room = self.rooms.get(device.room_id()?)?;
        room.name().map(str::to_owned)
    }

    /// Index a device by id, replacing any earlier record.
    pub fn put_device(&self, device: RemoteEntity) {
        if let Some(id) = device.id().map(str::to_owned) {
            self.devices.insert(id, device);
        }
    }

    pub fn get_device(&self, id: &str) -> Option<RemoteEntity> {
        self.devices.get(id).map(|d| d.value().clone())
    }

    pub fn room_count(&self) -> usize {
        self.rooms.len()
    }

    pub fn device_count(&self) -> usize {
        self.devices.len()
    }

    /// Insert or replace the entry for a full-namespace address.
    pub fn put(&self, address: impl Into<String>, entry: CacheEntry) {
        self.states.insert(address.into(), Arc::new(entry));
    }

    pub fn get(&self, address: &str) -> Option<Arc<CacheEntry>> {
        self.states.get(address).map(|r| Arc::clone(r.value()))
    }

    pub fn put_service(
        &self,
        path: impl Into<String>,
        device: Option<RemoteEntity>,
        device_service: RemoteEntity,
    ) {
        self.services.insert(
            path.into(),
            Arc::new(ServiceEntry {
                device,
                device_service,
            }),
        );
    }

    pub fn get_service(&self, path: &str) -> Option<Arc<ServiceEntry>> {
        self.services.get(path).map(|r| Arc::clone(r.value()))
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }

    pub fn service_count(&self) -> usize {
        self.services.len()
    }

    /// Rebuild every index from node metadata. No remote calls.
    ///
    /// Nodes whose metadata does not carry descriptors are skipped.
    pub async fn rebuild_from_local_tree(
        &self,
        tree: &dyn LocalTree,
    ) -> Result<RestoreStats, TreeError> {
        let mut stats = RestoreStats::default();

        for (address, node) in tree.list_children("").await? {
            match node.kind {
                NodeKind::Channel => {
                    let Ok(native) = ChannelNative::deserialize(&node.native) else {
                        continue;
                    };
                    let Some(path) = native.device_service.path().map(str::to_owned) else {
                        continue;
                    };
                    self.put_service(path, native.device, native.device_service);
                    stats.services += 1;
                }
                NodeKind::State => {
                    let Ok(native) = AttributeNative::deserialize(&node.native) else {
                        continue;
                    };
                    self.put(
                        self.namespace.qualify(&address),
                        CacheEntry {
                            device: native.device,
                            device_service: native.device_service,
                            local_address: address,
                            attribute_key: native.state,
                        },
                    );
                    stats.attributes += 1;
                }
                NodeKind::Device => {
                    let Ok(native) = DeviceNative::deserialize(&node.native) else {
                        continue;
                    };
                    if let Some(room) = native.room {
                        if room.id().is_some() {
                            self.put_room(room);
                            stats.rooms += 1;
                        }
                    }
                    if native.device.id().is_some() {
                        self.put_device(native.device);
                        stats.devices += 1;
                    }
                }
                NodeKind::Folder => {}
            }
        }

        debug!(
            rooms = stats.rooms,
            devices = stats.devices,
            services = stats.services,
            attributes = stats.attributes,
            "node cache rebuilt from local tree"
        );
        Ok(stats)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;
    use crate::definition;
    use crate::tree::NodeObject;
    use crate::tree::memory::MemoryTree;

    fn entity(value: Value) -> RemoteEntity {
        RemoteEntity::from_value(value).unwrap()
    }

    fn sample_entry() -> CacheEntry {
        CacheEntry {
            device: Some(entity(json!({ "id": "hdm:HomeMaticIP:1", "roomId": "hz_2" }))),
            device_service: entity(json!({
                "id": "TemperatureLevel",
                "deviceId": "hdm:HomeMaticIP:1",
                "path": "/devices/hdm:HomeMaticIP:1/services/TemperatureLevel",
                "state": { "@type": "temperatureLevelState", "temperature": 20.0 }
            })),
            local_address: "hdm:HomeMaticIP:1.TemperatureLevel.temperature".into(),
            attribute_key: "temperature".into(),
        }
    }

    #[test]
    fn put_replaces_entry() {
        let cache = NodeCache::new(Namespace::parse("shcsync.0").unwrap());
        let mut entry = sample_entry();
        cache.put("shcsync.0.a", entry.clone());
        entry.attribute_key = "other".into();
        cache.put("shcsync.0.a", entry);
        assert_eq!(cache.len(), 1);
        assert_eq!(cache.get("shcsync.0.a").unwrap().attribute_key, "other");
        assert!(cache.get("shcsync.0.b").is_none());
    }

    #[tokio::test]
    async fn rebuild_matches_live_entries() {
        let ns = Namespace::parse("shcsync.0").unwrap();
        let tree = MemoryTree::new();
        let entry = sample_entry();
        let service = ServiceEntry {
            device: entry.device.clone(),
            device_service: entry.device_service.clone(),
        };

        let device = entry.device.clone().unwrap();
        let room = entity(json!({ "id": "hz_2", "name": "Bedroom" }));
        tree.put_node(
            "hdm:HomeMaticIP:1",
            NodeObject::device("Thermostat", device_native(&device, Some(&room))),
        )
        .await
        .unwrap();
        tree.put_node(
            "hdm:HomeMaticIP:1.TemperatureLevel",
            NodeObject::channel("TemperatureLevel", service.native()),
        )
        .await
        .unwrap();
        let meta = definition::resolve(Some("temperatureLevelState"), "temperature", None);
        tree.put_node(
            &entry.local_address,
            NodeObject::state("temperature", &meta, entry.native()),
        )
        .await
        .unwrap();
        // A state node without descriptors, e.g. `info.connection`.
        tree.put_node("info.connection", NodeObject::state("connection", &meta, Value::Null))
            .await
            .unwrap();

        let cache = NodeCache::new(ns.clone());
        let stats = cache.rebuild_from_local_tree(&tree).await.unwrap();
        assert_eq!(
            stats,
            RestoreStats {
                rooms: 1,
                devices: 1,
                services: 1,
                attributes: 1
            }
        );
        assert_eq!(cache.get_device("hdm:HomeMaticIP:1"), Some(device.clone()));
        assert_eq!(cache.room_name_of(&device).as_deref(), Some("Bedroom"));

        let restored = cache.get(&ns.qualify(&entry.local_address)).unwrap();
        assert_eq!(*restored, entry);
        let restored_service = cache
            .get_service("/devices/hdm:HomeMaticIP:1/services/TemperatureLevel")
            .unwrap();
        assert_eq!(*restored_service, service);
    }
}
