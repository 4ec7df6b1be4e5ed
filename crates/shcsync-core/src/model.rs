// ── Remote payload model ──
//
// The hub's records vary by firmware and device family, so they stay
// untyped JSON maps. Accessors are fallible and never panic on a missing
// or mistyped field.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Key holding a record's type tag (`"room"`, `"DeviceServiceData"`,
/// `"temperatureLevelState"`, ...).
pub const TYPE_KEY: &str = "@type";

/// Attribute name used for the per-service fault list.
pub const FAULTS_KEY: &str = "faults";

// ── RemoteEntity ─────────────────────────────────────────────────────

/// A room, device or device-service record as the hub reports it.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RemoteEntity(Map<String, Value>);

impl RemoteEntity {
    /// Wrap a JSON value. Non-object values are not entity records.
    pub fn from_value(value: Value) -> Option<Self> {
        match value {
            Value::Object(map) => Some(Self(map)),
            _ => None,
        }
    }

    pub fn to_value(&self) -> Value {
        Value::Object(self.0.clone())
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn str_field(&self, key: &str) -> Option<&str> {
        self.0.get(key).and_then(Value::as_str)
    }

    pub fn id(&self) -> Option<&str> {
        self.str_field("id")
    }

    pub fn name(&self) -> Option<&str> {
        self.str_field("name")
    }

    /// Join key for push notifications on device services.
    pub fn path(&self) -> Option<&str> {
        self.str_field("path")
    }

    pub fn room_id(&self) -> Option<&str> {
        self.str_field("roomId")
    }

    pub fn device_id(&self) -> Option<&str> {
        self.str_field("deviceId")
    }

    pub fn device_model(&self) -> Option<&str> {
        self.str_field("deviceModel")
    }

    pub fn root_device_id(&self) -> Option<&str> {
        self.str_field("rootDeviceId")
    }

    pub fn entity_type(&self) -> Option<&str> {
        self.str_field(TYPE_KEY)
    }

    pub fn state(&self) -> Option<&Map<String, Value>> {
        self.0.get("state").and_then(Value::as_object)
    }

    /// The entity kind of a device service (its state's `@type`).
    pub fn state_type(&self) -> Option<&str> {
        self.state()?.get(TYPE_KEY).and_then(Value::as_str)
    }

    /// State attributes without the type tag.
    pub fn attributes(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.state()
            .into_iter()
            .flat_map(|state| state.iter())
            .filter(|(key, _)| key.as_str() != TYPE_KEY)
    }

    /// `faults.entries` when non-empty, otherwise an empty list.
    pub fn fault_entries(&self) -> Value {
        self.0
            .get(FAULTS_KEY)
            .and_then(|faults| faults.get("entries"))
            .filter(|entries| entries.as_array().is_some_and(|a| !a.is_empty()))
            .cloned()
            .unwrap_or_else(|| Value::Array(Vec::new()))
    }
}

// ── Notification ─────────────────────────────────────────────────────

/// Shape of an inbound change record, decided once at the boundary.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NotificationKind<'a> {
    /// Carries a `path`: a device-service state change.
    DeviceService { path: &'a str },
    /// Any other record with a type tag (`room`, `scenario`, `message`, ...).
    Typed(&'a str),
    Untyped,
}

/// One record from a long-poll batch. Transient: translated into tree
/// writes and dropped.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Notification(RemoteEntity);

impl Notification {
    pub fn from_value(value: Value) -> Option<Self> {
        RemoteEntity::from_value(value).map(Self)
    }

    pub fn kind(&self) -> NotificationKind<'_> {
        if let Some(path) = self.0.path() {
            return NotificationKind::DeviceService { path };
        }
        self.0
            .entity_type()
            .map_or(NotificationKind::Untyped, NotificationKind::Typed)
    }

    pub fn entity(&self) -> &RemoteEntity {
        &self.0
    }

    pub fn to_value(&self) -> Value {
        self.0.to_value()
    }
}

impl std::ops::Deref for Notification {
    type Target = RemoteEntity;

    fn deref(&self) -> &RemoteEntity {
        &self.0
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use pretty_assertions::assert_eq;
    use serde_json::json;

    use super::*;

    fn service() -> RemoteEntity {
        RemoteEntity::from_value(json!({
            "@type": "DeviceServiceData",
            "id": "TemperatureLevel",
            "deviceId": "hdm:HomeMaticIP:1",
            "state": { "@type": "temperatureLevelState", "temperature": 20.0 },
            "path": "/devices/hdm:HomeMaticIP:1/services/TemperatureLevel"
        }))
        .unwrap()
    }

    #[test]
    fn accessors_are_fallible() {
        let svc = service();
        assert_eq!(svc.id(), Some("TemperatureLevel"));
        assert_eq!(svc.device_id(), Some("hdm:HomeMaticIP:1"));
        assert_eq!(svc.state_type(), Some("temperatureLevelState"));
        assert_eq!(svc.room_id(), None);
        assert_eq!(svc.name(), None);
    }

    #[test]
    fn attributes_skip_type_tag() {
        let svc = service();
        let keys: Vec<_> = svc.attributes().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["temperature"]);
    }

    #[test]
    fn non_objects_are_rejected() {
        assert!(RemoteEntity::from_value(json!([1, 2])).is_none());
        assert!(Notification::from_value(json!("text")).is_none());
    }

    #[test]
    fn fault_entries_default_to_empty_list() {
        assert_eq!(service().fault_entries(), json!([]));

        let faulty = RemoteEntity::from_value(json!({
            "faults": { "entries": [{ "type": "LOW_BATTERY", "category": "WARNING" }] }
        }))
        .unwrap();
        assert_eq!(
            faulty.fault_entries(),
            json!([{ "type": "LOW_BATTERY", "category": "WARNING" }])
        );

        let cleared = RemoteEntity::from_value(json!({ "faults": { "entries": [] } })).unwrap();
        assert_eq!(cleared.fault_entries(), json!([]));
    }

    #[test]
    fn notification_kind_prefers_path() {
        let update = Notification::from_value(service().to_value()).unwrap();
        assert_eq!(
            update.kind(),
            NotificationKind::DeviceService {
                path: "/devices/hdm:HomeMaticIP:1/services/TemperatureLevel"
            }
        );

        let room = Notification::from_value(json!({ "@type": "room", "id": "hz_1" })).unwrap();
        assert_eq!(room.kind(), NotificationKind::Typed("room"));

        let bare = Notification::from_value(json!({ "id": "x" })).unwrap();
        assert_eq!(bare.kind(), NotificationKind::Untyped);
    }
}
