// ── Local tree abstraction ──
//
// The host's hierarchical store of typed, addressable nodes. The engine
// only needs metadata create/read, value get/set, subtree listing and
// group membership; the host owns persistence.

pub mod memory;

use std::fmt;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

use crate::definition::TypeMetadata;

// ── Errors ───────────────────────────────────────────────────────────

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TreeError {
    #[error("node not found: {address}")]
    NotFound { address: String },

    #[error("invalid address '{address}': {reason}")]
    InvalidAddress { address: String, reason: String },

    #[error("tree backend error: {0}")]
    Backend(String),
}

// ── Values ───────────────────────────────────────────────────────────

/// Flat value the tree can store: string, number, boolean or null.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum StorageValue {
    Null,
    Bool(bool),
    Number(serde_json::Number),
    Text(String),
}

impl StorageValue {
    /// The stored value as JSON, without any decoding.
    pub fn to_json(&self) -> Value {
        match self {
            Self::Null => Value::Null,
            Self::Bool(b) => Value::Bool(*b),
            Self::Number(n) => Value::Number(n.clone()),
            Self::Text(s) => Value::String(s.clone()),
        }
    }
}

impl From<bool> for StorageValue {
    fn from(value: bool) -> Self {
        Self::Bool(value)
    }
}

impl From<i64> for StorageValue {
    fn from(value: i64) -> Self {
        Self::Number(value.into())
    }
}

impl From<&str> for StorageValue {
    fn from(value: &str) -> Self {
        Self::Text(value.to_owned())
    }
}

impl From<String> for StorageValue {
    fn from(value: String) -> Self {
        Self::Text(value)
    }
}

impl fmt::Display for StorageValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Null => f.write_str("null"),
            Self::Bool(b) => write!(f, "{b}"),
            Self::Number(n) => write!(f, "{n}"),
            Self::Text(s) => f.write_str(s),
        }
    }
}

/// Declared shape of a state node's value.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum ValueType {
    Boolean,
    Number,
    String,
    Array,
    Object,
    /// Arbitrary JSON document.
    Json,
    /// Unknown at creation time (the first value was null).
    Mixed,
}

impl ValueType {
    pub fn of(value: &Value) -> Self {
        match value {
            Value::Null => Self::Mixed,
            Value::Bool(_) => Self::Boolean,
            Value::Number(_) => Self::Number,
            Value::String(_) => Self::String,
            Value::Array(_) => Self::Array,
            Value::Object(_) => Self::Object,
        }
    }

    /// Whether stored text should be parsed back into JSON.
    pub fn is_structured(self) -> bool {
        matches!(self, Self::Array | Self::Object | Self::Json)
    }
}

// ── Nodes ────────────────────────────────────────────────────────────

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, strum::Display)]
#[serde(rename_all = "lowercase")]
#[strum(serialize_all = "lowercase")]
pub enum NodeKind {
    Device,
    Channel,
    State,
    Folder,
}

/// Host-visible metadata of a node.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeCommon {
    pub name: String,
    #[serde(rename = "type", default, skip_serializing_if = "Option::is_none")]
    pub value_type: Option<ValueType>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(default)]
    pub read: bool,
    #[serde(default)]
    pub write: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub unit: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub states: Option<Vec<String>>,
}

impl NodeCommon {
    fn named(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value_type: None,
            role: None,
            read: false,
            write: false,
            unit: None,
            states: None,
        }
    }
}

/// A node as stored in the tree. `native` carries engine-owned metadata
/// (the remote descriptors a node was built from) and is opaque to the host.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NodeObject {
    pub kind: NodeKind,
    pub common: NodeCommon,
    #[serde(default)]
    pub native: Value,
}

impl NodeObject {
    pub fn device(name: impl Into<String>, native: Value) -> Self {
        Self {
            kind: NodeKind::Device,
            common: NodeCommon::named(name),
            native,
        }
    }

    pub fn channel(name: impl Into<String>, native: Value) -> Self {
        Self {
            kind: NodeKind::Channel,
            common: NodeCommon::named(name),
            native,
        }
    }

    pub fn folder(name: impl Into<String>) -> Self {
        Self {
            kind: NodeKind::Folder,
            common: NodeCommon::named(name),
            native: Value::Null,
        }
    }

    pub fn state(name: impl Into<String>, meta: &TypeMetadata, native: Value) -> Self {
        Self {
            kind: NodeKind::State,
            common: NodeCommon {
                name: name.into(),
                value_type: Some(meta.value_type),
                role: Some(meta.role.to_owned()),
                read: true,
                write: meta.writable,
                unit: meta.unit.map(str::to_owned),
                states: meta
                    .states
                    .map(|states| states.iter().map(|s| (*s).to_owned()).collect()),
            },
            native,
        }
    }
}

// ── Enum categories ──────────────────────────────────────────────────

/// Grouping categories nodes can be assigned to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, strum::Display)]
#[strum(serialize_all = "lowercase")]
pub enum EnumCategory {
    Rooms,
    Functions,
}

// ── LocalTree ────────────────────────────────────────────────────────

/// Storage contract the engine writes through.
///
/// Addresses are relative to the instance namespace. Implementations must
/// be safe to call concurrently; the engine never holds a lock across
/// these calls.
#[async_trait]
pub trait LocalTree: Send + Sync {
    async fn get_node(&self, address: &str) -> Result<Option<NodeObject>, TreeError>;

    /// Create `node` unless something already lives at `address`.
    /// Returns `true` when the node was created.
    async fn create_node_if_absent(&self, address: &str, node: NodeObject)
    -> Result<bool, TreeError>;

    /// Create or replace a node. Used for nodes that mirror the hub 1:1.
    async fn put_node(&self, address: &str, node: NodeObject) -> Result<(), TreeError>;

    async fn get_value(&self, address: &str) -> Result<Option<StorageValue>, TreeError>;

    /// Write a value. `from_remote` marks values acknowledged by the hub
    /// as opposed to user edits.
    async fn set_value(
        &self,
        address: &str,
        value: StorageValue,
        from_remote: bool,
    ) -> Result<(), TreeError>;

    /// Every node below `parent`, at any depth. An empty parent lists the
    /// whole tree.
    async fn list_children(&self, parent: &str) -> Result<Vec<(String, NodeObject)>, TreeError>;

    /// Add `member` to the group `label` of `category`, creating the group
    /// if needed.
    async fn add_to_enum(
        &self,
        category: EnumCategory,
        label: &str,
        member: &str,
    ) -> Result<(), TreeError>;
}
