// ── In-memory local tree ──
//
// Reference `LocalTree` used by the CLI's one-shot discovery and by the
// engine's tests. Everything lives in ordered maps behind std locks; no
// guard is held across an await point.

use std::collections::{BTreeMap, BTreeSet};
use std::sync::RwLock;

use async_trait::async_trait;

use super::{EnumCategory, LocalTree, NodeObject, StorageValue, TreeError};

/// A stored value and whether the hub acknowledged it.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredState {
    pub value: StorageValue,
    pub ack: bool,
}

#[derive(Debug, Default)]
pub struct MemoryTree {
    nodes: RwLock<BTreeMap<String, NodeObject>>,
    values: RwLock<BTreeMap<String, StoredState>>,
    enums: RwLock<BTreeMap<(EnumCategory, String), BTreeSet<String>>>,
}

fn poisoned<T>(_: T) -> TreeError {
    TreeError::Backend("lock poisoned".into())
}

fn validate(address: &str) -> Result<(), TreeError> {
    let invalid = |reason: &str| TreeError::InvalidAddress {
        address: address.to_owned(),
        reason: reason.to_owned(),
    };
    if address.is_empty() {
        return Err(invalid("empty address"));
    }
    if address.starts_with('.') || address.ends_with('.') || address.contains("..") {
        return Err(invalid("empty segment"));
    }
    Ok(())
}

impl MemoryTree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Value plus ack flag, for assertions and inspection.
    pub fn state(&self, address: &str) -> Option<StoredState> {
        self.values.read().ok()?.get(address).cloned()
    }

    /// Members of one enum group, in sorted order.
    pub fn enum_members(&self, category: EnumCategory, label: &str) -> Vec<String> {
        self.enums
            .read()
            .ok()
            .and_then(|enums| {
                enums
                    .get(&(category, label.to_owned()))
                    .map(|members| members.iter().cloned().collect())
            })
            .unwrap_or_default()
    }

    /// Every node with its current value, ordered by address.
    pub fn snapshot(&self) -> Vec<(String, NodeObject, Option<StorageValue>)> {
        let (Ok(nodes), Ok(values)) = (self.nodes.read(), self.values.read()) else {
            return Vec::new();
        };
        nodes
            .iter()
            .map(|(address, node)| {
                let value = values.get(address).map(|s| s.value.clone());
                (address.clone(), node.clone(), value)
            })
            .collect()
    }

    pub fn len(&self) -> usize {
        self.nodes.read().map(|nodes| nodes.len()).unwrap_or(0)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[async_trait]
impl LocalTree for MemoryTree {
    async fn get_node(&self, address: &str) -> Result<Option<NodeObject>, TreeError> {
        Ok(self.nodes.read().map_err(poisoned)?.get(address).cloned())
    }

    async fn create_node_if_absent(
        &self,
        address: &str,
        node: NodeObject,
    ) -> Result<bool, TreeError> {
        validate(address)?;
        let mut nodes = self.nodes.write().map_err(poisoned)?;
        if nodes.contains_key(address) {
            return Ok(false);
        }
        nodes.insert(address.to_owned(), node);
        Ok(true)
    }

    async fn put_node(&self, address: &str, node: NodeObject) -> Result<(), TreeError> {
        validate(address)?;
        self.nodes
            .write()
            .map_err(poisoned)?
            .insert(address.to_owned(), node);
        Ok(())
    }

    async fn get_value(&self, address: &str) -> Result<Option<StorageValue>, TreeError> {
        Ok(self
            .values
            .read()
            .map_err(poisoned)?
            .get(address)
            .map(|s| s.value.clone()))
    }

    async fn set_value(
        &self,
        address: &str,
        value: StorageValue,
        from_remote: bool,
    ) -> Result<(), TreeError> {
        if !self.nodes.read().map_err(poisoned)?.contains_key(address) {
            return Err(TreeError::NotFound {
                address: address.to_owned(),
            });
        }
        self.values.write().map_err(poisoned)?.insert(
            address.to_owned(),
            StoredState {
                value,
                ack: from_remote,
            },
        );
        Ok(())
    }

    async fn list_children(&self, parent: &str) -> Result<Vec<(String, NodeObject)>, TreeError> {
        let nodes = self.nodes.read().map_err(poisoned)?;
        if parent.is_empty() {
            return Ok(nodes.iter().map(|(a, n)| (a.clone(), n.clone())).collect());
        }
        let prefix = format!("{parent}.");
        Ok(nodes
            .range(prefix.clone()..)
            .take_while(|(address, _)| address.starts_with(&prefix))
            .map(|(a, n)| (a.clone(), n.clone()))
            .collect())
    }

    async fn add_to_enum(
        &self,
        category: EnumCategory,
        label: &str,
        member: &str,
    ) -> Result<(), TreeError> {
        if label.is_empty() {
            return Err(TreeError::InvalidAddress {
                address: format!("enum.{category}"),
                reason: "empty label".into(),
            });
        }
        self.enums
            .write()
            .map_err(poisoned)?
            .entry((category, label.to_owned()))
            .or_default()
            .insert(member.to_owned());
        Ok(())
    }
}
