// ── General update mirror ──
//
// Writes every inbound notification, verbatim, to a single `updates`
// node so scripts on the host side can react to record kinds no handler
// models. Never claims a notification.

use async_trait::async_trait;
use serde_json::Value;
use tracing::warn;

use super::{HandlerContext, SyncHandler};
use crate::definition::TypeMetadata;
use crate::error::CoreError;
use crate::model::Notification;
use crate::tree::{NodeObject, StorageValue, ValueType};

pub const UPDATES_ADDRESS: &str = "updates";

pub struct GeneralUpdateHandler {
    ctx: HandlerContext,
}

impl GeneralUpdateHandler {
    pub fn new(ctx: HandlerContext) -> Self {
        Self { ctx }
    }
}

#[async_trait]
impl SyncHandler for GeneralUpdateHandler {
    fn name(&self) -> &'static str {
        "general"
    }

    async fn detect(&self) -> Result<(), CoreError> {
        let meta = TypeMetadata {
            value_type: ValueType::Json,
            ..TypeMetadata::for_value("json", None)
        }
        .read_only();
        self.ctx
            .tree
            .put_node(UPDATES_ADDRESS, NodeObject::state("Updates", &meta, Value::Null))
            .await?;
        Ok(())
    }

    async fn handle_remote_update(&self, notification: &Notification) -> bool {
        let text = StorageValue::Text(notification.to_value().to_string());
        if let Err(e) = self.ctx.tree.set_value(UPDATES_ADDRESS, text, true).await {
            warn!(error = %e, "could not mirror update");
        }
        false
    }

    async fn handle_local_change(&self, _address: &str, _value: &StorageValue) -> bool {
        false
    }
}
