//! `shcsync discover`: one discovery pass, printed as the mirrored tree.

use serde::Serialize;
use tabled::Tabled;

use shcsync_core::{NodeKind, NodeObject, StorageValue};

use crate::cli::DiscoverArgs;
use crate::error::CliError;
use crate::output;

use super::Session;

// ── Records ─────────────────────────────────────────────────────────

#[derive(Debug, Serialize)]
struct NodeRecord {
    address: String,
    kind: NodeKind,
    name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    unit: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    value: Option<StorageValue>,
}

impl NodeRecord {
    fn new(address: String, node: NodeObject, value: Option<StorageValue>) -> Self {
        Self {
            address,
            kind: node.kind,
            name: node.common.name,
            role: node.common.role,
            unit: node.common.unit,
            value,
        }
    }
}

#[derive(Tabled)]
struct NodeRow {
    #[tabled(rename = "Address")]
    address: String,
    #[tabled(rename = "Kind")]
    kind: String,
    #[tabled(rename = "Name")]
    name: String,
    #[tabled(rename = "Role")]
    role: String,
    #[tabled(rename = "Value")]
    value: String,
}

fn to_row(record: &NodeRecord) -> NodeRow {
    let value = match (&record.value, &record.unit) {
        (Some(v), Some(unit)) => format!("{v} {unit}"),
        (Some(v), None) => v.to_string(),
        (None, _) => String::new(),
    };
    NodeRow {
        address: record.address.clone(),
        kind: record.kind.to_string(),
        name: record.name.clone(),
        role: record.role.clone().unwrap_or_default(),
        value,
    }
}

// ── Handler ─────────────────────────────────────────────────────────

pub async fn handle(session: &Session, args: &DiscoverArgs) -> Result<(), CliError> {
    let report = session.engine.run_discovery().await;
    if let Some(failure) = report.failures().next() {
        return Err(CliError::Discovery {
            handler: failure.handler.to_owned(),
            reason: failure.error.clone().unwrap_or_default(),
        });
    }

    let prefix = args.prefix.as_deref().unwrap_or("");
    let records: Vec<NodeRecord> = session
        .tree
        .snapshot()
        .into_iter()
        .filter(|(address, _, _)| address.starts_with(prefix))
        .map(|(address, node, value)| NodeRecord::new(address, node, value))
        .collect();

    let rendered = output::render_list(args.output, &records, to_row)?;
    output::print_output(&rendered)
}
