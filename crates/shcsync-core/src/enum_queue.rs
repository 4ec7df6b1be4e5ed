// ── Enum assignment queue ──
//
// Room and function membership is written by a single worker so that
// group creation never races with itself. Tasks run strictly in
// submission order; a failure is logged and the next task proceeds.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::tree::{EnumCategory, LocalTree};

/// One membership assignment. Addresses are relative.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EnumTask {
    pub category: EnumCategory,
    pub label: String,
    pub device_addr: String,
    pub service_addr: String,
    pub attr_addr: Option<String>,
}

impl EnumTask {
    /// The node that joins the group: the attribute if given, else the channel.
    pub fn member(&self) -> &str {
        self.attr_addr.as_deref().unwrap_or(&self.service_addr)
    }
}

/// `" Living Room "` -> `"living_room"`
pub fn normalize_label(label: &str) -> String {
    label.trim().to_lowercase().replace(' ', "_")
}

enum Message {
    Assign(EnumTask),
    Flush(oneshot::Sender<()>),
}

/// Handle to the queue's worker task. Cheap to clone.
#[derive(Clone)]
pub struct EnumQueue {
    tx: mpsc::UnboundedSender<Message>,
}

impl EnumQueue {
    /// Start the worker. Must be called within a tokio runtime.
    pub fn spawn(tree: Arc<dyn LocalTree>, cancel: CancellationToken) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        tokio::spawn(worker(tree, rx, cancel));
        Self { tx }
    }

    pub fn submit(&self, mut task: EnumTask) {
        task.label = normalize_label(&task.label);
        if task.label.is_empty() {
            debug!(member = task.member(), "skipping enum assignment with empty label");
            return;
        }
        if self.tx.send(Message::Assign(task)).is_err() {
            debug!("enum queue closed; assignment dropped");
        }
    }

    /// Resolves once every task submitted before this call has run.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.tx.send(Message::Flush(tx)).is_ok() {
            let _ = rx.await;
        }
    }
}

async fn worker(
    tree: Arc<dyn LocalTree>,
    mut rx: mpsc::UnboundedReceiver<Message>,
    cancel: CancellationToken,
) {
    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            message = rx.recv() => {
                let Some(message) = message else { break };
                match message {
                    Message::Assign(task) => {
                        if let Err(e) = tree
                            .add_to_enum(task.category, &task.label, task.member())
                            .await
                        {
                            warn!(
                                error = %e,
                                category = %task.category,
                                label = task.label,
                                device = task.device_addr,
                                "enum assignment failed"
                            );
                        }
                    }
                    Message::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }
        }
    }
}
