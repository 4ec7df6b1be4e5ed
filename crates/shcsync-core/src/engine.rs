// ── Sync engine facade ──
//
// Owns the handler list and the background tasks: the long-poll loop
// and the rate-limited outbound writer. Cheaply cloneable.

use std::sync::Arc;

use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::{JoinHandle, JoinSet};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::config::EngineConfig;
use crate::definition::TypeMetadata;
use crate::error::CoreError;
use crate::handler::device::DeviceHandler;
use crate::handler::general::GeneralUpdateHandler;
use crate::handler::{HandlerContext, SyncHandler};
use crate::poller::{CONNECTION_ADDRESS, Poller};
use crate::rate_limit::RateLimiter;
use crate::remote::RemoteTransport;
use crate::tree::{LocalTree, NodeObject, StorageValue, ValueType};

/// State of the change feed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionState {
    Disconnected,
    /// Opening a subscription.
    Connecting,
    /// The last poll succeeded.
    Connected,
    /// Waiting before the next attempt.
    Reconnecting { attempt: u32 },
}

/// Outcome of one handler's discovery.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct HandlerOutcome {
    pub handler: &'static str,
    pub error: Option<String>,
}

/// Result of [`Engine::run_discovery`]. Failed handlers keep whatever
/// the cache restore gave them.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryReport {
    pub outcomes: Vec<HandlerOutcome>,
}

impl DiscoveryReport {
    pub fn is_complete(&self) -> bool {
        self.outcomes.iter().all(|o| o.error.is_none())
    }

    pub fn failures(&self) -> impl Iterator<Item = &HandlerOutcome> {
        self.outcomes.iter().filter(|o| o.error.is_some())
    }
}

struct LocalChange {
    address: String,
    value: StorageValue,
}

// ── Engine ───────────────────────────────────────────────────────────

#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

struct EngineInner {
    config: EngineConfig,
    ctx: HandlerContext,
    handlers: Arc<[Arc<dyn SyncHandler>]>,
    connection_state: watch::Sender<ConnectionState>,
    outbound_tx: mpsc::UnboundedSender<LocalChange>,
    outbound_rx: Mutex<Option<mpsc::UnboundedReceiver<LocalChange>>>,
    cancel: CancellationToken,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
}

impl Engine {
    /// Build an engine with the default handlers. Fails only on invalid
    /// configuration. Must be called within a tokio runtime.
    pub fn new(
        config: EngineConfig,
        tree: Arc<dyn LocalTree>,
        remote: Arc<dyn RemoteTransport>,
    ) -> Result<Self, CoreError> {
        Self::with_handlers(config, tree, remote, Vec::new())
    }

    /// Like [`new`](Self::new), with `extra` handlers consulted after the
    /// defaults, in the given order.
    pub fn with_handlers(
        config: EngineConfig,
        tree: Arc<dyn LocalTree>,
        remote: Arc<dyn RemoteTransport>,
        extra: Vec<Arc<dyn SyncHandler>>,
    ) -> Result<Self, CoreError> {
        let namespace = config.validate()?;
        let ctx = HandlerContext {
            tree,
            remote,
            namespace,
            long_timeout: config.long_timeout,
        };
        let cancel = CancellationToken::new();

        let mut handlers: Vec<Arc<dyn SyncHandler>> = vec![
            Arc::new(GeneralUpdateHandler::new(ctx.clone())),
            Arc::new(DeviceHandler::new(ctx.clone(), cancel.child_token())),
        ];
        handlers.extend(extra);

        let (connection_state, _) = watch::channel(ConnectionState::Disconnected);
        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();

        Ok(Self {
            inner: Arc::new(EngineInner {
                config,
                ctx,
                handlers: handlers.into(),
                connection_state,
                outbound_tx,
                outbound_rx: Mutex::new(Some(outbound_rx)),
                cancel,
                task_handles: Mutex::new(Vec::new()),
            }),
        })
    }

    pub fn config(&self) -> &EngineConfig {
        &self.inner.config
    }

    pub fn connection_state(&self) -> watch::Receiver<ConnectionState> {
        self.inner.connection_state.subscribe()
    }

    /// Run every handler's discovery in registration order. A failing
    /// handler is logged and the next one still runs.
    pub async fn run_discovery(&self) -> DiscoveryReport {
        let mut report = DiscoveryReport::default();
        for handler in self.inner.handlers.iter() {
            let error = match handler.detect().await {
                Ok(()) => None,
                Err(e) => {
                    warn!(
                        handler = handler.name(),
                        error = %e,
                        "discovery failed; continuing with restored state"
                    );
                    Some(e.to_string())
                }
            };
            report.outcomes.push(HandlerOutcome {
                handler: handler.name(),
                error,
            });
        }
        info!(complete = report.is_complete(), "discovery finished");
        report
    }

    /// Create the connection indicator and spawn the long-poll loop and
    /// the outbound writer.
    pub async fn start_reconnection_loop(&self) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::Stopped);
        }
        let Some(outbound_rx) = self.inner.outbound_rx.lock().await.take() else {
            return Err(CoreError::AlreadyStarted);
        };

        let tree = &self.inner.ctx.tree;
        tree.create_node_if_absent("info", NodeObject::folder("Information"))
            .await?;
        let meta = TypeMetadata {
            value_type: ValueType::Boolean,
            ..TypeMetadata::for_value("indicator.connected", None)
        }
        .read_only();
        // Definition always refreshed; the value is reset below.
        tree.put_node(
            CONNECTION_ADDRESS,
            NodeObject::state("Connected to hub", &meta, serde_json::Value::Null),
        )
        .await?;
        tree.set_value(CONNECTION_ADDRESS, false.into(), true)
            .await?;

        let poller = Poller {
            remote: Arc::clone(&self.inner.ctx.remote),
            tree: Arc::clone(tree),
            handlers: Arc::clone(&self.inner.handlers),
            poll: self.inner.config.poll.clone(),
            call_timeout: self.inner.config.long_timeout,
            state: self.inner.connection_state.clone(),
            cancel: self.inner.cancel.child_token(),
        };

        let mut handles = self.inner.task_handles.lock().await;
        handles.push(tokio::spawn(poller.run()));
        handles.push(tokio::spawn(outbound_task(
            Arc::clone(&self.inner.handlers),
            outbound_rx,
            RateLimiter::new(self.inner.config.rate_limit),
            self.inner.cancel.child_token(),
        )));
        info!("reconnection loop started");
        Ok(())
    }

    /// Queue a user edit for the hub. `address` is full-namespace.
    pub fn on_local_change(
        &self,
        address: impl Into<String>,
        value: StorageValue,
    ) -> Result<(), CoreError> {
        if self.inner.cancel.is_cancelled() {
            return Err(CoreError::Stopped);
        }
        let address = address.into();
        if self.inner.ctx.namespace.strip(&address).is_none() {
            debug!(address, "ignoring change outside namespace");
            return Ok(());
        }
        self.inner
            .outbound_tx
            .send(LocalChange { address, value })
            .map_err(|_| CoreError::Stopped)
    }

    /// Cancel background work and wait for it, including outbound writes
    /// already in flight.
    pub async fn stop(&self) {
        self.inner.cancel.cancel();
        let handles: Vec<_> = self.inner.task_handles.lock().await.drain(..).collect();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!(error = %e, "background task ended abnormally");
            }
        }
        self.inner
            .connection_state
            .send_replace(ConnectionState::Disconnected);
        info!("engine stopped");
    }
}

/// Serve local changes in submission order, spaced by the rate limiter.
/// Writes are dispatched concurrently once their slot comes up.
async fn outbound_task(
    handlers: Arc<[Arc<dyn SyncHandler>]>,
    mut rx: mpsc::UnboundedReceiver<LocalChange>,
    mut limiter: RateLimiter,
    cancel: CancellationToken,
) {
    let mut in_flight = JoinSet::new();

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            change = rx.recv() => {
                let Some(change) = change else { break };
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => break,
                    () = limiter.acquire() => {}
                }
                in_flight.spawn(dispatch_local(Arc::clone(&handlers), change));
            }
        }
        while in_flight.try_join_next().is_some() {}
    }

    while in_flight.join_next().await.is_some() {}
}

async fn dispatch_local(handlers: Arc<[Arc<dyn SyncHandler>]>, change: LocalChange) {
    for handler in handlers.iter() {
        if handler.handle_local_change(&change.address, &change.value).await {
            return;
        }
    }
    debug!(address = change.address, "no handler owns local change");
}
