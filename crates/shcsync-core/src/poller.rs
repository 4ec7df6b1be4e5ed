// ── Long-poll reconnection loop ──
//
// subscribe → long-poll → apply → poll again. Failures are classified
// by `TransportError`: a stale handle (timeout, abort, rejected id) is
// replaced after a short delay, anything else is retried on the same
// handle after a longer one. Every remote call is bounded here as well,
// so a transport without its own deadline cannot stall the loop. The
// loop never gives up on its own; only cancellation ends it.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, trace, warn};

use crate::config::PollConfig;
use crate::engine::ConnectionState;
use crate::handler::SyncHandler;
use crate::error::TransportError;
use crate::model::Notification;
use crate::remote::{FeedHandle, PollResponse, RemoteTransport};
use crate::tree::LocalTree;

/// Relative address of the connection indicator node.
pub const CONNECTION_ADDRESS: &str = "info.connection";

const SERVICE_UNAVAILABLE: u16 = 503;

pub(crate) struct Poller {
    pub(crate) remote: Arc<dyn RemoteTransport>,
    pub(crate) tree: Arc<dyn LocalTree>,
    pub(crate) handlers: Arc<[Arc<dyn SyncHandler>]>,
    pub(crate) poll: PollConfig,
    /// Bound on subscribe and the final unsubscribe.
    pub(crate) call_timeout: Duration,
    pub(crate) state: watch::Sender<ConnectionState>,
    pub(crate) cancel: CancellationToken,
}

impl Poller {
    pub(crate) async fn run(self) {
        let mut live: Option<FeedHandle> = None;
        let mut connected: Option<bool> = None;
        let mut attempt: u32 = 0;

        loop {
            if self.cancel.is_cancelled() {
                break;
            }

            // ── Subscribe ────────────────────────────────────────
            let Some(handle) = live.clone() else {
                self.state.send_replace(ConnectionState::Connecting);
                let result = tokio::select! {
                    biased;
                    () = self.cancel.cancelled() => break,
                    result = tokio::time::timeout(self.call_timeout, self.remote.subscribe()) => {
                        result.unwrap_or_else(|_| Err(timed_out(self.call_timeout)))
                    }
                };
                match result {
                    Ok(handle) => {
                        info!(subscription = %handle, "subscribed to change feed");
                        live = Some(handle);
                    }
                    Err(e) => {
                        warn!(error = %e, "subscribe failed");
                        self.set_connected(&mut connected, false).await;
                        attempt += 1;
                        if !self.backoff(self.poll.resubscribe_delay, attempt).await {
                            break;
                        }
                    }
                }
                continue;
            };

            // ── Poll ─────────────────────────────────────────────
            let result = tokio::select! {
                biased;
                () = self.cancel.cancelled() => break,
                result = self.poll_once(&handle) => result,
            };

            match result {
                Ok(response) if response.is_success() => {
                    attempt = 0;
                    self.state.send_replace(ConnectionState::Connected);
                    self.set_connected(&mut connected, true).await;
                    self.dispatch(response.notifications).await;
                }
                Ok(response) => {
                    let delay = if response.status == SERVICE_UNAVAILABLE {
                        info!("hub is starting (503); waiting before next poll");
                        self.poll.unavailable_delay
                    } else {
                        warn!(status = response.status, "long poll failed");
                        self.poll.error_delay
                    };
                    self.set_connected(&mut connected, false).await;
                    attempt += 1;
                    if !self.backoff(delay, attempt).await {
                        break;
                    }
                }
                Err(e) if e.requires_resubscribe() => {
                    info!(error = %e, subscription = %handle, "subscription considered stale");
                    self.set_connected(&mut connected, false).await;
                    live = None;
                    attempt += 1;
                    if !self.backoff(self.poll.resubscribe_delay, attempt).await {
                        break;
                    }
                }
                Err(e) => {
                    warn!(error = %e, "long poll failed");
                    self.set_connected(&mut connected, false).await;
                    attempt += 1;
                    if !self.backoff(self.poll.error_delay, attempt).await {
                        break;
                    }
                }
            }
        }

        if let Some(handle) = live {
            match tokio::time::timeout(self.call_timeout, self.remote.unsubscribe(&handle))
                .await
            {
                Ok(Ok(())) => debug!(subscription = %handle, "unsubscribed"),
                Ok(Err(e)) => debug!(error = %e, "unsubscribe failed"),
                Err(_) => debug!("unsubscribe timed out"),
            }
        }
        self.set_connected(&mut connected, false).await;
        self.state.send_replace(ConnectionState::Disconnected);
        debug!("long-poll loop exiting");
    }

    /// One long poll, given up after `wait + grace` whatever the transport
    /// does.
    async fn poll_once(&self, handle: &FeedHandle) -> Result<PollResponse, TransportError> {
        let deadline = self.poll.wait + self.poll.grace;
        tokio::time::timeout(
            deadline,
            self.remote.long_poll(handle, self.poll.wait, self.poll.grace),
        )
        .await
        .unwrap_or_else(|_| Err(timed_out(deadline)))
    }

    /// Offer each notification to the handlers in order; the first one
    /// that claims it wins. Anything left after shutdown is dropped.
    async fn dispatch(&self, notifications: Vec<Notification>) {
        trace!(count = notifications.len(), "applying notifications");
        for notification in notifications {
            if self.cancel.is_cancelled() {
                debug!("shutdown signalled; discarding remaining notifications");
                return;
            }
            let mut claimed = false;
            for handler in self.handlers.iter() {
                if handler.handle_remote_update(&notification).await {
                    claimed = true;
                    break;
                }
            }
            if !claimed {
                debug!(
                    kind = notification.entity_type(),
                    id = notification.id(),
                    "no handler claimed notification"
                );
            }
        }
    }

    /// Sleep for `delay` unless cancelled first. Returns `false` on cancel.
    async fn backoff(&self, delay: Duration, attempt: u32) -> bool {
        self.state.send_replace(ConnectionState::Reconnecting { attempt });
        debug!(delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX), attempt, "waiting");
        tokio::select! {
            biased;
            () = self.cancel.cancelled() => false,
            () = tokio::time::sleep(delay) => true,
        }
    }

    /// Mirror connectivity to `info.connection`, writing only on change.
    async fn set_connected(&self, current: &mut Option<bool>, value: bool) {
        if *current == Some(value) {
            return;
        }
        *current = Some(value);
        if let Err(e) = self
            .tree
            .set_value(CONNECTION_ADDRESS, value.into(), true)
            .await
        {
            warn!(error = %e, "could not update connection indicator");
        }
    }
}

fn timed_out(after: Duration) -> TransportError {
    TransportError::Timeout {
        timeout_ms: u64::try_from(after.as_millis()).unwrap_or(u64::MAX),
    }
}
