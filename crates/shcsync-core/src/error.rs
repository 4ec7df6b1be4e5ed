// ── Core error types ──
//
// Errors surfaced by the sync engine. Transport failures are folded into
// `TransportError`, whose variants drive the long-poll loop's retry
// strategy. The `From<shcsync_api::Error>` impl performs that
// classification so nothing above the remote adapter sees reqwest types.

use thiserror::Error;

use crate::tree::TreeError;

// ── TransportError ───────────────────────────────────────────────────

/// A failed call against the hub, classified by recovery strategy.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum TransportError {
    #[error("request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("connection aborted: {0}")]
    Aborted(String),

    /// The feed no longer recognizes the subscription id.
    #[error("subscription rejected by hub: {0}")]
    StaleSubscription(String),

    #[error("hub answered HTTP {status}")]
    Status { status: u16, body: String },

    #[error("{0}")]
    Other(String),
}

impl TransportError {
    /// Failures after which the feed handle can no longer be trusted.
    pub fn requires_resubscribe(&self) -> bool {
        matches!(
            self,
            Self::Timeout { .. } | Self::Aborted(_) | Self::StaleSubscription(_)
        )
    }
}

impl From<shcsync_api::Error> for TransportError {
    fn from(err: shcsync_api::Error) -> Self {
        if let shcsync_api::Error::Timeout { timeout_ms } = err {
            return Self::Timeout { timeout_ms };
        }
        if err.is_timeout() {
            return Self::Timeout { timeout_ms: 0 };
        }
        if err.is_aborted() {
            return Self::Aborted(err.to_string());
        }
        match err {
            shcsync_api::Error::Http { status, body } => Self::Status { status, body },
            shcsync_api::Error::JsonRpc { code, message } => {
                Self::StaleSubscription(format!("{code}: {message}"))
            }
            other => Self::Other(other.to_string()),
        }
    }
}

// ── DiscoveryPhase ───────────────────────────────────────────────────

/// Ordered phases of device discovery.
#[derive(Debug, Clone, Copy, PartialEq, Eq, strum::Display)]
#[strum(serialize_all = "snake_case")]
pub enum DiscoveryPhase {
    RestoreCache,
    FetchRooms,
    FetchDevices,
    FetchDeviceServices,
    ImportStates,
}

// ── CoreError ────────────────────────────────────────────────────────

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("Configuration error: {message}")]
    Config { message: String },

    #[error("Remote call failed: {0}")]
    Transport(#[from] TransportError),

    #[error("Local tree error: {0}")]
    Tree(#[from] TreeError),

    #[error("Discovery failed during {phase}: {source}")]
    Discovery {
        phase: DiscoveryPhase,
        #[source]
        source: TransportError,
    },

    #[error("Engine already started")]
    AlreadyStarted,

    #[error("Engine stopped")]
    Stopped,
}

impl From<shcsync_api::Error> for CoreError {
    fn from(err: shcsync_api::Error) -> Self {
        Self::Transport(err.into())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn api_errors_are_classified() {
        let timeout: TransportError = shcsync_api::Error::Timeout { timeout_ms: 32_000 }.into();
        assert_eq!(timeout, TransportError::Timeout { timeout_ms: 32_000 });
        assert!(timeout.requires_resubscribe());

        let rpc: TransportError = shcsync_api::Error::JsonRpc {
            code: -32001,
            message: "No subscription with id: abc".into(),
        }
        .into();
        assert!(matches!(rpc, TransportError::StaleSubscription(_)));
        assert!(rpc.requires_resubscribe());

        let status: TransportError = shcsync_api::Error::Http {
            status: 503,
            body: String::new(),
        }
        .into();
        assert!(matches!(status, TransportError::Status { status: 503, .. }));
        assert!(!status.requires_resubscribe());

        let tls: TransportError = shcsync_api::Error::Tls("bad cert".into()).into();
        assert!(matches!(tls, TransportError::Other(_)));
    }

    #[test]
    fn discovery_error_names_phase() {
        let err = CoreError::Discovery {
            phase: DiscoveryPhase::FetchDeviceServices,
            source: TransportError::Other("connection refused".into()),
        };
        assert_eq!(
            err.to_string(),
            "Discovery failed during fetch_device_services: connection refused"
        );
    }
}
