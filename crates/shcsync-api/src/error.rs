use std::io;

use thiserror::Error;

/// Top-level error type for the `shcsync-api` crate.
///
/// Covers every failure mode of the hub surfaces: transport, TLS setup,
/// REST status codes and the JSON-RPC envelope used by the long-poll feed.
/// `shcsync-core` classifies these into retry strategies.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, reset, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// Request timed out.
    #[error("Request timed out after {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// TLS setup or certificate loading error.
    #[error("TLS error: {0}")]
    Tls(String),

    // ── Hub responses ───────────────────────────────────────────────
    /// Non-success HTTP status from a REST endpoint.
    #[error("Hub answered HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// Error object inside a JSON-RPC response.
    #[error("JSON-RPC error {code}: {message}")]
    JsonRpc { code: i64, message: String },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if the request hit its deadline.
    pub fn is_timeout(&self) -> bool {
        match self {
            Self::Timeout { .. } => true,
            Self::Transport(e) => e.is_timeout(),
            _ => false,
        }
    }

    /// Returns `true` if the connection was torn down mid-request.
    ///
    /// The hub drops long-poll connections when it restarts or when the
    /// subscription expires; both surface as reset or aborted sockets.
    pub fn is_aborted(&self) -> bool {
        let Self::Transport(e) = self else {
            return false;
        };
        let mut source = std::error::Error::source(e);
        while let Some(err) = source {
            if let Some(io_err) = err.downcast_ref::<io::Error>() {
                return matches!(
                    io_err.kind(),
                    io::ErrorKind::ConnectionAborted
                        | io::ErrorKind::ConnectionReset
                        | io::ErrorKind::BrokenPipe
                        | io::ErrorKind::UnexpectedEof
                );
            }
            source = err.source();
        }
        false
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn deadline_is_a_timeout() {
        let err = Error::Timeout { timeout_ms: 5000 };
        assert!(err.is_timeout());
        assert!(!err.is_aborted());
    }

    #[test]
    fn http_and_rpc_errors_are_neither_timeout_nor_abort() {
        let http = Error::Http {
            status: 503,
            body: String::new(),
        };
        assert!(!http.is_timeout());
        assert!(!http.is_aborted());

        let rpc = Error::JsonRpc {
            code: -32001,
            message: "subscription expired".into(),
        };
        assert!(!rpc.is_timeout());
        assert!(!rpc.is_aborted());
    }
}
