// Smart Home Controller HTTP client
//
// Wraps `reqwest::Client` with hub-specific URL construction and status
// handling. The REST surface lives under `/smarthome`; the long-poll feed
// is a JSON-RPC endpoint implemented in `rpc.rs` on the same client.

use std::time::Duration;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::{debug, trace};
use url::Url;

use crate::error::Error;
use crate::transport::TransportConfig;

/// Port the hub serves the paired-client API on.
pub const DEFAULT_PORT: u16 = 8444;

/// Raw HTTP client for the hub.
///
/// Entity payloads are returned as untyped JSON: the hub's models vary by
/// firmware and device family, and the sync engine treats them as opaque
/// descriptors with fallible accessors.
pub struct HubClient {
    pub(crate) http: reqwest::Client,
    base_url: Url,
    pub(crate) timeout: Duration,
}

impl HubClient {
    /// Create a client for the hub at `host` (name or IP, no scheme).
    pub fn new(host: &str, transport: &TransportConfig) -> Result<Self, Error> {
        let base_url = Url::parse(&format!("https://{host}:{DEFAULT_PORT}"))?;
        let http = transport.build_client()?;
        Ok(Self {
            http,
            base_url,
            timeout: transport.timeout,
        })
    }

    /// Create a client with a pre-built `reqwest::Client` and base URL.
    ///
    /// Used by tests to point the client at a mock server.
    pub fn with_client(http: reqwest::Client, base_url: Url) -> Self {
        Self {
            http,
            base_url,
            timeout: TransportConfig::default().timeout,
        }
    }

    /// The hub base URL.
    pub fn base_url(&self) -> &Url {
        &self.base_url
    }

    // ── URL builders ─────────────────────────────────────────────────

    /// Build `{base}/smarthome/{path}`. Accepts paths with or without a
    /// leading slash, since service paths arrive as `/devices/...`.
    pub(crate) fn smarthome_url(&self, path: &str) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        let path = path.trim_start_matches('/');
        Ok(Url::parse(&format!("{base}/smarthome/{path}"))?)
    }

    pub(crate) fn rpc_url(&self) -> Result<Url, Error> {
        let base = self.base_url.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}/remote/json-rpc"))?)
    }

    // ── Endpoints ────────────────────────────────────────────────────

    /// `GET /smarthome/rooms`
    pub async fn rooms(&self) -> Result<Vec<Value>, Error> {
        self.get(self.smarthome_url("rooms")?).await
    }

    /// `GET /smarthome/devices`
    pub async fn devices(&self) -> Result<Vec<Value>, Error> {
        self.get(self.smarthome_url("devices")?).await
    }

    /// `GET /smarthome/services`
    pub async fn device_services(&self) -> Result<Vec<Value>, Error> {
        self.get(self.smarthome_url("services")?).await
    }

    /// `GET /smarthome{path}` for a single device service.
    pub async fn device_service(&self, path: &str) -> Result<Value, Error> {
        self.get(self.smarthome_url(path)?).await
    }

    /// `PUT /smarthome{path}/state` with a partial state body.
    ///
    /// The body must carry the service state's `@type` next to the changed
    /// attributes, otherwise the hub rejects it.
    pub async fn put_state(&self, path: &str, body: &Value) -> Result<(), Error> {
        let url = self.smarthome_url(&format!("{}/state", path.trim_end_matches('/')))?;
        debug!("PUT {}", url);

        let resp = self
            .http
            .put(url)
            .json(body)
            .send()
            .await
            .map_err(|e| classify(e, self.timeout))?;

        let status = resp.status();
        if status.is_success() {
            return Ok(());
        }
        let body = resp.text().await.unwrap_or_default();
        Err(Error::Http {
            status: status.as_u16(),
            body,
        })
    }

    // ── Request helpers ──────────────────────────────────────────────

    async fn get<T: DeserializeOwned>(&self, url: Url) -> Result<T, Error> {
        debug!("GET {}", url);

        let resp = self
            .http
            .get(url)
            .send()
            .await
            .map_err(|e| classify(e, self.timeout))?;

        let status = resp.status();
        let body = resp.text().await.map_err(|e| classify(e, self.timeout))?;
        if !status.is_success() {
            return Err(Error::Http {
                status: status.as_u16(),
                body,
            });
        }

        trace!(body_len = body.len(), "response body received");
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}

/// Fold reqwest timeouts into `Error::Timeout` so callers can match on it.
pub(crate) fn classify(err: reqwest::Error, timeout: Duration) -> Error {
    if err.is_timeout() {
        Error::Timeout {
            timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
        }
    } else {
        Error::Transport(err)
    }
}
