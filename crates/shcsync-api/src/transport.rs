// Transport configuration for building the hub's reqwest::Client.
//
// The hub only accepts paired clients, so every request carries the
// client certificate from the pairing step. The hub itself presents a
// self-signed certificate unless a CA file is configured.

use std::path::{Path, PathBuf};
use std::time::Duration;

use reqwest::header::{HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

/// API version header the hub expects on every request.
pub const API_VERSION: &str = "3.2";

/// TLS verification mode for the hub's server certificate.
#[derive(Debug, Clone)]
pub enum TlsMode {
    /// Use the system certificate store.
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (the hub ships a self-signed one).
    DangerAcceptInvalid,
}

/// Paths to the paired client certificate and private key (PEM).
#[derive(Debug, Clone)]
pub struct ClientIdentity {
    pub cert: PathBuf,
    pub key: PathBuf,
}

impl ClientIdentity {
    fn load(&self) -> Result<reqwest::Identity, Error> {
        let cert = read_pem(&self.cert, "client certificate")?;
        let key = SecretString::from(read_pem(&self.key, "client key")?);

        let mut pem = cert.into_bytes();
        pem.push(b'\n');
        pem.extend_from_slice(key.expose_secret().as_bytes());

        reqwest::Identity::from_pem(&pem)
            .map_err(|e| Error::Tls(format!("invalid client identity: {e}")))
    }
}

/// Transport configuration for building the hub HTTP client.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub identity: Option<ClientIdentity>,
    /// Default per-request timeout. Long-poll calls override it per request.
    pub timeout: Duration,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::DangerAcceptInvalid,
            identity: None,
            timeout: Duration::from_secs(5),
        }
    }
}

impl TransportConfig {
    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut headers = HeaderMap::new();
        headers.insert("api-version", HeaderValue::from_static(API_VERSION));

        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(concat!("shcsync/", env!("CARGO_PKG_VERSION")))
            .default_headers(headers)
            .use_rustls_tls();

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = read_pem(path, "CA cert")?;
                let cert = reqwest::Certificate::from_pem(cert_pem.as_bytes())
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        if let Some(ref identity) = self.identity {
            builder = builder.identity(identity.load()?);
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }
}

fn read_pem(path: &Path, what: &str) -> Result<String, Error> {
    std::fs::read_to_string(path)
        .map_err(|e| Error::Tls(format!("failed to read {what} {}: {e}", path.display())))
}
