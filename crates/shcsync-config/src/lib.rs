//! Configuration for the shcsync daemon.
//!
//! A single TOML file plus `SHCSYNC_*` environment overrides, translated
//! into `shcsync_core::EngineConfig` for the engine and
//! `shcsync_api::TransportConfig` for the hub client. The CLI applies
//! its flag overrides on top of the loaded [`Config`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use shcsync_api::{ClientIdentity, TlsMode, TransportConfig};
use shcsync_core::{EngineConfig, Namespace, PollConfig};

/// Prefix for environment overrides, e.g. `SHCSYNC_HOST`.
pub const ENV_PREFIX: &str = "SHCSYNC_";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("cannot read config file {}: {source}", path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

impl ConfigError {
    fn missing(field: &str) -> Self {
        Self::Validation {
            field: field.into(),
            reason: "not set (config file, SHCSYNC_* env or command-line flag)".into(),
        }
    }
}

// ── Config ──────────────────────────────────────────────────────────

/// Daemon settings as they appear in `config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Hub host name or IP address, without scheme or port.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub host: Option<String>,

    /// Client name chosen at pairing; selects the certificate pair.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub identifier: Option<String>,

    /// Root of the mirrored tree, e.g. `shcsync.0`.
    pub namespace: String,

    /// Minimum spacing between outbound writes. 0 disables limiting.
    pub rate_limit_ms: u64,

    /// Deadline for discovery fetches and single lookups.
    pub long_timeout_ms: u64,

    /// How long the hub may hold a long-poll open.
    pub poll_timeout_secs: u64,

    /// Client-side allowance on top of the poll timeout.
    pub poll_grace_ms: u64,

    /// Accept the hub's self-signed certificate.
    pub skip_server_certificate_check: bool,

    /// CA bundle used to verify the hub instead of skipping the check.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ca_cert: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_cert: Option<PathBuf>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_key: Option<PathBuf>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: None,
            identifier: None,
            namespace: "shcsync.0".into(),
            rate_limit_ms: 1000,
            long_timeout_ms: 5000,
            poll_timeout_secs: 30,
            poll_grace_ms: 2000,
            skip_server_certificate_check: true,
            ca_cert: None,
            client_cert: None,
            client_key: None,
        }
    }
}

impl Config {
    /// Check everything the engine and client need before any network
    /// activity.
    pub fn validate(&self) -> Result<(), ConfigError> {
        self.host()?;
        self.identifier()?;
        Namespace::parse(&self.namespace).map_err(|e| ConfigError::Validation {
            field: "namespace".into(),
            reason: e.to_string(),
        })?;
        if self.long_timeout_ms == 0 {
            return Err(ConfigError::Validation {
                field: "long_timeout_ms".into(),
                reason: "must be greater than zero".into(),
            });
        }
        if self.poll_timeout_secs == 0 {
            return Err(ConfigError::Validation {
                field: "poll_timeout_secs".into(),
                reason: "must be greater than zero".into(),
            });
        }
        Ok(())
    }

    pub fn host(&self) -> Result<&str, ConfigError> {
        non_empty(self.host.as_deref()).ok_or_else(|| ConfigError::missing("host"))
    }

    pub fn identifier(&self) -> Result<&str, ConfigError> {
        let id = non_empty(self.identifier.as_deref())
            .ok_or_else(|| ConfigError::missing("identifier"))?;
        if id.contains(['/', '\\']) {
            return Err(ConfigError::Validation {
                field: "identifier".into(),
                reason: format!("'{id}' must not contain path separators"),
            });
        }
        Ok(id)
    }

    pub fn to_engine_config(&self) -> EngineConfig {
        EngineConfig {
            namespace: self.namespace.clone(),
            rate_limit: Duration::from_millis(self.rate_limit_ms),
            long_timeout: Duration::from_millis(self.long_timeout_ms),
            poll: PollConfig {
                wait: Duration::from_secs(self.poll_timeout_secs),
                grace: Duration::from_millis(self.poll_grace_ms),
                ..PollConfig::default()
            },
        }
    }

    /// Client certificate pair. Unset paths default to
    /// `<config dir>/certs/shcsync_<identifier>_{cert,key}.pem`.
    pub fn client_identity(&self) -> Result<ClientIdentity, ConfigError> {
        let id = self.identifier()?;
        let certs = certs_dir();
        Ok(ClientIdentity {
            cert: self
                .client_cert
                .clone()
                .unwrap_or_else(|| certs.join(format!("shcsync_{id}_cert.pem"))),
            key: self
                .client_key
                .clone()
                .unwrap_or_else(|| certs.join(format!("shcsync_{id}_key.pem"))),
        })
    }

    pub fn to_transport_config(&self) -> Result<TransportConfig, ConfigError> {
        let tls = if let Some(ref ca) = self.ca_cert {
            TlsMode::CustomCa(ca.clone())
        } else if self.skip_server_certificate_check {
            TlsMode::DangerAcceptInvalid
        } else {
            TlsMode::System
        };

        Ok(TransportConfig {
            tls,
            identity: Some(self.client_identity()?),
            timeout: Duration::from_millis(self.long_timeout_ms),
        })
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

// ── Paths ───────────────────────────────────────────────────────────

/// Platform config directory, e.g. `~/.config/shcsync` on Linux.
pub fn config_dir() -> PathBuf {
    ProjectDirs::from("com", "shcsync", "shcsync").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("shcsync");
            p
        },
        |dirs| dirs.config_dir().to_path_buf(),
    )
}

pub fn config_path() -> PathBuf {
    config_dir().join("config.toml")
}

pub fn certs_dir() -> PathBuf {
    config_dir().join("certs")
}

// ── Loading ─────────────────────────────────────────────────────────

/// Layered sources: defaults, the TOML file, then `SHCSYNC_*` variables.
pub fn figment(path: &Path) -> Figment {
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed(ENV_PREFIX))
}

/// Load the config from `path`, or from the platform default location.
///
/// An explicit path must exist; a missing default file just means
/// defaults plus environment.
pub fn load_config(path: Option<&Path>) -> Result<Config, ConfigError> {
    let path = match path {
        Some(p) => {
            std::fs::metadata(p).map_err(|source| ConfigError::Io {
                path: p.to_path_buf(),
                source,
            })?;
            p.to_path_buf()
        }
        None => config_path(),
    };
    Ok(figment(&path).extract()?)
}
