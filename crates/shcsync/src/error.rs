//! CLI error types with miette diagnostics.
//!
//! Maps config, client and engine failures into user-facing errors with
//! actionable help text and stable exit codes.

use miette::Diagnostic;
use thiserror::Error;

use shcsync_config::ConfigError;
use shcsync_core::CoreError;

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const AUTH: i32 = 3;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Configuration ────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(
        code(shcsync::validation),
        help(
            "Set {field} in the config file, as SHCSYNC_{env} in the environment,\n\
             or pass it on the command line."
        )
    )]
    Validation {
        field: String,
        reason: String,
        env: String,
    },

    #[error("Cannot read config file {path}")]
    #[diagnostic(code(shcsync::config_file))]
    ConfigFile {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error(transparent)]
    #[diagnostic(code(shcsync::config))]
    Config(Box<figment::Error>),

    // ── Client ───────────────────────────────────────────────────────

    #[error("Client certificate setup failed: {message}")]
    #[diagnostic(
        code(shcsync::certificate),
        help(
            "The controller only answers paired clients. Place the certificate pair\n\
             under {certs_dir} or set client_cert and client_key in the config file."
        )
    )]
    Certificate { message: String, certs_dir: String },

    #[error("Could not reach the controller")]
    #[diagnostic(
        code(shcsync::connection_failed),
        help("Check that the controller is powered on and reachable on port 8444.")
    )]
    ConnectionFailed {
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("Discovery incomplete: {handler} failed: {reason}")]
    #[diagnostic(code(shcsync::discovery))]
    Discovery { handler: String, reason: String },

    // ── Engine ───────────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(code(shcsync::engine))]
    Engine(CoreError),

    // ── IO / Serialization ───────────────────────────────────────────

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error(transparent)]
    Json(#[from] serde_json::Error),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::Validation { .. } | Self::Config(_) => exit_code::USAGE,
            Self::Certificate { .. } => exit_code::AUTH,
            Self::ConnectionFailed { .. } | Self::Discovery { .. } => exit_code::CONNECTION,
            _ => exit_code::GENERAL,
        }
    }
}

// ── Conversions ──────────────────────────────────────────────────────

impl From<ConfigError> for CliError {
    fn from(err: ConfigError) -> Self {
        match err {
            ConfigError::Validation { field, reason } => Self::Validation {
                env: field.to_uppercase(),
                field,
                reason,
            },
            ConfigError::Figment(err) => Self::Config(err),
            ConfigError::Io { path, source } => Self::ConfigFile {
                path: path.display().to_string(),
                source,
            },
        }
    }
}

impl From<shcsync_api::Error> for CliError {
    fn from(err: shcsync_api::Error) -> Self {
        match err {
            shcsync_api::Error::Tls(message) => Self::Certificate {
                message,
                certs_dir: shcsync_config::certs_dir().display().to_string(),
            },
            other => Self::ConnectionFailed {
                source: Box::new(other),
            },
        }
    }
}

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::Config { message } => Self::Validation {
                field: "engine config".into(),
                reason: message,
                env: "NAMESPACE".into(),
            },
            other => Self::Engine(other),
        }
    }
}
