//! Command handlers and the shared connection setup.

pub mod discover;
pub mod run;

use std::sync::Arc;

use shcsync_api::HubClient;
use shcsync_config::Config;
use shcsync_core::{Engine, HubTransport, MemoryTree};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// An engine wired to the controller and an in-memory tree.
pub struct Session {
    pub engine: Engine,
    pub tree: Arc<MemoryTree>,
}

/// Load the config file and environment, then apply flag overrides.
pub fn load_config(global: &GlobalOpts) -> Result<Config, CliError> {
    let mut config = shcsync_config::load_config(global.config.as_deref())?;
    if let Some(ref host) = global.host {
        config.host = Some(host.clone());
    }
    if let Some(ref identifier) = global.identifier {
        config.identifier = Some(identifier.clone());
    }
    if global.insecure {
        config.skip_server_certificate_check = true;
        config.ca_cert = None;
    }
    config.validate()?;
    Ok(config)
}

pub fn connect(config: &Config) -> Result<Session, CliError> {
    let transport = config.to_transport_config()?;
    let client = HubClient::new(config.host()?, &transport)?;
    tracing::debug!(url = %client.base_url(), "controller client ready");

    let remote = Arc::new(HubTransport::new(client));
    let tree = Arc::new(MemoryTree::new());
    let engine = Engine::new(config.to_engine_config(), tree.clone(), remote)?;
    Ok(Session { engine, tree })
}
