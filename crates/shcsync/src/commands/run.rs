//! `shcsync run`: discovery, then the long-poll loop until Ctrl-C.

use tracing::{info, warn};

use crate::error::CliError;

use super::Session;

pub async fn handle(session: Session) -> Result<(), CliError> {
    let Session { engine, tree } = session;

    let report = engine.run_discovery().await;
    if !report.is_complete() {
        warn!("continuing with a partial tree; the change feed will fill it in");
    }
    info!(nodes = tree.len(), "tree ready");

    engine.start_reconnection_loop().await?;

    let mut state = engine.connection_state();
    let watcher = tokio::spawn(async move {
        while state.changed().await.is_ok() {
            let current = *state.borrow_and_update();
            info!(state = ?current, "connection state changed");
        }
    });

    tokio::signal::ctrl_c().await?;
    info!("interrupt received; shutting down");
    engine.stop().await;
    watcher.abort();
    Ok(())
}
