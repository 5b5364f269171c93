use tracing::{error, info};

use crate::protocol::Envelope;
use crate::registry::Registry;

/// Resolves on the first SIGINT or SIGTERM.
pub async fn wait_for_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut sigterm = match signal(SignalKind::terminate()) {
            Ok(s) => s,
            Err(e) => {
                error!(error = %e, "failed to install SIGTERM handler");
                if let Err(e) = tokio::signal::ctrl_c().await {
                    error!(error = %e, "failed to listen for ctrl-c");
                }
                return;
            }
        };

        tokio::select! {
            _ = tokio::signal::ctrl_c() => info!("received SIGINT"),
            _ = sigterm.recv() => info!("received SIGTERM"),
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for ctrl-c");
        }
    }
}

/// Sends every registered client a STOP and closes its connection.
///
/// The registry is empty afterwards. Per-client failures are logged and do
/// not stop the broadcast. Returns how many clients were notified.
pub async fn broadcast_stop(registry: &Registry) -> usize {
    let clients = registry.drain();

    info!(clients = clients.len(), "stopping clients");

    for c in &clients {
        if let Err(e) = c.peer.send_envelope(&Envelope::stop()).await {
            error!(client = %c.address, error = %e, "failed to notify client");
        }
        if let Err(e) = c.peer.close().await {
            error!(client = %c.address, error = %e, "failed to disconnect client");
        }
    }

    clients.len()
}
