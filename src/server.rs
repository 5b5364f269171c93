use std::future::Future;
use std::net::SocketAddr;
use std::time::Duration;

use anyhow::{Context, Result};
use tokio::net::{TcpListener, TcpStream};
use tracing::{debug, error, info};

use crate::config::ServerConfig;
use crate::peer::Peer;
use crate::registry::Registry;
use crate::{conn, ident, shutdown};

/// Binds the configured address and serves until SIGINT/SIGTERM.
pub async fn run(config: ServerConfig) -> Result<()> {
    let addr = config.listen_addr();

    let listener = TcpListener::bind(&addr)
        .await
        .with_context(|| format!("unable to start listener on {addr}"))?;

    info!(port = config.port, "server started and accepting connections on {}", addr);

    serve(listener, Registry::new(), config.write_timeout(), shutdown::wait_for_signal()).await?;

    info!("..done. Exit");
    Ok(())
}

/// Accepts connections until `shutdown` resolves, then stops every client
/// and releases the listener. Returns the number of clients stopped.
pub async fn serve<F>(
    listener: TcpListener,
    registry: Registry,
    write_timeout: Option<Duration>,
    shutdown: F,
) -> Result<usize>
where
    F: Future<Output = ()>,
{
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            _ = &mut shutdown => break,

            accepted = listener.accept() => match accepted {
                Ok((socket, peer)) => {
                    accept(&registry, socket, peer, write_timeout).await;
                }
                Err(e) => {
                    error!(error = %e, "failed to accept incoming connection");
                }
            },
        }
    }

    info!(clients = registry.count(), "received shutdown signal, stopping clients");

    let stopped = shutdown::broadcast_stop(&registry).await;
    drop(listener);

    Ok(stopped)
}

async fn accept(registry: &Registry, socket: TcpStream, peer: SocketAddr, write_timeout: Option<Duration>) {
    let (reader, writer) = socket.into_split();

    let id = ident::unique_id(registry);
    let client = registry
        .add(id, peer.to_string(), Peer::new(writer, write_timeout))
        .await;

    debug!(client = %peer, id = %client.id, clients = registry.count(), "incoming connection");

    let registry = registry.clone();

    tokio::spawn(async move {
        if let Err(err) = conn::handle(registry, reader, client).await {
            debug!(client = %peer, error = %err, "connection ended with error");
        }
    });
}
