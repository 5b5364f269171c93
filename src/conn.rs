use tokio::io::{AsyncRead, BufReader};
use tracing::{debug, error, warn};

use crate::error::{Error, Result};
use crate::framing::{Frame, MAX_FRAME_LEN, is_blank, read_frame};
use crate::protocol::{self, Envelope};
use crate::registry::{Client, Registry};
use crate::router::{self, Outcome};

/// Read loop for one accepted connection.
///
/// Recoverable errors (bad frames, unknown recipients) are logged and the
/// loop goes on. End-of-stream or a read error ends it; the client then
/// leaves the registry, gets a best-effort STOP and has its connection
/// closed before this returns.
pub async fn handle<R>(registry: Registry, reader: R, client: Client) -> Result<()>
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut frame = Vec::with_capacity(1024);

    let result = loop {
        let step = match read_frame(&mut reader, &mut frame, MAX_FRAME_LEN).await {
            Ok(Frame::Line) if is_blank(&frame) => continue,
            Ok(Frame::Line) => process(&registry, &client, &frame).await,
            Ok(Frame::Oversized) => Err(Error::FrameTooLong(MAX_FRAME_LEN)),
            Ok(Frame::End) => {
                debug!(client = %client.address, "EOF, disconnecting client");
                break Ok(());
            }
            Err(e) => {
                error!(client = %client.address, error = %e, "failed to read input message");
                break Err(Error::from(e));
            }
        };

        match step {
            Ok(outcome) => debug!(client = %client.address, ?outcome, "dispatched"),
            Err(e) if e.is_recoverable() => {
                warn!(client = %client.address, error = %e, "dropping client message")
            }
            Err(e) => break Err(e),
        }
    };

    disconnect(&registry, &client).await;

    result
}

async fn process(registry: &Registry, client: &Client, frame: &[u8]) -> Result<Outcome> {
    let envelope = protocol::decode(frame)?;

    debug!(client = %client.address, kind = %envelope.kind(), "received client message");

    router::dispatch(registry, client, &envelope, frame).await
}

async fn disconnect(registry: &Registry, client: &Client) {
    // Shutdown or a newer connection under the same id owns the peer now.
    if !registry.remove_connection(client) {
        debug!(client = %client.address, "client already removed");
        return;
    }

    // Ignored: the peer is usually gone already.
    let _ = client.peer.send_envelope(&Envelope::stop()).await;

    if let Err(e) = client.peer.close().await {
        debug!(client = %client.address, error = %e, "close failed");
    }

    debug!(client = %client.address, clients = registry.count(), "client disconnected");
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::peer::Peer;
    use crate::shutdown;
    use std::io;
    use std::pin::Pin;
    use std::task::{Context, Poll};
    use std::time::Duration;
    use tokio::io::{AsyncBufReadExt, AsyncWriteExt, DuplexStream, Lines, ReadBuf};

    const STOP_FRAME: &str = r#"{"type":"command","payload":"STOP"}"#;

    struct ResetReader;

    impl AsyncRead for ResetReader {
        fn poll_read(
            self: Pin<&mut Self>,
            _cx: &mut Context<'_>,
            _buf: &mut ReadBuf<'_>,
        ) -> Poll<io::Result<()>> {
            Poll::Ready(Err(io::ErrorKind::ConnectionReset.into()))
        }
    }

    struct Harness {
        registry: Registry,
        // Writes here are what the server reads from the client.
        input: DuplexStream,
        // Lines the server wrote to the client.
        output: Lines<BufReader<DuplexStream>>,
        task: tokio::task::JoinHandle<Result<()>>,
        id: String,
    }

    async fn connect(registry: &Registry, id: &str, addr: &str) -> Harness {
        let (input, server_read) = tokio::io::duplex(4096);
        let (server_write, client_read) = tokio::io::duplex(4096);

        let client = registry
            .add(id.into(), addr.into(), Peer::new(server_write, None))
            .await;

        let task = tokio::spawn(handle(registry.clone(), server_read, client));

        Harness {
            registry: registry.clone(),
            input,
            output: BufReader::new(client_read).lines(),
            task,
            id: id.into(),
        }
    }

    async fn next(h: &mut Harness) -> Option<String> {
        tokio::time::timeout(Duration::from_millis(200), h.output.next_line())
            .await
            .ok()
            .and_then(|line| line.unwrap())
    }

    #[tokio::test]
    async fn eof_removes_client_and_sends_stop() {
        let reg = Registry::new();
        let mut h = connect(&reg, "a", "10.0.0.1:1").await;
        assert!(h.registry.contains(&h.id));

        h.input.shutdown().await.unwrap();
        (&mut h.task).await.unwrap().unwrap();

        assert!(matches!(reg.lookup_by_id("a"), Err(Error::NotFound(_))));
        assert!(reg.snapshot().is_empty());
        assert_eq!(next(&mut h).await.unwrap(), STOP_FRAME);
        assert!(next(&mut h).await.is_none());
    }

    #[tokio::test]
    async fn bad_frames_do_not_end_the_connection() {
        let reg = Registry::new();
        let mut h = connect(&reg, "a", "10.0.0.1:1").await;

        h.input.write_all(b"garbage\n").await.unwrap();
        h.input.write_all(b"{\"type\":\"bogus\",\"payload\":\"STOP\"}\n").await.unwrap();
        h.input.write_all(b"\xff\xfe\n\n").await.unwrap();
        h.input
            .write_all(b"{\"type\":\"command\",\"payload\":\"CLIENTS_LIST\"}\n")
            .await
            .unwrap();

        let reply = protocol::decode(next(&mut h).await.unwrap().as_bytes()).unwrap();
        assert_eq!(reply, Envelope::clients(reg.snapshot()));
        assert_eq!(reg.count(), 1);
        assert!(!h.task.is_finished());
    }

    #[tokio::test]
    async fn forwards_raw_frame_between_handlers() {
        let reg = Registry::new();
        let mut a = connect(&reg, "a", "10.0.0.1:1").await;
        let mut b = connect(&reg, "b", "10.0.0.2:1").await;

        // Split across two writes, extra whitespace kept verbatim.
        let frame = r#"{"type":"message", "payload":{"id":"b","ip":"","text":"hi"}}"#;
        a.input.write_all(&frame.as_bytes()[..20]).await.unwrap();
        a.input.flush().await.unwrap();
        tokio::task::yield_now().await;
        a.input.write_all(&frame.as_bytes()[20..]).await.unwrap();
        a.input.write_all(b"\n").await.unwrap();

        assert_eq!(next(&mut b).await.unwrap(), frame);
        assert!(next(&mut a).await.is_none());
    }

    #[tokio::test]
    async fn stop_from_client_keeps_it_registered() {
        let reg = Registry::new();
        let mut h = connect(&reg, "a", "10.0.0.1:1").await;

        h.input
            .write_all(b"{\"type\":\"command\",\"payload\":\"STOP\"}\n")
            .await
            .unwrap();

        assert!(next(&mut h).await.is_none());
        assert!(reg.contains("a"));
    }

    #[tokio::test]
    async fn read_error_disconnects_with_transport_error() {
        let reg = Registry::new();
        let (server_write, client_read) = tokio::io::duplex(4096);
        let client = reg
            .add("a".into(), "10.0.0.1:1".into(), Peer::new(server_write, None))
            .await;

        let result = handle(reg.clone(), ResetReader, client.clone()).await;

        assert!(matches!(result, Err(Error::Transport(ref e)) if e.kind() == io::ErrorKind::ConnectionReset));
        assert!(!reg.contains("a"));
        assert!(client.peer.is_closed().await);

        let mut output = BufReader::new(client_read).lines();
        assert_eq!(output.next_line().await.unwrap().unwrap(), STOP_FRAME);
        assert!(output.next_line().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn oversized_frame_is_dropped_and_reading_continues() {
        let reg = Registry::new();
        let mut h = connect(&reg, "a", "10.0.0.1:1").await;

        let mut flood = vec![b'a'; MAX_FRAME_LEN + 10];
        flood.push(b'\n');
        h.input.write_all(&flood).await.unwrap();
        h.input
            .write_all(b"{\"type\":\"command\",\"payload\":\"CLIENTS_LIST\"}\n")
            .await
            .unwrap();

        let reply = protocol::decode(next(&mut h).await.unwrap().as_bytes()).unwrap();
        assert_eq!(reply, Envelope::clients(reg.snapshot()));
        assert!(reg.contains("a"));
        assert!(!h.task.is_finished());
    }

    #[tokio::test]
    async fn eof_after_shutdown_drain_sends_nothing_more() {
        let reg = Registry::new();
        let mut h = connect(&reg, "a", "10.0.0.1:1").await;

        assert_eq!(shutdown::broadcast_stop(&reg).await, 1);

        h.input.shutdown().await.unwrap();
        (&mut h.task).await.unwrap().unwrap();

        assert_eq!(next(&mut h).await.unwrap(), STOP_FRAME);
        assert!(next(&mut h).await.is_none());
    }

    #[tokio::test]
    async fn drained_client_gets_no_stop_from_its_handler() {
        let reg = Registry::new();
        let mut h = connect(&reg, "a", "10.0.0.1:1").await;

        // Drained but not yet notified, as in the middle of a shutdown.
        let drained = reg.drain();
        h.input.shutdown().await.unwrap();
        (&mut h.task).await.unwrap().unwrap();

        assert!(next(&mut h).await.is_none());
        assert!(!drained[0].peer.is_closed().await);
    }
}
