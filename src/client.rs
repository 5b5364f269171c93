//! Client side: operator input from stdin, frames from the server.

use std::sync::Arc;

use anyhow::Context;
use tokio::io::{AsyncBufReadExt, AsyncRead, BufReader};
use tokio::net::TcpStream;
use tokio::net::tcp::OwnedWriteHalf;
use tokio::sync::{mpsc, watch};
use tracing::{debug, error, info, warn};

use crate::config::ClientConfig;
use crate::error::{Error, Result};
use crate::framing::{Frame, MAX_FRAME_LEN, is_blank, read_frame};
use crate::peer::Peer;
use crate::protocol::{self, Command, Envelope};

/// Handles shared by everything acting on behalf of the local client.
#[derive(Clone)]
pub struct Session {
    outbound: mpsc::UnboundedSender<Vec<u8>>,
    stop: Arc<watch::Sender<bool>>,
}

impl Session {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<Vec<u8>>, watch::Receiver<bool>) {
        let (outbound, outbound_rx) = mpsc::unbounded_channel();
        let (stop, stop_rx) = watch::channel(false);

        let session = Self {
            outbound,
            stop: Arc::new(stop),
        };

        (session, outbound_rx, stop_rx)
    }

    /// Queues one frame (without newline) for the server.
    pub fn send(&self, frame: Vec<u8>) -> Result<()> {
        self.outbound.send(frame).map_err(|_| Error::Closed)
    }

    pub fn request_stop(&self) {
        self.stop.send_replace(true);
    }

    pub fn stop_requested(&self) -> bool {
        *self.stop.borrow()
    }
}

pub trait Executor {
    fn execute(&self, session: &Session) -> Result<()>;
}

/// Stops the local client.
pub struct Stop;

/// Asks the server for the connected clients.
pub struct List;

/// Anything else: logged and dropped.
pub struct Unrecognized(pub String);

impl Executor for Stop {
    fn execute(&self, session: &Session) -> Result<()> {
        info!("STOP signal received; stopping client..");
        session.request_stop();
        Ok(())
    }
}

impl Executor for List {
    fn execute(&self, session: &Session) -> Result<()> {
        session.send(protocol::encode(&Envelope::list_request())?)
    }
}

impl Executor for Unrecognized {
    fn execute(&self, _session: &Session) -> Result<()> {
        error!(command = %self.0, "failed to find executor, use default");
        Ok(())
    }
}

pub fn executor(cmd: &Command) -> Box<dyn Executor + Send> {
    match cmd {
        Command::Stop => Box::new(Stop),
        Command::ClientsList => Box::new(List),
        Command::Unknown(name) => Box::new(Unrecognized(name.clone())),
    }
}

/// One line typed by the operator. Messages go to the server untouched.
pub fn on_input_line(line: &str, session: &Session) -> Result<()> {
    match protocol::decode(line.as_bytes())? {
        Envelope::Command(cmd) => executor(&cmd).execute(session),
        Envelope::Message(payload) => {
            debug!(?payload, "should send message to another client");
            session.send(line.as_bytes().to_vec())
        }
        Envelope::Clients(_) => {
            warn!("clients envelopes are only sent by the server");
            Ok(())
        }
    }
}

pub fn on_server_envelope(envelope: Envelope, session: &Session) {
    match envelope {
        Envelope::Message(payload) => {
            info!(from_id = %payload.id, "received message: `{}`", payload.text);
        }
        Envelope::Clients(list) => {
            info!("connected clients: ");
            for c in &list.clients {
                info!("{{ID: {}, IP: {}}}", c.id, c.address);
            }
        }
        Envelope::Command(Command::Stop) => {
            info!("STOP signal received; stopping client..");
            session.request_stop();
        }
        Envelope::Command(other) => {
            debug!(command = ?other, "ignoring server command");
        }
    }
}

async fn read_server<R>(reader: R, session: Session)
where
    R: AsyncRead + Unpin,
{
    let mut reader = BufReader::new(reader);
    let mut frame = Vec::new();

    loop {
        match read_frame(&mut reader, &mut frame, MAX_FRAME_LEN).await {
            Ok(Frame::Line) if is_blank(&frame) => continue,
            Ok(Frame::Line) => match protocol::decode(&frame) {
                Ok(env) => on_server_envelope(env, &session),
                Err(e) => error!(error = %e, "failed to read server response"),
            },
            Ok(Frame::Oversized) => {
                warn!(max = MAX_FRAME_LEN, "dropping oversized server message")
            }
            Ok(Frame::End) => {
                info!("server closed the connection");
                break;
            }
            Err(e) => {
                error!(error = %e, "failed to read server message");
                break;
            }
        }
    }

    session.request_stop();
}

async fn write_server(writer: OwnedWriteHalf, mut outbound: mpsc::UnboundedReceiver<Vec<u8>>) {
    let peer = Peer::new(writer, None);

    while let Some(frame) = outbound.recv().await {
        if let Err(e) = peer.send_frame(&frame).await {
            error!(error = %e, "failed to write to server");
            break;
        }
    }

    let _ = peer.close().await;
}

pub async fn run(config: ClientConfig) -> anyhow::Result<()> {
    let addr = config.server_addr();

    let stream = TcpStream::connect(&addr)
        .await
        .with_context(|| format!("failed to connect to provided server {addr}"))?;

    info!("client app successfully connected to server {}", addr);

    let (reader, writer) = stream.into_split();
    let (session, outbound, mut stop) = Session::new();

    let writer_task = tokio::spawn(write_server(writer, outbound));
    let reader_task = tokio::spawn(read_server(reader, session.clone()));

    let mut stdin = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            _ = stop.changed() => break,

            line = stdin.next_line() => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    if let Err(e) = on_input_line(&line, &session) {
                        error!(error = %e, "failed to read input");
                    }
                }
                Ok(None) => break,
                Err(e) => {
                    error!(error = %e, "failed to read stdin");
                    break;
                }
            },
        }
    }

    reader_task.abort();
    let _ = reader_task.await;
    drop(session);
    writer_task.await.context("writer task failed")?;

    Ok(())
}
